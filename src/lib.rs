pub mod bson;
pub mod chunk;
pub mod config;
pub mod error;
pub mod flatten;
pub mod metric;
pub mod path;
pub mod reader;
pub mod sample;
pub mod time;
pub mod varint;

pub use config::{CancellationToken, ReaderConfig, SchemaChangePolicy, TimeRange};
pub use error::{Error, Result};
pub use metric::{Metric, OriginType};
pub use path::MetricPath;
pub use reader::{open_reader, Reader};
pub use sample::{MetricValue, Sample};
pub use time::Timestamp;
