use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::time::Timestamp;

// half-open [start, end)
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeRange {
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
}

impl TimeRange {
    pub fn new(start: Option<Timestamp>, end: Option<Timestamp>) -> Self {
        Self { start, end }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SchemaChangePolicy {
    Error,
    #[default]
    NewChunk,
}

type MetricFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub struct ReaderConfig {
    pub(crate) time_range: Option<TimeRange>,
    pub(crate) metric_filter: Option<MetricFilter>,
    pub(crate) on_schema_change: SchemaChangePolicy,
}

impl ReaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    // filtered-out metrics still consume their column in the decoder
    pub fn with_metric_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.metric_filter = Some(Arc::new(filter));
        self
    }

    pub fn with_schema_change_policy(mut self, policy: SchemaChangePolicy) -> Self {
        self.on_schema_change = policy;
        self
    }
}

#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
