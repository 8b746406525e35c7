use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::bson::{self, Document, Value};
use crate::chunk::{decode_chunk, quick_sample_count, Chunk};
use crate::config::{CancellationToken, ReaderConfig, SchemaChangePolicy};
use crate::error::{Error, Result};
use crate::sample::{MetricValue, Sample};
use crate::time::{unix_millis_to_timestamp, Timestamp};

pub fn open_reader(path: impl AsRef<Path>) -> Result<Reader<BufReader<File>>> {
    let file = File::open(path)?;
    Ok(Reader::new(BufReader::new(file)))
}

enum FramingPayload {
    Metadata(Document),
    PeriodicMetadata(Document),
    Chunk(Vec<u8>),
}

struct FramingDocument {
    timestamp: Timestamp,
    payload: FramingPayload,
}

struct PendingChunk {
    chunk: Chunk,
    index: usize,
}

pub struct Reader<R> {
    source: R,
    config: ReaderConfig,
    cancel: CancellationToken,
    pending: Option<PendingChunk>,
    last_schema: Option<Vec<String>>,
    metadata: Option<Document>,
    done: bool,
}

impl<R: Read> Reader<R> {
    pub fn new(source: R) -> Self {
        Self::with_config(source, ReaderConfig::default())
    }

    pub fn with_config(source: R, config: ReaderConfig) -> Self {
        Self {
            source,
            config,
            cancel: CancellationToken::new(),
            pending: None,
            last_schema: None,
            metadata: None,
            done: false,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn metric_names(&self) -> Option<Vec<String>> {
        self.pending.as_ref().map(|p| {
            p.chunk.metrics.iter().map(|m| m.path.to_dotted_string()).collect()
        })
    }

    pub fn metadata(&self) -> Option<&Document> {
        self.metadata.as_ref()
    }

    // scans the rest of the byte source; nothing left to iterate after this returns
    pub fn sample_count(&mut self) -> Result<usize> {
        let mut total = self.pending.as_ref().map_or(0, |p| p.chunk.sample_count - p.index);
        self.pending = None;

        loop {
            if self.cancel.is_cancelled() {
                self.done = true;
                return Err(Error::Cancelled);
            }
            let framing = match read_framing_document(&mut self.source) {
                Ok(doc) => doc,
                Err(Error::TruncatedInterim) => {
                    self.done = true;
                    return Ok(total);
                }
                Err(err) => {
                    self.done = true;
                    return Err(err);
                }
            };
            match framing.payload {
                FramingPayload::Metadata(_) | FramingPayload::PeriodicMetadata(_) => continue,
                FramingPayload::Chunk(blob) => {
                    total += quick_sample_count(&blob)?;
                }
            }
        }
    }

    fn advance_chunk(&mut self) -> Result<bool> {
        loop {
            if self.cancel.is_cancelled() {
                self.done = true;
                return Err(Error::Cancelled);
            }

            let framing = match read_framing_document(&mut self.source) {
                Ok(doc) => doc,
                Err(Error::TruncatedInterim) => {
                    log::info!("reached end of FTDC stream at a clean document boundary");
                    self.done = true;
                    return Ok(false);
                }
                Err(err) => {
                    self.done = true;
                    return Err(err);
                }
            };

            match framing.payload {
                FramingPayload::Metadata(doc) | FramingPayload::PeriodicMetadata(doc) => {
                    if self.metadata.is_none() {
                        self.metadata = Some(doc);
                    }
                    continue;
                }
                FramingPayload::Chunk(blob) => {
                    if let Some(range) = self.config.time_range {
                        if let Some(end) = range.end {
                            if framing.timestamp >= end {
                                // chunk timestamp lower-bounds its first sample
                                continue;
                            }
                        }
                    }

                    if self.cancel.is_cancelled() {
                        self.done = true;
                        return Err(Error::Cancelled);
                    }

                    let chunk = match decode_chunk(&blob, framing.timestamp) {
                        Ok(chunk) => chunk,
                        Err(err) => {
                            self.done = true;
                            return Err(err);
                        }
                    };

                    let paths: Vec<String> =
                        chunk.metrics.iter().map(|m| m.path.to_dotted_string()).collect();
                    if let Some(prev) = &self.last_schema {
                        if prev != &paths {
                            log::warn!(
                                "reference schema changed between chunks ({} -> {} metrics)",
                                prev.len(),
                                paths.len()
                            );
                            if self.config.on_schema_change == SchemaChangePolicy::Error {
                                self.done = true;
                                return Err(Error::SchemaMismatch {
                                    expected: prev.len(),
                                    actual: paths.len(),
                                });
                            }
                        }
                    }
                    self.last_schema = Some(paths);

                    log::debug!(
                        "decoded chunk at {}: {} metrics, {} samples",
                        chunk.timestamp,
                        chunk.metrics.len(),
                        chunk.sample_count
                    );

                    self.pending = Some(PendingChunk { chunk, index: 0 });
                    return Ok(true);
                }
            }
        }
    }

    fn materialize(&self, index: usize) -> Sample {
        let chunk = &self.pending.as_ref().unwrap().chunk;
        let timestamp = match chunk.start_metric_index {
            Some(m) => unix_millis_to_timestamp(chunk.values[m][index]),
            None => chunk.timestamp + chrono::Duration::seconds(index as i64),
        };

        let mut metrics = Vec::with_capacity(chunk.metrics.len());
        for (metric, values) in chunk.metrics.iter().zip(chunk.values.iter()) {
            let path = metric.path.to_dotted_string();
            if let Some(filter) = &self.config.metric_filter {
                if !filter(&path) {
                    continue;
                }
            }
            metrics.push((path, MetricValue::restore(metric.origin, values[index])));
        }

        Sample { timestamp, metrics }
    }
}

impl<R: Read> Iterator for Reader<R> {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            if let Some(pending) = &self.pending {
                if pending.index >= pending.chunk.sample_count {
                    self.pending = None;
                    continue;
                }
            } else {
                match self.advance_chunk() {
                    Ok(true) => continue,
                    Ok(false) => return None,
                    Err(err) => return Some(Err(err)),
                }
            }

            let index = self.pending.as_ref().unwrap().index;
            self.pending.as_mut().unwrap().index += 1;
            let sample = self.materialize(index);

            if let Some(range) = self.config.time_range {
                if let Some(start) = range.start {
                    if sample.timestamp < start {
                        continue;
                    }
                }
                if let Some(end) = range.end {
                    if sample.timestamp >= end {
                        continue;
                    }
                }
            }

            return Some(Ok(sample));
        }
    }
}

// false only on clean EOF before any bytes are read; partial reads are Truncated
fn try_read_exact<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(Error::Truncated);
        }
        filled += n;
    }
    Ok(true)
}

fn read_framing_document<R: Read>(source: &mut R) -> Result<FramingDocument> {
    let mut len_buf = [0u8; 4];
    if !try_read_exact(source, &mut len_buf)? {
        return Err(Error::TruncatedInterim);
    }

    let total_len = u32::from_le_bytes(len_buf);
    if total_len < 5 {
        return Err(Error::MalformedBson(format!(
            "framing document length {total_len} is too small"
        )));
    }

    let mut buf = vec![0u8; total_len as usize];
    buf[0..4].copy_from_slice(&len_buf);
    if !try_read_exact(source, &mut buf[4..])? {
        return Err(Error::TruncatedInterim);
    }

    let doc = bson::parse_document(&buf)?;
    let timestamp = extract_id_timestamp(&doc)?;
    let kind = extract_type(&doc)?;

    let payload = match kind {
        0 => FramingPayload::Metadata(extract_doc_field(&doc, "doc")?),
        1 => FramingPayload::Chunk(extract_binary_field(&doc, "data")?),
        2 => FramingPayload::PeriodicMetadata(extract_doc_field(&doc, "doc")?),
        other => return Err(Error::UnknownDocumentType(other)),
    };

    Ok(FramingDocument { timestamp, payload })
}

fn extract_id_timestamp(doc: &Document) -> Result<Timestamp> {
    match doc.get("_id") {
        Some(Value::DateTime(millis)) => Ok(unix_millis_to_timestamp(*millis)),
        Some(_) => Err(Error::MalformedBson("_id is not a DateTime".to_string())),
        None => Err(Error::MalformedBson("framing document is missing _id".to_string())),
    }
}

fn extract_type(doc: &Document) -> Result<i32> {
    match doc.get("type") {
        Some(Value::Int32(v)) => Ok(*v),
        Some(_) => Err(Error::MalformedBson("type is not an Int32".to_string())),
        None => Err(Error::MalformedBson("framing document is missing type".to_string())),
    }
}

fn extract_doc_field(doc: &Document, key: &str) -> Result<Document> {
    match doc.get(key) {
        Some(Value::Document(d)) => Ok(d.clone()),
        Some(_) => Err(Error::MalformedBson(format!("{key} is not an embedded document"))),
        None => Err(Error::MalformedBson(format!("framing document is missing {key}"))),
    }
}

fn extract_binary_field(doc: &Document, key: &str) -> Result<Vec<u8>> {
    match doc.get(key) {
        Some(Value::Binary { subtype: 0, bytes }) => Ok(bytes.clone()),
        Some(Value::Binary { .. }) => {
            Err(Error::MalformedBson(format!("{key} has an unexpected binary subtype")))
        }
        Some(_) => Err(Error::MalformedBson(format!("{key} is not a Binary"))),
        None => Err(Error::MalformedBson(format!("framing document is missing {key}"))),
    }
}
