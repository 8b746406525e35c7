use std::io::{Cursor as IoCursor, Read};

use flate2::bufread::ZlibDecoder;

use crate::bson;
use crate::error::{Error, Result};
use crate::flatten::flatten;
use crate::metric::Metric;
use crate::time::Timestamp;
use crate::varint::read_varint;

#[derive(Debug)]
pub struct Chunk {
    pub timestamp: Timestamp,
    pub metrics: Vec<Metric>,
    pub values: Vec<Vec<i64>>,
    pub sample_count: usize,
    // index of the "start" metric, if present; it carries each sample's own ms timestamp
    pub start_metric_index: Option<usize>,
}

pub fn decode_chunk(payload: &[u8], timestamp: Timestamp) -> Result<Chunk> {
    let inflated = inflate_payload(payload)?;

    if inflated.len() < 4 {
        return Err(Error::Truncated);
    }
    let doc_len = u32::from_le_bytes(inflated[0..4].try_into().unwrap()) as usize;
    if inflated.len() < doc_len + 8 {
        return Err(Error::Truncated);
    }

    let reference_doc = bson::parse_document(&inflated[..doc_len])?;
    let metrics_count =
        u32::from_le_bytes(inflated[doc_len..doc_len + 4].try_into().unwrap()) as usize;
    let deltas_count =
        u32::from_le_bytes(inflated[doc_len + 4..doc_len + 8].try_into().unwrap()) as usize;
    let delta_bytes = &inflated[doc_len + 8..];

    let metrics = flatten(&reference_doc);
    if metrics.len() != metrics_count {
        return Err(Error::SchemaMismatch { expected: metrics_count, actual: metrics.len() });
    }

    let sample_count = deltas_count + 1;
    let mut values: Vec<Vec<i64>> = metrics
        .iter()
        .map(|m| {
            let mut row = Vec::with_capacity(sample_count);
            row.push(m.initial_value);
            row
        })
        .collect();

    decode_deltas(delta_bytes, deltas_count, &mut values)?;

    let start_metric_index =
        metrics.iter().position(|m| m.path.to_dotted_string() == "start");

    Ok(Chunk { timestamp, metrics, values, sample_count, start_metric_index })
}

// skips flattening and delta decode entirely; used by Reader::sample_count
pub(crate) fn quick_sample_count(payload: &[u8]) -> Result<usize> {
    let inflated = inflate_payload(payload)?;
    if inflated.len() < 4 {
        return Err(Error::Truncated);
    }
    let doc_len = u32::from_le_bytes(inflated[0..4].try_into().unwrap()) as usize;
    if inflated.len() < doc_len + 8 {
        return Err(Error::Truncated);
    }
    let deltas_count =
        u32::from_le_bytes(inflated[doc_len + 4..doc_len + 8].try_into().unwrap()) as usize;
    Ok(deltas_count + 1)
}

fn inflate_payload(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() < 4 {
        return Err(Error::Truncated);
    }
    let declared_len = u32::from_le_bytes(payload[0..4].try_into().unwrap());

    let mut inflated = Vec::new();
    ZlibDecoder::new(&payload[4..])
        .read_to_end(&mut inflated)
        .map_err(Error::DecompressionFailure)?;

    if inflated.len() as u32 != declared_len {
        return Err(Error::FrameSizeMismatch {
            declared: declared_len,
            actual: inflated.len() as u32,
        });
    }
    Ok(inflated)
}

fn decode_deltas(delta_bytes: &[u8], deltas_count: usize, values: &mut [Vec<i64>]) -> Result<()> {
    let mut cursor = IoCursor::new(delta_bytes);
    // nzeros lives outside the per-metric loop: a zero-run can cross a metric boundary
    let mut nzeros: u64 = 0;

    for row in values.iter_mut() {
        let mut current = row[0];
        let mut remaining = deltas_count;

        while remaining > 0 {
            if nzeros > 0 {
                let run = nzeros.min(remaining as u64) as usize;
                for _ in 0..run {
                    row.push(current);
                }
                remaining -= run;
                nzeros -= run as u64;
                continue;
            }

            let raw = read_varint(&mut cursor)?;
            let delta = raw as i64; // bit reinterpretation, not zig-zag
            if delta == 0 {
                nzeros = 1 + read_varint(&mut cursor)?;
            } else {
                current = current.wrapping_add(delta);
                row.push(current);
                remaining -= 1;
            }
        }
    }

    let consumed = cursor.position() as usize;
    if nzeros == 0 && consumed != delta_bytes.len() {
        return Err(Error::TrailingBytes(delta_bytes.len() - consumed));
    }
    Ok(())
}
