use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

use crate::metric::OriginType;
use crate::time::{Timestamp, TimestampFormat};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Double(f64),
    Int32(i32),
    Int64(i64),
    DateMillis(i64),
    Bool(bool),
    TimestampSeconds(u32),
    TimestampIncrement(u32),
}

impl MetricValue {
    pub(crate) fn restore(origin: OriginType, raw: i64) -> Self {
        match origin {
            // via u64, not straight to f64: from_bits needs the raw bit pattern
            OriginType::Double => MetricValue::Double(f64::from_bits(raw as u64)),
            OriginType::Int32 => MetricValue::Int32(raw as i32),
            OriginType::Int64 => MetricValue::Int64(raw),
            OriginType::DateMillis => MetricValue::DateMillis(raw),
            OriginType::Bool => MetricValue::Bool(raw != 0),
            OriginType::TimestampSeconds => MetricValue::TimestampSeconds(raw as u32),
            OriginType::TimestampIncrement => MetricValue::TimestampIncrement(raw as u32),
        }
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            MetricValue::Double(v) => serializer.serialize_f64(*v),
            MetricValue::Int32(v) => serializer.serialize_i32(*v),
            MetricValue::Int64(v) => serializer.serialize_i64(*v),
            MetricValue::DateMillis(v) => serializer.serialize_i64(*v),
            MetricValue::Bool(v) => serializer.serialize_bool(*v),
            MetricValue::TimestampSeconds(v) => serializer.serialize_u32(*v),
            MetricValue::TimestampIncrement(v) => serializer.serialize_u32(*v),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sample {
    pub timestamp: Timestamp,
    pub metrics: Vec<(String, MetricValue)>,
}

impl Sample {
    pub fn get(&self, path: &str) -> Option<MetricValue> {
        self.metrics.iter().find(|(p, _)| p == path).map(|(_, v)| *v)
    }
}

impl Serialize for Sample {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Sample", 2)?;
        state.serialize_field("timestamp", &self.timestamp.to_timestamp_string())?;
        state.serialize_field("metrics", &MetricsAsMap(&self.metrics))?;
        state.end()
    }
}

struct MetricsAsMap<'a>(&'a [(String, MetricValue)]);

impl Serialize for MetricsAsMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_restoration_is_an_involution() {
        for bits in [0.0f64, -0.0, f64::NAN, f64::INFINITY, 1.5, -1.5] {
            let raw = bits.to_bits() as i64;
            let restored = MetricValue::restore(OriginType::Double, raw);
            match restored {
                MetricValue::Double(v) => assert_eq!(v.to_bits(), bits.to_bits()),
                other => panic!("expected Double, got {other:?}"),
            }
        }
    }

    #[test]
    fn nan_with_sign_bit_set_round_trips() {
        let raw: i64 = -1; // all bits set: a quiet NaN with the sign bit on
        let restored = MetricValue::restore(OriginType::Double, raw);
        match restored {
            MetricValue::Double(v) => assert_eq!(v.to_bits(), raw as u64),
            other => panic!("expected Double, got {other:?}"),
        }
    }

    #[test]
    fn bool_restoration() {
        assert_eq!(MetricValue::restore(OriginType::Bool, 0), MetricValue::Bool(false));
        assert_eq!(MetricValue::restore(OriginType::Bool, 1), MetricValue::Bool(true));
        assert_eq!(MetricValue::restore(OriginType::Bool, -1), MetricValue::Bool(true));
    }

    #[test]
    fn int32_sign_extends_from_truncated_bits() {
        let raw = (-1i32) as i64 & 0xFFFF_FFFF; // low 32 bits only, as if wrapped
        assert_eq!(MetricValue::restore(OriginType::Int32, raw), MetricValue::Int32(-1));
    }
}
