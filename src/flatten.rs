use crate::bson::{Document, Value};
use crate::metric::{Metric, OriginType};
use crate::path::MetricPath;

// traversal order and count must match the producer bit-for-bit; a single
// missing or extra metric desyncs the delta stream for the rest of the chunk
pub fn flatten(doc: &Document) -> Vec<Metric> {
    let mut metrics = Vec::new();
    let mut path = MetricPath::new();
    flatten_document(doc, &mut path, &mut metrics);
    metrics
}

fn flatten_document(doc: &Document, path: &mut MetricPath, out: &mut Vec<Metric>) {
    for (key, value) in doc.elements() {
        let checkpoint = path.len();
        path.push(key);
        flatten_value(value, path, out);
        path.truncate(checkpoint);
    }
}

fn flatten_value(value: &Value, path: &mut MetricPath, out: &mut Vec<Metric>) {
    match value {
        Value::Document(doc) => flatten_document(doc, path, out),
        Value::Array(doc) => flatten_document(doc, path, out),
        // bit-reinterpreted, not truncated: value.to_bits() as i64, never value as i64
        Value::Double(v) => emit(out, path, OriginType::Double, v.to_bits() as i64),
        Value::Int32(v) => emit(out, path, OriginType::Int32, *v as i64),
        Value::Int64(v) => emit(out, path, OriginType::Int64, *v),
        Value::DateTime(v) => emit(out, path, OriginType::DateMillis, *v),
        Value::Boolean(v) => emit(out, path, OriginType::Bool, if *v { 1 } else { 0 }),
        Value::Timestamp { seconds, increment } => {
            emit(out, path, OriginType::TimestampSeconds, *seconds as i64);
            let checkpoint = path.len();
            path.push("inc");
            emit(out, path, OriginType::TimestampIncrement, *increment as i64);
            path.truncate(checkpoint);
        }
        Value::String(_)
        | Value::Binary { .. }
        | Value::ObjectId(_)
        | Value::Null
        | Value::Regex(_, _)
        | Value::Decimal128(_)
        | Value::MinKey
        | Value::MaxKey
        | Value::JavaScript(_) => {
            log::trace!("skipping non-numeric metric at {path:?}");
        }
    }
}

fn emit(out: &mut Vec<Metric>, path: &MetricPath, origin: OriginType, initial_value: i64) {
    out.push(Metric { path: path.clone(), origin, initial_value });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bson::Value;

    fn doc(elements: Vec<(&str, Value)>) -> Document {
        Document::from_elements(elements.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn flattens_scalar_types() {
        let d = doc(vec![
            ("i32", Value::Int32(5)),
            ("i64", Value::Int64(6)),
            ("b", Value::Boolean(true)),
        ]);
        let metrics = flatten(&d);
        assert_eq!(metrics.len(), 3);
        assert_eq!(metrics[0].path.to_dotted_string(), "i32");
        assert_eq!(metrics[0].initial_value, 5);
        assert_eq!(metrics[2].initial_value, 1);
    }

    #[test]
    fn double_is_bit_reinterpreted_not_truncated() {
        let d = doc(vec![("d", Value::Double(1.0))]);
        let metrics = flatten(&d);
        assert_eq!(metrics[0].initial_value, 1.0f64.to_bits() as i64);
        assert_ne!(metrics[0].initial_value, 1); // truncating cast would give 1
    }

    #[test]
    fn timestamp_expands_to_two_metrics() {
        let d = doc(vec![("op", Value::Timestamp { seconds: 42, increment: 7 })]);
        let metrics = flatten(&d);
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].path.to_dotted_string(), "op");
        assert_eq!(metrics[0].initial_value, 42);
        assert_eq!(metrics[1].path.to_dotted_string(), "op.inc");
        assert_eq!(metrics[1].initial_value, 7);
    }

    #[test]
    fn duplicate_keys_both_emit_metrics() {
        let d = doc(vec![("a", Value::Int32(3)), ("a", Value::Int32(4))]);
        let metrics = flatten(&d);
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].initial_value, 3);
        assert_eq!(metrics[1].initial_value, 4);
    }

    #[test]
    fn non_numeric_types_are_skipped_without_recursing() {
        let d = doc(vec![("s", Value::String("x".into())), ("n", Value::Int32(1))]);
        let metrics = flatten(&d);
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].path.to_dotted_string(), "n");
    }
}
