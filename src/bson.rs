// hand-rolled instead of pulling in a BSON crate: those dedupe keys on
// decode, and the delta stream is encoded against the producer's exact,
// ordered, duplicates-included element sequence
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Double(f64),
    String(String),
    Document(Document),
    Array(Document),
    Binary { subtype: u8, bytes: Vec<u8> },
    ObjectId([u8; 12]),
    Boolean(bool),
    DateTime(i64),
    Null,
    Regex(String, String),
    Int32(i32),
    Timestamp { seconds: u32, increment: u32 },
    Int64(i64),
    Decimal128([u8; 16]),
    MinKey,
    MaxKey,
    JavaScript(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    elements: Vec<(String, Value)>,
}

impl Document {
    pub fn from_elements(elements: Vec<(String, Value)>) -> Self {
        Self { elements }
    }

    pub fn elements(&self) -> &[(String, Value)] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.elements.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

pub fn parse_document(bytes: &[u8]) -> Result<Document> {
    let mut cursor = Cursor { buf: bytes, pos: 0 };
    let doc = parse_doc_body(&mut cursor)?;
    if cursor.pos != bytes.len() {
        return Err(Error::MalformedBson(format!(
            "{} trailing byte(s) after top-level document",
            bytes.len() - cursor.pos
        )));
    }
    Ok(doc)
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::MalformedBson(
                "unexpected end of document".to_string(),
            ));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn read_cstring(&mut self) -> Result<String> {
        let start = self.pos;
        while self.pos < self.buf.len() && self.buf[self.pos] != 0 {
            self.pos += 1;
        }
        if self.pos >= self.buf.len() {
            return Err(Error::MalformedBson("unterminated key".to_string()));
        }
        let s = std::str::from_utf8(&self.buf[start..self.pos])
            .map_err(|_| Error::MalformedBson("key is not valid UTF-8".to_string()))?
            .to_owned();
        self.pos += 1; // skip the NUL
        Ok(s)
    }

    fn read_bson_string(&mut self) -> Result<String> {
        let len = self.read_i32()?;
        if len < 1 {
            return Err(Error::MalformedBson(format!("invalid string length {len}")));
        }
        let bytes = self.take(len as usize)?;
        if bytes[bytes.len() - 1] != 0 {
            return Err(Error::MalformedBson(
                "string is missing its trailing NUL".to_string(),
            ));
        }
        std::str::from_utf8(&bytes[..bytes.len() - 1])
            .map(str::to_owned)
            .map_err(|_| Error::MalformedBson("string is not valid UTF-8".to_string()))
    }
}

fn parse_doc_body(cursor: &mut Cursor) -> Result<Document> {
    let start = cursor.pos;
    let declared_len = cursor.read_i32()?;
    if declared_len < 5 {
        return Err(Error::MalformedBson(format!(
            "document length {declared_len} is too small"
        )));
    }
    let end = start + declared_len as usize;
    if end > cursor.buf.len() {
        return Err(Error::MalformedBson(
            "nested document runs past the end of its parent".to_string(),
        ));
    }

    let mut elements = Vec::new();
    loop {
        if cursor.pos >= end {
            return Err(Error::MalformedBson(
                "document is missing its NUL terminator".to_string(),
            ));
        }
        let type_byte = cursor.read_u8()?;
        if type_byte == 0x00 {
            break;
        }
        let key = cursor.read_cstring()?;
        let value = parse_value(cursor, type_byte)?;
        elements.push((key, value));
    }

    if cursor.pos != end {
        return Err(Error::MalformedBson(
            "document terminator was not the final byte".to_string(),
        ));
    }

    Ok(Document { elements })
}

fn parse_value(cursor: &mut Cursor, type_byte: u8) -> Result<Value> {
    Ok(match type_byte {
        0x01 => Value::Double(cursor.read_f64()?),
        0x02 => Value::String(cursor.read_bson_string()?),
        0x03 => Value::Document(parse_doc_body(cursor)?),
        0x04 => Value::Array(parse_doc_body(cursor)?),
        0x05 => {
            let len = cursor.read_i32()?;
            if len < 0 {
                return Err(Error::MalformedBson(format!("invalid binary length {len}")));
            }
            let subtype = cursor.read_u8()?;
            let bytes = cursor.take(len as usize)?.to_vec();
            Value::Binary { subtype, bytes }
        }
        0x07 => Value::ObjectId(cursor.take(12)?.try_into().unwrap()),
        0x08 => Value::Boolean(cursor.read_u8()? != 0),
        0x09 => Value::DateTime(cursor.read_i64()?),
        0x0A => Value::Null,
        0x0B => {
            let pattern = cursor.read_cstring()?;
            let options = cursor.read_cstring()?;
            Value::Regex(pattern, options)
        }
        0x0D => Value::JavaScript(cursor.read_bson_string()?),
        0x10 => Value::Int32(cursor.read_i32()?),
        0x11 => {
            // On-disk order is (increment, seconds); see the BSON spec's Timestamp type.
            let increment = cursor.read_u32()?;
            let seconds = cursor.read_u32()?;
            Value::Timestamp { seconds, increment }
        }
        0x12 => Value::Int64(cursor.read_i64()?),
        0x13 => Value::Decimal128(cursor.take(16)?.try_into().unwrap()),
        0xFF => Value::MinKey,
        0x7F => Value::MaxKey,
        other => {
            return Err(Error::MalformedBson(format!(
                "unsupported BSON element type 0x{other:02x}"
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cstring(s: &str) -> Vec<u8> {
        let mut out = s.as_bytes().to_vec();
        out.push(0);
        out
    }

    fn wrap_document(mut body: Vec<u8>) -> Vec<u8> {
        body.push(0x00);
        let len = (body.len() + 4) as i32;
        let mut out = len.to_le_bytes().to_vec();
        out.extend(body);
        out
    }

    #[test]
    fn parses_empty_document() {
        let bytes = wrap_document(vec![]);
        let doc = parse_document(&bytes).unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn parses_int32_element() {
        let mut body = vec![0x10];
        body.extend(cstring("x"));
        body.extend(5i32.to_le_bytes());
        let bytes = wrap_document(body);
        let doc = parse_document(&bytes).unwrap();
        assert_eq!(doc.elements(), &[("x".to_string(), Value::Int32(5))]);
    }

    #[test]
    fn preserves_duplicate_keys() {
        let mut body = vec![0x10];
        body.extend(cstring("a"));
        body.extend(3i32.to_le_bytes());
        body.push(0x10);
        body.extend(cstring("a"));
        body.extend(4i32.to_le_bytes());
        let bytes = wrap_document(body);
        let doc = parse_document(&bytes).unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.elements()[0], ("a".to_string(), Value::Int32(3)));
        assert_eq!(doc.elements()[1], ("a".to_string(), Value::Int32(4)));
    }

    #[test]
    fn parses_nested_document_and_array() {
        let mut inner = vec![0x10];
        inner.extend(cstring("0"));
        inner.extend(1i32.to_le_bytes());
        let inner = wrap_document(inner);

        let mut body = vec![0x04];
        body.extend(cstring("arr"));
        body.extend(&inner); // the array's own length-prefixed body
        let bytes = wrap_document(body);

        let doc = parse_document(&bytes).unwrap();
        match &doc.elements()[0].1 {
            Value::Array(arr) => {
                assert_eq!(arr.elements(), &[("0".to_string(), Value::Int32(1))]);
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn parses_timestamp_as_seconds_and_increment() {
        let mut body = vec![0x11];
        body.extend(cstring("op"));
        body.extend(7u32.to_le_bytes()); // increment first on the wire
        body.extend(42u32.to_le_bytes()); // then seconds
        let bytes = wrap_document(body);
        let doc = parse_document(&bytes).unwrap();
        assert_eq!(
            doc.elements()[0].1,
            Value::Timestamp { seconds: 42, increment: 7 }
        );
    }

    #[test]
    fn rejects_mismatched_length_prefix() {
        let mut bytes = wrap_document(vec![]);
        bytes[0] = 0xFF; // corrupt the declared length
        assert!(parse_document(&bytes).is_err());
    }

    #[test]
    fn rejects_string_missing_trailing_nul() {
        let mut body = vec![0x02];
        body.extend(cstring("s"));
        body.extend(2i32.to_le_bytes());
        body.extend(b"ab"); // no trailing NUL
        let bytes = wrap_document(body);
        let err = parse_document(&bytes).unwrap_err();
        assert!(matches!(err, Error::MalformedBson(_)));
    }

    #[test]
    fn rejects_trailing_bytes_after_document() {
        let mut bytes = wrap_document(vec![]);
        bytes.push(0xAA);
        assert!(parse_document(&bytes).is_err());
    }
}
