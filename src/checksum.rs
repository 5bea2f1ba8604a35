use std::fmt;

use sha2::{Digest, Sha256};

use crate::{Error, StructValue, Value};

const ROW: u8 = 0x01;
const UPDATE_COUNT: u8 = 0x02;

const NULL: u8 = 0x00;
const BOOL: u8 = 0x10;
const INT64: u8 = 0x11;
const FLOAT64: u8 = 0x12;
const STRING: u8 = 0x13;
const BYTES: u8 = 0x14;
const DATE: u8 = 0x15;
const TIMESTAMP: u8 = 0x16;
#[cfg(feature = "numeric")]
const NUMERIC: u8 = 0x17;
#[cfg(feature = "json")]
const JSON: u8 = 0x18;
const ARRAY: u8 = 0x19;
const STRUCT: u8 = 0x1A;

/// A running SHA-256 over every row and update count observed by a statement.
///
/// Each item is serialized as a tag byte, a big-endian `u32` payload length and the payload.
/// A row is tagged `0x01` and its payload is the big-endian `u32` field count followed by each
/// field's own tag, length and payload; an update count is tagged `0x02` with a big-endian `i64`
/// payload, so it never collides with a row holding a single integer.
#[derive(Clone)]
pub struct ResultsChecksum {
    hasher: Sha256,
    count: usize,
}

impl Default for ResultsChecksum {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultsChecksum {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
            count: 0,
        }
    }

    pub fn consume_row(&mut self, row: &[Value]) {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(row.len() as u32).to_be_bytes());
        for value in row {
            encode_value(value, &mut payload);
        }
        self.update(ROW, &payload);
    }

    pub fn consume_update_count(&mut self, count: i64) {
        self.update(UPDATE_COUNT, &count.to_be_bytes());
    }

    fn update(&mut self, tag: u8, payload: &[u8]) {
        self.hasher.update([tag]);
        self.hasher.update((payload.len() as u32).to_be_bytes());
        self.hasher.update(payload);
        self.count += 1;
    }

    /// The digest of everything consumed so far.
    pub fn digest(&self) -> Vec<u8> {
        self.hasher.clone().finalize().to_vec()
    }

    /// The number of rows and update counts consumed.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Fails with [`Error::RetryAborted`] when the retried attempt observed different results.
    pub fn compare(original: &ResultsChecksum, retried: &ResultsChecksum) -> Result<(), Error> {
        if original == retried {
            Ok(())
        } else {
            Err(Error::RetryAborted(
                "the transaction was aborted and could not be retried due to a concurrent modification"
                    .to_string(),
            ))
        }
    }
}

impl PartialEq for ResultsChecksum {
    fn eq(&self, other: &Self) -> bool {
        self.digest() == other.digest()
    }
}

impl fmt::Debug for ResultsChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultsChecksum")
            .field("count", &self.count)
            .field("digest", &base64::encode(self.digest()))
            .finish()
    }
}

fn put(out: &mut Vec<u8>, tag: u8, payload: &[u8]) {
    out.push(tag);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
}

fn encode_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null(_) => put(out, NULL, &[]),
        Value::Bool(b) => put(out, BOOL, &[*b as u8]),
        Value::Int64(i) => put(out, INT64, &i.to_be_bytes()),
        Value::Float64(f) => put(out, FLOAT64, &f.to_bits().to_be_bytes()),
        Value::String(s) => put(out, STRING, s.as_bytes()),
        Value::Bytes(b) => put(out, BYTES, b),
        #[cfg(feature = "numeric")]
        Value::Numeric(d) => put(out, NUMERIC, d.to_string().as_bytes()),
        #[cfg(feature = "json")]
        Value::Json(json) => put(out, JSON, json.to_string().as_bytes()),
        #[cfg(feature = "temporal")]
        Value::Date(d) => put(out, DATE, d.format("%Y-%m-%d").to_string().as_bytes()),
        #[cfg(not(feature = "temporal"))]
        Value::Date(d) => put(out, DATE, d.as_bytes()),
        #[cfg(feature = "temporal")]
        Value::Timestamp(ts) => put(
            out,
            TIMESTAMP,
            ts.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
                .as_bytes(),
        ),
        #[cfg(not(feature = "temporal"))]
        Value::Timestamp(ts) => put(out, TIMESTAMP, ts.as_bytes()),
        Value::Array(_, values) => put(out, ARRAY, &encode_list(values.iter())),
        Value::Struct(StructValue(fields)) => {
            put(out, STRUCT, &encode_list(fields.iter().map(|(_, v)| v)))
        }
    }
}

fn encode_list<'a>(values: impl ExactSizeIterator<Item = &'a Value>) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&(values.len() as u32).to_be_bytes());
    for value in values {
        encode_value(value, &mut payload);
    }
    payload
}
