//! On-disk record format.
//!
//! Every reading is stored as one line of ASCII text:
//!
//! ```text
//! <epoch_seconds>,<temperature .2>,<humidity .2>\n
//! ```
//!
//! There is no header and no trailing metadata. This module is the only place
//! that builds or parses these lines.

use thermolog_types::Reading;

/// Shortest line (after trimming) that can possibly hold a record.
pub const MIN_LINE_LEN: usize = 5;

/// Number of comma-separated fields in a record.
pub const FIELD_COUNT: usize = 3;

/// Why a line could not be decoded into a [`Reading`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The trimmed line is shorter than [`MIN_LINE_LEN`].
    #[error("line too short ({0} bytes)")]
    TooShort(usize),

    /// The line has fewer than [`FIELD_COUNT`] fields.
    #[error("expected {FIELD_COUNT} fields, found {0}")]
    MissingFields(usize),

    /// The timestamp field is empty or not an integer.
    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    /// The line is not valid UTF-8.
    #[error("line is not valid UTF-8")]
    NotUtf8,

    /// The final line of the log has no terminating newline, so its write
    /// never completed.
    #[error("line truncated before its newline")]
    Truncated,
}

/// Encode a reading as a newline-terminated record.
///
/// ```
/// use thermolog_store::codec;
/// use thermolog_types::Reading;
///
/// let line = codec::encode(&Reading::new(1120, 21.0, 49.5));
/// assert_eq!(line, "1120,21.00,49.50\n");
/// ```
pub fn encode(reading: &Reading) -> String {
    format!(
        "{},{:.2},{:.2}\n",
        reading.timestamp, reading.temperature, reading.humidity
    )
}

/// Decode one record.
///
/// Structure is checked strictly: length, field count and the timestamp must
/// all be valid. The two measurement fields are parsed best-effort: the
/// leading numeric part of the field is used and a field without one reads as
/// `0.0`. Logs written by older firmware rely on this.
pub fn decode(line: &str) -> Result<Reading, DecodeError> {
    let line = line.trim();
    if line.len() < MIN_LINE_LEN {
        return Err(DecodeError::TooShort(line.len()));
    }

    let fields: Vec<&str> = line.splitn(FIELD_COUNT, ',').collect();
    if fields.len() < FIELD_COUNT {
        return Err(DecodeError::MissingFields(fields.len()));
    }

    let timestamp = fields[0]
        .trim()
        .parse::<i64>()
        .map_err(|_| DecodeError::InvalidTimestamp(fields[0].to_string()))?;

    Ok(Reading::new(
        timestamp,
        parse_lenient(fields[1]),
        parse_lenient(fields[2]),
    ))
}

/// Decode raw bytes read from the log, rejecting non-UTF-8 content.
pub fn decode_bytes(line: &[u8]) -> Result<Reading, DecodeError> {
    std::str::from_utf8(line)
        .map_err(|_| DecodeError::NotUtf8)
        .and_then(decode)
}

fn parse_lenient(field: &str) -> f32 {
    let field = field.trim();
    if let Ok(value) = field.parse::<f32>()
        && value.is_finite()
    {
        return value;
    }

    let mut end = 0;
    let mut seen_dot = false;
    for (i, b) in field.bytes().enumerate() {
        match b {
            b'0'..=b'9' => end = i + 1,
            b'.' if !seen_dot => {
                seen_dot = true;
                end = i + 1;
            }
            b'-' | b'+' if i == 0 => end = i + 1,
            _ => break,
        }
    }

    field[..end]
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}
