//! `Range` request header handling for the legacy export.
//!
//! Only single byte ranges are served. Accepted forms:
//! - `bytes=start-end`
//! - `bytes=start-`
//! - `bytes=-suffix`

/// Inclusive byte range within a representation of known length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Content-Range` response header.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// Why a range header could not be honoured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    Malformed(String),
    Unsatisfiable { total: u64 },
}

impl std::fmt::Display for RangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(value) => write!(f, "malformed range header '{}'", value),
            Self::Unsatisfiable { total } => {
                write!(f, "range lies outside the {} byte representation", total)
            }
        }
    }
}

/// Resolve a `Range` header value against a representation of `total` bytes.
///
/// `end` is clamped to `total - 1`.
pub fn parse_range(value: &str, total: u64) -> Result<ByteRange, RangeError> {
    let malformed = || RangeError::Malformed(value.to_string());

    let ranges = value.trim().strip_prefix("bytes=").ok_or_else(malformed)?;
    if ranges.contains(',') {
        return Err(malformed());
    }
    let (start, end) = ranges.trim().split_once('-').ok_or_else(malformed)?;
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        // Suffix form: last N bytes.
        let suffix: u64 = parse_number(end).ok_or_else(malformed)?;
        if suffix == 0 || total == 0 {
            return Err(RangeError::Unsatisfiable { total });
        }
        return Ok(ByteRange {
            start: total.saturating_sub(suffix),
            end: total - 1,
        });
    }

    let start: u64 = parse_number(start).ok_or_else(malformed)?;
    let end = if end.is_empty() {
        None
    } else {
        Some(parse_number(end).ok_or_else(malformed)?)
    };

    if let Some(end) = end {
        if end < start {
            return Err(malformed());
        }
    }
    if start >= total {
        return Err(RangeError::Unsatisfiable { total });
    }

    let last = total - 1;
    Ok(ByteRange {
        start,
        end: end.map_or(last, |e| e.min(last)),
    })
}

fn parse_number(text: &str) -> Option<u64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
