/// Remaining time-to-live of a key in milliseconds.
///
/// `0` is the "no expiration" sentinel. The value is never negative:
/// negative store readings and negative text are normalized to [`Ttl::NONE`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ttl(u64);

impl Ttl {
    /// No expiration.
    pub const NONE: Ttl = Ttl(0);

    pub fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Normalize a PTTL reply: `-1` (no expire), `-2` (no such key) and any
    /// other negative reading become [`Ttl::NONE`].
    pub fn from_pttl(reply: i64) -> Self {
        if reply <= 0 { Self::NONE } else { Self(reply as u64) }
    }

    /// Parse the decimal text form used by the file format.
    ///
    /// Empty text means no expiration; a leading `-` is clamped to zero.
    pub fn parse(text: &[u8]) -> Result<Self, InvalidTtl> {
        let (negative, digits) = match text.split_first() {
            None => return Ok(Self::NONE),
            Some((b'-', rest)) => (true, rest),
            Some(_) => (false, text),
        };
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return Err(InvalidTtl(String::from_utf8_lossy(text).into_owned()));
        }
        if negative {
            return Ok(Self::NONE);
        }
        let mut ms: u64 = 0;
        for d in digits {
            ms = ms
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(d - b'0')))
                .ok_or_else(|| InvalidTtl(String::from_utf8_lossy(text).into_owned()))?;
        }
        Ok(Self(ms))
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for Ttl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// TTL text that is neither empty nor a decimal integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTtl(pub String);

impl std::fmt::Display for InvalidTtl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid ttl {:?}", self.0)
    }
}

impl std::error::Error for InvalidTtl {}

/// One key/value unit of transfer.
///
/// `value` is the store's opaque snapshot of the key (a DUMP payload).
/// Nothing in the pipeline interprets it; it is restored byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub ttl: Ttl,
}

impl Record {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, ttl: Ttl) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ttl,
        }
    }

    /// Key rendered for logs. Keys are binary-safe, so this is lossy.
    pub fn key_display(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.key)
    }
}
