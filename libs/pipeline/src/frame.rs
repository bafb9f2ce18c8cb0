//! Length-prefixed record framing for file endpoints.
//!
//! A record is three byte strings written back to back in the order
//! `key, value, ttl`. Each string is an unsigned LEB128 length followed by
//! exactly that many raw bytes. `ttl` is the decimal text of
//! [`Ttl`](rump_api::Ttl). There is no record delimiter: field boundaries
//! come from the counts alone, so values may contain any byte sequence.
//!
//! ```text
//! ┌─────────┬─────┬─────────┬───────┬─────────┬─────┐
//! │ varint  │ key │ varint  │ value │ varint  │ ttl │  … next record
//! └─────────┴─────┴─────────┴───────┴─────────┴─────┘
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};

use rump_api::{Record, Ttl};

use crate::error::FrameError;

/// A `u64` never needs more than 10 LEB128 bytes.
const MAX_VARINT_LEN: usize = 10;

const READ_CHUNK: usize = 64 * 1024;

// ═══════════════════════════════════════════════════════════════
//  Varint
// ═══════════════════════════════════════════════════════════════

pub fn encode_varint(mut value: u64, buf: &mut Vec<u8>) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// `Ok(None)`: more bytes needed. `Err(())`: not a valid `u64` varint.
fn decode_varint(data: &[u8]) -> Result<Option<(u64, usize)>, ()> {
    let mut value: u64 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if i == MAX_VARINT_LEN {
            return Err(());
        }
        let low = u64::from(byte & 0x7f);
        // The 10th byte may only carry the top bit of a u64.
        if i == MAX_VARINT_LEN - 1 && low > 1 {
            return Err(());
        }
        value |= low << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    if data.len() >= MAX_VARINT_LEN { Err(()) } else { Ok(None) }
}

// ═══════════════════════════════════════════════════════════════
//  Record encode / decode
// ═══════════════════════════════════════════════════════════════

fn encode_field(data: &[u8], buf: &mut Vec<u8>) {
    encode_varint(data.len() as u64, buf);
    buf.extend_from_slice(data);
}

/// Append one framed record to `buf`.
pub fn encode_record(record: &Record, buf: &mut Vec<u8>) {
    encode_field(&record.key, buf);
    encode_field(&record.value, buf);
    encode_field(record.ttl.to_string().as_bytes(), buf);
}

/// Decode the first record in `buf`.
///
/// Returns the record and the number of bytes it occupied, or `None` if
/// `buf` does not hold a complete record yet.
pub fn decode_record(buf: &[u8]) -> Result<Option<(Record, usize)>, FrameError> {
    decode_at(buf, 0)
}

/// `base` is the stream offset of `buf[0]`, used in error reports.
fn decode_at(buf: &[u8], base: u64) -> Result<Option<(Record, usize)>, FrameError> {
    let mut pos = 0;
    let Some(key) = next_field(buf, &mut pos, base)? else {
        return Ok(None);
    };
    let Some(value) = next_field(buf, &mut pos, base)? else {
        return Ok(None);
    };
    let Some(ttl) = next_field(buf, &mut pos, base)? else {
        return Ok(None);
    };

    if key.is_empty() {
        return Err(FrameError::EmptyKey { offset: base });
    }
    let ttl = Ttl::parse(ttl).map_err(|source| FrameError::InvalidTtl { offset: base, source })?;

    Ok(Some((Record::new(key, value, ttl), pos)))
}

fn next_field<'a>(buf: &'a [u8], pos: &mut usize, base: u64) -> Result<Option<&'a [u8]>, FrameError> {
    let invalid = || FrameError::InvalidLength { offset: base + *pos as u64 };

    let (len, prefix) = match decode_varint(&buf[*pos..]) {
        Ok(Some(v)) => v,
        Ok(None) => return Ok(None),
        Err(()) => return Err(invalid()),
    };
    let len = usize::try_from(len).map_err(|_| invalid())?;
    let start = *pos + prefix;
    let end = start.checked_add(len).ok_or_else(invalid)?;
    if buf.len() < end {
        return Ok(None);
    }
    *pos = end;
    Ok(Some(&buf[start..end]))
}

// ═══════════════════════════════════════════════════════════════
//  Async stream adapters
// ═══════════════════════════════════════════════════════════════

/// Buffered frame encoder over any async writer.
pub struct FrameWriter<W: AsyncWrite + Unpin> {
    inner: BufWriter<W>,
    scratch: Vec<u8>,
    written: u64,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: BufWriter::new(inner),
            scratch: Vec::with_capacity(8192),
            written: 0,
        }
    }

    pub async fn write_record(&mut self, record: &Record) -> std::io::Result<()> {
        self.scratch.clear();
        encode_record(record, &mut self.scratch);
        self.inner.write_all(&self.scratch).await?;
        self.written += self.scratch.len() as u64;
        Ok(())
    }

    /// Push buffered bytes down to the underlying writer.
    pub async fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush().await
    }

    /// Bytes encoded so far, flushed or not.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Unwrap the writer. Unflushed bytes are lost; call [`flush`](Self::flush) first.
    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

/// Incremental frame decoder over any async reader.
pub struct FrameReader<R: AsyncRead + Unpin> {
    inner: R,
    buf: Vec<u8>,
    /// Start of the undecoded bytes in `buf`.
    pos: usize,
    /// Stream offset of `buf[pos]`.
    offset: u64,
    eof: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(READ_CHUNK),
            pos: 0,
            offset: 0,
            eof: false,
        }
    }

    /// Next record in stream order.
    ///
    /// `Ok(None)` only when the stream ends exactly between two records;
    /// ending inside a record is [`FrameError::Truncated`].
    pub async fn next_record(&mut self) -> Result<Option<Record>, FrameError> {
        loop {
            if let Some((record, consumed)) = decode_at(&self.buf[self.pos..], self.offset)? {
                self.pos += consumed;
                self.offset += consumed as u64;
                return Ok(Some(record));
            }

            if self.eof {
                if self.pos == self.buf.len() {
                    return Ok(None);
                }
                return Err(FrameError::Truncated { offset: self.offset });
            }

            // Only the partial tail moves, once per refill.
            if self.pos > 0 {
                self.buf.drain(..self.pos);
                self.pos = 0;
            }
            self.buf.reserve(READ_CHUNK);
            if self.inner.read_buf(&mut self.buf).await? == 0 {
                self.eof = true;
            }
        }
    }
}
