//! Small I/O adapters shared by the decoder, encoder and container codec.

use crate::error::{EnvelopeError, EnvelopeResult, ErrorCode};
use std::io::{self, Read};

/// Tag carried by I/O errors raised when a bounded read overflows.
pub const LIMIT_TAG: &str = "LimitExceeded";

/// A reader that limits the total number of bytes read and fails explicitly on overflow.
///
/// Unlike [`Read::take`], overflowing is an error rather than a silent EOF, so a
/// truncated part can never be mistaken for a complete one.
pub struct BoundedReader<R> {
    inner: R,
    limit: u64,
    read: u64,
    what: &'static str,
}

impl<R: Read> BoundedReader<R> {
    pub fn new(inner: R, limit: u64, what: &'static str) -> Self {
        Self {
            inner,
            limit,
            read: 0,
            what,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for BoundedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.read >= self.limit {
            // Only an error if there is actually more data.
            let mut probe = [0u8; 1];
            return match self.inner.read(&mut probe)? {
                0 => Ok(0),
                _ => Err(io::Error::other(format!(
                    "{}: {} exceeded limit of {} bytes",
                    LIMIT_TAG, self.what, self.limit
                ))),
            };
        }

        let max_to_read = (self.limit - self.read).min(buf.len() as u64) as usize;
        let n = self.inner.read(&mut buf[..max_to_read])?;
        self.read += n as u64;
        Ok(n)
    }
}

/// Read a whole part into memory, bounded by `limit`.
pub fn read_bytes_bounded<R: Read>(
    reader: R,
    limit: u64,
    what: &'static str,
) -> EnvelopeResult<Vec<u8>> {
    let mut out = Vec::new();
    BoundedReader::new(reader, limit, what)
        .read_to_end(&mut out)
        .map_err(|e| EnvelopeError::from(e).with_context(what))?;
    Ok(out)
}

/// Read a whole text part into memory, bounded by `limit`; the part must be UTF-8.
pub fn read_text_bounded<R: Read>(
    reader: R,
    limit: u64,
    what: &'static str,
) -> EnvelopeResult<String> {
    let bytes = read_bytes_bounded(reader, limit, what)?;
    String::from_utf8(bytes).map_err(|e| {
        EnvelopeError::new(
            ErrorCode::MalformedPayload,
            format!("{} is not valid UTF-8: {}", what, e.utf8_error()),
        )
    })
}

/// Consume and discard the rest of a reader.
pub fn drain<R: Read + ?Sized>(reader: &mut R) -> io::Result<u64> {
    io::copy(reader, &mut io::sink())
}
