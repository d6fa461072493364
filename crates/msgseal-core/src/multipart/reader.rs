//! Streaming RFC 2046 multipart reader.
//!
//! Part bodies are exposed as [`Read`] implementations that hand out bytes as
//! soon as they are known not to belong to the next delimiter. At most one
//! read window plus the delimiter length is buffered. Declared lengths are
//! never consulted; only delimiters end a part.

use super::headers::PartHeaders;
use super::malformed;
use crate::error::{EnvelopeError, EnvelopeResult, ErrorCode};
use std::io::{self, Read};

const READ_CHUNK: usize = 8 * 1024;

/// Many systems can deliver spurious interrupts during `read()`.
/// Retry only `Interrupted` for a bounded number of attempts.
const EINTR_RETRY_LIMIT: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Preamble,
    Body,
    AfterDelimiter,
    Finished,
}

pub struct MultipartReader<R> {
    inner: R,
    /// `CRLF--boundary`
    delimiter: Vec<u8>,
    buf: Vec<u8>,
    start: usize,
    eof: bool,
    state: State,
    max_header_bytes: usize,
}

impl<R: Read> MultipartReader<R> {
    pub fn new(inner: R, boundary: &str, max_header_bytes: usize) -> Self {
        let mut delimiter = b"\r\n--".to_vec();
        delimiter.extend_from_slice(boundary.as_bytes());
        Self {
            inner,
            delimiter,
            // Virtual line break so a delimiter at offset 0 is recognised.
            buf: b"\r\n".to_vec(),
            start: 0,
            eof: false,
            state: State::Preamble,
            max_header_bytes,
        }
    }

    /// True once the close delimiter has been consumed.
    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    /// Advance to the next part, discarding whatever is left of the current one.
    ///
    /// Returns `None` after the close delimiter.
    pub fn next_part(&mut self) -> EnvelopeResult<Option<PartHeaders>> {
        match self.state {
            State::Finished => return Ok(None),
            State::Preamble | State::Body => {
                let skipped = crate::io::drain(&mut self.body())?;
                if skipped > 0 {
                    tracing::trace!(skipped, "skipped unread part bytes");
                }
            }
            State::AfterDelimiter => {}
        }

        self.fill_at_least(2)?;
        if self.available().starts_with(b"--") {
            self.start += 2;
            self.state = State::Finished;
            return Ok(None);
        }

        // Transport padding, then the line break ending the delimiter line.
        loop {
            self.fill_at_least(1)?;
            match self.available().first() {
                Some(b' ') | Some(b'\t') => self.start += 1,
                Some(b'\r') => {
                    self.fill_at_least(2)?;
                    if self.available().get(1) != Some(&b'\n') {
                        return Err(EnvelopeError::new(
                            ErrorCode::MalformedMultipart,
                            "bare CR after boundary delimiter",
                        ));
                    }
                    self.start += 2;
                    break;
                }
                Some(b'\n') => {
                    self.start += 1;
                    break;
                }
                Some(other) => {
                    return Err(EnvelopeError::new(
                        ErrorCode::MalformedMultipart,
                        format!("unexpected byte 0x{:02x} after boundary delimiter", other),
                    ))
                }
                None => {
                    return Err(EnvelopeError::new(
                        ErrorCode::MalformedMultipart,
                        "stream ended after boundary delimiter",
                    ))
                }
            }
        }

        let headers = self.read_headers()?;
        self.state = State::Body;
        Ok(Some(headers))
    }

    /// Body of the current part.
    pub fn body(&mut self) -> PartBody<'_, R> {
        PartBody { reader: self }
    }

    fn available(&self) -> &[u8] {
        &self.buf[self.start..]
    }

    fn fill(&mut self) -> io::Result<bool> {
        if self.eof {
            return Ok(false);
        }
        if self.start > 0 {
            self.buf.drain(..self.start);
            self.start = 0;
        }
        let mut chunk = [0u8; READ_CHUNK];
        let mut retries = 0;
        let n = loop {
            match self.inner.read(&mut chunk) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    retries += 1;
                    if retries >= EINTR_RETRY_LIMIT {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        };
        if n == 0 {
            self.eof = true;
            return Ok(false);
        }
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(true)
    }

    fn fill_at_least(&mut self, n: usize) -> io::Result<()> {
        while self.available().len() < n {
            if !self.fill()? {
                break;
            }
        }
        Ok(())
    }

    fn read_headers(&mut self) -> EnvelopeResult<PartHeaders> {
        let mut lines = Vec::new();
        let mut total = 0usize;
        loop {
            let line_end = loop {
                if let Some(pos) = self.available().iter().position(|&b| b == b'\n') {
                    break pos;
                }
                if total + self.available().len() > self.max_header_bytes {
                    return Err(header_limit(self.max_header_bytes));
                }
                if !self.fill()? {
                    return Err(EnvelopeError::new(
                        ErrorCode::MalformedHeaders,
                        "stream ended inside part headers",
                    ));
                }
            };

            total += line_end + 1;
            if total > self.max_header_bytes {
                return Err(header_limit(self.max_header_bytes));
            }

            let raw = &self.available()[..line_end];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            let line = std::str::from_utf8(raw)
                .map_err(|e| {
                    EnvelopeError::new(
                        ErrorCode::MalformedHeaders,
                        format!("part header is not valid UTF-8: {}", e),
                    )
                })?
                .to_string();
            self.start += line_end + 1;

            if line.is_empty() {
                break;
            }
            lines.push(line);
        }
        PartHeaders::parse_lines(lines.iter().map(String::as_str))
    }

    fn read_body(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() || !matches!(self.state, State::Preamble | State::Body) {
            return Ok(0);
        }
        loop {
            let avail = self.available();
            if let Some(pos) = find(avail, &self.delimiter) {
                if pos == 0 {
                    self.start += self.delimiter.len();
                    self.state = State::AfterDelimiter;
                    return Ok(0);
                }
                let n = pos.min(out.len());
                out[..n].copy_from_slice(&avail[..n]);
                self.start += n;
                return Ok(n);
            }

            // Keep a tail that could still be the start of a delimiter.
            let keep = self.delimiter.len() - 1;
            if avail.len() > keep {
                let n = (avail.len() - keep).min(out.len());
                out[..n].copy_from_slice(&avail[..n]);
                self.start += n;
                return Ok(n);
            }

            if !self.fill()? {
                return Err(malformed(if self.state == State::Preamble {
                    "no boundary delimiter found"
                } else {
                    "stream ended before closing boundary"
                }));
            }
        }
    }
}

fn header_limit(max: usize) -> EnvelopeError {
    EnvelopeError::new(
        ErrorCode::LimitExceeded,
        format!("part headers exceed limit of {} bytes", max),
    )
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Reader over the body of the current part.
pub struct PartBody<'a, R> {
    reader: &'a mut MultipartReader<R>,
}

impl<R: Read> Read for PartBody<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read_body(buf)
    }
}
