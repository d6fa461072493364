use super::headers::PartHeaders;
use std::io::{self, Write};

/// Fresh random boundary; random enough that it never occurs in part content.
pub fn generate_boundary() -> String {
    format!("msgseal{}", uuid::Uuid::new_v4().simple())
}

/// Delimiter bookkeeping for one multipart body, independent of the sink.
///
/// Kept separate from [`MultipartWriter`] so a nested body can be written into
/// the same sink as its enclosing part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    value: String,
    parts: usize,
    closed: bool,
}

impl Boundary {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            parts: 0,
            closed: false,
        }
    }

    pub fn generate() -> Self {
        Self::new(generate_boundary())
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn parts(&self) -> usize {
        self.parts
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Write the delimiter line and headers that open a new part.
    pub fn open_part<W: Write + ?Sized>(&mut self, out: &mut W, headers: &PartHeaders) -> io::Result<()> {
        if self.parts > 0 {
            out.write_all(b"\r\n")?;
        }
        write!(out, "--{}\r\n", self.value)?;
        for (name, value) in headers.iter() {
            write!(out, "{}: {}\r\n", name, value)?;
        }
        out.write_all(b"\r\n")?;
        self.parts += 1;
        Ok(())
    }

    /// Write the close delimiter.
    pub fn close<W: Write + ?Sized>(&mut self, out: &mut W) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.parts > 0 {
            out.write_all(b"\r\n")?;
        }
        write!(out, "--{}--\r\n", self.value)?;
        self.closed = true;
        Ok(())
    }
}

/// Multipart writer owning its sink. Part bodies are written through `Write`.
pub struct MultipartWriter<W> {
    out: W,
    boundary: Boundary,
}

impl<W: Write> MultipartWriter<W> {
    pub fn new(out: W, boundary: Boundary) -> Self {
        Self { out, boundary }
    }

    pub fn boundary(&self) -> &str {
        self.boundary.value()
    }

    pub fn start_part(&mut self, headers: &PartHeaders) -> io::Result<()> {
        self.boundary.open_part(&mut self.out, headers)
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.out
    }

    /// Write the close delimiter and hand back the sink.
    pub fn finish(mut self) -> io::Result<W> {
        self.boundary.close(&mut self.out)?;
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> Write for MultipartWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.out.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}
