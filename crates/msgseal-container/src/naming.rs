//! Collision-free file names for archived containers.
//!
//! Names look like `<escaped-query-id>-<request|response>-<random>.asice`.

use crate::config::ContainerConfig;
use msgseal_core::{EnvelopeError, EnvelopeResult, ErrorCode};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

const EXTENSION: &str = "asice";
const SUFFIX_LEN: usize = 10;

/// Direction of the archived message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Request,
    Response,
}

impl ContainerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContainerKind::Request => "request",
            ContainerKind::Response => "response",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContainerNaming {
    attempts: usize,
    max_query_id_len: usize,
}

impl ContainerNaming {
    pub fn new(config: &ContainerConfig) -> Self {
        Self {
            attempts: config.naming_attempts.max(1),
            max_query_id_len: config.max_query_id_len,
        }
    }

    /// File name for one container, with a caller-chosen random suffix.
    pub fn file_name(&self, query_id: &str, kind: ContainerKind, suffix: &str) -> String {
        format!(
            "{}-{}-{}.{}",
            escape_query_id(query_id, self.max_query_id_len),
            kind.as_str(),
            suffix,
            EXTENSION
        )
    }

    /// Create a new, previously non-existent container file under `dir`.
    pub fn create_file(
        &self,
        dir: &Path,
        query_id: &str,
        kind: ContainerKind,
    ) -> EnvelopeResult<(PathBuf, File)> {
        self.create_file_with_rng(dir, query_id, kind, &mut rand::thread_rng())
    }

    /// As [`Self::create_file`], drawing suffixes from `rng`.
    pub fn create_file_with_rng<R: Rng>(
        &self,
        dir: &Path,
        query_id: &str,
        kind: ContainerKind,
        rng: &mut R,
    ) -> EnvelopeResult<(PathBuf, File)> {
        for attempt in 1..=self.attempts {
            let suffix: String = (0..SUFFIX_LEN)
                .map(|_| rng.sample(Alphanumeric) as char)
                .collect();
            let path = dir.join(self.file_name(query_id, kind, &suffix));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    tracing::debug!(path = %path.display(), attempt, "container file created");
                    return Ok((path, file));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    tracing::debug!(path = %path.display(), attempt, "container file name taken");
                }
                Err(e) => {
                    return Err(EnvelopeError::from(e)
                        .with_context(format!("creating {}", path.display())));
                }
            }
        }
        Err(EnvelopeError::new(
            ErrorCode::Io,
            format!(
                "no free container file name for query '{}' after {} attempts",
                query_id, self.attempts
            ),
        ))
    }
}

/// Percent-escape everything outside `[A-Za-z0-9._-]`, then cut to
/// `max_len` characters without splitting an escape sequence.
pub fn escape_query_id(query_id: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(query_id.len().min(max_len));
    for byte in query_id.bytes() {
        let piece = if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
            (byte as char).to_string()
        } else {
            format!("%{:02X}", byte)
        };
        if out.len() + piece.len() > max_len {
            break;
        }
        out.push_str(&piece);
    }
    out
}
