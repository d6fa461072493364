//! Digest accumulators and the digest-algorithm registry.
//!
//! Every part of an envelope is digested while it streams through, so the
//! additional memory is constant no matter how large an attachment is.
//! Algorithms are identified by strings (XML-DSig URIs or short names) and
//! resolved at runtime through an [`AlgorithmRegistry`].

use crate::error::{EnvelopeError, EnvelopeResult, ErrorCode};
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::sync::Arc;

pub const SHA256_URI: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
pub const SHA384_URI: &str = "http://www.w3.org/2001/04/xmldsig-more#sha384";
pub const SHA512_URI: &str = "http://www.w3.org/2001/04/xmlenc#sha512";

/// An incremental hash computation.
pub trait PartHasher: Send {
    fn update(&mut self, data: &[u8]);
    fn finalize(self: Box<Self>) -> Vec<u8>;
}

/// Creates fresh hashers for one algorithm.
pub trait HasherFactory: Send + Sync {
    fn create(&self) -> Box<dyn PartHasher>;
}

struct Sha2Hasher<D>(D);

impl<D: Digest + Send> PartHasher for Sha2Hasher<D> {
    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.0, data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.0.finalize().to_vec()
    }
}

struct Sha2Factory<D>(std::marker::PhantomData<fn() -> D>);

impl<D: Digest + Send + 'static> HasherFactory for Sha2Factory<D> {
    fn create(&self) -> Box<dyn PartHasher> {
        Box::new(Sha2Hasher(D::new()))
    }
}

fn sha2_factory<D: Digest + Send + 'static>() -> Arc<dyn HasherFactory> {
    Arc::new(Sha2Factory::<D>(std::marker::PhantomData))
}

/// Immutable mapping from algorithm identifier to hasher factory.
///
/// Built once and passed by reference to decoders, encoders and containers;
/// there is no process-wide registry.
#[derive(Clone)]
pub struct AlgorithmRegistry {
    factories: BTreeMap<String, Arc<dyn HasherFactory>>,
}

impl std::fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgorithmRegistry")
            .field("algorithms", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl AlgorithmRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// SHA-2 family under both URI and short names.
    pub fn standard() -> Self {
        Self::empty()
            .with(SHA256_URI, sha2_factory::<Sha256>())
            .with("SHA-256", sha2_factory::<Sha256>())
            .with(SHA384_URI, sha2_factory::<Sha384>())
            .with("SHA-384", sha2_factory::<Sha384>())
            .with(SHA512_URI, sha2_factory::<Sha512>())
            .with("SHA-512", sha2_factory::<Sha512>())
    }

    /// Register an additional algorithm (returns a new registry value).
    pub fn with(mut self, id: impl Into<String>, factory: Arc<dyn HasherFactory>) -> Self {
        self.factories.insert(id.into(), factory);
        self
    }

    pub fn supports(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Resolve an algorithm. Unknown identifiers are a construction error.
    pub fn hasher(&self, id: &str) -> EnvelopeResult<Box<dyn PartHasher>> {
        self.factories
            .get(id)
            .map(|f| f.create())
            .ok_or_else(|| {
                EnvelopeError::new(
                    ErrorCode::UnsupportedAlgorithm,
                    format!("unsupported digest algorithm '{}'", id),
                )
            })
    }

    /// One-shot digest of an in-memory value.
    pub fn digest(&self, id: &str, data: &[u8]) -> EnvelopeResult<Vec<u8>> {
        let mut hasher = self.hasher(id)?;
        hasher.update(data);
        Ok(hasher.finalize())
    }
}

/// Reader that digests every byte passing through it.
pub struct DigestingReader<R> {
    inner: R,
    hasher: Box<dyn PartHasher>,
    bytes: u64,
}

impl<R: Read> DigestingReader<R> {
    pub fn new(inner: R, hasher: Box<dyn PartHasher>) -> Self {
        Self {
            inner,
            hasher,
            bytes: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes
    }

    /// Digest of everything read so far.
    pub fn finish(self) -> Vec<u8> {
        self.hasher.finalize()
    }
}

impl<R: Read> Read for DigestingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }
}

/// Writer that digests every byte passing through it.
pub struct DigestingWriter<W> {
    inner: W,
    hasher: Box<dyn PartHasher>,
    bytes: u64,
}

impl<W: Write> DigestingWriter<W> {
    pub fn new(inner: W, hasher: Box<dyn PartHasher>) -> Self {
        Self {
            inner,
            hasher,
            bytes: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    /// Digest of everything written, plus the inner writer back.
    pub fn finish(self) -> (W, Vec<u8>) {
        (self.inner, self.hasher.finalize())
    }
}

impl<W: Write> Write for DigestingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
