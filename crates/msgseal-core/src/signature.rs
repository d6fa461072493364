//! Signature data, the per-part digest set and the signing-engine seam.

use crate::catalog::PartName;
use crate::error::{EnvelopeError, EnvelopeResult, ErrorCode};

/// Signature document plus the optional batch hash-chain pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureData {
    signature_xml: String,
    hash_chain_result: Option<String>,
    hash_chain: Option<String>,
}

impl SignatureData {
    /// Build signature data. The hash-chain result and hash chain must be
    /// given together or not at all.
    pub fn new(
        signature_xml: impl Into<String>,
        hash_chain_result: Option<String>,
        hash_chain: Option<String>,
    ) -> EnvelopeResult<Self> {
        check_pair("signature", &hash_chain_result, &hash_chain)?;
        Ok(Self {
            signature_xml: signature_xml.into(),
            hash_chain_result,
            hash_chain,
        })
    }

    pub fn single(signature_xml: impl Into<String>) -> Self {
        Self {
            signature_xml: signature_xml.into(),
            hash_chain_result: None,
            hash_chain: None,
        }
    }

    pub fn signature_xml(&self) -> &str {
        &self.signature_xml
    }

    pub fn hash_chain_result(&self) -> Option<&str> {
        self.hash_chain_result.as_deref()
    }

    pub fn hash_chain(&self) -> Option<&str> {
        self.hash_chain.as_deref()
    }

    /// Batch signatures are verified through the hash chain rather than
    /// directly against the message digest.
    pub fn is_batch(&self) -> bool {
        self.hash_chain_result.is_some()
    }
}

/// Timestamp token (DER) plus the optional batch hash-chain pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampData {
    token: Vec<u8>,
    hash_chain_result: Option<String>,
    hash_chain: Option<String>,
}

impl TimestampData {
    pub fn new(
        token: Vec<u8>,
        hash_chain_result: Option<String>,
        hash_chain: Option<String>,
    ) -> EnvelopeResult<Self> {
        check_pair("timestamp", &hash_chain_result, &hash_chain)?;
        Ok(Self {
            token,
            hash_chain_result,
            hash_chain,
        })
    }

    pub fn token(&self) -> &[u8] {
        &self.token
    }

    pub fn hash_chain_result(&self) -> Option<&str> {
        self.hash_chain_result.as_deref()
    }

    pub fn hash_chain(&self) -> Option<&str> {
        self.hash_chain.as_deref()
    }

    pub fn is_batch(&self) -> bool {
        self.hash_chain_result.is_some()
    }
}

fn check_pair(what: &str, result: &Option<String>, chain: &Option<String>) -> EnvelopeResult<()> {
    let blank = |v: &Option<String>| v.as_deref().map(|s| s.trim().is_empty()).unwrap_or(false);
    if blank(result) || blank(chain) {
        return Err(EnvelopeError::new(
            ErrorCode::HashChainPair,
            format!("{} hash chain values must not be blank", what),
        ));
    }
    match (result, chain) {
        (Some(_), None) => Err(EnvelopeError::new(
            ErrorCode::HashChainPair,
            format!("{} hash chain result present without hash chain", what),
        )),
        (None, Some(_)) => Err(EnvelopeError::new(
            ErrorCode::HashChainPair,
            format!("{} hash chain present without hash chain result", what),
        )),
        _ => Ok(()),
    }
}

/// One digested part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartDigest {
    pub name: PartName,
    /// Digest algorithm identifier (URI).
    pub algorithm: String,
    pub digest: Vec<u8>,
    /// Raw part bytes, kept only where the verifier needs them (the message).
    pub raw: Option<Vec<u8>>,
}

/// Ordered set of part digests produced by one decode or encode run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartDigests {
    parts: Vec<PartDigest>,
}

impl PartDigests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, digest: PartDigest) {
        tracing::debug!(
            part = %digest.name,
            algorithm = %digest.algorithm,
            digest = %hex::encode(&digest.digest),
            "recorded part digest"
        );
        self.parts.push(digest);
    }

    pub fn get(&self, name: &PartName) -> Option<&PartDigest> {
        self.parts.iter().find(|p| &p.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.parts.iter().map(|p| p.name.as_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PartDigest> {
        self.parts.iter()
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Hand the collected digests to a verification engine.
    pub fn verify_with(
        &self,
        engine: &dyn SigningEngine,
        sender: &str,
        signature: &SignatureData,
    ) -> anyhow::Result<()> {
        engine.verify(sender, self, signature)
    }
}

/// External signature creation/verification engine.
///
/// The engine sees exactly the digest set the encoder or decoder produced;
/// certificate and OCSP validation happen behind this trait.
pub trait SigningEngine {
    fn sign(&self, parts: &PartDigests) -> anyhow::Result<SignatureData>;

    fn verify(&self, sender: &str, parts: &PartDigests, signature: &SignatureData) -> anyhow::Result<()>;
}
