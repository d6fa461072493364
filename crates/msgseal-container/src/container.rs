//! The at-rest form of one envelope.
//!
//! Entries are text-keyed by [`ContainerEntry`]; the binary timestamp token
//! is held as base64 text. The file manifest and the ASiC manifest are
//! always derived from the entries at construction time, never taken from
//! the caller.

use crate::config::ContainerConfig;
use crate::manifest;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use msgseal_core::catalog::mime;
use msgseal_core::{
    AlgorithmRegistry, AttachmentBody, ContainerEntry, Envelope, EnvelopeError, EnvelopeResult,
    ErrorCode,
};
use std::collections::BTreeMap;
use std::io;
use std::sync::OnceLock;

/// Entries a caller may supply. Manifests are derived and mimetype is fixed.
const INPUT_ENTRIES: &[ContainerEntry] = &[
    ContainerEntry::Mimetype,
    ContainerEntry::Message,
    ContainerEntry::Signature,
    ContainerEntry::SignatureHashChainResult,
    ContainerEntry::SignatureHashChain,
    ContainerEntry::Timestamp,
    ContainerEntry::TimestampHashChainResult,
    ContainerEntry::TimestampHashChain,
];

#[derive(Debug)]
pub struct EnvelopeContainer {
    entries: BTreeMap<ContainerEntry, String>,
    /// Manifests found in a stored archive, kept for verification only.
    stored_manifests: BTreeMap<ContainerEntry, String>,
    manifest: String,
    asic_manifest: Option<String>,
    attachment: Option<AttachmentBody>,
    attachment_digest: Option<Vec<u8>>,
    creation_time: DateTime<Utc>,
    timestamp_fallback: OnceLock<Option<String>>,
}

impl EnvelopeContainer {
    /// Build a container from a finalized envelope.
    ///
    /// The envelope must be signed. At most one attachment (or the REST
    /// body) is carried; its bytes are copied into a new spooled buffer.
    pub fn from_envelope(
        envelope: &mut Envelope,
        registry: &AlgorithmRegistry,
        config: &ContainerConfig,
    ) -> EnvelopeResult<Self> {
        let signature = envelope.signature().cloned().ok_or_else(|| {
            EnvelopeError::new(ErrorCode::MissingSignature, "envelope has no signature")
        })?;
        if envelope.attachments().len() > 1 {
            return Err(EnvelopeError::new(
                ErrorCode::AttachmentLimit,
                format!(
                    "a container carries at most one attachment, envelope has {}",
                    envelope.attachments().len()
                ),
            ));
        }

        let message = String::from_utf8(envelope.payload().to_bytes()).map_err(|e| {
            EnvelopeError::new(
                ErrorCode::MalformedPayload,
                format!("message is not valid UTF-8: {}", e.utf8_error()),
            )
        })?;

        let mut entries = BTreeMap::new();
        entries.insert(ContainerEntry::Mimetype, mime::ASIC_CONTAINER.to_string());
        entries.insert(ContainerEntry::Message, message);
        entries.insert(ContainerEntry::Signature, signature.signature_xml().to_string());
        if let (Some(result), Some(chain)) = (signature.hash_chain_result(), signature.hash_chain()) {
            entries.insert(ContainerEntry::SignatureHashChainResult, result.to_string());
            entries.insert(ContainerEntry::SignatureHashChain, chain.to_string());
        }
        if let Some(timestamp) = envelope.timestamp() {
            entries.insert(ContainerEntry::Timestamp, STANDARD.encode(timestamp.token()));
            if let (Some(result), Some(chain)) = (timestamp.hash_chain_result(), timestamp.hash_chain()) {
                entries.insert(ContainerEntry::TimestampHashChainResult, result.to_string());
                entries.insert(ContainerEntry::TimestampHashChain, chain.to_string());
            }
        }

        let attachment = match envelope.primary_attachment_mut() {
            Some(body) => Some(AttachmentBody::from_reader(body.reader()?, config.spool_threshold)?),
            None => None,
        };

        Self::build(
            entries,
            BTreeMap::new(),
            attachment,
            None,
            envelope.creation_time(),
            registry,
            config,
        )
    }

    /// Build a container from caller-supplied entries.
    ///
    /// The timestamp is expected as base64 text. Manifest entries in
    /// `entries` are ignored: manifests are always regenerated.
    pub fn from_entries(
        entries: BTreeMap<ContainerEntry, String>,
        attachment: Option<AttachmentBody>,
        creation_time: DateTime<Utc>,
        registry: &AlgorithmRegistry,
        config: &ContainerConfig,
    ) -> EnvelopeResult<Self> {
        Self::build(
            entries,
            BTreeMap::new(),
            attachment,
            None,
            creation_time,
            registry,
            config,
        )
    }

    /// Build from entries read out of an archive whose attachment was only digested.
    pub(crate) fn from_stored(
        entries: BTreeMap<ContainerEntry, String>,
        stored_manifests: BTreeMap<ContainerEntry, String>,
        attachment_digest: Option<Vec<u8>>,
        registry: &AlgorithmRegistry,
        config: &ContainerConfig,
    ) -> EnvelopeResult<Self> {
        Self::build(
            entries,
            stored_manifests,
            None,
            attachment_digest,
            Utc::now(),
            registry,
            config,
        )
    }

    fn build(
        supplied: BTreeMap<ContainerEntry, String>,
        stored_manifests: BTreeMap<ContainerEntry, String>,
        attachment: Option<AttachmentBody>,
        attachment_digest: Option<Vec<u8>>,
        creation_time: DateTime<Utc>,
        registry: &AlgorithmRegistry,
        config: &ContainerConfig,
    ) -> EnvelopeResult<Self> {
        let mut entries = BTreeMap::new();
        for (entry, value) in supplied {
            match entry {
                ContainerEntry::TimestampBase64 => {
                    entries.entry(ContainerEntry::Timestamp).or_insert(value);
                }
                e if INPUT_ENTRIES.contains(&e) => {
                    entries.insert(e, value);
                }
                other => {
                    tracing::debug!(entry = ?other, "ignoring supplied derived entry");
                }
            }
        }

        let has_attachment = attachment.is_some() || attachment_digest.is_some();
        let mut listed: Vec<ContainerEntry> = entries
            .keys()
            .copied()
            .filter(|e| *e != ContainerEntry::Mimetype)
            .collect();
        if has_attachment {
            listed.push(ContainerEntry::Attachment);
        }
        let manifest = manifest::file_manifest(&listed);
        let asic_manifest = match entries.get(&ContainerEntry::TimestampHashChainResult) {
            Some(result) => Some(manifest::asic_manifest(
                registry,
                &config.manifest_digest_algorithm,
                result,
            )?),
            None => None,
        };

        let container = Self {
            entries,
            stored_manifests,
            manifest,
            asic_manifest,
            attachment,
            attachment_digest,
            creation_time,
            timestamp_fallback: OnceLock::new(),
        };
        // Dropping a rejected container releases its spooled attachment.
        if let Err(err) = container.validate() {
            tracing::warn!(code = %err.code(), error = %err, "container rejected");
            return Err(err);
        }
        Ok(container)
    }

    /// Re-check every required entry. Each violation names its entry.
    fn validate(&self) -> EnvelopeResult<()> {
        let mimetype = self.entry(ContainerEntry::Mimetype);
        match mimetype {
            None => return Err(missing(ErrorCode::MissingMimetype, ContainerEntry::Mimetype)),
            Some(value) if value != mime::ASIC_CONTAINER => {
                return Err(EnvelopeError::new(
                    ErrorCode::InvalidContentType,
                    format!(
                        "mimetype entry is {:?}, expected '{}'",
                        value,
                        mime::ASIC_CONTAINER
                    ),
                ));
            }
            Some(_) => {}
        }
        if self.entry(ContainerEntry::Message).is_none() {
            return Err(missing(ErrorCode::MissingMessage, ContainerEntry::Message));
        }
        if self.entry(ContainerEntry::Signature).is_none() {
            return Err(missing(ErrorCode::MissingSignature, ContainerEntry::Signature));
        }
        check_pair(
            self.entry(ContainerEntry::SignatureHashChainResult),
            self.entry(ContainerEntry::SignatureHashChain),
            (ErrorCode::MissingSignatureHashChainResult, ContainerEntry::SignatureHashChainResult),
            (ErrorCode::MissingSignatureHashChain, ContainerEntry::SignatureHashChain),
        )?;
        check_pair(
            self.entry(ContainerEntry::TimestampHashChainResult),
            self.entry(ContainerEntry::TimestampHashChain),
            (ErrorCode::MissingTimestampHashChainResult, ContainerEntry::TimestampHashChainResult),
            (ErrorCode::MissingTimestampHashChain, ContainerEntry::TimestampHashChain),
        )?;
        if self.manifest.trim().is_empty() {
            return Err(missing(ErrorCode::MissingManifest, ContainerEntry::Manifest));
        }
        let asic_blank = self
            .asic_manifest
            .as_deref()
            .map(|m| m.trim().is_empty())
            .unwrap_or(true);
        if self.entry(ContainerEntry::TimestampHashChain).is_some() && asic_blank {
            return Err(missing(ErrorCode::MissingAsicManifest, ContainerEntry::AsicManifest));
        }
        Ok(())
    }

    /// Non-blank value of an entry.
    fn entry(&self, entry: ContainerEntry) -> Option<&str> {
        self.entries
            .get(&entry)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn mimetype(&self) -> &str {
        self.entry(ContainerEntry::Mimetype).unwrap_or_default()
    }

    pub fn message(&self) -> &str {
        self.entry(ContainerEntry::Message).unwrap_or_default()
    }

    pub fn signature(&self) -> &str {
        self.entry(ContainerEntry::Signature).unwrap_or_default()
    }

    pub fn signature_hash_chain_result(&self) -> Option<&str> {
        self.entry(ContainerEntry::SignatureHashChainResult)
    }

    pub fn signature_hash_chain(&self) -> Option<&str> {
        self.entry(ContainerEntry::SignatureHashChain)
    }

    /// Base64 timestamp token. Without a timestamp entry, the token
    /// embedded in the signature document is used; that lookup runs once,
    /// on first access.
    pub fn timestamp(&self) -> Option<&str> {
        if let Some(stored) = self.entry(ContainerEntry::Timestamp) {
            return Some(stored);
        }
        self.timestamp_fallback
            .get_or_init(|| embedded_timestamp(self.signature()))
            .as_deref()
    }

    /// Decoded timestamp token.
    pub fn timestamp_token(&self) -> EnvelopeResult<Option<Vec<u8>>> {
        self.timestamp()
            .map(|b64| {
                STANDARD.decode(b64.trim()).map_err(|e| {
                    EnvelopeError::new(
                        ErrorCode::MalformedPayload,
                        format!("timestamp is not valid base64: {}", e),
                    )
                })
            })
            .transpose()
    }

    pub fn timestamp_hash_chain_result(&self) -> Option<&str> {
        self.entry(ContainerEntry::TimestampHashChainResult)
    }

    pub fn timestamp_hash_chain(&self) -> Option<&str> {
        self.entry(ContainerEntry::TimestampHashChain)
    }

    pub fn manifest(&self) -> &str {
        &self.manifest
    }

    pub fn asic_manifest(&self) -> Option<&str> {
        self.asic_manifest.as_deref()
    }

    /// Manifest as found in the archive this container was read from.
    pub fn stored_manifest(&self, entry: ContainerEntry) -> Option<&str> {
        self.stored_manifests.get(&entry).map(String::as_str)
    }

    /// Digest of the attachment, set only for containers read from an archive.
    pub fn attachment_digest(&self) -> Option<&[u8]> {
        self.attachment_digest.as_deref()
    }

    pub fn has_attachment(&self) -> bool {
        self.attachment.is_some() || self.attachment_digest.is_some()
    }

    pub(crate) fn attachment_mut(&mut self) -> Option<&mut AttachmentBody> {
        self.attachment.as_mut()
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    /// The signature was produced for a batch and is proven through the hash chain.
    pub fn is_batch_signature(&self) -> bool {
        self.signature_hash_chain_result().is_some()
    }

    pub fn is_batch_timestamp(&self) -> bool {
        self.timestamp_hash_chain_result().is_some()
    }

    /// Stored text of an entry, derived manifests included. The timestamp
    /// is returned as stored (base64) without the signature fallback.
    pub fn text(&self, entry: ContainerEntry) -> Option<&str> {
        match entry {
            ContainerEntry::Manifest => Some(&self.manifest),
            ContainerEntry::AsicManifest => self.asic_manifest.as_deref(),
            other => self.entry(other),
        }
    }

    /// Copy of the raw attachment, if one is held.
    pub fn attachment_bytes(&mut self) -> io::Result<Option<Vec<u8>>> {
        self.attachment.as_mut().map(AttachmentBody::to_vec).transpose()
    }
}

fn missing(code: ErrorCode, entry: ContainerEntry) -> EnvelopeError {
    EnvelopeError::new(code, format!("container entry '{}' is missing or empty", entry.name()))
}

fn check_pair(
    result: Option<&str>,
    chain: Option<&str>,
    result_err: (ErrorCode, ContainerEntry),
    chain_err: (ErrorCode, ContainerEntry),
) -> EnvelopeResult<()> {
    match (result, chain) {
        (Some(_), None) => Err(missing(chain_err.0, chain_err.1)),
        (None, Some(_)) => Err(missing(result_err.0, result_err.1)),
        _ => Ok(()),
    }
}

/// Text of the first `EncapsulatedTimeStamp` element, any namespace prefix.
fn embedded_timestamp(signature_xml: &str) -> Option<String> {
    const LOCAL: &str = "EncapsulatedTimeStamp";
    let mut rest = signature_xml;
    while let Some(open) = rest.find('<') {
        let after = &rest[open + 1..];
        let tag_end = after.find('>')?;
        let tag = &after[..tag_end];
        let name = tag.split_whitespace().next().unwrap_or_default();
        let local = name.rsplit(':').next().unwrap_or(name);
        if local == LOCAL && !tag.starts_with('/') && !tag.ends_with('/') {
            let body = &after[tag_end + 1..];
            let end = body.find(&format!("</{}>", name))?;
            let value: String = body[..end].chars().filter(|c| !c.is_whitespace()).collect();
            return (!value.is_empty()).then_some(value);
        }
        rest = &after[tag_end + 1..];
    }
    None
}
