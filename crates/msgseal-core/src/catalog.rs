//! Part Catalog: the fixed vocabulary of wire parts, logical part names and
//! container entries.
//!
//! The catalog is an immutable value handed to decoders, encoders and
//! containers. Tests may build catalogs with extra content types without
//! affecting each other.

use crate::content_type::ContentType;
use std::collections::BTreeMap;

pub mod mime {
    pub const OCSP_RESPONSE: &str = "application/ocsp-response";
    pub const TEXT_XML: &str = "text/xml";
    pub const XOP_XML: &str = "application/xop+xml";
    pub const REST_REQUEST: &str = "application/x-road-rest-request";
    pub const REST_RESPONSE: &str = "application/x-road-rest-response";
    pub const REST_BODY: &str = "application/x-road-rest-body";
    pub const MULTIPART_MIXED: &str = "multipart/mixed";
    pub const HASH_CHAIN_RESULT: &str = "application/x-road-hash-chain-result";
    pub const HASH_CHAIN: &str = "application/x-road-hash-chain";
    pub const SIGNATURE_BDOC: &str = "application/vnd.bdoc-signature";
    pub const ASIC_CONTAINER: &str = "application/vnd.etsi.asic-e+zip";
    pub const TIMESTAMP_TOKEN: &str = "application/vnd.etsi.timestamp-token";
    pub const OCTET_STREAM: &str = "application/octet-stream";
}

/// Kinds of top-level parts that can appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WirePart {
    OcspResponse,
    /// Plain XML: a SOAP payload at the payload position, a fault at the signature position.
    Xml,
    XopPayload,
    RestRequest,
    RestResponse,
    RestBody,
    /// Nested `multipart/mixed` holding the attachments.
    Attachments,
    HashChainResult,
    HashChain,
    Signature,
}

impl WirePart {
    pub fn is_payload(self) -> bool {
        matches!(
            self,
            WirePart::Xml | WirePart::XopPayload | WirePart::RestRequest | WirePart::RestResponse
        )
    }
}

/// Logical part names used when recording digests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PartName {
    Message,
    Signature,
    SignatureHashChain,
    SignatureHashChainResult,
    Timestamp,
    TimestampHashChain,
    TimestampHashChainResult,
    /// 1-based, shared by the REST body and the attachments.
    Attachment(usize),
    Manifest,
    AsicManifest,
    Mimetype,
}

impl PartName {
    pub fn as_string(&self) -> String {
        match self {
            PartName::Message => "message".into(),
            PartName::Signature => "signature".into(),
            PartName::SignatureHashChain => "signature-hash-chain".into(),
            PartName::SignatureHashChainResult => "signature-hash-chain-result".into(),
            PartName::Timestamp => "timestamp".into(),
            PartName::TimestampHashChain => "timestamp-hash-chain".into(),
            PartName::TimestampHashChainResult => "timestamp-hash-chain-result".into(),
            PartName::Attachment(n) => format!("attachment-{}", n),
            PartName::Manifest => "manifest".into(),
            PartName::AsicManifest => "asic-manifest".into(),
            PartName::Mimetype => "mimetype".into(),
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "message" => PartName::Message,
            "signature" => PartName::Signature,
            "signature-hash-chain" => PartName::SignatureHashChain,
            "signature-hash-chain-result" => PartName::SignatureHashChainResult,
            "timestamp" => PartName::Timestamp,
            "timestamp-hash-chain" => PartName::TimestampHashChain,
            "timestamp-hash-chain-result" => PartName::TimestampHashChainResult,
            "manifest" => PartName::Manifest,
            "asic-manifest" => PartName::AsicManifest,
            "mimetype" => PartName::Mimetype,
            other => {
                let n: usize = other.strip_prefix("attachment-")?.parse().ok()?;
                if n == 0 {
                    return None;
                }
                PartName::Attachment(n)
            }
        })
    }
}

impl std::fmt::Display for PartName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_string())
    }
}

/// Well-known entries of the archived container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContainerEntry {
    Mimetype,
    Message,
    Signature,
    SignatureHashChainResult,
    SignatureHashChain,
    Timestamp,
    /// Base64 text form of the timestamp token (accepted on read only).
    TimestampBase64,
    TimestampHashChainResult,
    TimestampHashChain,
    Manifest,
    AsicManifest,
    Attachment,
}

impl ContainerEntry {
    /// Static description; `CONTAINER_ENTRIES` is laid out in declaration order.
    pub fn spec(self) -> &'static EntrySpec {
        &CONTAINER_ENTRIES[self as usize]
    }

    /// Name written to the archive.
    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn part_name(self) -> PartName {
        match self {
            ContainerEntry::Mimetype => PartName::Mimetype,
            ContainerEntry::Message => PartName::Message,
            ContainerEntry::Signature => PartName::Signature,
            ContainerEntry::SignatureHashChainResult => PartName::SignatureHashChainResult,
            ContainerEntry::SignatureHashChain => PartName::SignatureHashChain,
            ContainerEntry::Timestamp | ContainerEntry::TimestampBase64 => PartName::Timestamp,
            ContainerEntry::TimestampHashChainResult => PartName::TimestampHashChainResult,
            ContainerEntry::TimestampHashChain => PartName::TimestampHashChain,
            ContainerEntry::Manifest => PartName::Manifest,
            ContainerEntry::AsicManifest => PartName::AsicManifest,
            ContainerEntry::Attachment => PartName::Attachment(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryMatcher {
    /// Case-insensitive exact name.
    Exact,
    /// `META-INF/*signatures*.xml`, case-insensitive.
    SignatureFile,
    /// Any top-level name starting with `attachment`.
    AttachmentPrefix,
}

/// Static description of one container entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntrySpec {
    pub entry: ContainerEntry,
    /// Name written to the archive.
    pub name: &'static str,
    pub binary: bool,
    pub mandatory: bool,
    matcher: EntryMatcher,
}

impl EntrySpec {
    const fn new(
        entry: ContainerEntry,
        name: &'static str,
        binary: bool,
        mandatory: bool,
        matcher: EntryMatcher,
    ) -> Self {
        Self {
            entry,
            name,
            binary,
            mandatory,
            matcher,
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self.matcher {
            EntryMatcher::Exact => name.eq_ignore_ascii_case(self.name),
            EntryMatcher::SignatureFile => {
                let lower = name.to_ascii_lowercase();
                lower
                    .strip_prefix("meta-inf/")
                    .and_then(|rest| rest.strip_suffix(".xml"))
                    .map(|stem| !stem.contains('/') && stem.contains("signatures"))
                    .unwrap_or(false)
            }
            EntryMatcher::AttachmentPrefix => {
                let lower = name.to_ascii_lowercase();
                lower.starts_with("attachment") && !lower.contains('/')
            }
        }
    }
}

/// Canonical container entries, in archive write order.
const CONTAINER_ENTRIES: &[EntrySpec] = &[
    EntrySpec::new(ContainerEntry::Mimetype, "mimetype", false, true, EntryMatcher::Exact),
    EntrySpec::new(ContainerEntry::Message, "message.xml", false, true, EntryMatcher::Exact),
    EntrySpec::new(
        ContainerEntry::Signature,
        "META-INF/signatures.xml",
        false,
        true,
        EntryMatcher::SignatureFile,
    ),
    EntrySpec::new(
        ContainerEntry::SignatureHashChainResult,
        "META-INF/hashchainresult.xml",
        false,
        false,
        EntryMatcher::Exact,
    ),
    EntrySpec::new(
        ContainerEntry::SignatureHashChain,
        "META-INF/hashchain.xml",
        false,
        false,
        EntryMatcher::Exact,
    ),
    EntrySpec::new(
        ContainerEntry::Timestamp,
        "META-INF/timestamp.tst",
        true,
        false,
        EntryMatcher::Exact,
    ),
    EntrySpec::new(
        ContainerEntry::TimestampBase64,
        "META-INF/timestamp.tst.b64",
        false,
        false,
        EntryMatcher::Exact,
    ),
    EntrySpec::new(
        ContainerEntry::TimestampHashChainResult,
        "META-INF/tshashchainresult.xml",
        false,
        false,
        EntryMatcher::Exact,
    ),
    EntrySpec::new(
        ContainerEntry::TimestampHashChain,
        "META-INF/tshashchain.xml",
        false,
        false,
        EntryMatcher::Exact,
    ),
    EntrySpec::new(
        ContainerEntry::Manifest,
        "META-INF/manifest.xml",
        false,
        true,
        EntryMatcher::Exact,
    ),
    EntrySpec::new(
        ContainerEntry::AsicManifest,
        "META-INF/ASiCManifest.xml",
        false,
        false,
        EntryMatcher::Exact,
    ),
    EntrySpec::new(
        ContainerEntry::Attachment,
        "attachment1",
        true,
        false,
        EntryMatcher::AttachmentPrefix,
    ),
];

/// Immutable registry of wire content types and container entries.
#[derive(Debug, Clone)]
pub struct PartCatalog {
    wire: BTreeMap<String, WirePart>,
    entries: Vec<EntrySpec>,
}

impl Default for PartCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl PartCatalog {
    pub fn standard() -> Self {
        let wire = [
            (mime::OCSP_RESPONSE, WirePart::OcspResponse),
            (mime::TEXT_XML, WirePart::Xml),
            (mime::XOP_XML, WirePart::XopPayload),
            (mime::REST_REQUEST, WirePart::RestRequest),
            (mime::REST_RESPONSE, WirePart::RestResponse),
            (mime::REST_BODY, WirePart::RestBody),
            (mime::MULTIPART_MIXED, WirePart::Attachments),
            (mime::HASH_CHAIN_RESULT, WirePart::HashChainResult),
            (mime::HASH_CHAIN, WirePart::HashChain),
            (mime::SIGNATURE_BDOC, WirePart::Signature),
        ]
        .into_iter()
        .map(|(essence, part)| (essence.to_string(), part))
        .collect();

        Self {
            wire,
            entries: CONTAINER_ENTRIES.to_vec(),
        }
    }

    /// Register an extra content type for a wire part kind.
    pub fn with_wire_type(mut self, essence: &str, part: WirePart) -> Self {
        self.wire.insert(essence.to_ascii_lowercase(), part);
        self
    }

    pub fn classify_wire(&self, content_type: &ContentType) -> Option<WirePart> {
        self.wire.get(content_type.essence()).copied()
    }

    /// Classify an archive entry name; `None` means unknown (ignorable on read).
    pub fn classify_entry(&self, name: &str) -> Option<ContainerEntry> {
        self.entries
            .iter()
            .find(|spec| spec.matches(name))
            .map(|spec| spec.entry)
    }

    /// Container entries in canonical order.
    pub fn entries(&self) -> &[EntrySpec] {
        &self.entries
    }
}
