//! Derived manifests: the OpenDocument file manifest and the ASiC manifest
//! that anchors a batch timestamp.
//!
//! Output depends only on the input entries, so regenerating a manifest from
//! the entries of a stored container reproduces it byte for byte.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use msgseal_core::catalog::mime;
use msgseal_core::{AlgorithmRegistry, ContainerEntry, EnvelopeResult};

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="no" ?>"#;
const MANIFEST_NS: &str = "urn:oasis:names:tc:opendocument:xmlns:manifest:1.0";
const ASIC_NS: &str = "http://uri.etsi.org/02918/v1.2.1#";
const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// Media type recorded for an entry in the file manifest.
fn media_type(entry: ContainerEntry) -> &'static str {
    match entry {
        ContainerEntry::Timestamp | ContainerEntry::TimestampBase64 => mime::TIMESTAMP_TOKEN,
        ContainerEntry::Attachment => mime::OCTET_STREAM,
        _ => mime::TEXT_XML,
    }
}

/// OpenDocument manifest listing `entries` (in the given order) under the
/// container root.
pub fn file_manifest(entries: &[ContainerEntry]) -> String {
    let mut xml = String::new();
    xml.push_str(XML_DECL);
    xml.push('\n');
    xml.push_str(&format!(
        "<manifest:manifest xmlns:manifest=\"{}\" manifest:version=\"1.2\">\n",
        MANIFEST_NS
    ));
    xml.push_str(&format!(
        "<manifest:file-entry manifest:full-path=\"/\" manifest:media-type=\"{}\"/>\n",
        mime::ASIC_CONTAINER
    ));
    for entry in entries {
        xml.push_str(&format!(
            "<manifest:file-entry manifest:full-path=\"{}\" manifest:media-type=\"{}\"/>\n",
            entry.name(),
            media_type(*entry)
        ));
    }
    xml.push_str("</manifest:manifest>\n");
    xml
}

/// ASiC manifest binding the timestamp token to the timestamp hash-chain result.
pub fn asic_manifest(
    registry: &AlgorithmRegistry,
    algorithm: &str,
    timestamp_hash_chain_result: &str,
) -> EnvelopeResult<String> {
    let digest = registry.digest(algorithm, timestamp_hash_chain_result.as_bytes())?;
    let mut xml = String::new();
    xml.push_str(XML_DECL);
    xml.push('\n');
    xml.push_str(&format!(
        "<asic:ASiCManifest xmlns:asic=\"{}\" xmlns:ds=\"{}\">\n",
        ASIC_NS, DSIG_NS
    ));
    xml.push_str(&format!(
        "<asic:SigReference URI=\"{}\" MimeType=\"{}\"/>\n",
        ContainerEntry::Timestamp.name(),
        mime::TIMESTAMP_TOKEN
    ));
    xml.push_str(&format!(
        "<asic:DataObjectReference URI=\"{}\" MimeType=\"{}\">\n",
        ContainerEntry::TimestampHashChainResult.name(),
        mime::TEXT_XML
    ));
    xml.push_str(&format!("<ds:DigestMethod Algorithm=\"{}\"/>\n", algorithm));
    xml.push_str(&format!("<ds:DigestValue>{}</ds:DigestValue>\n", STANDARD.encode(digest)));
    xml.push_str("</asic:DataObjectReference>\n");
    xml.push_str("</asic:ASiCManifest>\n");
    Ok(xml)
}
