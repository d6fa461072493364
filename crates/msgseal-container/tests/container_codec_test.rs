//! Archive-level behaviour of envelope containers.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use msgseal_container::{verify_container, ContainerCodec, ContainerConfig, EnvelopeContainer};
use msgseal_core::digest::SHA512_URI;
use msgseal_core::{
    decode_envelope, AlgorithmRegistry, Attachment, AttachmentBody, ContainerEntry, ContentType,
    Envelope, EnvelopeConfig, EnvelopeDecoder, ErrorCode, PartCatalog, PartName, Payload,
    SignatureData, SoapMessage, TimestampData,
};
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;

// ============================================================================
// Helpers
// ============================================================================

const MIMETYPE: &str = "application/vnd.etsi.asic-e+zip";

fn batch_envelope(attachment: &[u8]) -> Envelope {
    Envelope::builder(Payload::Soap(SoapMessage::new("<Envelope><Body/></Envelope>").unwrap()))
        .attachment(Attachment::new(
            ContentType::new("application/pdf"),
            AttachmentBody::from_bytes(attachment, 16).unwrap(),
        ))
        .unwrap()
        .signature(
            SignatureData::new(
                "<signatures/>",
                Some("<hashChainResult/>".into()),
                Some("<hashChain/>".into()),
            )
            .unwrap(),
        )
        .timestamp(
            TimestampData::new(
                vec![0x30, 0x82, 0x01, 0x00, 0xff],
                Some("<tsHashChainResult/>".into()),
                Some("<tsHashChain/>".into()),
            )
            .unwrap(),
        )
        .build()
        .unwrap()
}

fn write(container: &mut EnvelopeContainer) -> Vec<u8> {
    let catalog = PartCatalog::standard();
    let registry = AlgorithmRegistry::standard();
    let codec = ContainerCodec::new(&catalog, &registry, ContainerConfig::default()).unwrap();
    codec.write(container, Cursor::new(Vec::new())).unwrap().into_inner()
}

fn read(bytes: &[u8]) -> Result<EnvelopeContainer, msgseal_core::EnvelopeError> {
    let catalog = PartCatalog::standard();
    let registry = AlgorithmRegistry::standard();
    let codec = ContainerCodec::new(&catalog, &registry, ContainerConfig::default()).unwrap();
    codec.read(bytes)
}

/// Hand-built archive, entries written in the given order.
fn archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn codec_write(container: &mut EnvelopeContainer) -> Result<Vec<u8>, msgseal_core::EnvelopeError> {
    let catalog = PartCatalog::standard();
    let registry = AlgorithmRegistry::standard();
    let codec = ContainerCodec::new(&catalog, &registry, ContainerConfig::default()).unwrap();
    codec.write(container, Cursor::new(Vec::new())).map(Cursor::into_inner)
}

fn read_stream(bytes: &[u8]) -> Result<EnvelopeContainer, msgseal_core::EnvelopeError> {
    let catalog = PartCatalog::standard();
    let registry = AlgorithmRegistry::standard();
    let codec = ContainerCodec::new(&catalog, &registry, ContainerConfig::default()).unwrap();
    codec.read_stream(bytes)
}

fn crc32(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
        }
    }
    !crc
}

/// Stored entries with general purpose flag 3 set: the local headers carry
/// zero sizes and the real ones follow each entry in a data descriptor,
/// as streaming ZIP writers emit them.
fn descriptor_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    const DATE_1980_01_01: u16 = 0x0021;
    let mut out = Vec::new();
    let mut central = Vec::new();
    for (name, data) in entries {
        let offset = out.len() as u32;
        let crc = crc32(data);
        let size = data.len() as u32;

        out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
        for field in [20u16, 0x0008, 0, 0, DATE_1980_01_01] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        out.extend_from_slice(&[0u8; 12]);
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(data);
        out.extend_from_slice(&0x0807_4b50u32.to_le_bytes());
        for field in [crc, size, size] {
            out.extend_from_slice(&field.to_le_bytes());
        }

        central.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
        for field in [20u16, 20, 0x0008, 0, 0, DATE_1980_01_01] {
            central.extend_from_slice(&field.to_le_bytes());
        }
        for field in [crc, size, size] {
            central.extend_from_slice(&field.to_le_bytes());
        }
        for field in [name.len() as u16, 0, 0, 0, 0] {
            central.extend_from_slice(&field.to_le_bytes());
        }
        central.extend_from_slice(&0u32.to_le_bytes());
        central.extend_from_slice(&offset.to_le_bytes());
        central.extend_from_slice(name.as_bytes());
    }

    let central_offset = out.len() as u32;
    let central_size = central.len() as u32;
    out.extend_from_slice(&central);
    out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
    let count = entries.len() as u16;
    for field in [0u16, 0, count, count] {
        out.extend_from_slice(&field.to_le_bytes());
    }
    out.extend_from_slice(&central_size.to_le_bytes());
    out.extend_from_slice(&central_offset.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}

fn minimal_entries() -> Vec<(&'static str, &'static [u8])> {
    vec![
        ("mimetype", MIMETYPE.as_bytes()),
        ("message.xml", b"<Envelope/>"),
        ("META-INF/signatures.xml", b"<signatures/>"),
    ]
}

// ============================================================================
// Round trip
// ============================================================================

#[test]
fn test_batch_container_round_trip() {
    let registry = AlgorithmRegistry::standard();
    let payload = b"%PDF-1.7 attachment bytes that spill past the threshold";
    let mut envelope = batch_envelope(payload);
    let mut container =
        EnvelopeContainer::from_envelope(&mut envelope, &registry, &ContainerConfig::default()).unwrap();
    let bytes = write(&mut container);

    let restored = read(&bytes).unwrap();
    verify_container(&restored).expect("manifests regenerated on read must match the stored ones");

    assert_eq!(restored.message(), container.message());
    assert_eq!(restored.signature(), "<signatures/>");
    assert_eq!(restored.signature_hash_chain_result(), Some("<hashChainResult/>"));
    assert_eq!(restored.timestamp_hash_chain(), Some("<tsHashChain/>"));
    assert_eq!(
        restored.timestamp_token().unwrap(),
        Some(vec![0x30, 0x82, 0x01, 0x00, 0xff])
    );
    assert!(restored.is_batch_signature());
    assert!(restored.is_batch_timestamp());
    assert_eq!(restored.manifest(), container.manifest());
    assert_eq!(restored.asic_manifest(), container.asic_manifest());
    assert_eq!(
        restored.attachment_digest(),
        Some(registry.digest(SHA512_URI, payload).unwrap().as_slice()),
        "attachment is digested with the manifest algorithm while streaming"
    );
}

#[test]
fn test_mimetype_is_first_and_stored() {
    let registry = AlgorithmRegistry::standard();
    let mut envelope = batch_envelope(b"x");
    let mut container =
        EnvelopeContainer::from_envelope(&mut envelope, &registry, &ContainerConfig::default()).unwrap();
    let bytes = write(&mut container);

    assert_eq!(&bytes[0..4], b"PK\x03\x04", "archive starts with a local header");
    assert_eq!(&bytes[8..10], &[0, 0], "first entry uses the stored method");
    assert_eq!(&bytes[30..38], b"mimetype", "first entry is the mimetype");
    assert!(
        bytes.windows(MIMETYPE.len()).any(|w| w == MIMETYPE.as_bytes()),
        "mimetype content is readable without inflating"
    );
}

#[test]
fn test_non_batch_container_has_no_asic_manifest() {
    let bytes = archive(&minimal_entries());
    let container = read(&bytes).unwrap();
    assert!(!container.is_batch_signature());
    assert!(container.asic_manifest().is_none());
    assert_eq!(container.timestamp(), None);
    assert!(!container.has_attachment());
}

#[test]
fn test_decoded_rest_message_is_archived_verbatim() {
    let message = "GET /r1/EE/GOV/1/svc/x\nX-Road-Client:EE/COM/1/c\n\n";
    let mut wire = Vec::new();
    wire.extend_from_slice(b"--b1\r\nContent-Type: application/x-road-rest-request\r\n\r\n");
    wire.extend_from_slice(message.as_bytes());
    wire.extend_from_slice(b"\r\n--b1\r\nContent-Type: application/vnd.bdoc-signature\r\n\r\n");
    wire.extend_from_slice(b"<signatures/>\r\n--b1--\r\n");

    let catalog = PartCatalog::standard();
    let registry = AlgorithmRegistry::standard();
    let decoder = EnvelopeDecoder::new(&catalog, &registry, EnvelopeConfig::default()).unwrap();
    let content_type = ContentType::parse("multipart/mixed; boundary=b1").unwrap();
    let (mut envelope, signed) = decode_envelope(&decoder, &wire[..], &content_type, false).unwrap();

    let mut container =
        EnvelopeContainer::from_envelope(&mut envelope, &registry, &ContainerConfig::default()).unwrap();
    let restored = read(&write(&mut container)).unwrap();
    assert_eq!(restored.message(), message, "archived message must be the signed bytes");

    let signed_message = signed.get(&PartName::Message).unwrap();
    assert_eq!(
        registry
            .digest(&signed_message.algorithm, restored.message().as_bytes())
            .unwrap(),
        signed_message.digest
    );
}

#[test]
fn test_read_container_cannot_be_rewritten_without_attachment() {
    let registry = AlgorithmRegistry::standard();
    let mut envelope = batch_envelope(b"attachment");
    let mut container =
        EnvelopeContainer::from_envelope(&mut envelope, &registry, &ContainerConfig::default()).unwrap();
    let mut restored = read(&write(&mut container)).unwrap();
    assert!(restored.has_attachment());

    let err = codec_write(&mut restored).unwrap_err();
    assert_eq!(err.code(), ErrorCode::EncoderSequence);
}

#[test]
fn test_read_container_without_attachment_rewrites_cleanly() {
    let mut first = read(&archive(&minimal_entries())).unwrap();
    let rewritten = codec_write(&mut first).unwrap();
    let second = read(&rewritten).unwrap();
    verify_container(&second).expect("rewritten archive must carry matching manifests");
    assert_eq!(second.message(), "<Envelope/>");
}

// ============================================================================
// Reading foreign archives
// ============================================================================

#[test]
fn test_data_descriptor_archive_is_read() {
    let mut entries = minimal_entries();
    entries.push(("attachment1", b"streamed attachment"));
    let bytes = descriptor_archive(&entries);

    let container = read(&bytes).unwrap();
    assert_eq!(container.message(), "<Envelope/>");
    assert_eq!(container.signature(), "<signatures/>");
    let registry = AlgorithmRegistry::standard();
    assert_eq!(
        container.attachment_digest(),
        Some(registry.digest(SHA512_URI, b"streamed attachment").unwrap().as_slice())
    );

    assert!(
        read_stream(&bytes).is_err(),
        "the single-pass reader needs sizes in the local headers"
    );
}

#[test]
fn test_stream_reader_agrees_with_central_directory() {
    let registry = AlgorithmRegistry::standard();
    let mut envelope = batch_envelope(b"attachment");
    let mut container =
        EnvelopeContainer::from_envelope(&mut envelope, &registry, &ContainerConfig::default()).unwrap();
    let bytes = write(&mut container);

    let streamed = read_stream(&bytes).unwrap();
    let directory = read(&bytes).unwrap();
    verify_container(&streamed).unwrap();
    assert_eq!(streamed.manifest(), directory.manifest());
    assert_eq!(streamed.attachment_digest(), directory.attachment_digest());
    assert_eq!(streamed.timestamp(), directory.timestamp());
}

#[test]
fn test_missing_mimetype_is_reported_by_name() {
    let bytes = archive(&[
        ("message.xml", b"<Envelope/>"),
        ("META-INF/signatures.xml", b"<signatures/>"),
    ]);
    let err = read(&bytes).unwrap_err();
    assert_eq!(err.code(), ErrorCode::MissingMimetype);
    assert!(err.to_string().contains("mimetype"), "{}", err);
}

#[test]
fn test_signature_name_pattern_and_unknown_entries() {
    let bytes = archive(&[
        ("mimetype", MIMETYPE.as_bytes()),
        ("message.xml", b"<Envelope/>"),
        ("META-INF/README.txt", b"ignored"),
        ("META-INF/signatures0.xml", b"<signatures n=\"0\"/>"),
    ]);
    let container = read(&bytes).unwrap();
    assert_eq!(container.signature(), "<signatures n=\"0\"/>");
}

#[test]
fn test_base64_timestamp_entry_is_accepted() {
    let mut entries = minimal_entries();
    let b64 = STANDARD.encode([1u8, 2, 3]);
    entries.push(("META-INF/timestamp.tst.b64", b64.as_bytes()));
    let container = read(&archive(&entries)).unwrap();
    assert_eq!(container.timestamp_token().unwrap(), Some(vec![1, 2, 3]));
}

#[test]
fn test_second_attachment_is_rejected() {
    let mut entries = minimal_entries();
    entries.push(("attachment1", b"one"));
    entries.push(("attachment2", b"two"));
    let err = read(&archive(&entries)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::AttachmentLimit);
}

#[test]
fn test_half_hash_chain_pair_on_read() {
    let mut entries = minimal_entries();
    entries.push(("META-INF/hashchainresult.xml", b"<hashChainResult/>"));
    let err = read(&archive(&entries)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::MissingSignatureHashChain);
}

#[test]
fn test_garbage_is_an_archive_error() {
    let err = read(b"PK\x03\x04 definitely not a zip entry").unwrap_err();
    assert!(
        matches!(err.code(), ErrorCode::Archive | ErrorCode::Io),
        "unexpected code {:?}",
        err.code()
    );
}

// ============================================================================
// Integrity
// ============================================================================

#[test]
fn test_tampered_manifest_fails_verification() {
    let registry = AlgorithmRegistry::standard();
    let mut envelope = batch_envelope(b"data");
    let container =
        EnvelopeContainer::from_envelope(&mut envelope, &registry, &ContainerConfig::default()).unwrap();

    let mut entries = vec![
        ("mimetype", MIMETYPE.to_string()),
        ("message.xml", container.message().to_string()),
        ("META-INF/signatures.xml", container.signature().to_string()),
        ("META-INF/manifest.xml", container.manifest().replace("message.xml", "other.xml")),
    ];
    entries.push(("META-INF/hashchainresult.xml", "<hashChainResult/>".into()));
    entries.push(("META-INF/hashchain.xml", "<hashChain/>".into()));
    let raw: Vec<(&str, &[u8])> = entries.iter().map(|(n, v)| (*n, v.as_bytes())).collect();

    let restored = read(&archive(&raw)).unwrap();
    let err = verify_container(&restored).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidMessage);
    assert!(err.message.contains("META-INF/manifest.xml"), "{}", err);
}

#[test]
fn test_from_envelope_rejects_two_attachments() {
    let registry = AlgorithmRegistry::standard();
    let body = || AttachmentBody::from_bytes(b"a", 16).unwrap();
    let mut envelope = Envelope::builder(Payload::Soap(SoapMessage::new("<Envelope/>").unwrap()))
        .attachment(Attachment::new(ContentType::new("text/plain"), body()))
        .unwrap()
        .attachment(Attachment::new(ContentType::new("text/plain"), body()))
        .unwrap()
        .signature(SignatureData::single("<signatures/>"))
        .build()
        .unwrap();
    let err = EnvelopeContainer::from_envelope(&mut envelope, &registry, &ContainerConfig::default())
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::AttachmentLimit);
}

#[test]
fn test_from_entries_normalizes_base64_timestamp() {
    let registry = AlgorithmRegistry::standard();
    let entries = BTreeMap::from([
        (ContainerEntry::Mimetype, MIMETYPE.to_string()),
        (ContainerEntry::Message, "<Envelope/>".to_string()),
        (ContainerEntry::Signature, "<signatures/>".to_string()),
        (ContainerEntry::TimestampBase64, STANDARD.encode(b"tst")),
    ]);
    let container = EnvelopeContainer::from_entries(
        entries,
        None,
        chrono::Utc::now(),
        &registry,
        &ContainerConfig::default(),
    )
    .unwrap();
    assert_eq!(container.timestamp_token().unwrap(), Some(b"tst".to_vec()));
    assert!(container.manifest().contains("META-INF/timestamp.tst\""));
}
