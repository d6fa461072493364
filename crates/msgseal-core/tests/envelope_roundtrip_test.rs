//! Encode/decode round trips through the full envelope model.

use msgseal_core::multipart::{Boundary, PartHeaders};
use msgseal_core::{
    decode_envelope, encode_envelope, AlgorithmRegistry, Attachment, AttachmentBody, ContentType,
    Envelope, EnvelopeConfig, EnvelopeDecoder, EnvelopeEncoder, ErrorCode, PartCatalog, PartDigests,
    PartName, Payload, RestRequest, RestResponse, SignatureData, SigningEngine, SoapMessage,
};

// ============================================================================
// Helpers
// ============================================================================

/// Signs by listing the hex digests; verification recomputes the listing.
struct ListingEngine {
    batch: bool,
}

impl ListingEngine {
    fn listing(parts: &PartDigests) -> String {
        parts
            .iter()
            .map(|p| format!("{}={}", p.name, hex::encode(&p.digest)))
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl SigningEngine for ListingEngine {
    fn sign(&self, parts: &PartDigests) -> anyhow::Result<SignatureData> {
        let xml = format!("<signature>{}</signature>", Self::listing(parts));
        if self.batch {
            Ok(SignatureData::new(
                xml,
                Some("<hashChainResult/>".into()),
                Some("<hashChain/>".into()),
            )?)
        } else {
            Ok(SignatureData::single(xml))
        }
    }

    fn verify(&self, _sender: &str, parts: &PartDigests, signature: &SignatureData) -> anyhow::Result<()> {
        let expected = format!("<signature>{}</signature>", Self::listing(parts));
        anyhow::ensure!(signature.signature_xml() == expected, "digest listing mismatch");
        Ok(())
    }
}

const THRESHOLD: usize = 32;

fn config() -> EnvelopeConfig {
    EnvelopeConfig {
        spool_threshold: THRESHOLD,
        ..Default::default()
    }
}

fn body(bytes: &[u8]) -> AttachmentBody {
    AttachmentBody::from_bytes(bytes, THRESHOLD).unwrap()
}

fn roundtrip(envelope: &mut Envelope) -> (Envelope, PartDigests, PartDigests) {
    let registry = AlgorithmRegistry::standard();
    let catalog = PartCatalog::standard();
    let encoded = encode_envelope(envelope, Vec::new(), &registry, config()).unwrap();
    let decoder = EnvelopeDecoder::new(&catalog, &registry, config()).unwrap();
    let (decoded, digests) =
        decode_envelope(&decoder, &encoded.writer[..], &encoded.content_type, false).unwrap();
    (decoded, encoded.digests, digests)
}

// ============================================================================
// Round trips
// ============================================================================

#[test]
fn test_soap_with_attachments_round_trip() {
    let large: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    let signature = SignatureData::new(
        "<signature/>",
        Some("<hashChainResult/>".into()),
        Some("<hashChain/>".into()),
    )
    .unwrap();
    let mut envelope = Envelope::builder(Payload::Soap(SoapMessage::new("<Envelope><Body/></Envelope>").unwrap()))
        .payload_headers(PartHeaders::new().with("X-Request-Id", "abc-1"))
        .unwrap()
        .attachment(Attachment::new(ContentType::new("image/png"), body(b"png bytes")))
        .unwrap()
        .attachment(
            Attachment::new(ContentType::new("application/octet-stream"), body(&large))
                .with_headers(PartHeaders::new().with("Content-Id", "<big@example>")),
        )
        .unwrap()
        .attachment(Attachment::new(ContentType::new("text/plain"), body(b"")))
        .unwrap()
        .ocsp_response(vec![0x30, 0x03, 0x0a, 0x01, 0x00])
        .signature(signature.clone())
        .build()
        .unwrap();
    assert!(envelope.attachments()[1].body.is_spilled(), "large attachment should spill");

    let (mut decoded, encoded_digests, decoded_digests) = roundtrip(&mut envelope);

    assert_eq!(decoded.payload(), envelope.payload());
    assert_eq!(decoded.payload_headers().get("x-request-id"), Some("abc-1"));
    assert_eq!(decoded.signature(), Some(&signature));
    assert!(decoded.is_batch_signature());
    assert_eq!(decoded.ocsp_responses(), envelope.ocsp_responses());
    assert_eq!(
        encoded_digests, decoded_digests,
        "encoder and decoder must agree on every digest"
    );
    assert_eq!(
        decoded_digests.names(),
        vec!["message", "attachment-1", "attachment-2", "attachment-3"]
    );

    let attachments = decoded.attachments_mut();
    assert_eq!(attachments.len(), 3);
    assert_eq!(attachments[0].content_type.essence(), "image/png");
    assert_eq!(attachments[0].body.to_vec().unwrap(), b"png bytes");
    assert_eq!(attachments[1].body.to_vec().unwrap(), large);
    assert_eq!(attachments[1].headers.get("content-id"), Some("<big@example>"));
    assert!(attachments[2].body.is_empty());
}

#[test]
fn test_rest_request_with_body_round_trip() {
    let request = RestRequest::new("PUT", "/r1/EE/GOV/123/service/items/7?dry=true")
        .with_header("Content-Type", "application/json")
        .with_header("Accept", "*/*");
    let mut envelope = Envelope::builder(Payload::RestRequest(request))
        .rest_body(body(br#"{"id":7}"#))
        .unwrap()
        .signature(SignatureData::single("<signature/>"))
        .build()
        .unwrap();

    let (mut decoded, _, digests) = roundtrip(&mut envelope);

    assert_eq!(decoded.payload(), envelope.payload());
    assert_eq!(decoded.rest_body_mut().unwrap().to_vec().unwrap(), br#"{"id":7}"#);
    assert_eq!(digests.names(), vec!["message", "attachment-1"]);
    assert!(!decoded.is_batch_signature());
}

#[test]
fn test_rest_response_without_body_round_trip() {
    let mut envelope = Envelope::builder(Payload::RestResponse(RestResponse::new(204, "No Content")))
        .signature(SignatureData::single("<signature/>"))
        .build()
        .unwrap();
    let (decoded, _, digests) = roundtrip(&mut envelope);
    assert!(decoded.rest_body().is_none());
    assert_eq!(digests.names(), vec!["message"]);
}

#[test]
fn test_relayed_rest_message_keeps_signed_bytes() {
    let message = "GET /r1/EE/GOV/1/svc/items\nX-Road-Client:EE/COM/1/c\n\nAccept:  */*\n";
    let mut wire = Vec::new();
    wire.extend_from_slice(b"--b1\r\nContent-Type: application/x-road-rest-request\r\n\r\n");
    wire.extend_from_slice(message.as_bytes());
    wire.extend_from_slice(b"\r\n--b1\r\nContent-Type: application/vnd.bdoc-signature\r\n\r\n");
    wire.extend_from_slice(b"<signature/>\r\n--b1--\r\n");

    let registry = AlgorithmRegistry::standard();
    let catalog = PartCatalog::standard();
    let decoder = EnvelopeDecoder::new(&catalog, &registry, config()).unwrap();
    let content_type = ContentType::parse("multipart/mixed; boundary=b1").unwrap();
    let (mut decoded, signed) = decode_envelope(&decoder, &wire[..], &content_type, false).unwrap();
    assert_eq!(decoded.payload().to_bytes(), message.as_bytes());

    let relayed = encode_envelope(&mut decoded, Vec::new(), &registry, config()).unwrap();
    assert_eq!(
        relayed.digests.get(&PartName::Message).unwrap().digest,
        signed.get(&PartName::Message).unwrap().digest,
        "a relayed message must digest to what the sender signed"
    );
}

#[test]
fn test_encode_without_signature_is_rejected() {
    let mut envelope = Envelope::builder(Payload::Soap(SoapMessage::new("<Envelope/>").unwrap()))
        .build()
        .unwrap();
    let registry = AlgorithmRegistry::standard();
    let err = encode_envelope(&mut envelope, Vec::new(), &registry, config()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::EncoderSequence);
}

// ============================================================================
// Signing engine
// ============================================================================

#[test]
fn test_sign_then_verify_decoded_digests() {
    let registry = AlgorithmRegistry::standard();
    let catalog = PartCatalog::standard();
    let engine = ListingEngine { batch: true };

    let mut encoder =
        EnvelopeEncoder::with_boundary(Vec::new(), &registry, config(), Boundary::new("signed")).unwrap();
    let content_type = encoder.content_type();
    encoder
        .write_payload(
            &Payload::Soap(SoapMessage::new("<Envelope/>").unwrap()),
            &PartHeaders::new(),
        )
        .unwrap();
    encoder
        .write_attachment(&ContentType::new("text/csv"), &PartHeaders::new(), &mut &b"a,b\n1,2\n"[..])
        .unwrap();
    let signature = encoder.sign(&engine).unwrap();
    let err = encoder
        .write_attachment(&ContentType::new("text/csv"), &PartHeaders::new(), &mut &b"late"[..])
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::EncoderSequence, "no attachments after signing");
    encoder.write_signature().unwrap();
    let (wire, _) = encoder.finish().unwrap();

    let decoder = EnvelopeDecoder::new(&catalog, &registry, config()).unwrap();
    let (decoded, digests) = decode_envelope(&decoder, &wire[..], &content_type, false).unwrap();
    assert_eq!(decoded.signature(), Some(&signature));
    digests
        .verify_with(&engine, "EE/GOV/123", &signature)
        .expect("decoded digests must verify against the signature");
}

#[test]
fn test_fault_in_place_of_signature_round_trip() {
    let registry = AlgorithmRegistry::standard();
    let catalog = PartCatalog::standard();
    let mut encoder = EnvelopeEncoder::new(Vec::new(), &registry, config()).unwrap();
    let content_type = encoder.content_type();
    encoder
        .write_payload(
            &Payload::Soap(SoapMessage::new("<Envelope/>").unwrap()),
            &PartHeaders::new(),
        )
        .unwrap();
    encoder
        .write_fault(&msgseal_core::Fault::new("<Fault><faultcode>Server</faultcode></Fault>"))
        .unwrap();
    let (wire, _) = encoder.finish().unwrap();

    let decoder = EnvelopeDecoder::new(&catalog, &registry, config()).unwrap();
    let mut collector = msgseal_core::EnvelopeCollector::new(THRESHOLD);
    decoder.decode(&wire[..], &content_type, true, &mut collector).unwrap();
    assert_eq!(collector.fault().and_then(|f| f.fault_code()), Some("Server"));
    let envelope = collector.into_envelope().unwrap();
    assert!(envelope.signature().is_none());
}
