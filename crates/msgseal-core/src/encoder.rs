//! Envelope encoder.
//!
//! The caller drives the part order explicitly; every part is digested as it
//! is written, so the digest set handed to the signing engine matches the
//! bytes on the wire exactly.

use crate::catalog::{mime, PartName};
use crate::config::EnvelopeConfig;
use crate::content_type::ContentType;
use crate::digest::{AlgorithmRegistry, DigestingWriter};
use crate::envelope::Envelope;
use crate::error::{EnvelopeError, EnvelopeResult, ErrorCode};
use crate::multipart::{Boundary, PartHeaders, CONTENT_TRANSFER_ENCODING, CONTENT_TYPE};
use crate::payload::{Fault, Payload};
use crate::signature::{PartDigest, PartDigests, SignatureData, SigningEngine};
use std::io::{self, Read, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Start,
    Ocsp,
    SoapPayload,
    RestPayload,
    RestBody,
    Attachments,
    Signed,
    Closed,
    Finished,
}

pub struct EnvelopeEncoder<'a, W: Write> {
    out: W,
    registry: &'a AlgorithmRegistry,
    config: EnvelopeConfig,
    boundary: Boundary,
    /// Open nested `multipart/mixed` holding the attachments.
    attachments: Option<Boundary>,
    attachment_index: usize,
    stage: Stage,
    digests: PartDigests,
    signature: Option<SignatureData>,
}

impl<'a, W: Write> EnvelopeEncoder<'a, W> {
    /// Fails when the configured digest algorithm is not registered.
    pub fn new(out: W, registry: &'a AlgorithmRegistry, config: EnvelopeConfig) -> EnvelopeResult<Self> {
        Self::with_boundary(out, registry, config, Boundary::generate())
    }

    pub fn with_boundary(
        out: W,
        registry: &'a AlgorithmRegistry,
        config: EnvelopeConfig,
        boundary: Boundary,
    ) -> EnvelopeResult<Self> {
        registry.hasher(&config.digest_algorithm)?;
        Ok(Self {
            out,
            registry,
            config,
            boundary,
            attachments: None,
            attachment_index: 0,
            stage: Stage::Start,
            digests: PartDigests::new(),
            signature: None,
        })
    }

    /// Content type of the message being written.
    pub fn content_type(&self) -> ContentType {
        ContentType::new(mime::MULTIPART_MIXED).with_param("boundary", self.boundary.value())
    }

    /// Digests of the parts written so far.
    pub fn digests(&self) -> &PartDigests {
        &self.digests
    }

    pub fn write_ocsp_responses(&mut self, responses: &[Vec<u8>]) -> EnvelopeResult<()> {
        self.require("write OCSP responses", &[Stage::Start])?;
        for der in responses {
            let headers = PartHeaders::new()
                .with(CONTENT_TYPE, mime::OCSP_RESPONSE)
                .with(CONTENT_TRANSFER_ENCODING, "binary");
            self.boundary.open_part(&mut self.out, &headers)?;
            self.out.write_all(der)?;
        }
        self.stage = Stage::Ocsp;
        Ok(())
    }

    /// Write the payload and record its digest as `message`.
    pub fn write_payload(&mut self, payload: &Payload, extra_headers: &PartHeaders) -> EnvelopeResult<()> {
        self.require("write the payload", &[Stage::Start, Stage::Ocsp])?;
        let next = match payload {
            Payload::Soap(_) => Stage::SoapPayload,
            Payload::RestRequest(_) | Payload::RestResponse(_) => Stage::RestPayload,
            Payload::Fault(_) => {
                return Err(EnvelopeError::new(
                    ErrorCode::PayloadExclusivity,
                    "a fault payload is sent standalone, not inside a multipart envelope",
                ));
            }
        };

        let mut headers = extra_headers.without_codec_headers();
        headers.push(CONTENT_TYPE, payload.content_type().to_string());
        self.boundary.open_part(&mut self.out, &headers)?;

        let bytes = payload.to_bytes();
        self.out.write_all(&bytes)?;
        let digest = self.registry.digest(&self.config.digest_algorithm, &bytes)?;
        self.digests.add(PartDigest {
            name: PartName::Message,
            algorithm: self.config.digest_algorithm.clone(),
            digest,
            raw: Some(bytes),
        });
        self.stage = next;
        Ok(())
    }

    /// Stream the REST body; it is numbered as the first attachment.
    pub fn write_rest_body<R: Read + ?Sized>(&mut self, body: &mut R) -> EnvelopeResult<()> {
        self.require("write a REST body", &[Stage::RestPayload])?;
        let headers = PartHeaders::new()
            .with(CONTENT_TYPE, mime::REST_BODY)
            .with(CONTENT_TRANSFER_ENCODING, "binary");
        self.boundary.open_part(&mut self.out, &headers)?;
        self.copy_digested(body)?;
        self.stage = Stage::RestBody;
        Ok(())
    }

    /// Stream one attachment into the nested multipart.
    pub fn write_attachment<R: Read + ?Sized>(
        &mut self,
        content_type: &ContentType,
        extra_headers: &PartHeaders,
        body: &mut R,
    ) -> EnvelopeResult<()> {
        self.require("write an attachment", &[Stage::SoapPayload, Stage::Attachments])?;
        if self.attachments.is_none() {
            let nested = Boundary::generate();
            let outer = PartHeaders::new().with(
                CONTENT_TYPE,
                ContentType::new(mime::MULTIPART_MIXED)
                    .with_param("boundary", nested.value())
                    .to_string(),
            );
            self.boundary.open_part(&mut self.out, &outer)?;
            self.attachments = Some(nested);
        }

        let mut headers = extra_headers.without_codec_headers();
        headers.push(CONTENT_TYPE, content_type.to_string());
        headers.push(CONTENT_TRANSFER_ENCODING, "binary");
        if let Some(nested) = self.attachments.as_mut() {
            nested.open_part(&mut self.out, &headers)?;
        }
        self.copy_digested(body)?;
        self.stage = Stage::Attachments;
        Ok(())
    }

    /// Ask the signing engine to sign the digests written so far.
    ///
    /// No further content parts may follow.
    pub fn sign(&mut self, engine: &dyn SigningEngine) -> EnvelopeResult<SignatureData> {
        self.require_content_written("sign")?;
        let signature = engine.sign(&self.digests).map_err(|e| {
            EnvelopeError::new(ErrorCode::CallbackFailed, format!("signing engine failed: {}", e)).with_source(e)
        })?;
        tracing::debug!(batch = signature.is_batch(), parts = self.digests.len(), "envelope signed");
        self.signature = Some(signature.clone());
        self.stage = Stage::Signed;
        Ok(signature)
    }

    /// Write the signature produced by [`sign`](Self::sign).
    pub fn write_signature(&mut self) -> EnvelopeResult<()> {
        self.require("write the signature", &[Stage::Signed])?;
        let signature = self
            .signature
            .take()
            .ok_or_else(|| EnvelopeError::sequence("no signature to write"))?;
        self.write_signature_parts(&signature)
    }

    /// Write a signature produced elsewhere, e.g. as part of a batch.
    pub fn write_signature_data(&mut self, signature: &SignatureData) -> EnvelopeResult<()> {
        self.require_content_written("write the signature")?;
        self.write_signature_parts(signature)
    }

    /// Write a fault in place of the signature.
    pub fn write_fault(&mut self, fault: &Fault) -> EnvelopeResult<()> {
        self.require_content_written("write a fault")?;
        self.close_attachments()?;
        let headers = PartHeaders::new().with(
            CONTENT_TYPE,
            ContentType::new(mime::TEXT_XML).with_param("charset", "UTF-8").to_string(),
        );
        self.boundary.open_part(&mut self.out, &headers)?;
        self.out.write_all(fault.xml.as_bytes())?;
        self.stage = Stage::Closed;
        Ok(())
    }

    /// Close the message. Fails unless a signature or fault was written.
    pub fn finish(mut self) -> EnvelopeResult<(W, PartDigests)> {
        if self.stage != Stage::Closed {
            return Err(EnvelopeError::sequence(format!(
                "encoder closed at {:?} without a signature",
                self.stage
            )));
        }
        self.boundary.close(&mut self.out)?;
        self.out.flush()?;
        self.stage = Stage::Finished;
        Ok((self.out, self.digests))
    }

    fn write_signature_parts(&mut self, signature: &SignatureData) -> EnvelopeResult<()> {
        self.close_attachments()?;
        if let (Some(result), Some(chain)) = (signature.hash_chain_result(), signature.hash_chain()) {
            self.write_text_part(mime::HASH_CHAIN_RESULT, result)?;
            self.write_text_part(mime::HASH_CHAIN, chain)?;
        }
        self.write_text_part(mime::SIGNATURE_BDOC, signature.signature_xml())?;
        self.stage = Stage::Closed;
        Ok(())
    }

    fn write_text_part(&mut self, essence: &str, text: &str) -> io::Result<()> {
        let headers = PartHeaders::new().with(CONTENT_TYPE, essence);
        self.boundary.open_part(&mut self.out, &headers)?;
        self.out.write_all(text.as_bytes())
    }

    fn close_attachments(&mut self) -> io::Result<()> {
        if let Some(mut nested) = self.attachments.take() {
            nested.close(&mut self.out)?;
        }
        Ok(())
    }

    fn copy_digested<R: Read + ?Sized>(&mut self, body: &mut R) -> EnvelopeResult<()> {
        let hasher = self.registry.hasher(&self.config.digest_algorithm)?;
        let mut writer = DigestingWriter::new(&mut self.out, hasher);
        io::copy(body, &mut writer)?;
        let (_, digest) = writer.finish();
        self.attachment_index += 1;
        self.digests.add(PartDigest {
            name: PartName::Attachment(self.attachment_index),
            algorithm: self.config.digest_algorithm.clone(),
            digest,
            raw: None,
        });
        Ok(())
    }

    fn require(&self, what: &str, allowed: &[Stage]) -> EnvelopeResult<()> {
        if allowed.contains(&self.stage) {
            Ok(())
        } else {
            Err(EnvelopeError::sequence(format!("cannot {} at {:?}", what, self.stage)))
        }
    }

    fn require_content_written(&self, what: &str) -> EnvelopeResult<()> {
        self.require(
            what,
            &[Stage::SoapPayload, Stage::RestPayload, Stage::RestBody, Stage::Attachments],
        )
    }
}

/// Result of [`encode_envelope`].
#[derive(Debug)]
pub struct EncodedEnvelope<W> {
    pub content_type: ContentType,
    pub writer: W,
    pub digests: PartDigests,
}

/// Write an envelope whose signature is already set.
pub fn encode_envelope<W: Write>(
    envelope: &mut Envelope,
    writer: W,
    registry: &AlgorithmRegistry,
    config: EnvelopeConfig,
) -> EnvelopeResult<EncodedEnvelope<W>> {
    let signature = envelope
        .signature()
        .cloned()
        .ok_or_else(|| EnvelopeError::sequence("envelope has no signature to encode"))?;
    let mut encoder = EnvelopeEncoder::new(writer, registry, config)?;
    let content_type = encoder.content_type();

    if !envelope.ocsp_responses().is_empty() {
        encoder.write_ocsp_responses(envelope.ocsp_responses())?;
    }
    encoder.write_payload(envelope.payload(), envelope.payload_headers())?;
    if let Some(body) = envelope.rest_body_mut() {
        encoder.write_rest_body(body.reader()?)?;
    }
    for attachment in envelope.attachments_mut() {
        let body = attachment.body.reader()?;
        encoder.write_attachment(&attachment.content_type, &attachment.headers, body)?;
    }
    encoder.write_signature_data(&signature)?;
    let (writer, digests) = encoder.finish()?;
    Ok(EncodedEnvelope {
        content_type,
        writer,
        digests,
    })
}

/// Content type and bytes of a standalone fault message.
pub fn encode_fault<W: Write>(fault: &Fault, mut writer: W) -> EnvelopeResult<ContentType> {
    writer.write_all(fault.xml.as_bytes())?;
    writer.flush()?;
    Ok(ContentType::new(mime::TEXT_XML).with_param("charset", "UTF-8"))
}
