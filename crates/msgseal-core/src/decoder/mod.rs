//! Streaming envelope decoder.
//!
//! Parts are recognised by declared content type only, fed through the
//! digest accumulator and handed to a [`DecoderCallback`]. Whatever a
//! callback leaves unread is drained through the digest before moving on,
//! so digests never depend on how much of a part the consumer looked at.

mod collector;
pub mod state;

pub use collector::EnvelopeCollector;
pub use state::{at_end, transition, Action, DecoderState, Rejection, Transition};

use crate::catalog::{PartCatalog, PartName, WirePart};
use crate::config::EnvelopeConfig;
use crate::content_type::ContentType;
use crate::digest::{AlgorithmRegistry, DigestingReader};
use crate::envelope::Envelope;
use crate::error::{EnvelopeError, EnvelopeResult, ErrorCode};
use crate::io::{drain, read_bytes_bounded, read_text_bounded};
use crate::multipart::{MultipartReader, PartHeaders};
use crate::payload::{Fault, Payload};
use crate::signature::{PartDigest, PartDigests, SignatureData};
use std::io::Read;

/// Receives decoded parts in wire order.
///
/// Every method but [`DecoderCallback::payload`] defaults to ignoring the part.
/// Returning an error aborts the decode.
pub trait DecoderCallback {
    fn ocsp_response(&mut self, _der: Vec<u8>) -> anyhow::Result<()> {
        Ok(())
    }

    fn payload(&mut self, payload: Payload, headers: PartHeaders) -> anyhow::Result<()>;

    /// The body may be consumed lazily or not at all.
    fn rest_body(&mut self, _body: &mut dyn Read) -> anyhow::Result<()> {
        Ok(())
    }

    /// `index` is 1-based and shared with the REST body numbering.
    fn attachment(
        &mut self,
        _index: usize,
        _content_type: &ContentType,
        _headers: &PartHeaders,
        _body: &mut dyn Read,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn signature(&mut self, _signature: &SignatureData) -> anyhow::Result<()> {
        Ok(())
    }

    fn fault(&mut self, _fault: &Fault) -> anyhow::Result<()> {
        Ok(())
    }

    fn completed(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct EnvelopeDecoder<'a> {
    catalog: &'a PartCatalog,
    registry: &'a AlgorithmRegistry,
    config: EnvelopeConfig,
}

impl<'a> EnvelopeDecoder<'a> {
    /// Fails when the configured digest algorithm is not registered.
    pub fn new(
        catalog: &'a PartCatalog,
        registry: &'a AlgorithmRegistry,
        config: EnvelopeConfig,
    ) -> EnvelopeResult<Self> {
        registry.hasher(&config.digest_algorithm)?;
        Ok(Self {
            catalog,
            registry,
            config,
        })
    }

    pub fn config(&self) -> &EnvelopeConfig {
        &self.config
    }

    /// Decode one message.
    ///
    /// A plain XML content type is a standalone fault and is only accepted
    /// when `faults_allowed`; anything else must be multipart with a boundary.
    pub fn decode<R: Read>(
        &self,
        reader: R,
        content_type: &ContentType,
        faults_allowed: bool,
        callback: &mut dyn DecoderCallback,
    ) -> EnvelopeResult<PartDigests> {
        if !content_type.is_multipart() {
            return self.decode_fault(reader, content_type, faults_allowed, callback);
        }
        let boundary = content_type.boundary().ok_or_else(|| {
            EnvelopeError::new(
                ErrorCode::MissingBoundary,
                format!("content type '{}' has no boundary", content_type),
            )
        })?;

        let limits = &self.config.limits;
        let mut parts = MultipartReader::new(reader, boundary, limits.max_header_bytes);
        let mut run = Run::default();

        while let Some(headers) = parts.next_part()? {
            run.part_count += 1;
            if run.part_count > limits.max_parts {
                return Err(EnvelopeError::new(
                    ErrorCode::LimitExceeded,
                    format!("message has more than {} parts", limits.max_parts),
                ));
            }
            let part_type = headers.content_type()?;
            let (next, action) = match transition(run.state, self.catalog.classify_wire(&part_type)) {
                Transition::Accept { next, action } => (next, action),
                Transition::Reject { at, reason } => {
                    return Err(rejection(reason, at, Some(&part_type)));
                }
            };
            tracing::debug!(
                from = ?run.state,
                to = ?next,
                action = ?action,
                content_type = %part_type,
                "decoder transition"
            );
            run.state = next;
            self.handle(&mut run, action, &part_type, headers, &mut parts.body(), faults_allowed, callback)?;
        }

        at_end(run.state).map_err(|reason| rejection(reason, run.state, None))?;
        run.check_rest_body()?;
        callback
            .completed()
            .map_err(|e| callback_error("completion", e))?;
        Ok(run.digests)
    }

    fn decode_fault<R: Read>(
        &self,
        reader: R,
        content_type: &ContentType,
        faults_allowed: bool,
        callback: &mut dyn DecoderCallback,
    ) -> EnvelopeResult<PartDigests> {
        if self.catalog.classify_wire(content_type) != Some(WirePart::Xml) {
            return Err(EnvelopeError::new(
                ErrorCode::InvalidContentType,
                format!("expected multipart or XML content type, found '{}'", content_type),
            ));
        }
        if !faults_allowed {
            return Err(EnvelopeError::new(
                ErrorCode::FaultNotAllowed,
                "standalone fault received where faults are not allowed",
            ));
        }
        let xml = read_text_bounded(reader, self.config.limits.max_text_part_bytes, "fault")?;
        let fault = Fault::new(xml);
        tracing::debug!(code = ?fault.fault_code(), "decoded standalone fault");
        callback.fault(&fault).map_err(|e| callback_error("fault", e))?;
        callback
            .completed()
            .map_err(|e| callback_error("completion", e))?;
        Ok(PartDigests::new())
    }

    #[allow(clippy::too_many_arguments)]
    fn handle<B: Read>(
        &self,
        run: &mut Run,
        action: Action,
        part_type: &ContentType,
        headers: PartHeaders,
        body: &mut B,
        faults_allowed: bool,
        callback: &mut dyn DecoderCallback,
    ) -> EnvelopeResult<()> {
        let limits = &self.config.limits;
        let algorithm = &self.config.digest_algorithm;
        match action {
            Action::Ocsp => {
                let der = read_bytes_bounded(body, limits.max_ocsp_bytes, "OCSP response")?;
                callback
                    .ocsp_response(der)
                    .map_err(|e| callback_error("ocsp-response", e))?;
            }
            Action::Payload(kind) => {
                let bytes = read_bytes_bounded(body, limits.max_text_part_bytes, "message")?;
                let digest = self.registry.digest(algorithm, &bytes)?;
                let payload = Payload::parse(kind, bytes.clone())?;
                run.rest_body_required = payload.declares_body();
                run.digests.add(PartDigest {
                    name: PartName::Message,
                    algorithm: algorithm.clone(),
                    digest,
                    raw: Some(bytes),
                });
                callback
                    .payload(payload, headers.without_codec_headers())
                    .map_err(|e| callback_error("message", e))?;
            }
            Action::RestBody => {
                run.attachment_index += 1;
                let name = PartName::Attachment(run.attachment_index);
                let mut reader = DigestingReader::new(body, self.registry.hasher(algorithm)?);
                callback
                    .rest_body(&mut reader)
                    .map_err(|e| callback_error(&name.as_string(), e))?;
                drain(&mut reader)?;
                run.rest_body_seen = true;
                run.digests.add(PartDigest {
                    name,
                    algorithm: algorithm.clone(),
                    digest: reader.finish(),
                    raw: None,
                });
            }
            Action::Attachments => self.handle_attachments(run, part_type, body, callback)?,
            Action::HashChainResult => {
                run.check_rest_body()?;
                let text = read_text_bounded(body, limits.max_text_part_bytes, "hash chain result")?;
                run.hash_chain_result = Some(text);
            }
            Action::HashChain => {
                let text = read_text_bounded(body, limits.max_text_part_bytes, "hash chain")?;
                run.hash_chain = Some(text);
            }
            Action::Signature => {
                run.check_rest_body()?;
                let xml = read_text_bounded(body, limits.max_text_part_bytes, "signature")?;
                let signature =
                    SignatureData::new(xml, run.hash_chain_result.take(), run.hash_chain.take())?;
                tracing::debug!(batch = signature.is_batch(), "decoded signature");
                callback
                    .signature(&signature)
                    .map_err(|e| callback_error("signature", e))?;
            }
            Action::Fault => {
                if !faults_allowed {
                    return Err(EnvelopeError::new(
                        ErrorCode::FaultNotAllowed,
                        "fault received in place of the signature where faults are not allowed",
                    ));
                }
                let xml = read_text_bounded(body, limits.max_text_part_bytes, "fault")?;
                let fault = Fault::new(xml);
                tracing::debug!(code = ?fault.fault_code(), "decoded fault in place of signature");
                callback.fault(&fault).map_err(|e| callback_error("fault", e))?;
            }
        }
        Ok(())
    }

    fn handle_attachments<B: Read>(
        &self,
        run: &mut Run,
        part_type: &ContentType,
        body: &mut B,
        callback: &mut dyn DecoderCallback,
    ) -> EnvelopeResult<()> {
        let limits = &self.config.limits;
        let algorithm = &self.config.digest_algorithm;
        let boundary = part_type.boundary().ok_or_else(|| {
            EnvelopeError::new(
                ErrorCode::MissingBoundary,
                format!("attachment part '{}' has no boundary", part_type),
            )
        })?;

        let mut nested = MultipartReader::new(body, boundary, limits.max_header_bytes);
        let mut count = 0usize;
        while let Some(headers) = nested.next_part()? {
            count += 1;
            if count > limits.max_attachments {
                return Err(EnvelopeError::new(
                    ErrorCode::LimitExceeded,
                    format!("message has more than {} attachments", limits.max_attachments),
                ));
            }
            // Attachments are numbered regardless of their content type.
            let content_type = match headers.get(crate::multipart::CONTENT_TYPE) {
                Some(raw) => ContentType::parse(raw)?,
                None => ContentType::new(crate::catalog::mime::OCTET_STREAM),
            };
            run.attachment_index += 1;
            let name = PartName::Attachment(run.attachment_index);
            let mut reader = DigestingReader::new(nested.body(), self.registry.hasher(algorithm)?);
            callback
                .attachment(
                    run.attachment_index,
                    &content_type,
                    &headers.without_codec_headers(),
                    &mut reader,
                )
                .map_err(|e| callback_error(&name.as_string(), e))?;
            drain(&mut reader)?;
            run.digests.add(PartDigest {
                name,
                algorithm: algorithm.clone(),
                digest: reader.finish(),
                raw: None,
            });
        }
        Ok(())
    }
}

/// Decode a message into a full [`Envelope`].
pub fn decode_envelope<R: Read>(
    decoder: &EnvelopeDecoder<'_>,
    reader: R,
    content_type: &ContentType,
    faults_allowed: bool,
) -> EnvelopeResult<(Envelope, PartDigests)> {
    let mut collector = EnvelopeCollector::new(decoder.config().spool_threshold);
    let digests = decoder.decode(reader, content_type, faults_allowed, &mut collector)?;
    Ok((collector.into_envelope()?, digests))
}

/// Per-decode bookkeeping.
#[derive(Default)]
struct Run {
    state: DecoderState,
    digests: PartDigests,
    part_count: usize,
    attachment_index: usize,
    hash_chain_result: Option<String>,
    hash_chain: Option<String>,
    rest_body_required: bool,
    rest_body_seen: bool,
}

impl Run {
    fn check_rest_body(&self) -> EnvelopeResult<()> {
        if self.rest_body_required && !self.rest_body_seen {
            return Err(EnvelopeError::new(
                ErrorCode::RestBodyMissing,
                "REST payload declares a body but no REST body part followed",
            ));
        }
        Ok(())
    }
}

fn rejection(reason: Rejection, at: DecoderState, found: Option<&ContentType>) -> EnvelopeError {
    let found = found
        .map(|ct| format!("'{}'", ct))
        .unwrap_or_else(|| "end of stream".to_string());
    let (code, expected) = match reason {
        Rejection::InvalidPayload => (ErrorCode::InvalidContentType, "a SOAP or REST payload"),
        Rejection::HashChainPair => (ErrorCode::HashChainPair, "a hash chain after the hash chain result"),
        Rejection::UnexpectedPart => (ErrorCode::UnexpectedPart, "a signature"),
        Rejection::TrailingContent => (ErrorCode::TrailingContent, "no more parts after the signature"),
        Rejection::MissingPayload => (ErrorCode::MissingPayload, "a payload"),
        Rejection::MissingSignature => (ErrorCode::MissingSignaturePart, "a signature"),
    };
    EnvelopeError::new(code, format!("expected {} at {:?}, found {}", expected, at, found))
}

/// Keep typed errors raised while a callback was reading the part.
fn callback_error(part: &str, err: anyhow::Error) -> EnvelopeError {
    let err = match err.downcast::<EnvelopeError>() {
        Ok(typed) => return typed,
        Err(err) => err,
    };
    match err.downcast::<std::io::Error>() {
        Ok(io) => EnvelopeError::from(io).with_context(format!("while handling '{}'", part)),
        Err(err) => EnvelopeError::callback(part, err),
    }
}
