//! The envelope: payload, REST body or attachments, OCSP responses,
//! signature and timestamp.

use crate::content_type::ContentType;
use crate::error::{EnvelopeError, EnvelopeResult, ErrorCode};
use crate::multipart::PartHeaders;
use crate::payload::{Payload, PayloadKind};
use crate::signature::{SignatureData, TimestampData};
use chrono::{DateTime, Utc};
use std::io::{self, Read, Seek, SeekFrom, Write};
use tempfile::SpooledTempFile;

/// Attachment or REST body bytes, kept in memory up to a threshold and
/// spilled to an anonymous temp file beyond it.
///
/// The temp file is unlinked on creation and released when the body is
/// dropped, whatever path dropped it.
pub struct AttachmentBody {
    spool: SpooledTempFile,
    len: u64,
}

impl AttachmentBody {
    pub fn new(threshold: usize) -> Self {
        Self {
            spool: tempfile::spooled_tempfile(threshold),
            len: 0,
        }
    }

    pub fn from_bytes(bytes: &[u8], threshold: usize) -> EnvelopeResult<Self> {
        let mut body = Self::new(threshold);
        body.write_all(bytes).map_err(temp_file_error)?;
        Ok(body)
    }

    /// Copy a reader into a new spooled body.
    pub fn from_reader<R: Read + ?Sized>(reader: &mut R, threshold: usize) -> EnvelopeResult<Self> {
        let mut body = Self::new(threshold);
        io::copy(reader, &mut body)?;
        Ok(body)
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the body spilled to disk.
    pub fn is_spilled(&self) -> bool {
        self.spool.is_rolled()
    }

    /// Rewind and return a reader over the whole body.
    pub fn reader(&mut self) -> io::Result<&mut SpooledTempFile> {
        self.spool.seek(SeekFrom::Start(0))?;
        Ok(&mut self.spool)
    }

    pub fn to_vec(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(usize::try_from(self.len).unwrap_or(0));
        self.reader()?.read_to_end(&mut out)?;
        Ok(out)
    }
}

impl Write for AttachmentBody {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.spool.write(buf)?;
        self.len += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.spool.flush()
    }
}

impl std::fmt::Debug for AttachmentBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentBody")
            .field("len", &self.len)
            .field("spilled", &self.is_spilled())
            .finish()
    }
}

fn temp_file_error(err: io::Error) -> EnvelopeError {
    EnvelopeError::new(ErrorCode::TempFile, format!("failed to spool attachment: {}", err)).with_source(err)
}

/// A SOAP attachment.
#[derive(Debug)]
pub struct Attachment {
    pub content_type: ContentType,
    /// Extra part headers, excluding the ones the codec writes itself.
    pub headers: PartHeaders,
    pub body: AttachmentBody,
}

impl Attachment {
    pub fn new(content_type: ContentType, body: AttachmentBody) -> Self {
        Self {
            content_type,
            headers: PartHeaders::new(),
            body,
        }
    }

    pub fn with_headers(mut self, headers: PartHeaders) -> Self {
        self.headers = headers.without_codec_headers();
        self
    }
}

#[derive(Debug)]
pub struct Envelope {
    payload: Payload,
    payload_headers: PartHeaders,
    rest_body: Option<AttachmentBody>,
    attachments: Vec<Attachment>,
    ocsp_responses: Vec<Vec<u8>>,
    signature: Option<SignatureData>,
    timestamp: Option<TimestampData>,
    creation_time: DateTime<Utc>,
}

impl Envelope {
    pub fn builder(payload: Payload) -> EnvelopeBuilder {
        EnvelopeBuilder::new(payload)
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_headers(&self) -> &PartHeaders {
        &self.payload_headers
    }

    pub fn rest_body(&self) -> Option<&AttachmentBody> {
        self.rest_body.as_ref()
    }

    pub fn rest_body_mut(&mut self) -> Option<&mut AttachmentBody> {
        self.rest_body.as_mut()
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn attachments_mut(&mut self) -> &mut [Attachment] {
        &mut self.attachments
    }

    /// Transport-only; never persisted in containers.
    pub fn ocsp_responses(&self) -> &[Vec<u8>] {
        &self.ocsp_responses
    }

    pub fn signature(&self) -> Option<&SignatureData> {
        self.signature.as_ref()
    }

    pub fn set_signature(&mut self, signature: SignatureData) {
        self.signature = Some(signature);
    }

    pub fn timestamp(&self) -> Option<&TimestampData> {
        self.timestamp.as_ref()
    }

    pub fn set_timestamp(&mut self, timestamp: TimestampData) {
        self.timestamp = Some(timestamp);
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    pub fn is_batch_signature(&self) -> bool {
        self.signature.as_ref().map(SignatureData::is_batch).unwrap_or(false)
    }

    /// Body of the first attachment, or the REST body.
    ///
    /// Containers carry at most this one binary entry.
    pub fn primary_attachment_mut(&mut self) -> Option<&mut AttachmentBody> {
        match self.rest_body.as_mut() {
            Some(body) => Some(body),
            None => self.attachments.first_mut().map(|a| &mut a.body),
        }
    }
}

/// Builds an [`Envelope`], rejecting invalid combinations at the call that
/// introduces them.
#[derive(Debug)]
pub struct EnvelopeBuilder {
    envelope: Envelope,
}

impl EnvelopeBuilder {
    pub fn new(payload: Payload) -> Self {
        Self {
            envelope: Envelope {
                payload,
                payload_headers: PartHeaders::new(),
                rest_body: None,
                attachments: Vec::new(),
                ocsp_responses: Vec::new(),
                signature: None,
                timestamp: None,
                creation_time: Utc::now(),
            },
        }
    }

    /// Extra headers on the SOAP payload part.
    pub fn payload_headers(mut self, headers: PartHeaders) -> EnvelopeResult<Self> {
        if self.envelope.payload.kind() != PayloadKind::Soap && !headers.is_empty() {
            return Err(EnvelopeError::new(
                ErrorCode::PayloadExclusivity,
                format!("payload headers are only allowed for SOAP, not {:?}", self.envelope.payload.kind()),
            ));
        }
        self.envelope.payload_headers = headers.without_codec_headers();
        Ok(self)
    }

    pub fn rest_body(mut self, body: AttachmentBody) -> EnvelopeResult<Self> {
        if !self.envelope.payload.is_rest() {
            return Err(EnvelopeError::new(
                ErrorCode::RestBodyExclusivity,
                format!("REST body requires a REST payload, not {:?}", self.envelope.payload.kind()),
            ));
        }
        if !self.envelope.attachments.is_empty() {
            return Err(EnvelopeError::new(
                ErrorCode::RestBodyExclusivity,
                "REST body cannot be combined with attachments",
            ));
        }
        if self.envelope.rest_body.is_some() {
            return Err(EnvelopeError::new(
                ErrorCode::RestBodyExclusivity,
                "REST body is already set",
            ));
        }
        self.envelope.rest_body = Some(body);
        Ok(self)
    }

    pub fn attachment(mut self, attachment: Attachment) -> EnvelopeResult<Self> {
        if self.envelope.rest_body.is_some() {
            return Err(EnvelopeError::new(
                ErrorCode::RestBodyExclusivity,
                "attachments cannot be combined with a REST body",
            ));
        }
        if self.envelope.payload.kind() != PayloadKind::Soap {
            return Err(EnvelopeError::new(
                ErrorCode::RestBodyExclusivity,
                format!("attachments are only allowed for SOAP, not {:?}", self.envelope.payload.kind()),
            ));
        }
        self.envelope.attachments.push(attachment);
        Ok(self)
    }

    pub fn ocsp_response(mut self, der: Vec<u8>) -> Self {
        self.envelope.ocsp_responses.push(der);
        self
    }

    pub fn signature(mut self, signature: SignatureData) -> Self {
        self.envelope.signature = Some(signature);
        self
    }

    pub fn timestamp(mut self, timestamp: TimestampData) -> Self {
        self.envelope.timestamp = Some(timestamp);
        self
    }

    pub fn creation_time(mut self, at: DateTime<Utc>) -> Self {
        self.envelope.creation_time = at;
        self
    }

    pub fn build(self) -> EnvelopeResult<Envelope> {
        let envelope = self.envelope;
        if envelope.payload.declares_body() && envelope.rest_body.is_none() {
            return Err(EnvelopeError::new(
                ErrorCode::RestBodyMissing,
                "REST payload declares a body but no REST body was given",
            ));
        }
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{RestRequest, RestResponse, SoapMessage};

    fn soap() -> Payload {
        Payload::Soap(SoapMessage::new("<Envelope/>").unwrap())
    }

    fn body(bytes: &[u8]) -> AttachmentBody {
        AttachmentBody::from_bytes(bytes, 16).unwrap()
    }

    #[test]
    fn test_attachment_body_spills_past_threshold() {
        let mut small = body(b"tiny");
        assert!(!small.is_spilled());
        assert_eq!(small.to_vec().unwrap(), b"tiny");

        let data = vec![7u8; 64];
        let mut large = body(&data);
        assert!(large.is_spilled(), "64 bytes over a 16 byte threshold must spill");
        assert_eq!(large.len(), 64);
        assert_eq!(large.to_vec().unwrap(), data);
        // Re-reading rewinds.
        assert_eq!(large.to_vec().unwrap(), data);
    }

    #[test]
    fn test_rest_body_and_attachments_are_exclusive() {
        let rest = Payload::RestRequest(RestRequest::new("POST", "/x").with_header("Content-Type", "text/plain"));
        let builder = Envelope::builder(rest).rest_body(body(b"hello")).unwrap();
        let err = builder
            .attachment(Attachment::new(ContentType::new("image/png"), body(b"png")))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::RestBodyExclusivity);
    }

    #[test]
    fn test_rest_body_requires_rest_payload() {
        let err = Envelope::builder(soap()).rest_body(body(b"x")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::RestBodyExclusivity);
    }

    #[test]
    fn test_attachments_require_soap_payload() {
        let rest = Payload::RestResponse(RestResponse::new(200, "OK"));
        let err = Envelope::builder(rest)
            .attachment(Attachment::new(ContentType::new("image/png"), body(b"png")))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::RestBodyExclusivity);
    }

    #[test]
    fn test_rest_response_without_body_is_legal() {
        let rest = Payload::RestResponse(RestResponse::new(204, "No Content"));
        let envelope = Envelope::builder(rest).build().unwrap();
        assert!(envelope.rest_body().is_none());
    }

    #[test]
    fn test_rest_payload_declaring_body_needs_one() {
        let rest = Payload::RestResponse(RestResponse::new(200, "OK").with_header("Content-Type", "application/json"));
        let err = Envelope::builder(rest).build().unwrap_err();
        assert_eq!(err.code(), ErrorCode::RestBodyMissing);
    }

    #[test]
    fn test_payload_headers_only_for_soap() {
        let headers = PartHeaders::new().with("X-Id", "1");
        let rest = Payload::RestRequest(RestRequest::new("GET", "/"));
        let err = Envelope::builder(rest).payload_headers(headers.clone()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PayloadExclusivity);

        let env = Envelope::builder(soap()).payload_headers(headers).unwrap().build().unwrap();
        assert_eq!(env.payload_headers().get("x-id"), Some("1"));
    }
}
