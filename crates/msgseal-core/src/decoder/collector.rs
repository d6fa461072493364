use super::DecoderCallback;
use crate::content_type::ContentType;
use crate::envelope::{Attachment, AttachmentBody, Envelope, EnvelopeBuilder};
use crate::error::{EnvelopeError, EnvelopeResult, ErrorCode};
use crate::multipart::PartHeaders;
use crate::payload::{Fault, Payload};
use crate::signature::SignatureData;
use std::io::Read;

/// Callback that assembles a complete [`Envelope`].
///
/// REST bodies and attachments are spooled, spilling to temp files past
/// `spool_threshold`.
#[derive(Debug)]
pub struct EnvelopeCollector {
    spool_threshold: usize,
    ocsp_responses: Vec<Vec<u8>>,
    payload: Option<(Payload, PartHeaders)>,
    rest_body: Option<AttachmentBody>,
    attachments: Vec<Attachment>,
    signature: Option<SignatureData>,
    fault: Option<Fault>,
    completed: bool,
}

impl EnvelopeCollector {
    pub fn new(spool_threshold: usize) -> Self {
        Self {
            spool_threshold,
            ocsp_responses: Vec::new(),
            payload: None,
            rest_body: None,
            attachments: Vec::new(),
            signature: None,
            fault: None,
            completed: false,
        }
    }

    /// Fault received instead of the signature or as a standalone message.
    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Build the envelope. A standalone fault becomes the payload.
    pub fn into_envelope(self) -> EnvelopeResult<Envelope> {
        if !self.completed {
            return Err(EnvelopeError::invalid_message("decode did not complete"));
        }
        let (payload, headers) = match (self.payload, self.fault.clone()) {
            (Some(found), _) => found,
            (None, Some(fault)) => (Payload::Fault(fault), PartHeaders::new()),
            (None, None) => {
                return Err(EnvelopeError::new(ErrorCode::MissingPayload, "no payload was decoded"));
            }
        };

        let mut builder = EnvelopeBuilder::new(payload).payload_headers(headers)?;
        if let Some(body) = self.rest_body {
            builder = builder.rest_body(body)?;
        }
        for attachment in self.attachments {
            builder = builder.attachment(attachment)?;
        }
        for der in self.ocsp_responses {
            builder = builder.ocsp_response(der);
        }
        if let Some(signature) = self.signature {
            builder = builder.signature(signature);
        }
        builder.build()
    }
}

impl DecoderCallback for EnvelopeCollector {
    fn ocsp_response(&mut self, der: Vec<u8>) -> anyhow::Result<()> {
        self.ocsp_responses.push(der);
        Ok(())
    }

    fn payload(&mut self, payload: Payload, headers: PartHeaders) -> anyhow::Result<()> {
        self.payload = Some((payload, headers));
        Ok(())
    }

    fn rest_body(&mut self, body: &mut dyn Read) -> anyhow::Result<()> {
        self.rest_body = Some(AttachmentBody::from_reader(body, self.spool_threshold)?);
        Ok(())
    }

    fn attachment(
        &mut self,
        _index: usize,
        content_type: &ContentType,
        headers: &PartHeaders,
        body: &mut dyn Read,
    ) -> anyhow::Result<()> {
        let body = AttachmentBody::from_reader(body, self.spool_threshold)?;
        self.attachments
            .push(Attachment::new(content_type.clone(), body).with_headers(headers.clone()));
        Ok(())
    }

    fn signature(&mut self, signature: &SignatureData) -> anyhow::Result<()> {
        self.signature = Some(signature.clone());
        Ok(())
    }

    fn fault(&mut self, fault: &Fault) -> anyhow::Result<()> {
        self.fault = Some(fault.clone());
        Ok(())
    }

    fn completed(&mut self) -> anyhow::Result<()> {
        self.completed = true;
        Ok(())
    }
}
