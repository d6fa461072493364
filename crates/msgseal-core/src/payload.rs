//! Payload variants carried in the `message` part.
//!
//! Business semantics are opaque here: SOAP and fault documents are kept as
//! text, REST requests/responses are kept as a request/status line plus headers.
//! The bytes produced by [`Payload::to_bytes`] are exactly what is digested
//! under the `message` part name. For a decoded payload that is the bytes it
//! was decoded from.

use crate::catalog::{mime, WirePart};
use crate::content_type::ContentType;
use crate::error::{EnvelopeError, EnvelopeResult, ErrorCode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Soap(SoapMessage),
    RestRequest(RestRequest),
    RestResponse(RestResponse),
    Fault(Fault),
}

/// Discriminant of [`Payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Soap,
    RestRequest,
    RestResponse,
    Fault,
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Soap(_) => PayloadKind::Soap,
            Payload::RestRequest(_) => PayloadKind::RestRequest,
            Payload::RestResponse(_) => PayloadKind::RestResponse,
            Payload::Fault(_) => PayloadKind::Fault,
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, Payload::RestRequest(_) | Payload::RestResponse(_))
    }

    /// Content type of the payload part on the wire.
    pub fn content_type(&self) -> ContentType {
        match self {
            Payload::Soap(soap) if soap.xop => ContentType::new(mime::XOP_XML)
                .with_param("charset", "UTF-8")
                .with_param("type", mime::TEXT_XML),
            Payload::Soap(_) | Payload::Fault(_) => {
                ContentType::new(mime::TEXT_XML).with_param("charset", "UTF-8")
            }
            Payload::RestRequest(_) => ContentType::new(mime::REST_REQUEST),
            Payload::RestResponse(_) => ContentType::new(mime::REST_RESPONSE),
        }
    }

    /// Serialized form, as written to the wire and stored in containers.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Payload::Soap(soap) => soap.xml.as_bytes().to_vec(),
            Payload::Fault(fault) => fault.xml.as_bytes().to_vec(),
            Payload::RestRequest(req) => req.to_bytes(),
            Payload::RestResponse(res) => res.to_bytes(),
        }
    }

    /// Parse a payload part that was classified as `part`.
    pub fn parse(part: WirePart, bytes: Vec<u8>) -> EnvelopeResult<Self> {
        let text = String::from_utf8(bytes).map_err(|e| {
            EnvelopeError::new(
                ErrorCode::MalformedPayload,
                format!("payload is not valid UTF-8: {}", e.utf8_error()),
            )
        })?;
        match part {
            WirePart::Xml => Ok(Payload::Soap(SoapMessage::new(text)?)),
            WirePart::XopPayload => Ok(Payload::Soap(SoapMessage::xop(text)?)),
            WirePart::RestRequest => Ok(Payload::RestRequest(RestRequest::parse(&text)?)),
            WirePart::RestResponse => Ok(Payload::RestResponse(RestResponse::parse(&text)?)),
            other => Err(EnvelopeError::new(
                ErrorCode::InvalidContentType,
                format!("{:?} is not a payload part", other),
            )),
        }
    }

    /// Whether a REST payload announces a body part.
    pub fn declares_body(&self) -> bool {
        match self {
            Payload::RestRequest(req) => declares_body(&req.headers),
            Payload::RestResponse(res) => declares_body(&res.headers),
            Payload::Soap(_) | Payload::Fault(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapMessage {
    pub xml: String,
    /// Sent as `application/xop+xml` (MTOM) instead of `text/xml`.
    pub xop: bool,
}

impl SoapMessage {
    pub fn new(xml: impl Into<String>) -> EnvelopeResult<Self> {
        let xml = xml.into();
        if xml.trim().is_empty() {
            return Err(EnvelopeError::new(ErrorCode::MalformedPayload, "SOAP message is empty"));
        }
        Ok(Self { xml, xop: false })
    }

    pub fn xop(xml: impl Into<String>) -> EnvelopeResult<Self> {
        Ok(Self {
            xop: true,
            ..Self::new(xml)?
        })
    }
}

/// A fault document sent instead of a payload or instead of the signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub xml: String,
}

impl Fault {
    pub fn new(xml: impl Into<String>) -> Self {
        Self { xml: xml.into() }
    }

    pub fn fault_code(&self) -> Option<&str> {
        element_text(&self.xml, "faultcode")
    }

    pub fn fault_string(&self) -> Option<&str> {
        element_text(&self.xml, "faultstring")
    }
}

/// Text of the first element with the given local name, ignoring namespace prefixes.
fn element_text<'a>(xml: &'a str, local: &str) -> Option<&'a str> {
    let mut rest = xml;
    while let Some(open) = rest.find('<') {
        let after = &rest[open + 1..];
        let tag_end = after.find('>')?;
        let tag = &after[..tag_end];
        let name = tag.split_whitespace().next().unwrap_or("");
        let name_local = name.rsplit(':').next().unwrap_or(name);
        if !tag.starts_with('/') && !tag.ends_with('/') && name_local == local {
            let body = &after[tag_end + 1..];
            let close = format!("</{}>", name);
            let end = body.find(&close)?;
            return Some(body[..end].trim());
        }
        rest = &after[tag_end + 1..];
    }
    None
}

/// A REST request line plus headers.
///
/// A parsed request remembers its wire bytes and [`RestRequest::to_bytes`]
/// returns them unchanged, so the digested and archived message stay
/// byte-identical. Requests built in code serialize canonically with CRLF
/// line endings. Equality compares the parsed fields only. Editing the public
/// fields of a parsed request in place does not change its wire form.
#[derive(Debug, Clone)]
pub struct RestRequest {
    pub method: String,
    /// Path and query.
    pub target: String,
    pub headers: Vec<(String, String)>,
    wire: Option<String>,
}

impl RestRequest {
    pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            target: target.into(),
            headers: Vec::new(),
            wire: None,
        }
    }

    /// Adding a header drops the remembered wire form.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self.wire = None;
        self
    }

    /// Wire bytes this request was parsed from, if any.
    pub fn wire(&self) -> Option<&str> {
        self.wire.as_deref()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match &self.wire {
            Some(wire) => wire.as_bytes().to_vec(),
            None => serialize(&format!("{} {}", self.method, self.target), &self.headers),
        }
    }

    pub fn parse(text: &str) -> EnvelopeResult<Self> {
        let (first, headers) = parse_head(text)?;
        let (method, target) = first
            .split_once(' ')
            .filter(|(m, t)| !m.is_empty() && !t.trim().is_empty() && m.chars().all(|c| c.is_ascii_alphabetic()))
            .ok_or_else(|| malformed_rest(format!("invalid REST request line '{}'", first)))?;
        Ok(Self {
            method: method.to_string(),
            target: target.trim().to_string(),
            headers,
            wire: Some(text.to_string()),
        })
    }
}

impl PartialEq for RestRequest {
    fn eq(&self, other: &Self) -> bool {
        self.method == other.method && self.target == other.target && self.headers == other.headers
    }
}

impl Eq for RestRequest {}

/// A REST status line plus headers. Keeps its wire bytes like [`RestRequest`].
#[derive(Debug, Clone)]
pub struct RestResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    wire: Option<String>,
}

impl RestResponse {
    pub fn new(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            headers: Vec::new(),
            wire: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self.wire = None;
        self
    }

    pub fn wire(&self) -> Option<&str> {
        self.wire.as_deref()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        if let Some(wire) = &self.wire {
            return wire.as_bytes().to_vec();
        }
        let line = if self.reason.is_empty() {
            self.status.to_string()
        } else {
            format!("{} {}", self.status, self.reason)
        };
        serialize(&line, &self.headers)
    }

    pub fn parse(text: &str) -> EnvelopeResult<Self> {
        let (first, headers) = parse_head(text)?;
        let (code, reason) = first.split_once(' ').unwrap_or((first, ""));
        let status: u16 = code
            .parse()
            .ok()
            .filter(|s| (100..1000).contains(s))
            .ok_or_else(|| malformed_rest(format!("invalid REST status line '{}'", first)))?;
        Ok(Self {
            status,
            reason: reason.trim().to_string(),
            headers,
            wire: Some(text.to_string()),
        })
    }
}

impl PartialEq for RestResponse {
    fn eq(&self, other: &Self) -> bool {
        self.status == other.status && self.reason == other.reason && self.headers == other.headers
    }
}

impl Eq for RestResponse {}

fn serialize(first_line: &str, headers: &[(String, String)]) -> Vec<u8> {
    let mut out = String::with_capacity(first_line.len() + 2 + headers.len() * 32);
    out.push_str(first_line);
    out.push_str("\r\n");
    for (name, value) in headers {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    }
    out.into_bytes()
}

fn parse_head(text: &str) -> EnvelopeResult<(&str, Vec<(String, String)>)> {
    let mut lines = text.lines().map(|l| l.strip_suffix('\r').unwrap_or(l));
    let first = lines
        .next()
        .filter(|l| !l.trim().is_empty())
        .ok_or_else(|| malformed_rest("REST payload is empty".to_string()))?;
    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| malformed_rest(format!("invalid REST header line '{}'", line)))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }
    Ok((first.trim(), headers))
}

fn malformed_rest(message: String) -> EnvelopeError {
    EnvelopeError::new(ErrorCode::MalformedPayload, message)
}

fn declares_body(headers: &[(String, String)]) -> bool {
    headers.iter().any(|(name, value)| {
        name.eq_ignore_ascii_case("content-type")
            || name.eq_ignore_ascii_case("transfer-encoding")
            || (name.eq_ignore_ascii_case("content-length")
                && value.trim().parse::<u64>().map(|n| n > 0).unwrap_or(false))
    })
}
