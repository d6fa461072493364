use crate::content_type::ContentType;
use crate::error::{EnvelopeError, EnvelopeResult, ErrorCode};

pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_TRANSFER_ENCODING: &str = "Content-Transfer-Encoding";

/// Ordered, case-insensitive part headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartHeaders(Vec<(String, String)>);

impl PartHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Headers other than the ones the codec writes itself.
    pub fn without_codec_headers(&self) -> PartHeaders {
        PartHeaders(
            self.0
                .iter()
                .filter(|(n, _)| {
                    !n.eq_ignore_ascii_case(CONTENT_TYPE)
                        && !n.eq_ignore_ascii_case(CONTENT_TRANSFER_ENCODING)
                })
                .cloned()
                .collect(),
        )
    }

    /// The declared content type. Parts without one are rejected: the
    /// decoder dispatches on content type alone.
    pub fn content_type(&self) -> EnvelopeResult<ContentType> {
        let raw = self.get(CONTENT_TYPE).ok_or_else(|| {
            EnvelopeError::new(ErrorCode::InvalidContentType, "part has no Content-Type header")
        })?;
        ContentType::parse(raw)
    }

    /// Parse one header block (lines without the terminating empty line).
    pub(crate) fn parse_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> EnvelopeResult<Self> {
        let mut headers = PartHeaders::new();
        for line in lines {
            if line.starts_with(' ') || line.starts_with('\t') {
                let Some((_, last)) = headers.0.last_mut() else {
                    return Err(EnvelopeError::new(
                        ErrorCode::MalformedHeaders,
                        "header continuation line without a header",
                    ));
                };
                last.push(' ');
                last.push_str(line.trim());
                continue;
            }
            let Some((name, value)) = line.split_once(':') else {
                return Err(EnvelopeError::new(
                    ErrorCode::MalformedHeaders,
                    format!("malformed header line '{}'", line),
                ));
            };
            let name = name.trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(EnvelopeError::new(
                    ErrorCode::MalformedHeaders,
                    format!("invalid header name in '{}'", line),
                ));
            }
            headers.push(name, value.trim());
        }
        Ok(headers)
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for PartHeaders {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        PartHeaders(iter.into_iter().map(|(n, v)| (n.into(), v.into())).collect())
    }
}
