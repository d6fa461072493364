//! MIME content type parsing (`type/subtype; key=value; key="quoted value"`).

use crate::error::{EnvelopeError, EnvelopeResult, ErrorCode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Lower-cased `type/subtype`.
    essence: String,
    /// Parameters in declaration order; names lower-cased, values verbatim.
    params: Vec<(String, String)>,
}

impl ContentType {
    pub fn new(essence: &str) -> Self {
        Self {
            essence: essence.trim().to_ascii_lowercase(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    pub fn parse(raw: &str) -> EnvelopeResult<Self> {
        let mut segments = split_unquoted(raw, ';').into_iter();
        let essence = segments.next().unwrap_or_default().trim().to_ascii_lowercase();
        let valid = essence
            .split_once('/')
            .map(|(t, s)| !t.is_empty() && !s.is_empty() && !s.contains('/'))
            .unwrap_or(false);
        if !valid {
            return Err(EnvelopeError::new(
                ErrorCode::InvalidContentType,
                format!("invalid content type '{}'", raw.trim()),
            ));
        }

        let mut params = Vec::new();
        for segment in segments {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let Some((name, value)) = segment.split_once('=') else {
                return Err(EnvelopeError::new(
                    ErrorCode::InvalidContentType,
                    format!("invalid content type parameter '{}' in '{}'", segment, raw.trim()),
                ));
            };
            params.push((name.trim().to_ascii_lowercase(), unquote(value.trim())));
        }

        Ok(Self { essence, params })
    }

    /// `type/subtype`, lower-cased.
    pub fn essence(&self) -> &str {
        &self.essence
    }

    pub fn is(&self, essence: &str) -> bool {
        self.essence.eq_ignore_ascii_case(essence)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn boundary(&self) -> Option<&str> {
        self.param("boundary").filter(|b| !b.is_empty())
    }

    pub fn is_multipart(&self) -> bool {
        self.essence.starts_with("multipart/")
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.essence)?;
        for (name, value) in &self.params {
            if value.is_empty() || value.chars().any(|c| is_tspecial(c) || c.is_whitespace()) {
                write!(f, "; {}=\"{}\"", name, value.replace('\\', "\\\\").replace('"', "\\\""))?;
            } else {
                write!(f, "; {}={}", name, value)?;
            }
        }
        Ok(())
    }
}

fn is_tspecial(c: char) -> bool {
    matches!(
        c,
        '(' | ')' | '<' | '>' | '@' | ',' | ';' | ':' | '\\' | '"' | '/' | '[' | ']' | '?' | '='
    )
}

fn split_unquoted(raw: &str, sep: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut escaped = false;
    for c in raw.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if quoted => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            c if c == sep && !quoted => out.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    out.push(current);
    out
}

fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
