//! Error taxonomy for envelope decoding, encoding and container handling.
//!
//! Every failure carries a stable [`ErrorCode`] and the [`ErrorClass`] it belongs to,
//! plus a human-readable message naming the offending part or entry.

use serde::Serialize;

/// Error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorClass {
    /// Malformed multipart structure, misplaced part, wrong content type.
    Format,
    /// A required container entry is blank or absent.
    MissingPart,
    /// Stream I/O, temp-file allocation, archive codec, algorithm resolution.
    Resource,
    /// Invariant between parts violated (hash-chain pair, payload exclusivity).
    Consistency,
    /// Caller invoked an operation out of sequence.
    Contract,
    /// An application callback returned an error.
    Consumer,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Stable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    // Format
    InvalidMessage,
    MissingBoundary,
    InvalidContentType,
    UnexpectedPart,
    TrailingContent,
    MalformedMultipart,
    MalformedHeaders,
    MalformedPayload,
    MissingPayload,
    MissingSignaturePart,
    FaultNotAllowed,
    LimitExceeded,
    // MissingPart
    MissingMimetype,
    MissingMessage,
    MissingSignature,
    MissingSignatureHashChainResult,
    MissingSignatureHashChain,
    MissingTimestampHashChainResult,
    MissingTimestampHashChain,
    MissingManifest,
    MissingAsicManifest,
    // Resource
    Io,
    TempFile,
    UnsupportedAlgorithm,
    Archive,
    // Consistency
    HashChainPair,
    PayloadExclusivity,
    RestBodyExclusivity,
    RestBodyMissing,
    AttachmentLimit,
    // Contract
    EncoderSequence,
    // Consumer
    CallbackFailed,
}

impl ErrorCode {
    pub fn class(self) -> ErrorClass {
        use ErrorCode::*;
        match self {
            InvalidMessage | MissingBoundary | InvalidContentType | UnexpectedPart
            | TrailingContent | MalformedMultipart | MalformedHeaders | MalformedPayload
            | MissingPayload | MissingSignaturePart | FaultNotAllowed | LimitExceeded => {
                ErrorClass::Format
            }
            MissingMimetype
            | MissingMessage
            | MissingSignature
            | MissingSignatureHashChainResult
            | MissingSignatureHashChain
            | MissingTimestampHashChainResult
            | MissingTimestampHashChain
            | MissingManifest
            | MissingAsicManifest => ErrorClass::MissingPart,
            Io | TempFile | UnsupportedAlgorithm | Archive => ErrorClass::Resource,
            HashChainPair | PayloadExclusivity | RestBodyExclusivity | RestBodyMissing
            | AttachmentLimit => ErrorClass::Consistency,
            EncoderSequence => ErrorClass::Contract,
            CallbackFailed => ErrorClass::Consumer,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Typed envelope error with stable code.
#[derive(Debug, thiserror::Error)]
#[error("{class}: {message} ({code})")]
pub struct EnvelopeError {
    pub class: ErrorClass,
    pub code: ErrorCode,
    pub message: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl EnvelopeError {
    /// Build an error; the class is derived from the code.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            class: code.class(),
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.message = format!("{}: {}", context.into(), self.message);
        self
    }

    pub fn class(&self) -> ErrorClass {
        self.class
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Structural violation of the wire format.
    pub fn invalid_message(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidMessage, message)
    }

    /// Application callback failure, keeping the callback's error chain.
    pub fn callback(part: &str, err: anyhow::Error) -> Self {
        Self::new(
            ErrorCode::CallbackFailed,
            format!("callback failed while handling '{}': {}", part, err),
        )
        .with_source(err)
    }

    pub fn sequence(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EncoderSequence, message)
    }
}

// IO errors default to Resource/Io. Limit overflows raised by `BoundedReader`
// are recognised by their tag and reclassified.
impl From<std::io::Error> for EnvelopeError {
    fn from(err: std::io::Error) -> Self {
        let message = err.to_string();
        let code = if message.contains(crate::io::LIMIT_TAG) {
            ErrorCode::LimitExceeded
        } else if message.contains(crate::multipart::MALFORMED_TAG) {
            ErrorCode::MalformedMultipart
        } else {
            ErrorCode::Io
        };
        Self::new(code, message).with_source(err)
    }
}

/// Result type for envelope operations.
pub type EnvelopeResult<T> = Result<T, EnvelopeError>;
