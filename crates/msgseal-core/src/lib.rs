//! Secure message envelope: streaming multipart codec with per-part digesting
//! and batch-signature hash chains.
//!
//! Inbound: [`decoder::EnvelopeDecoder`] drives a [`decoder::DecoderCallback`]
//! and returns the [`signature::PartDigests`] a verification engine checks.
//! Outbound: [`encoder::EnvelopeEncoder`] writes parts in protocol order and
//! collects the digests a signing engine signs.

pub mod catalog;
pub mod config;
pub mod content_type;
pub mod decoder;
pub mod digest;
pub mod encoder;
pub mod envelope;
pub mod error;
pub mod io;
pub mod multipart;
pub mod payload;
pub mod signature;

pub use catalog::{ContainerEntry, PartCatalog, PartName, WirePart};
pub use config::{DecodeLimits, DecodeLimitsOverrides, EnvelopeConfig};
pub use content_type::ContentType;
pub use decoder::{decode_envelope, DecoderCallback, EnvelopeCollector, EnvelopeDecoder};
pub use digest::AlgorithmRegistry;
pub use encoder::{encode_envelope, encode_fault, EncodedEnvelope, EnvelopeEncoder};
pub use envelope::{Attachment, AttachmentBody, Envelope, EnvelopeBuilder};
pub use error::{EnvelopeError, EnvelopeResult, ErrorClass, ErrorCode};
pub use payload::{Fault, Payload, PayloadKind, RestRequest, RestResponse, SoapMessage};
pub use signature::{PartDigest, PartDigests, SignatureData, SigningEngine, TimestampData};
