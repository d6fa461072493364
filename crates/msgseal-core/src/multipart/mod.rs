//! Multipart (RFC 2046) streaming reader and writer.

pub mod headers;
pub mod reader;
pub mod writer;

pub use headers::{PartHeaders, CONTENT_TRANSFER_ENCODING, CONTENT_TYPE};
pub use reader::{MultipartReader, PartBody};
pub use writer::{generate_boundary, Boundary, MultipartWriter};

/// Tag carried by I/O errors raised for structurally broken multipart input.
pub const MALFORMED_TAG: &str = "MalformedMultipart";

pub(crate) fn malformed(message: &str) -> std::io::Error {
    std::io::Error::other(format!("{}: {}", MALFORMED_TAG, message))
}
