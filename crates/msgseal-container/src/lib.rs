//! Archival container for signed message envelopes: a ZIP package holding
//! the message, its signature evidence, derived manifests and at most one
//! attachment.
//!
//! [`EnvelopeContainer`] validates its entries on construction;
//! [`ContainerCodec`] reads and writes the archive form.

pub mod codec;
pub mod config;
pub mod container;
mod error;
pub mod manifest;
pub mod naming;
pub mod verify;

pub use codec::ContainerCodec;
pub use config::ContainerConfig;
pub use container::EnvelopeContainer;
pub use naming::{escape_query_id, ContainerKind, ContainerNaming};
pub use verify::verify_container;
