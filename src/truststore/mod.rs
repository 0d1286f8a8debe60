//! Trust anchors for forwarded client certificates.
//!
//! The trust store is read once at startup and shared read-only by every
//! request evaluation.

mod archive;
pub mod store;

pub use store::{TrustAnchor, TrustAnchorSet};
