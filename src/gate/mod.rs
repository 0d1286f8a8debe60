//! Per-request authorization gate.
//!
//! Sequences decoding, chain validation and the allow-list check, and maps
//! the single resulting outcome to a continue/reject response for the
//! mediation host.

pub mod handler;
pub mod outcome;

pub use handler::{AuthorizationGate, HeaderSource};
pub use outcome::{AuditMetadata, GateResponse, HeaderOp, ValidationOutcome};
