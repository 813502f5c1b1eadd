//! Domain types shared across the policy engine.

pub mod envelope;
pub mod error;

pub use envelope::{EnvelopeError, ResponseEnvelope};
pub use error::{PolicyError, Result};
