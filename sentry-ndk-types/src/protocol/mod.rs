//! This module exposes the types for the Sentry protocol.

pub mod envelope;
pub mod v7;

pub use self::envelope::{Envelope, EnvelopeError, EnvelopeItem};
pub use self::v7::*;
