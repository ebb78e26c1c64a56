//! Common types for the `sentry-ndk` event capture runtime.
//!
//! This crate holds the pieces of the Sentry protocol that the native capture
//! runtime writes to its outbox: events and transactions, breadcrumbs, users,
//! trace contexts, debug images and the envelope container that wraps all of
//! them on disk.  It also carries the DSN parser used to validate the
//! configured credential.
//!
//! Most types are directly serializable and implement `Default`, so records
//! can be created conveniently and missing attributes filled in:
//!
//! ```rust
//! use sentry_ndk_types::protocol::{Event, EventKind, Level};
//!
//! let event = Event {
//!     kind: EventKind::Message,
//!     message: Some("Hello World!".to_string()),
//!     level: Level::Info,
//!     ..Default::default()
//! };
//! assert_eq!(event.kind.as_str(), "message");
//! ```

#![doc(html_favicon_url = "https://sentry-brand.storage.googleapis.com/favicon.ico")]
#![doc(html_logo_url = "https://sentry-brand.storage.googleapis.com/sentry-glyph-black.png")]
#![warn(missing_docs)]

mod dsn;
pub mod protocol;
mod utils;

pub use crate::dsn::{Dsn, ParseDsnError, Scheme};
pub use crate::utils::{now_rfc3339, to_rfc3339};

pub use debugid::{CodeId, DebugId};
pub use uuid::Uuid;

/// Generates a random v4 UUID.
pub fn random_uuid() -> Uuid {
    Uuid::new_v4()
}
