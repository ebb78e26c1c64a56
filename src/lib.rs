//! A crash and event capture runtime for native applications.
//!
//! This crate records application context in a process-wide scope, builds
//! Sentry events and transactions from it, samples them and persists every
//! accepted envelope atomically into an on-disk outbox.  A separate uploader
//! (not part of this crate) picks the files up from there.
//!
//! # Core Concepts
//!
//! The runtime is driven by a [`Lifecycle`], which owns the active
//! [`Client`].  The client holds the [`ScopeStore`], a [`Sampler`], the
//! [`EventBuilder`] and a [`Transport`], by default an [`OutboxWriter`].
//! Crash handling is delegated to an optional [`Backend`].
//!
//! The free functions of this crate forward to one process-wide
//! [`Lifecycle`] and are what a binding layer calls:
//!
//! ```
//! use sentry_ndk::Level;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let mut options = sentry_ndk::Options::new();
//! options
//!     .set_dsn("https://key@sentry.io/42")
//!     .set_outbox_path(dir.path().join("outbox"));
//! sentry_ndk::init(options).unwrap();
//!
//! sentry_ndk::set_tag("screen", "home");
//! sentry_ndk::capture_message("Hello World!", Level::Info);
//! sentry_ndk::close();
//! ```
//!
//! # Features
//!
//! - `debug-logs`: Uses the `log` crate for internal diagnostics instead of
//!   printing them to stderr when the `debug` option is set.
//! - `test`: Enables the [`test`] module with an in-memory transport.

#![doc(html_favicon_url = "https://sentry-brand.storage.googleapis.com/favicon.ico")]
#![doc(html_logo_url = "https://sentry-brand.storage.googleapis.com/sentry-glyph-black.png")]
#![warn(missing_docs)]

// macros; these need to be first to be used by other modules
#[macro_use]
mod macros;

mod api;
mod backend;
mod builder;
mod capability;
mod client;
mod constants;
mod error;
mod libraries;
mod lifecycle;
mod options;
mod outbox;
mod sampler;
mod scope;
mod transport;

// public api or exports from this crate
pub use crate::api::*;
pub use crate::backend::Backend;
pub use crate::builder::EventBuilder;
pub use crate::capability::{EventCapturer, ModuleListProvider, ScopeMutator};
pub use crate::client::Client;
pub use crate::constants::{
    DATABASE_DIR_NAME, DEFAULT_ENVIRONMENT, DEFAULT_MAX_SPANS, DEFAULT_SDK_NAME, VERSION,
};
pub use crate::error::Error;
pub use crate::libraries::{DlopenLoader, LibraryGuard, LibraryLoader};
pub use crate::lifecycle::{Lifecycle, LifecycleState};
pub use crate::macros::debug_enabled;
pub use crate::options::{apply_defaults, HandlerStrategy, InvalidHandlerStrategy, Options};
pub use crate::outbox::OutboxWriter;
pub use crate::sampler::{RandomSource, Sampler, SequenceSource, ThreadRandom};
pub use crate::scope::{PropagationContext, ScopeSnapshot, ScopeStore, ScopeView};
pub use crate::transport::Transport;


// public api from other crates
#[doc(inline)]
pub use sentry_ndk_types as types;
pub use sentry_ndk_types::protocol;
pub use sentry_ndk_types::protocol::{
    Breadcrumb, DebugImage, Envelope, Event, EventKind, Level, Span, User,
};
pub use sentry_ndk_types::{Dsn, Uuid};
