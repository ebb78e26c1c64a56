//! The capabilities a binding layer consumes.
//!
//! [`Lifecycle`](crate::Lifecycle) implements all of them; the free functions
//! of this crate forward to the process-wide instance.

use std::sync::Arc;

use sentry_ndk_types::protocol::{DebugImage, Level, Span};
use sentry_ndk_types::Uuid;

/// Mutates the scope picked up by the next capture.
///
/// Every operation is total and never fails observably.
pub trait ScopeMutator {
    /// Sets a tag.
    fn set_tag(&self, key: &str, value: &str);
    /// Removes a tag.
    fn remove_tag(&self, key: &str);
    /// Sets an extra.
    fn set_extra(&self, key: &str, value: &str);
    /// Removes an extra.
    fn remove_extra(&self, key: &str);
    /// Replaces the user; all attributes absent removes it.
    fn set_user(
        &self,
        id: Option<&str>,
        email: Option<&str>,
        ip_address: Option<&str>,
        username: Option<&str>,
    );
    /// Removes the user.
    fn remove_user(&self);
    /// Appends a breadcrumb, evicting the oldest one when full.
    fn add_breadcrumb(
        &self,
        level: Option<Level>,
        message: Option<&str>,
        category: Option<&str>,
        ty: Option<&str>,
        timestamp: Option<&str>,
        data: Option<&str>,
    );
    /// Continues a trace.
    fn set_trace(&self, trace_id: Option<&str>, parent_span_id: Option<&str>);
}

/// Captures events.
///
/// Both operations return the event id, or the nil UUID when nothing was
/// captured.
pub trait EventCapturer {
    /// Captures a message.
    fn capture_message(&self, text: &str, level: Level) -> Uuid;
    /// Captures a transaction with an optional explicit sampling decision.
    fn capture_transaction(&self, name: &str, spans: Vec<Span>, sampled: Option<bool>) -> Uuid;
}

/// Provides the list of loaded binary images.
pub trait ModuleListProvider {
    /// Returns the cached module list, computing it on first use.
    fn load_module_list(&self) -> Arc<[DebugImage]>;
    /// Drops the cached module list.
    fn clear_module_list(&self);
}
