use std::sync::Arc;
use std::time::Duration;

use sentry_ndk_types::protocol::{DebugImage, Level, Span};
use sentry_ndk_types::Uuid;

use crate::capability::{EventCapturer, ModuleListProvider, ScopeMutator};
use crate::{Error, Lifecycle, Options};

lazy_static::lazy_static! {
    static ref PROCESS: Lifecycle = Lifecycle::new();
}

/// Returns the process-wide lifecycle the free functions forward to.
pub fn process() -> &'static Lifecycle {
    &PROCESS
}

/// Initializes the process-wide runtime.
///
/// Configured native libraries are loaded once per process; a load failure
/// is returned from this and every later call.  Initializing again closes
/// the active client and replaces it.
///
/// # Example
///
/// ```
/// let dir = tempfile::tempdir().unwrap();
/// let mut options = sentry_ndk::Options::new();
/// options
///     .set_dsn("https://key@sentry.io/42")
///     .set_outbox_path(dir.path().join("outbox"));
/// sentry_ndk::init(options).unwrap();
/// sentry_ndk::close();
/// ```
pub fn init(options: Options) -> Result<(), Error> {
    PROCESS.init(options)
}

/// Flushes and closes the process-wide runtime.
///
/// Does nothing unless initialized.
pub fn close() {
    PROCESS.close()
}

/// Flushes pending envelopes of the active client.
pub fn flush(timeout: Option<Duration>) -> bool {
    PROCESS.flush(timeout)
}

/// Sets a tag on the process scope.
pub fn set_tag(key: &str, value: &str) {
    PROCESS.set_tag(key, value)
}

/// Removes a tag from the process scope.
pub fn remove_tag(key: &str) {
    PROCESS.remove_tag(key)
}

/// Sets an extra value on the process scope.
pub fn set_extra(key: &str, value: &str) {
    PROCESS.set_extra(key, value)
}

/// Removes an extra value from the process scope.
pub fn remove_extra(key: &str) {
    PROCESS.remove_extra(key)
}

/// Sets the user.  If every field is `None` the user is cleared.
pub fn set_user(
    id: Option<&str>,
    email: Option<&str>,
    ip_address: Option<&str>,
    username: Option<&str>,
) {
    PROCESS.set_user(id, email, ip_address, username)
}

/// Clears the user.
pub fn remove_user() {
    PROCESS.remove_user()
}

/// Records a breadcrumb.
///
/// A missing timestamp defaults to now.  `data` is stored under the `"data"`
/// key of the breadcrumb's data map.
pub fn add_breadcrumb(
    level: Option<Level>,
    message: Option<&str>,
    category: Option<&str>,
    ty: Option<&str>,
    timestamp: Option<&str>,
    data: Option<&str>,
) {
    PROCESS.add_breadcrumb(level, message, category, ty, timestamp, data)
}

/// Replaces the propagation context.
pub fn set_trace(trace_id: Option<&str>, parent_span_id: Option<&str>) {
    PROCESS.set_trace(trace_id, parent_span_id)
}

/// Captures a message.
///
/// Returns the event id, or the nil UUID if the runtime is not initialized
/// or the event was sampled out.
pub fn capture_message(text: &str, level: Level) -> Uuid {
    PROCESS.capture_message(text, level)
}

/// Captures a transaction with its spans.
pub fn capture_transaction(name: &str, spans: Vec<Span>, sampled: Option<bool>) -> Uuid {
    PROCESS.capture_transaction(name, spans, sampled)
}

/// Returns the cached list of loaded images, enumerating them on first use.
pub fn load_module_list() -> Arc<[DebugImage]> {
    PROCESS.load_module_list()
}

/// Drops the cached list of loaded images.
pub fn clear_module_list() {
    PROCESS.clear_module_list()
}
