use std::time::Duration;

use sentry_ndk_types::protocol::Envelope;

/// The trait for transports.
///
/// A transport is responsible for persisting or sending envelopes.  The
/// default transport is the [`OutboxWriter`](crate::OutboxWriter).
pub trait Transport: Send + Sync + 'static {
    /// Sends an envelope.
    ///
    /// Failures are handled inside the transport; the caller never sees them.
    fn send_envelope(&self, envelope: Envelope);

    /// Flushes the transport queue if there is one.
    ///
    /// Returns `true` if all pending envelopes were handled in time.
    fn flush(&self, timeout: Duration) -> bool {
        let _timeout = timeout;
        true
    }

    /// Instructs the transport to shut down.
    fn shutdown(&self, timeout: Duration) -> bool {
        self.flush(timeout)
    }
}
