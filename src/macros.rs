use std::sync::atomic::{AtomicBool, Ordering};

static DEBUG: AtomicBool = AtomicBool::new(false);

/// Returns `true` if SDK debug output is currently enabled.
pub fn debug_enabled() -> bool {
    DEBUG.load(Ordering::Relaxed)
}

pub(crate) fn set_debug(enabled: bool) {
    DEBUG.store(enabled, Ordering::Relaxed);
}

/// Prints SDK diagnostics.
///
/// With the `debug-logs` feature the message goes to the `sentry` logger at
/// debug level, independently of the `debug` option.
#[doc(hidden)]
#[macro_export]
macro_rules! sentry_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "debug-logs")]
        {
            ::log::debug!(target: "sentry", $($arg)*);
        }
        #[cfg(not(feature = "debug-logs"))]
        {
            if $crate::debug_enabled() {
                eprint!("[sentry] ");
                eprintln!($($arg)*);
            }
        }
    }};
}
