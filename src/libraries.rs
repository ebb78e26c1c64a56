//! Loading of the native libraries the runtime depends on.

use std::borrow::Cow;
use std::sync::{Arc, OnceLock};

use crate::{sentry_debug, Error};

/// Loads a shared library by name.
pub trait LibraryLoader: Send + Sync {
    /// Loads `name`, returning the loader's error message on failure.
    fn load(&self, name: &str) -> Result<(), String>;
}

/// Loads libraries through the platform's dynamic loader.
///
/// Plain names such as `sentry` resolve to `libsentry.so`.  Names that
/// already look like a file (`.so` suffix or a path) are used as given.
/// Loaded libraries stay loaded for the lifetime of the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct DlopenLoader;

fn library_file_name(name: &str) -> Cow<'_, str> {
    if name.contains('/') || name.ends_with(".so") || name.contains(".so.") {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("lib{}.so", name))
    }
}

#[cfg(unix)]
impl LibraryLoader for DlopenLoader {
    fn load(&self, name: &str) -> Result<(), String> {
        use std::ffi::{CStr, CString};

        let file_name = CString::new(library_file_name(name).as_bytes())
            .map_err(|err| err.to_string())?;
        // SAFETY: `file_name` is a valid NUL terminated string.  The handle is
        // intentionally never closed.
        let handle = unsafe { libc::dlopen(file_name.as_ptr(), libc::RTLD_NOW | libc::RTLD_GLOBAL) };
        if !handle.is_null() {
            return Ok(());
        }
        // SAFETY: `dlerror` returns null or a pointer to a NUL terminated
        // string that stays valid until the next `dlerror` call on this thread.
        let message = unsafe {
            let err = libc::dlerror();
            if err.is_null() {
                "unknown dlopen failure".to_string()
            } else {
                CStr::from_ptr(err).to_string_lossy().into_owned()
            }
        };
        Err(message)
    }
}

#[cfg(not(unix))]
impl LibraryLoader for DlopenLoader {
    fn load(&self, name: &str) -> Result<(), String> {
        Err(format!(
            "cannot load {}: dynamic loading is not supported on this platform",
            library_file_name(name)
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LoadFailure {
    library: String,
    reason: String,
}

/// Runs native library loading exactly once.
///
/// The first caller loads; concurrent callers block until the outcome is
/// known.  The outcome, including a failure, is kept for every later call.
#[derive(Debug, Default)]
pub struct LibraryGuard {
    outcome: OnceLock<Result<(), LoadFailure>>,
}

impl LibraryGuard {
    /// Creates a guard that has not loaded anything yet.
    pub const fn new() -> LibraryGuard {
        LibraryGuard {
            outcome: OnceLock::new(),
        }
    }

    /// Loads `libraries` in order unless this guard already ran.
    pub fn ensure_loaded(
        &self,
        libraries: &[Cow<'static, str>],
        loader: &dyn LibraryLoader,
    ) -> Result<(), Error> {
        let outcome = self.outcome.get_or_init(|| {
            for library in libraries {
                sentry_debug!("[LibraryGuard] loading native library {}", library);
                loader.load(library).map_err(|reason| LoadFailure {
                    library: library.to_string(),
                    reason,
                })?;
            }
            Ok(())
        });
        outcome.clone().map_err(|failure| Error::Load {
            library: failure.library,
            reason: failure.reason,
        })
    }

    /// Returns `true` once loading ran to completion, successfully or not.
    pub fn is_settled(&self) -> bool {
        self.outcome.get().is_some()
    }
}

lazy_static::lazy_static! {
    /// Process-wide guard used by [`Lifecycle::new`](crate::Lifecycle::new).
    pub(crate) static ref NATIVE_LIBRARIES: Arc<LibraryGuard> = Arc::new(LibraryGuard::new());
}
