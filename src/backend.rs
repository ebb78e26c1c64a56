use std::io;
use std::sync::Arc;

use crate::scope::ScopeStore;
use crate::Options;

/// The crash handler the runtime starts and stops with the client.
///
/// Installing signal handlers and writing minidumps is the backend's job.
/// A handler running in a fault context must only read the scope through
/// [`ScopeStore::try_with_scope`], which borrows the live
/// scope without copying it.
pub trait Backend: Send + Sync {
    /// Installs the crash handler.  An error fails `init`.
    fn startup(&self, options: &Options, scope: &Arc<ScopeStore>) -> io::Result<()>;

    /// Uninstalls the crash handler.
    fn shutdown(&self) {}
}
