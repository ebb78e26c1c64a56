use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::time::Duration;

use sentry_ndk_types::protocol::{DebugImage, Level, Span};
use sentry_ndk_types::Uuid;

use crate::capability::{EventCapturer, ModuleListProvider, ScopeMutator};
use crate::libraries::{DlopenLoader, LibraryGuard, LibraryLoader, NATIVE_LIBRARIES};
use crate::scope::ScopeStore;
use crate::{sentry_debug, Client, Error, Options};

/// The state of a [`Lifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// `init` was never called.
    Uninitialized,
    /// A client is bound and captures are recorded.
    Initialized,
    /// The client was closed; a new `init` starts over.
    Closed,
}

struct Inner {
    state: LifecycleState,
    client: Option<Arc<Client>>,
}

/// Owns the active client and moves it through its states.
///
/// `Uninitialized -> Initialized -> Closed`, and back to `Initialized` on a
/// new `init`.  Calling `init` while initialized closes the active client and
/// replaces it with one built from the new options.  Captures outside of
/// `Initialized` are silently dropped.
pub struct Lifecycle {
    inner: RwLock<Inner>,
    libraries: Arc<LibraryGuard>,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("state", &self.state())
            .finish()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Lifecycle::new()
    }
}

impl Lifecycle {
    /// Creates an uninitialized lifecycle sharing the process-wide native
    /// library guard.
    pub fn new() -> Lifecycle {
        Lifecycle::with_library_guard(NATIVE_LIBRARIES.clone())
    }

    /// Creates an uninitialized lifecycle with its own library guard.
    pub fn with_library_guard(libraries: Arc<LibraryGuard>) -> Lifecycle {
        Lifecycle {
            inner: RwLock::new(Inner {
                state: LifecycleState::Uninitialized,
                client: None,
            }),
            libraries,
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// The current state.
    pub fn state(&self) -> LifecycleState {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    /// The active client, if initialized.
    pub fn client(&self) -> Option<Arc<Client>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .client
            .clone()
    }

    /// The scope store of the active client, if initialized.
    pub fn scope(&self) -> Option<Arc<ScopeStore>> {
        self.client().map(|client| client.scope().clone())
    }

    fn with_client<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Client) -> R,
        R: Default,
    {
        match self.client() {
            Some(client) => f(&client),
            None => Default::default(),
        }
    }

    /// Initializes the runtime.
    ///
    /// Native libraries are loaded first, once per library guard.  A load
    /// failure is remembered and returned by every later call.  An already
    /// active client is closed and replaced.
    pub fn init(&self, options: Options) -> Result<(), Error> {
        if !options.native_libraries().is_empty() {
            let loader: &dyn LibraryLoader = match options.library_loader() {
                Some(loader) => loader.as_ref(),
                None => &DlopenLoader,
            };
            self.libraries
                .ensure_loaded(options.native_libraries(), loader)?;
        }

        let mut inner = self.write();
        if let Some(previous) = inner.client.take() {
            sentry_debug!("[Lifecycle] replacing the active client");
            previous.close(None);
            inner.state = LifecycleState::Closed;
        }

        let client = Client::with_options(options)?;
        match client.dsn() {
            Some(dsn) => sentry_debug!("[Lifecycle] initialized for DSN {}", dsn),
            None => sentry_debug!("[Lifecycle] initialized without a valid DSN"),
        }
        inner.client = Some(Arc::new(client));
        inner.state = LifecycleState::Initialized;
        Ok(())
    }

    /// Flushes the active client.
    pub fn flush(&self, timeout: Option<Duration>) -> bool {
        match self.client() {
            Some(client) => client.flush(timeout),
            None => true,
        }
    }

    /// Closes the runtime.
    ///
    /// Flushes and shuts down the client and the crash backend and drops the
    /// cached module list.  Does nothing unless initialized.
    pub fn close(&self) {
        let client = {
            let mut inner = self.write();
            let Some(client) = inner.client.take() else {
                return;
            };
            inner.state = LifecycleState::Closed;
            client
        };
        client.close(None);
        sentry_ndk_modules::clear_module_list();
        sentry_debug!("[Lifecycle] closed");
    }
}

impl ScopeMutator for Lifecycle {
    fn set_tag(&self, key: &str, value: &str) {
        self.with_client(|client| client.scope().set_tag(key, value))
    }

    fn remove_tag(&self, key: &str) {
        self.with_client(|client| client.scope().remove_tag(key))
    }

    fn set_extra(&self, key: &str, value: &str) {
        self.with_client(|client| client.scope().set_extra(key, value))
    }

    fn remove_extra(&self, key: &str) {
        self.with_client(|client| client.scope().remove_extra(key))
    }

    fn set_user(
        &self,
        id: Option<&str>,
        email: Option<&str>,
        ip_address: Option<&str>,
        username: Option<&str>,
    ) {
        self.with_client(|client| client.scope().set_user(id, email, ip_address, username))
    }

    fn remove_user(&self) {
        self.with_client(|client| client.scope().remove_user())
    }

    fn add_breadcrumb(
        &self,
        level: Option<Level>,
        message: Option<&str>,
        category: Option<&str>,
        ty: Option<&str>,
        timestamp: Option<&str>,
        data: Option<&str>,
    ) {
        self.with_client(|client| {
            client
                .scope()
                .add_breadcrumb(level, message, category, ty, timestamp, data)
        })
    }

    fn set_trace(&self, trace_id: Option<&str>, parent_span_id: Option<&str>) {
        self.with_client(|client| client.scope().set_trace(trace_id, parent_span_id))
    }
}

impl EventCapturer for Lifecycle {
    fn capture_message(&self, text: &str, level: Level) -> Uuid {
        self.with_client(|client| client.capture_message(text, level))
    }

    fn capture_transaction(&self, name: &str, spans: Vec<Span>, sampled: Option<bool>) -> Uuid {
        self.with_client(|client| client.capture_transaction(name, spans, sampled))
    }
}

impl ModuleListProvider for Lifecycle {
    fn load_module_list(&self) -> Arc<[DebugImage]> {
        sentry_ndk_modules::load_module_list()
    }

    fn clear_module_list(&self) {
        sentry_ndk_modules::clear_module_list()
    }
}
