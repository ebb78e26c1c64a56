use std::sync::{Arc, Mutex, PoisonError};

use sentry_ndk_types::protocol::DebugImage;

use crate::images::debug_images;

/// A source of loaded binary images.
pub trait ModuleSource: Send + Sync {
    /// Enumerates the images currently loaded into the process.
    fn enumerate(&self) -> Vec<DebugImage>;
}

/// The default source, backed by the dynamic loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct SharedLibraries;

impl ModuleSource for SharedLibraries {
    fn enumerate(&self) -> Vec<DebugImage> {
        debug_images()
    }
}

/// Caches the enumerated module list until it is cleared.
pub struct ModuleCache {
    source: Box<dyn ModuleSource>,
    modules: Mutex<Option<Arc<[DebugImage]>>>,
}

impl ModuleCache {
    /// Creates an empty cache over the given source.
    pub fn new<S: ModuleSource + 'static>(source: S) -> ModuleCache {
        ModuleCache {
            source: Box::new(source),
            modules: Mutex::new(None),
        }
    }

    /// Returns the cached module list, enumerating it on first use.
    ///
    /// The lock is held while enumerating so concurrent callers share a
    /// single enumeration.
    pub fn load(&self) -> Arc<[DebugImage]> {
        let mut modules = self.modules.lock().unwrap_or_else(PoisonError::into_inner);
        modules
            .get_or_insert_with(|| Arc::from(self.source.enumerate()))
            .clone()
    }

    /// Drops the cached list.  Lists handed out earlier stay valid.
    pub fn clear(&self) {
        self.modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Returns `true` if a list is currently cached.
    pub fn is_cached(&self) -> bool {
        self.modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Default for ModuleCache {
    fn default() -> Self {
        ModuleCache::new(SharedLibraries)
    }
}

lazy_static::lazy_static! {
    static ref PROCESS_MODULES: ModuleCache = ModuleCache::default();
}

/// Returns the list of images loaded into this process.
///
/// The list is computed once and cached; an empty list is a valid result.
pub fn load_module_list() -> Arc<[DebugImage]> {
    PROCESS_MODULES.load()
}

/// Clears the cached module list so the next load enumerates again.
pub fn clear_module_list() {
    PROCESS_MODULES.clear();
}
