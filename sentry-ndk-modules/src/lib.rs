//! The module list loader of the native capture runtime.
//!
//! [`load_module_list`] enumerates the binary images loaded into the current
//! process and caches the result, so repeated calls are cheap.  The cache is
//! dropped with [`clear_module_list`], after which the next load enumerates
//! again.
//!
//! ```rust
//! let first = sentry_ndk_modules::load_module_list();
//! let second = sentry_ndk_modules::load_module_list();
//! assert_eq!(first.len(), second.len());
//! ```

#![doc(html_favicon_url = "https://sentry-brand.storage.googleapis.com/favicon.ico")]
#![doc(html_logo_url = "https://sentry-brand.storage.googleapis.com/sentry-glyph-black.png")]
#![warn(missing_docs)]
#![deny(unsafe_code)]

mod cache;
mod images;

pub use cache::{clear_module_list, load_module_list, ModuleCache, ModuleSource, SharedLibraries};
pub use images::debug_images;
