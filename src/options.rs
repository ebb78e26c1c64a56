use std::borrow::Cow;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::backend::Backend;
use crate::constants::{DATABASE_DIR_NAME, DEFAULT_ENVIRONMENT, DEFAULT_MAX_SPANS, DEFAULT_SDK_NAME};
use crate::libraries::LibraryLoader;
use crate::sampler::RandomSource;
use crate::transport::Transport;

/// How the crash backend installs its signal handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HandlerStrategy {
    /// Install the SDK handler in front of any existing handler.
    #[default]
    Default,
    /// Invoke previously installed handlers first, then the SDK handler.
    ChainAtStart,
}

/// Raised for handler strategy values the native layer does not know.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid handler strategy {0}")]
pub struct InvalidHandlerStrategy(pub i32);

impl HandlerStrategy {
    /// The value used across the native boundary.
    pub fn as_raw(self) -> i32 {
        match self {
            HandlerStrategy::Default => 0,
            HandlerStrategy::ChainAtStart => 1,
        }
    }
}

impl TryFrom<i32> for HandlerStrategy {
    type Error = InvalidHandlerStrategy;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(HandlerStrategy::Default),
            1 => Ok(HandlerStrategy::ChainAtStart),
            other => Err(InvalidHandlerStrategy(other)),
        }
    }
}

fn clamp_rate(rate: f32) -> f32 {
    if rate.is_nan() {
        0.0
    } else {
        rate.clamp(0.0, 1.0)
    }
}

/// Configuration settings for the capture runtime.
///
/// # Examples
///
/// ```
/// let mut options = sentry_ndk::Options::new();
/// options
///     .set_dsn("https://key@sentry.io/42")
///     .set_outbox_path("/data/app/outbox")
///     .set_traces_sample_rate(0.25);
/// assert_eq!(options.traces_sample_rate(), 0.25);
/// ```
#[derive(Clone)]
pub struct Options {
    dsn: Option<String>,
    debug: bool,
    outbox_path: Option<PathBuf>,
    database_path: Option<PathBuf>,
    release: Option<Cow<'static, str>>,
    environment: Option<Cow<'static, str>>,
    dist: Option<Cow<'static, str>>,
    max_breadcrumbs: usize,
    sdk_name: Cow<'static, str>,
    handler_strategy: HandlerStrategy,
    traces_sample_rate: f32,
    sample_rate: f32,
    max_spans: usize,
    attach_debug_images: bool,
    native_libraries: Vec<Cow<'static, str>>,
    library_loader: Option<Arc<dyn LibraryLoader>>,
    backend: Option<Arc<dyn Backend>>,
    transport: Option<Arc<dyn Transport>>,
    random_source: Option<Arc<dyn RandomSource>>,
    shutdown_timeout: Duration,
}

impl Options {
    /// Creates new options with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options and lets a closure configure them.
    pub fn configure<F>(f: F) -> Self
    where
        F: FnOnce(&mut Options) -> &mut Options,
    {
        let mut options = Self::new();
        f(&mut options);
        options
    }

    /// Sets the DSN.  An unparsable DSN is reported but does not fail `init`.
    pub fn set_dsn<S: Into<String>>(&mut self, dsn: S) -> &mut Self {
        self.dsn = Some(dsn.into());
        self
    }

    /// The configured DSN string.
    pub fn dsn(&self) -> Option<&str> {
        self.dsn.as_deref()
    }

    /// Enables SDK debug output.
    pub fn set_debug(&mut self, debug: bool) -> &mut Self {
        self.debug = debug;
        self
    }

    /// Whether debug output is enabled.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Sets the directory accepted events are written to.
    pub fn set_outbox_path<P: Into<PathBuf>>(&mut self, path: P) -> &mut Self {
        self.outbox_path = Some(path.into());
        self
    }

    /// The outbox directory.
    pub fn outbox_path(&self) -> Option<&Path> {
        self.outbox_path.as_deref()
    }

    /// Sets the staging directory used for in-flight writes.
    ///
    /// It has to live on the same filesystem as the outbox.
    pub fn set_database_path<P: Into<PathBuf>>(&mut self, path: P) -> &mut Self {
        self.database_path = Some(path.into());
        self
    }

    /// The staging directory, defaulting to `.sentry-native` next to the outbox.
    pub fn database_path(&self) -> Option<PathBuf> {
        if let Some(ref path) = self.database_path {
            return Some(path.clone());
        }
        let outbox = self.outbox_path.as_deref()?;
        Some(match outbox.parent() {
            Some(parent) => parent.join(DATABASE_DIR_NAME),
            None => outbox.join(DATABASE_DIR_NAME),
        })
    }

    /// Sets the release.
    pub fn set_release(&mut self, release: Option<Cow<'static, str>>) -> &mut Self {
        self.release = release;
        self
    }

    /// The release.
    pub fn release(&self) -> Option<Cow<'static, str>> {
        self.release.clone()
    }

    /// Sets the environment.
    pub fn set_environment(&mut self, environment: Option<Cow<'static, str>>) -> &mut Self {
        self.environment = environment;
        self
    }

    /// The environment.
    pub fn environment(&self) -> Option<Cow<'static, str>> {
        self.environment.clone()
    }

    /// Sets the distribution.
    pub fn set_dist(&mut self, dist: Option<Cow<'static, str>>) -> &mut Self {
        self.dist = dist;
        self
    }

    /// The distribution.
    pub fn dist(&self) -> Option<Cow<'static, str>> {
        self.dist.clone()
    }

    /// Sets the maximum number of breadcrumbs kept on the scope.
    pub fn set_max_breadcrumbs(&mut self, max_breadcrumbs: usize) -> &mut Self {
        self.max_breadcrumbs = max_breadcrumbs;
        self
    }

    /// Maximum number of breadcrumbs. (defaults to 100)
    pub fn max_breadcrumbs(&self) -> usize {
        self.max_breadcrumbs
    }

    /// Sets the SDK name reported with events.
    pub fn set_sdk_name<S: Into<Cow<'static, str>>>(&mut self, sdk_name: S) -> &mut Self {
        self.sdk_name = sdk_name.into();
        self
    }

    /// The SDK name.
    pub fn sdk_name(&self) -> &str {
        &self.sdk_name
    }

    /// Sets the crash handler strategy.
    pub fn set_handler_strategy(&mut self, strategy: HandlerStrategy) -> &mut Self {
        self.handler_strategy = strategy;
        self
    }

    /// The crash handler strategy.
    pub fn handler_strategy(&self) -> HandlerStrategy {
        self.handler_strategy
    }

    /// Sets the transaction sample rate, clamped into `0.0..=1.0`.
    pub fn set_traces_sample_rate(&mut self, rate: f32) -> &mut Self {
        self.traces_sample_rate = clamp_rate(rate);
        self
    }

    /// The transaction sample rate. (defaults to 0.0)
    pub fn traces_sample_rate(&self) -> f32 {
        self.traces_sample_rate
    }

    /// Sets the sample rate for message events, clamped into `0.0..=1.0`.
    pub fn set_sample_rate(&mut self, rate: f32) -> &mut Self {
        self.sample_rate = clamp_rate(rate);
        self
    }

    /// The sample rate for message events. (defaults to 1.0)
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Sets the maximum number of spans per transaction. `0` picks the default.
    pub fn set_max_spans(&mut self, max_spans: usize) -> &mut Self {
        self.max_spans = max_spans;
        self
    }

    /// The maximum number of spans kept per transaction.
    pub fn max_spans(&self) -> usize {
        match self.max_spans {
            0 => DEFAULT_MAX_SPANS,
            max => max,
        }
    }

    /// Attaches the loaded module list to message events.
    pub fn set_attach_debug_images(&mut self, attach: bool) -> &mut Self {
        self.attach_debug_images = attach;
        self
    }

    /// Whether message events carry the module list.
    pub fn attach_debug_images(&self) -> bool {
        self.attach_debug_images
    }

    /// Adds a native library that has to be loaded before the runtime starts.
    ///
    /// Libraries load in the order they were added, so dependencies go first.
    pub fn add_native_library<S: Into<Cow<'static, str>>>(&mut self, name: S) -> &mut Self {
        self.native_libraries.push(name.into());
        self
    }

    /// The native libraries in load order.
    pub fn native_libraries(&self) -> &[Cow<'static, str>] {
        &self.native_libraries
    }

    /// Overrides how native libraries are loaded.
    pub fn set_library_loader<L: LibraryLoader + 'static>(&mut self, loader: L) -> &mut Self {
        self.library_loader = Some(Arc::new(loader));
        self
    }

    pub(crate) fn library_loader(&self) -> Option<&Arc<dyn LibraryLoader>> {
        self.library_loader.as_ref()
    }

    /// Sets the crash backend.
    pub fn set_backend<B: Backend + 'static>(&mut self, backend: B) -> &mut Self {
        self.backend = Some(Arc::new(backend));
        self
    }

    pub(crate) fn backend(&self) -> Option<&Arc<dyn Backend>> {
        self.backend.as_ref()
    }

    /// Replaces the outbox writer with a custom transport.
    pub fn set_transport(&mut self, transport: Arc<dyn Transport>) -> &mut Self {
        self.transport = Some(transport);
        self
    }

    pub(crate) fn transport(&self) -> Option<&Arc<dyn Transport>> {
        self.transport.as_ref()
    }

    /// Replaces the random source used for sampling decisions.
    pub fn set_random_source<R: RandomSource + 'static>(&mut self, source: R) -> &mut Self {
        self.random_source = Some(Arc::new(source));
        self
    }

    pub(crate) fn random_source(&self) -> Option<&Arc<dyn RandomSource>> {
        self.random_source.as_ref()
    }

    /// Sets the timeout for flushing on close.
    pub fn set_shutdown_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// The timeout on close for draining events. (defaults to 2s)
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }
}

impl Default for Options {
    fn default() -> Options {
        Options {
            dsn: None,
            debug: false,
            outbox_path: None,
            database_path: None,
            release: None,
            environment: None,
            dist: None,
            max_breadcrumbs: 100,
            sdk_name: Cow::Borrowed(DEFAULT_SDK_NAME),
            handler_strategy: HandlerStrategy::Default,
            traces_sample_rate: 0.0,
            sample_rate: 1.0,
            max_spans: 0,
            attach_debug_images: false,
            native_libraries: vec![],
            library_loader: None,
            backend: None,
            transport: None,
            random_source: None,
            shutdown_timeout: Duration::from_secs(2),
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Options")
            .field("dsn", &self.dsn)
            .field("debug", &self.debug)
            .field("outbox_path", &self.outbox_path)
            .field("database_path", &self.database_path)
            .field("release", &self.release)
            .field("environment", &self.environment)
            .field("dist", &self.dist)
            .field("max_breadcrumbs", &self.max_breadcrumbs)
            .field("sdk_name", &self.sdk_name)
            .field("handler_strategy", &self.handler_strategy)
            .field("traces_sample_rate", &self.traces_sample_rate)
            .field("sample_rate", &self.sample_rate)
            .field("max_spans", &self.max_spans)
            .field("attach_debug_images", &self.attach_debug_images)
            .field("native_libraries", &self.native_libraries)
            .field("backend", &self.backend.is_some())
            .field("transport", &self.transport.is_some())
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}

/// Fills in unset options from the environment.
///
/// `SENTRY_DSN`, `SENTRY_RELEASE` and `SENTRY_ENVIRONMENT` are consulted; the
/// environment falls back to `production`.
pub fn apply_defaults(mut opts: Options) -> Options {
    if opts.dsn.is_none() {
        opts.dsn = env::var("SENTRY_DSN").ok().filter(|dsn| !dsn.is_empty());
    }
    if opts.release.is_none() {
        opts.release = env::var("SENTRY_RELEASE").ok().map(Cow::Owned);
    }
    if opts.environment.is_none() {
        opts.environment = env::var("SENTRY_ENVIRONMENT")
            .ok()
            .map(Cow::Owned)
            .or(Some(Cow::Borrowed(DEFAULT_ENVIRONMENT)));
    }
    opts
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, Some(HandlerStrategy::Default))]
    #[case(1, Some(HandlerStrategy::ChainAtStart))]
    #[case(2, None)]
    #[case(-1, None)]
    fn test_handler_strategy_mapping(#[case] raw: i32, #[case] expected: Option<HandlerStrategy>) {
        let parsed = HandlerStrategy::try_from(raw).ok();
        assert_eq!(parsed, expected);
        if let Some(strategy) = parsed {
            assert_eq!(strategy.as_raw(), raw);
        }
    }

    #[rstest]
    #[case(0.5, 0.5)]
    #[case(-1.0, 0.0)]
    #[case(7.0, 1.0)]
    #[case(f32::NAN, 0.0)]
    fn test_rates_are_clamped(#[case] input: f32, #[case] expected: f32) {
        let mut options = Options::new();
        options.set_traces_sample_rate(input).set_sample_rate(input);
        assert_eq!(options.traces_sample_rate(), expected);
        assert_eq!(options.sample_rate(), expected);
    }

    #[test]
    fn test_defaults() {
        let options = Options::new();
        assert_eq!(options.max_breadcrumbs(), 100);
        assert_eq!(options.sdk_name(), "sentry.native");
        assert_eq!(options.traces_sample_rate(), 0.0);
        assert_eq!(options.sample_rate(), 1.0);
        assert_eq!(options.max_spans(), DEFAULT_MAX_SPANS);
        assert_eq!(options.shutdown_timeout(), Duration::from_secs(2));
        assert!(options.outbox_path().is_none());
        assert!(options.database_path().is_none());
    }

    #[test]
    fn test_database_path_defaults_next_to_outbox() {
        let mut options = Options::new();
        options.set_outbox_path("/data/app/cache/outbox");
        assert_eq!(
            options.database_path(),
            Some(PathBuf::from("/data/app/cache/.sentry-native"))
        );

        options.set_database_path("/data/app/staging");
        assert_eq!(
            options.database_path(),
            Some(PathBuf::from("/data/app/staging"))
        );
    }

    #[test]
    fn test_native_libraries_keep_order() {
        let options = Options::configure(|o| {
            o.add_native_library("log")
                .add_native_library("sentry")
                .add_native_library("sentry-android")
        });
        let names: Vec<&str> = options.native_libraries().iter().map(|n| n.as_ref()).collect();
        assert_eq!(names, ["log", "sentry", "sentry-android"]);
    }

    #[test]
    fn test_apply_defaults_keeps_explicit_values() {
        let mut options = Options::new();
        options
            .set_dsn("https://key@sentry.io/proj")
            .set_environment(Some("staging".into()))
            .set_release(Some("app@1.0".into()));
        let options = apply_defaults(options);
        assert_eq!(options.dsn(), Some("https://key@sentry.io/proj"));
        assert_eq!(options.environment().as_deref(), Some("staging"));
        assert_eq!(options.release().as_deref(), Some("app@1.0"));
    }
}
