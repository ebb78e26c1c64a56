use sentry_ndk_types::protocol::ClientSdkInfo;

/// The version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The SDK name reported when none is configured.
pub const DEFAULT_SDK_NAME: &str = "sentry.native";

/// The environment reported when neither the options nor `SENTRY_ENVIRONMENT` set one.
pub const DEFAULT_ENVIRONMENT: &str = "production";

/// Span limit applied once tracing is enabled and no explicit limit is set.
pub const DEFAULT_MAX_SPANS: usize = 1000;

/// Name of the staging directory created next to the outbox.
pub const DATABASE_DIR_NAME: &str = ".sentry-native";

pub(crate) fn sdk_info(name: &str) -> ClientSdkInfo {
    ClientSdkInfo {
        name: name.to_string(),
        version: VERSION.to_string(),
        integrations: vec![],
    }
}
