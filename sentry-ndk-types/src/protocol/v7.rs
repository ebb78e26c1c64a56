//! The current latest sentry protocol version.
//!
//! Only the subset of the protocol that the native capture runtime writes to
//! its outbox is modelled here.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str;
use std::time::SystemTime;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use serde_json::Value;
pub use uuid::Uuid;

pub use debugid::{CodeId, DebugId};

use crate::utils::{ts_rfc3339, ts_rfc3339_opt};

/// Represents a log level.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Level {
    /// Indicates very spammy debug information.
    Debug,
    /// Informational messages.
    #[default]
    Info,
    /// A warning.
    Warning,
    /// An error.
    Error,
    /// Similar to error but indicates a critical event that usually causes a shutdown.
    Fatal,
}

/// An error used when parsing `Level`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid level")]
pub struct ParseLevelError;

impl str::FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(string: &str) -> Result<Level, Self::Err> {
        Ok(match string {
            "debug" => Level::Debug,
            "info" | "log" => Level::Info,
            "warning" => Level::Warning,
            "error" => Level::Error,
            "fatal" => Level::Fatal,
            _ => return Err(ParseLevelError),
        })
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Level {
    /// The wire name of the level.
    pub fn as_str(&self) -> &'static str {
        match *self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }

    /// Maps the numeric levels used by the native SDK (`-1` debug through
    /// `3` fatal) onto a level.  Unknown values map to `None`.
    pub fn from_native(value: i32) -> Option<Level> {
        Some(match value {
            -1 => Level::Debug,
            0 => Level::Info,
            1 => Level::Warning,
            2 => Level::Error,
            3 => Level::Fatal,
            _ => return None,
        })
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Cow::<str>::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Represents an address.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub struct Addr(pub u64);

impl Addr {
    /// Returns `true` if this address is the null pointer.
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for Addr {
    fn from(addr: u64) -> Addr {
        Addr(addr)
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl Serialize for Addr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Addr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr<'a> {
            Int(u64),
            Str(Cow<'a, str>),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Int(value) => Ok(Addr(value)),
            Repr::Str(value) => {
                let digits = value
                    .strip_prefix("0x")
                    .or_else(|| value.strip_prefix("0X"))
                    .unwrap_or(&value);
                u64::from_str_radix(digits, 16)
                    .map(Addr)
                    .map_err(de::Error::custom)
            }
        }
    }
}

/// Represents a single breadcrumb.
///
/// The timestamp is kept pre-formatted, exactly as handed over by the caller.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Breadcrumb {
    /// The timestamp of the breadcrumb.
    pub timestamp: String,
    /// The type of the breadcrumb.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    /// The optional category of the breadcrumb.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// The optional level of the breadcrumb.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    /// An optional human readable message for the breadcrumb.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Arbitrary breadcrumb data.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,
}

impl Default for Breadcrumb {
    fn default() -> Breadcrumb {
        Breadcrumb {
            timestamp: crate::utils::now_rfc3339(),
            ty: None,
            category: None,
            level: None,
            message: None,
            data: BTreeMap::new(),
        }
    }
}

/// Represents user info.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct User {
    /// The ID of the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The email address of the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// The remote ip address of the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// A human readable username of the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl User {
    /// Returns `true` if no attribute of the user is set.
    pub fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.email.is_none()
            && self.ip_address.is_none()
            && self.username.is_none()
    }
}

/// The kind of a debug image.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    /// ELF shared objects and executables.
    Elf,
    /// Windows PE images.
    Pe,
    /// Mach-O images.
    Macho,
}

/// Represents a binary image loaded into the process.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DebugImage {
    /// The image type.
    #[serde(rename = "type")]
    pub ty: ImageType,
    /// The unique UUID of the image, if the format has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    /// Unique debug identifier of the image.
    pub debug_id: DebugId,
    /// Path and name of the debug companion file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_file: Option<String>,
    /// Optional identifier of the code file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_id: Option<CodeId>,
    /// Path and name of the image file.
    pub code_file: String,
    /// Starting memory address of the image.
    pub image_addr: Addr,
    /// Size of the image in bytes.
    pub image_size: u64,
    /// The optional CPU architecture of the image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

/// Represents debug meta information.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct DebugMeta {
    /// A list of debug information files.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<DebugImage>,
}

impl DebugMeta {
    /// Returns true if the debug meta is empty.
    ///
    /// This is used by the serializer to entirely skip the section.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Information on the SDK client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ClientSdkInfo {
    /// The name of the SDK.
    pub name: String,
    /// The version of the SDK.
    pub version: String,
    /// An optional list of integrations that are enabled in this SDK.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub integrations: Vec<String>,
}

/// Represents a span id.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct SpanId([u8; 8]);

impl Default for SpanId {
    fn default() -> Self {
        Self(rand::random())
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", hex::encode(self.0))
    }
}

impl From<SpanId> for String {
    fn from(span_id: SpanId) -> Self {
        span_id.to_string()
    }
}

impl str::FromStr for SpanId {
    type Err = hex::FromHexError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut buf = [0; 8];
        hex::decode_to_slice(input, &mut buf)?;
        Ok(Self(buf))
    }
}

impl TryFrom<String> for SpanId {
    type Error = hex::FromHexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Holds the identifier for a Trace
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct TraceId([u8; 16]);

impl Default for TraceId {
    fn default() -> Self {
        Self(rand::random())
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", hex::encode(self.0))
    }
}

impl From<TraceId> for String {
    fn from(trace_id: TraceId) -> Self {
        trace_id.to_string()
    }
}

impl str::FromStr for TraceId {
    type Err = hex::FromHexError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut buf = [0; 16];
        hex::decode_to_slice(input, &mut buf)?;
        Ok(Self(buf))
    }
}

impl TryFrom<String> for TraceId {
    type Error = hex::FromHexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Holds information about a tracing event.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TraceContext {
    /// The ID of the trace event
    #[serde(default)]
    pub span_id: SpanId,
    /// Determines which trace the transaction belongs to.
    #[serde(default)]
    pub trace_id: TraceId,
    /// Determines the parent of this transaction if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    /// Short code identifying the type of operation the transaction is measuring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    /// The sampling decision of the trace, if one was made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampled: Option<bool>,
}

/// Contextual information attached to an event.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Contexts {
    /// The trace context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceContext>,
}

impl Contexts {
    /// Returns true if no context is set.
    pub fn is_empty(&self) -> bool {
        self.trace.is_none()
    }
}

/// Represents a tracing span.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Span {
    /// The ID of the span
    #[serde(default)]
    pub span_id: SpanId,
    /// Determines which trace the span belongs to.
    #[serde(default)]
    pub trace_id: TraceId,
    /// Determines the parent of this span, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    /// Short code identifying the type of operation the span is measuring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    /// Longer description of the span's operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The timestamp at the measuring of the span finished.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "ts_rfc3339_opt"
    )]
    pub timestamp: Option<SystemTime>,
    /// The timestamp at the measuring of the span started.
    #[serde(default = "SystemTime::now", with = "ts_rfc3339")]
    pub start_timestamp: SystemTime,
    /// Describes the status of the span (e.g. `ok`, `cancelled`, etc.)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Optional tags to be attached to the span.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Optional extra information to be sent with the span.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,
}

impl Default for Span {
    fn default() -> Self {
        Span {
            span_id: Default::default(),
            trace_id: Default::default(),
            parent_span_id: None,
            op: None,
            description: None,
            timestamp: None,
            start_timestamp: SystemTime::now(),
            status: None,
            tags: Default::default(),
            data: Default::default(),
        }
    }
}

impl Span {
    /// Creates a new span with the current timestamp and random id.
    pub fn new() -> Span {
        Default::default()
    }}

/// The kind of an event, written as the top-level `type` field.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A plain message event.
    #[default]
    Message,
    /// A performance transaction.
    Transaction,
}

impl EventKind {
    /// The discriminator written into the payload.
    pub fn as_str(&self) -> &'static str {
        match *self {
            EventKind::Message => "message",
            EventKind::Transaction => "transaction",
        }
    }}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

mod event {
    use super::*;

    pub fn default_id() -> Uuid {
        Uuid::new_v4()
    }

    pub fn serialize_id<S: Serializer>(uuid: &Uuid, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_some(&uuid.as_simple().to_string())
    }

    pub fn default_platform() -> Cow<'static, str> {
        Cow::Borrowed("native")
    }
}

/// Represents a full event for Sentry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Event {
    /// The kind of the event.
    #[serde(rename = "type", default)]
    pub kind: EventKind,
    /// The ID of the event
    #[serde(default = "event::default_id", serialize_with = "event::serialize_id")]
    pub event_id: Uuid,
    /// The timestamp of the event.
    #[serde(default = "SystemTime::now", with = "ts_rfc3339")]
    pub timestamp: SystemTime,
    /// The level of the event (defaults to info)
    #[serde(default)]
    pub level: Level,
    /// The platform identifier of this event.
    #[serde(default = "event::default_platform")]
    pub platform: Cow<'static, str>,
    /// The message of a message event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The name of a transaction event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    /// The start time of a transaction.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "ts_rfc3339_opt"
    )]
    pub start_timestamp: Option<SystemTime>,
    /// The collection of finished spans of a transaction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<Span>,
    /// The release identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<Cow<'static, str>>,
    /// An optional distribution identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dist: Option<Cow<'static, str>>,
    /// An optional environment identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Cow<'static, str>>,
    /// Optionally user data to be sent along.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    /// A list of relevant breadcrumbs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub breadcrumbs: Vec<Breadcrumb>,
    /// Optional tags to be attached to the event.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Optional extra information to be sent with the event.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
    /// Optional contexts.
    #[serde(default, skip_serializing_if = "Contexts::is_empty")]
    pub contexts: Contexts,
    /// Optional debug meta information.
    #[serde(default, skip_serializing_if = "DebugMeta::is_empty")]
    pub debug_meta: Cow<'static, DebugMeta>,
    /// SDK metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk: Option<Cow<'static, ClientSdkInfo>>,
    /// The sampling decision taken for a transaction.
    ///
    /// `None` defers to the configured sample rate.
    #[serde(skip)]
    pub sampled: Option<bool>,
}

impl Default for Event {
    fn default() -> Self {
        Event {
            kind: EventKind::Message,
            event_id: event::default_id(),
            timestamp: SystemTime::now(),
            level: Level::Info,
            platform: event::default_platform(),
            message: None,
            transaction: None,
            start_timestamp: None,
            spans: Vec::new(),
            release: None,
            dist: None,
            environment: None,
            user: None,
            breadcrumbs: Vec::new(),
            tags: BTreeMap::new(),
            extra: BTreeMap::new(),
            contexts: Contexts::default(),
            debug_meta: Default::default(),
            sdk: None,
            sampled: None,
        }
    }
}

impl Event {
    /// Creates a new event with the current timestamp and random id.
    pub fn new() -> Event {
        Default::default()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Event(type: {}, id: {}, ts: {})",
            self.kind,
            self.event_id,
            crate::utils::to_rfc3339(&self.timestamp)
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case(-1, Some(Level::Debug))]
    #[case(0, Some(Level::Info))]
    #[case(1, Some(Level::Warning))]
    #[case(2, Some(Level::Error))]
    #[case(3, Some(Level::Fatal))]
    #[case(4, None)]
    #[case(-2, None)]
    fn test_level_from_native(#[case] raw: i32, #[case] expected: Option<Level>) {
        assert_eq!(Level::from_native(raw), expected);
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("log".parse::<Level>(), Ok(Level::Info));
        assert_eq!("warning".parse::<Level>(), Ok(Level::Warning));
        assert_eq!("loud".parse::<Level>(), Err(ParseLevelError));
        assert_eq!(serde_json::to_value(Level::Fatal).unwrap(), json!("fatal"));
    }

    #[test]
    fn test_addr_hex() {
        let addr = Addr(0x7f00_dead_0000);
        assert_eq!(serde_json::to_value(addr).unwrap(), json!("0x7f00dead0000"));
        assert_eq!(
            serde_json::from_value::<Addr>(json!("0x7f00dead0000")).unwrap(),
            addr
        );
        assert_eq!(serde_json::from_value::<Addr>(json!(16)).unwrap(), Addr(16));
    }

    #[test]
    fn test_trace_ids() {
        let trace_id: TraceId = "0123456789abcdef0123456789abcdef".parse().unwrap();
        assert_eq!(trace_id.to_string(), "0123456789abcdef0123456789abcdef");
        assert!("not-hex".parse::<TraceId>().is_err());
        assert!("0123".parse::<SpanId>().is_err());
        assert_ne!(SpanId::default(), SpanId::default());
    }

    #[test]
    fn test_event_type_discriminator() {
        let event = Event {
            kind: EventKind::Transaction,
            transaction: Some("checkout".into()),
            timestamp: SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000),
            ..Default::default()
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], json!("transaction"));
        assert_eq!(value["timestamp"], json!("2020-09-13T12:26:40Z"));
        assert_eq!(value["platform"], json!("native"));
        assert_eq!(
            value["event_id"],
            json!(event.event_id.as_simple().to_string())
        );
        assert!(value.get("sampled").is_none());
        assert!(value.get("debug_meta").is_none());
        assert!(value.get("contexts").is_none());
    }

    #[test]
    fn test_breadcrumb_skips_absent_fields() {
        let crumb = Breadcrumb {
            timestamp: "2020-09-13T12:26:40Z".into(),
            message: Some("clicked".into()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&crumb).unwrap(),
            json!({"timestamp": "2020-09-13T12:26:40Z", "message": "clicked"})
        );
    }

    #[test]
    fn test_debug_image_layout() {
        let image = DebugImage {
            ty: ImageType::Elf,
            uuid: None,
            debug_id: "3f3f1a8e-6c5d-4b2a-9e8f-0a1b2c3d4e5f".parse().unwrap(),
            debug_file: None,
            code_id: None,
            code_file: "/system/lib64/libc.so".into(),
            image_addr: Addr(0x1000),
            image_size: 4096,
            arch: Some("aarch64".into()),
        };
        let value = serde_json::to_value(&image).unwrap();
        assert_eq!(value["type"], json!("elf"));
        assert_eq!(value["image_addr"], json!("0x1000"));
        assert_eq!(value["code_file"], json!("/system/lib64/libc.so"));
    }
}
