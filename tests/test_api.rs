use std::sync::{Mutex, MutexGuard, PoisonError};

use sentry_ndk::test::TestTransport;
use sentry_ndk::{Level, Options};

static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(PoisonError::into_inner)
}

fn init_with(transport: &std::sync::Arc<TestTransport>) {
    let mut options = Options::new();
    options
        .set_release(Some("app@1.0.0".into()))
        .set_max_breadcrumbs(3)
        .set_transport(transport.clone());
    sentry_ndk::init(options).unwrap();
}

#[test]
fn test_close_without_init() {
    let _guard = serial();
    sentry_ndk::close();
    assert!(sentry_ndk::capture_message("nobody listens", Level::Info).is_nil());
    sentry_ndk::set_tag("ignored", "yes");
}

#[test]
fn test_scope_roundtrip() {
    let _guard = serial();
    let transport = TestTransport::new();
    init_with(&transport);

    sentry_ndk::set_tag("device", "pixel");
    sentry_ndk::set_tag("removed", "soon");
    sentry_ndk::remove_tag("removed");
    sentry_ndk::set_extra("battery", "low");
    sentry_ndk::set_user(Some("7"), None, None, Some("dev"));
    sentry_ndk::set_trace(Some("4c79f60c11214eb38604f4ae0781bfb2"), Some("fa90fdead5f74052"));
    for i in 0..5 {
        sentry_ndk::add_breadcrumb(
            Some(Level::Info),
            Some(&format!("crumb {}", i)),
            Some("nav"),
            Some("navigation"),
            None,
            Some("payload"),
        );
    }
    sentry_ndk::capture_message("with scope", Level::Error);
    sentry_ndk::close();

    let envelopes = transport.fetch_and_clear_envelopes();
    assert_eq!(envelopes.len(), 1);
    let event = envelopes[0].event().unwrap();
    assert_eq!(event.release.as_deref(), Some("app@1.0.0"));
    assert_eq!(event.tags.get("device").map(String::as_str), Some("pixel"));
    assert!(!event.tags.contains_key("removed"));
    assert_eq!(event.extra.get("battery").map(String::as_str), Some("low"));
    assert_eq!(
        event.user.as_ref().and_then(|u| u.username.as_deref()),
        Some("dev")
    );

    let messages: Vec<_> = event
        .breadcrumbs
        .iter()
        .filter_map(|b| b.message.as_deref())
        .collect();
    assert_eq!(messages, ["crumb 2", "crumb 3", "crumb 4"]);
    assert_eq!(event.breadcrumbs[0].data["data"], "payload");

    let trace = event.contexts.trace.as_ref().unwrap();
    assert_eq!(trace.trace_id.to_string(), "4c79f60c11214eb38604f4ae0781bfb2");
    assert_eq!(
        trace.parent_span_id.map(|id| id.to_string()).as_deref(),
        Some("fa90fdead5f74052")
    );
}

#[test]
fn test_reinit_replaces_client() {
    let _guard = serial();
    let first = TestTransport::new();
    let second = TestTransport::new();

    init_with(&first);
    sentry_ndk::set_tag("generation", "first");
    init_with(&second);
    sentry_ndk::capture_message("after reinit", Level::Info);
    sentry_ndk::close();

    assert!(first.fetch_and_clear_envelopes().is_empty());
    let envelopes = second.fetch_and_clear_envelopes();
    assert_eq!(envelopes.len(), 1);
    assert!(envelopes[0].event().unwrap().tags.is_empty());
}

#[test]
fn test_capture_after_close_is_dropped() {
    let _guard = serial();
    let transport = TestTransport::new();
    init_with(&transport);
    sentry_ndk::close();
    assert!(sentry_ndk::capture_message("too late", Level::Info).is_nil());
    assert!(sentry_ndk::capture_transaction("too late", vec![], Some(true)).is_nil());
    assert!(transport.fetch_and_clear_envelopes().is_empty());
}

#[test]
fn test_module_list_recomputes_after_clear() {
    let _guard = serial();
    let first = sentry_ndk::load_module_list();
    let cached = sentry_ndk::load_module_list();
    assert!(std::sync::Arc::ptr_eq(&first, &cached));

    sentry_ndk::clear_module_list();
    let fresh = sentry_ndk::load_module_list();
    assert!(!std::sync::Arc::ptr_eq(&first, &fresh));
    assert_eq!(first.len(), fresh.len());
}
