//! The process-wide scope: tags, extras, user, breadcrumbs and the
//! propagation context that the next captured event picks up.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, TryLockError};

use sentry_ndk_types::protocol::{Breadcrumb, Event, Level, SpanId, TraceContext, TraceId, User};
use serde_json::Value;

use crate::sentry_debug;

mod breadcrumbs;

use self::breadcrumbs::Breadcrumbs;

/// The trace an event is attached to when no transaction is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropagationContext {
    /// The trace id.
    pub trace_id: TraceId,
    /// The span id of this process within the trace.
    pub span_id: SpanId,
    /// The span this trace continues from, if any.
    pub parent_span_id: Option<SpanId>,
}

impl PropagationContext {
    /// Starts a fresh random trace.
    pub fn new() -> PropagationContext {
        Default::default()
    }

    /// The trace context carried by message events.
    pub fn to_trace_context(self) -> TraceContext {
        TraceContext {
            span_id: self.span_id,
            trace_id: self.trace_id,
            parent_span_id: self.parent_span_id,
            ..Default::default()
        }
    }
}

/// Holds contextual data for captured events.
#[derive(Debug, Clone)]
struct Scope {
    tags: Arc<BTreeMap<String, String>>,
    extra: Arc<BTreeMap<String, String>>,
    user: Option<Arc<User>>,
    breadcrumbs: Breadcrumbs,
    propagation_context: PropagationContext,
}

impl Scope {
    fn new(max_breadcrumbs: usize) -> Scope {
        Scope {
            tags: Default::default(),
            extra: Default::default(),
            user: None,
            breadcrumbs: Breadcrumbs::with_max(max_breadcrumbs),
            propagation_context: PropagationContext::new(),
        }
    }

    fn snapshot(&self) -> ScopeSnapshot {
        ScopeSnapshot {
            tags: self.tags.clone(),
            extra: self.extra.clone(),
            user: self.user.clone(),
            breadcrumbs: self.breadcrumbs.iter().cloned().collect(),
            propagation_context: self.propagation_context,
        }
    }
}

/// An immutable copy of the scope taken at capture time.
///
/// Later scope mutations never show up in a snapshot that was already taken.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeSnapshot {
    tags: Arc<BTreeMap<String, String>>,
    extra: Arc<BTreeMap<String, String>>,
    user: Option<Arc<User>>,
    breadcrumbs: Vec<Breadcrumb>,
    propagation_context: PropagationContext,
}

impl ScopeSnapshot {
    /// The tags at snapshot time.
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// The extras at snapshot time.
    pub fn extra(&self) -> &BTreeMap<String, String> {
        &self.extra
    }

    /// The user at snapshot time.
    pub fn user(&self) -> Option<&User> {
        self.user.as_deref()
    }

    /// The breadcrumbs at snapshot time, oldest first.
    pub fn breadcrumbs(&self) -> &[Breadcrumb] {
        &self.breadcrumbs
    }

    /// The propagation context at snapshot time.
    pub fn propagation_context(&self) -> PropagationContext {
        self.propagation_context
    }

    /// Applies the snapshot to an event.
    ///
    /// Tags and extras already present on the event win over scope values.
    pub fn apply_to_event(&self, event: &mut Event) {
        for (key, value) in self.tags.iter() {
            event.tags.entry(key.clone()).or_insert_with(|| value.clone());
        }
        for (key, value) in self.extra.iter() {
            event.extra.entry(key.clone()).or_insert_with(|| value.clone());
        }
        if event.user.is_none() {
            event.user = self.user.as_deref().cloned();
        }
        event.breadcrumbs.extend(self.breadcrumbs.iter().cloned());
        if event.contexts.trace.is_none() {
            event.contexts.trace = Some(self.propagation_context.to_trace_context());
        }
    }
}

/// A borrowed view of the live scope.
///
/// Only handed out by [`ScopeStore::try_with_scope`] while the read lock is
/// held.
pub struct ScopeView<'a> {
    scope: &'a Scope,
}

impl ScopeView<'_> {
    /// The current tags.
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.scope.tags
    }

    /// The current extras.
    pub fn extra(&self) -> &BTreeMap<String, String> {
        &self.scope.extra
    }

    /// The current user.
    pub fn user(&self) -> Option<&User> {
        self.scope.user.as_deref()
    }

    /// The stored breadcrumbs, oldest first.
    pub fn breadcrumbs(&self) -> impl Iterator<Item = &Breadcrumb> {
        self.scope.breadcrumbs.iter()
    }

    /// The current propagation context.
    pub fn propagation_context(&self) -> PropagationContext {
        self.scope.propagation_context
    }
}

impl fmt::Debug for ScopeView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ScopeView")
            .field("scope", self.scope)
            .finish()
    }
}

/// Thread-safe storage for the scope.
///
/// Every mutation takes the write lock exactly once.  A writer that panics
/// while holding the lock does not disable the store: poisoning is ignored.
pub struct ScopeStore {
    inner: RwLock<Scope>,
}

impl fmt::Debug for ScopeStore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ScopeStore")
            .field("scope", &self.snapshot())
            .finish()
    }
}

impl Default for ScopeStore {
    fn default() -> Self {
        ScopeStore::new(100)
    }
}

impl ScopeStore {
    /// Creates an empty scope keeping at most `max_breadcrumbs` breadcrumbs.
    pub fn new(max_breadcrumbs: usize) -> ScopeStore {
        ScopeStore {
            inner: RwLock::new(Scope::new(max_breadcrumbs)),
        }
    }

    fn with_scope_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Scope) -> R,
    {
        let mut scope = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut scope)
    }

    /// Sets a tag to a specific value.
    pub fn set_tag(&self, key: &str, value: &str) {
        self.with_scope_mut(|scope| {
            Arc::make_mut(&mut scope.tags).insert(key.to_string(), value.to_string());
        });
    }

    /// Removes a tag.
    pub fn remove_tag(&self, key: &str) {
        self.with_scope_mut(|scope| {
            Arc::make_mut(&mut scope.tags).remove(key);
        });
    }

    /// Sets an extra to a specific value.
    pub fn set_extra(&self, key: &str, value: &str) {
        self.with_scope_mut(|scope| {
            Arc::make_mut(&mut scope.extra).insert(key.to_string(), value.to_string());
        });
    }

    /// Removes an extra.
    pub fn remove_extra(&self, key: &str) {
        self.with_scope_mut(|scope| {
            Arc::make_mut(&mut scope.extra).remove(key);
        });
    }

    /// Replaces the user as a unit.
    ///
    /// Passing no attribute at all is the same as [`remove_user`](Self::remove_user).
    pub fn set_user(
        &self,
        id: Option<&str>,
        email: Option<&str>,
        ip_address: Option<&str>,
        username: Option<&str>,
    ) {
        let user = User {
            id: id.map(str::to_owned),
            email: email.map(str::to_owned),
            ip_address: ip_address.map(str::to_owned),
            username: username.map(str::to_owned),
        };
        let user = if user.is_empty() {
            None
        } else {
            Some(Arc::new(user))
        };
        self.with_scope_mut(|scope| scope.user = user);
    }

    /// Removes the user.
    pub fn remove_user(&self) {
        self.with_scope_mut(|scope| scope.user = None);
    }

    /// Records a breadcrumb.
    ///
    /// A missing timestamp defaults to the current time.  `data` is an opaque
    /// string stored under the `data` key of the breadcrumb data.
    pub fn add_breadcrumb(
        &self,
        level: Option<Level>,
        message: Option<&str>,
        category: Option<&str>,
        ty: Option<&str>,
        timestamp: Option<&str>,
        data: Option<&str>,
    ) {
        let mut breadcrumb = Breadcrumb {
            level,
            message: message.map(str::to_owned),
            category: category.map(str::to_owned),
            ty: ty.map(str::to_owned),
            ..Default::default()
        };
        if let Some(timestamp) = timestamp {
            breadcrumb.timestamp = timestamp.to_owned();
        }
        if let Some(data) = data {
            breadcrumb
                .data
                .insert("data".to_owned(), Value::String(data.to_owned()));
        }
        self.with_scope_mut(|scope| scope.breadcrumbs.push(breadcrumb));
    }

    /// Continues the trace identified by the given ids.
    ///
    /// An unparsable or missing trace id starts a fresh random trace.  An
    /// unparsable or empty parent span id is treated as absent.  A new span id
    /// is generated for this process either way.
    pub fn set_trace(&self, trace_id: Option<&str>, parent_span_id: Option<&str>) {
        let trace_id = match trace_id.map(str::parse::<TraceId>) {
            Some(Ok(trace_id)) => trace_id,
            Some(Err(err)) => {
                sentry_debug!("[ScopeStore] invalid trace id, starting a new trace: {}", err);
                TraceId::default()
            }
            None => TraceId::default(),
        };
        let parent_span_id = match parent_span_id.filter(|id| !id.is_empty()) {
            Some(raw) => match raw.parse::<SpanId>() {
                Ok(span_id) => Some(span_id),
                Err(err) => {
                    sentry_debug!("[ScopeStore] ignoring invalid parent span id: {}", err);
                    None
                }
            },
            None => None,
        };
        let context = PropagationContext {
            trace_id,
            span_id: SpanId::default(),
            parent_span_id,
        };
        self.with_scope_mut(|scope| scope.propagation_context = context);
    }

    /// Takes an immutable copy of the scope.
    pub fn snapshot(&self) -> ScopeSnapshot {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    /// Runs `f` on a borrowed view of the scope without blocking.
    ///
    /// Returns `None` if a writer currently holds the lock.  Nothing is
    /// copied, so this is the variant a crash handler has to use.
    pub fn try_with_scope<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&ScopeView<'_>) -> R,
    {
        let scope = match self.inner.try_read() {
            Ok(scope) => scope,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        Some(f(&ScopeView { scope: &*scope }))
    }

    /// Clears all scope data and starts a new trace.
    pub fn clear(&self) {
        sentry_debug!("[ScopeStore] Clearing all scope data");
        self.with_scope_mut(|scope| {
            scope.tags = Default::default();
            scope.extra = Default::default();
            scope.user = None;
            scope.breadcrumbs.clear();
            scope.propagation_context = PropagationContext::new();
        });
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_tags_and_extras() {
        let store = ScopeStore::new(10);
        store.set_tag("a", "1");
        store.set_tag("b", "2");
        store.set_tag("a", "3");
        store.remove_tag("b");
        store.remove_tag("missing");
        store.set_extra("e", "x");
        store.remove_extra("e");

        let snapshot = store.snapshot();
        assert_eq!(snapshot.tags().len(), 1);
        assert_eq!(snapshot.tags()["a"], "3");
        assert!(snapshot.extra().is_empty());
    }

    #[test]
    fn test_user_replaced_as_unit() {
        let store = ScopeStore::new(10);
        store.set_user(Some("42"), Some("a@example.com"), None, Some("alice"));
        store.set_user(None, None, Some("127.0.0.1"), None);

        let snapshot = store.snapshot();
        let user = snapshot.user().unwrap();
        assert_eq!(user.id, None);
        assert_eq!(user.username, None);
        assert_eq!(user.ip_address.as_deref(), Some("127.0.0.1"));

        store.set_user(None, None, None, None);
        assert!(store.snapshot().user().is_none());

        store.set_user(Some("1"), None, None, None);
        store.remove_user();
        assert!(store.snapshot().user().is_none());
    }

    #[test]
    fn test_breadcrumb_fields() {
        let store = ScopeStore::new(10);
        store.add_breadcrumb(
            Some(Level::Warning),
            Some("clicked"),
            Some("ui"),
            Some("user"),
            Some("2020-09-13T12:26:40Z"),
            Some("payload"),
        );
        store.add_breadcrumb(None, None, None, None, None, None);

        let snapshot = store.snapshot();
        let crumbs = snapshot.breadcrumbs();
        assert_eq!(crumbs.len(), 2);
        assert_eq!(crumbs[0].level, Some(Level::Warning));
        assert_eq!(crumbs[0].timestamp, "2020-09-13T12:26:40Z");
        assert_eq!(crumbs[0].data["data"], Value::String("payload".into()));
        assert_eq!(crumbs[1].message, None);
        assert!(crumbs[1].data.is_empty());
        assert!(!crumbs[1].timestamp.is_empty());
    }

    #[test]
    fn test_breadcrumbs_are_bounded() {
        let store = ScopeStore::new(3);
        for i in 0..5 {
            store.add_breadcrumb(None, Some(&i.to_string()), None, None, None, None);
        }
        let snapshot = store.snapshot();
        let messages: Vec<_> = snapshot
            .breadcrumbs()
            .iter()
            .filter_map(|c| c.message.as_deref())
            .collect();
        assert_eq!(messages, ["2", "3", "4"]);
    }

    #[test]
    fn test_snapshot_is_isolated() {
        let store = ScopeStore::new(10);
        store.set_tag("before", "1");
        let snapshot = store.snapshot();
        store.set_tag("after", "2");
        store.add_breadcrumb(None, Some("late"), None, None, None, None);

        assert!(snapshot.tags().get("after").is_none());
        assert!(snapshot.breadcrumbs().is_empty());
    }

    #[test]
    fn test_set_trace() {
        let store = ScopeStore::new(10);
        store.set_trace(
            Some("0123456789abcdef0123456789abcdef"),
            Some("0123456789abcdef"),
        );
        let context = store.snapshot().propagation_context();
        assert_eq!(
            context.trace_id.to_string(),
            "0123456789abcdef0123456789abcdef"
        );
        assert_eq!(
            context.parent_span_id.map(|id| id.to_string()).as_deref(),
            Some("0123456789abcdef")
        );

        store.set_trace(Some("garbage"), Some(""));
        let fresh = store.snapshot().propagation_context();
        assert_ne!(fresh.trace_id, context.trace_id);
        assert_eq!(fresh.parent_span_id, None);

        store.set_trace(Some("0123456789abcdef0123456789abcdef"), Some("xyz"));
        assert_eq!(store.snapshot().propagation_context().parent_span_id, None);
    }

    #[test]
    fn test_try_with_scope_does_not_block() {
        let store = ScopeStore::new(10);
        store.set_tag("k", "v");
        {
            let _writer = store.inner.write().unwrap();
            assert!(store.try_with_scope(|_| ()).is_none());
        }
        assert_eq!(
            store.try_with_scope(|view| view.tags()["k"].clone()).as_deref(),
            Some("v")
        );
    }

    #[test]
    fn test_try_with_scope_borrows_live_data() {
        let store = ScopeStore::new(10);
        store.set_tag("k", "v");
        store.add_breadcrumb(None, Some("crumb"), None, None, None, None);
        let snapshot = store.snapshot();

        let (tags_ptr, crumb_ptr) = store
            .try_with_scope(|view| {
                let crumb = view.breadcrumbs().next().unwrap();
                (
                    view.tags() as *const BTreeMap<String, String>,
                    crumb as *const Breadcrumb,
                )
            })
            .unwrap();
        // the tags map is shared with the snapshot, not copied
        assert!(std::ptr::eq(tags_ptr, snapshot.tags()));
        // breadcrumbs are read in place, the snapshot holds its own copies
        assert!(!std::ptr::eq(crumb_ptr, &snapshot.breadcrumbs()[0]));
        let in_place = store
            .inner
            .read()
            .unwrap()
            .breadcrumbs
            .iter()
            .next()
            .map(|crumb| crumb as *const Breadcrumb);
        assert_eq!(in_place, Some(crumb_ptr));
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let store = Arc::new(ScopeStore::new(10));
        let poisoner = store.clone();
        let result = thread::spawn(move || {
            let _guard = poisoner.inner.write().unwrap();
            panic!("writer died");
        })
        .join();
        assert!(result.is_err());
        assert!(store.inner.is_poisoned());

        store.set_tag("still", "works");
        assert_eq!(store.snapshot().tags()["still"], "works");
        assert!(store.try_with_scope(|view| view.tags().len()).is_some());
    }

    #[test]
    fn test_clear() {
        let store = ScopeStore::new(10);
        store.set_tag("k", "v");
        store.set_user(Some("1"), None, None, None);
        store.add_breadcrumb(None, Some("m"), None, None, None, None);
        let before = store.snapshot().propagation_context();
        store.clear();

        let snapshot = store.snapshot();
        assert!(snapshot.tags().is_empty());
        assert!(snapshot.user().is_none());
        assert!(snapshot.breadcrumbs().is_empty());
        assert_ne!(snapshot.propagation_context().trace_id, before.trace_id);
    }

    #[test]
    fn test_apply_to_event() {
        let store = ScopeStore::new(10);
        store.set_tag("scope", "1");
        store.set_tag("shared", "scope");
        let mut event = Event::new();
        event.tags.insert("shared".into(), "event".into());
        store.snapshot().apply_to_event(&mut event);

        assert_eq!(event.tags["scope"], "1");
        assert_eq!(event.tags["shared"], "event");
        assert!(event.contexts.trace.is_some());
    }

    #[test]
    fn test_concurrent_mutations() {
        let store = Arc::new(ScopeStore::new(1000));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        store.set_tag(&format!("t{}-{}", t, i), "v");
                        store.add_breadcrumb(None, Some("m"), None, None, None, None);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let snapshot = store.snapshot();
        assert_eq!(snapshot.tags().len(), 400);
        assert_eq!(snapshot.breadcrumbs().len(), 400);
    }
}
