use std::borrow::Cow;
use std::sync::Arc;
use std::time::SystemTime;

use sentry_ndk_types::protocol::{
    ClientSdkInfo, Event, EventKind, Level, Span, SpanId, TraceContext,
};

use crate::constants::sdk_info;
use crate::scope::ScopeStore;
use crate::{sentry_debug, Options};

/// Assembles events from a payload and a snapshot of the scope.
///
/// The scope is read once per build, so mutations made afterwards never
/// reach an event that was already built.
#[derive(Debug)]
pub struct EventBuilder {
    scope: Arc<ScopeStore>,
    release: Option<Cow<'static, str>>,
    environment: Option<Cow<'static, str>>,
    dist: Option<Cow<'static, str>>,
    sdk_info: ClientSdkInfo,
    max_spans: usize,
}

impl EventBuilder {
    /// Creates a builder applying the defaults from `options`.
    pub fn new(options: &Options, scope: Arc<ScopeStore>) -> EventBuilder {
        EventBuilder {
            scope,
            release: options.release(),
            environment: options.environment(),
            dist: options.dist(),
            sdk_info: sdk_info(options.sdk_name()),
            max_spans: options.max_spans(),
        }
    }

    fn base_event(&self, kind: EventKind) -> Event {
        Event {
            kind,
            release: self.release.clone(),
            environment: self.environment.clone(),
            dist: self.dist.clone(),
            sdk: Some(Cow::Owned(self.sdk_info.clone())),
            ..Default::default()
        }
    }

    /// Builds a message event.
    pub fn build_message(&self, text: &str, level: Level) -> Event {
        let mut event = self.base_event(EventKind::Message);
        event.message = Some(text.to_owned());
        event.level = level;
        self.scope.snapshot().apply_to_event(&mut event);
        event
    }

    /// Builds a transaction event.
    ///
    /// The transaction gets a fresh span id within the scope's trace.  Spans
    /// are moved into that trace; spans without a parent are parented to the
    /// transaction.  `sampled` carries an explicit decision, `None` defers to
    /// the sample rate.
    pub fn build_transaction(
        &self,
        name: &str,
        mut spans: Vec<Span>,
        sampled: Option<bool>,
    ) -> Event {
        let snapshot = self.scope.snapshot();
        let propagation = snapshot.propagation_context();
        let trace = TraceContext {
            span_id: SpanId::default(),
            trace_id: propagation.trace_id,
            parent_span_id: propagation.parent_span_id,
            op: Some("default".into()),
            sampled,
        };

        if spans.len() > self.max_spans {
            sentry_debug!(
                "[EventBuilder] dropping {} spans over the limit of {}",
                spans.len() - self.max_spans,
                self.max_spans
            );
            spans.truncate(self.max_spans);
        }
        for span in &mut spans {
            span.trace_id = trace.trace_id;
            if span.parent_span_id.is_none() {
                span.parent_span_id = Some(trace.span_id);
            }
        }

        let now = SystemTime::now();
        let start_timestamp = spans
            .iter()
            .map(|span| span.start_timestamp)
            .min()
            .filter(|start| *start < now)
            .unwrap_or(now);

        let mut event = self.base_event(EventKind::Transaction);
        event.transaction = Some(name.to_owned());
        event.timestamp = now;
        event.start_timestamp = Some(start_timestamp);
        event.spans = spans;
        event.sampled = sampled;
        event.contexts.trace = Some(trace);
        snapshot.apply_to_event(&mut event);
        event
    }
}
