use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use sentry_ndk_modules::load_module_list;
use sentry_ndk_types::protocol::{DebugMeta, Envelope, Event, EventKind, Level, Span};
use sentry_ndk_types::{Dsn, Uuid};

use crate::backend::Backend;
use crate::builder::EventBuilder;
use crate::macros::set_debug;
use crate::options::apply_defaults;
use crate::outbox::OutboxWriter;
use crate::sampler::{Sampler, ThreadRandom};
use crate::scope::ScopeStore;
use crate::transport::Transport;
use crate::{sentry_debug, Error, Options};

type TransportSlot = RwLock<Option<Arc<dyn Transport>>>;

/// The capture client.
///
/// A client owns the scope store, the sampler, the transport and, if
/// configured, the crash backend.  It is created by `init` and torn down by
/// `close`; after [`close`](Client::close) every capture is dropped.
pub struct Client {
    options: Options,
    dsn: Option<Dsn>,
    scope: Arc<ScopeStore>,
    builder: EventBuilder,
    sampler: Sampler,
    transport: TransportSlot,
    backend: Option<Arc<dyn Backend>>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Client")
            .field("dsn", &self.dsn)
            .field("options", &self.options)
            .finish()
    }
}

impl Client {
    /// Creates a client.
    ///
    /// Unset options are filled from the environment.  The outbox and
    /// staging directories are created and the crash backend is started;
    /// failures of either are returned.
    pub fn with_options(options: Options) -> Result<Client, Error> {
        let options = apply_defaults(options);
        set_debug(options.debug());

        let transport: Arc<dyn Transport> = match options.transport() {
            Some(transport) => transport.clone(),
            None => {
                let outbox = options.outbox_path().ok_or(Error::MissingOutboxPath)?;
                let staging = options
                    .database_path()
                    .ok_or(Error::MissingOutboxPath)?;
                Arc::new(OutboxWriter::open(outbox, staging)?)
            }
        };

        let dsn = options.dsn().and_then(|raw| match raw.parse::<Dsn>() {
            Ok(dsn) => Some(dsn),
            Err(err) => {
                sentry_debug!("[Client] ignoring invalid DSN {:?}: {}", raw, err);
                None
            }
        });

        let scope = Arc::new(ScopeStore::new(options.max_breadcrumbs()));
        let builder = EventBuilder::new(&options, scope.clone());
        let sampler = match options.random_source() {
            Some(source) => Sampler::new(source.clone()),
            None => Sampler::new(Arc::new(ThreadRandom)),
        };

        let backend = options.backend().cloned();
        if let Some(ref backend) = backend {
            backend.startup(&options, &scope).map_err(Error::BackendStartup)?;
            sentry_debug!(
                "[Client] crash backend started (handler strategy {})",
                options.handler_strategy().as_raw()
            );
        }

        Ok(Client {
            options,
            dsn,
            scope,
            builder,
            sampler,
            transport: RwLock::new(Some(transport)),
            backend,
        })
    }

    /// The options of this client after defaults were applied.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The parsed DSN, if a valid one was configured.
    pub fn dsn(&self) -> Option<&Dsn> {
        self.dsn.as_ref()
    }

    /// The scope store the client captures from.
    pub fn scope(&self) -> &Arc<ScopeStore> {
        &self.scope
    }

    /// Returns `true` until the client is closed.
    pub fn is_enabled(&self) -> bool {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Captures a message event.
    pub fn capture_message(&self, text: &str, level: Level) -> Uuid {
        let event = self.builder.build_message(text, level);
        self.capture_event(event)
    }

    /// Captures a transaction.
    ///
    /// `sampled` is an explicit sampling decision; `None` rolls against the
    /// configured traces sample rate.
    pub fn capture_transaction(&self, name: &str, spans: Vec<Span>, sampled: Option<bool>) -> Uuid {
        let event = self.builder.build_transaction(name, spans, sampled);
        self.capture_event(event)
    }

    /// Samples an already built event and hands it to the transport.
    ///
    /// Returns the event id, or the nil UUID if the event was dropped.
    pub fn capture_event(&self, mut event: Event) -> Uuid {
        let transport_opt = self
            .transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(transport) = transport_opt else {
            return Uuid::nil();
        };

        let keep = match event.kind {
            EventKind::Transaction => event.sampled.unwrap_or_else(|| {
                self.sampler
                    .should_sample(event.kind, self.options.traces_sample_rate())
            }),
            EventKind::Message => self.sampler.roll(self.options.sample_rate()),
        };
        if !keep {
            sentry_debug!("[Client] {} {} dropped by sampling", event.kind, event.event_id);
            return Uuid::nil();
        }

        if event.kind == EventKind::Message && self.options.attach_debug_images() {
            let images = load_module_list();
            event.debug_meta = Cow::Owned(DebugMeta {
                images: images.to_vec(),
            });
        }

        let event_id = event.event_id;
        let mut envelope = Envelope::from(event);
        envelope.set_dsn(self.dsn.clone());
        envelope.set_sent_at(SystemTime::now());
        transport.send_envelope(envelope);
        event_id
    }

    /// Flushes the transport.
    pub fn flush(&self, timeout: Option<Duration>) -> bool {
        let transport_opt = self
            .transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match transport_opt {
            Some(transport) => transport.flush(timeout.unwrap_or(self.options.shutdown_timeout())),
            None => true,
        }
    }

    /// Drains pending envelopes, shuts down the transport and the crash
    /// backend.  Closing twice is a no-op.
    pub fn close(&self, timeout: Option<Duration>) -> bool {
        let transport_opt = self
            .transport
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(transport) = transport_opt else {
            return true;
        };
        sentry_debug!("[Client] closing client");
        let result = transport.shutdown(timeout.unwrap_or(self.options.shutdown_timeout()));
        if let Some(ref backend) = self.backend {
            backend.shutdown();
        }
        result
    }
}
