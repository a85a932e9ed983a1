use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use resub_crypto::Signer;
use resub_types::{Clock, NonceSource, Pulse};

use crate::config::FabricConfig;
use crate::error::{FabricError, Result};
use crate::event::{Category, EmitOptions, EventId, FabricEvent};
use crate::metrics::FabricMetrics;
use crate::pattern::Pattern;
use crate::subscription::{Delivery, SubscribeOptions, Subscription, SubscriptionHandle};

/// Version tag written into every export.
pub const FABRIC_VERSION: &str = "resub-fabric/1";

/// Result of [`EventFabric::replay`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySummary {
    pub events: usize,
    pub deliveries: u64,
    pub handler_errors: u64,
}

/// Serializable snapshot of the event log and counters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FabricExport {
    pub version: String,
    pub events: Vec<FabricEvent>,
    pub metrics: FabricMetrics,
    /// Logical time of the export.
    pub exported: Pulse,
}

/// Central event bus.
///
/// Emitted events are appended to a permanent log and a pending queue.
/// While the fabric is running, every emit drains the queue immediately;
/// while stopped, events accumulate until [`EventFabric::flush`] or
/// [`EventFabric::start`].
///
/// Dispatch is sequential and never re-entrant. The internal lock is not
/// held while handlers run, so a handler may emit, subscribe, or
/// unsubscribe; events it emits are queued and drained by the dispatch
/// loop that is already active.
#[derive(Clone)]
pub struct EventFabric {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
    nonces: Arc<dyn NonceSource>,
    config: FabricConfig,
}

struct State {
    identity: Option<Arc<dyn Signer>>,
    log: Vec<FabricEvent>,
    pending: Vec<FabricEvent>,
    subscriptions: Vec<Subscription>,
    next_subscription: u64,
    running: bool,
    dispatching: bool,
    sealed: bool,
    metrics: FabricMetrics,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn remove_subscription(&self, id: u64) -> bool {
        let mut state = self.lock();
        match state.subscriptions.iter().position(|s| s.id == id) {
            Some(index) => {
                state.subscriptions.remove(index);
                debug!(subscription = id, "unsubscribed");
                true
            }
            None => false,
        }
    }
}

#[derive(Default)]
struct Tally {
    deliveries: u64,
    errors: u64,
}

impl EventFabric {
    /// Create a stopped, unsealed fabric with no identity attached.
    pub fn new(
        clock: Arc<dyn Clock>,
        nonces: Arc<dyn NonceSource>,
        config: FabricConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    identity: None,
                    log: Vec::new(),
                    pending: Vec::new(),
                    subscriptions: Vec::new(),
                    next_subscription: 0,
                    running: false,
                    dispatching: false,
                    sealed: false,
                    metrics: FabricMetrics::default(),
                }),
                clock,
                nonces,
                config,
            }),
        }
    }

    /// Attach an identity. Later events carry its DID as their source and
    /// are signed when [`FabricConfig::sign_events`] is set.
    pub fn with_identity(self, identity: Arc<dyn Signer>) -> Self {
        self.shared.lock().identity = Some(identity);
        self
    }

    pub fn config(&self) -> &FabricConfig {
        &self.shared.config
    }

    /// Validate, stamp, record, and enqueue an event.
    pub fn emit(
        &self,
        category: Category,
        event_type: &str,
        payload: Value,
        options: EmitOptions,
    ) -> Result<FabricEvent> {
        let (event, should_flush) = {
            let mut state = self.shared.lock();
            if state.sealed {
                return Err(FabricError::FabricSealed);
            }
            if event_type.trim().is_empty() {
                return Err(FabricError::InvalidType);
            }
            check_payload(&payload)?;

            let timestamp = self.shared.clock.now();
            let nonce = self.shared.nonces.generate();
            let source = state.identity.as_ref().map(|identity| identity.did());
            let mut event = FabricEvent::new(
                EventId::new(timestamp, &nonce),
                category,
                event_type.to_string(),
                payload,
                source,
                timestamp,
                options.priority,
                options.metadata,
            );
            if self.shared.config.sign_events {
                if let Some(identity) = &state.identity {
                    event = event.sign(identity.as_ref())?;
                }
            }

            state.log.push(event.clone());
            state.pending.push(event.clone());
            state.metrics.events_emitted += 1;
            debug!(id = %event.id(), %category, event_type, "event emitted");
            (event, state.running && !state.dispatching)
        };
        if should_flush {
            self.flush();
        }
        Ok(event)
    }

    /// Register a handler for events matching `pattern`.
    pub fn subscribe<F>(
        &self,
        pattern: &str,
        handler: F,
        options: SubscribeOptions,
    ) -> Result<SubscriptionHandle>
    where
        F: Fn(&FabricEvent, &Delivery) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut state = self.shared.lock();
        if state.sealed {
            return Err(FabricError::FabricSealed);
        }
        let pattern = Pattern::parse(pattern)?;
        let limit = self.shared.config.max_subscriptions;
        if state.subscriptions.len() >= limit {
            return Err(FabricError::ResourceExhausted { limit });
        }

        let id = state.next_subscription;
        state.next_subscription += 1;
        state.subscriptions.push(Subscription {
            id,
            pattern: pattern.clone(),
            handler: Arc::new(handler),
            priority: options.priority,
            rate_limit: options.rate_limit,
            last_handled: None,
        });
        debug!(subscription = id, %pattern, "subscribed");
        Ok(SubscriptionHandle::new(
            id,
            pattern,
            Arc::downgrade(&self.shared),
        ))
    }

    /// Mark the fabric running and drain anything pending.
    pub fn start(&self) {
        self.shared.lock().running = true;
        info!("fabric started");
        self.flush();
    }

    /// Stop dispatching on emit. Pending events are kept.
    pub fn stop(&self) {
        self.shared.lock().running = false;
        info!("fabric stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    /// Drain the pending queue.
    ///
    /// Each round sorts what is pending by `(priority, timestamp)` and
    /// delivers up to `batch_size` events, so events emitted by handlers
    /// compete with the remainder on the next round. Returns the number of
    /// events dispatched, or zero if a dispatch loop is already active.
    pub fn flush(&self) -> usize {
        {
            let mut state = self.shared.lock();
            if state.dispatching {
                return 0;
            }
            state.dispatching = true;
        }

        let batch_size = self.shared.config.batch_size.max(1);
        let mut dispatched = 0;
        loop {
            let batch: Vec<FabricEvent> = {
                let mut state = self.shared.lock();
                if state.pending.is_empty() {
                    state.dispatching = false;
                    break;
                }
                state
                    .pending
                    .sort_by_key(|event| (event.priority(), event.timestamp()));
                let take = batch_size.min(state.pending.len());
                state.pending.drain(..take).collect()
            };

            for event in &batch {
                let tally = self.deliver(event, Delivery::default());
                let mut state = self.shared.lock();
                state.metrics.events_delivered += tally.deliveries;
                state.metrics.handler_errors += tally.errors;
            }
            self.shared.lock().metrics.batches_dispatched += 1;
            dispatched += batch.len();
        }
        dispatched
    }

    /// Re-deliver events to the current subscribers.
    ///
    /// Defaults to the whole log. Events are ordered like live dispatch and
    /// handlers see [`Delivery::is_replay`] set. Nothing is re-validated,
    /// re-signed, or appended, and rate limits do not apply.
    ///
    /// Replay holds the dispatch slot, so events emitted by replay handlers
    /// are queued and drained once replay finishes. Returns an empty summary
    /// if a dispatch loop is already active.
    pub fn replay(&self, events: Option<&[FabricEvent]>) -> ReplaySummary {
        let mut events = {
            let mut state = self.shared.lock();
            if state.dispatching {
                warn!("replay requested while dispatching; ignored");
                return ReplaySummary::default();
            }
            state.dispatching = true;
            match events {
                Some(events) => events.to_vec(),
                None => state.log.clone(),
            }
        };
        events.sort_by_key(|event| (event.priority(), event.timestamp()));

        let delivery = Delivery { is_replay: true };
        let mut summary = ReplaySummary {
            events: events.len(),
            ..Default::default()
        };
        for event in &events {
            let tally = self.deliver(event, delivery);
            summary.deliveries += tally.deliveries;
            summary.handler_errors += tally.errors;
        }

        let drain = {
            let mut state = self.shared.lock();
            state.metrics.events_replayed += events.len() as u64;
            state.metrics.handler_errors += summary.handler_errors;
            state.dispatching = false;
            state.running && !state.pending.is_empty()
        };
        info!(
            events = summary.events,
            deliveries = summary.deliveries,
            "fabric replay complete"
        );
        if drain {
            self.flush();
        }
        summary
    }

    /// Permanently refuse further emits, subscriptions, and imports.
    pub fn seal(&self) {
        self.shared.lock().sealed = true;
        info!("fabric sealed");
    }

    pub fn is_sealed(&self) -> bool {
        self.shared.lock().sealed
    }

    /// Every event ever emitted or imported, in emission order.
    pub fn events(&self) -> Vec<FabricEvent> {
        self.shared.lock().log.clone()
    }

    pub fn events_by_category(&self, category: Category) -> Vec<FabricEvent> {
        self.shared
            .lock()
            .log
            .iter()
            .filter(|event| event.category() == category)
            .cloned()
            .collect()
    }

    pub fn events_matching(&self, pattern: &str) -> Result<Vec<FabricEvent>> {
        let pattern = Pattern::parse(pattern)?;
        Ok(self
            .shared
            .lock()
            .log
            .iter()
            .filter(|event| pattern.matches(event))
            .cloned()
            .collect())
    }

    pub fn pending_count(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.shared.lock().subscriptions.len()
    }

    pub fn metrics(&self) -> FabricMetrics {
        let state = self.shared.lock();
        FabricMetrics {
            active_subscriptions: state.subscriptions.len(),
            ..state.metrics.clone()
        }
    }

    pub fn export(&self) -> FabricExport {
        let exported = self.shared.clock.now();
        let events = self.events();
        FabricExport {
            version: FABRIC_VERSION.to_string(),
            events,
            metrics: self.metrics(),
            exported,
        }
    }

    /// Replace the log and counters with an export. Nothing is dispatched
    /// and the pending queue is cleared.
    pub fn import(&self, export: FabricExport) -> Result<()> {
        let mut state = self.shared.lock();
        if state.sealed {
            return Err(FabricError::FabricSealed);
        }
        if export.version != FABRIC_VERSION {
            return Err(FabricError::VersionMismatch {
                expected: FABRIC_VERSION.to_string(),
                found: export.version,
            });
        }
        info!(events = export.events.len(), "fabric log imported");
        state.log = export.events;
        state.metrics = export.metrics;
        state.pending.clear();
        Ok(())
    }

    /// Deliver one event to its matching subscribers.
    fn deliver(&self, event: &FabricEvent, delivery: Delivery) -> Tally {
        let handlers = {
            let mut state = self.shared.lock();
            let mut matched: Vec<usize> = state
                .subscriptions
                .iter()
                .enumerate()
                .filter(|(_, sub)| sub.pattern.matches(event))
                .map(|(index, _)| index)
                .collect();
            matched.sort_by_key(|&index| {
                let sub = &state.subscriptions[index];
                (sub.priority, match_rank(&sub.pattern))
            });

            let mut skipped = 0;
            let mut handlers = Vec::with_capacity(matched.len());
            for index in matched {
                let sub = &mut state.subscriptions[index];
                if !delivery.is_replay && !sub.admit(event.timestamp()) {
                    skipped += 1;
                    continue;
                }
                handlers.push((sub.id, Arc::clone(&sub.handler)));
            }
            state.metrics.rate_limited_skips += skipped;
            handlers
        };

        let mut tally = Tally::default();
        for (id, handler) in handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(event, &delivery))) {
                Ok(Ok(())) => tally.deliveries += 1,
                Ok(Err(error)) => {
                    tally.errors += 1;
                    warn!(subscription = id, event = %event.id(), %error, "handler failed");
                }
                Err(panic) => {
                    tally.errors += 1;
                    warn!(
                        subscription = id,
                        event = %event.id(),
                        reason = panic_message(panic.as_ref()),
                        "handler panicked"
                    );
                }
            }
        }
        tally
    }
}

/// Ordering among subscribers of equal priority: global, exact, category,
/// then type wildcards.
fn match_rank(pattern: &Pattern) -> u8 {
    match pattern {
        Pattern::Wildcard => 0,
        Pattern::Exact(..) => 1,
        Pattern::Category(_) => 2,
        Pattern::TypeWildcard(_) => 3,
    }
}

fn check_payload(payload: &Value) -> Result<()> {
    let kind = match payload {
        Value::Object(_) | Value::Array(_) => return Ok(()),
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
    };
    Err(FabricError::InvalidPayload(kind))
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic"
    }
}

impl fmt::Debug for EventFabric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("EventFabric")
            .field("events", &state.log.len())
            .field("pending", &state.pending.len())
            .field("subscriptions", &state.subscriptions.len())
            .field("running", &state.running)
            .field("sealed", &state.sealed)
            .finish()
    }
}
