use std::fmt;
use std::sync::{Arc, Weak};

use resub_types::Pulse;

use crate::event::{FabricEvent, Priority};
use crate::fabric::Shared;
use crate::pattern::Pattern;

/// Context passed to a handler alongside the event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    /// `true` when the event is being re-delivered by
    /// [`EventFabric::replay`](crate::EventFabric::replay).
    pub is_replay: bool,
}

/// Subscriber callback.
pub type Handler = Arc<dyn Fn(&FabricEvent, &Delivery) -> anyhow::Result<()> + Send + Sync>;

/// Options accepted by [`EventFabric::subscribe`](crate::EventFabric::subscribe).
#[derive(Clone, Copy, Debug, Default)]
pub struct SubscribeOptions {
    /// Ordering among subscribers matched by the same event.
    pub priority: Priority,
    /// Minimum distance in pulses between handled events. Events arriving
    /// inside the window are skipped, not queued.
    pub rate_limit: Option<Pulse>,
}

pub(crate) struct Subscription {
    pub(crate) id: u64,
    pub(crate) pattern: Pattern,
    pub(crate) handler: Handler,
    pub(crate) priority: Priority,
    pub(crate) rate_limit: Option<Pulse>,
    pub(crate) last_handled: Option<Pulse>,
}

impl Subscription {
    /// Whether the rate limit admits an event stamped `timestamp`. Admitting
    /// the event opens a new window.
    pub(crate) fn admit(&mut self, timestamp: Pulse) -> bool {
        if let (Some(limit), Some(last)) = (self.rate_limit, self.last_handled) {
            if timestamp >= last && timestamp < last.saturating_add(limit) {
                return false;
            }
        }
        self.last_handled = Some(timestamp);
        true
    }
}

/// Capability to remove one subscription.
///
/// Dropping the handle does not unsubscribe. The handle does not keep the
/// fabric alive.
pub struct SubscriptionHandle {
    id: u64,
    pattern: Pattern,
    fabric: Weak<Shared>,
}

impl SubscriptionHandle {
    pub(crate) fn new(id: u64, pattern: Pattern, fabric: Weak<Shared>) -> Self {
        Self {
            id,
            pattern,
            fabric,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Remove the subscription. Returns `true` the first time and `false`
    /// on every later call.
    pub fn unsubscribe(&self) -> bool {
        match self.fabric.upgrade() {
            Some(shared) => shared.remove_subscription(self.id),
            None => false,
        }
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionHandle(#{}, {})", self.id, self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &FabricEvent, _: &Delivery) -> anyhow::Result<()> {
        Ok(())
    }

    fn subscription(rate_limit: Option<Pulse>) -> Subscription {
        Subscription {
            id: 0,
            pattern: Pattern::Wildcard,
            handler: Arc::new(noop),
            priority: Priority::Normal,
            rate_limit,
            last_handled: None,
        }
    }

    #[test]
    fn unlimited_admits_everything() {
        let mut sub = subscription(None);
        assert!(sub.admit(1));
        assert!(sub.admit(1));
        assert!(sub.admit(2));
    }

    #[test]
    fn rate_limit_window() {
        let mut sub = subscription(Some(10));
        assert!(sub.admit(100));
        assert!(!sub.admit(100));
        assert!(!sub.admit(109));
        assert!(sub.admit(110));
        assert!(!sub.admit(115));
    }

    #[test]
    fn older_events_are_outside_the_window() {
        let mut sub = subscription(Some(10));
        assert!(sub.admit(100));
        assert!(sub.admit(50));
    }
}
