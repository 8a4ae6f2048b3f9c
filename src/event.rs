//! Event records, payload bags, and subscription tokens.
//!
//! Events are transient: they exist between emission and the end of the
//! next dispatch. The payload is an opaque named-value bag the bus never
//! interprets.

use smallvec::SmallVec;

use crate::component::FieldValue;
use crate::entity::EntityHandle;

/// Process-local event channel identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventTypeId(pub u16);

/// Opaque event payload: a small bag of named values
#[derive(Debug, Clone, Default)]
pub struct EventPayload {
    values: SmallVec<[(String, FieldValue); 4]>,
}

impl EventPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.values.push((name.into(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }
}

/// One emitted event as delivered to subscribers
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub type_id: EventTypeId,
    pub payload: EventPayload,
    pub sender: EntityHandle,
    /// Monotonic per-bus emission counter
    pub sequence: u64,
}

/// Handle returned by `subscribe`, consumed by `unsubscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberToken {
    pub(crate) type_id: EventTypeId,
    pub(crate) id: u64,
}

impl SubscriberToken {
    /// Channel this token subscribes to
    pub fn type_id(&self) -> EventTypeId {
        self.type_id
    }
}

/// Subscriber callback. Failures are logged by the bus and never abort a
/// drain; the remaining subscribers still run.
pub type EventHandler = Box<dyn FnMut(&EventRecord) -> crate::error::Result<()>>;

/// What a capped channel does with the surplus event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Evict the oldest queued event, keep the new one
    #[default]
    DropOldest,
    /// Keep the queue, refuse the new event
    RejectNew,
}
