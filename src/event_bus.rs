//! Typed event channels with double-buffered delivery.
//!
//! Each channel owns a `write` queue (current emissions) and a `read` queue
//! (what the barrier drains). At the frame barrier the queues swap, the
//! read side is delivered to every subscriber in subscription order, and
//! anything emitted during the drain waits in the fresh write queue for the
//! next barrier. That bounds recursion: no event can re-enter dispatch in
//! the frame that produced it.
//!
//! External threads never touch the bus. They clone an [`EventSender`] and
//! push through a crossbeam channel; the world drains that inbox onto the
//! write queues at the top of each update, on the main thread.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use crossbeam::channel::{unbounded, Receiver, Sender};
use serde::Serialize;

use crate::entity::EntityHandle;
use crate::error::{EcsError, Result};
use crate::event::{
    EventHandler, EventPayload, EventRecord, EventTypeId, OverflowPolicy, SubscriberToken,
};

struct Subscriber {
    token: SubscriberToken,
    handler: EventHandler,
}

struct Channel {
    name: String,
    write: VecDeque<EventRecord>,
    read: VecDeque<EventRecord>,
    subscribers: Vec<Subscriber>,
    cap: Option<usize>,
    overflow: OverflowPolicy,
}

impl Channel {
    fn new(name: String) -> Self {
        Self {
            name,
            write: VecDeque::new(),
            read: VecDeque::new(),
            subscribers: Vec::new(),
            cap: None,
            overflow: OverflowPolicy::default(),
        }
    }
}

/// An event queued from outside the tick, awaiting the inbox drain
struct PendingEvent {
    type_id: EventTypeId,
    payload: EventPayload,
    sender: EntityHandle,
}

/// Cloneable handle external producers use to reach the bus. Queued events
/// are serialized onto the main thread and enter the normal barrier flow on
/// the next update.
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<PendingEvent>,
}

impl EventSender {
    pub fn send(
        &self,
        type_id: EventTypeId,
        payload: EventPayload,
        sender: EntityHandle,
    ) -> Result<()> {
        self.tx
            .send(PendingEvent {
                type_id,
                payload,
                sender,
            })
            .map_err(|_| EcsError::Disconnected)
    }
}

/// Bus counters for the stats snapshot
#[derive(Debug, Clone, Serialize)]
pub struct EventBusStats {
    pub sent: u64,
    pub processed: u64,
    pub dropped: u64,
    pub max_queue_len: usize,
    pub avg_dispatch_ms: f64,
}

/// Typed, double-buffered event bus
pub struct EventBus {
    channels: AHashMap<EventTypeId, Channel>,
    sequence: u64,
    sent: u64,
    processed: u64,
    dropped: u64,
    max_queue_len: usize,
    dispatch_total: Duration,
    dispatches: u64,
    next_subscriber_id: u64,
    inbox_tx: Sender<PendingEvent>,
    inbox_rx: Receiver<PendingEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (inbox_tx, inbox_rx) = unbounded();
        Self {
            channels: AHashMap::new(),
            sequence: 0,
            sent: 0,
            processed: 0,
            dropped: 0,
            max_queue_len: 0,
            dispatch_total: Duration::ZERO,
            dispatches: 0,
            next_subscriber_id: 0,
            inbox_tx,
            inbox_rx,
        }
    }

    /// Declare a channel once
    pub fn register(&mut self, type_id: EventTypeId, name: impl Into<String>) -> Result<()> {
        if self.channels.contains_key(&type_id) {
            return Err(EcsError::AlreadyRegistered);
        }
        self.channels.insert(type_id, Channel::new(name.into()));
        Ok(())
    }

    /// Bound a channel's write queue. `None` restores unbounded growth.
    pub fn set_cap(
        &mut self,
        type_id: EventTypeId,
        cap: Option<usize>,
        overflow: OverflowPolicy,
    ) -> Result<()> {
        let channel = self.channels.get_mut(&type_id).ok_or(EcsError::UnknownType)?;
        channel.cap = cap;
        channel.overflow = overflow;
        Ok(())
    }

    /// Append to the channel's write queue; payload ownership transfers in.
    ///
    /// On a capped, full channel the send reports `QueueFull` either way;
    /// the overflow policy decides whether the oldest event is evicted to
    /// admit this one (`DropOldest`) or this one is refused (`RejectNew`).
    pub fn send(
        &mut self,
        type_id: EventTypeId,
        payload: EventPayload,
        sender: EntityHandle,
    ) -> Result<u64> {
        let channel = self.channels.get_mut(&type_id).ok_or(EcsError::UnknownType)?;

        if let Some(cap) = channel.cap {
            if channel.write.len() >= cap {
                self.dropped += 1;
                match channel.overflow {
                    OverflowPolicy::DropOldest => {
                        channel.write.pop_front();
                        let sequence = self.sequence;
                        self.sequence += 1;
                        channel.write.push_back(EventRecord {
                            type_id,
                            payload,
                            sender,
                            sequence,
                        });
                    }
                    OverflowPolicy::RejectNew => {}
                }
                return Err(EcsError::QueueFull);
            }
        }

        let sequence = self.sequence;
        self.sequence += 1;
        channel.write.push_back(EventRecord {
            type_id,
            payload,
            sender,
            sequence,
        });
        self.sent += 1;
        self.max_queue_len = self.max_queue_len.max(channel.write.len());
        Ok(sequence)
    }

    /// Attach a handler; returns the token for `unsubscribe`
    pub fn subscribe(&mut self, type_id: EventTypeId, handler: EventHandler) -> Result<SubscriberToken> {
        let channel = self.channels.get_mut(&type_id).ok_or(EcsError::UnknownType)?;
        let token = SubscriberToken {
            type_id,
            id: self.next_subscriber_id,
        };
        self.next_subscriber_id += 1;
        channel.subscribers.push(Subscriber { token, handler });
        Ok(token)
    }

    pub fn unsubscribe(&mut self, token: SubscriberToken) -> Result<()> {
        let channel = self
            .channels
            .get_mut(&token.type_id)
            .ok_or(EcsError::UnknownToken)?;
        let before = channel.subscribers.len();
        channel.subscribers.retain(|s| s.token != token);
        if channel.subscribers.len() == before {
            return Err(EcsError::UnknownToken);
        }
        Ok(())
    }

    /// Cloneable external-producer handle
    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.inbox_tx.clone(),
        }
    }

    /// Move externally queued events onto the channels' write queues.
    /// Runs on the main thread at the top of each update.
    pub fn drain_inbox(&mut self) {
        while let Ok(pending) = self.inbox_rx.try_recv() {
            if let Err(err) = self.send(pending.type_id, pending.payload, pending.sender) {
                tracing::warn!(%err, type_id = pending.type_id.0, "inbox event not queued");
            }
        }
    }

    /// Frame barrier: per channel swap `write`/`read`, deliver every read
    /// event to every subscriber exactly once in subscription order, then
    /// clear. Channels drain in ascending type-id order so identical input
    /// sequences replay identically.
    pub fn dispatch(&mut self) {
        let started = Instant::now();

        let mut ids: Vec<EventTypeId> = self.channels.keys().copied().collect();
        ids.sort_unstable();

        for id in ids {
            let channel = self.channels.get_mut(&id).expect("channel ids just listed");
            std::mem::swap(&mut channel.write, &mut channel.read);

            while let Some(event) = channel.read.pop_front() {
                for subscriber in channel.subscribers.iter_mut() {
                    if let Err(err) = (subscriber.handler)(&event) {
                        tracing::warn!(
                            channel = channel.name.as_str(),
                            sequence = event.sequence,
                            %err,
                            "subscriber failed; continuing drain"
                        );
                    }
                }
                self.processed += 1;
            }
        }

        self.dispatch_total += started.elapsed();
        self.dispatches += 1;
    }

    pub fn subscriber_count(&self, type_id: EventTypeId) -> usize {
        self.channels
            .get(&type_id)
            .map(|c| c.subscribers.len())
            .unwrap_or(0)
    }

    /// Events currently queued for the next barrier
    pub fn pending(&self, type_id: EventTypeId) -> usize {
        self.channels.get(&type_id).map(|c| c.write.len()).unwrap_or(0)
    }

    pub fn is_registered(&self, type_id: EventTypeId) -> bool {
        self.channels.contains_key(&type_id)
    }

    pub fn stats(&self) -> EventBusStats {
        let avg_dispatch_ms = if self.dispatches == 0 {
            0.0
        } else {
            self.dispatch_total.as_secs_f64() * 1000.0 / self.dispatches as f64
        };
        EventBusStats {
            sent: self.sent,
            processed: self.processed,
            dropped: self.dropped,
            max_queue_len: self.max_queue_len,
            avg_dispatch_ms,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
