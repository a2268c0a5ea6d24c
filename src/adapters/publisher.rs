//! Outbound event publisher.
//!
//! Uses an `embassy-sync` bounded channel to bridge the synchronous
//! control loop with the network task. The control loop never waits:
//! when the queue is full the event is dropped with a warning and never
//! retried.
//!
//! ```text
//! ┌──────────────┐ OutboundMessage ┌──────────────┐  publish()  ┌────────┐
//! │ Control Loop │───try_send────▶│  EventQueue  │───────────▶│ broker │
//! │  (sync)      │                 │  (depth 32)  │  run/drain  │        │
//! └──────────────┘                 └──────────────┘             └────────┘
//! ```

use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;
use log::{debug, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, MessageTransport, Qos};
use crate::error::PublishError;

use super::mqtt::{Topic, Topics};

/// Channel depth for outbound messages.
pub const QUEUE_DEPTH: usize = 32;

/// Largest serialized event the queue carries.
pub const MAX_PAYLOAD_LEN: usize = 1024;

/// One serialized notification, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: Topic,
    pub payload: Vec<u8, MAX_PAYLOAD_LEN>,
    pub qos: Qos,
}

/// Bounded queue between the control loop and the network task.
pub struct EventQueue {
    channel: Channel<CriticalSectionRawMutex, OutboundMessage, QUEUE_DEPTH>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Enqueue without waiting.
    pub fn try_push(&self, msg: OutboundMessage) -> Result<(), PublishError> {
        self.channel
            .try_send(msg)
            .map_err(|_| PublishError::QueueFull)
    }

    pub fn try_pop(&self) -> Option<OutboundMessage> {
        self.channel.try_receive().ok()
    }

    /// Wait for the next message.
    pub async fn pop(&self) -> OutboundMessage {
        self.channel.receive().await
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}

// ── Producer side ─────────────────────────────────────────────

/// [`EventSink`] that serializes events to JSON and queues them.
pub struct QueuedPublisher {
    queue: Arc<EventQueue>,
    topics: Topics,
    dropped: u32,
}

impl QueuedPublisher {
    pub fn new(queue: Arc<EventQueue>, topics: Topics) -> Self {
        Self {
            queue,
            topics,
            dropped: 0,
        }
    }

    /// Events lost to a full queue or oversized payload since boot.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    fn enqueue(&self, event: &AppEvent) -> Result<(), PublishError> {
        let (topic, qos, json) = match event {
            AppEvent::Action(a) => (&self.topics.action, Qos::AtLeastOnce, serde_json::to_vec(a)),
            AppEvent::State(s) => (&self.topics.state, Qos::AtMostOnce, serde_json::to_vec(s)),
        };
        let json = json.map_err(|_| PublishError::Serialize)?;
        let payload = Vec::from_slice(&json).map_err(|()| PublishError::PayloadTooLarge)?;
        self.queue.try_push(OutboundMessage {
            topic: topic.clone(),
            payload,
            qos,
        })
    }
}

impl EventSink for QueuedPublisher {
    fn emit(&mut self, event: &AppEvent) {
        if let Err(e) = self.enqueue(event) {
            self.dropped = self.dropped.saturating_add(1);
            warn!("publish: event dropped ({e}), {} lost so far", self.dropped);
        }
    }
}

// ── Consumer side ─────────────────────────────────────────────

/// Deliver everything currently queued. Returns how many were sent.
pub fn drain_once(queue: &EventQueue, transport: &mut impl MessageTransport) -> usize {
    let mut sent = 0;
    while let Some(msg) = queue.try_pop() {
        if deliver(&msg, transport) {
            sent += 1;
        }
    }
    sent
}

/// Network-task body: deliver messages as they arrive, forever.
pub async fn run(queue: &EventQueue, transport: &mut impl MessageTransport) {
    loop {
        let msg = queue.pop().await;
        deliver(&msg, transport);
    }
}

fn deliver(msg: &OutboundMessage, transport: &mut impl MessageTransport) -> bool {
    match transport.publish(&msg.topic, &msg.payload, msg.qos) {
        Ok(()) => {
            debug!("publish: {} ({} bytes)", msg.topic, msg.payload.len());
            true
        }
        Err(e) => {
            // Best effort: failed notifications are not retried.
            warn!("publish: {} dropped ({e})", msg.topic);
            false
        }
    }
}
