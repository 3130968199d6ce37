//! Process-local broker for tests and local development.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use proto::{BrokerError, Envelope, ReceivedBatch};
use tracing::debug;

use super::{Broker, decode_payload, encode_envelope};

/// FIFO queues held in memory, one per bound routing key.
///
/// Publishing to a routing key without a bound queue reports `routed = false`,
/// fetching from an unknown queue fails like the management API's 404.
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    publish_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl InMemoryBroker {
    /// Creates a broker with one empty queue bound per name.
    pub fn new<I, S>(queues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queues = queues
            .into_iter()
            .map(|name| (name.into(), VecDeque::new()))
            .collect();
        Self {
            queues: Mutex::new(queues),
            ..Self::default()
        }
    }

    /// Number of messages waiting in `queue`.
    pub fn depth(&self, queue: &str) -> Option<usize> {
        self.queues.lock().get(queue).map(VecDeque::len)
    }

    /// Appends a raw payload to `queue`, as a publisher other than the gateway would.
    ///
    /// Returns `false` when no such queue is bound.
    pub fn push_payload(&self, queue: &str, payload: impl Into<String>) -> bool {
        match self.queues.lock().get_mut(queue) {
            Some(pending) => {
                pending.push_back(payload.into());
                true
            }
            None => false,
        }
    }

    /// Publish calls received so far, routed or not.
    pub fn publish_calls(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }

    /// Fetch calls received so far.
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, queue: &str, envelope: &Envelope) -> Result<bool, BrokerError> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        let payload = encode_envelope(envelope)?;

        let mut queues = self.queues.lock();
        match queues.get_mut(queue) {
            Some(pending) => {
                pending.push_back(payload);
                debug!(queue, depth = pending.len(), "Message stored");
                Ok(true)
            }
            None => {
                debug!(queue, "No queue bound for routing key");
                Ok(false)
            }
        }
    }

    async fn fetch(&self, queue: &str, count: u32) -> Result<ReceivedBatch, BrokerError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let (payloads, remaining) = {
            let mut queues = self.queues.lock();
            let pending = queues.get_mut(queue).ok_or_else(|| BrokerError::Status {
                status: 404,
                body: format!("no queue '{queue}' in vhost '/'"),
            })?;
            let take = pending.len().min(count as usize);
            let payloads: Vec<String> = pending.drain(..take).collect();
            (payloads, pending.len() as u64)
        };

        let received: Vec<_> = payloads.iter().map(|payload| decode_payload(payload)).collect();
        let remaining = if received.is_empty() { 0 } else { remaining };
        Ok(ReceivedBatch {
            received,
            remaining,
        })
    }
}
