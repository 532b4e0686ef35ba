use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use utils::context::{Context, Handler};

use super::{Callback, PubSub, PubSubError, Subscription, SubscriptionTopic};

struct Subscriber {
	id: u64,
	queue: mpsc::Sender<Bytes>,
}

#[derive(Default)]
struct Registry {
	topics: RwLock<HashMap<SubscriptionTopic, Vec<Subscriber>>>,
	next_id: AtomicU64,
}

impl Registry {
	fn insert(&self, topic: SubscriptionTopic, queue: mpsc::Sender<Bytes>) -> u64 {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		self.topics.write().entry(topic).or_default().push(Subscriber { id, queue });
		id
	}

	fn remove(&self, topic: SubscriptionTopic, id: u64) {
		let mut topics = self.topics.write();
		if let Some(subscribers) = topics.get_mut(&topic) {
			subscribers.retain(|subscriber| subscriber.id != id);
			if subscribers.is_empty() {
				topics.remove(&topic);
			}
		}
	}
}

/// In-process bus for single-instance deployments.
///
/// Each subscriber owns a bounded queue drained by its own task, so a slow
/// callback only delays its own deliveries. Publishing never waits: when a
/// subscriber's queue is full the payload is dropped for that subscriber.
pub struct LocalPubSub {
	registry: Arc<Registry>,
	queue_capacity: usize,
}

impl std::fmt::Debug for LocalPubSub {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LocalPubSub")
			.field("topics", &self.topic_count())
			.field("queue_capacity", &self.queue_capacity)
			.finish()
	}
}

impl LocalPubSub {
	pub fn new(queue_capacity: usize) -> Self {
		Self {
			registry: Arc::default(),
			queue_capacity: queue_capacity.max(1),
		}
	}

	pub fn topic_count(&self) -> usize {
		self.registry.topics.read().len()
	}

	pub fn subscriber_count(&self, topic: SubscriptionTopic) -> usize {
		self.registry.topics.read().get(&topic).map_or(0, Vec::len)
	}
}

impl PubSub for LocalPubSub {
	async fn publish(&self, topic: SubscriptionTopic, payload: Bytes) -> Result<(), PubSubError> {
		let topics = self.registry.topics.read();
		let Some(subscribers) = topics.get(&topic) else {
			return Ok(());
		};

		for subscriber in subscribers {
			match subscriber.queue.try_send(payload.clone()) {
				Ok(()) => {}
				Err(mpsc::error::TrySendError::Full(_)) => {
					tracing::warn!(%topic, subscriber = subscriber.id, "subscriber queue full, dropping payload");
				}
				// the subscriber is shutting down and will deregister itself
				Err(mpsc::error::TrySendError::Closed(_)) => {}
			}
		}

		Ok(())
	}

	async fn subscribe(&self, topic: SubscriptionTopic, callback: Callback) -> Result<Subscription, PubSubError> {
		let (queue, mut rx) = mpsc::channel(self.queue_capacity);
		let id = self.registry.insert(topic, queue);

		let handler = Handler::new();
		let ctx = handler.context();
		let registry = self.registry.clone();

		tokio::spawn(async move {
			dispatch(&ctx, &mut rx, &callback).await;
			registry.remove(topic, id);
			tracing::trace!(%topic, subscriber = id, "local subscription closed");
			drop(callback);
			drop(ctx);
		});

		Ok(Subscription::new(topic, handler))
	}
}

/// Feeds queued payloads to `callback` one at a time until `ctx` is
/// cancelled. A cancelled context also aborts an in-flight callback.
pub(super) async fn dispatch(ctx: &Context, rx: &mut mpsc::Receiver<Bytes>, callback: &Callback) {
	loop {
		let payload = tokio::select! {
			biased;
			_ = ctx.done() => return,
			payload = rx.recv() => match payload {
				Some(payload) => payload,
				None => return,
			},
		};

		tokio::select! {
			biased;
			_ = ctx.done() => return,
			_ = callback(payload) => {}
		}
	}
}
