use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use ulid::Ulid;
use utils::context::Handler;

use self::local::LocalPubSub;
use self::nats::{NatsPubSub, NatsPubSubError};
use crate::config::PubSubConfig;

pub mod local;
pub mod nats;

#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
	#[error("nats: {0}")]
	Nats(#[from] NatsPubSubError),
}

/// Per-recipient topics. There is no wildcard subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionTopic {
	Timeline(Ulid),
	Notification(Ulid),
	PostComments(Ulid),
}

impl std::fmt::Display for SubscriptionTopic {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Timeline(user_id) => write!(f, "timeline_{user_id}"),
			Self::Notification(user_id) => write!(f, "notification_{user_id}"),
			Self::PostComments(post_id) => write!(f, "post_comments_{post_id}"),
		}
	}
}

impl async_nats::subject::ToSubject for SubscriptionTopic {
	fn to_subject(&self) -> async_nats::Subject {
		self.to_string().into()
	}
}

/// Invoked once per payload published on the subscribed topic, on the
/// subscription's own task.
pub type Callback = Arc<dyn Fn(Bytes) -> BoxFuture<'static, ()> + Send + Sync>;

pub trait PubSub: Send + Sync {
	/// Hands `payload` to every current subscriber of `topic`. Returns
	/// without waiting for delivery; no subscribers is not an error.
	fn publish(
		&self,
		topic: SubscriptionTopic,
		payload: Bytes,
	) -> impl std::future::Future<Output = Result<(), PubSubError>> + Send;

	fn subscribe(
		&self,
		topic: SubscriptionTopic,
		callback: Callback,
	) -> impl std::future::Future<Output = Result<Subscription, PubSubError>> + Send;
}

/// A live registration returned by [`PubSub::subscribe`].
///
/// Dropping it also unsubscribes, without waiting.
#[derive(Debug)]
pub struct Subscription {
	topic: SubscriptionTopic,
	handler: Handler,
}

impl Subscription {
	pub(crate) fn new(topic: SubscriptionTopic, handler: Handler) -> Self {
		Self { topic, handler }
	}

	pub fn topic(&self) -> SubscriptionTopic {
		self.topic
	}

	/// Stops the subscription and waits for its task to exit. Once this
	/// returns the callback will not be invoked again. Safe to call more
	/// than once.
	pub async fn unsubscribe(&self) {
		self.handler.shutdown().await;
	}
}

#[derive(Debug)]
pub enum AnyPubSub {
	Local(LocalPubSub),
	Nats(NatsPubSub),
}

impl PubSub for AnyPubSub {
	async fn publish(&self, topic: SubscriptionTopic, payload: Bytes) -> Result<(), PubSubError> {
		match self {
			Self::Local(pubsub) => pubsub.publish(topic, payload).await,
			Self::Nats(pubsub) => pubsub.publish(topic, payload).await,
		}
	}

	async fn subscribe(&self, topic: SubscriptionTopic, callback: Callback) -> Result<Subscription, PubSubError> {
		match self {
			Self::Local(pubsub) => pubsub.subscribe(topic, callback).await,
			Self::Nats(pubsub) => pubsub.subscribe(topic, callback).await,
		}
	}
}

/// Builds the process-wide bus. Call once at startup and share the result.
pub async fn build_pubsub(name: &str, config: &PubSubConfig) -> Result<AnyPubSub, PubSubError> {
	match config {
		PubSubConfig::Local(local) => Ok(AnyPubSub::Local(LocalPubSub::new(local.queue_capacity))),
		PubSubConfig::Nats(nats) => Ok(AnyPubSub::Nats(NatsPubSub::connect(name, nats).await?)),
	}
}
