use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use bytes::Bytes;
use futures::{FutureExt, Stream};
use tokio::sync::mpsc;
use utils::context::Context;

use crate::subscription::{Callback, PubSub, PubSubError, SubscriptionTopic};

/// Typed events from one topic, ending when the caller's context is
/// cancelled.
///
/// After cancellation the subscription is torn down first and the channel
/// closed second, so the stream yields `None` only once nothing can be sent
/// to it anymore.
pub struct LiveStream<T> {
	rx: mpsc::Receiver<T>,
}

impl<T> Stream for LiveStream<T> {
	type Item = T;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
		self.rx.poll_recv(cx)
	}
}

impl<T> LiveStream<T> {
	pub async fn recv(&mut self) -> Option<T> {
		self.rx.recv().await
	}
}

#[tracing::instrument(skip(pubsub, ctx), err)]
pub async fn subscribe<P, T>(
	pubsub: &P,
	topic: SubscriptionTopic,
	ctx: Context,
	capacity: usize,
) -> Result<LiveStream<T>, PubSubError>
where
	P: PubSub,
	T: prost::Message + Default + Send + 'static,
{
	let (tx, rx) = mpsc::channel::<T>(capacity.max(1));

	let forward = tx.clone();
	let callback: Callback = Arc::new(move |payload: Bytes| {
		let tx = forward.clone();
		async move {
			match T::decode(payload) {
				Ok(event) => {
					// a closed channel means the consumer is gone, the watcher below unsubscribes
					tx.send(event).await.ok();
				}
				Err(err) => tracing::warn!(%topic, error = %err, "failed to decode live event"),
			}
		}
		.boxed()
	});

	let subscription = pubsub.subscribe(topic, callback).await?;

	tokio::spawn(async move {
		tokio::select! {
			_ = ctx.done() => {}
			_ = tx.closed() => {}
		}

		subscription.unsubscribe().await;
		tracing::debug!(%topic, "live stream closed");
		drop(tx);
	});

	Ok(LiveStream { rx })
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use futures::StreamExt;
	use prost::Message;
	use ulid::Ulid;

	use super::*;
	use crate::pb;
	use crate::subscription::local::LocalPubSub;

	fn item(content: &str) -> Bytes {
		pb::TimelineItem {
			id: Some(Ulid::new().into()),
			user_id: None,
			post: Some(pb::Post {
				content: content.to_string(),
				..Default::default()
			}),
		}
		.encode_to_vec()
		.into()
	}

	#[tokio::test]
	async fn forwards_decoded_events() {
		let pubsub = LocalPubSub::new(8);
		let topic = SubscriptionTopic::Timeline(Ulid::new());
		let (ctx, _handler) = Context::new();

		let mut stream = subscribe::<_, pb::TimelineItem>(&pubsub, topic, ctx, 1).await.unwrap();

		pubsub.publish(topic, item("hello")).await.unwrap();
		let event = tokio::time::timeout(Duration::from_secs(1), stream.next()).await.unwrap().unwrap();
		assert_eq!(event.post.unwrap().content, "hello");
	}

	#[tokio::test]
	async fn undecodable_payloads_are_skipped() {
		let pubsub = LocalPubSub::new(8);
		let topic = SubscriptionTopic::Timeline(Ulid::new());
		let (ctx, _handler) = Context::new();

		let mut stream = subscribe::<_, pb::TimelineItem>(&pubsub, topic, ctx, 1).await.unwrap();

		pubsub.publish(topic, Bytes::from_static(&[0xff, 0xff, 0xff])).await.unwrap();
		pubsub.publish(topic, item("valid")).await.unwrap();

		let event = tokio::time::timeout(Duration::from_secs(1), stream.next()).await.unwrap().unwrap();
		assert_eq!(event.post.unwrap().content, "valid");
	}

	#[tokio::test]
	async fn cancellation_unsubscribes_then_ends_the_stream() {
		let pubsub = LocalPubSub::new(8);
		let topic = SubscriptionTopic::Timeline(Ulid::new());
		let (ctx, handler) = Context::new();

		let mut stream = subscribe::<_, pb::TimelineItem>(&pubsub, topic, ctx, 1).await.unwrap();
		assert_eq!(pubsub.subscriber_count(topic), 1);

		handler.cancel();

		let end = tokio::time::timeout(Duration::from_secs(1), stream.next()).await.unwrap();
		assert!(end.is_none());
		assert_eq!(pubsub.subscriber_count(topic), 0);

		pubsub.publish(topic, item("late")).await.unwrap();
		assert!(stream.next().await.is_none());
	}

	#[tokio::test]
	async fn dropping_the_stream_releases_the_subscription() {
		let pubsub = LocalPubSub::new(8);
		let topic = SubscriptionTopic::Notification(Ulid::new());
		let (ctx, _handler) = Context::new();

		let stream = subscribe::<_, pb::Notification>(&pubsub, topic, ctx, 1).await.unwrap();
		drop(stream);

		tokio::time::timeout(Duration::from_secs(1), async {
			while pubsub.subscriber_count(topic) != 0 {
				tokio::time::sleep(Duration::from_millis(10)).await;
			}
		})
		.await
		.unwrap();
	}
}
