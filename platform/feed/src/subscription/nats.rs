use std::time::Duration;

use async_nats::ServerAddr;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use utils::context::Handler;

use super::{Callback, PubSub, PubSubError, Subscription, SubscriptionTopic};
use crate::config::NatsConfig;

#[derive(Debug, thiserror::Error)]
pub enum NatsPubSubError {
	#[error("invalid server address: {0}")]
	ServerAddr(String),
	#[error("connect: {0}")]
	Connect(#[from] async_nats::ConnectError),
	#[error("publish: {0}")]
	Publish(#[from] async_nats::PublishError),
	#[error("subscribe: {0}")]
	Subscribe(#[from] async_nats::SubscribeError),
}

/// Bus backed by NATS core subjects, for deployments running several
/// instances. Delivery is at-most-once, same as the local backend.
#[derive(Debug, Clone)]
pub struct NatsPubSub {
	nats: async_nats::Client,
	queue_capacity: usize,
}

impl NatsPubSub {
	#[tracing::instrument(skip(config), name = "NatsPubSub::connect", err)]
	pub async fn connect(name: &str, config: &NatsConfig) -> Result<Self, NatsPubSubError> {
		tracing::debug!("setting up nats pubsub");

		let mut options = async_nats::ConnectOptions::new()
			.connection_timeout(Duration::from_secs(5))
			.name(name)
			.retry_on_initial_connect();

		if let Some(user) = &config.username {
			options = options.user_and_password(user.clone(), config.password.clone().unwrap_or_default())
		} else if let Some(token) = &config.token {
			options = options.token(token.clone())
		}

		let servers = config
			.servers
			.iter()
			.map(|s| {
				s.parse::<ServerAddr>()
					.map_err(|err| NatsPubSubError::ServerAddr(format!("{s}: {err}")))
			})
			.collect::<Result<Vec<_>, _>>()?;

		Ok(Self::new(options.connect(servers).await?, config.queue_capacity))
	}

	pub fn new(nats: async_nats::Client, queue_capacity: usize) -> Self {
		Self {
			nats,
			queue_capacity: queue_capacity.max(1),
		}
	}
}

impl PubSub for NatsPubSub {
	async fn publish(&self, topic: SubscriptionTopic, payload: Bytes) -> Result<(), PubSubError> {
		self.nats.publish(topic, payload).await.map_err(NatsPubSubError::from)?;
		Ok(())
	}

	async fn subscribe(&self, topic: SubscriptionTopic, callback: Callback) -> Result<Subscription, PubSubError> {
		let mut subscriber = self.nats.subscribe(topic).await.map_err(NatsPubSubError::from)?;

		let handler = Handler::new();
		let ctx = handler.context();
		let (queue, mut rx) = mpsc::channel::<Bytes>(self.queue_capacity);

		tokio::spawn(async move {
			{
				let dispatch = super::local::dispatch(&ctx, &mut rx, &callback);
				tokio::pin!(dispatch);

				// a slow callback must not stall reads from the nats subscriber
				loop {
					tokio::select! {
						biased;
						_ = &mut dispatch => break,
						message = subscriber.next() => match message {
							Some(message) => {
								if queue.try_send(message.payload).is_err() {
									tracing::warn!(%topic, "subscriber queue full, dropping payload");
								}
							}
							None => break,
						},
					}
				}
			}

			if let Err(err) = subscriber.unsubscribe().await {
				tracing::warn!(%topic, error = %err, "failed to unsubscribe from nats");
			}

			drop(callback);
			drop(ctx);
		});

		Ok(Subscription::new(topic, handler))
	}
}
