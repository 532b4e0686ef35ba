use chrono::{DateTime, Utc};
use ulid::Ulid;

use self::webhook::{WebhookPushError, WebhookPushSender};
use crate::config::PushConfig;
use crate::database::{Notification, NotificationKind};

pub mod webhook;

#[derive(Debug, thiserror::Error)]
pub enum PushError {
	#[error("webhook: {0}")]
	Webhook(#[from] WebhookPushError),
}

/// What an external push provider receives for one notification row.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PushPayload {
	pub id: Ulid,
	pub user_id: Ulid,
	pub kind: NotificationKind,
	pub actor_user_ids: Vec<Ulid>,
	pub post_id: Option<Ulid>,
	pub issued_at: DateTime<Utc>,
}

impl From<&Notification> for PushPayload {
	fn from(notification: &Notification) -> Self {
		Self {
			id: notification.id,
			user_id: notification.user_id,
			kind: notification.kind,
			actor_user_ids: notification.actor_user_ids.clone(),
			post_id: notification.post_id,
			issued_at: notification.issued_at,
		}
	}
}

pub trait PushSender {
	fn send(&self, payload: &PushPayload) -> impl std::future::Future<Output = Result<(), PushError>> + Send;
}

#[derive(Debug)]
pub enum AnyPushSender {
	Disabled,
	Webhook(WebhookPushSender),
}

impl AnyPushSender {
	pub fn is_enabled(&self) -> bool {
		!matches!(self, Self::Disabled)
	}
}

impl PushSender for AnyPushSender {
	async fn send(&self, payload: &PushPayload) -> Result<(), PushError> {
		match self {
			Self::Disabled => Ok(()),
			Self::Webhook(sender) => sender.send(payload).await,
		}
	}
}

pub fn build_push_sender(config: &PushConfig) -> Result<AnyPushSender, PushError> {
	match config {
		PushConfig::Disabled => Ok(AnyPushSender::Disabled),
		PushConfig::Webhook(webhook) => Ok(AnyPushSender::Webhook(WebhookPushSender::new(webhook)?)),
	}
}
