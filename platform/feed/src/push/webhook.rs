use super::{PushError, PushPayload, PushSender};
use crate::config::WebhookPushConfig;

#[derive(Debug, thiserror::Error)]
pub enum WebhookPushError {
	#[error("reqwest: {0}")]
	Reqwest(#[from] reqwest::Error),
}

#[derive(Debug)]
pub struct WebhookPushSender {
	url: url::Url,
	client: reqwest::Client,
}

impl WebhookPushSender {
	#[tracing::instrument(skip(config), name = "WebhookPushSender::new", fields(url = %config.url), err)]
	pub fn new(config: &WebhookPushConfig) -> Result<Self, WebhookPushError> {
		Ok(Self {
			url: config.url.clone(),
			client: reqwest::Client::builder().timeout(config.timeout).build()?,
		})
	}
}

impl PushSender for WebhookPushSender {
	#[tracing::instrument(skip(self, payload), name = "WebhookPushSender::send", fields(id = %payload.id), err)]
	async fn send(&self, payload: &PushPayload) -> Result<(), PushError> {
		self.client
			.post(self.url.clone())
			.json(payload)
			.send()
			.await
			.map_err(WebhookPushError::from)?
			.error_for_status()
			.map_err(WebhookPushError::from)?;

		Ok(())
	}
}
