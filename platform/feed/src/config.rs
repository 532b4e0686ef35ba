use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use utils::database::RetryPolicy;

use crate::logging;

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
	/// The name of the instance, also used as the NATS connection name
	pub name: String,
	/// The logging configuration
	pub logging: LoggingConfig,
	/// The database configuration
	pub database: DatabaseConfig,
	/// The publish/subscribe backend used for live delivery
	pub pubsub: PubSubConfig,
	/// Limits and tuning for the feed engine
	pub feed: FeedConfig,
	/// Retry behaviour for after-commit background work
	pub outbox: OutboxConfig,
	/// External push notification delivery
	pub push: PushConfig,
}

impl Default for AppConfig {
	fn default() -> Self {
		Self {
			name: "platform-feed".to_string(),
			logging: LoggingConfig::default(),
			database: DatabaseConfig::default(),
			pubsub: PubSubConfig::default(),
			feed: FeedConfig::default(),
			outbox: OutboxConfig::default(),
			push: PushConfig::default(),
		}
	}
}

impl AppConfig {
	/// Reads a YAML config file. Missing keys fall back to their defaults.
	pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
		let path = path.as_ref();
		let contents = std::fs::read_to_string(path).with_context(|| format!("failed to read config {}", path.display()))?;

		Self::from_yaml(&contents).with_context(|| format!("failed to parse config {}", path.display()))
	}

	pub fn from_yaml(contents: &str) -> anyhow::Result<Self> {
		Ok(serde_yaml::from_str(contents)?)
	}
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
	/// The log level to use, this is a tracing env filter
	pub level: String,
	/// What logging mode we should use
	pub mode: logging::Mode,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self {
			level: "info".to_string(),
			mode: logging::Mode::Default,
		}
	}
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
	/// The database URL to use
	pub uri: String,
	/// Maximum number of pooled connections
	pub max_connections: usize,
	/// Serialization-conflict retry policy for transactions
	pub retry: RetryConfig,
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		Self {
			uri: "postgres://localhost:5432".to_string(),
			max_connections: 32,
			retry: RetryConfig::default(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct RetryConfig {
	pub max_attempts: u32,
	#[serde(with = "humantime_serde")]
	pub base_backoff: Duration,
	#[serde(with = "humantime_serde")]
	pub max_backoff: Duration,
}

impl Default for RetryConfig {
	fn default() -> Self {
		let policy = RetryPolicy::default();

		Self {
			max_attempts: policy.max_attempts,
			base_backoff: policy.base_backoff,
			max_backoff: policy.max_backoff,
		}
	}
}

impl From<RetryConfig> for RetryPolicy {
	fn from(config: RetryConfig) -> Self {
		Self {
			max_attempts: config.max_attempts.max(1),
			base_backoff: config.base_backoff,
			max_backoff: config.max_backoff,
		}
	}
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PubSubConfig {
	/// In-process registry, for single-instance deployments
	Local(LocalPubSubConfig),
	/// NATS core subjects, for deployments with several instances
	Nats(NatsConfig),
}

impl Default for PubSubConfig {
	fn default() -> Self {
		Self::Local(LocalPubSubConfig::default())
	}
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct LocalPubSubConfig {
	/// Per-subscriber queue depth; payloads beyond it are dropped
	pub queue_capacity: usize,
}

impl Default for LocalPubSubConfig {
	fn default() -> Self {
		Self { queue_capacity: 64 }
	}
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct NatsConfig {
	/// The URI to use for connecting to Nats
	pub servers: Vec<String>,
	/// The username to use for authentication (user-pass auth)
	pub username: Option<String>,
	/// The password to use for authentication (user-pass auth)
	pub password: Option<String>,
	/// The token to use for authentication (token auth)
	pub token: Option<String>,
	/// Per-subscriber queue depth; payloads beyond it are dropped
	pub queue_capacity: usize,
}

impl Default for NatsConfig {
	fn default() -> Self {
		Self {
			servers: vec!["localhost:4222".into()],
			username: None,
			password: None,
			token: None,
			queue_capacity: 64,
		}
	}
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct FeedConfig {
	/// Maximum post length in code points
	pub max_post_length: usize,
	/// Maximum comment length in code points
	pub max_comment_length: usize,
	/// Distinct @mentions resolved per post or comment
	pub max_mentions: usize,
	/// Page size bounds for paginated reads
	pub page: PageConfig,
	/// Followers processed per fan-out insert
	pub fanout_batch_size: usize,
	/// Depth of the channel handed to live stream consumers
	pub live_channel_capacity: usize,
}

impl Default for FeedConfig {
	fn default() -> Self {
		Self {
			max_post_length: 500,
			max_comment_length: 500,
			max_mentions: 10,
			page: PageConfig::default(),
			fanout_batch_size: 500,
			live_channel_capacity: 1,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct PageConfig {
	pub default: u32,
	pub min: u32,
	pub max: u32,
}

impl Default for PageConfig {
	fn default() -> Self {
		Self {
			default: 20,
			min: 1,
			max: 100,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
	/// Attempts per job before it is dropped
	pub max_attempts: u32,
	#[serde(with = "humantime_serde")]
	pub base_backoff: Duration,
	#[serde(with = "humantime_serde")]
	pub max_backoff: Duration,
}

impl Default for OutboxConfig {
	fn default() -> Self {
		Self {
			max_attempts: 5,
			base_backoff: Duration::from_millis(250),
			max_backoff: Duration::from_secs(10),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Default, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PushConfig {
	#[default]
	Disabled,
	Webhook(WebhookPushConfig),
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct WebhookPushConfig {
	/// Endpoint receiving one JSON POST per notification
	pub url: url::Url,
	/// Request timeout
	#[serde(default = "default_push_timeout", with = "humantime_serde")]
	pub timeout: Duration,
}

fn default_push_timeout() -> Duration {
	Duration::from_secs(5)
}
