use anyhow::Context as _;
use utils::context::Context;
use utils::database::deadpool_postgres::{ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use utils::database::tokio_postgres::NoTls;
use utils::database::Database;

use crate::config::{AppConfig, DatabaseConfig, FeedConfig};
use crate::outbox::Outbox;
use crate::push::{build_push_sender, AnyPushSender};
use crate::subscription::{build_pubsub, AnyPubSub};

/// Everything an operation needs from the running process.
pub trait FeedGlobal: Send + Sync + 'static {
	fn config(&self) -> &FeedConfig;
	fn db(&self) -> &Database;
	fn pubsub(&self) -> &AnyPubSub;
	fn outbox(&self) -> &Outbox;
	fn push(&self) -> &AnyPushSender;
}

pub struct GlobalState {
	config: AppConfig,
	db: Database,
	pubsub: AnyPubSub,
	outbox: Outbox,
	push: AnyPushSender,
}

impl GlobalState {
	/// Builds the process-wide state. The pub/sub backend is created here
	/// once and lives as long as the returned value.
	pub async fn new(ctx: Context, config: AppConfig) -> anyhow::Result<Self> {
		tracing::debug!("setting up database pool");
		let db = setup_database(&config.database).await?;

		tracing::debug!("setting up pubsub");
		let pubsub = build_pubsub(&config.name, &config.pubsub).await.context("pubsub")?;

		let push = build_push_sender(&config.push).context("push")?;
		if !push.is_enabled() {
			tracing::info!("push delivery disabled");
		}

		Ok(Self::from_parts(ctx, config, db, pubsub, push))
	}

	pub fn from_parts(ctx: Context, config: AppConfig, db: Database, pubsub: AnyPubSub, push: AnyPushSender) -> Self {
		let outbox = Outbox::new(ctx.clone(), &config.outbox);

		Self {
			config,
			db,
			pubsub,
			outbox,
			push,
		}
	}
}

impl FeedGlobal for GlobalState {
	fn config(&self) -> &FeedConfig {
		&self.config.feed
	}

	fn db(&self) -> &Database {
		&self.db
	}

	fn pubsub(&self) -> &AnyPubSub {
		&self.pubsub
	}

	fn outbox(&self) -> &Outbox {
		&self.outbox
	}

	fn push(&self) -> &AnyPushSender {
		&self.push
	}
}

pub async fn setup_database(config: &DatabaseConfig) -> anyhow::Result<Database> {
	let pg_config = config
		.uri
		.parse::<utils::database::tokio_postgres::Config>()
		.context("invalid database uri")?;

	let manager = utils::database::deadpool_postgres::Manager::from_config(
		pg_config,
		NoTls,
		ManagerConfig {
			recycling_method: RecyclingMethod::Fast,
		},
	);

	let pool = Pool::builder(manager)
		.config(PoolConfig::new(config.max_connections.max(1)))
		.runtime(Runtime::Tokio1)
		.build()
		.context("failed to create database pool")?;

	Ok(Database::new(pool, config.retry.into()))
}
