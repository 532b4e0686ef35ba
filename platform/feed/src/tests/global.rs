use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ulid::Ulid;
use utils::context::{Context, Handler};

use crate::auth::Viewer;
use crate::config::{AppConfig, DatabaseConfig, OutboxConfig, RetryConfig};
use crate::database::User;
use crate::global::{setup_database, GlobalState};
use crate::push::AnyPushSender;
use crate::subscription::local::LocalPubSub;
use crate::subscription::AnyPubSub;

pub fn test_config() -> AppConfig {
	AppConfig {
		outbox: OutboxConfig {
			max_attempts: 3,
			base_backoff: Duration::from_millis(5),
			max_backoff: Duration::from_millis(20),
		},
		..Default::default()
	}
}

pub async fn mock_global_state(config: AppConfig) -> (Arc<GlobalState>, Handler) {
	dotenvy::dotenv().ok();

	let logging_level = std::env::var("LOGGING_LEVEL").unwrap_or_else(|_| "info".to_string());
	crate::logging::init(&logging_level, Default::default()).expect("failed to initialize logging");

	let database_uri = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

	let db = setup_database(&DatabaseConfig {
		uri: database_uri,
		max_connections: 16,
		// concurrent tests contend on single rows on purpose
		retry: RetryConfig {
			max_attempts: 50,
			base_backoff: Duration::from_millis(2),
			max_backoff: Duration::from_millis(50),
		},
	})
	.await
	.expect("failed to connect to database");

	for statement in ["DROP SCHEMA IF EXISTS public CASCADE", "CREATE SCHEMA public"] {
		utils::database::query(statement)
			.build()
			.execute(&db)
			.await
			.expect("failed to reset database");
	}

	let (ctx, handler) = Context::new();
	let global = Arc::new(GlobalState::from_parts(
		ctx,
		config,
		db,
		AnyPubSub::Local(LocalPubSub::new(64)),
		AnyPushSender::Disabled,
	));

	crate::migration::run_migrations(&global)
		.await
		.expect("failed to run migrations");

	(global, handler)
}

pub async fn create_users(global: &Arc<GlobalState>, usernames: &[&str]) -> Vec<User> {
	let mut users = Vec::with_capacity(usernames.len());
	for username in usernames {
		users.push(
			crate::users::create_user(global, username)
				.await
				.expect("failed to create user"),
		);
	}

	users
}

pub fn viewer(user: &User) -> Viewer {
	Viewer::user(user.id)
}

pub async fn timeline_row_count(global: &Arc<GlobalState>, post_id: Ulid) -> i64 {
	use crate::global::FeedGlobal;

	utils::database::query("SELECT COUNT(*) FROM timeline WHERE post_id = $1")
		.bind(post_id)
		.build_query_single_scalar::<i64>()
		.fetch_one(global.db())
		.await
		.unwrap()
}

/// Polls `f` until it yields a value, failing the test after five seconds.
pub async fn eventually<T, F, Fut>(mut f: F) -> T
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Option<T>>,
{
	tokio::time::timeout(Duration::from_secs(5), async {
		loop {
			if let Some(value) = f().await {
				return value;
			}

			tokio::time::sleep(Duration::from_millis(20)).await;
		}
	})
	.await
	.expect("condition was not met in time")
}
