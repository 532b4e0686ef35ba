use serial_test::serial;

use super::global::{create_users, mock_global_state, test_config};
use crate::global::FeedGlobal;
use crate::migration::{revert_migrations, run_migrations};

async fn schema_version(global: &impl FeedGlobal) -> i32 {
	utils::database::query("SELECT version FROM feed_migrations")
		.build_query_single_scalar::<i32>()
		.fetch_one(global.db())
		.await
		.unwrap()
}

async fn table_exists(global: &impl FeedGlobal, table: &str) -> bool {
	utils::database::query(
		"SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_schema = 'public' AND table_name::TEXT = $1)",
	)
	.bind(table.to_string())
	.build_query_single_scalar::<bool>()
	.fetch_one(global.db())
	.await
	.unwrap()
}

#[serial]
#[tokio::test]
async fn test_serial_migrations_revert_and_reapply() {
	let (global, _handler) = mock_global_state(test_config()).await;

	assert_eq!(schema_version(&*global).await, 1);
	create_users(&global, &["before"]).await;

	revert_migrations(&global, 0).await.unwrap();
	assert_eq!(schema_version(&*global).await, 0);
	for table in ["users", "posts", "timeline", "notifications"] {
		assert!(!table_exists(&*global, table).await, "{table} survived the revert");
	}

	// reverting past the bottom is a no-op
	revert_migrations(&global, 0).await.unwrap();

	run_migrations(&global).await.unwrap();
	assert_eq!(schema_version(&*global).await, 1);
	assert!(table_exists(&*global, "notifications").await);

	let users = create_users(&global, &["before"]).await;
	assert_eq!(users[0].followers_count, 0);
}
