use futures::FutureExt;
use serial_test::serial;
use ulid::Ulid;
use utils::database::Session;

use super::global::{mock_global_state, test_config};
use crate::database::{new_id, User};
use crate::error::{FeedError, Result};
use crate::global::FeedGlobal;

async fn insert_user(session: Session<'_>, username: &'static str) -> Result<User> {
	Ok(
		utils::database::query("INSERT INTO users (id, username) VALUES ($1, $2) RETURNING *")
			.bind(new_id())
			.bind(username)
			.build_query_as::<User>()
			.fetch_one(session)
			.await?,
	)
}

async fn user_exists(global: &impl FeedGlobal, username: &str) -> bool {
	utils::database::query("SELECT COUNT(*) FROM users WHERE username = $1")
		.bind(username.to_string())
		.build_query_single_scalar::<i64>()
		.fetch_one(global.db())
		.await
		.unwrap()
		== 1
}

#[serial]
#[tokio::test]
async fn test_serial_nested_unit_of_work_joins_the_outer_one() {
	let (global, _handler) = mock_global_state(test_config()).await;

	let result = global
		.db()
		.run_tx(|session| {
			async move {
				assert!(session.in_transaction());
				insert_user(session, "outer").await?;

				session
					.run_tx(|nested| {
						async move {
							assert!(nested.in_transaction());
							insert_user(nested, "inner").await
						}
						.boxed()
					})
					.await?;

				Err::<(), _>(FeedError::PostNotFound)
			}
			.boxed()
		})
		.await;

	assert!(matches!(result, Err(FeedError::PostNotFound)));
	assert!(!user_exists(&*global, "outer").await);
	assert!(!user_exists(&*global, "inner").await);

	global
		.db()
		.run_tx(|session| {
			async move {
				insert_user(session, "outer").await?;
				session.run_tx(|nested| insert_user(nested, "inner").boxed()).await?;
				Ok::<_, FeedError>(())
			}
			.boxed()
		})
		.await
		.unwrap();

	assert!(user_exists(&*global, "outer").await);
	assert!(user_exists(&*global, "inner").await);
}

#[serial]
#[tokio::test]
async fn test_serial_root_session_starts_a_transaction() {
	let (global, _handler) = mock_global_state(test_config()).await;

	let root = global.db().session();
	assert!(!root.in_transaction());

	let result = root
		.run_tx(|session| {
			async move {
				assert!(session.in_transaction());
				insert_user(session, "rolled_back").await?;
				Err::<(), _>(FeedError::UserNotFound)
			}
			.boxed()
		})
		.await;

	assert!(matches!(result, Err(FeedError::UserNotFound)));
	assert!(!user_exists(&*global, "rolled_back").await);
}

#[serial]
#[tokio::test]
async fn test_serial_conflicting_read_modify_write_is_retried() {
	let (global, _handler) = mock_global_state(test_config()).await;

	let user = global
		.db()
		.run_tx(|session| insert_user(session, "counter").boxed())
		.await
		.unwrap();

	let increment = |user_id: Ulid| {
		global.db().run_tx(move |session| {
			async move {
				let current = utils::database::query("SELECT followers_count FROM users WHERE id = $1")
					.bind(user_id)
					.build_query_single_scalar::<i64>()
					.fetch_one(session)
					.await?;

				utils::database::query("UPDATE users SET followers_count = $2 WHERE id = $1")
					.bind(user_id)
					.bind(current + 1)
					.build()
					.execute(session)
					.await?;

				Ok::<_, FeedError>(())
			}
			.boxed()
		})
	};

	let results = futures::future::join_all((0..8).map(|_| increment(user.id))).await;
	assert!(results.iter().all(|result| result.is_ok()));

	let user = crate::users::user(&global, user.id).await.unwrap();
	assert_eq!(user.followers_count, 8);
}
