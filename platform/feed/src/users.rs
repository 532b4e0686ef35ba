use std::sync::Arc;

use ulid::Ulid;

use crate::database::{new_id, User};
use crate::error::{FeedError, Result};
use crate::global::FeedGlobal;
use crate::validation;

/// Registers a user. Usernames are unique regardless of case.
#[tracing::instrument(skip(global), err)]
pub async fn create_user<G: FeedGlobal>(global: &Arc<G>, username: &str) -> Result<User> {
	validation::username(username)?;

	utils::database::query("INSERT INTO users (id, username) VALUES ($1, $2) RETURNING *")
		.bind(new_id())
		.bind(username.to_string())
		.build_query_as::<User>()
		.fetch_one(global.db())
		.await
		.map_err(|err| {
			if utils::database::is_unique_violation(&err) {
				FeedError::InvalidInput {
					field: "username",
					message: "is already taken",
				}
			} else {
				FeedError::Database(err)
			}
		})
}

pub async fn user<G: FeedGlobal>(global: &Arc<G>, user_id: Ulid) -> Result<User> {
	utils::database::query("SELECT * FROM users WHERE id = $1")
		.bind(user_id)
		.build_query_as::<User>()
		.fetch_optional(global.db())
		.await?
		.ok_or(FeedError::UserNotFound)
}

pub async fn user_by_username<G: FeedGlobal>(global: &Arc<G>, username: &str) -> Result<User> {
	utils::database::query("SELECT * FROM users WHERE lower(username) = lower($1)")
		.bind(username.to_string())
		.build_query_as::<User>()
		.fetch_optional(global.db())
		.await?
		.ok_or(FeedError::UserNotFound)
}
