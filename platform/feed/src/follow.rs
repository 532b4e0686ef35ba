use std::sync::Arc;

use futures::FutureExt;
use ulid::Ulid;
use utils::database::Session;

use crate::auth::Viewer;
use crate::database::{Follow, Notification};
use crate::error::{FeedError, Result};
use crate::global::FeedGlobal;
use crate::notification;

fn check_not_self(follower_id: Ulid, followee_id: Ulid) -> Result<()> {
	if follower_id == followee_id {
		return Err(FeedError::InvalidInput {
			field: "user_id",
			message: "cannot follow yourself",
		});
	}

	Ok(())
}

async fn adjust_counters(session: Session<'_>, follower_id: Ulid, followee_id: Ulid, delta: i64) -> Result<()> {
	utils::database::query("UPDATE users SET following_count = following_count + $2 WHERE id = $1")
		.bind(follower_id)
		.bind(delta)
		.build()
		.execute(session)
		.await?;

	utils::database::query("UPDATE users SET followers_count = followers_count + $2 WHERE id = $1")
		.bind(followee_id)
		.bind(delta)
		.build()
		.execute(session)
		.await?;

	Ok(())
}

async fn insert_follow(session: Session<'_>, follower_id: Ulid, followee_id: Ulid) -> Result<Option<Notification>> {
	let follow = utils::database::query(
		"INSERT INTO follows (follower_id, followee_id) VALUES ($1, $2) ON CONFLICT (follower_id, followee_id) DO NOTHING RETURNING *",
	)
	.bind(follower_id)
	.bind(followee_id)
	.build_query_as::<Follow>()
	.fetch_optional(session)
	.await
	.map_err(|err| FeedError::missing_reference(err, FeedError::UserNotFound))?;

	let Some(follow) = follow else {
		return Ok(None);
	};

	adjust_counters(session, follow.follower_id, follow.followee_id, 1).await?;
	let notification = notification::notify_follow(session, follow.followee_id, follow.follower_id).await?;

	Ok(Some(notification))
}

async fn delete_follow(session: Session<'_>, follower_id: Ulid, followee_id: Ulid) -> Result<bool> {
	let deleted = utils::database::query("DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2 RETURNING *")
		.bind(follower_id)
		.bind(followee_id)
		.build_query_as::<Follow>()
		.fetch_optional(session)
		.await?;

	let Some(follow) = deleted else {
		return Ok(false);
	};

	adjust_counters(session, follow.follower_id, follow.followee_id, -1).await?;

	Ok(true)
}

/// Makes the viewer follow `followee_id`.
///
/// Returns `false` when the edge already existed, in which case nothing
/// changes and no notification is sent.
#[tracing::instrument(skip(global), err)]
pub async fn follow_user<G: FeedGlobal>(global: &Arc<G>, viewer: &Viewer, followee_id: Ulid) -> Result<bool> {
	let follower_id = viewer.require()?;
	check_not_self(follower_id, followee_id)?;

	let notification = global
		.db()
		.run_tx(move |session| insert_follow(session, follower_id, followee_id).boxed())
		.await?;

	match notification {
		Some(notification) => {
			notification::broadcast(global, vec![notification]);
			Ok(true)
		}
		None => Ok(false),
	}
}

/// Returns `false` when the viewer was not following `followee_id`.
#[tracing::instrument(skip(global), err)]
pub async fn unfollow_user<G: FeedGlobal>(global: &Arc<G>, viewer: &Viewer, followee_id: Ulid) -> Result<bool> {
	let follower_id = viewer.require()?;
	check_not_self(follower_id, followee_id)?;

	global
		.db()
		.run_tx(move |session| delete_follow(session, follower_id, followee_id).boxed())
		.await
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn self_follow_is_rejected() {
		let id = Ulid::new();
		assert!(matches!(check_not_self(id, id), Err(FeedError::InvalidInput { .. })));
		assert!(check_not_self(id, Ulid::new()).is_ok());
	}
}
