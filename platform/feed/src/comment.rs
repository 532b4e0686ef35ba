use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use prost::Message;
use ulid::Ulid;
use utils::context::Context;
use utils::database::Session;

use crate::auth::Viewer;
use crate::cursor::{Page, PageRequest};
use crate::database::{new_id, Comment, Notification, NotificationKind, PostSubscription};
use crate::error::{FeedError, Result};
use crate::global::FeedGlobal;
use crate::live::{self, LiveStream};
use crate::subscription::{PubSub, SubscriptionTopic};
use crate::{fanout, notification, pb, validation};

const COMMENT_AUTHOR_FKEY: &str = "comments_user_id_fkey";

fn missing_comment_reference(err: utils::database::PoolError) -> FeedError {
	if utils::database::violated_constraint(&err) == Some(COMMENT_AUTHOR_FKEY) {
		FeedError::missing_reference(err, FeedError::UserNotFound)
	} else {
		FeedError::missing_reference(err, FeedError::PostNotFound)
	}
}

async fn insert_comment(
	session: Session<'_>,
	author_id: Ulid,
	post_id: Ulid,
	content: String,
	max_mentions: usize,
) -> Result<(Comment, Vec<Notification>)> {
	let comment =
		utils::database::query("INSERT INTO comments (id, post_id, user_id, content) VALUES ($1, $2, $3, $4) RETURNING *")
			.bind(new_id())
			.bind(post_id)
			.bind(author_id)
			.bind(content)
			.build_query_as::<Comment>()
			.fetch_one(session)
			.await
			.map_err(missing_comment_reference)?;

	utils::database::query("UPDATE posts SET comments_count = comments_count + 1 WHERE id = $1")
		.bind(post_id)
		.build()
		.execute(session)
		.await?;

	let mut notifications = notification::notify_comment(session, post_id, author_id).await?;

	utils::database::query("INSERT INTO post_subscriptions (user_id, post_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
		.bind(author_id)
		.bind(post_id)
		.build()
		.execute(session)
		.await?;

	notifications.extend(
		notification::notify_mentions(
			session,
			&comment.content,
			NotificationKind::CommentMention,
			author_id,
			post_id,
			max_mentions,
		)
		.await?,
	);

	Ok((comment, notifications))
}

/// Comments on `post_id` as the viewer.
///
/// The comment, the post's comment counter, the commenter's subscription to
/// the post and the resulting notifications commit together.
#[tracing::instrument(skip(global, content), err)]
pub async fn create_comment<G: FeedGlobal>(
	global: &Arc<G>,
	viewer: &Viewer,
	post_id: Ulid,
	content: &str,
) -> Result<Comment> {
	let author_id = viewer.require()?;
	let config = global.config();
	let content = validation::content("content", content, config.max_comment_length)?;
	let max_mentions = config.max_mentions;

	let (comment, notifications) = global
		.db()
		.run_tx(move |session| insert_comment(session, author_id, post_id, content.clone(), max_mentions).boxed())
		.await?;

	let payload = Bytes::from(comment.to_pb().encode_to_vec());
	let g = global.clone();
	global.outbox().submit("publish_comment", move || {
		let global = g.clone();
		let payload = payload.clone();
		async move { global.pubsub().publish(SubscriptionTopic::PostComments(post_id), payload).await }
	});

	notification::broadcast(global, notifications);

	Ok(comment)
}

/// Comments on a post, newest first.
#[tracing::instrument(skip(global), err)]
pub async fn comments<G: FeedGlobal>(
	global: &Arc<G>,
	post_id: Ulid,
	last: Option<u32>,
	before: Option<&str>,
) -> Result<Page<Comment>> {
	let request = PageRequest::new(&global.config().page, last, before)?;

	let mut qb = utils::database::query("SELECT * FROM comments WHERE post_id = ");
	qb.push_bind(post_id);

	if let Some(cursor) = request.before {
		qb.push(" AND id < ").push_bind(cursor.id);
	}

	qb.push(" ORDER BY id DESC LIMIT ").push_bind(request.fetch_limit());

	let rows = qb.build_query_as::<Comment>().fetch_all(global.db()).await?;

	Ok(request.finish(rows))
}

/// New comments on `post_id` until `ctx` is cancelled.
pub async fn comment_stream<G: FeedGlobal>(
	global: &Arc<G>,
	post_id: Ulid,
	ctx: Context,
) -> Result<LiveStream<pb::Comment>> {
	fanout::post(global, post_id).await?;

	Ok(live::subscribe(
		global.pubsub(),
		SubscriptionTopic::PostComments(post_id),
		ctx,
		global.config().live_channel_capacity,
	)
	.await?)
}

/// Subscribes the viewer to comment notifications for `post_id`. Returns
/// `false` when already subscribed.
#[tracing::instrument(skip(global), err)]
pub async fn subscribe_to_post<G: FeedGlobal>(global: &Arc<G>, viewer: &Viewer, post_id: Ulid) -> Result<bool> {
	let user_id = viewer.require()?;

	let subscription = utils::database::query(
		"INSERT INTO post_subscriptions (user_id, post_id) VALUES ($1, $2) ON CONFLICT DO NOTHING RETURNING *",
	)
	.bind(user_id)
	.bind(post_id)
	.build_query_as::<PostSubscription>()
	.fetch_optional(global.db())
	.await
	.map_err(|err| FeedError::missing_reference(err, FeedError::PostNotFound))?;

	Ok(subscription.is_some())
}

/// Returns `false` when the viewer was not subscribed.
#[tracing::instrument(skip(global), err)]
pub async fn unsubscribe_from_post<G: FeedGlobal>(global: &Arc<G>, viewer: &Viewer, post_id: Ulid) -> Result<bool> {
	let user_id = viewer.require()?;

	let deleted = utils::database::query("DELETE FROM post_subscriptions WHERE user_id = $1 AND post_id = $2")
		.bind(user_id)
		.bind(post_id)
		.build()
		.execute(global.db())
		.await?;

	Ok(deleted > 0)
}
