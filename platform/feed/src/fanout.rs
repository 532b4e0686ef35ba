use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use prost::Message;
use ulid::Ulid;
use utils::context::Context;
use utils::database::{ClientLike, PoolError, Session};

use crate::auth::Viewer;
use crate::cursor::{Page, PageRequest};
use crate::database::{new_id, Notification, NotificationKind, Post, TimelineEntry, TimelineItem};
use crate::error::{FeedError, Result};
use crate::global::FeedGlobal;
use crate::live::{self, LiveStream};
use crate::subscription::{PubSub, SubscriptionTopic};
use crate::{notification, pb, validation};

/// Places `post_id` in every listed user's timeline. Users who already have
/// it are skipped; only the newly created entries are returned.
pub(crate) async fn insert_timeline_entries(
	conn: impl ClientLike,
	post_id: Ulid,
	user_ids: &[Ulid],
) -> Result<Vec<TimelineEntry>, PoolError> {
	if user_ids.is_empty() {
		return Ok(Vec::new());
	}

	let mut qb = utils::database::query("INSERT INTO timeline (id, user_id, post_id) ");
	qb.push_values(user_ids, |mut sep, user_id| {
		sep.push_bind(new_id());
		sep.push_bind(*user_id);
		sep.push_bind(post_id);
	});
	qb.push(" ON CONFLICT (user_id, post_id) DO NOTHING RETURNING *");

	qb.build_query_as::<TimelineEntry>().fetch_all(conn).await
}

struct CreatedPost {
	post: Post,
	entry: TimelineEntry,
	notifications: Vec<Notification>,
}

async fn insert_post(session: Session<'_>, author_id: Ulid, content: String, max_mentions: usize) -> Result<CreatedPost> {
	let post = utils::database::query("INSERT INTO posts (id, user_id, content) VALUES ($1, $2, $3) RETURNING *")
		.bind(new_id())
		.bind(author_id)
		.bind(content)
		.build_query_as::<Post>()
		.fetch_one(session)
		.await
		.map_err(|err| FeedError::missing_reference(err, FeedError::UserNotFound))?;

	let entry = insert_timeline_entries(session, post.id, &[author_id])
		.await?
		.into_iter()
		.next()
		.ok_or(FeedError::TimelineEntryNotFound)?;

	utils::database::query("INSERT INTO post_subscriptions (user_id, post_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
		.bind(author_id)
		.bind(post.id)
		.build()
		.execute(session)
		.await?;

	let notifications = notification::notify_mentions(
		session,
		&post.content,
		NotificationKind::PostMention,
		author_id,
		post.id,
		max_mentions,
	)
	.await?;

	Ok(CreatedPost {
		post,
		entry,
		notifications,
	})
}

/// Publishes `post` as authored by the viewer.
///
/// The post, the author's own timeline entry and any mention notifications
/// commit together. Followers receive the post afterwards through the
/// outbox, so a failed fan-out never undoes the post.
#[tracing::instrument(skip(global, content), err)]
pub async fn create_post<G: FeedGlobal>(global: &Arc<G>, viewer: &Viewer, content: &str) -> Result<Post> {
	let author_id = viewer.require()?;
	let config = global.config();
	let content = validation::content("content", content, config.max_post_length)?;
	let max_mentions = config.max_mentions;

	let CreatedPost {
		post,
		entry,
		notifications,
	} = global
		.db()
		.run_tx(move |session| insert_post(session, author_id, content.clone(), max_mentions).boxed())
		.await?;

	let payload = Bytes::from(entry.to_pb(&post).encode_to_vec());
	let g = global.clone();
	global.outbox().submit("publish_timeline_entry", move || {
		let global = g.clone();
		let payload = payload.clone();
		async move { global.pubsub().publish(SubscriptionTopic::Timeline(author_id), payload).await }
	});

	let g = global.clone();
	let fanout_post = post.clone();
	global.outbox().submit("fanout", move || {
		let global = g.clone();
		let post = fanout_post.clone();
		async move { fanout(&global, &post).await.map(|_| ()) }
	});

	notification::broadcast(global, notifications);

	Ok(post)
}

/// Copies `post` into the timeline of every follower of its author, in
/// batches keyed by follower id, publishing each new entry.
///
/// Returns the entries this run created. Safe to re-run: entries that
/// already exist are neither duplicated nor published again.
#[tracing::instrument(skip(global, post), fields(post_id = %post.id), err)]
pub async fn fanout<G: FeedGlobal>(global: &Arc<G>, post: &Post) -> Result<Vec<TimelineEntry>> {
	let batch_size = global.config().fanout_batch_size.max(1);
	let mut after = None;
	let mut delivered = Vec::new();

	loop {
		let mut qb = utils::database::query("SELECT follower_id FROM follows WHERE followee_id = ");
		qb.push_bind(post.user_id);
		if let Some(after) = after {
			qb.push(" AND follower_id > ").push_bind(after);
		}
		qb.push(" ORDER BY follower_id LIMIT ").push_bind(batch_size as i64);

		let followers = qb.build_query_single_scalar::<Ulid>().fetch_all(global.db()).await?;
		let Some(last) = followers.last().copied() else {
			break;
		};

		let entries = insert_timeline_entries(global.db(), post.id, &followers).await?;
		for entry in &entries {
			let payload = Bytes::from(entry.to_pb(post).encode_to_vec());
			if let Err(err) = global.pubsub().publish(SubscriptionTopic::Timeline(entry.user_id), payload).await {
				tracing::warn!(user_id = %entry.user_id, error = %err, "failed to publish timeline entry");
			}
		}

		delivered.extend(entries);

		if followers.len() < batch_size {
			break;
		}

		after = Some(last);
	}

	tracing::debug!(delivered = delivered.len(), "fan-out finished");

	Ok(delivered)
}

pub async fn post<G: FeedGlobal>(global: &Arc<G>, post_id: Ulid) -> Result<Post> {
	utils::database::query("SELECT * FROM posts WHERE id = $1")
		.bind(post_id)
		.build_query_as::<Post>()
		.fetch_optional(global.db())
		.await?
		.ok_or(FeedError::PostNotFound)
}

/// The viewer's timeline, newest entry first.
#[tracing::instrument(skip(global), err)]
pub async fn timeline<G: FeedGlobal>(
	global: &Arc<G>,
	viewer: &Viewer,
	last: Option<u32>,
	before: Option<&str>,
) -> Result<Page<TimelineItem>> {
	let user_id = viewer.require()?;
	let request = PageRequest::new(&global.config().page, last, before)?;

	let mut qb = utils::database::query(
		"SELECT t.id, t.user_id, t.created_at, p.id AS post_id, p.user_id AS post_user_id, p.content AS post_content, \
		 p.comments_count AS post_comments_count, p.created_at AS post_created_at, p.updated_at AS post_updated_at \
		 FROM timeline t INNER JOIN posts p ON p.id = t.post_id WHERE t.user_id = ",
	);
	qb.push_bind(user_id);

	if let Some(cursor) = request.before {
		qb.push(" AND t.id < ").push_bind(cursor.id);
	}

	qb.push(" ORDER BY t.id DESC LIMIT ").push_bind(request.fetch_limit());

	let rows = qb.build_query_as::<TimelineItem>().fetch_all(global.db()).await?;

	Ok(request.finish(rows))
}

/// Removes one entry from the viewer's own timeline. The post itself stays.
#[tracing::instrument(skip(global), err)]
pub async fn remove_timeline_entry<G: FeedGlobal>(global: &Arc<G>, viewer: &Viewer, entry_id: Ulid) -> Result<()> {
	let user_id = viewer.require()?;

	let deleted = utils::database::query("DELETE FROM timeline WHERE id = $1 AND user_id = $2")
		.bind(entry_id)
		.bind(user_id)
		.build()
		.execute(global.db())
		.await?;

	if deleted == 0 {
		return Err(FeedError::TimelineEntryNotFound);
	}

	Ok(())
}

/// New timeline entries for the viewer until `ctx` is cancelled.
pub async fn timeline_stream<G: FeedGlobal>(
	global: &Arc<G>,
	viewer: &Viewer,
	ctx: Context,
) -> Result<LiveStream<pb::TimelineItem>> {
	let user_id = viewer.require()?;

	Ok(live::subscribe(
		global.pubsub(),
		SubscriptionTopic::Timeline(user_id),
		ctx,
		global.config().live_channel_capacity,
	)
	.await?)
}
