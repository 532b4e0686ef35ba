use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use prost::Message;
use ulid::Ulid;
use utils::context::Context;
use utils::database::Session;

use crate::auth::Viewer;
use crate::cursor::{Page, PageRequest};
use crate::database::{new_id, Notification, NotificationKind};
use crate::error::{FeedError, Result};
use crate::global::FeedGlobal;
use crate::live::{self, LiveStream};
use crate::pb;
use crate::push::{PushPayload, PushSender};
use crate::subscription::{PubSub, SubscriptionTopic};

/// Inserts a notification, or merges `actor_id` into the recipient's unread
/// notification with the same key.
///
/// The key is `(user_id, kind)` for unscoped kinds and
/// `(user_id, kind, post_id)` otherwise. Merging moves the actor to the front
/// of the actor list and bumps `issued_at`, in a single statement.
async fn upsert(
	session: Session<'_>,
	user_id: Ulid,
	kind: NotificationKind,
	actor_id: Ulid,
	post_id: Option<Ulid>,
) -> Result<Notification> {
	let conflict = if kind.is_post_scoped() {
		"ON CONFLICT (user_id, kind, post_id) WHERE post_id IS NOT NULL AND read_at IS NULL"
	} else {
		"ON CONFLICT (user_id, kind) WHERE post_id IS NULL AND read_at IS NULL"
	};

	let notification = utils::database::query(
		"INSERT INTO notifications (id, user_id, kind, actor_user_ids, post_id, issued_at) VALUES ($1, $2, $3, \
		 ARRAY[$4::UUID], $5, clock_timestamp()) ",
	)
	.push(conflict)
	.push(
		" DO UPDATE SET actor_user_ids = array_prepend($4::UUID, array_remove(notifications.actor_user_ids, $4::UUID)), \
		 issued_at = GREATEST(notifications.issued_at, excluded.issued_at) RETURNING *",
	)
	.bind(new_id())
	.bind(user_id)
	.bind(kind)
	.bind(actor_id)
	.bind(post_id)
	.build_query_as::<Notification>()
	.fetch_one(session)
	.await?;

	Ok(notification)
}

/// Merges `actor_id` into `user_id`'s unread follow notification.
pub(crate) async fn notify_follow(session: Session<'_>, user_id: Ulid, actor_id: Ulid) -> Result<Notification> {
	session
		.run_tx(move |session| upsert(session, user_id, NotificationKind::Follow, actor_id, None).boxed())
		.await
}

/// Notifies every subscriber of `post_id` except the commenter.
pub(crate) async fn notify_comment(session: Session<'_>, post_id: Ulid, actor_id: Ulid) -> Result<Vec<Notification>> {
	session
		.run_tx(move |session| {
			async move {
				let subscribers = utils::database::query(
					"SELECT user_id FROM post_subscriptions WHERE post_id = $1 AND user_id <> $2 ORDER BY user_id",
				)
				.bind(post_id)
				.bind(actor_id)
				.build_query_single_scalar::<Ulid>()
				.fetch_all(session)
				.await?;

				let mut notifications = Vec::with_capacity(subscribers.len());
				for user_id in subscribers {
					notifications.push(upsert(session, user_id, NotificationKind::Comment, actor_id, Some(post_id)).await?);
				}

				Ok::<_, FeedError>(notifications)
			}
			.boxed()
		})
		.await
}

/// Notifies every user mentioned in `content`, except the author.
///
/// Unknown usernames are ignored.
pub(crate) async fn notify_mentions(
	session: Session<'_>,
	content: &str,
	kind: NotificationKind,
	actor_id: Ulid,
	post_id: Ulid,
	limit: usize,
) -> Result<Vec<Notification>> {
	let usernames = crate::mention::parse(content, limit);
	if usernames.is_empty() {
		return Ok(Vec::new());
	}

	session
		.run_tx(move |session| {
			let usernames = usernames.clone();
			async move {
				let recipients =
					utils::database::query("SELECT id FROM users WHERE lower(username) = ANY($1) AND id <> $2 ORDER BY id")
						.bind(usernames)
						.bind(actor_id)
						.build_query_single_scalar::<Ulid>()
						.fetch_all(session)
						.await?;

				let mut notifications = Vec::with_capacity(recipients.len());
				for user_id in recipients {
					notifications.push(upsert(session, user_id, kind, actor_id, Some(post_id)).await?);
				}

				Ok::<_, FeedError>(notifications)
			}
			.boxed()
		})
		.await
}

/// Hands committed notifications to the outbox: one live event per row on
/// the recipient's topic, plus external push when enabled.
pub(crate) fn broadcast<G: FeedGlobal>(global: &Arc<G>, notifications: Vec<Notification>) {
	for notification in notifications {
		let topic = SubscriptionTopic::Notification(notification.user_id);
		let payload = Bytes::from(notification.to_pb().encode_to_vec());

		let g = global.clone();
		global.outbox().submit("publish_notification", move || {
			let global = g.clone();
			let payload = payload.clone();
			async move { global.pubsub().publish(topic, payload).await }
		});

		if global.push().is_enabled() {
			let payload = PushPayload::from(&notification);

			let g = global.clone();
			global.outbox().submit("push_notification", move || {
				let global = g.clone();
				let payload = payload.clone();
				async move { global.push().send(&payload).await }
			});
		}
	}
}

/// The viewer's notifications, most recently issued first.
#[tracing::instrument(skip(global), err)]
pub async fn notifications<G: FeedGlobal>(
	global: &Arc<G>,
	viewer: &Viewer,
	last: Option<u32>,
	before: Option<&str>,
) -> Result<Page<Notification>> {
	let user_id = viewer.require()?;
	let request = PageRequest::new(&global.config().page, last, before)?;

	let mut qb = utils::database::query("SELECT * FROM notifications WHERE user_id = ");
	qb.push_bind(user_id);

	if let Some(cursor) = request.before {
		qb.push(" AND (issued_at, id) < (")
			.push_bind(cursor.timestamp)
			.push(", ")
			.push_bind(cursor.id)
			.push(")");
	}

	qb.push(" ORDER BY issued_at DESC, id DESC LIMIT ")
		.push_bind(request.fetch_limit());

	let rows = qb.build_query_as::<Notification>().fetch_all(global.db()).await?;

	Ok(request.finish(rows))
}

pub async fn unread_count<G: FeedGlobal>(global: &Arc<G>, viewer: &Viewer) -> Result<i64> {
	let user_id = viewer.require()?;

	Ok(
		utils::database::query("SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND read_at IS NULL")
			.bind(user_id)
			.build_query_single_scalar::<i64>()
			.fetch_one(global.db())
			.await?,
	)
}

/// Marks one of the viewer's notifications as read. Marking it again keeps
/// the original `read_at`.
#[tracing::instrument(skip(global), err)]
pub async fn mark_read<G: FeedGlobal>(global: &Arc<G>, viewer: &Viewer, notification_id: Ulid) -> Result<Notification> {
	let user_id = viewer.require()?;

	utils::database::query(
		"UPDATE notifications SET read_at = COALESCE(read_at, NOW()) WHERE id = $1 AND user_id = $2 RETURNING *",
	)
	.bind(notification_id)
	.bind(user_id)
	.build_query_as::<Notification>()
	.fetch_optional(global.db())
	.await?
	.ok_or(FeedError::NotificationNotFound)
}

/// Returns how many notifications changed.
#[tracing::instrument(skip(global), err)]
pub async fn mark_all_read<G: FeedGlobal>(global: &Arc<G>, viewer: &Viewer) -> Result<u64> {
	let user_id = viewer.require()?;

	Ok(
		utils::database::query("UPDATE notifications SET read_at = NOW() WHERE user_id = $1 AND read_at IS NULL")
			.bind(user_id)
			.build()
			.execute(global.db())
			.await?,
	)
}

/// New and merged notifications for the viewer until `ctx` is cancelled.
pub async fn notification_stream<G: FeedGlobal>(
	global: &Arc<G>,
	viewer: &Viewer,
	ctx: Context,
) -> Result<LiveStream<pb::Notification>> {
	let user_id = viewer.require()?;

	Ok(live::subscribe(
		global.pubsub(),
		SubscriptionTopic::Notification(user_id),
		ctx,
		global.config().live_channel_capacity,
	)
	.await?)
}
