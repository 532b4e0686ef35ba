use chrono::{DateTime, Utc};
use ulid::Ulid;

use crate::cursor::{Cursor, Paginated};
use crate::pb;

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, postgres_types::ToSql, postgres_types::FromSql, serde::Serialize,
)]
#[postgres(name = "notification_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
	/// Someone followed the recipient; not scoped to a post
	Follow,
	/// Someone commented on a post the recipient is subscribed to
	Comment,
	PostMention,
	CommentMention,
}

impl NotificationKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Follow => "follow",
			Self::Comment => "comment",
			Self::PostMention => "post_mention",
			Self::CommentMention => "comment_mention",
		}
	}

	/// Whether rows of this kind carry a post id.
	pub fn is_post_scoped(&self) -> bool {
		!matches!(self, Self::Follow)
	}
}

impl std::fmt::Display for NotificationKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, PartialEq, postgres_from_row::FromRow)]
pub struct Notification {
	pub id: Ulid,
	/// The recipient
	pub user_id: Ulid,
	pub kind: NotificationKind,
	/// Distinct actors, most recent first
	pub actor_user_ids: Vec<Ulid>,
	pub post_id: Option<Ulid>,
	/// `None` while unread. Only unread rows absorb new actors.
	pub read_at: Option<DateTime<Utc>>,
	/// Bumped every time an actor is merged in
	pub issued_at: DateTime<Utc>,
}

impl Notification {
	pub fn is_read(&self) -> bool {
		self.read_at.is_some()
	}

	pub fn to_pb(&self) -> pb::Notification {
		pb::Notification {
			id: Some(self.id.into()),
			user_id: Some(self.user_id.into()),
			kind: self.kind.to_string(),
			actor_ids: self.actor_user_ids.iter().map(|id| (*id).into()).collect(),
			post_id: self.post_id.map(Into::into),
			read_at: self.read_at.map(|read_at| read_at.timestamp_micros()),
			issued_at: self.issued_at.timestamp_micros(),
		}
	}
}

impl Paginated for Notification {
	fn cursor(&self) -> Cursor {
		Cursor::new(self.id, self.issued_at)
	}
}
