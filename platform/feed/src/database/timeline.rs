use chrono::{DateTime, Utc};
use ulid::Ulid;

use super::Post;
use crate::cursor::{Cursor, Paginated};
use crate::pb;

/// One post placed in one user's feed.
#[derive(Debug, Clone, PartialEq, postgres_from_row::FromRow)]
pub struct TimelineEntry {
	pub id: Ulid,
	/// The owner of the feed
	pub user_id: Ulid,
	pub post_id: Ulid,
	pub created_at: DateTime<Utc>,
}

impl TimelineEntry {
	pub fn to_pb(&self, post: &Post) -> pb::TimelineItem {
		pb::TimelineItem {
			id: Some(self.id.into()),
			user_id: Some(self.user_id.into()),
			post: Some(post.to_pb()),
		}
	}
}

/// A timeline entry joined with its post, as returned by timeline reads.
#[derive(Debug, Clone, PartialEq, postgres_from_row::FromRow)]
pub struct TimelineItem {
	pub id: Ulid,
	pub user_id: Ulid,
	pub created_at: DateTime<Utc>,
	pub post_id: Ulid,
	pub post_user_id: Ulid,
	pub post_content: String,
	pub post_comments_count: i64,
	pub post_created_at: DateTime<Utc>,
	pub post_updated_at: DateTime<Utc>,
}

impl TimelineItem {
	pub fn post(&self) -> Post {
		Post {
			id: self.post_id,
			user_id: self.post_user_id,
			content: self.post_content.clone(),
			comments_count: self.post_comments_count,
			created_at: self.post_created_at,
			updated_at: self.post_updated_at,
		}
	}

	pub fn to_pb(&self) -> pb::TimelineItem {
		pb::TimelineItem {
			id: Some(self.id.into()),
			user_id: Some(self.user_id.into()),
			post: Some(self.post().to_pb()),
		}
	}
}

impl Paginated for TimelineItem {
	fn cursor(&self) -> Cursor {
		Cursor::new(self.id, self.created_at)
	}
}
