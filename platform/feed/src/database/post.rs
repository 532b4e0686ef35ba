use chrono::{DateTime, Utc};
use ulid::Ulid;

use crate::pb;

#[derive(Debug, Clone, PartialEq, postgres_from_row::FromRow)]
pub struct Post {
	pub id: Ulid,
	/// The author
	pub user_id: Ulid,
	pub content: String,
	/// Kept in step with the comments table by the comment insert
	pub comments_count: i64,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Post {
	pub fn to_pb(&self) -> pb::Post {
		pb::Post {
			id: Some(self.id.into()),
			author_id: Some(self.user_id.into()),
			content: self.content.clone(),
			comments_count: self.comments_count,
			created_at: self.created_at.timestamp_micros(),
		}
	}
}
