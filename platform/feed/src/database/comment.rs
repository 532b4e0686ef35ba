use chrono::{DateTime, Utc};
use ulid::Ulid;

use crate::cursor::{Cursor, Paginated};
use crate::pb;

#[derive(Debug, Clone, PartialEq, postgres_from_row::FromRow)]
pub struct Comment {
	pub id: Ulid,
	pub post_id: Ulid,
	/// The author
	pub user_id: Ulid,
	pub content: String,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Comment {
	pub fn to_pb(&self) -> pb::Comment {
		pb::Comment {
			id: Some(self.id.into()),
			post_id: Some(self.post_id.into()),
			author_id: Some(self.user_id.into()),
			content: self.content.clone(),
			created_at: self.created_at.timestamp_micros(),
		}
	}
}

impl Paginated for Comment {
	fn cursor(&self) -> Cursor {
		Cursor::new(self.id, self.created_at)
	}
}
