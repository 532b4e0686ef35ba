use chrono::{DateTime, Utc};
use ulid::Ulid;

/// A user who is notified about new comments on a post.
#[derive(Debug, Clone, postgres_from_row::FromRow)]
pub struct PostSubscription {
	pub user_id: Ulid,
	pub post_id: Ulid,
	pub created_at: DateTime<Utc>,
}
