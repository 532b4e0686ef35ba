use chrono::{DateTime, Utc};
use ulid::Ulid;

#[derive(Debug, Clone, postgres_from_row::FromRow)]
pub struct Follow {
	pub follower_id: Ulid,
	pub followee_id: Ulid,
	pub created_at: DateTime<Utc>,
}
