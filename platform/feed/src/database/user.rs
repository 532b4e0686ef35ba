use chrono::{DateTime, Utc};
use ulid::Ulid;

#[derive(Debug, Clone, postgres_from_row::FromRow)]
pub struct User {
	pub id: Ulid,
	/// Unique, compared case-insensitively
	pub username: String,
	pub followers_count: i64,
	pub following_count: i64,
	pub created_at: DateTime<Utc>,
}
