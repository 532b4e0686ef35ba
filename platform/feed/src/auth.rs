use ulid::Ulid;

use crate::error::{FeedError, Result};

/// The identity an operation runs on behalf of.
///
/// Issuing it (sessions, tokens) happens outside this crate; operations only
/// need to know whether there is a user and which one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewer {
	user_id: Option<Ulid>,
}

impl Viewer {
	pub fn anonymous() -> Self {
		Self { user_id: None }
	}

	pub fn user(user_id: Ulid) -> Self {
		Self { user_id: Some(user_id) }
	}

	pub fn user_id(&self) -> Option<Ulid> {
		self.user_id
	}

	/// The caller's user id, or `Unauthenticated` when there is none.
	pub fn require(&self) -> Result<Ulid> {
		self.user_id.ok_or(FeedError::Unauthenticated)
	}
}
