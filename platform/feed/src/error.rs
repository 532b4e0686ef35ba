use utils::database::{self, PoolError, TxError};

use crate::subscription::PubSubError;

pub type Result<T, E = FeedError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
	/// The input was invalid.
	#[error("invalid input for {field}: {message}")]
	InvalidInput { field: &'static str, message: &'static str },
	/// The caller has no user identity.
	#[error("unauthenticated")]
	Unauthenticated,
	#[error("post not found")]
	PostNotFound,
	#[error("user not found")]
	UserNotFound,
	#[error("notification not found")]
	NotificationNotFound,
	#[error("timeline entry not found")]
	TimelineEntryNotFound,
	/// The pagination cursor could not be decoded.
	#[error("invalid cursor")]
	InvalidCursor,
	/// A database error, including conflicts that outlived every retry.
	#[error("database error: {0}")]
	Database(#[from] PoolError),
	#[error("pubsub error: {0}")]
	PubSub(#[from] PubSubError),
}

/// Coarse classification used by callers to map errors onto responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	Validation,
	Unauthenticated,
	NotFound,
	Conflict,
	Internal,
}

impl FeedError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::InvalidInput { .. } | Self::InvalidCursor => ErrorKind::Validation,
			Self::Unauthenticated => ErrorKind::Unauthenticated,
			Self::PostNotFound | Self::UserNotFound | Self::NotificationNotFound | Self::TimelineEntryNotFound => {
				ErrorKind::NotFound
			}
			Self::Database(err) if database::is_serialization_failure(err) => ErrorKind::Conflict,
			Self::Database(_) | Self::PubSub(_) => ErrorKind::Internal,
		}
	}

	/// Maps a foreign-key violation onto `not_found`, leaving other
	/// database errors untouched.
	pub(crate) fn missing_reference(err: PoolError, not_found: Self) -> Self {
		if database::is_foreign_key_violation(&err) {
			not_found
		} else {
			Self::Database(err)
		}
	}
}

impl TxError for FeedError {
	fn is_serialization_failure(&self) -> bool {
		matches!(self, Self::Database(err) if database::is_serialization_failure(err))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn validation_errors_are_not_retried() {
		let err = FeedError::InvalidInput {
			field: "content",
			message: "content cannot be empty",
		};

		assert_eq!(err.kind(), ErrorKind::Validation);
		assert!(!err.is_serialization_failure());
		assert_eq!(err.to_string(), "invalid input for content: content cannot be empty");
	}

	#[test]
	fn not_found_variants_share_a_kind() {
		for err in [
			FeedError::PostNotFound,
			FeedError::UserNotFound,
			FeedError::NotificationNotFound,
			FeedError::TimelineEntryNotFound,
		] {
			assert_eq!(err.kind(), ErrorKind::NotFound);
		}
	}
}
