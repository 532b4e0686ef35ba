use crate::error::{FeedError, Result};

/// Trims `content` and checks it is non-empty and at most `max_length` code
/// points long.
pub fn content(field: &'static str, content: &str, max_length: usize) -> Result<String> {
	let content = content.trim();

	if content.is_empty() {
		return Err(FeedError::InvalidInput {
			field,
			message: "cannot be empty",
		});
	}

	if content.chars().count() > max_length {
		return Err(FeedError::InvalidInput {
			field,
			message: "is too long",
		});
	}

	Ok(content.to_string())
}

pub fn username(username: &str) -> Result<()> {
	if username.len() < 3 {
		return Err(FeedError::InvalidInput {
			field: "username",
			message: "must be at least 3 characters long",
		});
	}

	if username.len() > 20 {
		return Err(FeedError::InvalidInput {
			field: "username",
			message: "must be at most 20 characters long",
		});
	}

	if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
		return Err(FeedError::InvalidInput {
			field: "username",
			message: "must only contain alphanumeric characters and underscores",
		});
	}

	Ok(())
}
