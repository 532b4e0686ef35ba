use once_cell::sync::Lazy;
use regex::Regex;

static MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"@([A-Za-z0-9_]+)").expect("mention pattern is valid"));

/// Usernames mentioned as `@name` in `content`, lowercased, in order of
/// first appearance and without duplicates.
///
/// A mention must not be glued to a preceding word character (so e-mail
/// addresses do not count) and must be a syntactically valid username.
/// At most `limit` names are returned.
pub fn parse(content: &str, limit: usize) -> Vec<String> {
	let mut names = Vec::new();

	for captures in MENTION.captures_iter(content) {
		let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
			continue;
		};

		let glued = content[..whole.start()]
			.chars()
			.next_back()
			.is_some_and(|c| c.is_alphanumeric() || c == '_');
		if glued || crate::validation::username(name.as_str()).is_err() {
			continue;
		}

		let name = name.as_str().to_lowercase();
		if !names.contains(&name) {
			if names.len() == limit {
				break;
			}

			names.push(name);
		}
	}

	names
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn finds_mentions_in_order() {
		assert_eq!(parse("hey @alice and @bob_2!", 10), vec!["alice", "bob_2"]);
		assert_eq!(parse("@carol: first", 10), vec!["carol"]);
	}

	#[test]
	fn deduplicates_case_insensitively() {
		assert_eq!(parse("@Alice @alice @ALICE @dave", 10), vec!["alice", "dave"]);
	}

	#[test]
	fn ignores_emails_and_invalid_names() {
		assert!(parse("mail me at someone@example.com", 10).is_empty());
		assert!(parse("@ab is too short", 10).is_empty());
		assert!(parse(&format!("@{}", "x".repeat(21)), 10).is_empty());
		assert!(parse("no mentions here", 10).is_empty());
	}

	#[test]
	fn respects_the_limit() {
		assert_eq!(parse("@one1 @two2 @three", 2), vec!["one1", "two2"]);
		assert!(parse("@one1", 0).is_empty());
	}
}
