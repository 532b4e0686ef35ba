use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use ulid::Ulid;

use crate::config::PageConfig;
use crate::error::{FeedError, Result};

/// Position of the last row of a page in a newest-first scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
	pub id: Ulid,
	pub timestamp: DateTime<Utc>,
}

impl Cursor {
	pub fn new(id: Ulid, timestamp: DateTime<Utc>) -> Self {
		Self { id, timestamp }
	}

	pub fn encode(&self) -> String {
		URL_SAFE_NO_PAD.encode(format!("{}:{}", self.id, self.timestamp.timestamp_micros()))
	}

	pub fn decode(cursor: &str) -> Result<Self> {
		let raw = URL_SAFE_NO_PAD.decode(cursor).map_err(|_| FeedError::InvalidCursor)?;
		let raw = std::str::from_utf8(&raw).map_err(|_| FeedError::InvalidCursor)?;

		let (id, micros) = raw.split_once(':').ok_or(FeedError::InvalidCursor)?;
		let id = Ulid::from_string(id).map_err(|_| FeedError::InvalidCursor)?;
		let micros = micros.parse::<i64>().map_err(|_| FeedError::InvalidCursor)?;
		let timestamp = DateTime::from_timestamp_micros(micros).ok_or(FeedError::InvalidCursor)?;

		Ok(Self { id, timestamp })
	}
}

/// Rows that can be paged over expose the cursor pointing at themselves.
pub trait Paginated {
	fn cursor(&self) -> Cursor;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
	pub items: Vec<T>,
	/// Pass back as `before` to get the next (older) page; `None` when the
	/// page is empty.
	pub end_cursor: Option<String>,
	pub has_more: bool,
}

/// A validated `(last, before)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
	pub limit: u32,
	pub before: Option<Cursor>,
}

impl PageRequest {
	pub fn new(config: &PageConfig, last: Option<u32>, before: Option<&str>) -> Result<Self> {
		let limit = match last {
			Some(last) => last.max(config.min).min(config.max),
			None => config.default.max(config.min).min(config.max),
		};

		let before = before.map(Cursor::decode).transpose()?;

		Ok(Self { limit, before })
	}

	/// Rows to ask the database for; one extra row tells us whether an older
	/// page exists.
	pub fn fetch_limit(&self) -> i64 {
		i64::from(self.limit) + 1
	}

	pub fn finish<T: Paginated>(&self, mut rows: Vec<T>) -> Page<T> {
		let has_more = rows.len() > self.limit as usize;
		rows.truncate(self.limit as usize);

		Page {
			end_cursor: rows.last().map(|row| row.cursor().encode()),
			items: rows,
			has_more,
		}
	}
}

#[cfg(test)]
mod tests {
	use chrono::TimeZone;

	use super::*;

	struct Row(Ulid, DateTime<Utc>);

	impl Paginated for Row {
		fn cursor(&self) -> Cursor {
			Cursor::new(self.0, self.1)
		}
	}

	fn config() -> PageConfig {
		PageConfig {
			default: 20,
			min: 1,
			max: 100,
		}
	}

	#[test]
	fn cursor_decodes_what_it_encodes() {
		let cursor = Cursor::new(Ulid::new(), Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap());
		let encoded = cursor.encode();

		assert!(encoded.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
		assert_eq!(Cursor::decode(&encoded).unwrap(), cursor);
	}

	#[test]
	fn garbage_cursors_are_rejected() {
		let bad = [
			String::new(),
			"not base64!".to_string(),
			URL_SAFE_NO_PAD.encode("no-separator"),
			URL_SAFE_NO_PAD.encode("not-a-ulid:123"),
			URL_SAFE_NO_PAD.encode(format!("{}:abc", Ulid::new())),
			URL_SAFE_NO_PAD.encode(format!("{}:{}", Ulid::new(), i64::MAX)),
		];

		for cursor in &bad {
			assert!(matches!(Cursor::decode(cursor), Err(FeedError::InvalidCursor)), "{cursor:?}");
		}
	}

	#[test]
	fn page_size_is_clamped() {
		assert_eq!(PageRequest::new(&config(), None, None).unwrap().limit, 20);
		assert_eq!(PageRequest::new(&config(), Some(0), None).unwrap().limit, 1);
		assert_eq!(PageRequest::new(&config(), Some(5000), None).unwrap().limit, 100);
		assert_eq!(PageRequest::new(&config(), Some(7), None).unwrap().limit, 7);
	}

	#[test]
	fn invalid_before_fails_the_request() {
		assert!(matches!(
			PageRequest::new(&config(), Some(10), Some("%%%")),
			Err(FeedError::InvalidCursor)
		));
	}

	#[test]
	fn finish_trims_the_lookahead_row() {
		let request = PageRequest::new(&config(), Some(2), None).unwrap();
		let now = Utc::now();
		let rows = vec![Row(Ulid::new(), now), Row(Ulid::new(), now), Row(Ulid::new(), now)];
		let second = rows[1].cursor();

		let page = request.finish(rows);
		assert_eq!(page.items.len(), 2);
		assert!(page.has_more);
		assert_eq!(Cursor::decode(page.end_cursor.as_deref().unwrap()).unwrap().id, second.id);

		let empty = request.finish(Vec::<Row>::new());
		assert!(empty.items.is_empty());
		assert!(!empty.has_more);
		assert_eq!(empty.end_cursor, None);
	}
}
