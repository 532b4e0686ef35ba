//! Protobuf payloads carried over the publish/subscribe bus.

#[derive(Clone, Copy, PartialEq, Eq, Hash, prost::Message)]
pub struct Ulid {
	#[prost(fixed64, tag = "1")]
	pub msb: u64,
	#[prost(fixed64, tag = "2")]
	pub lsb: u64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Post {
	#[prost(message, optional, tag = "1")]
	pub id: Option<Ulid>,
	#[prost(message, optional, tag = "2")]
	pub author_id: Option<Ulid>,
	#[prost(string, tag = "3")]
	pub content: String,
	#[prost(int64, tag = "4")]
	pub comments_count: i64,
	/// Unix timestamp in microseconds
	#[prost(int64, tag = "5")]
	pub created_at: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TimelineItem {
	#[prost(message, optional, tag = "1")]
	pub id: Option<Ulid>,
	#[prost(message, optional, tag = "2")]
	pub user_id: Option<Ulid>,
	#[prost(message, optional, tag = "3")]
	pub post: Option<Post>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Comment {
	#[prost(message, optional, tag = "1")]
	pub id: Option<Ulid>,
	#[prost(message, optional, tag = "2")]
	pub post_id: Option<Ulid>,
	#[prost(message, optional, tag = "3")]
	pub author_id: Option<Ulid>,
	#[prost(string, tag = "4")]
	pub content: String,
	#[prost(int64, tag = "5")]
	pub created_at: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Notification {
	#[prost(message, optional, tag = "1")]
	pub id: Option<Ulid>,
	#[prost(message, optional, tag = "2")]
	pub user_id: Option<Ulid>,
	/// `follow`, `comment`, `post_mention` or `comment_mention`
	#[prost(string, tag = "3")]
	pub kind: String,
	/// Most recent actor first
	#[prost(message, repeated, tag = "4")]
	pub actor_ids: Vec<Ulid>,
	#[prost(message, optional, tag = "5")]
	pub post_id: Option<Ulid>,
	#[prost(int64, optional, tag = "6")]
	pub read_at: Option<i64>,
	#[prost(int64, tag = "7")]
	pub issued_at: i64,
}

pub trait UlidExt {
	fn to_ulid(&self) -> ulid::Ulid;
}

impl UlidExt for Ulid {
	fn to_ulid(&self) -> ulid::Ulid {
		ulid::Ulid::from((self.msb, self.lsb))
	}
}

impl UlidExt for Option<Ulid> {
	fn to_ulid(&self) -> ulid::Ulid {
		match self {
			Some(ulid) => ulid.to_ulid(),
			None => ulid::Ulid::nil(),
		}
	}
}

impl From<ulid::Ulid> for Ulid {
	fn from(ulid: ulid::Ulid) -> Self {
		let (msb, lsb) = (ulid.0 >> 64, ulid.0);
		Self {
			msb: msb as u64,
			lsb: lsb as u64,
		}
	}
}

#[cfg(test)]
mod tests {
	use prost::Message;

	use super::*;

	#[test]
	fn ulid_survives_the_wire() {
		let id = ulid::Ulid::new();
		let item = TimelineItem {
			id: Some(id.into()),
			user_id: None,
			post: None,
		};

		let decoded = TimelineItem::decode(item.encode_to_vec().as_slice()).unwrap();
		assert_eq!(decoded.id.to_ulid(), id);
		assert_eq!(decoded.user_id.to_ulid(), ulid::Ulid::nil());
	}
}
