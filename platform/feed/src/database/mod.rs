mod comment;
mod follow;
mod notification;
mod post;
mod post_subscription;
mod timeline;
mod user;

pub use comment::*;
pub use follow::*;
pub use notification::*;
pub use post::*;
pub use post_subscription::*;
pub use timeline::*;
pub use user::*;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use ulid::Ulid;

static GENERATOR: Lazy<Mutex<ulid::Generator>> = Lazy::new(|| Mutex::new(ulid::Generator::new()));

/// A new row id. Ids handed out by one process are strictly increasing,
/// even within the same millisecond.
pub fn new_id() -> Ulid {
	GENERATOR.lock().generate().unwrap_or_else(|_| Ulid::new())
}
