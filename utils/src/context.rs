use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Counts live [`Context`] clones so a [`Handler`] can wait for them to be
/// released after cancellation.
#[derive(Debug)]
struct ContextTracker(Arc<ContextTrackerInner>);

impl Drop for ContextTracker {
	fn drop(&mut self) {
		if self.active_count.fetch_sub(1, Ordering::AcqRel) == 1 && self.stopped.load(Ordering::Acquire) {
			self.notify.notify_waiters();
		}
	}
}

impl Clone for ContextTracker {
	fn clone(&self) -> Self {
		self.active_count.fetch_add(1, Ordering::AcqRel);
		Self(self.0.clone())
	}
}

impl std::ops::Deref for ContextTracker {
	type Target = ContextTrackerInner;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

#[derive(Debug)]
struct ContextTrackerInner {
	stopped: AtomicBool,
	active_count: AtomicUsize,
	notify: tokio::sync::Notify,
}

impl ContextTrackerInner {
	fn new() -> Arc<Self> {
		Arc::new(Self {
			stopped: AtomicBool::new(false),
			active_count: AtomicUsize::new(0),
			notify: tokio::sync::Notify::new(),
		})
	}

	fn child(self: &Arc<Self>) -> ContextTracker {
		self.active_count.fetch_add(1, Ordering::AcqRel);
		ContextTracker(self.clone())
	}

	fn stop(&self) {
		self.stopped.store(true, Ordering::Release);
	}

	async fn wait(&self) {
		let notify = self.notify.notified();
		tokio::pin!(notify);
		notify.as_mut().enable();

		if self.active_count.load(Ordering::Acquire) == 0 {
			return;
		}

		notify.await;
	}
}

/// A cancellation scope handed to tasks and streams.
///
/// Holding a clone keeps the owning [`Handler::shutdown`] waiting, so
/// background work that must finish before exit should keep one alive until
/// it is done.
#[derive(Clone, Debug)]
pub struct Context {
	token: CancellationToken,
	_trackers: Vec<ContextTracker>,
}

impl Context {
	#[must_use]
	pub fn new() -> (Self, Handler) {
		let handler = Handler::new();
		(handler.context(), handler)
	}

	#[must_use]
	pub fn new_child(&self) -> (Self, Handler) {
		let token = self.token.child_token();
		let tracker = ContextTrackerInner::new();

		(
			Self {
				_trackers: {
					let mut trackers = self._trackers.clone();
					trackers.push(tracker.child());
					trackers
				},
				token: token.clone(),
			},
			Handler {
				token: TokenDropGuard(token),
				tracker,
			},
		)
	}

	pub async fn done(&self) {
		self.token.cancelled().await;
	}

	pub async fn into_done(self) {
		self.done().await;
	}

	#[must_use]
	pub fn is_done(&self) -> bool {
		self.token.is_cancelled()
	}
}

#[derive(Debug)]
struct TokenDropGuard(CancellationToken);

impl Drop for TokenDropGuard {
	fn drop(&mut self) {
		self.0.cancel();
	}
}

/// Owner side of a [`Context`]. Dropping the handler cancels every context
/// derived from it.
#[derive(Debug)]
pub struct Handler {
	token: TokenDropGuard,
	tracker: Arc<ContextTrackerInner>,
}

impl Default for Handler {
	fn default() -> Self {
		Self::new()
	}
}

impl Handler {
	#[must_use]
	pub fn new() -> Handler {
		Handler {
			token: TokenDropGuard(CancellationToken::new()),
			tracker: ContextTrackerInner::new(),
		}
	}

	/// Cancels all derived contexts and waits until every clone has been
	/// dropped. Calling it again after completion returns immediately.
	pub async fn shutdown(&self) {
		self.tracker.stop();
		self.cancel();
		self.tracker.wait().await;
	}

	#[must_use]
	pub fn context(&self) -> Context {
		Context {
			token: self.token.0.child_token(),
			_trackers: vec![self.tracker.child()],
		}
	}

	#[must_use]
	pub fn new_child(&self) -> (Context, Handler) {
		self.context().new_child()
	}

	pub fn cancel(&self) {
		self.token.0.cancel();
	}

	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		self.token.0.is_cancelled()
	}
}
