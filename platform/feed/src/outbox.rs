use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::Instrument;
use utils::context::Context;
use utils::database::RetryPolicy;

use crate::config::OutboxConfig;

/// Runs best-effort work after a unit of work has committed.
///
/// Jobs run on their own task, are retried with backoff and only ever log
/// their failures. Every job holds a clone of the process context, so a
/// graceful shutdown waits for in-flight jobs; pending retries are abandoned
/// once the context is cancelled.
#[derive(Debug)]
pub struct Outbox {
	ctx: Context,
	retry: RetryPolicy,
	in_flight: Arc<AtomicUsize>,
}

impl Outbox {
	pub fn new(ctx: Context, config: &OutboxConfig) -> Self {
		Self {
			ctx,
			retry: RetryPolicy {
				max_attempts: config.max_attempts.max(1),
				base_backoff: config.base_backoff,
				max_backoff: config.max_backoff,
			},
			in_flight: Arc::default(),
		}
	}

	/// Jobs submitted but not yet finished.
	pub fn in_flight(&self) -> usize {
		self.in_flight.load(Ordering::Acquire)
	}

	pub fn submit<F, Fut, E>(&self, job: &'static str, f: F)
	where
		F: FnMut() -> Fut + Send + 'static,
		Fut: Future<Output = Result<(), E>> + Send + 'static,
		E: std::fmt::Display + Send + 'static,
	{
		let ctx = self.ctx.clone();
		let retry = self.retry;
		let in_flight = self.in_flight.clone();

		in_flight.fetch_add(1, Ordering::AcqRel);
		tokio::spawn(
			async move {
				run(&ctx, retry, f).await;
				in_flight.fetch_sub(1, Ordering::AcqRel);
				drop(ctx);
			}
			.instrument(tracing::info_span!("outbox", job)),
		);
	}
}

async fn run<F, Fut, E>(ctx: &Context, retry: RetryPolicy, mut f: F)
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<(), E>>,
	E: std::fmt::Display,
{
	for attempt in 1..=retry.max_attempts {
		let err = match f().await {
			Ok(()) => {
				if attempt > 1 {
					tracing::debug!(attempt, "job succeeded after retrying");
				}

				return;
			}
			Err(err) => err,
		};

		if attempt == retry.max_attempts {
			tracing::error!(attempt, error = %err, "job failed, giving up");
			return;
		}

		let backoff = retry.backoff(attempt);
		tracing::warn!(attempt, error = %err, ?backoff, "job failed, retrying");

		tokio::select! {
			_ = tokio::time::sleep(backoff) => {}
			_ = ctx.done() => {
				tracing::warn!(attempt, "shutting down, abandoning job");
				return;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicU32;
	use std::time::Duration;

	use super::*;

	fn config(max_attempts: u32) -> OutboxConfig {
		OutboxConfig {
			max_attempts,
			base_backoff: Duration::from_millis(1),
			max_backoff: Duration::from_millis(5),
		}
	}

	async fn wait_idle(outbox: &Outbox) {
		tokio::time::timeout(Duration::from_secs(2), async {
			while outbox.in_flight() != 0 {
				tokio::time::sleep(Duration::from_millis(5)).await;
			}
		})
		.await
		.expect("outbox did not drain");
	}

	#[tokio::test]
	async fn retries_until_success() {
		let (ctx, _handler) = Context::new();
		let outbox = Outbox::new(ctx, &config(5));
		let calls = Arc::new(AtomicU32::new(0));

		let counter = calls.clone();
		outbox.submit("flaky", move || {
			let counter = counter.clone();
			async move {
				if counter.fetch_add(1, Ordering::SeqCst) < 2 {
					Err("not yet")
				} else {
					Ok(())
				}
			}
		});

		wait_idle(&outbox).await;
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn gives_up_after_max_attempts() {
		let (ctx, _handler) = Context::new();
		let outbox = Outbox::new(ctx, &config(3));
		let calls = Arc::new(AtomicU32::new(0));

		let counter = calls.clone();
		outbox.submit("broken", move || {
			counter.fetch_add(1, Ordering::SeqCst);
			async { Err::<(), _>("always") }
		});

		wait_idle(&outbox).await;
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn shutdown_waits_for_running_jobs() {
		let (ctx, handler) = Context::new();
		let outbox = Outbox::new(ctx, &config(1));
		let done = Arc::new(AtomicU32::new(0));

		let flag = done.clone();
		outbox.submit("slow", move || {
			let flag = flag.clone();
			async move {
				tokio::time::sleep(Duration::from_millis(50)).await;
				flag.store(1, Ordering::SeqCst);
				Ok::<_, std::convert::Infallible>(())
			}
		});

		drop(outbox);
		tokio::time::timeout(Duration::from_secs(2), handler.shutdown())
			.await
			.expect("shutdown timed out");
		assert_eq!(done.load(Ordering::SeqCst), 1);
	}
}
