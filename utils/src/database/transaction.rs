use std::time::Duration;

use deadpool_postgres::{Pool, PoolError};
use futures_util::future::BoxFuture;
use rand::Rng;
use tokio_postgres::IsolationLevel;

use super::query_builder::{ClientLike, TransactionClient};

/// How often, and how patiently, a unit of work is re-run after losing a
/// serialization conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub base_backoff: Duration,
	pub max_backoff: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 10,
			base_backoff: Duration::from_millis(5),
			max_backoff: Duration::from_millis(500),
		}
	}
}

impl RetryPolicy {
	/// Exponential backoff with full jitter for the given (1-based) attempt.
	pub fn backoff(&self, attempt: u32) -> Duration {
		let exp = self
			.base_backoff
			.saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
			.min(self.max_backoff);

		if exp.is_zero() {
			return exp;
		}

		rand::thread_rng().gen_range(Duration::ZERO..=exp)
	}
}

/// Errors that can flow out of a unit of work.
///
/// The coordinator needs to open, commit and roll back transactions (hence
/// `From<PoolError>`) and to recognise conflicts worth retrying.
pub trait TxError: From<PoolError> + Send {
	fn is_serialization_failure(&self) -> bool;
}

impl TxError for PoolError {
	fn is_serialization_failure(&self) -> bool {
		super::is_serialization_failure(self)
	}
}

/// The pool plus the retry policy applied to every root transaction.
#[derive(Clone)]
pub struct Database {
	pool: Pool,
	retry: RetryPolicy,
}

impl std::fmt::Debug for Database {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Database")
			.field("status", &self.pool.status())
			.field("retry", &self.retry)
			.finish()
	}
}

impl Database {
	pub fn new(pool: Pool, retry: RetryPolicy) -> Self {
		Self { pool, retry }
	}

	pub fn pool(&self) -> &Pool {
		&self.pool
	}

	/// A session with no transaction open yet.
	pub fn session(&self) -> Session<'_> {
		Session::Root(self)
	}

	/// Runs `f` inside a new serializable transaction.
	///
	/// `f` is re-run from scratch whenever the transaction (or its commit)
	/// fails with a serialization failure, up to the policy's attempt limit.
	/// Any other error rolls back and is returned as is.
	pub async fn run_tx<T, E, F>(&self, mut f: F) -> Result<T, E>
	where
		T: Send,
		E: TxError,
		F: for<'t> FnMut(Session<'t>) -> BoxFuture<'t, Result<T, E>> + Send,
	{
		let mut attempt = 0;

		loop {
			attempt += 1;

			match self.attempt_tx(&mut f).await {
				Err(err) if err.is_serialization_failure() && attempt < self.retry.max_attempts => {
					let backoff = self.retry.backoff(attempt);
					tracing::debug!(attempt, ?backoff, "serialization failure, retrying transaction");
					tokio::time::sleep(backoff).await;
				}
				Err(err) => {
					if err.is_serialization_failure() {
						tracing::warn!(attempt, "transaction retries exhausted");
					}

					return Err(err);
				}
				Ok(value) => return Ok(value),
			}
		}
	}

	async fn attempt_tx<T, E, F>(&self, f: &mut F) -> Result<T, E>
	where
		T: Send,
		E: TxError,
		F: for<'t> FnMut(Session<'t>) -> BoxFuture<'t, Result<T, E>> + Send,
	{
		let mut client = self.pool.get().await?;
		let tx = client
			.build_transaction()
			.isolation_level(IsolationLevel::Serializable)
			.start()
			.await
			.map_err(PoolError::from)?;

		let result = f(Session::Transaction(&tx)).await;

		match result {
			Ok(value) => {
				tx.commit().await.map_err(PoolError::from)?;
				Ok(value)
			}
			Err(err) => {
				if let Err(rollback) = tx.rollback().await {
					tracing::warn!(error = %rollback, "failed to roll back transaction");
				}

				Err(err)
			}
		}
	}
}

impl ClientLike for Database {
	async fn query_builder_client(&self) -> Result<impl AsRef<tokio_postgres::Client> + '_, PoolError> {
		self.pool.query_builder_client().await
	}
}

/// The unit-of-work handle passed to every data-access call.
///
/// A `Root` session runs each statement on its own pooled connection; a
/// `Transaction` session runs them on the open transaction. Calling
/// [`Session::run_tx`] on a `Transaction` session joins it instead of
/// starting a nested transaction.
#[derive(Clone, Copy)]
pub enum Session<'a> {
	Root(&'a Database),
	Transaction(&'a deadpool_postgres::Transaction<'a>),
}

impl std::fmt::Debug for Session<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Root(_) => f.write_str("Session::Root"),
			Self::Transaction(_) => f.write_str("Session::Transaction"),
		}
	}
}

impl<'a> Session<'a> {
	pub fn in_transaction(&self) -> bool {
		matches!(self, Self::Transaction(_))
	}

	pub async fn run_tx<T, E, F>(self, mut f: F) -> Result<T, E>
	where
		T: Send,
		E: TxError,
		F: for<'t> FnMut(Session<'t>) -> BoxFuture<'t, Result<T, E>> + Send,
	{
		match self {
			Self::Root(db) => db.run_tx(f).await,
			Self::Transaction(_) => f(self).await,
		}
	}
}

enum SessionClient<'a> {
	Pooled(deadpool_postgres::Client),
	Transaction(TransactionClient<'a>),
}

impl AsRef<tokio_postgres::Client> for SessionClient<'_> {
	fn as_ref(&self) -> &tokio_postgres::Client {
		match self {
			Self::Pooled(client) => client.as_ref(),
			Self::Transaction(client) => client.as_ref(),
		}
	}
}

impl ClientLike for Session<'_> {
	async fn query_builder_client(&self) -> Result<impl AsRef<tokio_postgres::Client> + '_, PoolError> {
		match self {
			Self::Root(db) => Ok(SessionClient::Pooled(db.pool.get().await?)),
			Self::Transaction(tx) => Ok(SessionClient::Transaction(TransactionClient(*tx))),
		}
	}
}
