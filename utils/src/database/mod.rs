mod query_builder;
mod transaction;

pub use deadpool_postgres::{Pool, PoolError};
pub use postgres_from_row::FromRow;
pub use query_builder::*;
pub use transaction::*;
pub use {deadpool_postgres, postgres_from_row, postgres_types, tokio_postgres};

use tokio_postgres::error::SqlState;

fn sql_state(err: &PoolError) -> Option<&SqlState> {
	match err {
		PoolError::Backend(err) => err.code(),
		_ => None,
	}
}

/// SQLSTATE 40001, raised by serializable transactions that lost a conflict.
pub fn is_serialization_failure(err: &PoolError) -> bool {
	sql_state(err) == Some(&SqlState::T_R_SERIALIZATION_FAILURE)
}

pub fn is_foreign_key_violation(err: &PoolError) -> bool {
	sql_state(err) == Some(&SqlState::FOREIGN_KEY_VIOLATION)
}

pub fn is_unique_violation(err: &PoolError) -> bool {
	sql_state(err) == Some(&SqlState::UNIQUE_VIOLATION)
}

/// Name of the constraint a backend error reports as violated, if any.
pub fn violated_constraint(err: &PoolError) -> Option<&str> {
	match err {
		PoolError::Backend(err) => err.as_db_error().and_then(|err| err.constraint()),
		_ => None,
	}
}
