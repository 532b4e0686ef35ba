use std::marker::PhantomData;

use deadpool_postgres::PoolError;
use postgres_from_row::FromRow;
use postgres_types::{FromSql, ToSql};
use tokio_postgres::{Error, Row};

pub fn query<'a>(query: impl ToString) -> QueryBuilder<'a> {
	QueryBuilder::new(query)
}

type Param<'a> = Box<dyn ToSql + Send + Sync + 'a>;

/// Accumulates SQL text and its bound parameters.
///
/// `push_bind` appends the next `$n` placeholder for you, `bind` only
/// records a parameter for a placeholder already written in the text.
#[derive(Default)]
pub struct QueryBuilder<'a> {
	query: String,
	params: Vec<Param<'a>>,
}

impl<'args> QueryBuilder<'args> {
	pub fn new(query: impl ToString) -> Self {
		Self {
			query: query.to_string(),
			params: Vec::new(),
		}
	}

	pub fn push_bind(&mut self, param: impl ToSql + Send + Sync + 'args) -> &mut Self {
		self.params.push(Box::new(param));
		self.query.push_str(&format!("${}", self.params.len()));
		self
	}

	pub fn bind(&mut self, param: impl ToSql + Send + Sync + 'args) -> &mut Self {
		self.params.push(Box::new(param));
		self
	}

	pub fn push(&mut self, query: impl AsRef<str>) -> &mut Self {
		self.query.push_str(query.as_ref());
		self
	}

	pub fn separated(&mut self, sep: &'args str) -> Separated<'_, 'args> {
		Separated {
			sep,
			first: true,
			query_builder: self,
		}
	}

	/// Writes `VALUES (..), (..)` with one tuple per item.
	pub fn push_values<T>(
		&mut self,
		values: impl IntoIterator<Item = T>,
		mut f: impl FnMut(Separated<'_, 'args>, T),
	) -> &mut Self {
		self.push("VALUES ");

		let mut separated = self.separated(",");

		for value in values {
			separated.push("(");

			f(separated.query_builder.separated(", "), value);

			separated.push_unseparated(")");
		}

		separated.query_builder
	}

	fn typed<P: RowParse>(&self) -> Query<'_, P> {
		Query {
			query: &self.query,
			params: &self.params,
			_marker: PhantomData,
		}
	}

	pub fn build(&self) -> Query<'_, NoParse> {
		self.typed()
	}

	pub fn build_query_as<T: FromRow>(&self) -> Query<'_, FromRowParse<T>> {
		self.typed()
	}

	pub fn build_query_single_scalar<T: for<'a> FromSql<'a>>(&self) -> Query<'_, SingleScalarParse<T>> {
		self.typed()
	}

	pub fn sql(&self) -> &str {
		&self.query
	}
}

pub trait RowParse {
	type Item;

	fn try_from_row(row: Row) -> Result<Self::Item, Error>;
}

pub struct NoParse;

pub struct FromRowParse<T>(PhantomData<T>);

pub struct SingleScalarParse<T>(PhantomData<T>);

impl RowParse for NoParse {
	type Item = Row;

	#[inline]
	fn try_from_row(row: Row) -> Result<Self::Item, Error> {
		Ok(row)
	}
}

impl<T: FromRow> RowParse for FromRowParse<T> {
	type Item = T;

	#[inline]
	fn try_from_row(row: Row) -> Result<Self::Item, Error> {
		T::try_from_row(&row)
	}
}

impl<T> RowParse for SingleScalarParse<T>
where
	T: for<'a> FromSql<'a>,
{
	type Item = T;

	#[inline]
	fn try_from_row(row: Row) -> Result<Self::Item, Error> {
		row.try_get(0)
	}
}

pub struct Query<'a, P: RowParse> {
	query: &'a str,
	params: &'a [Param<'a>],
	_marker: PhantomData<P>,
}

fn params<'a>(params: &'a [Param<'a>]) -> Vec<&'a (dyn ToSql + Sync)> {
	params.iter().map(|param| param.as_ref() as _).collect()
}

/// Anything a [`Query`] can run against: a pool, a pooled connection, an open
/// transaction or a [`Session`](super::Session).
pub trait ClientLike: Send + Sync {
	#[doc(hidden)]
	fn query_builder_client(
		&self,
	) -> impl std::future::Future<Output = Result<impl AsRef<tokio_postgres::Client> + '_, PoolError>> + Send;
}

struct PooledClient(deadpool_postgres::Client);

impl AsRef<tokio_postgres::Client> for PooledClient {
	fn as_ref(&self) -> &tokio_postgres::Client {
		self.0.as_ref()
	}
}

struct BorrowedClient<'a>(&'a deadpool_postgres::Client);

impl AsRef<tokio_postgres::Client> for BorrowedClient<'_> {
	fn as_ref(&self) -> &tokio_postgres::Client {
		self.0.as_ref()
	}
}

pub(crate) struct TransactionClient<'a>(pub(crate) &'a deadpool_postgres::Transaction<'a>);

impl AsRef<tokio_postgres::Client> for TransactionClient<'_> {
	fn as_ref(&self) -> &tokio_postgres::Client {
		self.0.client()
	}
}

impl ClientLike for deadpool_postgres::Pool {
	async fn query_builder_client(&self) -> Result<impl AsRef<tokio_postgres::Client> + '_, PoolError> {
		Ok(PooledClient(self.get().await?))
	}
}

impl ClientLike for deadpool_postgres::Client {
	async fn query_builder_client(&self) -> Result<impl AsRef<tokio_postgres::Client> + '_, PoolError> {
		Ok(BorrowedClient(self))
	}
}

impl ClientLike for deadpool_postgres::Transaction<'_> {
	async fn query_builder_client(&self) -> Result<impl AsRef<tokio_postgres::Client> + '_, PoolError> {
		Ok(TransactionClient(self))
	}
}

impl<T: ClientLike + Sync> ClientLike for &T {
	async fn query_builder_client(&self) -> Result<impl AsRef<tokio_postgres::Client> + '_, PoolError> {
		(*self).query_builder_client().await
	}
}

impl<P: RowParse> Query<'_, P> {
	pub async fn execute(self, conn: impl ClientLike) -> Result<u64, PoolError> {
		Ok(conn
			.query_builder_client()
			.await?
			.as_ref()
			.execute(self.query, &params(self.params))
			.await?)
	}

	pub async fn fetch_all(self, conn: impl ClientLike) -> Result<Vec<P::Item>, PoolError> {
		Ok(conn
			.query_builder_client()
			.await?
			.as_ref()
			.query(self.query, &params(self.params))
			.await?
			.into_iter()
			.map(P::try_from_row)
			.collect::<Result<_, Error>>()?)
	}

	pub async fn fetch_one(self, conn: impl ClientLike) -> Result<P::Item, PoolError> {
		let row = conn
			.query_builder_client()
			.await?
			.as_ref()
			.query_one(self.query, &params(self.params))
			.await?;

		Ok(P::try_from_row(row)?)
	}

	pub async fn fetch_optional(self, conn: impl ClientLike) -> Result<Option<P::Item>, PoolError> {
		Ok(conn
			.query_builder_client()
			.await?
			.as_ref()
			.query_opt(self.query, &params(self.params))
			.await?
			.map(P::try_from_row)
			.transpose()?)
	}
}

pub struct Separated<'b, 'args> {
	sep: &'b str,
	first: bool,
	query_builder: &'b mut QueryBuilder<'args>,
}

impl<'args> Separated<'_, 'args> {
	fn separate(&mut self) {
		if self.first {
			self.first = false;
		} else {
			self.query_builder.push(self.sep);
		}
	}

	pub fn push_bind(&mut self, param: impl ToSql + Send + Sync + 'args) -> &mut Self {
		self.separate();
		self.query_builder.push_bind(param);
		self
	}

	pub fn push(&mut self, query: impl AsRef<str>) -> &mut Self {
		self.separate();
		self.query_builder.push(query.as_ref());
		self
	}

	pub fn push_unseparated(&mut self, query: impl AsRef<str>) -> &mut Self {
		self.query_builder.push(query.as_ref());
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn push_values_numbers_placeholders() {
		let mut qb = query("INSERT INTO timeline (id, user_id) ");
		qb.push_values([(1_i32, 2_i32), (3, 4)], |mut sep, (a, b)| {
			sep.push_bind(a);
			sep.push_bind(b);
		});
		qb.push(" ON CONFLICT DO NOTHING");

		assert_eq!(
			qb.sql(),
			"INSERT INTO timeline (id, user_id) VALUES ($1, $2),($3, $4) ON CONFLICT DO NOTHING"
		);
	}

	#[test]
	fn bind_keeps_text_untouched() {
		let mut qb = query("SELECT * FROM posts WHERE id = $1");
		qb.bind(1_i64);

		assert_eq!(qb.sql(), "SELECT * FROM posts WHERE id = $1");
		assert_eq!(qb.params.len(), 1);
	}
}
