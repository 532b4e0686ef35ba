use std::sync::Arc;

use anyhow::Context;
use utils::database::deadpool_postgres::Transaction;

use crate::global::FeedGlobal;

#[path = "0001_initial.rs"]
mod initial;

#[async_trait::async_trait]
trait Migration<S: FeedGlobal> {
	fn name(&self) -> &'static str;
	fn version(&self) -> i32;

	async fn up(&self, global: &Arc<S>, tx: &Transaction<'_>) -> anyhow::Result<()>;
	async fn down(&self, global: &Arc<S>, tx: &Transaction<'_>) -> anyhow::Result<()>;
}

const fn migrations<S: FeedGlobal>() -> &'static [&'static dyn Migration<S>] {
	&[&initial::InitialMigration]
}

#[tracing::instrument(skip(global))]
async fn current_version<S: FeedGlobal>(global: &Arc<S>) -> anyhow::Result<usize> {
	let version = utils::database::query("SELECT version FROM feed_migrations")
		.build_query_single_scalar::<i32>()
		.fetch_optional(global.db())
		.await;

	match version {
		Ok(Some(version)) => Ok(version.max(0) as usize),
		Ok(None) => {
			utils::database::query("INSERT INTO feed_migrations (version) VALUES (0)")
				.build()
				.execute(global.db())
				.await
				.context("failed to insert initial migration version")?;

			Ok(0)
		}
		Err(err) => {
			tracing::info!("initializing database: {}", err);
			utils::database::query("CREATE TABLE IF NOT EXISTS feed_migrations (version INTEGER NOT NULL)")
				.build()
				.execute(global.db())
				.await
				.context("failed to create migration table")?;

			utils::database::query("INSERT INTO feed_migrations (version) VALUES (0)")
				.build()
				.execute(global.db())
				.await
				.context("failed to insert initial migration version")?;

			Ok(0)
		}
	}
}

#[tracing::instrument(skip(global, migration), fields(name = migration.name(), version = migration.version()))]
async fn run_migration<S: FeedGlobal>(global: &Arc<S>, migration: &'static dyn Migration<S>, up: bool) -> anyhow::Result<()> {
	tracing::info!(up, "applying migration");

	let mut client = global.db().pool().get().await.context("failed to get database connection")?;
	let tx = client.transaction().await.context("failed to start transaction")?;

	let version = if up {
		migration.up(global, &tx).await.context("failed to apply migration")?;
		migration.version()
	} else {
		migration.down(global, &tx).await.context("failed to revert migration")?;
		migration.version() - 1
	};

	utils::database::query("UPDATE feed_migrations SET version = ")
		.push_bind(version)
		.build()
		.execute(&tx)
		.await
		.context("failed to update migration version")?;

	tx.commit().await.context("failed to commit transaction")?;

	tracing::info!("migration applied");

	Ok(())
}

/// Brings the schema up to the latest version.
#[tracing::instrument(skip(global))]
pub async fn run_migrations<S: FeedGlobal>(global: &Arc<S>) -> anyhow::Result<()> {
	let migrations = migrations::<S>();
	let version = current_version(global).await?;

	if version > migrations.len() {
		anyhow::bail!(
			"database is at version {}, but only {} migrations are available",
			version,
			migrations.len()
		);
	}

	for migration in migrations.iter().skip(version) {
		run_migration(global, *migration, true).await?;
	}

	Ok(())
}

/// Reverts migrations until the schema is at `target`.
#[tracing::instrument(skip(global))]
pub async fn revert_migrations<S: FeedGlobal>(global: &Arc<S>, target: usize) -> anyhow::Result<()> {
	let migrations = migrations::<S>();
	let version = current_version(global).await?.min(migrations.len());

	for migration in migrations[target.min(version)..version].iter().rev() {
		run_migration(global, *migration, false).await?;
	}

	Ok(())
}
