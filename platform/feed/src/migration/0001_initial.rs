use std::sync::Arc;

use utils::database::deadpool_postgres::Transaction;

use super::Migration;
use crate::global::FeedGlobal;

pub struct InitialMigration;

const UP: &[&str] = &[
	"CREATE TYPE notification_kind AS ENUM ('follow', 'comment', 'post_mention', 'comment_mention');",
	"CREATE TABLE users (
		id UUID PRIMARY KEY,
		username VARCHAR(20) NOT NULL,
		followers_count BIGINT NOT NULL DEFAULT 0,
		following_count BIGINT NOT NULL DEFAULT 0,
		created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
	);",
	"CREATE UNIQUE INDEX users_username_index ON users (lower(username));",
	"CREATE TABLE posts (
		id UUID PRIMARY KEY,
		user_id UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
		content TEXT NOT NULL,
		comments_count BIGINT NOT NULL DEFAULT 0,
		created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
		updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
	);",
	"CREATE INDEX posts_user_id_index ON posts (user_id, id DESC);",
	"CREATE TABLE comments (
		id UUID PRIMARY KEY,
		post_id UUID NOT NULL CONSTRAINT comments_post_id_fkey REFERENCES posts (id) ON DELETE CASCADE,
		user_id UUID NOT NULL CONSTRAINT comments_user_id_fkey REFERENCES users (id) ON DELETE CASCADE,
		content TEXT NOT NULL,
		created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
		updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
	);",
	"CREATE INDEX comments_post_id_index ON comments (post_id, id DESC);",
	"CREATE TABLE timeline (
		id UUID PRIMARY KEY,
		user_id UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
		post_id UUID NOT NULL REFERENCES posts (id) ON DELETE CASCADE,
		created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
		UNIQUE (user_id, post_id)
	);",
	"CREATE INDEX timeline_user_id_index ON timeline (user_id, id DESC);",
	"CREATE TABLE follows (
		follower_id UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
		followee_id UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
		created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
		PRIMARY KEY (follower_id, followee_id),
		CHECK (follower_id <> followee_id)
	);",
	"CREATE INDEX follows_followee_id_index ON follows (followee_id, follower_id);",
	"CREATE TABLE post_subscriptions (
		user_id UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
		post_id UUID NOT NULL REFERENCES posts (id) ON DELETE CASCADE,
		created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
		PRIMARY KEY (user_id, post_id)
	);",
	"CREATE INDEX post_subscriptions_post_id_index ON post_subscriptions (post_id, user_id);",
	"CREATE TABLE notifications (
		id UUID PRIMARY KEY,
		user_id UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
		kind notification_kind NOT NULL,
		actor_user_ids UUID[] NOT NULL,
		post_id UUID REFERENCES posts (id) ON DELETE CASCADE,
		read_at TIMESTAMPTZ,
		issued_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
		CHECK ((kind = 'follow') = (post_id IS NULL))
	);",
	"CREATE UNIQUE INDEX notifications_unread_unscoped_index ON notifications (user_id, kind) WHERE post_id IS NULL AND read_at IS NULL;",
	"CREATE UNIQUE INDEX notifications_unread_scoped_index ON notifications (user_id, kind, post_id) WHERE post_id IS NOT NULL AND read_at IS NULL;",
	"CREATE INDEX notifications_user_id_index ON notifications (user_id, issued_at DESC, id DESC);",
];

const DOWN: &[&str] = &[
	"DROP TABLE IF EXISTS notifications;",
	"DROP TABLE IF EXISTS post_subscriptions;",
	"DROP TABLE IF EXISTS follows;",
	"DROP TABLE IF EXISTS timeline;",
	"DROP TABLE IF EXISTS comments;",
	"DROP TABLE IF EXISTS posts;",
	"DROP TABLE IF EXISTS users;",
	"DROP TYPE IF EXISTS notification_kind;",
];

#[async_trait::async_trait]
impl<S: FeedGlobal> Migration<S> for InitialMigration {
	fn name(&self) -> &'static str {
		"InitialMigration"
	}

	fn version(&self) -> i32 {
		1
	}

	async fn up(&self, _: &Arc<S>, tx: &Transaction<'_>) -> anyhow::Result<()> {
		for statement in UP {
			utils::database::query(statement).build().execute(tx).await?;
		}

		Ok(())
	}

	async fn down(&self, _: &Arc<S>, tx: &Transaction<'_>) -> anyhow::Result<()> {
		for statement in DOWN {
			utils::database::query(statement).build().execute(tx).await?;
		}

		Ok(())
	}
}
