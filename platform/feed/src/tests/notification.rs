use std::collections::HashSet;
use std::time::Duration;

use futures::StreamExt;
use serial_test::serial;

use super::global::{create_users, mock_global_state, test_config, viewer};
use crate::database::NotificationKind;
use crate::error::FeedError;
use crate::fanout::create_post;
use crate::follow::{follow_user, unfollow_user};
use crate::notification::{mark_all_read, mark_read, notification_stream, notifications, unread_count};

#[serial]
#[tokio::test]
async fn test_serial_follows_merge_most_recent_first() {
	let (global, _handler) = mock_global_state(test_config()).await;

	let users = create_users(&global, &["target", "actor_1", "actor_2", "actor_3", "actor_4", "actor_5"]).await;
	let target = &users[0];

	for actor in &users[1..] {
		follow_user(&global, &viewer(actor), target.id).await.unwrap();
	}

	let page = notifications(&global, &viewer(target), None, None).await.unwrap();
	assert_eq!(page.items.len(), 1);

	let notification = &page.items[0];
	assert_eq!(notification.kind, NotificationKind::Follow);
	assert_eq!(notification.post_id, None);
	assert!(!notification.is_read());

	let expected = users[1..].iter().rev().map(|user| user.id).collect::<Vec<_>>();
	assert_eq!(notification.actor_user_ids, expected);
}

#[serial]
#[tokio::test]
async fn test_serial_refollow_moves_actor_to_front() {
	let (global, _handler) = mock_global_state(test_config()).await;

	let users = create_users(&global, &["target", "first", "second"]).await;
	let (target, first, second) = (&users[0], &users[1], &users[2]);

	follow_user(&global, &viewer(first), target.id).await.unwrap();
	follow_user(&global, &viewer(second), target.id).await.unwrap();
	unfollow_user(&global, &viewer(first), target.id).await.unwrap();
	follow_user(&global, &viewer(first), target.id).await.unwrap();

	let page = notifications(&global, &viewer(target), None, None).await.unwrap();
	assert_eq!(page.items.len(), 1);
	assert_eq!(page.items[0].actor_user_ids, vec![first.id, second.id]);
}

#[serial]
#[tokio::test]
async fn test_serial_concurrent_follows_keep_every_actor() {
	let (global, _handler) = mock_global_state(test_config()).await;

	let users = create_users(&global, &["popular", "fan_1", "fan_2", "fan_3", "fan_4", "fan_5"]).await;
	let target = users[0].id;

	let fans = users[1..].iter().map(viewer).collect::<Vec<_>>();
	let results = futures::future::join_all(fans.iter().map(|fan| follow_user(&global, fan, target))).await;
	assert!(results.into_iter().all(|result| result.unwrap()));

	let page = notifications(&global, &viewer(&users[0]), None, None).await.unwrap();
	assert_eq!(page.items.len(), 1);

	let actors = page.items[0].actor_user_ids.iter().copied().collect::<HashSet<_>>();
	assert_eq!(actors.len(), page.items[0].actor_user_ids.len());
	assert_eq!(actors, users[1..].iter().map(|user| user.id).collect::<HashSet<_>>());
	assert_eq!(crate::users::user(&global, target).await.unwrap().followers_count, 5);
}

#[serial]
#[tokio::test]
async fn test_serial_read_notifications_are_not_merged() {
	let (global, _handler) = mock_global_state(test_config()).await;

	let users = create_users(&global, &["reader", "early", "late"]).await;
	let (reader, early, late) = (&users[0], &users[1], &users[2]);

	follow_user(&global, &viewer(early), reader.id).await.unwrap();

	let first = notifications(&global, &viewer(reader), None, None).await.unwrap().items[0].clone();
	let read = mark_read(&global, &viewer(reader), first.id).await.unwrap();
	assert!(read.is_read());

	// marking again keeps the first timestamp
	let again = mark_read(&global, &viewer(reader), first.id).await.unwrap();
	assert_eq!(again.read_at, read.read_at);

	follow_user(&global, &viewer(late), reader.id).await.unwrap();

	let page = notifications(&global, &viewer(reader), None, None).await.unwrap();
	assert_eq!(page.items.len(), 2);
	assert_eq!(page.items[0].actor_user_ids, vec![late.id]);
	assert!(!page.items[0].is_read());
	assert_eq!(page.items[1].id, first.id);
	assert_eq!(page.items[1].actor_user_ids, vec![early.id]);

	assert_eq!(unread_count(&global, &viewer(reader)).await.unwrap(), 1);
	assert_eq!(mark_all_read(&global, &viewer(reader)).await.unwrap(), 1);
	assert_eq!(unread_count(&global, &viewer(reader)).await.unwrap(), 0);
}

#[serial]
#[tokio::test]
async fn test_serial_mark_read_is_scoped_to_the_recipient() {
	let (global, _handler) = mock_global_state(test_config()).await;

	let users = create_users(&global, &["owner", "snoop"]).await;
	follow_user(&global, &viewer(&users[1]), users[0].id).await.unwrap();

	let notification = notifications(&global, &viewer(&users[0]), None, None).await.unwrap().items[0].id;

	assert!(matches!(
		mark_read(&global, &viewer(&users[1]), notification).await,
		Err(FeedError::NotificationNotFound)
	));
	assert_eq!(unread_count(&global, &viewer(&users[0])).await.unwrap(), 1);
}

#[serial]
#[tokio::test]
async fn test_serial_post_mentions() {
	let (global, _handler) = mock_global_state(test_config()).await;

	let users = create_users(&global, &["author", "Mentioned", "bystander"]).await;
	let (author, mentioned, bystander) = (&users[0], &users[1], &users[2]);

	let post = create_post(&global, &viewer(author), "hi @mentioned and @author, not @nobody_here")
		.await
		.unwrap();

	let page = notifications(&global, &viewer(mentioned), None, None).await.unwrap();
	assert_eq!(page.items.len(), 1);
	assert_eq!(page.items[0].kind, NotificationKind::PostMention);
	assert_eq!(page.items[0].post_id, Some(post.id));
	assert_eq!(page.items[0].actor_user_ids, vec![author.id]);

	assert!(notifications(&global, &viewer(author), None, None).await.unwrap().items.is_empty());
	assert!(notifications(&global, &viewer(bystander), None, None).await.unwrap().items.is_empty());
}

#[serial]
#[tokio::test]
async fn test_serial_notification_pagination_is_gap_free() {
	let (global, _handler) = mock_global_state(test_config()).await;

	let users = create_users(&global, &["celebrity", "chatty"]).await;
	for i in 0..7 {
		create_post(&global, &viewer(&users[1]), &format!("@celebrity number {i}"))
			.await
			.unwrap();
	}

	let everything = notifications(&global, &viewer(&users[0]), Some(100), None).await.unwrap();
	assert_eq!(everything.items.len(), 7);

	let mut collected = Vec::new();
	let mut before = None;
	loop {
		let page = notifications(&global, &viewer(&users[0]), Some(2), before.as_deref())
			.await
			.unwrap();
		collected.extend(page.items.iter().map(|item| item.id));

		if !page.has_more {
			break;
		}

		before = page.end_cursor;
	}

	assert_eq!(collected, everything.items.iter().map(|item| item.id).collect::<Vec<_>>());
}

#[serial]
#[tokio::test]
async fn test_serial_notification_stream() {
	let (global, handler) = mock_global_state(test_config()).await;

	let users = create_users(&global, &["listener", "newcomer"]).await;

	let (ctx, stream_handler) = handler.new_child();
	let mut stream = notification_stream(&global, &viewer(&users[0]), ctx).await.unwrap();

	follow_user(&global, &viewer(&users[1]), users[0].id).await.unwrap();

	let event = tokio::time::timeout(Duration::from_secs(5), stream.next())
		.await
		.unwrap()
		.unwrap();
	assert_eq!(event.kind, "follow");
	assert_eq!(event.actor_ids, vec![crate::pb::Ulid::from(users[1].id)]);
	assert_eq!(event.read_at, None);

	stream_handler.shutdown().await;
	assert!(stream.next().await.is_none());
}
