// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{greeting, setup, Greeting, RecordingHandler};
use chrono::Duration;
use sea_orm::{EntityTrait, PaginatorTrait};
use taskbus::domain::repositories::task_repository::{RepositoryError, TaskRepository};
use taskbus::domain::services::{Payload, TaskRegistry};
use taskbus::infrastructure::database::entities::task as task_entity;
use taskbus::queue::{QueueError, RunOutcome};

#[tokio::test]
async fn test_publish_task_writes_eligible_row() {
    let queue = setup().await;

    let published = queue
        .publisher()
        .publish_task(&greeting("x"))
        .await
        .unwrap();

    let task = queue.reload(&published).await;
    assert_eq!(task.task_type, Greeting::TYPE);
    assert_eq!(
        serde_json::from_slice::<Greeting>(&task.payload).unwrap(),
        greeting("x")
    );
    assert_eq!(task.created_at, queue.now());
    assert_eq!(task.next_run_at, Some(queue.now()));
    assert_eq!(task.fail_count, 0);
    assert!(!task.completed && !task.dead);
    assert!(task.optional_hash.is_none());
    assert!(task.started_at.is_none());
    assert!(task.executor_instance_id.is_none());
    assert!(task.is_eligible(queue.now()));
}

#[tokio::test]
async fn test_duplicate_hash_is_rejected() {
    let queue = setup().await;
    let publisher = queue.publisher();

    publisher
        .publish_task_with_hash(&greeting("x"), "h1")
        .await
        .unwrap();
    let second = publisher
        .publish_task_with_hash(&greeting("y"), "h1")
        .await;

    assert!(matches!(
        second,
        Err(QueueError::Repository(RepositoryError::DuplicateIdempotencyKey(ref hash))) if hash == "h1"
    ));

    let rows = task_entity::Entity::find()
        .count(queue.db.as_ref())
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn test_unhashed_publishes_never_conflict() {
    let queue = setup().await;
    let publisher = queue.publisher();

    for _ in 0..5 {
        publisher.publish_task(&greeting("same")).await.unwrap();
    }

    let counts = queue.repo.count_by_state().await.unwrap();
    assert_eq!(counts.scheduled, 5);
}

#[tokio::test]
async fn test_hash_is_kept_after_completion() {
    let queue = setup().await;
    let publisher = queue.publisher();
    let runner = queue.runner(TaskRegistry::new().register::<Greeting, _>(RecordingHandler::default()));

    publisher
        .publish_task_with_hash(&greeting("once"), "replay-guard")
        .await
        .unwrap();
    assert_eq!(runner.run_once().await.unwrap(), Some(RunOutcome::Completed));

    let again = publisher
        .publish_task_with_hash(&greeting("once"), "replay-guard")
        .await;
    assert!(matches!(
        again,
        Err(QueueError::Repository(RepositoryError::DuplicateIdempotencyKey(_)))
    ));
}

#[tokio::test]
async fn test_publish_task_at_delays_eligibility() {
    let queue = setup().await;
    let run_at = queue.now() + Duration::minutes(15);

    let published = queue
        .publisher()
        .publish_task_at(&greeting("later"), run_at)
        .await
        .unwrap();
    assert_eq!(published.next_run_at, Some(run_at));
    assert_eq!(published.created_at, queue.now());

    assert!(!queue.repo.has_pending().await.unwrap());
    assert!(queue.repo.lease_next("runner-a").await.unwrap().is_none());

    queue.clock.set(run_at);
    let leased = queue.repo.lease_next("runner-a").await.unwrap().unwrap();
    assert_eq!(leased.id, published.id);
}
