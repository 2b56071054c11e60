// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::setup;
use chrono::Duration;
use taskbus::domain::models::task::{Task, TaskState};
use taskbus::domain::repositories::task_repository::{
    QueueCounts, RepositoryError, TaskRepository,
};

fn task(queue: &super::helpers::TestQueue, task_type: &str) -> Task {
    Task::new(task_type, b"{}".to_vec(), queue.now())
}

#[tokio::test]
async fn test_save_assigns_id_and_persists_fields() {
    let queue = setup().await;

    let saved = queue
        .insert(task(&queue, "demo.v1").with_hash("abc"))
        .await;
    let id = saved.id.expect("store assigns an id");

    let found = queue.repo.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(found.task_type, "demo.v1");
    assert_eq!(found.payload, b"{}".to_vec());
    assert_eq!(found.created_at, queue.now());
    assert_eq!(found.next_run_at, Some(queue.now()));
    assert_eq!(found.optional_hash.as_deref(), Some("abc"));
    assert_eq!(found.fail_count, 0);
    assert_eq!(found.state(), TaskState::Scheduled);

    assert!(queue.repo.find_by_id(id + 100).await.unwrap().is_none());
}

#[tokio::test]
async fn test_lease_next_prefers_earliest_due_then_lowest_id() {
    let queue = setup().await;
    let now = queue.now();

    let late = queue
        .insert(task(&queue, "demo.v1").run_at(now - Duration::minutes(1)))
        .await;
    let early_a = queue
        .insert(task(&queue, "demo.v1").run_at(now - Duration::minutes(2)))
        .await;
    let early_b = queue
        .insert(task(&queue, "demo.v1").run_at(now - Duration::minutes(2)))
        .await;
    queue
        .insert(task(&queue, "demo.v1").run_at(now + Duration::minutes(5)))
        .await;

    let mut order = Vec::new();
    while let Some(leased) = queue.repo.lease_next("runner-a").await.unwrap() {
        order.push(leased.id);
    }

    assert_eq!(order, vec![early_a.id, early_b.id, late.id]);
}

#[tokio::test]
async fn test_lease_next_records_lease_fields() {
    let queue = setup().await;
    let saved = queue.insert(task(&queue, "demo.v1")).await;

    let leased = queue.repo.lease_next("runner-a").await.unwrap().unwrap();
    assert_eq!(leased.id, saved.id);
    assert_eq!(leased.started_at, Some(queue.now()));
    assert_eq!(leased.heartbeat, Some(queue.now()));
    assert_eq!(leased.executor_instance_id.as_deref(), Some("runner-a"));
    assert_eq!(leased.state(), TaskState::Leased);

    // Leased rows are not handed out twice
    assert!(queue.repo.lease_next("runner-b").await.unwrap().is_none());
}

#[tokio::test]
async fn test_mark_completed_is_terminal() {
    let queue = setup().await;
    let saved = queue.insert(task(&queue, "demo.v1")).await;
    let id = saved.id.unwrap();

    queue.repo.lease_next("runner-a").await.unwrap().unwrap();
    queue.repo.mark_completed(id).await.unwrap();

    let completed = queue.reload(&saved).await;
    assert!(completed.completed);
    assert_eq!(completed.completed_at, Some(queue.now()));
    assert!(completed.started_at.is_none());
    assert!(completed.heartbeat.is_none());
    assert!(completed.executor_instance_id.is_none());
    assert_eq!(completed.state(), TaskState::Completed);

    // Completing again is a no-op
    queue.repo.mark_completed(id).await.unwrap();

    queue.clock.advance(Duration::days(30));
    assert!(queue.repo.lease_next("runner-a").await.unwrap().is_none());
    assert!(!queue.repo.has_pending().await.unwrap());
}

#[tokio::test]
async fn test_mark_completed_missing_task() {
    let queue = setup().await;

    let result = queue.repo.mark_completed(42).await;
    assert!(matches!(result, Err(RepositoryError::NotFound)));
}

#[tokio::test]
async fn test_save_refuses_to_rewrite_terminal_rows() {
    let queue = setup().await;
    let saved = queue.insert(task(&queue, "demo.v1")).await;
    queue.repo.mark_completed(saved.id.unwrap()).await.unwrap();

    let mut stale = saved.clone();
    stale.next_run_at = Some(queue.now() + Duration::minutes(1));

    let result = queue.repo.save(&stale).await;
    assert!(matches!(result, Err(RepositoryError::TerminalTask(id)) if Some(id) == saved.id));

    let reloaded = queue.reload(&saved).await;
    assert!(reloaded.completed);
}

#[tokio::test]
async fn test_save_update_of_missing_row() {
    let queue = setup().await;

    let mut ghost = task(&queue, "demo.v1");
    ghost.id = Some(999);

    let result = queue.repo.save(&ghost).await;
    assert!(matches!(result, Err(RepositoryError::NotFound)));
}

#[tokio::test]
async fn test_duplicate_hash_is_rejected() {
    let queue = setup().await;
    queue.insert(task(&queue, "demo.v1").with_hash("h1")).await;

    let result = queue
        .repo
        .save(&task(&queue, "demo.v1").with_hash("h1"))
        .await;
    assert!(matches!(
        result,
        Err(RepositoryError::DuplicateIdempotencyKey(ref hash)) if hash == "h1"
    ));

    // Unhashed rows never conflict
    for _ in 0..3 {
        queue.insert(task(&queue, "demo.v1")).await;
    }

    let counts = queue.repo.count_by_state().await.unwrap();
    assert_eq!(counts.scheduled, 4);
}

#[tokio::test]
async fn test_update_heartbeat_only_touches_own_leases() {
    let queue = setup().await;
    let first = queue.insert(task(&queue, "demo.v1")).await;
    let second = queue.insert(task(&queue, "demo.v1")).await;
    let idle = queue.insert(task(&queue, "demo.v1").run_at(queue.now() + Duration::hours(1))).await;

    queue.repo.lease_next("runner-a").await.unwrap().unwrap();
    queue.repo.lease_next("runner-b").await.unwrap().unwrap();

    let leased_at = queue.now();
    queue.clock.advance(Duration::seconds(30));

    assert_eq!(queue.repo.update_heartbeat("runner-a").await.unwrap(), 1);
    assert_eq!(queue.repo.update_heartbeat("runner-c").await.unwrap(), 0);

    assert_eq!(queue.reload(&first).await.heartbeat, Some(queue.now()));
    assert_eq!(queue.reload(&second).await.heartbeat, Some(leased_at));
    assert!(queue.reload(&idle).await.heartbeat.is_none());
}

#[tokio::test]
async fn test_reclaim_stale_releases_only_stale_leases() {
    let queue = setup().await;
    let crashed = queue.insert(task(&queue, "demo.v1")).await;
    let alive = queue.insert(task(&queue, "demo.v1")).await;

    queue.repo.lease_next("crashed-runner").await.unwrap().unwrap();
    queue.repo.lease_next("live-runner").await.unwrap().unwrap();

    queue.clock.advance(Duration::minutes(10));
    queue.repo.update_heartbeat("live-runner").await.unwrap();

    let threshold = queue.now() - Duration::minutes(5);
    assert_eq!(queue.repo.reclaim_stale(threshold).await.unwrap(), 1);

    let reclaimed = queue.reload(&crashed).await;
    assert!(reclaimed.started_at.is_none());
    assert!(reclaimed.heartbeat.is_none());
    assert!(reclaimed.executor_instance_id.is_none());
    assert_eq!(reclaimed.fail_count, 0);

    let still_leased = queue.reload(&alive).await;
    assert_eq!(
        still_leased.executor_instance_id.as_deref(),
        Some("live-runner")
    );

    let re_leased = queue.repo.lease_next("rescuer").await.unwrap().unwrap();
    assert_eq!(re_leased.id, crashed.id);
}

#[tokio::test]
async fn test_settle_failure_requires_lease_owner() {
    let queue = setup().await;
    let saved = queue.insert(task(&queue, "demo.v1")).await;

    let mut late = queue.repo.lease_next("runner-a").await.unwrap().unwrap();
    queue.clock.advance(Duration::minutes(10));
    let threshold = queue.now() - Duration::minutes(5);
    assert_eq!(queue.repo.reclaim_stale(threshold).await.unwrap(), 1);
    queue.repo.lease_next("runner-b").await.unwrap().unwrap();

    // runner-a fails after losing its lease
    late.record_failure("boom".to_string(), "boom".to_string());
    late.reschedule(queue.now());
    assert!(!queue.repo.settle_failure(&late, "runner-a").await.unwrap());

    let row = queue.reload(&saved).await;
    assert_eq!(row.executor_instance_id.as_deref(), Some("runner-b"));
    assert_eq!(row.started_at, Some(queue.now()));
    assert_eq!(row.heartbeat, Some(queue.now()));
    assert_eq!(row.fail_count, 0);
    assert!(row.error_message.is_none());
    assert!(!row.is_eligible(queue.now()));
    assert!(queue.repo.lease_next("runner-c").await.unwrap().is_none());

    // The owner's write goes through
    let mut owned = row.clone();
    owned.record_failure("boom".to_string(), "trace".to_string());
    owned.bury();
    assert!(queue.repo.settle_failure(&owned, "runner-b").await.unwrap());

    let buried = queue.reload(&saved).await;
    assert!(buried.dead);
    assert_eq!(buried.fail_count, 1);
    assert!(buried.next_run_at.is_none());
    assert!(buried.executor_instance_id.is_none());
    assert!(buried.started_at.is_none());

    // Terminal rows are never settled again
    assert!(!queue.repo.settle_failure(&owned, "runner-b").await.unwrap());
}

#[tokio::test]
async fn test_reclaim_stale_ignores_terminal_rows() {
    let queue = setup().await;
    let saved = queue.insert(task(&queue, "demo.v1")).await;
    queue.repo.lease_next("runner-a").await.unwrap().unwrap();
    queue.repo.mark_completed(saved.id.unwrap()).await.unwrap();

    queue.clock.advance(Duration::hours(1));
    assert_eq!(queue.repo.reclaim_stale(queue.now()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_has_pending_tracks_eligibility() {
    let queue = setup().await;
    assert!(!queue.repo.has_pending().await.unwrap());

    queue
        .insert(task(&queue, "demo.v1").run_at(queue.now() + Duration::minutes(1)))
        .await;
    assert!(!queue.repo.has_pending().await.unwrap());

    queue.clock.advance(Duration::minutes(1));
    assert!(queue.repo.has_pending().await.unwrap());

    queue.repo.lease_next("runner-a").await.unwrap().unwrap();
    assert!(!queue.repo.has_pending().await.unwrap());
}

#[tokio::test]
async fn test_find_dead_and_count_by_state() {
    let queue = setup().await;

    let mut buried = Vec::new();
    for _ in 0..3 {
        let mut saved = queue.insert(task(&queue, "demo.v1")).await;
        saved.record_failure("boom".to_string(), "boom".to_string());
        saved.bury();
        buried.push(queue.repo.save(&saved).await.unwrap());
    }
    let done = queue.insert(task(&queue, "demo.v1")).await;
    queue.repo.mark_completed(done.id.unwrap()).await.unwrap();
    queue.insert(task(&queue, "demo.v1")).await;
    queue.insert(task(&queue, "demo.v1")).await;
    queue.repo.lease_next("runner-a").await.unwrap().unwrap();

    let dead = queue.repo.find_dead(2).await.unwrap();
    let ids: Vec<_> = dead.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![buried[2].id, buried[1].id]);
    assert!(dead.iter().all(|t| t.next_run_at.is_none() && t.dead));

    let counts = queue.repo.count_by_state().await.unwrap();
    assert_eq!(
        counts,
        QueueCounts {
            scheduled: 1,
            leased: 1,
            completed: 1,
            dead: 3,
        }
    );
}
