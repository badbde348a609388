//! Tests for SQLite repository implementation.

use std::sync::Arc;

use revassign_core::{
    timestamp_now, ErrorKind, PullRequest, PullRequestId, PullRequestStatus, TeamMember, User,
    UserId,
};
use rusqlite::params;

use super::{SqliteRepository, CURRENT_SCHEMA_VERSION};
use crate::repository::{InMemoryRepository, PullRequestStore, RepositoryError, TeamDirectory};

fn member(id: &str, username: &str, is_active: bool) -> TeamMember {
    TeamMember {
        user_id: Some(UserId::from(id)),
        username: username.to_string(),
        is_active,
    }
}

fn open_pr(id: &str, author: &str, reviewers: &[&str]) -> PullRequest {
    PullRequest::open(
        PullRequestId::from(id),
        format!("PR {}", id),
        UserId::from(author),
        reviewers.iter().map(|r| UserId::from(*r)).collect(),
        timestamp_now(),
    )
}

async fn repo_with_team() -> SqliteRepository {
    let repo = SqliteRepository::new_in_memory().unwrap();
    repo.create_team(
        "core",
        vec![
            member("a", "alice", true),
            member("b", "bob", true),
            member("c", "carol", true),
            member("d", "dave", false),
        ],
    )
    .await
    .unwrap();
    repo
}

#[tokio::test]
async fn test_schema_version_recorded() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let conn = repo.conn.lock().unwrap();
    let version: i64 = conn
        .query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(version, CURRENT_SCHEMA_VERSION);
}

#[tokio::test]
async fn test_newer_schema_version_is_rejected() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");

    {
        let repo = SqliteRepository::new(&db_path).unwrap();
        let conn = repo.conn.lock().unwrap();
        conn.execute(
            "UPDATE schema_version SET version = ?1 WHERE id = 1",
            params![CURRENT_SCHEMA_VERSION + 1],
        )
        .unwrap();
    }

    assert!(SqliteRepository::new(&db_path).is_err());
}

#[tokio::test]
async fn test_create_then_get_preserves_reviewer_order() {
    let repo = repo_with_team().await;
    let pr = open_pr("p1", "a", &["c", "b"]);

    repo.create(&pr).await.unwrap();
    let stored = repo.get(&pr.id).await.unwrap();

    assert_eq!(stored, pr);
    assert_eq!(stored.reviewers, vec![UserId::from("c"), UserId::from("b")]);
}

#[tokio::test]
async fn test_get_missing_pull_request() {
    let repo = repo_with_team().await;
    let err = repo.get(&PullRequestId::from("nope")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_duplicate_create_keeps_original_reviewers() {
    let repo = repo_with_team().await;
    repo.create(&open_pr("p1", "a", &["b", "c"])).await.unwrap();

    let err = repo.create(&open_pr("p1", "b", &["a"])).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    let stored = repo.get(&PullRequestId::from("p1")).await.unwrap();
    assert_eq!(stored.author_id, UserId::from("a"));
    assert_eq!(stored.reviewers, vec![UserId::from("b"), UserId::from("c")]);
}

#[tokio::test]
async fn test_create_with_unknown_author() {
    let repo = repo_with_team().await;
    let err = repo.create(&open_pr("p1", "ghost", &[])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_create_with_unknown_reviewer_rolls_back() {
    let repo = repo_with_team().await;

    let err = repo.create(&open_pr("p1", "a", &["b", "ghost"])).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    let missing = repo.get(&PullRequestId::from("p1")).await.unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_concurrent_creates_with_same_id() {
    let repo = Arc::new(repo_with_team().await);

    let handles: Vec<_> = ["b", "c"]
        .into_iter()
        .map(|reviewer| {
            let repo = repo.clone();
            tokio::spawn(async move { repo.create(&open_pr("p1", "a", &[reviewer])).await })
        })
        .collect();

    let mut successes = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => successes += 1,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => conflicts += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(conflicts, 1);
}

#[tokio::test]
async fn test_save_replaces_reviewer_rows() {
    let repo = repo_with_team().await;
    let mut pr = open_pr("p1", "a", &["b", "c"]);
    repo.create(&pr).await.unwrap();

    pr.reviewers[0] = UserId::from("d");
    repo.save(&pr).await.unwrap();

    let stored = repo.get(&pr.id).await.unwrap();
    assert_eq!(stored.reviewers, vec![UserId::from("d"), UserId::from("c")]);

    let conn = repo.conn.lock().unwrap();
    let rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM pull_request_reviewers WHERE pull_request_id = 'p1'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(rows, 2);
}

#[tokio::test]
async fn test_save_missing_pull_request() {
    let repo = repo_with_team().await;
    let err = repo.save(&open_pr("p1", "a", &[])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_save_cannot_reopen_merged() {
    let repo = repo_with_team().await;
    let mut snapshot = open_pr("p1", "a", &["b"]);
    repo.create(&snapshot).await.unwrap();
    repo.merge(&snapshot.id).await.unwrap();

    snapshot.reviewers = vec![UserId::from("c")];
    let err = repo.save(&snapshot).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PullRequestMerged);
    let stored = repo.get(&snapshot.id).await.unwrap();
    assert_eq!(stored.status, PullRequestStatus::Merged);
    assert_eq!(stored.reviewers, vec![UserId::from("b")]);
}

#[tokio::test]
async fn test_merge_sets_timestamp_once() {
    let repo = repo_with_team().await;
    let id = PullRequestId::from("p1");
    repo.create(&open_pr("p1", "a", &["b"])).await.unwrap();

    repo.merge(&id).await.unwrap();
    let first = repo.get(&id).await.unwrap();
    repo.merge(&id).await.unwrap();
    let second = repo.get(&id).await.unwrap();

    assert_eq!(first.status, PullRequestStatus::Merged);
    assert!(first.merged_at.is_some());
    assert_eq!(first.merged_at, second.merged_at);
}

#[tokio::test]
async fn test_merge_missing_pull_request() {
    let repo = repo_with_team().await;
    let err = repo.merge(&PullRequestId::from("nope")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_active_teammates() {
    let repo = repo_with_team().await;

    let teammates = repo
        .active_teammates(&UserId::from("a"), &[UserId::from("b")])
        .await
        .unwrap();

    let ids: Vec<_> = teammates.into_iter().map(|u| u.id).collect();
    assert_eq!(ids, vec![UserId::from("c")]);
}

#[tokio::test]
async fn test_active_teammates_without_team() {
    let repo = repo_with_team().await;
    {
        let conn = repo.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO users (user_id, username, is_active, team_id) VALUES ('loner', 'lone', 1, NULL)",
            [],
        )
        .unwrap();
    }

    let err = repo
        .active_teammates(&UserId::from("loner"), &[])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_create_team_twice_fails() {
    let repo = repo_with_team().await;
    let err = repo.create_team("core", vec![]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TeamExists);
}

#[tokio::test]
async fn test_create_team_with_taken_username_rolls_back() {
    let repo = repo_with_team().await;

    let err = repo
        .create_team(
            "platform",
            vec![member("x", "xavier", true), member("y", "alice", true)],
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UserExists);
    let missing = repo.get_team("platform").await.unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
    let missing_user = repo.get_user(&UserId::from("x")).await.unwrap_err();
    assert_eq!(missing_user.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_create_team_moves_existing_user_and_generates_ids() {
    let repo = repo_with_team().await;
    let newcomer = TeamMember {
        user_id: None,
        username: "erin".to_string(),
        is_active: true,
    };

    let team = repo
        .create_team("platform", vec![member("b", "bob", false), newcomer])
        .await
        .unwrap();

    assert_eq!(team.members.len(), 2);
    assert_eq!(team.members[0].id, UserId::from("b"));
    assert!(!team.members[0].is_active);
    assert!(!team.members[1].id.as_str().is_empty());
    assert_eq!(team.members[1].team_name.as_deref(), Some("platform"));

    let core = repo.get_team("core").await.unwrap();
    let names: Vec<_> = core.members.iter().map(|m| m.username.as_str()).collect();
    assert_eq!(names, vec!["alice", "carol", "dave"]);
}

/// Rename `a` and hand its old username to a newcomer in one batch.
async fn rename_and_reuse(directory: &dyn TeamDirectory) -> Result<Vec<User>, RepositoryError> {
    let newcomer = TeamMember {
        user_id: None,
        username: "alice".to_string(),
        is_active: true,
    };
    directory
        .create_team("platform", vec![member("a", "zed", true), newcomer])
        .await
        .map(|team| team.members)
}

#[tokio::test]
async fn test_create_team_reuses_username_freed_in_same_batch() {
    let sqlite = repo_with_team().await;
    let memory = InMemoryRepository::new();
    memory
        .create_team("core", vec![member("a", "alice", true), member("b", "bob", true)])
        .await
        .unwrap();

    for directory in [&sqlite as &dyn TeamDirectory, &memory] {
        let members = rename_and_reuse(directory).await.unwrap();
        let names: Vec<_> = members.iter().map(|m| m.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "zed"]);
        assert_ne!(members[0].id, UserId::from("a"));

        let renamed = directory.get_user(&UserId::from("a")).await.unwrap();
        assert_eq!(renamed.username, "zed");
        assert_eq!(renamed.team_name.as_deref(), Some("platform"));
    }
}

#[tokio::test]
async fn test_create_team_cannot_take_name_before_it_is_freed() {
    let sqlite = repo_with_team().await;
    let memory = InMemoryRepository::new();
    memory
        .create_team("core", vec![member("a", "alice", true)])
        .await
        .unwrap();

    for directory in [&sqlite as &dyn TeamDirectory, &memory] {
        let newcomer = TeamMember {
            user_id: None,
            username: "alice".to_string(),
            is_active: true,
        };
        let err = directory
            .create_team("platform", vec![newcomer, member("a", "zed", true)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UserExists);

        let untouched = directory.get_user(&UserId::from("a")).await.unwrap();
        assert_eq!(untouched.username, "alice");
        assert_eq!(untouched.team_name.as_deref(), Some("core"));
        let missing = directory.get_team("platform").await.unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }
}

#[tokio::test]
async fn test_deactivate_team() {
    let repo = repo_with_team().await;

    let team = repo.deactivate_team("core").await.unwrap();

    assert_eq!(team.members.len(), 4);
    assert!(team.members.iter().all(|m| !m.is_active));
    let err = repo.deactivate_team("nope").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_set_user_active() {
    let repo = repo_with_team().await;

    let user = repo.set_user_active(&UserId::from("d"), true).await.unwrap();

    assert!(user.is_active);
    assert_eq!(user.team_name.as_deref(), Some("core"));
    let err = repo
        .set_user_active(&UserId::from("ghost"), false)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_list_for_reviewer() {
    let repo = repo_with_team().await;
    repo.create(&open_pr("p2", "a", &["b", "c"])).await.unwrap();
    repo.create(&open_pr("p1", "c", &["b"])).await.unwrap();
    repo.create(&open_pr("p3", "a", &["c"])).await.unwrap();
    repo.merge(&PullRequestId::from("p1")).await.unwrap();

    let prs = repo.list_for_reviewer(&UserId::from("b")).await.unwrap();

    let summary: Vec<_> = prs.iter().map(|p| (p.id.as_str(), p.status)).collect();
    assert_eq!(
        summary,
        vec![("p1", PullRequestStatus::Merged), ("p2", PullRequestStatus::Open)]
    );
    let err = repo
        .list_for_reviewer(&UserId::from("ghost"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// =========================================================================
// On-disk persistence tests
// =========================================================================

/// Pull requests and teams survive closing and reopening the database.
#[tokio::test]
async fn test_on_disk_persistence_basic() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("nested").join("test.db");
    let pr = open_pr("p1", "a", &["b", "c"]);

    {
        let repo = SqliteRepository::new(&db_path).unwrap();
        repo.create_team(
            "core",
            vec![
                member("a", "alice", true),
                member("b", "bob", true),
                member("c", "carol", true),
            ],
        )
        .await
        .unwrap();
        repo.create(&pr).await.unwrap();
        repo.merge(&pr.id).await.unwrap();
        // repo is dropped here
    }

    {
        let repo = SqliteRepository::new(&db_path).unwrap();
        let stored = repo.get(&pr.id).await.unwrap();
        assert_eq!(stored.status, PullRequestStatus::Merged);
        assert_eq!(stored.reviewers, pr.reviewers);
        assert_eq!(stored.created_at, pr.created_at);
        assert_eq!(repo.get_team("core").await.unwrap().members.len(), 3);
    }
}
