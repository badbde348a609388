//! `PullRequestStore` for the SQLite backend.

use async_trait::async_trait;
use revassign_core::{
    timestamp_now, PullRequest, PullRequestId, PullRequestShort, PullRequestStatus, UserId,
};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{error, warn};

use super::{
    from_millis, is_foreign_key_violation, is_unique_violation, log_constraint, slot_to_i64,
    to_millis, user_exists, SqliteRepository,
};
use crate::repository::{PullRequestStore, RepositoryError};

fn parse_status(raw: &str) -> Result<PullRequestStatus, RepositoryError> {
    PullRequestStatus::parse(raw).ok_or_else(|| RepositoryError::corruption("pull request status"))
}

fn pull_request_exists(conn: &Connection, id: &PullRequestId) -> Result<bool, RepositoryError> {
    conn.query_row(
        "SELECT 1 FROM pull_requests WHERE pull_request_id = ?1",
        params![id.as_str()],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(|e| RepositoryError::storage("check pull request", e.to_string()))
}

fn load_pull_request(conn: &Connection, id: &PullRequestId) -> Result<PullRequest, RepositoryError> {
    type PrRow = (String, String, String, i64, Option<i64>);

    let row: Option<PrRow> = conn
        .query_row(
            "SELECT pull_request_name, author_id, status, created_at, merged_at
             FROM pull_requests WHERE pull_request_id = ?1",
            params![id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .optional()
        .map_err(|e| RepositoryError::storage("get pull request", e.to_string()))?;

    let Some((name, author_id, status, created_at, merged_at)) = row else {
        return Err(RepositoryError::not_found("pull request", id));
    };

    let mut stmt = conn
        .prepare(
            "SELECT user_id FROM pull_request_reviewers
             WHERE pull_request_id = ?1 ORDER BY slot",
        )
        .map_err(|e| RepositoryError::storage("get reviewers", e.to_string()))?;
    let reviewers = stmt
        .query_map(params![id.as_str()], |row| row.get::<_, String>(0).map(UserId))
        .and_then(|rows| rows.collect::<rusqlite::Result<Vec<UserId>>>())
        .map_err(|e| RepositoryError::storage("get reviewers", e.to_string()))?;

    Ok(PullRequest {
        id: id.clone(),
        name,
        author_id: UserId(author_id),
        status: parse_status(&status)?,
        reviewers,
        created_at: from_millis(created_at)?,
        merged_at: merged_at.map(from_millis).transpose()?,
    })
}

/// Write the reviewer rows of `pr`, one per slot.
fn insert_reviewers(conn: &Connection, pr: &PullRequest) -> Result<(), RepositoryError> {
    for (slot, reviewer) in pr.reviewers.iter().enumerate() {
        let inserted = conn.execute(
            "INSERT INTO pull_request_reviewers (pull_request_id, user_id, slot)
             VALUES (?1, ?2, ?3)",
            params![pr.id.as_str(), reviewer.as_str(), slot_to_i64(slot)?],
        );

        if let Err(e) = inserted {
            if is_foreign_key_violation(&e) {
                log_constraint("assign reviewer", &e);
                return Err(RepositoryError::not_found("user", reviewer));
            }
            error!("Failed to assign reviewer {} to {}: {}", reviewer, pr.id, e);
            return Err(RepositoryError::storage("assign reviewer", e.to_string()));
        }
    }
    Ok(())
}

#[async_trait]
impl PullRequestStore for SqliteRepository {
    async fn create(&self, pr: &PullRequest) -> Result<(), RepositoryError> {
        let pr = pr.clone();

        self.with_conn("create pull request", move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| RepositoryError::storage("create pull request", e.to_string()))?;

            if !user_exists(&tx, &pr.author_id)? {
                warn!("Author {} of pull request {} not found", pr.author_id, pr.id);
                return Err(RepositoryError::not_found("user", &pr.author_id));
            }

            let inserted = tx.execute(
                "INSERT INTO pull_requests
                     (pull_request_id, pull_request_name, status, created_at, merged_at, author_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    pr.id.as_str(),
                    pr.name,
                    pr.status.as_str(),
                    to_millis(pr.created_at),
                    pr.merged_at.map(to_millis),
                    pr.author_id.as_str()
                ],
            );

            if let Err(e) = inserted {
                if is_unique_violation(&e) {
                    log_constraint("create pull request", &e);
                    return Err(RepositoryError::PullRequestExists(pr.id.clone()));
                }
                error!("Failed to create pull request {}: {}", pr.id, e);
                return Err(RepositoryError::storage("create pull request", e.to_string()));
            }

            insert_reviewers(&tx, &pr)?;

            tx.commit()
                .map_err(|e| RepositoryError::storage("create pull request", e.to_string()))
        })
        .await
    }

    async fn get(&self, id: &PullRequestId) -> Result<PullRequest, RepositoryError> {
        let id = id.clone();
        self.with_conn("get pull request", move |conn| load_pull_request(conn, &id))
            .await
    }

    async fn save(&self, pr: &PullRequest) -> Result<(), RepositoryError> {
        let pr = pr.clone();

        self.with_conn("save pull request", move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| RepositoryError::storage("save pull request", e.to_string()))?;

            // An open snapshot may only land on an open row; a merged snapshot
            // may land on either.
            let updated = tx
                .execute(
                    "UPDATE pull_requests
                     SET pull_request_name = ?2, status = ?3, merged_at = ?4
                     WHERE pull_request_id = ?1 AND (status = 'OPEN' OR ?3 = 'MERGED')",
                    params![
                        pr.id.as_str(),
                        pr.name,
                        pr.status.as_str(),
                        pr.merged_at.map(to_millis)
                    ],
                )
                .map_err(|e| RepositoryError::storage("save pull request", e.to_string()))?;

            if updated == 0 {
                if pull_request_exists(&tx, &pr.id)? {
                    warn!("Refusing to overwrite merged pull request {}", pr.id);
                    return Err(RepositoryError::PullRequestMerged(pr.id.clone()));
                }
                return Err(RepositoryError::not_found("pull request", &pr.id));
            }

            tx.execute(
                "DELETE FROM pull_request_reviewers WHERE pull_request_id = ?1",
                params![pr.id.as_str()],
            )
            .map_err(|e| RepositoryError::storage("clear reviewers", e.to_string()))?;

            insert_reviewers(&tx, &pr)?;

            tx.commit()
                .map_err(|e| RepositoryError::storage("save pull request", e.to_string()))
        })
        .await
    }

    async fn merge(&self, id: &PullRequestId) -> Result<(), RepositoryError> {
        let id = id.clone();
        let merged_at = to_millis(timestamp_now());

        self.with_conn("merge pull request", move |conn| {
            let updated = conn
                .execute(
                    "UPDATE pull_requests SET status = 'MERGED', merged_at = ?2
                     WHERE pull_request_id = ?1 AND status = 'OPEN'",
                    params![id.as_str(), merged_at],
                )
                .map_err(|e| RepositoryError::storage("merge pull request", e.to_string()))?;

            if updated == 0 && !pull_request_exists(conn, &id)? {
                return Err(RepositoryError::not_found("pull request", &id));
            }
            Ok(())
        })
        .await
    }

    async fn list_for_reviewer(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PullRequestShort>, RepositoryError> {
        let user_id = user_id.clone();

        self.with_conn("list reviews", move |conn| {
            if !user_exists(conn, &user_id)? {
                return Err(RepositoryError::not_found("user", &user_id));
            }

            let mut stmt = conn
                .prepare(
                    "SELECT p.pull_request_id, p.pull_request_name, p.author_id, p.status
                     FROM pull_requests p
                     JOIN pull_request_reviewers r ON r.pull_request_id = p.pull_request_id
                     WHERE r.user_id = ?1
                     ORDER BY p.pull_request_id",
                )
                .map_err(|e| RepositoryError::storage("list reviews", e.to_string()))?;

            let rows = stmt
                .query_map(params![user_id.as_str()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })
                .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
                .map_err(|e| RepositoryError::storage("list reviews", e.to_string()))?;

            rows.into_iter()
                .map(|(id, name, author_id, status)| {
                    Ok(PullRequestShort {
                        id: PullRequestId(id),
                        name,
                        author_id: UserId(author_id),
                        status: parse_status(&status)?,
                    })
                })
                .collect()
        })
        .await
    }
}
