//! `TeamDirectory` for the SQLite backend.

use async_trait::async_trait;
use revassign_core::{Team, TeamMember, User, UserId};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{error, info};
use uuid::Uuid;

use super::{
    is_unique_violation, log_constraint, user_from_row, SqliteRepository, USER_SELECT,
};
use crate::repository::{validate_new_team, RepositoryError, TeamDirectory};

fn load_team(conn: &Connection, team_name: &str) -> Result<Team, RepositoryError> {
    let team_id: Option<String> = conn
        .query_row(
            "SELECT team_id FROM teams WHERE team_name = ?1",
            params![team_name],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| RepositoryError::storage("get team", e.to_string()))?;

    let Some(team_id) = team_id else {
        return Err(RepositoryError::not_found("team", team_name));
    };

    let mut stmt = conn
        .prepare(&format!("{} WHERE u.team_id = ?1 ORDER BY u.username", USER_SELECT))
        .map_err(|e| RepositoryError::storage("get team members", e.to_string()))?;

    let members = stmt
        .query_map(params![team_id], user_from_row)
        .and_then(|rows| rows.collect::<rusqlite::Result<Vec<User>>>())
        .map_err(|e| RepositoryError::storage("get team members", e.to_string()))?;

    Ok(Team {
        name: team_name.to_string(),
        members,
    })
}

fn load_user(conn: &Connection, user_id: &UserId) -> Result<User, RepositoryError> {
    conn.query_row(
        &format!("{} WHERE u.user_id = ?1", USER_SELECT),
        params![user_id.as_str()],
        user_from_row,
    )
    .optional()
    .map_err(|e| RepositoryError::storage("get user", e.to_string()))?
    .ok_or_else(|| RepositoryError::not_found("user", user_id))
}

#[async_trait]
impl TeamDirectory for SqliteRepository {
    async fn active_teammates(
        &self,
        user_id: &UserId,
        excluding: &[UserId],
    ) -> Result<Vec<User>, RepositoryError> {
        let user_id = user_id.clone();
        let excluding = excluding.to_vec();

        self.with_conn("active teammates", move |conn| {
            let team_id: Option<Option<String>> = conn
                .query_row(
                    "SELECT team_id FROM users WHERE user_id = ?1",
                    params![user_id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| RepositoryError::storage("active teammates", e.to_string()))?;

            let team_id = match team_id {
                None => return Err(RepositoryError::not_found("user", &user_id)),
                Some(None) => return Err(RepositoryError::not_found("team of user", &user_id)),
                Some(Some(team_id)) => team_id,
            };

            let mut stmt = conn
                .prepare(&format!(
                    "{} WHERE u.team_id = ?1 AND u.is_active = 1 AND u.user_id <> ?2
                     ORDER BY u.user_id",
                    USER_SELECT
                ))
                .map_err(|e| RepositoryError::storage("active teammates", e.to_string()))?;

            let teammates = stmt
                .query_map(params![team_id, user_id.as_str()], user_from_row)
                .and_then(|rows| rows.collect::<rusqlite::Result<Vec<User>>>())
                .map_err(|e| RepositoryError::storage("active teammates", e.to_string()))?;

            Ok(teammates
                .into_iter()
                .filter(|u| !excluding.contains(&u.id))
                .collect())
        })
        .await
    }

    async fn create_team(
        &self,
        team_name: &str,
        members: Vec<TeamMember>,
    ) -> Result<Team, RepositoryError> {
        validate_new_team(team_name, &members)?;
        let team_name = team_name.to_string();

        self.with_conn("create team", move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| RepositoryError::storage("create team", e.to_string()))?;

            let team_id = Uuid::new_v4().to_string();
            if let Err(e) = tx.execute(
                "INSERT INTO teams (team_id, team_name) VALUES (?1, ?2)",
                params![team_id, team_name],
            ) {
                if is_unique_violation(&e) {
                    log_constraint("create team", &e);
                    return Err(RepositoryError::TeamExists(team_name));
                }
                error!("Failed to create team {}: {}", team_name, e);
                return Err(RepositoryError::storage("create team", e.to_string()));
            }

            for member in &members {
                let user_id = member
                    .user_id
                    .clone()
                    .unwrap_or_else(|| UserId(Uuid::new_v4().to_string()));

                let upserted = tx.execute(
                    "INSERT INTO users (user_id, username, is_active, team_id)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(user_id) DO UPDATE SET
                         username = excluded.username,
                         is_active = excluded.is_active,
                         team_id = excluded.team_id",
                    params![user_id.as_str(), member.username, member.is_active, team_id],
                );

                if let Err(e) = upserted {
                    if is_unique_violation(&e) {
                        log_constraint("create team member", &e);
                        return Err(RepositoryError::UserExists(member.username.clone()));
                    }
                    error!("Failed to store member {}: {}", user_id, e);
                    return Err(RepositoryError::storage("create team member", e.to_string()));
                }
            }

            tx.commit()
                .map_err(|e| RepositoryError::storage("create team", e.to_string()))?;

            info!("Created team {} with {} members", team_name, members.len());
            load_team(conn, &team_name)
        })
        .await
    }

    async fn get_team(&self, team_name: &str) -> Result<Team, RepositoryError> {
        let team_name = team_name.to_string();
        self.with_conn("get team", move |conn| load_team(conn, &team_name))
            .await
    }

    async fn deactivate_team(&self, team_name: &str) -> Result<Team, RepositoryError> {
        let team_name = team_name.to_string();

        self.with_conn("deactivate team", move |conn| {
            let updated = conn
                .execute(
                    "UPDATE users SET is_active = 0
                     WHERE team_id = (SELECT team_id FROM teams WHERE team_name = ?1)",
                    params![team_name],
                )
                .map_err(|e| RepositoryError::storage("deactivate team", e.to_string()))?;

            let team = load_team(conn, &team_name)?;
            info!("Deactivated {} members of team {}", updated, team_name);
            Ok(team)
        })
        .await
    }

    async fn set_user_active(
        &self,
        user_id: &UserId,
        is_active: bool,
    ) -> Result<User, RepositoryError> {
        let user_id = user_id.clone();

        self.with_conn("set user active", move |conn| {
            let updated = conn
                .execute(
                    "UPDATE users SET is_active = ?2 WHERE user_id = ?1",
                    params![user_id.as_str(), is_active],
                )
                .map_err(|e| RepositoryError::storage("set user active", e.to_string()))?;

            if updated == 0 {
                return Err(RepositoryError::not_found("user", &user_id));
            }
            load_user(conn, &user_id)
        })
        .await
    }

    async fn get_user(&self, user_id: &UserId) -> Result<User, RepositoryError> {
        let user_id = user_id.clone();
        self.with_conn("get user", move |conn| load_user(conn, &user_id))
            .await
    }
}
