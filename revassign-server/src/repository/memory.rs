//! In-memory implementation of the storage contracts.
//!
//! All state lives in a single `RwLock`, so every write (including the
//! existence check of `create`) happens under one guard. State is lost on
//! restart.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use revassign_core::{
    timestamp_now, PullRequest, PullRequestId, PullRequestShort, PullRequestStatus, Team,
    TeamMember, User, UserId,
};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use super::{validate_new_team, PullRequestStore, RepositoryError, TeamDirectory};

#[derive(Default)]
struct Tables {
    teams: HashSet<String>,
    users: HashMap<UserId, User>,
    pull_requests: HashMap<PullRequestId, PullRequest>,
}

impl Tables {
    fn team(&self, team_name: &str) -> Result<Team, RepositoryError> {
        if !self.teams.contains(team_name) {
            return Err(RepositoryError::not_found("team", team_name));
        }

        let mut members: Vec<User> = self
            .users
            .values()
            .filter(|u| u.team_name.as_deref() == Some(team_name))
            .cloned()
            .collect();
        members.sort_by(|a, b| a.username.cmp(&b.username));

        Ok(Team {
            name: team_name.to_string(),
            members,
        })
    }
}

/// In-memory team directory and pull request store.
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TeamDirectory for InMemoryRepository {
    async fn active_teammates(
        &self,
        user_id: &UserId,
        excluding: &[UserId],
    ) -> Result<Vec<User>, RepositoryError> {
        let tables = self.tables.read().await;

        let user = tables
            .users
            .get(user_id)
            .ok_or_else(|| RepositoryError::not_found("user", user_id))?;
        let team_name = user
            .team_name
            .as_deref()
            .ok_or_else(|| RepositoryError::not_found("team of user", user_id))?;

        let mut teammates: Vec<User> = tables
            .users
            .values()
            .filter(|u| u.team_name.as_deref() == Some(team_name))
            .filter(|u| u.is_active && u.id != *user_id && !excluding.contains(&u.id))
            .cloned()
            .collect();
        teammates.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(teammates)
    }

    async fn create_team(
        &self,
        team_name: &str,
        members: Vec<TeamMember>,
    ) -> Result<Team, RepositoryError> {
        validate_new_team(team_name, &members)?;

        let mut tables = self.tables.write().await;

        if tables.teams.contains(team_name) {
            warn!("Team {} already exists", team_name);
            return Err(RepositoryError::TeamExists(team_name.to_string()));
        }

        // Members are checked in order against a scratch view of username
        // ownership, so a member may take a name freed earlier in the same
        // batch. Nothing is written until every member passes.
        let mut owners: HashMap<String, UserId> = tables
            .users
            .values()
            .map(|u| (u.username.clone(), u.id.clone()))
            .collect();
        let mut names: HashMap<UserId, String> = tables
            .users
            .values()
            .map(|u| (u.id.clone(), u.username.clone()))
            .collect();

        let mut resolved: Vec<(UserId, TeamMember)> = Vec::with_capacity(members.len());
        for member in members {
            let id = member
                .user_id
                .clone()
                .unwrap_or_else(|| UserId(Uuid::new_v4().to_string()));

            if let Some(owner) = owners.get(&member.username) {
                if *owner != id {
                    warn!(
                        "Username {} already belongs to user {}",
                        member.username, owner
                    );
                    return Err(RepositoryError::UserExists(member.username));
                }
            }

            if let Some(previous) = names.insert(id.clone(), member.username.clone()) {
                if owners.get(&previous) == Some(&id) {
                    owners.remove(&previous);
                }
            }
            owners.insert(member.username.clone(), id.clone());
            resolved.push((id, member));
        }

        tables.teams.insert(team_name.to_string());
        for (id, member) in resolved {
            tables.users.insert(
                id.clone(),
                User {
                    id,
                    username: member.username,
                    is_active: member.is_active,
                    team_name: Some(team_name.to_string()),
                },
            );
        }

        tables.team(team_name)
    }

    async fn get_team(&self, team_name: &str) -> Result<Team, RepositoryError> {
        let tables = self.tables.read().await;
        tables.team(team_name)
    }

    async fn deactivate_team(&self, team_name: &str) -> Result<Team, RepositoryError> {
        let mut tables = self.tables.write().await;

        if !tables.teams.contains(team_name) {
            return Err(RepositoryError::not_found("team", team_name));
        }

        for user in tables.users.values_mut() {
            if user.team_name.as_deref() == Some(team_name) {
                user.is_active = false;
            }
        }

        tables.team(team_name)
    }

    async fn set_user_active(
        &self,
        user_id: &UserId,
        is_active: bool,
    ) -> Result<User, RepositoryError> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(user_id)
            .ok_or_else(|| RepositoryError::not_found("user", user_id))?;
        user.is_active = is_active;
        Ok(user.clone())
    }

    async fn get_user(&self, user_id: &UserId) -> Result<User, RepositoryError> {
        let tables = self.tables.read().await;
        tables
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("user", user_id))
    }
}

#[async_trait]
impl PullRequestStore for InMemoryRepository {
    async fn create(&self, pr: &PullRequest) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;

        if tables.pull_requests.contains_key(&pr.id) {
            warn!("Pull request {} already exists", pr.id);
            return Err(RepositoryError::PullRequestExists(pr.id.clone()));
        }
        if !tables.users.contains_key(&pr.author_id) {
            warn!("Author {} of pull request {} not found", pr.author_id, pr.id);
            return Err(RepositoryError::not_found("user", &pr.author_id));
        }
        if let Some(missing) = pr.reviewers.iter().find(|r| !tables.users.contains_key(*r)) {
            return Err(RepositoryError::not_found("user", missing));
        }

        tables.pull_requests.insert(pr.id.clone(), pr.clone());
        Ok(())
    }

    async fn get(&self, id: &PullRequestId) -> Result<PullRequest, RepositoryError> {
        let tables = self.tables.read().await;
        tables
            .pull_requests
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("pull request", id))
    }

    async fn save(&self, pr: &PullRequest) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;

        if let Some(missing) = pr.reviewers.iter().find(|r| !tables.users.contains_key(*r)) {
            return Err(RepositoryError::not_found("user", missing));
        }

        let stored = tables
            .pull_requests
            .get_mut(&pr.id)
            .ok_or_else(|| RepositoryError::not_found("pull request", &pr.id))?;

        if stored.is_merged() && !pr.is_merged() {
            warn!("Refusing to overwrite merged pull request {}", pr.id);
            return Err(RepositoryError::PullRequestMerged(pr.id.clone()));
        }

        *stored = pr.clone();
        Ok(())
    }

    async fn merge(&self, id: &PullRequestId) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .pull_requests
            .get_mut(id)
            .ok_or_else(|| RepositoryError::not_found("pull request", id))?;

        if stored.status == PullRequestStatus::Open {
            stored.status = PullRequestStatus::Merged;
            stored.merged_at = Some(timestamp_now());
        }
        Ok(())
    }

    async fn list_for_reviewer(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PullRequestShort>, RepositoryError> {
        let tables = self.tables.read().await;

        if !tables.users.contains_key(user_id) {
            return Err(RepositoryError::not_found("user", user_id));
        }

        let mut prs: Vec<PullRequestShort> = tables
            .pull_requests
            .values()
            .filter(|pr| pr.has_reviewer(user_id))
            .map(PullRequest::to_short)
            .collect();
        prs.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(prs)
    }
}
