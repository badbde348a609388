//! Error kinds shared by every layer.
//!
//! A kind is what callers branch on; it carries no transport concerns. The
//! HTTP boundary owns the mapping from kind to status code.

use std::fmt;

/// Stable classification of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A referenced user, team or pull request does not exist.
    NotFound,
    /// A pull request with the requested id already exists.
    AlreadyExists,
    /// A team with the requested name already exists.
    TeamExists,
    /// A username is already taken by another user.
    UserExists,
    /// The pull request is merged and can no longer be changed.
    PullRequestMerged,
    /// The reviewer to replace is not assigned to the pull request.
    NotAssigned,
    /// No active teammate is left to take over the review.
    NoCandidate,
    /// The request was malformed.
    InvalidInput,
    /// Storage failed or returned data that could not be decoded.
    Internal,
}

impl ErrorKind {
    /// Machine-readable code exposed to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "PR_EXISTS",
            Self::TeamExists => "TEAM_EXISTS",
            Self::UserExists => "USER_EXISTS",
            Self::PullRequestMerged => "PR_MERGED",
            Self::NotAssigned => "NOT_ASSIGNED",
            Self::NoCandidate => "NO_CANDIDATE",
            Self::InvalidInput => "INVALID_INPUT",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const ALL: [ErrorKind; 9] = [
        ErrorKind::NotFound,
        ErrorKind::AlreadyExists,
        ErrorKind::TeamExists,
        ErrorKind::UserExists,
        ErrorKind::PullRequestMerged,
        ErrorKind::NotAssigned,
        ErrorKind::NoCandidate,
        ErrorKind::InvalidInput,
        ErrorKind::Internal,
    ];

    #[test]
    fn test_codes_are_unique() {
        let codes: HashSet<_> = ALL.iter().map(|k| k.code()).collect();
        assert_eq!(codes.len(), ALL.len());
    }

    #[test]
    fn test_display_is_code() {
        assert_eq!(ErrorKind::PullRequestMerged.to_string(), "PR_MERGED");
        assert_eq!(ErrorKind::AlreadyExists.to_string(), "PR_EXISTS");
    }
}
