use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A unique identifier for a GitHub repository.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    /// The owner of the repository (e.g., "facebook").
    pub owner: String,
    /// The name of the repository (e.g., "react").
    pub repo: String,
}

impl RepoId {
    /// Strips whitespace, `..` and slashes so the parts are safe to splice into an API route.
    /// Returns `None` when either part is empty afterwards.
    pub fn sanitized(&self) -> Option<Self> {
        let owner = clean_segment(&self.owner)?;
        let repo = clean_segment(&self.repo)?;
        Some(Self { owner, repo })
    }
}

fn clean_segment(segment: &str) -> Option<String> {
    let cleaned = segment.trim().replace("..", "").replace(['/', '\\'], "");
    (!cleaned.is_empty()).then_some(cleaned)
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoOwner {
    pub login: String,
}

/// A repository the authenticated user can access, as listed in the sidebar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoDescriptor {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub owner: RepoOwner,
    #[serde(default)]
    pub private: bool,
    pub html_url: Option<String>,
    pub description: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Public profile of the signed-in GitHub user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    pub login: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub html_url: Option<String>,
}
