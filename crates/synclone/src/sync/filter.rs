use std::fmt;

use regex::Regex;

use super::types::{SyncRequest, Visibility};
use crate::platform::RepositoryDescriptor;

/// Why a repository was filtered out before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    NameMismatch,
    Excluded,
    Visibility,
    Archived,
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NameMismatch => "name does not match pattern",
            Self::Excluded => "name matches exclude pattern",
            Self::Visibility => "visibility filtered",
            Self::Archived => "archived",
        })
    }
}

/// Dispatch filter compiled from a [`SyncRequest`].
///
/// Patterns are matched against the repository's short name, not the full
/// `org/name` path.
#[derive(Debug, Clone)]
pub struct RepoFilter {
    name_pattern: Option<Regex>,
    exclude_pattern: Option<Regex>,
    visibility: Visibility,
    include_archived: bool,
}

impl RepoFilter {
    pub fn from_request(request: &SyncRequest) -> Result<Self, regex::Error> {
        Ok(Self {
            name_pattern: request.name_pattern.as_deref().map(Regex::new).transpose()?,
            exclude_pattern: request
                .exclude_pattern
                .as_deref()
                .map(Regex::new)
                .transpose()?,
            visibility: request.visibility,
            include_archived: request.include_archived,
        })
    }

    /// `None` when the repository should be dispatched.
    pub fn check(&self, repo: &RepositoryDescriptor) -> Option<FilterReason> {
        if repo.archived && !self.include_archived {
            return Some(FilterReason::Archived);
        }
        match self.visibility {
            Visibility::Public if repo.private => return Some(FilterReason::Visibility),
            Visibility::Private if !repo.private => return Some(FilterReason::Visibility),
            _ => {}
        }
        if let Some(ref pattern) = self.name_pattern
            && !pattern.is_match(&repo.name)
        {
            return Some(FilterReason::NameMismatch);
        }
        if let Some(ref pattern) = self.exclude_pattern
            && pattern.is_match(&repo.name)
        {
            return Some(FilterReason::Excluded);
        }
        None
    }

    #[inline]
    pub fn accepts(&self, repo: &RepositoryDescriptor) -> bool {
        self.check(repo).is_none()
    }
}
