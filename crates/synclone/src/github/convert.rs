//! Conversion from GitHub payloads to descriptors.

use super::types::GitHubRepo;
use crate::platform::{FALLBACK_DEFAULT_BRANCH, ProviderKind, RepositoryDescriptor};

pub fn to_descriptor(repo: GitHubRepo, org: &str) -> RepositoryDescriptor {
    RepositoryDescriptor {
        provider: ProviderKind::GitHub,
        organization: org.to_string(),
        name: repo.name,
        full_name: repo.full_name,
        clone_url: repo.clone_url,
        private: repo.private,
        archived: repo.archived,
        default_branch: repo
            .default_branch
            .unwrap_or_else(|| FALLBACK_DEFAULT_BRANCH.to_string()),
        language: repo.language,
        updated_at: repo.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_descriptor_fills_missing_branch() {
        let repo: GitHubRepo = serde_json::from_value(serde_json::json!({
            "name": "empty",
            "full_name": "acme/empty",
            "clone_url": "https://github.com/acme/empty.git",
            "private": true,
            "default_branch": null
        }))
        .expect("payload should parse");

        let descriptor = to_descriptor(repo, "acme");
        assert_eq!(descriptor.provider, ProviderKind::GitHub);
        assert_eq!(descriptor.default_branch, FALLBACK_DEFAULT_BRANCH);
        assert!(descriptor.private);
        assert!(!descriptor.archived);
        assert!(descriptor.updated_at.is_none());
    }
}
