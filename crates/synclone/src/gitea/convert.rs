use super::types::GiteaRepo;
use crate::platform::{FALLBACK_DEFAULT_BRANCH, ProviderKind, RepositoryDescriptor};

pub fn to_descriptor(repo: GiteaRepo, org: &str, provider: ProviderKind) -> RepositoryDescriptor {
    RepositoryDescriptor {
        provider,
        organization: org.to_string(),
        name: repo.name,
        full_name: repo.full_name,
        clone_url: repo.clone_url,
        private: repo.private,
        archived: repo.archived,
        default_branch: repo
            .default_branch
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| FALLBACK_DEFAULT_BRANCH.to_string()),
        language: repo.language.filter(|l| !l.is_empty()),
        updated_at: repo.updated_at,
    }
}
