use super::types::GitLabProject;
use crate::platform::{FALLBACK_DEFAULT_BRANCH, ProviderKind, RepositoryDescriptor};

pub fn to_descriptor(project: GitLabProject, group: &str) -> RepositoryDescriptor {
    let private = project.is_private();
    RepositoryDescriptor {
        provider: ProviderKind::GitLab,
        organization: group.to_string(),
        name: project.path,
        full_name: project.path_with_namespace,
        clone_url: project.http_url_to_repo,
        private,
        archived: project.archived,
        default_branch: project
            .default_branch
            .unwrap_or_else(|| FALLBACK_DEFAULT_BRANCH.to_string()),
        language: None,
        updated_at: project.last_activity_at,
    }
}
