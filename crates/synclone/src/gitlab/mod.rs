//! GitLab group listing (gitlab.com and self-managed instances).
//!
//! Groups are listed with `include_subgroups=true`, so a descriptor's
//! `full_name` can be nested (`group/sub/project`).

mod client;
mod convert;
mod error;
mod types;

pub use client::{GitLabClient, PER_PAGE};
pub use error::GitLabError;
pub use types::GitLabProject;
