//! Gitea and Gogs organization listing.
//!
//! Gitea (and Forgejo/Codeberg) grew out of Gogs and kept its `/api/v1`
//! layout, so one client serves both. The [`Flavor`] only changes how
//! pagination works: Gitea pages with `page`/`limit`, Gogs returns the whole
//! organization in one response.

mod client;
mod convert;
mod error;
mod types;

pub use client::{CODEBERG_HOST, Flavor, GiteaClient, PAGE_SIZE};
pub use error::GiteaError;
pub use types::GiteaRepo;
