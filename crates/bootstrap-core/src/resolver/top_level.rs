//! Properties file in the project under test.

use crate::domain::{BootstrapError, ResolvedSource, Result, TopLevelProject};
use crate::resolver::source_ref::SourceRefResolver;

pub(crate) async fn resolve(
    refs: &SourceRefResolver<'_>,
    project: &TopLevelProject,
) -> Result<ResolvedSource> {
    let (commit, change) = refs.resolve(&project.repo, &project.git_ref).await?;
    let commit = commit.ok_or_else(|| BootstrapError::NoReference {
        repo: project.repo.clone(),
    })?;
    Ok(ResolvedSource::direct(commit, change))
}
