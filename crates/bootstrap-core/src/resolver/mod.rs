//! Bootstrap config resolution.
//!
//! [`BootstrapResolver::resolve`] dispatches once on the config locator:
//! - top-level project: the properties file lives in the repository under test
//! - dependency project: the file lives in a repository pinned by the
//!   top-level repository's `DEPS`
//!
//! Either path yields a [`ResolvedSource`]; the properties file is then
//! acquired from it and both are combined into a [`BootstrapConfig`].

mod dependency;
mod properties;
mod source_ref;
mod top_level;

use std::sync::Arc;

use bootstrap_services::{CodeReview, ManifestEvaluator, Patcher, SourceControl};
use crate::domain::{BootstrapConfig, BootstrapInput, ConfigLocator, ResolvedSource, Result};
use crate::obs::{emit_bootstrap_skipped, emit_config_resolved};

pub use dependency::MANIFEST_PATH;
use source_ref::SourceRefResolver;

/// Resolves the bootstrap config of a build against its collaborators.
#[derive(Clone)]
pub struct BootstrapResolver {
    source: Arc<dyn SourceControl>,
    review: Arc<dyn CodeReview>,
    evaluator: Arc<dyn ManifestEvaluator>,
    patcher: Arc<dyn Patcher>,
}

impl BootstrapResolver {
    pub fn new(
        source: Arc<dyn SourceControl>,
        review: Arc<dyn CodeReview>,
        evaluator: Arc<dyn ManifestEvaluator>,
        patcher: Arc<dyn Patcher>,
    ) -> Self {
        Self {
            source,
            review,
            evaluator,
            patcher,
        }
    }

    /// Resolve the config for `input`.
    ///
    /// A build without a properties locator yields a config with no commit,
    /// no change and no builder properties.
    pub async fn resolve(&self, input: &BootstrapInput) -> Result<BootstrapConfig> {
        let Some(config) = &input.config else {
            emit_bootstrap_skipped(&input.builder);
            return Ok(BootstrapConfig::skipped(input));
        };

        let refs = SourceRefResolver {
            input,
            source: self.source.as_ref(),
            review: self.review.as_ref(),
        };
        let source: ResolvedSource = match &config.locator {
            ConfigLocator::TopLevel(project) => top_level::resolve(&refs, project).await?,
            ConfigLocator::Dependency(project) => {
                dependency::resolve(
                    &refs,
                    self.evaluator.as_ref(),
                    self.patcher.as_ref(),
                    project,
                    &config.properties_file,
                )
                .await?
            }
        };

        let properties = properties::acquire(
            self.source.as_ref(),
            self.patcher.as_ref(),
            &source,
            &config.properties_file,
        )
        .await?;

        let resolved = BootstrapConfig::assemble(input, source, properties);
        let change = resolved.change().map(|c| c.change.to_string());
        emit_config_resolved(
            resolved.commit().map(|c| c.id.as_str()).unwrap_or_default(),
            change.as_deref(),
            resolved.skip_analysis_reasons().len(),
        );
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootstrap_services::fakes::{
        FakeCodeReview, FakeManifestEvaluator, FakePatcher, FakeSourceControl,
    };
    use tracing_test::traced_test;

    use crate::domain::{Build, InputOptions, EXE_KEY};

    #[traced_test]
    #[tokio::test]
    async fn test_missing_config_emits_skip_event() {
        let mut build = Build::default();
        build.builder = "chromium/ci/linux-rel".into();
        build.input.properties = serde_json::json!({
            EXE_KEY: {"exe": {"package": "infra/exe", "version": "latest", "cmd": ["luciexe"]}},
        })
        .as_object()
        .cloned()
        .unwrap();
        let options = InputOptions {
            properties_optional: true,
            ..Default::default()
        };
        let input = BootstrapInput::from_build(&build, options).unwrap();
        let source = Arc::new(FakeSourceControl::new());
        let resolver = BootstrapResolver::new(
            source.clone(),
            Arc::new(FakeCodeReview::new()),
            Arc::new(FakeManifestEvaluator::new()),
            Arc::new(FakePatcher::new()),
        );

        let config = resolver.resolve(&input).await.unwrap();

        assert!(config.is_skipped());
        assert!(source.calls().is_empty());
        assert!(logs_contain("bootstrap.skipped"));
        assert!(logs_contain("chromium/ci/linux-rel"));
    }
}
