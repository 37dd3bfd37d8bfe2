//! Build mutation: the build document handed to the bootstrapped executable.

use crate::domain::{
    BootstrapConfig, BootstrapMetadata, Build, ExeProvenance, Properties, Result,
    BOOTSTRAP_PROPERTY_PREFIX, METADATA_KEY,
};

/// Merge the config's property layers, last write wins.
///
/// Normally build properties are overridden by builder properties, which are
/// overridden by requested properties. When build properties take
/// precedence, builder properties are applied first and requested properties
/// are not applied separately (they are already part of the build layer).
pub fn merge_properties(config: &BootstrapConfig) -> Properties {
    let layers: Vec<&Properties> = if config.build_properties_take_precedence() {
        vec![config.builder_properties(), config.build_properties()]
    } else {
        vec![
            config.build_properties(),
            config.builder_properties(),
            config.requested_properties(),
        ]
    };

    let mut merged = Properties::new();
    for layer in layers {
        for (key, value) in layer {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged.retain(|key, _| !key.starts_with(BOOTSTRAP_PROPERTY_PREFIX));
    merged
}

/// Rewrite `build` for the bootstrapped executable.
///
/// Replaces the input properties with the merged layers plus the
/// `$build/bootstrap` metadata block. The build's commit is replaced by the
/// config commit only when both name the same repository.
pub fn update_build(build: &mut Build, config: &BootstrapConfig, exe: &ExeProvenance) -> Result<()> {
    let mut properties = merge_properties(config);
    let metadata = BootstrapMetadata::new(config, exe);
    properties.insert(METADATA_KEY.to_string(), serde_json::to_value(&metadata)?);
    build.input.properties = properties;

    if let (Some(resolved), Some(current)) = (config.commit(), build.input.gitiles_commit.as_mut()) {
        if current.same_repo(resolved) {
            *current = resolved.clone();
        }
    }
    Ok(())
}
