use std::sync::Arc;

use bootstrap_core::domain::{EXE_KEY, PROPERTIES_KEY};
use bootstrap_core::{
    merge_properties, update_build, BootstrapConfig, BootstrapInput, BootstrapMetadata,
    BootstrapResolver, Build, ExeProvenance, GitilesCommit, InputOptions, METADATA_KEY,
};
use bootstrap_services::fakes::{
    FakeCodeReview, FakeManifestEvaluator, FakePatcher, FakeSourceControl,
};
use bootstrap_services::{CasDigest, RepoRef};
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const PROPS_FILE: &str = "infra/props.json";

fn repo() -> RepoRef {
    RepoRef::new("chromium.googlesource.com", "chromium/src")
}

fn build() -> Build {
    let properties = json!({
        PROPERTIES_KEY: {
            "top_level_project": {
                "repo": {"host": "chromium.googlesource.com", "project": "chromium/src"},
                "ref": "refs/heads/main"
            },
            "properties_file": PROPS_FILE
        },
        EXE_KEY: {"exe": {"package": "infra/exe", "version": "latest", "cmd": ["luciexe"]}},
        "a": "build",
        "b": "build",
    });
    let mut build = Build::default();
    build.id = 8800;
    build.builder = "chromium/try/linux-rel".into();
    build.input.properties = properties.as_object().cloned().expect("object");
    build.requested_properties = json!({"a": "requested", "c": "requested"})
        .as_object()
        .cloned()
        .expect("object");
    build
}

async fn resolve(build: &Build, polymorphic: bool) -> BootstrapConfig {
    resolve_with(build, polymorphic, r#"{"b": "builder", "c": "builder"}"#).await
}

async fn resolve_with(build: &Build, polymorphic: bool, builder_properties: &str) -> BootstrapConfig {
    let source = Arc::new(FakeSourceControl::new());
    source.set_ref(&repo(), "refs/heads/main", "head-rev");
    source.add_file(&repo(), "head-rev", PROPS_FILE, builder_properties);
    source.set_last_changed(&repo(), "head-rev", PROPS_FILE, "changed-rev");
    let resolver = BootstrapResolver::new(
        source,
        Arc::new(FakeCodeReview::new()),
        Arc::new(FakeManifestEvaluator::new()),
        Arc::new(FakePatcher::new()),
    );
    let options = InputOptions {
        polymorphic,
        ..Default::default()
    };
    let input = BootstrapInput::from_build(build, options).expect("valid input");
    resolver.resolve(&input).await.expect("resolved")
}

fn cipd_exe() -> ExeProvenance {
    ExeProvenance::Cipd {
        server: "https://chrome-infra-packages.appspot.com".into(),
        package: "infra/exe".into(),
        requested_version: "latest".into(),
        actual_version: "instance-1".into(),
    }
}

// ---------------------------------------------------------------------------
// Merge precedence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn builder_and_requested_layers_override_build() {
    let config = resolve(&build(), false).await;
    let merged = merge_properties(&config);

    assert_eq!(merged["a"], "requested");
    assert_eq!(merged["b"], "builder");
    assert_eq!(merged["c"], "requested");
}

#[tokio::test]
async fn polymorphic_build_properties_take_precedence() {
    let config = resolve(&build(), true).await;
    let merged = merge_properties(&config);

    assert_eq!(merged["a"], "build");
    assert_eq!(merged["b"], "build");
    assert_eq!(merged["c"], "builder");
}

#[tokio::test]
async fn precedence_fixture_for_both_modes() {
    let mut build = build();
    for key in ["a", "b"] {
        build.input.properties.remove(key);
    }
    for (key, value) in [("foo", "A"), ("bar", "B"), ("baz", "C")] {
        build.input.properties.insert(key.into(), json!(value));
    }
    build.requested_properties = json!({"foo": "A"}).as_object().cloned().expect("object");
    let builder = r#"{"foo": "D", "bar": "E", "shaz": "F"}"#;

    let merged = merge_properties(&resolve_with(&build, false, builder).await);
    for (key, value) in [("foo", "A"), ("bar", "E"), ("baz", "C"), ("shaz", "F")] {
        assert_eq!(merged[key], value, "{key} without precedence flag");
    }

    let merged = merge_properties(&resolve_with(&build, true, builder).await);
    for (key, value) in [("foo", "A"), ("bar", "B"), ("baz", "C"), ("shaz", "F")] {
        assert_eq!(merged[key], value, "{key} with precedence flag");
    }
}

#[tokio::test]
async fn bootstrap_properties_are_not_forwarded() {
    let config = resolve(&build(), false).await;
    let merged = merge_properties(&config);

    assert!(merged.keys().all(|k| !k.starts_with("$bootstrap/")));
}

// ---------------------------------------------------------------------------
// update_build
// ---------------------------------------------------------------------------

#[tokio::test]
async fn metadata_block_describes_the_decision() {
    let mut build = build();
    let config = resolve(&build, false).await;

    update_build(&mut build, &config, &cipd_exe()).unwrap();

    let block = &build.input.properties[METADATA_KEY];
    assert_eq!(block["exe"]["cipd"]["actual_version"], "instance-1");
    assert_eq!(block["commits"][0]["id"], "head-rev");
    assert_eq!(block["commits"][0]["ref"], "refs/heads/main");
    assert_eq!(block["config_source"]["path"], PROPS_FILE);
    assert_eq!(
        block["config_source"]["last_changed_commit"]["id"],
        "changed-rev"
    );
    assert!(block.get("skip_analysis_reasons").is_none());

    let metadata: BootstrapMetadata = serde_json::from_value(block.clone()).unwrap();
    assert_eq!(metadata.exe, cipd_exe());
    assert!(!build.input.properties.contains_key(PROPERTIES_KEY));
}

#[tokio::test]
async fn build_commit_in_same_repo_is_pinned() {
    let mut build = build();
    build.input.gitiles_commit = Some(GitilesCommit::at_ref(&repo(), "refs/heads/main"));
    let config = resolve(&build, false).await;

    update_build(&mut build, &config, &cipd_exe()).unwrap();

    let commit = build.input.gitiles_commit.unwrap();
    assert_eq!(commit.id, "head-rev");
    assert_eq!(commit.git_ref, "refs/heads/main");
}

#[tokio::test]
async fn build_commit_in_other_repo_is_left_alone() {
    let mut build = build();
    let other = GitilesCommit::at_revision(&RepoRef::new("chromium.googlesource.com", "v8/v8"), "v8-rev");
    build.input.gitiles_commit = Some(other.clone());
    let config = resolve(&build, false).await;

    update_build(&mut build, &config, &cipd_exe()).unwrap();

    assert_eq!(build.input.gitiles_commit, Some(other));
}

#[tokio::test]
async fn skipped_config_still_records_executable() {
    let mut build = build();
    build.input.properties.remove(PROPERTIES_KEY);
    let options = InputOptions {
        properties_optional: true,
        ..Default::default()
    };
    let input = BootstrapInput::from_build(&build, options).unwrap();
    let config = BootstrapConfig::skipped(&input);
    let exe = ExeProvenance::Cas {
        instance: "projects/chromium-swarm/instances/default_instance".into(),
        digest: CasDigest {
            hash: "deadbeef".into(),
            size_bytes: 42,
        },
    };

    update_build(&mut build, &config, &exe).unwrap();

    let block = &build.input.properties[METADATA_KEY];
    assert_eq!(block["exe"]["cas"]["digest"]["hash"], "deadbeef");
    assert_eq!(block["commits"], json!([]));
    assert!(block.get("config_source").is_none());
    assert!(build.input.gitiles_commit.is_none());
    assert_eq!(build.input.properties["a"], "requested");
}
