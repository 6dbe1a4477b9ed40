use std::time::Duration;

use assert_matches::assert_matches;

use raw_image_mirror::config::{Config, ConfigLoader, FailurePolicy};
use raw_image_mirror::error::MirrorError;

#[test]
fn parse_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("raw-mirror.json");
    std::fs::write(
        &path,
        r#"{
            "page_size": 50,
            "download_concurrency": 4,
            "max_snapshot_age_secs": 3600,
            "images_dir": "/data/mars",
            "failure_policy": "fail-fast",
            "query": { "category": "mars2020" }
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.page_size, 50);
    assert_eq!(resolved.download_concurrency, 4);
    assert_eq!(resolved.catalog_concurrency, 16);
    assert_eq!(resolved.max_snapshot_age, Duration::from_secs(3600));
    assert_eq!(resolved.images_dir.as_str(), "/data/mars");
    assert_eq!(resolved.failure_policy, FailurePolicy::FailFast);
    assert_eq!(resolved.query.category, "mars2020");
    assert_eq!(resolved.query.feed, "raw_images");
}

#[test]
fn missing_explicit_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, MirrorError::ConfigRead(_));
}

#[test]
fn malformed_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("raw-mirror.json");
    std::fs::write(&path, "{ page_size: ").unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, MirrorError::ConfigParse(_));
}

#[test]
fn zero_concurrency_rejected() {
    let config = Config {
        download_concurrency: Some(0),
        ..Config::default()
    };
    let err = ConfigLoader::resolve_config(config).unwrap_err();
    assert_matches!(err, MirrorError::InvalidConfig(_));
}
