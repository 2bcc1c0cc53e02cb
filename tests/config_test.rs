use std::io::Write;

use tempfile::NamedTempFile;

use bifrost::config::RouterConfig;
use bifrost::{BifrostError, ExecutionKind};

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn loads_explicit_path() {
    let file = write_config(
        r#"
        [selection]
        width = 2

        [ledger]
        capacity = 25

        [providers.ollama]
        base_url = "http://gpu-box:11434"

        [[catalog.models]]
        name = "house-model"
        provider = "ollama"
        strengths = ["coding"]
        "#,
    );

    let config = RouterConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.selection.width, 2);
    assert_eq!(config.ledger.capacity, 25);
    assert_eq!(
        config.providers.ollama.unwrap().base_url,
        "http://gpu-box:11434"
    );
    assert_eq!(config.catalog.models.len(), 1);
    assert_eq!(config.catalog.models[0].execution, ExecutionKind::Local);
}

#[test]
fn missing_explicit_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    for result in [
        RouterConfig::load(Some(&path)),
        RouterConfig::load_or_default(Some(&path)),
    ] {
        let err = result.unwrap_err();
        assert!(
            matches!(err, BifrostError::Configuration(ref msg) if msg.contains("Config file not found"))
        );
    }
}

#[test]
fn parse_errors_name_the_file() {
    let file = write_config("[selection\nwidth = 2");
    let err = RouterConfig::load(Some(file.path())).unwrap_err();
    let BifrostError::Configuration(msg) = err else {
        panic!("expected configuration error, got {err:?}");
    };
    assert!(msg.starts_with("Failed to parse config"));
    assert!(msg.contains(&format!("{:?}", file.path())));
}

#[test]
fn invalid_values_are_rejected_on_load() {
    let file = write_config("[timeouts]\nmin_secs = 120\nmax_secs = 60\n");
    let err = RouterConfig::load(Some(file.path())).unwrap_err();
    assert!(matches!(err, BifrostError::Configuration(ref msg) if msg.contains("timeouts.min_secs")));
}

#[test]
fn unknown_catalog_execution_is_a_parse_error() {
    let err = RouterConfig::from_toml_str(
        r#"
        [[catalog.models]]
        name = "m"
        provider = "p"
        execution = "orbital"
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, BifrostError::Configuration(_)));
}
