//! Tests for configuration loading and root folder resolution
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate SHELF_ROOT_FOLDER are marked with #[serial].

use serial_test::serial;
use shelf_common::config::{
    default_root_folder, load_toml_config, resolve_root_folder, ImportTuning, PathMapping,
    TomlConfig, ROOT_FOLDER_ENV,
};
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn test_missing_config_file_uses_defaults() {
    let temp = TempDir::new().unwrap();
    let config = load_toml_config(&temp.path().join("absent.toml")).unwrap();

    assert!(config.root_folder.is_none());
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.itunes.write_back_delay_ms, 5000);
    assert!(config.itunes.create_backup);
    assert!(!config.itunes.auto_write_back);
    assert!(config.itunes.itl_path.is_none());
    assert!(!config.itunes.itl_write_back);
    assert_eq!(config.import, ImportTuning::default());
    assert_eq!(config.import.error_limit, 50);
}

#[test]
fn test_partial_config_fills_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("shelf-itunes.toml");
    std::fs::write(
        &path,
        r#"
root_folder = "/srv/shelf"

[itunes]
library_xml_path = "/srv/itunes/Library.xml"
itl_path = "/srv/itunes/iTunes Library.itl"
itl_write_back = true
path_mappings = [
    { from = "file://localhost/W:/itunes", to = "file://localhost/srv/itunes" },
]

[import]
checkpoint_batch = 5
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/shelf")));
    assert_eq!(
        config.itunes.path_mappings,
        vec![PathMapping {
            from: "file://localhost/W:/itunes".to_string(),
            to: "file://localhost/srv/itunes".to_string(),
        }]
    );
    assert_eq!(
        config.itunes.itl_path,
        Some(PathBuf::from("/srv/itunes/iTunes Library.itl"))
    );
    assert!(config.itunes.itl_write_back);
    assert_eq!(config.import.checkpoint_batch, 5);
    // untouched keys keep their defaults
    assert_eq!(config.import.progress_batch, 10);
    assert_eq!(config.itunes.write_back_delay_ms, 5000);
}

#[test]
fn test_invalid_config_is_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("broken.toml");
    std::fs::write(&path, "root_folder = [unterminated").unwrap();

    let err = load_toml_config(&path).unwrap_err();
    assert!(matches!(err, shelf_common::Error::Config(_)));
}

#[test]
fn test_database_path_defaults_under_root() {
    let config = TomlConfig::default();
    assert_eq!(
        config.database_path(Path::new("/srv/shelf")),
        PathBuf::from("/srv/shelf/shelf.db")
    );

    let explicit = TomlConfig {
        database_path: Some(PathBuf::from("/data/catalog.db")),
        ..TomlConfig::default()
    };
    assert_eq!(
        explicit.database_path(Path::new("/srv/shelf")),
        PathBuf::from("/data/catalog.db")
    );
}

#[test]
#[serial]
fn test_cli_argument_wins() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/shelf-from-env");
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/shelf-from-toml")),
        ..TomlConfig::default()
    };

    let root = resolve_root_folder(Some(Path::new("/tmp/shelf-from-cli")), &config);
    assert_eq!(root, PathBuf::from("/tmp/shelf-from-cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_env_var_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/shelf-from-env");
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/shelf-from-toml")),
        ..TomlConfig::default()
    };

    assert_eq!(
        resolve_root_folder(None, &config),
        PathBuf::from("/tmp/shelf-from-env")
    );

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_toml_then_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/shelf-from-toml")),
        ..TomlConfig::default()
    };
    assert_eq!(
        resolve_root_folder(None, &config),
        PathBuf::from("/tmp/shelf-from-toml")
    );

    assert_eq!(
        resolve_root_folder(None, &TomlConfig::default()),
        default_root_folder()
    );
}
