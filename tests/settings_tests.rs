// SPDX-License-Identifier: MPL-2.0

//! Integration tests for settings persistence on disk

use std::path::PathBuf;

use anaglyph::config::Settings;
use anaglyph::Rotation;

fn temp_settings_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "anaglyph-settings-test-{}-{}.json",
        tag,
        std::process::id()
    ))
}

#[test]
fn test_file_round_trip() {
    let path = temp_settings_path("round-trip");
    let settings = Settings {
        left_device: Some("left-id".into()),
        right_device: Some("right-id".into()),
        left_rotation: Rotation::Rotate180,
        right_rotation: Rotation::Rotate90,
        parallax: 42.0,
    };

    settings.save(&path).expect("save settings");
    let back = Settings::load(&path).expect("load settings");
    std::fs::remove_file(&path).ok();

    assert_eq!(back, settings);
}

#[test]
fn test_save_creates_parent_directories() {
    let dir = std::env::temp_dir().join(format!(
        "anaglyph-settings-test-nested-{}",
        std::process::id()
    ));
    let path = dir.join("deeper").join("settings.json");

    Settings::default().save(&path).expect("save creates directories");
    assert!(path.exists());

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_load_missing_file_is_an_error() {
    let path = temp_settings_path("missing");
    assert!(Settings::load(&path).is_err());
}

#[test]
fn test_malformed_file_is_an_error() {
    let path = temp_settings_path("malformed");
    std::fs::write(&path, "not json").unwrap();
    let result = Settings::load(&path);
    std::fs::remove_file(&path).ok();
    assert!(result.is_err());
}

#[test]
fn test_old_settings_file_gains_new_defaults() {
    let path = temp_settings_path("partial");
    std::fs::write(&path, r#"{"left_device": "cam-1"}"#).unwrap();
    let back = Settings::load(&path).expect("partial file loads");
    std::fs::remove_file(&path).ok();

    assert_eq!(back.left_device.as_deref(), Some("cam-1"));
    assert_eq!(back.left_rotation, Rotation::None);
    assert_eq!(back.parallax, 0.0);
}
