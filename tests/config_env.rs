use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use firewatch::config::AppConfig;
use firewatch::SourceDescriptor;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "FIREWATCH_CONFIG",
        "FIREWATCH_MODEL",
        "FIREWATCH_SOURCE",
        "FIREWATCH_CONFIDENCE",
        "FIREWATCH_WEIGHTS_DIR",
        "FIREWATCH_RESULTS_DIR",
        "FIREWATCH_SAVE_RESULTS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = AppConfig::load().expect("defaults load");
    assert_eq!(cfg.session.model, "weights/best.onnx");
    assert_eq!(cfg.session.source, SourceDescriptor::camera_index(0));
    assert!((cfg.session.confidence - 0.25).abs() < 1e-6);
    assert!(!cfg.session.save_results);
    assert_eq!(cfg.engine.class_names, vec!["smoke", "fire"]);
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let toml = r#"
        [session]
        model = "stub://detector?fire=1"
        source = "stub://video?frames=4"
        confidence = 0.5
        save_json = true

        [paths]
        results = "out/results"

        [engine]
        iou_threshold = 0.6
        class_names = ["smoke", "fire", "person"]
    "#;
    file.write_all(toml.as_bytes()).expect("write config");

    std::env::set_var("FIREWATCH_CONFIG", file.path());
    std::env::set_var("FIREWATCH_CONFIDENCE", "0.4");
    std::env::set_var("FIREWATCH_SAVE_RESULTS", "yes");

    let cfg = AppConfig::load().expect("load config");
    assert_eq!(cfg.session.model, "stub://detector?fire=1");
    assert!(matches!(cfg.session.source, SourceDescriptor::Video(_)));
    assert!((cfg.session.confidence - 0.4).abs() < 1e-6);
    assert!(cfg.session.save_results);
    assert!(cfg.save_json);
    assert_eq!(cfg.results_dir, PathBuf::from("out/results"));
    assert!((cfg.engine.iou_threshold - 0.6).abs() < 1e-6);
    assert_eq!(cfg.engine.class_names.len(), 3);

    clear_env();
}

#[test]
fn rejects_bad_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("FIREWATCH_CONFIDENCE", "high");
    assert!(AppConfig::load().is_err());

    std::env::set_var("FIREWATCH_CONFIDENCE", "1.5");
    assert!(AppConfig::load().is_err());

    clear_env();
    std::env::set_var("FIREWATCH_SAVE_RESULTS", "maybe");
    assert!(AppConfig::load().is_err());

    clear_env();
    std::env::set_var("FIREWATCH_SOURCE", "rtsp://camera-1/stream");
    assert!(AppConfig::load().is_err());

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    std::env::set_var("FIREWATCH_CONFIG", dir.path().join("absent.toml"));
    assert!(AppConfig::load().is_err());

    clear_env();
}
