//! Integration tests for AcceptConfig serialization.

use nano_eagle::config::SERIALIZATION_VERSION;
use nano_eagle::{AcceptConfig, Error, Precision, SampleAndAccept};

#[test]
fn test_bytes_round_trip() {
    for precision in [Precision::F32, Precision::F16] {
        for greedy in [true, false] {
            let config = AcceptConfig::new(precision).greedy(greedy);
            let bytes = config.to_bytes();
            let restored = AcceptConfig::from_bytes(&bytes).unwrap();

            assert_eq!(restored, config);
            assert_eq!(restored.to_bytes(), bytes);
        }
    }
}

#[test]
fn test_step_round_trip() {
    let step = SampleAndAccept::new(AcceptConfig::new(Precision::F16)).unwrap();
    let bytes = step.serialize();
    let restored = SampleAndAccept::deserialize(&bytes).unwrap();

    assert_eq!(restored.precision(), Precision::F16);
    assert_eq!(restored.serialize(), bytes);
}

#[test]
fn test_length_mismatch_reports_both_sizes() {
    let mut bytes = AcceptConfig::default().to_bytes();
    bytes.push(0);

    let err = AcceptConfig::from_bytes(&bytes).unwrap_err();
    match &err {
        Error::SerializedLength { expected, actual } => {
            assert_eq!(*expected, 9);
            assert_eq!(*actual, 10);
        }
        other => panic!("unexpected error {other:?}"),
    }
    let message = err.to_string();
    assert!(message.contains("(9)"));
    assert!(message.contains("(10)"));
}

#[test]
fn test_version_mismatch() {
    let mut bytes = AcceptConfig::default().to_bytes();
    bytes[..4].copy_from_slice(&(SERIALIZATION_VERSION + 1).to_le_bytes());

    let err = AcceptConfig::from_bytes(&bytes).unwrap_err();
    assert!(matches!(
        err,
        Error::VersionMismatch { expected, actual }
            if expected == SERIALIZATION_VERSION && actual == SERIALIZATION_VERSION + 1
    ));
}

#[test]
fn test_unknown_precision_tag() {
    let mut bytes = AcceptConfig::default().to_bytes();
    bytes[4..8].copy_from_slice(&7i32.to_le_bytes());

    let err = AcceptConfig::from_bytes(&bytes).unwrap_err();
    assert!(matches!(err, Error::UnsupportedPrecision(_)));
}

#[test]
fn test_deserialized_non_greedy_step_is_rejected() {
    let bytes = AcceptConfig::default().greedy(false).to_bytes();
    let result = SampleAndAccept::deserialize(&bytes);
    assert!(matches!(result, Err(Error::NonGreedyUnsupported)));
}

#[test]
fn test_json_round_trip() {
    let config = AcceptConfig::new(Precision::F16);
    let json = config.to_json().unwrap();
    assert!(json.contains("\"f16\""));

    let restored = AcceptConfig::from_json(&json).unwrap();
    assert_eq!(restored, config);
}

#[test]
fn test_json_file() {
    let path = std::env::temp_dir().join(format!("nano-eagle-config-{}.json", std::process::id()));
    std::fs::write(&path, r#"{ "precision": "f32", "greedy_sampling": true }"#).unwrap();

    let config = AcceptConfig::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config, AcceptConfig::default());
}
