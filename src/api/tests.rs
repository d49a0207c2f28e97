use super::*;
use crate::engine::{BackendKind, PlaybackSnapshot, PlaybackState};
use crate::processing::ModuleKind;

#[test]
fn test_get_version() {
    let result = get_version().unwrap();
    assert_eq!(result, "0.1.0");
}

#[test]
fn test_parse_module_defaults_id_and_enabled() {
    let module =
        parse_module(r#"{"kind": "gain", "parameters": {"gain_db": -3.0}}"#).unwrap();
    assert_eq!(module.kind, ModuleKind::Gain);
    assert!(module.enabled);
    assert_eq!(module.number("gain_db"), Some(-3.0));
}

#[test]
fn test_parse_module_rejects_unknown_kind() {
    let err = parse_module(r#"{"kind": "vocoder"}"#).unwrap_err();
    assert_eq!(err.origin, ProcessingOrigin::Local);
    assert!(matches!(
        err.kind,
        crate::error::ProcessingErrorKind::InvalidOptions { .. }
    ));
}

#[test]
fn test_parse_options_accepts_empty_and_partial_json() {
    let defaults = parse_options("", ProcessingOrigin::Cloud).unwrap();
    assert!(defaults.polling.is_none());

    let options = parse_options(
        r#"{"polling": {"max_attempts": 5, "interval_ms": 100}}"#,
        ProcessingOrigin::Cloud,
    )
    .unwrap();
    assert_eq!(options.polling.map(|policy| policy.max_attempts), Some(5));

    assert!(parse_options("{not json", ProcessingOrigin::Cloud).is_err());
}

#[test]
fn test_playback_info_flattens_enums() {
    let info = PlaybackInfo::from(PlaybackSnapshot {
        state: PlaybackState::Playing,
        is_playing: true,
        current_time: 1.5,
        duration: 3.0,
        uri: Some("song.wav".to_string()),
        backend: Some(BackendKind::NativePlayer),
    });
    assert_eq!(info.state, "playing");
    assert_eq!(info.backend.as_deref(), Some("native_player"));
}

#[test]
fn test_error_code_objects() {
    let _ = get_load_error_codes();
    let _ = get_playback_error_codes();
    assert_eq!(ProcessingErrorCodes::TIMEOUT, 3004);
}
