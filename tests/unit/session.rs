use chrono::TimeZone as _;

use super::*;

#[test]
fn session_dirs_are_named_by_utc_timestamp() {
    let at = Utc.with_ymd_and_hms(2026, 3, 7, 9, 5, 1).unwrap();
    assert_eq!(session_dir_name(at), "20260307_090501");

    let base = tempfile::tempdir().unwrap();
    let dir = create_session_dir(&base.path().join("output"), at).unwrap();
    assert!(dir.is_dir());
    assert_eq!(dir, base.path().join("output").join("20260307_090501"));
    // Re-creating the same session is not an error.
    assert_eq!(create_session_dir(&base.path().join("output"), at).unwrap(), dir);
}

#[test]
fn write_json_is_pretty_and_parseable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(MANIFEST_RECORD);
    let value = serde_json::json!({"lineart": "a.png", "final": "d.png"});
    write_json(&path, &value).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\n  \"final\""));
    assert!(text.ends_with('\n'));
    let back: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(back, value);
}

#[test]
fn write_json_into_missing_dir_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = write_json(&dir.path().join("nope").join(SESSION_RECORD), &1).unwrap_err();
    assert!(err.to_string().contains("session.json"));
}
