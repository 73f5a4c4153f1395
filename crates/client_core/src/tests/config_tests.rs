use super::*;
use std::collections::HashMap;

#[test]
fn normalizes_trailing_slash_and_missing_scheme() {
    assert_eq!(
        normalize_backend_url(" http://tickets.local:5000/api/ "),
        "http://tickets.local:5000/api"
    );
    assert_eq!(
        normalize_backend_url("10.0.0.5:5000/api"),
        "http://10.0.0.5:5000/api"
    );
}

#[test]
fn blank_or_unsupported_urls_fall_back_to_default() {
    assert_eq!(normalize_backend_url("   "), DEFAULT_BACKEND_URL);
    assert_eq!(normalize_backend_url("ftp://tickets.local"), DEFAULT_BACKEND_URL);
}

#[test]
fn missing_file_yields_defaults() {
    let path = std::env::temp_dir().join("ticket_watch_missing_settings.toml");
    let _ = std::fs::remove_file(&path);
    assert_eq!(load_settings_from(&path), ClientSettings::default());
}

#[test]
fn loads_settings_file() {
    let path = std::env::temp_dir().join(format!(
        "ticket_watch_settings_{}.toml",
        std::process::id()
    ));
    std::fs::write(
        &path,
        "backend_url = \"https://rail.example.com/api/\"\nevent_buffer = 0\n",
    )
    .expect("write settings");

    let settings = load_settings_from(&path);
    let _ = std::fs::remove_file(&path);

    assert_eq!(settings.backend_url, "https://rail.example.com/api");
    assert_eq!(settings.event_buffer, 1);
}

#[test]
fn env_overrides_take_precedence() {
    let env: HashMap<&str, &str> = HashMap::from([
        ("TICKET_WATCH_BACKEND_URL", "http://first:5000/api"),
        ("APP__BACKEND_URL", "http://second:5000/api"),
        ("APP__EVENT_BUFFER", "32"),
    ]);

    let settings = apply_env_overrides(ClientSettings::default(), |key| {
        env.get(key).map(|value| value.to_string())
    });

    assert_eq!(settings.backend_url, "http://second:5000/api");
    assert_eq!(settings.event_buffer, 32);
}

#[test]
fn unparsable_buffer_override_is_ignored() {
    let settings = apply_env_overrides(ClientSettings::default(), |key| {
        (key == "APP__EVENT_BUFFER").then(|| "lots".to_string())
    });
    assert_eq!(settings, ClientSettings::default());
}
