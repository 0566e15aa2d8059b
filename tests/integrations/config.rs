//! Integration test for configuration loading and validation.

use alertpipe::config::Config;
use anyhow::Result;
use std::io::Write;

#[test]
fn load_merges_file_over_defaults() -> Result<()> {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    writeln!(
        file,
        r#"
log_level = "debug"

[throttle]
rate_limit = 7
rate_period_ms = 2000
cooldown_ms = 500
grouping = true
group_wait_ms = 250
max_group_size = 10
group_by_labels = ["service", "zone"]
repeat_interval_ms = 60000

[channels]
log_enabled = true

[channels.webhook]
url = "https://hooks.example.com/alerts"
"#
    )?;

    let config = Config::load(file.path().to_str().unwrap())?;
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.throttle.rate_limit, 7);
    assert_eq!(
        config.throttle.group_by_labels,
        vec!["service".to_string(), "zone".to_string()]
    );
    let webhook = config.channels.webhook.expect("webhook section");
    assert_eq!(webhook.url, "https://hooks.example.com/alerts");
    // Defaults fill in the fields the file omits.
    assert!(webhook.enabled);
    assert_eq!(webhook.timeout_seconds, 10);
    Ok(())
}

#[test]
fn load_rejects_invalid_throttle_values() -> Result<()> {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    writeln!(
        file,
        r#"
[throttle]
cooldown_ms = 0
"#
    )?;

    let loaded = Config::load(file.path().to_str().unwrap());
    assert!(loaded.is_err());
    assert!(loaded
        .unwrap_err()
        .to_string()
        .contains("cooldown_ms"));
    Ok(())
}

#[test]
fn missing_file_falls_back_to_defaults() -> Result<()> {
    let config = Config::load("/nonexistent/alertpipe.toml")?;
    assert_eq!(config.log_level, "info");
    assert!(config.channels.webhook.is_none());
    config.throttle.validate()?;
    Ok(())
}
