//! Config loading and defaults integration tests

use thriftd::config::Config;

/// An empty file yields the documented defaults.
#[test]
fn test_empty_config_uses_defaults() {
    let config: Config = toml::from_str("").expect("valid TOML");

    assert_eq!(config.api.http_port, 8080);
    assert_eq!(config.thrift.planned_weeks_default, 52);
    assert!(config.thrift.refund_on_cancel);
    assert_eq!(config.eligibility.min_total_referrals, 5);
    assert_eq!(config.eligibility.min_recent_referrals, 3);
    assert_eq!(config.eligibility.min_active_referrals, 2);
    assert_eq!(config.eligibility.recent_window_days, 40);
    assert!(config.sweep.enabled);
    assert_eq!(config.sweep.interval_secs, 86_400);
}

#[test]
fn test_config_with_all_fields() {
    let toml_str = r#"
[node]
id = "thrift-lagos-1"
data_dir = "/var/lib/thriftd"

[api]
http_port = 9090

[thrift]
weekly_contribution_default = 50000
planned_weeks_default = 26
refund_on_cancel = false

[eligibility]
min_total_referrals = 6
min_recent_referrals = 4
min_active_referrals = 3
recent_window_days = 30

[webhook]
secret = "hush"
deadline_ms = 2500

[sweep]
enabled = false
interval_secs = 3600
retry_attempts = 5
retry_backoff_ms = 100
"#;

    let config: Config = toml::from_str(toml_str).expect("valid TOML");

    assert_eq!(config.node.id, "thrift-lagos-1");
    assert_eq!(config.api.http_port, 9090);
    assert_eq!(config.thrift.weekly_contribution_default, 50_000);
    assert_eq!(config.thrift.planned_weeks_default, 26);
    assert!(!config.thrift.refund_on_cancel);
    assert_eq!(config.eligibility.min_total_referrals, 6);
    assert_eq!(config.eligibility.recent_window_days, 30);
    assert_eq!(config.webhook.secret, "hush");
    assert_eq!(config.webhook.deadline_ms, 2500);
    assert!(!config.sweep.enabled);
    assert_eq!(config.sweep.retry_attempts, 5);
}

#[test]
fn test_partial_sections_keep_other_defaults() {
    let toml_str = r#"
[webhook]
secret = "hush"
"#;
    let config: Config = toml::from_str(toml_str).expect("valid TOML");
    assert_eq!(config.webhook.secret, "hush");
    assert_eq!(config.webhook.deadline_ms, 10_000);
    assert_eq!(config.eligibility.min_total_referrals, 5);
}

#[test]
fn test_invalid_toml_returns_error() {
    let bad_toml = "this is not valid { toml }}}";
    let result: Result<Config, _> = toml::from_str(bad_toml);
    assert!(result.is_err(), "Invalid TOML should produce an error");
}
