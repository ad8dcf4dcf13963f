use super::*;

#[test]
fn test_defaults() {
    let cfg = Config::default();
    assert_eq!(cfg.habits.timezone, "UTC");
    assert_eq!(cfg.habits.stats_window_days, 30);
    assert_eq!(cfg.membership.cache_ttl_secs, 300);
    assert!(!cfg.membership.is_enabled());
    assert!(!cfg.membership.fail_open);
    assert!(cfg.scheduler.enabled);
    assert_eq!(cfg.scheduler.delivery_workers, 4);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_parse_partial_toml_fills_defaults() {
    let cfg = parse(
        r#"
        [habits]
        timezone = "Europe/Berlin"

        [membership]
        required_channels = ["@habit_club"]

        [channel.telegram]
        enabled = true
        bot_token = "123:abc"
    "#,
    )
    .unwrap();
    assert_eq!(cfg.habits.tz().unwrap(), chrono_tz::Europe::Berlin);
    assert_eq!(cfg.habits.stats_window_days, 30);
    assert!(cfg.membership.is_enabled());
    assert_eq!(cfg.membership.ttl(), Duration::from_secs(300));
    let tg = cfg.channel.telegram.unwrap();
    assert!(tg.enabled);
    assert_eq!(tg.bot_token, "123:abc");
    assert!(tg.allowed_users.is_empty());
}

#[test]
fn test_invalid_timezone_rejected() {
    let cfg = parse(
        r#"
        [habits]
        timezone = "Mars/Olympus_Mons"
    "#,
    )
    .unwrap();
    assert!(matches!(cfg.validate(), Err(HabitualError::Config(_))));
}

#[test]
fn test_zero_window_rejected() {
    let mut cfg = Config::default();
    cfg.habits.stats_window_days = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn test_render_template() {
    let sched = SchedulerConfig {
        message_template: "Time to {habit} now".to_string(),
        ..Default::default()
    };
    assert_eq!(sched.render("stretch"), "Time to stretch now");
    assert_eq!(
        SchedulerConfig::default().render("Read"),
        "Reminder: time for \"Read\"!"
    );
}

#[test]
fn test_load_missing_file_uses_defaults() {
    let cfg = load("/nonexistent/__habitual_test__/config.toml").unwrap();
    assert_eq!(cfg.habitual.name, "Habitual");
    assert_eq!(cfg.memory.db_path, "~/.habitual/data/habitual.db");
}

#[test]
fn test_load_reports_parse_errors() {
    let tmp = std::env::temp_dir().join("__habitual_test_bad_config__");
    let _ = std::fs::create_dir_all(&tmp);
    let path = tmp.join("config.toml");
    std::fs::write(&path, "[habits\ntimezone = ").unwrap();

    let err = load(path.to_str().unwrap()).unwrap_err();
    assert!(matches!(err, HabitualError::Config(_)));

    let _ = std::fs::remove_dir_all(&tmp);
}

#[test]
fn test_shellexpand_home() {
    if let Some(home) = std::env::var_os("HOME") {
        let expanded = shellexpand("~/x/y.db");
        assert_eq!(expanded, format!("{}/x/y.db", home.to_string_lossy()));
    }
    assert_eq!(shellexpand("/abs/path"), "/abs/path");
}
