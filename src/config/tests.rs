use super::load_config;
use super::settings::{PartialBrokerSettings, PartialSettings, RegistrationPolicy, Settings};
use serial_test::serial;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 8888);
    assert_eq!(settings.broker.topics.len(), 5);
    assert!(settings.broker.topics.contains(&"Yoga".to_string()));
    assert_eq!(settings.broker.max_connections, 1000);
    assert_eq!(settings.broker.registration_policy, RegistrationPolicy::Retry);
    assert_eq!(settings.jobs.processing_timeout_secs, 10);
    assert_eq!(settings.jobs.email_timeout_secs, 15);
}

#[test]
fn test_merge_keeps_defaults_for_missing_values() {
    let partial = PartialSettings {
        broker: Some(PartialBrokerSettings {
            max_connections: Some(3),
            ..Default::default()
        }),
        ..Default::default()
    };

    let settings = Settings::merge(partial);
    assert_eq!(settings.broker.max_connections, 3);
    assert_eq!(settings.broker.topics.len(), 5);
    assert_eq!(settings.server.port, 8888);
}

#[test]
fn test_merge_ignores_empty_topic_list() {
    let partial = PartialSettings {
        broker: Some(PartialBrokerSettings {
            topics: Some(vec![]),
            ..Default::default()
        }),
        ..Default::default()
    };

    assert_eq!(Settings::merge(partial).broker.topics.len(), 5);
}

#[test]
#[serial]
fn test_load_config_without_overrides() {
    temp_env::with_vars_unset(["LIVENOTIFY__SERVER__PORT"], || {
        let settings = load_config().unwrap();
        assert_eq!(settings.server.port, 8888);
    });
}

#[test]
#[serial]
fn test_environment_overrides() {
    temp_env::with_vars(
        [
            ("LIVENOTIFY__SERVER__PORT", Some("9100")),
            ("LIVENOTIFY__BROKER__REGISTRATION_POLICY", Some("disconnect")),
            ("LIVENOTIFY__JOBS__PROCESSING_TIMEOUT_SECS", Some("3")),
        ],
        || {
            let settings = load_config().unwrap();
            assert_eq!(settings.server.port, 9100);
            assert_eq!(
                settings.broker.registration_policy,
                RegistrationPolicy::Disconnect
            );
            assert_eq!(settings.jobs.processing_timeout_secs, 3);
            assert_eq!(settings.jobs.email_timeout_secs, 15);
        },
    );
}

#[test]
#[serial]
fn test_environment_topic_list() {
    temp_env::with_var("LIVENOTIFY__BROKER__TOPICS", Some("Yoga,Boxeo"), || {
        let settings = load_config().unwrap();
        assert_eq!(settings.broker.topics, vec!["Yoga", "Boxeo"]);
    });
}
