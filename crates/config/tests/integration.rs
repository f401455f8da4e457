//! Integration tests for config

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use strap_config::*;
    use strap_types::{ColorChoice, DisplayMode, OutputFormat, RestartPolicy};
    use tempfile::NamedTempFile;

    // Mutex to ensure env var tests don't run concurrently
    static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

    const ENV_VARS: &[&str] = &[
        "STRAP_OUTPUT",
        "STRAP_COLOR",
        "STRAP_DISPLAY",
        "STRAP_RESTART",
        "STRAP_MAX_RETRIES",
        "STRAP_ELEVATION_TIMEOUT",
        "STRAP_STATE_PATH",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[tokio::test]
    async fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[general]
default_output = "plain"
color = "never"

[engine]
display = "passive"
restart = "never"
max_retries = 1

[elevation]
launcher = ["pkexec"]
response_timeout = 30

[paths]
state_path = "/var/lib/strap"
        "#
        )
        .unwrap();

        let config = Config::load_from_file(temp_file.path()).await.unwrap();
        assert_eq!(config.general.default_output, OutputFormat::Plain);
        assert_eq!(config.general.color, ColorChoice::Never);
        assert_eq!(config.engine.display, DisplayMode::Passive);
        assert_eq!(config.engine.restart, RestartPolicy::Never);
        assert_eq!(config.engine.max_retries, 1);
        assert_eq!(config.elevation.launcher, vec!["pkexec".to_string()]);
        assert_eq!(config.elevation.response_timeout().as_secs(), 30);
        assert_eq!(
            config.db_path().unwrap(),
            PathBuf::from("/var/lib/strap").join(STATE_DB_FILE)
        );
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[engine]\nrestart = \"automatic\"").unwrap();

        let config = Config::load_from_file(temp_file.path()).await.unwrap();
        assert_eq!(config.engine.restart, RestartPolicy::Automatic);
        assert_eq!(config.engine.display, DisplayMode::Full);
        assert_eq!(config.engine.max_retries, 3);
        assert_eq!(
            config.elevation.launcher,
            vec!["sudo".to_string(), "-n".to_string()]
        );
        assert_eq!(config.elevation.response_timeout, 600);
    }

    #[tokio::test]
    async fn test_invalid_files_are_rejected() {
        let mut bad_syntax = NamedTempFile::new().unwrap();
        writeln!(bad_syntax, "[engine\nrestart = ").unwrap();
        let err = Config::load_from_file(bad_syntax.path()).await.unwrap_err();
        assert!(err.to_string().contains("parse error"));

        let mut zero_timeout = NamedTempFile::new().unwrap();
        writeln!(zero_timeout, "[elevation]\nresponse_timeout = 0").unwrap();
        assert!(Config::load_from_file(zero_timeout.path()).await.is_err());

        let missing = Config::load_from_file(std::path::Path::new("/nonexistent/strap.toml"))
            .await
            .unwrap_err();
        assert!(missing.to_string().contains("not found"));
    }

    #[test]
    fn test_merge_env() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        clear_env();

        std::env::set_var("STRAP_OUTPUT", "json");
        std::env::set_var("STRAP_RESTART", "always");
        std::env::set_var("STRAP_MAX_RETRIES", "5");
        std::env::set_var("STRAP_STATE_PATH", "/tmp/strap-state");

        let mut config = Config::default();
        let result = config.merge_env();
        clear_env();
        result.unwrap();

        assert_eq!(config.general.default_output, OutputFormat::Json);
        assert_eq!(config.engine.restart, RestartPolicy::Always);
        assert_eq!(config.engine.max_retries, 5);
        assert_eq!(
            config.lock_path().unwrap(),
            PathBuf::from("/tmp/strap-state").join(STATE_LOCK_FILE)
        );
    }

    #[test]
    fn test_merge_env_rejects_invalid_values() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        clear_env();

        std::env::set_var("STRAP_DISPLAY", "fullscreen");
        let mut config = Config::default();
        let result = config.merge_env();
        clear_env();
        assert!(result.is_err());
        assert_eq!(config.engine.display, DisplayMode::Full);

        std::env::set_var("STRAP_ELEVATION_TIMEOUT", "0");
        let result = config.merge_env();
        clear_env();
        assert!(result.is_err());
    }
}
