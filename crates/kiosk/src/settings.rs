//! Layered kiosk configuration
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML
//! file, then `KIOSK_*` environment variables with `__` between nested keys
//! (e.g. `KIOSK_SERVER__BASE_URL`, `KIOSK_SESSION__SCHEDULER__TARGET_IMAGES`).

use capture_session::SessionConfig;
use config::{Config, Environment, File};
use recognition_client::ClientConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::KioskError;

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "kiosk.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "KIOSK";

/// Kiosk configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KioskConfig {
    /// Capture timing, thresholds, and prompts
    pub session: SessionConfig,
    /// Recognition server connection
    pub server: ClientConfig,
    /// Directory of still images replayed as the camera
    pub camera_dir: Option<PathBuf>,
}

impl KioskConfig {
    /// Load from `path` (or `kiosk.toml` when absent) and the environment.
    ///
    /// A missing default file is fine; an explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, KioskError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        Self::from_sources(Some(file), ENV_PREFIX)
    }

    fn from_sources<S>(file: Option<S>, env_prefix: &str) -> Result<Self, KioskError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let mut builder = Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(file);
        }

        let config: KioskConfig = builder
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the session cannot run with
    pub fn validate(&self) -> Result<(), KioskError> {
        self.session.validate()?;
        if self.server.base_url.trim().is_empty() {
            return Err(KioskError::InvalidConfig("server.base_url is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capture_session::ConfigError as SessionConfigError;
    use config::FileFormat;

    fn no_file() -> Option<File<config::FileSourceString, FileFormat>> {
        None
    }

    /// Parse TOML with an environment prefix nothing on the host sets
    fn from_toml(toml: &str) -> Result<KioskConfig, KioskError> {
        KioskConfig::from_sources(
            Some(File::from_str(toml, FileFormat::Toml)),
            "KIOSK_TEST_TOML",
        )
    }

    #[test]
    fn test_defaults_without_sources() {
        let config = KioskConfig::from_sources(no_file(), "KIOSK_TEST_UNSET").unwrap();
        assert_eq!(config, KioskConfig::default());
        assert_eq!(config.session.scheduler.target_images, 20);
        assert_eq!(config.server.timeout_ms, 30_000);
        assert!(config.camera_dir.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = from_toml(
            r#"
            camera_dir = "/var/lib/kiosk/frames"

            [server]
            base_url = "http://192.168.1.20:8000"

            [session.scheduler]
            target_images = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.server.base_url, "http://192.168.1.20:8000");
        assert_eq!(config.server.timeout_ms, 30_000);
        assert_eq!(config.session.scheduler.target_images, 10);
        assert_eq!(config.session.scheduler.inter_capture_interval_ms, 2000);
        assert_eq!(config.session.reconciler.acceptance_threshold, 0.6);
        assert_eq!(
            config.camera_dir.as_deref(),
            Some(Path::new("/var/lib/kiosk/frames"))
        );
    }

    #[test]
    fn test_custom_instructions() {
        let config = from_toml(
            r#"
            [[session.instructions]]
            text = "Look at the camera"
            duration_ms = 500

            [[session.instructions]]
            text = "Smile"
            duration_ms = 700
            "#,
        )
        .unwrap();

        let sequencer = config.session.sequencer().unwrap();
        assert_eq!(sequencer.len(), 2);
        assert_eq!(sequencer.next(3).text, "Smile");
    }

    #[test]
    fn test_environment_overrides_nested_keys() {
        std::env::set_var("KIOSK_TEST_ENV_SERVER__TIMEOUT_MS", "5000");
        std::env::set_var("KIOSK_TEST_ENV_SESSION__MIN_REGISTRATION_FRAMES", "5");

        let config = KioskConfig::from_sources(no_file(), "KIOSK_TEST_ENV").unwrap();
        assert_eq!(config.server.timeout_ms, 5000);
        assert_eq!(config.session.min_registration_frames, 5);

        std::env::remove_var("KIOSK_TEST_ENV_SERVER__TIMEOUT_MS");
        std::env::remove_var("KIOSK_TEST_ENV_SESSION__MIN_REGISTRATION_FRAMES");
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let err = from_toml(
            r#"
            [session.reconciler]
            acceptance_threshold = 0.9
            high_confidence_threshold = 0.8
            "#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            KioskError::SessionConfig(SessionConfigError::Thresholds { .. })
        ));
    }

    #[test]
    fn test_zero_target_rejected() {
        let err = from_toml(
            r#"
            [session.scheduler]
            target_images = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            KioskError::SessionConfig(SessionConfigError::Scheduler(_))
        ));
    }

    #[test]
    fn test_min_registration_frames_bounds() {
        for min in [0, 25] {
            let err = from_toml(&format!(
                "[session]\nmin_registration_frames = {}\n",
                min
            ))
            .unwrap_err();
            assert!(matches!(
                err,
                KioskError::SessionConfig(SessionConfigError::MinRegistrationFrames {
                    target: 20,
                    ..
                })
            ));
        }

        let config = from_toml("[session]\nmin_registration_frames = 20\n").unwrap();
        assert_eq!(config.session.min_registration_frames, 20);
    }

    #[test]
    fn test_empty_base_url_rejected() {
        let err = from_toml("[server]\nbase_url = \"  \"\n").unwrap_err();
        assert!(matches!(err, KioskError::InvalidConfig(_)));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = KioskConfig::load(Some(Path::new("/nonexistent/kiosk.toml"))).unwrap_err();
        assert!(matches!(err, KioskError::Config(_)));
    }
}
