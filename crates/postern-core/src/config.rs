//! Mail module configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::settings::ModuleSettings;

/// Settings scope read by [`MailConfig::from_settings`].
pub const MAIL_SCOPE: &str = "Mail";

/// Default cap for a fetched text part, in bytes.
pub const DEFAULT_BODY_TEXT_LIMIT: u32 = 600_000;

/// Behaviour knobs for fetching and composing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct MailConfig {
    /// `X-Mailer` header value; empty disables the header.
    pub x_mailer: String,
    /// Text parts larger than this are fetched truncated.
    pub body_text_limit: u32,
    /// File-name suffixes of parts always fetched with the body
    /// (detached signatures).
    pub signature_suffixes: Vec<String>,
    /// Treat every sender as safe for remote images.
    pub always_show_images: bool,
    /// Limit for a single server round trip, in seconds.
    pub round_trip_timeout_secs: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            x_mailer: "postern".to_string(),
            body_text_limit: DEFAULT_BODY_TEXT_LIMIT,
            signature_suffixes: vec![".asc".to_string()],
            always_show_images: false,
            round_trip_timeout_secs: 60,
        }
    }
}

impl MailConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlays the keys present in the `Mail` settings scope onto the
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Serde`] if a present key has the wrong type.
    pub fn from_settings(settings: &ModuleSettings) -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = settings.get(MAIL_SCOPE, "XMailer")? {
            config.x_mailer = v;
        }
        if let Some(v) = settings.get(MAIL_SCOPE, "BodyTextLimit")? {
            config.body_text_limit = v;
        }
        if let Some(v) = settings.get(MAIL_SCOPE, "SignatureSuffixes")? {
            config.signature_suffixes = v;
        }
        if let Some(v) = settings.get(MAIL_SCOPE, "AlwaysShowImages")? {
            config.always_show_images = v;
        }
        if let Some(v) = settings.get(MAIL_SCOPE, "RoundTripTimeoutSecs")? {
            config.round_trip_timeout_secs = v;
        }
        Ok(config)
    }

    /// Sets the `X-Mailer` value.
    #[must_use]
    pub fn x_mailer(mut self, value: impl Into<String>) -> Self {
        self.x_mailer = value.into();
        self
    }

    /// Sets the text part cap.
    #[must_use]
    pub const fn body_text_limit(mut self, limit: u32) -> Self {
        self.body_text_limit = limit;
        self
    }

    /// Replaces the signature suffix list.
    #[must_use]
    pub fn signature_suffixes(mut self, suffixes: Vec<String>) -> Self {
        self.signature_suffixes = suffixes;
        self
    }

    /// Sets the always-show-images switch.
    #[must_use]
    pub const fn always_show_images(mut self, on: bool) -> Self {
        self.always_show_images = on;
        self
    }

    /// Sets the round trip limit.
    #[must_use]
    pub const fn round_trip_timeout(mut self, timeout: Duration) -> Self {
        self.round_trip_timeout_secs = timeout.as_secs();
        self
    }

    /// Round trip limit as a duration. Zero is treated as one second.
    #[must_use]
    pub fn round_trip_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.round_trip_timeout_secs.max(1))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MailConfig::default();
        assert_eq!(config.body_text_limit, 600_000);
        assert_eq!(config.signature_suffixes, vec![".asc"]);
        assert!(!config.always_show_images);
    }

    #[test]
    fn test_from_settings_overlays_present_keys() {
        let mut settings = ModuleSettings::new();
        settings.set(MAIL_SCOPE, "AlwaysShowImages", &true).unwrap();
        settings.set(MAIL_SCOPE, "BodyTextLimit", &1000).unwrap();
        settings.set("Other", "BodyTextLimit", &5).unwrap();

        let config = MailConfig::from_settings(&settings).unwrap();
        assert!(config.always_show_images);
        assert_eq!(config.body_text_limit, 1000);
        assert_eq!(config.x_mailer, "postern");
    }

    #[test]
    fn test_deserialize_partial_json() {
        let config: MailConfig = serde_json::from_str(r#"{"BodyTextLimit": 42}"#).unwrap();
        assert_eq!(config.body_text_limit, 42);
        assert_eq!(config.round_trip_timeout_secs, 60);
    }

    #[test]
    fn test_zero_timeout_is_clamped() {
        let config = MailConfig::new().round_trip_timeout(Duration::ZERO);
        assert_eq!(config.round_trip_timeout_duration(), Duration::from_secs(1));
    }
}
