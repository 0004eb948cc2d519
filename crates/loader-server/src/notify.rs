//! Notification side-channel
//!
//! Fire-and-forget webhook message on successful compendium creation.
//! Feature-flagged via configuration; failures are logged and never affect
//! the intake response.

use serde_json::json;
use tracing::{debug, warn};

use crate::config::NotifyConfig;

#[derive(Debug, Clone)]
pub struct Notifier {
    http: reqwest::Client,
    webhook_url: String,
}

impl Notifier {
    /// Build a notifier when the side-channel is enabled and configured.
    pub fn from_config(config: &NotifyConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }

        let webhook_url = config.webhook_url.clone()?;

        Some(Self {
            http: reqwest::Client::new(),
            webhook_url,
        })
    }

    /// Announce a newly created compendium. Returns immediately; the send
    /// happens in a detached task.
    pub fn compendium_created(&self, compendium_url: String, submitter: Option<String>) {
        let http = self.http.clone();
        let webhook_url = self.webhook_url.clone();

        tokio::spawn(async move {
            let text = match submitter {
                Some(who) => format!("New compendium {compendium_url} submitted by {who}"),
                None => format!("New compendium {compendium_url}"),
            };

            match http.post(&webhook_url).json(&json!({ "text": text })).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(compendium_url = %compendium_url, "notification sent");
                },
                Ok(response) => {
                    warn!(
                        status = %response.status(),
                        "notification webhook rejected message"
                    );
                },
                Err(e) => {
                    warn!(error = %e, "notification webhook unreachable");
                },
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_config_yields_no_notifier() {
        let config = NotifyConfig {
            enabled: false,
            webhook_url: Some("https://hooks.example.org/T0/B0".to_string()),
        };
        assert!(Notifier::from_config(&config).is_none());
    }

    #[test]
    fn test_enabled_without_url_yields_no_notifier() {
        let config = NotifyConfig {
            enabled: true,
            webhook_url: None,
        };
        assert!(Notifier::from_config(&config).is_none());
    }

    #[test]
    fn test_enabled_with_url_yields_notifier() {
        let config = NotifyConfig {
            enabled: true,
            webhook_url: Some("https://hooks.example.org/T0/B0".to_string()),
        };
        assert!(Notifier::from_config(&config).is_some());
    }
}
