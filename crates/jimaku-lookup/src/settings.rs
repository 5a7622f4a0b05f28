//! Credential management behind the settings surface.

use crate::api::JimakuClient;
use crate::credential::Credentials;
use anyhow::{Context, Result};
use shared::API_KEY;
use tracing::{info, warn};

/// Result of offering a new API key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// The service answered 401, or the key was blank
    Rejected,
}

/// Verifies and stores API keys
pub struct CredentialSettings<'a> {
    client: &'a JimakuClient,
    credentials: &'a Credentials,
}

impl<'a> CredentialSettings<'a> {
    pub fn new(client: &'a JimakuClient, credentials: &'a Credentials) -> Self {
        Self {
            client,
            credentials,
        }
    }

    /// Check a candidate key against the service and store it if accepted
    ///
    /// Storing goes through the key-value store; watchers pick the new key
    /// up from the resulting change.
    pub async fn save(&self, candidate: &str) -> Result<SaveOutcome> {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return Ok(SaveOutcome::Rejected);
        }

        let accepted = self
            .client
            .verify_key(candidate)
            .await
            .context("Failed to verify API key")?;

        if !accepted {
            warn!("Improper API key");
            return Ok(SaveOutcome::Rejected);
        }

        self.credentials.store().set(API_KEY, &candidate)?;
        info!("API key saved");
        Ok(SaveOutcome::Saved)
    }

    /// Stored key, as the settings surface shows it on load
    pub fn restore(&self) -> Result<Option<String>> {
        self.credentials.store().get(API_KEY)
    }

    pub fn clear(&self) -> Result<()> {
        self.credentials.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::KeyValueStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_blank_key_rejected_without_request() -> Result<()> {
        let store = KeyValueStore::in_memory()?;
        let client = JimakuClient::new("http://127.0.0.1:9", "test", Duration::from_secs(1), 729)?;
        let credentials = Credentials::load(store.clone())?;
        let settings = CredentialSettings::new(&client, &credentials);

        assert_eq!(settings.save("   ").await?, SaveOutcome::Rejected);
        assert_eq!(settings.restore()?, None);

        Ok(())
    }
}
