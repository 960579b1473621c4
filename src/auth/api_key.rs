//! API key authentication for gateway clients.
//!
//! Keys are configured out of band and held hashed; the plaintext never
//! lives in memory past startup.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Metadata for a configured API key.
#[derive(Debug, Clone)]
pub struct ApiKeyInfo {
    /// Unique identifier for this key.
    pub key_id: String,
    /// Client application the key belongs to.
    pub client: String,
    /// Whether this key is active.
    pub active: bool,
}

/// API key validator and store.
#[derive(Clone)]
pub struct ApiKeyValidator {
    /// Map of hashed keys to their info.
    keys: Arc<RwLock<HashMap<String, ApiKeyInfo>>>,
}

impl ApiKeyValidator {
    /// Create a new validator with initial keys from config.
    pub fn new(configured_keys: Vec<ConfiguredApiKey>) -> Self {
        let mut keys = HashMap::new();

        for key in configured_keys {
            let hashed = Self::hash_key(&key.key);
            keys.insert(
                hashed,
                ApiKeyInfo {
                    key_id: key.id,
                    client: key.client,
                    active: true,
                },
            );
        }

        Self {
            keys: Arc::new(RwLock::new(keys)),
        }
    }

    /// Hash an API key for storage and comparison.
    pub fn hash_key(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Validate an API key and return its info if valid.
    pub async fn validate(&self, key: &str) -> Option<ApiKeyInfo> {
        let hashed = Self::hash_key(key);
        let keys = self.keys.read().await;

        keys.get(&hashed).filter(|info| info.active).cloned()
    }

    /// Revoke an API key by its ID (for runtime management).
    #[allow(dead_code)]
    pub async fn revoke_key(&self, key_id: &str) {
        let mut keys = self.keys.write().await;
        for info in keys.values_mut() {
            if info.key_id == key_id {
                info.active = false;
            }
        }
    }
}

/// API key configuration from config file.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ConfiguredApiKey {
    /// Unique ID for the key.
    pub id: String,
    /// The actual API key value.
    pub key: String,
    /// Client application the key belongs to.
    pub client: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Vec<ConfiguredApiKey> {
        vec![ConfiguredApiKey {
            id: "key-1".to_string(),
            key: "ak-test-key-12345".to_string(),
            client: "travel-bot".to_string(),
        }]
    }

    #[tokio::test]
    async fn test_api_key_validation() {
        let validator = ApiKeyValidator::new(configured());

        let result = validator.validate("ak-test-key-12345").await;
        assert!(result.is_some());
        assert_eq!(result.unwrap().client, "travel-bot");

        assert!(validator.validate("wrong-key").await.is_none());
    }

    #[tokio::test]
    async fn test_key_revocation() {
        let validator = ApiKeyValidator::new(configured());
        assert!(validator.validate("ak-test-key-12345").await.is_some());

        validator.revoke_key("key-1").await;
        assert!(validator.validate("ak-test-key-12345").await.is_none());
    }
}
