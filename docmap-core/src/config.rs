//! Connection settings for a document client.

use serde::{Deserialize, Serialize};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Where a client connects and which collection it binds.
///
/// Backends read `url` and `database` when they are built; the client binds `collection`.
///
/// ```ignore
/// let config = ClientConfig::from_json(r#"{
///     "url": "mongodb://localhost:27017",
///     "database": "local",
///     "collection": "articles"
/// }"#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Store connection string.
    pub url: String,
    /// Database holding the bound collection.
    pub database: String,
    /// Name of the bound collection.
    pub collection: String,
}

impl ClientConfig {
    pub fn new(
        url: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Serialization`] on malformed JSON and
    /// [`DocumentStoreError::Configuration`] if any setting is empty.
    pub fn from_json(json: &str) -> DocumentStoreResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;

        Ok(config)
    }

    /// Checks that every setting is present.
    pub fn validate(&self) -> DocumentStoreResult<()> {
        for (name, value) in [
            ("url", &self.url),
            ("database", &self.database),
            ("collection", &self.collection),
        ] {
            if value.trim().is_empty() {
                return Err(DocumentStoreError::Configuration(format!("{name} must not be empty")));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_settings() {
        let config = ClientConfig::from_json(
            r#"{ "url": "mongodb://localhost:27017", "database": "local", "collection": "testCollection" }"#,
        )
        .unwrap();

        assert_eq!(config, ClientConfig::new("mongodb://localhost:27017", "local", "testCollection"));
    }

    #[test]
    fn rejects_missing_settings() {
        assert!(matches!(
            ClientConfig::from_json(r#"{ "url": "mongodb://localhost", "database": "local" }"#),
            Err(DocumentStoreError::Serialization(_))
        ));
    }

    #[test]
    fn rejects_empty_settings() {
        assert!(matches!(
            ClientConfig::from_json(r#"{ "url": "mongodb://localhost", "database": "", "collection": "c" }"#),
            Err(DocumentStoreError::Configuration(message)) if message.contains("database")
        ));
    }
}
