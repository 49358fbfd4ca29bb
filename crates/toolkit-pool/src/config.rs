//! Pool configuration.

use serde::Deserialize;

use crate::error::PoolError;

/// Configuration for a connection pool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Connection target handed to the connector (e.g. `host:port`).
    pub url: String,

    /// Driver identifier checked once when the pool is created.
    pub driver: String,

    /// Maximum number of live connections (idle plus lent out).
    pub max_connections: u32,

    /// Number of connections created eagerly when the pool is created.
    pub initial_connections: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            url: "localhost:5432".to_string(),
            driver: "tcp".to_string(),
            max_connections: 10,
            initial_connections: 1,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a connection string into configuration.
    ///
    /// Supports ADO.NET-style connection strings:
    /// ```text
    /// Url=db.internal:5432;Driver=tcp;Max Pool Size=20;Min Pool Size=5;
    /// ```
    pub fn from_connection_string(conn_str: &str) -> Result<Self, PoolError> {
        let mut config = Self::default();

        for part in conn_str.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| PoolError::Configuration(format!("invalid key-value: {part}")))?;

            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "url" | "server" | "data source" | "host" => {
                    config.url = value.to_string();
                }
                "driver" => {
                    config.driver = value.to_string();
                }
                "max pool size" | "max connections" => {
                    config.max_connections = parse_size(&key, value)?;
                }
                "min pool size" | "initial pool size" | "initial connections" => {
                    config.initial_connections = parse_size(&key, value)?;
                }
                _ => {
                    tracing::debug!(
                        key = key,
                        value = value,
                        "ignoring unknown connection string option"
                    );
                }
            }
        }

        Ok(config)
    }

    /// Set the connection target.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the driver identifier.
    #[must_use]
    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    /// Set the maximum number of live connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.max_connections = count;
        self
    }

    /// Set the number of connections created up front.
    #[must_use]
    pub fn initial_connections(mut self, count: u32) -> Self {
        self.initial_connections = count;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_connections == 0 {
            return Err(PoolError::Configuration(
                "max_connections must be at least 1".into(),
            ));
        }
        if self.initial_connections > self.max_connections {
            return Err(PoolError::Configuration(format!(
                "initial_connections ({}) exceeds max_connections ({})",
                self.initial_connections, self.max_connections
            )));
        }
        if self.url.trim().is_empty() {
            return Err(PoolError::Configuration("url must not be empty".into()));
        }
        if self.driver.trim().is_empty() {
            return Err(PoolError::Configuration("driver must not be empty".into()));
        }
        Ok(())
    }
}

fn parse_size(key: &str, value: &str) -> Result<u32, PoolError> {
    value
        .parse()
        .map_err(|_| PoolError::Configuration(format!("invalid {key}: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PoolConfig::new();
        assert_eq!(config.driver, "tcp");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.initial_connections, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_connection_string_parsing() {
        let config = PoolConfig::from_connection_string(
            "Url=db.internal:5432;Driver=tcp;Max Pool Size=20;Min Pool Size=5;",
        )
        .unwrap();

        assert_eq!(config.url, "db.internal:5432");
        assert_eq!(config.driver, "tcp");
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.initial_connections, 5);
    }

    #[test]
    fn test_connection_string_ignores_unknown_keys() {
        let config =
            PoolConfig::from_connection_string("Server=10.0.0.1:9000;Application Name=load")
                .unwrap();

        assert_eq!(config.url, "10.0.0.1:9000");
        assert_eq!(config.max_connections, 10);
    }

    #[test]
    fn test_connection_string_rejects_bad_size() {
        let err = PoolConfig::from_connection_string("Max Pool Size=lots").unwrap_err();
        assert!(matches!(err, PoolError::Configuration(_)));

        let err = PoolConfig::from_connection_string("Driver").unwrap_err();
        assert!(matches!(err, PoolError::Configuration(_)));
    }

    #[test]
    fn test_validate_rejects_oversized_initial_batch() {
        let config = PoolConfig::new().max_connections(2).initial_connections(3);
        assert!(matches!(
            config.validate(),
            Err(PoolError::Configuration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_max() {
        let config = PoolConfig::new().max_connections(0).initial_connections(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_identifiers() {
        assert!(PoolConfig::new().url(" ").validate().is_err());
        assert!(PoolConfig::new().driver("").validate().is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: PoolConfig =
            serde_json::from_str(r#"{"url": "cache:6379", "max_connections": 4}"#).unwrap();

        assert_eq!(config.url, "cache:6379");
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.driver, "tcp");
        assert_eq!(config.initial_connections, 1);
    }
}
