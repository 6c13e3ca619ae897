//! Process configuration read from the environment.
//!
//! `main` loads a `.env` file first (when present) so local runs can keep
//! settings next to the binary.

use std::net::SocketAddr;

use thiserror::Error;

use nimbus_pipeline::DuplicateQuery;

pub const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is required when {reason}")]
    Missing { var: &'static str, reason: &'static str },

    #[error("invalid {var}='{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Where events are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    InMemory,
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// `true` when `JWT_SECRET` was unset and the dev default is in use.
    pub insecure_jwt_secret: bool,
    pub persistence: Persistence,
    pub duplicates: DuplicateQuery,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same rules as `from_env` over an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = parse_or("NIMBUS_BIND_ADDR", get("NIMBUS_BIND_ADDR"), "0.0.0.0:8080".parse().ok())?;

        let (jwt_secret, insecure_jwt_secret) = match get("JWT_SECRET") {
            Some(secret) => (secret, false),
            None => (DEV_JWT_SECRET.to_string(), true),
        };

        let persistent = match get("USE_PERSISTENT_STORES") {
            Some(v) => parse_bool("USE_PERSISTENT_STORES", &v)?,
            None => false,
        };
        let persistence = if persistent {
            let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing {
                var: "DATABASE_URL",
                reason: "USE_PERSISTENT_STORES is enabled",
            })?;
            let max_connections = parse_or("DATABASE_MAX_CONNECTIONS", get("DATABASE_MAX_CONNECTIONS"), Some(10))?;
            Persistence::Postgres {
                database_url,
                max_connections,
            }
        } else {
            Persistence::InMemory
        };

        let defaults = DuplicateQuery::default();
        let duplicates = DuplicateQuery {
            threshold: parse_or("DUPLICATE_THRESHOLD", get("DUPLICATE_THRESHOLD"), Some(defaults.threshold))?,
            limit: parse_or("DUPLICATE_LIMIT", get("DUPLICATE_LIMIT"), Some(defaults.limit))?,
        };
        duplicates.validate().map_err(|e| ConfigError::Invalid {
            var: "DUPLICATE_THRESHOLD/DUPLICATE_LIMIT",
            value: format!("{}/{}", duplicates.threshold, duplicates.limit),
            reason: e.to_string(),
        })?;

        Ok(Self {
            bind_addr,
            jwt_secret,
            insecure_jwt_secret,
            persistence,
            duplicates,
        })
    }
}

fn parse_or<T>(var: &'static str, raw: Option<String>, default: Option<T>) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: value.clone(),
            reason: e.to_string(),
        }),
        None => default.ok_or(ConfigError::Missing {
            var,
            reason: "no default exists",
        }),
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "expected true or false".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_apply_to_an_empty_environment() {
        let c = config(&[]).unwrap();
        assert_eq!(c.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(c.jwt_secret, DEV_JWT_SECRET);
        assert!(c.insecure_jwt_secret);
        assert_eq!(c.persistence, Persistence::InMemory);
        assert_eq!(c.duplicates, DuplicateQuery::default());
    }

    #[test]
    fn persistent_stores_need_a_database_url() {
        let err = config(&[("USE_PERSISTENT_STORES", "true")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { var: "DATABASE_URL", .. }));

        let c = config(&[
            ("USE_PERSISTENT_STORES", "1"),
            ("DATABASE_URL", "postgres://localhost/nimbus"),
        ])
        .unwrap();
        assert_eq!(
            c.persistence,
            Persistence::Postgres {
                database_url: "postgres://localhost/nimbus".into(),
                max_connections: 10,
            }
        );
    }

    #[test]
    fn duplicate_settings_are_validated() {
        let c = config(&[("DUPLICATE_THRESHOLD", "75.5"), ("DUPLICATE_LIMIT", "3")]).unwrap();
        assert_eq!(c.duplicates.threshold, 75.5);
        assert_eq!(c.duplicates.limit, 3);

        assert!(config(&[("DUPLICATE_THRESHOLD", "120")]).is_err());
        assert!(config(&[("DUPLICATE_LIMIT", "0")]).is_err());
        assert!(config(&[("DUPLICATE_LIMIT", "many")]).is_err());
    }

    #[test]
    fn explicit_secret_and_address_win() {
        let c = config(&[("JWT_SECRET", "s3cret"), ("NIMBUS_BIND_ADDR", "127.0.0.1:9000")]).unwrap();
        assert_eq!(c.jwt_secret, "s3cret");
        assert!(!c.insecure_jwt_secret);
        assert_eq!(c.bind_addr.port(), 9000);
        assert!(config(&[("NIMBUS_BIND_ADDR", "nowhere")]).is_err());
    }
}
