use std::env;

use thiserror::Error;

/// One year.
const MAX_JWT_TTL_HOURS: i64 = 24 * 366;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub mongo_uri: String,
    pub database_name: String,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub bind_addr: String,
    pub frontend_origin: String,
    /// Google sign-in is disabled when unset.
    pub google_client_id: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests can feed a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_ttl_hours = match lookup("JWT_TTL_HOURS") {
            Some(raw) => match raw.parse::<i64>() {
                Ok(h) if (1..=MAX_JWT_TTL_HOURS).contains(&h) => h,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "JWT_TTL_HOURS",
                        value: raw,
                    })
                }
            },
            None => 24,
        };

        Ok(Self {
            mongo_uri: lookup("MONGO_URI").ok_or(ConfigError::Missing("MONGO_URI"))?,
            database_name: lookup("DATABASE_NAME").unwrap_or_else(|| "codeflow".to_string()),
            jwt_secret: lookup("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?,
            jwt_ttl_hours,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            frontend_origin: lookup("FRONTEND_ORIGIN")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            google_client_id: lookup("GOOGLE_CLIENT_ID").filter(|s| !s.trim().is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_optional_keys_are_absent() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("MONGO_URI", "mongodb://localhost:27017"),
            ("JWT_SECRET", "s3cret"),
        ]))
        .unwrap();
        assert_eq!(cfg.database_name, "codeflow");
        assert_eq!(cfg.jwt_ttl_hours, 24);
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert_eq!(cfg.frontend_origin, "http://localhost:3000");
        assert!(cfg.google_client_id.is_none());
    }

    #[test]
    fn missing_secret_is_reported() {
        let err = Config::from_lookup(lookup_from(&[("MONGO_URI", "mongodb://x")])).unwrap_err();
        assert_eq!(err.to_string(), "JWT_SECRET must be set");
    }

    #[test]
    fn bad_ttl_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("MONGO_URI", "mongodb://x"),
            ("JWT_SECRET", "s"),
            ("JWT_TTL_HOURS", "-3"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "JWT_TTL_HOURS", .. }));
    }

    #[test]
    fn huge_ttl_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("MONGO_URI", "mongodb://x"),
            ("JWT_SECRET", "s"),
            ("JWT_TTL_HOURS", "9223372036854775807"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "JWT_TTL_HOURS", .. }));

        let cfg = Config::from_lookup(lookup_from(&[
            ("MONGO_URI", "mongodb://x"),
            ("JWT_SECRET", "s"),
            ("JWT_TTL_HOURS", "8784"),
        ]))
        .unwrap();
        assert_eq!(cfg.jwt_ttl_hours, 8784);
    }

    #[test]
    fn blank_google_client_id_disables_google_sign_in() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("MONGO_URI", "mongodb://x"),
            ("JWT_SECRET", "s"),
            ("GOOGLE_CLIENT_ID", "  "),
        ]))
        .unwrap();
        assert!(cfg.google_client_id.is_none());
    }
}
