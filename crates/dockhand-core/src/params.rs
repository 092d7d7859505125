//! Connection parameters for the ephemeral dependency.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Static description of how to reach the dependency once it is running.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParameters {
    /// URI scheme of the descriptor.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(alias = "server")]
    pub host: String,
    pub port: u16,
    /// Logical database or service name.
    pub service: String,
    pub username: String,
    pub password: String,
    /// TLS toggle. Only rendered together with a wallet location.
    #[serde(default, alias = "ssl")]
    pub tls: Option<bool>,
    /// Wallet or credential bundle location.
    #[serde(default, alias = "walletLocation")]
    pub wallet_location: Option<String>,
}

fn default_scheme() -> String {
    "oracle".to_string()
}

impl ConnectionParameters {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        service: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            scheme: default_scheme(),
            host: host.into(),
            port,
            service: service.into(),
            username: username.into(),
            password: password.into(),
            tls: None,
            wallet_location: None,
        }
    }

    /// Set the URI scheme.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Set the wallet location.
    pub fn with_wallet(mut self, location: impl Into<String>) -> Self {
        self.wallet_location = Some(location.into());
        self
    }

    /// Set the TLS toggle.
    pub fn with_tls(mut self, enabled: bool) -> Self {
        self.tls = Some(enabled);
        self
    }

    /// Wallet location, treating an empty value as absent.
    pub fn wallet(&self) -> Option<&str> {
        self.wallet_location
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty())
    }

    /// Check that every required field is present.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("scheme", &self.scheme),
            ("host", &self.host),
            ("service", &self.service),
            ("username", &self.username),
            ("password", &self.password),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(Error::MalformedConnectionParameters(format!(
                "{field} must not be empty"
            )));
        }
        if self.port == 0 {
            return Err(Error::MalformedConnectionParameters(
                "port must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("service", &self.service)
            .field("username", &self.username)
            .field("password", &"***")
            .field("tls", &self.tls)
            .field("wallet_location", &self.wallet_location)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConnectionParameters {
        ConnectionParameters::new("localhost", 1521, "orclpdb1", "admin", "secret")
    }

    #[test]
    fn test_valid_parameters() {
        assert!(params().validate().is_ok());
    }

    #[test]
    fn test_empty_field_rejected() {
        let mut p = params();
        p.service = "  ".to_string();
        let err = p.validate().unwrap_err();
        assert!(matches!(err, Error::MalformedConnectionParameters(ref m) if m.contains("service")));
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut p = params();
        p.port = 0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_empty_wallet_is_absent() {
        assert_eq!(params().with_wallet("").wallet(), None);
        assert_eq!(params().with_wallet("/w").wallet(), Some("/w"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", params());
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn test_deserialize_accepts_alias_keys() {
        let json = r#"{
            "server": "db.local",
            "port": 1521,
            "service": "orclpdb1",
            "username": "admin",
            "password": "secret",
            "walletLocation": "",
            "ssl": true
        }"#;
        let p: ConnectionParameters = serde_json::from_str(json).unwrap();
        assert_eq!(p.host, "db.local");
        assert_eq!(p.scheme, "oracle");
        assert_eq!(p.tls, Some(true));
        assert_eq!(p.wallet(), None);
    }
}
