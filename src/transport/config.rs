use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;

use super::TransportError;

/// Plover writes the port either as a string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Port {
    Number(u16),
    Text(String),
}

impl Port {
    pub fn as_u16(&self) -> Option<u16> {
        match self {
            Port::Number(n) => Some(*n),
            Port::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Number(n) => write!(f, "{n}"),
            Port::Text(s) => f.write_str(s),
        }
    }
}

/// Contents of `plover_websocket_server_config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PloverServerConfig {
    #[serde(default)]
    pub host: String,
    pub port: Option<Port>,
    #[serde(default)]
    pub public_key: String,
}

impl PloverServerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TransportError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| TransportError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), TransportError> {
        if self.host.trim().is_empty() {
            return Err(TransportError::InvalidConfig("host is not set".into()));
        }
        if self.public_key.trim().is_empty() {
            return Err(TransportError::InvalidConfig("public_key is not set".into()));
        }
        self.port()?;
        Ok(())
    }

    pub fn port(&self) -> Result<u16, TransportError> {
        let port = self
            .port
            .as_ref()
            .ok_or_else(|| TransportError::InvalidConfig("port is not set".into()))?;
        port.as_u16()
            .ok_or_else(|| TransportError::InvalidConfig(format!("invalid port {port}")))
    }
}
