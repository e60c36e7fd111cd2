use std::net::{Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 9000)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn bind_addr_from_json() {
        let c: ServerConfig = serde_json::from_str(r#"{"bind_addr": "0.0.0.0:8080"}"#).unwrap();
        assert_eq!(c.bind_addr.port(), 8080);
        let empty: ServerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, ServerConfig::default());
    }
}
