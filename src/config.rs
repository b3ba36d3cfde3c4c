use alloc::{string::String, vec::Vec};

#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};

use crate::tables::MAX_NONCES;

pub const CONTENT_TIMEOUT_S: u64 = 300;
pub const INTEREST_TIMEOUT_S: u64 = 40;
pub const FACE_TIMEOUT_S: u64 = 150;
pub const MAX_INTEREST_RETRANSMIT: u32 = 20;
pub const AGEING_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "std", serde(default))]
pub struct RelayConfig {
    /// Zero disables caching, negative means unbounded.
    pub max_cache_entries: i64,
    pub max_nonces: usize,
    pub ageing_interval_ms: u64,
    pub content_timeout_s: u64,
    pub interest_timeout_s: u64,
    pub face_timeout_s: u64,
    pub max_interest_retransmit: u32,
    pub interfaces: Vec<InterfaceConfig>,
    pub routes: Vec<RouteConfig>,
}

/// A transport endpoint, e.g. `address = "0.0.0.0:9695"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "std", serde(default))]
pub struct InterfaceConfig {
    pub address: String,
    /// Zero sends every packet whole.
    pub mtu: usize,
    pub reflect: bool,
    pub forward_all_interests: bool,
    /// Gap between two transmissions, unpaced when absent.
    pub pacing_us: Option<u64>,
}

/// A FIB rule sending `prefix` to the face at `next_hop` on interface `interface`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub struct RouteConfig {
    pub prefix: String,
    pub suite: String,
    pub interface: usize,
    pub next_hop: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_cache_entries: 0,
            max_nonces: MAX_NONCES,
            ageing_interval_ms: AGEING_INTERVAL_MS,
            content_timeout_s: CONTENT_TIMEOUT_S,
            interest_timeout_s: INTEREST_TIMEOUT_S,
            face_timeout_s: FACE_TIMEOUT_S,
            max_interest_retransmit: MAX_INTEREST_RETRANSMIT,
            interfaces: Vec::new(),
            routes: Vec::new(),
        }
    }
}

#[cfg(feature = "std")]
impl RelayConfig {
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self, crate::error::RelayError> {
        if !path.as_ref().exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), crate::error::RelayError> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn from_toml(contents: &str) -> Result<Self, crate::error::RelayError> {
        toml::from_str(contents).map_err(|e| crate::error::RelayError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, crate::error::RelayError> {
        toml::to_string_pretty(self).map_err(|e| crate::error::RelayError::Config(e.to_string()))
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = RelayConfig::from_toml(
            r#"
            max_cache_entries = 50

            [[interfaces]]
            address = "0.0.0.0:9695"
            mtu = 1400

            [[routes]]
            prefix = "/ndn/edu"
            suite = "ndn2013"
            interface = 0
            next_hop = "10.0.0.2:6363"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_cache_entries, 50);
        assert_eq!(config.interest_timeout_s, INTEREST_TIMEOUT_S);
        assert_eq!(config.interfaces[0].mtu, 1400);
        assert!(!config.interfaces[0].reflect);
        assert_eq!(config.routes[0].next_hop, "10.0.0.2:6363");
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("ccn-relay-config-{}.toml", std::process::id()));
        let mut config = RelayConfig::default();
        config.max_cache_entries = -1;
        config.interfaces.push(InterfaceConfig {
            address: "127.0.0.1:9695".into(),
            pacing_us: Some(500),
            ..Default::default()
        });
        config.save(&path).unwrap();
        assert_eq!(RelayConfig::load(&path).unwrap(), config);
        std::fs::remove_file(&path).unwrap();

        // Missing file means defaults
        assert_eq!(RelayConfig::load(&path).unwrap(), RelayConfig::default());
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            RelayConfig::from_toml("max_cache_entries = \"many\""),
            Err(crate::error::RelayError::Config(_))
        ));
    }
}
