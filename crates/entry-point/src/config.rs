use alloy_chains::Chain;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::{path::Path, str::FromStr};
use tollgate_primitives::constants::entry_point;

/// Entry point configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPointConfig {
    /// Address the entry point is deployed at (part of every user operation hash)
    #[serde(rename = "entryPointContract")]
    pub address: Address,
    /// Chain the entry point is deployed on (part of every user operation hash)
    pub chain: Chain,
}

impl EntryPointConfig {
    pub fn new(address: Address, chain: Chain) -> Self {
        Self { address, chain }
    }

    pub fn dev() -> Self {
        Self {
            address: Address::from_str(entry_point::ADDRESS).unwrap_or_default(),
            chain: Chain::dev(),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain.id()
    }

    pub fn from_json(json: &str) -> eyre::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

impl Default for EntryPointConfig {
    fn default() -> Self {
        Self::dev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_config() {
        let config = EntryPointConfig::default();
        assert_eq!(config.chain_id(), 1337);
        assert_eq!(config.address, Address::from_str(entry_point::ADDRESS).unwrap());
    }

    #[test]
    fn config_from_json() -> eyre::Result<()> {
        let config = EntryPointConfig::from_json(
            r#"{"entryPointContract":"0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789","chain":1}"#,
        )?;
        assert_eq!(config.chain_id(), 1);
        assert_eq!(config.address, Address::from_str(entry_point::ADDRESS)?);

        let json = serde_json::to_string(&config)?;
        assert_eq!(EntryPointConfig::from_json(&json)?, config);

        assert!(EntryPointConfig::from_json(r#"{"chain":1}"#).is_err());
        Ok(())
    }
}
