//! Controller node configuration
//!
//! Describes which OTP controllers exist on a board and where their
//! registers live, for hosts without a device tree to enumerate them:
//!
//! ```toml
//! [[otp]]
//! name = "otp@fe38c000"
//! compatible = "rockchip,rk3568-otp"
//! base = "fe38c000"
//! ```

use std::{fs::read_to_string, path::Path, str::FromStr};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{error::Error, targets::Generation};

/// Default size of a controller's register window
const DEFAULT_WINDOW: usize = 0x4000;

/// A configured OTP controller
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OtpNode {
    /// Name used in log messages
    pub name: String,
    /// Device-tree compatible string selecting the controller generation
    pub compatible: String,
    /// Physical address of the register window
    #[serde(
        serialize_with = "serialize_u64_to_hex",
        deserialize_with = "deserialize_hex_to_u64"
    )]
    pub base: u64,
    /// Size of the register window in bytes
    #[serde(
        default = "default_window",
        serialize_with = "serialize_usize_to_hex",
        deserialize_with = "deserialize_hex_to_usize"
    )]
    pub len: usize,
}

fn default_window() -> usize {
    DEFAULT_WINDOW
}

fn parse_hex<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let hex = String::deserialize(deserializer)?.to_lowercase();
    let hex = hex.trim_start_matches("0x");

    u64::from_str_radix(hex, 16).map_err(serde::de::Error::custom)
}

fn deserialize_hex_to_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    parse_hex(deserializer)
}

fn deserialize_hex_to_usize<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = parse_hex(deserializer)?;
    usize::try_from(value).map_err(serde::de::Error::custom)
}

fn serialize_u64_to_hex<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format!("{value:x}"))
}

fn serialize_usize_to_hex<S>(value: &usize, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format!("{value:x}"))
}

impl OtpNode {
    /// Controller generation selected by the node's compatible string
    pub fn generation(&self) -> Result<Generation, Error> {
        Generation::from_compatible(&self.compatible)
    }

    /// Map the node's register window through `/dev/mem`
    ///
    /// Windows too small for the controller's register map are rejected
    /// before anything is mapped.
    #[cfg(unix)]
    pub fn map(&self) -> Result<crate::mmio::DevMem, Error> {
        crate::otp::check_window(self.generation()?.descriptor(), self.len)?;

        Ok(crate::mmio::DevMem::map(self.base, self.len)?)
    }
}

/// Board configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Configured controllers
    #[serde(default)]
    pub otp: Vec<OtpNode>,
}

impl Config {
    /// Load and validate the configuration at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        debug!("Loading OTP configuration from {}", path.display());

        read_to_string(path)?.parse()
    }

    /// Look up a node by name
    pub fn node(&self, name: &str) -> Option<&OtpNode> {
        self.otp.iter().find(|node| node.name == name)
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(s)?;

        for node in &config.otp {
            node.generation()?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nodes_with_hex_addresses() {
        let config: Config = r#"
            [[otp]]
            name = "otp@fe38c000"
            compatible = "rockchip,rk3568-otp"
            base = "0xFE38C000"

            [[otp]]
            name = "otp@fecc0000"
            compatible = "rockchip,rk3588-otp"
            base = "fecc0000"
            len = "400"
        "#
        .parse()
        .unwrap();

        let rk3568 = config.node("otp@fe38c000").unwrap();
        assert_eq!(rk3568.base, 0xfe38_c000);
        assert_eq!(rk3568.len, DEFAULT_WINDOW);
        assert_eq!(rk3568.generation().unwrap(), Generation::Rk3568);

        let rk3588 = config.node("otp@fecc0000").unwrap();
        assert_eq!(rk3588.len, 0x400);
        assert_eq!(rk3588.generation().unwrap(), Generation::Rk3588);

        assert!(config.node("otp@0").is_none());
    }

    #[test]
    fn rejects_unknown_compatibles() {
        let result: Result<Config, _> = r#"
            [[otp]]
            name = "efuse"
            compatible = "rockchip,rk3399-efuse"
            base = "ff690000"
        "#
        .parse();

        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn rejects_invalid_hex() {
        let result: Result<Config, _> = r#"
            [[otp]]
            name = "otp"
            compatible = "rockchip,px30-otp"
            base = "ff29gg00"
        "#
        .parse();

        assert!(matches!(result, Err(Error::ConfigParse(_))));
    }

    #[cfg(unix)]
    #[test]
    fn short_windows_are_rejected_before_mapping() {
        let node = OtpNode {
            name: "otp@ff290000".into(),
            compatible: "rockchip,px30-otp".into(),
            base: 0xff29_0000,
            len: 0x400,
        };

        let err = node.map().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(ref msg) if msg.contains("0x1008")));
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config {
            otp: vec![OtpNode {
                name: "otp".into(),
                compatible: "rockchip,px30-otp".into(),
                base: 0xff29_0000,
                len: 0x4000,
            }],
        };

        let text = toml::to_string(&config).unwrap();
        assert!(text.contains(r#"base = "ff290000""#));
        assert_eq!(text.parse::<Config>().unwrap(), config);
    }
}
