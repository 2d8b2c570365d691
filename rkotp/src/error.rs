//! Library errors

use std::io;

use miette::Diagnostic;
use strum::{Display, VariantNames};
use thiserror::Error;

use crate::targets::Generation;

/// All possible errors returned by rkotp
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Read of {len} bytes at offset {offset:#x} is outside of the {size} byte fuse array")]
    #[diagnostic(
        code(rkotp::out_of_range),
        help("Requests must start inside the fuse array; only the RK3588 clamps their length")
    )]
    OutOfRange { offset: u32, len: usize, size: usize },

    #[error("Failed to allocate a {0} byte scratch buffer")]
    #[diagnostic(code(rkotp::oom))]
    OutOfMemory(usize),

    #[error("Failed to prepare/enable the OTP clock group")]
    #[diagnostic(code(rkotp::clock))]
    Clock(#[source] io::Error),

    #[error("Failed to {stage} the OTP phy reset line")]
    #[diagnostic(code(rkotp::reset))]
    Reset {
        stage: ResetStage,
        #[source]
        source: io::Error,
    },

    #[error("Timed out after {timeout_us}us waiting for {mask:#x} in register {register:#06x}")]
    #[diagnostic(
        code(rkotp::timeout),
        help("The OTP macro did not signal completion, check that its clocks are running")
    )]
    Timeout {
        register: usize,
        mask: u32,
        timeout_us: u32,
    },

    #[error("Uncorrectable ECC error reading word {address:#x} (qp = {qp:#x})")]
    #[diagnostic(code(rkotp::ecc))]
    Ecc { address: u32, qp: u32 },

    #[error("Invalid controller configuration: {0}")]
    #[diagnostic(
        code(rkotp::invalid_config),
        help("Supported controllers are: {}", Generation::VARIANTS.join(", "))
    )]
    InvalidConfig(String),

    #[error("Failed to parse configuration file")]
    #[diagnostic(code(rkotp::config_parse))]
    ConfigParse(#[from] toml::de::Error),

    #[error(transparent)]
    #[diagnostic(code(rkotp::io))]
    Io(#[from] io::Error),
}

impl Error {
    /// Is this the error returned when the OTP macro never signalled
    /// completion?
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

/// Which half of a reset pulse failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ResetStage {
    Assert,
    Deassert,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_register() {
        let err = Error::Timeout {
            register: 0x304,
            mask: 0x4,
            timeout_us: 10_000,
        };
        assert!(err.is_timeout());
        assert_eq!(
            err.to_string(),
            "Timed out after 10000us waiting for 0x4 in register 0x0304"
        );

        let err = Error::Reset {
            stage: ResetStage::Deassert,
            source: io::Error::other("busy"),
        };
        assert_eq!(err.to_string(), "Failed to deassert the OTP phy reset line");
    }
}
