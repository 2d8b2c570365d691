//! Read-only access to Rockchip OTP fuse controllers
//!
//! Three generations of controller are supported, each with its own register
//! protocol, behind one byte-granular read interface:
//!
//! - PX30 / RK3308: byte reads through the user FSM
//! - RK3568: 16-bit word reads through the user FSM with the ECC check
//!   enabled over the SBPI side-channel
//! - RK3588: 32-bit word reads through the auto-sequencer
//!
//! A controller is bound with [Otp::probe] from its compatible string and
//! the [DeviceResources] describing it, then read directly with [Otp::read]
//! or through the byte-granular [Nvmem] view it registers.
//!
//! ## Cargo Features
//!
//! - `logger`: provides [logging::initialize_logger] on top of `env_logger`
//!   (enabled by default)
//! - `sim`: a simulated controller for exercising the read engines without
//!   hardware

#![cfg_attr(docsrs, feature(doc_cfg))]

pub use self::{
    config::{Config, OtpNode},
    error::Error,
    gate::{ClockGroup, ResetControl},
    mmio::{MmioRegion, RegisterIo},
    nvmem::{Nvmem, NvmemConfig, NvmemProvider},
    otp::{DeviceResources, Hardware, Otp},
    targets::{Descriptor, Generation},
};

pub mod config;
pub mod error;
pub mod gate;
pub mod mmio;
pub mod nvmem;
pub mod otp;
pub mod regs;
pub mod sbpi;
pub mod targets;

#[cfg(feature = "logger")]
#[cfg_attr(docsrs, doc(cfg(feature = "logger")))]
pub mod logging;

#[cfg(any(test, feature = "sim"))]
#[cfg_attr(docsrs, doc(cfg(feature = "sim")))]
pub mod sim;
