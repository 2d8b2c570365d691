//! Supported OTP controller generations
//!
//! Each generation is described by a static [Descriptor] holding its fuse
//! size, the clocks it needs and the engine which performs a read. Device
//! nodes select a generation through their compatible string.

use log::trace;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, VariantNames};

use crate::{error::Error, otp::Hardware, regs::user, RegisterIo};

mod px30;
mod rk3568;
mod rk3588;

/// Reads `buf.len()` bytes starting at the byte offset into `buf`
///
/// The dispatcher guarantees the range lies inside the fuse array and holds
/// the controller lock for the whole call.
pub type ReadFn = fn(hw: &mut Hardware, offset: u32, buf: &mut [u8]) -> Result<(), Error>;

/// One-shot controller setup, run once when the device is bound
pub type InitFn = fn(hw: &mut Hardware) -> Result<(), Error>;

/// All supported controller generations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, VariantNames)]
#[non_exhaustive]
#[strum(serialize_all = "lowercase")]
pub enum Generation {
    /// PX30 and RK3308: byte-wide reads through the user FSM, ECC off
    Px30,
    /// RK3568: 16-bit words through the user FSM, ECC checked
    Rk3568,
    /// RK3588: 32-bit words through the auto-sequencer
    Rk3588,
}

/// Compatible strings and the generation each of them binds
const COMPATIBLE: &[(&str, Generation)] = &[
    ("rockchip,px30-otp", Generation::Px30),
    ("rockchip,rk3308-otp", Generation::Px30),
    ("rockchip,rk3568-otp", Generation::Rk3568),
    ("rockchip,rk3588-otp", Generation::Rk3588),
];

impl Generation {
    /// Look up the generation bound to a device-tree compatible string
    pub fn from_compatible(compatible: &str) -> Result<Self, Error> {
        COMPATIBLE
            .iter()
            .find(|(name, _)| *name == compatible)
            .map(|(_, generation)| *generation)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown compatible '{compatible}'")))
    }

    /// Every compatible string which binds this generation
    pub fn compatibles(&self) -> impl Iterator<Item = &'static str> + '_ {
        COMPATIBLE
            .iter()
            .filter(move |(_, generation)| generation == self)
            .map(|(name, _)| *name)
    }

    /// The static description of this generation
    pub fn descriptor(&self) -> &'static Descriptor {
        match self {
            Generation::Px30 => &px30::DESCRIPTOR,
            Generation::Rk3568 => &rk3568::DESCRIPTOR,
            Generation::Rk3588 => &rk3588::DESCRIPTOR,
        }
    }

    /// All generations, in table order
    pub fn all() -> impl Iterator<Item = Generation> {
        Generation::iter()
    }
}

/// Generation-specific parameters of an OTP controller
#[derive(Debug)]
pub struct Descriptor {
    pub generation: Generation,
    /// Number of fuse bytes exposed to consumers
    pub size: usize,
    /// Members of the clock group which must run during a read
    pub clocks: &'static [&'static str],
    /// Native word size of the read engine, in bytes
    pub word_size: usize,
    /// Clamp requests running past the end of the array instead of
    /// rejecting them
    pub clamp_length: bool,
    /// Smallest register window the engine stays inside of, in bytes
    pub window: usize,
    pub read: Option<ReadFn>,
    pub init: Option<InitFn>,
}

/// Word-aligned span covering a byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WordWindow {
    /// Address of the first word
    pub start: u32,
    /// Number of words to read
    pub count: usize,
    /// Bytes to skip in the first word
    pub leading: usize,
}

impl WordWindow {
    pub fn new(offset: u32, len: usize, word_size: usize) -> Self {
        let offset = offset as usize;
        let start = offset / word_size;
        let end = (offset + len).div_ceil(word_size);

        Self {
            start: start as u32,
            count: end - start,
            leading: offset % word_size,
        }
    }

    /// Number of bytes the words of this window span
    pub fn bytes(&self, word_size: usize) -> usize {
        self.count * word_size
    }
}

/// Allocate a zeroed scratch buffer, reporting allocation failure
pub(crate) fn scratch(len: usize) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::OutOfMemory(len))?;
    buf.resize(len, 0);

    Ok(buf)
}

/// Selects the user interface of the OTP macro while alive
///
/// Releasing the interface on drop keeps the macro consistent on every exit
/// path of a read.
pub(crate) struct UserInterface<'a> {
    regs: &'a (dyn RegisterIo + Send),
}

impl<'a> UserInterface<'a> {
    pub fn select(regs: &'a (dyn RegisterIo + Send)) -> Self {
        regs.write32(user::USER_CTRL, user::USE_USER);
        regs.udelay(user::USER_SETTLE_US);

        Self { regs }
    }
}

impl Drop for UserInterface<'_> {
    fn drop(&mut self) {
        trace!("Releasing OTP user interface");
        self.regs.write32(user::USER_CTRL, user::USE_USER_OFF);
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn compatible_strings_resolve() {
        assert_eq!(
            Generation::from_compatible("rockchip,rk3308-otp").unwrap(),
            Generation::Px30
        );
        assert_eq!(
            Generation::from_compatible("rockchip,rk3588-otp").unwrap(),
            Generation::Rk3588
        );
        assert!(matches!(
            Generation::from_compatible("rockchip,rk3399-efuse"),
            Err(Error::InvalidConfig(_))
        ));
        assert_eq!(
            Generation::Px30.compatibles().collect::<Vec<_>>(),
            ["rockchip,px30-otp", "rockchip,rk3308-otp"]
        );
    }

    #[test]
    fn every_generation_has_a_compatible_and_an_engine() {
        for generation in Generation::all() {
            let desc = generation.descriptor();
            assert_eq!(desc.generation, generation);
            assert!(desc.read.is_some());
            assert!(generation.compatibles().count() > 0);
            assert_eq!(Generation::from_str(&generation.to_string()).unwrap(), generation);
        }
    }

    #[test]
    fn descriptor_table() {
        let px30 = Generation::Px30.descriptor();
        assert_eq!((px30.size, px30.word_size), (64, 1));
        assert_eq!(px30.clocks, ["otp", "apb_pclk", "phy"]);

        let rk3568 = Generation::Rk3568.descriptor();
        assert_eq!((rk3568.size, rk3568.word_size), (128, 2));
        assert_eq!(rk3568.clocks, ["usr", "sbpi", "apb", "phy"]);

        let rk3588 = Generation::Rk3588.descriptor();
        assert_eq!((rk3588.size, rk3588.word_size), (1024, 4));
        assert_eq!(rk3588.clocks, ["otpc", "apb", "arb", "phy"]);
        assert!(rk3588.clamp_length);
        assert!(!rk3568.clamp_length && !px30.clamp_length);

        assert_eq!((px30.window, rk3568.window), (0x1008, 0x1008));
        assert_eq!(rk3588.window, 0x88);
    }

    #[test]
    fn word_windows() {
        // Starts and ends mid-word.
        assert_eq!(
            WordWindow::new(1, 4, 2),
            WordWindow {
                start: 0,
                count: 3,
                leading: 1
            }
        );
        assert_eq!(
            WordWindow::new(0x10, 8, 4),
            WordWindow {
                start: 4,
                count: 2,
                leading: 0
            }
        );
        assert_eq!(
            WordWindow::new(1021, 3, 4),
            WordWindow {
                start: 255,
                count: 1,
                leading: 1
            }
        );
        assert_eq!(WordWindow::new(6, 5, 4).bytes(4), 12);
    }

    #[test]
    fn scratch_is_zeroed() {
        assert_eq!(scratch(6).unwrap(), [0; 6]);
        assert!(matches!(scratch(usize::MAX), Err(Error::OutOfMemory(usize::MAX))));
    }
}
