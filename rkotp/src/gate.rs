//! Clock and reset gating around controller accesses
//!
//! Clock groups and reset lines belong to other subsystems; the controller
//! only needs to switch them, so both are modelled as small traits.

use std::io;

use log::error;

use crate::{
    error::{Error, ResetStage},
    mmio::RegisterIo,
};

/// Minimum time the phy reset is held asserted, in microseconds
pub const RESET_HOLD_US: u32 = 2;

/// A named group of clocks which is enabled and disabled as a unit
pub trait ClockGroup {
    /// Prepare and enable every clock of the group
    ///
    /// Either all clocks end up running or, on error, none of them do.
    fn enable(&mut self) -> io::Result<()>;

    /// Disable and unprepare every clock of the group
    fn disable(&mut self);
}

/// A reset line to the OTP phy
pub trait ResetControl {
    fn assert(&mut self) -> io::Result<()>;

    fn deassert(&mut self) -> io::Result<()>;
}

/// Keeps a clock group enabled for as long as it is alive
pub struct ClockGuard<'a> {
    clocks: &'a mut (dyn ClockGroup + Send),
}

impl<'a> ClockGuard<'a> {
    /// Enable `clocks`, disabling them again when the guard is dropped
    pub fn enable(clocks: &'a mut (dyn ClockGroup + Send)) -> Result<Self, Error> {
        clocks.enable().map_err(|e| {
            error!("failed to prepare/enable clks: {e}");
            Error::Clock(e)
        })?;

        Ok(Self { clocks })
    }
}

impl Drop for ClockGuard<'_> {
    fn drop(&mut self) {
        self.clocks.disable();
    }
}

/// Pulse the phy reset line, if the controller has one
///
/// The line is held asserted for [RESET_HOLD_US]. Without a reset line this
/// is a no-op.
pub fn reset_pulse<R: ResetControl + ?Sized>(
    regs: &(dyn RegisterIo + Send),
    reset: Option<&mut R>,
) -> Result<(), Error> {
    let Some(reset) = reset else {
        return Ok(());
    };

    reset.assert().map_err(|source| {
        error!("failed to assert otp phy: {source}");
        Error::Reset {
            stage: ResetStage::Assert,
            source,
        }
    })?;

    regs.udelay(RESET_HOLD_US);

    reset.deassert().map_err(|source| {
        error!("failed to deassert otp phy: {source}");
        Error::Reset {
            stage: ResetStage::Deassert,
            source,
        }
    })
}
