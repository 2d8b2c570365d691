use log::{debug, error, trace};

use super::{Descriptor, Generation, UserInterface};
use crate::{
    error::Error,
    gate::{reset_pulse, ClockGuard},
    mmio::{poll_bit, POLL_TIMEOUT_US},
    otp::Hardware,
    regs::{user::*, IntStatus},
    sbpi,
};

pub(super) static DESCRIPTOR: Descriptor = Descriptor {
    generation: Generation::Px30,
    size: 0x40,
    clocks: &["otp", "apb_pclk", "phy"],
    word_size: 1,
    clamp_length: false,
    window: WINDOW,
    read: Some(read),
    init: None,
};

/// Read one byte per user-FSM cycle, with the macro's ECC check disabled
fn read(hw: &mut Hardware, offset: u32, buf: &mut [u8]) -> Result<(), Error> {
    let Hardware {
        regs,
        clocks,
        reset,
    } = hw;
    let regs = &**regs;

    debug!("PX30 OTP: reading {} bytes at {offset:#x}", buf.len());

    let _clocks = ClockGuard::enable(&mut **clocks)?;

    reset_pulse(regs, reset.as_deref_mut()).inspect_err(|_| error!("failed to reset otp phy"))?;
    sbpi::set_ecc(regs, false)?;

    let _user = UserInterface::select(regs);

    for (addr, byte) in (offset..).zip(buf.iter_mut()) {
        regs.write32(USER_ADDR, addr | USER_ADDR_MASK);
        regs.write32(USER_ENABLE, USER_FSM_ENABLE);
        poll_bit(regs, INT_STATUS, IntStatus::USER_DONE.bits(), POLL_TIMEOUT_US)
            .inspect_err(|_| error!("timeout during read setup"))?;

        *byte = regs.read8(USER_Q);
        trace!("byte {addr:#x}: {byte:#04x}");
    }

    Ok(())
}
