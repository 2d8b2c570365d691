use log::{debug, error, trace};

use super::{scratch, Descriptor, Generation, UserInterface, WordWindow};
use crate::{
    error::Error,
    gate::{reset_pulse, ClockGuard},
    mmio::{poll_bit, POLL_TIMEOUT_US},
    otp::Hardware,
    regs::{user::*, EccStatus, IntStatus},
    sbpi,
};

/// Bytes per fuse word
const NBYTES: usize = 2;

pub(super) static DESCRIPTOR: Descriptor = Descriptor {
    generation: Generation::Rk3568,
    size: 0x80,
    clocks: &["usr", "sbpi", "apb", "phy"],
    word_size: NBYTES,
    clamp_length: false,
    window: WINDOW,
    read: Some(read),
    init: None,
};

/// Read 16-bit words through the user FSM with the macro's ECC check enabled
///
/// Any word flagged as uncorrectable fails the whole request before a single
/// byte reaches `buf`.
fn read(hw: &mut Hardware, offset: u32, buf: &mut [u8]) -> Result<(), Error> {
    let window = WordWindow::new(offset, buf.len(), NBYTES);
    let mut words = scratch(window.bytes(NBYTES))?;

    debug!(
        "RK3568 OTP: reading {} words from {:#x} for {} bytes at {offset:#x}",
        window.count,
        window.start,
        buf.len()
    );

    let Hardware {
        regs,
        clocks,
        reset,
    } = hw;
    let regs = &**regs;

    let _clocks = ClockGuard::enable(&mut **clocks)?;

    reset_pulse(regs, reset.as_deref_mut()).inspect_err(|_| error!("failed to reset otp phy"))?;
    sbpi::set_ecc(regs, true)?;

    let user = UserInterface::select(regs);

    for (addr, word) in (window.start..).zip(words.chunks_exact_mut(NBYTES)) {
        regs.write32(USER_ADDR, addr | USER_ADDR_MASK);
        regs.write32(USER_ENABLE, USER_FSM_ENABLE);
        poll_bit(regs, INT_STATUS, IntStatus::USER_DONE.bits(), POLL_TIMEOUT_US)
            .inspect_err(|_| error!("timeout during read setup"))?;

        let qp = regs.read32(USER_QP);
        if EccStatus::is_uncorrectable(qp) {
            error!("ecc check error during read setup");
            return Err(Error::Ecc { address: addr, qp });
        }

        let value = regs.read32(USER_Q);
        word.copy_from_slice(&value.to_le_bytes()[..NBYTES]);
        trace!("word {addr:#x}: {value:#06x} (qp {qp:#x})");
    }

    drop(user);

    buf.copy_from_slice(&words[window.leading..][..buf.len()]);

    Ok(())
}
