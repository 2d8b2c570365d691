use log::{debug, error, trace};

use super::{scratch, Descriptor, Generation, WordWindow};
use crate::{
    error::Error,
    gate::ClockGuard,
    mmio::{poll_bit, POLL_TIMEOUT_US},
    otp::Hardware,
    regs::{auto::*, AutoStatus},
};

/// Bytes per fuse word
const NBYTES: usize = 4;

pub(super) static DESCRIPTOR: Descriptor = Descriptor {
    generation: Generation::Rk3588,
    size: 0x400,
    clocks: &["otpc", "apb", "arb", "phy"],
    word_size: NBYTES,
    clamp_length: true,
    window: WINDOW,
    read: Some(read),
    init: None,
};

/// Read 32-bit words of the non-secure region through the auto-sequencer
///
/// Unlike the user-FSM controllers the phy is not reset before a read.
fn read(hw: &mut Hardware, offset: u32, buf: &mut [u8]) -> Result<(), Error> {
    let mut window = WordWindow::new(offset, buf.len(), NBYTES);
    window.start += NON_SECURE_OFFSET;
    let mut words = scratch(window.bytes(NBYTES))?;

    debug!(
        "RK3588 OTP: reading {} words from {:#x} for {} bytes at {offset:#x}",
        window.count,
        window.start,
        buf.len()
    );

    let regs = &*hw.regs;
    let _clocks = ClockGuard::enable(&mut *hw.clocks)?;

    for (addr, word) in (window.start..).zip(words.chunks_exact_mut(NBYTES)) {
        regs.write32(AUTO_CTRL, auto_ctrl(addr));
        regs.write32(AUTO_EN, AUTO_ENABLE);
        poll_bit(regs, INT_ST, AutoStatus::RD_DONE.bits(), POLL_TIMEOUT_US)
            .inspect_err(|_| error!("timeout during read setup"))?;

        let value = regs.read32(DOUT0);
        word.copy_from_slice(&value.to_le_bytes());
        trace!("word {addr:#x}: {value:#010x}");
    }

    buf.copy_from_slice(&words[window.leading..][..buf.len()]);

    Ok(())
}
