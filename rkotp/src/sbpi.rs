//! Serial-bus programming interface
//!
//! The SBPI reaches the OTP macro's own configuration registers. The only
//! command issued here toggles the macro's read-side ECC check.

use log::{debug, error};

use crate::{
    error::Error,
    mmio::{poll_bit, RegisterIo, POLL_TIMEOUT_US},
    regs::{user::*, IntStatus},
};

/// Enable or disable the OTP macro's ECC check
pub fn set_ecc(regs: &(dyn RegisterIo + Send), enable: bool) -> Result<(), Error> {
    debug!("SBPI: {} ECC", if enable { "enabling" } else { "disabling" });

    regs.write32(
        SBPI_CTRL,
        SBPI_DAP_ADDR_MASK | (SBPI_DAP_ADDR << SBPI_DAP_ADDR_SHIFT),
    );
    regs.write32(SBPI_CMD_VALID_PRE, SBPI_CMD_VALID_MASK | 0x1);
    regs.write32(SBPI_CMD0, SBPI_DAP_CMD_WRF | SBPI_DAP_REG_ECC);
    regs.write32(
        SBPI_CMD1,
        if enable {
            SBPI_ECC_ENABLE
        } else {
            SBPI_ECC_DISABLE
        },
    );
    regs.write32(SBPI_CTRL, SBPI_ENABLE);

    poll_bit(regs, INT_STATUS, IntStatus::SBPI_DONE.bits(), POLL_TIMEOUT_US).inspect_err(|_| {
        error!("timeout during ecc_enable");
    })
}
