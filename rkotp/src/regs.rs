//! Register maps of the OTP controllers
//!
//! Rockchip controllers use "hiword mask" registers: bits `[31:16]` of a
//! write select which of bits `[15:0]` are updated.

use bitflags::bitflags;

/// Build a hiword-masked write that updates `bits` to `value`
pub const fn hiword(bits: u32, value: u32) -> u32 {
    (bits << 16) | (value & bits)
}

/// Controller with a user FSM and an SBPI side-channel (PX30, RK3308, RK3568)
pub mod user {
    use super::hiword;

    pub const SBPI_CTRL: usize = 0x0020;
    pub const SBPI_CMD_VALID_PRE: usize = 0x0024;
    pub const USER_CTRL: usize = 0x0100;
    pub const USER_ADDR: usize = 0x0104;
    pub const USER_ENABLE: usize = 0x0108;
    pub const USER_QP: usize = 0x0120;
    pub const USER_Q: usize = 0x0124;
    pub const INT_STATUS: usize = 0x0304;
    pub const SBPI_CMD0: usize = 0x1000;
    pub const SBPI_CMD1: usize = 0x1004;

    /// Smallest register window reaching every register above
    pub const WINDOW: usize = SBPI_CMD1 + 4;

    /// Write mask accompanying every address written to `USER_ADDR`
    pub const USER_ADDR_MASK: u32 = 0xFFFF_0000;

    /// Route the macro to the user interface
    pub const USE_USER: u32 = hiword(1 << 0, 1 << 0);
    /// Release the user interface
    pub const USE_USER_OFF: u32 = hiword(1 << 0, 0);
    pub const USER_FSM_ENABLE: u32 = hiword(1 << 0, 1 << 0);

    pub const SBPI_DAP_ADDR: u32 = 0x02;
    pub const SBPI_DAP_ADDR_SHIFT: u32 = 8;
    pub const SBPI_DAP_ADDR_MASK: u32 = 0xFF00_0000;
    pub const SBPI_CMD_VALID_MASK: u32 = 0xFFFF_0000;
    /// "Write register" opcode of an SBPI DAP command
    pub const SBPI_DAP_CMD_WRF: u32 = 0xC0;
    /// DAP register holding the ECC configuration
    pub const SBPI_DAP_REG_ECC: u32 = 0x3A;
    pub const SBPI_ECC_ENABLE: u32 = 0x00;
    pub const SBPI_ECC_DISABLE: u32 = 0x09;
    pub const SBPI_ENABLE: u32 = hiword(1 << 0, 1 << 0);

    /// Time for the user FSM to settle after `USE_USER`, in microseconds
    pub const USER_SETTLE_US: u32 = 5;
}

/// Controller with an auto-sequencer (RK3588)
pub mod auto {
    pub const AUTO_CTRL: usize = 0x0004;
    pub const AUTO_EN: usize = 0x0008;
    pub const DOUT0: usize = 0x0020;
    pub const INT_ST: usize = 0x0084;

    /// Smallest register window reaching every register above
    pub const WINDOW: usize = INT_ST + 4;

    pub const ADDR_SHIFT: u32 = 16;
    pub const BURST_SHIFT: u32 = 8;
    pub const BURST_NUM: u32 = 1;
    pub const AUTO_ENABLE: u32 = 1 << 0;

    /// Word offset of the region readable from the non-secure world
    pub const NON_SECURE_OFFSET: u32 = 0x300;

    /// Value for `AUTO_CTRL` starting a burst of [BURST_NUM] at `addr`
    pub const fn auto_ctrl(addr: u32) -> u32 {
        (addr << ADDR_SHIFT) | (BURST_NUM << BURST_SHIFT)
    }
}

bitflags! {
    /// Sticky completion bits of the user-FSM controller's `INT_STATUS`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IntStatus: u32 {
        const SBPI_DONE = 1 << 1;
        const USER_DONE = 1 << 2;
    }
}

bitflags! {
    /// Sticky completion bits of the auto-sequencer's `INT_ST`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AutoStatus: u32 {
        const RD_DONE = 1 << 1;
    }
}

bitflags! {
    /// ECC flags reported in `USER_QP` after each word
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EccStatus: u32 {
        const UNCORRECTABLE = 1 << 5;
        const ERR_HI = 1 << 6;
        const ERR_LO = 1 << 7;
    }
}

impl EccStatus {
    /// Does `qp` flag an error the ECC logic could not correct?
    pub fn is_uncorrectable(qp: u32) -> bool {
        let both = EccStatus::ERR_HI | EccStatus::ERR_LO;
        let status = EccStatus::from_bits_truncate(qp);

        status.contains(both) || status.contains(EccStatus::UNCORRECTABLE)
    }
}
