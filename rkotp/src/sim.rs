//! Simulated OTP controller
//!
//! [SimOtp] models the register file of each controller generation on top
//! of a fuse image, together with its clock group and reset line. Every
//! access that matters for the controller protocol is appended to a shared
//! [Event] trace which tests inspect afterwards.
//!
//! Handles are cheap to clone and all of them observe the same controller,
//! so one can be handed to [Otp::probe](crate::Otp::probe) while another is
//! kept for inspection.

use std::{
    collections::HashMap,
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use crate::{
    error::ResetStage,
    gate::{ClockGroup, ResetControl},
    mmio::RegisterIo,
    otp::DeviceResources,
    regs::{auto, user, AutoStatus, IntStatus},
    targets::Generation,
};

/// Something the controller under test did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Write { offset: usize, value: u32 },
    /// Read of a data register; status polls are not recorded
    Read { offset: usize, value: u32 },
    Delay(u32),
    ClockEnable,
    ClockDisable,
    ResetAssert,
    ResetDeassert,
}

#[derive(Debug)]
struct State {
    generation: Generation,
    fuses: Vec<u8>,
    /// Last value written to registers without side effects
    latched: HashMap<usize, u32>,
    status: u32,
    q: u32,
    qp: u32,
    dout: u32,
    user_addr: u32,
    user_selected: bool,
    ecc_enabled: Option<bool>,
    ecc_faults: HashMap<u32, u32>,
    status_stuck: bool,
    clock_depth: u32,
    clock_names: Vec<&'static str>,
    in_reset: bool,
    has_reset: bool,
    fail_clock: bool,
    fail_reset: Option<ResetStage>,
    unclocked: usize,
    events: Vec<Event>,
}

/// A simulated controller, its clocks and its reset line
#[derive(Debug, Clone)]
pub struct SimOtp {
    state: Arc<Mutex<State>>,
}

impl SimOtp {
    /// A controller of `generation` whose fuse array starts with `fuses`
    ///
    /// The image is zero-padded (or truncated) to the generation's size.
    pub fn new(generation: Generation, fuses: &[u8]) -> Self {
        let mut image = fuses.to_vec();
        image.resize(generation.descriptor().size, 0);

        let state = State {
            generation,
            fuses: image,
            latched: HashMap::new(),
            status: 0,
            q: 0,
            qp: 0,
            dout: 0,
            user_addr: 0,
            user_selected: false,
            ecc_enabled: None,
            ecc_faults: HashMap::new(),
            status_stuck: false,
            clock_depth: 0,
            clock_names: Vec::new(),
            in_reset: false,
            has_reset: true,
            fail_clock: false,
            fail_reset: None,
            unclocked: 0,
            events: Vec::new(),
        };

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Describe the node without a phy reset line
    pub fn without_reset(self) -> Self {
        self.state().has_reset = false;
        self
    }

    /// Never raise completion bits, as if the macro were unclocked
    pub fn set_status_stuck(&self, stuck: bool) {
        self.state().status_stuck = stuck;
    }

    /// Report `qp` in `USER_QP` whenever word `address` is read
    pub fn inject_ecc(&self, address: u32, qp: u32) {
        self.state().ecc_faults.insert(address, qp);
    }

    pub fn clear_ecc(&self) {
        self.state().ecc_faults.clear();
    }

    pub fn fail_clock_enable(&self, fail: bool) {
        self.state().fail_clock = fail;
    }

    pub fn fail_reset(&self, stage: Option<ResetStage>) {
        self.state().fail_reset = stage;
    }

    /// Snapshot of the trace recorded so far
    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    /// Drain the trace recorded so far
    pub fn take_events(&self) -> Vec<Event> {
        std::mem::take(&mut self.state().events)
    }

    /// Register writes in the trace, as `(offset, value)`
    pub fn writes(&self) -> Vec<(usize, u32)> {
        self.state()
            .events
            .iter()
            .filter_map(|event| match *event {
                Event::Write { offset, value } => Some((offset, value)),
                _ => None,
            })
            .collect()
    }

    /// Number of clock enables not yet balanced by a disable
    pub fn clock_depth(&self) -> u32 {
        self.state().clock_depth
    }

    /// Clock names the controller asked for when it was bound
    pub fn clock_names(&self) -> Vec<&'static str> {
        self.state().clock_names.clone()
    }

    pub fn user_selected(&self) -> bool {
        self.state().user_selected
    }

    pub fn in_reset(&self) -> bool {
        self.state().in_reset
    }

    /// Last ECC setting programmed through the SBPI
    pub fn ecc_enabled(&self) -> Option<bool> {
        self.state().ecc_enabled
    }

    /// Register accesses made while the clock group was off
    pub fn unclocked_accesses(&self) -> usize {
        self.state().unclocked
    }
}

impl State {
    fn check_clocked(&mut self) {
        if self.clock_depth == 0 {
            self.unclocked += 1;
        }
    }

    fn done(&mut self, bit: u32) {
        if !self.status_stuck {
            self.status |= bit;
        }
    }

    fn status_register(&self) -> usize {
        match self.generation {
            Generation::Rk3588 => auto::INT_ST,
            _ => user::INT_STATUS,
        }
    }

    fn write_user(&mut self, offset: usize, value: u32) {
        let masked = |bit: u32| value & (bit << 16) != 0;

        match offset {
            user::USER_CTRL if masked(1) => self.user_selected = value & 1 != 0,
            user::USER_ADDR => self.user_addr = value & 0xFFFF,
            user::USER_ENABLE if masked(1) && value & 1 != 0 => {
                if !self.user_selected || self.in_reset {
                    return;
                }
                let addr = self.user_addr;
                match self.generation {
                    Generation::Px30 => {
                        self.q = self.fuses.get(addr as usize).copied().unwrap_or(0).into();
                        self.qp = 0;
                    }
                    _ => {
                        let start = addr as usize * 2;
                        let lo = self.fuses.get(start).copied().unwrap_or(0);
                        let hi = self.fuses.get(start + 1).copied().unwrap_or(0);
                        self.q = u16::from_le_bytes([lo, hi]).into();
                        self.qp = self.ecc_faults.get(&addr).copied().unwrap_or(0);
                    }
                }
                self.done(IntStatus::USER_DONE.bits());
            }
            user::SBPI_CTRL if masked(1) && value & 1 != 0 => {
                let cmd0 = self.latched.get(&user::SBPI_CMD0).copied();
                let cmd1 = self.latched.get(&user::SBPI_CMD1).copied();
                if cmd0 == Some(user::SBPI_DAP_CMD_WRF | user::SBPI_DAP_REG_ECC) {
                    self.ecc_enabled = Some(cmd1 == Some(user::SBPI_ECC_ENABLE));
                }
                self.done(IntStatus::SBPI_DONE.bits());
            }
            user::INT_STATUS => self.status &= !value,
            _ => {
                self.latched.insert(offset, value);
            }
        }
    }

    fn write_auto(&mut self, offset: usize, value: u32) {
        match offset {
            auto::AUTO_EN if value & auto::AUTO_ENABLE != 0 => {
                let ctrl = self.latched.get(&auto::AUTO_CTRL).copied().unwrap_or(0);
                let word = (ctrl >> auto::ADDR_SHIFT).checked_sub(auto::NON_SECURE_OFFSET);
                self.dout = word
                    .and_then(|word| self.fuses.get(word as usize * 4..word as usize * 4 + 4))
                    .map(|bytes| u32::from_le_bytes(bytes.try_into().unwrap_or_default()))
                    .unwrap_or(0);
                self.done(AutoStatus::RD_DONE.bits());
            }
            auto::INT_ST => self.status &= !value,
            _ => {
                self.latched.insert(offset, value);
            }
        }
    }

    fn read(&self, offset: usize) -> u32 {
        if offset == self.status_register() {
            return self.status;
        }
        match (self.generation, offset) {
            (Generation::Rk3588, auto::DOUT0) => self.dout,
            (Generation::Rk3588, _) => self.latched.get(&offset).copied().unwrap_or(0),
            (_, user::USER_Q) => self.q,
            (_, user::USER_QP) => self.qp,
            _ => self.latched.get(&offset).copied().unwrap_or(0),
        }
    }
}

impl RegisterIo for SimOtp {
    fn write32(&self, offset: usize, value: u32) {
        let mut state = self.state();
        state.check_clocked();
        state.events.push(Event::Write { offset, value });

        match state.generation {
            Generation::Rk3588 => state.write_auto(offset, value),
            _ => state.write_user(offset, value),
        }
    }

    fn read32(&self, offset: usize) -> u32 {
        let mut state = self.state();
        state.check_clocked();

        let value = state.read(offset);
        if offset != state.status_register() {
            state.events.push(Event::Read { offset, value });
        }
        value
    }

    fn read8(&self, offset: usize) -> u8 {
        self.read32(offset) as u8
    }

    fn udelay(&self, us: u32) {
        self.state().events.push(Event::Delay(us));

        let start = Instant::now();
        while start.elapsed() < Duration::from_micros(us.into()) {
            std::hint::spin_loop();
        }
    }
}

impl ClockGroup for SimOtp {
    fn enable(&mut self) -> io::Result<()> {
        let mut state = self.state();
        if state.fail_clock {
            return Err(io::Error::other("simulated clock failure"));
        }
        state.clock_depth += 1;
        state.events.push(Event::ClockEnable);
        Ok(())
    }

    fn disable(&mut self) {
        let mut state = self.state();
        state.clock_depth = state.clock_depth.saturating_sub(1);
        state.events.push(Event::ClockDisable);
    }
}

impl ResetControl for SimOtp {
    fn assert(&mut self) -> io::Result<()> {
        let mut state = self.state();
        if state.fail_reset == Some(ResetStage::Assert) {
            return Err(io::Error::other("simulated reset failure"));
        }
        state.in_reset = true;
        state.status = 0;
        state.events.push(Event::ResetAssert);
        Ok(())
    }

    fn deassert(&mut self) -> io::Result<()> {
        let mut state = self.state();
        if state.fail_reset == Some(ResetStage::Deassert) {
            return Err(io::Error::other("simulated reset failure"));
        }
        state.in_reset = false;
        state.events.push(Event::ResetDeassert);
        Ok(())
    }
}

impl DeviceResources for SimOtp {
    fn registers(&mut self) -> io::Result<Box<dyn RegisterIo + Send>> {
        Ok(Box::new(self.clone()))
    }

    fn clocks(&mut self, names: &'static [&'static str]) -> io::Result<Box<dyn ClockGroup + Send>> {
        self.state().clock_names = names.to_vec();
        Ok(Box::new(self.clone()))
    }

    fn reset(&mut self) -> io::Result<Option<Box<dyn ResetControl + Send>>> {
        if self.state().has_reset {
            Ok(Some(Box::new(self.clone())))
        } else {
            Ok(None)
        }
    }
}
