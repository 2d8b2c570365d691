//! Bind and read an OTP controller
//!
//! The [Otp] struct is the controller context: it owns the register window,
//! clock group and reset line of one device and serialises every read behind
//! a single lock. Reads are dispatched to the engine of the controller's
//! [Generation].

use std::{
    fmt, io,
    sync::{Arc, Mutex, PoisonError},
};

use log::{debug, error, info};

use crate::{
    error::Error,
    gate::{ClockGroup, ResetControl},
    mmio::RegisterIo,
    nvmem::{NvmemConfig, NvmemProvider},
    targets::{Descriptor, Generation},
};

/// Name under which every controller registers with the nvmem layer
pub const NVMEM_NAME: &str = "rockchip-otp";

/// Hardware resources owned by a controller
pub struct Hardware {
    pub regs: Box<dyn RegisterIo + Send>,
    pub clocks: Box<dyn ClockGroup + Send>,
    pub reset: Option<Box<dyn ResetControl + Send>>,
}

impl fmt::Debug for Hardware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hardware")
            .field("reset", &self.reset.is_some())
            .finish_non_exhaustive()
    }
}

/// Source of the resources a device node describes
///
/// Implemented by whatever enumerates devices on the platform.
pub trait DeviceResources {
    /// Map the controller's register window
    fn registers(&mut self) -> io::Result<Box<dyn RegisterIo + Send>>;

    /// Look up the clock group made of the clocks named `names`
    fn clocks(&mut self, names: &'static [&'static str]) -> io::Result<Box<dyn ClockGroup + Send>>;

    /// Look up the phy reset line, which is optional
    fn reset(&mut self) -> io::Result<Option<Box<dyn ResetControl + Send>>>;
}

/// A bound OTP controller
pub struct Otp {
    name: String,
    descriptor: &'static Descriptor,
    hw: Mutex<Hardware>,
}

impl fmt::Debug for Otp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Otp")
            .field("name", &self.name)
            .field("generation", &self.descriptor.generation)
            .finish_non_exhaustive()
    }
}

impl Otp {
    /// Bind the controller described by `compatible`
    ///
    /// Resources are acquired in the order registers, clocks, reset; the
    /// generation's init hook runs last. The returned handle is what gets
    /// registered with the nvmem layer.
    pub fn probe(
        name: impl Into<String>,
        compatible: &str,
        resources: &mut dyn DeviceResources,
    ) -> Result<Arc<Self>, Error> {
        let name = name.into();
        let generation = Generation::from_compatible(compatible).inspect_err(|_| {
            error!("{name}: failed to get match data for '{compatible}'");
        })?;
        let descriptor = generation.descriptor();

        let hw = Hardware {
            regs: resources.registers()?,
            clocks: resources.clocks(descriptor.clocks)?,
            reset: resources.reset()?,
        };

        let otp = Self::new(name, descriptor, hw)?;
        info!(
            "{}: bound {} OTP controller ({} bytes)",
            otp.name, generation, descriptor.size
        );

        Ok(Arc::new(otp))
    }

    /// Create a controller from already acquired resources
    ///
    /// Rejects a register window too small for the generation's register
    /// map, then runs the descriptor's init hook, if it has one.
    pub fn new(
        name: impl Into<String>,
        descriptor: &'static Descriptor,
        mut hw: Hardware,
    ) -> Result<Self, Error> {
        let name = name.into();

        if let Some(window) = hw.regs.window() {
            check_window(descriptor, window).inspect_err(|e| error!("{name}: {e}"))?;
        }

        if let Some(init) = descriptor.init {
            debug!("{name}: running controller init");
            init(&mut hw).inspect_err(|e| error!("{name}: init failed: {e}"))?;
        }

        Ok(Self {
            name,
            descriptor,
            hw: Mutex::new(hw),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &'static Descriptor {
        self.descriptor
    }

    /// Registration metadata for the nvmem layer
    pub fn nvmem_config(&self) -> NvmemConfig {
        NvmemConfig {
            name: NVMEM_NAME,
            size: self.descriptor.size,
            stride: 1,
            word_size: 1,
            read_only: true,
        }
    }

    /// Read fuse bytes starting at `offset` into `buf`
    ///
    /// Returns the number of bytes delivered, which is less than `buf.len()`
    /// only when the generation clamps requests running past the end of the
    /// array. Concurrent callers are served one at a time.
    pub fn read(&self, offset: u32, buf: &mut [u8]) -> Result<usize, Error> {
        let mut hw = self.hw.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(read) = self.descriptor.read else {
            error!("{}: no read strategy bound", self.name);
            return Err(Error::InvalidConfig(format!(
                "{} controller has no read strategy",
                self.descriptor.generation
            )));
        };

        let len = self.checked_len(offset, buf.len())?;
        if len == 0 {
            return Ok(0);
        }

        read(&mut *hw, offset, &mut buf[..len]).inspect_err(|e| {
            error!(
                "{}: read of {len} bytes at {offset:#x} failed: {e}",
                self.name
            );
        })?;

        Ok(len)
    }

    /// Validate a request against the fuse size, clamping where allowed
    fn checked_len(&self, offset: u32, len: usize) -> Result<usize, Error> {
        let size = self.descriptor.size;
        let out_of_range = Error::OutOfRange { offset, len, size };

        let start = offset as usize;
        if start >= size {
            error!("{}: {out_of_range}", self.name);
            return Err(out_of_range);
        }

        let available = size - start;
        if len <= available {
            Ok(len)
        } else if self.descriptor.clamp_length {
            debug!("{}: clamping {len} byte read to {available}", self.name);
            Ok(available)
        } else {
            error!("{}: {out_of_range}", self.name);
            Err(out_of_range)
        }
    }
}

/// Fail unless a register window of `window` bytes covers every register the
/// generation's engine accesses
pub(crate) fn check_window(descriptor: &Descriptor, window: usize) -> Result<(), Error> {
    if window < descriptor.window {
        return Err(Error::InvalidConfig(format!(
            "{:#x} byte register window is too small for a {} controller, which needs {:#x}",
            window, descriptor.generation, descriptor.window
        )));
    }

    Ok(())
}

impl NvmemProvider for Otp {
    fn reg_read(&self, offset: u32, buf: &mut [u8]) -> Result<usize, Error> {
        self.read(offset, buf)
    }
}
