//! Register access for the OTP controller
//!
//! The [RegisterIo] trait abstracts over how the controller's register file
//! is reached. [MmioRegion] implements it with volatile loads and stores on a
//! mapped window; the simulated controller used in tests implements it on top
//! of a register model.

use std::{
    hint::spin_loop,
    ptr::NonNull,
    sync::atomic::{fence, Ordering},
    time::{Duration, Instant},
};

use crate::error::Error;

/// Upper bound on every status poll, in microseconds
pub const POLL_TIMEOUT_US: u32 = 10_000;
/// Interval between two reads of a polled status register, in microseconds
pub const POLL_PERIOD_US: u32 = 1;

/// Typed access to a controller's register file at `base + offset`
pub trait RegisterIo {
    /// Store a 32-bit value; the write has completed when this returns
    fn write32(&self, offset: usize, value: u32);

    /// Load a 32-bit value
    fn read32(&self, offset: usize) -> u32;

    /// Load a single byte
    fn read8(&self, offset: usize) -> u8;

    /// Busy-wait for at least `us` microseconds without yielding
    fn udelay(&self, us: u32) {
        spin_for(Duration::from_micros(us.into()));
    }

    /// Size of the reachable register window in bytes, if it is bounded
    fn window(&self) -> Option<usize> {
        None
    }
}

impl<T: RegisterIo + ?Sized> RegisterIo for Box<T> {
    fn write32(&self, offset: usize, value: u32) {
        (**self).write32(offset, value)
    }

    fn read32(&self, offset: usize) -> u32 {
        (**self).read32(offset)
    }

    fn read8(&self, offset: usize) -> u8 {
        (**self).read8(offset)
    }

    fn udelay(&self, us: u32) {
        (**self).udelay(us)
    }

    fn window(&self) -> Option<usize> {
        (**self).window()
    }
}

/// Poll the register at `offset` until every bit of `mask` is set
///
/// The register is sampled every [POLL_PERIOD_US] for at most `timeout_us`.
/// The status bits are sticky, so on success they are cleared by writing
/// `mask` back to the same register.
pub fn poll_bit<R: RegisterIo + ?Sized>(
    regs: &R,
    offset: usize,
    mask: u32,
    timeout_us: u32,
) -> Result<(), Error> {
    let deadline = Instant::now() + Duration::from_micros(timeout_us.into());

    loop {
        if regs.read32(offset) & mask == mask {
            break;
        }
        if Instant::now() >= deadline {
            // One last sample, the deadline may have passed while we were
            // descheduled between two reads.
            if regs.read32(offset) & mask == mask {
                break;
            }
            return Err(Error::Timeout {
                register: offset,
                mask,
                timeout_us,
            });
        }
        regs.udelay(POLL_PERIOD_US);
    }

    regs.write32(offset, mask);

    Ok(())
}

fn spin_for(duration: Duration) {
    let start = Instant::now();
    while start.elapsed() < duration {
        spin_loop();
    }
}

/// A mapped window onto a controller's register file
#[derive(Debug)]
pub struct MmioRegion {
    base: NonNull<u8>,
    len: usize,
}

// SAFETY: the region is a device mapping with no thread-affine state; every
// access is a single volatile load or store.
unsafe impl Send for MmioRegion {}

impl MmioRegion {
    /// Wrap an already mapped register window
    ///
    /// # Safety
    ///
    /// `base` must point to `len` bytes of device memory that stay mapped for
    /// the lifetime of the returned value, and `base` must be 4-byte aligned.
    pub unsafe fn new(base: NonNull<u8>, len: usize) -> Self {
        Self { base, len }
    }

    /// Size of the mapped window in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    fn reg<T>(&self, offset: usize) -> *mut T {
        assert!(
            offset + std::mem::size_of::<T>() <= self.len,
            "register offset {offset:#x} outside of {:#x} byte window",
            self.len
        );
        // SAFETY: bounds checked above, the window is valid per `new`.
        unsafe { self.base.as_ptr().add(offset).cast() }
    }
}

impl RegisterIo for MmioRegion {
    fn write32(&self, offset: usize, value: u32) {
        fence(Ordering::Release);
        // SAFETY: `reg` yields an in-bounds, aligned device address.
        unsafe { self.reg::<u32>(offset).write_volatile(value) };
        fence(Ordering::SeqCst);
    }

    fn read32(&self, offset: usize) -> u32 {
        // SAFETY: see `write32`.
        let value = unsafe { self.reg::<u32>(offset).read_volatile() };
        fence(Ordering::Acquire);
        value
    }

    fn read8(&self, offset: usize) -> u8 {
        // SAFETY: see `write32`.
        let value = unsafe { self.reg::<u8>(offset).read_volatile() };
        fence(Ordering::Acquire);
        value
    }

    fn window(&self) -> Option<usize> {
        Some(self.len)
    }
}

#[cfg(unix)]
pub use self::devmem::DevMem;

#[cfg(unix)]
mod devmem {
    use std::{fs::OpenOptions, io, os::fd::AsRawFd, ptr::NonNull};

    use log::debug;

    use super::{MmioRegion, RegisterIo};

    /// A register window mapped from `/dev/mem`
    ///
    /// The mapping is released when the value is dropped.
    #[derive(Debug)]
    pub struct DevMem {
        region: MmioRegion,
        map_len: usize,
        page_offset: usize,
        map_base: NonNull<libc::c_void>,
    }

    // SAFETY: same reasoning as for `MmioRegion`, the mapping is owned.
    unsafe impl Send for DevMem {}

    impl DevMem {
        /// Map `len` bytes of physical address space starting at `phys`
        pub fn map(phys: u64, len: usize) -> io::Result<Self> {
            // SAFETY: sysconf has no preconditions.
            let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as u64;
            let (file_offset, page_offset, map_len) = layout(phys, len, page)?;

            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open("/dev/mem")?;

            debug!("Mapping {len:#x} bytes of /dev/mem at {phys:#x}");

            // SAFETY: a fresh shared mapping of a file descriptor we own; the
            // kernel validates the range.
            let ptr = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    map_len,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED,
                    file.as_raw_fd(),
                    file_offset,
                )
            };
            if ptr == libc::MAP_FAILED {
                return Err(io::Error::last_os_error());
            }
            let map_base = NonNull::new(ptr).ok_or_else(|| io::Error::other("null mapping"))?;

            // SAFETY: the mapping covers `page_offset + len` bytes and lives
            // as long as `self`.
            let region = unsafe {
                MmioRegion::new(
                    NonNull::new_unchecked(map_base.as_ptr().cast::<u8>().add(page_offset)),
                    len,
                )
            };

            Ok(Self {
                region,
                map_len,
                page_offset,
                map_base,
            })
        }

        /// Offset of the register window inside the first mapped page
        pub fn page_offset(&self) -> usize {
            self.page_offset
        }
    }

    impl RegisterIo for DevMem {
        fn write32(&self, offset: usize, value: u32) {
            self.region.write32(offset, value)
        }

        fn read32(&self, offset: usize) -> u32 {
            self.region.read32(offset)
        }

        fn read8(&self, offset: usize) -> u8 {
            self.region.read8(offset)
        }

        fn window(&self) -> Option<usize> {
            self.region.window()
        }
    }

    /// Page-aligned file offset, offset of `phys` inside its page and total
    /// mapping length for a window of `len` bytes at `phys`
    fn layout(phys: u64, len: usize, page: u64) -> io::Result<(libc::off_t, usize, usize)> {
        let page_offset = (phys % page) as usize;
        let map_len = len
            .checked_add(page_offset)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "window too large"))?;
        let file_offset = libc::off_t::try_from(phys - page_offset as u64).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{phys:#x} is not addressable through /dev/mem on this target"),
            )
        })?;

        Ok((file_offset, page_offset, map_len))
    }

    impl Drop for DevMem {
        fn drop(&mut self) {
            // SAFETY: unmapping exactly what `map` mapped.
            unsafe { libc::munmap(self.map_base.as_ptr(), self.map_len) };
        }
    }

}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;

    /// Status register that reports `mask` after a fixed number of reads
    struct Delayed {
        reads_left: Cell<u32>,
        writes: RefCell<Vec<(usize, u32)>>,
    }

    impl RegisterIo for Delayed {
        fn write32(&self, offset: usize, value: u32) {
            self.writes.borrow_mut().push((offset, value));
        }

        fn read32(&self, _offset: usize) -> u32 {
            match self.reads_left.get() {
                0 => 0x4,
                n => {
                    self.reads_left.set(n - 1);
                    0
                }
            }
        }

        fn read8(&self, _offset: usize) -> u8 {
            0
        }

        fn udelay(&self, _us: u32) {}
    }

    #[test]
    fn poll_clears_the_sticky_bit() {
        let regs = Delayed {
            reads_left: Cell::new(3),
            writes: RefCell::new(Vec::new()),
        };

        poll_bit(&regs, 0x304, 0x4, POLL_TIMEOUT_US).unwrap();

        assert_eq!(*regs.writes.borrow(), [(0x304, 0x4)]);
    }

    #[test]
    fn poll_gives_up_after_the_timeout() {
        let regs = Delayed {
            reads_left: Cell::new(u32::MAX),
            writes: RefCell::new(Vec::new()),
        };

        let start = Instant::now();
        let err = poll_bit(&regs, 0x84, 0x2, 500).unwrap_err();

        assert!(start.elapsed() >= Duration::from_micros(500));
        assert!(matches!(
            err,
            Error::Timeout {
                register: 0x84,
                mask: 0x2,
                timeout_us: 500
            }
        ));
        assert!(regs.writes.borrow().is_empty());
    }

    #[test]
    fn mmio_region_round_trips_through_memory() {
        let mut backing = [0u32; 4];
        let base = NonNull::new(backing.as_mut_ptr().cast::<u8>()).unwrap();
        // SAFETY: `backing` outlives `region` and is 4-byte aligned.
        let region = unsafe { MmioRegion::new(base, 16) };

        assert_eq!(region.window(), Some(16));
        region.write32(0x8, 0x1234_5678);

        assert_eq!(region.read32(0x8), 0x1234_5678);
        assert_eq!(region.read8(0x8), 0x1234_5678u32.to_ne_bytes()[0]);
        drop(region);
        assert_eq!(backing[2], 0x1234_5678);
    }
}
