//! Byte-granular view of a registered fuse provider
//!
//! A provider registers a read callback together with [NvmemConfig]; the
//! [Nvmem] view validates the configuration and clips every request to the
//! registered size before it reaches the provider.

use std::{fmt, sync::Arc};

use log::debug;

use crate::error::Error;

/// Registration metadata of a non-volatile memory provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NvmemConfig {
    pub name: &'static str,
    /// Size of the exposed region in bytes
    pub size: usize,
    /// Minimum alignment of a request's offset, in bytes
    pub stride: usize,
    /// Minimum granularity of a request's length, in bytes
    pub word_size: usize,
    pub read_only: bool,
}

/// Read callback of a non-volatile memory provider
pub trait NvmemProvider: Send + Sync {
    /// Fill `buf` from the provider's region at `offset`
    ///
    /// Returns how many bytes were delivered.
    fn reg_read(&self, offset: u32, buf: &mut [u8]) -> Result<usize, Error>;
}

/// A registered provider
#[derive(Clone)]
pub struct Nvmem {
    config: NvmemConfig,
    provider: Arc<dyn NvmemProvider>,
}

impl fmt::Debug for Nvmem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Nvmem")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Nvmem {
    /// Register `provider` with the given configuration
    pub fn register(config: NvmemConfig, provider: Arc<dyn NvmemProvider>) -> Result<Self, Error> {
        if config.size == 0 || config.stride == 0 || config.word_size == 0 {
            return Err(Error::InvalidConfig(format!(
                "nvmem '{}' needs a non-zero size, stride and word size",
                config.name
            )));
        }

        debug!(
            "Registered nvmem '{}': {} bytes, stride {}, word size {}",
            config.name, config.size, config.stride, config.word_size
        );

        Ok(Self { config, provider })
    }

    pub fn config(&self) -> &NvmemConfig {
        &self.config
    }

    /// Validate a request of `len` bytes at `offset` and clip it to the region
    fn clip(&self, offset: u32, len: usize) -> Result<usize, Error> {
        let size = self.config.size;
        let start = offset as usize;

        if start >= size || start % self.config.stride != 0 || len % self.config.word_size != 0 {
            return Err(Error::OutOfRange { offset, len, size });
        }

        Ok(len.min(size - start))
    }

    /// Read up to `buf.len()` bytes at `offset`, clipped to the region
    pub fn read_into(&self, offset: u32, buf: &mut [u8]) -> Result<usize, Error> {
        let len = self.clip(offset, buf.len())?;
        self.provider.reg_read(offset, &mut buf[..len])
    }

    /// Read `len` bytes at `offset`, clipped to the region
    pub fn read(&self, offset: u32, len: usize) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0; self.clip(offset, len)?];
        let read = self.provider.reg_read(offset, &mut buf)?;
        buf.truncate(read);

        Ok(buf)
    }

    /// Read the whole region
    pub fn dump(&self) -> Result<Vec<u8>, Error> {
        self.read(0, self.config.size)
    }
}
