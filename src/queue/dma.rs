// SPDX-License-Identifier: GPL-3.0-only

//! Contiguous DMA memory allocator
//!
//! Hands out physically contiguous, page aligned regions from a fixed bus
//! address window, first fit.

use crate::errors::{FimcError, FimcResult};
use tracing::{debug, warn};

/// Allocation granularity
pub const DMA_ALIGN: u64 = 4096;

/// A contiguous region of DMA memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaBuffer {
    /// Bus address of the first byte
    pub addr: u64,
    /// Requested length in bytes
    pub len: u64,
}

/// First-fit allocator over `[base, base + size)`
#[derive(Debug)]
pub struct DmaAllocator {
    base: u64,
    size: u64,
    /// Live allocations as (addr, aligned length), sorted by address
    live: Vec<(u64, u64)>,
}

impl DmaAllocator {
    pub fn new(base: u64, size: u64) -> Self {
        Self {
            base,
            size,
            live: Vec::new(),
        }
    }

    /// Total bytes currently handed out, including alignment padding
    pub fn used(&self) -> u64 {
        self.live.iter().map(|(_, len)| len).sum()
    }

    pub fn allocations(&self) -> usize {
        self.live.len()
    }

    /// Allocate `len` bytes
    pub fn alloc(&mut self, len: u64) -> FimcResult<DmaBuffer> {
        if len == 0 {
            return Err(FimcError::InvalidArgument(
                "zero-sized DMA allocation".to_string(),
            ));
        }
        let aligned = len.div_ceil(DMA_ALIGN) * DMA_ALIGN;

        let mut candidate = self.base;
        let mut insert_at = self.live.len();
        for (i, &(addr, alen)) in self.live.iter().enumerate() {
            if candidate + aligned <= addr {
                insert_at = i;
                break;
            }
            candidate = addr + alen;
        }

        if candidate + aligned > self.base + self.size {
            warn!(len, used = self.used(), "DMA pool exhausted");
            return Err(FimcError::NoMemory(format!(
                "cannot allocate {} bytes of DMA memory",
                len
            )));
        }

        self.live.insert(insert_at, (candidate, aligned));
        debug!(addr = format!("{:#x}", candidate), len, "DMA alloc");
        Ok(DmaBuffer {
            addr: candidate,
            len,
        })
    }

    /// Return a region to the pool; unknown regions are ignored
    pub fn free(&mut self, buf: DmaBuffer) {
        match self.live.iter().position(|&(addr, _)| addr == buf.addr) {
            Some(pos) => {
                self.live.remove(pos);
                debug!(addr = format!("{:#x}", buf.addr), "DMA free");
            }
            None => warn!(addr = format!("{:#x}", buf.addr), "Freeing unknown DMA region"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_is_page_aligned_and_contiguous() {
        let mut dma = DmaAllocator::new(0x1000_0000, 0x10_0000);
        let a = dma.alloc(100).unwrap();
        let b = dma.alloc(5000).unwrap();
        assert_eq!(a.addr, 0x1000_0000);
        assert_eq!(b.addr, 0x1000_1000);
        assert_eq!(dma.used(), 3 * DMA_ALIGN);
    }

    #[test]
    fn test_free_reuses_gap() {
        let mut dma = DmaAllocator::new(0, 4 * DMA_ALIGN);
        let a = dma.alloc(DMA_ALIGN).unwrap();
        let _b = dma.alloc(DMA_ALIGN).unwrap();
        dma.free(a);
        let c = dma.alloc(10).unwrap();
        assert_eq!(c.addr, a.addr);
    }

    #[test]
    fn test_exhaustion() {
        let mut dma = DmaAllocator::new(0, 2 * DMA_ALIGN);
        dma.alloc(2 * DMA_ALIGN).unwrap();
        assert!(matches!(dma.alloc(1), Err(FimcError::NoMemory(_))));
        assert!(matches!(dma.alloc(0), Err(FimcError::InvalidArgument(_))));
    }
}
