// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! The storage interfaces packs are programmed through.
//!
//! All sector, page and block numbers are offset from zero. A device that
//! is a partition of a larger flash adds the partition offset in its
//! implementation.

use crate::error_codes::ErrorCode;

/// A sector addressed device: SD, eMMC or SPI NOR.
///
/// ```rust
/// use nuwriter::error_codes::ErrorCode;
/// use nuwriter::storage::BlockDevice;
///
/// struct Card {}
///
/// impl BlockDevice for Card {
///     fn sector_size(&self) -> usize {
///         512
///     }
///
///     fn sector_count(&self) -> usize {
///         1 << 20
///     }
///
///     fn read_sector(&self, sector: usize, buf: &mut [u8]) -> Result<(), ErrorCode> {
///         unimplemented!()
///     }
///
///     fn write_sector(&self, sector: usize, buf: &[u8]) -> Result<(), ErrorCode> {
///         unimplemented!()
///     }
/// }
/// ```
pub trait BlockDevice {
    /// Bytes per sector. Every `buf` passed in has exactly this length.
    fn sector_size(&self) -> usize;

    fn sector_count(&self) -> usize;

    /// Read one sector into `buf`. On failure return `ErrorCode::ReadFail`.
    fn read_sector(&self, sector: usize, buf: &mut [u8]) -> Result<(), ErrorCode>;

    /// Write one sector from `buf`. On failure return `ErrorCode::WriteFail`.
    fn write_sector(&self, sector: usize, buf: &[u8]) -> Result<(), ErrorCode>;
}

/// A page programmed, block erased device: SPI NAND or raw NAND.
pub trait NandDevice {
    /// Bytes per page, without the spare area.
    fn page_size(&self) -> usize;

    fn pages_per_block(&self) -> usize;

    fn block_count(&self) -> usize;

    /// Bytes erased together.
    fn erase_size(&self) -> usize {
        self.page_size() * self.pages_per_block()
    }

    fn is_bad_block(&self, block: usize) -> bool;

    /// On failure return `ErrorCode::EraseFail`.
    fn erase_block(&self, block: usize) -> Result<(), ErrorCode>;

    /// Read page `page`, counted from the start of the device.
    fn read_page(&self, page: usize, buf: &mut [u8]) -> Result<(), ErrorCode>;

    /// Program page `page`, counted from the start of the device. The page
    /// belongs to a block erased before.
    fn write_page(&self, page: usize, buf: &[u8]) -> Result<(), ErrorCode>;
}

/// A storage device of either kind.
#[derive(Clone, Copy)]
pub enum Storage<'a> {
    Block(&'a dyn BlockDevice),
    Nand(&'a dyn NandDevice),
}

impl<'a> Storage<'a> {
    /// Size of the unit the device is read in: a sector or a page.
    pub fn unit_size(&self) -> usize {
        match self {
            Storage::Block(device) => device.sector_size(),
            Storage::Nand(device) => device.page_size(),
        }
    }

    /// Usable capacity in bytes. Bad NAND blocks are not subtracted.
    pub fn capacity(&self) -> usize {
        match self {
            Storage::Block(device) => device.sector_size() * device.sector_count(),
            Storage::Nand(device) => device.erase_size() * device.block_count(),
        }
    }
}
