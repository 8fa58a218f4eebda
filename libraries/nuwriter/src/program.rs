// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Committing packs to storage and reading storage back.
//!
//! Children are programmed last to first, so the boot-info header in child
//! 0 is written only after every image it points at. A failure stops the
//! operation where it is; what was written stays written.

use crate::error_codes::ErrorCode;
use crate::pack::{PackChild, PackFile};
use crate::storage::{BlockDevice, NandDevice, Storage};

/// Receives progress while a pack is programmed.
pub trait ProgressClient {
    /// `percent` of child `index` is written, in steps of 10.
    fn progress(&self, index: usize, percent: u8);

    /// Bad block `block` was skipped.
    fn bad_block(&self, _block: usize) {}
}

/// Progress client that ignores everything.
pub struct NoProgress;

impl ProgressClient for NoProgress {
    fn progress(&self, _index: usize, _percent: u8) {}
}

/// Destination of readback data.
pub trait ImageSink {
    fn write(&mut self, data: &[u8]) -> Result<(), ErrorCode>;
}

/// Tracks the 10 % step of one child.
struct Steps {
    index: usize,
    total: usize,
    reported: usize,
}

impl Steps {
    fn new(index: usize, total: usize) -> Steps {
        Steps {
            index,
            total,
            reported: 0,
        }
    }

    fn advance(&mut self, done: usize, client: &dyn ProgressClient) {
        let step = 10 * done / self.total;
        if step != self.reported {
            self.reported = step;
            client.progress(self.index, (step * 10) as u8);
        }
    }
}

/// Copy `src` into the start of `unit` and fill the rest with 0xFF.
fn fill_unit(unit: &mut [u8], src: &[u8]) {
    unit[..src.len()].copy_from_slice(src);
    unit[src.len()..].fill(0xFF);
}

fn children_last_first<'a>(
    pack: &PackFile<'a>,
) -> impl Iterator<Item = Result<PackChild<'a>, ErrorCode>> + 'a {
    let pack = *pack;
    (0..pack.image_count())
        .rev()
        .map(move |index| pack.child(index).ok_or(ErrorCode::Truncated))
}

/// Program every child of `pack` into a sector device.
///
/// Each child starts at sector `flash_address / sector_size`; its last
/// sector is padded with 0xFF. `scratch` must hold one sector.
pub fn program_block(
    pack: &PackFile,
    device: &dyn BlockDevice,
    scratch: &mut [u8],
    client: &dyn ProgressClient,
) -> Result<(), ErrorCode> {
    let sector_size = device.sector_size();
    if sector_size == 0 {
        return Err(ErrorCode::Unsupported);
    }
    let sector = scratch
        .get_mut(..sector_size)
        .ok_or(ErrorCode::BufferTooSmall)?;

    for child in children_last_first(pack) {
        let child = child?;
        let address = usize::try_from(child.flash_address).map_err(|_| ErrorCode::NoSpace)?;
        if address % sector_size != 0 {
            return Err(ErrorCode::UnalignedAddress);
        }
        let first = address / sector_size;
        let total = child.len().div_ceil(sector_size);
        if first + total > device.sector_count() {
            return Err(ErrorCode::NoSpace);
        }

        let mut steps = Steps::new(child.index, total);
        for (i, chunk) in child.data.chunks(sector_size).enumerate() {
            fill_unit(sector, chunk);
            device.write_sector(first + i, sector)?;
            steps.advance(i + 1, client);
        }
    }
    Ok(())
}

/// Program every child of `pack` into a NAND device.
///
/// Each child starts at block `flash_address / erase_size`. Bad blocks are
/// skipped, each good block is erased and then written page by page, and
/// the last page is padded with 0xFF. `scratch` must hold one page.
pub fn program_nand(
    pack: &PackFile,
    device: &dyn NandDevice,
    scratch: &mut [u8],
    client: &dyn ProgressClient,
) -> Result<(), ErrorCode> {
    let page_size = device.page_size();
    let pages_per_block = device.pages_per_block();
    let erase_size = device.erase_size();
    if erase_size == 0 {
        return Err(ErrorCode::Unsupported);
    }
    let page = scratch
        .get_mut(..page_size)
        .ok_or(ErrorCode::BufferTooSmall)?;

    for child in children_last_first(pack) {
        let child = child?;
        let address = usize::try_from(child.flash_address).map_err(|_| ErrorCode::NoSpace)?;
        if address % erase_size != 0 {
            return Err(ErrorCode::UnalignedAddress);
        }

        let total = child.len().div_ceil(erase_size);
        let mut steps = Steps::new(child.index, total);
        let mut block = address / erase_size;
        for (written, data) in child.data.chunks(erase_size).enumerate() {
            while block < device.block_count() && device.is_bad_block(block) {
                client.bad_block(block);
                block += 1;
            }
            if block >= device.block_count() {
                return Err(ErrorCode::NoSpace);
            }

            device.erase_block(block)?;
            for (i, chunk) in data.chunks(page_size).enumerate() {
                fill_unit(page, chunk);
                device.write_page(block * pages_per_block + i, page)?;
            }
            block += 1;
            steps.advance(written + 1, client);
        }
    }
    Ok(())
}

/// Program `pack` into whichever kind of device `storage` is.
pub fn program(
    pack: &PackFile,
    storage: Storage,
    scratch: &mut [u8],
    client: &dyn ProgressClient,
) -> Result<(), ErrorCode> {
    match storage {
        Storage::Block(device) => program_block(pack, device, scratch, client),
        Storage::Nand(device) => program_nand(pack, device, scratch, client),
    }
}

/// Copy the whole device into `sink`: every sector of a block device, or
/// every page of every good block of a NAND device. Returns the number of
/// bytes copied.
pub fn readback(
    storage: Storage,
    scratch: &mut [u8],
    sink: &mut dyn ImageSink,
    client: &dyn ProgressClient,
) -> Result<usize, ErrorCode> {
    let unit = scratch
        .get_mut(..storage.unit_size())
        .ok_or(ErrorCode::BufferTooSmall)?;
    let mut copied = 0;

    match storage {
        Storage::Block(device) => {
            for sector in 0..device.sector_count() {
                device.read_sector(sector, unit)?;
                sink.write(unit)?;
                copied += unit.len();
            }
        }
        Storage::Nand(device) => {
            let pages_per_block = device.pages_per_block();
            for block in 0..device.block_count() {
                if device.is_bad_block(block) {
                    client.bad_block(block);
                    continue;
                }
                for page in 0..pages_per_block {
                    device.read_page(block * pages_per_block + page, unit)?;
                    sink.write(unit)?;
                    copied += unit.len();
                }
            }
        }
    }
    Ok(copied)
}
