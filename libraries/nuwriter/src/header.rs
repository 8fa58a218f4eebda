// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Redundant boot-info headers on the boot device.
//!
//! The boot ROM keeps two copies of the boot-info header and boots the one
//! with the newer version. Where the copies live depends on the device:
//!
//! | Boot source      | Unit                      | Header 0 | Header 1 |
//! |------------------|---------------------------|----------|----------|
//! | QSPI NOR         | 4 KiB sector              | 0        | 1        |
//! | QSPI NAND, NAND  | erase block (first page)  | 0        | 1        |
//! | SD / eMMC        | 512 byte sector           | 2        | 3        |
//!
//! USB boot sources carry no header.

use crate::boot_info::BootInfo;
use crate::error_codes::ErrorCode;
use crate::storage::Storage;

/// Where the chip booted from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootSource {
    QspiNor,
    QspiNand,
    SdEmmc0,
    SdEmmc1,
    RawNand,
    Usbd,
    Usbh0,
    Usbh1,
}

impl BootSource {
    /// Units holding header 0 and header 1. Sectors for block devices,
    /// erase blocks for NAND.
    pub fn header_slots(&self) -> Option<[usize; 2]> {
        match self {
            BootSource::QspiNor | BootSource::QspiNand | BootSource::RawNand => Some([0, 1]),
            BootSource::SdEmmc0 | BootSource::SdEmmc1 => Some([2, 3]),
            BootSource::Usbd | BootSource::Usbh0 | BootSource::Usbh1 => None,
        }
    }
}

/// Outcome of reading one header copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderCopy {
    pub slot: usize,
    pub info: Result<BootInfo, ErrorCode>,
}

fn read_copy(storage: Storage, slot: usize, unit: &mut [u8]) -> Result<HeaderCopy, ErrorCode> {
    match storage {
        Storage::Block(device) => device.read_sector(slot, unit)?,
        Storage::Nand(device) => device.read_page(slot * device.pages_per_block(), unit)?,
    }
    Ok(HeaderCopy {
        slot,
        info: BootInfo::parse(unit),
    })
}

/// Read both header copies of `source` from `storage`. `scratch` must hold
/// one sector or page.
///
/// A failing device read aborts. An invalid copy is reported in its
/// [`HeaderCopy`].
pub fn read_headers(
    source: BootSource,
    storage: Storage,
    scratch: &mut [u8],
) -> Result<[HeaderCopy; 2], ErrorCode> {
    let slots = source.header_slots().ok_or(ErrorCode::Unsupported)?;
    let unit = scratch
        .get_mut(..storage.unit_size())
        .ok_or(ErrorCode::BufferTooSmall)?;
    Ok([
        read_copy(storage, slots[0], unit)?,
        read_copy(storage, slots[1], unit)?,
    ])
}

/// The valid header with the highest version. On a tie header 0 wins.
pub fn read_boot_info(
    source: BootSource,
    storage: Storage,
    scratch: &mut [u8],
) -> Result<BootInfo, ErrorCode> {
    let copies = read_headers(source, storage, scratch)?;
    copies
        .iter()
        .filter_map(|copy| copy.info.ok())
        .fold(None, |best: Option<BootInfo>, info| match best {
            Some(best) if best.version >= info.version => Some(best),
            _ => Some(info),
        })
        .ok_or(ErrorCode::NoValidHeader)
}

/// Version of the firmware the boot ROM will start.
pub fn get_version(
    source: BootSource,
    storage: Storage,
    scratch: &mut [u8],
) -> Result<u32, ErrorCode> {
    read_boot_info(source, storage, scratch).map(|info| info.version)
}

/// Storage offset of the first image of the selected header.
pub fn get_image0_offset(
    source: BootSource,
    storage: Storage,
    scratch: &mut [u8],
) -> Result<u32, ErrorCode> {
    read_boot_info(source, storage, scratch).map(|info| info.image0_offset())
}
