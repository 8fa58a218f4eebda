// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Pack file container.
//!
//! ```text
//! header (16 bytes)
//!   0x00 marker      0x4E565420
//!   0x04 checksum    CRC32 over [0x08, end of file)
//!   0x08 image count
//!   0x0c reserved    0xFFFFFFFF
//! child (24 byte header, then payload)
//!   0x00 length         u64
//!   0x08 flash address  u64
//!   0x10 image type     u32
//!   0x14 reserved       u32
//! ```
//!
//! Children follow the header back to back, each starting on a 16 byte
//! boundary of the file.

use crate::boot_info::BootInfo;
use crate::crc32::{crc32, Crc32};
use crate::error_codes::ErrorCode;
use crate::le;

pub const PACK_MARKER: u32 = 0x4E56_5420;
pub const PACK_RESERVED: u32 = 0xFFFF_FFFF;
pub const PACK_HEADER_SIZE: usize = 16;
pub const CHILD_HEADER_SIZE: usize = 24;
pub const IMAGE_BOUNDARY: usize = 16;

/// Offset of the first checksummed byte.
const CHECKSUM_START: usize = 8;

pub const fn align16(offset: usize) -> usize {
    (offset + IMAGE_BOUNDARY - 1) & !(IMAGE_BOUNDARY - 1)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackHeader {
    pub marker: u32,
    pub checksum: u32,
    pub image_count: u32,
    pub reserved: u32,
}

/// One image of a pack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackChild<'a> {
    pub index: usize,
    /// File offset of the child header.
    pub offset: usize,
    pub flash_address: u64,
    pub image_type: u32,
    pub reserved: u32,
    pub data: &'a [u8],
}

impl<'a> PackChild<'a> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// File offset of the next child.
    pub fn next_offset(&self) -> usize {
        align16(self.offset + CHILD_HEADER_SIZE + self.data.len())
    }
}

fn read_child(bytes: &[u8], index: usize, offset: usize) -> Result<PackChild<'_>, ErrorCode> {
    let header = bytes
        .get(offset..offset + CHILD_HEADER_SIZE)
        .ok_or(ErrorCode::Truncated)?;
    let length = usize::try_from(le::read_u64(header, 0)).map_err(|_| ErrorCode::Truncated)?;
    let start = offset + CHILD_HEADER_SIZE;
    let end = start.checked_add(length).ok_or(ErrorCode::Truncated)?;
    let data = bytes.get(start..end).ok_or(ErrorCode::Truncated)?;
    Ok(PackChild {
        index,
        offset,
        flash_address: le::read_u64(header, 8),
        image_type: le::read_u32(header, 16),
        reserved: le::read_u32(header, 20),
        data,
    })
}

/// A verified pack file.
#[derive(Clone, Copy, Debug)]
pub struct PackFile<'a> {
    bytes: &'a [u8],
    header: PackHeader,
}

impl<'a> PackFile<'a> {
    /// Verify the marker, reserved word and checksum, and that every child
    /// lies inside `bytes`.
    ///
    /// The boot-info header in the first child is not checked here, see
    /// [`PackFile::boot_info`].
    pub fn verify(bytes: &'a [u8]) -> Result<PackFile<'a>, ErrorCode> {
        if bytes.len() < PACK_HEADER_SIZE {
            return Err(ErrorCode::Truncated);
        }
        let header = PackHeader {
            marker: le::read_u32(bytes, 0),
            checksum: le::read_u32(bytes, 4),
            image_count: le::read_u32(bytes, 8),
            reserved: le::read_u32(bytes, 12),
        };
        if header.marker != PACK_MARKER {
            return Err(ErrorCode::InvalidMarker);
        }
        if header.reserved != PACK_RESERVED {
            return Err(ErrorCode::InvalidReserved);
        }
        if crc32(&bytes[CHECKSUM_START..]) != header.checksum {
            return Err(ErrorCode::ChecksumMismatch);
        }

        let mut offset = PACK_HEADER_SIZE;
        for index in 0..header.image_count as usize {
            offset = read_child(bytes, index, offset)?.next_offset();
        }
        Ok(PackFile { bytes, header })
    }

    pub fn header(&self) -> PackHeader {
        self.header
    }

    pub fn image_count(&self) -> usize {
        self.header.image_count as usize
    }

    pub fn children(&self) -> Children<'a> {
        Children {
            bytes: self.bytes,
            index: 0,
            count: self.image_count(),
            offset: PACK_HEADER_SIZE,
        }
    }

    pub fn child(&self, index: usize) -> Option<PackChild<'a>> {
        self.children().nth(index)
    }

    /// Parse the boot-info header carried by the first child.
    pub fn boot_info(&self) -> Result<BootInfo, ErrorCode> {
        let child = self.child(0).ok_or(ErrorCode::Truncated)?;
        BootInfo::parse(child.data)
    }
}

/// Iterator over the children of a [`PackFile`], in file order.
pub struct Children<'a> {
    bytes: &'a [u8],
    index: usize,
    count: usize,
    offset: usize,
}

impl<'a> Iterator for Children<'a> {
    type Item = PackChild<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count {
            return None;
        }
        // Bounds were checked by `PackFile::verify`.
        let child = read_child(self.bytes, self.index, self.offset).ok()?;
        self.index += 1;
        self.offset = child.next_offset();
        Some(child)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.count - self.index;
        (left, Some(left))
    }
}

/// An image to place in a pack.
#[derive(Clone, Copy, Debug)]
pub struct PackImage<'a> {
    pub flash_address: u64,
    pub image_type: u32,
    pub data: &'a [u8],
}

/// Size of the pack [`encode`] builds from `images`.
pub fn packed_len(images: &[PackImage]) -> usize {
    let mut end = PACK_HEADER_SIZE;
    for (i, image) in images.iter().enumerate() {
        if i > 0 {
            end = align16(end);
        }
        end += CHILD_HEADER_SIZE + image.data.len();
    }
    end
}

/// Build a pack from `images` into `out`, returning its length. Padding
/// between children is zero.
pub fn encode(images: &[PackImage], out: &mut [u8]) -> Result<usize, ErrorCode> {
    let total = packed_len(images);
    let out = out.get_mut(..total).ok_or(ErrorCode::BufferTooSmall)?;
    let count = u32::try_from(images.len()).map_err(|_| ErrorCode::Unsupported)?;
    out.fill(0);

    le::write_u32(out, 0, PACK_MARKER);
    le::write_u32(out, 8, count);
    le::write_u32(out, 12, PACK_RESERVED);

    let mut offset = PACK_HEADER_SIZE;
    for image in images {
        le::write_u64(out, offset, image.data.len() as u64);
        le::write_u64(out, offset + 8, image.flash_address);
        le::write_u32(out, offset + 16, image.image_type);
        let start = offset + CHILD_HEADER_SIZE;
        out[start..start + image.data.len()].copy_from_slice(image.data);
        offset = align16(start + image.data.len());
    }

    let mut crc = Crc32::new();
    crc.update(&out[CHECKSUM_START..]);
    le::write_u32(out, 4, crc.finalise());
    Ok(total)
}
