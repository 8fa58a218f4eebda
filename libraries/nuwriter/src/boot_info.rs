// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Boot-info header read by the boot ROM.
//!
//! The header is the payload of the first child of a pack and is also stored
//! twice on the boot device. Layout (little endian, 360 bytes):
//!
//! ```text
//! 0x000 marker          0x4E565420
//! 0x004 checksum        CRC32 over `length` bytes starting at 0x008
//! 0x008 length
//! 0x00c version
//! 0x010 SPI info        16 bytes
//! 0x020 entry point
//! 0x024 image count     at most 4
//! 0x028 image info [4]  80 bytes each
//! ```

use crate::crc32::crc32;
use crate::error_codes::ErrorCode;
use crate::le;

pub const BOOT_MARKER: u32 = 0x4E56_5420;
pub const BOOT_INFO_SIZE: usize = 360;
pub const SPI_INFO_SIZE: usize = 16;
pub const IMAGE_INFO_SIZE: usize = 80;
pub const MAX_IMAGES: usize = 4;

/// Offset of the length field, where the checksummed region starts.
const LENGTH_OFFSET: usize = 8;
const SPI_INFO_OFFSET: usize = 16;
const ENTRY_POINT_OFFSET: usize = 32;
const COUNT_OFFSET: usize = 36;
const IMAGES_OFFSET: usize = 40;

/// Largest `length` a header can declare.
pub const MAX_LENGTH: u32 = (BOOT_INFO_SIZE - LENGTH_OFFSET) as u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageType {
    Tsi = 1,
    SystemSetting = 2,
    Data = 3,
    Loader = 4,
}

impl ImageType {
    /// Decode a raw type. 0 marks an unused slot.
    pub fn from_raw(raw: u32) -> Result<Option<ImageType>, ErrorCode> {
        match raw {
            0 => Ok(None),
            1 => Ok(Some(ImageType::Tsi)),
            2 => Ok(Some(ImageType::SystemSetting)),
            3 => Ok(Some(ImageType::Data)),
            4 => Ok(Some(ImageType::Loader)),
            _ => Err(ErrorCode::InvalidImageType),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ImageType::Tsi => "TSI",
            ImageType::SystemSetting => "System setting",
            ImageType::Data => "Data",
            ImageType::Loader => "Loader",
        }
    }
}

/// SPI flash parameters the boot ROM uses to read the images.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SpiInfo {
    pub page_size: u16,
    pub spare_area: u16,
    pub pages_per_block: u16,
    pub quad_read_cmd: u8,
    pub read_status_cmd: u8,
    pub write_status_cmd: u8,
    /// Status register bits that switch the NOR flash in and out of quad mode.
    pub status_value: u8,
    /// Dummy bytes between command and address.
    pub dummy_byte1: u8,
    /// Dummy bytes between address and data.
    pub dummy_byte2: u8,
    /// 0 to 15.
    pub suspend_interval: u8,
}

impl SpiInfo {
    fn decode(bytes: &[u8]) -> SpiInfo {
        SpiInfo {
            page_size: le::read_u16(bytes, 0),
            spare_area: le::read_u16(bytes, 2),
            pages_per_block: le::read_u16(bytes, 4),
            quad_read_cmd: bytes[6],
            read_status_cmd: bytes[7],
            write_status_cmd: bytes[8],
            status_value: bytes[9],
            dummy_byte1: bytes[10],
            dummy_byte2: bytes[11],
            suspend_interval: bytes[12],
        }
    }

    fn encode(&self, bytes: &mut [u8]) {
        le::write_u16(bytes, 0, self.page_size);
        le::write_u16(bytes, 2, self.spare_area);
        le::write_u16(bytes, 4, self.pages_per_block);
        bytes[6] = self.quad_read_cmd;
        bytes[7] = self.read_status_cmd;
        bytes[8] = self.write_status_cmd;
        bytes[9] = self.status_value;
        bytes[10] = self.dummy_byte1;
        bytes[11] = self.dummy_byte2;
        bytes[12] = self.suspend_interval;
        bytes[13..16].fill(0);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    /// Offset of the image in the storage device.
    pub offset: u32,
    /// Where the boot ROM loads the image.
    pub load_address: u32,
    pub size: u32,
    /// Raw type, see [`ImageType`].
    pub image_type: u32,
    /// ECDSA signature of the image.
    pub signature_r: [u8; 32],
    pub signature_s: [u8; 32],
}

impl Default for ImageInfo {
    fn default() -> Self {
        ImageInfo {
            offset: 0,
            load_address: 0,
            size: 0,
            image_type: 0,
            signature_r: [0; 32],
            signature_s: [0; 32],
        }
    }
}

impl ImageInfo {
    pub fn kind(&self) -> Result<Option<ImageType>, ErrorCode> {
        ImageType::from_raw(self.image_type)
    }

    fn decode(bytes: &[u8]) -> ImageInfo {
        let mut info = ImageInfo {
            offset: le::read_u32(bytes, 0),
            load_address: le::read_u32(bytes, 4),
            size: le::read_u32(bytes, 8),
            image_type: le::read_u32(bytes, 12),
            ..ImageInfo::default()
        };
        info.signature_r.copy_from_slice(&bytes[16..48]);
        info.signature_s.copy_from_slice(&bytes[48..80]);
        info
    }

    fn encode(&self, bytes: &mut [u8]) {
        le::write_u32(bytes, 0, self.offset);
        le::write_u32(bytes, 4, self.load_address);
        le::write_u32(bytes, 8, self.size);
        le::write_u32(bytes, 12, self.image_type);
        bytes[16..48].copy_from_slice(&self.signature_r);
        bytes[48..80].copy_from_slice(&self.signature_s);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootInfo {
    pub marker: u32,
    pub checksum: u32,
    /// Bytes covered by the checksum, counted from the length field.
    pub length: u32,
    pub version: u32,
    pub spi: SpiInfo,
    /// Where the boot ROM branches once the images are loaded and verified.
    pub entry_point: u32,
    pub count: u32,
    pub images: [ImageInfo; MAX_IMAGES],
}

impl BootInfo {
    /// An unsealed header describing `images`.
    pub fn new(version: u32, entry_point: u32, images: &[ImageInfo]) -> Result<BootInfo, ErrorCode> {
        if images.len() > MAX_IMAGES {
            return Err(ErrorCode::TooManyImages);
        }
        let mut info = BootInfo {
            marker: BOOT_MARKER,
            checksum: 0,
            length: MAX_LENGTH,
            version,
            spi: SpiInfo::default(),
            entry_point,
            count: images.len() as u32,
            images: [ImageInfo::default(); MAX_IMAGES],
        };
        info.images[..images.len()].copy_from_slice(images);
        Ok(info)
    }

    /// Parse and validate a header.
    ///
    /// Checks the marker, that the declared length fits both the structure
    /// and `bytes`, the CRC over that length, the image count and the type
    /// of every listed image. Bytes beyond `bytes` decode as zero.
    pub fn parse(bytes: &[u8]) -> Result<BootInfo, ErrorCode> {
        if bytes.len() < LENGTH_OFFSET + 4 {
            return Err(ErrorCode::Truncated);
        }
        let marker = le::read_u32(bytes, 0);
        if marker != BOOT_MARKER {
            return Err(ErrorCode::InvalidMarker);
        }
        let checksum = le::read_u32(bytes, 4);
        let length = le::read_u32(bytes, LENGTH_OFFSET);
        if length > MAX_LENGTH {
            return Err(ErrorCode::Truncated);
        }
        let covered = bytes
            .get(LENGTH_OFFSET..LENGTH_OFFSET + length as usize)
            .ok_or(ErrorCode::Truncated)?;
        if crc32(covered) != checksum {
            return Err(ErrorCode::ChecksumMismatch);
        }

        let mut raw = [0u8; BOOT_INFO_SIZE];
        let available = core::cmp::min(bytes.len(), BOOT_INFO_SIZE);
        raw[..available].copy_from_slice(&bytes[..available]);

        let mut info = BootInfo {
            marker,
            checksum,
            length,
            version: le::read_u32(&raw, 12),
            spi: SpiInfo::decode(&raw[SPI_INFO_OFFSET..SPI_INFO_OFFSET + SPI_INFO_SIZE]),
            entry_point: le::read_u32(&raw, ENTRY_POINT_OFFSET),
            count: le::read_u32(&raw, COUNT_OFFSET),
            images: [ImageInfo::default(); MAX_IMAGES],
        };
        if info.count as usize > MAX_IMAGES {
            return Err(ErrorCode::TooManyImages);
        }
        for (i, image) in info.images.iter_mut().enumerate() {
            let start = IMAGES_OFFSET + i * IMAGE_INFO_SIZE;
            *image = ImageInfo::decode(&raw[start..start + IMAGE_INFO_SIZE]);
        }
        for image in info.listed_images() {
            image.kind()?;
        }
        Ok(info)
    }

    /// The images the header declares.
    pub fn listed_images(&self) -> &[ImageInfo] {
        let count = core::cmp::min(self.count as usize, MAX_IMAGES);
        &self.images[..count]
    }

    pub fn image0_offset(&self) -> u32 {
        self.images[0].offset
    }

    /// Serialise, with the stored checksum.
    pub fn to_bytes(&self) -> [u8; BOOT_INFO_SIZE] {
        let mut raw = [0u8; BOOT_INFO_SIZE];
        le::write_u32(&mut raw, 0, self.marker);
        le::write_u32(&mut raw, 4, self.checksum);
        le::write_u32(&mut raw, LENGTH_OFFSET, self.length);
        le::write_u32(&mut raw, 12, self.version);
        self.spi
            .encode(&mut raw[SPI_INFO_OFFSET..SPI_INFO_OFFSET + SPI_INFO_SIZE]);
        le::write_u32(&mut raw, ENTRY_POINT_OFFSET, self.entry_point);
        le::write_u32(&mut raw, COUNT_OFFSET, self.count);
        for (i, image) in self.images.iter().enumerate() {
            let start = IMAGES_OFFSET + i * IMAGE_INFO_SIZE;
            image.encode(&mut raw[start..start + IMAGE_INFO_SIZE]);
        }
        raw
    }

    /// Set the marker, clamp the length to the structure and recompute the
    /// checksum.
    pub fn seal(&mut self) {
        self.marker = BOOT_MARKER;
        if self.length == 0 || self.length > MAX_LENGTH {
            self.length = MAX_LENGTH;
        }
        let raw = self.to_bytes();
        self.checksum = crc32(&raw[LENGTH_OFFSET..LENGTH_OFFSET + self.length as usize]);
    }
}
