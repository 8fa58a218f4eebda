// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

use crate::boot_info::{BootInfo, ImageInfo, ImageType, BOOT_INFO_SIZE};
use crate::crc32::{crc32, Crc32};
use crate::error_codes::ErrorCode;
use crate::header::{self, BootSource};
use crate::pack::{self, align16, PackFile, PackImage, CHILD_HEADER_SIZE, PACK_HEADER_SIZE};
use crate::program::{self, ImageSink, NoProgress, ProgressClient};
use crate::storage::{BlockDevice, NandDevice, Storage};
use std::cell::RefCell;
use std::vec::Vec;

/// Sector device in RAM, erased to 0xFF.
struct MemBlock {
    sector_size: usize,
    data: RefCell<Vec<u8>>,
    fail_write_at: Option<usize>,
    writes: RefCell<Vec<usize>>,
}

impl MemBlock {
    fn new(sector_size: usize, sectors: usize) -> Self {
        Self {
            sector_size,
            data: RefCell::new(vec![0xFF; sector_size * sectors]),
            fail_write_at: None,
            writes: RefCell::new(Vec::new()),
        }
    }

    fn sector(&self, sector: usize) -> Vec<u8> {
        let start = sector * self.sector_size;
        self.data.borrow()[start..start + self.sector_size].to_vec()
    }

    fn put(&self, sector: usize, bytes: &[u8]) {
        let start = sector * self.sector_size;
        self.data.borrow_mut()[start..start + bytes.len()].copy_from_slice(bytes);
    }
}

impl BlockDevice for MemBlock {
    fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn sector_count(&self) -> usize {
        self.data.borrow().len() / self.sector_size
    }

    fn read_sector(&self, sector: usize, buf: &mut [u8]) -> Result<(), ErrorCode> {
        if sector >= self.sector_count() {
            return Err(ErrorCode::ReadFail);
        }
        buf.copy_from_slice(&self.sector(sector));
        Ok(())
    }

    fn write_sector(&self, sector: usize, buf: &[u8]) -> Result<(), ErrorCode> {
        if self.fail_write_at == Some(sector) || sector >= self.sector_count() {
            return Err(ErrorCode::WriteFail);
        }
        self.writes.borrow_mut().push(sector);
        self.put(sector, buf);
        Ok(())
    }
}

/// NAND in RAM with a list of factory bad blocks.
struct MemNand {
    page_size: usize,
    pages_per_block: usize,
    data: RefCell<Vec<u8>>,
    bad: Vec<usize>,
    erased: RefCell<Vec<usize>>,
}

impl MemNand {
    fn new(page_size: usize, pages_per_block: usize, blocks: usize, bad: &[usize]) -> Self {
        Self {
            page_size,
            pages_per_block,
            data: RefCell::new(vec![0; page_size * pages_per_block * blocks]),
            bad: bad.to_vec(),
            erased: RefCell::new(Vec::new()),
        }
    }

    fn page(&self, page: usize) -> Vec<u8> {
        let start = page * self.page_size;
        self.data.borrow()[start..start + self.page_size].to_vec()
    }

    fn block_bytes(&self, block: usize) -> Vec<u8> {
        let size = self.erase_size();
        self.data.borrow()[block * size..(block + 1) * size].to_vec()
    }
}

impl NandDevice for MemNand {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn pages_per_block(&self) -> usize {
        self.pages_per_block
    }

    fn block_count(&self) -> usize {
        self.data.borrow().len() / self.erase_size()
    }

    fn is_bad_block(&self, block: usize) -> bool {
        self.bad.contains(&block)
    }

    fn erase_block(&self, block: usize) -> Result<(), ErrorCode> {
        let size = self.erase_size();
        self.erased.borrow_mut().push(block);
        self.data.borrow_mut()[block * size..(block + 1) * size].fill(0xFF);
        Ok(())
    }

    fn read_page(&self, page: usize, buf: &mut [u8]) -> Result<(), ErrorCode> {
        buf.copy_from_slice(&self.page(page));
        Ok(())
    }

    fn write_page(&self, page: usize, buf: &[u8]) -> Result<(), ErrorCode> {
        let start = page * self.page_size;
        self.data.borrow_mut()[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }
}

struct VecSink(Vec<u8>);

impl ImageSink for VecSink {
    fn write(&mut self, data: &[u8]) -> Result<(), ErrorCode> {
        self.0.extend_from_slice(data);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingProgress {
    steps: RefCell<Vec<(usize, u8)>>,
    bad: RefCell<Vec<usize>>,
}

impl ProgressClient for RecordingProgress {
    fn progress(&self, index: usize, percent: u8) {
        self.steps.borrow_mut().push((index, percent));
    }

    fn bad_block(&self, block: usize) {
        self.bad.borrow_mut().push(block);
    }
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(7) ^ seed).collect()
}

fn build_pack(images: &[PackImage]) -> Vec<u8> {
    let mut out = vec![0; pack::packed_len(images)];
    let len = pack::encode(images, &mut out).unwrap();
    assert_eq!(len, out.len());
    out
}

fn boot_header(version: u32, image0_offset: u32) -> [u8; BOOT_INFO_SIZE] {
    let image = ImageInfo {
        offset: image0_offset,
        load_address: 0x2000_0000,
        size: 1024,
        image_type: ImageType::Loader as u32,
        ..ImageInfo::default()
    };
    let mut info = BootInfo::new(version, 0x2000_0100, &[image]).unwrap();
    info.seal();
    info.to_bytes()
}

fn reseal(pack: &mut [u8]) {
    let crc = crc32(&pack[8..]);
    pack[4..8].copy_from_slice(&crc.to_le_bytes());
}

mod crc {
    use super::*;

    #[test]
    fn check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(&[]), 0);
    }

    #[test]
    fn incremental_matches_one_shot() {
        let data = pattern(1000, 0x5a);
        let mut crc = Crc32::new();
        for chunk in data.chunks(37) {
            crc.update(chunk);
        }
        assert_eq!(crc.finalise(), crc32(&data));
    }
}

mod pack_file {
    use super::*;

    #[test]
    fn children_are_16_byte_aligned() {
        let first = pattern(100, 1);
        let second = pattern(20, 2);
        let bytes = build_pack(&[
            PackImage {
                flash_address: 0,
                image_type: 1,
                data: &first,
            },
            PackImage {
                flash_address: 0x1000,
                image_type: 3,
                data: &second,
            },
        ]);
        assert_eq!(bytes.len(), 144 + CHILD_HEADER_SIZE + 20);

        let pack = PackFile::verify(&bytes).unwrap();
        assert_eq!(pack.image_count(), 2);
        assert_eq!(pack.header().reserved, 0xFFFF_FFFF);
        let children: Vec<_> = pack.children().collect();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].offset, PACK_HEADER_SIZE);
        assert_eq!(children[1].offset, align16(16 + 24 + 100));
        assert_eq!(children[1].offset, 144);
        assert_eq!(children[0].data, &first[..]);
        assert_eq!(children[1].data, &second[..]);
        assert_eq!(children[1].flash_address, 0x1000);
        assert_eq!(children[1].image_type, 3);
        assert_eq!(pack.child(1), Some(children[1]));
        assert_eq!(pack.child(2), None);
    }

    #[test]
    fn single_bit_flip_fails_checksum() {
        let data = pattern(100, 9);
        let bytes = build_pack(&[PackImage {
            flash_address: 0,
            image_type: 1,
            data: &data,
        }]);
        assert!(PackFile::verify(&bytes).is_ok());

        for position in [PACK_HEADER_SIZE, 50, bytes.len() - 1] {
            let mut corrupt = bytes.clone();
            corrupt[position] ^= 0x10;
            assert_eq!(
                PackFile::verify(&corrupt).err(),
                Some(ErrorCode::ChecksumMismatch)
            );
        }
    }

    #[test]
    fn header_checks() {
        let data = pattern(10, 0);
        let bytes = build_pack(&[PackImage {
            flash_address: 0,
            image_type: 1,
            data: &data,
        }]);

        let mut bad_marker = bytes.clone();
        bad_marker[0] = 0;
        assert_eq!(
            PackFile::verify(&bad_marker).err(),
            Some(ErrorCode::InvalidMarker)
        );

        let mut bad_reserved = bytes.clone();
        bad_reserved[12] = 0;
        reseal(&mut bad_reserved);
        assert_eq!(
            PackFile::verify(&bad_reserved).err(),
            Some(ErrorCode::InvalidReserved)
        );

        assert_eq!(
            PackFile::verify(&bytes[..10]).err(),
            Some(ErrorCode::Truncated)
        );
    }

    #[test]
    fn child_past_end_is_truncated() {
        let data = pattern(10, 0);
        let mut bytes = build_pack(&[PackImage {
            flash_address: 0,
            image_type: 1,
            data: &data,
        }]);
        // Claim a second child that is not there.
        bytes[8] = 2;
        reseal(&mut bytes);
        assert_eq!(PackFile::verify(&bytes).err(), Some(ErrorCode::Truncated));

        let mut bytes = build_pack(&[PackImage {
            flash_address: 0,
            image_type: 1,
            data: &data,
        }]);
        // Child length runs past the end of the file.
        bytes[PACK_HEADER_SIZE] = 200;
        reseal(&mut bytes);
        assert_eq!(PackFile::verify(&bytes).err(), Some(ErrorCode::Truncated));
    }

    #[test]
    fn encode_needs_room() {
        let data = pattern(10, 0);
        let images = [PackImage {
            flash_address: 0,
            image_type: 1,
            data: &data,
        }];
        let mut out = [0u8; 40];
        assert_eq!(
            pack::encode(&images, &mut out),
            Err(ErrorCode::BufferTooSmall)
        );
    }

    #[test]
    fn boot_info_from_first_child() {
        let header = boot_header(5, 0x8000);
        let bytes = build_pack(&[PackImage {
            flash_address: 0x400,
            image_type: 0,
            data: &header,
        }]);
        let pack = PackFile::verify(&bytes).unwrap();
        let info = pack.boot_info().unwrap();
        assert_eq!(info.version, 5);
        assert_eq!(info.image0_offset(), 0x8000);
    }
}

mod boot_info {
    use super::*;
    use crate::boot_info::MAX_LENGTH;

    #[test]
    fn sealed_header_parses() {
        let bytes = boot_header(3, 0x4_0000);
        let info = BootInfo::parse(&bytes).unwrap();
        assert_eq!(info.version, 3);
        assert_eq!(info.length, MAX_LENGTH);
        assert_eq!(info.count, 1);
        assert_eq!(info.entry_point, 0x2000_0100);
        assert_eq!(info.listed_images().len(), 1);
        assert_eq!(info.images[0].kind(), Ok(Some(ImageType::Loader)));
        assert_eq!(info.to_bytes(), bytes);
    }

    #[test]
    fn rejects_corruption() {
        let mut bytes = boot_header(3, 0);
        bytes[100] ^= 1;
        assert_eq!(
            BootInfo::parse(&bytes).err(),
            Some(ErrorCode::ChecksumMismatch)
        );

        let mut bytes = boot_header(3, 0);
        bytes[0] = b'X';
        assert_eq!(BootInfo::parse(&bytes).err(), Some(ErrorCode::InvalidMarker));

        let mut bytes = boot_header(3, 0);
        bytes[8..12].copy_from_slice(&400u32.to_le_bytes());
        assert_eq!(BootInfo::parse(&bytes).err(), Some(ErrorCode::Truncated));

        assert_eq!(
            BootInfo::parse(&bytes[..100]).err(),
            Some(ErrorCode::Truncated)
        );
    }

    #[test]
    fn image_count_and_type() {
        let mut info = BootInfo::new(1, 0, &[]).unwrap();
        info.count = 5;
        info.seal();
        assert_eq!(
            BootInfo::parse(&info.to_bytes()).err(),
            Some(ErrorCode::TooManyImages)
        );

        let mut info = BootInfo::new(
            1,
            0,
            &[ImageInfo {
                image_type: 5,
                ..ImageInfo::default()
            }],
        )
        .unwrap();
        info.seal();
        assert_eq!(
            BootInfo::parse(&info.to_bytes()).err(),
            Some(ErrorCode::InvalidImageType)
        );

        // Type 0 marks an unused entry.
        let mut info = BootInfo::new(1, 0, &[ImageInfo::default()]).unwrap();
        info.seal();
        assert!(BootInfo::parse(&info.to_bytes()).is_ok());

        assert_eq!(
            BootInfo::new(1, 0, &[ImageInfo::default(); 5]).err(),
            Some(ErrorCode::TooManyImages)
        );
    }

    #[test]
    fn short_length_covers_prefix_only() {
        let mut info = BootInfo::new(9, 0, &[]).unwrap();
        info.length = 32;
        info.seal();
        let mut bytes = info.to_bytes();
        // Outside the checksummed region.
        bytes[200] = 0xAA;
        let parsed = BootInfo::parse(&bytes).unwrap();
        assert_eq!(parsed.length, 32);
        assert_eq!(parsed.version, 9);
    }
}

mod programming {
    use super::*;

    #[test]
    fn block_device_in_reverse_order() {
        let header = boot_header(1, 0x2000);
        let image = pattern(1300, 3);
        let bytes = build_pack(&[
            PackImage {
                flash_address: 0x400,
                image_type: 0,
                data: &header,
            },
            PackImage {
                flash_address: 0x2000,
                image_type: 4,
                data: &image,
            },
        ]);
        let pack = PackFile::verify(&bytes).unwrap();
        let device = MemBlock::new(512, 64);
        let progress = RecordingProgress::default();
        let mut scratch = [0u8; 512];

        program::program(&pack, Storage::Block(&device), &mut scratch, &progress).unwrap();

        assert_eq!(*device.writes.borrow(), vec![16, 17, 18, 2]);
        assert_eq!(&device.sector(16)[..], &image[..512]);
        assert_eq!(&device.sector(18)[..276], &image[1024..]);
        assert!(device.sector(18)[276..].iter().all(|&b| b == 0xFF));
        assert_eq!(&device.sector(2)[..BOOT_INFO_SIZE], &header[..]);
        assert_eq!(
            *progress.steps.borrow(),
            vec![(1, 30), (1, 60), (1, 100), (0, 100)]
        );
    }

    #[test]
    fn block_device_errors() {
        let image = pattern(600, 3);
        let unaligned = build_pack(&[PackImage {
            flash_address: 0x100,
            image_type: 4,
            data: &image,
        }]);
        let device = MemBlock::new(512, 4);
        let mut scratch = [0u8; 512];
        let pack = PackFile::verify(&unaligned).unwrap();
        assert_eq!(
            program::program_block(&pack, &device, &mut scratch, &NoProgress),
            Err(ErrorCode::UnalignedAddress)
        );

        let too_far = build_pack(&[PackImage {
            flash_address: 0x600,
            image_type: 4,
            data: &image,
        }]);
        let pack = PackFile::verify(&too_far).unwrap();
        assert_eq!(
            program::program_block(&pack, &device, &mut scratch, &NoProgress),
            Err(ErrorCode::NoSpace)
        );

        let mut small = [0u8; 100];
        assert_eq!(
            program::program_block(&pack, &device, &mut small, &NoProgress),
            Err(ErrorCode::BufferTooSmall)
        );
    }

    #[test]
    fn write_failure_keeps_earlier_children() {
        let header = boot_header(1, 0x1000);
        let image = pattern(512, 3);
        let bytes = build_pack(&[
            PackImage {
                flash_address: 0,
                image_type: 0,
                data: &header,
            },
            PackImage {
                flash_address: 0x1000,
                image_type: 4,
                data: &image,
            },
        ]);
        let pack = PackFile::verify(&bytes).unwrap();
        let mut device = MemBlock::new(512, 16);
        device.fail_write_at = Some(0);
        let mut scratch = [0u8; 512];

        assert_eq!(
            program::program_block(&pack, &device, &mut scratch, &NoProgress),
            Err(ErrorCode::WriteFail)
        );
        assert_eq!(*device.writes.borrow(), vec![8]);
        assert_eq!(&device.sector(8)[..], &image[..]);
    }

    #[test]
    fn nand_skips_bad_blocks() {
        let header = pattern(100, 1);
        let image = pattern(600, 2);
        let bytes = build_pack(&[
            PackImage {
                flash_address: 0,
                image_type: 0,
                data: &header,
            },
            PackImage {
                flash_address: 256,
                image_type: 4,
                data: &image,
            },
        ]);
        let pack = PackFile::verify(&bytes).unwrap();
        let device = MemNand::new(64, 4, 8, &[1]);
        let progress = RecordingProgress::default();
        let mut scratch = [0u8; 64];

        program::program(&pack, Storage::Nand(&device), &mut scratch, &progress).unwrap();

        assert_eq!(*device.erased.borrow(), vec![2, 3, 4, 0]);
        assert_eq!(*progress.bad.borrow(), vec![1]);
        assert_eq!(&device.block_bytes(2)[..], &image[..256]);
        assert_eq!(&device.block_bytes(3)[..], &image[256..512]);
        let last = device.block_bytes(4);
        assert_eq!(&last[..88], &image[512..]);
        assert!(last[88..].iter().all(|&b| b == 0xFF));
        assert_eq!(&device.page(0)[..], &header[..64]);
        assert_eq!(&device.page(1)[..36], &header[64..]);
        assert!(device.page(1)[36..].iter().all(|&b| b == 0xFF));
        // The bad block is left alone.
        assert!(device.block_bytes(1).iter().all(|&b| b == 0));
        assert_eq!(
            *progress.steps.borrow(),
            vec![(1, 30), (1, 60), (1, 100), (0, 100)]
        );
    }

    #[test]
    fn nand_errors() {
        let image = pattern(600, 2);
        let device = MemNand::new(64, 4, 8, &[7]);
        let mut scratch = [0u8; 64];

        let bytes = build_pack(&[PackImage {
            flash_address: 100,
            image_type: 4,
            data: &image,
        }]);
        let pack = PackFile::verify(&bytes).unwrap();
        assert_eq!(
            program::program_nand(&pack, &device, &mut scratch, &NoProgress),
            Err(ErrorCode::UnalignedAddress)
        );

        let bytes = build_pack(&[PackImage {
            flash_address: 5 * 256,
            image_type: 4,
            data: &image,
        }]);
        let pack = PackFile::verify(&bytes).unwrap();
        assert_eq!(
            program::program_nand(&pack, &device, &mut scratch, &NoProgress),
            Err(ErrorCode::NoSpace)
        );
    }

    #[test]
    fn readback_nand_skips_bad_blocks() {
        let device = MemNand::new(64, 4, 4, &[1]);
        for block in [0, 2, 3] {
            device.erase_block(block).unwrap();
        }
        device.write_page(8, &[0x42; 64]).unwrap();
        let progress = RecordingProgress::default();
        let mut sink = VecSink(Vec::new());
        let mut scratch = [0u8; 64];

        let copied =
            program::readback(Storage::Nand(&device), &mut scratch, &mut sink, &progress).unwrap();
        assert_eq!(copied, 3 * 256);
        assert_eq!(sink.0.len(), copied);
        // Block 2 follows block 0 directly.
        assert!(sink.0[256..320].iter().all(|&b| b == 0x42));
        assert_eq!(*progress.bad.borrow(), vec![1]);
    }

    #[test]
    fn readback_block_device() {
        let device = MemBlock::new(512, 4);
        device.put(3, &[7; 512]);
        let mut sink = VecSink(Vec::new());
        let mut scratch = vec![0u8; 4096];
        let copied =
            program::readback(Storage::Block(&device), &mut scratch, &mut sink, &NoProgress)
                .unwrap();
        assert_eq!(copied, 2048);
        assert!(sink.0[1536..].iter().all(|&b| b == 7));
    }
}

mod dual_header {
    use super::*;

    #[test]
    fn valid_older_copy_beats_corrupt_newer() {
        let device = MemBlock::new(512, 8);
        device.put(2, &boot_header(3, 0x3000));
        let mut newer = boot_header(7, 0x7000);
        newer[64] ^= 0xFF;
        device.put(3, &newer);
        let mut scratch = [0u8; 512];

        let info =
            header::read_boot_info(BootSource::SdEmmc0, Storage::Block(&device), &mut scratch)
                .unwrap();
        assert_eq!(info.version, 3);

        let copies =
            header::read_headers(BootSource::SdEmmc1, Storage::Block(&device), &mut scratch)
                .unwrap();
        assert_eq!(copies[0].slot, 2);
        assert_eq!(copies[1].info.err(), Some(ErrorCode::ChecksumMismatch));
    }

    #[test]
    fn newer_version_wins() {
        let device = MemBlock::new(4096, 4);
        device.put(0, &boot_header(2, 0x2000));
        device.put(1, &boot_header(9, 0x9000));
        let mut scratch = [0u8; 4096];
        let storage = Storage::Block(&device);
        assert_eq!(
            header::get_version(BootSource::QspiNor, storage, &mut scratch),
            Ok(9)
        );
        assert_eq!(
            header::get_image0_offset(BootSource::QspiNor, storage, &mut scratch),
            Ok(0x9000)
        );
    }

    #[test]
    fn tie_goes_to_header0() {
        let device = MemBlock::new(512, 8);
        device.put(2, &boot_header(4, 0x1111));
        device.put(3, &boot_header(4, 0x2222));
        let mut scratch = [0u8; 512];
        assert_eq!(
            header::get_image0_offset(BootSource::SdEmmc0, Storage::Block(&device), &mut scratch),
            Ok(0x1111)
        );
    }

    #[test]
    fn nand_headers_at_block_start() {
        let device = MemNand::new(512, 4, 4, &[]);
        device.erase_block(0).unwrap();
        device.erase_block(1).unwrap();
        let mut page = [0xFFu8; 512];
        page[..BOOT_INFO_SIZE].copy_from_slice(&boot_header(6, 0x6000));
        device.write_page(4, &page).unwrap();
        let mut scratch = [0u8; 512];
        let storage = Storage::Nand(&device);

        assert_eq!(
            header::get_version(BootSource::QspiNand, storage, &mut scratch),
            Ok(6)
        );
        assert_eq!(
            header::get_version(BootSource::RawNand, storage, &mut scratch),
            Ok(6)
        );
    }

    #[test]
    fn no_valid_header() {
        let device = MemBlock::new(512, 8);
        let mut scratch = [0u8; 512];
        assert_eq!(
            header::read_boot_info(BootSource::SdEmmc0, Storage::Block(&device), &mut scratch)
                .err(),
            Some(ErrorCode::NoValidHeader)
        );
        assert_eq!(
            header::get_version(BootSource::Usbd, Storage::Block(&device), &mut scratch),
            Err(ErrorCode::Unsupported)
        );
    }

    #[test]
    fn read_failure_aborts() {
        let device = MemBlock::new(512, 3);
        let mut scratch = [0u8; 512];
        assert_eq!(
            header::get_version(BootSource::SdEmmc0, Storage::Block(&device), &mut scratch),
            Err(ErrorCode::ReadFail)
        );
    }
}

#[test]
fn error_codes_are_negative() {
    assert_eq!(isize::from(ErrorCode::InvalidMarker), -1);
    assert_eq!(isize::from(ErrorCode::Unsupported), -14);
    assert_eq!(std::format!("{}", ErrorCode::NoSpace), "image does not fit the device");
}
