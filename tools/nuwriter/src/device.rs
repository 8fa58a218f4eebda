// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Storage devices backed by an image file held in memory.
//!
//! A NAND image holds the main area of every page back to back, without
//! spare bytes. Bad blocks are given on the command line.

use std::cell::RefCell;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use nuwriter::error_codes::ErrorCode;
use nuwriter::program::ImageSink;
use nuwriter::storage::{BlockDevice, NandDevice, Storage};

use crate::error::ToolError;

pub struct MemBlock {
    sector_size: usize,
    data: RefCell<Vec<u8>>,
}

impl MemBlock {
    pub fn new(sector_size: usize, data: Vec<u8>) -> Result<MemBlock, ToolError> {
        if sector_size == 0 || data.len() % sector_size != 0 {
            return Err(ToolError::Geometry {
                size: data.len(),
                unit: sector_size,
            });
        }
        Ok(MemBlock {
            sector_size,
            data: RefCell::new(data),
        })
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
        let data = self.data.borrow();
        let start = sector * self.sector_size;
        let src = data
            .get(start..start + self.sector_size)
            .ok_or(ErrorCode::ReadFail)?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write_sector(&self, sector: usize, buf: &[u8]) -> Result<(), ErrorCode> {
        let mut data = self.data.borrow_mut();
        let start = sector * self.sector_size;
        data.get_mut(start..start + self.sector_size)
            .ok_or(ErrorCode::WriteFail)?
            .copy_from_slice(buf);
        Ok(())
    }
}

pub struct MemNand {
    page_size: usize,
    pages_per_block: usize,
    bad_blocks: Vec<usize>,
    data: RefCell<Vec<u8>>,
}

impl MemNand {
    pub fn new(
        page_size: usize,
        pages_per_block: usize,
        bad_blocks: Vec<usize>,
        data: Vec<u8>,
    ) -> Result<MemNand, ToolError> {
        let erase_size = page_size * pages_per_block;
        if erase_size == 0 || data.len() % erase_size != 0 {
            return Err(ToolError::Geometry {
                size: data.len(),
                unit: erase_size,
            });
        }
        Ok(MemNand {
            page_size,
            pages_per_block,
            bad_blocks,
            data: RefCell::new(data),
        })
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
        self.bad_blocks.contains(&block)
    }

    fn erase_block(&self, block: usize) -> Result<(), ErrorCode> {
        let size = self.erase_size();
        self.data
            .borrow_mut()
            .get_mut(block * size..(block + 1) * size)
            .ok_or(ErrorCode::EraseFail)?
            .fill(0xFF);
        Ok(())
    }

    fn read_page(&self, page: usize, buf: &mut [u8]) -> Result<(), ErrorCode> {
        let data = self.data.borrow();
        let start = page * self.page_size;
        let src = data
            .get(start..start + self.page_size)
            .ok_or(ErrorCode::ReadFail)?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write_page(&self, page: usize, buf: &[u8]) -> Result<(), ErrorCode> {
        let mut data = self.data.borrow_mut();
        let start = page * self.page_size;
        data.get_mut(start..start + self.page_size)
            .ok_or(ErrorCode::WriteFail)?
            .copy_from_slice(buf);
        Ok(())
    }
}

/// An image file opened as one kind of storage.
pub enum Image {
    Block(MemBlock),
    Nand(MemNand),
}

impl Image {
    pub fn storage(&self) -> Storage<'_> {
        match self {
            Image::Block(device) => Storage::Block(device),
            Image::Nand(device) => Storage::Nand(device),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Image::Block(device) => device.data.into_inner(),
            Image::Nand(device) => device.data.into_inner(),
        }
    }

    pub fn save(self, path: &Path) -> Result<(), ToolError> {
        std::fs::write(path, self.into_bytes()).map_err(ToolError::io(path))
    }
}

/// Writes readback data to a file.
pub struct FileSink {
    out: BufWriter<File>,
}

impl FileSink {
    pub fn create(path: &Path) -> Result<FileSink, ToolError> {
        let file = File::create(path).map_err(ToolError::io(path))?;
        Ok(FileSink {
            out: BufWriter::new(file),
        })
    }

    pub fn finish(mut self, path: &Path) -> Result<(), ToolError> {
        self.out.flush().map_err(ToolError::io(path))
    }
}

impl ImageSink for FileSink {
    fn write(&mut self, data: &[u8]) -> Result<(), ErrorCode> {
        self.out.write_all(data).map_err(|_| ErrorCode::WriteFail)
    }
}
