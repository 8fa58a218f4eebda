// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! NuWriter pack files and boot headers.
//!
//! A pack file is the multi-image container produced by the NuWriter PC
//! utility. This crate verifies packs, commits them to sector based block
//! devices or NAND, reads storage back, and reads the redundant boot-info
//! headers the boot ROM selects firmware with.
//!
//! The crate is `no_std` and does not allocate. Callers provide the scratch
//! buffer used for one sector or page and implement the [`storage`] traits
//! for their flash.

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod boot_info;
pub mod crc32;
pub mod error_codes;
pub mod header;
mod le;
pub mod pack;
pub mod program;
pub mod storage;

#[cfg(test)]
mod tests;
