// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Core kernel support for the M5531 board-support crates.
//!
//! The kernel crate holds the code shared by every chip crate: the standard
//! [`ErrorCode`], the `debug!` output path, compile time configuration, the
//! register and cell utilities, and the Hardware Interface Layer (HIL)
//! definitions that chip drivers implement.

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod config;
pub mod debug;
pub mod errorcode;
pub mod hil;
pub mod utilities;

pub use crate::errorcode::ErrorCode;
