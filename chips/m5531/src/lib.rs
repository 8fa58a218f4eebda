// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Peripheral drivers for the Nuvoton M5531 microcontroller.

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod chip_config;
pub mod hsotg;
pub mod hsusbd;
