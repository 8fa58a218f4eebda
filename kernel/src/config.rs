// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Compile-time configuration options of the kernel crate.

/// Data structure holding compile-time configuration options.
///
/// To change the configuration, enable the matching cargo feature of the
/// kernel crate from the board crate.
pub struct Config {
    /// Whether USB device drivers print every decoded interrupt event to the
    /// debug output.
    ///
    /// Each bus, control endpoint and data endpoint event is printed by name
    /// before it is handled. This floods the debug writer during enumeration
    /// and is meant for bring-up only.
    pub trace_usb_events: bool,
}

/// A unique instance of `Config` where compile-time configuration options are
/// defined.
pub const CONFIG: Config = Config {
    trace_usb_events: cfg!(feature = "trace_usb_events"),
};
