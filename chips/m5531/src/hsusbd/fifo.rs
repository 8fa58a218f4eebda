// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Programmed I/O through the 32-bit endpoint data ports.
//!
//! Whole words go through a word access, the `len % 4` tail through byte
//! accesses to the same register. Words are little endian.

use core::cell::Cell;

use kernel::utilities::registers::interfaces::{Readable, Writeable};
use kernel::utilities::registers::ReadWrite;

pub(crate) fn write_fifo(port: &ReadWrite<u32>, data: &[Cell<u8>]) {
    let mut words = data.chunks_exact(4);
    for word in &mut words {
        port.set(u32::from_le_bytes([
            word[0].get(),
            word[1].get(),
            word[2].get(),
            word[3].get(),
        ]));
    }
    for byte in words.remainder() {
        write_byte(port, byte.get());
    }
}

pub(crate) fn read_fifo(port: &ReadWrite<u32>, data: &[Cell<u8>]) {
    let mut words = data.chunks_exact(4);
    for word in &mut words {
        let bytes = port.get().to_le_bytes();
        for (dst, src) in word.iter().zip(bytes) {
            dst.set(src);
        }
    }
    for byte in words.remainder() {
        byte.set(read_byte(port));
    }
}

/// Discard `count` bytes the host sent beyond the requested length.
pub(crate) fn drain_fifo(port: &ReadWrite<u32>, count: usize) {
    for _ in 0..count / 4 {
        let _ = port.get();
    }
    for _ in 0..count % 4 {
        let _ = read_byte(port);
    }
}

fn write_byte(port: &ReadWrite<u32>, value: u8) {
    let byte_port = (port as *const ReadWrite<u32>).cast::<u8>().cast_mut();
    // SAFETY: `port` is a valid MMIO register and the byte lane at its base
    // address is the byte-wide data port.
    unsafe { byte_port.write_volatile(value) }
}

fn read_byte(port: &ReadWrite<u32>) -> u8 {
    let byte_port = (port as *const ReadWrite<u32>).cast::<u8>();
    // SAFETY: see `write_byte`.
    unsafe { byte_port.read_volatile() }
}
