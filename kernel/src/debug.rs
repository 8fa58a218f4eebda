// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Support for in-kernel debugging.
//!
//! For printing, this module uses an [`IoWrite`] object registered by the
//! board with [`set_debug_writer`], typically a blocking UART. Until a writer
//! is registered every message is silently dropped, so drivers may call
//! `debug!` unconditionally.
//!
//! Usage
//! -----
//!
//! ```rust,ignore
//! use kernel::debug;
//!
//! debug!("Yes the code gets here with value {}", i);
//! debug_verbose!("got here"); // includes file and line info
//! ```
//!
//! ```text
//! Yes the code gets here with value 42
//! TOCK_DEBUG(0): /tock/chips/m5531/src/hsusbd/mod.rs:24: got here
//! ```

use core::cell::Cell;
use core::sync::atomic::{AtomicUsize, Ordering};
use core::fmt::{self, write, Arguments, Write};

/// Byte sink used as the backend of `debug!`.
pub trait IoWrite {
    /// Write `buf`, returning the number of bytes consumed.
    fn write(&self, buf: &[u8]) -> usize;
}

/// Holds the registered writer and a running message counter.
struct DebugWriter {
    writer: Cell<Option<&'static dyn IoWrite>>,
    count: AtomicUsize,
}

struct SingleThread(DebugWriter);

// SAFETY: `writer` is only written by `set_debug_writer` and
// `clear_debug_writer`, whose contract rules out any concurrent access.
// Every other path only reads it, so host test binaries that print from
// several threads without registering a writer perform concurrent reads
// only. `count` is atomic.
unsafe impl Sync for SingleThread {}

static DEBUG_WRITER: SingleThread = SingleThread(DebugWriter {
    writer: Cell::new(None),
    count: AtomicUsize::new(0),
});

/// Register the backend used by `debug!`.
///
/// # Safety
///
/// Must be called from the kernel thread before interrupts that may print
/// are enabled, and never while another thread may call `debug!`.
pub unsafe fn set_debug_writer(writer: &'static dyn IoWrite) {
    DEBUG_WRITER.0.writer.set(Some(writer));
}

/// Remove the registered backend. Later messages are dropped.
///
/// # Safety
///
/// Same as [`set_debug_writer`].
pub unsafe fn clear_debug_writer() {
    DEBUG_WRITER.0.writer.set(None);
}

struct Adapter(&'static dyn IoWrite);

impl Write for Adapter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let mut bytes = s.as_bytes();
        while !bytes.is_empty() {
            let written = self.0.write(bytes);
            if written == 0 {
                return Err(fmt::Error);
            }
            bytes = &bytes[written.min(bytes.len())..];
        }
        Ok(())
    }
}

/// Number of messages printed since boot.
pub fn debug_count() -> usize {
    DEBUG_WRITER.0.count.load(Ordering::Relaxed)
}

pub fn debug_print(args: Arguments) {
    if let Some(writer) = DEBUG_WRITER.0.writer.get() {
        let mut adapter = Adapter(writer);
        let _ = write(&mut adapter, args);
        DEBUG_WRITER.0.count.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn debug_println(args: Arguments) {
    if let Some(writer) = DEBUG_WRITER.0.writer.get() {
        let mut adapter = Adapter(writer);
        let _ = write(&mut adapter, args);
        let _ = adapter.write_str("\r\n");
        DEBUG_WRITER.0.count.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn debug_verbose_println(args: Arguments, file_line: &(&'static str, u32)) {
    if let Some(writer) = DEBUG_WRITER.0.writer.get() {
        let mut adapter = Adapter(writer);
        let (file, line) = *file_line;
        let count = DEBUG_WRITER.0.count.fetch_add(1, Ordering::Relaxed);
        let _ = adapter.write_fmt(format_args!("TOCK_DEBUG({}): {}:{}: ", count, file, line));
        let _ = write(&mut adapter, args);
        let _ = adapter.write_str("\r\n");
    }
}

/// In-kernel `println()` debugging.
#[macro_export]
macro_rules! debug {
    () => ({
        // Allow an empty debug!() to print the location when hit
        $crate::debug!("")
    });
    ($msg:expr $(,)?) => ({
        $crate::debug::debug_println(format_args!($msg));
    });
    ($fmt:expr, $($arg:tt)+) => ({
        $crate::debug::debug_println(format_args!($fmt, $($arg)+));
    });
}

/// In-kernel `println()` debugging that includes the file and line number.
#[macro_export]
macro_rules! debug_verbose {
    () => ({
        // Allow an empty debug_verbose!() to print the location when hit
        $crate::debug_verbose!("")
    });
    ($msg:expr $(,)?) => ({
        $crate::debug::debug_verbose_println(format_args!($msg), {
            static _FILE_LINE: (&'static str, u32) = (file!(), line!());
            &_FILE_LINE
        })
    });
    ($fmt:expr, $($arg:tt)+) => ({
        $crate::debug::debug_verbose_println(format_args!($fmt, $($arg)+), {
            static _FILE_LINE: (&'static str, u32) = (file!(), line!());
            &_FILE_LINE
        })
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::boxed::Box;
    use std::string::String;
    use std::sync::Mutex;
    use std::vec::Vec;

    struct Recorder {
        bytes: Mutex<Vec<u8>>,
    }

    impl IoWrite for Recorder {
        fn write(&self, buf: &[u8]) -> usize {
            // Accept at most 4 bytes per call to exercise the retry loop.
            let n = buf.len().min(4);
            self.bytes.lock().unwrap().extend_from_slice(&buf[..n]);
            n
        }
    }

    #[test]
    fn messages_reach_registered_writer() {
        let recorder: &'static Recorder = Box::leak(Box::new(Recorder {
            bytes: Mutex::new(Vec::new()),
        }));

        // Dropped: nothing registered yet.
        debug!("lost {}", 1);
        let threads: Vec<_> = (0..4)
            .map(|i| std::thread::spawn(move || debug!("lost on thread {}", i)))
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        let before = debug_count();

        unsafe { set_debug_writer(recorder) };
        debug!("endpoint {} stalled", 3);
        debug_verbose!("here");
        unsafe { clear_debug_writer() };
        debug!("lost again");

        let text = String::from_utf8(recorder.bytes.lock().unwrap().clone()).unwrap();
        assert!(text.starts_with("endpoint 3 stalled\r\n"));
        assert!(text.contains("debug.rs"));
        assert!(text.ends_with("here\r\n"));
        assert_eq!(debug_count(), before + 2);
    }
}
