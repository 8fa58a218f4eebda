// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Endpoint bookkeeping: FIFO RAM allocation, per-channel state and the
//! packet chunking state machine.

use core::cell::Cell;
use core::cmp;

use kernel::hil::usb::TransferType;
use kernel::utilities::cells::OptionalCell;
use kernel::ErrorCode;

/// Bump allocator over the controller's endpoint FIFO RAM.
///
/// Regions are never freed. `reset` rewinds the cursor to just after the
/// region reserved for the control endpoint and is only used when the whole
/// controller is reinitialised.
pub struct BufferAllocator {
    cursor: Cell<u32>,
    reserved: u32,
    ram_size: u32,
    max_buffer_size: u32,
}

impl BufferAllocator {
    pub const fn new(reserved: u32, ram_size: u32, max_buffer_size: u32) -> BufferAllocator {
        BufferAllocator {
            cursor: Cell::new(reserved),
            reserved,
            ram_size,
            max_buffer_size,
        }
    }

    pub fn reset(&self) {
        self.cursor.set(self.reserved);
    }

    /// Carve `size` bytes from the pool and return the start offset.
    pub fn allocate(&self, size: u32) -> Result<u32, ErrorCode> {
        let start = self.cursor.get();
        if size > self.max_buffer_size {
            return Err(ErrorCode::NOMEM);
        }
        match start.checked_add(size) {
            Some(end) if end <= self.ram_size => {
                self.cursor.set(end);
                Ok(start)
            }
            _ => Err(ErrorCode::NOMEM),
        }
    }

    /// Bytes handed out so far, including the reserved region.
    pub fn used(&self) -> u32 {
        self.cursor.get()
    }
}

/// Result of feeding one completed packet into a [`Transfer`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Progress {
    /// The transfer continues with a packet of this many bytes.
    Continue(usize),
    /// The transfer is over; total bytes moved.
    Done(usize),
}

/// Progress of one transfer split into max-packet-size chunks.
///
/// `transferred` counts bytes whose packet completed. `chunk` is the size of
/// the packet in flight (IN) or expected next (OUT).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Transfer {
    total: usize,
    transferred: usize,
    chunk: usize,
    max_packet_size: usize,
}

impl Transfer {
    pub fn new(total: usize, max_packet_size: usize) -> Transfer {
        Transfer {
            total,
            transferred: 0,
            chunk: cmp::min(total, max_packet_size),
            max_packet_size,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn transferred(&self) -> usize {
        self.transferred
    }

    pub fn remaining(&self) -> usize {
        self.total - self.transferred
    }

    pub fn chunk(&self) -> usize {
        self.chunk
    }

    /// Buffer offset of the current chunk.
    pub fn offset(&self) -> usize {
        self.transferred
    }

    /// The IN packet in flight was acknowledged by the host.
    pub fn packet_sent(&mut self) -> Progress {
        self.transferred += self.chunk;
        if self.transferred < self.total {
            self.chunk = cmp::min(self.remaining(), self.max_packet_size);
            Progress::Continue(self.chunk)
        } else {
            self.chunk = 0;
            Progress::Done(self.transferred)
        }
    }

    /// An OUT packet of `received` bytes arrived. Bytes beyond the requested
    /// total are not counted.
    pub fn packet_received(&mut self, received: usize) -> Progress {
        self.transferred += cmp::min(received, self.remaining());
        if received < self.max_packet_size || self.transferred >= self.total {
            self.chunk = 0;
            Progress::Done(self.transferred)
        } else {
            self.chunk = cmp::min(self.remaining(), self.max_packet_size);
            Progress::Continue(self.chunk)
        }
    }
}

/// State of one endpoint direction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Pending(Transfer),
    /// The client is being told that the transfer finished.
    Complete(usize),
}

/// One endpoint direction: its transfer state and the caller buffer lent
/// for the transfer in progress.
pub(crate) struct Channel<'a> {
    state: Cell<TransferState>,
    buffer: OptionalCell<&'a [Cell<u8>]>,
}

impl<'a> Channel<'a> {
    pub(crate) const fn new() -> Channel<'a> {
        Channel {
            state: Cell::new(TransferState::Idle),
            buffer: OptionalCell::empty(),
        }
    }

    pub(crate) fn state(&self) -> TransferState {
        self.state.get()
    }

    pub(crate) fn pending(&self) -> Option<Transfer> {
        match self.state.get() {
            TransferState::Pending(transfer) => Some(transfer),
            _ => None,
        }
    }

    pub(crate) fn buffer(&self) -> Option<&'a [Cell<u8>]> {
        self.buffer.get()
    }

    /// Move from `Idle` (or `Complete`, from inside a completion callback)
    /// to `Pending`.
    pub(crate) fn begin(
        &self,
        buffer: Option<&'a [Cell<u8>]>,
        transfer: Transfer,
    ) -> Result<(), ErrorCode> {
        if self.pending().is_some() {
            return Err(ErrorCode::BUSY);
        }
        self.buffer.insert(buffer);
        self.state.set(TransferState::Pending(transfer));
        Ok(())
    }

    pub(crate) fn update(&self, transfer: Transfer) {
        self.state.set(TransferState::Pending(transfer));
    }

    pub(crate) fn finish(&self, transferred: usize) {
        self.buffer.clear();
        self.state.set(TransferState::Complete(transferred));
    }

    /// Return to `Idle` after the completion callback, unless the client
    /// already started the next transfer.
    pub(crate) fn settle(&self) {
        if let TransferState::Complete(_) = self.state.get() {
            self.state.set(TransferState::Idle);
        }
    }

    pub(crate) fn abort(&self) {
        self.buffer.clear();
        self.state.set(TransferState::Idle);
    }
}

/// Runtime state of one generic endpoint channel.
pub(crate) struct Endpoint<'a> {
    pub(crate) address: Cell<u8>,
    pub(crate) max_packet_size: Cell<usize>,
    pub(crate) transfer_type: Cell<TransferType>,
    pub(crate) enabled: Cell<bool>,
    /// FIFO RAM region carved for this channel, as (start, size).
    pub(crate) region: Cell<Option<(u32, u32)>>,
    pub(crate) channel: Channel<'a>,
}

impl<'a> Endpoint<'a> {
    pub(crate) const fn new() -> Endpoint<'a> {
        Endpoint {
            address: Cell::new(0),
            max_packet_size: Cell::new(0),
            transfer_type: Cell::new(TransferType::Bulk),
            enabled: Cell::new(false),
            region: Cell::new(None),
            channel: Channel::new(),
        }
    }

    pub(crate) fn reset(&self) {
        self.address.set(0);
        self.max_packet_size.set(0);
        self.transfer_type.set(TransferType::Bulk);
        self.enabled.set(false);
        self.region.set(None);
        self.channel.abort();
    }
}
