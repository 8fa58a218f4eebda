// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! High-speed USB device controller (HSUSBD).
//!
//! The controller has one dedicated control endpoint (CEP) and twelve
//! generic endpoint channels, EPA to EPL. Logical endpoint `n` uses channel
//! `n - 1`, so an endpoint number can be opened in one direction only. All
//! channels share 8 KiB of FIFO RAM; the CEP owns the first 64 bytes and
//! every generic channel gets a region carved when it is first opened.
//!
//! Data moves by programmed I/O. `start_write` queues the first packet and
//! returns; each TX-packet interrupt queues the next one until the transfer
//! is done. `start_read` arms a channel and every RX interrupt moves one
//! packet, finishing on a short packet or once the requested length arrived.
//!
//! Execution model
//! ---------------
//!
//! [`Hsusbd::handle_interrupt`] must be called from the chip's bottom half on
//! the kernel thread, never from the ISR itself, and every other method must
//! be called on that same thread. `Hsusbd` is built from `Cell`s and is
//! therefore not `Sync`, which enforces that contract. Client callbacks run
//! inside `handle_interrupt` and may call straight back into the driver, for
//! example to start the data stage from `setup`.
//!
//! Usage
//! -----
//!
//! ```rust,ignore
//! let usb = static_init!(
//!     m5531::hsusbd::Hsusbd,
//!     m5531::hsusbd::Hsusbd::new(0, m5531::hsusbd::HSUSBD_BASE, HsusbdConfig::DEFAULT)
//! );
//! usb.set_client(device_stack);
//! usb.init()?;
//! ```

use core::cell::Cell;
use core::cmp;

use kernel::config::CONFIG;
use kernel::debug;
use kernel::hil::usb::{
    self, Client, CtrlDirection, DeviceSpeed, EndpointDescriptor, SetupPacket, TransferType,
    UsbController, CONTROL_IN, CONTROL_OUT,
};
use kernel::utilities::cells::OptionalCell;
use kernel::utilities::registers::interfaces::{ReadWriteable, Readable, Writeable};
use kernel::utilities::StaticRef;
use kernel::ErrorCode;

use crate::chip_config::M5531Config;

mod adapter;
mod endpoint;
mod events;
mod fifo;
pub mod registers;


pub use self::endpoint::{BufferAllocator, Progress, Transfer, TransferState};
pub use self::registers::HsusbdRegisters;

use self::adapter::StackAdapter;
use self::endpoint::{Channel, Endpoint};
use self::events::{BitOffsets, BusEvent, ControlEvent, GlobalEvent, ENDPOINT_IRQ_SHIFT};
use self::registers::{
    BUFADDR, BUSINT, CEPCNT, CEPCTL, CEPINT, DATCNT, DMACTL, EPCFG, EPINT, EPMPS, EPRSPCTL,
    EPTXCNT, FADDR, GINT, OPER, PHYCTL, SETUP, SETUP1_0,
};

/// Number of generic endpoint channels.
pub const NUM_ENDPOINTS: usize = 12;

pub const HSUSBD_BASE: StaticRef<HsusbdRegisters> =
    unsafe { StaticRef::new(0x4001_9000 as *const HsusbdRegisters) };

/// CEP status bits left over from before the control endpoint was opened.
const CEP_STALE_STATUS: u32 = 0x1ffc;

/// Static parameters of one controller instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HsusbdConfig {
    /// Size of the endpoint FIFO RAM in bytes.
    pub ram_size: u32,
    /// Largest region a single generic endpoint may take.
    pub max_buffer_size: u32,
    /// Region reserved for the control endpoint at the start of FIFO RAM.
    /// This is also the control endpoint's max packet size.
    pub control_buffer_size: u32,
    /// How many times `init` polls for a stable PHY clock before failing.
    pub phy_clock_poll_limit: u32,
    /// Negotiate high speed when VBUS is detected. Full speed otherwise.
    pub high_speed: bool,
}

impl HsusbdConfig {
    pub const DEFAULT: HsusbdConfig = HsusbdConfig {
        ram_size: 8192,
        max_buffer_size: 1024,
        control_buffer_size: 64,
        phy_clock_poll_limit: 100_000,
        high_speed: true,
    };
}

/// Device level state of the controller.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    /// Not initialised, or deinitialised.
    Off,
    /// Initialised, no VBUS seen.
    Idle,
    /// VBUS present and the pull-up enabled.
    Attached,
    Suspended,
}

/// Maps an endpoint address to a generic channel index, or `None` for the
/// control endpoint.
fn channel_index(address: u8) -> Result<Option<usize>, ErrorCode> {
    if address & 0x70 != 0 {
        return Err(ErrorCode::INVAL);
    }
    match usb::endpoint_number(address) as usize {
        0 => Ok(None),
        n if n <= NUM_ENDPOINTS => Ok(Some(n - 1)),
        _ => Err(ErrorCode::INVAL),
    }
}

/// Checks a caller buffer against the requested length.
fn check_buffer(buffer: Option<&[Cell<u8>]>, length: usize) -> Result<(), ErrorCode> {
    match buffer {
        None if length > 0 => Err(ErrorCode::INVAL),
        Some(buf) if buf.len() < length => Err(ErrorCode::INVAL),
        _ => Ok(()),
    }
}

pub struct Hsusbd<'a> {
    registers: StaticRef<HsusbdRegisters>,
    config: HsusbdConfig,
    state: Cell<State>,
    adapter: StackAdapter<'a>,
    allocator: BufferAllocator,
    control_in: Channel<'a>,
    control_out: Channel<'a>,
    /// Setup packet of the control transfer in progress.
    setup: OptionalCell<SetupPacket>,
    /// Data stage bytes queued or armed so far in this control transfer.
    control_progress: Cell<usize>,
    /// Address from SET_ADDRESS, latched on the next status stage.
    pending_address: Cell<u8>,
    endpoints: [Endpoint<'a>; NUM_ENDPOINTS],
}

impl<'a> Hsusbd<'a> {
    pub fn new(bus: u8, registers: StaticRef<HsusbdRegisters>, config: HsusbdConfig) -> Self {
        Hsusbd {
            registers,
            config,
            state: Cell::new(State::Off),
            adapter: StackAdapter::new(bus),
            allocator: BufferAllocator::new(
                config.control_buffer_size,
                config.ram_size,
                config.max_buffer_size,
            ),
            control_in: Channel::new(),
            control_out: Channel::new(),
            setup: OptionalCell::empty(),
            control_progress: Cell::new(0),
            pending_address: Cell::new(0),
            endpoints: core::array::from_fn(|_| Endpoint::new()),
        }
    }

    /// Controller at the fixed HSUSBD base address, set up for board `C`.
    pub fn from_chip_config<C: M5531Config>(bus: u8) -> Self {
        if CONFIG.trace_usb_events {
            debug!("hsusbd{}: {} configuration", bus, C::NAME);
        }
        Hsusbd::new(bus, HSUSBD_BASE, C::HSUSBD)
    }

    pub fn state(&self) -> State {
        self.state.get()
    }

    pub fn bus(&self) -> u8 {
        self.adapter.bus()
    }

    /// Address waiting for the status stage of SET_ADDRESS, 0 if none.
    pub fn pending_address(&self) -> u8 {
        self.pending_address.get()
    }

    /// Bytes of FIFO RAM handed out, including the control endpoint region.
    pub fn buffer_used(&self) -> u32 {
        self.allocator.used()
    }

    pub fn endpoint_enabled(&self, address: u8) -> bool {
        match channel_index(address) {
            Ok(Some(index)) => self.endpoints[index].enabled.get(),
            Ok(None) => self.state.get() != State::Off,
            Err(_) => false,
        }
    }

    /// Transfer type of an opened endpoint.
    pub fn endpoint_type(&self, address: u8) -> Option<TransferType> {
        match channel_index(address).ok()? {
            Some(index) if self.endpoints[index].enabled.get() => {
                Some(self.endpoints[index].transfer_type.get())
            }
            Some(_) => None,
            None => Some(TransferType::Control),
        }
    }

    /// Transfer state of the endpoint direction named by `address`.
    pub fn transfer_state(&self, address: u8) -> Option<TransferState> {
        match channel_index(address).ok()? {
            Some(index) => Some(self.endpoints[index].channel.state()),
            None if address & usb::ENDPOINT_DIR_IN != 0 => Some(self.control_in.state()),
            None => Some(self.control_out.state()),
        }
    }

    fn reset_state(&self) {
        self.allocator.reset();
        self.abort_transfers();
        self.pending_address.set(0);
        for endpoint in self.endpoints.iter() {
            endpoint.reset();
        }
    }

    fn abort_transfers(&self) {
        self.control_in.abort();
        self.control_out.abort();
        self.setup.clear();
        self.control_progress.set(0);
        for endpoint in self.endpoints.iter() {
            endpoint.channel.abort();
        }
    }

    // SE0 is forced by releasing the D+ pull-up.
    fn set_se0(&self) {
        self.registers.phyctl.modify(PHYCTL::DPPUEN::CLEAR);
    }

    fn clear_se0(&self) {
        self.registers.phyctl.modify(PHYCTL::DPPUEN::SET);
    }

    fn enable_transceiver(&self) {
        self.registers
            .phyctl
            .modify(PHYCTL::PHYEN::SET + PHYCTL::DPPUEN::SET);
    }

    fn disable_transceiver(&self) {
        self.registers.phyctl.modify(PHYCTL::DPPUEN::CLEAR);
    }

    fn reset_dma(&self) {
        let regs = &*self.registers;
        regs.dmacnt.set(0);
        regs.dmactl.write(DMACTL::DMARST::SET);
        regs.dmactl.set(0);
    }

    fn open_control(&self) {
        let regs = &*self.registers;
        regs.cepbufst.write(BUFADDR::ADDR.val(0));
        regs.cepbufend
            .write(BUFADDR::ADDR.val(self.config.control_buffer_size - 1));
        regs.cepinten.write(
            CEPINT::SETUPPK::SET + CEPINT::STSDONE::SET + CEPINT::TXPK::SET + CEPINT::RXPK::SET,
        );
        regs.faddr.write(FADDR::FADDR.val(0));
        regs.cepintsts.set(CEP_STALE_STATUS);
    }

    fn open_endpoint(
        &self,
        index: usize,
        descriptor: &EndpointDescriptor,
    ) -> Result<(), ErrorCode> {
        let regs = &self.registers.ep[index];
        let endpoint = &self.endpoints[index];

        let transfer_type = descriptor.transfer_type();
        let (ep_type, mode) = match transfer_type {
            TransferType::Bulk => (EPCFG::EPTYPE::Bulk, EPRSPCTL::MODE::Auto),
            TransferType::Interrupt => (EPCFG::EPTYPE::Interrupt, EPRSPCTL::MODE::Manual),
            TransferType::Isochronous => (EPCFG::EPTYPE::Isochronous, EPRSPCTL::MODE::Fly),
            TransferType::Control => return Err(ErrorCode::NOSUPPORT),
        };
        let max_packet_size = descriptor.packet_size();
        if max_packet_size == 0 {
            return Err(ErrorCode::INVAL);
        }
        let size = max_packet_size as u32;

        // A channel keeps its region across close and reopen.
        let start = match endpoint.region.get() {
            Some((start, capacity)) if capacity >= size => start,
            _ => {
                let start = self.allocator.allocate(size)?;
                endpoint.region.set(Some((start, size)));
                start
            }
        };

        endpoint.channel.abort();
        regs.epbufst.write(BUFADDR::ADDR.val(start));
        regs.epbufend.write(BUFADDR::ADDR.val(start + size - 1));
        regs.epmps.write(EPMPS::EPMPS.val(size));
        let direction = if descriptor.is_in() {
            regs.epinten.write(EPINT::TXPK::SET);
            EPCFG::EPDIR::In
        } else {
            regs.epinten
                .write(EPINT::RXPK::SET + EPINT::SHORTRX::SET + EPINT::BUFFULL::SET);
            EPCFG::EPDIR::Out
        };
        regs.eprspctl.write(EPRSPCTL::FLUSH::SET + mode);
        regs.epcfg.write(
            EPCFG::EPEN::SET
                + ep_type
                + direction
                + EPCFG::EPNUM.val(descriptor.number() as u32),
        );
        let ginten = &self.registers.ginten;
        ginten.set(ginten.get() | (1 << (index as u32 + ENDPOINT_IRQ_SHIFT)));

        endpoint.address.set(descriptor.address);
        endpoint.max_packet_size.set(max_packet_size);
        endpoint.transfer_type.set(transfer_type);
        endpoint.enabled.set(true);
        Ok(())
    }

    /// Looks up an opened generic endpoint for a transfer on `address`.
    fn transfer_endpoint(&self, index: usize, address: u8) -> Result<&Endpoint<'a>, ErrorCode> {
        let endpoint = &self.endpoints[index];
        if !endpoint.enabled.get() {
            return Err(ErrorCode::OFF);
        }
        if endpoint.address.get() != address {
            return Err(ErrorCode::INVAL);
        }
        Ok(endpoint)
    }

    /// Queue the chunk of the transfer on channel `index` that starts at
    /// `offset`.
    fn send_packet(&self, index: usize, offset: usize, length: usize) {
        let regs = &self.registers.ep[index];
        if let Some(chunk) = self.endpoints[index]
            .channel
            .buffer()
            .and_then(|buf| buf.get(offset..offset + length))
        {
            fifo::write_fifo(&regs.epdat, chunk);
        }
        regs.eprspctl.modify(EPRSPCTL::SHORTTXEN::SET);
        regs.eptxcnt.write(EPTXCNT::TXCNT.val(length as u32));
    }

    /// Enforce the direction and `wLength` of the control transfer in
    /// progress on a data stage of `length` bytes.
    fn check_control_stage(&self, direction: CtrlDirection, length: usize) -> Result<(), ErrorCode> {
        if length == 0 {
            return Ok(());
        }
        match self.setup.get() {
            Some(setup) => {
                if setup.direction() != direction {
                    return Err(ErrorCode::INVAL);
                }
                let allowed = (setup.length as usize).saturating_sub(self.control_progress.get());
                if length > allowed {
                    return Err(ErrorCode::SIZE);
                }
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn control_write(&self, data: Option<&'a [Cell<u8>]>, length: usize) -> Result<(), ErrorCode> {
        let regs = &*self.registers;
        if self.state.get() == State::Off {
            return Err(ErrorCode::OFF);
        }
        check_buffer(data, length)?;
        match data {
            // Status stage handshake.
            None => {
                regs.cepctl.write(CEPCTL::NAKCLR::CLEAR);
                Ok(())
            }
            Some(buf) => {
                let chunk = cmp::min(length, self.config.control_buffer_size as usize);
                self.check_control_stage(CtrlDirection::In, chunk)?;
                self.control_in
                    .begin(Some(buf), Transfer::new(chunk, chunk))?;
                if chunk == 0 {
                    regs.cepctl.write(CEPCTL::ZEROLEN::SET);
                } else {
                    fifo::write_fifo(&regs.cepdat, &buf[..chunk]);
                    regs.ceptxcnt.write(CEPCNT::CNT.val(chunk as u32));
                }
                self.control_progress.set(self.control_progress.get() + chunk);
                Ok(())
            }
        }
    }

    fn control_read(&self, buffer: Option<&'a [Cell<u8>]>, length: usize) -> Result<(), ErrorCode> {
        let regs = &*self.registers;
        if self.state.get() == State::Off {
            return Err(ErrorCode::OFF);
        }
        check_buffer(buffer, length)?;
        let buf = match buffer {
            Some(buf) if length > 0 => buf,
            // Status stage OUT is handled by the hardware.
            _ => return Ok(()),
        };
        let chunk = cmp::min(length, self.config.control_buffer_size as usize);
        self.check_control_stage(CtrlDirection::Out, chunk)?;
        if self.control_out.pending().is_some() {
            return Err(ErrorCode::BUSY);
        }
        self.control_progress.set(self.control_progress.get() + chunk);

        let ready = regs.cepdatcnt.read(DATCNT::DATCNT) as usize;
        if ready >= chunk {
            // The packet is already in the FIFO. The RX interrupt that
            // follows only reports the count.
            fifo::read_fifo(&regs.cepdat, &buf[..chunk]);
            if ready > chunk {
                fifo::drain_fifo(&regs.cepdat, ready - chunk);
            }
            self.control_out.finish(chunk);
            Ok(())
        } else {
            self.control_out.begin(Some(buf), Transfer::new(chunk, chunk))
        }
    }

    /// Service all pending controller interrupts.
    pub fn handle_interrupt(&self) {
        let regs = &*self.registers;
        let pending = regs.gintsts.get() & regs.ginten.get();

        for bit in BitOffsets(pending) {
            match events::global_event(bit) {
                Some(GlobalEvent::Bus) => self.handle_bus_events(),
                Some(GlobalEvent::Control) => self.handle_control_events(),
                Some(GlobalEvent::Endpoint(index)) => self.handle_endpoint_event(index),
                None => debug!("hsusbd: unknown global interrupt bit {}", bit),
            }
        }
    }

    fn handle_bus_events(&self) {
        let regs = &*self.registers;
        let status = regs.busintsts.get() & regs.businten.get();
        for bit in BitOffsets(status) {
            if let Some(event) = events::bus_event(bit) {
                if CONFIG.trace_usb_events {
                    debug!("hsusbd{}: bus {:?}", self.bus(), event);
                }
                self.handle_bus_event(event);
            }
        }
    }

    fn handle_bus_event(&self, event: BusEvent) {
        let regs = &*self.registers;
        match event {
            BusEvent::StartOfFrame => regs.busintsts.write(BUSINT::SOFIF::SET),
            BusEvent::Reset => {
                self.reset_dma();
                self.abort_transfers();
                self.pending_address.set(0);
                regs.faddr.write(FADDR::FADDR.val(0));
                self.state.set(State::Attached);
                self.adapter.reset();
                self.enable_transceiver();
                regs.busintsts.write(BUSINT::RSTIF::SET);
            }
            BusEvent::Resume => {
                regs.busintsts.write(BUSINT::RESUMEIF::SET);
                regs.businten.write(
                    BUSINT::RSTIF::SET + BUSINT::SUSPENDIF::SET + BUSINT::VBUSDETIF::SET,
                );
                self.state.set(State::Attached);
                self.adapter.resume();
            }
            BusEvent::Suspend => {
                regs.businten.write(
                    BUSINT::RSTIF::SET + BUSINT::RESUMEIF::SET + BUSINT::VBUSDETIF::SET,
                );
                regs.busintsts.write(BUSINT::SUSPENDIF::SET);
                self.state.set(State::Suspended);
                self.adapter.suspend();
            }
            BusEvent::HighSpeedSettled => regs.busintsts.write(BUSINT::HISPDIF::SET),
            BusEvent::DmaDone => regs.busintsts.write(BUSINT::DMADONEIF::SET),
            BusEvent::PhyClockValid => regs.busintsts.write(BUSINT::PHYCLKVLDIF::SET),
            BusEvent::VbusChanged => {
                regs.busintsts.write(BUSINT::VBUSDETIF::SET);
                if regs.phyctl.is_set(PHYCTL::VBUSDET) {
                    if self.config.high_speed {
                        regs.oper.write(OPER::HISPDEN::SET);
                    } else {
                        regs.oper.write(OPER::HISPDEN::CLEAR);
                    }
                    self.clear_se0();
                    if self.config.high_speed {
                        regs.oper.modify(OPER::HISHSEN::SET);
                    }
                    self.state.set(State::Attached);
                    self.adapter.connect();
                } else {
                    self.disable_transceiver();
                    self.abort_transfers();
                    self.state.set(State::Idle);
                    self.adapter.disconnect();
                }
            }
        }
    }

    fn handle_control_events(&self) {
        let regs = &*self.registers;
        let status = regs.cepintsts.get() & regs.cepinten.get();
        for bit in BitOffsets(status) {
            if let Some(event) = events::control_event(bit) {
                if CONFIG.trace_usb_events {
                    debug!("hsusbd{}: cep {:?}", self.bus(), event);
                }
                self.handle_control_event(event);
            }
        }
    }

    fn handle_control_event(&self, event: ControlEvent) {
        let regs = &*self.registers;
        match event {
            ControlEvent::SetupToken => regs.cepintsts.write(CEPINT::SETUPTK::SET),
            ControlEvent::SetupPacket => {
                let packet = SetupPacket {
                    request_type: regs.setup1_0.read(SETUP1_0::BMREQTYPE) as u8,
                    request: regs.setup1_0.read(SETUP1_0::BREQUEST) as u8,
                    value: regs.setup3_2.read(SETUP::VALUE) as u16,
                    index: regs.setup5_4.read(SETUP::VALUE) as u16,
                    length: regs.setup7_6.read(SETUP::VALUE) as u16,
                };
                // The copy is complete; release the single setup buffer
                // before the client can react.
                regs.cepintsts.write(CEPINT::SETUPPK::SET);

                // A new setup packet ends whatever control transfer was
                // in progress.
                self.control_in.abort();
                self.control_out.abort();
                self.control_progress.set(0);
                self.setup.set(packet);
                self.adapter.setup(&packet);
            }
            ControlEvent::OutToken => regs.cepintsts.write(CEPINT::OUTTK::SET),
            ControlEvent::InToken => regs.cepintsts.write(CEPINT::INTK::SET),
            ControlEvent::Ping => regs.cepintsts.write(CEPINT::PING::SET),
            ControlEvent::TxPacket => {
                regs.cepctl.write(CEPCTL::NAKCLR::CLEAR);
                let count = regs.ceptxcnt.read(CEPCNT::CNT) as usize;
                if self.control_in.pending().is_some() {
                    self.control_in.finish(count);
                }
                self.adapter.in_complete(CONTROL_IN, count);
                self.control_in.settle();
                regs.cepintsts.write(CEPINT::TXPK::SET);
            }
            ControlEvent::RxPacket => {
                let mut count = regs.ceprxcnt.read(CEPCNT::CNT) as usize;
                if let Some(mut transfer) = self.control_out.pending() {
                    let moved = cmp::min(count, transfer.remaining());
                    if let Some(dst) = self.control_out.buffer().and_then(|buf| buf.get(..moved)) {
                        fifo::read_fifo(&regs.cepdat, dst);
                    }
                    if count > moved {
                        fifo::drain_fifo(&regs.cepdat, count - moved);
                    }
                    let _ = transfer.packet_received(moved);
                    count = transfer.transferred();
                    self.control_out.finish(count);
                } else if let TransferState::Complete(read) = self.control_out.state() {
                    count = read;
                }
                self.adapter.out_complete(CONTROL_OUT, count);
                self.control_out.settle();
                regs.cepintsts.write(CEPINT::RXPK::SET);
            }
            ControlEvent::NakSent => regs.cepintsts.write(CEPINT::NAK::SET),
            ControlEvent::StallSent => regs.cepintsts.write(CEPINT::STALL::SET),
            ControlEvent::Error => regs.cepintsts.write(CEPINT::ERR::SET),
            ControlEvent::StatusDone => {
                let address = self.pending_address.get();
                if address > 0 && regs.faddr.read(FADDR::FADDR) == 0 {
                    regs.faddr.write(FADDR::FADDR.val(address as u32));
                    self.pending_address.set(0);
                }
                self.setup.clear();
                regs.cepintsts.write(CEPINT::STSDONE::SET);
            }
            ControlEvent::BufferFull => regs.cepintsts.write(CEPINT::BUFFULL::SET),
            ControlEvent::BufferEmpty => regs.cepintsts.write(CEPINT::BUFEMPTY::SET),
        }
    }

    fn handle_endpoint_event(&self, index: usize) {
        let regs = &self.registers.ep[index];
        let status = regs.epintsts.get() & regs.epinten.get();
        regs.epintsts.set(status);

        if CONFIG.trace_usb_events {
            debug!(
                "hsusbd{}: ep{} {:?} status {:#x}",
                self.bus(),
                index + 1,
                self.endpoints[index].transfer_type.get(),
                status
            );
        }
        if status == 0 {
            return;
        }
        if !self.endpoints[index].enabled.get() {
            debug!("hsusbd: event on closed endpoint {}", index + 1);
            return;
        }

        if regs.epcfg.matches_all(EPCFG::EPDIR::In) {
            self.endpoint_packet_sent(index);
        } else {
            self.endpoint_packet_received(index);
        }
    }

    fn endpoint_packet_sent(&self, index: usize) {
        let endpoint = &self.endpoints[index];
        let mut transfer = match endpoint.channel.pending() {
            Some(transfer) => transfer,
            None => {
                debug!("hsusbd: IN event with no transfer on endpoint {}", index + 1);
                return;
            }
        };
        match transfer.packet_sent() {
            Progress::Continue(chunk) => {
                endpoint.channel.update(transfer);
                self.send_packet(index, transfer.offset(), chunk);
            }
            Progress::Done(total) => {
                endpoint.channel.finish(total);
                self.adapter.in_complete(endpoint.address.get(), total);
                endpoint.channel.settle();
            }
        }
    }

    fn endpoint_packet_received(&self, index: usize) {
        let regs = &self.registers.ep[index];
        let endpoint = &self.endpoints[index];
        let mut transfer = match endpoint.channel.pending() {
            Some(transfer) => transfer,
            None => {
                debug!("hsusbd: OUT data with no read armed on endpoint {}", index + 1);
                return;
            }
        };

        let received = regs.epdatcnt.read(DATCNT::DATCNT) as usize;
        let moved = cmp::min(received, transfer.remaining());
        let offset = transfer.offset();
        if let Some(dst) = endpoint
            .channel
            .buffer()
            .and_then(|buf| buf.get(offset..offset + moved))
        {
            fifo::read_fifo(&regs.epdat, dst);
        }
        if received > moved {
            fifo::drain_fifo(&regs.epdat, received - moved);
        }

        match transfer.packet_received(received) {
            Progress::Continue(_) => endpoint.channel.update(transfer),
            Progress::Done(total) => {
                endpoint.channel.finish(total);
                self.adapter.out_complete(endpoint.address.get(), total);
                endpoint.channel.settle();
            }
        }
    }
}

impl<'a> UsbController<'a> for Hsusbd<'a> {
    fn set_client(&self, client: &'a dyn Client) {
        self.adapter.set_client(client);
    }

    fn init(&self) -> Result<(), ErrorCode> {
        let regs = &*self.registers;
        self.reset_state();

        regs.phyctl.modify(PHYCTL::PHYEN::SET);
        let mut polls = 0;
        while !regs.phyctl.is_set(PHYCTL::PHYCLKSTB) {
            polls += 1;
            if polls >= self.config.phy_clock_poll_limit {
                debug!("hsusbd{}: PHY clock not stable", self.bus());
                return Err(ErrorCode::FAIL);
            }
        }

        regs.oper.modify(OPER::HISPDEN::CLEAR);
        self.set_se0();
        regs.ginten.write(GINT::USBIF::SET + GINT::CEPIF::SET);
        regs.businten
            .write(BUSINT::RESUMEIF::SET + BUSINT::RSTIF::SET + BUSINT::VBUSDETIF::SET);
        self.clear_se0();
        self.enable_transceiver();
        self.state.set(State::Idle);
        Ok(())
    }

    fn deinit(&self) {
        self.registers.faddr.write(FADDR::FADDR.val(0));
        self.set_se0();
        self.disable_transceiver();
        self.abort_transfers();
        self.state.set(State::Off);
    }

    fn set_address(&self, address: u8) {
        self.pending_address.set(address & 0x7f);
    }

    fn port_speed(&self) -> DeviceSpeed {
        if self.registers.oper.is_set(OPER::CURSPD) {
            DeviceSpeed::High
        } else {
            DeviceSpeed::Full
        }
    }

    fn endpoint_open(&self, descriptor: &EndpointDescriptor) -> Result<(), ErrorCode> {
        match channel_index(descriptor.address)? {
            None => {
                if descriptor.is_in() {
                    self.open_control();
                }
                Ok(())
            }
            Some(index) => self.open_endpoint(index, descriptor),
        }
    }

    fn endpoint_close(&self, address: u8) -> Result<(), ErrorCode> {
        let index = match channel_index(address)? {
            None => return Ok(()),
            Some(index) => index,
        };
        let endpoint = &self.endpoints[index];
        self.registers.ep[index].epcfg.modify(EPCFG::EPEN::CLEAR);
        let ginten = &self.registers.ginten;
        ginten.set(ginten.get() & !(1 << (index as u32 + ENDPOINT_IRQ_SHIFT)));
        endpoint.enabled.set(false);
        endpoint.channel.abort();
        Ok(())
    }

    fn endpoint_set_stall(&self, address: u8) -> Result<(), ErrorCode> {
        match channel_index(address)? {
            None => self.registers.cepctl.write(CEPCTL::STALLEN::SET),
            Some(index) => self.registers.ep[index]
                .eprspctl
                .modify(EPRSPCTL::TOGGLE::CLEAR + EPRSPCTL::HALT::SET),
        }
        Ok(())
    }

    fn endpoint_clear_stall(&self, address: u8) -> Result<(), ErrorCode> {
        match channel_index(address)? {
            None => self.registers.cepctl.modify(CEPCTL::STALLEN::CLEAR),
            Some(index) => self.registers.ep[index]
                .eprspctl
                .modify(EPRSPCTL::HALT::CLEAR + EPRSPCTL::TOGGLE::SET),
        }
        Ok(())
    }

    fn endpoint_is_stalled(&self, address: u8) -> Result<bool, ErrorCode> {
        Ok(match channel_index(address)? {
            None => self.registers.cepctl.is_set(CEPCTL::STALLEN),
            Some(index) => self.registers.ep[index].eprspctl.is_set(EPRSPCTL::HALT),
        })
    }

    fn start_write(
        &self,
        address: u8,
        data: Option<&'a [Cell<u8>]>,
        length: usize,
    ) -> Result<(), ErrorCode> {
        let index = match channel_index(address)? {
            None => return self.control_write(data, length),
            Some(index) => index,
        };
        check_buffer(data, length)?;
        let endpoint = self.transfer_endpoint(index, address)?;
        let transfer = Transfer::new(length, endpoint.max_packet_size.get());
        endpoint.channel.begin(data, transfer)?;
        self.send_packet(index, 0, transfer.chunk());
        Ok(())
    }

    fn start_read(
        &self,
        address: u8,
        buffer: Option<&'a [Cell<u8>]>,
        length: usize,
    ) -> Result<(), ErrorCode> {
        let index = match channel_index(address)? {
            None => return self.control_read(buffer, length),
            Some(index) => index,
        };
        check_buffer(buffer, length)?;
        let endpoint = self.transfer_endpoint(index, address)?;
        endpoint
            .channel
            .begin(buffer, Transfer::new(length, endpoint.max_packet_size.get()))
    }
}
