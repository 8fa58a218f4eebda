// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Interface to USB device controller hardware.
//!
//! A device stack (enumeration, class drivers) sits above a
//! [`UsbController`] and receives bus and transfer events through the
//! [`Client`] trait. Transfers are asynchronous: `start_write` and
//! `start_read` queue at most one packet and return, and completion is
//! reported later through `in_complete` / `out_complete`.
//!
//! Errors use the standard [`ErrorCode`]:
//!
//! - `INVAL`: no buffer with a nonzero length, a buffer shorter than the
//!   requested length, or a malformed endpoint address.
//! - `OFF`: the endpoint was not opened.
//! - `NOSUPPORT`: the endpoint type cannot be used on that endpoint.
//! - `NOMEM`: the controller ran out of endpoint buffer memory.
//! - `BUSY`: a transfer is already pending on the endpoint.
//! - `SIZE`: the length exceeds a hardware or control transfer bound.

use core::cell::Cell;

use crate::ErrorCode;

/// Direction bit of an endpoint address.
pub const ENDPOINT_DIR_IN: u8 = 0x80;

/// Address of the control endpoint in the IN direction.
pub const CONTROL_IN: u8 = 0x80;
/// Address of the control endpoint in the OUT direction.
pub const CONTROL_OUT: u8 = 0x00;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransferType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

impl TransferType {
    /// Decode the transfer type from a descriptor `bmAttributes` value.
    pub fn from_attributes(attributes: u8) -> TransferType {
        match attributes & 0x03 {
            0 => TransferType::Control,
            1 => TransferType::Isochronous,
            2 => TransferType::Bulk,
            _ => TransferType::Interrupt,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeviceSpeed {
    Full,
    High,
}

/// Fields of an endpoint descriptor needed to open an endpoint.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EndpointDescriptor {
    /// `bEndpointAddress`: number in bits 0..4, direction in bit 7.
    pub address: u8,
    /// `bmAttributes`: transfer type in bits 0..2.
    pub attributes: u8,
    /// `wMaxPacketSize`: packet size in bits 0..11.
    pub max_packet_size: u16,
}

impl EndpointDescriptor {
    pub const fn new(address: u8, attributes: u8, max_packet_size: u16) -> Self {
        EndpointDescriptor {
            address,
            attributes,
            max_packet_size,
        }
    }

    pub fn number(&self) -> u8 {
        endpoint_number(self.address)
    }

    pub fn is_in(&self) -> bool {
        self.address & ENDPOINT_DIR_IN != 0
    }

    pub fn transfer_type(&self) -> TransferType {
        TransferType::from_attributes(self.attributes)
    }

    /// Packet size without the high-bandwidth transaction bits.
    pub fn packet_size(&self) -> usize {
        (self.max_packet_size & 0x07ff) as usize
    }
}

/// Endpoint number of an endpoint address.
pub fn endpoint_number(address: u8) -> u8 {
    address & 0x0f
}

/// Transfer direction of the data stage of a control transfer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CtrlDirection {
    /// Device to host
    In,
    /// Host to device
    Out,
}

/// The 8 byte packet that opens every control transfer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupPacket {
    pub fn from_bytes(bytes: &[u8; 8]) -> SetupPacket {
        SetupPacket {
            request_type: bytes[0],
            request: bytes[1],
            value: u16::from_le_bytes([bytes[2], bytes[3]]),
            index: u16::from_le_bytes([bytes[4], bytes[5]]),
            length: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; 8] {
        let value = self.value.to_le_bytes();
        let index = self.index.to_le_bytes();
        let length = self.length.to_le_bytes();
        [
            self.request_type,
            self.request,
            value[0],
            value[1],
            index[0],
            index[1],
            length[0],
            length[1],
        ]
    }

    pub fn direction(&self) -> CtrlDirection {
        if self.request_type & 0x80 != 0 {
            CtrlDirection::In
        } else {
            CtrlDirection::Out
        }
    }
}

/// USB device controller interface
///
/// The bus id reported to the client is a property of the controller
/// instance, so none of these calls take one.
pub trait UsbController<'a> {
    fn set_client(&self, client: &'a dyn Client);

    /// Reset all driver state, power the PHY and attach to the bus.
    fn init(&self) -> Result<(), ErrorCode>;

    /// Detach from the bus and stop the controller.
    fn deinit(&self);

    /// Record the address granted by SET_ADDRESS. It is applied once the
    /// status stage of that request completes.
    fn set_address(&self, address: u8);

    fn port_speed(&self) -> DeviceSpeed;

    fn endpoint_open(&self, descriptor: &EndpointDescriptor) -> Result<(), ErrorCode>;

    fn endpoint_close(&self, address: u8) -> Result<(), ErrorCode>;

    fn endpoint_set_stall(&self, address: u8) -> Result<(), ErrorCode>;

    fn endpoint_clear_stall(&self, address: u8) -> Result<(), ErrorCode>;

    fn endpoint_is_stalled(&self, address: u8) -> Result<bool, ErrorCode>;

    /// Queue `length` bytes of `data` on an IN endpoint.
    ///
    /// The buffer stays borrowed by the controller until `in_complete` is
    /// called for `address`. On the control endpoint `None` with a length of
    /// zero sends the status stage handshake and `Some` with a length of zero
    /// sends a zero length data packet.
    fn start_write(
        &self,
        address: u8,
        data: Option<&'a [Cell<u8>]>,
        length: usize,
    ) -> Result<(), ErrorCode>;

    /// Receive up to `length` bytes into `buffer` from an OUT endpoint.
    ///
    /// The transfer ends when `length` bytes arrived or the host sent a short
    /// packet, whichever happens first.
    fn start_read(
        &self,
        address: u8,
        buffer: Option<&'a [Cell<u8>]>,
        length: usize,
    ) -> Result<(), ErrorCode>;
}

/// USB device controller client interface
///
/// Callbacks run from the controller's interrupt handling path and may call
/// straight back into the controller to start the next transfer.
pub trait Client {
    fn reset(&self, bus: u8);
    fn resume(&self, bus: u8);
    fn suspend(&self, bus: u8);
    fn connect(&self, bus: u8);
    fn disconnect(&self, bus: u8);

    /// A setup packet was received on the control endpoint.
    fn setup(&self, bus: u8, packet: &SetupPacket);

    /// An IN transfer finished after `length` bytes.
    fn in_complete(&self, bus: u8, endpoint: u8, length: usize);

    /// An OUT transfer finished after `length` bytes.
    fn out_complete(&self, bus: u8, endpoint: u8, length: usize);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_packet_bytes_are_little_endian() {
        let bytes = [0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00];
        let packet = SetupPacket::from_bytes(&bytes);
        assert_eq!(packet.request, 0x06);
        assert_eq!(packet.value, 0x0100);
        assert_eq!(packet.length, 0x12);
        assert_eq!(packet.direction(), CtrlDirection::In);
        assert_eq!(packet.to_bytes(), bytes);
    }

    #[test]
    fn descriptor_fields() {
        let desc = EndpointDescriptor::new(0x82, 0x02, 0x1200);
        assert_eq!(desc.number(), 2);
        assert!(desc.is_in());
        assert_eq!(desc.transfer_type(), TransferType::Bulk);
        assert_eq!(desc.packet_size(), 0x200);
        assert_eq!(TransferType::from_attributes(0x0d), TransferType::Isochronous);
        assert_eq!(TransferType::from_attributes(0x03), TransferType::Interrupt);
    }
}
