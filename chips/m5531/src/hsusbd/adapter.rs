// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Forwarding of controller events to the device stack.

use kernel::hil::usb::{Client, SetupPacket};
use kernel::utilities::cells::OptionalCell;

/// Calls into the registered [`Client`], tagging every event with the bus id
/// of the controller. Events with no client registered are dropped.
pub(crate) struct StackAdapter<'a> {
    bus: u8,
    client: OptionalCell<&'a dyn Client>,
}

impl<'a> StackAdapter<'a> {
    pub(crate) const fn new(bus: u8) -> StackAdapter<'a> {
        StackAdapter {
            bus,
            client: OptionalCell::empty(),
        }
    }

    pub(crate) fn bus(&self) -> u8 {
        self.bus
    }

    pub(crate) fn set_client(&self, client: &'a dyn Client) {
        self.client.set(client);
    }

    pub(crate) fn reset(&self) {
        self.client.map(|client| client.reset(self.bus));
    }

    pub(crate) fn resume(&self) {
        self.client.map(|client| client.resume(self.bus));
    }

    pub(crate) fn suspend(&self) {
        self.client.map(|client| client.suspend(self.bus));
    }

    pub(crate) fn connect(&self) {
        self.client.map(|client| client.connect(self.bus));
    }

    pub(crate) fn disconnect(&self) {
        self.client.map(|client| client.disconnect(self.bus));
    }

    pub(crate) fn setup(&self, packet: &SetupPacket) {
        self.client.map(|client| client.setup(self.bus, packet));
    }

    pub(crate) fn in_complete(&self, endpoint: u8, length: usize) {
        self.client
            .map(|client| client.in_complete(self.bus, endpoint, length));
    }

    pub(crate) fn out_complete(&self, endpoint: u8, length: usize) {
        self.client
            .map(|client| client.out_complete(self.bus, endpoint, length));
    }
}
