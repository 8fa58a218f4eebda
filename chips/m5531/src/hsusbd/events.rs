// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Decoding of interrupt status bits into events.
//!
//! Each status register is decoded through a table indexed by bit number.
//! Bits are visited lowest first.

use super::NUM_ENDPOINTS;

/// Source selected by one bit of GINTSTS.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum GlobalEvent {
    Bus,
    Control,
    Endpoint(usize),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum BusEvent {
    StartOfFrame,
    Reset,
    Resume,
    Suspend,
    HighSpeedSettled,
    DmaDone,
    PhyClockValid,
    VbusChanged,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ControlEvent {
    SetupToken,
    SetupPacket,
    OutToken,
    InToken,
    Ping,
    TxPacket,
    RxPacket,
    NakSent,
    StallSent,
    Error,
    StatusDone,
    BufferFull,
    BufferEmpty,
}

const BUS_EVENTS: [Option<BusEvent>; 9] = [
    Some(BusEvent::StartOfFrame),
    Some(BusEvent::Reset),
    Some(BusEvent::Resume),
    Some(BusEvent::Suspend),
    Some(BusEvent::HighSpeedSettled),
    Some(BusEvent::DmaDone),
    Some(BusEvent::PhyClockValid),
    None,
    Some(BusEvent::VbusChanged),
];

const CONTROL_EVENTS: [ControlEvent; 13] = [
    ControlEvent::SetupToken,
    ControlEvent::SetupPacket,
    ControlEvent::OutToken,
    ControlEvent::InToken,
    ControlEvent::Ping,
    ControlEvent::TxPacket,
    ControlEvent::RxPacket,
    ControlEvent::NakSent,
    ControlEvent::StallSent,
    ControlEvent::Error,
    ControlEvent::StatusDone,
    ControlEvent::BufferFull,
    ControlEvent::BufferEmpty,
];

/// First GINTSTS bit used by the generic endpoints.
pub(crate) const ENDPOINT_IRQ_SHIFT: u32 = 2;

pub(crate) fn global_event(bit: u32) -> Option<GlobalEvent> {
    match bit {
        0 => Some(GlobalEvent::Bus),
        1 => Some(GlobalEvent::Control),
        _ => {
            let index = (bit - ENDPOINT_IRQ_SHIFT) as usize;
            if index < NUM_ENDPOINTS {
                Some(GlobalEvent::Endpoint(index))
            } else {
                None
            }
        }
    }
}

pub(crate) fn bus_event(bit: u32) -> Option<BusEvent> {
    BUS_EVENTS.get(bit as usize).copied().flatten()
}

pub(crate) fn control_event(bit: u32) -> Option<ControlEvent> {
    CONTROL_EVENTS.get(bit as usize).copied()
}

/// Iterator over the indices of the set bits of a word, lowest first.
pub(crate) struct BitOffsets(pub(crate) u32);

impl Iterator for BitOffsets {
    type Item = u32;
    fn next(&mut self) -> Option<Self::Item> {
        if self.0 != 0 {
            let offset = self.0.trailing_zeros();
            self.0 &= self.0 - 1;
            Some(offset)
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let popcnt = self.0.count_ones() as usize;
        (popcnt, Some(popcnt))
    }
}

impl ExactSizeIterator for BitOffsets {}
