// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! High-speed OTG block: ID pin role detection for the HSUSB port.
//!
//! The OTG block decides whether the port acts as host or peripheral from
//! the ID pin. This driver only enables detection, reports the current role
//! and acknowledges OTG interrupts; HNP and SRP are not used.

use kernel::debug;
use kernel::utilities::cells::OptionalCell;
use kernel::utilities::registers::interfaces::{ReadWriteable, Readable, Writeable};
use kernel::utilities::registers::{register_bitfields, register_structs, ReadOnly, ReadWrite};
use kernel::utilities::StaticRef;

use crate::chip_config::M5531Config;

register_structs! {
    pub HsotgRegisters {
        (0x00 => pub ctl: ReadWrite<u32, CTL::Register>),
        (0x04 => pub phyctl: ReadWrite<u32, PHYCTL::Register>),
        (0x08 => pub inten: ReadWrite<u32, INT::Register>),
        (0x0c => pub intsts: ReadWrite<u32, INT::Register>),
        (0x10 => pub status: ReadWrite<u32, STATUS::Register>),
        (0x14 => _reserved0),
        (0x20 => pub id: ReadOnly<u32>),
        (0x24 => @END),
    }
}

register_bitfields![u32,
    pub CTL [
        VBUSDROP OFFSET(0) NUMBITS(1) [],
        BUSREQ OFFSET(1) NUMBITS(1) [],
        HNPREQEN OFFSET(2) NUMBITS(1) [],
        OTGEN OFFSET(4) NUMBITS(1) [],
        WKEN OFFSET(5) NUMBITS(1) []
    ],
    pub PHYCTL [
        OTGPHYEN OFFSET(0) NUMBITS(1) [],
        IDDETEN OFFSET(1) NUMBITS(1) []
    ],
    pub INT [
        ROLECHG OFFSET(0) NUMBITS(1) [],
        VBE OFFSET(1) NUMBITS(1) [],
        SRPF OFFSET(2) NUMBITS(1) [],
        HNPF OFFSET(3) NUMBITS(1) [],
        GOIDLE OFFSET(4) NUMBITS(1) [],
        IDCHG OFFSET(5) NUMBITS(1) [],
        PDEV OFFSET(6) NUMBITS(1) [],
        HOST OFFSET(7) NUMBITS(1) [],
        BVLDCHG OFFSET(8) NUMBITS(1) [],
        AVLDCHG OFFSET(9) NUMBITS(1) [],
        VBCHG OFFSET(10) NUMBITS(1) [],
        SECHG OFFSET(11) NUMBITS(1) [],
        SRPDET OFFSET(13) NUMBITS(1) []
    ],
    pub STATUS [
        OVERCUR OFFSET(0) NUMBITS(1) [],
        /// 1 when the ID pin is floating (B-device).
        IDSTS OFFSET(1) NUMBITS(1) [],
        SESSEND OFFSET(2) NUMBITS(1) [],
        BVLD OFFSET(3) NUMBITS(1) [],
        AVLD OFFSET(4) NUMBITS(1) [],
        VBUSVLD OFFSET(5) NUMBITS(1) [],
        ASPERI OFFSET(6) NUMBITS(1) [],
        ASHOST OFFSET(7) NUMBITS(1) []
    ]
];

pub const HSOTG_BASE: StaticRef<HsotgRegisters> =
    unsafe { StaticRef::new(0x4004_D000 as *const HsotgRegisters) };

/// Role of the HSUSB port as seen by the OTG block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Host,
    Peripheral,
    /// Any other combination of the role bits, with the raw bits.
    Undetermined(u32),
}

pub trait RoleClient {
    /// The ID pin changed or the block switched role.
    fn role_changed(&self, role: Role);
}

pub struct Hsotg<'a> {
    registers: StaticRef<HsotgRegisters>,
    client: OptionalCell<&'a dyn RoleClient>,
}

impl<'a> Hsotg<'a> {
    pub const fn new(registers: StaticRef<HsotgRegisters>) -> Hsotg<'a> {
        Hsotg {
            registers,
            client: OptionalCell::empty(),
        }
    }

    /// OTG block at the fixed base address if board `C` routes the HSUSB
    /// port through it.
    pub fn from_chip_config<C: M5531Config>() -> Option<Hsotg<'a>> {
        if C::HSOTG_ROLE_DETECT {
            Some(Hsotg::new(HSOTG_BASE))
        } else {
            None
        }
    }

    pub fn set_client(&self, client: &'a dyn RoleClient) {
        self.client.set(client);
    }

    /// Enable the OTG PHY with ID detection and unmask the role and session
    /// interrupts.
    pub fn init(&self) {
        let regs = &*self.registers;
        regs.phyctl
            .modify(PHYCTL::OTGPHYEN::SET + PHYCTL::IDDETEN::SET);
        regs.intsts.set(regs.intsts.get());
        regs.inten.write(
            INT::IDCHG::SET
                + INT::HOST::SET
                + INT::PDEV::SET
                + INT::BVLDCHG::SET
                + INT::AVLDCHG::SET,
        );
    }

    pub fn role(&self) -> Role {
        let status = self.registers.status.get()
            & (STATUS::ASHOST::SET + STATUS::ASPERI::SET + STATUS::IDSTS::SET).value;
        if status == (STATUS::IDSTS::SET + STATUS::ASPERI::SET).value {
            Role::Peripheral
        } else if status == STATUS::ASHOST::SET.value {
            Role::Host
        } else {
            Role::Undetermined(status)
        }
    }

    pub fn handle_interrupt(&self) {
        let regs = &*self.registers;
        let status = regs.intsts.extract();

        if status.is_set(INT::IDCHG) {
            regs.intsts.write(INT::IDCHG::SET);
            debug!("hsotg: id change");
        }
        if status.is_set(INT::HOST) {
            regs.intsts.write(INT::HOST::SET);
            debug!("hsotg: acting as host");
        }
        if status.is_set(INT::PDEV) {
            regs.intsts.write(INT::PDEV::SET);
            debug!("hsotg: acting as peripheral");
        }
        if status.is_set(INT::AVLDCHG) {
            regs.intsts.write(INT::AVLDCHG::SET);
            debug!("hsotg: A-device session valid changed");
        }
        if status.is_set(INT::BVLDCHG) {
            regs.intsts.write(INT::BVLDCHG::SET);
            debug!("hsotg: B-device session valid changed");
        }

        if status.any_matching_bits_set(INT::IDCHG::SET + INT::HOST::SET + INT::PDEV::SET) {
            let role = self.role();
            self.client.map(|client| client.role_changed(role));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use std::boxed::Box;

    fn registers() -> StaticRef<HsotgRegisters> {
        let regs: &'static HsotgRegisters =
            Box::leak(Box::new(unsafe { core::mem::zeroed::<HsotgRegisters>() }));
        unsafe { StaticRef::new(regs as *const HsotgRegisters) }
    }

    struct LastRole(Cell<Option<Role>>);

    impl RoleClient for LastRole {
        fn role_changed(&self, role: Role) {
            self.0.set(Some(role));
        }
    }

    #[test]
    fn only_otg_boards_get_role_detection() {
        use crate::chip_config::{NuMakerM5531, NuMakerM5531Otg};
        assert!(Hsotg::from_chip_config::<NuMakerM5531Otg>().is_some());
        assert!(Hsotg::from_chip_config::<NuMakerM5531>().is_none());
    }

    #[test]
    fn init_enables_id_detection() {
        let regs = registers();
        let otg = Hsotg::new(regs);
        otg.init();
        assert!(regs.phyctl.is_set(PHYCTL::OTGPHYEN));
        assert!(regs.phyctl.is_set(PHYCTL::IDDETEN));
        assert!(regs.inten.is_set(INT::IDCHG));
        assert!(regs.inten.is_set(INT::AVLDCHG));
        assert!(!regs.inten.is_set(INT::VBCHG));
    }

    #[test]
    fn role_from_status() {
        let regs = registers();
        let otg = Hsotg::new(regs);
        regs.status
            .write(STATUS::IDSTS::SET + STATUS::ASPERI::SET + STATUS::BVLD::SET);
        assert_eq!(otg.role(), Role::Peripheral);
        regs.status.write(STATUS::ASHOST::SET);
        assert_eq!(otg.role(), Role::Host);
        regs.status.write(STATUS::IDSTS::SET);
        assert_eq!(otg.role(), Role::Undetermined(0x2));
    }

    #[test]
    fn role_change_reaches_client() {
        let regs = registers();
        let otg = Hsotg::new(regs);
        let client = LastRole(Cell::new(None));
        otg.set_client(&client);
        otg.init();

        regs.status.write(STATUS::ASHOST::SET);
        regs.intsts.write(INT::BVLDCHG::SET);
        otg.handle_interrupt();
        assert_eq!(client.0.get(), None);

        regs.intsts.write(INT::IDCHG::SET + INT::HOST::SET);
        otg.handle_interrupt();
        assert_eq!(client.0.get(), Some(Role::Host));
    }
}
