// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! HSUSBD register map.

use kernel::utilities::registers::{register_bitfields, register_structs, ReadOnly, ReadWrite};

use super::NUM_ENDPOINTS;

register_structs! {
    pub HsusbdRegisters {
        (0x000 => pub gintsts: ReadWrite<u32, GINT::Register>),
        (0x004 => _reserved0),
        (0x008 => pub ginten: ReadWrite<u32, GINT::Register>),
        (0x00c => _reserved1),
        (0x010 => pub busintsts: ReadWrite<u32, BUSINT::Register>),
        (0x014 => pub businten: ReadWrite<u32, BUSINT::Register>),
        (0x018 => pub oper: ReadWrite<u32, OPER::Register>),
        (0x01c => pub framecnt: ReadOnly<u32>),
        (0x020 => pub faddr: ReadWrite<u32, FADDR::Register>),
        (0x024 => pub test: ReadWrite<u32>),
        // Control endpoint data port. Byte accesses move a single byte.
        (0x028 => pub cepdat: ReadWrite<u32>),
        (0x02c => pub cepctl: ReadWrite<u32, CEPCTL::Register>),
        (0x030 => pub cepinten: ReadWrite<u32, CEPINT::Register>),
        (0x034 => pub cepintsts: ReadWrite<u32, CEPINT::Register>),
        (0x038 => pub ceptxcnt: ReadWrite<u32, CEPCNT::Register>),
        (0x03c => pub ceprxcnt: ReadWrite<u32, CEPCNT::Register>),
        (0x040 => pub cepdatcnt: ReadWrite<u32, DATCNT::Register>),
        (0x044 => pub setup1_0: ReadWrite<u32, SETUP1_0::Register>),
        (0x048 => pub setup3_2: ReadWrite<u32, SETUP::Register>),
        (0x04c => pub setup5_4: ReadWrite<u32, SETUP::Register>),
        (0x050 => pub setup7_6: ReadWrite<u32, SETUP::Register>),
        (0x054 => pub cepbufst: ReadWrite<u32, BUFADDR::Register>),
        (0x058 => pub cepbufend: ReadWrite<u32, BUFADDR::Register>),
        (0x05c => pub dmactl: ReadWrite<u32, DMACTL::Register>),
        (0x060 => pub dmacnt: ReadWrite<u32>),
        (0x064 => pub ep: [EndpointRegisters; NUM_ENDPOINTS]),
        (0x244 => _reserved2),
        (0x700 => pub dmaaddr: ReadWrite<u32>),
        (0x704 => pub phyctl: ReadWrite<u32, PHYCTL::Register>),
        (0x708 => @END),
    },

    // Registers of one generic endpoint channel (EPA..EPL).
    pub EndpointRegisters {
        // Data port. Byte accesses move a single byte.
        (0x00 => pub epdat: ReadWrite<u32>),
        (0x04 => pub epintsts: ReadWrite<u32, EPINT::Register>),
        (0x08 => pub epinten: ReadWrite<u32, EPINT::Register>),
        (0x0c => pub epdatcnt: ReadWrite<u32, DATCNT::Register>),
        (0x10 => pub eprspctl: ReadWrite<u32, EPRSPCTL::Register>),
        (0x14 => pub epmps: ReadWrite<u32, EPMPS::Register>),
        (0x18 => pub eptxcnt: ReadWrite<u32, EPTXCNT::Register>),
        (0x1c => pub epcfg: ReadWrite<u32, EPCFG::Register>),
        (0x20 => pub epbufst: ReadWrite<u32, BUFADDR::Register>),
        (0x24 => pub epbufend: ReadWrite<u32, BUFADDR::Register>),
        (0x28 => @END),
    }
}

register_bitfields![u32,
    pub GINT [
        USBIF OFFSET(0) NUMBITS(1) [],
        CEPIF OFFSET(1) NUMBITS(1) [],
        /// One bit per generic endpoint, EPA in bit 2.
        EPIF OFFSET(2) NUMBITS(12) []
    ],
    pub BUSINT [
        SOFIF OFFSET(0) NUMBITS(1) [],
        RSTIF OFFSET(1) NUMBITS(1) [],
        RESUMEIF OFFSET(2) NUMBITS(1) [],
        SUSPENDIF OFFSET(3) NUMBITS(1) [],
        HISPDIF OFFSET(4) NUMBITS(1) [],
        DMADONEIF OFFSET(5) NUMBITS(1) [],
        PHYCLKVLDIF OFFSET(6) NUMBITS(1) [],
        VBUSDETIF OFFSET(8) NUMBITS(1) []
    ],
    pub OPER [
        RESUMEEN OFFSET(0) NUMBITS(1) [],
        HISPDEN OFFSET(1) NUMBITS(1) [],
        CURSPD OFFSET(2) NUMBITS(1) [],
        HISHSEN OFFSET(3) NUMBITS(1) []
    ],
    pub FADDR [
        FADDR OFFSET(0) NUMBITS(7) []
    ],
    pub CEPCTL [
        /// Writing 0 releases the NAK hold on the control endpoint.
        NAKCLR OFFSET(0) NUMBITS(1) [],
        STALLEN OFFSET(1) NUMBITS(1) [],
        ZEROLEN OFFSET(2) NUMBITS(1) [],
        FLUSH OFFSET(3) NUMBITS(1) []
    ],
    pub CEPINT [
        SETUPTK OFFSET(0) NUMBITS(1) [],
        SETUPPK OFFSET(1) NUMBITS(1) [],
        OUTTK OFFSET(2) NUMBITS(1) [],
        INTK OFFSET(3) NUMBITS(1) [],
        PING OFFSET(4) NUMBITS(1) [],
        TXPK OFFSET(5) NUMBITS(1) [],
        RXPK OFFSET(6) NUMBITS(1) [],
        NAK OFFSET(7) NUMBITS(1) [],
        STALL OFFSET(8) NUMBITS(1) [],
        ERR OFFSET(9) NUMBITS(1) [],
        STSDONE OFFSET(10) NUMBITS(1) [],
        BUFFULL OFFSET(11) NUMBITS(1) [],
        BUFEMPTY OFFSET(12) NUMBITS(1) []
    ],
    pub CEPCNT [
        CNT OFFSET(0) NUMBITS(8) []
    ],
    pub DATCNT [
        DATCNT OFFSET(0) NUMBITS(16) [],
        DMALOOP OFFSET(16) NUMBITS(15) []
    ],
    pub SETUP1_0 [
        BMREQTYPE OFFSET(0) NUMBITS(8) [],
        BREQUEST OFFSET(8) NUMBITS(8) []
    ],
    pub SETUP [
        VALUE OFFSET(0) NUMBITS(16) []
    ],
    pub BUFADDR [
        ADDR OFFSET(0) NUMBITS(13) []
    ],
    pub DMACTL [
        EPNUM OFFSET(0) NUMBITS(4) [],
        DMARD OFFSET(4) NUMBITS(1) [],
        DMAEN OFFSET(5) NUMBITS(1) [],
        SGEN OFFSET(6) NUMBITS(1) [],
        DMARST OFFSET(7) NUMBITS(1) []
    ],
    pub EPINT [
        BUFFULL OFFSET(0) NUMBITS(1) [],
        BUFEMPTY OFFSET(1) NUMBITS(1) [],
        SHORTTX OFFSET(2) NUMBITS(1) [],
        TXPK OFFSET(3) NUMBITS(1) [],
        RXPK OFFSET(4) NUMBITS(1) [],
        OUTTK OFFSET(5) NUMBITS(1) [],
        INTK OFFSET(6) NUMBITS(1) [],
        PING OFFSET(7) NUMBITS(1) [],
        NAK OFFSET(8) NUMBITS(1) [],
        STALL OFFSET(9) NUMBITS(1) [],
        NYET OFFSET(10) NUMBITS(1) [],
        ERR OFFSET(11) NUMBITS(1) [],
        SHORTRX OFFSET(12) NUMBITS(1) []
    ],
    pub EPRSPCTL [
        FLUSH OFFSET(0) NUMBITS(1) [],
        MODE OFFSET(1) NUMBITS(2) [
            Auto = 0,
            Manual = 1,
            Fly = 2
        ],
        TOGGLE OFFSET(3) NUMBITS(1) [],
        HALT OFFSET(4) NUMBITS(1) [],
        ZEROLEN OFFSET(5) NUMBITS(1) [],
        SHORTTXEN OFFSET(6) NUMBITS(1) [],
        DISBUF OFFSET(7) NUMBITS(1) []
    ],
    pub EPMPS [
        EPMPS OFFSET(0) NUMBITS(11) []
    ],
    pub EPTXCNT [
        TXCNT OFFSET(0) NUMBITS(11) []
    ],
    pub EPCFG [
        EPEN OFFSET(0) NUMBITS(1) [],
        EPTYPE OFFSET(1) NUMBITS(2) [
            Bulk = 1,
            Interrupt = 2,
            Isochronous = 3
        ],
        EPDIR OFFSET(3) NUMBITS(1) [
            Out = 0,
            In = 1
        ],
        EPNUM OFFSET(4) NUMBITS(4) []
    ],
    pub PHYCTL [
        DPPUEN OFFSET(8) NUMBITS(1) [],
        PHYEN OFFSET(9) NUMBITS(1) [],
        WKEN OFFSET(24) NUMBITS(1) [],
        PHYCLKSTB OFFSET(30) NUMBITS(1) [],
        VBUSDET OFFSET(31) NUMBITS(1) []
    ]
];
