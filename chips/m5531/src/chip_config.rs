// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! Chip specific configuration.
//!
//! Boards pick one of the configurations below, or provide their own, to
//! describe how the USB peripherals of the M5531 are used on that board.

use crate::hsusbd::HsusbdConfig;

/// M5531 configuration based on the target board.
pub trait M5531Config {
    /// Identifier for the platform. This is useful for debugging to confirm the
    /// correct configuration of the chip is being used.
    const NAME: &'static str;

    /// Parameters of the high-speed USB device controller.
    const HSUSBD: HsusbdConfig;

    /// Whether the board routes the HSUSB port through the OTG block, so the
    /// ID pin decides between host and device role.
    const HSOTG_ROLE_DETECT: bool;
}

/// NuMaker board with the HSUSB port wired as a device port.
pub enum NuMakerM5531 {}

impl M5531Config for NuMakerM5531 {
    const NAME: &'static str = "numaker-m5531";
    const HSUSBD: HsusbdConfig = HsusbdConfig::DEFAULT;
    const HSOTG_ROLE_DETECT: bool = false;
}

/// Same board with the port limited to full speed, for hosts or cables that
/// fail the high-speed chirp.
pub enum NuMakerM5531FullSpeed {}

impl M5531Config for NuMakerM5531FullSpeed {
    const NAME: &'static str = "numaker-m5531-fs";
    const HSUSBD: HsusbdConfig = HsusbdConfig {
        high_speed: false,
        ..HsusbdConfig::DEFAULT
    };
    const HSOTG_ROLE_DETECT: bool = false;
}

/// NuMaker board with the HSUSB port on a micro-AB connector.
pub enum NuMakerM5531Otg {}

impl M5531Config for NuMakerM5531Otg {
    const NAME: &'static str = "numaker-m5531-otg";
    const HSUSBD: HsusbdConfig = HsusbdConfig::DEFAULT;
    const HSOTG_ROLE_DETECT: bool = true;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_speed_only_changes_speed() {
        let fs = NuMakerM5531FullSpeed::HSUSBD;
        assert!(!fs.high_speed);
        assert_eq!(
            fs,
            HsusbdConfig {
                high_speed: false,
                ..NuMakerM5531::HSUSBD
            }
        );
        assert_eq!(NuMakerM5531::HSUSBD.ram_size, 8192);
        assert_eq!(NuMakerM5531::HSUSBD.max_buffer_size, 1024);
        assert!(NuMakerM5531Otg::HSOTG_ROLE_DETECT);
    }
}
