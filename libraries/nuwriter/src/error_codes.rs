// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! The standard error codes used by NuWriter.

use core::fmt;

/// Standard error codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    /// A pack or boot-info marker is not `" NVT"`.
    InvalidMarker,
    /// The stored CRC32 does not match the data.
    ChecksumMismatch,
    /// The reserved word of the pack header is not `0xFFFFFFFF`.
    InvalidReserved,
    /// The data ends before a header, child or declared length does.
    Truncated,
    /// A boot-info header lists more than four images.
    TooManyImages,
    /// A boot-info image type is outside `0..=4`.
    InvalidImageType,
    /// A flash address is not on a sector or erase block boundary.
    UnalignedAddress,
    /// A caller buffer cannot hold one sector, one page or the output.
    BufferTooSmall,
    /// The storage device failed to read.
    ReadFail,
    /// The storage device failed to write.
    WriteFail,
    /// The storage device failed to erase.
    EraseFail,
    /// An image does not fit in the device.
    NoSpace,
    /// Neither boot-info header on the device is valid.
    NoValidHeader,
    /// The operation is not available for this device or boot source.
    Unsupported,
}

impl From<ErrorCode> for isize {
    fn from(original: ErrorCode) -> isize {
        match original {
            ErrorCode::InvalidMarker => -1,
            ErrorCode::ChecksumMismatch => -2,
            ErrorCode::InvalidReserved => -3,
            ErrorCode::Truncated => -4,
            ErrorCode::TooManyImages => -5,
            ErrorCode::InvalidImageType => -6,
            ErrorCode::UnalignedAddress => -7,
            ErrorCode::BufferTooSmall => -8,
            ErrorCode::ReadFail => -9,
            ErrorCode::WriteFail => -10,
            ErrorCode::EraseFail => -11,
            ErrorCode::NoSpace => -12,
            ErrorCode::NoValidHeader => -13,
            ErrorCode::Unsupported => -14,
        }
    }
}

impl From<ErrorCode> for usize {
    fn from(original: ErrorCode) -> usize {
        isize::from(original) as usize
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorCode::InvalidMarker => "wrong marker",
            ErrorCode::ChecksumMismatch => "invalid CRC32 checksum",
            ErrorCode::InvalidReserved => "wrong reserved word",
            ErrorCode::Truncated => "data is truncated",
            ErrorCode::TooManyImages => "image count is over range",
            ErrorCode::InvalidImageType => "invalid image type",
            ErrorCode::UnalignedAddress => "flash address is not aligned",
            ErrorCode::BufferTooSmall => "buffer too small",
            ErrorCode::ReadFail => "read failed",
            ErrorCode::WriteFail => "write failed",
            ErrorCode::EraseFail => "erase failed",
            ErrorCode::NoSpace => "image does not fit the device",
            ErrorCode::NoValidHeader => "no valid boot header",
            ErrorCode::Unsupported => "not supported",
        };
        f.write_str(text)
    }
}
