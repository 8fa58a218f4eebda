// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

use std::path::PathBuf;

use nuwriter::error_codes::ErrorCode;

/// Errors that end a command.
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    #[error("{}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0}")]
    NuWriter(ErrorCode),
    #[error("device size {size} is not a multiple of {unit} bytes")]
    Geometry { size: usize, unit: usize },
    #[error("{} does not exist, give its size with --size", .0.display())]
    UnknownSize(PathBuf),
}

impl From<ErrorCode> for ToolError {
    fn from(code: ErrorCode) -> Self {
        ToolError::NuWriter(code)
    }
}

impl ToolError {
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> ToolError {
        let path = path.into();
        move |source| ToolError::Io { path, source }
    }
}
