/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::fmt;

/// Coarse exit-code taxonomy surfaced through [`anyhow`]. Health-test and
/// restart-sanity failures are *not* represented here - those are ordinary
/// boolean/verdict return values, never errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    InputMalformed,
    OutOfMemory,
    NumericOverflow,
    NonConvergence,
    Unsupported,
    GeneralFailure,
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitCode::InputMalformed => "InputMalformed",
            ExitCode::OutOfMemory => "OutOfMemory",
            ExitCode::NumericOverflow => "NumericOverflow",
            ExitCode::NonConvergence => "NonConvergence",
            ExitCode::Unsupported => "Unsupported",
            ExitCode::GeneralFailure => "GeneralFailure",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug)]
pub struct EntropyError {
    pub code: ExitCode,
    pub message: String,
}

impl fmt::Display for EntropyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for EntropyError {}

/// Returns an `Err` tagged with `code`.
pub fn err_exit_code<T>(code: ExitCode, message: impl Into<String>) -> anyhow::Result<T> {
    Err(EntropyError {
        code,
        message: message.into(),
    }
    .into())
}

/// Captures `file!():line!()` for `.context(here!())` chains.
#[macro_export]
macro_rules! here {
    () => {
        format!("{}:{}", file!(), line!())
    };
}
