// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Errors returned by the NAL framing and the syntax parsers.

use thiserror::Error;

use crate::utils::nalu_reader::ReadBitsError;

/// Result code of a framing or parsing operation, for callers that want to
/// branch on the kind of failure rather than on the error itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParserResult {
    Ok,
    /// The bitstream violates a local constraint.
    BrokenData,
    /// A referenced parameter set is missing.
    BrokenLink,
    /// Logic level error, usually a misuse of the API.
    Error,
    /// No start code could be found.
    NoNal,
    /// A start code was found but the unit is not complete yet.
    NoNalEnd,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("broken data: {0}")]
    BrokenData(String),
    #[error("broken link: {0}")]
    BrokenLink(String),
    #[error("no NAL unit found")]
    NoNal,
    #[error("NAL unit start found but no end")]
    NoNalEnd,
    #[error(transparent)]
    Error(#[from] anyhow::Error),
}

impl ParseError {
    pub fn kind(&self) -> ParserResult {
        match self {
            ParseError::BrokenData(_) => ParserResult::BrokenData,
            ParseError::BrokenLink(_) => ParserResult::BrokenLink,
            ParseError::NoNal => ParserResult::NoNal,
            ParseError::NoNalEnd => ParserResult::NoNalEnd,
            ParseError::Error(_) => ParserResult::Error,
        }
    }
}

impl From<ReadBitsError> for ParseError {
    fn from(err: ReadBitsError) -> Self {
        ParseError::BrokenData(err.to_string())
    }
}

pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Returns the result code matching `res`.
pub fn result_kind<T>(res: &ParseResult<T>) -> ParserResult {
    match res {
        Ok(_) => ParserResult::Ok,
        Err(e) => e.kind(),
    }
}

/// Bails out of the current parser with a `BrokenData` error after logging
/// the reason.
macro_rules! broken_data {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        log::warn!("{}", msg);
        return Err($crate::error::ParseError::BrokenData(msg));
    }};
}

/// Bails out of the current parser with a `BrokenLink` error.
macro_rules! broken_link {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        log::debug!("{}", msg);
        return Err($crate::error::ParseError::BrokenLink(msg));
    }};
}

pub(crate) use broken_data;
pub(crate) use broken_link;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_errors_map_to_broken_data() {
        let err = ParseError::from(ReadBitsError::OutOfBits);
        assert_eq!(err.kind(), ParserResult::BrokenData);
    }

    #[test]
    fn result_kinds() {
        let ok: ParseResult<()> = Ok(());
        assert_eq!(result_kind(&ok), ParserResult::Ok);

        let link: ParseResult<()> = Err(ParseError::BrokenLink("pps 3".into()));
        assert_eq!(result_kind(&link), ParserResult::BrokenLink);

        let logic: ParseResult<()> = Err(anyhow::anyhow!("wrong NAL type").into());
        assert_eq!(result_kind(&logic), ParserResult::Error);
    }
}
