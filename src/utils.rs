// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Utility code shared by the NAL based parsers of this crate.

pub mod nalu;
pub mod nalu_reader;

use std::fmt::Debug;
use std::io::Cursor;

use crate::error::ParseError;
use crate::utils::nalu::Header;
use crate::utils::nalu::Nalu;

/// Iterator over the Annex B NAL units of a bitstream. The last unit of the
/// buffer is returned even if it is not followed by a start code. Iteration
/// stops at the first unit that cannot be identified.
pub struct NalIterator<'a, U>(Cursor<&'a [u8]>, std::marker::PhantomData<U>);

impl<'a, U> NalIterator<'a, U> {
    pub fn new(stream: &'a [u8]) -> Self {
        Self(Cursor::new(stream), std::marker::PhantomData)
    }
}

impl<'a, U: Debug + Header> Iterator for NalIterator<'a, U> {
    type Item = Nalu<'a, U>;

    fn next(&mut self) -> Option<Self::Item> {
        match Nalu::next(&mut self.0) {
            Ok(nalu) => Some(nalu),
            Err(ParseError::NoNalEnd) => Nalu::next_unchecked(&mut self.0).ok(),
            Err(e) => {
                log::debug!("Stopping NAL iteration: {}", e);
                None
            }
        }
    }
}
