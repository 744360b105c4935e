// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Parser for the H.266/VVC bitstream syntax.
//!
//! The [`codec::h266::parser::Parser`] keeps the parameter sets seen so far
//! and turns NAL units, located with the framing helpers of
//! [`utils::nalu`], into plain records that a decoder can consume.

pub mod codec;
pub mod error;
pub mod utils;
