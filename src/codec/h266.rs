// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

pub mod aps;
pub mod config_record;
pub mod ctb_map;
pub mod hrd;
pub mod opi_dci_aud;
pub mod parser;
pub mod picture_header;
pub mod pps;
pub mod pred_weight_table;
pub mod ptl;
pub mod rpl;
pub mod sei;
pub mod slice_header;
pub mod sps;
pub mod tables;
#[cfg(test)]
pub(crate) mod test_utils;
pub mod vps;
pub mod vui;
