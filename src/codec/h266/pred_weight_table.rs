// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::codec::h266::pps::Pps;
use crate::codec::h266::rpl::RefPicLists;
use crate::codec::h266::sps::Sps;
use crate::error::ParseResult;
use crate::utils::nalu_reader::NaluReader;

/// Maximum number of weighted references per list.
pub const MAX_WEIGHTS: usize = 15;

/// `pred_weight_table()`, 7.3.8.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PredWeightTable {
    pub luma_log2_weight_denom: u8,
    pub delta_chroma_log2_weight_denom: i8,
    /// NumWeightsL0 and NumWeightsL1.
    pub num_weights: [u8; 2],
    pub luma_weight_flag: [[bool; MAX_WEIGHTS]; 2],
    pub chroma_weight_flag: [[bool; MAX_WEIGHTS]; 2],
    pub delta_luma_weight: [[i8; MAX_WEIGHTS]; 2],
    pub luma_offset: [[i8; MAX_WEIGHTS]; 2],
    pub delta_chroma_weight: [[[i8; 2]; MAX_WEIGHTS]; 2],
    pub delta_chroma_offset: [[[i16; 2]; MAX_WEIGHTS]; 2],
}

impl PredWeightTable {
    /// ChromaLog2WeightDenom.
    pub fn chroma_log2_weight_denom(&self) -> u8 {
        (i16::from(self.luma_log2_weight_denom) + i16::from(self.delta_chroma_log2_weight_denom))
            as u8
    }

    /// LumaWeightL0/L1 of entry `i` of list `list`. (7-152)
    pub fn luma_weight(&self, list: usize, i: usize) -> i32 {
        (1 << self.luma_log2_weight_denom) + i32::from(self.delta_luma_weight[list][i])
    }

    /// ChromaWeightL0/L1 of entry `i`, component `j`. (7-153)
    pub fn chroma_weight(&self, list: usize, i: usize, j: usize) -> i32 {
        (1 << self.chroma_log2_weight_denom()) + i32::from(self.delta_chroma_weight[list][i][j])
    }

    /// ChromaOffsetL0/L1 of entry `i`, component `j`. (7-154)
    pub fn chroma_offset(&self, list: usize, i: usize, j: usize) -> i32 {
        let offset = 128 + i32::from(self.delta_chroma_offset[list][i][j])
            - ((128 * self.chroma_weight(list, i, j)) >> self.chroma_log2_weight_denom());
        offset.clamp(-128, 127)
    }

    fn parse_weights(&mut self, r: &mut NaluReader, list: usize, chroma: bool) -> ParseResult<()> {
        let num_weights = usize::from(self.num_weights[list]);

        for i in 0..num_weights {
            self.luma_weight_flag[list][i] = r.read_bit()?;
        }

        if chroma {
            for i in 0..num_weights {
                self.chroma_weight_flag[list][i] = r.read_bit()?;
            }
        }

        for i in 0..num_weights {
            if self.luma_weight_flag[list][i] {
                self.delta_luma_weight[list][i] = r.read_se_bounded(-128, 127)?;
                self.luma_offset[list][i] = r.read_se_bounded(-128, 127)?;
            }

            if self.chroma_weight_flag[list][i] {
                for j in 0..2 {
                    self.delta_chroma_weight[list][i][j] = r.read_se_bounded(-128, 127)?;
                    self.delta_chroma_offset[list][i][j] = r.read_se_bounded(-4 * 128, 4 * 127)?;
                }
            }
        }

        Ok(())
    }

    /// Parses the table. `num_ref_idx_active` is only used when the weights are
    /// carried in the slice header, the picture header signals its own count.
    pub(crate) fn parse(
        r: &mut NaluReader,
        sps: &Sps,
        pps: &Pps,
        ref_lists: &RefPicLists,
        num_ref_idx_active: [u8; 2],
    ) -> ParseResult<PredWeightTable> {
        log::trace!("parsing \"Pred Weight Table\"");

        let chroma = sps.chroma_format_idc != 0;
        let num_entries = |list: usize| u32::from(ref_lists.rpl_ref_list[list].num_ref_entries);

        let mut pwt = PredWeightTable {
            luma_log2_weight_denom: r.read_ue_max(7)?,
            ..Default::default()
        };

        if chroma {
            let denom = i32::from(pwt.luma_log2_weight_denom);
            pwt.delta_chroma_log2_weight_denom = r.read_se_bounded(-denom, 7 - denom)?;
        }

        pwt.num_weights[0] = if pps.wp_info_in_ph_flag {
            r.read_ue_max(num_entries(0).min(MAX_WEIGHTS as u32))?
        } else {
            num_ref_idx_active[0]
        };
        pwt.parse_weights(r, 0, chroma)?;

        pwt.num_weights[1] = if !pps.weighted_bipred_flag || num_entries(1) == 0 {
            0
        } else if pps.wp_info_in_ph_flag {
            r.read_ue_max(num_entries(1).min(MAX_WEIGHTS as u32))?
        } else {
            num_ref_idx_active[1]
        };
        pwt.parse_weights(r, 1, chroma)?;

        Ok(pwt)
    }
}
