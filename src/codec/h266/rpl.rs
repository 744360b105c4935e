// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Reference picture list syntax.

use crate::codec::h266::parser::MAX_REF_ENTRIES;
use crate::codec::h266::parser::MAX_REF_PIC_LISTS;
use crate::codec::h266::pps::Pps;
use crate::codec::h266::sps::Sps;
use crate::error::broken_data;
use crate::error::ParseResult;
use crate::utils::nalu_reader::NaluReader;

/// `ref_pic_list_struct()`, 7.3.10.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefPicListStruct {
    pub num_ref_entries: u8,
    pub ltrp_in_header_flag: bool,
    pub inter_layer_ref_pic_flag: [bool; MAX_REF_ENTRIES],
    pub st_ref_pic_flag: [bool; MAX_REF_ENTRIES],
    pub abs_delta_poc_st: [u16; MAX_REF_ENTRIES],
    pub strp_entry_sign_flag: [bool; MAX_REF_ENTRIES],
    pub rpls_poc_lsb_lt: [u16; MAX_REF_ENTRIES],
    pub ilrp_idx: [u8; MAX_REF_ENTRIES],
    pub num_short_term_pic: u32,
    pub num_long_term_pic: u32,
    pub num_inter_layer_pic: u32,
    /// DeltaPocValSt, (7-128).
    pub delta_poc_val_st: [i32; MAX_REF_ENTRIES],
}

impl RefPicListStruct {
    pub(crate) fn parse(
        r: &mut NaluReader,
        list_idx: usize,
        rpls_idx: usize,
        sps: &Sps,
    ) -> ParseResult<Self> {
        log::trace!("parsing \"ref_pic_list_struct\"");

        let mut rpls = RefPicListStruct {
            num_ref_entries: r.read_ue_max(MAX_REF_ENTRIES as u32)?,
            ..Default::default()
        };

        if usize::from(rpls.num_ref_entries) > MAX_REF_ENTRIES {
            broken_data!("Invalid num_ref_entries {}", rpls.num_ref_entries);
        }

        if sps.long_term_ref_pics_flag
            && rpls_idx < usize::from(sps.num_ref_pic_lists[list_idx])
            && rpls.num_ref_entries > 0
        {
            rpls.ltrp_in_header_flag = r.read_bit()?;
        } else if sps.long_term_ref_pics_flag {
            rpls.ltrp_in_header_flag = true;
        }

        for i in 0..usize::from(rpls.num_ref_entries) {
            if sps.inter_layer_prediction_enabled_flag {
                rpls.inter_layer_ref_pic_flag[i] = r.read_bit()?;
            }

            if rpls.inter_layer_ref_pic_flag[i] {
                rpls.ilrp_idx[i] = r.read_ue_max(MAX_REF_PIC_LISTS as u32)?;
                rpls.num_inter_layer_pic += 1;
                continue;
            }

            rpls.st_ref_pic_flag[i] = if sps.long_term_ref_pics_flag {
                r.read_bit()?
            } else {
                true
            };

            if rpls.st_ref_pic_flag[i] {
                rpls.abs_delta_poc_st[i] = r.read_ue_max(u32::from(u16::MAX) - 1)?;

                // (7-127)
                let abs_delta_poc_st =
                    if (sps.weighted_pred_flag || sps.weighted_bipred_flag) && i != 0 {
                        i32::from(rpls.abs_delta_poc_st[i])
                    } else {
                        i32::from(rpls.abs_delta_poc_st[i]) + 1
                    };

                if abs_delta_poc_st > 0 {
                    rpls.strp_entry_sign_flag[i] = r.read_bit()?;
                }

                rpls.delta_poc_val_st[i] = if rpls.strp_entry_sign_flag[i] {
                    -abs_delta_poc_st
                } else {
                    abs_delta_poc_st
                };

                rpls.num_short_term_pic += 1;
            } else {
                if !rpls.ltrp_in_header_flag {
                    rpls.rpls_poc_lsb_lt[i] =
                        r.read_bits(usize::from(sps.log2_max_pic_order_cnt_lsb_minus4) + 4)?;
                }

                rpls.num_long_term_pic += 1;
            }
        }

        Ok(rpls)
    }
}

/// `ref_pic_lists()`, 7.3.9, as carried by picture and slice headers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefPicLists {
    pub rpl_sps_flag: [bool; 2],
    pub rpl_idx: [u8; 2],
    pub rpl_ref_list: [RefPicListStruct; 2],
    pub poc_lsb_lt: [[u16; MAX_REF_ENTRIES]; 2],
    pub delta_poc_msb_cycle_present_flag: [[bool; MAX_REF_ENTRIES]; 2],
    pub delta_poc_msb_cycle_lt: [[u32; MAX_REF_ENTRIES]; 2],
}

/// Number of bits needed to code values in `0..n`.
pub(crate) fn ceil_log2(n: u32) -> usize {
    if n <= 1 {
        0
    } else {
        (32 - (n - 1).leading_zeros()) as usize
    }
}

impl RefPicLists {
    pub(crate) fn parse(r: &mut NaluReader, sps: &Sps, pps: &Pps) -> ParseResult<Self> {
        log::trace!("parsing \"ref_pic_lists\"");

        let mut rpls = RefPicLists::default();
        let log2_max_poc_lsb = usize::from(sps.log2_max_pic_order_cnt_lsb_minus4) + 4;

        for i in 0..2 {
            let num_ref_pic_lists = sps.num_ref_pic_lists[i];
            let idx_present = i == 0 || pps.rpl1_idx_present_flag;

            if num_ref_pic_lists == 0 {
                rpls.rpl_sps_flag[i] = false;
            } else if idx_present {
                rpls.rpl_sps_flag[i] = r.read_bit()?;
            } else {
                rpls.rpl_sps_flag[1] = rpls.rpl_sps_flag[0];
            }

            if rpls.rpl_sps_flag[i] {
                if num_ref_pic_lists == 1 {
                    rpls.rpl_idx[i] = 0;
                } else if idx_present {
                    rpls.rpl_idx[i] = r.read_bits_max(
                        ceil_log2(u32::from(num_ref_pic_lists)),
                        u32::from(num_ref_pic_lists) - 1,
                    )?;
                } else {
                    rpls.rpl_idx[1] = rpls.rpl_idx[0];
                }

                let idx = usize::from(rpls.rpl_idx[i]);
                match sps.ref_pic_list_struct[i].get(idx) {
                    Some(list) => rpls.rpl_ref_list[i] = list.clone(),
                    None => broken_data!("rpl_idx[{}] {} has no list in the SPS", i, idx),
                }
            } else {
                rpls.rpl_ref_list[i] =
                    RefPicListStruct::parse(r, i, usize::from(num_ref_pic_lists), sps)?;
            }

            let ref_list = &rpls.rpl_ref_list[i];
            for j in 0..usize::from(ref_list.num_ref_entries) {
                if ref_list.inter_layer_ref_pic_flag[j] || ref_list.st_ref_pic_flag[j] {
                    continue;
                }

                if ref_list.ltrp_in_header_flag {
                    rpls.poc_lsb_lt[i][j] = r.read_bits(log2_max_poc_lsb)?;
                }

                rpls.delta_poc_msb_cycle_present_flag[i][j] = r.read_bit()?;
                if rpls.delta_poc_msb_cycle_present_flag[i][j] {
                    rpls.delta_poc_msb_cycle_lt[i][j] =
                        r.read_ue_max(1 << (32 - log2_max_poc_lsb))?;
                }
            }
        }

        Ok(rpls)
    }
}
