// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::collections::BTreeMap;

use crate::codec::h266::pps::Pps;
use crate::codec::h266::pred_weight_table::PredWeightTable;
use crate::codec::h266::ptl::PROFILE_INTRA;
use crate::codec::h266::rpl::RefPicLists;
use crate::codec::h266::sps::Sps;
use crate::error::broken_data;
use crate::error::broken_link;
use crate::error::ParseResult;
use crate::utils::nalu_reader::NaluReader;

/// Looks up the PPS `pps_id` and the SPS it refers to.
pub(crate) fn pps_and_sps<'a>(
    ppses: &'a BTreeMap<u8, Pps>,
    spses: &'a BTreeMap<u8, Sps>,
    pps_id: u8,
) -> ParseResult<(&'a Pps, &'a Sps)> {
    let Some(pps) = ppses.get(&pps_id) else {
        broken_link!("PPS id {} not available", pps_id);
    };

    let Some(sps) = spses.get(&pps.sps_id) else {
        broken_link!("SPS id {} not available", pps.sps_id);
    };

    Ok((pps, sps))
}

/// Adaptive loop filter controls, carried by the picture header or the slice
/// header depending on `pps_alf_info_in_ph_flag`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AlfInfo {
    pub enabled_flag: bool,
    pub num_alf_aps_ids_luma: u8,
    pub aps_id_luma: [u8; 8],
    pub cb_enabled_flag: bool,
    pub cr_enabled_flag: bool,
    pub aps_id_chroma: u8,
    pub cc_cb_enabled_flag: bool,
    pub cc_cb_aps_id: u8,
    pub cc_cr_enabled_flag: bool,
    pub cc_cr_aps_id: u8,
}

impl AlfInfo {
    /// Parses the ALF controls. Chroma fields that are absent are inferred from
    /// `inherited`, which is the picture header's ALF info when parsing a slice
    /// header.
    pub(crate) fn parse(r: &mut NaluReader, sps: &Sps, inherited: &AlfInfo) -> ParseResult<AlfInfo> {
        let mut alf = AlfInfo {
            enabled_flag: r.read_bit()?,
            ..Default::default()
        };

        if !alf.enabled_flag {
            return Ok(alf);
        }

        alf.num_alf_aps_ids_luma = r.read_bits(3)?;
        for i in 0..usize::from(alf.num_alf_aps_ids_luma) {
            alf.aps_id_luma[i] = r.read_bits(3)?;
        }

        if sps.chroma_format_idc != 0 {
            alf.cb_enabled_flag = r.read_bit()?;
            alf.cr_enabled_flag = r.read_bit()?;
        } else {
            alf.cb_enabled_flag = inherited.cb_enabled_flag;
            alf.cr_enabled_flag = inherited.cr_enabled_flag;
        }

        alf.aps_id_chroma = if alf.cb_enabled_flag || alf.cr_enabled_flag {
            r.read_bits(3)?
        } else {
            inherited.aps_id_chroma
        };

        if sps.ccalf_enabled_flag {
            alf.cc_cb_enabled_flag = r.read_bit()?;
            alf.cc_cb_aps_id = if alf.cc_cb_enabled_flag {
                r.read_bits(3)?
            } else {
                inherited.cc_cb_aps_id
            };

            alf.cc_cr_enabled_flag = r.read_bit()?;
            alf.cc_cr_aps_id = if alf.cc_cr_enabled_flag {
                r.read_bits(3)?
            } else {
                inherited.cc_cr_aps_id
            };
        } else {
            alf.cc_cb_enabled_flag = inherited.cc_cb_enabled_flag;
            alf.cc_cb_aps_id = inherited.cc_cb_aps_id;
            alf.cc_cr_enabled_flag = inherited.cc_cr_enabled_flag;
            alf.cc_cr_aps_id = inherited.cc_cr_aps_id;
        }

        Ok(alf)
    }
}

/// Deblocking filter controls of a picture or slice.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeblockingParams {
    pub params_present_flag: bool,
    pub filter_disabled_flag: bool,
    pub luma_beta_offset_div2: i8,
    pub luma_tc_offset_div2: i8,
    pub cb_beta_offset_div2: i8,
    pub cb_tc_offset_div2: i8,
    pub cr_beta_offset_div2: i8,
    pub cr_tc_offset_div2: i8,
}

impl DeblockingParams {
    pub(crate) fn from_pps(pps: &Pps) -> DeblockingParams {
        DeblockingParams {
            params_present_flag: false,
            filter_disabled_flag: pps.deblocking_filter_disabled_flag,
            luma_beta_offset_div2: pps.luma_beta_offset_div2,
            luma_tc_offset_div2: pps.luma_tc_offset_div2,
            cb_beta_offset_div2: pps.cb_beta_offset_div2,
            cb_tc_offset_div2: pps.cb_tc_offset_div2,
            cr_beta_offset_div2: pps.cr_beta_offset_div2,
            cr_tc_offset_div2: pps.cr_tc_offset_div2,
        }
    }

    /// Parses the fields following a set `*_deblocking_params_present_flag`.
    /// Offsets that are not signalled keep their current value.
    pub(crate) fn parse(&mut self, r: &mut NaluReader, pps: &Pps) -> ParseResult<()> {
        self.params_present_flag = true;
        self.filter_disabled_flag = if !pps.deblocking_filter_disabled_flag {
            r.read_bit()?
        } else {
            false
        };

        if !self.filter_disabled_flag {
            self.luma_beta_offset_div2 = r.read_se_bounded(-12, 12)?;
            self.luma_tc_offset_div2 = r.read_se_bounded(-12, 12)?;

            if pps.chroma_tool_offsets_present_flag {
                self.cb_beta_offset_div2 = r.read_se_bounded(-12, 12)?;
                self.cb_tc_offset_div2 = r.read_se_bounded(-12, 12)?;
                self.cr_beta_offset_div2 = r.read_se_bounded(-12, 12)?;
                self.cr_tc_offset_div2 = r.read_se_bounded(-12, 12)?;
            } else {
                self.cb_beta_offset_div2 = self.luma_beta_offset_div2;
                self.cb_tc_offset_div2 = self.luma_tc_offset_div2;
                self.cr_beta_offset_div2 = self.luma_beta_offset_div2;
                self.cr_tc_offset_div2 = self.luma_tc_offset_div2;
            }
        }

        Ok(())
    }
}

/// `picture_header_structure()`, 7.3.2.8.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PictureHeader {
    pub gdr_or_irap_pic_flag: bool,
    pub non_ref_pic_flag: bool,
    pub gdr_pic_flag: bool,
    pub inter_slice_allowed_flag: bool,
    pub intra_slice_allowed_flag: bool,
    pub pps_id: u8,
    pub pic_order_cnt_lsb: u16,
    pub recovery_poc_cnt: u32,
    pub extra_bit: Vec<bool>,
    pub poc_msb_cycle_present_flag: bool,
    pub poc_msb_cycle_val: u32,
    pub alf: AlfInfo,
    pub lmcs_enabled_flag: bool,
    pub lmcs_aps_id: u8,
    pub chroma_residual_scale_flag: bool,
    pub explicit_scaling_list_enabled_flag: bool,
    pub scaling_list_aps_id: u8,
    pub virtual_boundaries_present_flag: bool,
    pub num_ver_virtual_boundaries: u8,
    pub virtual_boundary_pos_x_minus1: [u16; 3],
    pub num_hor_virtual_boundaries: u8,
    pub virtual_boundary_pos_y_minus1: [u16; 3],
    pub pic_output_flag: bool,
    pub ref_pic_lists: RefPicLists,
    pub partition_constraints_override_flag: bool,
    pub log2_diff_min_qt_min_cb_intra_slice_luma: u8,
    pub max_mtt_hierarchy_depth_intra_slice_luma: u8,
    pub log2_diff_max_bt_min_qt_intra_slice_luma: u8,
    pub log2_diff_max_tt_min_qt_intra_slice_luma: u8,
    pub log2_diff_min_qt_min_cb_intra_slice_chroma: u8,
    pub max_mtt_hierarchy_depth_intra_slice_chroma: u8,
    pub log2_diff_max_bt_min_qt_intra_slice_chroma: u8,
    pub log2_diff_max_tt_min_qt_intra_slice_chroma: u8,
    pub cu_qp_delta_subdiv_intra_slice: u8,
    pub cu_chroma_qp_offset_subdiv_intra_slice: u8,
    pub log2_diff_min_qt_min_cb_inter_slice: u8,
    pub max_mtt_hierarchy_depth_inter_slice: u8,
    pub log2_diff_max_bt_min_qt_inter_slice: u8,
    pub log2_diff_max_tt_min_qt_inter_slice: u8,
    pub cu_qp_delta_subdiv_inter_slice: u8,
    pub cu_chroma_qp_offset_subdiv_inter_slice: u8,
    pub temporal_mvp_enabled_flag: bool,
    pub collocated_from_l0_flag: bool,
    pub collocated_ref_idx: u8,
    pub mmvd_fullpel_only_flag: bool,
    pub mvd_l1_zero_flag: bool,
    pub bdof_disabled_flag: bool,
    pub dmvr_disabled_flag: bool,
    pub prof_disabled_flag: bool,
    pub pred_weight_table: PredWeightTable,
    pub qp_delta: i8,
    pub joint_cbcr_sign_flag: bool,
    pub sao_luma_enabled_flag: bool,
    pub sao_chroma_enabled_flag: bool,
    pub deblocking: DeblockingParams,
    pub extension_data_byte: Vec<u8>,
}

impl PictureHeader {
    fn parse_intra_partition(&mut self, r: &mut NaluReader, sps: &Sps) -> ParseResult<()> {
        let ctb_log2_size_y = u32::from(sps.ctb_log2_size_y);
        let min_cb_log2_size_y = u32::from(sps.min_cb_log2_size_y);
        let max_log2_qt = 6u32.min(ctb_log2_size_y);
        let max_mtt_depth = 2 * (ctb_log2_size_y - min_cb_log2_size_y);

        self.log2_diff_min_qt_min_cb_intra_slice_luma =
            r.read_ue_max(max_log2_qt - min_cb_log2_size_y)?;
        let min_qt_log2_size_intra_y =
            u32::from(self.log2_diff_min_qt_min_cb_intra_slice_luma) + min_cb_log2_size_y;

        self.max_mtt_hierarchy_depth_intra_slice_luma = r.read_ue_max(max_mtt_depth)?;
        if self.max_mtt_hierarchy_depth_intra_slice_luma != 0 {
            self.log2_diff_max_bt_min_qt_intra_slice_luma =
                r.read_ue_max(ctb_log2_size_y - min_qt_log2_size_intra_y)?;
            self.log2_diff_max_tt_min_qt_intra_slice_luma =
                r.read_ue_max(max_log2_qt - min_qt_log2_size_intra_y)?;
        }

        if sps.qtbtt_dual_tree_intra_flag {
            self.log2_diff_min_qt_min_cb_intra_slice_chroma =
                r.read_ue_max(max_log2_qt - min_cb_log2_size_y)?;
            let min_qt_log2_size_intra_c =
                u32::from(self.log2_diff_min_qt_min_cb_intra_slice_chroma) + min_cb_log2_size_y;

            self.max_mtt_hierarchy_depth_intra_slice_chroma = r.read_ue_max(max_mtt_depth)?;
            if self.max_mtt_hierarchy_depth_intra_slice_chroma != 0 {
                self.log2_diff_max_bt_min_qt_intra_slice_chroma =
                    r.read_ue_max(max_log2_qt - min_qt_log2_size_intra_c)?;
                self.log2_diff_max_tt_min_qt_intra_slice_chroma =
                    r.read_ue_max(max_log2_qt - min_qt_log2_size_intra_c)?;
            }
        }

        Ok(())
    }

    fn parse_inter_partition(&mut self, r: &mut NaluReader, sps: &Sps) -> ParseResult<()> {
        let ctb_log2_size_y = u32::from(sps.ctb_log2_size_y);
        let min_cb_log2_size_y = u32::from(sps.min_cb_log2_size_y);
        let max_log2_qt = 6u32.min(ctb_log2_size_y);

        self.log2_diff_min_qt_min_cb_inter_slice =
            r.read_ue_max(max_log2_qt - min_cb_log2_size_y)?;
        let min_qt_log2_size_inter_y =
            u32::from(self.log2_diff_min_qt_min_cb_inter_slice) + min_cb_log2_size_y;

        self.max_mtt_hierarchy_depth_inter_slice =
            r.read_ue_max(2 * (ctb_log2_size_y - min_cb_log2_size_y))?;
        if self.max_mtt_hierarchy_depth_inter_slice != 0 {
            self.log2_diff_max_bt_min_qt_inter_slice =
                r.read_ue_max(ctb_log2_size_y - min_qt_log2_size_inter_y)?;
            self.log2_diff_max_tt_min_qt_inter_slice =
                r.read_ue_max(max_log2_qt - min_qt_log2_size_inter_y)?;
        }

        Ok(())
    }

    /// Reads the quantization group subdivision depths of intra or inter
    /// slices, bounded by the quadtree and multi-type tree depths.
    fn parse_subdiv(
        r: &mut NaluReader,
        sps: &Sps,
        pps: &Pps,
        log2_diff_min_qt_min_cb: u8,
        max_mtt_hierarchy_depth: u8,
    ) -> ParseResult<(u8, u8)> {
        let ctb_log2_size_y = u32::from(sps.ctb_log2_size_y);
        let min_qt_log2_size = u32::from(log2_diff_min_qt_min_cb) + u32::from(sps.min_cb_log2_size_y);
        let max = 2 * (ctb_log2_size_y - min_qt_log2_size + u32::from(max_mtt_hierarchy_depth));

        let cu_qp_delta_subdiv = if pps.cu_qp_delta_enabled_flag {
            r.read_ue_max(max)?
        } else {
            0
        };

        let cu_chroma_qp_offset_subdiv = if pps.cu_chroma_qp_offset_list_enabled_flag {
            r.read_ue_max(max)?
        } else {
            0
        };

        Ok((cu_qp_delta_subdiv, cu_chroma_qp_offset_subdiv))
    }

    fn parse_virtual_boundaries(&mut self, r: &mut NaluReader, pps: &Pps) -> ParseResult<()> {
        self.virtual_boundaries_present_flag = r.read_bit()?;
        if !self.virtual_boundaries_present_flag {
            return Ok(());
        }

        let width = pps.width;
        self.num_ver_virtual_boundaries = r.read_ue_max(if width <= 8 { 0 } else { 3 })?;
        for i in 0..usize::from(self.num_ver_virtual_boundaries) {
            self.virtual_boundary_pos_x_minus1[i] = r.read_ue_max(width.div_ceil(8) - 2)?;
        }

        let height = pps.height;
        self.num_hor_virtual_boundaries = r.read_ue_max(if height <= 8 { 0 } else { 3 })?;
        for i in 0..usize::from(self.num_hor_virtual_boundaries) {
            self.virtual_boundary_pos_y_minus1[i] = r.read_ue_max(height.div_ceil(8) - 2)?;
        }

        Ok(())
    }

    fn parse_inter_tools(&mut self, r: &mut NaluReader, sps: &Sps, pps: &Pps) -> ParseResult<()> {
        let num_entries = [
            self.ref_pic_lists.rpl_ref_list[0].num_ref_entries,
            self.ref_pic_lists.rpl_ref_list[1].num_ref_entries,
        ];

        if sps.temporal_mvp_enabled_flag {
            self.temporal_mvp_enabled_flag = r.read_bit()?;
            if self.temporal_mvp_enabled_flag && pps.rpl_info_in_ph_flag {
                if num_entries[1] > 0 {
                    self.collocated_from_l0_flag = r.read_bit()?;
                }

                let list = if self.collocated_from_l0_flag { 0 } else { 1 };
                if num_entries[list] > 1 {
                    self.collocated_ref_idx = r.read_ue_max(u32::from(num_entries[list]) - 1)?;
                }
            }
        }

        if sps.mmvd_fullpel_only_enabled_flag {
            self.mmvd_fullpel_only_flag = r.read_bit()?;
        }

        if !pps.rpl_info_in_ph_flag || num_entries[1] > 0 {
            self.mvd_l1_zero_flag = r.read_bit()?;

            self.bdof_disabled_flag = if sps.bdof_control_present_in_ph_flag {
                r.read_bit()?
            } else {
                !sps.bdof_enabled_flag
            };

            self.dmvr_disabled_flag = if sps.dmvr_control_present_in_ph_flag {
                r.read_bit()?
            } else {
                !sps.dmvr_enabled_flag
            };
        } else {
            self.mvd_l1_zero_flag = true;
        }

        self.prof_disabled_flag = if sps.prof_control_present_in_ph_flag {
            r.read_bit()?
        } else {
            !sps.affine_prof_enabled_flag
        };

        if (pps.weighted_pred_flag || pps.weighted_bipred_flag) && pps.wp_info_in_ph_flag {
            self.pred_weight_table =
                PredWeightTable::parse(r, sps, pps, &self.ref_pic_lists, num_entries)?;
        }

        Ok(())
    }

    /// Parses a picture header structure, either from a PH NAL unit or
    /// embedded in a slice header.
    pub(crate) fn parse(
        r: &mut NaluReader,
        ppses: &BTreeMap<u8, Pps>,
        spses: &BTreeMap<u8, Sps>,
    ) -> ParseResult<PictureHeader> {
        log::trace!("parsing \"Picture Header Structure\"");

        let mut ph = PictureHeader {
            gdr_or_irap_pic_flag: r.read_bit()?,
            non_ref_pic_flag: r.read_bit()?,
            ..Default::default()
        };

        if ph.gdr_or_irap_pic_flag {
            ph.gdr_pic_flag = r.read_bit()?;
        }

        ph.inter_slice_allowed_flag = r.read_bit()?;
        ph.intra_slice_allowed_flag = if ph.inter_slice_allowed_flag {
            r.read_bit()?
        } else {
            true
        };

        ph.pps_id = r.read_ue_max(63)?;
        let (pps, sps) = pps_and_sps(ppses, spses, ph.pps_id)?;

        let log2_max_poc_lsb = usize::from(sps.log2_max_pic_order_cnt_lsb_minus4) + 4;
        ph.pic_order_cnt_lsb = r.read_bits(log2_max_poc_lsb)?;
        if ph.gdr_pic_flag {
            ph.recovery_poc_cnt = r.read_ue_max(1 << log2_max_poc_lsb)?;
        }

        // Neither an IRAP picture nor a GDR picture recovering immediately.
        if (!ph.gdr_or_irap_pic_flag || ph.gdr_pic_flag)
            && (!ph.gdr_pic_flag || ph.recovery_poc_cnt != 0)
        {
            if sps.profile_tier_level.profile_idc & PROFILE_INTRA != 0 {
                broken_data!("Non IRAP picture in an intra profile stream");
            }

            if sps
                .profile_tier_level
                .general_constraints_info
                .all_rap_pictures_constraint_flag
            {
                broken_data!("Non IRAP picture with gci_all_rap_pictures_flag set");
            }
        }

        for present in &sps.extra_ph_bit_present_flag {
            if *present {
                ph.extra_bit.push(r.read_bit()?);
            }
        }

        if sps.poc_msb_cycle_flag {
            ph.poc_msb_cycle_present_flag = r.read_bit()?;
            if ph.poc_msb_cycle_present_flag {
                ph.poc_msb_cycle_val = r.read_bits(usize::from(sps.poc_msb_cycle_len_minus1) + 1)?;
            }
        }

        if sps.alf_enabled_flag && pps.alf_info_in_ph_flag {
            ph.alf = AlfInfo::parse(r, sps, &AlfInfo::default())?;
        }

        if sps.lmcs_enabled_flag {
            ph.lmcs_enabled_flag = r.read_bit()?;
            if ph.lmcs_enabled_flag {
                ph.lmcs_aps_id = r.read_bits(2)?;
                if sps.chroma_format_idc != 0 {
                    ph.chroma_residual_scale_flag = r.read_bit()?;
                }
            }
        }

        if sps.explicit_scaling_list_enabled_flag {
            ph.explicit_scaling_list_enabled_flag = r.read_bit()?;
            if ph.explicit_scaling_list_enabled_flag {
                ph.scaling_list_aps_id = r.read_bits(3)?;
            }
        }

        if sps.virtual_boundaries_enabled_flag && !sps.virtual_boundaries_present_flag {
            ph.parse_virtual_boundaries(r, pps)?;
        }

        ph.pic_output_flag = if pps.output_flag_present_flag && !ph.non_ref_pic_flag {
            r.read_bit()?
        } else {
            true
        };

        if pps.rpl_info_in_ph_flag {
            ph.ref_pic_lists = RefPicLists::parse(r, sps, pps)?;
        }

        if sps.partition_constraints_override_enabled_flag {
            ph.partition_constraints_override_flag = r.read_bit()?;
        }

        ph.log2_diff_min_qt_min_cb_intra_slice_luma = sps.log2_diff_min_qt_min_cb_intra_slice_luma;
        ph.max_mtt_hierarchy_depth_intra_slice_luma = sps.max_mtt_hierarchy_depth_intra_slice_luma;
        ph.log2_diff_max_bt_min_qt_intra_slice_luma = sps.log2_diff_max_bt_min_qt_intra_slice_luma;
        ph.log2_diff_max_tt_min_qt_intra_slice_luma = sps.log2_diff_max_tt_min_qt_intra_slice_luma;
        ph.log2_diff_min_qt_min_cb_intra_slice_chroma =
            sps.log2_diff_min_qt_min_cb_intra_slice_chroma;
        ph.max_mtt_hierarchy_depth_intra_slice_chroma =
            sps.max_mtt_hierarchy_depth_intra_slice_chroma;
        ph.log2_diff_max_bt_min_qt_intra_slice_chroma =
            sps.log2_diff_max_bt_min_qt_intra_slice_chroma;
        ph.log2_diff_max_tt_min_qt_intra_slice_chroma =
            sps.log2_diff_max_tt_min_qt_intra_slice_chroma;
        ph.log2_diff_min_qt_min_cb_inter_slice = sps.log2_diff_min_qt_min_cb_inter_slice;
        ph.max_mtt_hierarchy_depth_inter_slice = sps.max_mtt_hierarchy_depth_inter_slice;
        ph.log2_diff_max_bt_min_qt_inter_slice = sps.log2_diff_max_bt_min_qt_inter_slice;
        ph.log2_diff_max_tt_min_qt_inter_slice = sps.log2_diff_max_tt_min_qt_inter_slice;

        ph.collocated_from_l0_flag = true;

        if ph.intra_slice_allowed_flag {
            if ph.partition_constraints_override_flag {
                ph.parse_intra_partition(r, sps)?;
            }

            (ph.cu_qp_delta_subdiv_intra_slice, ph.cu_chroma_qp_offset_subdiv_intra_slice) =
                Self::parse_subdiv(
                    r,
                    sps,
                    pps,
                    ph.log2_diff_min_qt_min_cb_intra_slice_luma,
                    ph.max_mtt_hierarchy_depth_intra_slice_luma,
                )?;
        }

        if ph.inter_slice_allowed_flag {
            if ph.partition_constraints_override_flag {
                ph.parse_inter_partition(r, sps)?;
            }

            (ph.cu_qp_delta_subdiv_inter_slice, ph.cu_chroma_qp_offset_subdiv_inter_slice) =
                Self::parse_subdiv(
                    r,
                    sps,
                    pps,
                    ph.log2_diff_min_qt_min_cb_inter_slice,
                    ph.max_mtt_hierarchy_depth_inter_slice,
                )?;

            ph.parse_inter_tools(r, sps, pps)?;
        }

        if pps.qp_delta_info_in_ph_flag {
            // SliceQpY shall be in the range of -QpBdOffset to +63.
            let init_qp = 26 + i32::from(pps.init_qp_minus26);
            ph.qp_delta = r.read_se_bounded(-sps.qp_bd_offset() - init_qp, 63 - init_qp)?;
        }

        if sps.joint_cbcr_enabled_flag {
            ph.joint_cbcr_sign_flag = r.read_bit()?;
        }

        if sps.sao_enabled_flag && pps.sao_info_in_ph_flag {
            ph.sao_luma_enabled_flag = r.read_bit()?;
            if sps.chroma_format_idc != 0 {
                ph.sao_chroma_enabled_flag = r.read_bit()?;
            }
        }

        ph.deblocking = DeblockingParams::from_pps(pps);
        if pps.dbf_info_in_ph_flag && r.read_bit()? {
            ph.deblocking.parse(r, pps)?;
        }

        if pps.picture_header_extension_present_flag {
            let len: u32 = r.read_ue_max(256)?;
            for _ in 0..len {
                ph.extension_data_byte.push(r.read_bits(8)?);
            }
        }

        Ok(ph)
    }
}
