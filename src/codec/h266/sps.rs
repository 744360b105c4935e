// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::collections::BTreeMap;

use crate::codec::h266::hrd::DpbParameters;
use crate::codec::h266::hrd::GeneralHrdParameters;
use crate::codec::h266::hrd::OlsHrdParameters;
use crate::codec::h266::parser::MAX_HEIGHT;
use crate::codec::h266::parser::MAX_POINTS_IN_QP_TABLE;
use crate::codec::h266::parser::MAX_REF_PIC_LISTS;
use crate::codec::h266::parser::MAX_SAMPLE_ARRAYS;
use crate::codec::h266::parser::MAX_SLICES_PER_AU;
use crate::codec::h266::parser::MAX_SUBLAYERS;
use crate::codec::h266::parser::MAX_WIDTH;
use crate::codec::h266::ptl::Profile;
use crate::codec::h266::ptl::ProfileTierLevel;
use crate::codec::h266::rpl::ceil_log2;
use crate::codec::h266::rpl::RefPicListStruct;
use crate::codec::h266::vps::Vps;
use crate::codec::h266::vui::VuiParams;
use crate::error::broken_data;
use crate::error::broken_link;
use crate::error::ParseResult;
use crate::utils::nalu_reader::NaluReader;

/// SubWidthC and SubHeightC, indexed by `chroma_format_idc`. Table 2.
const SUB_WIDTH_C: [u32; 4] = [1, 2, 2, 1];
const SUB_HEIGHT_C: [u32; 4] = [1, 2, 1, 1];

/// `sps_range_extension()`, 7.3.2.22.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpsRangeExtension {
    pub extended_precision_flag: bool,
    pub ts_residual_coding_rice_present_in_sh_flag: bool,
    pub rrc_rice_extension_flag: bool,
    pub persistent_rice_adaptation_enabled_flag: bool,
    pub reverse_last_sig_coeff_enabled_flag: bool,
}

impl SpsRangeExtension {
    fn parse(&mut self, r: &mut NaluReader, transform_skip_enabled_flag: bool) -> ParseResult<()> {
        log::trace!("parsing \"Range Extension\"");

        self.extended_precision_flag = r.read_bit()?;
        if transform_skip_enabled_flag {
            self.ts_residual_coding_rice_present_in_sh_flag = r.read_bit()?;
        }
        self.rrc_rice_extension_flag = r.read_bit()?;
        self.persistent_rice_adaptation_enabled_flag = r.read_bit()?;
        self.reverse_last_sig_coeff_enabled_flag = r.read_bit()?;

        Ok(())
    }
}

/// A sequence parameter set, 7.3.2.4.
///
/// Per-subpicture arrays hold `num_subpics_minus1 + 1` entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sps {
    /// The `nuh_layer_id` of the NAL unit that carried this SPS.
    pub nuh_layer_id: u8,
    pub sps_id: u8,
    pub vps_id: u8,
    pub max_sublayers_minus1: u8,
    pub chroma_format_idc: u8,
    pub log2_ctu_size_minus5: u8,
    pub ptl_dpb_hrd_params_present_flag: bool,
    pub profile_tier_level: ProfileTierLevel,
    pub gdr_enabled_flag: bool,
    pub ref_pic_resampling_enabled_flag: bool,
    pub res_change_in_clvs_allowed_flag: bool,
    pub pic_width_max_in_luma_samples: u16,
    pub pic_height_max_in_luma_samples: u16,
    pub conformance_window_flag: bool,
    pub conf_win_left_offset: u16,
    pub conf_win_right_offset: u16,
    pub conf_win_top_offset: u16,
    pub conf_win_bottom_offset: u16,

    pub subpic_info_present_flag: bool,
    pub num_subpics_minus1: u16,
    pub independent_subpics_flag: bool,
    pub subpic_same_size_flag: bool,
    pub subpic_ctu_top_left_x: Vec<u16>,
    pub subpic_ctu_top_left_y: Vec<u16>,
    pub subpic_width_minus1: Vec<u16>,
    pub subpic_height_minus1: Vec<u16>,
    pub subpic_treated_as_pic_flag: Vec<bool>,
    pub loop_filter_across_subpic_enabled_flag: Vec<bool>,
    pub subpic_id_len_minus1: u8,
    pub subpic_id_mapping_explicitly_signalled_flag: bool,
    pub subpic_id_mapping_present_flag: bool,
    /// SubpicIdVal: the explicit ids, or the subpicture index.
    pub subpic_id: Vec<u32>,

    pub bitdepth_minus8: u8,
    pub entropy_coding_sync_enabled_flag: bool,
    pub entry_point_offsets_present_flag: bool,
    pub log2_max_pic_order_cnt_lsb_minus4: u8,
    pub poc_msb_cycle_flag: bool,
    pub poc_msb_cycle_len_minus1: u8,
    pub num_extra_ph_bytes: u8,
    pub extra_ph_bit_present_flag: Vec<bool>,
    pub num_extra_sh_bytes: u8,
    pub extra_sh_bit_present_flag: Vec<bool>,
    pub sublayer_dpb_params_flag: bool,
    pub dpb: DpbParameters,

    pub log2_min_luma_coding_block_size_minus2: u8,
    pub partition_constraints_override_enabled_flag: bool,
    pub log2_diff_min_qt_min_cb_intra_slice_luma: u8,
    pub max_mtt_hierarchy_depth_intra_slice_luma: u8,
    pub log2_diff_max_bt_min_qt_intra_slice_luma: u8,
    pub log2_diff_max_tt_min_qt_intra_slice_luma: u8,
    pub qtbtt_dual_tree_intra_flag: bool,
    pub log2_diff_min_qt_min_cb_intra_slice_chroma: u8,
    pub max_mtt_hierarchy_depth_intra_slice_chroma: u8,
    pub log2_diff_max_bt_min_qt_intra_slice_chroma: u8,
    pub log2_diff_max_tt_min_qt_intra_slice_chroma: u8,
    pub log2_diff_min_qt_min_cb_inter_slice: u8,
    pub max_mtt_hierarchy_depth_inter_slice: u8,
    pub log2_diff_max_bt_min_qt_inter_slice: u8,
    pub log2_diff_max_tt_min_qt_inter_slice: u8,
    pub max_luma_transform_size_64_flag: bool,
    pub transform_skip_enabled_flag: bool,
    pub log2_transform_skip_max_size_minus2: u8,
    pub bdpcm_enabled_flag: bool,
    pub mts_enabled_flag: bool,
    pub explicit_mts_intra_enabled_flag: bool,
    pub explicit_mts_inter_enabled_flag: bool,
    pub lfnst_enabled_flag: bool,

    pub joint_cbcr_enabled_flag: bool,
    pub same_qp_table_for_chroma_flag: bool,
    pub qp_table_start_minus26: [i8; MAX_SAMPLE_ARRAYS],
    pub num_points_in_qp_table_minus1: [u8; MAX_SAMPLE_ARRAYS],
    pub delta_qp_in_val_minus1: [Vec<u8>; MAX_SAMPLE_ARRAYS],
    pub delta_qp_diff_val: [Vec<u8>; MAX_SAMPLE_ARRAYS],

    pub sao_enabled_flag: bool,
    pub alf_enabled_flag: bool,
    pub ccalf_enabled_flag: bool,
    pub lmcs_enabled_flag: bool,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_flag: bool,
    pub long_term_ref_pics_flag: bool,
    pub inter_layer_prediction_enabled_flag: bool,
    pub idr_rpl_present_flag: bool,
    pub rpl1_same_as_rpl0_flag: bool,
    pub num_ref_pic_lists: [u8; 2],
    pub ref_pic_list_struct: [Vec<RefPicListStruct>; 2],

    pub ref_wraparound_enabled_flag: bool,
    pub temporal_mvp_enabled_flag: bool,
    pub sbtmvp_enabled_flag: bool,
    pub amvr_enabled_flag: bool,
    pub bdof_enabled_flag: bool,
    pub bdof_control_present_in_ph_flag: bool,
    pub smvd_enabled_flag: bool,
    pub dmvr_enabled_flag: bool,
    pub dmvr_control_present_in_ph_flag: bool,
    pub mmvd_enabled_flag: bool,
    pub mmvd_fullpel_only_enabled_flag: bool,
    pub six_minus_max_num_merge_cand: u8,
    pub sbt_enabled_flag: bool,
    pub affine_enabled_flag: bool,
    pub five_minus_max_num_subblock_merge_cand: u8,
    pub six_param_affine_enabled_flag: bool,
    pub affine_amvr_enabled_flag: bool,
    pub affine_prof_enabled_flag: bool,
    pub prof_control_present_in_ph_flag: bool,
    pub bcw_enabled_flag: bool,
    pub ciip_enabled_flag: bool,
    pub gpm_enabled_flag: bool,
    pub max_num_merge_cand_minus_max_num_gpm_cand: u8,
    pub log2_parallel_merge_level_minus2: u8,
    pub isp_enabled_flag: bool,
    pub mrl_enabled_flag: bool,
    pub mip_enabled_flag: bool,
    pub cclm_enabled_flag: bool,
    pub chroma_horizontal_collocated_flag: bool,
    pub chroma_vertical_collocated_flag: bool,
    pub palette_enabled_flag: bool,
    pub act_enabled_flag: bool,
    pub min_qp_prime_ts: u8,
    pub ibc_enabled_flag: bool,
    pub six_minus_max_num_ibc_merge_cand: u8,
    pub ladf_enabled_flag: bool,
    pub num_ladf_intervals_minus2: u8,
    pub ladf_lowest_interval_qp_offset: i8,
    pub ladf_qp_offset: [i8; 4],
    pub ladf_delta_threshold_minus1: [u32; 4],
    pub explicit_scaling_list_enabled_flag: bool,
    pub scaling_matrix_for_lfnst_disabled_flag: bool,
    pub scaling_matrix_for_alternative_colour_space_disabled_flag: bool,
    pub scaling_matrix_designated_colour_space_flag: bool,
    pub dep_quant_enabled_flag: bool,
    pub sign_data_hiding_enabled_flag: bool,
    pub virtual_boundaries_enabled_flag: bool,
    pub virtual_boundaries_present_flag: bool,
    pub num_ver_virtual_boundaries: u8,
    pub virtual_boundary_pos_x_minus1: [u16; 3],
    pub num_hor_virtual_boundaries: u8,
    pub virtual_boundary_pos_y_minus1: [u16; 3],

    pub timing_hrd_params_present_flag: bool,
    pub general_hrd_params: GeneralHrdParameters,
    pub sublayer_cpb_params_present_flag: bool,
    pub ols_hrd_params: OlsHrdParameters,
    pub field_seq_flag: bool,
    pub vui_parameters_present_flag: bool,
    pub vui_payload_size_minus1: u16,
    pub vui_params: VuiParams,
    pub extension_flag: bool,
    pub range_extension_flag: bool,
    pub range_extension: SpsRangeExtension,

    // Derived values.
    /// CtbLog2SizeY.
    pub ctb_log2_size_y: u8,
    /// CtbSizeY.
    pub ctb_size_y: u32,
    /// MinCbLog2SizeY.
    pub min_cb_log2_size_y: u8,
    /// MinQtSizeY for intra slices, inter slices and MinQtSizeC, in that
    /// order.
    pub min_qt_size: [u32; 3],
    /// Maximum binary tree sizes, ordered as `min_qt_size`.
    pub max_bt_size: [u32; 3],
    /// Maximum ternary tree sizes, ordered as `min_qt_size`.
    pub max_tt_size: [u32; 3],
    /// MaxNumMergeCand.
    pub max_num_merge_cand: u8,
    pub max_width: u32,
    pub max_height: u32,
    pub crop_rect_width: u32,
    pub crop_rect_height: u32,
    pub crop_rect_x: u32,
    pub crop_rect_y: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    /// ChromaQpTable for Cb, Cr and joint CbCr, indexed by
    /// `qp + qp_bd_offset()`.
    pub chroma_qp_table: [Vec<i32>; MAX_SAMPLE_ARRAYS],
}

impl Sps {
    /// QpBdOffset.
    pub fn qp_bd_offset(&self) -> i32 {
        6 * i32::from(self.bitdepth_minus8)
    }

    /// Bit depth of the luma and chroma samples.
    pub fn bitdepth(&self) -> u8 {
        self.bitdepth_minus8 + 8
    }

    pub fn sub_width_c(&self) -> u32 {
        SUB_WIDTH_C[usize::from(self.chroma_format_idc)]
    }

    pub fn sub_height_c(&self) -> u32 {
        SUB_HEIGHT_C[usize::from(self.chroma_format_idc)]
    }

    /// Maximum picture width in CTUs.
    pub fn max_pic_width_in_ctbs(&self) -> u32 {
        (u32::from(self.pic_width_max_in_luma_samples) + self.ctb_size_y - 1) / self.ctb_size_y
    }

    /// Maximum picture height in CTUs.
    pub fn max_pic_height_in_ctbs(&self) -> u32 {
        (u32::from(self.pic_height_max_in_luma_samples) + self.ctb_size_y - 1) / self.ctb_size_y
    }

    /// Maps a QP of chroma component `table` (0 for Cb, 1 for Cr, 2 for the
    /// joint CbCr residual) through the chroma QP mapping table.
    pub fn chroma_qp(&self, table: usize, qp: i32) -> Option<i32> {
        let index = usize::try_from(qp + self.qp_bd_offset()).ok()?;
        self.chroma_qp_table.get(table)?.get(index).copied()
    }

    /// Parses the RBSP of an SPS NAL unit, header excluded. `vpses` are the
    /// video parameter sets known so far.
    pub(crate) fn parse(
        r: &mut NaluReader,
        nuh_layer_id: u8,
        vpses: &BTreeMap<u8, Vps>,
    ) -> ParseResult<Sps> {
        log::trace!("parsing \"Sequence parameter set\"");

        let mut sps = Sps {
            nuh_layer_id,
            sps_id: r.read_bits(4)?,
            vps_id: r.read_bits(4)?,
            max_sublayers_minus1: r.read_bits(3)?,
            chroma_format_idc: r.read_bits(2)?,
            log2_ctu_size_minus5: r.read_bits(2)?,
            ptl_dpb_hrd_params_present_flag: r.read_bit()?,
            ..Default::default()
        };

        let vps = if sps.vps_id == 0 {
            None
        } else {
            let Some(vps) = vpses.get(&sps.vps_id) else {
                broken_link!("Couldn't find VPS {} referenced by SPS {}", sps.vps_id, sps.sps_id);
            };
            Some(vps)
        };

        if usize::from(sps.max_sublayers_minus1) >= MAX_SUBLAYERS {
            broken_data!("Invalid sps_max_sublayers_minus1 {}", sps.max_sublayers_minus1);
        }

        if sps.log2_ctu_size_minus5 > 2 {
            broken_data!("Invalid sps_log2_ctu_size_minus5 {}", sps.log2_ctu_size_minus5);
        }

        // (7-15), (7-16)
        sps.ctb_log2_size_y = sps.log2_ctu_size_minus5 + 5;
        sps.ctb_size_y = 1 << sps.ctb_log2_size_y;
        let ctb_log2_size_y = u32::from(sps.ctb_log2_size_y);

        if sps.vps_id == 0 && !sps.ptl_dpb_hrd_params_present_flag {
            broken_data!("sps_ptl_dpb_hrd_params_present_flag shall be 1 when sps_video_parameter_set_id is 0");
        }

        if sps.ptl_dpb_hrd_params_present_flag {
            sps.profile_tier_level.parse(r, true, sps.max_sublayers_minus1)?;
        }

        let gci = &sps.profile_tier_level.general_constraints_info;

        sps.gdr_enabled_flag = r.read_bit()?;
        if gci.no_gdr_constraint_flag && sps.gdr_enabled_flag {
            broken_data!("sps_gdr_enabled_flag shall be 0 when gci_no_gdr_constraint_flag is 1");
        }

        sps.ref_pic_resampling_enabled_flag = r.read_bit()?;
        if gci.no_ref_pic_resampling_constraint_flag && sps.ref_pic_resampling_enabled_flag {
            broken_data!("sps_ref_pic_resampling_enabled_flag shall be 0 when gci_no_ref_pic_resampling_constraint_flag is 1");
        }

        if sps.ref_pic_resampling_enabled_flag {
            sps.res_change_in_clvs_allowed_flag = r.read_bit()?;
        }
        if gci.no_res_change_in_clvs_constraint_flag && sps.res_change_in_clvs_allowed_flag {
            broken_data!("sps_res_change_in_clvs_allowed_flag shall be 0 when gci_no_res_change_in_clvs_constraint_flag is 1");
        }

        sps.pic_width_max_in_luma_samples = r.read_ue_max(MAX_WIDTH as u32)?;
        sps.pic_height_max_in_luma_samples = r.read_ue_max(MAX_HEIGHT as u32)?;
        if sps.pic_width_max_in_luma_samples == 0 || sps.pic_height_max_in_luma_samples == 0 {
            broken_data!(
                "Invalid maximum picture size {}x{}",
                sps.pic_width_max_in_luma_samples,
                sps.pic_height_max_in_luma_samples
            );
        }

        let width = u32::from(sps.pic_width_max_in_luma_samples);
        let height = u32::from(sps.pic_height_max_in_luma_samples);
        let sub_width_c = sps.sub_width_c();
        let sub_height_c = sps.sub_height_c();

        sps.conformance_window_flag = r.read_bit()?;
        if sps.conformance_window_flag {
            sps.conf_win_left_offset = r.read_ue_max(width / sub_width_c)?;
            sps.conf_win_right_offset = r.read_ue_max(width / sub_width_c)?;
            sps.conf_win_top_offset = r.read_ue_max(height / sub_height_c)?;
            sps.conf_win_bottom_offset = r.read_ue_max(height / sub_height_c)?;

            let horizontal =
                u32::from(sps.conf_win_left_offset) + u32::from(sps.conf_win_right_offset);
            let vertical =
                u32::from(sps.conf_win_top_offset) + u32::from(sps.conf_win_bottom_offset);
            if sub_width_c * horizontal >= width || sub_height_c * vertical >= height {
                broken_data!(
                    "Invalid conformance window ({}, {}, {}, {}) for a {}x{} picture",
                    sps.conf_win_left_offset,
                    sps.conf_win_right_offset,
                    sps.conf_win_top_offset,
                    sps.conf_win_bottom_offset,
                    width,
                    height
                );
            }
        }

        sps.subpic_info_present_flag = r.read_bit()?;
        if sps.profile_tier_level.general_constraints_info.no_subpic_info_constraint_flag
            && sps.subpic_info_present_flag
        {
            broken_data!("sps_subpic_info_present_flag shall be 0 when gci_no_subpic_info_constraint_flag is 1");
        }

        if sps.subpic_info_present_flag {
            sps.parse_subpic_info(r)?;
        } else {
            sps.set_single_subpic();
        }

        if !sps.subpic_id_mapping_explicitly_signalled_flag || !sps.subpic_id_mapping_present_flag
        {
            sps.subpic_id = (0..=u32::from(sps.num_subpics_minus1)).collect();
        }

        sps.bitdepth_minus8 = r.read_ue_max(8)?;
        sps.entropy_coding_sync_enabled_flag = r.read_bit()?;
        sps.entry_point_offsets_present_flag = r.read_bit()?;
        sps.log2_max_pic_order_cnt_lsb_minus4 = r.read_bits_max(4, 12)?;

        sps.poc_msb_cycle_flag = r.read_bit()?;
        if sps.poc_msb_cycle_flag {
            sps.poc_msb_cycle_len_minus1 =
                r.read_ue_max(32 - u32::from(sps.log2_max_pic_order_cnt_lsb_minus4) - 5)?;
        }

        sps.num_extra_ph_bytes = r.read_bits_max(2, 2)?;
        sps.extra_ph_bit_present_flag = (0..usize::from(sps.num_extra_ph_bytes) * 8)
            .map(|_| r.read_bit())
            .collect::<Result<_, _>>()?;

        sps.num_extra_sh_bytes = r.read_bits_max(2, 2)?;
        sps.extra_sh_bit_present_flag = (0..usize::from(sps.num_extra_sh_bytes) * 8)
            .map(|_| r.read_bit())
            .collect::<Result<_, _>>()?;

        if sps.ptl_dpb_hrd_params_present_flag {
            if sps.max_sublayers_minus1 > 0 {
                sps.sublayer_dpb_params_flag = r.read_bit()?;
            }

            sps.dpb.parse(r, sps.max_sublayers_minus1, sps.sublayer_dpb_params_flag)?;
        }

        sps.log2_min_luma_coding_block_size_minus2 = r.read_ue_max(4u32.min(ctb_log2_size_y - 2))?;
        // (7-17)
        sps.min_cb_log2_size_y = sps.log2_min_luma_coding_block_size_minus2 + 2;
        let min_cb_log2_size_y = u32::from(sps.min_cb_log2_size_y);
        let min_cb_size_y = 1 << min_cb_log2_size_y;
        if width % min_cb_size_y.max(8) != 0 || height % min_cb_size_y.max(8) != 0 {
            broken_data!(
                "Picture size {}x{} is not a multiple of Max(8, MinCbSizeY)",
                width,
                height
            );
        }

        sps.partition_constraints_override_enabled_flag = r.read_bit()?;
        sps.parse_partition_constraints(r, ctb_log2_size_y, min_cb_log2_size_y)?;

        if sps.ctb_size_y > 32 {
            sps.max_luma_transform_size_64_flag = r.read_bit()?;
        }

        sps.transform_skip_enabled_flag = r.read_bit()?;
        if sps.transform_skip_enabled_flag {
            sps.log2_transform_skip_max_size_minus2 = r.read_ue_max(3)?;
            sps.bdpcm_enabled_flag = r.read_bit()?;
        }

        sps.mts_enabled_flag = r.read_bit()?;
        if sps.mts_enabled_flag {
            sps.explicit_mts_intra_enabled_flag = r.read_bit()?;
            sps.explicit_mts_inter_enabled_flag = r.read_bit()?;
        }

        sps.lfnst_enabled_flag = r.read_bit()?;

        if sps.chroma_format_idc != 0 {
            sps.parse_chroma_qp_table(r)?;
        }

        sps.sao_enabled_flag = r.read_bit()?;
        sps.alf_enabled_flag = r.read_bit()?;
        if sps.alf_enabled_flag && sps.chroma_format_idc != 0 {
            sps.ccalf_enabled_flag = r.read_bit()?;
        }

        sps.lmcs_enabled_flag = r.read_bit()?;
        sps.weighted_pred_flag = r.read_bit()?;
        sps.weighted_bipred_flag = r.read_bit()?;
        sps.long_term_ref_pics_flag = r.read_bit()?;
        if sps.vps_id > 0 {
            sps.inter_layer_prediction_enabled_flag = r.read_bit()?;
        }

        sps.idr_rpl_present_flag = r.read_bit()?;
        if sps.profile_tier_level.general_constraints_info.no_idr_rpl_constraint_flag
            && sps.idr_rpl_present_flag
        {
            broken_data!("sps_idr_rpl_present_flag shall be 0 when gci_no_idr_rpl_constraint_flag is 1");
        }

        sps.rpl1_same_as_rpl0_flag = r.read_bit()?;
        let num_lists = if sps.rpl1_same_as_rpl0_flag { 1 } else { 2 };
        for i in 0..num_lists {
            sps.num_ref_pic_lists[i] = r.read_ue_max(MAX_REF_PIC_LISTS as u32)?;
            let mut lists = Vec::with_capacity(usize::from(sps.num_ref_pic_lists[i]));
            for j in 0..usize::from(sps.num_ref_pic_lists[i]) {
                lists.push(RefPicListStruct::parse(r, i, j, &sps)?);
            }
            sps.ref_pic_list_struct[i] = lists;
        }

        if sps.rpl1_same_as_rpl0_flag {
            sps.num_ref_pic_lists[1] = sps.num_ref_pic_lists[0];
            sps.ref_pic_list_struct[1] = sps.ref_pic_list_struct[0].clone();
        }

        sps.ref_wraparound_enabled_flag = r.read_bit()?;
        if sps.ref_wraparound_enabled_flag {
            let pic_width_in_ctbs = sps.max_pic_width_in_ctbs();
            for i in 0..=usize::from(sps.num_subpics_minus1) {
                if sps.subpic_treated_as_pic_flag[i]
                    && u32::from(sps.subpic_width_minus1[i]) + 1 != pic_width_in_ctbs
                {
                    broken_data!(
                        "sps_ref_wraparound_enabled_flag shall be 0 when subpicture {} is treated as a picture and narrower than the picture",
                        i
                    );
                }
            }
        }

        sps.temporal_mvp_enabled_flag = r.read_bit()?;
        if sps.temporal_mvp_enabled_flag {
            sps.sbtmvp_enabled_flag = r.read_bit()?;
        }

        sps.amvr_enabled_flag = r.read_bit()?;

        sps.bdof_enabled_flag = r.read_bit()?;
        if sps.bdof_enabled_flag {
            sps.bdof_control_present_in_ph_flag = r.read_bit()?;
        }

        sps.smvd_enabled_flag = r.read_bit()?;

        sps.dmvr_enabled_flag = r.read_bit()?;
        if sps.dmvr_enabled_flag {
            sps.dmvr_control_present_in_ph_flag = r.read_bit()?;
        }

        sps.mmvd_enabled_flag = r.read_bit()?;
        if sps.mmvd_enabled_flag {
            sps.mmvd_fullpel_only_enabled_flag = r.read_bit()?;
        }

        sps.six_minus_max_num_merge_cand = r.read_ue_max(5)?;
        sps.max_num_merge_cand = 6 - sps.six_minus_max_num_merge_cand;

        sps.sbt_enabled_flag = r.read_bit()?;

        sps.affine_enabled_flag = r.read_bit()?;
        if sps.affine_enabled_flag {
            sps.five_minus_max_num_subblock_merge_cand =
                r.read_ue_max(5 - u32::from(sps.sbtmvp_enabled_flag))?;
            sps.six_param_affine_enabled_flag = r.read_bit()?;
            if sps.amvr_enabled_flag {
                sps.affine_amvr_enabled_flag = r.read_bit()?;
            }

            sps.affine_prof_enabled_flag = r.read_bit()?;
            if sps.affine_prof_enabled_flag {
                sps.prof_control_present_in_ph_flag = r.read_bit()?;
            }
        }

        sps.bcw_enabled_flag = r.read_bit()?;
        sps.ciip_enabled_flag = r.read_bit()?;

        if sps.max_num_merge_cand >= 2 {
            sps.gpm_enabled_flag = r.read_bit()?;
            if sps.gpm_enabled_flag && sps.max_num_merge_cand >= 3 {
                sps.max_num_merge_cand_minus_max_num_gpm_cand =
                    r.read_ue_max(u32::from(sps.max_num_merge_cand) - 2)?;
            }
        }

        sps.log2_parallel_merge_level_minus2 = r.read_ue_max(ctb_log2_size_y - 2)?;

        sps.isp_enabled_flag = r.read_bit()?;
        sps.mrl_enabled_flag = r.read_bit()?;
        sps.mip_enabled_flag = r.read_bit()?;

        if sps.chroma_format_idc != 0 {
            sps.cclm_enabled_flag = r.read_bit()?;
        }

        if sps.chroma_format_idc == 1 {
            sps.chroma_horizontal_collocated_flag = r.read_bit()?;
            sps.chroma_vertical_collocated_flag = r.read_bit()?;
        } else {
            sps.chroma_horizontal_collocated_flag = true;
            sps.chroma_vertical_collocated_flag = true;
        }

        sps.palette_enabled_flag = r.read_bit()?;
        if sps.palette_enabled_flag
            && matches!(
                sps.profile_tier_level.profile(),
                Some(Profile::Main12 | Profile::Main12Intra | Profile::Main12StillPicture)
            )
        {
            broken_data!("sps_palette_enabled_flag shall be 0 for the Main 12 profiles");
        }

        if sps.chroma_format_idc == 3 && !sps.max_luma_transform_size_64_flag {
            sps.act_enabled_flag = r.read_bit()?;
        }

        if sps.transform_skip_enabled_flag || sps.palette_enabled_flag {
            sps.min_qp_prime_ts = r.read_ue_max(8)?;
        }

        sps.ibc_enabled_flag = r.read_bit()?;
        if sps.ibc_enabled_flag {
            sps.six_minus_max_num_ibc_merge_cand = r.read_ue_max(5)?;
        }

        sps.ladf_enabled_flag = r.read_bit()?;
        if sps.ladf_enabled_flag {
            sps.num_ladf_intervals_minus2 = r.read_bits(2)?;
            sps.ladf_lowest_interval_qp_offset = r.read_se_bounded(-63, 63)?;
            for i in 0..usize::from(sps.num_ladf_intervals_minus2) + 1 {
                sps.ladf_qp_offset[i] = r.read_se_bounded(-63, 63)?;
                sps.ladf_delta_threshold_minus1[i] =
                    r.read_ue_max((1 << (8 + u32::from(sps.bitdepth_minus8))) - 3)?;
            }
        }

        sps.explicit_scaling_list_enabled_flag = r.read_bit()?;
        if sps.lfnst_enabled_flag && sps.explicit_scaling_list_enabled_flag {
            sps.scaling_matrix_for_lfnst_disabled_flag = r.read_bit()?;
        }

        if sps.act_enabled_flag && sps.explicit_scaling_list_enabled_flag {
            sps.scaling_matrix_for_alternative_colour_space_disabled_flag = r.read_bit()?;
        }

        if sps.scaling_matrix_for_alternative_colour_space_disabled_flag {
            sps.scaling_matrix_designated_colour_space_flag = r.read_bit()?;
        }

        sps.dep_quant_enabled_flag = r.read_bit()?;
        sps.sign_data_hiding_enabled_flag = r.read_bit()?;

        sps.virtual_boundaries_enabled_flag = r.read_bit()?;
        if sps.profile_tier_level.general_constraints_info.no_virtual_boundaries_constraint_flag
            && sps.virtual_boundaries_enabled_flag
        {
            broken_data!("sps_virtual_boundaries_enabled_flag shall be 0 when gci_no_virtual_boundaries_constraint_flag is 1");
        }

        if sps.virtual_boundaries_enabled_flag {
            sps.virtual_boundaries_present_flag = r.read_bit()?;
            if sps.virtual_boundaries_present_flag {
                sps.num_ver_virtual_boundaries = r.read_ue_max(3)?;
                if width <= 8 && sps.num_ver_virtual_boundaries != 0 {
                    broken_data!("No vertical virtual boundary is allowed for pictures at most 8 samples wide");
                }
                for i in 0..usize::from(sps.num_ver_virtual_boundaries) {
                    sps.virtual_boundary_pos_x_minus1[i] =
                        r.read_ue_max(((width + 7) / 8).saturating_sub(2))?;
                }

                sps.num_hor_virtual_boundaries = r.read_ue_max(3)?;
                if height <= 8 && sps.num_hor_virtual_boundaries != 0 {
                    broken_data!("No horizontal virtual boundary is allowed for pictures at most 8 samples high");
                }
                for i in 0..usize::from(sps.num_hor_virtual_boundaries) {
                    sps.virtual_boundary_pos_y_minus1[i] =
                        r.read_ue_max(((height + 7) / 8).saturating_sub(2))?;
                }
            }
        }

        if sps.ptl_dpb_hrd_params_present_flag {
            sps.timing_hrd_params_present_flag = r.read_bit()?;
            if sps.timing_hrd_params_present_flag {
                sps.general_hrd_params.parse(r)?;

                if sps.max_sublayers_minus1 > 0 {
                    sps.sublayer_cpb_params_present_flag = r.read_bit()?;
                }

                let first_sublayer = if sps.sublayer_cpb_params_present_flag {
                    0
                } else {
                    sps.max_sublayers_minus1
                };

                sps.ols_hrd_params.parse(
                    r,
                    &sps.general_hrd_params,
                    first_sublayer,
                    sps.max_sublayers_minus1,
                )?;
            }
        }

        sps.field_seq_flag = r.read_bit()?;

        sps.vui_parameters_present_flag = r.read_bit()?;
        if sps.vui_parameters_present_flag {
            sps.vui_payload_size_minus1 = r.read_ue_max(1023)?;
            // sps_vui_alignment_zero_bit
            r.skip_to_byte_alignment()?;
            sps.vui_params.parse(r, u32::from(sps.vui_payload_size_minus1) + 1)?;
        }

        sps.extension_flag = r.read_bit()?;
        if sps.extension_flag {
            sps.range_extension_flag = r.read_bit()?;

            let extension_7bits: u8 = r.read_bits(7)?;
            if extension_7bits != 0 {
                broken_data!("sps_extension_7bits shall be 0, got {:#x}", extension_7bits);
            }

            if sps.range_extension_flag {
                if sps.bitdepth() <= 10 {
                    broken_data!("sps_range_extension_flag shall be 0 when BitDepth is at most 10");
                }

                sps.range_extension.parse(r, sps.transform_skip_enabled_flag)?;
            }
        }

        sps.max_width = width;
        sps.max_height = height;
        sps.crop_rect_x = 0;
        sps.crop_rect_y = 0;
        sps.crop_rect_width = width;
        sps.crop_rect_height = height;
        if sps.conformance_window_flag {
            sps.crop_rect_x = u32::from(sps.conf_win_left_offset) * sub_width_c;
            sps.crop_rect_y = u32::from(sps.conf_win_top_offset) * sub_height_c;
            sps.crop_rect_width -= (u32::from(sps.conf_win_left_offset)
                + u32::from(sps.conf_win_right_offset))
                * sub_width_c;
            sps.crop_rect_height -= (u32::from(sps.conf_win_top_offset)
                + u32::from(sps.conf_win_bottom_offset))
                * sub_height_c;
        }

        sps.fps_num = 0;
        sps.fps_den = 1;
        if sps.ptl_dpb_hrd_params_present_flag && sps.timing_hrd_params_present_flag {
            sps.fps_num = sps.general_hrd_params.time_scale;
            sps.fps_den = sps.general_hrd_params.num_units_in_tick;
        } else if let Some(vps) = vps.filter(|vps| vps.timing_hrd_params_present_flag) {
            sps.fps_num = vps.general_hrd_params.time_scale;
            sps.fps_den = vps.general_hrd_params.num_units_in_tick;
        }

        Ok(sps)
    }

    /// Infers the layout of a picture made of a single subpicture.
    fn set_single_subpic(&mut self) {
        self.num_subpics_minus1 = 0;
        self.independent_subpics_flag = true;
        self.subpic_same_size_flag = false;
        self.subpic_ctu_top_left_x = vec![0];
        self.subpic_ctu_top_left_y = vec![0];
        self.subpic_width_minus1 = vec![(self.max_pic_width_in_ctbs() - 1) as u16];
        self.subpic_height_minus1 = vec![(self.max_pic_height_in_ctbs() - 1) as u16];
        self.subpic_treated_as_pic_flag = vec![true];
        self.loop_filter_across_subpic_enabled_flag = vec![false];
    }

    fn parse_subpic_info(&mut self, r: &mut NaluReader) -> ParseResult<()> {
        let pic_width_in_ctbs = self.max_pic_width_in_ctbs();
        let pic_height_in_ctbs = self.max_pic_height_in_ctbs();
        let width = u32::from(self.pic_width_max_in_luma_samples);
        let height = u32::from(self.pic_height_max_in_luma_samples);

        self.num_subpics_minus1 = r.read_ue_max(MAX_SLICES_PER_AU as u32 - 1)?;
        if self.num_subpics_minus1 == 0 {
            self.set_single_subpic();
        } else {
            self.independent_subpics_flag = r.read_bit()?;
            self.subpic_same_size_flag = r.read_bit()?;

            let num_subpics = usize::from(self.num_subpics_minus1) + 1;
            self.subpic_ctu_top_left_x = vec![0; num_subpics];
            self.subpic_ctu_top_left_y = vec![0; num_subpics];
            self.subpic_width_minus1 = vec![0; num_subpics];
            self.subpic_height_minus1 = vec![0; num_subpics];
            self.subpic_treated_as_pic_flag = vec![true; num_subpics];
            self.loop_filter_across_subpic_enabled_flag = vec![false; num_subpics];

            let x_bits = ceil_log2(pic_width_in_ctbs);
            let y_bits = ceil_log2(pic_height_in_ctbs);
            let mut num_subpic_cols = 1;

            for i in 0..num_subpics {
                if !self.subpic_same_size_flag || i == 0 {
                    if i > 0 && width > self.ctb_size_y {
                        self.subpic_ctu_top_left_x[i] = r.read_bits(x_bits)?;
                    }

                    if i > 0 && height > self.ctb_size_y {
                        self.subpic_ctu_top_left_y[i] = r.read_bits(y_bits)?;
                    }

                    let left = u32::from(self.subpic_ctu_top_left_x[i]);
                    let top = u32::from(self.subpic_ctu_top_left_y[i]);
                    if left >= pic_width_in_ctbs || top >= pic_height_in_ctbs {
                        broken_data!("Subpicture {} starts outside of the picture", i);
                    }

                    self.subpic_width_minus1[i] =
                        if i < num_subpics - 1 && width > self.ctb_size_y {
                            r.read_bits(x_bits)?
                        } else {
                            (pic_width_in_ctbs - left - 1) as u16
                        };

                    self.subpic_height_minus1[i] =
                        if i < num_subpics - 1 && height > self.ctb_size_y {
                            r.read_bits(y_bits)?
                        } else {
                            (pic_height_in_ctbs - top - 1) as u16
                        };

                    if self.subpic_same_size_flag {
                        let subpic_width = u32::from(self.subpic_width_minus1[0]) + 1;
                        let subpic_height = u32::from(self.subpic_height_minus1[0]) + 1;
                        num_subpic_cols = pic_width_in_ctbs / subpic_width;

                        if pic_width_in_ctbs % subpic_width != 0 {
                            broken_data!("Invalid sps_subpic_width_minus1[0] {}", subpic_width - 1);
                        }

                        if pic_height_in_ctbs % subpic_height != 0 {
                            broken_data!("Invalid sps_subpic_height_minus1[0] {}", subpic_height - 1);
                        }

                        if num_subpic_cols * (pic_height_in_ctbs / subpic_height)
                            != num_subpics as u32
                        {
                            broken_data!(
                                "sps_num_subpics_minus1 {} does not match the subpicture grid",
                                self.num_subpics_minus1
                            );
                        }
                    }
                } else {
                    let i = i as u32;
                    let subpic_width = u32::from(self.subpic_width_minus1[0]) + 1;
                    let subpic_height = u32::from(self.subpic_height_minus1[0]) + 1;
                    let idx = i as usize;
                    self.subpic_ctu_top_left_x[idx] = ((i % num_subpic_cols) * subpic_width) as u16;
                    self.subpic_ctu_top_left_y[idx] = ((i / num_subpic_cols) * subpic_height) as u16;
                    self.subpic_width_minus1[idx] = self.subpic_width_minus1[0];
                    self.subpic_height_minus1[idx] = self.subpic_height_minus1[0];
                }

                if !self.independent_subpics_flag {
                    self.subpic_treated_as_pic_flag[i] = r.read_bit()?;
                    self.loop_filter_across_subpic_enabled_flag[i] = r.read_bit()?;
                }
            }

            self.check_subpic_layout(pic_width_in_ctbs, pic_height_in_ctbs)?;
        }

        self.subpic_id_len_minus1 = r.read_ue_max(15)?;
        if (1u32 << (self.subpic_id_len_minus1 + 1)) < u32::from(self.num_subpics_minus1) + 1 {
            broken_data!("Invalid sps_subpic_id_len_minus1 {}", self.subpic_id_len_minus1);
        }

        self.subpic_id_mapping_explicitly_signalled_flag = r.read_bit()?;
        if self.subpic_id_mapping_explicitly_signalled_flag {
            self.subpic_id_mapping_present_flag = r.read_bit()?;
            if self.subpic_id_mapping_present_flag {
                let id_len = usize::from(self.subpic_id_len_minus1) + 1;
                self.subpic_id = (0..=self.num_subpics_minus1)
                    .map(|_| r.read_bits::<u32>(id_len))
                    .collect::<Result<_, _>>()?;
            }
        }

        Ok(())
    }

    /// Checks that the subpictures fit in the picture and do not overlap.
    fn check_subpic_layout(&self, pic_width_in_ctbs: u32, pic_height_in_ctbs: u32) -> ParseResult<()> {
        let mut covered = vec![false; (pic_width_in_ctbs * pic_height_in_ctbs) as usize];

        for i in 0..=usize::from(self.num_subpics_minus1) {
            let left = u32::from(self.subpic_ctu_top_left_x[i]);
            let top = u32::from(self.subpic_ctu_top_left_y[i]);
            let right = left + u32::from(self.subpic_width_minus1[i]) + 1;
            let bottom = top + u32::from(self.subpic_height_minus1[i]) + 1;

            if right > pic_width_in_ctbs || bottom > pic_height_in_ctbs {
                broken_data!("Subpicture {} extends past the picture boundaries", i);
            }

            for y in top..bottom {
                for x in left..right {
                    let ctb = (y * pic_width_in_ctbs + x) as usize;
                    if covered[ctb] {
                        broken_data!("Subpicture {} overlaps a previous subpicture", i);
                    }
                    covered[ctb] = true;
                }
            }
        }

        Ok(())
    }

    fn parse_partition_constraints(
        &mut self,
        r: &mut NaluReader,
        ctb_log2_size_y: u32,
        min_cb_log2_size_y: u32,
    ) -> ParseResult<()> {
        let max_log2_qt = 6u32.min(ctb_log2_size_y);
        let max_mtt_depth = 2 * (ctb_log2_size_y - min_cb_log2_size_y);

        self.log2_diff_min_qt_min_cb_intra_slice_luma =
            r.read_ue_max(max_log2_qt - min_cb_log2_size_y)?;
        let min_qt_log2_size_intra_y =
            u32::from(self.log2_diff_min_qt_min_cb_intra_slice_luma) + min_cb_log2_size_y;
        self.min_qt_size[0] = 1 << min_qt_log2_size_intra_y;

        self.max_mtt_hierarchy_depth_intra_slice_luma = r.read_ue_max(max_mtt_depth)?;
        self.max_bt_size[0] = self.min_qt_size[0];
        self.max_tt_size[0] = self.min_qt_size[0];
        if self.max_mtt_hierarchy_depth_intra_slice_luma != 0 {
            self.log2_diff_max_bt_min_qt_intra_slice_luma =
                r.read_ue_max(ctb_log2_size_y - min_qt_log2_size_intra_y)?;
            self.max_bt_size[0] <<= self.log2_diff_max_bt_min_qt_intra_slice_luma;

            self.log2_diff_max_tt_min_qt_intra_slice_luma =
                r.read_ue_max(max_log2_qt - min_qt_log2_size_intra_y)?;
            self.max_tt_size[0] <<= self.log2_diff_max_tt_min_qt_intra_slice_luma;
        }

        if self.chroma_format_idc != 0 {
            self.qtbtt_dual_tree_intra_flag = r.read_bit()?;
        }

        if self.qtbtt_dual_tree_intra_flag {
            self.log2_diff_min_qt_min_cb_intra_slice_chroma =
                r.read_ue_max(max_log2_qt - min_cb_log2_size_y)?;
            let min_qt_log2_size_intra_c =
                u32::from(self.log2_diff_min_qt_min_cb_intra_slice_chroma) + min_cb_log2_size_y;
            self.min_qt_size[2] = 1 << min_qt_log2_size_intra_c;

            self.max_mtt_hierarchy_depth_intra_slice_chroma = r.read_ue_max(max_mtt_depth)?;
            self.max_bt_size[2] = self.min_qt_size[2];
            self.max_tt_size[2] = self.min_qt_size[2];
            if self.max_mtt_hierarchy_depth_intra_slice_chroma != 0 {
                self.log2_diff_max_bt_min_qt_intra_slice_chroma =
                    r.read_ue_max(max_log2_qt - min_qt_log2_size_intra_c)?;
                self.max_bt_size[2] <<= self.log2_diff_max_bt_min_qt_intra_slice_chroma;

                self.log2_diff_max_tt_min_qt_intra_slice_chroma =
                    r.read_ue_max(max_log2_qt - min_qt_log2_size_intra_c)?;
                self.max_tt_size[2] <<= self.log2_diff_max_tt_min_qt_intra_slice_chroma;
            }
        }

        self.log2_diff_min_qt_min_cb_inter_slice =
            r.read_ue_max(max_log2_qt - min_cb_log2_size_y)?;
        let min_qt_log2_size_inter_y =
            u32::from(self.log2_diff_min_qt_min_cb_inter_slice) + min_cb_log2_size_y;
        self.min_qt_size[1] = 1 << min_qt_log2_size_inter_y;

        self.max_mtt_hierarchy_depth_inter_slice = r.read_ue_max(max_mtt_depth)?;
        self.max_bt_size[1] = self.min_qt_size[1];
        self.max_tt_size[1] = self.min_qt_size[1];
        if self.max_mtt_hierarchy_depth_inter_slice != 0 {
            self.log2_diff_max_bt_min_qt_inter_slice =
                r.read_ue_max(ctb_log2_size_y - min_qt_log2_size_inter_y)?;
            self.max_bt_size[1] <<= self.log2_diff_max_bt_min_qt_inter_slice;

            self.log2_diff_max_tt_min_qt_inter_slice =
                r.read_ue_max(max_log2_qt - min_qt_log2_size_inter_y)?;
            self.max_tt_size[1] <<= self.log2_diff_max_tt_min_qt_inter_slice;
        }

        Ok(())
    }

    /// Parses the chroma QP mapping tables and derives ChromaQpTable,
    /// (7-36) and (7-37).
    fn parse_chroma_qp_table(&mut self, r: &mut NaluReader) -> ParseResult<()> {
        log::trace!("parsing \"Chroma QP Table\"");

        self.joint_cbcr_enabled_flag = r.read_bit()?;
        self.same_qp_table_for_chroma_flag = r.read_bit()?;

        let num_qp_tables = if self.same_qp_table_for_chroma_flag {
            1
        } else if self.joint_cbcr_enabled_flag {
            3
        } else {
            2
        };

        let qp_bd_offset = self.qp_bd_offset();
        // Entries cover the QPs from -QpBdOffset to 63.
        let table_len = (64 + qp_bd_offset) as usize;

        for i in 0..num_qp_tables {
            self.qp_table_start_minus26[i] = r.read_se_bounded(-26 - qp_bd_offset, 36)?;
            self.num_points_in_qp_table_minus1[i] =
                r.read_ue_max((36 - i32::from(self.qp_table_start_minus26[i])) as u32)?;

            let num_points = usize::from(self.num_points_in_qp_table_minus1[i]) + 1;
            if num_points > MAX_POINTS_IN_QP_TABLE {
                broken_data!("Too many points in chroma QP table: {}", num_points);
            }

            let mut qp_in = vec![0i32; num_points + 1];
            let mut qp_out = vec![0i32; num_points + 1];
            let mut delta_qp_in = vec![0i32; num_points];
            self.delta_qp_in_val_minus1[i] = vec![0; num_points];
            self.delta_qp_diff_val[i] = vec![0; num_points];

            qp_in[0] = i32::from(self.qp_table_start_minus26[i]) + 26;
            qp_out[0] = qp_in[0];
            for j in 0..num_points {
                self.delta_qp_in_val_minus1[i][j] = r.read_ue_max(128)?;
                self.delta_qp_diff_val[i][j] = r.read_ue_max(128)?;

                delta_qp_in[j] = i32::from(self.delta_qp_in_val_minus1[i][j]) + 1;
                qp_in[j + 1] = qp_in[j] + delta_qp_in[j];
                qp_out[j + 1] = qp_out[j]
                    + i32::from(self.delta_qp_in_val_minus1[i][j] ^ self.delta_qp_diff_val[i][j]);
            }

            let index = |qp: i32| -> ParseResult<usize> {
                match usize::try_from(qp + qp_bd_offset) {
                    Ok(idx) if idx < table_len => Ok(idx),
                    _ => broken_data!("Chroma QP {} out of the table range", qp),
                }
            };

            let mut table = vec![0i32; table_len];

            let start = index(qp_in[0])?;
            table[start] = qp_out[0];
            for k in (0..start).rev() {
                table[k] = (table[k + 1] - 1).clamp(-qp_bd_offset, 63);
            }

            for j in 0..num_points {
                let sh = delta_qp_in[j] >> 1;
                let base = index(qp_in[j])?;
                let end = index(qp_in[j + 1])?;
                for (m, k) in (base + 1..=end).enumerate() {
                    let m = m as i32 + 1;
                    table[k] = table[base] + ((qp_out[j + 1] - qp_out[j]) * m + sh) / delta_qp_in[j];
                }
            }

            let last = index(qp_in[num_points])?;
            for k in last + 1..table_len {
                table[k] = (table[k - 1] + 1).clamp(-qp_bd_offset, 63);
            }

            self.chroma_qp_table[i] = table;
        }

        if self.same_qp_table_for_chroma_flag {
            self.chroma_qp_table[1] = self.chroma_qp_table[0].clone();
            self.chroma_qp_table[2] = self.chroma_qp_table[0].clone();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::h266::parser::NaluType;
    use crate::codec::h266::test_utils::NaluWriter;
    use crate::codec::h266::test_utils::TestSps;
    use crate::error::ParserResult;

    fn parse(w: &NaluWriter) -> ParseResult<Sps> {
        let nal = w.nal(NaluType::Sps, 0, 0);
        Sps::parse(&mut NaluReader::new(&nal[2..]), 0, &BTreeMap::new())
    }

    #[test]
    fn minimal_sps() {
        let mut w = NaluWriter::new();
        TestSps::default().write(&mut w);
        let sps = parse(&w).unwrap();

        assert_eq!(sps.sps_id, 0);
        assert_eq!(sps.ctb_size_y, 128);
        assert_eq!(sps.chroma_format_idc, 1);
        assert_eq!(sps.bitdepth(), 10);
        assert_eq!((sps.max_width, sps.max_height), (1920, 1080));
        assert_eq!(sps.max_pic_width_in_ctbs(), 15);
        assert_eq!(sps.max_pic_height_in_ctbs(), 9);
        assert_eq!(sps.subpic_width_minus1, vec![14]);
        assert_eq!(sps.subpic_height_minus1, vec![8]);
        assert_eq!(sps.subpic_id, vec![0]);
        assert_eq!(sps.min_qt_size, [8, 8, 0]);
        assert_eq!(sps.max_num_merge_cand, 6);
        assert_eq!(sps.dpb.max_dec_pic_buffering_minus1[0], 4);
        assert_eq!((sps.fps_num, sps.fps_den), (0, 1));
        assert_eq!(sps.vui_params, VuiParams::default());
    }

    #[test]
    fn crop_rect_defaults_to_the_picture() {
        let mut w = NaluWriter::new();
        TestSps::default().write(&mut w);
        let sps = parse(&w).unwrap();

        assert!(!sps.conformance_window_flag);
        assert_eq!(sps.crop_rect_width, u32::from(sps.pic_width_max_in_luma_samples));
        assert_eq!(sps.crop_rect_height, u32::from(sps.pic_height_max_in_luma_samples));
        assert_eq!((sps.crop_rect_x, sps.crop_rect_y), (0, 0));
    }

    #[test]
    fn conformance_window() {
        let mut w = NaluWriter::new();
        TestSps {
            height: 1088,
            conf_win: Some([0, 0, 0, 4]),
            ..Default::default()
        }
        .write(&mut w);
        let sps = parse(&w).unwrap();

        assert_eq!(sps.crop_rect_height, 1080);
        assert_eq!(sps.crop_rect_width, 1920);

        // The window removes the whole picture.
        let mut w = NaluWriter::new();
        TestSps {
            conf_win: Some([480, 480, 0, 0]),
            ..Default::default()
        }
        .write(&mut w);
        assert_eq!(parse(&w).unwrap_err().kind(), ParserResult::BrokenData);
    }

    #[test]
    fn frame_rate_from_timing_hrd() {
        let mut w = NaluWriter::new();
        TestSps {
            timing: Some((1001, 60000)),
            ..Default::default()
        }
        .write(&mut w);
        let sps = parse(&w).unwrap();

        assert!(sps.timing_hrd_params_present_flag);
        assert_eq!((sps.fps_num, sps.fps_den), (60000, 1001));
    }

    #[test]
    fn chroma_qp_table() {
        let mut w = NaluWriter::new();
        TestSps::default().write(&mut w);
        let sps = parse(&w).unwrap();

        // One pivot from 26 to 36 in, 26 to 34 out, on a 10 bit stream.
        assert!(sps.same_qp_table_for_chroma_flag);
        assert_eq!(sps.chroma_qp(0, 26), Some(26));
        assert_eq!(sps.chroma_qp(0, 25), Some(25));
        assert_eq!(sps.chroma_qp(0, -12), Some(-12));
        assert_eq!(sps.chroma_qp(0, 31), Some(30));
        assert_eq!(sps.chroma_qp(0, 36), Some(34));
        assert_eq!(sps.chroma_qp(0, 37), Some(35));
        assert_eq!(sps.chroma_qp(0, 63), Some(61));
        assert_eq!(sps.chroma_qp(1, 63), Some(61));
        assert_eq!(sps.chroma_qp(0, 64), None);
        assert_eq!(sps.chroma_qp(0, -13), None);
    }

    #[test]
    fn bitdepth_bounds() {
        let mut w = NaluWriter::new();
        TestSps {
            bitdepth_minus8: 8,
            ..Default::default()
        }
        .write(&mut w);
        assert_eq!(parse(&w).unwrap().bitdepth(), 16);

        let mut w = NaluWriter::new();
        TestSps {
            bitdepth_minus8: 9,
            ..Default::default()
        }
        .write(&mut w);
        assert_eq!(parse(&w).unwrap_err().kind(), ParserResult::BrokenData);
    }

    #[test]
    fn idempotent() {
        let mut w = NaluWriter::new();
        TestSps {
            timing: Some((1, 30)),
            num_ref_pic_lists: 2,
            ..Default::default()
        }
        .write(&mut w);
        let first = parse(&w).unwrap();
        let second = parse(&w).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.num_ref_pic_lists, [2, 2]);
        assert_eq!(first.ref_pic_list_struct[1], first.ref_pic_list_struct[0]);
        assert_eq!(first.ref_pic_list_struct[0][1].delta_poc_val_st[0], -1);
    }

    #[test]
    fn missing_vps() {
        let mut w = NaluWriter::new();
        TestSps {
            vps_id: 3,
            ..Default::default()
        }
        .write(&mut w);
        assert_eq!(parse(&w).unwrap_err().kind(), ParserResult::BrokenLink);
    }

    #[test]
    fn ladf_thresholds() {
        // 10 bits samples: the thresholds are at most 2^10 - 3.
        let mut w = NaluWriter::new();
        TestSps {
            ladf: Some(vec![1021, 5]),
            ..Default::default()
        }
        .write(&mut w);
        let sps = parse(&w).unwrap();
        assert!(sps.ladf_enabled_flag);
        assert_eq!(sps.num_ladf_intervals_minus2, 1);
        assert_eq!(sps.ladf_delta_threshold_minus1[..2], [1021, 5]);

        let mut w = NaluWriter::new();
        TestSps {
            ladf: Some(vec![1022]),
            ..Default::default()
        }
        .write(&mut w);
        assert_eq!(parse(&w).unwrap_err().kind(), ParserResult::BrokenData);
    }

    #[test]
    fn subpicture_grid() {
        // 1920x1080 with 128 samples CTUs is 15x9 CTUs, a 3x3 grid of 5x3
        // subpictures.
        let mut w = NaluWriter::new();
        TestSps {
            subpic_grid: Some((4, 2, 9)),
            ..Default::default()
        }
        .write(&mut w);
        let sps = parse(&w).unwrap();

        assert_eq!(sps.num_subpics_minus1, 8);
        assert_eq!(sps.subpic_ctu_top_left_x, vec![0, 5, 10, 0, 5, 10, 0, 5, 10]);
        assert_eq!(sps.subpic_ctu_top_left_y, vec![0, 0, 0, 3, 3, 3, 6, 6, 6]);
        assert_eq!(sps.subpic_width_minus1, vec![4; 9]);
        assert_eq!(sps.subpic_id, (0..9).collect::<Vec<u32>>());

        // Subpictures 4 CTUs wide do not tile a picture 15 CTUs wide.
        let mut w = NaluWriter::new();
        TestSps {
            subpic_grid: Some((3, 2, 9)),
            ..Default::default()
        }
        .write(&mut w);
        assert_eq!(parse(&w).unwrap_err().kind(), ParserResult::BrokenData);
    }

    #[test]
    fn range_extension_needs_high_bitdepth() {
        let mut w = NaluWriter::new();
        TestSps {
            range_extension: true,
            ..Default::default()
        }
        .write(&mut w);
        assert_eq!(parse(&w).unwrap_err().kind(), ParserResult::BrokenData);

        let mut w = NaluWriter::new();
        TestSps {
            bitdepth_minus8: 4,
            range_extension: true,
            ..Default::default()
        }
        .write(&mut w);
        let sps = parse(&w).unwrap();
        assert!(sps.range_extension_flag);
        assert!(sps.range_extension.extended_precision_flag);
    }
}
