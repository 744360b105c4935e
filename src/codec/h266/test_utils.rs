// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Helpers to assemble H.266 NAL units field by field in unit tests.

use std::io::Cursor;

use crate::codec::h266::parser::Nalu;
use crate::codec::h266::parser::NaluType;
use crate::codec::h266::rpl::ceil_log2;

/// An in-memory MSB-first bit writer with the H.266 `f(n)`, `ue(v)` and
/// `se(v)` descriptors.
#[derive(Default)]
pub struct NaluWriter {
    bytes: Vec<u8>,
    curr: u8,
    num_bits: usize,
}

impl NaluWriter {
    pub fn new() -> Self {
        Default::default()
    }

    /// Writes `bits` bits of `value`. Corresponds to `f(n)` and `u(n)`.
    pub fn write_f<T: Into<u64>>(&mut self, bits: usize, value: T) -> &mut Self {
        let value = value.into();
        for i in (0..bits).rev() {
            self.push_bit((value >> i) & 1 == 1);
        }
        self
    }

    pub fn write_flag(&mut self, flag: bool) -> &mut Self {
        self.push_bit(flag);
        self
    }

    /// Writes a number in exponential golumb format.
    fn write_exp_golumb(&mut self, value: u64) -> &mut Self {
        let value = value + 1;
        let bits = 64 - value.leading_zeros() as usize;
        let zeros = bits - 1;

        self.write_f(zeros, 0u32);
        self.write_f(bits, value)
    }

    /// Corresponds to `ue(v)`.
    pub fn write_ue<T: Into<u64>>(&mut self, value: T) -> &mut Self {
        self.write_exp_golumb(value.into())
    }

    /// Corresponds to `se(v)`.
    pub fn write_se<T: Into<i64>>(&mut self, value: T) -> &mut Self {
        let value: i64 = value.into();
        let abs_value = value.unsigned_abs();

        if value <= 0 {
            self.write_exp_golumb(2 * abs_value)
        } else {
            self.write_exp_golumb(2 * abs_value - 1)
        }
    }

    /// Writes zero bits until the next byte boundary.
    pub fn align(&mut self) -> &mut Self {
        while self.num_bits != 0 {
            self.push_bit(false);
        }
        self
    }

    pub fn aligned(&self) -> bool {
        self.num_bits == 0
    }

    /// Writes `rbsp_trailing_bits()`.
    pub fn trailing_bits(&mut self) -> &mut Self {
        self.push_bit(true);
        self.align()
    }

    /// Returns the RBSP written so far, padded to a byte boundary.
    pub fn rbsp(&self) -> Vec<u8> {
        let mut out = self.bytes.clone();
        if self.num_bits != 0 {
            out.push(self.curr << (8 - self.num_bits));
        }
        out
    }

    /// Returns the NAL unit made of a header and of the escaped RBSP.
    pub fn nal(&self, type_: NaluType, layer_id: u8, temporal_id: u8) -> Vec<u8> {
        let mut out = vec![layer_id & 0x3f, ((type_ as u8) << 3) | ((temporal_id + 1) & 0x7)];
        let mut zeros = 0;

        for byte in self.rbsp() {
            if zeros >= 2 && byte <= 0x03 {
                out.push(0x03);
                zeros = 0;
            }

            zeros = if byte == 0 { zeros + 1 } else { 0 };
            out.push(byte);
        }

        out
    }

    fn push_bit(&mut self, bit: bool) {
        self.curr = (self.curr << 1) | u8::from(bit);
        self.num_bits += 1;
        if self.num_bits == 8 {
            self.bytes.push(self.curr);
            self.curr = 0;
            self.num_bits = 0;
        }
    }
}

/// Prefixes every NAL unit with a 4-byte start code.
pub fn annexb(nals: &[Vec<u8>]) -> Vec<u8> {
    let mut out = vec![];
    for nal in nals {
        out.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
        out.extend_from_slice(nal);
    }
    out
}

/// Frames a single NAL unit stored in `data` as produced by [`annexb`].
pub fn framed(data: &[u8]) -> Nalu {
    let mut cursor = Cursor::new(data);
    Nalu::next_unchecked(&mut cursor).unwrap()
}

/// Writes a `profile_tier_level()` with profile and tier present, no
/// constraints info, no sublayer levels and no sub-profiles.
pub fn write_ptl(w: &mut NaluWriter, profile_idc: u8, level_idc: u8, max_sublayers_minus1: u8) {
    w.write_f(7, profile_idc)
        .write_flag(false) // tier
        .write_f(8, level_idc)
        .write_flag(true) // frame_only_constraint_flag
        .write_flag(false) // multilayer_enabled_flag
        .write_flag(false) // gci_present_flag
        .align();
    for _ in 0..max_sublayers_minus1 {
        w.write_flag(false);
    }
    w.align().write_f(8, 0u8);
}

/// Knobs for [`TestSps::write`], which emits a 4:2:0 single layer SPS with
/// every optional tool disabled unless asked for.
#[derive(Clone, Debug)]
pub struct TestSps {
    pub sps_id: u8,
    pub vps_id: u8,
    pub width: u32,
    pub height: u32,
    pub log2_ctu_size_minus5: u8,
    pub bitdepth_minus8: u8,
    /// Left, right, top and bottom offsets.
    pub conf_win: Option<[u32; 4]>,
    /// Same size subpictures: width and height in CTUs minus 1, and count.
    pub subpic_grid: Option<(u32, u32, u32)>,
    pub entropy_coding_sync: bool,
    pub entry_point_offsets: bool,
    pub alf: bool,
    pub lmcs: bool,
    pub long_term_ref_pics: bool,
    /// List 0 is empty, the others hold one entry with a POC delta of -1.
    pub num_ref_pic_lists: u8,
    /// `num_units_in_tick` and `time_scale`.
    pub timing: Option<(u32, u32)>,
    pub range_extension: bool,
    /// `ladf_delta_threshold_minus1` of each interval but the first.
    pub ladf: Option<Vec<u32>>,
}

impl Default for TestSps {
    fn default() -> Self {
        Self {
            sps_id: 0,
            vps_id: 0,
            width: 1920,
            height: 1080,
            log2_ctu_size_minus5: 2,
            bitdepth_minus8: 2,
            conf_win: None,
            subpic_grid: None,
            entropy_coding_sync: false,
            entry_point_offsets: false,
            alf: false,
            lmcs: false,
            long_term_ref_pics: false,
            num_ref_pic_lists: 0,
            timing: None,
            range_extension: false,
            ladf: None,
        }
    }
}

impl TestSps {
    pub fn write(&self, w: &mut NaluWriter) {
        w.write_f(4, self.sps_id)
            .write_f(4, self.vps_id)
            .write_f(3, 0u8) // max_sublayers_minus1
            .write_f(2, 1u8) // chroma_format_idc
            .write_f(2, self.log2_ctu_size_minus5)
            .write_flag(true); // ptl_dpb_hrd_params_present_flag
        write_ptl(w, 1, 67, 0);

        w.write_flag(false) // gdr_enabled_flag
            .write_flag(false) // ref_pic_resampling_enabled_flag
            .write_ue(self.width)
            .write_ue(self.height);

        match self.conf_win {
            Some(offsets) => {
                w.write_flag(true);
                for offset in offsets {
                    w.write_ue(offset);
                }
            }
            None => {
                w.write_flag(false);
            }
        }

        match self.subpic_grid {
            Some((width_minus1, height_minus1, count)) => {
                let ctb_size = 1u32 << (self.log2_ctu_size_minus5 + 5);
                let width_in_ctbs = (self.width + ctb_size - 1) / ctb_size;
                let height_in_ctbs = (self.height + ctb_size - 1) / ctb_size;
                w.write_flag(true)
                    .write_ue(count - 1)
                    .write_flag(true) // independent_subpics_flag
                    .write_flag(true) // subpic_same_size_flag
                    .write_f(ceil_log2(width_in_ctbs), width_minus1)
                    .write_f(ceil_log2(height_in_ctbs), height_minus1)
                    .write_ue(ceil_log2(count).saturating_sub(1) as u32)
                    .write_flag(false); // subpic_id_mapping_explicitly_signalled_flag
            }
            None => {
                w.write_flag(false);
            }
        }

        w.write_ue(self.bitdepth_minus8)
            .write_flag(self.entropy_coding_sync)
            .write_flag(self.entry_point_offsets)
            .write_f(4, 4u8) // log2_max_pic_order_cnt_lsb_minus4
            .write_flag(false) // poc_msb_cycle_flag
            .write_f(2, 0u8) // num_extra_ph_bytes
            .write_f(2, 0u8); // num_extra_sh_bytes

        // dpb_parameters()
        w.write_ue(4u32).write_ue(0u32).write_ue(0u32);

        w.write_ue(0u32) // log2_min_luma_coding_block_size_minus2
            .write_flag(false) // partition_constraints_override_enabled_flag
            .write_ue(1u32) // log2_diff_min_qt_min_cb_intra_slice_luma
            .write_ue(0u32) // max_mtt_hierarchy_depth_intra_slice_luma
            .write_flag(false) // qtbtt_dual_tree_intra_flag
            .write_ue(1u32) // log2_diff_min_qt_min_cb_inter_slice
            .write_ue(0u32); // max_mtt_hierarchy_depth_inter_slice
        if self.log2_ctu_size_minus5 > 0 {
            w.write_flag(false); // max_luma_transform_size_64_flag
        }
        w.write_flag(false) // transform_skip_enabled_flag
            .write_flag(false) // mts_enabled_flag
            .write_flag(false); // lfnst_enabled_flag

        // One chroma QP table pivot, 26 -> 26 and 36 -> 34.
        w.write_flag(false) // joint_cbcr_enabled_flag
            .write_flag(true) // same_qp_table_for_chroma_flag
            .write_se(0)
            .write_ue(0u32)
            .write_ue(9u32)
            .write_ue(1u32);

        w.write_flag(false) // sao_enabled_flag
            .write_flag(self.alf);
        if self.alf {
            w.write_flag(false); // ccalf_enabled_flag
        }
        w.write_flag(self.lmcs)
            .write_flag(false) // weighted_pred_flag
            .write_flag(false) // weighted_bipred_flag
            .write_flag(self.long_term_ref_pics);
        if self.vps_id > 0 {
            w.write_flag(false); // inter_layer_prediction_enabled_flag
        }
        w.write_flag(false) // idr_rpl_present_flag
            .write_flag(true) // rpl1_same_as_rpl0_flag
            .write_ue(self.num_ref_pic_lists);
        for j in 0..self.num_ref_pic_lists {
            let num_ref_entries = u32::from(j > 0);
            w.write_ue(num_ref_entries);
            if self.long_term_ref_pics && num_ref_entries > 0 {
                w.write_flag(false); // ltrp_in_header_flag
            }
            if num_ref_entries > 0 {
                if self.long_term_ref_pics {
                    w.write_flag(true); // st_ref_pic_flag
                }
                w.write_ue(0u32).write_flag(true);
            }
        }

        w.write_flag(false) // ref_wraparound_enabled_flag
            .write_flag(false) // temporal_mvp_enabled_flag
            .write_flag(false) // amvr_enabled_flag
            .write_flag(false) // bdof_enabled_flag
            .write_flag(false) // smvd_enabled_flag
            .write_flag(false) // dmvr_enabled_flag
            .write_flag(false) // mmvd_enabled_flag
            .write_ue(0u32) // six_minus_max_num_merge_cand
            .write_flag(false) // sbt_enabled_flag
            .write_flag(false) // affine_enabled_flag
            .write_flag(false) // bcw_enabled_flag
            .write_flag(false) // ciip_enabled_flag
            .write_flag(false) // gpm_enabled_flag
            .write_ue(0u32) // log2_parallel_merge_level_minus2
            .write_flag(false) // isp_enabled_flag
            .write_flag(false) // mrl_enabled_flag
            .write_flag(false) // mip_enabled_flag
            .write_flag(false) // cclm_enabled_flag
            .write_flag(true) // chroma_horizontal_collocated_flag
            .write_flag(true) // chroma_vertical_collocated_flag
            .write_flag(false) // palette_enabled_flag
            .write_flag(false); // ibc_enabled_flag
        match &self.ladf {
            Some(thresholds) => {
                w.write_flag(true)
                    .write_f(2, thresholds.len() as u32 - 1)
                    .write_se(0i32); // ladf_lowest_interval_qp_offset
                for threshold in thresholds {
                    w.write_se(0i32).write_ue(*threshold);
                }
            }
            None => {
                w.write_flag(false);
            }
        }
        w.write_flag(false) // explicit_scaling_list_enabled_flag
            .write_flag(false) // dep_quant_enabled_flag
            .write_flag(false) // sign_data_hiding_enabled_flag
            .write_flag(false); // virtual_boundaries_enabled_flag

        match self.timing {
            Some((num_units_in_tick, time_scale)) => {
                w.write_flag(true)
                    .write_f(32, num_units_in_tick)
                    .write_f(32, time_scale)
                    .write_flag(false) // general_nal_hrd_params_present_flag
                    .write_flag(false) // general_vcl_hrd_params_present_flag
                    .write_flag(true) // fixed_pic_rate_general_flag
                    .write_ue(0u32); // elemental_duration_in_tc_minus1
            }
            None => {
                w.write_flag(false);
            }
        }

        w.write_flag(false) // field_seq_flag
            .write_flag(false); // vui_parameters_present_flag

        if self.range_extension {
            w.write_flag(true) // extension_flag
                .write_flag(true) // range_extension_flag
                .write_f(7, 0u8)
                .write_flag(true) // extended_precision_flag
                .write_flag(false)
                .write_flag(false)
                .write_flag(false);
        } else {
            w.write_flag(false);
        }

        w.trailing_bits();
    }
}

/// Knobs for [`TestPps::write`]. Without `tiles` the picture is not
/// partitioned.
#[derive(Clone, Debug)]
pub struct TestPps {
    pub pps_id: u8,
    pub sps_id: u8,
    pub width: u32,
    pub height: u32,
    /// Explicit tile column widths and row heights, minus 1.
    pub tiles: Option<(Vec<u32>, Vec<u32>)>,
    /// For a single tile picture: `num_slices_in_pic_minus1` and the
    /// explicit slice heights minus 1 of the tile.
    pub rect_slices_in_tile: Option<(u32, Vec<u32>)>,
    pub num_ref_idx_default_active_minus1: [u32; 2],
    pub init_qp_minus26: i32,
    pub rpl_info_in_ph: bool,
    pub sao_info_in_ph: bool,
    pub alf_info_in_ph: bool,
    pub qp_delta_info_in_ph: bool,
}

impl Default for TestPps {
    fn default() -> Self {
        Self {
            pps_id: 0,
            sps_id: 0,
            width: 1920,
            height: 1080,
            tiles: None,
            rect_slices_in_tile: None,
            num_ref_idx_default_active_minus1: [0, 0],
            init_qp_minus26: 0,
            rpl_info_in_ph: false,
            sao_info_in_ph: false,
            alf_info_in_ph: false,
            qp_delta_info_in_ph: false,
        }
    }
}

impl TestPps {
    pub fn write(&self, w: &mut NaluWriter) {
        let partitioned = self.tiles.is_some();

        w.write_f(6, self.pps_id)
            .write_f(4, self.sps_id)
            .write_flag(false) // mixed_nalu_types_in_pic_flag
            .write_ue(self.width)
            .write_ue(self.height)
            .write_flag(false) // conformance_window_flag
            .write_flag(false) // scaling_window_explicit_signalling_flag
            .write_flag(false) // output_flag_present_flag
            .write_flag(!partitioned)
            .write_flag(false); // subpic_id_mapping_present_flag

        if let Some((columns, rows)) = &self.tiles {
            w.write_f(2, 2u8) // log2_ctu_size_minus5
                .write_ue(columns.len() as u32 - 1)
                .write_ue(rows.len() as u32 - 1);
            for width in columns {
                w.write_ue(*width);
            }
            for height in rows {
                w.write_ue(*height);
            }

            let width_in_ctbs = self.width.div_ceil(128);
            let height_in_ctbs = self.height.div_ceil(128);
            let num_tiles = width_in_ctbs.div_ceil(columns[0] + 1)
                * height_in_ctbs.div_ceil(rows[0] + 1);
            if num_tiles > 1 {
                w.write_flag(false) // loop_filter_across_tiles_enabled_flag
                    .write_flag(false); // rect_slice_flag
            } else {
                match &self.rect_slices_in_tile {
                    Some((num_slices_minus1, heights)) => {
                        w.write_flag(false) // single_slice_per_subpic_flag
                            .write_ue(*num_slices_minus1);
                        if *num_slices_minus1 > 1 {
                            w.write_flag(false); // tile_idx_delta_present_flag
                        }
                        w.write_ue(heights.len() as u32);
                        for height in heights {
                            w.write_ue(*height);
                        }
                    }
                    None => {
                        w.write_flag(true); // single_slice_per_subpic_flag
                    }
                }
            }

            w.write_flag(false); // loop_filter_across_slices_enabled_flag
        }

        w.write_flag(false) // cabac_init_present_flag
            .write_ue(self.num_ref_idx_default_active_minus1[0])
            .write_ue(self.num_ref_idx_default_active_minus1[1])
            .write_flag(false) // rpl1_idx_present_flag
            .write_flag(false) // weighted_pred_flag
            .write_flag(false) // weighted_bipred_flag
            .write_flag(false) // ref_wraparound_enabled_flag
            .write_se(self.init_qp_minus26)
            .write_flag(false) // cu_qp_delta_enabled_flag
            .write_flag(false) // chroma_tool_offsets_present_flag
            .write_flag(false); // deblocking_filter_control_present_flag

        if partitioned {
            w.write_flag(self.rpl_info_in_ph)
                .write_flag(self.sao_info_in_ph)
                .write_flag(self.alf_info_in_ph)
                .write_flag(self.qp_delta_info_in_ph);
        }

        w.write_flag(false) // picture_header_extension_present_flag
            .write_flag(false) // slice_header_extension_present_flag
            .write_flag(false) // extension_flag
            .trailing_bits();
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::nalu_reader::NaluReader;

    #[test]
    fn simple_bits() {
        let mut writer = NaluWriter::new();
        writer
            .write_flag(true)
            .write_f(3, 0u8)
            .write_f(4, 0xfu8);
        assert_eq!(writer.rbsp(), vec![0b10001111u8]);
    }

    #[test]
    fn simple_first_few_ue() {
        fn single_ue(value: u32) -> Vec<u8> {
            let mut writer = NaluWriter::new();
            writer.write_ue(value);
            writer.rbsp()
        }

        assert_eq!(single_ue(0), vec![0b10000000u8]);
        assert_eq!(single_ue(1), vec![0b01000000u8]);
        assert_eq!(single_ue(2), vec![0b01100000u8]);
        assert_eq!(single_ue(3), vec![0b00100000u8]);
        assert_eq!(single_ue(7), vec![0b00010000u8]);
        assert_eq!(single_ue(9), vec![0b00010100u8]);
    }

    #[test]
    fn escaped_nal() {
        let mut writer = NaluWriter::new();
        writer.write_f(24, 0x000001u32).write_ue(10u32).write_se(-42).trailing_bits();

        let nal = writer.nal(NaluType::Sps, 0, 0);
        assert_eq!(&nal[..6], &[0x00, 0x79, 0x00, 0x00, 0x03, 0x01]);

        let mut reader = NaluReader::new(&nal[2..]);
        assert_eq!(reader.read_bits::<u32>(24).unwrap(), 1);
        assert_eq!(reader.read_ue::<u32>().unwrap(), 10);
        assert_eq!(reader.read_se::<i32>().unwrap(), -42);
        assert!(!reader.has_more_rbsp_data());
    }
}
