// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Picture parameter set, including the tile and rectangular slice layout.

use std::collections::BTreeMap;

use crate::codec::h266::parser::MAX_SLICES_PER_AU;
use crate::codec::h266::parser::MAX_TILES_PER_AU;
use crate::codec::h266::parser::MAX_TILE_COLUMNS;
use crate::codec::h266::parser::MAX_TILE_ROWS;
use crate::codec::h266::sps::Sps;
use crate::error::broken_data;
use crate::error::broken_link;
use crate::error::ParseResult;
use crate::utils::nalu_reader::NaluReader;

/// A picture parameter set, 7.3.2.5.
///
/// Per-slice arrays are only populated in rectangular slice mode and hold
/// `num_slices_in_pic_minus1 + 1` entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pps {
    pub pps_id: u8,
    pub sps_id: u8,
    pub mixed_nalu_types_in_pic_flag: bool,
    pub pic_width_in_luma_samples: u16,
    pub pic_height_in_luma_samples: u16,
    pub conformance_window_flag: bool,
    pub conf_win_left_offset: u16,
    pub conf_win_right_offset: u16,
    pub conf_win_top_offset: u16,
    pub conf_win_bottom_offset: u16,
    pub scaling_window_explicit_signalling_flag: bool,
    pub scaling_win_left_offset: i32,
    pub scaling_win_right_offset: i32,
    pub scaling_win_top_offset: i32,
    pub scaling_win_bottom_offset: i32,
    pub output_flag_present_flag: bool,
    pub no_pic_partition_flag: bool,
    pub subpic_id_mapping_present_flag: bool,
    pub num_subpics_minus1: u16,
    pub subpic_id_len_minus1: u8,
    pub subpic_id: Vec<u32>,

    pub log2_ctu_size_minus5: u8,
    pub num_exp_tile_columns_minus1: u8,
    pub num_exp_tile_rows_minus1: u16,
    /// Explicit and inferred column widths, `num_tile_columns` entries.
    pub tile_column_width_minus1: Vec<u16>,
    /// Explicit and inferred row heights, `num_tile_rows` entries.
    pub tile_row_height_minus1: Vec<u16>,
    pub loop_filter_across_tiles_enabled_flag: bool,
    pub rect_slice_flag: bool,
    pub single_slice_per_subpic_flag: bool,
    pub num_slices_in_pic_minus1: u16,
    pub tile_idx_delta_present_flag: bool,
    pub slice_width_in_tiles_minus1: Vec<u16>,
    pub slice_height_in_tiles_minus1: Vec<u16>,
    pub num_exp_slices_in_tile: Vec<u16>,
    pub exp_slice_height_in_ctus_minus1: Vec<Vec<u16>>,
    pub tile_idx_delta_val: Vec<i32>,
    pub loop_filter_across_slices_enabled_flag: bool,

    pub cabac_init_present_flag: bool,
    pub num_ref_idx_default_active_minus1: [u8; 2],
    pub rpl1_idx_present_flag: bool,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_flag: bool,
    pub ref_wraparound_enabled_flag: bool,
    pub pic_width_minus_wraparound_offset: u16,
    pub init_qp_minus26: i8,
    pub cu_qp_delta_enabled_flag: bool,
    pub chroma_tool_offsets_present_flag: bool,
    pub cb_qp_offset: i8,
    pub cr_qp_offset: i8,
    pub joint_cbcr_qp_offset_present_flag: bool,
    pub joint_cbcr_qp_offset_value: i8,
    pub slice_chroma_qp_offsets_present_flag: bool,
    pub cu_chroma_qp_offset_list_enabled_flag: bool,
    pub chroma_qp_offset_list_len_minus1: u8,
    pub cb_qp_offset_list: [i8; 6],
    pub cr_qp_offset_list: [i8; 6],
    pub joint_cbcr_qp_offset_list: [i8; 6],
    pub deblocking_filter_control_present_flag: bool,
    pub deblocking_filter_override_enabled_flag: bool,
    pub deblocking_filter_disabled_flag: bool,
    pub dbf_info_in_ph_flag: bool,
    pub luma_beta_offset_div2: i8,
    pub luma_tc_offset_div2: i8,
    pub cb_beta_offset_div2: i8,
    pub cb_tc_offset_div2: i8,
    pub cr_beta_offset_div2: i8,
    pub cr_tc_offset_div2: i8,
    pub rpl_info_in_ph_flag: bool,
    pub sao_info_in_ph_flag: bool,
    pub alf_info_in_ph_flag: bool,
    pub wp_info_in_ph_flag: bool,
    pub qp_delta_info_in_ph_flag: bool,
    pub picture_header_extension_present_flag: bool,
    pub slice_header_extension_present_flag: bool,
    pub extension_flag: bool,

    // Derived values.
    pub width: u32,
    pub height: u32,
    pub crop_rect_width: u32,
    pub crop_rect_height: u32,
    pub crop_rect_x: u32,
    pub crop_rect_y: u32,
    /// PicWidthInCtbsY.
    pub pic_width_in_ctbs_y: u32,
    /// PicHeightInCtbsY.
    pub pic_height_in_ctbs_y: u32,
    /// PicSizeInCtbsY.
    pub pic_size_in_ctbs_y: u32,
    /// NumTileColumns.
    pub num_tile_columns: u32,
    /// NumTileRows.
    pub num_tile_rows: u32,
    /// NumTilesInPic.
    pub num_tiles_in_pic: u32,
    /// TileColBdVal, `num_tile_columns + 1` entries.
    pub tile_col_bd_val: Vec<u32>,
    /// TileRowBdVal, `num_tile_rows + 1` entries.
    pub tile_row_bd_val: Vec<u32>,
    /// SliceTopLeftTileIdx.
    pub slice_top_left_tile_idx: Vec<u32>,
    pub slice_top_left_ctu_x: Vec<u32>,
    pub slice_top_left_ctu_y: Vec<u32>,
    /// SliceHeightInCtusMinus1 + 1.
    pub slice_height_in_ctus: Vec<u32>,
    /// NumSlicesInSubpic, one entry per subpicture.
    pub num_slices_in_subpic: Vec<u16>,
}

/// Reads explicit tile sizes and completes them with the uniform spacing
/// rule, (6-1) to (6-4). Returns the sizes minus 1, one per tile.
fn parse_tile_sizes(
    r: &mut NaluReader,
    num_explicit: usize,
    pic_size_in_ctbs: u32,
    max_tiles: usize,
) -> ParseResult<Vec<u16>> {
    let mut sizes = Vec::with_capacity(num_explicit);
    let mut explicit_size = 0;

    for i in 0..num_explicit {
        let Some(max) = (pic_size_in_ctbs - explicit_size).checked_sub(1) else {
            broken_data!("Explicit tile size {} exceeds the picture", i);
        };

        let size_minus1: u16 = r.read_ue_max(max)?;
        explicit_size += u32::from(size_minus1) + 1;
        sizes.push(size_minus1);
    }

    let mut remaining = pic_size_in_ctbs - explicit_size;
    let uniform = sizes.last().map_or(pic_size_in_ctbs, |size| u32::from(*size) + 1);

    let num_tiles = num_explicit + remaining.div_ceil(uniform) as usize;
    if num_tiles > max_tiles {
        broken_data!("{} tiles exceed the maximum of {}", num_tiles, max_tiles);
    }

    while remaining > uniform {
        sizes.push((uniform - 1) as u16);
        remaining -= uniform;
    }

    if remaining > 0 {
        sizes.push((remaining - 1) as u16);
    }

    Ok(sizes)
}

/// Boundaries of the tiles of `sizes_minus1`, in CTBs.
fn tile_boundaries(sizes_minus1: &[u16]) -> Vec<u32> {
    let mut boundaries = Vec::with_capacity(sizes_minus1.len() + 1);
    boundaries.push(0);
    for size in sizes_minus1 {
        let last = boundaries[boundaries.len() - 1];
        boundaries.push(last + u32::from(*size) + 1);
    }
    boundaries
}

impl Pps {
    /// Parses the RBSP of a PPS NAL unit, header excluded. The referenced
    /// SPS is looked up in `spses`.
    pub(crate) fn parse(r: &mut NaluReader, spses: &BTreeMap<u8, Sps>) -> ParseResult<Pps> {
        log::trace!("parsing \"Picture parameter set\"");

        let mut pps = Pps {
            pps_id: r.read_bits(6)?,
            sps_id: r.read_bits(4)?,
            ..Default::default()
        };

        let Some(sps) = spses.get(&pps.sps_id) else {
            broken_link!("Couldn't find SPS {} referenced by PPS {}", pps.sps_id, pps.pps_id);
        };

        let ctb_size_y = sps.ctb_size_y;
        let min_cb_size_y = 1u32 << sps.min_cb_log2_size_y;
        let sub_width_c = sps.sub_width_c();
        let sub_height_c = sps.sub_height_c();

        pps.mixed_nalu_types_in_pic_flag = r.read_bit()?;
        pps.pic_width_in_luma_samples =
            r.read_ue_bounded(1, u32::from(sps.pic_width_max_in_luma_samples))?;
        pps.pic_height_in_luma_samples =
            r.read_ue_bounded(1, u32::from(sps.pic_height_max_in_luma_samples))?;

        let width = u32::from(pps.pic_width_in_luma_samples);
        let height = u32::from(pps.pic_height_in_luma_samples);
        let same_size_as_sps = pps.pic_width_in_luma_samples == sps.pic_width_max_in_luma_samples
            && pps.pic_height_in_luma_samples == sps.pic_height_max_in_luma_samples;

        if width % min_cb_size_y.max(8) != 0 || height % min_cb_size_y.max(8) != 0 {
            broken_data!(
                "Invalid dimensions: {}x{} not divisible by {}",
                width,
                height,
                min_cb_size_y.max(8)
            );
        }

        if !sps.res_change_in_clvs_allowed_flag && !same_size_as_sps {
            broken_data!(
                "Resolution change is not allowed, SPS is {}x{} while PPS is {}x{}",
                sps.pic_width_max_in_luma_samples,
                sps.pic_height_max_in_luma_samples,
                width,
                height
            );
        }

        if sps.ref_wraparound_enabled_flag
            && ctb_size_y / min_cb_size_y + 1 > (width / min_cb_size_y).saturating_sub(1)
        {
            broken_data!("Picture too narrow for reference wraparound");
        }

        pps.conformance_window_flag = r.read_bit()?;
        if pps.conformance_window_flag && same_size_as_sps {
            broken_data!("pps_conformance_window_flag shall be 0 when the picture has the maximum size");
        }

        if pps.conformance_window_flag {
            pps.conf_win_left_offset = r.read_ue_max(width / sub_width_c)?;
            pps.conf_win_right_offset = r.read_ue_max(width / sub_width_c)?;
            pps.conf_win_top_offset = r.read_ue_max(height / sub_height_c)?;
            pps.conf_win_bottom_offset = r.read_ue_max(height / sub_height_c)?;

            let horizontal =
                u32::from(pps.conf_win_left_offset) + u32::from(pps.conf_win_right_offset);
            let vertical =
                u32::from(pps.conf_win_top_offset) + u32::from(pps.conf_win_bottom_offset);
            if sub_width_c * horizontal >= width || sub_height_c * vertical >= height {
                broken_data!(
                    "Invalid PPS conformance window ({}, {}, {}, {}) for a {}x{} picture",
                    pps.conf_win_left_offset,
                    pps.conf_win_right_offset,
                    pps.conf_win_top_offset,
                    pps.conf_win_bottom_offset,
                    width,
                    height
                );
            }
        } else if same_size_as_sps {
            pps.conf_win_left_offset = sps.conf_win_left_offset;
            pps.conf_win_right_offset = sps.conf_win_right_offset;
            pps.conf_win_top_offset = sps.conf_win_top_offset;
            pps.conf_win_bottom_offset = sps.conf_win_bottom_offset;
        }

        pps.scaling_window_explicit_signalling_flag = r.read_bit()?;
        if pps.scaling_window_explicit_signalling_flag {
            if !sps.ref_pic_resampling_enabled_flag {
                broken_data!("pps_scaling_window_explicit_signalling_flag shall be 0 without reference picture resampling");
            }

            pps.scaling_win_left_offset = r.read_se()?;
            pps.scaling_win_right_offset = r.read_se()?;
            pps.scaling_win_top_offset = r.read_se()?;
            pps.scaling_win_bottom_offset = r.read_se()?;

            let (w, h) = (i64::from(width), i64::from(height));
            let (sw, sh) = (i64::from(sub_width_c), i64::from(sub_height_c));
            let left = i64::from(pps.scaling_win_left_offset);
            let right = i64::from(pps.scaling_win_right_offset);
            let top = i64::from(pps.scaling_win_top_offset);
            let bottom = i64::from(pps.scaling_win_bottom_offset);

            let horizontal_ok = |v: i64| (-w * 15..w).contains(&(v * sw));
            let vertical_ok = |v: i64| (-h * 15..h).contains(&(v * sh));
            if !horizontal_ok(left)
                || !horizontal_ok(right)
                || !horizontal_ok(left + right)
                || !vertical_ok(top)
                || !vertical_ok(bottom)
                || !vertical_ok(top + bottom)
            {
                broken_data!(
                    "Invalid scaling window ({}, {}, {}, {})",
                    left,
                    right,
                    top,
                    bottom
                );
            }
        } else {
            pps.scaling_win_left_offset = i32::from(pps.conf_win_left_offset);
            pps.scaling_win_right_offset = i32::from(pps.conf_win_right_offset);
            pps.scaling_win_top_offset = i32::from(pps.conf_win_top_offset);
            pps.scaling_win_bottom_offset = i32::from(pps.conf_win_bottom_offset);
        }

        pps.output_flag_present_flag = r.read_bit()?;
        pps.no_pic_partition_flag = r.read_bit()?;

        pps.subpic_id_mapping_present_flag = r.read_bit()?;
        if pps.subpic_id_mapping_present_flag {
            if !pps.no_pic_partition_flag {
                pps.num_subpics_minus1 = r.read_ue_max(MAX_SLICES_PER_AU as u32 - 1)?;
                if pps.num_subpics_minus1 != sps.num_subpics_minus1 {
                    broken_data!("pps_num_subpics_minus1 shall be equal to sps_num_subpics_minus1");
                }
            }

            pps.subpic_id_len_minus1 = r.read_ue_max(15)?;
            if pps.subpic_id_len_minus1 != sps.subpic_id_len_minus1 {
                broken_data!("pps_subpic_id_len_minus1 shall be equal to sps_subpic_id_len_minus1");
            }

            let id_len = usize::from(pps.subpic_id_len_minus1) + 1;
            pps.subpic_id = (0..=pps.num_subpics_minus1)
                .map(|_| r.read_bits::<u32>(id_len))
                .collect::<Result<_, _>>()?;
        }

        // (7-34)
        pps.pic_width_in_ctbs_y = width.div_ceil(ctb_size_y);
        pps.pic_height_in_ctbs_y = height.div_ceil(ctb_size_y);
        pps.pic_size_in_ctbs_y = pps.pic_width_in_ctbs_y * pps.pic_height_in_ctbs_y;

        if !pps.no_pic_partition_flag {
            pps.parse_picture_partition(r, sps)?;
        } else {
            pps.log2_ctu_size_minus5 = sps.log2_ctu_size_minus5;
            pps.tile_column_width_minus1 = vec![(pps.pic_width_in_ctbs_y - 1) as u16];
            pps.tile_row_height_minus1 = vec![(pps.pic_height_in_ctbs_y - 1) as u16];
            pps.num_tile_columns = 1;
            pps.num_tile_rows = 1;
            pps.num_tiles_in_pic = 1;
            pps.rect_slice_flag = false;
            pps.tile_col_bd_val = tile_boundaries(&pps.tile_column_width_minus1);
            pps.tile_row_bd_val = tile_boundaries(&pps.tile_row_height_minus1);
        }

        pps.cabac_init_present_flag = r.read_bit()?;
        for i in 0..2 {
            pps.num_ref_idx_default_active_minus1[i] = r.read_ue_max(14)?;
        }

        pps.rpl1_idx_present_flag = r.read_bit()?;
        pps.weighted_pred_flag = r.read_bit()?;
        pps.weighted_bipred_flag = r.read_bit()?;

        pps.ref_wraparound_enabled_flag = r.read_bit()?;
        if pps.ref_wraparound_enabled_flag {
            pps.pic_width_minus_wraparound_offset = r.read_ue_max(
                (width / min_cb_size_y).saturating_sub(ctb_size_y / min_cb_size_y + 2),
            )?;
        }

        let qp_bd_offset = sps.qp_bd_offset();
        pps.init_qp_minus26 = r.read_se_bounded(-(26 + qp_bd_offset), 37)?;
        pps.cu_qp_delta_enabled_flag = r.read_bit()?;

        pps.chroma_tool_offsets_present_flag = r.read_bit()?;
        if pps.chroma_tool_offsets_present_flag {
            pps.cb_qp_offset = r.read_se_bounded(-12, 12)?;
            pps.cr_qp_offset = r.read_se_bounded(-12, 12)?;

            pps.joint_cbcr_qp_offset_present_flag = r.read_bit()?;
            if pps.joint_cbcr_qp_offset_present_flag {
                pps.joint_cbcr_qp_offset_value = r.read_se_bounded(-12, 12)?;
            }

            pps.slice_chroma_qp_offsets_present_flag = r.read_bit()?;

            pps.cu_chroma_qp_offset_list_enabled_flag = r.read_bit()?;
            if pps.cu_chroma_qp_offset_list_enabled_flag {
                pps.chroma_qp_offset_list_len_minus1 = r.read_ue_max(5)?;
                for i in 0..=usize::from(pps.chroma_qp_offset_list_len_minus1) {
                    pps.cb_qp_offset_list[i] = r.read_se_bounded(-12, 12)?;
                    pps.cr_qp_offset_list[i] = r.read_se_bounded(-12, 12)?;
                    if pps.joint_cbcr_qp_offset_present_flag {
                        pps.joint_cbcr_qp_offset_list[i] = r.read_se_bounded(-12, 12)?;
                    }
                }
            }
        }

        pps.deblocking_filter_control_present_flag = r.read_bit()?;
        if pps.deblocking_filter_control_present_flag {
            pps.deblocking_filter_override_enabled_flag = r.read_bit()?;
            pps.deblocking_filter_disabled_flag = r.read_bit()?;

            if !pps.no_pic_partition_flag && pps.deblocking_filter_override_enabled_flag {
                pps.dbf_info_in_ph_flag = r.read_bit()?;
            }

            if !pps.deblocking_filter_disabled_flag {
                pps.luma_beta_offset_div2 = r.read_se_bounded(-12, 12)?;
                pps.luma_tc_offset_div2 = r.read_se_bounded(-12, 12)?;

                if pps.chroma_tool_offsets_present_flag {
                    pps.cb_beta_offset_div2 = r.read_se_bounded(-12, 12)?;
                    pps.cb_tc_offset_div2 = r.read_se_bounded(-12, 12)?;
                    pps.cr_beta_offset_div2 = r.read_se_bounded(-12, 12)?;
                    pps.cr_tc_offset_div2 = r.read_se_bounded(-12, 12)?;
                } else {
                    pps.cb_beta_offset_div2 = pps.luma_beta_offset_div2;
                    pps.cb_tc_offset_div2 = pps.luma_tc_offset_div2;
                    pps.cr_beta_offset_div2 = pps.luma_beta_offset_div2;
                    pps.cr_tc_offset_div2 = pps.luma_tc_offset_div2;
                }
            }
        }

        if !pps.no_pic_partition_flag {
            pps.rpl_info_in_ph_flag = r.read_bit()?;
            pps.sao_info_in_ph_flag = r.read_bit()?;
            pps.alf_info_in_ph_flag = r.read_bit()?;

            if (pps.weighted_pred_flag || pps.weighted_bipred_flag) && pps.rpl_info_in_ph_flag {
                pps.wp_info_in_ph_flag = r.read_bit()?;
            }

            pps.qp_delta_info_in_ph_flag = r.read_bit()?;
        }

        pps.picture_header_extension_present_flag = r.read_bit()?;
        pps.slice_header_extension_present_flag = r.read_bit()?;

        pps.extension_flag = r.read_bit()?;
        if pps.extension_flag {
            log::debug!("Ignoring PPS extension data");
        }

        pps.width = width;
        pps.height = height;
        pps.crop_rect_x = u32::from(pps.conf_win_left_offset) * sub_width_c;
        pps.crop_rect_y = u32::from(pps.conf_win_top_offset) * sub_height_c;
        pps.crop_rect_width = width
            - (u32::from(pps.conf_win_left_offset) + u32::from(pps.conf_win_right_offset))
                * sub_width_c;
        pps.crop_rect_height = height
            - (u32::from(pps.conf_win_top_offset) + u32::from(pps.conf_win_bottom_offset))
                * sub_height_c;

        Ok(pps)
    }

    fn parse_tile_info(&mut self, r: &mut NaluReader) -> ParseResult<()> {
        log::trace!("parsing \"Tile Info\"");

        self.num_exp_tile_columns_minus1 =
            r.read_ue_max((self.pic_width_in_ctbs_y - 1).min(MAX_TILE_COLUMNS as u32 - 1))?;
        self.num_exp_tile_rows_minus1 =
            r.read_ue_max((self.pic_height_in_ctbs_y - 1).min(MAX_TILE_ROWS as u32 - 1))?;

        self.tile_column_width_minus1 = parse_tile_sizes(
            r,
            usize::from(self.num_exp_tile_columns_minus1) + 1,
            self.pic_width_in_ctbs_y,
            MAX_TILE_COLUMNS,
        )?;
        self.tile_row_height_minus1 = parse_tile_sizes(
            r,
            usize::from(self.num_exp_tile_rows_minus1) + 1,
            self.pic_height_in_ctbs_y,
            MAX_TILE_ROWS,
        )?;

        self.num_tile_columns = self.tile_column_width_minus1.len() as u32;
        self.num_tile_rows = self.tile_row_height_minus1.len() as u32;
        self.num_tiles_in_pic = self.num_tile_columns * self.num_tile_rows;
        if self.num_tiles_in_pic as usize > MAX_TILES_PER_AU {
            broken_data!("NumTilesInPic {} exceeds {}", self.num_tiles_in_pic, MAX_TILES_PER_AU);
        }

        if self.num_tiles_in_pic > 1 {
            self.loop_filter_across_tiles_enabled_flag = r.read_bit()?;
            self.rect_slice_flag = r.read_bit()?;
        } else {
            self.loop_filter_across_tiles_enabled_flag = false;
            self.rect_slice_flag = true;
        }

        // (6-3), (6-4)
        self.tile_col_bd_val = tile_boundaries(&self.tile_column_width_minus1);
        self.tile_row_bd_val = tile_boundaries(&self.tile_row_height_minus1);

        Ok(())
    }

    fn parse_picture_partition(&mut self, r: &mut NaluReader, sps: &Sps) -> ParseResult<()> {
        log::trace!("parsing \"Picture Partition\"");

        self.log2_ctu_size_minus5 = r.read_bits(2)?;
        if self.log2_ctu_size_minus5 != sps.log2_ctu_size_minus5 {
            broken_data!("pps_log2_ctu_size_minus5 shall be equal to sps_log2_ctu_size_minus5");
        }

        self.parse_tile_info(r)?;

        if self.rect_slice_flag {
            self.single_slice_per_subpic_flag = r.read_bit()?;
            if self.single_slice_per_subpic_flag {
                self.derive_subpic_slices(sps)?;
            } else {
                self.parse_rect_slices(r)?;
                self.count_slices_in_subpics(sps);
            }
        }

        if !self.rect_slice_flag
            || self.single_slice_per_subpic_flag
            || self.num_slices_in_pic_minus1 > 0
        {
            self.loop_filter_across_slices_enabled_flag = r.read_bit()?;
        }

        Ok(())
    }

    /// Height in CTUs of the tile rows `first..=last`.
    fn rows_height(&self, first: usize, last: usize) -> u32 {
        self.tile_row_height_minus1[first..=last].iter().map(|h| u32::from(*h) + 1).sum()
    }

    fn resize_slices(&mut self, num_slices: usize) {
        self.slice_top_left_tile_idx = vec![0; num_slices];
        self.slice_width_in_tiles_minus1 = vec![0; num_slices];
        self.slice_height_in_tiles_minus1 = vec![0; num_slices];
        self.num_exp_slices_in_tile = vec![0; num_slices];
        self.exp_slice_height_in_ctus_minus1 = vec![vec![]; num_slices];
        self.tile_idx_delta_val = vec![0; num_slices];
        self.slice_top_left_ctu_x = vec![0; num_slices];
        self.slice_top_left_ctu_y = vec![0; num_slices];
        self.slice_height_in_ctus = vec![0; num_slices];
    }

    /// Rectangular slices signalled explicitly, 7.3.2.5 and (6-5) to (6-7).
    fn parse_rect_slices(&mut self, r: &mut NaluReader) -> ParseResult<()> {
        self.num_slices_in_pic_minus1 = r.read_ue_max(MAX_SLICES_PER_AU as u32 - 1)?;
        if self.num_slices_in_pic_minus1 > 1 {
            self.tile_idx_delta_present_flag = r.read_bit()?;
        }

        let last = usize::from(self.num_slices_in_pic_minus1);
        self.resize_slices(last + 1);

        let cols = self.num_tile_columns;
        let rows = self.num_tile_rows;
        let num_tiles = self.num_tiles_in_pic;
        let mut tile_idx = 0u32;
        let mut i = 0;

        while i < last {
            if tile_idx >= num_tiles {
                broken_data!("Slice {} starts after the last tile", i);
            }

            self.slice_top_left_tile_idx[i] = tile_idx;
            let tile_x = tile_idx % cols;
            let tile_y = tile_idx / cols;

            if tile_x != cols - 1 {
                self.slice_width_in_tiles_minus1[i] = r.read_ue_max(cols - 1)?;
            }

            if tile_y != rows - 1 && (self.tile_idx_delta_present_flag || tile_x == 0) {
                self.slice_height_in_tiles_minus1[i] = r.read_ue_max(rows - 1)?;
            } else if tile_y != rows - 1 && i > 0 {
                self.slice_height_in_tiles_minus1[i] = self.slice_height_in_tiles_minus1[i - 1];
            }

            let slice_width = u32::from(self.slice_width_in_tiles_minus1[i]);
            let slice_height = u32::from(self.slice_height_in_tiles_minus1[i]);
            if tile_x + slice_width >= cols || tile_y + slice_height >= rows {
                broken_data!("Slice {} extends past the picture", i);
            }

            let ctu_x = self.tile_col_bd_val[tile_x as usize];
            let mut ctu_y = self.tile_row_bd_val[tile_y as usize];
            let tile_height = u32::from(self.tile_row_height_minus1[tile_y as usize]) + 1;

            if slice_width == 0 && slice_height == 0 && tile_height > 1 {
                // The slice is no bigger than a tile.
                self.num_exp_slices_in_tile[i] = r.read_ue_max(tile_height - 1)?;

                let num_slices_in_tile = if self.num_exp_slices_in_tile[i] == 0 {
                    self.slice_top_left_ctu_x[i] = ctu_x;
                    self.slice_top_left_ctu_y[i] = ctu_y;
                    self.slice_height_in_ctus[i] = tile_height;
                    1
                } else {
                    let mut remaining = tile_height;
                    let mut heights = Vec::with_capacity(usize::from(self.num_exp_slices_in_tile[i]));
                    let mut j = 0;

                    for _ in 0..self.num_exp_slices_in_tile[i] {
                        let height_minus1: u16 = r.read_ue_max(tile_height - 1)?;
                        let height = u32::from(height_minus1) + 1;
                        if i + j > last || height > remaining {
                            broken_data!("Explicit slice heights of slice {} exceed the tile", i);
                        }

                        heights.push(height_minus1);
                        self.slice_height_in_ctus[i + j] = height;
                        self.slice_top_left_ctu_x[i + j] = ctu_x;
                        self.slice_top_left_ctu_y[i + j] = ctu_y;
                        ctu_y += height;
                        remaining -= height;
                        j += 1;
                    }

                    let uniform = heights.last().map_or(tile_height, |h| u32::from(*h) + 1);
                    while remaining > 0 {
                        if i + j > last {
                            broken_data!("Too many slices: {}", i + j + 1);
                        }

                        let height = remaining.min(uniform);
                        self.slice_height_in_ctus[i + j] = height;
                        self.slice_top_left_ctu_x[i + j] = ctu_x;
                        self.slice_top_left_ctu_y[i + j] = ctu_y;
                        ctu_y += height;
                        remaining -= height;
                        j += 1;
                    }

                    self.exp_slice_height_in_ctus_minus1[i] = heights;
                    j
                };

                for k in 1..num_slices_in_tile {
                    self.slice_top_left_tile_idx[i + k] = tile_idx;
                }

                i += num_slices_in_tile - 1;
            } else {
                // The slice spans whole tiles.
                self.slice_height_in_ctus[i] =
                    self.rows_height(tile_y as usize, (tile_y + slice_height) as usize);
                self.slice_top_left_ctu_x[i] = ctu_x;
                self.slice_top_left_ctu_y[i] = ctu_y;
            }

            if i < last {
                if self.tile_idx_delta_present_flag {
                    let max = num_tiles as i32 - 1;
                    self.tile_idx_delta_val[i] = r.read_se_bounded(-max, max)?;
                    if self.tile_idx_delta_val[i] == 0 {
                        broken_data!("pps_tile_idx_delta_val[{}] shall not be 0", i);
                    }

                    let next = tile_idx as i64 + i64::from(self.tile_idx_delta_val[i]);
                    if next < 0 {
                        broken_data!("Slice {} starts before the first tile", i + 1);
                    }
                    tile_idx = next as u32;
                } else {
                    tile_idx += slice_width + 1;
                    if tile_idx % cols == 0 {
                        tile_idx += slice_height * cols;
                    }
                }
            }

            i += 1;
        }

        if i == last {
            // The last slice covers whatever is left.
            if tile_idx >= num_tiles {
                broken_data!("Last slice starts after the last tile");
            }

            let tile_x = tile_idx % cols;
            let tile_y = tile_idx / cols;
            self.slice_top_left_tile_idx[i] = tile_idx;
            self.slice_top_left_ctu_x[i] = self.tile_col_bd_val[tile_x as usize];
            self.slice_top_left_ctu_y[i] = self.tile_row_bd_val[tile_y as usize];
            self.slice_width_in_tiles_minus1[i] = (cols - tile_x - 1) as u16;
            self.slice_height_in_tiles_minus1[i] = (rows - tile_y - 1) as u16;
            self.slice_height_in_ctus[i] = self.rows_height(tile_y as usize, rows as usize - 1);
            self.num_exp_slices_in_tile[i] = 0;
        }

        Ok(())
    }

    /// NumSlicesInSubpic for explicitly signalled slices.
    fn count_slices_in_subpics(&mut self, sps: &Sps) {
        self.num_slices_in_subpic = (0..=usize::from(sps.num_subpics_minus1))
            .map(|i| {
                let left = u32::from(sps.subpic_ctu_top_left_x[i]);
                let top = u32::from(sps.subpic_ctu_top_left_y[i]);
                let right = left + u32::from(sps.subpic_width_minus1[i]) + 1;
                let bottom = top + u32::from(sps.subpic_height_minus1[i]) + 1;

                self.slice_top_left_ctu_x
                    .iter()
                    .zip(&self.slice_top_left_ctu_y)
                    .filter(|(x, y)| (left..right).contains(*x) && (top..bottom).contains(*y))
                    .count() as u16
            })
            .collect();
    }

    /// One slice per subpicture, each made of the tiles starting inside the
    /// subpicture.
    fn derive_subpic_slices(&mut self, sps: &Sps) -> ParseResult<()> {
        self.num_slices_in_pic_minus1 = sps.num_subpics_minus1;
        let num_subpics = usize::from(sps.num_subpics_minus1) + 1;
        self.resize_slices(num_subpics);
        self.num_slices_in_subpic = vec![1; num_subpics];

        for i in 0..num_subpics {
            let left = u32::from(sps.subpic_ctu_top_left_x[i]);
            let top = u32::from(sps.subpic_ctu_top_left_y[i]);
            let right = left + u32::from(sps.subpic_width_minus1[i]) + 1;
            let bottom = top + u32::from(sps.subpic_height_minus1[i]) + 1;

            let mut start = None;
            for tile_y in 0..self.num_tile_rows {
                for tile_x in 0..self.num_tile_columns {
                    let x = self.tile_col_bd_val[tile_x as usize];
                    let y = self.tile_row_bd_val[tile_y as usize];
                    if !(left..right).contains(&x) || !(top..bottom).contains(&y) {
                        continue;
                    }

                    let (start_x, start_y) = *start.get_or_insert((tile_x, tile_y));
                    self.slice_width_in_tiles_minus1[i] = (tile_x - start_x) as u16;
                    self.slice_height_in_tiles_minus1[i] = (tile_y - start_y) as u16;
                }
            }

            let Some((start_x, start_y)) = start else {
                broken_data!(
                    "No tile found for subpicture {} at ({}, {}), size {}x{} CTUs",
                    i,
                    left,
                    top,
                    right - left,
                    bottom - top
                );
            };

            self.slice_top_left_tile_idx[i] = start_x + start_y * self.num_tile_columns;
            self.slice_top_left_ctu_x[i] = left;
            self.slice_top_left_ctu_y[i] = top;
            self.slice_height_in_ctus[i] = bottom - top;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::h266::parser::NaluType;
    use crate::codec::h266::test_utils::NaluWriter;
    use crate::codec::h266::test_utils::TestPps;
    use crate::codec::h266::test_utils::TestSps;
    use crate::error::ParserResult;

    fn spses(sps: TestSps) -> BTreeMap<u8, Sps> {
        let mut w = NaluWriter::new();
        sps.write(&mut w);
        let nal = w.nal(NaluType::Sps, 0, 0);
        let sps = Sps::parse(&mut NaluReader::new(&nal[2..]), 0, &BTreeMap::new()).unwrap();
        BTreeMap::from([(sps.sps_id, sps)])
    }

    fn parse(pps: TestPps, spses: &BTreeMap<u8, Sps>) -> ParseResult<Pps> {
        let mut w = NaluWriter::new();
        pps.write(&mut w);
        let nal = w.nal(NaluType::Pps, 0, 0);
        Pps::parse(&mut NaluReader::new(&nal[2..]), spses)
    }

    #[test]
    fn no_pic_partition() {
        let spses = spses(TestSps::default());
        let pps = parse(TestPps::default(), &spses).unwrap();

        assert!(pps.no_pic_partition_flag);
        assert!(!pps.rect_slice_flag);
        assert_eq!(pps.num_tiles_in_pic, 1);
        assert_eq!((pps.pic_width_in_ctbs_y, pps.pic_height_in_ctbs_y), (15, 9));
        assert_eq!(pps.pic_size_in_ctbs_y, 135);
        assert_eq!(pps.tile_col_bd_val, vec![0, 15]);
        assert_eq!(pps.tile_row_bd_val, vec![0, 9]);
        assert_eq!((pps.crop_rect_width, pps.crop_rect_height), (1920, 1080));
    }

    #[test]
    fn missing_sps() {
        let err = parse(TestPps::default(), &BTreeMap::new()).unwrap_err();
        assert_eq!(err.kind(), ParserResult::BrokenLink);
    }

    #[test]
    fn uniform_tiles() {
        let spses = spses(TestSps::default());
        // One explicit 4 CTUs wide column, the rest uniformly spaced. One
        // explicit 3 CTUs high row.
        let pps = parse(
            TestPps {
                tiles: Some((vec![3], vec![2])),
                ..Default::default()
            },
            &spses,
        )
        .unwrap();

        assert_eq!(pps.tile_column_width_minus1, vec![3, 3, 3, 2]);
        assert_eq!(pps.tile_row_height_minus1, vec![2, 2, 2]);
        assert_eq!(pps.tile_col_bd_val, vec![0, 4, 8, 12, 15]);
        assert_eq!(pps.tile_row_bd_val, vec![0, 3, 6, 9]);
        assert_eq!(pps.num_tiles_in_pic, 12);
        assert!(!pps.rect_slice_flag);
    }

    #[test]
    fn explicit_tile_wider_than_picture() {
        let spses = spses(TestSps::default());
        let err = parse(
            TestPps {
                tiles: Some((vec![15], vec![8])),
                ..Default::default()
            },
            &spses,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ParserResult::BrokenData);
    }

    #[test]
    fn slices_in_a_single_tile() {
        let spses = spses(TestSps::default());
        // A single tile split into an explicit 2 CTUs slice, then 2 + 2 +
        // 2 + 1 CTUs slices.
        let pps = parse(
            TestPps {
                tiles: Some((vec![14], vec![8])),
                rect_slices_in_tile: Some((4, vec![1])),
                ..Default::default()
            },
            &spses,
        )
        .unwrap();

        assert!(pps.rect_slice_flag);
        assert_eq!(pps.num_slices_in_pic_minus1, 4);
        assert_eq!(pps.slice_height_in_ctus, vec![2, 2, 2, 2, 1]);
        assert_eq!(pps.slice_top_left_ctu_y, vec![0, 2, 4, 6, 8]);
        assert_eq!(pps.slice_top_left_tile_idx, vec![0; 5]);
        assert_eq!(pps.num_slices_in_subpic, vec![5]);
    }

    #[test]
    fn too_many_slices_in_tile() {
        let spses = spses(TestSps::default());
        // 9 CTU rows in slices of 2 need 5 slices, only 3 are declared.
        let err = parse(
            TestPps {
                tiles: Some((vec![14], vec![8])),
                rect_slices_in_tile: Some((2, vec![1])),
                ..Default::default()
            },
            &spses,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ParserResult::BrokenData);
    }

    #[test]
    fn conformance_window_from_sps() {
        let spses = spses(TestSps {
            height: 1088,
            conf_win: Some([0, 0, 0, 4]),
            ..Default::default()
        });
        let pps = parse(
            TestPps {
                height: 1088,
                ..Default::default()
            },
            &spses,
        )
        .unwrap();

        assert!(!pps.conformance_window_flag);
        assert_eq!(pps.conf_win_bottom_offset, 4);
        assert_eq!(pps.crop_rect_height, 1080);
        assert_eq!(pps.scaling_win_bottom_offset, 4);
    }

    #[test]
    fn resolution_change_not_allowed() {
        let spses = spses(TestSps::default());
        let err = parse(
            TestPps {
                width: 1280,
                height: 720,
                ..Default::default()
            },
            &spses,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ParserResult::BrokenData);
    }

    #[test]
    fn init_qp_bounds() {
        // QpBdOffset is 12 on 10 bit streams.
        let spses = spses(TestSps::default());
        let pps = parse(
            TestPps {
                init_qp_minus26: -38,
                ..Default::default()
            },
            &spses,
        )
        .unwrap();
        assert_eq!(pps.init_qp_minus26, -38);

        let err = parse(
            TestPps {
                init_qp_minus26: -39,
                ..Default::default()
            },
            &spses,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ParserResult::BrokenData);
    }
}
