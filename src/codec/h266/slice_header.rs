// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use enumn::N;

use crate::codec::h266::ctb_map::CtbMap;
use crate::codec::h266::parser::NaluType;
use crate::codec::h266::picture_header::AlfInfo;
use crate::codec::h266::picture_header::DeblockingParams;
use crate::codec::h266::picture_header::PictureHeader;
use crate::codec::h266::pps::Pps;
use crate::codec::h266::pred_weight_table::PredWeightTable;
use crate::codec::h266::rpl::ceil_log2;
use crate::codec::h266::rpl::RefPicLists;
use crate::codec::h266::sps::Sps;
use crate::error::broken_data;
use crate::error::ParseResult;
use crate::utils::nalu_reader::NaluReader;

#[derive(N, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum SliceType {
    B = 0,
    P = 1,
    #[default]
    I = 2,
}

impl SliceType {
    pub fn is_b(&self) -> bool {
        matches!(self, SliceType::B)
    }

    pub fn is_p(&self) -> bool {
        matches!(self, SliceType::P)
    }

    pub fn is_i(&self) -> bool {
        matches!(self, SliceType::I)
    }
}

/// `slice_header()`, 7.3.7.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SliceHeader {
    pub picture_header_in_slice_header_flag: bool,
    /// The picture header this slice belongs to, either embedded in the slice
    /// header or the last picture header NAL unit.
    pub picture_header: PictureHeader,
    pub subpic_id: u32,
    pub slice_address: u32,
    pub extra_bit: Vec<bool>,
    pub num_tiles_in_slice_minus1: u32,
    pub slice_type: SliceType,
    pub no_output_of_prior_pics_flag: bool,
    pub alf: AlfInfo,
    pub lmcs_used_flag: bool,
    pub explicit_scaling_list_used_flag: bool,
    pub ref_pic_lists: RefPicLists,
    pub num_ref_idx_active_override_flag: bool,
    pub num_ref_idx_active_minus1: [u8; 2],
    pub cabac_init_flag: bool,
    pub collocated_from_l0_flag: bool,
    pub collocated_ref_idx: u8,
    pub pred_weight_table: PredWeightTable,
    pub qp_delta: i8,
    pub cb_qp_offset: i8,
    pub cr_qp_offset: i8,
    pub joint_cbcr_qp_offset: i8,
    pub cu_chroma_qp_offset_enabled_flag: bool,
    pub sao_luma_used_flag: bool,
    pub sao_chroma_used_flag: bool,
    pub deblocking: DeblockingParams,
    pub dep_quant_used_flag: bool,
    pub sign_data_hiding_used_flag: bool,
    pub ts_residual_coding_disabled_flag: bool,
    pub ts_residual_coding_rice_idx_minus1: u8,
    pub reverse_last_sig_coeff_flag: bool,
    pub extension_data_byte: Vec<u8>,
    pub entry_offset_len_minus1: u8,
    pub entry_point_offset_minus1: Vec<u32>,

    // Derived values.
    /// CurrSubpicIdx.
    pub curr_subpic_idx: u16,
    /// NumRefIdxActive.
    pub num_ref_idx_active: [u8; 2],
    /// SliceQpY.
    pub slice_qp_y: i32,
    /// CtbAddrInCurrSlice, raster scan addresses of the CTBs of the slice
    /// in decoding order.
    pub ctb_addr_in_slice: Vec<u32>,
    /// Index in `ctb_addr_in_slice` of the first CTB of every entry point
    /// but the first one.
    pub entry_point_start_ctu: Vec<u32>,
    /// Size of the slice header in bits, NAL unit header excluded and
    /// emulation prevention bytes included.
    pub header_size: usize,
    /// Number of emulation prevention bytes in the slice header.
    pub n_emulation_prevention_bytes: usize,
}

impl SliceHeader {
    /// NumEntryPoints.
    pub fn num_entry_points(&self) -> usize {
        self.entry_point_start_ctu.len()
    }

    /// Resolves `sh_subpic_id` to the index of the subpicture in the SPS.
    fn parse_subpic_id(&mut self, r: &mut NaluReader, sps: &Sps, pps: &Pps) -> ParseResult<()> {
        self.subpic_id = r.read_bits(usize::from(sps.subpic_id_len_minus1) + 1)?;

        if sps.subpic_id_mapping_explicitly_signalled_flag {
            let ids = if pps.subpic_id_mapping_present_flag {
                &pps.subpic_id
            } else {
                &sps.subpic_id
            };

            match ids.iter().position(|id| *id == self.subpic_id) {
                Some(idx) => self.curr_subpic_idx = idx as u16,
                None => broken_data!("Unknown subpicture id {}", self.subpic_id),
            }
        } else {
            if self.subpic_id > u32::from(sps.num_subpics_minus1) {
                broken_data!(
                    "sh_subpic_id {} out of range [0, {}]",
                    self.subpic_id,
                    sps.num_subpics_minus1
                );
            }

            self.curr_subpic_idx = self.subpic_id as u16;
        }

        Ok(())
    }

    /// Reads the slice address and resolves the CTBs covered by the slice.
    fn parse_slice_address(
        &mut self,
        r: &mut NaluReader,
        sps: &Sps,
        pps: &Pps,
        ctb_map: &CtbMap,
    ) -> ParseResult<()> {
        let subpic_idx = usize::from(self.curr_subpic_idx);
        let num_slices_in_subpic =
            u32::from(pps.num_slices_in_subpic.get(subpic_idx).copied().unwrap_or(1));

        let num_addresses = if pps.rect_slice_flag {
            num_slices_in_subpic
        } else {
            pps.num_tiles_in_pic
        };

        if num_addresses > 1 {
            self.slice_address = r.read_bits_max(ceil_log2(num_addresses), num_addresses - 1)?;
        }

        for present in &sps.extra_sh_bit_present_flag {
            if *present {
                self.extra_bit.push(r.read_bit()?);
            }
        }

        let ctbs = if !pps.no_pic_partition_flag && pps.rect_slice_flag {
            let preceding: u32 = pps.num_slices_in_subpic[..subpic_idx]
                .iter()
                .map(|n| u32::from(*n))
                .sum();
            let pic_level_slice_idx = (preceding + self.slice_address) as usize;

            match ctb_map.rect_slice_ctbs(pic_level_slice_idx) {
                Some(ctbs) => ctbs,
                None => broken_data!("Slice {} is not in the picture", pic_level_slice_idx),
            }
        } else {
            if pps.num_tiles_in_pic - self.slice_address > 1 {
                self.num_tiles_in_slice_minus1 = r.read_ue_max(pps.num_tiles_in_pic - 1)?;
            }

            let last_tile = self.slice_address + self.num_tiles_in_slice_minus1;
            if last_tile >= pps.num_tiles_in_pic {
                broken_data!("Slice ends on tile {} of {}", last_tile, pps.num_tiles_in_pic);
            }

            // The tiles of the slice are contiguous in the tile scan.
            let tile_size = |tile: u32| {
                let x = (tile % pps.num_tile_columns) as usize;
                let y = (tile / pps.num_tile_columns) as usize;
                (u32::from(pps.tile_column_width_minus1[x]) + 1)
                    * (u32::from(pps.tile_row_height_minus1[y]) + 1)
            };

            let tile_x = (self.slice_address % pps.num_tile_columns) as usize;
            let tile_y = (self.slice_address / pps.num_tile_columns) as usize;
            let start = (pps.tile_row_bd_val[tile_y] * pps.pic_width_in_ctbs_y
                + pps.tile_col_bd_val[tile_x] * (u32::from(pps.tile_row_height_minus1[tile_y]) + 1))
                as usize;
            let len = (self.slice_address..=last_tile).map(tile_size).sum::<u32>() as usize;

            match ctb_map.ctb_addr_in_slice.get(start..start + len) {
                Some(ctbs) => ctbs,
                None => broken_data!("Tiles {}..={} are not in the picture", self.slice_address, last_tile),
            }
        };

        self.ctb_addr_in_slice = ctbs.to_vec();

        Ok(())
    }

    fn parse_num_ref_idx_active(&mut self, r: &mut NaluReader, pps: &Pps) -> ParseResult<()> {
        let num_entries = [
            self.ref_pic_lists.rpl_ref_list[0].num_ref_entries,
            self.ref_pic_lists.rpl_ref_list[1].num_ref_entries,
        ];
        let num_lists = if self.slice_type.is_b() { 2 } else { 1 };

        if (!self.slice_type.is_i() && num_entries[0] > 1)
            || (self.slice_type.is_b() && num_entries[1] > 1)
        {
            self.num_ref_idx_active_override_flag = r.read_bit()?;
            if self.num_ref_idx_active_override_flag {
                for i in 0..num_lists {
                    if num_entries[i] > 1 {
                        self.num_ref_idx_active_minus1[i] = r.read_ue_max(14)?;
                    }
                }
            }
        } else {
            self.num_ref_idx_active_override_flag = true;
        }

        // (7-143)
        for i in 0..2 {
            self.num_ref_idx_active[i] = if self.slice_type.is_i() || i >= num_lists {
                0
            } else if self.num_ref_idx_active_override_flag {
                self.num_ref_idx_active_minus1[i] + 1
            } else {
                num_entries[i].min(pps.num_ref_idx_default_active_minus1[i] + 1)
            };
        }

        Ok(())
    }

    fn parse_collocated(&mut self, r: &mut NaluReader, pps: &Pps) -> ParseResult<()> {
        let ph = &self.picture_header;

        if self.slice_type.is_p() {
            self.collocated_from_l0_flag = true;
        } else if !pps.rpl_info_in_ph_flag && self.slice_type.is_b() {
            self.collocated_from_l0_flag = r.read_bit()?;
        }

        if pps.rpl_info_in_ph_flag {
            self.collocated_ref_idx = ph.collocated_ref_idx;
        } else {
            let list = if self.collocated_from_l0_flag { 0 } else { 1 };
            let num_active = u32::from(self.num_ref_idx_active[list]);
            if num_active > 1 {
                self.collocated_ref_idx = r.read_ue_max(num_active - 1)?;
            }
        }

        Ok(())
    }

    fn parse_qp(&mut self, r: &mut NaluReader, sps: &Sps, pps: &Pps) -> ParseResult<()> {
        self.qp_delta = if pps.qp_delta_info_in_ph_flag {
            self.picture_header.qp_delta
        } else {
            r.read_se_bounded(-63, 63)?
        };

        // (7-144)
        self.slice_qp_y = 26 + i32::from(pps.init_qp_minus26) + i32::from(self.qp_delta);
        if self.slice_qp_y < -sps.qp_bd_offset() || self.slice_qp_y > 63 {
            broken_data!("SliceQpY {} out of range", self.slice_qp_y);
        }

        if pps.slice_chroma_qp_offsets_present_flag {
            let check = |name: &str, pps_offset: i8, offset: i8| -> ParseResult<()> {
                let sum = i32::from(pps_offset) + i32::from(offset);
                if !(-12..=12).contains(&sum) {
                    broken_data!("{} offset {} out of range [-12, 12]", name, sum);
                }
                Ok(())
            };

            self.cb_qp_offset = r.read_se_bounded(-12, 12)?;
            check("Cb", pps.cb_qp_offset, self.cb_qp_offset)?;

            self.cr_qp_offset = r.read_se_bounded(-12, 12)?;
            check("Cr", pps.cr_qp_offset, self.cr_qp_offset)?;

            if sps.joint_cbcr_enabled_flag {
                self.joint_cbcr_qp_offset = r.read_se_bounded(-12, 12)?;
                check("CbCr", pps.joint_cbcr_qp_offset_value, self.joint_cbcr_qp_offset)?;
            }
        }

        if pps.cu_chroma_qp_offset_list_enabled_flag {
            self.cu_chroma_qp_offset_enabled_flag = r.read_bit()?;
        }

        Ok(())
    }

    fn parse_residual_coding(&mut self, r: &mut NaluReader, sps: &Sps) -> ParseResult<()> {
        if sps.dep_quant_enabled_flag {
            self.dep_quant_used_flag = r.read_bit()?;
        }

        if sps.sign_data_hiding_enabled_flag && !self.dep_quant_used_flag {
            self.sign_data_hiding_used_flag = r.read_bit()?;
        }

        if sps.transform_skip_enabled_flag
            && !self.dep_quant_used_flag
            && !self.sign_data_hiding_used_flag
        {
            self.ts_residual_coding_disabled_flag = r.read_bit()?;
        }

        if self.ts_residual_coding_disabled_flag
            && sps.range_extension.ts_residual_coding_rice_present_in_sh_flag
        {
            self.ts_residual_coding_rice_idx_minus1 = r.read_bits(3)?;
        }

        if sps.range_extension.reverse_last_sig_coeff_enabled_flag {
            self.reverse_last_sig_coeff_flag = r.read_bit()?;
        }

        Ok(())
    }

    fn parse_entry_points(
        &mut self,
        r: &mut NaluReader,
        sps: &Sps,
        pps: &Pps,
        ctb_map: &CtbMap,
    ) -> ParseResult<()> {
        if !sps.entry_point_offsets_present_flag {
            return Ok(());
        }

        self.entry_point_start_ctu = ctb_map.entry_point_start_ctus(
            &self.ctb_addr_in_slice,
            pps.pic_width_in_ctbs_y,
            sps.entropy_coding_sync_enabled_flag,
        )?;

        if !self.entry_point_start_ctu.is_empty() {
            self.entry_offset_len_minus1 = r.read_ue_max(31)?;
            let len = usize::from(self.entry_offset_len_minus1) + 1;
            for _ in 0..self.entry_point_start_ctu.len() {
                self.entry_point_offset_minus1.push(r.read_bits(len)?);
            }
        }

        Ok(())
    }

    /// Parses the rest of a slice header once its picture header is known.
    /// `r` is positioned right after `sh_picture_header_in_slice_header_flag`
    /// and, if set, the embedded picture header. `sps` and `pps` are the
    /// parameter sets referenced by `picture_header`, and `ctb_map` the one
    /// derived from them.
    pub(crate) fn parse(
        r: &mut NaluReader,
        nalu_type: NaluType,
        picture_header_in_slice_header_flag: bool,
        picture_header: PictureHeader,
        sps: &Sps,
        pps: &Pps,
        ctb_map: &CtbMap,
    ) -> ParseResult<SliceHeader> {
        log::trace!("parsing \"Slice Header\"");

        let mut sh = SliceHeader {
            picture_header_in_slice_header_flag,
            collocated_from_l0_flag: picture_header.collocated_from_l0_flag,
            picture_header,
            ..Default::default()
        };

        if sps
            .profile_tier_level
            .general_constraints_info
            .pic_header_in_slice_header_constraint_flag
            && !sh.picture_header_in_slice_header_flag
        {
            broken_data!("Picture header not in slice header despite gci_pic_header_in_slice_header_constraint_flag");
        }

        if sh.picture_header_in_slice_header_flag {
            let in_ph = [
                ("rpl", pps.rpl_info_in_ph_flag),
                ("dbf", pps.dbf_info_in_ph_flag),
                ("sao", pps.sao_info_in_ph_flag),
                ("alf", pps.alf_info_in_ph_flag),
                ("wp", pps.wp_info_in_ph_flag),
                ("qp_delta", pps.qp_delta_info_in_ph_flag),
            ];

            for (name, flag) in in_ph {
                if flag {
                    broken_data!("pps_{}_info_in_ph_flag set with the picture header in the slice header", name);
                }
            }

            if sps.subpic_info_present_flag {
                broken_data!("Picture header in the slice header of a picture with subpictures");
            }
        }

        if sps.subpic_info_present_flag {
            sh.parse_subpic_id(r, sps, pps)?;
        }

        sh.parse_slice_address(r, sps, pps, ctb_map)?;

        let ph = &sh.picture_header;
        if ph.inter_slice_allowed_flag {
            let slice_type: u32 = r.read_ue_max(2)?;
            sh.slice_type = match SliceType::n(slice_type) {
                Some(slice_type) => slice_type,
                None => broken_data!("Invalid slice type {}", slice_type),
            };
        }

        if !ph.intra_slice_allowed_flag && sh.slice_type.is_i() {
            broken_data!("I slice in a picture with ph_intra_slice_allowed_flag unset");
        }

        if nalu_type.is_irap() || nalu_type.is_gdr() {
            sh.no_output_of_prior_pics_flag = r.read_bit()?;
        }

        sh.alf = if sps.alf_enabled_flag && !pps.alf_info_in_ph_flag {
            AlfInfo::parse(r, sps, &sh.picture_header.alf)?
        } else {
            sh.picture_header.alf.clone()
        };

        let ph = &sh.picture_header;
        sh.lmcs_used_flag = if ph.lmcs_enabled_flag && !sh.picture_header_in_slice_header_flag {
            r.read_bit()?
        } else {
            sh.picture_header_in_slice_header_flag && ph.lmcs_enabled_flag
        };

        sh.explicit_scaling_list_used_flag =
            if ph.explicit_scaling_list_enabled_flag && !sh.picture_header_in_slice_header_flag {
                r.read_bit()?
            } else {
                sh.picture_header_in_slice_header_flag && ph.explicit_scaling_list_enabled_flag
            };

        sh.ref_pic_lists = if !pps.rpl_info_in_ph_flag
            && (!nalu_type.is_idr() || sps.idr_rpl_present_flag)
        {
            RefPicLists::parse(r, sps, pps)?
        } else {
            sh.picture_header.ref_pic_lists.clone()
        };

        sh.parse_num_ref_idx_active(r, pps)?;

        if !sh.slice_type.is_i() {
            if pps.cabac_init_present_flag {
                sh.cabac_init_flag = r.read_bit()?;
            }

            if sh.picture_header.temporal_mvp_enabled_flag {
                sh.parse_collocated(r, pps)?;
            }

            if !pps.wp_info_in_ph_flag
                && ((pps.weighted_pred_flag && sh.slice_type.is_p())
                    || (pps.weighted_bipred_flag && sh.slice_type.is_b()))
            {
                sh.pred_weight_table =
                    PredWeightTable::parse(r, sps, pps, &sh.ref_pic_lists, sh.num_ref_idx_active)?;
            }
        }

        sh.parse_qp(r, sps, pps)?;

        let ph = &sh.picture_header;
        if sps.sao_enabled_flag && !pps.sao_info_in_ph_flag {
            sh.sao_luma_used_flag = r.read_bit()?;
            sh.sao_chroma_used_flag = if sps.chroma_format_idc != 0 {
                r.read_bit()?
            } else {
                ph.sao_chroma_enabled_flag
            };
        } else {
            sh.sao_luma_used_flag = ph.sao_luma_enabled_flag;
            sh.sao_chroma_used_flag = ph.sao_chroma_enabled_flag;
        }

        sh.deblocking = DeblockingParams {
            params_present_flag: false,
            ..ph.deblocking.clone()
        };
        if pps.deblocking_filter_override_enabled_flag && !pps.dbf_info_in_ph_flag && r.read_bit()? {
            sh.deblocking.parse(r, pps)?;
        }

        sh.parse_residual_coding(r, sps)?;

        if pps.slice_header_extension_present_flag {
            let len: u32 = r.read_ue_max(256)?;
            for _ in 0..len {
                sh.extension_data_byte.push(r.read_bits(8)?);
            }
        }

        sh.parse_entry_points(r, sps, pps, ctb_map)?;

        // byte_alignment()
        if !r.read_bit()? {
            broken_data!("Invalid alignment_bit_equal_to_one");
        }
        r.skip_to_byte_alignment()?;

        sh.header_size = r.position();
        sh.n_emulation_prevention_bytes = r.num_epb();

        Ok(sh)
    }
}
