// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use enumn::N;

use crate::codec::h266::parser::MAX_APS_COUNT;
use crate::codec::h266::parser::NUM_ALF_FILTERS;
use crate::codec::h266::rpl::ceil_log2;
use crate::codec::h266::tables::diag_scan_order;
use crate::codec::h266::tables::SCALING_PRED_ALL_16;
use crate::codec::h266::tables::SCALING_PRED_ALL_8;
use crate::error::broken_data;
use crate::error::ParseResult;
use crate::utils::nalu_reader::NaluReader;

/// Number of scaling matrices carried by a scaling list APS.
pub const NUM_SCALING_LISTS: usize = 28;
/// Number of LMCS bins.
pub const LMCS_NUM_BINS: usize = 16;
/// Maximum number of chroma ALF alternatives.
pub const MAX_ALF_CHROMA_ALTS: usize = 8;
/// Maximum number of cross component ALF filters.
pub const MAX_CC_ALF_FILTERS: usize = 4;

/// Table 6 – APS parameters type codes.
#[derive(N, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ApsType {
    #[default]
    Alf = 0,
    Lmcs = 1,
    Scaling = 2,
}

/// `alf_data()`, 7.3.2.18.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AlfData {
    pub luma_filter_signal_flag: bool,
    pub chroma_filter_signal_flag: bool,
    pub cc_cb_filter_signal_flag: bool,
    pub cc_cr_filter_signal_flag: bool,
    pub luma_clip_flag: bool,
    pub luma_num_filters_signalled_minus1: u8,
    pub luma_coeff_delta_idx: [u8; NUM_ALF_FILTERS],
    pub luma_coeff_abs: [[u8; 12]; NUM_ALF_FILTERS],
    pub luma_coeff_sign: [[bool; 12]; NUM_ALF_FILTERS],
    pub luma_clip_idx: [[u8; 12]; NUM_ALF_FILTERS],
    pub chroma_clip_flag: bool,
    pub chroma_num_alt_filters_minus1: u8,
    pub chroma_coeff_abs: [[u8; 6]; MAX_ALF_CHROMA_ALTS],
    pub chroma_coeff_sign: [[bool; 6]; MAX_ALF_CHROMA_ALTS],
    pub chroma_clip_idx: [[u8; 6]; MAX_ALF_CHROMA_ALTS],
    pub cc_cb_filters_signalled_minus1: u8,
    pub cc_cb_mapped_coeff_abs: [[u8; 7]; MAX_CC_ALF_FILTERS],
    pub cc_cb_coeff_sign: [[bool; 7]; MAX_CC_ALF_FILTERS],
    pub cc_cr_filters_signalled_minus1: u8,
    pub cc_cr_mapped_coeff_abs: [[u8; 7]; MAX_CC_ALF_FILTERS],
    pub cc_cr_coeff_sign: [[bool; 7]; MAX_CC_ALF_FILTERS],
}

fn signed(abs: u8, sign: bool) -> i16 {
    if sign {
        -i16::from(abs)
    } else {
        i16::from(abs)
    }
}

fn cc_alf_coeff(mapped_abs: u8, sign: bool) -> i16 {
    if mapped_abs == 0 {
        0
    } else {
        signed(1 << (mapped_abs - 1), sign)
    }
}

impl AlfData {
    /// AlfCoeffL of luma filter class `filt_idx`, after mapping the class to
    /// its signalled filter. (7-47)
    pub fn luma_coeff(&self, filt_idx: usize) -> [i16; 12] {
        let sf_idx = usize::from(self.luma_coeff_delta_idx[filt_idx]);
        std::array::from_fn(|j| signed(self.luma_coeff_abs[sf_idx][j], self.luma_coeff_sign[sf_idx][j]))
    }

    /// Clipping indices of luma filter class `filt_idx`.
    pub fn luma_clip(&self, filt_idx: usize) -> [u8; 12] {
        self.luma_clip_idx[usize::from(self.luma_coeff_delta_idx[filt_idx])]
    }

    /// AlfCoeffC of chroma alternative `alt_idx`. (7-50)
    pub fn chroma_coeff(&self, alt_idx: usize) -> [i16; 6] {
        std::array::from_fn(|j| signed(self.chroma_coeff_abs[alt_idx][j], self.chroma_coeff_sign[alt_idx][j]))
    }

    /// CcAlfApsCoeffCb of filter `k`. (7-51)
    pub fn cc_cb_coeff(&self, k: usize) -> [i16; 7] {
        std::array::from_fn(|j| cc_alf_coeff(self.cc_cb_mapped_coeff_abs[k][j], self.cc_cb_coeff_sign[k][j]))
    }

    /// CcAlfApsCoeffCr of filter `k`. (7-52)
    pub fn cc_cr_coeff(&self, k: usize) -> [i16; 7] {
        std::array::from_fn(|j| cc_alf_coeff(self.cc_cr_mapped_coeff_abs[k][j], self.cc_cr_coeff_sign[k][j]))
    }

    fn parse_cc_filters(
        r: &mut NaluReader,
        filters_signalled_minus1: &mut u8,
        mapped_coeff_abs: &mut [[u8; 7]; MAX_CC_ALF_FILTERS],
        coeff_sign: &mut [[bool; 7]; MAX_CC_ALF_FILTERS],
    ) -> ParseResult<()> {
        *filters_signalled_minus1 = r.read_ue_max(MAX_CC_ALF_FILTERS as u32 - 1)?;
        for k in 0..=usize::from(*filters_signalled_minus1) {
            for j in 0..7 {
                mapped_coeff_abs[k][j] = r.read_bits(3)?;
                if mapped_coeff_abs[k][j] != 0 {
                    coeff_sign[k][j] = r.read_bit()?;
                }
            }
        }

        Ok(())
    }

    fn parse(r: &mut NaluReader, chroma_present_flag: bool) -> ParseResult<AlfData> {
        log::trace!("parsing \"ALF\"");

        let mut alf = AlfData {
            luma_filter_signal_flag: r.read_bit()?,
            ..Default::default()
        };

        if chroma_present_flag {
            alf.chroma_filter_signal_flag = r.read_bit()?;
            alf.cc_cb_filter_signal_flag = r.read_bit()?;
            alf.cc_cr_filter_signal_flag = r.read_bit()?;
        }

        if !alf.luma_filter_signal_flag
            && !alf.chroma_filter_signal_flag
            && !alf.cc_cb_filter_signal_flag
            && !alf.cc_cr_filter_signal_flag
        {
            broken_data!("ALF APS signals no filter");
        }

        if alf.luma_filter_signal_flag {
            alf.luma_clip_flag = r.read_bit()?;
            alf.luma_num_filters_signalled_minus1 = r.read_ue_max(NUM_ALF_FILTERS as u32 - 1)?;

            let num_filters = u32::from(alf.luma_num_filters_signalled_minus1) + 1;
            if num_filters > 1 {
                let len = ceil_log2(num_filters);
                for idx in alf.luma_coeff_delta_idx.iter_mut() {
                    *idx = r.read_bits_max(len, num_filters - 1)?;
                }
            }

            for sf_idx in 0..num_filters as usize {
                for j in 0..12 {
                    alf.luma_coeff_abs[sf_idx][j] = r.read_ue_max(128)?;
                    if alf.luma_coeff_abs[sf_idx][j] != 0 {
                        alf.luma_coeff_sign[sf_idx][j] = r.read_bit()?;
                    }
                }
            }

            if alf.luma_clip_flag {
                for sf_idx in 0..num_filters as usize {
                    for j in 0..12 {
                        alf.luma_clip_idx[sf_idx][j] = r.read_bits(2)?;
                    }
                }
            }
        }

        if alf.chroma_filter_signal_flag {
            alf.chroma_clip_flag = r.read_bit()?;
            alf.chroma_num_alt_filters_minus1 = r.read_ue_max(MAX_ALF_CHROMA_ALTS as u32 - 1)?;
            for alt_idx in 0..=usize::from(alf.chroma_num_alt_filters_minus1) {
                for j in 0..6 {
                    alf.chroma_coeff_abs[alt_idx][j] = r.read_ue_max(128)?;
                    if alf.chroma_coeff_abs[alt_idx][j] != 0 {
                        alf.chroma_coeff_sign[alt_idx][j] = r.read_bit()?;
                    }
                }

                if alf.chroma_clip_flag {
                    for j in 0..6 {
                        alf.chroma_clip_idx[alt_idx][j] = r.read_bits(2)?;
                    }
                }
            }
        }

        if alf.cc_cb_filter_signal_flag {
            Self::parse_cc_filters(
                r,
                &mut alf.cc_cb_filters_signalled_minus1,
                &mut alf.cc_cb_mapped_coeff_abs,
                &mut alf.cc_cb_coeff_sign,
            )?;
        }

        if alf.cc_cr_filter_signal_flag {
            Self::parse_cc_filters(
                r,
                &mut alf.cc_cr_filters_signalled_minus1,
                &mut alf.cc_cr_mapped_coeff_abs,
                &mut alf.cc_cr_coeff_sign,
            )?;
        }

        Ok(alf)
    }
}

/// `lmcs_data()`, 7.3.2.19.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LmcsData {
    pub min_bin_idx: u8,
    pub delta_max_bin_idx: u8,
    pub delta_cw_prec_minus1: u8,
    pub delta_abs_cw: [u16; LMCS_NUM_BINS],
    pub delta_sign_cw_flag: [bool; LMCS_NUM_BINS],
    pub delta_abs_crs: u8,
    pub delta_sign_crs_flag: bool,
}

impl LmcsData {
    /// LmcsMaxBinIdx. (7-53)
    pub fn max_bin_idx(&self) -> u8 {
        15 - self.delta_max_bin_idx
    }

    /// lmcsDeltaCW of bin `i`. (7-54)
    pub fn delta_cw(&self, i: usize) -> i32 {
        let abs = i32::from(self.delta_abs_cw[i]);
        if self.delta_sign_cw_flag[i] {
            -abs
        } else {
            abs
        }
    }

    /// lmcsDeltaCrs. (7-56)
    pub fn delta_crs(&self) -> i32 {
        let abs = i32::from(self.delta_abs_crs);
        if self.delta_sign_crs_flag {
            -abs
        } else {
            abs
        }
    }

    fn parse(r: &mut NaluReader, chroma_present_flag: bool) -> ParseResult<LmcsData> {
        log::trace!("parsing \"LMCS\"");

        let mut lmcs = LmcsData {
            min_bin_idx: r.read_ue_max(15)?,
            delta_max_bin_idx: r.read_ue_max(15)?,
            ..Default::default()
        };

        if lmcs.max_bin_idx() < lmcs.min_bin_idx {
            broken_data!(
                "LmcsMaxBinIdx {} is below lmcs_min_bin_idx {}",
                lmcs.max_bin_idx(),
                lmcs.min_bin_idx
            );
        }

        lmcs.delta_cw_prec_minus1 = r.read_ue_max(14)?;
        for i in usize::from(lmcs.min_bin_idx)..=usize::from(lmcs.max_bin_idx()) {
            lmcs.delta_abs_cw[i] = r.read_bits(usize::from(lmcs.delta_cw_prec_minus1) + 1)?;
            if lmcs.delta_abs_cw[i] > 0 {
                lmcs.delta_sign_cw_flag[i] = r.read_bit()?;
            }
        }

        if chroma_present_flag {
            lmcs.delta_abs_crs = r.read_bits(3)?;
            if lmcs.delta_abs_crs > 0 {
                lmcs.delta_sign_crs_flag = r.read_bit()?;
            }
        }

        Ok(lmcs)
    }
}

/// `scaling_list_data()`, 7.3.2.20, with the resulting ScalingFactor
/// matrices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScalingListData {
    pub copy_mode_flag: [bool; NUM_SCALING_LISTS],
    pub pred_mode_flag: [bool; NUM_SCALING_LISTS],
    pub pred_id_delta: [u8; NUM_SCALING_LISTS],
    pub dc_coef: [i16; 14],
    /// ScalingMatrixRec of every id, in raster order. Only the first 4 (for
    /// ids 0 and 1) or 16 (for ids 2 to 7) entries are used by the smaller
    /// matrices.
    pub scaling_list: [[u8; 64]; NUM_SCALING_LISTS],
    /// ScalingMatrixDCRec of ids 14 to 27.
    pub scaling_list_dc: [u8; 14],
}

impl Default for ScalingListData {
    fn default() -> Self {
        Self {
            copy_mode_flag: Default::default(),
            pred_mode_flag: Default::default(),
            pred_id_delta: Default::default(),
            dc_coef: Default::default(),
            scaling_list: [[0; 64]; NUM_SCALING_LISTS],
            scaling_list_dc: Default::default(),
        }
    }
}

impl ScalingListData {
    fn parse(r: &mut NaluReader, chroma_present_flag: bool) -> ParseResult<ScalingListData> {
        log::trace!("parsing \"Scaling List\"");

        let mut sl = ScalingListData::default();

        for id in 0..NUM_SCALING_LISTS {
            let log2_size = match id {
                0..=1 => 1,
                2..=7 => 2,
                _ => 3,
            };
            let matrix_size = 1usize << log2_size;
            let max_id_delta = match id {
                0..=1 => id,
                2..=7 => id - 2,
                _ => id - 8,
            };
            let scan = diag_scan_order(log2_size);

            // Coded deltas accumulated in diagonal scan order.
            let mut coeffs = [0i32; 64];
            let mut dc = 0i32;

            sl.copy_mode_flag[id] = true;

            if chroma_present_flag || id % 3 == 2 || id == 27 {
                sl.copy_mode_flag[id] = r.read_bit()?;
                if !sl.copy_mode_flag[id] {
                    sl.pred_mode_flag[id] = r.read_bit()?;
                }

                if (sl.copy_mode_flag[id] || sl.pred_mode_flag[id]) && id != 0 && id != 2 && id != 8
                {
                    sl.pred_id_delta[id] = r.read_ue_max(max_id_delta as u32)?;
                }

                if !sl.copy_mode_flag[id] {
                    let mut next_coef = 0i32;

                    if id > 13 {
                        sl.dc_coef[id - 14] = r.read_se_bounded(-128, 127)?;
                        next_coef = i32::from(sl.dc_coef[id - 14]);
                        dc = next_coef;
                    }

                    for (i, &(x, y)) in scan.iter().enumerate() {
                        // The bottom right quadrant of 64x64 matrices is zeroed out.
                        if !(id >= 25 && x >= 4 && y >= 4) {
                            let delta: i32 = r.read_se_bounded(-128, 127)?;
                            next_coef += delta;
                        }
                        coeffs[i] = next_coef;
                    }
                }
            }

            let predicted = !sl.copy_mode_flag[id] && !sl.pred_mode_flag[id];
            let ref_id = id.checked_sub(usize::from(sl.pred_id_delta[id]));

            if id > 13 {
                let pred_dc = if predicted {
                    8
                } else if sl.pred_id_delta[id] == 0 {
                    16
                } else {
                    let Some(ref_id) = ref_id else {
                        broken_data!("Invalid scaling_list_pred_id_delta {}", sl.pred_id_delta[id]);
                    };
                    if ref_id >= 14 {
                        sl.scaling_list_dc[ref_id - 14]
                    } else {
                        sl.scaling_list[ref_id][0]
                    }
                };
                sl.scaling_list_dc[id - 14] = ((dc + i32::from(pred_dc)) & 255) as u8;
            }

            let pred = if predicted {
                SCALING_PRED_ALL_8
            } else if sl.pred_id_delta[id] == 0 {
                SCALING_PRED_ALL_16
            } else {
                let Some(ref_id) = ref_id else {
                    broken_data!("Invalid scaling_list_pred_id_delta {}", sl.pred_id_delta[id]);
                };
                sl.scaling_list[ref_id]
            };

            for (i, &(x, y)) in scan.iter().enumerate() {
                let offset = y * matrix_size + x;
                sl.scaling_list[id][offset] = ((i32::from(pred[offset]) + coeffs[i]) & 255) as u8;
            }
        }

        Ok(sl)
    }
}

/// `adaptation_parameter_set_rbsp()`, 7.3.2.6.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Aps {
    pub params_type: ApsType,
    pub aps_id: u8,
    pub chroma_present_flag: bool,
    /// Set for ALF APSs.
    pub alf: AlfData,
    /// Set for LMCS APSs.
    pub lmcs: LmcsData,
    /// Set for scaling list APSs.
    pub scaling_list: ScalingListData,
    pub extension_flag: bool,
}

impl Aps {
    pub(crate) fn parse(r: &mut NaluReader) -> ParseResult<Aps> {
        log::trace!("parsing \"Adaptation parameter set\"");

        let params_type: u8 = r.read_bits(3)?;
        let Some(params_type) = ApsType::n(params_type) else {
            broken_data!("Unknown aps_params_type {}", params_type);
        };

        let max_id = match params_type {
            ApsType::Lmcs => 3,
            _ => MAX_APS_COUNT as u32 - 1,
        };

        let mut aps = Aps {
            params_type,
            aps_id: r.read_bits_max(5, max_id)?,
            chroma_present_flag: r.read_bit()?,
            ..Default::default()
        };

        match aps.params_type {
            ApsType::Alf => aps.alf = AlfData::parse(r, aps.chroma_present_flag)?,
            ApsType::Lmcs => aps.lmcs = LmcsData::parse(r, aps.chroma_present_flag)?,
            ApsType::Scaling => {
                aps.scaling_list = ScalingListData::parse(r, aps.chroma_present_flag)?
            }
        }

        aps.extension_flag = r.read_bit()?;
        if aps.extension_flag {
            log::debug!("Ignoring APS extension data");
        }

        Ok(aps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::h266::test_utils::NaluWriter;

    fn parse(w: &NaluWriter) -> ParseResult<Aps> {
        let data = w.rbsp();
        Aps::parse(&mut NaluReader::without_epb(&data))
    }

    #[test]
    fn alf_luma_filters() {
        let mut w = NaluWriter::new();
        w.write_f(3, 0u8).write_f(5, 3u8).write_flag(false);
        // Luma only, two filters, no clipping.
        w.write_flag(true).write_flag(false).write_ue(1u32);
        for filt_idx in 0..NUM_ALF_FILTERS {
            w.write_f(1, (filt_idx % 2) as u8);
        }
        for sf_idx in 0..2u32 {
            for j in 0..12u32 {
                let abs = if j == 0 { sf_idx + 1 } else { 0 };
                w.write_ue(abs);
                if abs != 0 {
                    w.write_flag(sf_idx == 1);
                }
            }
        }
        w.write_flag(false).trailing_bits();

        let aps = parse(&w).unwrap();
        assert_eq!(aps.params_type, ApsType::Alf);
        assert_eq!(aps.aps_id, 3);
        assert_eq!(aps.alf.luma_num_filters_signalled_minus1, 1);
        assert_eq!(aps.alf.luma_coeff(0)[0], 1);
        assert_eq!(aps.alf.luma_coeff(1)[0], -2);
        assert_eq!(aps.alf.luma_coeff(24)[0], 1);
        assert_eq!(aps.alf.luma_coeff(1)[1], 0);
    }

    #[test]
    fn alf_without_filters() {
        let mut w = NaluWriter::new();
        w.write_f(3, 0u8).write_f(5, 0u8).write_flag(true);
        w.write_f(4, 0u8).write_flag(false).trailing_bits();

        assert!(parse(&w).is_err());
    }

    #[test]
    fn alf_cross_component() {
        let mut w = NaluWriter::new();
        w.write_f(3, 0u8).write_f(5, 0u8).write_flag(true);
        w.write_flag(false).write_flag(false).write_flag(true).write_flag(false);
        w.write_ue(0u32);
        for j in 0..7u8 {
            w.write_f(3, j);
            if j != 0 {
                w.write_flag(j == 3);
            }
        }
        w.write_flag(false).trailing_bits();

        let aps = parse(&w).unwrap();
        assert_eq!(aps.alf.cc_cb_coeff(0), [0, 1, 2, -4, 8, 16, 32]);
    }

    #[test]
    fn lmcs() {
        let mut w = NaluWriter::new();
        w.write_f(3, 1u8).write_f(5, 2u8).write_flag(true);
        w.write_ue(1u32).write_ue(2u32).write_ue(5u32);
        for i in 1..=13u8 {
            w.write_f(6, i);
            w.write_flag(i % 2 == 0);
        }
        w.write_f(3, 2u8).write_flag(true);
        w.write_flag(false).trailing_bits();

        let aps = parse(&w).unwrap();
        assert_eq!(aps.params_type, ApsType::Lmcs);
        assert_eq!(aps.lmcs.max_bin_idx(), 13);
        assert_eq!(aps.lmcs.delta_cw(0), 0);
        assert_eq!(aps.lmcs.delta_cw(1), 1);
        assert_eq!(aps.lmcs.delta_cw(2), -2);
        assert_eq!(aps.lmcs.delta_crs(), -2);
    }

    #[test]
    fn lmcs_invalid_bins() {
        let mut w = NaluWriter::new();
        w.write_f(3, 1u8).write_f(5, 0u8).write_flag(false);
        // LmcsMaxBinIdx 5 below lmcs_min_bin_idx 8.
        w.write_ue(8u32).write_ue(10u32).trailing_bits();
        assert!(parse(&w).is_err());

        // LMCS APS ids only go up to 3.
        let mut w = NaluWriter::new();
        w.write_f(3, 1u8).write_f(5, 4u8).write_flag(false).trailing_bits();
        assert!(parse(&w).is_err());
    }

    #[test]
    fn unknown_params_type() {
        let mut w = NaluWriter::new();
        w.write_f(3, 3u8).write_f(5, 0u8).write_flag(false).trailing_bits();
        assert!(parse(&w).is_err());
    }

    #[test]
    fn scaling_list_copies() {
        let mut w = NaluWriter::new();
        w.write_f(3, 2u8).write_f(5, 1u8).write_flag(true);
        for id in 0..NUM_SCALING_LISTS {
            // Copy mode, referring to the flat default.
            w.write_flag(true);
            if id != 0 && id != 2 && id != 8 {
                w.write_ue(0u32);
            }
        }
        w.write_flag(false).trailing_bits();

        let aps = parse(&w).unwrap();
        let sl = &aps.scaling_list;
        assert_eq!(sl.scaling_list[0][..4], [16; 4]);
        assert_eq!(sl.scaling_list[27], [16; 64]);
        assert_eq!(sl.scaling_list_dc, [16; 14]);
    }

    #[test]
    fn scaling_list_prediction() {
        let mut w = NaluWriter::new();
        w.write_f(3, 2u8).write_f(5, 0u8).write_flag(false);
        for id in 0..NUM_SCALING_LISTS {
            if id % 3 != 2 && id != 27 {
                continue;
            }

            match id {
                // Explicit 4x4 matrix, predicted from the flat 8 matrix.
                2 => {
                    w.write_flag(false).write_flag(false);
                    for _ in 0..16 {
                        w.write_se(1);
                    }
                }
                // Explicit 8x8 matrix with a DC coefficient.
                14 => {
                    w.write_flag(false).write_flag(false);
                    w.write_se(4);
                    for _ in 0..64 {
                        w.write_se(0);
                    }
                }
                // Copy of matrix 14.
                17 => {
                    w.write_flag(true).write_ue(3u32);
                }
                _ => {
                    w.write_flag(true);
                    if id != 8 {
                        w.write_ue(0u32);
                    }
                }
            }
        }
        w.write_flag(false).trailing_bits();

        let aps = parse(&w).unwrap();
        let sl = &aps.scaling_list;
        assert!(sl.copy_mode_flag[0]);
        // First row of the matrix, coded at diagonal scan positions 0, 2, 5 and 9.
        assert_eq!(sl.scaling_list[2][..4], [9, 11, 14, 18]);
        assert_eq!(sl.scaling_list[2][15], 24);
        assert_eq!(sl.dc_coef[0], 4);
        assert_eq!(sl.scaling_list_dc[0], 12);
        assert_eq!(sl.scaling_list[14], [12; 64]);
        assert_eq!(sl.scaling_list[17], [12; 64]);
        assert_eq!(sl.scaling_list_dc[3], 12);
    }
}
