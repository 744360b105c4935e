// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Supplemental enhancement information, 7.3.5 and Annex D.

use enumn::N;

use crate::codec::h266::parser::NaluType;
use crate::codec::h266::parser::MAX_CPB_CNT;
use crate::codec::h266::parser::MAX_CTUS_IN_PICTURE;
use crate::codec::h266::parser::MAX_LAYERS;
use crate::codec::h266::parser::MAX_SLICES_PER_AU;
use crate::codec::h266::parser::MAX_SLI_REF_LEVELS;
use crate::codec::h266::parser::MAX_SUBLAYERS;
use crate::codec::h266::parser::MAX_TOTAL_NUM_OLSS;
use crate::codec::h266::rpl::ceil_log2;
use crate::error::broken_data;
use crate::error::broken_link;
use crate::error::ParseResult;
use crate::utils::nalu_reader::NaluReader;

#[derive(N, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum SeiPayloadType {
    BufferingPeriod = 0,
    PicTiming = 1,
    RegisteredUserData = 4,
    UserDataUnregistered = 5,
    DecodingUnitInfo = 130,
    ScalableNesting = 133,
    FrameFieldInfo = 168,
    SubpicLevelInfo = 203,
}

/// Buffering period SEI message, D.3.1.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BufferingPeriod {
    pub nal_hrd_params_present_flag: bool,
    pub vcl_hrd_params_present_flag: bool,
    pub cpb_initial_removal_delay_length_minus1: u8,
    pub cpb_removal_delay_length_minus1: u8,
    pub dpb_output_delay_length_minus1: u8,
    pub du_hrd_params_present_flag: bool,
    pub du_cpb_removal_delay_increment_length_minus1: u8,
    pub dpb_output_delay_du_length_minus1: u8,
    pub du_cpb_params_in_pic_timing_sei_flag: bool,
    pub du_dpb_params_in_pic_timing_sei_flag: bool,
    pub concatenation_flag: bool,
    pub additional_concatenation_info_present_flag: bool,
    pub max_initial_removal_delay_for_concatenation: u32,
    pub cpb_removal_delay_delta_minus1: u32,
    pub max_sublayers_minus1: u8,
    pub cpb_removal_delay_deltas_present_flag: bool,
    pub num_cpb_removal_delay_deltas_minus1: u8,
    pub cpb_removal_delay_delta_val: Vec<u32>,
    pub cpb_cnt_minus1: u8,
    pub sublayer_initial_cpb_removal_delay_present_flag: bool,
    pub nal_initial_cpb_removal_delay: [[u32; MAX_CPB_CNT]; MAX_SUBLAYERS],
    pub nal_initial_cpb_removal_offset: [[u32; MAX_CPB_CNT]; MAX_SUBLAYERS],
    pub nal_initial_alt_cpb_removal_delay: [[u32; MAX_CPB_CNT]; MAX_SUBLAYERS],
    pub nal_initial_alt_cpb_removal_offset: [[u32; MAX_CPB_CNT]; MAX_SUBLAYERS],
    pub vcl_initial_cpb_removal_delay: [[u32; MAX_CPB_CNT]; MAX_SUBLAYERS],
    pub vcl_initial_cpb_removal_offset: [[u32; MAX_CPB_CNT]; MAX_SUBLAYERS],
    pub vcl_initial_alt_cpb_removal_delay: [[u32; MAX_CPB_CNT]; MAX_SUBLAYERS],
    pub vcl_initial_alt_cpb_removal_offset: [[u32; MAX_CPB_CNT]; MAX_SUBLAYERS],
    pub sublayer_dpb_output_offsets_present_flag: bool,
    pub dpb_output_tid_offset: [u32; MAX_SUBLAYERS],
    pub alt_cpb_params_present_flag: bool,
    pub use_alt_cpb_params_flag: bool,
}

impl BufferingPeriod {
    /// First sublayer with initial CPB removal delays.
    fn first_sublayer(&self) -> usize {
        if self.sublayer_initial_cpb_removal_delay_present_flag {
            0
        } else {
            usize::from(self.max_sublayers_minus1)
        }
    }

    fn parse(r: &mut NaluReader) -> ParseResult<BufferingPeriod> {
        log::trace!("parsing \"Buffering Period\"");

        let mut bp = BufferingPeriod {
            nal_hrd_params_present_flag: r.read_bit()?,
            vcl_hrd_params_present_flag: r.read_bit()?,
            cpb_initial_removal_delay_length_minus1: r.read_bits(5)?,
            cpb_removal_delay_length_minus1: r.read_bits(5)?,
            dpb_output_delay_length_minus1: r.read_bits(5)?,
            du_hrd_params_present_flag: r.read_bit()?,
            ..Default::default()
        };

        if bp.du_hrd_params_present_flag {
            bp.du_cpb_removal_delay_increment_length_minus1 = r.read_bits(5)?;
            bp.dpb_output_delay_du_length_minus1 = r.read_bits(5)?;
            bp.du_cpb_params_in_pic_timing_sei_flag = r.read_bit()?;
            bp.du_dpb_params_in_pic_timing_sei_flag = r.read_bit()?;
        }

        let initial_delay_len = usize::from(bp.cpb_initial_removal_delay_length_minus1) + 1;
        let removal_delay_len = usize::from(bp.cpb_removal_delay_length_minus1) + 1;

        bp.concatenation_flag = r.read_bit()?;
        bp.additional_concatenation_info_present_flag = r.read_bit()?;
        if bp.additional_concatenation_info_present_flag {
            bp.max_initial_removal_delay_for_concatenation = r.read_bits(initial_delay_len)?;
        }

        bp.cpb_removal_delay_delta_minus1 = r.read_bits(removal_delay_len)?;

        bp.max_sublayers_minus1 = r.read_bits_max(3, MAX_SUBLAYERS as u32 - 1)?;
        if bp.max_sublayers_minus1 > 0 {
            bp.cpb_removal_delay_deltas_present_flag = r.read_bit()?;
        }

        if bp.cpb_removal_delay_deltas_present_flag {
            bp.num_cpb_removal_delay_deltas_minus1 = r.read_ue_max(15)?;
            for _ in 0..=bp.num_cpb_removal_delay_deltas_minus1 {
                bp.cpb_removal_delay_delta_val.push(r.read_bits(removal_delay_len)?);
            }
        }

        bp.cpb_cnt_minus1 = r.read_ue_max(MAX_CPB_CNT as u32 - 1)?;
        if bp.max_sublayers_minus1 > 0 {
            bp.sublayer_initial_cpb_removal_delay_present_flag = r.read_bit()?;
        }

        let cpb_cnt = usize::from(bp.cpb_cnt_minus1) + 1;
        let max_sublayer = usize::from(bp.max_sublayers_minus1);

        for i in bp.first_sublayer()..=max_sublayer {
            if bp.nal_hrd_params_present_flag {
                for j in 0..cpb_cnt {
                    bp.nal_initial_cpb_removal_delay[i][j] = r.read_bits(initial_delay_len)?;
                    bp.nal_initial_cpb_removal_offset[i][j] = r.read_bits(initial_delay_len)?;
                    if bp.du_hrd_params_present_flag {
                        bp.nal_initial_alt_cpb_removal_delay[i][j] = r.read_bits(initial_delay_len)?;
                        bp.nal_initial_alt_cpb_removal_offset[i][j] = r.read_bits(initial_delay_len)?;
                    }
                }
            }

            if bp.vcl_hrd_params_present_flag {
                for j in 0..cpb_cnt {
                    bp.vcl_initial_cpb_removal_delay[i][j] = r.read_bits(initial_delay_len)?;
                    bp.vcl_initial_cpb_removal_offset[i][j] = r.read_bits(initial_delay_len)?;
                    if bp.du_hrd_params_present_flag {
                        bp.vcl_initial_alt_cpb_removal_delay[i][j] = r.read_bits(initial_delay_len)?;
                        bp.vcl_initial_alt_cpb_removal_offset[i][j] = r.read_bits(initial_delay_len)?;
                    }
                }
            }
        }

        if bp.max_sublayers_minus1 > 0 {
            bp.sublayer_dpb_output_offsets_present_flag = r.read_bit()?;
        }

        if bp.sublayer_dpb_output_offsets_present_flag {
            for i in 0..max_sublayer {
                bp.dpb_output_tid_offset[i] = r.read_ue()?;
            }
        }

        bp.alt_cpb_params_present_flag = r.read_bit()?;
        if bp.alt_cpb_params_present_flag {
            bp.use_alt_cpb_params_flag = r.read_bit()?;
        }

        Ok(bp)
    }
}

/// Picture timing SEI message, D.3.2. Interpreted with the last buffering
/// period.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PicTiming {
    pub cpb_removal_delay_minus1: [u32; MAX_SUBLAYERS],
    pub sublayer_delays_present_flag: [bool; MAX_SUBLAYERS],
    pub cpb_removal_delay_delta_enabled_flag: [bool; MAX_SUBLAYERS],
    pub cpb_removal_delay_delta_idx: [u8; MAX_SUBLAYERS],
    pub dpb_output_delay: u32,
    pub cpb_alt_timing_info_present_flag: bool,
    pub nal_cpb_alt_initial_removal_delay_delta: [[u32; MAX_CPB_CNT]; MAX_SUBLAYERS],
    pub nal_cpb_alt_initial_removal_offset_delta: [[u32; MAX_CPB_CNT]; MAX_SUBLAYERS],
    pub nal_cpb_delay_offset: [u32; MAX_SUBLAYERS],
    pub nal_dpb_delay_offset: [u32; MAX_SUBLAYERS],
    pub vcl_cpb_alt_initial_removal_delay_delta: [[u32; MAX_CPB_CNT]; MAX_SUBLAYERS],
    pub vcl_cpb_alt_initial_removal_offset_delta: [[u32; MAX_CPB_CNT]; MAX_SUBLAYERS],
    pub vcl_cpb_delay_offset: [u32; MAX_SUBLAYERS],
    pub vcl_dpb_delay_offset: [u32; MAX_SUBLAYERS],
    pub dpb_output_du_delay: u32,
    pub num_decoding_units_minus1: u32,
    pub du_common_cpb_removal_delay_flag: bool,
    pub du_common_cpb_removal_delay_increment_minus1: [u32; MAX_SUBLAYERS],
    pub num_nalus_in_du_minus1: Vec<u32>,
    /// Indexed by decoding unit, then by sublayer.
    pub du_cpb_removal_delay_increment_minus1: Vec<[u32; MAX_SUBLAYERS]>,
    pub delay_for_concatenation_ensured_flag: bool,
    pub display_elemental_periods_minus1: u8,
}

impl PicTiming {
    /// Reads the alternative initial removal delays and offsets of either the
    /// NAL or the VCL HRD.
    fn parse_alt_timing(
        r: &mut NaluReader,
        bp: &BufferingPeriod,
        delay_delta: &mut [[u32; MAX_CPB_CNT]; MAX_SUBLAYERS],
        offset_delta: &mut [[u32; MAX_CPB_CNT]; MAX_SUBLAYERS],
        cpb_delay_offset: &mut [u32; MAX_SUBLAYERS],
        dpb_delay_offset: &mut [u32; MAX_SUBLAYERS],
    ) -> ParseResult<()> {
        let initial_delay_len = usize::from(bp.cpb_initial_removal_delay_length_minus1) + 1;
        let removal_delay_len = usize::from(bp.cpb_removal_delay_length_minus1) + 1;

        for i in bp.first_sublayer()..=usize::from(bp.max_sublayers_minus1) {
            for j in 0..=usize::from(bp.cpb_cnt_minus1) {
                delay_delta[i][j] = r.read_bits(initial_delay_len)?;
                offset_delta[i][j] = r.read_bits(initial_delay_len)?;
            }

            cpb_delay_offset[i] = r.read_bits(removal_delay_len)?;
            dpb_delay_offset[i] = r.read_bits(removal_delay_len)?;
        }

        Ok(())
    }

    fn parse_decoding_units(
        &mut self,
        r: &mut NaluReader,
        bp: &BufferingPeriod,
        temporal_id: usize,
    ) -> ParseResult<()> {
        let max_sublayer = usize::from(bp.max_sublayers_minus1);
        let increment_len = usize::from(bp.du_cpb_removal_delay_increment_length_minus1) + 1;

        self.num_decoding_units_minus1 = r.read_ue_max(MAX_CTUS_IN_PICTURE as u32 - 1)?;
        if self.num_decoding_units_minus1 > 0 {
            self.du_common_cpb_removal_delay_flag = r.read_bit()?;
            if self.du_common_cpb_removal_delay_flag {
                for i in temporal_id..=max_sublayer {
                    if self.sublayer_delays_present_flag[i] {
                        self.du_common_cpb_removal_delay_increment_minus1[i] =
                            r.read_bits(increment_len)?;
                    }
                }

                for i in temporal_id..max_sublayer {
                    if !self.sublayer_delays_present_flag[i] {
                        self.du_common_cpb_removal_delay_increment_minus1[i] =
                            self.du_common_cpb_removal_delay_increment_minus1[max_sublayer];
                    }
                }
            }
        }

        for i in 0..=self.num_decoding_units_minus1 {
            self.num_nalus_in_du_minus1.push(r.read_ue()?);

            let mut increments = [0; MAX_SUBLAYERS];
            if !self.du_common_cpb_removal_delay_flag && i < self.num_decoding_units_minus1 {
                for j in temporal_id..=max_sublayer {
                    if self.sublayer_delays_present_flag[j] {
                        increments[j] = r.read_bits(increment_len)?;
                    }
                }

                for j in 0..max_sublayer {
                    if j < temporal_id || !self.sublayer_delays_present_flag[j] {
                        increments[j] = increments[max_sublayer];
                    }
                }
            }
            self.du_cpb_removal_delay_increment_minus1.push(increments);
        }

        Ok(())
    }

    fn parse(r: &mut NaluReader, bp: &BufferingPeriod, temporal_id: u8) -> ParseResult<PicTiming> {
        log::trace!("parsing \"Picture Timing\"");

        let max_sublayer = usize::from(bp.max_sublayers_minus1);
        let temporal_id = usize::from(temporal_id);
        let removal_delay_len = usize::from(bp.cpb_removal_delay_length_minus1) + 1;

        let mut pt = PicTiming::default();
        pt.cpb_removal_delay_minus1[max_sublayer] = r.read_bits(removal_delay_len)?;
        pt.sublayer_delays_present_flag[max_sublayer] = true;

        for i in temporal_id..max_sublayer {
            pt.sublayer_delays_present_flag[i] = r.read_bit()?;
            if !pt.sublayer_delays_present_flag[i] {
                continue;
            }

            if bp.cpb_removal_delay_deltas_present_flag {
                pt.cpb_removal_delay_delta_enabled_flag[i] = r.read_bit()?;
            }

            if pt.cpb_removal_delay_delta_enabled_flag[i] {
                if bp.num_cpb_removal_delay_deltas_minus1 > 0 {
                    let num_deltas = u32::from(bp.num_cpb_removal_delay_deltas_minus1) + 1;
                    pt.cpb_removal_delay_delta_idx[i] =
                        r.read_bits_max(ceil_log2(num_deltas), num_deltas - 1)?;
                }
            } else {
                pt.cpb_removal_delay_minus1[i] = r.read_bits(removal_delay_len)?;
            }
        }

        pt.dpb_output_delay = r.read_bits(usize::from(bp.dpb_output_delay_length_minus1) + 1)?;

        if bp.alt_cpb_params_present_flag {
            pt.cpb_alt_timing_info_present_flag = r.read_bit()?;
            if pt.cpb_alt_timing_info_present_flag {
                if bp.nal_hrd_params_present_flag {
                    Self::parse_alt_timing(
                        r,
                        bp,
                        &mut pt.nal_cpb_alt_initial_removal_delay_delta,
                        &mut pt.nal_cpb_alt_initial_removal_offset_delta,
                        &mut pt.nal_cpb_delay_offset,
                        &mut pt.nal_dpb_delay_offset,
                    )?;
                }

                if bp.vcl_hrd_params_present_flag {
                    Self::parse_alt_timing(
                        r,
                        bp,
                        &mut pt.vcl_cpb_alt_initial_removal_delay_delta,
                        &mut pt.vcl_cpb_alt_initial_removal_offset_delta,
                        &mut pt.vcl_cpb_delay_offset,
                        &mut pt.vcl_dpb_delay_offset,
                    )?;
                }
            }
        }

        if bp.du_hrd_params_present_flag && bp.du_dpb_params_in_pic_timing_sei_flag {
            pt.dpb_output_du_delay =
                r.read_bits(usize::from(bp.dpb_output_delay_du_length_minus1) + 1)?;
        }

        if bp.du_hrd_params_present_flag && bp.du_cpb_params_in_pic_timing_sei_flag {
            pt.parse_decoding_units(r, bp, temporal_id)?;
        }

        if bp.additional_concatenation_info_present_flag {
            pt.delay_for_concatenation_ensured_flag = r.read_bit()?;
        }

        pt.display_elemental_periods_minus1 = r.read_bits(8)?;

        Ok(pt)
    }
}

/// Decoding unit information SEI message, D.3.3.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DuInfo {
    pub decoding_unit_idx: u32,
    pub sublayer_delays_present_flag: [bool; MAX_SUBLAYERS],
    pub du_cpb_removal_delay_increment: [u32; MAX_SUBLAYERS],
    pub dpb_output_du_delay_present_flag: bool,
    pub dpb_output_du_delay: u32,
}

impl DuInfo {
    fn parse(r: &mut NaluReader, bp: &BufferingPeriod, temporal_id: u8) -> ParseResult<DuInfo> {
        log::trace!("parsing \"DU Info\"");

        let max_sublayer = usize::from(bp.max_sublayers_minus1);

        let mut dui = DuInfo {
            decoding_unit_idx: r.read_ue()?,
            ..Default::default()
        };

        if !bp.du_cpb_params_in_pic_timing_sei_flag {
            let increment_len = usize::from(bp.du_cpb_removal_delay_increment_length_minus1) + 1;
            dui.sublayer_delays_present_flag[max_sublayer] = true;

            for i in usize::from(temporal_id)..=max_sublayer {
                if i < max_sublayer {
                    dui.sublayer_delays_present_flag[i] = r.read_bit()?;
                }

                if dui.sublayer_delays_present_flag[i] {
                    dui.du_cpb_removal_delay_increment[i] = r.read_bits(increment_len)?;
                }
            }

            for i in 0..max_sublayer {
                if !dui.sublayer_delays_present_flag[i] {
                    dui.du_cpb_removal_delay_increment[i] =
                        dui.du_cpb_removal_delay_increment[max_sublayer];
                }
            }
        }

        if !bp.du_dpb_params_in_pic_timing_sei_flag {
            dui.dpb_output_du_delay_present_flag = r.read_bit()?;
        }

        if dui.dpb_output_du_delay_present_flag {
            dui.dpb_output_du_delay =
                r.read_bits(usize::from(bp.dpb_output_delay_du_length_minus1) + 1)?;
        }

        Ok(dui)
    }
}

/// Scalable nesting SEI message, D.6.1. Only the nesting information is
/// parsed, the nested messages are skipped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScalableNesting {
    pub ols_flag: bool,
    pub subpic_flag: bool,
    pub num_olss_minus1: u16,
    pub ols_idx_delta_minus1: Vec<u16>,
    pub all_layers_flag: bool,
    pub num_layers_minus1: u8,
    /// `layer_id[0]` is the layer of the SEI NAL unit.
    pub layer_id: Vec<u8>,
    pub num_subpics_minus1: u16,
    pub subpic_id_len_minus1: u8,
    pub subpic_id: Vec<u16>,
    pub num_seis_minus1: u8,
}

impl ScalableNesting {
    fn parse(r: &mut NaluReader, nuh_layer_id: u8) -> ParseResult<ScalableNesting> {
        log::trace!("parsing \"Scalable Nesting\"");

        let mut sn = ScalableNesting {
            ols_flag: r.read_bit()?,
            subpic_flag: r.read_bit()?,
            ..Default::default()
        };

        if sn.ols_flag {
            sn.num_olss_minus1 = r.read_ue_max(MAX_TOTAL_NUM_OLSS as u32 - 1)?;
            for _ in 0..=sn.num_olss_minus1 {
                sn.ols_idx_delta_minus1.push(r.read_ue_max(MAX_TOTAL_NUM_OLSS as u32 - 2)?);
            }
        } else {
            sn.all_layers_flag = r.read_bit()?;
            if !sn.all_layers_flag {
                sn.num_layers_minus1 = r.read_ue_max(MAX_LAYERS as u32 - 1)?;
                sn.layer_id.push(nuh_layer_id);
                for _ in 1..=sn.num_layers_minus1 {
                    sn.layer_id.push(r.read_bits(6)?);
                }
            }
        }

        if sn.subpic_flag {
            sn.num_subpics_minus1 = r.read_ue_max(MAX_SLICES_PER_AU as u32 - 1)?;
            sn.subpic_id_len_minus1 = r.read_ue_max(15)?;
            for _ in 0..=sn.num_subpics_minus1 {
                sn.subpic_id.push(r.read_bits(usize::from(sn.subpic_id_len_minus1) + 1)?);
            }
        }

        sn.num_seis_minus1 = r.read_ue_max(63)?;
        r.skip_to_byte_alignment()?;

        Ok(sn)
    }
}

/// Subpicture level information SEI message, D.7.1.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubpicLevelInfo {
    pub num_ref_levels_minus1: u8,
    pub cbr_constraint_flag: bool,
    pub explicit_fraction_present_flag: bool,
    pub num_subpics_minus1: u16,
    pub max_sublayers_minus1: u8,
    pub sublayer_info_present_flag: bool,
    pub non_subpic_layers_fraction: [[u8; MAX_SUBLAYERS]; MAX_SLI_REF_LEVELS],
    pub ref_level_idc: [[u8; MAX_SUBLAYERS]; MAX_SLI_REF_LEVELS],
    /// Indexed by reference level, subpicture and sublayer.
    pub ref_level_fraction_minus1: Vec<Vec<[u8; MAX_SUBLAYERS]>>,
}

impl SubpicLevelInfo {
    fn parse(r: &mut NaluReader) -> ParseResult<SubpicLevelInfo> {
        log::trace!("parsing \"Subpic Level Info\"");

        let mut sli = SubpicLevelInfo {
            num_ref_levels_minus1: r.read_bits(3)?,
            cbr_constraint_flag: r.read_bit()?,
            explicit_fraction_present_flag: r.read_bit()?,
            ..Default::default()
        };

        if sli.explicit_fraction_present_flag {
            sli.num_subpics_minus1 = r.read_ue_max(MAX_SLICES_PER_AU as u32 - 1)?;
        }

        sli.max_sublayers_minus1 = r.read_bits_max(3, MAX_SUBLAYERS as u32 - 1)?;
        sli.sublayer_info_present_flag = r.read_bit()?;
        r.skip_to_byte_alignment()?;

        let num_ref_levels = usize::from(sli.num_ref_levels_minus1) + 1;
        let num_subpics = if sli.explicit_fraction_present_flag {
            usize::from(sli.num_subpics_minus1) + 1
        } else {
            0
        };
        sli.ref_level_fraction_minus1 = vec![vec![[0; MAX_SUBLAYERS]; num_subpics]; num_ref_levels];

        let max_sublayer = usize::from(sli.max_sublayers_minus1);
        let first_sublayer = if sli.sublayer_info_present_flag { 0 } else { max_sublayer };

        for k in first_sublayer..=max_sublayer {
            for i in 0..num_ref_levels {
                sli.non_subpic_layers_fraction[i][k] = r.read_bits(8)?;
                sli.ref_level_idc[i][k] = r.read_bits(8)?;

                for j in 0..num_subpics {
                    sli.ref_level_fraction_minus1[i][j][k] = r.read_bits(8)?;
                }
            }
        }

        // Lower sublayers share the values of the highest one.
        for k in 0..first_sublayer {
            for i in 0..num_ref_levels {
                sli.non_subpic_layers_fraction[i][k] = sli.non_subpic_layers_fraction[i][max_sublayer];
                sli.ref_level_idc[i][k] = sli.ref_level_idc[i][max_sublayer];
                for j in 0..num_subpics {
                    sli.ref_level_fraction_minus1[i][j][k] =
                        sli.ref_level_fraction_minus1[i][j][max_sublayer];
                }
            }
        }

        Ok(sli)
    }
}

/// Frame-field information SEI message, D.5.1.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameFieldInfo {
    pub field_pic_flag: bool,
    pub bottom_field_flag: bool,
    pub pairing_indicated_flag: bool,
    pub paired_with_next_field_flag: bool,
    pub display_fields_from_frame_flag: bool,
    pub top_field_first_flag: bool,
    pub display_elemental_periods_minus1: u8,
    pub source_scan_type: u8,
    pub duplicate_flag: bool,
}

impl FrameFieldInfo {
    fn parse(r: &mut NaluReader) -> ParseResult<FrameFieldInfo> {
        log::trace!("parsing \"Frame Field Info\"");

        let mut ffi = FrameFieldInfo {
            field_pic_flag: r.read_bit()?,
            ..Default::default()
        };

        if ffi.field_pic_flag {
            ffi.bottom_field_flag = r.read_bit()?;
            ffi.pairing_indicated_flag = r.read_bit()?;
            if ffi.pairing_indicated_flag {
                ffi.paired_with_next_field_flag = r.read_bit()?;
            }
        } else {
            ffi.display_fields_from_frame_flag = r.read_bit()?;
            if ffi.display_fields_from_frame_flag {
                ffi.top_field_first_flag = r.read_bit()?;
            }
            ffi.display_elemental_periods_minus1 = r.read_bits(8)?;
        }

        ffi.source_scan_type = r.read_bits(2)?;
        ffi.duplicate_flag = r.read_bit()?;

        Ok(ffi)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SeiPayload {
    BufferingPeriod(BufferingPeriod),
    PicTiming(PicTiming),
    DuInfo(DuInfo),
    ScalableNesting(ScalableNesting),
    SubpicLevelInfo(SubpicLevelInfo),
    FrameFieldInfo(FrameFieldInfo),
    /// A payload this parser does not interpret. Its bytes were skipped.
    #[default]
    Unparsed,
}

/// A `sei_message()`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeiMessage {
    pub payload_type: u32,
    /// Size of the payload in bytes.
    pub payload_size: u32,
    pub payload: SeiPayload,
}

/// Reads a value coded as a run of 0xff bytes followed by a last byte.
fn read_ff_coded(r: &mut NaluReader) -> ParseResult<u32> {
    let mut value = 0u32;

    loop {
        let byte: u32 = r.read_bits(8)?;
        value = value.saturating_add(byte);
        if byte != 0xff {
            return Ok(value);
        }
    }
}

impl SeiMessage {
    /// Parses a single SEI message. `buffering_period` is the last buffering
    /// period of the stream, which picture timing and decoding unit
    /// information messages depend on. A new buffering period is only
    /// returned in the payload, storing it is up to the caller.
    pub(crate) fn parse(
        r: &mut NaluReader,
        nalu_type: NaluType,
        nuh_layer_id: u8,
        temporal_id: u8,
        buffering_period: Option<&BufferingPeriod>,
    ) -> ParseResult<SeiMessage> {
        log::trace!("parsing \"SEI Message\" in {:?} NAL unit", nalu_type);

        let mut sei = SeiMessage {
            payload_type: read_ff_coded(r)?,
            payload_size: read_ff_coded(r)?,
            ..Default::default()
        };

        let payload_start = r.rbsp_position();
        let payload_size = sei.payload_size as usize;
        log::trace!(
            "SEI message received: payload type {}, payload size {} bytes",
            sei.payload_type,
            sei.payload_size
        );

        let prefix = matches!(nalu_type, NaluType::PrefixSei);

        sei.payload = match SeiPayloadType::n(sei.payload_type) {
            Some(SeiPayloadType::BufferingPeriod) if prefix => {
                SeiPayload::BufferingPeriod(BufferingPeriod::parse(r)?)
            }
            Some(SeiPayloadType::PicTiming) if prefix => {
                let Some(bp) = buffering_period else {
                    broken_link!("Picture timing SEI without a buffering period");
                };
                SeiPayload::PicTiming(PicTiming::parse(r, bp, temporal_id)?)
            }
            Some(SeiPayloadType::DecodingUnitInfo) if prefix => {
                let Some(bp) = buffering_period else {
                    broken_link!("DU info SEI without a buffering period");
                };
                SeiPayload::DuInfo(DuInfo::parse(r, bp, temporal_id)?)
            }
            Some(SeiPayloadType::FrameFieldInfo) if prefix => {
                SeiPayload::FrameFieldInfo(FrameFieldInfo::parse(r)?)
            }
            Some(SeiPayloadType::SubpicLevelInfo) if prefix => {
                SeiPayload::SubpicLevelInfo(SubpicLevelInfo::parse(r)?)
            }
            Some(SeiPayloadType::ScalableNesting) => {
                SeiPayload::ScalableNesting(ScalableNesting::parse(r, nuh_layer_id)?)
            }
            _ => {
                r.skip_bits((8 * payload_size).min(r.num_bits_left()))?;
                SeiPayload::Unparsed
            }
        };

        if r.rbsp_position() > payload_start + 8 * payload_size {
            broken_data!(
                "SEI payload of type {} is larger than its {} bytes",
                sei.payload_type,
                sei.payload_size
            );
        }

        // Skip any payload extension and the payload alignment bits.
        while r.has_more_data_in_payload(payload_start, payload_size) {
            r.skip_bits(1)?;
            r.skip_to_byte_alignment()?;
        }

        Ok(sei)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::h266::test_utils::NaluWriter;
    use crate::error::ParseError;

    /// Appends a message whose payload was written to `payload`, terminating
    /// the payload with alignment bits if needed.
    fn write_message(w: &mut NaluWriter, payload_type: u32, payload: &mut NaluWriter) {
        if !payload.aligned() {
            payload.write_flag(true).align();
        }

        let bytes = payload.rbsp();
        let mut payload_type = payload_type;
        while payload_type >= 0xff {
            w.write_f(8, 0xffu8);
            payload_type -= 0xff;
        }
        w.write_f(8, payload_type).write_f(8, bytes.len() as u32);
        for byte in bytes {
            w.write_f(8, byte);
        }
    }

    /// Parses every message of `r`. `bp` is updated if all of them parse.
    fn parse_messages(
        mut r: NaluReader,
        nalu_type: NaluType,
        temporal_id: u8,
        bp: &mut Option<BufferingPeriod>,
    ) -> ParseResult<Vec<SeiMessage>> {
        let mut current = bp.clone();
        let mut messages = vec![];

        loop {
            let message = SeiMessage::parse(&mut r, nalu_type, 0, temporal_id, current.as_ref())?;
            if let SeiPayload::BufferingPeriod(new_bp) = &message.payload {
                current = Some(new_bp.clone());
            }
            messages.push(message);

            if !r.has_more_rbsp_data() {
                *bp = current;
                return Ok(messages);
            }
        }
    }

    fn parse_all(
        data: &[u8],
        nalu_type: NaluType,
        temporal_id: u8,
        bp: &mut Option<BufferingPeriod>,
    ) -> ParseResult<Vec<SeiMessage>> {
        parse_messages(NaluReader::without_epb(data), nalu_type, temporal_id, bp)
    }

    /// A buffering period with two sublayers, NAL HRD parameters for one CPB
    /// and decoding unit parameters in the picture timing messages.
    fn write_buffering_period(p: &mut NaluWriter) {
        p.write_flag(true) // nal_hrd_params_present_flag
            .write_flag(false) // vcl_hrd_params_present_flag
            .write_f(5, 23u8) // cpb_initial_removal_delay_length_minus1
            .write_f(5, 15u8) // cpb_removal_delay_length_minus1
            .write_f(5, 4u8) // dpb_output_delay_length_minus1
            .write_flag(true) // du_hrd_params_present_flag
            .write_f(5, 7u8) // du_cpb_removal_delay_increment_length_minus1
            .write_f(5, 3u8) // dpb_output_delay_du_length_minus1
            .write_flag(true) // du_cpb_params_in_pic_timing_sei_flag
            .write_flag(false) // du_dpb_params_in_pic_timing_sei_flag
            .write_flag(false) // concatenation_flag
            .write_flag(false) // additional_concatenation_info_present_flag
            .write_f(16, 0u16) // cpb_removal_delay_delta_minus1
            .write_f(3, 1u8) // max_sublayers_minus1
            .write_flag(true) // cpb_removal_delay_deltas_present_flag
            .write_ue(1u32) // num_cpb_removal_delay_deltas_minus1
            .write_f(16, 2u16)
            .write_f(16, 3u16)
            .write_ue(0u32) // cpb_cnt_minus1
            .write_flag(false) // sublayer_initial_cpb_removal_delay_present_flag
            .write_f(24, 90000u32)
            .write_f(24, 10u32)
            .write_f(24, 45000u32)
            .write_f(24, 20u32)
            .write_flag(false) // sublayer_dpb_output_offsets_present_flag
            .write_flag(false); // alt_cpb_params_present_flag
    }

    #[test]
    fn buffering_period_then_pic_timing() {
        let mut w = NaluWriter::new();

        let mut p = NaluWriter::new();
        write_buffering_period(&mut p);
        write_message(&mut w, 0, &mut p);

        let mut p = NaluWriter::new();
        p.write_f(16, 41u16) // cpb_removal_delay_minus1[1]
            .write_flag(true) // sublayer_delays_present_flag[0]
            .write_flag(true) // cpb_removal_delay_delta_enabled_flag[0]
            .write_f(1, 1u8) // cpb_removal_delay_delta_idx[0]
            .write_f(5, 6u8) // dpb_output_delay
            .write_ue(1u32) // num_decoding_units_minus1
            .write_flag(false) // du_common_cpb_removal_delay_flag
            .write_ue(3u32) // num_nalus_in_du_minus1[0]
            .write_f(8, 5u8) // du_cpb_removal_delay_increment_minus1[0][0]
            .write_f(8, 9u8) // du_cpb_removal_delay_increment_minus1[0][1]
            .write_ue(0u32) // num_nalus_in_du_minus1[1]
            .write_f(8, 1u8); // display_elemental_periods_minus1
        write_message(&mut w, 1, &mut p);
        w.trailing_bits();

        let mut bp = None;
        let messages = parse_all(&w.rbsp(), NaluType::PrefixSei, 0, &mut bp).unwrap();
        assert_eq!(messages.len(), 2);

        let SeiPayload::BufferingPeriod(parsed_bp) = &messages[0].payload else {
            panic!("unexpected payload {:?}", messages[0].payload);
        };
        assert_eq!(parsed_bp.max_sublayers_minus1, 1);
        assert_eq!(parsed_bp.cpb_removal_delay_delta_val, vec![2, 3]);
        assert_eq!(parsed_bp.nal_initial_cpb_removal_delay[1][0], 90000);
        assert_eq!(parsed_bp.nal_initial_alt_cpb_removal_offset[1][0], 20);
        assert_eq!(bp.as_ref(), Some(parsed_bp));

        let SeiPayload::PicTiming(pt) = &messages[1].payload else {
            panic!("unexpected payload {:?}", messages[1].payload);
        };
        assert_eq!(pt.cpb_removal_delay_minus1[1], 41);
        assert_eq!(pt.cpb_removal_delay_delta_idx[0], 1);
        assert_eq!(pt.dpb_output_delay, 6);
        assert_eq!(pt.num_nalus_in_du_minus1, vec![3, 0]);
        assert_eq!(pt.du_cpb_removal_delay_increment_minus1[0][..2], [5, 9]);
        assert_eq!(pt.display_elemental_periods_minus1, 1);
    }

    /// A single sublayer buffering period with NAL HRD parameters and zero
    /// initial delay and offset. Its RBSP has long runs of zero bytes.
    fn write_zero_delay_buffering_period(p: &mut NaluWriter) {
        p.write_flag(true) // nal_hrd_params_present_flag
            .write_flag(false) // vcl_hrd_params_present_flag
            .write_f(5, 23u8) // cpb_initial_removal_delay_length_minus1
            .write_f(5, 15u8) // cpb_removal_delay_length_minus1
            .write_f(5, 4u8) // dpb_output_delay_length_minus1
            .write_flag(false) // du_hrd_params_present_flag
            .write_flag(false) // concatenation_flag
            .write_flag(false) // additional_concatenation_info_present_flag
            .write_f(16, 0u16) // cpb_removal_delay_delta_minus1
            .write_f(3, 0u8) // max_sublayers_minus1
            .write_ue(0u32) // cpb_cnt_minus1
            .write_f(24, 0u32) // nal_initial_cpb_removal_delay
            .write_f(24, 0u32) // nal_initial_cpb_removal_offset
            .write_flag(false); // alt_cpb_params_present_flag
    }

    #[test]
    fn escaped_payloads() {
        let mut w = NaluWriter::new();

        // User data unregistered starting with a start code pattern.
        let mut p = NaluWriter::new();
        for byte in [0u8, 0, 0, 1, 0, 0, 2, 7].into_iter().chain(8..18) {
            p.write_f(8, byte);
        }
        write_message(&mut w, 5, &mut p);

        let mut p = NaluWriter::new();
        write_zero_delay_buffering_period(&mut p);
        write_message(&mut w, 0, &mut p);
        w.trailing_bits();

        let nal = w.nal(NaluType::PrefixSei, 0, 0);
        // Header plus at least one emulation prevention byte per payload.
        assert!(nal.len() >= w.rbsp().len() + 2 + 2);

        let mut bp = None;
        let r = NaluReader::new(&nal[2..]);
        let messages = parse_messages(r, NaluType::PrefixSei, 0, &mut bp).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].payload_size, 18);
        assert_eq!(messages[0].payload, SeiPayload::Unparsed);
        assert_eq!(messages[1].payload_size, 12);

        let SeiPayload::BufferingPeriod(parsed_bp) = &messages[1].payload else {
            panic!("unexpected payload {:?}", messages[1].payload);
        };
        assert_eq!(parsed_bp.cpb_initial_removal_delay_length_minus1, 23);
        assert_eq!(parsed_bp.nal_initial_cpb_removal_delay[0][0], 0);
        assert!(!parsed_bp.alt_cpb_params_present_flag);
        assert_eq!(bp.as_ref(), Some(parsed_bp));
    }

    #[test]
    fn oversized_buffering_period_is_not_kept() {
        let mut p = NaluWriter::new();
        write_zero_delay_buffering_period(&mut p);
        let payload = p.rbsp();

        // The declared size is one byte short of the payload.
        let mut w = NaluWriter::new();
        w.write_f(8, 0u8).write_f(8, payload.len() as u32 - 1);
        for byte in payload {
            w.write_f(8, byte);
        }
        w.trailing_bits();

        let nal = w.nal(NaluType::PrefixSei, 0, 0);
        let mut bp = None;
        let r = NaluReader::new(&nal[2..]);
        let err = parse_messages(r, NaluType::PrefixSei, 0, &mut bp).unwrap_err();
        assert!(matches!(err, ParseError::BrokenData(_)));
        assert_eq!(bp, None);
    }

    #[test]
    fn pic_timing_without_buffering_period() {
        let mut w = NaluWriter::new();
        let mut p = NaluWriter::new();
        p.write_f(16, 0u16);
        write_message(&mut w, 1, &mut p);
        w.trailing_bits();

        let err = parse_all(&w.rbsp(), NaluType::PrefixSei, 0, &mut None).unwrap_err();
        assert!(matches!(err, ParseError::BrokenLink(_)));
    }

    #[test]
    fn du_info() {
        let mut w = NaluWriter::new();
        let mut p = NaluWriter::new();
        write_buffering_period(&mut p);
        write_message(&mut w, 0, &mut p);
        w.trailing_bits();

        let mut bp = None;
        parse_all(&w.rbsp(), NaluType::PrefixSei, 0, &mut bp).unwrap();
        bp.as_mut().unwrap().du_cpb_params_in_pic_timing_sei_flag = false;

        let mut w = NaluWriter::new();
        let mut p = NaluWriter::new();
        p.write_ue(2u32) // decoding_unit_idx
            .write_flag(false) // sublayer_delays_present_flag[0]
            .write_f(8, 17u8) // du_cpb_removal_delay_increment[1]
            .write_flag(true) // dpb_output_du_delay_present_flag
            .write_f(4, 3u8);
        write_message(&mut w, 130, &mut p);
        w.trailing_bits();

        let messages = parse_all(&w.rbsp(), NaluType::PrefixSei, 0, &mut bp).unwrap();
        let SeiPayload::DuInfo(dui) = &messages[0].payload else {
            panic!("unexpected payload {:?}", messages[0].payload);
        };
        assert_eq!(dui.decoding_unit_idx, 2);
        assert_eq!(dui.sublayer_delays_present_flag[..2], [false, true]);
        assert_eq!(dui.du_cpb_removal_delay_increment[..2], [17, 17]);
        assert_eq!(dui.dpb_output_du_delay, 3);
    }

    #[test]
    fn unknown_payloads_are_skipped() {
        let mut w = NaluWriter::new();

        // User data unregistered: a UUID and two bytes.
        let mut p = NaluWriter::new();
        for byte in 0..18u8 {
            p.write_f(8, byte);
        }
        write_message(&mut w, 5, &mut p);

        let mut p = NaluWriter::new();
        p.write_flag(false) // field_pic_flag
            .write_flag(true) // display_fields_from_frame_flag
            .write_flag(true) // top_field_first_flag
            .write_f(8, 2u8) // display_elemental_periods_minus1
            .write_f(2, 1u8) // source_scan_type
            .write_flag(false); // duplicate_flag
        write_message(&mut w, 168, &mut p);
        w.trailing_bits();

        let messages = parse_all(&w.rbsp(), NaluType::PrefixSei, 0, &mut None).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].payload_type, 5);
        assert_eq!(messages[0].payload_size, 18);
        assert_eq!(messages[0].payload, SeiPayload::Unparsed);

        let SeiPayload::FrameFieldInfo(ffi) = &messages[1].payload else {
            panic!("unexpected payload {:?}", messages[1].payload);
        };
        assert!(ffi.top_field_first_flag);
        assert_eq!(ffi.display_elemental_periods_minus1, 2);
        assert_eq!(ffi.source_scan_type, 1);
    }

    #[test]
    fn subpic_level_info() {
        let mut w = NaluWriter::new();
        let mut p = NaluWriter::new();
        p.write_f(3, 0u8) // num_ref_levels_minus1
            .write_flag(false) // cbr_constraint_flag
            .write_flag(true) // explicit_fraction_present_flag
            .write_ue(1u32) // num_subpics_minus1
            .write_f(3, 2u8) // max_sublayers_minus1
            .write_flag(false) // sublayer_info_present_flag
            .align()
            .write_f(8, 10u8) // non_subpic_layers_fraction
            .write_f(8, 83u8) // ref_level_idc
            .write_f(8, 100u8)
            .write_f(8, 150u8);
        write_message(&mut w, 203, &mut p);
        w.trailing_bits();

        let messages = parse_all(&w.rbsp(), NaluType::PrefixSei, 0, &mut None).unwrap();
        let SeiPayload::SubpicLevelInfo(sli) = &messages[0].payload else {
            panic!("unexpected payload {:?}", messages[0].payload);
        };
        assert_eq!(sli.ref_level_idc[0][..3], [83, 83, 83]);
        assert_eq!(sli.ref_level_fraction_minus1[0][1][2], 150);
        assert_eq!(sli.ref_level_fraction_minus1[0][0][0], 100);
    }

    #[test]
    fn scalable_nesting_in_suffix() {
        let mut w = NaluWriter::new();
        let mut p = NaluWriter::new();
        p.write_flag(false) // ols_flag
            .write_flag(true) // subpic_flag
            .write_flag(false) // all_layers_flag
            .write_ue(1u32) // num_layers_minus1
            .write_f(6, 4u8)
            .write_ue(0u32) // num_subpics_minus1
            .write_ue(3u32) // subpic_id_len_minus1
            .write_f(4, 9u8)
            .write_ue(0u32) // num_seis_minus1
            .align();
        // A nested decoded picture hash, not interpreted.
        p.write_f(8, 132u8).write_f(8, 2u8).write_f(16, 0xabcdu16);
        write_message(&mut w, 133, &mut p);
        w.trailing_bits();

        let messages = parse_all(&w.rbsp(), NaluType::SuffixSei, 0, &mut None).unwrap();
        assert_eq!(messages.len(), 1);
        let SeiPayload::ScalableNesting(sn) = &messages[0].payload else {
            panic!("unexpected payload {:?}", messages[0].payload);
        };
        assert_eq!(sn.layer_id, vec![0, 4]);
        assert_eq!(sn.subpic_id, vec![9]);
    }

    #[test]
    fn truncated_payload() {
        let mut w = NaluWriter::new();
        w.write_f(8, 168u8).write_f(8, 10u8).write_f(8, 0u8).trailing_bits();

        assert!(parse_all(&w.rbsp(), NaluType::PrefixSei, 0, &mut None).is_err());
    }
}
