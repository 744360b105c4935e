// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Buffering models: DPB parameters and the timing HRD parameters shared by
//! the VPS and the SPS.

use crate::codec::h266::parser::MAX_CPB_CNT;
use crate::codec::h266::parser::MAX_DPB_SIZE;
use crate::codec::h266::parser::MAX_SUBLAYERS;
use crate::error::broken_data;
use crate::error::ParseResult;
use crate::utils::nalu_reader::NaluReader;

/// `dpb_parameters()`, 7.3.4.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DpbParameters {
    pub max_dec_pic_buffering_minus1: [u8; MAX_SUBLAYERS],
    pub max_num_reorder_pics: [u8; MAX_SUBLAYERS],
    pub max_latency_increase_plus1: [u32; MAX_SUBLAYERS],
}

impl DpbParameters {
    pub(crate) fn parse(
        &mut self,
        r: &mut NaluReader,
        max_sublayers_minus1: u8,
        sublayer_info_flag: bool,
    ) -> ParseResult<()> {
        log::trace!("parsing \"DPB Parameters\"");

        let max = usize::from(max_sublayers_minus1);
        if max >= MAX_SUBLAYERS {
            broken_data!("Invalid MaxSubLayersMinus1 {}", max);
        }

        let start = if sublayer_info_flag { 0 } else { max };
        for i in start..=max {
            self.max_dec_pic_buffering_minus1[i] = r.read_ue_max(MAX_DPB_SIZE as u32 - 1)?;
            self.max_num_reorder_pics[i] =
                r.read_ue_max(u32::from(self.max_dec_pic_buffering_minus1[i]))?;
            self.max_latency_increase_plus1[i] = r.read_ue_max(i32::MAX as u32 - 1)?;
        }

        // The values of the highest sublayer apply to all the lower ones.
        for i in 0..start {
            self.max_dec_pic_buffering_minus1[i] = self.max_dec_pic_buffering_minus1[max];
            self.max_num_reorder_pics[i] = self.max_num_reorder_pics[max];
            self.max_latency_increase_plus1[i] = self.max_latency_increase_plus1[max];
        }

        Ok(())
    }
}

/// `general_timing_hrd_parameters()`, 7.3.5.1.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeneralHrdParameters {
    pub num_units_in_tick: u32,
    pub time_scale: u32,
    pub general_nal_hrd_params_present_flag: bool,
    pub general_vcl_hrd_params_present_flag: bool,
    pub general_same_pic_timing_in_all_ols_flag: bool,
    pub general_du_hrd_params_present_flag: bool,
    pub tick_divisor_minus2: u8,
    pub bit_rate_scale: u8,
    pub cpb_size_scale: u8,
    pub cpb_size_du_scale: u8,
    pub hrd_cpb_cnt_minus1: u8,
}

impl GeneralHrdParameters {
    pub(crate) fn parse(&mut self, r: &mut NaluReader) -> ParseResult<()> {
        log::trace!("parsing \"General timing HRD Parameters\"");

        self.num_units_in_tick = r.read_bits(32)?;
        self.time_scale = r.read_bits(32)?;

        self.general_nal_hrd_params_present_flag = r.read_bit()?;
        self.general_vcl_hrd_params_present_flag = r.read_bit()?;
        if self.general_nal_hrd_params_present_flag || self.general_vcl_hrd_params_present_flag {
            self.general_same_pic_timing_in_all_ols_flag = r.read_bit()?;
            self.general_du_hrd_params_present_flag = r.read_bit()?;
            if self.general_du_hrd_params_present_flag {
                self.tick_divisor_minus2 = r.read_bits(8)?;
            }

            self.bit_rate_scale = r.read_bits(4)?;
            self.cpb_size_scale = r.read_bits(4)?;
            if self.general_du_hrd_params_present_flag {
                self.cpb_size_du_scale = r.read_bits(4)?;
            }

            self.hrd_cpb_cnt_minus1 = r.read_ue_max(MAX_CPB_CNT as u32 - 1)?;
        }

        Ok(())
    }
}

/// `sublayer_hrd_parameters()`, 7.3.5.3. One entry per CPB specification.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubLayerHrdParameters {
    pub bit_rate_value_minus1: Vec<u32>,
    pub cpb_size_value_minus1: Vec<u32>,
    pub cpb_size_du_value_minus1: Vec<u32>,
    pub bit_rate_du_value_minus1: Vec<u32>,
    pub cbr_flag: Vec<bool>,
    /// Derived bit rate in bits per second, (7-31).
    pub bit_rate: Vec<u64>,
    /// Derived CPB size in bits, (7-32).
    pub cpb_size: Vec<u64>,
}

impl SubLayerHrdParameters {
    fn parse(
        &mut self,
        r: &mut NaluReader,
        sublayer_id: usize,
        general: &GeneralHrdParameters,
    ) -> ParseResult<()> {
        log::trace!("parsing \"SubLayer HRD Parameters\"");

        *self = Default::default();

        for _ in 0..=general.hrd_cpb_cnt_minus1 {
            let bit_rate_value_minus1 = r.read_ue_max::<u32>(u32::MAX - 1)?;
            let cpb_size_value_minus1 = r.read_ue_max::<u32>(u32::MAX - 1)?;

            self.bit_rate_value_minus1.push(bit_rate_value_minus1);
            self.cpb_size_value_minus1.push(cpb_size_value_minus1);
            self.bit_rate
                .push((u64::from(bit_rate_value_minus1) + 1) << (6 + general.bit_rate_scale));
            self.cpb_size
                .push((u64::from(cpb_size_value_minus1) + 1) << (4 + general.cpb_size_scale));

            if general.general_du_hrd_params_present_flag {
                self.cpb_size_du_value_minus1.push(r.read_ue_max(u32::MAX - 1)?);
                self.bit_rate_du_value_minus1.push(r.read_ue_max(u32::MAX - 1)?);
            }

            self.cbr_flag.push(r.read_bit()?);
        }

        for j in 1..self.bit_rate.len() {
            if self.bit_rate_value_minus1[j] <= self.bit_rate_value_minus1[j - 1] {
                broken_data!(
                    "bit_rate_value_minus1[{}][{}] shall be greater than bit_rate_value_minus1[{}][{}]",
                    sublayer_id,
                    j,
                    sublayer_id,
                    j - 1
                );
            }

            if self.cpb_size_value_minus1[j] > self.cpb_size_value_minus1[j - 1] {
                broken_data!(
                    "cpb_size_value_minus1[{}][{}] shall be less than or equal to cpb_size_value_minus1[{}][{}]",
                    sublayer_id,
                    j,
                    sublayer_id,
                    j - 1
                );
            }
        }

        Ok(())
    }
}

/// `ols_timing_hrd_parameters()`, 7.3.5.2.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OlsHrdParameters {
    pub fixed_pic_rate_general_flag: [bool; MAX_SUBLAYERS],
    pub fixed_pic_rate_within_cvs_flag: [bool; MAX_SUBLAYERS],
    pub elemental_duration_in_tc_minus1: [u16; MAX_SUBLAYERS],
    pub low_delay_hrd_flag: [bool; MAX_SUBLAYERS],
    pub nal_sub_layer_hrd_parameters: [SubLayerHrdParameters; MAX_SUBLAYERS],
    pub vcl_sub_layer_hrd_parameters: [SubLayerHrdParameters; MAX_SUBLAYERS],
}

impl OlsHrdParameters {
    pub(crate) fn parse(
        &mut self,
        r: &mut NaluReader,
        general: &GeneralHrdParameters,
        first_sublayer: u8,
        max_sublayers_val: u8,
    ) -> ParseResult<()> {
        log::trace!("parsing \"ols timing HRD Parameters\"");

        let first = usize::from(first_sublayer);
        let max = usize::from(max_sublayers_val);
        if max >= MAX_SUBLAYERS || first > max {
            broken_data!("Invalid sublayer range {}..={}", first, max);
        }

        for i in first..=max {
            self.fixed_pic_rate_general_flag[i] = r.read_bit()?;
            self.fixed_pic_rate_within_cvs_flag[i] = if !self.fixed_pic_rate_general_flag[i] {
                r.read_bit()?
            } else {
                true
            };

            self.low_delay_hrd_flag[i] = false;
            if self.fixed_pic_rate_within_cvs_flag[i] {
                self.elemental_duration_in_tc_minus1[i] = r.read_ue_max(2047)?;
            } else if (general.general_nal_hrd_params_present_flag
                || general.general_vcl_hrd_params_present_flag)
                && general.hrd_cpb_cnt_minus1 == 0
            {
                self.low_delay_hrd_flag[i] = r.read_bit()?;
            }

            if general.general_nal_hrd_params_present_flag {
                self.nal_sub_layer_hrd_parameters[i].parse(r, i, general)?;
            }

            if general.general_vcl_hrd_params_present_flag {
                self.vcl_sub_layer_hrd_parameters[i].parse(r, i, general)?;
            }
        }

        // Sublayers below the first signalled one share the parameters of
        // the highest sublayer.
        for i in 0..first {
            self.fixed_pic_rate_general_flag[i] = self.fixed_pic_rate_general_flag[max];
            self.fixed_pic_rate_within_cvs_flag[i] = self.fixed_pic_rate_within_cvs_flag[max];
            self.elemental_duration_in_tc_minus1[i] = self.elemental_duration_in_tc_minus1[max];
            self.low_delay_hrd_flag[i] = self.low_delay_hrd_flag[max];
            self.nal_sub_layer_hrd_parameters[i] = self.nal_sub_layer_hrd_parameters[max].clone();
            self.vcl_sub_layer_hrd_parameters[i] = self.vcl_sub_layer_hrd_parameters[max].clone();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::h266::test_utils::NaluWriter;
    use crate::error::ParserResult;

    fn write_general(w: &mut NaluWriter, du: bool, cpb_cnt_minus1: u32) {
        w.write_f(32, 1001u32)
            .write_f(32, 60000u32)
            .write_flag(true) // nal
            .write_flag(false) // vcl
            .write_flag(true) // same_pic_timing_in_all_ols
            .write_flag(du);
        if du {
            w.write_f(8, 3u8);
        }
        w.write_f(4, 2u8).write_f(4, 1u8);
        if du {
            w.write_f(4, 5u8);
        }
        w.write_ue(cpb_cnt_minus1);
    }

    #[test]
    fn dpb_inference() {
        let mut w = NaluWriter::new();
        w.write_ue(5u32).write_ue(3u32).write_ue(0u32).align();
        let data = w.rbsp();

        let mut dpb = DpbParameters::default();
        dpb.parse(&mut NaluReader::without_epb(&data), 2, false).unwrap();
        assert_eq!(dpb.max_dec_pic_buffering_minus1[..3], [5, 5, 5]);
        assert_eq!(dpb.max_num_reorder_pics[..3], [3, 3, 3]);

        // max_num_reorder_pics above max_dec_pic_buffering_minus1.
        let mut w = NaluWriter::new();
        w.write_ue(2u32).write_ue(3u32).write_ue(0u32).align();
        let data = w.rbsp();
        let err = dpb.parse(&mut NaluReader::without_epb(&data), 0, true).unwrap_err();
        assert_eq!(err.kind(), ParserResult::BrokenData);
    }

    #[test]
    fn ols_hrd() {
        let mut w = NaluWriter::new();
        write_general(&mut w, false, 1);
        // sublayer 1 only: fixed_pic_rate_general_flag, elemental duration
        w.write_flag(true).write_ue(0u32);
        // two CPB specifications
        w.write_ue(99u32).write_ue(499u32).write_flag(false);
        w.write_ue(199u32).write_ue(299u32).write_flag(true);
        w.align();
        let data = w.rbsp();

        let mut r = NaluReader::without_epb(&data);
        let mut general = GeneralHrdParameters::default();
        general.parse(&mut r).unwrap();
        assert_eq!(general.time_scale, 60000);
        assert_eq!(general.hrd_cpb_cnt_minus1, 1);

        let mut ols = OlsHrdParameters::default();
        ols.parse(&mut r, &general, 1, 1).unwrap();

        let sub = &ols.nal_sub_layer_hrd_parameters[1];
        assert_eq!(sub.bit_rate, vec![100 << 8, 200 << 8]);
        assert_eq!(sub.cpb_size, vec![500 << 5, 300 << 5]);
        assert_eq!(sub.cbr_flag, vec![false, true]);
        assert!(ols.fixed_pic_rate_within_cvs_flag[1]);

        // Sublayer 0 is inferred from sublayer 1.
        assert_eq!(ols.nal_sub_layer_hrd_parameters[0], *sub);
        assert!(ols.fixed_pic_rate_general_flag[0]);
    }

    #[test]
    fn bit_rates_must_increase() {
        let mut w = NaluWriter::new();
        write_general(&mut w, true, 1);
        w.write_flag(false).write_flag(false);
        for bit_rate in [99u32, 99] {
            w.write_ue(bit_rate).write_ue(10u32).write_ue(1u32).write_ue(1u32).write_flag(false);
        }
        w.align();
        let data = w.rbsp();

        let mut r = NaluReader::without_epb(&data);
        let mut general = GeneralHrdParameters::default();
        general.parse(&mut r).unwrap();
        assert!(general.general_du_hrd_params_present_flag);
        assert_eq!(general.cpb_size_du_scale, 5);

        let mut ols = OlsHrdParameters::default();
        let err = ols.parse(&mut r, &general, 0, 0).unwrap_err();
        assert_eq!(err.kind(), ParserResult::BrokenData);
    }
}
