// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::codec::h266::tables::ASPECT_RATIOS;
use crate::codec::h266::tables::EXTENDED_SAR;
use crate::error::ParseResult;
use crate::utils::nalu_reader::NaluReader;

/// Video usability information, H.274 clause 7.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VuiParams {
    pub progressive_source_flag: bool,
    pub interlaced_source_flag: bool,
    pub non_packed_constraint_flag: bool,
    pub non_projected_constraint_flag: bool,
    pub aspect_ratio_info_present_flag: bool,
    pub aspect_ratio_constant_flag: bool,
    pub aspect_ratio_idc: u8,
    pub sar_width: u16,
    pub sar_height: u16,
    pub overscan_info_present_flag: bool,
    pub overscan_appropriate_flag: bool,
    pub colour_description_present_flag: bool,
    pub colour_primaries: u8,
    pub transfer_characteristics: u8,
    pub matrix_coeffs: u8,
    pub full_range_flag: bool,
    pub chroma_loc_info_present_flag: bool,
    pub chroma_sample_loc_type_frame: u8,
    pub chroma_sample_loc_type_top_field: u8,
    pub chroma_sample_loc_type_bottom_field: u8,
    /// Pixel aspect ratio numerator.
    pub par_n: u32,
    /// Pixel aspect ratio denominator.
    pub par_d: u32,
}

impl Default for VuiParams {
    fn default() -> Self {
        // Unspecified colour description and chroma location, D.8.
        Self {
            progressive_source_flag: false,
            interlaced_source_flag: false,
            non_packed_constraint_flag: false,
            non_projected_constraint_flag: false,
            aspect_ratio_info_present_flag: false,
            aspect_ratio_constant_flag: false,
            aspect_ratio_idc: 0,
            sar_width: 0,
            sar_height: 0,
            overscan_info_present_flag: false,
            overscan_appropriate_flag: false,
            colour_description_present_flag: false,
            colour_primaries: 2,
            transfer_characteristics: 2,
            matrix_coeffs: 2,
            full_range_flag: false,
            chroma_loc_info_present_flag: false,
            chroma_sample_loc_type_frame: 6,
            chroma_sample_loc_type_top_field: 6,
            chroma_sample_loc_type_bottom_field: 6,
            par_n: 0,
            par_d: 0,
        }
    }
}

impl VuiParams {
    fn parse_parameters(&mut self, r: &mut NaluReader) -> ParseResult<()> {
        log::trace!("parsing \"VUI parameters\"");

        self.progressive_source_flag = r.read_bit()?;
        self.interlaced_source_flag = r.read_bit()?;
        self.non_packed_constraint_flag = r.read_bit()?;
        self.non_projected_constraint_flag = r.read_bit()?;

        self.aspect_ratio_info_present_flag = r.read_bit()?;
        if self.aspect_ratio_info_present_flag {
            self.aspect_ratio_constant_flag = r.read_bit()?;
            self.aspect_ratio_idc = r.read_bits(8)?;
            if self.aspect_ratio_idc == EXTENDED_SAR {
                self.sar_width = r.read_bits(16)?;
                self.sar_height = r.read_bits(16)?;
                self.par_n = u32::from(self.sar_width);
                self.par_d = u32::from(self.sar_height);
            } else {
                // Reserved values leave the ratio unspecified.
                let (par_n, par_d) = ASPECT_RATIOS
                    .get(usize::from(self.aspect_ratio_idc))
                    .copied()
                    .unwrap_or((0, 0));
                self.par_n = par_n;
                self.par_d = par_d;
            }
        }

        self.overscan_info_present_flag = r.read_bit()?;
        if self.overscan_info_present_flag {
            self.overscan_appropriate_flag = r.read_bit()?;
        }

        self.colour_description_present_flag = r.read_bit()?;
        if self.colour_description_present_flag {
            self.colour_primaries = r.read_bits(8)?;
            self.transfer_characteristics = r.read_bits(8)?;
            self.matrix_coeffs = r.read_bits(8)?;
            self.full_range_flag = r.read_bit()?;
        }

        self.chroma_loc_info_present_flag = r.read_bit()?;
        if self.chroma_loc_info_present_flag {
            if self.progressive_source_flag && !self.interlaced_source_flag {
                self.chroma_sample_loc_type_frame = r.read_ue_max(6)?;
            } else {
                self.chroma_sample_loc_type_top_field = r.read_ue_max(6)?;
                self.chroma_sample_loc_type_bottom_field = r.read_ue_max(6)?;
            }
        }

        Ok(())
    }

    /// Parses `vui_payload()` of `payload_size` bytes, skipping any
    /// extension data.
    pub(crate) fn parse(&mut self, r: &mut NaluReader, payload_size: u32) -> ParseResult<()> {
        log::trace!("parsing \"VUI payload\"");

        let payload_start = r.rbsp_position();

        self.parse_parameters(r)?;

        if r.has_more_data_in_payload(payload_start, payload_size as usize) {
            // vui_payload_bit_equal_to_one
            r.skip_bits(1)?;
            // vui_payload_bit_equal_to_zero
            r.skip_to_byte_alignment()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::h266::test_utils::NaluWriter;

    #[test]
    fn defaults() {
        let mut w = NaluWriter::new();
        // progressive, no aspect ratio, overscan, colour or chroma location.
        w.write_flag(true).write_f(3, 0u8).write_f(4, 0u8).write_flag(true).align();
        let data = w.rbsp();

        let mut vui = VuiParams::default();
        let mut r = NaluReader::without_epb(&data);
        vui.parse(&mut r, 2).unwrap();

        assert!(vui.progressive_source_flag);
        assert_eq!(vui.colour_primaries, 2);
        assert_eq!(vui.matrix_coeffs, 2);
        assert_eq!(vui.chroma_sample_loc_type_top_field, 6);
        assert_eq!((vui.par_n, vui.par_d), (0, 0));
        assert_eq!(r.position(), 16);
    }

    #[test]
    fn aspect_ratios() {
        let parse = |idc: u8| {
            let mut w = NaluWriter::new();
            w.write_f(4, 0u8).write_flag(true).write_flag(false).write_f(8, idc);
            if idc == EXTENDED_SAR {
                w.write_f(16, 4u16).write_f(16, 3u16);
            }
            w.write_f(4, 0u8).align();
            let data = w.rbsp();

            let mut vui = VuiParams::default();
            vui.parse(&mut NaluReader::without_epb(&data), data.len() as u32).unwrap();
            (vui.par_n, vui.par_d)
        };

        assert_eq!(parse(1), (1, 1));
        assert_eq!(parse(13), (160, 99));
        assert_eq!(parse(16), (2, 1));
        assert_eq!(parse(17), (0, 0));
        assert_eq!(parse(EXTENDED_SAR), (4, 3));
    }

    #[test]
    fn chroma_location() {
        let mut w = NaluWriter::new();
        // interlaced source, chroma location present for both fields.
        w.write_flag(false)
            .write_flag(true)
            .write_f(2, 0u8)
            .write_f(3, 0u8)
            .write_flag(true)
            .write_ue(2u32)
            .write_ue(4u32)
            .align();
        let data = w.rbsp();

        let mut vui = VuiParams::default();
        vui.parse(&mut NaluReader::without_epb(&data), data.len() as u32).unwrap();
        assert_eq!(vui.chroma_sample_loc_type_frame, 6);
        assert_eq!(vui.chroma_sample_loc_type_top_field, 2);
        assert_eq!(vui.chroma_sample_loc_type_bottom_field, 4);

        let mut w = NaluWriter::new();
        w.write_f(2, 0b10u8).write_f(5, 0u8).write_flag(true).write_ue(7u32).align();
        let data = w.rbsp();
        let mut vui = VuiParams::default();
        assert!(vui.parse(&mut NaluReader::without_epb(&data), data.len() as u32).is_err());
    }
}
