// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! `VvcDecoderConfigurationRecord` as stored in the `vvcC` box of ISO-BMFF
//! files (ISO/IEC 14496-15, 11.2.4.2).

use std::io::Cursor;

use crate::codec::h266::parser::Nalu;
use crate::codec::h266::parser::NaluType;
use crate::codec::h266::parser::MAX_SUBLAYERS;
use crate::codec::h266::ptl::Profile;
use crate::error::broken_data;
use crate::error::ParseResult;
use crate::utils::nalu_reader::NaluReader;

/// Length of the size field preceding each NAL unit of the arrays.
const ARRAY_NAL_LENGTH_SIZE: usize = 2;

/// `VvcPTLRecord`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PtlRecord {
    pub num_bytes_constraint_info: u8,
    pub general_profile_idc: u8,
    pub general_tier_flag: bool,
    pub general_level_idc: u8,
    pub frame_only_constraint_flag: bool,
    pub multilayer_enabled_flag: bool,
    /// `general_constraint_info`, without the two flags above. The last byte
    /// holds its 6 remaining bits.
    pub general_constraint_info: Vec<u8>,
    pub sublayer_level_present_flag: [bool; MAX_SUBLAYERS],
    pub sublayer_level_idc: [u8; MAX_SUBLAYERS],
    pub num_sub_profiles: u8,
    pub general_sub_profile_idc: Vec<u32>,
}

impl PtlRecord {
    pub fn profile(&self) -> Option<Profile> {
        Profile::n(self.general_profile_idc)
    }

    fn parse(r: &mut NaluReader, num_sublayers: u8) -> ParseResult<PtlRecord> {
        // reserved
        r.skip_bits(2)?;

        let mut ptl = PtlRecord {
            num_bytes_constraint_info: r.read_bits(6)?,
            general_profile_idc: r.read_bits(7)?,
            general_tier_flag: r.read_bit()?,
            general_level_idc: r.read_bits(8)?,
            frame_only_constraint_flag: r.read_bit()?,
            multilayer_enabled_flag: r.read_bit()?,
            ..Default::default()
        };

        if ptl.num_bytes_constraint_info == 0 {
            broken_data!("num_bytes_constraint_info shall be greater than 0");
        }

        for _ in 1..ptl.num_bytes_constraint_info {
            ptl.general_constraint_info.push(r.read_bits(8)?);
        }
        ptl.general_constraint_info.push(r.read_bits(6)?);

        let num_sublayers = usize::from(num_sublayers);
        if num_sublayers > 1 {
            for i in (0..num_sublayers - 1).rev() {
                ptl.sublayer_level_present_flag[i] = r.read_bit()?;
            }

            // ptl_reserved_zero_bit
            r.skip_bits(9 - num_sublayers)?;

            for i in (0..num_sublayers - 1).rev() {
                if ptl.sublayer_level_present_flag[i] {
                    ptl.sublayer_level_idc[i] = r.read_bits(8)?;
                }
            }
        }

        ptl.num_sub_profiles = r.read_bits(8)?;
        for _ in 0..ptl.num_sub_profiles {
            ptl.general_sub_profile_idc.push(r.read_bits(32)?);
        }

        Ok(ptl)
    }
}

/// NAL units of one type that are always present for the track.
#[derive(Clone, Debug)]
pub struct NalUnitArray<'a> {
    pub array_completeness: bool,
    /// Raw `NAL_unit_type`, which may be reserved.
    pub nal_unit_type: u8,
    pub nalus: Vec<Nalu<'a>>,
}

impl<'a> NalUnitArray<'a> {
    pub fn nal_unit_type(&self) -> Option<NaluType> {
        NaluType::n(self.nal_unit_type)
    }
}

/// `VvcDecoderConfigurationRecord`. The parameter sets it carries are only
/// framed here, feed them to [`crate::codec::h266::parser::Parser`] to parse
/// them.
#[derive(Clone, Debug, Default)]
pub struct DecoderConfigRecord<'a> {
    pub length_size_minus_one: u8,
    pub ptl_present_flag: bool,
    pub ols_idx: u16,
    pub num_sublayers: u8,
    pub constant_frame_rate: u8,
    pub chroma_format_idc: u8,
    pub bit_depth_minus8: u8,
    pub native_ptl: PtlRecord,
    pub max_picture_width: u16,
    pub max_picture_height: u16,
    pub avg_frame_rate: u16,
    pub nalu_array: Vec<NalUnitArray<'a>>,
}

impl<'a> DecoderConfigRecord<'a> {
    /// Size of the length field of the NAL units in the samples of the
    /// track.
    pub fn nal_length_size(&self) -> usize {
        usize::from(self.length_size_minus_one) + 1
    }

    /// Iterates over every NAL unit of every array, in storage order.
    pub fn nalus(&self) -> impl Iterator<Item = &Nalu<'a>> {
        self.nalu_array.iter().flat_map(|array| array.nalus.iter())
    }

    pub fn parse(data: &'a [u8]) -> ParseResult<DecoderConfigRecord<'a>> {
        log::trace!("parsing \"Decoder configuration record\"");

        if data.len() < 2 {
            broken_data!("vvcC of {} bytes is too small", data.len());
        }

        let mut r = NaluReader::without_epb(data);

        // reserved '11111'b
        r.skip_bits(5)?;

        let mut record = DecoderConfigRecord {
            length_size_minus_one: r.read_bits(2)?,
            ptl_present_flag: r.read_bit()?,
            ..Default::default()
        };

        if record.length_size_minus_one == 2 {
            log::warn!("Invalid LengthSizeMinusOne 2, the NAL length size is 1, 2 or 4");
        }

        if record.ptl_present_flag {
            record.ols_idx = r.read_bits(9)?;
            record.num_sublayers = r.read_bits(3)?;
            record.constant_frame_rate = r.read_bits(2)?;
            record.chroma_format_idc = r.read_bits(2)?;
            record.bit_depth_minus8 = r.read_bits(3)?;
            // reserved '11111'b
            r.skip_bits(5)?;

            record.native_ptl = PtlRecord::parse(&mut r, record.num_sublayers)?;

            record.max_picture_width = r.read_bits(16)?;
            record.max_picture_height = r.read_bits(16)?;
            record.avg_frame_rate = r.read_bits(16)?;
        }

        let num_of_arrays: u8 = r.read_bits(8)?;
        let mut offset = r.position() / 8;

        for _ in 0..num_of_arrays {
            let Some(rest) = data.get(offset..) else {
                broken_data!("NAL unit array starts past the end of vvcC");
            };

            let mut r = NaluReader::without_epb(rest);
            let array_completeness = r.read_bit()?;
            // reserved
            r.skip_bits(2)?;
            let nal_unit_type: u8 = r.read_bits(5)?;

            let num_nalus: u16 = if nal_unit_type == NaluType::Dci as u8
                || nal_unit_type == NaluType::Opi as u8
            {
                1
            } else {
                r.read_bits(16)?
            };

            let mut cursor = Cursor::new(data);
            cursor.set_position((offset + r.position() / 8) as u64);

            let mut nalus = Vec::with_capacity(usize::from(num_nalus));
            for _ in 0..num_nalus {
                nalus.push(Nalu::next_length_prefixed(&mut cursor, ARRAY_NAL_LENGTH_SIZE)?);
            }

            log::debug!(
                "vvcC array of {} NAL units of type {}",
                nalus.len(),
                nal_unit_type
            );

            record.nalu_array.push(NalUnitArray {
                array_completeness,
                nal_unit_type,
                nalus,
            });

            offset = cursor.position() as usize;
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::h266::test_utils::NaluWriter;
    use crate::error::ParseError;

    fn write_header(w: &mut NaluWriter, num_sublayers: u8) {
        w.write_f(5, 0x1fu8)
            .write_f(2, 3u8) // 4 byte lengths
            .write_flag(true)
            .write_f(9, 0u16)
            .write_f(3, num_sublayers)
            .write_f(2, 1u8)
            .write_f(2, 1u8)
            .write_f(3, 2u8)
            .write_f(5, 0x1fu8);

        // VvcPTLRecord with a single constraint byte.
        w.write_f(2, 0u8)
            .write_f(6, 1u8)
            .write_f(7, 1u8)
            .write_flag(false)
            .write_f(8, 83u8)
            .write_flag(true)
            .write_flag(false)
            .write_f(6, 0u8);
        for i in (0..num_sublayers.saturating_sub(1)).rev() {
            w.write_flag(i == 0);
        }
        if num_sublayers > 1 {
            w.write_f(usize::from(9 - num_sublayers), 0u8);
            w.write_f(8, 67u8);
        }
        w.write_f(8, 1u8).write_f(32, 0xdeadbeefu32);

        w.write_f(16, 1920u16).write_f(16, 1080u16).write_f(16, 0u16);
    }

    fn write_array(w: &mut NaluWriter, type_: NaluType, nals: &[Vec<u8>]) {
        w.write_flag(true).write_f(2, 0u8).write_f(5, type_ as u8);
        if !matches!(type_, NaluType::Dci | NaluType::Opi) {
            w.write_f(16, nals.len() as u16);
        }
        for nal in nals {
            w.write_f(16, nal.len() as u16);
            for byte in nal {
                w.write_f(8, *byte);
            }
        }
    }

    fn parameter_set(type_: NaluType, payload: u8) -> Vec<u8> {
        let mut w = NaluWriter::new();
        w.write_f(8, payload).trailing_bits();
        w.nal(type_, 0, 0)
    }

    #[test]
    fn record_with_arrays() {
        let sps = parameter_set(NaluType::Sps, 0xaa);
        let pps0 = parameter_set(NaluType::Pps, 0x11);
        let pps1 = parameter_set(NaluType::Pps, 0x22);

        let mut w = NaluWriter::new();
        write_header(&mut w, 2);
        w.write_f(8, 2u8);
        write_array(&mut w, NaluType::Sps, &[sps.clone()]);
        write_array(&mut w, NaluType::Pps, &[pps0, pps1.clone()]);
        let data = w.rbsp();

        let record = DecoderConfigRecord::parse(&data).unwrap();
        assert_eq!(record.nal_length_size(), 4);
        assert_eq!(record.num_sublayers, 2);
        assert_eq!(record.chroma_format_idc, 1);
        assert_eq!(record.bit_depth_minus8, 2);
        assert_eq!(record.native_ptl.profile(), Some(Profile::Main10));
        assert_eq!(record.native_ptl.general_level_idc, 83);
        assert!(record.native_ptl.frame_only_constraint_flag);
        assert_eq!(record.native_ptl.general_constraint_info, vec![0]);
        assert!(record.native_ptl.sublayer_level_present_flag[0]);
        assert_eq!(record.native_ptl.sublayer_level_idc[0], 67);
        assert_eq!(record.native_ptl.general_sub_profile_idc, vec![0xdeadbeef]);
        assert_eq!(record.max_picture_width, 1920);
        assert_eq!(record.max_picture_height, 1080);

        assert_eq!(record.nalu_array.len(), 2);
        assert_eq!(record.nalu_array[0].nal_unit_type(), Some(NaluType::Sps));
        assert_eq!(record.nalu_array[1].nalus.len(), 2);
        assert_eq!(record.nalu_array[1].nalus[1].as_ref(), pps1.as_slice());
        assert_eq!(record.nalus().count(), 3);
        assert_eq!(record.nalus().next().unwrap().header.type_, NaluType::Sps);
        assert_eq!(record.nalus().next().unwrap().as_ref(), sps.as_slice());
    }

    #[test]
    fn record_without_ptl() {
        let dci = parameter_set(NaluType::Dci, 0x10);

        let mut w = NaluWriter::new();
        w.write_f(5, 0x1fu8).write_f(2, 1u8).write_flag(false);
        w.write_f(8, 1u8);
        write_array(&mut w, NaluType::Dci, &[dci]);
        let data = w.rbsp();

        let record = DecoderConfigRecord::parse(&data).unwrap();
        assert!(!record.ptl_present_flag);
        assert_eq!(record.nal_length_size(), 2);
        assert_eq!(record.nalu_array[0].nal_unit_type(), Some(NaluType::Dci));
        assert_eq!(record.nalu_array[0].nalus.len(), 1);
    }

    #[test]
    fn truncated_record() {
        let sps = parameter_set(NaluType::Sps, 0xaa);

        let mut w = NaluWriter::new();
        write_header(&mut w, 1);
        w.write_f(8, 1u8);
        write_array(&mut w, NaluType::Sps, &[sps]);
        let mut data = w.rbsp();
        data.pop();

        assert!(matches!(
            DecoderConfigRecord::parse(&data),
            Err(ParseError::NoNalEnd)
        ));
        assert!(DecoderConfigRecord::parse(&data[..1]).is_err());
        // Header cut in the middle of the PTL record.
        assert!(matches!(
            DecoderConfigRecord::parse(&data[..8]),
            Err(ParseError::BrokenData(_))
        ));
    }
}
