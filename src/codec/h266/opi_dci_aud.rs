// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Access unit delimiter, operating point information and decoding
//! capability information.

use crate::codec::h266::parser::MAX_TOTAL_NUM_OLSS;
use crate::codec::h266::ptl::ProfileTierLevel;
use crate::error::ParseResult;
use crate::utils::nalu_reader::NaluReader;

/// Maximum number of profile, tier and level structures in a DCI.
pub const MAX_DCI_PTLS: usize = 15;

/// `access_unit_delimiter_rbsp()`, 7.3.2.10.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Aud {
    pub irap_or_gdr_flag: bool,
    /// 0: I slices only, 1: P and I slices, 2: any slice type.
    pub pic_type: u8,
}

impl Aud {
    pub(crate) fn parse(r: &mut NaluReader) -> ParseResult<Aud> {
        log::trace!("parsing \"Access Unit Delimiter\"");

        Ok(Aud {
            irap_or_gdr_flag: r.read_bit()?,
            pic_type: r.read_bits_max(3, 2)?,
        })
    }
}

/// `operating_point_information_rbsp()`, 7.3.2.2.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Opi {
    pub ols_info_present_flag: bool,
    pub htid_info_present_flag: bool,
    pub ols_idx: u32,
    pub htid_plus1: u8,
    pub extension_flag: bool,
}

impl Opi {
    pub(crate) fn parse(r: &mut NaluReader) -> ParseResult<Opi> {
        log::trace!("parsing \"Operating Point Information\"");

        let mut opi = Opi {
            ols_info_present_flag: r.read_bit()?,
            htid_info_present_flag: r.read_bit()?,
            ..Default::default()
        };

        if opi.ols_info_present_flag {
            opi.ols_idx = r.read_ue_max(MAX_TOTAL_NUM_OLSS as u32 - 1)?;
        }

        if opi.htid_info_present_flag {
            opi.htid_plus1 = r.read_bits(3)?;
        }

        opi.extension_flag = r.read_bit()?;
        if opi.extension_flag {
            log::debug!("Ignoring OPI extension data");
        }

        Ok(opi)
    }
}

/// `decoding_capability_information_rbsp()`, 7.3.2.1.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dci {
    pub num_ptls_minus1: u8,
    pub profile_tier_level: Vec<ProfileTierLevel>,
    pub extension_flag: bool,
}

impl Dci {
    pub(crate) fn parse(r: &mut NaluReader) -> ParseResult<Dci> {
        log::trace!("parsing \"Decoding Capability Information\"");

        // dci_reserved_zero_4bits
        r.skip_bits(4)?;

        let mut dci = Dci {
            num_ptls_minus1: r.read_bits_max(4, MAX_DCI_PTLS as u32 - 1)?,
            ..Default::default()
        };

        for _ in 0..=dci.num_ptls_minus1 {
            let mut ptl = ProfileTierLevel::default();
            ptl.parse(r, true, 0)?;
            dci.profile_tier_level.push(ptl);
        }

        dci.extension_flag = r.read_bit()?;
        if dci.extension_flag {
            log::debug!("Ignoring DCI extension data");
        }

        Ok(dci)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::h266::ptl::Profile;
    use crate::codec::h266::test_utils::write_ptl;
    use crate::codec::h266::test_utils::NaluWriter;

    #[test]
    fn aud() {
        let mut w = NaluWriter::new();
        w.write_flag(true).write_f(3, 1u8).trailing_bits();
        let data = w.rbsp();

        let aud = Aud::parse(&mut NaluReader::without_epb(&data)).unwrap();
        assert!(aud.irap_or_gdr_flag);
        assert_eq!(aud.pic_type, 1);

        let mut w = NaluWriter::new();
        w.write_flag(false).write_f(3, 3u8).trailing_bits();
        let data = w.rbsp();
        assert!(Aud::parse(&mut NaluReader::without_epb(&data)).is_err());
    }

    #[test]
    fn opi() {
        let mut w = NaluWriter::new();
        w.write_flag(true)
            .write_flag(true)
            .write_ue(3u32)
            .write_f(3, 2u8)
            .write_flag(false)
            .trailing_bits();
        let data = w.rbsp();

        let opi = Opi::parse(&mut NaluReader::without_epb(&data)).unwrap();
        assert_eq!(opi.ols_idx, 3);
        assert_eq!(opi.htid_plus1, 2);
        assert!(!opi.extension_flag);
    }

    #[test]
    fn dci_with_two_ptls() {
        let mut w = NaluWriter::new();
        w.write_f(4, 0u8).write_f(4, 1u8);
        write_ptl(&mut w, 1, 51, 0);
        write_ptl(&mut w, 2, 80, 0);
        w.write_flag(false).trailing_bits();
        let data = w.rbsp();

        let dci = Dci::parse(&mut NaluReader::without_epb(&data)).unwrap();
        assert_eq!(dci.profile_tier_level.len(), 2);
        assert_eq!(dci.profile_tier_level[0].profile(), Some(Profile::Main10));
        assert_eq!(dci.profile_tier_level[1].profile(), Some(Profile::Main12));
        assert_eq!(dci.profile_tier_level[1].level_idc, 80);
    }

    #[test]
    fn dci_with_too_many_ptls() {
        let mut w = NaluWriter::new();
        w.write_f(4, 0u8).write_f(4, 15u8).trailing_bits();
        let data = w.rbsp();
        assert!(Dci::parse(&mut NaluReader::without_epb(&data)).is_err());
    }
}
