// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! An H.266 parser.
//!
//! Parses VPSs, SPSs, PPSs, APSs, picture headers, slice headers and SEI
//! messages from NAL units, keeping the parameter sets it has seen so that
//! the structures referring to them can be resolved.

use std::collections::BTreeMap;

use anyhow::anyhow;
use bitreader::BitReader;
use enumn::N;

use crate::codec::h266::aps::Aps;
use crate::codec::h266::aps::ApsType;
use crate::codec::h266::config_record::DecoderConfigRecord;
use crate::codec::h266::ctb_map::CtbMap;
use crate::codec::h266::opi_dci_aud::Aud;
use crate::codec::h266::opi_dci_aud::Dci;
use crate::codec::h266::opi_dci_aud::Opi;
use crate::codec::h266::picture_header::pps_and_sps;
use crate::codec::h266::picture_header::PictureHeader;
use crate::codec::h266::pps::Pps;
use crate::codec::h266::sei::BufferingPeriod;
use crate::codec::h266::sei::SeiMessage;
use crate::codec::h266::sei::SeiPayload;
use crate::codec::h266::slice_header::SliceHeader;
use crate::codec::h266::sps::Sps;
use crate::codec::h266::vps::Vps;
use crate::error::broken_data;
use crate::error::broken_link;
use crate::error::ParseError;
use crate::error::ParseResult;
use crate::utils::nalu;
use crate::utils::nalu::Header;
use crate::utils::nalu_reader::NaluReader;

pub const MAX_SAMPLE_ARRAYS: usize = 3;
pub const MAX_LAYERS: usize = 64;
pub const MAX_SUBLAYERS: usize = 7;
pub const MAX_SLI_REF_LEVELS: usize = 8;
pub const MAX_TOTAL_NUM_OLSS: usize = 257;
pub const MAX_PTLS: usize = 257;
pub const MAX_VPS_COUNT: usize = 16;
pub const MAX_SPS_COUNT: usize = 16;
pub const MAX_PPS_COUNT: usize = 64;
/// Per APS type. LMCS APSs only use ids 0 to 3.
pub const MAX_APS_COUNT: usize = 8;
pub const MAX_SUB_PROFILES: usize = 256;
pub const MAX_DPB_SIZE: usize = 16;
pub const MAX_REF_PIC_LISTS: usize = 64;
pub const NUM_ALF_FILTERS: usize = 25;
pub const MAX_REF_ENTRIES: usize = 29;
pub const MAX_POINTS_IN_QP_TABLE: usize = 111;
pub const MAX_CPB_CNT: usize = 32;

// Table A.2, level 6.3.
pub const MAX_LUMA_PS: usize = 35651584;
// sqrt(MAX_LUMA_PS * 8)
pub const MAX_WIDTH: usize = 16888;
pub const MAX_HEIGHT: usize = 16888;
pub const MAX_TILES_PER_AU: usize = 440;
pub const MAX_TILE_ROWS: usize = 440;
pub const MAX_TILE_COLUMNS: usize = 20;
pub const MAX_SLICES_PER_AU: usize = 1000;
pub const MAX_ENTRY_POINTS: usize = 20 * 135;
// Level 6.3 MaxLumaSr with 32x32 CTUs, at 8 frames per second.
pub const MAX_CTUS_IN_PICTURE: usize = 80216064 / 8 / 32;

/// Table 5: NAL unit type codes and NAL unit type classes.
#[derive(N, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum NaluType {
    #[default]
    Trail = 0,
    Stsa = 1,
    Radl = 2,
    Rasl = 3,
    RsvVcl4 = 4,
    RsvVcl5 = 5,
    RsvVcl6 = 6,
    IdrWRadl = 7,
    IdrNLp = 8,
    Cra = 9,
    Gdr = 10,
    RsvIrap11 = 11,
    Opi = 12,
    Dci = 13,
    Vps = 14,
    Sps = 15,
    Pps = 16,
    PrefixAps = 17,
    SuffixAps = 18,
    Ph = 19,
    Aud = 20,
    Eos = 21,
    Eob = 22,
    PrefixSei = 23,
    SuffixSei = 24,
    Fd = 25,
    RsvNvcl26 = 26,
    RsvNvcl27 = 27,
    Unspec28 = 28,
    Unspec29 = 29,
    Unspec30 = 30,
    Unspec31 = 31,
}

impl NaluType {
    pub fn is_idr(&self) -> bool {
        matches!(self, Self::IdrWRadl | Self::IdrNLp)
    }

    pub fn is_cra(&self) -> bool {
        matches!(self, Self::Cra)
    }

    pub fn is_gdr(&self) -> bool {
        matches!(self, Self::Gdr)
    }

    pub fn is_irap(&self) -> bool {
        matches!(self, Self::IdrWRadl | Self::IdrNLp | Self::Cra | Self::RsvIrap11)
    }

    /// Coded video sequence start: an IRAP or a GDR picture.
    pub fn is_cvss(&self) -> bool {
        self.is_irap() || self.is_gdr()
    }

    pub fn is_radl(&self) -> bool {
        matches!(self, Self::Radl)
    }

    pub fn is_rasl(&self) -> bool {
        matches!(self, Self::Rasl)
    }

    pub fn is_vcl(&self) -> bool {
        *self <= Self::RsvIrap11
    }

    /// Whether this is a VCL type that carries a slice this parser understands.
    pub fn is_slice(&self) -> bool {
        matches!(
            self,
            Self::Trail
                | Self::Stsa
                | Self::Radl
                | Self::Rasl
                | Self::IdrWRadl
                | Self::IdrNLp
                | Self::Cra
                | Self::Gdr
        )
    }
}

/// `nal_unit_header()`, 7.3.1.2.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NaluHeader {
    pub type_: NaluType,
    /// Specifies the identifier of the layer to which a VCL NAL unit belongs
    /// or the identifier of a layer to which a non-VCL NAL unit applies.
    pub nuh_layer_id: u8,
    /// Minus 1 specifies a temporal identifier for the NAL unit. Never 0.
    pub nuh_temporal_id_plus1: u8,
}

impl NaluHeader {
    pub fn temporal_id(&self) -> u8 {
        self.nuh_temporal_id_plus1 - 1
    }
}

impl Header for NaluHeader {
    fn parse(data: &[u8]) -> ParseResult<Self> {
        let Some(data) = data.get(0..2) else {
            broken_data!("NAL unit header needs 2 bytes, got {}", data.len());
        };

        let mut r = BitReader::new(data);
        let mut read = |bits| {
            r.read_u8(bits)
                .map_err(|e| ParseError::BrokenData(e.to_string()))
        };

        // forbidden_zero_bit and nuh_reserved_zero_bit
        read(2)?;
        let nuh_layer_id = read(6)?;
        let type_ = read(5)?;
        let nuh_temporal_id_plus1 = read(3)?;

        // Every 5 bit value has a variant.
        let type_ = NaluType::n(type_).ok_or_else(|| anyhow!("Invalid NALU type {}", type_))?;

        if nuh_layer_id > 55 {
            broken_data!("nuh_layer_id {} out of range", nuh_layer_id);
        }

        if nuh_temporal_id_plus1 == 0 {
            broken_data!("nuh_temporal_id_plus1 shall not be 0");
        }

        if nuh_layer_id == 0 && nuh_temporal_id_plus1 == 1 && type_ == NaluType::Stsa {
            broken_data!("STSA NAL unit with TemporalId 0 in the base layer");
        }

        Ok(NaluHeader {
            type_,
            nuh_layer_id,
            nuh_temporal_id_plus1,
        })
    }

    fn is_end(&self) -> bool {
        matches!(self.type_, NaluType::Eos | NaluType::Eob)
    }

    fn len(&self) -> usize {
        2
    }
}

pub type Nalu<'a> = nalu::Nalu<'a, NaluHeader>;

/// A slice header along with the NAL unit it was parsed from. The slice data
/// starts `header.header_size` bits after the NAL unit header.
#[derive(Clone, Debug)]
pub struct Slice<'a> {
    pub header: SliceHeader,
    pub nalu: Nalu<'a>,
}

fn expect_type(nalu: &Nalu, types: &[NaluType]) -> ParseResult<()> {
    if !types.contains(&nalu.header.type_) {
        return Err(anyhow!(
            "Invalid NALU type, expected one of {:?}, got {:?}",
            types,
            nalu.header.type_
        )
        .into());
    }

    Ok(())
}

/// Parsing context: the parameter sets parsed so far, indexed by id, and the
/// state that picture and slice headers are parsed against.
#[derive(Debug, Default)]
pub struct Parser {
    vpses: BTreeMap<u8, Vps>,
    spses: BTreeMap<u8, Sps>,
    ppses: BTreeMap<u8, Pps>,
    /// Indexed by `ApsType`.
    apses: [BTreeMap<u8, Aps>; 3],
    /// Last picture header received in its own NAL unit.
    last_ph: Option<PictureHeader>,
    /// Needed by the picture timing and decoding unit info SEI messages.
    buffering_period: Option<BufferingPeriod>,
    /// The (SPS, PPS) ids `ctb_map` was derived from.
    active: Option<(u8, u8)>,
    ctb_map: Option<CtbMap>,
}

impl Parser {
    /// Parse a VPS NALU and store it, replacing any VPS with the same id.
    pub fn parse_vps(&mut self, nalu: &Nalu) -> ParseResult<&Vps> {
        expect_type(nalu, &[NaluType::Vps])?;

        let mut r = NaluReader::new(nalu.payload());
        let vps = Vps::parse(&mut r)?;

        log::debug!("Storing VPS {}", vps.vps_id);
        let key = vps.vps_id;
        self.vpses.remove(&key);
        Ok(self.vpses.entry(key).or_insert(vps))
    }

    /// Parse a SPS NALU and store it, replacing any SPS with the same id.
    pub fn parse_sps(&mut self, nalu: &Nalu) -> ParseResult<&Sps> {
        expect_type(nalu, &[NaluType::Sps])?;

        let mut r = NaluReader::new(nalu.payload());
        let sps = Sps::parse(&mut r, nalu.header.nuh_layer_id, &self.vpses)?;

        let key = sps.sps_id;
        if matches!(self.active, Some((sps_id, _)) if sps_id == key) {
            log::debug!("Active SPS {} replaced", key);
            self.deactivate();
        }

        log::debug!("Storing SPS {}", key);
        self.spses.remove(&key);
        Ok(self.spses.entry(key).or_insert(sps))
    }

    /// Parse a PPS NALU and store it, replacing any PPS with the same id. The
    /// SPS it refers to must have been parsed already.
    pub fn parse_pps(&mut self, nalu: &Nalu) -> ParseResult<&Pps> {
        expect_type(nalu, &[NaluType::Pps])?;

        let mut r = NaluReader::new(nalu.payload());
        let pps = Pps::parse(&mut r, &self.spses)?;

        let key = pps.pps_id;
        if matches!(self.active, Some((_, pps_id)) if pps_id == key) {
            log::debug!("Active PPS {} replaced", key);
            self.deactivate();
        }

        log::debug!("Storing PPS {}", key);
        self.ppses.remove(&key);
        Ok(self.ppses.entry(key).or_insert(pps))
    }

    /// Parse a prefix or suffix APS NALU and store it, replacing any APS
    /// with the same type and id.
    pub fn parse_aps(&mut self, nalu: &Nalu) -> ParseResult<&Aps> {
        expect_type(nalu, &[NaluType::PrefixAps, NaluType::SuffixAps])?;

        let mut r = NaluReader::new(nalu.payload());
        let aps = Aps::parse(&mut r)?;

        log::debug!("Storing {:?} APS {}", aps.params_type, aps.aps_id);
        let table = &mut self.apses[aps.params_type as usize];
        let key = aps.aps_id;
        table.remove(&key);
        Ok(table.entry(key).or_insert(aps))
    }

    /// Parse a picture header NALU. It is kept and used for the slices that
    /// follow without a picture header of their own.
    pub fn parse_picture_header(&mut self, nalu: &Nalu) -> ParseResult<&PictureHeader> {
        expect_type(nalu, &[NaluType::Ph])?;

        let mut r = NaluReader::new(nalu.payload());
        let ph = PictureHeader::parse(&mut r, &self.ppses, &self.spses)?;

        Ok(self.last_ph.insert(ph))
    }

    /// Makes the PPS `pps_id` and its SPS active, deriving the CTB maps again
    /// if they changed.
    fn activate(&mut self, pps_id: u8) -> ParseResult<()> {
        let (pps, sps) = pps_and_sps(&self.ppses, &self.spses, pps_id)?;
        let ids = (sps.sps_id, pps.pps_id);

        if self.active == Some(ids) && self.ctb_map.is_some() {
            return Ok(());
        }

        log::debug!("Activating SPS {} and PPS {}", ids.0, ids.1);
        let ctb_map = CtbMap::new(pps)?;
        self.ctb_map = Some(ctb_map);
        self.active = Some(ids);

        Ok(())
    }

    fn deactivate(&mut self) {
        self.active = None;
        self.ctb_map = None;
    }

    /// Parse a slice header. The picture header is either read from the
    /// slice header itself or taken from the last picture header NALU.
    pub fn parse_slice_header<'a>(&mut self, nalu: Nalu<'a>) -> ParseResult<Slice<'a>> {
        if !nalu.header.type_.is_slice() {
            return Err(anyhow!("Invalid NALU type: {:?} is not a slice NALU", nalu.header.type_).into());
        }

        let mut r = NaluReader::new(nalu.payload());

        let picture_header_in_slice_header_flag = r.read_bit()?;
        let ph = if picture_header_in_slice_header_flag {
            PictureHeader::parse(&mut r, &self.ppses, &self.spses)?
        } else {
            match &self.last_ph {
                Some(ph) => ph.clone(),
                None => broken_link!("Slice without a picture header to refer to"),
            }
        };

        self.activate(ph.pps_id)?;

        let (pps, sps) = pps_and_sps(&self.ppses, &self.spses, ph.pps_id)?;
        let Some(ctb_map) = &self.ctb_map else {
            return Err(anyhow!("CTB map missing after activation").into());
        };

        let header = SliceHeader::parse(
            &mut r,
            nalu.header.type_,
            picture_header_in_slice_header_flag,
            ph,
            sps,
            pps,
            ctb_map,
        )?;

        Ok(Slice { header, nalu })
    }

    /// Parse all the SEI messages of a prefix or suffix SEI NALU. A buffering
    /// period message is remembered for the timing messages that follow, once
    /// the whole NALU has been parsed.
    pub fn parse_sei(&mut self, nalu: &Nalu) -> ParseResult<Vec<SeiMessage>> {
        expect_type(nalu, &[NaluType::PrefixSei, NaluType::SuffixSei])?;

        let mut r = NaluReader::new(nalu.payload());
        let mut messages: Vec<SeiMessage> = vec![];
        let mut buffering_period = self.buffering_period.clone();

        loop {
            let message = SeiMessage::parse(
                &mut r,
                nalu.header.type_,
                nalu.header.nuh_layer_id,
                nalu.header.temporal_id(),
                buffering_period.as_ref(),
            )?;

            if let SeiPayload::BufferingPeriod(bp) = &message.payload {
                buffering_period = Some(bp.clone());
            }
            messages.push(message);

            if !r.has_more_rbsp_data() {
                break;
            }
        }

        if buffering_period != self.buffering_period {
            log::debug!("Buffering period updated");
            self.buffering_period = buffering_period;
        }

        Ok(messages)
    }

    pub fn parse_aud(&self, nalu: &Nalu) -> ParseResult<Aud> {
        expect_type(nalu, &[NaluType::Aud])?;
        Aud::parse(&mut NaluReader::new(nalu.payload()))
    }

    pub fn parse_opi(&self, nalu: &Nalu) -> ParseResult<Opi> {
        expect_type(nalu, &[NaluType::Opi])?;
        Opi::parse(&mut NaluReader::new(nalu.payload()))
    }

    pub fn parse_dci(&self, nalu: &Nalu) -> ParseResult<Dci> {
        expect_type(nalu, &[NaluType::Dci])?;
        Dci::parse(&mut NaluReader::new(nalu.payload()))
    }

    /// Parse a `vvcC` record. The NAL units of its arrays are framed but not
    /// parsed, pass them to [`Parser::parse_nal`] to store the parameter sets.
    pub fn parse_decoder_config_record<'a>(
        &self,
        data: &'a [u8],
    ) -> ParseResult<DecoderConfigRecord<'a>> {
        DecoderConfigRecord::parse(data)
    }

    /// Parse and store the parameter set carried by `nalu`, if any. Other
    /// NAL units are accepted without being parsed.
    pub fn parse_nal(&mut self, nalu: &Nalu) -> ParseResult<()> {
        match nalu.header.type_ {
            NaluType::Vps => self.parse_vps(nalu).map(|_| ()),
            NaluType::Sps => self.parse_sps(nalu).map(|_| ()),
            NaluType::Pps => self.parse_pps(nalu).map(|_| ()),
            NaluType::PrefixAps | NaluType::SuffixAps => self.parse_aps(nalu).map(|_| ()),
            _ => Ok(()),
        }
    }

    /// Returns a previously parsed VPS given `vps_id`, if any.
    pub fn get_vps(&self, vps_id: u8) -> Option<&Vps> {
        self.vpses.get(&vps_id)
    }

    /// Returns a previously parsed SPS given `sps_id`, if any.
    pub fn get_sps(&self, sps_id: u8) -> Option<&Sps> {
        self.spses.get(&sps_id)
    }

    /// Returns a previously parsed PPS given `pps_id`, if any.
    pub fn get_pps(&self, pps_id: u8) -> Option<&Pps> {
        self.ppses.get(&pps_id)
    }

    /// Returns a previously parsed APS of type `type_` given `aps_id`, if any.
    pub fn get_aps(&self, type_: ApsType, aps_id: u8) -> Option<&Aps> {
        self.apses[type_ as usize].get(&aps_id)
    }

    /// The VPS of the active SPS. `None` when the SPS does not refer to a
    /// VPS.
    pub fn active_vps(&self) -> Option<&Vps> {
        self.get_vps(self.active_sps()?.vps_id)
    }

    pub fn active_sps(&self) -> Option<&Sps> {
        self.get_sps(self.active?.0)
    }

    pub fn active_pps(&self) -> Option<&Pps> {
        self.get_pps(self.active?.1)
    }

    /// The CTB addresses of the active picture, grouped by slice.
    pub fn ctb_addr_in_slice(&self) -> Option<&[u32]> {
        self.ctb_map.as_ref().map(|map| map.ctb_addr_in_slice.as_slice())
    }

    /// Index in [`Parser::ctb_addr_in_slice`] of the first CTB of each
    /// rectangular slice of the active picture.
    pub fn slice_start_offset(&self) -> Option<&[u32]> {
        self.ctb_map.as_ref().map(|map| map.slice_start_offset.as_slice())
    }

    pub fn num_ctus_in_slice(&self) -> Option<&[u32]> {
        self.ctb_map.as_ref().map(|map| map.num_ctus_in_slice.as_slice())
    }
}
