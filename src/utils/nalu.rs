// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Framing of NAL units, either Annex B (start code delimited) or length
//! prefixed as found in ISO-BMFF samples.

use std::fmt::Debug;
use std::io::Cursor;

use anyhow::anyhow;
use byteorder::BigEndian;
use byteorder::ByteOrder;

use crate::error::broken_data;
use crate::error::ParseError;
use crate::error::ParseResult;

pub trait Header: Sized {
    /// Parse the NALU header from `data`, which starts at the first header
    /// byte and ends with the NAL unit.
    fn parse(data: &[u8]) -> ParseResult<Self>;
    /// Whether this header type indicates the end of a sequence or bitstream,
    /// i.e. the unit is complete without a following start code.
    fn is_end(&self) -> bool;
    /// The length of the header.
    fn len(&self) -> usize;
}

#[derive(Clone, Debug)]
pub struct Nalu<'a, U> {
    pub header: U,
    /// The buffer this NAL unit was found in.
    pub data: &'a [u8],
    /// Size of the NAL unit, header included.
    pub size: usize,
    /// Offset of the first header byte in `data`.
    pub offset: usize,
    /// Offset of the start code (or of the length field) in `data`.
    pub sc_offset: usize,
}

fn find_start_code(data: &[u8], offset: usize) -> Option<usize> {
    data.get(offset..)?
        .windows(3)
        .position(|window| window == [0x00, 0x00, 0x01])
}

impl<'a, U> Nalu<'a, U>
where
    U: Debug + Header,
{
    fn identify(data: &'a [u8], offset: usize) -> ParseResult<Nalu<'a, U>> {
        if data.len() < offset + 4 {
            return Err(anyhow!(
                "Can't parse, buffer has too small size {}, offset {}",
                data.len(),
                offset
            )
            .into());
        }

        let off1 = match find_start_code(data, offset) {
            Some(off) => off,
            None => {
                log::debug!("No start code prefix in this buffer");
                return Err(ParseError::NoNal);
            }
        };

        let mut sc_offset = offset + off1;
        let nalu_offset = sc_offset + 3;

        // Two header bytes are needed to identify the unit.
        if data.len() - nalu_offset < 2 {
            log::debug!("Not enough bytes after start code to identify");
            return Err(ParseError::NoNal);
        }

        // The start code may have a leading zero_byte.
        if sc_offset > 0 && data[sc_offset - 1] == 0 {
            sc_offset -= 1;
        }

        let header = U::parse(&data[nalu_offset..])?;
        let size = if header.is_end() {
            log::trace!("end-of-seq or end-of-stream nal found");
            header.len()
        } else {
            data.len() - nalu_offset
        };

        Ok(Nalu {
            header,
            data,
            size,
            offset: nalu_offset,
            sc_offset,
        })
    }

    /// Find the next Annex B encoded NAL unit without looking for its end:
    /// the unit extends to the end of the buffer. Useful when the caller
    /// knows the buffer holds exactly one unit, or for the last unit of a
    /// stream.
    pub fn next_unchecked(cursor: &mut Cursor<&'a [u8]>) -> ParseResult<Nalu<'a, U>> {
        let data = *cursor.get_ref();
        let offset = position(cursor)?;

        let nalu = Self::identify(data, offset)?;
        cursor.set_position((nalu.offset + nalu.size) as u64);

        Ok(nalu)
    }

    /// Find the next complete Annex B encoded NAL unit. The unit is complete
    /// once the start code of the following unit, and that unit's header,
    /// are available.
    pub fn next(cursor: &mut Cursor<&'a [u8]>) -> ParseResult<Nalu<'a, U>> {
        let data = *cursor.get_ref();
        let offset = position(cursor)?;

        let mut nalu = Self::identify(data, offset)?;

        if !nalu.header.is_end() {
            let mut off2 = match find_start_code(data, nalu.offset) {
                Some(off) => off,
                None => {
                    log::debug!("Nal start {}, no end found", nalu.offset);
                    return Err(ParseError::NoNalEnd);
                }
            };

            // 3 bytes of start code and 2 of header for the following unit.
            if data.len() - (nalu.offset + off2) < 5 {
                log::debug!("Not enough bytes to identify the next NAL");
                return Err(ParseError::NoNalEnd);
            }

            // Discard trailing_zero_8bits
            while off2 > 0 && data[nalu.offset + off2 - 1] == 0 {
                off2 -= 1;
            }

            if off2 < 3 {
                broken_data!("NAL unit at {} is only {} bytes long", nalu.offset, off2);
            }

            nalu.size = off2;
            log::trace!("Complete nal found. Off: {}, Size: {}", nalu.offset, nalu.size);
        }

        cursor.set_position((nalu.offset + nalu.size) as u64);

        Ok(nalu)
    }

    /// Read the next NAL unit prefixed by a big endian length field of
    /// `nal_length_size` bytes.
    pub fn next_length_prefixed(
        cursor: &mut Cursor<&'a [u8]>,
        nal_length_size: usize,
    ) -> ParseResult<Nalu<'a, U>> {
        if !(1..=4).contains(&nal_length_size) {
            return Err(anyhow!("Invalid NAL length size {}", nal_length_size).into());
        }

        let data = *cursor.get_ref();
        let offset = position(cursor)?;

        let nalu_offset = match offset.checked_add(nal_length_size) {
            Some(off) => off,
            None => broken_data!("offset + nal_length_size overflow"),
        };

        if data.len() < nalu_offset {
            log::debug!(
                "Can't parse, buffer has too small size {}, offset {}",
                data.len(),
                offset
            );
            return Err(ParseError::NoNalEnd);
        }

        let size = BigEndian::read_uint(&data[offset..], nal_length_size) as usize;
        let end = match nalu_offset.checked_add(size) {
            Some(end) => end,
            None => broken_data!("NALU size + nal_length_size overflow"),
        };

        if data.len() < end {
            return Err(ParseError::NoNalEnd);
        }

        let header = U::parse(&data[nalu_offset..end])?;
        if size < header.len() {
            broken_data!("NAL unit of {} bytes is smaller than its header", size);
        }

        cursor.set_position(end as u64);

        Ok(Nalu {
            header,
            data,
            size,
            offset: nalu_offset,
            sc_offset: offset,
        })
    }
}

impl<'a, U: Header> Nalu<'a, U> {
    /// The bytes following the NAL unit header.
    pub fn payload(&self) -> &'a [u8] {
        &self.data[self.offset + self.header.len()..self.offset + self.size]
    }
}

impl<'a, U> AsRef<[u8]> for Nalu<'a, U> {
    fn as_ref(&self) -> &[u8] {
        &self.data[self.offset..self.offset + self.size]
    }
}

fn position(cursor: &Cursor<&[u8]>) -> ParseResult<usize> {
    usize::try_from(cursor.position()).map_err(|e| ParseError::Error(e.into()))
}
