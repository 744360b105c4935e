// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::io::Cursor;

use bytes::Buf;
use thiserror::Error;

/// A bit reader for NAL unit payloads. It properly handles
/// emulation-prevention bytes and stop bits.
#[derive(Clone)]
pub struct NaluReader<'a> {
    /// A reference into the next unread byte in the stream.
    data: Cursor<&'a [u8]>,
    /// Contents of the current byte. First unread bit starting at position 8 -
    /// num_remaining_bits_in_curr_bytes.
    curr_byte: u32,
    /// Number of bits remaining in `curr_byte`
    num_remaining_bits_in_curr_byte: usize,
    /// Used in epb detection.
    prev_two_bytes: u32,
    /// Number of epbs (i.e. 0x000003) we found.
    num_epb: usize,
    /// Whether emulation prevention bytes have to be discarded.
    needs_epb: bool,
}

#[derive(Debug, Error)]
pub enum GetByteError {
    #[error("reader ran out of bits")]
    OutOfBits,
}

#[derive(Debug, Error)]
pub enum ReadBitsError {
    #[error("more than 32 ({0}) bits were requested")]
    TooManyBitsRequested(usize),
    #[error("reader ran out of bits")]
    OutOfBits,
    #[error("invalid Exp-Golomb code")]
    InvalidExpGolomb,
    #[error("value out of bounds: expected {min} - {max}, got {value}")]
    ValueOutOfRange { min: i64, max: i64, value: i64 },
    #[error("failed to convert read input to target type")]
    ConversionFailed,
}

impl From<GetByteError> for ReadBitsError {
    fn from(err: GetByteError) -> Self {
        match err {
            GetByteError::OutOfBits => ReadBitsError::OutOfBits,
        }
    }
}

impl<'a> NaluReader<'a> {
    /// Creates a reader over an RBSP that may contain emulation prevention
    /// bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_epb(data, true)
    }

    /// Creates a reader that does not discard emulation prevention bytes.
    pub fn without_epb(data: &'a [u8]) -> Self {
        Self::with_epb(data, false)
    }

    fn with_epb(data: &'a [u8], needs_epb: bool) -> Self {
        Self {
            data: Cursor::new(data),
            curr_byte: Default::default(),
            num_remaining_bits_in_curr_byte: Default::default(),
            prev_two_bytes: 0xffff,
            num_epb: Default::default(),
            needs_epb,
        }
    }

    /// Read a single bit from the stream.
    pub fn read_bit(&mut self) -> Result<bool, ReadBitsError> {
        let bit = self.read_bits::<u32>(1)?;
        Ok(bit == 1)
    }

    /// Read up to 32 bits from the stream.
    pub fn read_bits<U: TryFrom<u32>>(&mut self, num_bits: usize) -> Result<U, ReadBitsError> {
        if num_bits > 32 {
            return Err(ReadBitsError::TooManyBitsRequested(num_bits));
        }

        let mut bits_left = num_bits;
        let mut out = 0u64;

        while self.num_remaining_bits_in_curr_byte < bits_left {
            out |= u64::from(self.curr_byte) << (bits_left - self.num_remaining_bits_in_curr_byte);
            bits_left -= self.num_remaining_bits_in_curr_byte;
            self.update_curr_byte()?;
        }

        out |= u64::from(self.curr_byte >> (self.num_remaining_bits_in_curr_byte - bits_left));
        out &= (1u64 << num_bits) - 1;
        self.num_remaining_bits_in_curr_byte -= bits_left;

        let out = u32::try_from(out).map_err(|_| ReadBitsError::ConversionFailed)?;
        U::try_from(out).map_err(|_| ReadBitsError::ConversionFailed)
    }

    /// Read `num_bits` bits and check that the value does not exceed `max`.
    pub fn read_bits_max<U: TryFrom<u32>>(
        &mut self,
        num_bits: usize,
        max: u32,
    ) -> Result<U, ReadBitsError> {
        let value = self.read_bits::<u32>(num_bits)?;
        if value > max {
            return Err(ReadBitsError::ValueOutOfRange {
                min: 0,
                max: i64::from(max),
                value: i64::from(value),
            });
        }

        U::try_from(value).map_err(|_| ReadBitsError::ConversionFailed)
    }

    /// Skip `num_bits` bits from the stream.
    pub fn skip_bits(&mut self, mut num_bits: usize) -> Result<(), ReadBitsError> {
        while num_bits > 0 {
            let n = std::cmp::min(num_bits, 31);
            self.read_bits::<u32>(n)?;
            num_bits -= n;
        }

        Ok(())
    }

    /// Whether the next bit to be read starts a byte.
    pub fn is_byte_aligned(&self) -> bool {
        self.num_remaining_bits_in_curr_byte % 8 == 0
    }

    /// Skip bits until the reader is byte aligned.
    pub fn skip_to_byte_alignment(&mut self) -> Result<(), ReadBitsError> {
        let n = self.num_remaining_bits_in_curr_byte % 8;
        self.skip_bits(n)
    }

    /// Returns the amount of bits left in the stream
    pub fn num_bits_left(&self) -> usize {
        self.data.remaining() * 8 + self.num_remaining_bits_in_curr_byte
    }

    /// Returns the number of bits consumed so far, emulation prevention bytes
    /// included.
    pub fn position(&self) -> usize {
        self.data.position() as usize * 8 - self.num_remaining_bits_in_curr_byte
    }

    /// Returns the number of RBSP bits consumed so far. Emulation prevention
    /// bytes are not counted.
    pub fn rbsp_position(&self) -> usize {
        self.position() - 8 * self.num_epb
    }

    /// Returns the number of emulation-prevention bytes read so far.
    pub fn num_epb(&self) -> usize {
        self.num_epb
    }

    /// Whether the stream still has RBSP data. Implements more_rbsp_data().
    pub fn has_more_rbsp_data(&mut self) -> bool {
        if self.num_remaining_bits_in_curr_byte == 0 && self.update_curr_byte().is_err() {
            // no more data at all in the rbsp
            return false;
        }

        // If the next bit is the stop bit, then we should only see unset bits
        // until the end of the data.
        if (self.curr_byte & ((1 << (self.num_remaining_bits_in_curr_byte - 1)) - 1)) != 0 {
            return true;
        }

        let data = self.data.chunk();
        if data.iter().any(|byte| *byte != 0) {
            return true;
        }

        self.data.advance(self.data.remaining());
        false
    }

    /// Whether a payload of `payload_size` RBSP bytes starting at
    /// `payload_start`, as returned by [`Self::rbsp_position`], still has data
    /// past the current position.
    pub fn has_more_data_in_payload(&self, payload_start: usize, payload_size: usize) -> bool {
        !(self.is_byte_aligned() && self.rbsp_position() >= payload_start + 8 * payload_size)
    }

    /// Reads an unsigned Exp-Golomb code, `ue(v)`.
    pub fn read_ue<U: TryFrom<u32>>(&mut self) -> Result<U, ReadBitsError> {
        let mut num_bits = 0;

        while self.read_bits::<u32>(1)? == 0 {
            num_bits += 1;
            if num_bits > 32 {
                return Err(ReadBitsError::InvalidExpGolomb);
            }
        }

        let rest = u64::from(self.read_bits::<u32>(num_bits)?);
        let value = ((1u64 << num_bits) - 1) + rest;
        let value = u32::try_from(value).map_err(|_| ReadBitsError::InvalidExpGolomb)?;

        U::try_from(value).map_err(|_| ReadBitsError::ConversionFailed)
    }

    pub fn read_ue_bounded<U: TryFrom<u32>>(
        &mut self,
        min: u32,
        max: u32,
    ) -> Result<U, ReadBitsError> {
        let ue = self.read_ue::<u32>()?;
        if ue > max || ue < min {
            Err(ReadBitsError::ValueOutOfRange {
                min: i64::from(min),
                max: i64::from(max),
                value: i64::from(ue),
            })
        } else {
            U::try_from(ue).map_err(|_| ReadBitsError::ConversionFailed)
        }
    }

    pub fn read_ue_max<U: TryFrom<u32>>(&mut self, max: u32) -> Result<U, ReadBitsError> {
        self.read_ue_bounded(0, max)
    }

    /// Reads a signed Exp-Golomb code, `se(v)`.
    pub fn read_se<U: TryFrom<i32>>(&mut self) -> Result<U, ReadBitsError> {
        let ue = i64::from(self.read_ue::<u32>()?);

        let value = if ue % 2 == 0 { -(ue / 2) } else { ue / 2 + 1 };
        let value = i32::try_from(value).map_err(|_| ReadBitsError::ConversionFailed)?;

        U::try_from(value).map_err(|_| ReadBitsError::ConversionFailed)
    }

    pub fn read_se_bounded<U: TryFrom<i32>>(
        &mut self,
        min: i32,
        max: i32,
    ) -> Result<U, ReadBitsError> {
        let se = self.read_se::<i32>()?;
        if se < min || se > max {
            Err(ReadBitsError::ValueOutOfRange {
                min: i64::from(min),
                max: i64::from(max),
                value: i64::from(se),
            })
        } else {
            U::try_from(se).map_err(|_| ReadBitsError::ConversionFailed)
        }
    }

    fn get_byte(&mut self) -> Result<u8, GetByteError> {
        if self.data.remaining() == 0 {
            return Err(GetByteError::OutOfBits);
        }

        Ok(self.data.get_u8())
    }

    fn update_curr_byte(&mut self) -> Result<(), GetByteError> {
        let mut byte = self.get_byte()?;

        if self.needs_epb {
            if (self.prev_two_bytes & 0xffff) == 0 && byte == 0x03 {
                // We found an epb
                self.num_epb += 1;
                // Read another byte
                byte = self.get_byte()?;
                // We need another 3 bytes before another epb can happen.
                self.prev_two_bytes = 0xffff;
            }

            self.prev_two_bytes = ((self.prev_two_bytes & 0xff) << 8) | u32::from(byte);
        }

        self.num_remaining_bits_in_curr_byte = 8;
        self.curr_byte = u32::from(byte);
        Ok(())
    }
}
