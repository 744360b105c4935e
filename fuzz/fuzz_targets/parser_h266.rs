// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

#![no_main]

use std::io::Cursor;

use cros_h266::codec::h266::parser::Nalu;
use cros_h266::codec::h266::parser::NaluHeader;
use cros_h266::codec::h266::parser::NaluType;
use cros_h266::codec::h266::parser::Parser;
use cros_h266::utils::NalIterator;
use libfuzzer_sys::fuzz_target;

fn parse_nalu(parser: &mut Parser, nalu: Nalu) {
    let type_ = nalu.header.type_;
    let _ = match type_ {
        NaluType::Ph => parser.parse_picture_header(&nalu).map(|_| ()),
        NaluType::PrefixSei | NaluType::SuffixSei => parser.parse_sei(&nalu).map(|_| ()),
        NaluType::Aud => parser.parse_aud(&nalu).map(|_| ()),
        NaluType::Opi => parser.parse_opi(&nalu).map(|_| ()),
        NaluType::Dci => parser.parse_dci(&nalu).map(|_| ()),
        _ if type_.is_slice() => parser.parse_slice_header(nalu).map(|_| ()),
        _ => parser.parse_nal(&nalu),
    };
}

fuzz_target!(|data: &[u8]| {
    let mut parser = Parser::default();

    // Annex B stream.
    for nalu in NalIterator::<NaluHeader>::new(data) {
        parse_nalu(&mut parser, nalu);
    }

    // vvcC record, then the same bytes as 4 byte length prefixed samples.
    if let Ok(record) = parser.parse_decoder_config_record(data) {
        let nalus = record.nalus().cloned().collect::<Vec<_>>();
        for nalu in nalus {
            parse_nalu(&mut parser, nalu);
        }
    }

    let mut cursor = Cursor::new(data);
    while let Ok(nalu) = Nalu::next_length_prefixed(&mut cursor, 4) {
        parse_nalu(&mut parser, nalu);
    }
});
