// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! vvcdump, prints the syntax structures of an H.266 elementary stream.

use std::fs::File;
use std::io::Cursor;
use std::io::Read;
use std::path::PathBuf;
use std::str::FromStr;

use argh::FromArgs;

use cros_h266::codec::h266::parser::Nalu;
use cros_h266::codec::h266::parser::NaluHeader;
use cros_h266::codec::h266::parser::NaluType;
use cros_h266::codec::h266::parser::Parser;
use cros_h266::error::ParseResult;
use cros_h266::utils::NalIterator;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
enum Framing {
    AnnexB,
    LengthPrefixed,
}

impl FromStr for Framing {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "annexb" => Ok(Framing::AnnexB),
            "length-prefixed" => Ok(Framing::LengthPrefixed),
            _ => Err("unrecognized framing. Valid values: annexb, length-prefixed"),
        }
    }
}

/// Dump the NAL units of an H.266 stream.
#[derive(Debug, FromArgs)]
struct Args {
    /// input file
    #[argh(positional)]
    input: PathBuf,

    /// how the NAL units are delimited (annexb or length-prefixed). Default: annexb.
    #[argh(option, default = "Framing::AnnexB")]
    framing: Framing,

    /// size in bytes of the length field with length-prefixed framing. Default: 4.
    #[argh(option, default = "4")]
    nal_length_size: usize,

    /// vvcC record holding the parameter sets of a length-prefixed stream.
    /// Its length size overrides nal-length-size.
    #[argh(option)]
    config_record: Option<PathBuf>,

    /// print the full parsed structures instead of a summary line
    #[argh(switch, short = 'v')]
    verbose: bool,
}

fn read_file(path: &PathBuf) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    File::open(path)?.read_to_end(&mut buf)?;
    Ok(buf)
}

fn dump_nalu(parser: &mut Parser, nalu: Nalu, verbose: bool) -> ParseResult<()> {
    let header = nalu.header.clone();
    print!(
        "{:?} layer {} tid {} size {}: ",
        header.type_,
        header.nuh_layer_id,
        header.temporal_id(),
        nalu.size
    );

    let details = match header.type_ {
        NaluType::Vps => format!("{:#?}", parser.parse_vps(&nalu)?),
        NaluType::Sps => {
            let sps = parser.parse_sps(&nalu)?;
            if verbose {
                format!("{:#?}", sps)
            } else {
                format!(
                    "id {} {}x{} crop {}x{}+{}+{} profile {} level {}",
                    sps.sps_id,
                    sps.max_width,
                    sps.max_height,
                    sps.crop_rect_width,
                    sps.crop_rect_height,
                    sps.crop_rect_x,
                    sps.crop_rect_y,
                    sps.profile_tier_level
                        .profile()
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "unknown".into()),
                    sps.profile_tier_level.level_idc,
                )
            }
        }
        NaluType::Pps => {
            let pps = parser.parse_pps(&nalu)?;
            if verbose {
                format!("{:#?}", pps)
            } else {
                format!("id {} sps {} tiles {}", pps.pps_id, pps.sps_id, pps.num_tiles_in_pic)
            }
        }
        NaluType::PrefixAps | NaluType::SuffixAps => {
            let aps = parser.parse_aps(&nalu)?;
            format!("{:?} id {}", aps.params_type, aps.aps_id)
        }
        NaluType::Ph => format!("{:#?}", parser.parse_picture_header(&nalu)?),
        NaluType::PrefixSei | NaluType::SuffixSei => {
            let messages = parser.parse_sei(&nalu)?;
            if verbose {
                format!("{:#?}", messages)
            } else {
                let types = messages.iter().map(|m| m.payload_type).collect::<Vec<_>>();
                format!("payload types {:?}", types)
            }
        }
        NaluType::Aud => format!("{:?}", parser.parse_aud(&nalu)?),
        NaluType::Opi => format!("{:?}", parser.parse_opi(&nalu)?),
        NaluType::Dci => format!("{:#?}", parser.parse_dci(&nalu)?),
        type_ if type_.is_slice() => {
            let slice = parser.parse_slice_header(nalu)?;
            let sh = &slice.header;
            if verbose {
                format!("{:#?}", sh)
            } else {
                format!(
                    "{:?} slice, address {} qp {} {} CTUs {} entry points",
                    sh.slice_type,
                    sh.slice_address,
                    sh.slice_qp_y,
                    sh.ctb_addr_in_slice.len(),
                    sh.num_entry_points()
                )
            }
        }
        _ => String::from("not parsed"),
    };

    if verbose || !details.contains('\n') {
        println!("{}", details);
    } else {
        println!("ok");
    }

    Ok(())
}

fn report(res: ParseResult<()>) {
    if let Err(e) = res {
        println!("error ({:?}): {}", e.kind(), e);
    }
}

fn main() {
    env_logger::init();

    let args: Args = argh::from_env();

    let input = read_file(&args.input).expect("error reading input file");
    let mut parser = Parser::default();
    let mut nal_length_size = args.nal_length_size;

    if let Some(path) = &args.config_record {
        let data = read_file(path).expect("error reading decoder configuration record");
        let record = parser
            .parse_decoder_config_record(&data)
            .expect("invalid decoder configuration record");

        nal_length_size = record.nal_length_size();
        println!(
            "vvcC: {} arrays, NAL length size {}",
            record.nalu_array.len(),
            nal_length_size
        );

        for nalu in record.nalus() {
            report(dump_nalu(&mut parser, nalu.clone(), args.verbose));
        }
    }

    match args.framing {
        Framing::AnnexB => {
            for nalu in NalIterator::<NaluHeader>::new(&input) {
                report(dump_nalu(&mut parser, nalu, args.verbose));
            }
        }
        Framing::LengthPrefixed => {
            let mut cursor = Cursor::new(input.as_slice());
            loop {
                match Nalu::next_length_prefixed(&mut cursor, nal_length_size) {
                    Ok(nalu) => report(dump_nalu(&mut parser, nalu, args.verbose)),
                    Err(e) => {
                        if (cursor.position() as usize) < input.len() {
                            println!("stopping: {}", e);
                        }
                        break;
                    }
                }
            }
        }
    }
}
