// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Profile, tier and level information.

use std::fmt;
use std::str::FromStr;

use enumn::N;

use crate::codec::h266::parser::MAX_SUBLAYERS;
use crate::error::broken_data;
use crate::error::ParseResult;
use crate::utils::nalu_reader::NaluReader;

/// Bit marking the intra-only variant of a profile.
pub(crate) const PROFILE_INTRA: u8 = 8;
/// Bit marking the still-picture variant of a profile.
const PROFILE_STILL_PICTURE: u8 = 64;

#[derive(N, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Profile {
    None = 0,
    Intra = PROFILE_INTRA,
    StillPicture = PROFILE_STILL_PICTURE,
    Main10 = 1,
    Main10StillPicture = 1 | PROFILE_STILL_PICTURE,
    MultilayerMain10 = 17,
    MultilayerMain10StillPicture = 17 | PROFILE_STILL_PICTURE,
    Main10_444 = 33,
    Main10_444StillPicture = 33 | PROFILE_STILL_PICTURE,
    MultilayerMain10_444 = 49,
    MultilayerMain10_444StillPicture = 49 | PROFILE_STILL_PICTURE,
    Main12 = 2,
    Main12_444 = 34,
    Main16_444 = 35,
    Main12Intra = 2 | PROFILE_INTRA,
    Main12_444Intra = 34 | PROFILE_INTRA,
    Main16_444Intra = 35 | PROFILE_INTRA,
    Main12StillPicture = 2 | PROFILE_STILL_PICTURE,
    Main12_444StillPicture = 34 | PROFILE_STILL_PICTURE,
    Main16_444StillPicture = 35 | PROFILE_STILL_PICTURE,
}

const PROFILE_NAMES: [(Profile, &str); 18] = [
    (Profile::StillPicture, "still-picture"),
    (Profile::Main10, "main-10"),
    (Profile::Main10StillPicture, "main-10-still-picture"),
    (Profile::MultilayerMain10, "multilayer-main-10"),
    (Profile::MultilayerMain10StillPicture, "multilayer-main-10-still-picture"),
    (Profile::Main10_444, "main-10-444"),
    (Profile::Main10_444StillPicture, "main-10-444-still-picture"),
    (Profile::MultilayerMain10_444, "multilayer-main-10-444"),
    (Profile::MultilayerMain10_444StillPicture, "multilayer-main-10-444-still-picture"),
    (Profile::Main12, "main-12"),
    (Profile::Main12_444, "main-12-444"),
    (Profile::Main16_444, "main-16-444"),
    (Profile::Main12Intra, "main-12-intra"),
    (Profile::Main12_444Intra, "main-12-444-intra"),
    (Profile::Main16_444Intra, "main-16-444-intra"),
    (Profile::Main12StillPicture, "main-12-still-picture"),
    (Profile::Main12_444StillPicture, "main-12-444-still-picture"),
    (Profile::Main16_444StillPicture, "main-16-444-still-picture"),
];

impl Profile {
    /// The name used for this profile in caps and command lines, if it has
    /// one.
    pub fn name(&self) -> Option<&'static str> {
        PROFILE_NAMES.iter().find(|(p, _)| p == self).map(|(_, name)| *name)
    }

    /// Whether this profile is one of the single layer 10 bit profiles.
    pub fn is_single_layer_main_10(&self) -> bool {
        matches!(
            self,
            Profile::Main10
                | Profile::Main10_444
                | Profile::Main10StillPicture
                | Profile::Main10_444StillPicture
        )
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{:?}", self),
        }
    }
}

impl FromStr for Profile {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PROFILE_NAMES
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(p, _)| *p)
            .ok_or("unrecognized H.266 profile")
    }
}

#[derive(N, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    L1_0 = 16,
    L2_0 = 32,
    L2_1 = 35,
    L3_0 = 48,
    L3_1 = 51,
    L4_0 = 64,
    L4_1 = 67,
    L5_0 = 80,
    L5_1 = 83,
    L5_2 = 86,
    L6_0 = 96,
    L6_1 = 99,
    L6_2 = 102,
    L6_3 = 105,
}

/// General constraints information, 7.3.3.2.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeneralConstraintsInfo {
    pub present_flag: bool,
    /* general */
    pub intra_only_constraint_flag: bool,
    pub all_layers_independent_constraint_flag: bool,
    pub one_au_only_constraint_flag: bool,
    /* picture format */
    pub sixteen_minus_max_bitdepth_constraint_idc: u8,
    pub three_minus_max_chroma_format_constraint_idc: u8,
    /* NAL unit type related */
    pub no_mixed_nalu_types_in_pic_constraint_flag: bool,
    pub no_trail_constraint_flag: bool,
    pub no_stsa_constraint_flag: bool,
    pub no_rasl_constraint_flag: bool,
    pub no_radl_constraint_flag: bool,
    pub no_idr_constraint_flag: bool,
    pub no_cra_constraint_flag: bool,
    pub no_gdr_constraint_flag: bool,
    pub no_aps_constraint_flag: bool,
    pub no_idr_rpl_constraint_flag: bool,
    /* tile, slice, subpicture partitioning */
    pub one_tile_per_pic_constraint_flag: bool,
    pub pic_header_in_slice_header_constraint_flag: bool,
    pub one_slice_per_pic_constraint_flag: bool,
    pub no_rectangular_slice_constraint_flag: bool,
    pub one_slice_per_subpic_constraint_flag: bool,
    pub no_subpic_info_constraint_flag: bool,
    /* CTU and block partitioning */
    pub three_minus_max_log2_ctu_size_constraint_idc: u8,
    pub no_partition_constraints_override_constraint_flag: bool,
    pub no_mtt_constraint_flag: bool,
    pub no_qtbtt_dual_tree_intra_constraint_flag: bool,
    /* intra */
    pub no_palette_constraint_flag: bool,
    pub no_ibc_constraint_flag: bool,
    pub no_isp_constraint_flag: bool,
    pub no_mrl_constraint_flag: bool,
    pub no_mip_constraint_flag: bool,
    pub no_cclm_constraint_flag: bool,
    /* inter */
    pub no_ref_pic_resampling_constraint_flag: bool,
    pub no_res_change_in_clvs_constraint_flag: bool,
    pub no_weighted_prediction_constraint_flag: bool,
    pub no_ref_wraparound_constraint_flag: bool,
    pub no_temporal_mvp_constraint_flag: bool,
    pub no_sbtmvp_constraint_flag: bool,
    pub no_amvr_constraint_flag: bool,
    pub no_bdof_constraint_flag: bool,
    pub no_smvd_constraint_flag: bool,
    pub no_dmvr_constraint_flag: bool,
    pub no_mmvd_constraint_flag: bool,
    pub no_affine_motion_constraint_flag: bool,
    pub no_prof_constraint_flag: bool,
    pub no_bcw_constraint_flag: bool,
    pub no_ciip_constraint_flag: bool,
    pub no_gpm_constraint_flag: bool,
    /* transform, quantization, residual */
    pub no_luma_transform_size_64_constraint_flag: bool,
    pub no_transform_skip_constraint_flag: bool,
    pub no_bdpcm_constraint_flag: bool,
    pub no_mts_constraint_flag: bool,
    pub no_lfnst_constraint_flag: bool,
    pub no_joint_cbcr_constraint_flag: bool,
    pub no_sbt_constraint_flag: bool,
    pub no_act_constraint_flag: bool,
    pub no_explicit_scaling_list_constraint_flag: bool,
    pub no_dep_quant_constraint_flag: bool,
    pub no_sign_data_hiding_constraint_flag: bool,
    pub no_cu_qp_delta_constraint_flag: bool,
    pub no_chroma_qp_offset_constraint_flag: bool,
    /* loop filter */
    pub no_sao_constraint_flag: bool,
    pub no_alf_constraint_flag: bool,
    pub no_ccalf_constraint_flag: bool,
    pub no_lmcs_constraint_flag: bool,
    pub no_ladf_constraint_flag: bool,
    pub no_virtual_boundaries_constraint_flag: bool,
    /* gci_num_additional_bits > 5 */
    pub all_rap_pictures_constraint_flag: bool,
    pub no_extended_precision_processing_constraint_flag: bool,
    pub no_ts_residual_coding_rice_constraint_flag: bool,
    pub no_rrc_rice_extension_constraint_flag: bool,
    pub no_persistent_rice_adaptation_constraint_flag: bool,
    pub no_reverse_last_sig_coeff_constraint_flag: bool,
}

impl GeneralConstraintsInfo {
    pub(crate) fn parse(&mut self, r: &mut NaluReader) -> ParseResult<()> {
        log::trace!("parsing \"General Constraints Info Parameters\"");

        self.present_flag = r.read_bit()?;
        if self.present_flag {
            self.intra_only_constraint_flag = r.read_bit()?;
            self.all_layers_independent_constraint_flag = r.read_bit()?;
            self.one_au_only_constraint_flag = r.read_bit()?;
            self.sixteen_minus_max_bitdepth_constraint_idc = r.read_bits_max(4, 8)?;
            self.three_minus_max_chroma_format_constraint_idc = r.read_bits(2)?;

            self.no_mixed_nalu_types_in_pic_constraint_flag = r.read_bit()?;
            self.no_trail_constraint_flag = r.read_bit()?;
            self.no_stsa_constraint_flag = r.read_bit()?;
            self.no_rasl_constraint_flag = r.read_bit()?;
            self.no_radl_constraint_flag = r.read_bit()?;
            self.no_idr_constraint_flag = r.read_bit()?;
            self.no_cra_constraint_flag = r.read_bit()?;
            self.no_gdr_constraint_flag = r.read_bit()?;
            self.no_aps_constraint_flag = r.read_bit()?;
            self.no_idr_rpl_constraint_flag = r.read_bit()?;

            self.one_tile_per_pic_constraint_flag = r.read_bit()?;
            self.pic_header_in_slice_header_constraint_flag = r.read_bit()?;
            self.one_slice_per_pic_constraint_flag = r.read_bit()?;
            self.no_rectangular_slice_constraint_flag = r.read_bit()?;
            self.one_slice_per_subpic_constraint_flag = r.read_bit()?;
            self.no_subpic_info_constraint_flag = r.read_bit()?;

            self.three_minus_max_log2_ctu_size_constraint_idc = r.read_bits(2)?;
            self.no_partition_constraints_override_constraint_flag = r.read_bit()?;
            self.no_mtt_constraint_flag = r.read_bit()?;
            self.no_qtbtt_dual_tree_intra_constraint_flag = r.read_bit()?;

            self.no_palette_constraint_flag = r.read_bit()?;
            self.no_ibc_constraint_flag = r.read_bit()?;
            self.no_isp_constraint_flag = r.read_bit()?;
            self.no_mrl_constraint_flag = r.read_bit()?;
            self.no_mip_constraint_flag = r.read_bit()?;
            self.no_cclm_constraint_flag = r.read_bit()?;

            self.no_ref_pic_resampling_constraint_flag = r.read_bit()?;
            self.no_res_change_in_clvs_constraint_flag = r.read_bit()?;
            self.no_weighted_prediction_constraint_flag = r.read_bit()?;
            self.no_ref_wraparound_constraint_flag = r.read_bit()?;
            self.no_temporal_mvp_constraint_flag = r.read_bit()?;
            self.no_sbtmvp_constraint_flag = r.read_bit()?;
            self.no_amvr_constraint_flag = r.read_bit()?;
            self.no_bdof_constraint_flag = r.read_bit()?;
            self.no_smvd_constraint_flag = r.read_bit()?;
            self.no_dmvr_constraint_flag = r.read_bit()?;
            self.no_mmvd_constraint_flag = r.read_bit()?;
            self.no_affine_motion_constraint_flag = r.read_bit()?;
            self.no_prof_constraint_flag = r.read_bit()?;
            self.no_bcw_constraint_flag = r.read_bit()?;
            self.no_ciip_constraint_flag = r.read_bit()?;
            self.no_gpm_constraint_flag = r.read_bit()?;

            self.no_luma_transform_size_64_constraint_flag = r.read_bit()?;
            self.no_transform_skip_constraint_flag = r.read_bit()?;
            self.no_bdpcm_constraint_flag = r.read_bit()?;
            self.no_mts_constraint_flag = r.read_bit()?;
            self.no_lfnst_constraint_flag = r.read_bit()?;
            self.no_joint_cbcr_constraint_flag = r.read_bit()?;
            self.no_sbt_constraint_flag = r.read_bit()?;
            self.no_act_constraint_flag = r.read_bit()?;
            self.no_explicit_scaling_list_constraint_flag = r.read_bit()?;
            self.no_dep_quant_constraint_flag = r.read_bit()?;
            self.no_sign_data_hiding_constraint_flag = r.read_bit()?;
            self.no_cu_qp_delta_constraint_flag = r.read_bit()?;
            self.no_chroma_qp_offset_constraint_flag = r.read_bit()?;

            self.no_sao_constraint_flag = r.read_bit()?;
            self.no_alf_constraint_flag = r.read_bit()?;
            self.no_ccalf_constraint_flag = r.read_bit()?;
            self.no_lmcs_constraint_flag = r.read_bit()?;
            self.no_ladf_constraint_flag = r.read_bit()?;
            self.no_virtual_boundaries_constraint_flag = r.read_bit()?;

            let num_additional_bits = r.read_bits::<usize>(8)?;
            let mut num_additional_bits_used = 0;
            if num_additional_bits > 5 {
                self.all_rap_pictures_constraint_flag = r.read_bit()?;
                self.no_extended_precision_processing_constraint_flag = r.read_bit()?;
                self.no_ts_residual_coding_rice_constraint_flag = r.read_bit()?;
                self.no_rrc_rice_extension_constraint_flag = r.read_bit()?;
                self.no_persistent_rice_adaptation_constraint_flag = r.read_bit()?;
                self.no_reverse_last_sig_coeff_constraint_flag = r.read_bit()?;
                num_additional_bits_used = 6;
            } else if num_additional_bits > 0 {
                broken_data!(
                    "Invalid gci_num_additional_bits {} (must be 0 or >= 6)",
                    num_additional_bits
                );
            }

            // gci_reserved_zero_bit
            r.skip_bits(num_additional_bits - num_additional_bits_used)?;
        }

        // gci_alignment_zero_bit
        r.skip_to_byte_alignment()?;

        Ok(())
    }
}

/// `profile_tier_level()`, 7.3.3.1.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileTierLevel {
    pub profile_idc: u8,
    pub tier_flag: bool,
    pub level_idc: u8,
    pub frame_only_constraint_flag: bool,
    pub multilayer_enabled_flag: bool,
    pub general_constraints_info: GeneralConstraintsInfo,
    pub sublayer_level_present_flag: [bool; MAX_SUBLAYERS - 1],
    /// Level of each sublayer. Entries that are not signalled are inferred
    /// from the next higher sublayer, up to `level_idc`.
    pub sublayer_level_idc: [u8; MAX_SUBLAYERS],
    pub num_sub_profiles: u8,
    pub sub_profile_idc: Vec<u32>,
}

impl ProfileTierLevel {
    pub fn profile(&self) -> Option<Profile> {
        Profile::n(self.profile_idc)
    }

    pub fn level(&self) -> Option<Level> {
        Level::n(self.level_idc)
    }

    pub(crate) fn parse(
        &mut self,
        r: &mut NaluReader,
        profile_tier_present_flag: bool,
        max_num_sublayers_minus1: u8,
    ) -> ParseResult<()> {
        log::trace!("parsing \"Profile Tier Level parameters\"");

        if usize::from(max_num_sublayers_minus1) >= MAX_SUBLAYERS {
            broken_data!("Invalid MaxNumSubLayersMinus1 {}", max_num_sublayers_minus1);
        }

        if profile_tier_present_flag {
            self.profile_idc = r.read_bits(7)?;
            self.tier_flag = r.read_bit()?;
        }

        self.level_idc = r.read_bits(8)?;
        if self.profile_idc != Profile::None as u8 && self.level_idc < Level::L4_0 as u8 && self.tier_flag {
            broken_data!("High tier not defined for levels below 4");
        }

        self.frame_only_constraint_flag = r.read_bit()?;
        self.multilayer_enabled_flag = r.read_bit()?;
        if self.multilayer_enabled_flag
            && self.profile().map_or(false, |p| p.is_single_layer_main_10())
        {
            broken_data!("ptl_multilayer_enabled_flag shall be 0 for non-multilayer profiles");
        }

        if profile_tier_present_flag {
            self.general_constraints_info.parse(r)?;
        }

        let max_num_sublayers_minus1 = usize::from(max_num_sublayers_minus1);
        for i in (0..max_num_sublayers_minus1).rev() {
            self.sublayer_level_present_flag[i] = r.read_bit()?;
        }

        // ptl_reserved_zero_bit
        r.skip_to_byte_alignment()?;

        for i in (0..max_num_sublayers_minus1).rev() {
            if self.sublayer_level_present_flag[i] {
                self.sublayer_level_idc[i] = r.read_bits(8)?;
            }
        }

        self.sublayer_level_idc[max_num_sublayers_minus1] = self.level_idc;
        for i in (0..max_num_sublayers_minus1).rev() {
            if !self.sublayer_level_present_flag[i] {
                self.sublayer_level_idc[i] = self.sublayer_level_idc[i + 1];
            }
        }

        if profile_tier_present_flag {
            self.num_sub_profiles = r.read_bits(8)?;
            self.sub_profile_idc = (0..self.num_sub_profiles)
                .map(|_| r.read_bits::<u32>(32))
                .collect::<Result<_, _>>()?;
        }

        Ok(())
    }
}
