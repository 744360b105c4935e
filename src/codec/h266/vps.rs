// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Video parameter set and the derivation of its output layer sets.

use crate::codec::h266::hrd::DpbParameters;
use crate::codec::h266::hrd::GeneralHrdParameters;
use crate::codec::h266::hrd::OlsHrdParameters;
use crate::codec::h266::parser::MAX_SUBLAYERS;
use crate::codec::h266::ptl::ProfileTierLevel;
use crate::error::broken_data;
use crate::error::ParseResult;
use crate::utils::nalu_reader::NaluReader;

/// `video_parameter_set_rbsp()`, 7.3.2.3.
///
/// Per-layer arrays hold `max_layers_minus1 + 1` entries. Per-OLS arrays
/// hold `total_num_olss` entries and per-multilayer-OLS arrays
/// `num_multi_layer_olss` entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Vps {
    pub vps_id: u8,
    pub max_layers_minus1: u8,
    pub max_sublayers_minus1: u8,
    pub default_ptl_dpb_hrd_max_tid_flag: bool,
    pub all_independent_layers_flag: bool,
    pub layer_id: Vec<u8>,
    pub independent_layer_flag: Vec<bool>,
    pub max_tid_ref_present_flag: Vec<bool>,
    pub direct_ref_layer_flag: Vec<Vec<bool>>,
    pub max_tid_il_ref_pics_plus1: Vec<Vec<u8>>,
    pub each_layer_is_an_ols_flag: bool,
    pub ols_mode_idc: u8,
    pub num_output_layer_sets_minus2: u8,
    pub ols_output_layer_flag: Vec<Vec<bool>>,

    pub num_ptls_minus1: u8,
    pub pt_present_flag: Vec<bool>,
    pub ptl_max_tid: Vec<u8>,
    pub profile_tier_level: Vec<ProfileTierLevel>,
    pub ols_ptl_idx: Vec<u8>,

    pub num_dpb_params_minus1: u16,
    pub sublayer_dpb_params_present_flag: bool,
    pub dpb_max_tid: Vec<u8>,
    pub dpb: Vec<DpbParameters>,
    pub ols_dpb_pic_width: Vec<u16>,
    pub ols_dpb_pic_height: Vec<u16>,
    pub ols_dpb_chroma_format: Vec<u8>,
    pub ols_dpb_bitdepth_minus8: Vec<u8>,
    pub ols_dpb_params_idx: Vec<u16>,

    pub timing_hrd_params_present_flag: bool,
    pub general_hrd_params: GeneralHrdParameters,
    pub sublayer_cpb_params_present_flag: bool,
    pub num_ols_timing_hrd_params_minus1: u16,
    pub hrd_max_tid: Vec<u8>,
    pub ols_hrd_params: Vec<OlsHrdParameters>,
    pub ols_timing_hrd_idx: Vec<u16>,
    pub extension_flag: bool,

    // Derived values, 7.4.3.3.
    pub total_num_olss: u16,
    pub num_multi_layer_olss: u16,
    /// MultiLayerOlsIdx, indexed by OLS. Only meaningful for OLSs with more
    /// than one layer.
    pub multi_layer_ols_idx: Vec<u16>,
    pub num_layers_in_ols: Vec<u8>,
    pub layer_id_in_ols: Vec<Vec<u8>>,
    pub num_output_layers_in_ols: Vec<u8>,
    pub output_layer_id_in_ols: Vec<Vec<u8>>,
    pub num_sub_layers_in_layer_in_ols: Vec<Vec<u8>>,
    pub layer_used_as_ref_layer_flag: Vec<bool>,
    pub layer_used_as_output_layer_flag: Vec<bool>,
    pub num_ref_layers: Vec<u8>,
    pub reference_layer_idx: Vec<Vec<u8>>,
}

impl Vps {
    /// Parses the RBSP of a VPS NAL unit, header excluded.
    pub(crate) fn parse(r: &mut NaluReader) -> ParseResult<Vps> {
        log::trace!("parsing \"Video parameter set\"");

        let mut vps = Vps {
            vps_id: r.read_bits(4)?,
            max_layers_minus1: r.read_bits(6)?,
            max_sublayers_minus1: r.read_bits(3)?,
            ..Default::default()
        };

        if vps.vps_id == 0 {
            broken_data!("vps_video_parameter_set_id equal to 0 is reserved");
        }

        if usize::from(vps.max_sublayers_minus1) >= MAX_SUBLAYERS {
            broken_data!("Invalid vps_max_sublayers_minus1 {}", vps.max_sublayers_minus1);
        }

        let num_layers = usize::from(vps.max_layers_minus1) + 1;

        vps.default_ptl_dpb_hrd_max_tid_flag =
            if vps.max_layers_minus1 > 0 && vps.max_sublayers_minus1 > 0 {
                r.read_bit()?
            } else {
                true
            };

        vps.all_independent_layers_flag = if vps.max_layers_minus1 > 0 {
            r.read_bit()?
        } else {
            true
        };

        vps.layer_id = vec![0; num_layers];
        vps.independent_layer_flag = vec![true; num_layers];
        vps.max_tid_ref_present_flag = vec![false; num_layers];
        vps.direct_ref_layer_flag = vec![vec![false; num_layers]; num_layers];
        vps.max_tid_il_ref_pics_plus1 = vec![vec![0; num_layers]; num_layers];

        for i in 0..num_layers {
            vps.layer_id[i] = r.read_bits(6)?;
            if i > 0 && vps.layer_id[i] <= vps.layer_id[i - 1] {
                broken_data!(
                    "vps_layer_id[{}] ({}) shall be greater than vps_layer_id[{}] ({})",
                    i,
                    vps.layer_id[i],
                    i - 1,
                    vps.layer_id[i - 1]
                );
            }

            if i == 0 || vps.all_independent_layers_flag {
                continue;
            }

            vps.independent_layer_flag[i] = r.read_bit()?;
            if vps.independent_layer_flag[i] {
                continue;
            }

            vps.max_tid_ref_present_flag[i] = r.read_bit()?;
            let mut num_direct_refs = 0;
            for j in 0..i {
                vps.direct_ref_layer_flag[i][j] = r.read_bit()?;
                if vps.direct_ref_layer_flag[i][j] {
                    num_direct_refs += 1;
                }

                vps.max_tid_il_ref_pics_plus1[i][j] =
                    if vps.max_tid_ref_present_flag[i] && vps.direct_ref_layer_flag[i][j] {
                        r.read_bits(3)?
                    } else {
                        vps.max_sublayers_minus1 + 1
                    };
            }

            if num_direct_refs == 0 {
                broken_data!("Dependent layer {} has no direct reference layer", i);
            }
        }

        if vps.max_layers_minus1 > 0 {
            vps.each_layer_is_an_ols_flag = if vps.all_independent_layers_flag {
                r.read_bit()?
            } else {
                false
            };

            if !vps.each_layer_is_an_ols_flag {
                vps.ols_mode_idc = if !vps.all_independent_layers_flag {
                    r.read_bits_max(2, 2)?
                } else {
                    2
                };

                if vps.ols_mode_idc == 2 {
                    vps.num_output_layer_sets_minus2 = r.read_bits(8)?;
                    let num_olss = usize::from(vps.num_output_layer_sets_minus2) + 2;
                    vps.ols_output_layer_flag = vec![vec![false; num_layers]; num_olss];
                    for i in 1..num_olss {
                        for j in 0..num_layers {
                            vps.ols_output_layer_flag[i][j] = r.read_bit()?;
                        }
                    }
                }
            }

            // (7-38)
            vps.total_num_olss = if vps.each_layer_is_an_ols_flag || vps.ols_mode_idc < 2 {
                u16::from(vps.max_layers_minus1) + 1
            } else {
                u16::from(vps.num_output_layer_sets_minus2) + 2
            };

            vps.num_ptls_minus1 = r.read_bits(8)?;
            if u16::from(vps.num_ptls_minus1) >= vps.total_num_olss {
                broken_data!(
                    "vps_num_ptls_minus1 {} shall be less than TotalNumOlss {}",
                    vps.num_ptls_minus1,
                    vps.total_num_olss
                );
            }
        } else {
            vps.each_layer_is_an_ols_flag = true;
            vps.num_ptls_minus1 = 0;
            vps.total_num_olss = 1;
        }

        let num_ptls = usize::from(vps.num_ptls_minus1) + 1;
        let total_num_olss = usize::from(vps.total_num_olss);

        vps.pt_present_flag = vec![false; num_ptls];
        vps.ptl_max_tid = vec![0; num_ptls];
        for i in 0..num_ptls {
            vps.pt_present_flag[i] = if i > 0 { r.read_bit()? } else { true };
            vps.ptl_max_tid[i] = if !vps.default_ptl_dpb_hrd_max_tid_flag {
                r.read_bits_max(3, u32::from(vps.max_sublayers_minus1))?
            } else {
                vps.max_sublayers_minus1
            };
        }

        // vps_ptl_alignment_zero_bit
        r.skip_to_byte_alignment()?;

        vps.profile_tier_level = vec![Default::default(); num_ptls];
        for i in 0..num_ptls {
            vps.profile_tier_level[i].parse(r, vps.pt_present_flag[i], vps.ptl_max_tid[i])?;
        }

        let mut ptl_referred = vec![false; num_ptls];
        vps.ols_ptl_idx = vec![0; total_num_olss];
        for i in 0..total_num_olss {
            if num_ptls > 1 && num_ptls != total_num_olss {
                vps.ols_ptl_idx[i] = r.read_bits_max(8, u32::from(vps.num_ptls_minus1))?;
            } else if num_ptls == total_num_olss {
                vps.ols_ptl_idx[i] = i as u8;
            }

            ptl_referred[usize::from(vps.ols_ptl_idx[i])] = true;
        }

        if let Some(i) = ptl_referred.iter().position(|referred| !referred) {
            broken_data!("profile_tier_level()[{}] is not referred to by any OLS", i);
        }

        vps.derive_output_layer_sets()?;

        let num_multi_layer_olss = usize::from(vps.num_multi_layer_olss);

        if !vps.each_layer_is_an_ols_flag {
            vps.num_dpb_params_minus1 =
                r.read_ue_max(u32::from(vps.num_multi_layer_olss.saturating_sub(1)))?;

            if vps.max_sublayers_minus1 > 0 {
                vps.sublayer_dpb_params_present_flag = r.read_bit()?;
            }

            let num_dpb_params = usize::from(vps.num_dpb_params_minus1) + 1;
            vps.dpb_max_tid = vec![0; num_dpb_params];
            vps.dpb = vec![Default::default(); num_dpb_params];
            for i in 0..num_dpb_params {
                vps.dpb_max_tid[i] = if !vps.default_ptl_dpb_hrd_max_tid_flag {
                    r.read_bits_max(3, u32::from(vps.max_sublayers_minus1))?
                } else {
                    vps.max_sublayers_minus1
                };

                vps.dpb[i].parse(r, vps.dpb_max_tid[i], vps.sublayer_dpb_params_present_flag)?;
            }

            vps.ols_dpb_pic_width = vec![0; num_multi_layer_olss];
            vps.ols_dpb_pic_height = vec![0; num_multi_layer_olss];
            vps.ols_dpb_chroma_format = vec![0; num_multi_layer_olss];
            vps.ols_dpb_bitdepth_minus8 = vec![0; num_multi_layer_olss];
            vps.ols_dpb_params_idx = vec![0; num_multi_layer_olss];
            for i in 0..num_multi_layer_olss {
                vps.ols_dpb_pic_width[i] = r.read_ue_max(u32::from(u16::MAX))?;
                vps.ols_dpb_pic_height[i] = r.read_ue_max(u32::from(u16::MAX))?;
                vps.ols_dpb_chroma_format[i] = r.read_bits(2)?;
                vps.ols_dpb_bitdepth_minus8[i] = r.read_ue_max(2)?;

                vps.ols_dpb_params_idx[i] = if num_dpb_params > 1
                    && num_dpb_params != num_multi_layer_olss
                {
                    r.read_ue_max(u32::from(vps.num_dpb_params_minus1))?
                } else if num_dpb_params == 1 {
                    0
                } else {
                    i as u16
                };
            }

            vps.timing_hrd_params_present_flag = r.read_bit()?;
        }

        vps.hrd_max_tid = vec![vps.max_sublayers_minus1; total_num_olss];

        if vps.timing_hrd_params_present_flag {
            vps.general_hrd_params.parse(r)?;

            if vps.max_sublayers_minus1 > 0 {
                vps.sublayer_cpb_params_present_flag = r.read_bit()?;
            }

            vps.num_ols_timing_hrd_params_minus1 =
                r.read_ue_max(u32::from(vps.num_multi_layer_olss.saturating_sub(1)))?;

            let num_hrd_params = usize::from(vps.num_ols_timing_hrd_params_minus1) + 1;
            vps.ols_hrd_params = vec![Default::default(); num_hrd_params];
            for i in 0..num_hrd_params {
                if !vps.default_ptl_dpb_hrd_max_tid_flag {
                    vps.hrd_max_tid[i] = r.read_bits_max(3, u32::from(vps.max_sublayers_minus1))?;
                }

                let first_sublayer = if vps.sublayer_cpb_params_present_flag {
                    0
                } else {
                    vps.hrd_max_tid[i]
                };

                vps.ols_hrd_params[i].parse(
                    r,
                    &vps.general_hrd_params,
                    first_sublayer,
                    vps.hrd_max_tid[i],
                )?;
            }

            let mut hrd_referred = vec![false; num_hrd_params];
            vps.ols_timing_hrd_idx = vec![0; num_multi_layer_olss];
            for i in 0..num_multi_layer_olss {
                vps.ols_timing_hrd_idx[i] = if num_hrd_params > 1
                    && num_hrd_params != num_multi_layer_olss
                {
                    r.read_ue_max(u32::from(vps.num_ols_timing_hrd_params_minus1))?
                } else if num_hrd_params == 1 {
                    0
                } else {
                    i as u16
                };

                hrd_referred[usize::from(vps.ols_timing_hrd_idx[i])] = true;
            }

            if let Some(i) = hrd_referred.iter().position(|referred| !referred) {
                broken_data!("ols_timing_hrd_parameters()[{}] is not referred to by any OLS", i);
            }
        }

        vps.extension_flag = r.read_bit()?;
        if vps.extension_flag {
            log::debug!("Ignoring VPS extension data");
        }

        vps.check()?;

        Ok(vps)
    }

    /// Derives the layer composition of every output layer set, (7-39) to
    /// (7-41).
    fn derive_output_layer_sets(&mut self) -> ParseResult<()> {
        let num_layers = usize::from(self.max_layers_minus1) + 1;
        let total_num_olss = usize::from(self.total_num_olss);

        let mut dependency_flag = vec![vec![false; num_layers]; num_layers];
        self.layer_used_as_ref_layer_flag = vec![false; num_layers];
        for i in 0..num_layers {
            for j in 0..num_layers {
                dependency_flag[i][j] = self.direct_ref_layer_flag[i][j];
                for k in 0..i {
                    if self.direct_ref_layer_flag[i][k] && dependency_flag[k][j] {
                        dependency_flag[i][j] = true;
                    }
                }

                if self.direct_ref_layer_flag[i][j] {
                    self.layer_used_as_ref_layer_flag[j] = true;
                }
            }
        }

        self.reference_layer_idx = (0..num_layers)
            .map(|i| (0..num_layers).filter(|&j| dependency_flag[i][j]).map(|j| j as u8).collect())
            .collect();
        self.num_ref_layers = self.reference_layer_idx.iter().map(|refs| refs.len() as u8).collect();

        let ptl_max_tid = |ols: usize| self.ptl_max_tid[usize::from(self.ols_ptl_idx[ols])] + 1;

        let mut num_output_layers_in_ols = vec![0u8; total_num_olss];
        let mut output_layer_id_in_ols = vec![vec![]; total_num_olss];
        let mut num_sub_layers = vec![vec![0u8; num_layers]; total_num_olss];
        let mut layer_included_in_ols = vec![vec![false; num_layers]; total_num_olss];
        let mut layer_used_as_output_layer_flag = vec![false; num_layers];

        num_output_layers_in_ols[0] = 1;
        output_layer_id_in_ols[0].push(self.layer_id[0]);
        num_sub_layers[0][0] = ptl_max_tid(0);
        layer_used_as_output_layer_flag[0] = true;
        for flag in layer_used_as_output_layer_flag.iter_mut().skip(1) {
            *flag = self.each_layer_is_an_ols_flag || self.ols_mode_idc < 2;
        }

        // (7-40)
        for i in 1..total_num_olss {
            if self.each_layer_is_an_ols_flag || self.ols_mode_idc == 0 {
                num_output_layers_in_ols[i] = 1;
                output_layer_id_in_ols[i].push(self.layer_id[i]);

                if self.each_layer_is_an_ols_flag {
                    num_sub_layers[i][0] = ptl_max_tid(i);
                } else {
                    num_sub_layers[i][i] = ptl_max_tid(i);
                    for k in (0..i).rev() {
                        num_sub_layers[i][k] = 0;
                        for m in k + 1..=i {
                            let max_sublayer_needed =
                                num_sub_layers[i][m].min(self.max_tid_il_ref_pics_plus1[m][k]);
                            if self.direct_ref_layer_flag[m][k]
                                && num_sub_layers[i][k] < max_sublayer_needed
                            {
                                num_sub_layers[i][k] = max_sublayer_needed;
                            }
                        }
                    }
                }
            } else if self.ols_mode_idc == 1 {
                num_output_layers_in_ols[i] = i as u8 + 1;
                for j in 0..=i {
                    output_layer_id_in_ols[i].push(self.layer_id[j]);
                    num_sub_layers[i][j] = ptl_max_tid(i);
                }
            } else {
                let mut output_layer_idx = vec![];
                let mut highest_included_layer = 0;
                for k in 0..num_layers {
                    if self.ols_output_layer_flag[i][k] {
                        layer_included_in_ols[i][k] = true;
                        highest_included_layer = k;
                        layer_used_as_output_layer_flag[k] = true;
                        output_layer_idx.push(k);
                        output_layer_id_in_ols[i].push(self.layer_id[k]);
                        num_sub_layers[i][k] = ptl_max_tid(i);
                    }
                }
                num_output_layers_in_ols[i] = output_layer_idx.len() as u8;

                for idx in output_layer_idx {
                    for &ref_layer in &self.reference_layer_idx[idx] {
                        layer_included_in_ols[i][usize::from(ref_layer)] = true;
                    }
                }

                for k in (0..highest_included_layer).rev() {
                    if !layer_included_in_ols[i][k] || self.ols_output_layer_flag[i][k] {
                        continue;
                    }

                    for m in k + 1..=highest_included_layer {
                        let max_sublayer_needed =
                            num_sub_layers[i][m].min(self.max_tid_il_ref_pics_plus1[m][k]);
                        if self.direct_ref_layer_flag[m][k]
                            && layer_included_in_ols[i][m]
                            && num_sub_layers[i][k] < max_sublayer_needed
                        {
                            num_sub_layers[i][k] = max_sublayer_needed;
                        }
                    }
                }
            }
        }

        for i in 0..num_layers {
            if !self.layer_used_as_ref_layer_flag[i] && !layer_used_as_output_layer_flag[i] {
                broken_data!("Layer {} is neither an output layer nor a reference layer", i);
            }
        }

        // (7-41)
        let mut num_layers_in_ols = vec![0u8; total_num_olss];
        let mut layer_id_in_ols = vec![vec![]; total_num_olss];
        let mut multi_layer_ols_idx = vec![0u16; total_num_olss];
        let mut num_multi_layer_olss = 0;

        num_layers_in_ols[0] = 1;
        layer_id_in_ols[0].push(self.layer_id[0]);
        for i in 1..total_num_olss {
            if self.each_layer_is_an_ols_flag {
                layer_id_in_ols[i].push(self.layer_id[i]);
            } else if self.ols_mode_idc < 2 {
                layer_id_in_ols[i].extend_from_slice(&self.layer_id[..=i]);
            } else {
                layer_id_in_ols[i] = (0..num_layers)
                    .filter(|&k| layer_included_in_ols[i][k])
                    .map(|k| self.layer_id[k])
                    .collect();
            }
            num_layers_in_ols[i] = layer_id_in_ols[i].len() as u8;

            if num_layers_in_ols[i] > 1 {
                multi_layer_ols_idx[i] = num_multi_layer_olss;
                num_multi_layer_olss += 1;
            }
        }

        self.num_output_layers_in_ols = num_output_layers_in_ols;
        self.output_layer_id_in_ols = output_layer_id_in_ols;
        self.num_sub_layers_in_layer_in_ols = num_sub_layers;
        self.layer_used_as_output_layer_flag = layer_used_as_output_layer_flag;
        self.num_layers_in_ols = num_layers_in_ols;
        self.layer_id_in_ols = layer_id_in_ols;
        self.multi_layer_ols_idx = multi_layer_ols_idx;
        self.num_multi_layer_olss = num_multi_layer_olss;

        Ok(())
    }

    /// Cross-checks the DPB and HRD sublayer ranges of every multilayer OLS
    /// against its profile, tier and level.
    fn check(&self) -> ParseResult<()> {
        for i in 0..usize::from(self.total_num_olss) {
            if self.num_layers_in_ols[i] <= 1 {
                continue;
            }

            let m = usize::from(self.multi_layer_ols_idx[i]);
            let ptl_max_tid = self.ptl_max_tid[usize::from(self.ols_ptl_idx[i])];

            if self.timing_hrd_params_present_flag {
                let hrd_idx = usize::from(self.ols_timing_hrd_idx[m]);
                if self.hrd_max_tid[hrd_idx] < ptl_max_tid {
                    broken_data!(
                        "vps_hrd_max_tid[{}] ({}) shall be greater than or equal to vps_ptl_max_tid ({}) of OLS {}",
                        hrd_idx,
                        self.hrd_max_tid[hrd_idx],
                        ptl_max_tid,
                        i
                    );
                }
            }

            if !self.each_layer_is_an_ols_flag {
                let dpb_idx = usize::from(self.ols_dpb_params_idx[m]);
                if self.dpb_max_tid[dpb_idx] < ptl_max_tid {
                    broken_data!(
                        "vps_dpb_max_tid[{}] ({}) shall be greater than or equal to vps_ptl_max_tid ({}) of OLS {}",
                        dpb_idx,
                        self.dpb_max_tid[dpb_idx],
                        ptl_max_tid,
                        i
                    );
                }
            }
        }

        Ok(())
    }

    /// The VPS inferred when an SPS refers to `sps_video_parameter_set_id`
    /// 0: a single independent layer forming a single OLS.
    pub(crate) fn single_layer(layer_id: u8) -> Vps {
        Vps {
            all_independent_layers_flag: true,
            layer_id: vec![layer_id],
            independent_layer_flag: vec![true],
            each_layer_is_an_ols_flag: true,
            total_num_olss: 1,
            num_layers_in_ols: vec![1],
            layer_id_in_ols: vec![vec![layer_id]],
            num_output_layers_in_ols: vec![1],
            output_layer_id_in_ols: vec![vec![layer_id]],
            ..Default::default()
        }
    }

    /// Returns the index of the OLS that has `layer_id` as its only layer,
    /// if any.
    pub fn single_layer_ols(&self, layer_id: u8) -> Option<usize> {
        self.layer_id_in_ols.iter().position(|layers| layers.as_slice() == [layer_id])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::h266::ptl::Level;
    use crate::codec::h266::ptl::Profile;
    use crate::codec::h266::test_utils::write_ptl;
    use crate::codec::h266::test_utils::NaluWriter;
    use crate::error::ParserResult;

    #[test]
    fn single_layer() {
        let mut w = NaluWriter::new();
        w.write_f(4, 1u8) // vps_id
            .write_f(6, 0u8) // max_layers_minus1
            .write_f(3, 0u8) // max_sublayers_minus1
            .write_f(6, 0u8) // layer_id[0]
            .align();
        write_ptl(&mut w, Profile::Main10 as u8, Level::L4_1 as u8, 0);
        w.write_flag(false).trailing_bits();
        let data = w.rbsp();

        let vps = Vps::parse(&mut NaluReader::without_epb(&data)).unwrap();
        assert_eq!(vps.vps_id, 1);
        assert!(vps.each_layer_is_an_ols_flag);
        assert!(vps.all_independent_layers_flag);
        assert!(vps.default_ptl_dpb_hrd_max_tid_flag);
        assert_eq!(vps.total_num_olss, 1);
        assert_eq!(vps.num_multi_layer_olss, 0);
        assert_eq!(vps.num_layers_in_ols, vec![1]);
        assert_eq!(vps.layer_id_in_ols, vec![vec![0]]);
        assert_eq!(vps.num_sub_layers_in_layer_in_ols[0][0], 1);
        assert_eq!(vps.profile_tier_level[0].profile(), Some(Profile::Main10));
        assert_eq!(vps.single_layer_ols(0), Some(0));
    }

    #[test]
    fn reserved_vps_id() {
        let mut w = NaluWriter::new();
        w.write_f(4, 0u8).write_f(6, 0u8).write_f(3, 0u8).write_f(6, 0u8).align();
        write_ptl(&mut w, Profile::Main10 as u8, Level::L4_1 as u8, 0);
        w.write_flag(false).trailing_bits();
        let data = w.rbsp();

        let err = Vps::parse(&mut NaluReader::without_epb(&data)).unwrap_err();
        assert_eq!(err.kind(), ParserResult::BrokenData);
    }

    /// Two layers, layer 1 predicted from layer 0, one OLS per layer prefix.
    fn write_two_layers(w: &mut NaluWriter, ols_mode_idc: u8, dpb_max_dec_pic_buffering: u32) {
        w.write_f(4, 2u8) // vps_id
            .write_f(6, 1u8) // max_layers_minus1
            .write_f(3, 0u8) // max_sublayers_minus1
            .write_flag(false) // all_independent_layers_flag
            .write_f(6, 0u8) // layer_id[0]
            .write_f(6, 1u8) // layer_id[1]
            .write_flag(false) // independent_layer_flag[1]
            .write_flag(false) // max_tid_ref_present_flag[1]
            .write_flag(true) // direct_ref_layer_flag[1][0]
            .write_f(2, ols_mode_idc)
            .write_f(8, 0u8) // num_ptls_minus1
            .align();
        write_ptl(w, Profile::MultilayerMain10 as u8, Level::L5_1 as u8, 0);
        w.write_ue(0u32) // num_dpb_params_minus1
            .write_ue(dpb_max_dec_pic_buffering)
            .write_ue(0u32)
            .write_ue(0u32)
            .write_ue(1920u32)
            .write_ue(1080u32)
            .write_f(2, 1u8)
            .write_ue(2u32)
            .write_flag(false) // timing_hrd_params_present_flag
            .write_flag(false) // extension
            .trailing_bits();
    }

    #[test]
    fn two_layers_output_all() {
        let mut w = NaluWriter::new();
        write_two_layers(&mut w, 1, 4);
        let data = w.rbsp();

        let vps = Vps::parse(&mut NaluReader::without_epb(&data)).unwrap();
        assert!(!vps.each_layer_is_an_ols_flag);
        assert_eq!(vps.total_num_olss, 2);
        assert_eq!(vps.num_multi_layer_olss, 1);
        assert_eq!(vps.multi_layer_ols_idx[1], 0);
        assert_eq!(vps.layer_id_in_ols, vec![vec![0], vec![0, 1]]);
        assert_eq!(vps.output_layer_id_in_ols[1], vec![0, 1]);
        assert_eq!(vps.num_ref_layers, vec![0, 1]);
        assert_eq!(vps.max_tid_il_ref_pics_plus1[1][0], 1);
        assert_eq!(vps.ols_dpb_pic_width, vec![1920]);
        assert_eq!(vps.ols_dpb_bitdepth_minus8, vec![2]);
        assert_eq!(vps.dpb[0].max_dec_pic_buffering_minus1[0], 4);
        assert_eq!(vps.single_layer_ols(1), None);
    }

    #[test]
    fn two_layers_output_highest() {
        let mut w = NaluWriter::new();
        write_two_layers(&mut w, 0, 4);
        let data = w.rbsp();

        let vps = Vps::parse(&mut NaluReader::without_epb(&data)).unwrap();
        assert_eq!(vps.num_output_layers_in_ols, vec![1, 1]);
        assert_eq!(vps.output_layer_id_in_ols[1], vec![1]);
        assert_eq!(vps.num_layers_in_ols[1], 2);
        assert_eq!(vps.num_sub_layers_in_layer_in_ols[1], vec![1, 1]);
    }

    #[test]
    fn explicit_output_layers() {
        let mut w = NaluWriter::new();
        w.write_f(4, 3u8)
            .write_f(6, 1u8)
            .write_f(3, 0u8)
            .write_flag(false)
            .write_f(6, 0u8)
            .write_f(6, 4u8)
            .write_flag(false)
            .write_flag(false)
            .write_flag(true)
            .write_f(2, 2u8) // ols_mode_idc
            .write_f(8, 0u8) // num_output_layer_sets_minus2
            .write_flag(false) // ols_output_layer_flag[1][0]
            .write_flag(true) // ols_output_layer_flag[1][1]
            .write_f(8, 0u8)
            .align();
        write_ptl(&mut w, Profile::MultilayerMain10 as u8, Level::L5_1 as u8, 0);
        w.write_ue(0u32)
            .write_ue(4u32)
            .write_ue(0u32)
            .write_ue(0u32)
            .write_ue(64u32)
            .write_ue(64u32)
            .write_f(2, 1u8)
            .write_ue(0u32)
            .write_flag(false)
            .write_flag(false)
            .trailing_bits();
        let data = w.rbsp();

        let vps = Vps::parse(&mut NaluReader::without_epb(&data)).unwrap();
        assert_eq!(vps.total_num_olss, 2);
        assert_eq!(vps.output_layer_id_in_ols[1], vec![4]);
        assert_eq!(vps.layer_id_in_ols[1], vec![0, 4]);
        assert_eq!(vps.num_sub_layers_in_layer_in_ols[1], vec![1, 1]);
        assert!(vps.layer_used_as_ref_layer_flag[0]);
    }

    #[test]
    fn decreasing_layer_ids() {
        let mut w = NaluWriter::new();
        w.write_f(4, 2u8)
            .write_f(6, 1u8)
            .write_f(3, 0u8)
            .write_flag(true)
            .write_f(6, 5u8)
            .write_f(6, 5u8)
            .align();
        let data = w.rbsp();

        let err = Vps::parse(&mut NaluReader::without_epb(&data)).unwrap_err();
        assert_eq!(err.kind(), ParserResult::BrokenData);
    }
}
