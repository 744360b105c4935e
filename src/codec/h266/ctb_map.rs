// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! CTB raster/tile scan conversion, 6.5.1.

use crate::codec::h266::parser::MAX_CTUS_IN_PICTURE;
use crate::codec::h266::parser::MAX_ENTRY_POINTS;
use crate::codec::h266::pps::Pps;
use crate::error::broken_data;
use crate::error::ParseResult;

/// CTB address maps derived from an active PPS.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CtbMap {
    /// CtbAddrInRs of every CTB of the picture. In rectangular slice mode the
    /// CTBs are grouped slice after slice, otherwise they follow the tile
    /// scan.
    pub ctb_addr_in_slice: Vec<u32>,
    /// Index in `ctb_addr_in_slice` of the first CTB of each rectangular
    /// slice.
    pub slice_start_offset: Vec<u32>,
    /// NumCtusInSlice of each rectangular slice.
    pub num_ctus_in_slice: Vec<u32>,
    /// CtbToTileColBd, `pic_width_in_ctbs_y + 1` entries.
    pub ctb_to_tile_col_bd: Vec<u32>,
    /// CtbToTileRowBd, `pic_height_in_ctbs_y + 1` entries.
    pub ctb_to_tile_row_bd: Vec<u32>,
}

/// Maps every CTB column (or row) to the boundary of the tile containing it,
/// (6-5) and (6-6).
fn ctb_to_tile_bd(pic_size_in_ctbs: u32, tile_bd_val: &[u32]) -> Vec<u32> {
    let mut tile = 0;
    let mut out = Vec::with_capacity(pic_size_in_ctbs as usize + 1);

    for ctb_addr in 0..pic_size_in_ctbs {
        if tile + 1 < tile_bd_val.len() && ctb_addr == tile_bd_val[tile + 1] {
            tile += 1;
        }
        out.push(tile_bd_val[tile]);
    }

    out.push(pic_size_in_ctbs);
    out
}

impl CtbMap {
    pub fn new(pps: &Pps) -> ParseResult<CtbMap> {
        if pps.pic_size_in_ctbs_y as usize >= MAX_CTUS_IN_PICTURE {
            broken_data!("Too many CTBs: {}", pps.pic_size_in_ctbs_y);
        }

        let mut map = CtbMap {
            ctb_to_tile_col_bd: ctb_to_tile_bd(pps.pic_width_in_ctbs_y, &pps.tile_col_bd_val),
            ctb_to_tile_row_bd: ctb_to_tile_bd(pps.pic_height_in_ctbs_y, &pps.tile_row_bd_val),
            ..Default::default()
        };

        if !pps.no_pic_partition_flag && pps.rect_slice_flag {
            map.add_rect_slices(pps)?;
        } else {
            for tile_y in 0..pps.num_tile_rows as usize {
                for tile_x in 0..pps.num_tile_columns as usize {
                    map.add_ctbs(
                        pps,
                        pps.tile_col_bd_val[tile_x],
                        pps.tile_row_bd_val[tile_y],
                        u32::from(pps.tile_column_width_minus1[tile_x]) + 1,
                        u32::from(pps.tile_row_height_minus1[tile_y]) + 1,
                    );
                }
            }
        }

        if map.ctb_addr_in_slice.len() > pps.pic_size_in_ctbs_y as usize {
            broken_data!(
                "Slices cover {} CTBs in a picture of {}",
                map.ctb_addr_in_slice.len(),
                pps.pic_size_in_ctbs_y
            );
        }

        Ok(map)
    }

    /// Appends the raster scan addresses of a rectangle of CTBs, returning
    /// how many were added.
    fn add_ctbs(&mut self, pps: &Pps, ctu_x: u32, ctu_y: u32, width: u32, height: u32) -> u32 {
        for y in ctu_y..ctu_y + height {
            for x in ctu_x..ctu_x + width {
                self.ctb_addr_in_slice.push(y * pps.pic_width_in_ctbs_y + x);
            }
        }

        width * height
    }

    fn add_rect_slices(&mut self, pps: &Pps) -> ParseResult<()> {
        let num_slices = usize::from(pps.num_slices_in_pic_minus1) + 1;
        let mut slice_start_offset = 0;

        for i in 0..num_slices {
            let tile_idx = pps.slice_top_left_tile_idx[i];
            let tile_x = (tile_idx % pps.num_tile_columns) as usize;
            let tile_y = (tile_idx / pps.num_tile_columns) as usize;

            self.slice_start_offset.push(slice_start_offset);

            if pps.slice_width_in_tiles_minus1[i] == 0 && pps.slice_height_in_tiles_minus1[i] == 0 {
                // At most one tile, possibly a part of it.
                slice_start_offset += self.add_ctbs(
                    pps,
                    pps.slice_top_left_ctu_x[i],
                    pps.slice_top_left_ctu_y[i],
                    u32::from(pps.tile_column_width_minus1[tile_x]) + 1,
                    pps.slice_height_in_ctus[i],
                );
            } else {
                let last_x = tile_x + usize::from(pps.slice_width_in_tiles_minus1[i]);
                let last_y = tile_y + usize::from(pps.slice_height_in_tiles_minus1[i]);
                if last_x >= pps.num_tile_columns as usize || last_y >= pps.num_tile_rows as usize
                {
                    broken_data!("Slice {} extends past the last tile", i);
                }

                for y in tile_y..=last_y {
                    for x in tile_x..=last_x {
                        slice_start_offset += self.add_ctbs(
                            pps,
                            pps.tile_col_bd_val[x],
                            pps.tile_row_bd_val[y],
                            u32::from(pps.tile_column_width_minus1[x]) + 1,
                            u32::from(pps.tile_row_height_minus1[y]) + 1,
                        );
                    }
                }
            }

            self.num_ctus_in_slice.push(slice_start_offset - self.slice_start_offset[i]);

            if self.ctb_addr_in_slice.len() > pps.pic_size_in_ctbs_y as usize {
                broken_data!("Slice {} covers CTBs of a previous slice", i);
            }
        }

        Ok(())
    }

    /// Returns the CTBs of rectangular slice `slice_idx`.
    pub fn rect_slice_ctbs(&self, slice_idx: usize) -> Option<&[u32]> {
        let start = *self.slice_start_offset.get(slice_idx)? as usize;
        let len = *self.num_ctus_in_slice.get(slice_idx)? as usize;
        self.ctb_addr_in_slice.get(start..start + len)
    }

    /// Returns the indices within `slice_ctbs` of the CTBs that start a new
    /// entry point, i.e. a new tile or, with entropy coding sync, a new CTB
    /// row. (7-141)
    pub fn entry_point_start_ctus(
        &self,
        slice_ctbs: &[u32],
        pic_width_in_ctbs: u32,
        entropy_coding_sync_enabled_flag: bool,
    ) -> ParseResult<Vec<u32>> {
        let mut starts = vec![];

        for (i, pair) in slice_ctbs.windows(2).enumerate() {
            let (prev, curr) = (pair[0], pair[1]);
            let (prev_x, prev_y) = (prev % pic_width_in_ctbs, prev / pic_width_in_ctbs);
            let (x, y) = (curr % pic_width_in_ctbs, curr / pic_width_in_ctbs);

            let col_bd = |x: u32| self.ctb_to_tile_col_bd.get(x as usize).copied();
            let row_bd = |y: u32| self.ctb_to_tile_row_bd.get(y as usize).copied();

            if row_bd(y) != row_bd(prev_y)
                || col_bd(x) != col_bd(prev_x)
                || (y != prev_y && entropy_coding_sync_enabled_flag)
            {
                starts.push(i as u32 + 1);
            }
        }

        if starts.len() > MAX_ENTRY_POINTS {
            broken_data!("Too many entry points: {}", starts.len());
        }

        Ok(starts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pps_with_tiles(width_in_ctbs: u32, height_in_ctbs: u32, columns: &[u16], rows: &[u16]) -> Pps {
        let bd = |sizes: &[u16]| {
            let mut out = vec![0];
            for size in sizes {
                out.push(out[out.len() - 1] + u32::from(*size) + 1);
            }
            out
        };

        Pps {
            pic_width_in_ctbs_y: width_in_ctbs,
            pic_height_in_ctbs_y: height_in_ctbs,
            pic_size_in_ctbs_y: width_in_ctbs * height_in_ctbs,
            tile_column_width_minus1: columns.to_vec(),
            tile_row_height_minus1: rows.to_vec(),
            num_tile_columns: columns.len() as u32,
            num_tile_rows: rows.len() as u32,
            num_tiles_in_pic: (columns.len() * rows.len()) as u32,
            tile_col_bd_val: bd(columns),
            tile_row_bd_val: bd(rows),
            ..Default::default()
        }
    }

    #[test]
    fn raster_order_without_partition() {
        let mut pps = pps_with_tiles(4, 3, &[3], &[2]);
        pps.no_pic_partition_flag = true;

        let map = CtbMap::new(&pps).unwrap();
        assert_eq!(map.ctb_addr_in_slice, (0..12).collect::<Vec<u32>>());
        assert_eq!(map.ctb_to_tile_col_bd, vec![0, 0, 0, 0, 4]);
        assert_eq!(map.ctb_to_tile_row_bd, vec![0, 0, 0, 3]);
        assert!(map.slice_start_offset.is_empty());
    }

    #[test]
    fn tile_scan() {
        // Two 2x2 tiles side by side.
        let pps = pps_with_tiles(4, 2, &[1, 1], &[1]);

        let map = CtbMap::new(&pps).unwrap();
        assert_eq!(map.ctb_addr_in_slice, vec![0, 1, 4, 5, 2, 3, 6, 7]);
        assert_eq!(map.ctb_to_tile_col_bd, vec![0, 0, 2, 2, 4]);

        let starts = map.entry_point_start_ctus(&map.ctb_addr_in_slice, 4, false).unwrap();
        assert_eq!(starts, vec![4]);

        // With WPP every CTB row starts an entry point as well.
        let starts = map.entry_point_start_ctus(&map.ctb_addr_in_slice, 4, true).unwrap();
        assert_eq!(starts, vec![2, 4, 6]);
    }

    #[test]
    fn rect_slices() {
        // One tile per slice, the second tile split in two slices.
        let mut pps = pps_with_tiles(4, 2, &[1, 1], &[1]);
        pps.rect_slice_flag = true;
        pps.num_slices_in_pic_minus1 = 2;
        pps.slice_top_left_tile_idx = vec![0, 1, 1];
        pps.slice_width_in_tiles_minus1 = vec![0; 3];
        pps.slice_height_in_tiles_minus1 = vec![0; 3];
        pps.slice_top_left_ctu_x = vec![0, 2, 2];
        pps.slice_top_left_ctu_y = vec![0, 0, 1];
        pps.slice_height_in_ctus = vec![2, 1, 1];

        let map = CtbMap::new(&pps).unwrap();
        assert_eq!(map.slice_start_offset, vec![0, 4, 6]);
        assert_eq!(map.num_ctus_in_slice, vec![4, 2, 2]);
        assert_eq!(map.rect_slice_ctbs(2), Some(&[6u32, 7][..]));
        assert_eq!(map.rect_slice_ctbs(3), None);
    }

    #[test]
    fn overlapping_rect_slices() {
        let mut pps = pps_with_tiles(2, 2, &[1], &[1]);
        pps.rect_slice_flag = true;
        pps.num_slices_in_pic_minus1 = 1;
        pps.slice_top_left_tile_idx = vec![0, 0];
        pps.slice_width_in_tiles_minus1 = vec![0; 2];
        pps.slice_height_in_tiles_minus1 = vec![0; 2];
        pps.slice_top_left_ctu_x = vec![0, 0];
        pps.slice_top_left_ctu_y = vec![0, 0];
        pps.slice_height_in_ctus = vec![2, 2];

        assert!(CtbMap::new(&pps).is_err());
    }
}
