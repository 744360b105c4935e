// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Constant tables of the H.266 syntax.

/// Sample aspect ratios indexed by `aspect_ratio_idc` (H.273, Table 7).
pub const ASPECT_RATIOS: [(u32, u32); 17] = [
    (0, 0),
    (1, 1),
    (12, 11),
    (10, 11),
    (16, 11),
    (40, 33),
    (24, 11),
    (20, 11),
    (32, 11),
    (80, 33),
    (18, 11),
    (15, 11),
    (64, 33),
    (160, 99),
    (4, 3),
    (3, 2),
    (2, 1),
];

/// `aspect_ratio_idc` value signalling an explicit ratio.
pub const EXTENDED_SAR: u8 = 255;

/// Flat prediction used for the first scaling matrices of a family.
pub const SCALING_PRED_ALL_8: [u8; 64] = [8; 64];
/// Flat prediction used for scaling matrices without a reference.
pub const SCALING_PRED_ALL_16: [u8; 64] = [16; 64];

/// Up-right diagonal scan order of a square block of `1 << log2_size`
/// samples a side, as `(x, y)` pairs (6.5.2).
pub fn diag_scan_order(log2_size: usize) -> Vec<(usize, usize)> {
    let size = 1i64 << log2_size;
    let mut order = Vec::with_capacity((size * size) as usize);

    let mut x = 0i64;
    let mut y = 0i64;
    while order.len() < (size * size) as usize {
        while y >= 0 {
            if x < size && y < size {
                order.push((x as usize, y as usize));
            }
            y -= 1;
            x += 1;
        }
        y = x;
        x = 0;
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagonal_scan() {
        assert_eq!(diag_scan_order(0), vec![(0, 0)]);
        assert_eq!(diag_scan_order(1), vec![(0, 0), (0, 1), (1, 0), (1, 1)]);

        let order = diag_scan_order(2);
        let x: Vec<usize> = order.iter().map(|p| p.0).collect();
        let y: Vec<usize> = order.iter().map(|p| p.1).collect();
        assert_eq!(x, vec![0, 0, 1, 0, 1, 2, 0, 1, 2, 3, 1, 2, 3, 2, 3, 3]);
        assert_eq!(y, vec![0, 1, 0, 2, 1, 0, 3, 2, 1, 0, 3, 2, 1, 3, 2, 3]);

        let order = diag_scan_order(3);
        assert_eq!(order.len(), 64);
        assert_eq!(order[10], (0, 4));
        assert_eq!(order[63], (7, 7));
    }
}
