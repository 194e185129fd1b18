//! Fixed 128-bit bit permutation used to spread hash bits across the
//! sortable prefix of each index table.

const fn mask(high: u64, low: u64) -> u128 {
    ((high as u128) << 64) | low as u128
}

/// Butterfly steps `(mask, shift)`; applied in order they form one
/// fixed permutation of the 128 bit positions.
const STEPS: [(u128, u32); 13] = [
    (mask(0x1110_4444_0010_0110, 0x4501_0055_5051_0550), 1),
    (mask(0x2123_3331_0030_2210, 0x3110_1010_0102_2210), 2),
    (mask(0x0c01_0c0d_0904_0901, 0x0a0c_0101_0a04_0b00), 4),
    (mask(0x0052_0067_00fe_0041, 0x00ab_0029_0033_0000), 8),
    (mask(0x0000_678f_0000_bd05, 0x0000_2363_0000_0000), 16),
    (mask(0x0000_0000_04c3_0052, 0x0000_0000_0000_0000), 32),
    (mask(0x0000_0000_0000_0000, 0x3782_ccfd_884d_7006), 64),
    (mask(0x0000_0000_9673_9fb5, 0x0000_0000_f200_85be), 32),
    (mask(0x0000_76f9_0000_4a91, 0x0000_1822_0000_ecf9), 16),
    (mask(0x00bf_001d_0072_0029, 0x0013_00c4_0053_007c), 8),
    (mask(0x0604_0a09_050f_0a04, 0x0d02_0205_0c01_0c0f), 4),
    (mask(0x1231_0221_3133_1030, 0x2232_2331_1102_2130), 2),
    (mask(0x0140_5451_1141_1015, 0x0010_1441_5450_5040), 1),
];

/// Swap the bits selected by `m` with the bits `shift` positions above them.
///
/// `m` must not overlap `m << shift`.
const fn bit_permute_step(x: u128, m: u128, shift: u32) -> u128 {
    let t = ((x >> shift) ^ x) & m;
    (x ^ t) ^ (t << shift)
}

/// Apply the base permutation once.
pub fn permute(mut value: u128) -> u128 {
    for (m, shift) in STEPS {
        value = bit_permute_step(value, m, shift);
    }
    value
}

/// The first `count` permutations of `value`: entry `k` is the base
/// permutation applied `k + 1` times.
pub fn permutations(value: u128, count: usize) -> Vec<u128> {
    let mut out = Vec::with_capacity(count);
    let mut current = value;
    for _ in 0..count {
        current = permute(current);
        out.push(current);
    }
    out
}

/// Permutation `index` of `value` (zero-based).
pub fn nth_permutation(value: u128, index: usize) -> u128 {
    let mut current = value;
    for _ in 0..=index {
        current = permute(current);
    }
    current
}
