use crate::model::HASH_BITS;

/// Probability that two independent random 128-bit hashes agree on at
/// least `matching_bits` positions (binomial tail, p = 1/2).
pub fn probability_of_random_match(matching_bits: u32) -> f64 {
    let tail = binomial_tail();
    tail[matching_bits.min(HASH_BITS) as usize]
}

/// Expected number of unrelated hits per genuine one: the inverse of the
/// chance that any of `population` random records matches this well.
///
/// Larger is better. The value is non-decreasing in `matching_bits`.
pub fn odds_of_random_hit(matching_bits: u32, population: u64) -> f64 {
    let population = population.max(1) as f64;
    1.0 / (probability_of_random_match(matching_bits) * population)
}

/// Fraction of equal bits, in `0.0..=1.0`.
pub fn similarity(matching_bits: u32) -> f64 {
    f64::from(matching_bits.min(HASH_BITS)) / f64::from(HASH_BITS)
}

/// Similarity rescaled so that chance agreement (half the bits) maps to 0.
pub fn normalized_similarity(matching_bits: u32) -> f64 {
    ((similarity(matching_bits) - 0.5).max(0.0)) * 2.0
}

/// `tail[m] = P[X >= m]` for `X ~ Bin(128, 1/2)`, summed from the top so the
/// sequence is monotone even after rounding.
fn binomial_tail() -> [f64; HASH_BITS as usize + 1] {
    let n = HASH_BITS as usize;
    let scale = 2f64.powi(HASH_BITS as i32);
    let mut coefficients = [0.0f64; HASH_BITS as usize + 1];
    let mut c = 1.0f64;
    for (i, slot) in coefficients.iter_mut().enumerate() {
        *slot = c / scale;
        c = c * (n - i) as f64 / (i + 1) as f64;
    }
    let mut tail = [0.0f64; HASH_BITS as usize + 1];
    let mut running = 0.0f64;
    for i in (0..=n).rev() {
        running += coefficients[i];
        tail[i] = running;
    }
    tail
}
