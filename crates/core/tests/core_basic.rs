use simsearch_core::model::{SimHash, HASH_BITS};
use simsearch_core::version;

#[test]
fn version_is_non_empty() {
    let v = version();
    assert!(!v.is_empty());
}

#[test]
fn simhash_halves_and_distance() {
    let hash = SimHash::from_u128(0x0123_4567_89ab_cdef_fedc_ba98_7654_3210);
    assert_eq!(hash.h1, 0x0123_4567_89ab_cdef);
    assert_eq!(hash.h2, 0xfedc_ba98_7654_3210);
    assert_eq!(SimHash::from_u128(hash.as_u128()), hash);

    let flipped = SimHash::new(hash.h1 ^ 0b111, hash.h2 ^ (1 << 63));
    assert_eq!(hash.hamming_distance(flipped), 4);
    assert_eq!(hash.matching_bits(flipped), HASH_BITS - 4);
    assert_eq!(hash.matching_bits(hash), 128);
}

#[test]
fn simhash_hex_text() {
    let hash = SimHash::new(0xb1d5_9108_6042_7337, 0xd514_0800_36ab_6850);
    let text = hash.to_string();
    assert_eq!(text, "b1d5910860427337d514080036ab6850");
    assert_eq!(text.parse::<SimHash>().expect("parse"), hash);
    assert_eq!(format!("0x{text}").parse::<SimHash>().expect("parse prefixed"), hash);
    assert!("abc".parse::<SimHash>().is_err());
    assert!("zz".repeat(16).parse::<SimHash>().is_err());
}
