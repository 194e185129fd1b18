use std::fs;

use simsearch_core::analysis::{FeatureId, WeightTable, WeightsError};
use tempfile::tempdir;

#[test]
fn parses_plain_and_tagged_ids_with_comments() {
    let text = "\
# trained 2024-01-01
00000000000000000000000000000001 0.5

G.00000000000000000000000000000002 1.25
M.000000000000000000000000000000ff -3
";
    let table = WeightTable::parse(text).expect("parse");
    assert_eq!(table.len(), 3);
    assert_eq!(table.get(FeatureId(1)), Some(0.5));
    assert_eq!(table.get(FeatureId(2)), Some(1.25));
    assert_eq!(table.get(FeatureId(0xff)), Some(-3.0));
    assert_eq!(table.get(FeatureId(3)), None);
}

#[test]
fn malformed_lines_report_line_numbers() {
    let text = "00000000000000000000000000000001 0.5\nnot-a-weight\n";
    match WeightTable::parse(text) {
        Err(WeightsError::Malformed { line, content, .. }) => {
            assert_eq!(line, 2);
            assert_eq!(content, "not-a-weight");
        }
        other => panic!("expected Malformed error, got {other:?}"),
    }

    let bad_float = "00000000000000000000000000000001 heavy";
    assert!(matches!(WeightTable::parse(bad_float), Err(WeightsError::Malformed { line: 1, .. })));

    let extra = "00000000000000000000000000000001 1.0 2.0";
    assert!(WeightTable::parse(extra).is_err());
}

#[test]
fn save_and_load_round_trip() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("weights.txt");

    let mut table = WeightTable::new();
    table.insert(FeatureId(0xabc), 0.75);
    table.insert(FeatureId(0x1), 2.0);
    table.save(&path).expect("save");

    let text = fs::read_to_string(&path).expect("read");
    assert!(text.starts_with("00000000000000000000000000000001 2"));

    let loaded = WeightTable::load(&path).expect("load");
    assert_eq!(loaded, table);
}

#[test]
fn load_missing_file_is_io_error() {
    let dir = tempdir().expect("tempdir");
    let err = WeightTable::load(&dir.path().join("missing.txt")).expect_err("missing file");
    assert!(matches!(err, WeightsError::Io(_)));
}

#[test]
fn non_finite_weights_are_rejected() {
    for value in ["NaN", "nan", "inf", "-inf", "infinity"] {
        let text = format!("00000000000000000000000000000001 0.5\nG.00000000000000000000000000000002 {value}\n");
        match WeightTable::parse(&text) {
            Err(WeightsError::Malformed { line, reason, .. }) => {
                assert_eq!(line, 2, "{value}");
                assert!(reason.contains("finite"), "{value}: {reason}");
            }
            other => panic!("expected Malformed error for {value}, got {other:?}"),
        }
    }
}
