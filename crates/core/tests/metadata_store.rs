use std::fs;

use simsearch_core::db::{FunctionMetadata, MetadataError, MetadataStore};
use tempfile::tempdir;

#[test]
fn save_writes_base64_names_and_reloads() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("index.meta");

    let mut store = MetadataStore::new(&path);
    store.insert(
        0x1d,
        0x400000,
        FunctionMetadata::new("libfoo.so", "foo::bar(int, char const*)").with_vulnerable(true),
    )
    .expect("insert");
    store.insert(0x1d, 0x400100, FunctionMetadata::new("libfoo.so", "baz")).expect("insert");
    store.save().expect("save");

    let text = fs::read_to_string(&path).expect("read");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1], "1d libfoo.so 400100 YmF6 false");
    assert!(lines[0].starts_with("1d libfoo.so 400000 "));
    assert!(lines[0].ends_with(" true"));

    let loaded = MetadataStore::load(&path).expect("load");
    assert_eq!(loaded.len(), 2);
    let entry = loaded.get(0x1d, 0x400000).expect("entry");
    assert_eq!(entry.function_name, "foo::bar(int, char const*)");
    assert!(entry.vulnerable);
}

#[test]
fn save_merges_with_entries_written_by_others() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("shared.meta");

    let mut first = MetadataStore::load(&path).expect("load empty");
    assert!(first.is_empty());

    let mut second = MetadataStore::load(&path).expect("load empty");
    second.insert(2, 0x20, FunctionMetadata::new("b.exe", "from_second")).expect("insert");
    second.save().expect("second save");

    first.insert(1, 0x10, FunctionMetadata::new("a.exe", "from_first")).expect("insert");
    first.save().expect("first save");

    let merged = MetadataStore::load(&path).expect("reload");
    assert_eq!(merged.len(), 2);
    assert_eq!(merged.get(2, 0x20).expect("kept").function_name, "from_second");
    assert_eq!(first.len(), 2);
}

#[test]
fn in_memory_entries_amend_disk_entries() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("amend.meta");
    fs::write(&path, "1 old.exe 10 b2xk false\n").expect("seed");

    let mut store = MetadataStore::new(&path);
    store
        .insert(1, 0x10, FunctionMetadata::new("new.exe", "new").with_vulnerable(true))
        .expect("insert");
    store.save().expect("save");

    let reloaded = MetadataStore::load(&path).expect("reload");
    let entry = reloaded.get(1, 0x10).expect("entry");
    assert_eq!(entry.file_name, "new.exe");
    assert!(entry.vulnerable);
}

#[test]
fn tolerates_spaces_in_file_names_and_raw_names() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("odd.meta");
    fs::write(&path, "ff My Program.exe 401000 not*base64 false\n\n").expect("seed");

    let store = MetadataStore::load(&path).expect("load");
    let entry = store.get(0xff, 0x401000).expect("entry");
    assert_eq!(entry.file_name, "My Program.exe");
    assert_eq!(entry.function_name, "not*base64");
}

#[test]
fn malformed_lines_are_errors() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bad.meta");
    fs::write(&path, "1 a.exe 10 bmFtZQ== false\nzz a.exe 10 bmFtZQ== maybe\n").expect("seed");
    assert!(matches!(
        MetadataStore::load(&path),
        Err(MetadataError::Malformed { line: 2, .. })
    ));
}

#[test]
fn file_names_with_line_breaks_are_rejected() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("breaks.meta");

    let mut store = MetadataStore::new(&path);
    store.insert(1, 0x10, FunctionMetadata::new("good.exe", "kept")).expect("insert");
    for bad in ["evil\n2 x.exe 20 eA== true", "carriage\rreturn.exe"] {
        match store.insert(2, 0x20, FunctionMetadata::new(bad, "name")) {
            Err(MetadataError::InvalidFileName(name)) => assert_eq!(name, bad),
            other => panic!("expected InvalidFileName, got {other:?}"),
        }
    }
    assert_eq!(store.len(), 1);
    store.save().expect("save");

    let reloaded = MetadataStore::load(&path).expect("reload");
    assert_eq!(reloaded.len(), 1);
    assert!(reloaded.get(2, 0x20).is_none());
}

#[test]
fn save_replaces_file_without_leaving_temp_files() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("swap.meta");
    fs::write(&path, "1 old.exe 10 b2xk false\n").expect("seed");

    let mut store = MetadataStore::load(&path).expect("load");
    store.insert(2, 0x20, FunctionMetadata::new("new.exe", "new")).expect("insert");
    store.save().expect("save");

    let names: Vec<_> = fs::read_dir(dir.path())
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name())
        .collect();
    assert_eq!(names, vec![std::ffi::OsString::from("swap.meta")]);
    assert_eq!(MetadataStore::load(&path).expect("reload").len(), 2);
}
