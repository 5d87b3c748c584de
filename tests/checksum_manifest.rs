// tests/checksum_manifest.rs

mod common;

use std::collections::HashSet;

use tempfile::TempDir;

use packrun::command::checksum::{
    compute_entries, decode_hex, encode_hex, invalidate_manifest, read_manifest, write_manifest,
    ChecksumEntry, CHECKSUM_FILE_NAME,
};
use packrun::errors::PackrunError;

// SHA-256 of the single byte 0x01.
const HASH_OF_0X01: &str = "4BF5122F344554C53BDE2EBB8CD2B7E3D1600AD631C385A5D7CCE23C7785459A";

#[test]
fn digest_is_uppercase_sha256() {
    let dir = TempDir::new().unwrap();
    common::write_file(dir.path(), "a.txt", &[0x01]);

    let entry = ChecksumEntry::digest(dir.path(), "a.txt").unwrap();
    assert_eq!(encode_hex(entry.hash()), HASH_OF_0X01);
    assert_eq!(entry.relative_path(), "a.txt");
    assert_eq!(entry.to_line(), format!("{HASH_OF_0X01} a.txt"));
}

#[test]
fn hex_helpers() {
    assert_eq!(encode_hex(&[0x00, 0xAB, 0x10]), "00AB10");
    assert_eq!(decode_hex("00ab10"), Some(vec![0x00, 0xAB, 0x10]));
    assert_eq!(decode_hex("abc"), None);
    assert_eq!(decode_hex("zz"), None);
}

#[test]
fn parses_short_and_legacy_lines() {
    let short = ChecksumEntry::parse(&format!("{HASH_OF_0X01} dir/with space.txt")).unwrap();
    assert_eq!(short.relative_path(), "dir/with space.txt");

    let legacy = ChecksumEntry::parse(&format!("SHA-256 {HASH_OF_0X01} a.txt")).unwrap();
    assert_eq!(legacy.relative_path(), "a.txt");
    assert_eq!(encode_hex(legacy.hash()), HASH_OF_0X01);

    let lowercase = ChecksumEntry::parse(&format!("sha-256 {} a.txt", HASH_OF_0X01.to_lowercase()));
    assert_eq!(lowercase, Some(legacy));

    assert!(ChecksumEntry::parse("").is_none());
    assert!(ChecksumEntry::parse("nothex a.txt").is_none());
    assert!(ChecksumEntry::parse(&format!("{HASH_OF_0X01} ")).is_none());
    assert!(ChecksumEntry::parse(&format!("MD5 {HASH_OF_0X01} a.txt")).is_none());
    assert!(ChecksumEntry::parse("ABCD a.txt").is_none());
}

#[test]
fn written_manifest_reads_back_as_the_same_set() {
    let dir = TempDir::new().unwrap();
    common::write_file(dir.path(), "a.txt", &[0x01]);
    common::write_file(dir.path(), "nested/b.json", b"{}");
    common::write_file(dir.path(), "c.sh", b"#!/bin/sh\necho hi\n");

    let entries = compute_entries(dir.path(), ["c.sh", "a.txt", "nested/b.json"]).unwrap();
    let manifest = dir.path().join(CHECKSUM_FILE_NAME);
    write_manifest(&manifest, &entries).unwrap();

    assert_eq!(read_manifest(&manifest).unwrap(), entries);

    let text = std::fs::read_to_string(&manifest).unwrap();
    let paths: Vec<&str> = text
        .lines()
        .map(|l| l.split_once(' ').unwrap().1)
        .collect();
    assert_eq!(paths, vec!["a.txt", "c.sh", "nested/b.json"]);
}

#[test]
fn missing_manifest_is_empty() {
    let dir = TempDir::new().unwrap();
    let manifest = dir.path().join(CHECKSUM_FILE_NAME);
    assert!(read_manifest(&manifest).unwrap().is_empty());
}

#[test]
fn manifest_order_does_not_matter() {
    let dir = TempDir::new().unwrap();
    let a = format!("{HASH_OF_0X01} a.txt");
    let b = format!("{} b.txt", "00".repeat(32));

    let first = dir.path().join("first");
    let second = dir.path().join("second");
    std::fs::write(&first, format!("{a}\n{b}\n")).unwrap();
    std::fs::write(&second, format!("\n{b}\nSHA-256 {}\n", a)).unwrap();

    assert_eq!(read_manifest(&first).unwrap(), read_manifest(&second).unwrap());
}

#[test]
fn malformed_manifest_line_is_invalid_data() {
    let dir = TempDir::new().unwrap();
    let manifest = dir.path().join(CHECKSUM_FILE_NAME);
    std::fs::write(&manifest, format!("{HASH_OF_0X01} a.txt\ngarbage\n")).unwrap();

    match read_manifest(&manifest) {
        Err(PackrunError::IoFailure { source, .. }) => {
            assert_eq!(source.kind(), std::io::ErrorKind::InvalidData);
        }
        other => panic!("expected IoFailure, got {other:?}"),
    }
}

#[test]
fn missing_source_file_is_an_io_failure() {
    let dir = TempDir::new().unwrap();
    let err = compute_entries(dir.path(), ["nope.txt"]).unwrap_err();
    assert!(matches!(err, PackrunError::IoFailure { .. }));
}

#[test]
fn invalidate_reports_whether_something_was_removed() {
    let dir = TempDir::new().unwrap();
    let manifest = dir.path().join(CHECKSUM_FILE_NAME);
    write_manifest(&manifest, &HashSet::<ChecksumEntry>::new()).unwrap();

    assert!(invalidate_manifest(&manifest).unwrap());
    assert!(!manifest.exists());
    assert!(!invalidate_manifest(&manifest).unwrap());
}
