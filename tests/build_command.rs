// tests/build_command.rs

mod common;

use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;

use packrun::command::checksum::{
    encode_hex, read_manifest, write_manifest, ChecksumEntry, CHECKSUM_FILE_NAME,
};
use packrun::command::{BuildCommand, Command, FailureCode};
use packrun::deadline::Deadline;
use packrun::errors::PackrunError;
use packrun_test_utils::builders::BuildOptionsBuilder;

struct Dirs {
    _tmp: TempDir,
    source: std::path::PathBuf,
    working: std::path::PathBuf,
}

fn dirs() -> Dirs {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("src");
    let working = tmp.path().join("work");
    std::fs::create_dir_all(&source).unwrap();
    Dirs {
        _tmp: tmp,
        source,
        working,
    }
}

fn manifest_of(working: &Path) -> std::path::PathBuf {
    working.join(CHECKSUM_FILE_NAME)
}

#[test]
fn scenario_a_copies_only_tracked_files() {
    common::init_tracing();
    let d = dirs();
    common::write_file(&d.source, "a.txt", &[0x01]);
    common::write_file(&d.source, "b.txt", b"not tracked");
    std::fs::create_dir_all(&d.working).unwrap();

    let cmd = BuildCommand::new(BuildOptionsBuilder::new(&d.source, &d.working).file("a.txt").build())
        .unwrap();

    assert!(cmd.init(Deadline::irrelevant()).unwrap());
    assert_eq!(std::fs::read(d.working.join("a.txt")).unwrap(), vec![0x01]);
    assert!(!d.working.join("b.txt").exists());

    let manifest = read_manifest(&manifest_of(&d.working)).unwrap();
    assert_eq!(manifest.len(), 1);
    let entry = manifest.iter().next().unwrap();
    assert_eq!(entry.relative_path(), "a.txt");
    assert_eq!(
        encode_hex(entry.hash()),
        "4BF5122F344554C53BDE2EBB8CD2B7E3D1600AD631C385A5D7CCE23C7785459A"
    );
}

#[test]
fn scenario_b_stale_hash_refreshes_working_copy() {
    common::init_tracing();
    let d = dirs();
    common::write_file(&d.source, "a.txt", &[0x01]);
    common::write_file(&d.working, "a.txt", b"old contents");
    let stale = ChecksumEntry::new(vec![0u8; 32], "a.txt");
    write_manifest(&manifest_of(&d.working), [&stale]).unwrap();

    let cmd = BuildCommand::new(
        BuildOptionsBuilder::new(&d.source, &d.working)
            .file("a.txt")
            .changes_needed(true)
            .build(),
    )
    .unwrap();

    assert!(cmd.init(Deadline::irrelevant()).unwrap());
    assert_eq!(std::fs::read(d.working.join("a.txt")).unwrap(), vec![0x01]);

    let manifest = read_manifest(&manifest_of(&d.working)).unwrap();
    assert!(!manifest.contains(&stale));
    assert_eq!(manifest.len(), 1);
}

#[test]
fn scenario_c_unchanged_sources_are_ignored_without_writes() {
    common::init_tracing();
    let d = dirs();
    common::write_file(&d.source, "a.txt", &[0x01]);
    let options = BuildOptionsBuilder::new(&d.source, &d.working)
        .file("a.txt")
        .changes_needed(true)
        .build();

    let cmd = BuildCommand::new(options).unwrap();
    assert!(cmd.init(Deadline::irrelevant()).unwrap());

    // Tamper with the working copy: an unchanged source must not overwrite it.
    common::write_file(&d.working, "a.txt", b"tampered");
    let manifest_before = std::fs::metadata(manifest_of(&d.working))
        .unwrap()
        .modified()
        .unwrap();

    assert!(!cmd.init(Deadline::irrelevant()).unwrap());
    assert_eq!(std::fs::read(d.working.join("a.txt")).unwrap(), b"tampered");
    let manifest_after = std::fs::metadata(manifest_of(&d.working))
        .unwrap()
        .modified()
        .unwrap();
    assert_eq!(manifest_before, manifest_after);
}

#[test]
fn init_is_idempotent_when_changes_are_needed() {
    let d = dirs();
    common::write_file(&d.source, "template.json", b"{}");
    common::write_file(&d.source, "scripts/setup.sh", b"echo setup");

    let cmd = BuildCommand::new(
        BuildOptionsBuilder::new(&d.source, &d.working)
            .file("template.json")
            .file("scripts/setup.sh")
            .build(),
    )
    .unwrap();

    assert!(!d.working.exists());
    assert!(cmd.init(Deadline::irrelevant()).unwrap());
    assert!(d.working.join("scripts/setup.sh").is_file());
    assert!(!cmd.init(Deadline::irrelevant()).unwrap());
}

#[test]
fn unchanged_sources_still_run_when_changes_are_not_needed() {
    let d = dirs();
    common::write_file(&d.source, "a.txt", b"a");
    let cmd = BuildCommand::new(
        BuildOptionsBuilder::new(&d.source, &d.working)
            .file("a.txt")
            .changes_needed(false)
            .build(),
    )
    .unwrap();

    assert!(cmd.init(Deadline::irrelevant()).unwrap());
    assert!(cmd.init(Deadline::irrelevant()).unwrap());
}

#[test]
fn files_dropped_from_the_set_are_removed_from_the_working_dir() {
    let d = dirs();
    common::write_file(&d.source, "keep.txt", b"keep");
    common::write_file(&d.source, "old.txt", b"old");

    let first = BuildCommand::new(
        BuildOptionsBuilder::new(&d.source, &d.working)
            .file("keep.txt")
            .file("old.txt")
            .build(),
    )
    .unwrap();
    assert!(first.init(Deadline::irrelevant()).unwrap());
    assert!(d.working.join("old.txt").exists());

    common::write_file(&d.working, "untracked.log", b"mine");
    let second = BuildCommand::new(
        BuildOptionsBuilder::new(&d.source, &d.working)
            .file("keep.txt")
            .build(),
    )
    .unwrap();
    assert!(second.init(Deadline::irrelevant()).unwrap());

    assert!(d.working.join("keep.txt").exists());
    assert!(!d.working.join("old.txt").exists());
    // Only files the previous manifest tracked are deleted.
    assert!(d.working.join("untracked.log").exists());
}

#[test]
fn in_place_build_only_maintains_the_manifest() {
    let d = dirs();
    common::write_file(&d.source, "template.json", b"{}");

    let cmd = BuildCommand::new(
        BuildOptionsBuilder::new(&d.source, &d.source)
            .file("template.json")
            .build(),
    )
    .unwrap();

    assert!(cmd.init(Deadline::irrelevant()).unwrap());
    assert!(manifest_of(&d.source).is_file());
    assert_eq!(std::fs::read(d.source.join("template.json")).unwrap(), b"{}");
    assert!(!cmd.init(Deadline::irrelevant()).unwrap());
}

#[test]
fn expired_deadline_fails_init_with_timeout() {
    let d = dirs();
    common::write_file(&d.source, "a.txt", b"a");
    let cmd = BuildCommand::new(BuildOptionsBuilder::new(&d.source, &d.working).file("a.txt").build())
        .unwrap();

    let result = cmd.init(Deadline::relevant(Duration::ZERO));
    assert!(matches!(result, Err(PackrunError::TimedOut)));
    assert!(!manifest_of(&d.working).exists());
}

#[test]
fn missing_tracked_file_is_an_io_failure() {
    let d = dirs();
    let cmd = BuildCommand::new(BuildOptionsBuilder::new(&d.source, &d.working).file("gone.txt").build())
        .unwrap();

    assert!(matches!(
        cmd.init(Deadline::irrelevant()),
        Err(PackrunError::IoFailure { .. })
    ));
}

#[test]
fn failure_invalidates_manifest_only_when_configured() {
    let d = dirs();
    common::write_file(&d.source, "a.txt", b"a");

    let keep = BuildCommand::new(
        BuildOptionsBuilder::new(&d.source, &d.working)
            .file("a.txt")
            .invalidate_on_failure(false)
            .build(),
    )
    .unwrap();
    keep.init(Deadline::irrelevant()).unwrap();
    keep.on_failure(FailureCode::Error);
    assert!(manifest_of(&d.working).exists());

    let invalidating = BuildCommand::new(
        BuildOptionsBuilder::new(&d.source, &d.working)
            .file("a.txt")
            .invalidate_on_failure(true)
            .build(),
    )
    .unwrap();
    invalidating.on_failure(FailureCode::Error);
    assert!(!manifest_of(&d.working).exists());
}

#[test]
fn abort_always_invalidates_manifest() {
    let d = dirs();
    common::write_file(&d.source, "a.txt", b"a");
    let cmd = BuildCommand::new(
        BuildOptionsBuilder::new(&d.source, &d.working)
            .file("a.txt")
            .invalidate_on_failure(false)
            .build(),
    )
    .unwrap();
    cmd.init(Deadline::irrelevant()).unwrap();

    cmd.on_abort();
    assert!(!manifest_of(&d.working).exists());
    // A second abort with nothing to delete is harmless.
    cmd.on_abort();

    assert!(cmd.init(Deadline::irrelevant()).unwrap());
}

#[test]
fn arguments_follow_the_fixed_order() {
    let d = dirs();
    let cmd = BuildCommand::new(
        BuildOptionsBuilder::new(&d.source, &d.working)
            .template("images/base.json")
            .var_file("vars/common.json")
            .var("region", "eu-west-1")
            .var("version", "1.0")
            .except("docker")
            .only("qemu")
            .only("amazon-ebs")
            .force()
            .build(),
    )
    .unwrap();

    assert_eq!(cmd.name(), "build");
    assert_eq!(
        cmd.arguments(),
        [
            "-force",
            "-only",
            "amazon-ebs,qemu",
            "-except",
            "docker",
            "-var",
            "region=eu-west-1",
            "-var",
            "version=1.0",
            "-var-file",
            "vars/common.json",
            "images/base.json",
        ]
    );
    assert_eq!(cmd.working_dir(), Some(d.working.as_path()));
}

#[test]
fn minimal_arguments_are_just_the_template() {
    let d = dirs();
    let cmd = BuildCommand::new(BuildOptionsBuilder::new(&d.source, &d.working).build()).unwrap();
    assert_eq!(cmd.arguments(), ["template.json"]);
    assert_eq!(cmd.map_failure_code(1), FailureCode::Error);
    assert_eq!(cmd.map_failure_code(127), FailureCode::Error);
}

#[test]
fn invalid_directories_are_config_errors() {
    let d = dirs();
    let missing = d.source.join("missing");
    let err = BuildCommand::new(BuildOptionsBuilder::new(&missing, &d.working).build()).unwrap_err();
    assert!(matches!(err, PackrunError::ConfigError(_)));

    common::write_file(&d.source, "plain-file", b"x");
    let err = BuildCommand::new(
        BuildOptionsBuilder::new(&d.source, &d.source.join("plain-file")).build(),
    )
    .unwrap_err();
    assert!(matches!(err, PackrunError::ConfigError(_)));
}

#[test]
fn tracked_paths_must_stay_inside_the_source_dir() {
    let d = dirs();
    for bad in ["../escape.txt", "/etc/passwd", "", CHECKSUM_FILE_NAME] {
        let err = BuildCommand::new(BuildOptionsBuilder::new(&d.source, &d.working).file(bad).build())
            .unwrap_err();
        assert!(
            matches!(err, PackrunError::ConfigError(_)),
            "{bad:?} should be rejected"
        );
    }
}
