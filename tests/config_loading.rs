// tests/config_loading.rs

mod common;

use std::io::Write;
use std::time::Duration;

use tempfile::{NamedTempFile, TempDir};

use packrun::build_options;
use packrun::config::{load_and_validate, parse_duration};
use packrun::errors::PackrunError;
use packrun::fileset::FileSet;

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("Packrun.toml");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn minimal_config_gets_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[build]
source_dir = "packer"
"#,
    );

    let cfg = load_and_validate(&path).unwrap();
    assert_eq!(cfg.tool.program, "packer");
    assert_eq!(cfg.tool.flags, vec!["-machine-readable"]);
    assert_eq!(cfg.timeout(), None);
    assert_eq!(cfg.build.include, vec!["**/*"]);
    assert!(cfg.build.changes_needed);
    assert!(cfg.build.invalidate_on_failure);
    assert_eq!(cfg.build.template, "template.json");

    // Relative paths resolve against the config file's directory.
    assert_eq!(cfg.build.source_dir, dir.path().join("packer"));
    assert_eq!(cfg.build.effective_working_dir(), dir.path().join("packer"));
}

#[test]
fn full_config_round_trips_into_build_options() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("packer");
    common::write_file(&src, "template.json", b"{}");
    common::write_file(&src, "scripts/setup.sh", b"echo");
    common::write_file(&src, "README.md", b"# docs");
    common::write_file(&src, "out/stale.img", b"old");

    let path = write_config(
        &dir,
        r#"
[tool]
program = "/opt/packer/bin/packer"
timeout = "30m"

[build]
source_dir = "packer"
working_dir = "packer/out"
exclude = ["**/*.md"]
changes_needed = false
force = true
only = ["qemu"]
var_files = ["vars.json"]

[build.vars]
version = "1.0"
"#,
    );

    let cfg = load_and_validate(&path).unwrap();
    assert_eq!(cfg.timeout(), Some(Duration::from_secs(30 * 60)));
    assert_eq!(cfg.tool_command().program, "/opt/packer/bin/packer");

    let options = build_options(&cfg).unwrap();
    let files: Vec<&str> = options.files.iter().map(String::as_str).collect();
    // The nested working dir is never part of the source set.
    assert_eq!(files, vec!["scripts/setup.sh", "template.json"]);
    assert_eq!(options.working_dir, dir.path().join("packer/out"));
    assert!(!options.changes_needed);
    assert_eq!(
        options.arguments(),
        [
            "-force",
            "-only",
            "qemu",
            "-var",
            "version=1.0",
            "-var-file",
            "vars.json",
            "template.json",
        ]
    );
}

#[test]
fn missing_build_section_is_a_toml_error() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "[tool]\nprogram = \"packer\"\n").unwrap();

    let result = load_and_validate(file.path());
    assert!(matches!(result, Err(PackrunError::TomlError(_))));
}

#[test]
fn invalid_values_are_config_errors() {
    let cases = [
        ("[tool]\nprogram = \"\"\n[build]\nsource_dir = \"x\"\n", "program"),
        ("[tool]\ntimeout = \"ten\"\n[build]\nsource_dir = \"x\"\n", "timeout"),
        ("[tool]\ntimeout = \"10d\"\n[build]\nsource_dir = \"x\"\n", "timeout"),
        ("[build]\nsource_dir = \"\"\n", "source_dir"),
        ("[build]\nsource_dir = \"x\"\ntemplate = \"\"\n", "template"),
        ("[build]\nsource_dir = \"x\"\ninclude = []\n", "include"),
        (
            "[build]\nsource_dir = \"x\"\nonly = [\"a\"]\nexcept = [\"a\"]\n",
            "only",
        ),
    ];

    for (body, needle) in cases {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, body);
        match load_and_validate(&path) {
            Err(PackrunError::ConfigError(msg)) => {
                assert!(msg.contains(needle), "{msg:?} should mention {needle}")
            }
            other => panic!("expected ConfigError for {body:?}, got {other:?}"),
        }
    }
}

#[test]
fn missing_config_file_is_an_io_failure() {
    let dir = TempDir::new().unwrap();
    let result = load_and_validate(dir.path().join("nope.toml"));
    assert!(matches!(result, Err(PackrunError::IoFailure { .. })));
}

#[test]
fn build_options_require_an_existing_source_dir() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[build]\nsource_dir = \"missing\"\n");
    let cfg = load_and_validate(&path).unwrap();

    assert!(matches!(build_options(&cfg), Err(PackrunError::ConfigError(_))));
}

#[test]
fn durations_accept_common_suffixes() {
    assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
    assert_eq!(parse_duration(" 2m ").unwrap(), Duration::from_secs(120));
    assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    assert!(parse_duration("").is_err());
    assert!(parse_duration("15").is_err());
    assert!(parse_duration("s").is_err());

    let too_large = parse_duration("5124095576030432h").unwrap_err();
    assert!(too_large.contains("too large"), "{too_large}");
    assert!(parse_duration("307445734561825861m").is_err());
    assert_eq!(
        parse_duration("18446744073709551615s").unwrap(),
        Duration::from_secs(u64::MAX)
    );
}

#[test]
fn file_set_skips_the_manifest_and_excluded_files() {
    let dir = TempDir::new().unwrap();
    common::write_file(dir.path(), "template.json", b"{}");
    common::write_file(dir.path(), ".checksum", b"");
    common::write_file(dir.path(), "notes/todo.md", b"");
    common::write_file(dir.path(), "http/preseed.cfg", b"");

    let set = FileSet::new(
        dir.path(),
        &["**/*".to_string()],
        &["**/*.md".to_string()],
    )
    .unwrap();
    assert!(set.matches("template.json"));
    assert!(!set.matches(".checksum"));
    assert!(!set.matches("notes/todo.md"));

    let files: Vec<String> = set.collect_relative_paths().unwrap().into_iter().collect();
    assert_eq!(files, vec!["http/preseed.cfg", "template.json"]);
}

#[test]
fn file_set_rejects_bad_patterns() {
    let dir = TempDir::new().unwrap();
    assert!(FileSet::new(dir.path(), &[], &[]).is_err());
    assert!(FileSet::new(dir.path(), &["a[".to_string()], &[]).is_err());
}
