// src/command/checksum.rs

//! Content checksums of tracked files and the persisted `.checksum` manifest.
//!
//! Manifest lines look like:
//!
//! ```text
//! 4BF5122F344554C53BDE2EBB8CD2B7E3D1600AD631C385A5D7CCE23C7785459A template.json
//! ```
//!
//! Older manifests prefix each line with the algorithm name
//! (`SHA-256 <hex> <path>`); both forms are read, only the short one is
//! written. Manifests are compared as sets.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::errors::{PackrunError, Result};

/// Manifest file name inside the working directory.
pub const CHECKSUM_FILE_NAME: &str = ".checksum";

pub const CHECKSUM_ALGORITHM: &str = "SHA-256";

const DIGEST_BUFFER_SIZE: usize = 8192;

/// Hash of one tracked file, keyed by its path relative to the source root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChecksumEntry {
    hash: Vec<u8>,
    relative_path: String,
}

impl ChecksumEntry {
    pub fn new(hash: Vec<u8>, relative_path: impl Into<String>) -> Self {
        Self {
            hash,
            relative_path: relative_path.into(),
        }
    }

    pub fn hash(&self) -> &[u8] {
        &self.hash
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// Hash `<base>/<relative_path>`.
    pub fn digest(base: &Path, relative_path: &str) -> Result<ChecksumEntry> {
        let path = base.join(relative_path);
        let file = File::open(&path).map_err(|e| PackrunError::io_at("opening", &path, e))?;
        let hash = sha256(file).map_err(|e| PackrunError::io_at("hashing", &path, e))?;
        Ok(ChecksumEntry::new(hash, relative_path))
    }

    /// Render as a manifest line (without newline).
    pub fn to_line(&self) -> String {
        format!("{} {}", encode_hex(&self.hash), self.relative_path)
    }

    /// Parse a manifest line in either the short or the legacy form.
    pub fn parse(line: &str) -> Option<ChecksumEntry> {
        let (first, rest) = line.split_once(' ')?;

        if let Some(hash) = decode_sha256_hex(first) {
            if rest.is_empty() {
                return None;
            }
            return Some(ChecksumEntry::new(hash, rest));
        }

        // Legacy: `<algorithm> <hex> <path>`.
        if !first.eq_ignore_ascii_case(CHECKSUM_ALGORITHM) {
            return None;
        }
        let (hex, path) = rest.split_once(' ')?;
        let hash = decode_sha256_hex(hex)?;
        if path.is_empty() {
            return None;
        }
        Some(ChecksumEntry::new(hash, path))
    }
}

fn sha256(mut input: impl Read) -> io::Result<Vec<u8>> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; DIGEST_BUFFER_SIZE];
    loop {
        let n = input.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_vec())
}

/// Uppercase hexadecimal.
pub fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

/// Decode hex (either case). `None` on odd length or non-hex digits.
pub fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 || !s.is_ascii() {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

fn decode_sha256_hex(s: &str) -> Option<Vec<u8>> {
    decode_hex(s).filter(|bytes| bytes.len() == Sha256::output_size())
}

/// Hash every file of the set, relative to `base`.
pub fn compute_entries<I, S>(base: &Path, relative_paths: I) -> Result<HashSet<ChecksumEntry>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut entries = HashSet::new();
    for rel in relative_paths {
        let entry = ChecksumEntry::digest(base, rel.as_ref())?;
        debug!(path = %entry.relative_path, hash = %encode_hex(&entry.hash), "hashed source file");
        entries.insert(entry);
    }
    Ok(entries)
}

/// Read a manifest. A missing file is an empty manifest.
pub fn read_manifest(path: &Path) -> Result<HashSet<ChecksumEntry>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(PackrunError::io_at("opening manifest", path, e)),
    };

    let mut entries = HashSet::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| PackrunError::io_at("reading manifest", path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = ChecksumEntry::parse(&line).ok_or_else(|| {
            PackrunError::io_at(
                "parsing manifest",
                path,
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("malformed line {}", idx + 1),
                ),
            )
        })?;
        entries.insert(entry);
    }
    Ok(entries)
}

/// Create or replace the manifest. Lines are sorted by path.
pub fn write_manifest<'a, I>(path: &Path, entries: I) -> Result<()>
where
    I: IntoIterator<Item = &'a ChecksumEntry>,
{
    let mut sorted: Vec<&ChecksumEntry> = entries.into_iter().collect();
    sorted.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    let file = File::create(path).map_err(|e| PackrunError::io_at("creating manifest", path, e))?;
    let mut writer = BufWriter::new(file);
    for entry in sorted {
        writeln!(writer, "{}", entry.to_line())
            .map_err(|e| PackrunError::io_at("writing manifest", path, e))?;
    }
    writer
        .flush()
        .map_err(|e| PackrunError::io_at("writing manifest", path, e))?;
    Ok(())
}

/// Delete the manifest, forcing the next run to see changes.
///
/// Returns whether a manifest was actually removed.
pub fn invalidate_manifest(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(PackrunError::io_at("removing manifest", path, e)),
    }
}
