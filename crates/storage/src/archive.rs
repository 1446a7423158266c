//! Classification of uploaded case files and explosion of archives.
//!
//! A filename falls into exactly one bucket by its last extension:
//! plain, pre-compressed (`.gz`, `.bz2`, `.xz`, `.zst`) or archived
//! (`.zip`, `.tar`). Plain files are stored gzip-wrapped under a synthetic
//! `.gz` suffix, pre-compressed files are stored as uploaded, and archives
//! are stored whole plus one gzip-wrapped object per member. Members are
//! always re-compressed, even when the archive held them compressed, so a
//! member read only ever has to undo one gzip layer.

use crate::error::{CaseError, Result};
use crate::ObjectReader;
use async_compression::tokio::bufread::{
    BzDecoder, GzipDecoder, GzipEncoder, XzDecoder, ZstdDecoder,
};
use common::file_utils::validate_member_name;
use common::{ArchiveKind, CompressionKind};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

/// Suffix appended to every gzip-wrapped stored object
pub const GZIP_SUFFIX: &str = ".gz";

/// Storage bucket of an uploaded file, derived from its name only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Plain,
    Compressed(CompressionKind),
    Archived(ArchiveKind),
}

impl Classification {
    pub fn compression(&self) -> CompressionKind {
        match self {
            Classification::Compressed(kind) => *kind,
            _ => CompressionKind::None,
        }
    }

    pub fn archive(&self) -> ArchiveKind {
        match self {
            Classification::Archived(kind) => *kind,
            _ => ArchiveKind::None,
        }
    }

    pub fn is_archive(&self) -> bool {
        matches!(self, Classification::Archived(_))
    }
}

fn last_extension(filename: &str) -> Option<(usize, String)> {
    filename
        .rfind('.')
        .map(|dot| (dot, filename[dot + 1..].to_ascii_lowercase()))
}

/// Classify a filename by its last extension, case-insensitively
pub fn classify(filename: &str) -> Classification {
    match last_extension(filename) {
        Some((_, ext)) => {
            if let Some(kind) = CompressionKind::from_extension(&ext) {
                Classification::Compressed(kind)
            } else if let Some(kind) = ArchiveKind::from_extension(&ext) {
                Classification::Archived(kind)
            } else {
                Classification::Plain
            }
        }
        None => Classification::Plain,
    }
}

/// Name under which the whole case file is stored
pub fn stored_name(original: &str, classification: Classification) -> String {
    match classification {
        Classification::Plain => recompose(original),
        _ => original.to_string(),
    }
}

/// Name a single-file case answers to once decompressed: the original name
/// without its compression suffix
pub fn logical_name(original: &str, classification: Classification) -> &str {
    match (classification, last_extension(original)) {
        (Classification::Compressed(_), Some((dot, _))) => &original[..dot],
        _ => original,
    }
}

/// Stored name of an exploded archive member
pub fn recompose(member: &str) -> String {
    format!("{}{}", member, GZIP_SUFFIX)
}

/// Member name of a stored gzip-wrapped object, inverse of [`recompose`]
pub fn decompose(stored: &str) -> Option<&str> {
    stored
        .strip_suffix(GZIP_SUFFIX)
        .filter(|member| !member.is_empty())
}

/// Content type recorded alongside a stored object
pub fn content_type(stored_name: &str) -> &'static str {
    match last_extension(stored_name).map(|(_, ext)| ext).as_deref() {
        Some("gz") => "application/gzip",
        Some("bz2") => "application/x-bzip2",
        Some("xz") => "application/x-xz",
        Some("zst") => "application/zstd",
        Some("zip") => "application/zip",
        Some("tar") => "application/x-tar",
        _ => "application/octet-stream",
    }
}

/// Zip-bomb protection applied while exploding an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLimits {
    pub max_entries: usize,
    pub max_total_bytes: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_total_bytes: 1_000_000_000,
        }
    }
}

/// One archive member, gzip-wrapped into a staging file and ready to be
/// stored
#[derive(Debug, Clone)]
pub struct ExplodedMember {
    pub name: String,
    pub staged: PathBuf,
}

/// Tracks entry count and decompressed size against the limits
struct Budget<'a> {
    filename: &'a str,
    limits: &'a ArchiveLimits,
    entries: usize,
    total_bytes: u64,
}

impl<'a> Budget<'a> {
    fn new(filename: &'a str, limits: &'a ArchiveLimits) -> Self {
        Self {
            filename,
            limits,
            entries: 0,
            total_bytes: 0,
        }
    }

    fn too_large(&self, reason: String) -> CaseError {
        CaseError::ArchiveTooLarge {
            filename: self.filename.to_string(),
            reason,
        }
    }

    fn check_entry_count(&self, count: usize) -> Result<()> {
        if count > self.limits.max_entries {
            return Err(self.too_large(format!(
                "{} entries exceed the limit of {}",
                count, self.limits.max_entries
            )));
        }
        Ok(())
    }

    fn gzip_entry<R: Read>(&mut self, name: &str, entry: &mut R, staged: &Path) -> Result<()> {
        self.entries += 1;
        self.check_entry_count(self.entries)?;

        let remaining = self.limits.max_total_bytes.saturating_sub(self.total_bytes);
        let mut encoder = GzEncoder::new(BufWriter::new(File::create(staged)?), Compression::default());
        let copied = io::copy(&mut entry.take(remaining.saturating_add(1)), &mut encoder)
            .map_err(|e| not_importable(self.filename, format!("cannot read member {name}: {e}")))?;

        self.total_bytes += copied;
        if self.total_bytes > self.limits.max_total_bytes {
            return Err(self.too_large(format!(
                "decompressed content exceeds {} bytes",
                self.limits.max_total_bytes
            )));
        }

        encoder
            .finish()
            .and_then(|mut writer| writer.flush())
            .map_err(|e| not_importable(self.filename, format!("cannot compress member {name}: {e}")))
    }
}

fn not_importable(filename: &str, reason: impl std::fmt::Display) -> CaseError {
    CaseError::NotImportable(format!("{filename}: {reason}"))
}

fn checked_member_name(raw: &str) -> Result<String> {
    let mut name = raw;
    while let Some(rest) = name.strip_prefix("./") {
        name = rest;
    }
    validate_member_name(name).map_err(|reason| CaseError::illegal_name(raw, reason))?;
    Ok(name.to_string())
}

/// Staging files for exploded members, numbered in archive order
struct MemberStaging<'a> {
    dir: &'a Path,
    next: usize,
}

impl MemberStaging<'_> {
    fn next_path(&mut self) -> PathBuf {
        self.next += 1;
        self.dir.join(format!("{:06}.gz", self.next))
    }
}

/// Explode the archive at `path` into gzip-wrapped members staged under
/// `staging_dir`. Storage is not touched; the whole archive is checked
/// against `limits` before the caller writes anything.
/// Blocking: run on a worker thread.
pub fn explode(
    path: &Path,
    filename: &str,
    kind: ArchiveKind,
    limits: &ArchiveLimits,
    staging_dir: &Path,
) -> Result<Vec<ExplodedMember>> {
    let file = File::open(path)?;
    std::fs::create_dir_all(staging_dir)?;
    let staging = MemberStaging {
        dir: staging_dir,
        next: 0,
    };
    match kind {
        ArchiveKind::Zip => explode_zip(BufReader::new(file), filename, limits, staging),
        ArchiveKind::Tar => explode_tar(BufReader::new(file), filename, limits, staging),
        ArchiveKind::None => Err(not_importable(filename, "not an archive")),
    }
}

fn explode_zip<R: Read + Seek>(
    reader: R,
    filename: &str,
    limits: &ArchiveLimits,
    mut staging: MemberStaging<'_>,
) -> Result<Vec<ExplodedMember>> {
    let mut archive = zip::ZipArchive::new(reader)
        .map_err(|e| not_importable(filename, format!("invalid zip archive: {e}")))?;

    let mut budget = Budget::new(filename, limits);
    budget.check_entry_count(archive.len())?;

    let mut members = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| not_importable(filename, format!("invalid zip entry {index}: {e}")))?;
        if entry.is_dir() {
            continue;
        }
        let name = checked_member_name(entry.name())?;
        let staged = staging.next_path();
        budget.gzip_entry(&name, &mut entry, &staged)?;
        members.push(ExplodedMember { name, staged });
    }
    Ok(members)
}

fn explode_tar<R: Read>(
    reader: R,
    filename: &str,
    limits: &ArchiveLimits,
    mut staging: MemberStaging<'_>,
) -> Result<Vec<ExplodedMember>> {
    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| not_importable(filename, format!("invalid tar archive: {e}")))?;

    let mut budget = Budget::new(filename, limits);
    let mut members = Vec::new();
    for entry in entries {
        let mut entry =
            entry.map_err(|e| not_importable(filename, format!("invalid tar entry: {e}")))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let raw_name = entry
            .path()
            .map_err(|e| not_importable(filename, format!("invalid tar entry path: {e}")))?
            .to_string_lossy()
            .into_owned();
        let name = checked_member_name(&raw_name)?;
        let staged = staging.next_path();
        budget.gzip_entry(&name, &mut entry, &staged)?;
        members.push(ExplodedMember { name, staged });
    }
    Ok(members)
}

/// Gzip-wrap an in-memory buffer
pub fn gzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Gzip-wrap a stream as it is read
pub fn compress_gzip(content: ObjectReader) -> ObjectReader {
    Box::pin(GzipEncoder::new(tokio::io::BufReader::new(content)))
}

/// Undo one compression layer as the stream is read
pub fn decompress(kind: CompressionKind, content: ObjectReader) -> ObjectReader {
    use tokio::io::BufReader as AsyncBufReader;
    match kind {
        CompressionKind::None => content,
        CompressionKind::Gz => {
            let mut decoder = GzipDecoder::new(AsyncBufReader::new(content));
            decoder.multiple_members(true);
            Box::pin(decoder)
        }
        CompressionKind::Bz2 => Box::pin(BzDecoder::new(AsyncBufReader::new(content))),
        CompressionKind::Xz => Box::pin(XzDecoder::new(AsyncBufReader::new(content))),
        CompressionKind::Zst => Box::pin(ZstdDecoder::new(AsyncBufReader::new(content))),
    }
}
