//! Startup recovery scan
//!
//! A crash strands completed and half-written files in the spool
//! directory. The scan walks that directory once, classifies every entry
//! it recognizes and queues the usable ones for upload:
//!
//! - uncompressed files are always usable and are queued as they are
//! - compressed files are queued when their gzip stream decodes end to end
//! - a valid recovery copy supersedes its counterpart: the counterpart is
//!   discarded and the copy is uploaded under the counterpart's object key
//! - empty leftovers are removed, damaged ones are left in place with a
//!   warning, and names this engine did not write are ignored
//!
//! The scan never touches files it cannot attribute to itself.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::encoding::{Encoding, validate_gzip};
use crate::error::{Result, SpoolError};
use crate::file::{ParsedName, RECOVERY_MARKER, SpoolFile, parse_file_name};
use crate::uploader::{UploadTask, Uploader};

/// Outcome counts of one scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoveryReport {
    /// Files queued for upload
    pub recovered: usize,
    /// Empty leftovers removed
    pub deleted_empty: usize,
    /// Damaged files left in place
    pub skipped: usize,
    /// Names outside the spool grammar, ignored
    pub foreign: usize,
}

/// One-shot scan of a spool directory for files stranded by a crash
pub struct RecoveryScan {
    dir: PathBuf,
    key_prefix: Option<String>,
}

struct ScanEntry {
    path: PathBuf,
    name: ParsedName,
    bytes: u64,
}

impl RecoveryScan {
    pub fn new(dir: impl Into<PathBuf>, key_prefix: Option<String>) -> Self {
        Self {
            dir: dir.into(),
            key_prefix,
        }
    }

    /// Directory the scan walks
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Walk the directory once and queue every recoverable file on
    /// `uploader`
    pub async fn run(&self, uploader: &Uploader) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();
        if !self.dir.is_dir() {
            debug!(
                dir = %self.dir.display(),
                "spool directory absent, nothing to recover"
            );
            return Ok(report);
        }
        debug!(dir = %self.dir.display(), "scanning spool directory");

        let mut copies = Vec::new();
        let mut regular = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| SpoolError::io(&self.dir, e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                report.foreign += 1;
                continue;
            };
            let Some(parsed) = parse_file_name(name) else {
                report.foreign += 1;
                continue;
            };
            let bytes = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(err) => {
                    warn!(
                        path = %entry.path().display(),
                        error = %err,
                        "cannot stat spool file, leaving in place"
                    );
                    report.skipped += 1;
                    continue;
                }
            };
            let scan = ScanEntry {
                path: entry.into_path(),
                name: parsed,
                bytes,
            };
            if scan.name.recovery_marker {
                copies.push(scan);
            } else {
                regular.push(scan);
            }
        }

        // Copies first: a valid copy decides its counterpart's fate before
        // the counterpart is classified on its own
        let mut superseded = HashSet::new();
        for entry in copies {
            self.process_copy(entry, uploader, &mut superseded, &mut report)
                .await;
        }
        for entry in regular {
            if superseded.contains(&entry.path) {
                continue;
            }
            if entry.bytes == 0 {
                report.deleted_empty += remove_empty(&entry.path);
                continue;
            }
            let file = SpoolFile::from_disk(entry.path, entry.name, entry.bytes);
            match file.recoverable() {
                Ok(true) => {
                    let key = file.object_key(self.key_prefix.as_deref());
                    debug!(
                        path = %file.path().display(),
                        key = %key,
                        "recovering stranded file"
                    );
                    report.recovered += 1;
                    uploader.submit(UploadTask::new(file, key)).await;
                }
                Ok(false) => {
                    warn!(
                        path = %file.path().display(),
                        "truncated compressed file without usable copy, leaving in place"
                    );
                    report.skipped += 1;
                }
                Err(err) => {
                    warn!(
                        path = %file.path().display(),
                        error = %err,
                        "cannot inspect stranded file, leaving in place"
                    );
                    report.skipped += 1;
                }
            }
        }

        info!(
            dir = %self.dir.display(),
            recovered = report.recovered,
            deleted_empty = report.deleted_empty,
            skipped = report.skipped,
            foreign = report.foreign,
            "recovery scan finished"
        );
        Ok(report)
    }

    async fn process_copy(
        &self,
        entry: ScanEntry,
        uploader: &Uploader,
        superseded: &mut HashSet<PathBuf>,
        report: &mut RecoveryReport,
    ) {
        if entry.name.encoding != Encoding::Gzip {
            // copies are only ever written alongside compressed files
            warn!(
                path = %entry.path.display(),
                "recovery copy of an uncompressed file, leaving in place"
            );
            report.skipped += 1;
            return;
        }
        let counterpart = counterpart_path(&entry.path);
        if entry.bytes == 0 {
            report.deleted_empty += remove_empty(&entry.path);
            // an empty counterpart died before its first record too
            if let Some(counterpart) = counterpart
                && matches!(fs::metadata(&counterpart), Ok(meta) if meta.len() == 0)
            {
                report.deleted_empty += remove_empty(&counterpart);
                superseded.insert(counterpart);
            }
            return;
        }
        match validate_gzip(&entry.path) {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    path = %entry.path.display(),
                    "damaged recovery copy, leaving in place"
                );
                report.skipped += 1;
                return;
            }
            Err(err) => {
                warn!(
                    path = %entry.path.display(),
                    error = %err,
                    "cannot inspect recovery copy, leaving in place"
                );
                report.skipped += 1;
                return;
            }
        }
        // The copy holds every member its counterpart ever completed, so
        // the counterpart adds nothing and is dropped
        if let Some(counterpart) = counterpart {
            match fs::remove_file(&counterpart) {
                Ok(()) => debug!(
                    path = %counterpart.display(),
                    "discarded counterpart of valid recovery copy"
                ),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => warn!(
                    path = %counterpart.display(),
                    error = %err,
                    "failed to discard counterpart"
                ),
            }
            superseded.insert(counterpart);
        }
        let file = SpoolFile::from_disk(entry.path, entry.name, entry.bytes);
        let key = file.object_key(self.key_prefix.as_deref());
        debug!(
            path = %file.path().display(),
            key = %key,
            "recovering from copy"
        );
        report.recovered += 1;
        uploader.submit(UploadTask::new(file, key)).await;
    }
}

/// Strip the marker from a copy's path to find its counterpart
fn counterpart_path(copy: &Path) -> Option<PathBuf> {
    let name = copy.file_name()?.to_str()?;
    let stem = name.strip_suffix(RECOVERY_MARKER)?;
    Some(copy.with_file_name(stem))
}

fn remove_empty(path: &Path) -> usize {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed empty spool file");
            1
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => 0,
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "failed to remove empty spool file"
            );
            0
        }
    }
}

#[cfg(test)]
#[path = "recovery_test.rs"]
mod recovery_test;
