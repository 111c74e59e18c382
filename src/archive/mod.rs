//! # Archive Extraction
//!
//! Unpacks a zip archive into a destination directory while refusing any entry
//! whose path would escape that directory ("zip slip").
//!
//! ## Guarantees
//!
//! - The destination is made absolute before any entry is looked at.
//! - Every entry is resolved and checked **before the first byte is written**. An
//!   archive holding a single hostile entry leaves the destination untouched, even
//!   when benign entries precede it.
//! - Paths are normalised lexically: `a/../b.txt` is fine, `../evil.txt`,
//!   `a/../../evil.txt` and `/etc/passwd` are not, and neither is an entry that
//!   resolves to the destination itself.
//! - Existing files are truncated and overwritten, so extracting the same archive
//!   twice yields the same tree. Entry permissions are applied once the content is
//!   written (directories last), so read-only entries never block a re-extraction.
//!
//! ## Known limitations
//!
//! - A failure half way through a file (disk full, permission denied) leaves the
//!   partial file and everything written before it in place. There is no rollback.
//! - Symlink entries are written as regular files holding the link target; no
//!   links are ever created on disk.

mod error;

pub use error::*;

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};
use zip::ZipArchive;

/// Counts reported by a successful extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

#[derive(Debug)]
struct PlannedEntry {
    index: usize,
    target: PathBuf,
    is_dir: bool,
    mode: Option<u32>,
}

/// Extracts the zip archive at `source` into `destination`.
///
/// Blocking; call it from a blocking worker when running under tokio.
pub fn extract(source: &Path, destination: &Path) -> Result<ExtractionSummary, ExtractionError> {
    let destination =
        std::path::absolute(destination).map_err(|e| ExtractionError::io(destination, e))?;

    let file = File::open(source).map_err(|e| ExtractionError::io(source, e))?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;

    let plan = plan_entries(&mut archive, &destination)?;
    debug!(entries = plan.len(), destination = %destination.display(), "Archive validated");

    fs::create_dir_all(&destination).map_err(|e| ExtractionError::io(&destination, e))?;

    // A previous extraction may have left read-only directories behind.
    for planned in plan.iter().filter(|p| p.is_dir && p.mode.is_some() && p.target.is_dir()) {
        make_owner_writable(&planned.target).map_err(|e| ExtractionError::io(&planned.target, e))?;
    }

    let mut summary = ExtractionSummary::default();
    let mut directory_modes = Vec::new();

    for planned in &plan {
        if planned.is_dir {
            fs::create_dir_all(&planned.target)
                .map_err(|e| ExtractionError::io(&planned.target, e))?;
            if let Some(mode) = planned.mode {
                directory_modes.push((planned.target.clone(), mode));
            }
            summary.directories += 1;
            continue;
        }

        if let Some(parent) = planned.target.parent() {
            fs::create_dir_all(parent).map_err(|e| ExtractionError::io(parent, e))?;
        }

        let mut output =
            open_truncating(&planned.target).map_err(|e| ExtractionError::io(&planned.target, e))?;
        let mut entry = archive.by_index(planned.index)?;
        let written =
            io::copy(&mut entry, &mut output).map_err(|e| ExtractionError::io(&planned.target, e))?;
        drop(output);

        // Applied after the write so a read-only entry can be overwritten next time.
        if let Some(mode) = planned.mode {
            apply_mode(&planned.target, mode & 0o777)
                .map_err(|e| ExtractionError::io(&planned.target, e))?;
        }

        debug!(entry = entry.name(), bytes = written, "Extracted");
        summary.files += 1;
        summary.bytes += written;
    }

    // Deepest first, so a restrictive parent never blocks its children.
    directory_modes.sort_by_key(|(path, _)| std::cmp::Reverse(path.components().count()));
    for (path, mode) in directory_modes {
        if let Err(e) = apply_mode(&path, mode) {
            warn!(path = %path.display(), error = %e, "Could not apply directory permissions");
        }
    }

    info!(
        files = summary.files,
        directories = summary.directories,
        bytes = summary.bytes,
        destination = %destination.display(),
        "Archive extracted"
    );
    Ok(summary)
}

fn plan_entries<R: io::Read + io::Seek>(
    archive: &mut ZipArchive<R>,
    destination: &Path,
) -> Result<Vec<PlannedEntry>, ExtractionError> {
    let mut plan = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index)?;
        let target = resolve_entry_path(destination, entry.name())?;
        plan.push(PlannedEntry {
            index,
            target,
            is_dir: entry.is_dir(),
            mode: entry.unix_mode().map(|m| m & 0o7777),
        });
    }
    Ok(plan)
}

/// Joins `entry_name` onto `destination` and checks the result stays strictly
/// below it.
///
/// `destination` must already be absolute. Both `/` and `\` count as separators.
pub fn resolve_entry_path(destination: &Path, entry_name: &str) -> Result<PathBuf, ExtractionError> {
    let traversal = || ExtractionError::PathTraversal {
        entry: entry_name.to_string(),
        resolved: lexical_join(destination, entry_name),
    };

    let normalized = entry_name.replace('\\', "/");
    let mut target = destination.to_path_buf();
    let mut depth = 0usize;

    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => {
                target.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(traversal());
                }
                target.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return Err(traversal()),
        }
    }

    if depth == 0 {
        return Err(traversal());
    }
    Ok(target)
}

/// Best-effort lexical resolution used only to describe a rejected entry.
fn lexical_join(destination: &Path, entry_name: &str) -> PathBuf {
    let mut resolved = destination.to_path_buf();
    for component in Path::new(&entry_name.replace('\\', "/")).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::ParentDir => {
                resolved.pop();
            }
            Component::RootDir => resolved = PathBuf::from("/"),
            Component::CurDir | Component::Prefix(_) => {}
        }
    }
    resolved
}

/// Opens `path` for writing from scratch. An existing file we may not write to
/// (a read-only entry from an earlier extraction) is replaced.
fn open_truncating(path: &Path) -> io::Result<File> {
    let open = || OpenOptions::new().write(true).create(true).truncate(true).open(path);
    match open() {
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied && path.is_file() => {
            fs::remove_file(path)?;
            open()
        }
        result => result,
    }
}

#[cfg(unix)]
fn make_owner_writable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = fs::metadata(path)?.permissions().mode();
    if mode & 0o300 == 0o300 {
        return Ok(());
    }
    fs::set_permissions(path, fs::Permissions::from_mode(mode | 0o700))
}

#[cfg(not(unix))]
fn make_owner_writable(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dest() -> PathBuf {
        PathBuf::from("/srv/fixtures")
    }

    #[test]
    fn test_descendant_paths_resolve() {
        assert_eq!(
            resolve_entry_path(&dest(), "a/b.txt").unwrap(),
            PathBuf::from("/srv/fixtures/a/b.txt")
        );
        assert_eq!(
            resolve_entry_path(&dest(), "./a/../b.txt").unwrap(),
            PathBuf::from("/srv/fixtures/b.txt")
        );
        assert_eq!(
            resolve_entry_path(&dest(), "dir/").unwrap(),
            PathBuf::from("/srv/fixtures/dir")
        );
    }

    #[test]
    fn test_parent_escape_is_rejected() {
        for name in ["../evil.txt", "a/../../evil.txt", "..\\evil.txt", "a/b/../../../x"] {
            let err = resolve_entry_path(&dest(), name).unwrap_err();
            assert!(err.is_path_traversal(), "{name} should be rejected");
        }
    }

    #[test]
    fn test_absolute_entry_is_rejected() {
        let err = resolve_entry_path(&dest(), "/etc/passwd").unwrap_err();
        assert!(err.is_path_traversal());
    }

    #[test]
    fn test_destination_itself_is_rejected() {
        for name in ["", ".", "./", "a/.."] {
            assert!(resolve_entry_path(&dest(), name).is_err(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn test_sibling_prefix_is_not_a_descendant() {
        // "/srv/fixtures-evil" shares a string prefix with the destination.
        let err = resolve_entry_path(&dest(), "../fixtures-evil/x").unwrap_err();
        match err {
            ExtractionError::PathTraversal { resolved, .. } => {
                assert_eq!(resolved, PathBuf::from("/srv/fixtures-evil/x"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
