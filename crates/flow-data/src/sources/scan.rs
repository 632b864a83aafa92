//! Sorted directory listings with glob-like semantics: a missing directory
//! lists as empty.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{DatasetError, DatasetResult};

fn entries_at_depth(dir: &Path, depth: usize) -> DatasetResult<Vec<walkdir::DirEntry>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    WalkDir::new(dir)
        .min_depth(depth)
        .max_depth(depth)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| {
            entry.map_err(|source| DatasetError::DirectoryReadFailed {
                path: dir.to_path_buf(),
                source,
            })
        })
        .collect()
}

/// Files directly inside `dir` whose name satisfies `matches`, sorted by path.
pub(crate) fn files_matching(
    dir: &Path,
    matches: impl Fn(&str) -> bool,
) -> DatasetResult<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = entries_at_depth(dir, 1)?
        .into_iter()
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name().to_str().is_some_and(&matches))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    Ok(files)
}

/// Files directly inside `dir` whose name ends with `suffix`, sorted by path.
pub(crate) fn files_with_suffix(dir: &Path, suffix: &str) -> DatasetResult<Vec<PathBuf>> {
    files_matching(dir, |name| name.ends_with(suffix))
}

/// Directories exactly `depth` levels below `dir`, sorted by path.
pub(crate) fn directories_at_depth(dir: &Path, depth: usize) -> DatasetResult<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = entries_at_depth(dir, depth)?
        .into_iter()
        .filter(|entry| entry.file_type().is_dir())
        .map(walkdir::DirEntry::into_path)
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Fails with [`DatasetError::DirectoryNotFound`] unless `dir` exists.
pub(crate) fn require_dir(dir: &Path) -> DatasetResult<()> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(DatasetError::DirectoryNotFound {
            path: dir.to_path_buf(),
        })
    }
}

/// File name of `path` as UTF-8, or an empty string.
pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
