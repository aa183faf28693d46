use crate::ignore_rules::IgnoreRules;
use crate::{Error, Result};
use std::io;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Files selected for a backup, as paths relative to the source directory.
///
/// Paths are kept in walk order. Anything order-sensitive (the fingerprint)
/// sorts its own copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileListing {
    paths: Vec<String>,
}

impl FileListing {
    pub fn new(paths: Vec<String>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for FileListing {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

/// Walks `src_dir` depth-first and returns every file not matched by `ignore`.
///
/// Ignored directories are pruned without being entered. Symlinks to
/// directories are not followed. Every other symlink is listed, including a
/// dangling one, which then fails when it is read.
pub fn list_files(src_dir: &Path, ignore: &IgnoreRules) -> Result<FileListing> {
    let mut paths = Vec::new();

    let walker = WalkDir::new(src_dir)
        .follow_links(false)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !ignore.matches_entry(entry.path(), entry.file_type().is_dir()));

    for entry in walker {
        let entry = entry?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        if file_type.is_symlink() && entry.path().is_dir() {
            debug!("Not following directory symlink {}", entry.path().display());
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(src_dir)
            .map_err(|_| io::Error::other(format!("{} escaped {}", entry.path().display(), src_dir.display())))?;
        let relative = relative.to_str().ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("path is not valid UTF-8: {}", entry.path().display()),
            ))
        })?;
        paths.push(relative.to_string());
    }

    debug!("Listed {} files under {}", paths.len(), src_dir.display());
    Ok(FileListing::new(paths))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::MAIN_SEPARATOR;
    use tempfile::TempDir;

    // Creates each path under `root`, using the path itself as the contents.
    fn create_tree(root: &Path, tree: &[&str]) {
        for rel in tree {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, rel.as_bytes()).unwrap();
        }
    }

    fn sorted(listing: &FileListing) -> Vec<String> {
        let mut paths = listing.paths().to_vec();
        paths.sort();
        paths
    }

    fn native(path: &str) -> String {
        path.replace('/', &MAIN_SEPARATOR.to_string())
    }

    #[test]
    fn test_ignore_logic() {
        let dir = TempDir::new().unwrap();
        create_tree(dir.path(), &["file1", "file2", "dir1/file3", "dir2/file4"]);
        let ignore = IgnoreRules::compile("file1\ndir1/\n", dir.path()).unwrap();

        let listing = list_files(dir.path(), &ignore).unwrap();
        assert_eq!(sorted(&listing), vec![native("dir2/file4"), "file2".to_string()]);
    }

    #[test]
    fn test_all_ignored() {
        let dir = TempDir::new().unwrap();
        create_tree(dir.path(), &["file1", "dir1/file3"]);
        let ignore = IgnoreRules::compile("file1\ndir1/\n", dir.path()).unwrap();

        let listing = list_files(dir.path(), &ignore).unwrap();
        assert!(listing.is_empty());
    }

    #[test]
    fn test_empty_src_dir() {
        let dir = TempDir::new().unwrap();
        let ignore = IgnoreRules::compile("file1\ndir1/\n", dir.path()).unwrap();

        let listing = list_files(dir.path(), &ignore).unwrap();
        assert!(listing.is_empty());
    }

    #[test]
    fn test_no_rules_lists_everything() {
        let dir = TempDir::new().unwrap();
        create_tree(dir.path(), &["a", "b/c", "b/d/e"]);
        fs::create_dir_all(dir.path().join("empty")).unwrap();

        let listing = list_files(dir.path(), &IgnoreRules::Nothing).unwrap();
        assert_eq!(sorted(&listing), vec!["a".to_string(), native("b/c"), native("b/d/e")]);
    }

    #[test]
    fn test_missing_src_dir_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = list_files(&dir.path().join("missing"), &IgnoreRules::Nothing).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks() {
        let dir = TempDir::new().unwrap();
        create_tree(dir.path(), &["real/file"]);
        std::os::unix::fs::symlink(dir.path().join("real/file"), dir.path().join("link")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("dirlink")).unwrap();

        let listing = list_files(dir.path(), &IgnoreRules::Nothing).unwrap();
        assert_eq!(sorted(&listing), vec!["link".to_string(), "real/file".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_is_listed_and_fails_fingerprint() {
        let dir = TempDir::new().unwrap();
        create_tree(dir.path(), &["a"]);
        std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("dangling")).unwrap();

        let listing = list_files(dir.path(), &IgnoreRules::Nothing).unwrap();
        assert_eq!(sorted(&listing), vec!["a".to_string(), "dangling".to_string()]);

        let err = crate::fingerprint::fingerprint(dir.path(), &listing).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
