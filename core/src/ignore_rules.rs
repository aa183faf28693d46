use crate::{Error, Result};
use ::ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};

/// Decides which paths a backup leaves out.
///
/// Rules use gitignore syntax and are anchored at the backup's source
/// directory, so `dir1/` matches `<src_dir>/dir1` and `build` matches any
/// entry named `build` below it.
#[derive(Debug, Clone)]
pub enum IgnoreRules {
    Patterns { root: PathBuf, matcher: Gitignore },
    Nothing,
}

impl IgnoreRules {
    /// Compiles gitignore-style lines rooted at `root`.
    ///
    /// Leading whitespace is dropped from each line, so indented multi-line
    /// TOML strings work. Trailing whitespace follows gitignore rules, which
    /// keep an escaped `\ `. Blank lines and `#` comments are ignored as usual.
    pub fn compile(contents: &str, root: impl AsRef<Path>) -> Result<Self> {
        let root: PathBuf = root.as_ref().components().collect();
        let mut builder = GitignoreBuilder::new(&root);
        for line in contents.lines() {
            let line = line.trim_start();
            builder
                .add_line(None, line)
                .map_err(|e| Error::config(format!("invalid ignore pattern {:?}: {}", line, e)))?;
        }
        let matcher = builder
            .build()
            .map_err(|e| Error::config(format!("failed to compile ignore rules: {}", e)))?;

        if matcher.is_empty() {
            return Ok(IgnoreRules::Nothing);
        }
        Ok(IgnoreRules::Patterns { root, matcher })
    }

    /// Tests a path, asking the filesystem whether it is a directory.
    pub fn matches(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        self.matches_entry(path, path.is_dir())
    }

    /// Tests a path whose kind is already known, e.g. from a directory walk.
    ///
    /// Paths outside the root, and the root itself, never match.
    pub fn matches_entry(&self, path: &Path, is_dir: bool) -> bool {
        match self {
            IgnoreRules::Nothing => false,
            IgnoreRules::Patterns { root, matcher } => {
                let relative = match path.strip_prefix(root) {
                    Ok(relative) if relative.as_os_str().is_empty() => return false,
                    Ok(relative) => relative,
                    Err(_) => return false,
                };
                matcher
                    .matched_path_or_any_parents(root.join(relative), is_dir)
                    .is_ignore()
            }
        }
    }
}

impl Default for IgnoreRules {
    fn default() -> Self {
        IgnoreRules::Nothing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_rooted_at_source() {
        let rules = IgnoreRules::compile("ignored\n", "srcdir").unwrap();
        assert!(rules.matches_entry(Path::new("srcdir/ignored"), false));
        assert!(!rules.matches_entry(Path::new("srcdir/kept"), false));
    }

    #[test]
    fn test_directory_only_pattern() {
        let rules = IgnoreRules::compile("dir1/\n", "/test").unwrap();
        assert!(rules.matches_entry(Path::new("/test/dir1"), true));
        assert!(!rules.matches_entry(Path::new("/test/dir1"), false));
        assert!(rules.matches_entry(Path::new("/test/dir1/file3"), false));
    }

    #[test]
    fn test_indented_lines_and_comments() {
        let rules = IgnoreRules::compile(
            "\n    # build output\n    target/\n    *.log\n",
            "/src",
        )
        .unwrap();
        assert!(rules.matches_entry(Path::new("/src/target"), true));
        assert!(rules.matches_entry(Path::new("/src/a/b/debug.log"), false));
        assert!(!rules.matches_entry(Path::new("/src/main.rs"), false));
    }

    #[test]
    fn test_paths_outside_root_never_match() {
        let rules = IgnoreRules::compile("*.log\n", "/src").unwrap();
        assert!(!rules.matches_entry(Path::new("/elsewhere/a.log"), false));
    }

    #[test]
    fn test_root_with_trailing_slash() {
        let rules = IgnoreRules::compile("*.log\n", "/tmp/a/").unwrap();
        assert!(!rules.matches_entry(Path::new("/tmp/a"), true));
        assert!(!rules.matches_entry(Path::new("/tmp/a/"), true));
        assert!(rules.matches_entry(Path::new("/tmp/a/x.log"), false));
        assert!(rules.matches_entry(Path::new("/tmp/a//sub/x.log"), false));
        assert!(!rules.matches_entry(Path::new("/tmp/ab/x.log"), false));
        assert!(!rules.matches_entry(Path::new("/tmp"), true));
    }

    #[test]
    fn test_escaped_trailing_space_is_kept() {
        let rules = IgnoreRules::compile("  foo\\ \n", "/src").unwrap();
        assert!(rules.matches_entry(Path::new("/src/foo "), false));
        assert!(!rules.matches_entry(Path::new("/src/foo"), false));

        let rules = IgnoreRules::compile("bar   \r\n", "/src").unwrap();
        assert!(rules.matches_entry(Path::new("/src/bar"), false));
    }

    #[test]
    fn test_empty_rules_match_nothing() {
        let rules = IgnoreRules::compile("\n# only a comment\n", "/src").unwrap();
        assert!(matches!(rules, IgnoreRules::Nothing));
        assert!(!IgnoreRules::default().matches("/src/anything"));
    }
}
