//! Backup config files.
//!
//! A config file is TOML with two sections:
//!
//! ```toml
//! [env]
//! ROOT = "${HOME}/data"
//!
//! [backups]
//! bucket = "my-backups"          # inherited by every backup below
//!
//! [backups.photos]
//! src_dir = "${ROOT}/photos"
//! destination_subpath = "photos"
//! archive_prefix = "photos-"
//! ignore = """
//! *.tmp
//! cache/
//! """
//! ```
//!
//! Loading happens in two steps: [`RawDocument::parse`] checks the document
//! shape, then [`RawDocument::lower`] expands variables, applies inheritance
//! from `[backups]` and validates each `[backups.<name>]` into a
//! [`BackupSpec`].

use crate::expand::VarScope;
use crate::ignore_rules::IgnoreRules;
use crate::{Error, Result};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use toml::{Table, Value};
use tracing::debug;

pub const ENV_SECTION: &str = "env";
pub const BACKUPS_SECTION: &str = "backups";

pub const SRC_DIR_KEY: &str = "src_dir";
pub const IGNORE_KEY: &str = "ignore";
pub const BUCKET_KEY: &str = "bucket";
pub const DESTINATION_SUBPATH_KEY: &str = "destination_subpath";
pub const ARCHIVE_PREFIX_KEY: &str = "archive_prefix";

// Key names used by older config files.
const LEGACY_BUCKET_KEY: &str = "s3_bucket";
const LEGACY_SUBPATH_KEY: &str = "s3_subpath";

/// Destination options of one backup, in document order.
///
/// Keys other than the recognized ones are kept so other tools reading the
/// same config can use them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupOptions(IndexMap<String, String>);

impl BackupOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn bucket(&self) -> Option<&str> {
        self.get_or_legacy(BUCKET_KEY, LEGACY_BUCKET_KEY)
    }

    pub fn destination_subpath(&self) -> Option<&str> {
        self.get_or_legacy(DESTINATION_SUBPATH_KEY, LEGACY_SUBPATH_KEY)
    }

    pub fn archive_prefix(&self) -> Option<&str> {
        self.get(ARCHIVE_PREFIX_KEY)
    }

    /// The bucket, or a config error when it is missing or empty.
    pub fn require_bucket(&self) -> Result<&str> {
        match self.bucket() {
            Some(bucket) if !bucket.is_empty() => Ok(bucket),
            _ => Err(Error::config(format!(
                "required option \"{}\" is not set",
                BUCKET_KEY
            ))),
        }
    }

    fn get_or_legacy(&self, key: &str, legacy: &str) -> Option<&str> {
        self.get(key).or_else(|| self.get(legacy))
    }

    fn shift_remove(&mut self, key: &str) -> Option<String> {
        self.0.shift_remove(key)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for BackupOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One named backup job, built from a `[backups.<name>]` section.
#[derive(Debug, Clone)]
pub struct BackupSpec {
    pub name: String,
    pub src_dir: PathBuf,
    pub options: BackupOptions,
    pub ignore: IgnoreRules,
}

impl BackupSpec {
    pub fn new(name: impl Into<String>, src_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            src_dir: src_dir.into(),
            options: BackupOptions::new(),
            ignore: IgnoreRules::Nothing,
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key, value);
        self
    }

    pub fn with_ignore(mut self, ignore: IgnoreRules) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn should_ignore(&self, path: impl AsRef<Path>) -> bool {
        self.ignore.matches(path)
    }

    /// Validates a merged section. `src_dir` and `ignore` are pulled out of
    /// the options; everything left must be a string.
    fn from_section(name: &str, section: Table, ambient: &VarScope) -> Result<Self> {
        let mut options = BackupOptions::new();
        for (key, value) in section {
            match value {
                Value::String(s) => options.insert(key, s),
                other => {
                    return Err(Error::config(format!(
                        "[backups.{}] entry \"{}\" has non-string value ({})",
                        name, key, other
                    )));
                }
            }
        }

        let src_dir = options.shift_remove(SRC_DIR_KEY).ok_or_else(|| {
            Error::config(format!("Section [backups.{}] missing \"{}\"", name, SRC_DIR_KEY))
        })?;
        if src_dir.is_empty() {
            return Err(Error::config(format!(
                "Section [backups.{}] has an empty \"{}\"",
                name, SRC_DIR_KEY
            )));
        }
        let src_dir = expand_tilde(&src_dir, ambient)?;

        let ignore = match options.shift_remove(IGNORE_KEY) {
            Some(rules) => IgnoreRules::compile(&rules, &src_dir)?,
            None => IgnoreRules::Nothing,
        };

        Ok(Self {
            name: name.to_string(),
            src_dir,
            options,
            ignore,
        })
    }
}

/// A config document whose shape has been checked but whose values have not
/// been expanded or validated yet.
#[derive(Debug, Clone, Default)]
pub struct RawDocument {
    /// `[env]` entries in document order.
    pub env: Vec<(String, Value)>,
    /// Flat values directly under `[backups]`.
    pub base: Table,
    /// `[backups.<name>]` sections in document order.
    pub sections: Vec<(String, Table)>,
}

impl RawDocument {
    pub fn parse(text: &str) -> Result<Self> {
        let document: Table = toml::from_str(text)
            .map_err(|e| Error::config(format!("Error while parsing config file: {}", e)))?;

        let unknown: Vec<String> = document
            .keys()
            .filter(|k| k.as_str() != ENV_SECTION && k.as_str() != BACKUPS_SECTION)
            .map(|k| format!("[{}]", k))
            .collect();
        if !unknown.is_empty() {
            return Err(Error::config(format!(
                "Unknown section(s): {}",
                unknown.join(", ")
            )));
        }

        let mut raw = RawDocument::default();
        for (section, value) in document {
            let table = match value {
                Value::Table(table) => table,
                _ => return Err(Error::config(format!("[{}] must be a table", section))),
            };
            if section == ENV_SECTION {
                raw.env = table.into_iter().collect();
                continue;
            }
            for (key, value) in table {
                match value {
                    Value::Table(sub) => raw.sections.push((key, sub)),
                    other => {
                        raw.base.insert(key, other);
                    }
                }
            }
        }

        Ok(raw)
    }

    /// Expands variables, merges each section over `[backups]` and validates
    /// the result.
    ///
    /// `scope` is not modified; `[env]` entries extend a private copy of it.
    /// `~` in `src_dir` resolves against `scope` itself, so `[env]` cannot
    /// redirect it.
    pub fn lower(self, scope: &VarScope) -> Result<Vec<BackupSpec>> {
        let ambient = scope;
        let mut scope = scope.clone();
        for (name, value) in self.env {
            let raw = match value {
                Value::String(raw) => raw,
                other => {
                    return Err(Error::config(format!(
                        "[env] section contains entry \"{}\" whose value is not a string: {}",
                        name, other
                    )));
                }
            };
            let expanded = expand_string(&raw, &scope)?;
            debug!("[env] {} = {}", name, expanded);
            scope.set(name, expanded);
        }

        let base = expand_table(self.base, &scope)?;
        let mut specs = Vec::with_capacity(self.sections.len());
        for (name, section) in self.sections {
            let mut merged = base.clone();
            for (key, value) in expand_table(section, &scope)? {
                merged.insert(key, value);
            }
            specs.push(BackupSpec::from_section(&name, merged, ambient)?);
        }

        if specs.is_empty() {
            return Err(Error::config("No [backups.<name>] sections present"));
        }
        Ok(specs)
    }
}

/// Parses and validates a config document.
pub fn read_config(text: &str, scope: &VarScope) -> Result<Vec<BackupSpec>> {
    RawDocument::parse(text)?.lower(scope)
}

fn expand_string(raw: &str, scope: &VarScope) -> Result<String> {
    scope
        .expand(raw)
        .map_err(|e| Error::config(format!("Error while expanding variables: {}", e)))
}

fn expand_table(table: Table, scope: &VarScope) -> Result<Table> {
    table
        .into_iter()
        .map(|(key, value)| Ok((key, expand_value(value, scope)?)))
        .collect()
}

fn expand_value(value: Value, scope: &VarScope) -> Result<Value> {
    Ok(match value {
        Value::String(s) => Value::String(expand_string(&s, scope)?),
        Value::Table(t) => Value::Table(expand_table(t, scope)?),
        other => other,
    })
}

/// Expands a leading `~` or `~user` to a home directory.
///
/// `~` takes `HOME` from `ambient`, falling back to the platform lookup.
/// `~user` is looked up in the user database and left as-is when the user
/// is unknown.
fn expand_tilde(path: &str, ambient: &VarScope) -> Result<PathBuf> {
    let Some(after) = path.strip_prefix('~') else {
        return Ok(PathBuf::from(path));
    };
    let (user, rest) = match after.find('/') {
        Some(idx) => after.split_at(idx),
        None => (after, ""),
    };

    let home = if user.is_empty() {
        match ambient.get("HOME") {
            Some(home) => PathBuf::from(home),
            None => directories::BaseDirs::new()
                .map(|dirs| dirs.home_dir().to_path_buf())
                .ok_or_else(|| Error::config(format!("cannot expand {:?}: home directory unknown", path)))?,
        }
    } else {
        match user_home(user) {
            Some(home) => home,
            None => return Ok(PathBuf::from(path)),
        }
    };

    let rest = rest.trim_start_matches('/');
    if rest.is_empty() {
        Ok(home)
    } else {
        Ok(home.join(rest))
    }
}

#[cfg(unix)]
fn user_home(name: &str) -> Option<PathBuf> {
    match nix::unistd::User::from_name(name) {
        Ok(user) => user.map(|u| u.dir),
        Err(e) => {
            debug!("passwd lookup for {:?} failed: {}", name, e);
            None
        }
    }
}

#[cfg(not(unix))]
fn user_home(_name: &str) -> Option<PathBuf> {
    None
}
