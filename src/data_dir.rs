//! Where an index lives on disk.
//!
//! One directory holds both redb stores and the optional JSON configuration
//! file. The stores are only meaningful as a pair: ids in `names.redb` are the
//! ids found in every posting list of `words.redb`.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Overrides the XDG location when `--data-dir` is not given.
pub const DATA_DIR_ENV: &str = "IRDEX_DATA_DIR";

const NAMES_FILE: &str = "names.redb";
const WORDS_FILE: &str = "words.redb";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Pick the index directory and make sure it exists.
    ///
    /// `--data-dir` wins over `IRDEX_DATA_DIR`, which wins over
    /// `$XDG_DATA_HOME/irdex`.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = match explicit {
            Some(path) => path.to_path_buf(),
            None => match std::env::var_os(DATA_DIR_ENV) {
                Some(val) => PathBuf::from(val),
                None => xdg::BaseDirectories::with_prefix("irdex")
                    .get_data_home()
                    .ok_or_else(|| {
                        Error::Config(
                            "could not determine XDG data home directory"
                                .into(),
                        )
                    })?,
            },
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Decimal document id -> filename, plus the persisted build settings.
    pub fn names_db(&self) -> PathBuf {
        self.root.join(NAMES_FILE)
    }

    /// Word -> posting list of `(doc id, frequency)` pairs.
    pub fn words_db(&self) -> PathBuf {
        self.root.join(WORDS_FILE)
    }

    /// Index settings used when no `--config` is given. May be absent.
    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    /// Whether both stores have been created.
    pub fn has_index(&self) -> bool {
        self.names_db().is_file() && self.words_db().is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_with_explicit_path() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();

        assert_eq!(dir.root(), tmp.path());
        assert_eq!(dir.names_db(), tmp.path().join("names.redb"));
        assert_eq!(dir.words_db(), tmp.path().join("words.redb"));
        assert_eq!(dir.config_file(), tmp.path().join("config.json"));
    }

    #[test]
    fn missing_directory_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        let dir = DataDir::resolve(Some(&nested)).unwrap();

        assert!(dir.root().is_dir());
        assert!(!dir.has_index());
    }

    #[test]
    fn has_index_needs_both_stores() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();

        std::fs::write(dir.names_db(), b"").unwrap();
        assert!(!dir.has_index());
        std::fs::write(dir.words_db(), b"").unwrap();
        assert!(dir.has_index());
    }
}
