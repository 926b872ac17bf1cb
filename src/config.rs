use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    pattern::{MatchFlags, MatchKind, Matcher},
};

/// Settings key under which the build configuration is persisted in the
/// names store.
pub const SETTINGS_KEY: &str = "index_config";

/// Content pre-filter: files with suffix `ext` are replaced by the output of
/// `command <file>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub ext: String,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Root of the document tree.
    pub directory: Option<PathBuf>,
    /// Approximate number of documents; sizes the store caches.
    pub dimension: usize,
    pub ignore_case: bool,
    /// Suffixes whose files have `<...>` markup skipped.
    pub skip_tag_xml: Vec<String>,
    pub min_word_size: usize,
    /// `|`-separated DOS patterns of words never indexed.
    pub bad_words: Option<String>,
    /// Restricts `bad_words` to these suffixes when non-empty.
    pub bad_words_ext: Vec<String>,
    /// Index each directory's files as one logical document.
    pub dir_content_as_doc: bool,
    pub filters: Vec<FilterSpec>,
    /// Remove the source file when its document is deleted.
    pub unlink_on_delete: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            directory: None,
            dimension: 1000,
            ignore_case: false,
            skip_tag_xml: Vec::new(),
            min_word_size: 3,
            bad_words: None,
            bad_words_ext: Vec::new(),
            dir_content_as_doc: false,
            filters: Vec::new(),
            unlink_on_delete: false,
        }
    }
}

/// Suffix of a path as used for per-suffix settings: the extension without
/// its dot, or an empty string.
pub fn suffix_of(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("")
}

fn has_suffix(list: &[String], suffix: &str) -> bool {
    list.iter()
        .any(|s| s.trim_start_matches('.').eq_ignore_ascii_case(suffix))
}

impl IndexConfig {
    /// Load a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `explicit` if given, else `fallback` if it exists, else defaults.
    pub fn resolve(explicit: Option<&Path>, fallback: &Path) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None if fallback.is_file() => Self::load(fallback),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_word_size == 0 {
            return Err(Error::Config("min_word_size must be at least 1".into()));
        }
        if let Some(f) = self.filters.iter().find(|f| f.command.trim().is_empty())
        {
            return Err(Error::Config(format!(
                "filter for suffix '{}' has an empty command",
                f.ext
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn match_flags(&self) -> MatchFlags {
        if self.ignore_case {
            MatchFlags::CASEFOLD
        } else {
            MatchFlags::empty()
        }
    }

    /// The bad-word matcher, if any bad words are configured.
    pub fn bad_words_matcher(&self) -> Option<Matcher> {
        self.bad_words
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| Matcher::new(p, MatchKind::DosWithOr, self.match_flags()))
    }

    /// Whether bad-word filtering applies to files with this suffix.
    pub fn bad_words_active(&self, suffix: &str) -> bool {
        self.bad_words.as_deref().is_some_and(|p| !p.is_empty())
            && (self.bad_words_ext.is_empty()
                || has_suffix(&self.bad_words_ext, suffix))
    }

    pub fn skips_tags(&self, suffix: &str) -> bool {
        has_suffix(&self.skip_tag_xml, suffix)
    }

    /// Normalize a word for storage and lookup.
    pub fn normalize_word(&self, word: &str) -> String {
        if self.ignore_case {
            word.to_lowercase()
        } else {
            word.to_string()
        }
    }
}
