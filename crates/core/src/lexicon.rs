//! Vocabulary tables consulted by the dialogue engine.
//!
//! A [`Lexicon`] is immutable once built. Live reloads go through
//! [`LexiconHandle`], which swaps the whole table behind an `Arc` so a turn in
//! progress keeps reading the table it started with.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::intent::BankIntent;

#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("could not read lexicon file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse lexicon file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("lexicon validation failed: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lexicon {
    cancel_words: Vec<String>,
    restart_words: Vec<String>,
    affirmative_words: Vec<String>,
    general_knowledge_patterns: Vec<String>,
    explicit_phrases: HashMap<BankIntent, Vec<String>>,
    banking_terms: HashMap<BankIntent, Vec<String>>,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self {
            cancel_words: words(&["cancel", "abort", "stop", "exit"]),
            restart_words: words(&["restart", "reset", "start over"]),
            affirmative_words: words(&["yes", "y", "confirm", "ok", "okay"]),
            general_knowledge_patterns: words(&[
                "what is",
                "who is",
                "define",
                "explain",
                "how does",
                "difference between",
                "data scientist",
                "machine learning",
                "python",
                "programming",
            ]),
            explicit_phrases: HashMap::from([
                (BankIntent::TransferMoney, words(&["transfer money", "send money"])),
                (BankIntent::CheckBalance, words(&["check balance", "balance", "view balance"])),
                (BankIntent::CardBlock, words(&["block card", "card block"])),
                (BankIntent::FindAtm, words(&["find atm", "nearest atm", "atm"])),
            ]),
            banking_terms: HashMap::from([
                (
                    BankIntent::TransferMoney,
                    words(&["transfer", "send", "pay", "to account", "recipient", "amount", "money"]),
                ),
                (
                    BankIntent::CheckBalance,
                    words(&["balance", "view balance", "account balance", "how much", "available"]),
                ),
                (
                    BankIntent::CardBlock,
                    words(&["block card", "card block", "block", "deactivate", "lost card", "stolen"]),
                ),
                (
                    BankIntent::FindAtm,
                    words(&["atm", "nearest atm", "cash machine", "cash withdrawal"]),
                ),
            ]),
        }
    }
}

fn words(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_owned()).collect()
}

impl Lexicon {
    /// Loads a TOML lexicon. Sections missing from the file keep their built-in values.
    pub fn load(path: &Path) -> Result<Self, LexiconError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| LexiconError::ReadFile { path: path.to_path_buf(), source })?;
        let patch = toml::from_str::<LexiconPatch>(&raw)
            .map_err(|source| LexiconError::ParseFile { path: path.to_path_buf(), source })?;

        let mut lexicon = Self::default();
        lexicon.apply_patch(patch);
        lexicon.validate()?;
        Ok(lexicon)
    }

    fn apply_patch(&mut self, patch: LexiconPatch) {
        if let Some(cancel) = patch.cancel {
            self.cancel_words = normalize_all(cancel);
        }
        if let Some(restart) = patch.restart {
            self.restart_words = normalize_all(restart);
        }
        if let Some(affirmative) = patch.affirmative {
            self.affirmative_words = normalize_all(affirmative);
        }
        if let Some(general_knowledge) = patch.general_knowledge {
            self.general_knowledge_patterns = normalize_all(general_knowledge);
        }
        for (intent, phrases) in patch.explicit_phrases.unwrap_or_default() {
            self.explicit_phrases.insert(intent, normalize_all(phrases));
        }
        for (intent, terms) in patch.banking_terms.unwrap_or_default() {
            self.banking_terms.insert(intent, normalize_all(terms));
        }
    }

    pub fn validate(&self) -> Result<(), LexiconError> {
        let required = [
            ("cancel", &self.cancel_words),
            ("restart", &self.restart_words),
            ("affirmative", &self.affirmative_words),
        ];
        for (name, list) in required {
            if list.is_empty() {
                return Err(LexiconError::Validation(format!("`{name}` must not be empty")));
            }
            if list.iter().any(String::is_empty) {
                return Err(LexiconError::Validation(format!(
                    "`{name}` contains an empty entry"
                )));
            }
        }

        let phrase_tables = self
            .explicit_phrases
            .values()
            .chain(self.banking_terms.values())
            .chain(std::iter::once(&self.general_knowledge_patterns));
        for table in phrase_tables {
            if table.iter().any(String::is_empty) {
                return Err(LexiconError::Validation(
                    "phrase tables must not contain empty entries".to_owned(),
                ));
            }
        }

        Ok(())
    }

    /// Exact match against the cancellation vocabulary. Expects trimmed lowercase input.
    pub fn is_cancel(&self, normalized: &str) -> bool {
        self.cancel_words.iter().any(|word| word == normalized)
    }

    pub fn is_restart(&self, normalized: &str) -> bool {
        self.restart_words.iter().any(|word| word == normalized)
    }

    pub fn is_affirmative(&self, text: &str) -> bool {
        let normalized = text.trim().to_lowercase();
        self.affirmative_words.iter().any(|word| *word == normalized)
    }

    /// Off-domain trivia ("what is ...", "explain ...") that must never reach a banking flow.
    pub fn looks_general_knowledge(&self, text: &str) -> bool {
        contains_any(&text.to_lowercase(), &self.general_knowledge_patterns)
    }

    pub fn has_explicit_phrase(&self, intent: BankIntent, text: &str) -> bool {
        self.explicit_phrases
            .get(&intent)
            .is_some_and(|phrases| contains_any(&text.to_lowercase(), phrases))
    }

    pub fn resembles_intent(&self, intent: BankIntent, text: &str) -> bool {
        self.banking_terms
            .get(&intent)
            .is_some_and(|terms| contains_any(&text.to_lowercase(), terms))
    }
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle.as_str()))
}

fn normalize_all(values: Vec<String>) -> Vec<String> {
    values.into_iter().map(|value| value.trim().to_lowercase()).collect()
}

#[derive(Debug, Default, Deserialize)]
struct LexiconPatch {
    cancel: Option<Vec<String>>,
    restart: Option<Vec<String>>,
    affirmative: Option<Vec<String>>,
    general_knowledge: Option<Vec<String>>,
    explicit_phrases: Option<HashMap<BankIntent, Vec<String>>>,
    banking_terms: Option<HashMap<BankIntent, Vec<String>>>,
}

/// Shared, hot-swappable reference to the active [`Lexicon`].
#[derive(Clone, Debug)]
pub struct LexiconHandle {
    current: Arc<RwLock<Arc<Lexicon>>>,
}

impl LexiconHandle {
    pub fn new(lexicon: Lexicon) -> Self {
        Self { current: Arc::new(RwLock::new(Arc::new(lexicon))) }
    }

    pub fn current(&self) -> Arc<Lexicon> {
        Arc::clone(&self.current.read())
    }

    pub fn replace(&self, lexicon: Lexicon) {
        *self.current.write() = Arc::new(lexicon);
    }

    /// Loads `path` and swaps it in. On failure the previous table stays active.
    pub fn reload_from(&self, path: &Path) -> Result<(), LexiconError> {
        let lexicon = Lexicon::load(path)?;
        self.replace(lexicon);
        tracing::info!(
            event_name = "lexicon.reloaded",
            path = %path.display(),
            "lexicon table swapped"
        );
        Ok(())
    }
}

impl Default for LexiconHandle {
    fn default() -> Self {
        Self::new(Lexicon::default())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::{Lexicon, LexiconError, LexiconHandle};
    use crate::domain::intent::BankIntent;

    #[test]
    fn built_in_tables_cover_dialogue_vocabulary() {
        let lexicon = Lexicon::default();

        assert!(lexicon.is_cancel("abort"));
        assert!(lexicon.is_restart("start over"));
        assert!(!lexicon.is_cancel("please cancel"));
        assert!(lexicon.is_affirmative(" OK "));
        assert!(!lexicon.is_affirmative("no"));
        assert!(lexicon.looks_general_knowledge("What is machine learning"));
        assert!(lexicon.has_explicit_phrase(BankIntent::CheckBalance, "Check Balance please"));
        assert!(!lexicon.has_explicit_phrase(BankIntent::TransferMoney, "move funds"));
        assert!(lexicon.resembles_intent(BankIntent::CardBlock, "my card was stolen"));
        assert!(!lexicon.resembles_intent(BankIntent::FindAtm, "send money"));
    }

    #[test]
    fn file_sections_override_only_what_they_name() -> Result<(), String> {
        let dir = TempDir::new().map_err(|err| err.to_string())?;
        let path = dir.path().join("lexicon.toml");
        fs::write(
            &path,
            r#"
cancel = ["Quit"]

[banking_terms]
find_atm = ["cash point"]
"#,
        )
        .map_err(|err| err.to_string())?;

        let lexicon = Lexicon::load(&path).map_err(|err| err.to_string())?;

        assert!(lexicon.is_cancel("quit"));
        assert!(!lexicon.is_cancel("cancel"));
        assert!(lexicon.is_restart("reset"));
        assert!(lexicon.resembles_intent(BankIntent::FindAtm, "nearest cash point"));
        assert!(!lexicon.resembles_intent(BankIntent::FindAtm, "atm"));
        Ok(())
    }

    #[test]
    fn invalid_reload_keeps_previous_table() -> Result<(), String> {
        let dir = TempDir::new().map_err(|err| err.to_string())?;
        let path = dir.path().join("lexicon.toml");
        fs::write(&path, "cancel = []\n").map_err(|err| err.to_string())?;

        let handle = LexiconHandle::default();
        let before = handle.current();
        let result = handle.reload_from(&path);

        assert!(matches!(result, Err(LexiconError::Validation(_))));
        assert_eq!(*handle.current(), *before);
        Ok(())
    }

    #[test]
    fn replace_swaps_table_without_disturbing_existing_readers() {
        let handle = LexiconHandle::default();
        let held = handle.current();

        let mut custom = Lexicon::default();
        custom.cancel_words = vec!["halt".to_owned()];
        handle.replace(custom);

        assert!(held.is_cancel("cancel"));
        assert!(handle.current().is_cancel("halt"));
        assert!(!handle.current().is_cancel("cancel"));
    }
}
