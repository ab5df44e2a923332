//! Training corpora for the intent classifier and entity extractor.
//!
//! Both files are JSON. The built-in copies under `config/nlu/` are compiled in
//! and used whenever no path is configured.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::nlu::NluError;

const BUILTIN_INTENTS: &str = include_str!("../../../../config/nlu/intents.json");
const BUILTIN_ENTITIES: &str = include_str!("../../../../config/nlu/entities.json");

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentCorpus {
    pub intents: Vec<IntentDefinition>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentDefinition {
    pub name: String,
    #[serde(default)]
    pub examples: Vec<IntentExample>,
}

/// Examples may be bare strings or annotated objects (`{"text": ..., "status": ...}`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntentExample {
    Text(String),
    Annotated {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },
}

impl IntentExample {
    pub fn text(&self) -> &str {
        match self {
            Self::Text(text) | Self::Annotated { text, .. } => text,
        }
    }
}

impl IntentCorpus {
    pub fn builtin() -> Result<Self, NluError> {
        parse_json("<builtin intents>", BUILTIN_INTENTS)
            .and_then(|corpus: Self| corpus.validated())
    }

    pub fn load(path: &Path) -> Result<Self, NluError> {
        read_json::<Self>(path)?.validated()
    }

    fn validated(self) -> Result<Self, NluError> {
        if self.intents.is_empty() {
            return Err(NluError::InvalidCorpus("intent corpus defines no intents".to_owned()));
        }
        if let Some(unnamed) = self.intents.iter().position(|intent| intent.name.trim().is_empty())
        {
            return Err(NluError::InvalidCorpus(format!("intent #{unnamed} has an empty name")));
        }
        Ok(self)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCorpus {
    #[serde(default)]
    pub regex_patterns: Vec<RegexPatternSpec>,
    #[serde(default)]
    pub patterns: Vec<KeywordPatternSpec>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexPatternSpec {
    pub label: String,
    pub pattern: String,
    #[serde(default)]
    pub flags: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordPatternSpec {
    pub label: String,
    pub pattern: Vec<TokenMatcher>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMatcher {
    #[serde(rename = "LOWER")]
    pub lower: String,
}

impl EntityCorpus {
    pub fn builtin() -> Result<Self, NluError> {
        parse_json("<builtin entities>", BUILTIN_ENTITIES)
    }

    pub fn load(path: &Path) -> Result<Self, NluError> {
        read_json(path)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, NluError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| NluError::ReadFile { path: path.to_path_buf(), source })?;
    parse_json(&path.display().to_string(), &raw)
}

fn parse_json<T: DeserializeOwned>(origin: &str, raw: &str) -> Result<T, NluError> {
    serde_json::from_str(raw)
        .map_err(|source| NluError::ParseJson { origin: origin.to_owned(), source })
}
