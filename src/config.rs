use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Suffixes recognized for one language tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSuffixes {
    pub language: String,
    pub suffixes: Vec<String>,
}

/// Ordered language suffix map. Order matters: the first language whose
/// suffixes match a column claims it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub languages: Vec<LanguageSuffixes>,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            languages: vec![
                LanguageSuffixes {
                    language: "en".to_string(),
                    suffixes: vec!["_en".to_string(), "_english".to_string()],
                },
                LanguageSuffixes {
                    language: "fr".to_string(),
                    suffixes: vec!["_fr".to_string(), "_french".to_string()],
                },
            ],
        }
    }
}

impl LanguageConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.languages.is_empty() {
            bail!("language config must list at least one language");
        }

        let mut seen = BTreeSet::<&str>::new();
        for entry in &self.languages {
            if entry.language.trim().is_empty() {
                bail!("language config contains an empty language tag");
            }
            if entry.language.contains(':') {
                bail!("language tag '{}' must not contain ':'", entry.language);
            }
            if !seen.insert(entry.language.as_str()) {
                bail!("language tag '{}' is listed more than once", entry.language);
            }
            if entry.language == crate::commands::index::UNKNOWN_LANGUAGE {
                bail!(
                    "language tag '{}' is reserved for unclassified documents",
                    entry.language
                );
            }
            if entry.suffixes.iter().any(|suffix| suffix.is_empty()) {
                bail!("language '{}' has an empty suffix", entry.language);
            }
        }

        Ok(())
    }

    pub fn language_tags(&self) -> Vec<&str> {
        self.languages
            .iter()
            .map(|entry| entry.language.as_str())
            .collect()
    }
}
