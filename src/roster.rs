//! Class roster and OCR text matching
//!
//! The roster is fixed for the lifetime of a session. Matching free-form OCR
//! text against it is token based: every token of a roster name that is at
//! least [`MIN_TOKEN_LEN`] characters long must appear (case-insensitively)
//! somewhere in the recognized text. The first roster entry that matches wins.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// Tokens shorter than this are ignored when matching ("Su", "He", ...)
pub const MIN_TOKEN_LEN: usize = 3;

/// Ordered set of known student names
#[derive(Debug, Clone, Default)]
pub struct Roster {
    names: Vec<String>,
    /// Lowercased tokens per name, same index as `names`
    tokens: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RosterRow {
    name: String,
}

impl Roster {
    /// Build a roster, trimming names and dropping repeats (first occurrence wins)
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut roster = Self::default();

        for name in names {
            let name = name.into().trim().to_string();
            if name.is_empty() || !seen.insert(name.clone()) {
                continue;
            }

            let tokens = name
                .to_lowercase()
                .split_whitespace()
                .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
                .map(str::to_string)
                .collect::<Vec<_>>();

            if tokens.is_empty() {
                warn!(
                    "Roster name '{}' has no token of {}+ characters and will match any text",
                    name, MIN_TOKEN_LEN
                );
            }

            roster.names.push(name);
            roster.tokens.push(tokens);
        }

        roster
    }

    /// Parse roster names from CSV content with a `name` header column
    pub fn parse_csv(csv_content: &str) -> Result<Vec<String>> {
        let mut reader = csv::Reader::from_reader(csv_content.as_bytes());
        let mut names = Vec::new();

        for result in reader.deserialize() {
            let row: RosterRow = result.context("Failed to parse roster CSV row")?;
            names.push(row.name);
        }

        Ok(names)
    }

    /// Load roster names from a CSV file
    pub async fn load_csv(path: impl AsRef<Path>) -> Result<Vec<String>> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read roster CSV: {}", path.display()))?;

        let names = Self::parse_csv(&content)
            .with_context(|| format!("Invalid roster CSV: {}", path.display()))?;
        info!("Loaded {} roster name(s) from {}", names.len(), path.display());
        Ok(names)
    }

    /// Exact membership test
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Find the first roster name whose significant tokens all occur in `text`
    pub fn match_text(&self, text: &str) -> Option<&str> {
        let haystack = text.to_lowercase();

        self.names
            .iter()
            .zip(&self.tokens)
            .find(|(_, tokens)| tokens.iter().all(|t| haystack.contains(t.as_str())))
            .map(|(name, _)| name.as_str())
    }

    /// Whether the name at `index` has no significant token and matches any text
    pub fn is_catch_all(&self, index: usize) -> bool {
        self.tokens.get(index).is_some_and(Vec::is_empty)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
