//! Search Engine - ranked text matches with navigation
//!
//! A search scans the searchable columns (or a caller-supplied subset) and
//! ranks every matching cell:
//!
//! | match            | score |
//! |------------------|-------|
//! | whole cell       | 1.0   |
//! | prefix           | 0.75  |
//! | whole word       | 0.5   |
//! | anywhere         | 0.25  |
//!
//! Matches are ordered by score, then row, then column order. Highlighting
//! is state on the engine; row data is never touched.

use parking_lot::RwLock;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::columns::ColumnCatalog;
use crate::error::{GridError, GridResult};
use crate::row::Row;
use crate::row_store::RowStore;

pub const SCORE_EXACT: f64 = 1.0;
pub const SCORE_PREFIX: f64 = 0.75;
pub const SCORE_WHOLE_WORD: f64 = 0.5;
pub const SCORE_SUBSTRING: f64 = 0.25;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    /// Only match the term as a whole word
    pub whole_word: bool,
    /// Columns to scan; None = every searchable column
    pub columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchMatch {
    pub row_index: usize,
    pub column: String,
    /// Cell text at search time
    pub text: String,
    pub score: f64,
}

#[derive(Debug, Default)]
struct SearchState {
    term: String,
    options: SearchOptions,
    matches: Vec<SearchMatch>,
    current: Option<usize>,
    highlight: bool,
}

#[derive(Debug)]
pub struct SearchEngine {
    state: RwLock<SearchState>,
    max_results: usize,
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new(10_000)
    }
}

/// Compiled matchers for one term.
struct Matcher {
    term: String,
    case_sensitive: bool,
    whole_word_only: bool,
    word: Regex,
    anywhere: Regex,
}

impl Matcher {
    fn new(term: &str, options: &SearchOptions) -> GridResult<Self> {
        let escaped = regex::escape(term);
        let build = |pattern: String| {
            RegexBuilder::new(&pattern)
                .case_insensitive(!options.case_sensitive)
                .build()
                .map_err(|e| GridError::Internal(format!("search pattern: {}", e)))
        };
        Ok(Self {
            term: fold(term, options.case_sensitive),
            case_sensitive: options.case_sensitive,
            whole_word_only: options.whole_word,
            // \b would never match next to a term edge like '#' or '+'
            word: build(format!(r"(?:^|\W){}(?:\W|$)", escaped))?,
            anywhere: build(escaped)?,
        })
    }

    fn score(&self, text: &str) -> Option<f64> {
        let is_word = self.word.is_match(text);
        if self.whole_word_only && !is_word {
            return None;
        }
        if !is_word && !self.anywhere.is_match(text) {
            return None;
        }

        let folded = fold(text, self.case_sensitive);
        let score = if folded == self.term {
            SCORE_EXACT
        } else if folded.starts_with(&self.term) {
            SCORE_PREFIX
        } else if is_word {
            SCORE_WHOLE_WORD
        } else {
            SCORE_SUBSTRING
        };
        Some(score)
    }
}

fn fold(text: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        text.to_string()
    } else {
        text.to_lowercase()
    }
}

impl SearchEngine {
    pub fn new(max_results: usize) -> Self {
        Self {
            state: RwLock::new(SearchState::default()),
            max_results,
        }
    }

    /// Run a new search, replacing the previous match set. An empty term
    /// clears the search.
    pub fn search(
        &self,
        store: &RowStore,
        catalog: &ColumnCatalog,
        term: &str,
        options: SearchOptions,
    ) -> GridResult<Vec<SearchMatch>> {
        let matches = if term.is_empty() {
            Vec::new()
        } else {
            self.scan(store, catalog, term, &options)?
        };

        let mut state = self.state.write();
        state.term = term.to_string();
        state.options = options;
        state.current = None;
        state.matches = matches.clone();
        log::debug!("search '{}': {} matches", term, matches.len());
        Ok(matches)
    }

    /// Re-run the last search against the store as it is now. The current
    /// position is clamped to the new match count. Returns the match count.
    pub fn refresh(&self, store: &RowStore, catalog: &ColumnCatalog) -> GridResult<usize> {
        let (term, options) = {
            let state = self.state.read();
            (state.term.clone(), state.options.clone())
        };
        let matches = if term.is_empty() {
            Vec::new()
        } else {
            self.scan(store, catalog, &term, &options)?
        };

        let mut state = self.state.write();
        let count = matches.len();
        state.matches = matches;
        state.current = match state.current {
            _ if count == 0 => None,
            Some(i) => Some(i.min(count - 1)),
            None => None,
        };
        Ok(count)
    }

    fn scan(
        &self,
        store: &RowStore,
        catalog: &ColumnCatalog,
        term: &str,
        options: &SearchOptions,
    ) -> GridResult<Vec<SearchMatch>> {
        let matcher = Matcher::new(term, options)?;
        let declared: Option<Vec<String>> = match &options.columns {
            Some(columns) => Some(columns.clone()),
            None if catalog.is_empty() => None,
            None => Some(
                catalog
                    .get_columns()
                    .into_iter()
                    .filter(|c| c.searchable && c.role.is_data())
                    .map(|c| c.name)
                    .collect(),
            ),
        };

        let mut matches = Vec::new();
        for (row_index, row) in store.get_all_rows().iter().enumerate() {
            for column in columns_for(row, declared.as_deref()) {
                let text = row.get(&column).display_string();
                if let Some(score) = matcher.score(&text) {
                    matches.push(SearchMatch {
                        row_index,
                        column,
                        text,
                        score,
                    });
                }
            }
        }

        // Stable: ties keep row-major, column-order scan order
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(self.max_results);
        Ok(matches)
    }

    pub fn matches(&self) -> Vec<SearchMatch> {
        self.state.read().matches.clone()
    }

    pub fn match_count(&self) -> usize {
        self.state.read().matches.len()
    }

    pub fn term(&self) -> String {
        self.state.read().term.clone()
    }

    pub fn current_match(&self) -> Option<SearchMatch> {
        let state = self.state.read();
        state.current.and_then(|i| state.matches.get(i).cloned())
    }

    /// Advance to the next match, wrapping to the first.
    pub fn next_match(&self) -> Option<SearchMatch> {
        let mut state = self.state.write();
        let count = state.matches.len();
        if count == 0 {
            return None;
        }
        let next = state.current.map_or(0, |i| (i + 1) % count);
        state.current = Some(next);
        state.matches.get(next).cloned()
    }

    /// Step back to the previous match, wrapping to the last.
    pub fn previous_match(&self) -> Option<SearchMatch> {
        let mut state = self.state.write();
        let count = state.matches.len();
        if count == 0 {
            return None;
        }
        let prev = state.current.map_or(count - 1, |i| (i + count - 1) % count);
        state.current = Some(prev);
        state.matches.get(prev).cloned()
    }

    pub fn set_highlight(&self, on: bool) {
        self.state.write().highlight = on;
    }

    pub fn is_highlight_enabled(&self) -> bool {
        self.state.read().highlight
    }

    /// Should this cell render highlighted?
    pub fn is_highlighted(&self, row_index: usize, column: &str) -> bool {
        let state = self.state.read();
        state.highlight
            && state
                .matches
                .iter()
                .any(|m| m.row_index == row_index && m.column == column)
    }

    pub fn clear(&self) {
        *self.state.write() = SearchState::default();
    }
}

fn columns_for(row: &Row, declared: Option<&[String]>) -> Vec<String> {
    match declared {
        Some(columns) => columns.to_vec(),
        None => row.data().map(|(k, _)| k.to_string()).collect(),
    }
}
