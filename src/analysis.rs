//! Text analysis for indexing and term lookup.
//!
//! Analysis is intentionally small: fields are tokenized into lowercase word
//! terms, or kept verbatim for identifier-style fields. Both the index
//! writer and term queries must analyze through the same [`Analyzer`] so
//! that query terms line up with indexed terms.

use std::fmt::Debug;
use std::sync::Arc;

use ahash::AHashMap;
use unicode_segmentation::UnicodeSegmentation;

/// Trait for text analyzers.
pub trait Analyzer: Send + Sync + Debug {
    /// Analyzer name, for diagnostics.
    fn name(&self) -> &str;

    /// Split text into index terms.
    fn analyze(&self, text: &str) -> Vec<String>;
}

/// Default analyzer: Unicode word segmentation, lowercased.
#[derive(Debug, Default, Clone)]
pub struct StandardAnalyzer;

impl StandardAnalyzer {
    pub fn new() -> Self {
        StandardAnalyzer
    }
}

impl Analyzer for StandardAnalyzer {
    fn name(&self) -> &str {
        "standard"
    }

    fn analyze(&self, text: &str) -> Vec<String> {
        text.unicode_words().map(|w| w.to_lowercase()).collect()
    }
}

/// Analyzer that emits the whole value as a single verbatim term.
///
/// Used for identifier fields where partial matches are meaningless.
#[derive(Debug, Default, Clone)]
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    pub fn new() -> Self {
        KeywordAnalyzer
    }
}

impl Analyzer for KeywordAnalyzer {
    fn name(&self) -> &str {
        "keyword"
    }

    fn analyze(&self, text: &str) -> Vec<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        }
    }
}

/// Per-field analyzer selection with a default fallback.
#[derive(Debug, Clone)]
pub struct PerFieldAnalyzers {
    default_analyzer: Arc<dyn Analyzer>,
    overrides: AHashMap<String, Arc<dyn Analyzer>>,
}

impl PerFieldAnalyzers {
    /// Create a wrapper with the given default analyzer.
    pub fn new(default_analyzer: Arc<dyn Analyzer>) -> Self {
        PerFieldAnalyzers {
            default_analyzer,
            overrides: AHashMap::new(),
        }
    }

    /// Register a field-specific analyzer.
    pub fn add_analyzer(&mut self, field: impl Into<String>, analyzer: Arc<dyn Analyzer>) {
        self.overrides.insert(field.into(), analyzer);
    }

    /// The analyzer to use for a given field.
    pub fn analyzer_for(&self, field: &str) -> &Arc<dyn Analyzer> {
        self.overrides.get(field).unwrap_or(&self.default_analyzer)
    }

    /// Analyze a field value with the field's analyzer.
    pub fn analyze_field(&self, field: &str, text: &str) -> Vec<String> {
        self.analyzer_for(field).analyze(text)
    }
}

impl Default for PerFieldAnalyzers {
    fn default() -> Self {
        PerFieldAnalyzers::new(Arc::new(StandardAnalyzer::new()))
    }
}
