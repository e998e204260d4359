//! Compiled queries and matchers.
//!
//! A [`Query`] produces a [`Matcher`] over a reader: the matcher walks the
//! matching doc ordinals in ascending order, which is the engine's natural
//! iteration order and the order results flow through the search hand-off.
//! There is deliberately no query-language parser here; callers build query
//! objects directly.

use std::fmt::Debug;

use crate::error::{Result, SalixError};
use crate::index::reader::IndexReader;

/// Trait for compiled queries.
pub trait Query: Send + Sync + Debug {
    /// Create a matcher over the given reader.
    fn matcher(&self, reader: &IndexReader) -> Result<Matcher>;
}

/// Iterates matching doc ordinals in ascending order.
#[derive(Debug)]
pub struct Matcher {
    ordinals: Vec<u64>,
    position: usize,
}

impl Matcher {
    fn new(ordinals: Vec<u64>) -> Self {
        Matcher {
            ordinals,
            position: 0,
        }
    }

    /// True once all matches have been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.position >= self.ordinals.len()
    }

    /// The current match. Panics if exhausted; check `is_exhausted` first.
    pub fn doc_id(&self) -> u64 {
        self.ordinals[self.position]
    }

    /// Advance to the next match. Returns false when exhausted.
    pub fn next(&mut self) -> bool {
        self.position += 1;
        self.position < self.ordinals.len()
    }

    /// Total number of matches.
    pub fn len(&self) -> usize {
        self.ordinals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordinals.is_empty()
    }
}

/// Matches documents containing a term in a field.
///
/// The term text is analyzed with the field's analyzer at match time so that
/// it lines up with how the field was indexed. Text that analyzes into more
/// than one term is rejected as an invalid argument.
#[derive(Debug, Clone)]
pub struct TermQuery {
    field: String,
    term: String,
}

impl TermQuery {
    pub fn new(field: impl Into<String>, term: impl Into<String>) -> Self {
        TermQuery {
            field: field.into(),
            term: term.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn term(&self) -> &str {
        &self.term
    }
}

impl Query for TermQuery {
    fn matcher(&self, reader: &IndexReader) -> Result<Matcher> {
        let analyzed = reader.analyzers().analyze_field(&self.field, &self.term);
        let term = match analyzed.as_slice() {
            [] => return Ok(Matcher::new(Vec::new())),
            [term] => term,
            _ => {
                return Err(SalixError::invalid_argument(format!(
                    "term '{}' analyzes into multiple terms for field '{}'",
                    self.term, self.field
                )));
            }
        };
        Ok(Matcher::new(reader.postings(&format!("{}:{term}", self.field))))
    }
}

/// Matches every visible document.
#[derive(Debug, Clone, Default)]
pub struct AllDocsQuery;

impl AllDocsQuery {
    pub fn new() -> Self {
        AllDocsQuery
    }
}

impl Query for AllDocsQuery {
    fn matcher(&self, reader: &IndexReader) -> Result<Matcher> {
        Ok(Matcher::new(reader.all_ordinals()))
    }
}

/// Boolean combination of sub-queries.
///
/// - `must`: intersection, all clauses must match
/// - `should`: union; without `must` clauses these form the candidate set
/// - `must_not`: exclusion
///
/// A query with no `must` and no `should` clauses matches nothing.
#[derive(Debug, Default)]
pub struct BooleanQuery {
    must: Vec<Box<dyn Query>>,
    should: Vec<Box<dyn Query>>,
    must_not: Vec<Box<dyn Query>>,
}

impl BooleanQuery {
    pub fn new() -> Self {
        BooleanQuery::default()
    }

    pub fn must(mut self, query: impl Query + 'static) -> Self {
        self.must.push(Box::new(query));
        self
    }

    pub fn should(mut self, query: impl Query + 'static) -> Self {
        self.should.push(Box::new(query));
        self
    }

    pub fn must_not(mut self, query: impl Query + 'static) -> Self {
        self.must_not.push(Box::new(query));
        self
    }
}

impl Query for BooleanQuery {
    fn matcher(&self, reader: &IndexReader) -> Result<Matcher> {
        use std::collections::BTreeSet;

        if self.must.is_empty() && self.should.is_empty() {
            return Ok(Matcher::new(Vec::new()));
        }

        // Build the candidate set from must clauses (intersection), or from
        // should clauses (union) when there are none.
        let mut candidates: Option<BTreeSet<u64>> = None;
        for query in &self.must {
            let set: BTreeSet<u64> = collect_ordinals(query.as_ref(), reader)?.into_iter().collect();
            candidates = Some(match candidates {
                None => set,
                Some(existing) => existing.intersection(&set).copied().collect(),
            });
        }

        let mut candidates = match candidates {
            Some(candidates) => candidates,
            None => {
                let mut union = BTreeSet::new();
                for query in &self.should {
                    union.extend(collect_ordinals(query.as_ref(), reader)?);
                }
                union
            }
        };

        for query in &self.must_not {
            for ordinal in collect_ordinals(query.as_ref(), reader)? {
                candidates.remove(&ordinal);
            }
        }

        Ok(Matcher::new(candidates.into_iter().collect()))
    }
}

fn collect_ordinals(query: &dyn Query, reader: &IndexReader) -> Result<Vec<u64>> {
    let mut matcher = query.matcher(reader)?;
    let mut ordinals = Vec::with_capacity(matcher.len());
    while !matcher.is_exhausted() {
        ordinals.push(matcher.doc_id());
        matcher.next();
    }
    Ok(ordinals)
}
