//! Search predicates applied to merged records.
//!
//! A predicate is a conjunction of clauses. Each clause looks at one part of
//! a record (key, value, header names, a named header, or all of them) and
//! tests it against a needle. An empty predicate matches every record.
//!
//! # Syntax
//!
//! ```text
//! predicate := clause ( "&&" clause )*
//! clause    := field op needle | free-text
//! field     := "key" | "value" | "headers" | "header." name | "any"
//! op        := "~" | "!~" | "=" | "!="
//! ```
//!
//! `~` is an ASCII case-insensitive substring match, `=` an exact match.
//! Anything that doesn't start with a field and an operator is free text and
//! matches if it occurs anywhere in the record.

use bytes::Bytes;
use tideline_core::Record;

use crate::error::{BrowseError, BrowseResult};

/// Clause separator.
const AND: &str = "&&";

/// Which part of a record a clause examines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTarget {
    /// Key, value and every header value.
    Any,
    /// The record key. A record without a key never matches.
    Key,
    /// The record value.
    Value,
    /// Header names.
    HeaderKeys,
    /// Values of the headers with this name.
    Header(Bytes),
}

/// How a clause compares its needle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOp {
    /// Case-insensitive substring.
    Contains,
    /// Negated `Contains`.
    NotContains,
    /// Exact bytes.
    Equals,
    /// Negated `Equals`.
    NotEquals,
}

impl SearchOp {
    const fn is_negated(self) -> bool {
        matches!(self, Self::NotContains | Self::NotEquals)
    }

    fn test(self, haystack: &[u8], needle: &[u8]) -> bool {
        match self {
            Self::Contains | Self::NotContains => contains_ignore_case(haystack, needle),
            Self::Equals | Self::NotEquals => haystack == needle,
        }
    }
}

/// One `target op needle` test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchClause {
    /// What to look at.
    pub target: SearchTarget,
    /// How to compare.
    pub op: SearchOp,
    /// What to look for.
    pub needle: Bytes,
}

impl SearchClause {
    /// Creates a clause.
    #[must_use]
    pub fn new(target: SearchTarget, op: SearchOp, needle: impl Into<Bytes>) -> Self {
        Self {
            target,
            op,
            needle: needle.into(),
        }
    }

    /// Returns true if the record satisfies this clause.
    ///
    /// Negated operators are the exact negation of their positive form, so
    /// `key!=x` matches records without a key.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        let found = self.fields(record).any(|field| self.op.test(field, &self.needle));
        found != self.op.is_negated()
    }

    fn fields<'a>(&'a self, record: &'a Record) -> Box<dyn Iterator<Item = &'a [u8]> + 'a> {
        match &self.target {
            SearchTarget::Any => Box::new(
                record
                    .key
                    .as_deref()
                    .into_iter()
                    .chain(std::iter::once(&record.value[..]))
                    .chain(record.headers.iter().map(|h| &h.value[..])),
            ),
            SearchTarget::Key => Box::new(record.key.as_deref().into_iter()),
            SearchTarget::Value => Box::new(std::iter::once(&record.value[..])),
            SearchTarget::HeaderKeys => Box::new(record.headers.iter().map(|h| &h.key[..])),
            SearchTarget::Header(name) => Box::new(
                record
                    .headers
                    .iter()
                    .filter(move |h| h.key == name)
                    .map(|h| &h.value[..]),
            ),
        }
    }
}

/// A conjunction of search clauses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPredicate {
    clauses: Vec<SearchClause>,
}

impl SearchPredicate {
    /// Creates a predicate matching every record.
    #[must_use]
    pub const fn match_all() -> Self {
        Self {
            clauses: Vec::new(),
        }
    }

    /// Creates a free-text predicate: the needle occurs anywhere.
    #[must_use]
    pub fn contains(needle: impl Into<Bytes>) -> Self {
        Self::match_all().with_clause(SearchClause::new(
            SearchTarget::Any,
            SearchOp::Contains,
            needle,
        ))
    }

    /// Adds a clause.
    #[must_use]
    pub fn with_clause(mut self, clause: SearchClause) -> Self {
        self.clauses.push(clause);
        self
    }

    /// Returns the clauses.
    #[must_use]
    pub fn clauses(&self) -> &[SearchClause] {
        &self.clauses
    }

    /// Returns true if the predicate has no clauses.
    #[must_use]
    pub fn is_match_all(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Returns true if the record satisfies every clause.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        self.clauses.iter().all(|clause| clause.matches(record))
    }

    /// Parses a search expression. Blank input matches everything.
    ///
    /// # Errors
    /// Returns `InvalidOptions` if a clause is empty or names a header
    /// without a name.
    pub fn parse(input: &str) -> BrowseResult<Self> {
        if input.trim().is_empty() {
            return Ok(Self::match_all());
        }

        let mut predicate = Self::match_all();
        for raw in input.split(AND) {
            let raw = raw.trim();
            if raw.is_empty() {
                return Err(BrowseError::invalid_options(format!(
                    "empty clause in search {input:?}"
                )));
            }
            predicate = predicate.with_clause(parse_clause(raw)?);
        }
        Ok(predicate)
    }
}

fn parse_clause(raw: &str) -> BrowseResult<SearchClause> {
    // Longest operators first so "!=" isn't read as "=".
    const OPS: [(&str, SearchOp); 4] = [
        ("!~", SearchOp::NotContains),
        ("!=", SearchOp::NotEquals),
        ("~", SearchOp::Contains),
        ("=", SearchOp::Equals),
    ];

    let Some(op_start) = raw.find(['~', '=', '!']) else {
        return Ok(free_text(raw));
    };
    let (field, rest) = raw.split_at(op_start);
    let Some((token, op)) = OPS.iter().find(|(token, _)| rest.starts_with(token)) else {
        return Ok(free_text(raw));
    };
    let Some(target) = parse_target(field.trim())? else {
        return Ok(free_text(raw));
    };

    let needle = rest[token.len()..].trim();
    Ok(SearchClause::new(target, *op, needle.as_bytes().to_vec()))
}

fn parse_target(field: &str) -> BrowseResult<Option<SearchTarget>> {
    let target = match field.to_ascii_lowercase().as_str() {
        "any" => SearchTarget::Any,
        "key" => SearchTarget::Key,
        "value" => SearchTarget::Value,
        "headers" => SearchTarget::HeaderKeys,
        lower if lower.starts_with("header.") => {
            let name = &field["header.".len()..];
            if name.is_empty() {
                return Err(BrowseError::invalid_options("header clause without a name"));
            }
            SearchTarget::Header(Bytes::copy_from_slice(name.as_bytes()))
        }
        _ => return Ok(None),
    };
    Ok(Some(target))
}

fn free_text(raw: &str) -> SearchClause {
    SearchClause::new(SearchTarget::Any, SearchOp::Contains, raw.as_bytes().to_vec())
}

fn contains_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle))
}
