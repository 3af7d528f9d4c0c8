//! Compiles the `-t` type-selector string into a predicate the classifier
//! applies to each mount-table entry.

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TermKind {
    Type,
    Opt,
}

#[derive(Debug, Clone)]
struct Term {
    kind: TermKind,
    negated: bool,
    text: String,
}

/// A compiled `-t` selector, ready to test against a mount-table entry.
#[derive(Debug, Clone, Default)]
pub struct TypeFilter {
    terms: Vec<Term>,
    /// All `TYPE` terms are jointly positive or jointly negated; `None`
    /// until the first type term fixes it.
    negate_types: Option<bool>,
}

impl TypeFilter {
    /// An empty filter matches everything; used when `-t` wasn't given.
    pub fn accept_all() -> Self {
        TypeFilter::default()
    }

    /// Compiles a comma-separated selector string. Each item is parsed as:
    /// a `no`/`!` prefix marking negation, then either the literal `loop`
    /// (treated as `opts=loop`), an `opts=X` option term, or a bare type
    /// name. Mixing positive and negated type terms is a compile error.
    pub fn compile(selector: &str) -> Result<Self, Error> {
        let mut filter = TypeFilter::default();
        for raw in selector.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (negated, rest) = if let Some(r) = raw.strip_prefix('!') {
                (true, r)
            } else if let Some(r) = raw.strip_prefix("no") {
                (true, r)
            } else {
                (false, raw)
            };

            let (kind, text) = if rest == "loop" {
                (TermKind::Opt, "loop".to_string())
            } else if let Some(opt) = rest.strip_prefix("opts=") {
                (TermKind::Opt, opt.to_string())
            } else {
                (TermKind::Type, rest.to_string())
            };

            if kind == TermKind::Type {
                match filter.negate_types {
                    None => filter.negate_types = Some(negated),
                    Some(existing) if existing != negated => {
                        return Err(Error::ConflictingTypeFilter(selector.to_string()));
                    }
                    Some(_) => {}
                }
            }

            filter.terms.push(Term {
                kind,
                negated,
                text,
            });
        }
        Ok(filter)
    }

    /// `true` iff `fs_type`/`options` match this filter.
    pub fn matches(&self, fs_type: &str, options: &str) -> bool {
        let opt_list: Vec<&str> = options.split(',').collect();

        for term in self.terms.iter().filter(|t| t.kind == TermKind::Opt) {
            let present = opt_list.contains(&term.text.as_str());
            if term.negated && present {
                return false;
            }
            if !term.negated && !present {
                return false;
            }
        }

        let type_terms: Vec<&Term> = self
            .terms
            .iter()
            .filter(|t| t.kind == TermKind::Type)
            .collect();
        if type_terms.is_empty() {
            return true;
        }
        let any_match = type_terms.iter().any(|t| t.text == fs_type);
        let negate = self.negate_types.unwrap_or(false);
        negate ^ any_match
    }
}
