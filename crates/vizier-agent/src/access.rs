//! Access policy for remote data tools.
//!
//! Two gates run before a remote call is dispatched: explicit source
//! arguments are matched against the allow-list, and free-text query
//! arguments are scanned for qualified `source.table` references. The
//! scanner is a best-effort clause-boundary heuristic, not a parser; it can
//! both over- and under-reject, so the explicit-argument check remains the
//! primary gate.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Argument keys that name a target data source directly.
const SOURCE_KEYS: &[&str] = &["source", "database", "datasource"];

/// Argument keys that carry free-text queries.
const QUERY_KEYS: &[&str] = &["sql", "query"];

/// Schema-qualifier tokens exempt from the reference scan; `public.orders`
/// names a namespace, not a data source.
const SCHEMA_QUALIFIERS: &[&str] = &["public", "main"];

/// Qualified references preceded by a clause-boundary keyword, e.g.
/// `FROM sales.orders` or `JOIN crm.accounts`.
static QUALIFIED_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:from|join|into|update|table)\s+([A-Za-z_][A-Za-z0-9_]*)\s*\.\s*[A-Za-z_][A-Za-z0-9_]*")
        .expect("valid regex")
});

/// A rejected tool call and the source that triggered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessViolation {
    pub source: String,
}

impl fmt::Display for AccessViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Access denied: data source '{}' is not on the allow-list",
            self.source
        )
    }
}

/// Case-insensitive allow-list of data sources, supporting a `source.*`
/// prefix form.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    allowed: Vec<String>,
}

impl AccessPolicy {
    /// Build a policy from allow-list entries (`"sales"`, `"crm.*"`, ...)
    pub fn new(sources: impl IntoIterator<Item = String>) -> Self {
        Self {
            allowed: sources.into_iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    /// Check whether a source name is allow-listed.
    pub fn source_allowed(&self, source: &str) -> bool {
        let name = source.to_lowercase();
        self.allowed.iter().any(|entry| {
            if let Some(base) = entry.strip_suffix(".*") {
                name == base || name.starts_with(&format!("{}.", base))
            } else {
                name == *entry
            }
        })
    }

    /// Validate a remote tool call's arguments.
    pub fn check(&self, input: &serde_json::Value) -> Result<(), AccessViolation> {
        for key in SOURCE_KEYS {
            if let Some(source) = input.get(key).and_then(|v| v.as_str()) {
                if !self.source_allowed(source) {
                    return Err(AccessViolation {
                        source: source.to_string(),
                    });
                }
            }
        }

        for key in QUERY_KEYS {
            if let Some(text) = input.get(key).and_then(|v| v.as_str()) {
                self.scan_query(text)?;
            }
        }

        Ok(())
    }

    /// Scan free-text query content for references to unlisted sources.
    fn scan_query(&self, text: &str) -> Result<(), AccessViolation> {
        for capture in QUALIFIED_REF.captures_iter(text) {
            let qualifier = &capture[1];
            if SCHEMA_QUALIFIERS
                .iter()
                .any(|q| qualifier.eq_ignore_ascii_case(q))
            {
                continue;
            }
            if !self.source_allowed(qualifier) {
                return Err(AccessViolation {
                    source: qualifier.to_string(),
                });
            }
        }
        Ok(())
    }
}
