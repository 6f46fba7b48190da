//! Pattern catalog.
//!
//! The catalog is an ordered list of classification patterns loaded once per
//! process and then shared read-only by every scanner. Sources are JSON or
//! YAML, either a bare list of records or an object with a `patterns` list:
//!
//! ```json
//! [
//!   {
//!     "match": "connection refused",
//!     "category": "Connection",
//!     "severity": 2,
//!     "next_step": "Check the upstream service of {WORKLOAD_TYPE} `{WORKLOAD_NAME}` in `{NAMESPACE}`"
//!   }
//! ]
//! ```

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::types::{Category, Severity, WorkloadRef};

/// Catalog compiled into the binary, used when no catalog file is supplied.
const BUILTIN_CATALOG: &str = include_str!("../patterns/default.json");

/// Compiled regex size limit; guards against pathological catalog entries.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Stable identifier of a pattern: its position in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PatternId(pub usize);

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One classification pattern.
#[derive(Debug, Clone)]
pub struct LogPattern {
    pub id: PatternId,
    /// Optional human-readable name used in issue titles
    pub name: Option<String>,
    /// Case-insensitive matcher
    pub regex: Regex,
    pub category: Category,
    pub base_severity: Severity,
    /// Remediation step with `{WORKLOAD_TYPE}`/`{WORKLOAD_NAME}`/`{NAMESPACE}` placeholders
    pub next_step_template: String,
}

impl LogPattern {
    /// Whether a single line matches this pattern.
    #[must_use]
    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }

    /// Label used in issue titles.
    #[must_use]
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.regex.as_str())
    }

    /// The remediation step with placeholders filled in, if the pattern has one.
    #[must_use]
    pub fn render_next_step(&self, workload: &WorkloadRef) -> Option<String> {
        let template = self.next_step_template.trim();
        (!template.is_empty()).then(|| workload.render(template))
    }
}

/// Source format of a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CatalogFormat {
    #[default]
    Json,
    Yaml,
}

impl CatalogFormat {
    /// Pick a format from a file extension (`.yaml`/`.yml` are YAML, everything else JSON).
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Self::Yaml
            }
            _ => Self::Json,
        }
    }
}

/// Catalog record as written on disk; every field optional so missing ones
/// can be reported by name.
#[derive(Debug, Deserialize)]
struct RawPattern {
    #[serde(rename = "match")]
    pattern: Option<String>,
    category: Option<String>,
    severity: Option<i64>,
    #[serde(default, alias = "next_steps")]
    next_step: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCatalog {
    List(Vec<RawPattern>),
    Wrapped { patterns: Vec<RawPattern> },
}

impl RawCatalog {
    fn into_records(self) -> Vec<RawPattern> {
        match self {
            Self::List(records) | Self::Wrapped { patterns: records } => records,
        }
    }
}

/// Immutable, ordered set of patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternCatalog {
    patterns: Vec<LogPattern>,
}

impl PatternCatalog {
    /// Parse and compile a catalog from source text.
    pub fn load(source: &str, format: CatalogFormat) -> Result<Self, ConfigError> {
        let raw: RawCatalog = match format {
            CatalogFormat::Json => serde_json::from_str(source)?,
            CatalogFormat::Yaml => serde_yaml::from_str(source)?,
        };

        let patterns = raw
            .into_records()
            .into_iter()
            .enumerate()
            .map(|(index, record)| compile(index, record))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(patterns = patterns.len(), "Compiled pattern catalog");
        Ok(Self { patterns })
    }

    /// Load a catalog file, choosing the format from its extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::load(&source, CatalogFormat::from_path(path))?;
        info!(
            path = %path.display(),
            patterns = catalog.len(),
            "Loaded pattern catalog"
        );
        Ok(catalog)
    }

    /// The catalog shipped with the crate.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::load(BUILTIN_CATALOG, CatalogFormat::Json)
    }

    /// Patterns of one category, in catalog order.
    #[must_use]
    pub fn lookup_by_category(&self, category: &str) -> Vec<&LogPattern> {
        self.patterns
            .iter()
            .filter(|pattern| pattern.category.is(category))
            .collect()
    }

    /// Distinct categories in first-seen order.
    #[must_use]
    pub fn categories(&self) -> Vec<&Category> {
        let mut seen: Vec<&Category> = Vec::new();
        for pattern in &self.patterns {
            if !seen.iter().any(|c| c.is(pattern.category.as_str())) {
                seen.push(&pattern.category);
            }
        }
        seen
    }

    #[must_use]
    pub fn get(&self, id: PatternId) -> Option<&LogPattern> {
        self.patterns.get(id.0)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Compile one raw record into a pattern.
fn compile(index: usize, record: RawPattern) -> Result<LogPattern, ConfigError> {
    let pattern = record
        .pattern
        .filter(|p| !p.is_empty())
        .ok_or(ConfigError::MissingField {
            index,
            field: "match",
        })?;
    let category = record
        .category
        .filter(|c| !c.trim().is_empty())
        .ok_or(ConfigError::MissingField {
            index,
            field: "category",
        })?;
    let value = record.severity.ok_or(ConfigError::MissingField {
        index,
        field: "severity",
    })?;
    let base_severity = u8::try_from(value)
        .ok()
        .and_then(|v| Severity::try_from(v).ok())
        .ok_or(ConfigError::InvalidSeverity { index, value })?;

    let regex = RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|source| ConfigError::InvalidRegex { index, source })?;

    Ok(LogPattern {
        id: PatternId(index),
        name: record.name,
        regex,
        category: Category::new(category.trim()),
        base_severity,
        next_step_template: record.next_step.unwrap_or_default(),
    })
}
