//! Export diagnostics
//!
//! Two pass-scoped collectors live here:
//! - [`ErrorLedger`] - per-vertex validation problems keyed by category and
//!   object, read back by the caller to highlight offending vertices.
//! - [`Report`] - every log record of the pass, grouped by severity for the
//!   end-of-pass summary. Records are mirrored to `tracing` as they arrive.

use std::collections::BTreeMap;
use std::fmt;

/// Ledger category: a requested UV set is missing
pub const MISSING_UV: &str = "missing UV";
/// Ledger category: the second UV set is missing
pub const MISSING_UV2: &str = "missing UV2";
/// Ledger category: vertex colors are missing
pub const MISSING_COLOR: &str = "missing color";
/// Ledger category: a skinned vertex has no bone weights
pub const MISSING_WEIGHTS: &str = "missing weights";
/// Ledger category: bone weights sum to zero or are not finite
pub const INVALID_WEIGHTS: &str = "invalid weights";
/// Ledger category: more influences than the per-vertex limit
pub const TOO_MANY_WEIGHTS: &str = "too many bones per vertex";
/// Ledger category: a polygon references a vertex that does not exist
pub const INVALID_POLYGON: &str = "invalid polygon";
/// Ledger category: a material graph node the exporter cannot translate
pub const UNSUPPORTED_NODE: &str = "unsupported shader node";

/// Categorized per-vertex validation problems
///
/// Object names are interned; entries store `(object index, vertex index)`.
#[derive(Debug, Default, Clone)]
pub struct ErrorLedger {
    categories: BTreeMap<String, Vec<(usize, u32)>>,
    objects: Vec<String>,
}

impl ErrorLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn object_key(&mut self, name: &str) -> usize {
        match self.objects.iter().position(|o| o == name) {
            Some(index) => index,
            None => {
                self.objects.push(name.to_string());
                self.objects.len() - 1
            }
        }
    }

    /// Register a category without entries (dropped again by [`compact`](Self::compact))
    pub fn touch(&mut self, category: &str) {
        self.categories.entry(category.to_string()).or_default();
    }

    pub fn record(&mut self, category: &str, object: &str, vertex: u32) {
        let key = self.object_key(object);
        self.categories
            .entry(category.to_string())
            .or_default()
            .push((key, vertex));
    }

    /// Registered categories in name order
    pub fn names_with_errors(&self) -> Vec<&str> {
        self.categories.keys().map(String::as_str).collect()
    }

    pub fn entries_for(&self, category: &str) -> Vec<(&str, u32)> {
        self.categories
            .get(category)
            .map(|entries| {
                entries
                    .iter()
                    .map(|&(object, vertex)| (self.objects[object].as_str(), vertex))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn count(&self, category: &str) -> usize {
        self.categories.get(category).map_or(0, Vec::len)
    }

    /// Vertices of one category grouped per object, for selection feedback
    pub fn vertices_by_object(&self, category: &str) -> Vec<(&str, Vec<u32>)> {
        let mut grouped: BTreeMap<usize, Vec<u32>> = BTreeMap::new();
        if let Some(entries) = self.categories.get(category) {
            for &(object, vertex) in entries {
                grouped.entry(object).or_default().push(vertex);
            }
        }
        grouped
            .into_iter()
            .map(|(object, mut vertices)| {
                vertices.sort_unstable();
                vertices.dedup();
                (self.objects[object].as_str(), vertices)
            })
            .collect()
    }

    pub fn total(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn clear(&mut self) {
        self.categories.clear();
        self.objects.clear();
    }

    /// Drop categories that have no entries
    pub fn compact(&mut self) {
        self.categories.retain(|_, entries| !entries.is_empty());
    }
}

/// Severity of a report record, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Critical,
    Error,
    Warning,
    Info,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::Error,
        Severity::Warning,
        Severity::Info,
    ];
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Critical => "CRITICAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub severity: Severity,
    pub message: String,
}

/// Log records of one export pass
#[derive(Debug, Default, Clone)]
pub struct Report {
    records: Vec<LogRecord>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Critical => tracing::error!(critical = true, "{}", message),
            Severity::Error => tracing::error!("{}", message),
            Severity::Warning => tracing::warn!("{}", message),
            Severity::Info => tracing::info!("{}", message),
        }
        self.records.push(LogRecord { severity, message });
    }

    pub fn critical(&mut self, message: impl Into<String>) {
        self.push(Severity::Critical, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Severity::Error, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(Severity::Warning, message);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Severity::Info, message);
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.records.iter().filter(|r| r.severity == severity).count()
    }

    /// True when any critical or error record was logged
    pub fn has_failures(&self) -> bool {
        self.records
            .iter()
            .any(|r| matches!(r.severity, Severity::Critical | Severity::Error))
    }

    /// Records grouped by severity, most severe first, arrival order inside a group
    pub fn grouped(&self) -> Vec<(Severity, Vec<&LogRecord>)> {
        Severity::ALL
            .iter()
            .map(|&severity| {
                let records = self
                    .records
                    .iter()
                    .filter(|r| r.severity == severity)
                    .collect::<Vec<_>>();
                (severity, records)
            })
            .filter(|(_, records)| !records.is_empty())
            .collect()
    }

    /// Multi-line summary for the end of the pass
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for (severity, records) in self.grouped() {
            out.push_str(&format!("{} ({})\n", severity, records.len()));
            for record in records {
                out.push_str(&format!("  {}\n", record.message));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_record_and_lookup() {
        let mut ledger = ErrorLedger::new();
        ledger.record(MISSING_UV, "Cube", 0);
        ledger.record(MISSING_UV, "Cube", 1);
        ledger.record(MISSING_WEIGHTS, "Arm", 7);

        assert_eq!(ledger.names_with_errors(), vec![MISSING_UV, MISSING_WEIGHTS]);
        assert_eq!(ledger.entries_for(MISSING_UV), vec![("Cube", 0), ("Cube", 1)]);
        assert_eq!(ledger.entries_for("unknown"), vec![]);
        assert_eq!(ledger.total(), 3);
    }

    #[test]
    fn test_ledger_compact_drops_empty_categories() {
        let mut ledger = ErrorLedger::new();
        ledger.touch(MISSING_COLOR);
        ledger.record(MISSING_UV, "Cube", 3);
        assert_eq!(ledger.names_with_errors().len(), 2);

        ledger.compact();
        assert_eq!(ledger.names_with_errors(), vec![MISSING_UV]);

        ledger.clear();
        assert!(ledger.is_empty());
        assert!(ledger.names_with_errors().is_empty());
    }

    #[test]
    fn test_vertices_by_object_dedups() {
        let mut ledger = ErrorLedger::new();
        ledger.record(INVALID_WEIGHTS, "B", 4);
        ledger.record(INVALID_WEIGHTS, "A", 2);
        ledger.record(INVALID_WEIGHTS, "B", 1);
        ledger.record(INVALID_WEIGHTS, "B", 4);

        let grouped = ledger.vertices_by_object(INVALID_WEIGHTS);
        assert_eq!(grouped, vec![("B", vec![1, 4]), ("A", vec![2])]);
    }

    #[test]
    fn test_report_grouping() {
        let mut report = Report::new();
        report.info("started");
        report.error("write failed");
        report.critical("duplicate key");
        report.info("done");

        let grouped = report.grouped();
        assert_eq!(grouped.len(), 3);
        assert_eq!(grouped[0].0, Severity::Critical);
        assert_eq!(grouped[2].1.len(), 2);
        assert!(report.has_failures());
        assert!(report.summary().starts_with("CRITICAL (1)"));
    }
}
