//! Stack trace extraction.
//!
//! Each container log is fed line by line through a two-state capture
//! automaton ([`TraceCapture`]):
//!
//! - `Idle`: a line matching a start signature opens a trace. The ring buffer
//!   of recent lines is copied in first (oldest first) as leading context.
//! - `Capturing`: continuation lines (call frames, `file:line` references)
//!   are appended. One non-blank non-frame line directly after a captured line
//!   is accepted as well, so trailing exception messages stay attached. A
//!   blank line, or a second unrecognised line, closes the trace.
//!
//! Start and continuation signatures come from injectable [`SignatureSet`]s,
//! one per language family.
//!
//! [`StackTraceExtractor::scan`] reports one issue per closed trace and also
//! runs the category scanner over the trace category, so matching lines that
//! never opened a trace (e.g. `OOMKilled`) are still reported. Lines already
//! inside a captured trace of the same container are not reported twice.

use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::catalog::{LogPattern, PatternCatalog, PatternId};
use crate::config::ScanConfig;
use crate::issues::{Issue, IssueBuilder};
use crate::scanner::CategoryScanner;
use crate::timestamp::strip_timestamp;
use crate::types::{LogRecord, ScanResult, WorkloadRef};

/// Start and continuation predicates for one language family.
#[derive(Debug, Clone)]
pub struct SignatureSet {
    pub family: String,
    pub start: Vec<Regex>,
    pub continuation: Vec<Regex>,
}

impl SignatureSet {
    /// Compile a signature set from regex sources.
    pub fn new(
        family: impl Into<String>,
        start: &[&str],
        continuation: &[&str],
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            family: family.into(),
            start: start.iter().map(|p| Regex::new(p)).collect::<Result<_, _>>()?,
            continuation: continuation
                .iter()
                .map(|p| Regex::new(p))
                .collect::<Result<_, _>>()?,
        })
    }

    #[must_use]
    pub fn is_start(&self, line: &str) -> bool {
        self.start.iter().any(|re| re.is_match(line))
    }

    #[must_use]
    pub fn is_continuation(&self, line: &str) -> bool {
        self.continuation.iter().any(|re| re.is_match(line))
    }
}

fn builtin(family: &str, start: &[&str], continuation: &[&str]) -> SignatureSet {
    SignatureSet::new(family, start, continuation).expect("built-in trace signatures are valid")
}

static BUILTIN_SIGNATURES: LazyLock<Vec<SignatureSet>> = LazyLock::new(|| {
    vec![
        builtin(
            "jvm",
            &[
                r"^Exception in thread ",
                r"^\s*Caused by: ",
                r"\b[\w$.]*(Exception|Error|Throwable)(: |:$|$)",
            ],
            &[
                r"^\s+at [\w$./<>\[\]-]+\(.*\)",
                r"^\s*\.\.\. \d+ (more|common frames omitted)",
                r"^\s*(Caused by|Suppressed): ",
            ],
        ),
        builtin(
            "python",
            &[r"Traceback \(most recent call last\)"],
            &[
                r#"^\s+File ".+", line \d+"#,
                r"^\s{4,}\S",
                r"^During handling of the above exception",
                r"^The above exception was the direct cause",
            ],
        ),
        builtin(
            "go",
            &[r"^panic: ", r"^fatal error: ", r"^goroutine \d+ \[[\w ,]+\]:"],
            &[
                r"^goroutine \d+ \[[\w ,]+\]:",
                r"^\s+\S+\.go:\d+",
                r"^[\w./*()-]+\(.*\)$",
                r"^created by ",
                r"^\[signal ",
            ],
        ),
        builtin(
            "node",
            &[
                r"^(Uncaught )?\w*Error: ",
                r"UnhandledPromiseRejection",
            ],
            &[r"^\s+at .*:\d+:\d+\)?$", r"^\s+at (async )?\S+ \(.*\)$"],
        ),
        builtin(
            "dotnet",
            &[r"^Unhandled exception\.", r"^\s*System\.[\w.]+Exception"],
            &[
                r"^\s+at .+ in .+:line \d+",
                r"^\s+at [\w.<>`|\[\]]+\(.*\)",
                r"^\s*--- End of (inner exception )?stack trace",
                r"^\s*---> ",
            ],
        ),
        builtin(
            "rust",
            &[r"^thread '.*' panicked at", r"^stack backtrace:"],
            &[
                r"^\s+\d+: \S",
                r"^\s+at \S+:\d+(:\d+)?$",
                r"^stack backtrace:",
                r"^note: ",
            ],
        ),
        builtin(
            "generic",
            &[
                r"(?i)\bexception\b",
                r"(?i)\btraceback\b",
                r"(?i)\bpanic(ked)?\b",
                r"(?i)\b(segmentation )?fault\b",
                r"(?i)\bSIG(SEGV|ABRT|BUS)\b",
            ],
            &[r"^\s+(at|from|in) \S"],
        ),
    ]
});

/// The built-in signature sets (JVM, Python, Go, Node.js, .NET, Rust and a generic fallback).
#[must_use]
pub fn builtin_signatures() -> &'static [SignatureSet] {
    &BUILTIN_SIGNATURES
}

/// Extensions treated as source files when looking for `file:line` references.
const SOURCE_EXTENSIONS: &str =
    "java|kt|kts|scala|groovy|clj|py|go|js|mjs|cjs|ts|tsx|jsx|rb|rs|cs|vb|fs|php|c|cc|cpp|cxx|h|hpp|swift|ex|exs|erl|dart";

static PYTHON_FRAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"File "([^"]+)", line (\d+)"#).expect("valid regex"));

static DOTNET_FRAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"in (\S+):line (\d+)").expect("valid regex"));

static FILE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"([\w$./\\-]+\.(?:{SOURCE_EXTENSIONS})):(\d+)\b"
    ))
    .expect("valid regex")
});

/// First `file:line` reference in a line, normalized to `file:line`.
#[must_use]
pub fn find_source_reference(line: &str) -> Option<String> {
    [&*PYTHON_FRAME, &*DOTNET_FRAME, &*FILE_LINE]
        .iter()
        .find_map(|re| re.captures(line))
        .map(|caps| format!("{}:{}", &caps[1], &caps[2]))
}

/// A captured stack trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClosedTrace {
    pub pod: String,
    pub container: String,
    /// Leading context followed by the trace itself
    pub lines: Vec<String>,
    /// Number of leading context lines in `lines`
    pub context_len: usize,
    /// First `file:line` reference inside the trace
    pub source_file: Option<String>,
}

impl ClosedTrace {
    fn new(pod: &str, container: &str, lines: Vec<String>, context_len: usize) -> Self {
        let source_file = lines[context_len..]
            .iter()
            .find_map(|line| find_source_reference(line));
        Self {
            pod: pod.to_string(),
            container: container.to_string(),
            lines,
            context_len,
            source_file,
        }
    }

    /// `pod/container` label.
    #[must_use]
    pub fn source(&self) -> String {
        format!("{}/{}", self.pod, self.container)
    }

    /// Trace lines without leading context.
    #[must_use]
    pub fn trace_lines(&self) -> &[String] {
        &self.lines[self.context_len..]
    }

    /// The line that opened the trace.
    #[must_use]
    pub fn headline(&self) -> &str {
        self.trace_lines().first().map_or("", String::as_str)
    }
}

#[derive(Debug)]
struct OpenTrace {
    lines: Vec<String>,
    context_len: usize,
    /// Whether the last appended line matched no signature
    last_was_loose: bool,
}

#[derive(Debug)]
enum CaptureState {
    Idle,
    Capturing(OpenTrace),
}

/// Capture automaton for one pod/container stream.
#[derive(Debug)]
pub struct TraceCapture<'s> {
    signatures: &'s [SignatureSet],
    pod: String,
    container: String,
    recent: VecDeque<String>,
    capacity: usize,
    state: CaptureState,
}

impl<'s> TraceCapture<'s> {
    pub fn new(
        signatures: &'s [SignatureSet],
        pod: impl Into<String>,
        container: impl Into<String>,
        context_lines: usize,
    ) -> Self {
        Self {
            signatures,
            pod: pod.into(),
            container: container.into(),
            recent: VecDeque::with_capacity(context_lines),
            capacity: context_lines,
            state: CaptureState::Idle,
        }
    }

    #[must_use]
    pub fn is_capturing(&self) -> bool {
        matches!(self.state, CaptureState::Capturing(_))
    }

    fn is_start(&self, line: &str) -> bool {
        self.signatures.iter().any(|s| s.is_start(line))
    }

    fn is_continuation(&self, line: &str) -> bool {
        self.signatures.iter().any(|s| s.is_continuation(line))
    }

    /// Feed one line. Returns a trace if this line closed one.
    pub fn feed(&mut self, raw: &str) -> Option<ClosedTrace> {
        let line = strip_timestamp(raw);
        let blank = line.trim().is_empty();

        let closed = match std::mem::replace(&mut self.state, CaptureState::Idle) {
            CaptureState::Idle => {
                self.try_open(raw, line);
                None
            }
            CaptureState::Capturing(open) if blank => Some(self.close(open)),
            CaptureState::Capturing(mut open) => {
                if self.is_continuation(line) || self.is_start(line) {
                    open.lines.push(raw.to_string());
                    open.last_was_loose = false;
                    self.state = CaptureState::Capturing(open);
                    None
                } else if !open.last_was_loose {
                    open.lines.push(raw.to_string());
                    open.last_was_loose = true;
                    self.state = CaptureState::Capturing(open);
                    None
                } else {
                    let closed = self.close(open);
                    self.try_open(raw, line);
                    Some(closed)
                }
            }
        };

        self.remember(raw);
        closed
    }

    /// Close a trace left open at end of stream.
    pub fn finish(mut self) -> Option<ClosedTrace> {
        match std::mem::replace(&mut self.state, CaptureState::Idle) {
            CaptureState::Idle => None,
            CaptureState::Capturing(open) => Some(self.close(open)),
        }
    }

    fn try_open(&mut self, raw: &str, line: &str) {
        if !self.is_start(line) {
            return;
        }
        let mut lines: Vec<String> = self.recent.iter().cloned().collect();
        let context_len = lines.len();
        lines.push(raw.to_string());
        debug!(pod = %self.pod, container = %self.container, context_len, "Trace capture started");
        self.state = CaptureState::Capturing(OpenTrace {
            lines,
            context_len,
            last_was_loose: false,
        });
    }

    fn close(&self, open: OpenTrace) -> ClosedTrace {
        let trace = ClosedTrace::new(&self.pod, &self.container, open.lines, open.context_len);
        debug!(
            pod = %self.pod,
            container = %self.container,
            lines = trace.trace_lines().len(),
            source_file = ?trace.source_file,
            "Trace capture closed"
        );
        trace
    }

    fn remember(&mut self, raw: &str) {
        if self.capacity == 0 {
            return;
        }
        if self.recent.len() == self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(raw.to_string());
    }
}

/// Extract every stack trace from a sequence of lines.
#[must_use]
pub fn extract_traces<'l>(
    signatures: &[SignatureSet],
    pod: &str,
    container: &str,
    context_lines: usize,
    lines: impl IntoIterator<Item = &'l str>,
) -> Vec<ClosedTrace> {
    let mut capture = TraceCapture::new(signatures, pod, container, context_lines);
    let mut traces: Vec<ClosedTrace> = lines
        .into_iter()
        .filter_map(|line| capture.feed(line))
        .collect();
    traces.extend(capture.finish());
    traces
}

/// Scanner that turns captured stack traces into issues.
#[derive(Debug, Clone, Copy)]
pub struct StackTraceExtractor<'a> {
    catalog: &'a PatternCatalog,
    config: &'a ScanConfig,
    signatures: &'a [SignatureSet],
}

impl<'a> StackTraceExtractor<'a> {
    /// Extractor using the built-in signature sets.
    pub fn new(catalog: &'a PatternCatalog, config: &'a ScanConfig) -> Self {
        Self::with_signatures(catalog, config, builtin_signatures())
    }

    pub fn with_signatures(
        catalog: &'a PatternCatalog,
        config: &'a ScanConfig,
        signatures: &'a [SignatureSet],
    ) -> Self {
        Self {
            catalog,
            config,
            signatures,
        }
    }

    /// First pattern of the trace category matching any trace line, in catalog order.
    #[must_use]
    pub fn classify(&self, trace: &ClosedTrace) -> Option<&'a LogPattern> {
        self.catalog
            .lookup_by_category(&self.config.trace_category)
            .into_iter()
            .find(|pattern| trace.trace_lines().iter().any(|line| pattern.is_match(line)))
    }

    /// Traces of every record, in record order. Records without logs are skipped.
    #[must_use]
    pub fn extract(&self, records: &[LogRecord]) -> Vec<ClosedTrace> {
        let mut traces = Vec::new();
        for record in records {
            match record.lines() {
                Ok(lines) => traces.extend(extract_traces(
                    self.signatures,
                    &record.pod,
                    &record.container,
                    self.config.context_lines,
                    lines,
                )),
                Err(e) => {
                    warn!(pod = %record.pod, container = %record.container, error = %e, "Skipping container");
                }
            }
        }
        traces
    }

    /// Extract and classify traces, then add trace category matches found outside them.
    #[must_use]
    pub fn scan(&self, workload: &WorkloadRef, records: &[LogRecord]) -> ScanResult {
        let task = self.config.trace_category.as_str();
        info!(containers = records.len(), "Extracting stack traces");
        let builder = IssueBuilder::new(workload, self.config);

        let traces = self.extract(records);
        let classified: Vec<(&ClosedTrace, Option<&'a LogPattern>)> =
            traces.iter().map(|trace| (trace, self.classify(trace))).collect();

        let mut closed_in: BTreeMap<TraceKey<'_>, BTreeSet<String>> = BTreeMap::new();
        for (trace, pattern) in &classified {
            if let Some(key) = TraceKey::of(trace, *pattern) {
                closed_in.entry(key).or_default().insert(trace.source());
            }
        }

        let mut issues: Vec<Issue> = classified
            .iter()
            .map(|(trace, pattern)| {
                let occurrences = TraceKey::of(trace, *pattern)
                    .and_then(|key| closed_in.get(&key))
                    .map_or(1, BTreeSet::len);
                builder.trace_issue(trace, *pattern, occurrences)
            })
            .collect();
        info!(traces = issues.len(), "Stack trace extraction complete");

        let scanner = CategoryScanner::new(self.catalog, self.config);
        let mut hits = scanner.collect(task, records);
        let captured: BTreeSet<(String, &str)> = traces
            .iter()
            .flat_map(|trace| {
                let source = trace.source();
                trace
                    .trace_lines()
                    .iter()
                    .map(move |line| (source.clone(), line.as_str()))
            })
            .collect();
        for pattern_hits in hits.values_mut() {
            for m in &mut pattern_hits.matches {
                let source = m.source();
                m.matched_lines
                    .retain(|line| !captured.contains(&(source.clone(), line.as_str())));
            }
            pattern_hits.matches.retain(|m| !m.matched_lines.is_empty());
        }
        hits.retain(|_, pattern_hits| !pattern_hits.matches.is_empty());
        debug!(patterns = hits.len(), "Trace category matches outside captured traces");
        issues.extend(scanner.build_issues(task, workload, &hits));

        ScanResult::from_issues(task, workload, issues)
    }
}

/// Traces count as the same when they share a classifying pattern, or,
/// unclassified, the same source file reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum TraceKey<'t> {
    Pattern(PatternId),
    File(&'t str),
}

impl<'t> TraceKey<'t> {
    fn of(trace: &'t ClosedTrace, pattern: Option<&LogPattern>) -> Option<Self> {
        match pattern {
            Some(pattern) => Some(Self::Pattern(pattern.id)),
            None => trace.source_file.as_deref().map(Self::File),
        }
    }
}
