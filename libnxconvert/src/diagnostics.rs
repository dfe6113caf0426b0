use std::fmt;

use indexmap::IndexMap;

/// How bad a diagnostic is. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// The kind of problem a diagnostic reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCode {
    // Mapping config
    UnknownPrefix,
    MalformedExpression,
    WildcardWithoutDims,
    // Resolution
    MissingRequired,
    UnresolvedExpression,
    ConflictOnWrite,
    // Validation
    TypeMismatch,
    EnumViolation,
    ShapeMismatch,
    UnitCategoryMissing,
    UnitMismatch,
    Deprecated,
    Undocumented,
    // Writer
    VirtualShapeMismatch,
    WriteError,
    LinkTargetMissing,
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub path: String,
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
}

impl Diagnostic {
    pub fn new(path: &str, severity: Severity, code: DiagnosticCode, message: String) -> Self {
        Self {
            path: path.to_string(),
            severity,
            code,
            message,
        }
    }

    pub fn error(path: &str, code: DiagnosticCode, message: String) -> Self {
        Self::new(path, Severity::Error, code, message)
    }

    pub fn warning(path: &str, code: DiagnosticCode, message: String) -> Self {
        Self::new(path, Severity::Warning, code, message)
    }

    pub fn info(path: &str, code: DiagnosticCode, message: String) -> Self {
        Self::new(path, Severity::Info, code, message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.severity, self.path, self.code, self.message
        )
    }
}

/// Collected diagnostics of one conversion.
///
/// Diagnostics are keyed by `(path, code)`; adding the same pair twice keeps the
/// more severe of the two, so the resolver and the validator can both report a
/// missing required concept without it showing up twice.
#[derive(Debug, Clone, Default)]
pub struct Report {
    diagnostics: IndexMap<(String, DiagnosticCode), Diagnostic>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        let key = (diagnostic.path.clone(), diagnostic.code);
        match self.diagnostics.get_mut(&key) {
            Some(existing) if existing.severity >= diagnostic.severity => (),
            Some(existing) => *existing = diagnostic,
            None => {
                self.diagnostics.insert(key, diagnostic);
            }
        }
    }

    pub fn merge(&mut self, other: Report) {
        for (_, diagnostic) in other.diagnostics {
            self.push(diagnostic);
        }
    }

    /// Downgrade every error to a warning
    pub fn make_permissive(&mut self) {
        for diagnostic in self.diagnostics.values_mut() {
            if diagnostic.severity == Severity::Error {
                diagnostic.severity = Severity::Warning;
            }
        }
    }

    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.values()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .values()
            .filter(|d| d.severity == severity)
            .count()
    }

    pub fn has(&self, path: &str, code: DiagnosticCode) -> bool {
        self.diagnostics
            .contains_key(&(path.to_string(), code))
    }

    pub fn find(&self, path: &str, code: DiagnosticCode) -> Option<&Diagnostic> {
        self.diagnostics.get(&(path.to_string(), code))
    }

    pub fn with_code(&self, code: DiagnosticCode) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.values().filter(move |d| d.code == code)
    }

    /// True when no diagnostic has error severity
    pub fn success(&self) -> bool {
        self.count(Severity::Error) == 0
    }

    /// Send every diagnostic to the log at a matching level
    pub fn log(&self) {
        for diagnostic in self.diagnostics.values() {
            match diagnostic.severity {
                Severity::Error => log::error!("{diagnostic}"),
                Severity::Warning => log::warn!("{diagnostic}"),
                Severity::Info => log::info!("{diagnostic}"),
            }
        }
        log::info!("{}", self.summary());
    }

    pub fn summary(&self) -> String {
        format!(
            "{} errors, {} warnings, {} infos",
            self.count(Severity::Error),
            self.count(Severity::Warning),
            self.count(Severity::Info)
        )
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diagnostic in self.diagnostics.values() {
            writeln!(f, "{diagnostic}")?;
        }
        write!(f, "{}", self.summary())
    }
}
