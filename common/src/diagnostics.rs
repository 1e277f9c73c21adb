use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Error,
    Warning,
    Info,
}

/// Whether a line reports something that is fine, broken, or just context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Info,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub severity: Severity,
    pub outcome: Outcome,
    pub depth: usize,
    pub text: String,
}

impl DiagnosticEvent {
    pub fn new<S: Into<String>>(severity: Severity, outcome: Outcome, depth: usize, text: S) -> Self {
        DiagnosticEvent {
            severity,
            outcome,
            depth,
            text: text.into(),
        }
    }

    pub fn critical<S: Into<String>>(depth: usize, text: S) -> Self {
        Self::new(Severity::Critical, Outcome::None, depth, text)
    }

    pub fn error<S: Into<String>>(depth: usize, text: S) -> Self {
        Self::new(Severity::Error, Outcome::None, depth, text)
    }

    pub fn warning<S: Into<String>>(depth: usize, text: S) -> Self {
        Self::new(Severity::Warning, Outcome::None, depth, text)
    }

    pub fn info<S: Into<String>>(depth: usize, text: S) -> Self {
        Self::new(Severity::Info, Outcome::Info, depth, text)
    }

    pub fn pass<S: Into<String>>(depth: usize, text: S) -> Self {
        Self::new(Severity::Info, Outcome::Pass, depth, text)
    }

    pub fn fail<S: Into<String>>(depth: usize, text: S) -> Self {
        Self::new(Severity::Error, Outcome::Fail, depth, text)
    }

    pub fn is_pass(&self) -> bool {
        self.outcome == Outcome::Pass
    }

    pub fn is_fail(&self) -> bool {
        self.outcome == Outcome::Fail
    }
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:indent$}{}", "", self.text, indent = self.depth * 2)
    }
}

/// Receives events as soon as the classifier emits them
pub trait EventSink {
    fn emit(&mut self, event: DiagnosticEvent);
}

impl EventSink for Vec<DiagnosticEvent> {
    fn emit(&mut self, event: DiagnosticEvent) {
        self.push(event);
    }
}
