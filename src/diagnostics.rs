use chrono::Local;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Default number of diagnostics kept in memory
pub const DEFAULT_CAPACITY: usize = 1000;

/// Where a best-effort condition was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Ingest,
    Compile,
    Projection,
    Session,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Component::Ingest => "ingest",
            Component::Compile => "compile",
            Component::Projection => "projection",
            Component::Session => "session",
        };
        f.write_str(name)
    }
}

/// A non-fatal condition that degraded a result instead of failing it
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub timestamp: String,
    pub component: Component,
    /// Column or operator the condition is about, when there is one
    pub subject: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(component: Component, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now().format("%H:%M:%S.%3f").to_string(),
            component,
            subject: None,
            message: message.into(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Format for display
    pub fn format_for_display(&self) -> String {
        match &self.subject {
            Some(subject) => format!(
                "[{}] {} ({}) {}",
                self.timestamp, self.component, subject, self.message
            ),
            None => format!("[{}] {} {}", self.timestamp, self.component, self.message),
        }
    }
}

/// Bounded ring buffer of diagnostics; oldest entries are evicted first
#[derive(Clone)]
pub struct DiagnosticLog {
    entries: Arc<Mutex<VecDeque<Diagnostic>>>,
    capacity: usize,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)))),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Diagnostic>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, diagnostic: Diagnostic) {
        let mut entries = self.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(diagnostic);
    }

    pub fn extend<I: IntoIterator<Item = Diagnostic>>(&self, diagnostics: I) {
        for diagnostic in diagnostics {
            self.push(diagnostic);
        }
    }

    pub fn get_recent(&self, count: usize) -> Vec<Diagnostic> {
        let entries = self.lock();
        let skip = entries.len().saturating_sub(count);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DiagnosticLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticLog")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
