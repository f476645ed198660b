//! Foreground-document probe contract, retry policy, and the Apple Books
//! accessibility-tree implementation.

use std::fmt;
use std::process::Command;
use std::time::Duration;

use log::{debug, warn};
use serde_json::Value;

use crate::protocol::{DocumentSnapshot, DocumentState};

/// Bound on transient snapshot retries before escalating to terminal.
pub const MAX_SNAPSHOT_ATTEMPTS: usize = 8;
pub const SNAPSHOT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Accessibility traversal hits a moving target; these failure messages mean
/// "the tree shifted under us, try again", anything else is terminal.
const TRANSIENT_FAILURE_MARKERS: [&str; 3] = [
    "Invalid index",
    "No valid main window found",
    "Can't get object",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// Window/index churn during traversal; worth retrying.
    Transient(String),
    /// Aborts the current poll cycle.
    Terminal(String),
}

impl ProbeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(message) => write!(f, "transient probe error: {message}"),
            Self::Terminal(message) => write!(f, "probe error: {message}"),
        }
    }
}

/// Extraction surface for the host application's foreground document.
pub trait DocumentProbe {
    fn state(&mut self) -> Result<DocumentState, ProbeError>;
    fn snapshot(&mut self) -> Result<DocumentSnapshot, ProbeError>;
}

/// Wraps a probe with the bounded transient-retry policy.
///
/// Success on attempt k performs exactly k inner calls; exhausting the bound
/// escalates to a terminal error; non-transient errors pass through
/// immediately.
pub struct RetryingProbe<P> {
    inner: P,
    retry_delay: Duration,
}

impl<P: DocumentProbe> RetryingProbe<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            retry_delay: SNAPSHOT_RETRY_DELAY,
        }
    }
}

impl<P: DocumentProbe> DocumentProbe for RetryingProbe<P> {
    fn state(&mut self) -> Result<DocumentState, ProbeError> {
        self.inner.state()
    }

    fn snapshot(&mut self) -> Result<DocumentSnapshot, ProbeError> {
        let mut attempts = 0;
        loop {
            match self.inner.snapshot() {
                Ok(snapshot) => return Ok(snapshot),
                Err(error) if error.is_transient() => {
                    attempts += 1;
                    warn!("Snapshot attempt {} failed: {}", attempts, error);
                    if attempts >= MAX_SNAPSHOT_ATTEMPTS {
                        return Err(ProbeError::Terminal(
                            "failed to retrieve document and page after multiple attempts"
                                .to_string(),
                        ));
                    }
                    std::thread::sleep(self.retry_delay);
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Library-shelf window titles that never name an open document.
const STATE_SCRIPT: &str = r#"
(() => {
  const excludedTitles = [
    "Home", "Book Store", "Audiobook Store", "All", "Want to Read",
    "Finished", "Books", "Audiobooks", "PDFs", "My Samples"
  ];
  const SystemEvents = Application("System Events");
  const isRunning = SystemEvents.processes["Books"].exists();
  if (!isRunning) {
    return JSON.stringify({ running: false, titled: false });
  }
  const windows = SystemEvents.processes.byName("Books").windows();
  const mainWindow = windows.find((window) => !excludedTitles.includes(window.title()));
  if (!mainWindow || !mainWindow.title() || windows.length === 0) {
    return JSON.stringify({ running: true, titled: false });
  }
  return JSON.stringify({ running: true, titled: true });
})();
"#;

/// Depth-first traversal over the polymorphic accessibility node graph: no
/// fixed schema is assumed, only `description()` and `uiElements()`.
const SNAPSHOT_SCRIPT: &str = r#"
(() => {
  const excludedTitles = [
    "Home", "Book Store", "Audiobook Store", "All", "Want to Read",
    "Finished", "Books", "Audiobooks", "PDFs", "My Samples"
  ];
  const SystemEvents = Application("System Events");
  const windows = SystemEvents.processes.byName("Books").windows();
  if (!windows.length) {
    throw new Error("No windows found");
  }
  const mainWindow = windows.find((window) => !excludedTitles.includes(window.title()));
  if (!mainWindow) {
    throw new Error("No valid main window found");
  }
  const title = mainWindow.title();
  if (!title) {
    throw new Error("Main window has no title");
  }

  function findDescribedElement(element, accept) {
    if (element.description && accept(element.description().toLowerCase())) {
      return element;
    }
    const children = element.uiElements();
    for (let i = 0; i < children.length; i++) {
      const found = findDescribedElement(children[i], accept);
      if (found) {
        return found;
      }
    }
    return null;
  }

  const pageElement = findDescribedElement(
    mainWindow,
    (text) => text.includes("page") && !text.includes("page chooser")
  );
  const chapterElement = findDescribedElement(
    mainWindow,
    (text) =>
      text.includes("pages left in chapter") || text.includes("last page in chapter")
  );

  return JSON.stringify({
    title: title,
    page: pageElement ? pageElement.description() : "No Page Element Found",
    chapter: chapterElement ? chapterElement.description() : "No Chapter Info Found"
  });
})();
"#;

/// Classifies an osascript failure message by its transient markers.
fn classify_probe_failure(message: &str) -> ProbeError {
    if TRANSIENT_FAILURE_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
    {
        ProbeError::Transient(message.to_string())
    } else {
        ProbeError::Terminal(message.to_string())
    }
}

/// Probes the Apple Books UI through `osascript -l JavaScript`.
pub struct AppleBooksProbe;

impl AppleBooksProbe {
    pub fn new() -> Self {
        Self
    }

    fn run_jxa(script: &str) -> Result<Value, ProbeError> {
        let output = Command::new("osascript")
            .args(["-l", "JavaScript", "-e", script])
            .output()
            .map_err(|error| {
                ProbeError::Terminal(format!("failed to launch osascript: {error}"))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(classify_probe_failure(&stderr));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str(stdout.trim()).map_err(|error| {
            ProbeError::Terminal(format!("unreadable probe output: {error}"))
        })
    }
}

impl Default for AppleBooksProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentProbe for AppleBooksProbe {
    fn state(&mut self) -> Result<DocumentState, ProbeError> {
        debug!("Probing host application state");
        let value = Self::run_jxa(STATE_SCRIPT)?;
        Ok(DocumentState {
            is_host_running: value["running"].as_bool().unwrap_or(false),
            has_titled_document: value["titled"].as_bool().unwrap_or(false),
        })
    }

    fn snapshot(&mut self) -> Result<DocumentSnapshot, ProbeError> {
        debug!("Scanning accessibility tree for the open document");
        let value = Self::run_jxa(SNAPSHOT_SCRIPT)?;
        let title = value["title"]
            .as_str()
            .filter(|title| !title.is_empty())
            .ok_or_else(|| ProbeError::Terminal("snapshot is missing a title".to_string()))?;
        Ok(DocumentSnapshot {
            title: title.to_string(),
            page_label: value["page"].as_str().unwrap_or_default().to_string(),
            chapter_progress_label: value["chapter"].as_str().unwrap_or_default().to_string(),
        })
    }
}
