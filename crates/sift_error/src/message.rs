use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
  pub file: String,
  pub line: u32,
  pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildMessage {
  pub message: String,
  pub location: Option<SourceLocation>,
}

impl std::fmt::Display for BuildMessage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match &self.location {
      Some(loc) => write!(f, "{}:{}:{}: {}", loc.file, loc.line, loc.column, self.message),
      None => write!(f, "{}", self.message),
    }
  }
}

/// Non-throwing diagnostic channel. Reporting through the sink never aborts
/// the surrounding scan.
pub trait MessageSink: Send + Sync {
  fn error(&self, message: &str, location: Option<SourceLocation>);
}

/// Collecting sink. Callers drain it after a scan to decide whether the
/// build as a whole failed.
#[derive(Debug, Default)]
pub struct DiagnosticLog {
  messages: Mutex<Vec<BuildMessage>>,
}

impl DiagnosticLog {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_empty(&self) -> bool {
    self.messages.lock().expect("diagnostic log poisoned").is_empty()
  }

  pub fn take(&self) -> Vec<BuildMessage> {
    std::mem::take(&mut *self.messages.lock().expect("diagnostic log poisoned"))
  }
}

impl MessageSink for DiagnosticLog {
  fn error(&self, message: &str, location: Option<SourceLocation>) {
    self
      .messages
      .lock()
      .expect("diagnostic log poisoned")
      .push(BuildMessage { message: message.to_string(), location });
  }
}

#[test]
fn test_diagnostic_log_collects_in_order() {
  let log = DiagnosticLog::new();
  log.error("first", None);
  log.error(
    "second",
    Some(SourceLocation { file: "main.js".into(), line: 3, column: 7 }),
  );

  let messages = log.take();
  assert_eq!(messages.len(), 2);
  assert_eq!(messages[0].message, "first");
  assert_eq!(messages[1].to_string(), "main.js:3:7: second");
  assert!(log.is_empty());
}
