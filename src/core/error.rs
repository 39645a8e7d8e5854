// ============================================================================
// pathbind - Errors and the Fault Sink
// ============================================================================
//
// Error taxonomy:
// 1. Configuration errors (BindError) - invalid binding shape, raised
//    synchronously at bind time, never retried.
// 2. Evaluation failures - a nullable segment resolved to nothing. Expected
//    and silent; NOT represented here (see path::Outcome::Failure).
// 3. Evaluation faults (Fault) - an evaluation step errored. Captured,
//    wrapped with provenance (FaultReport) and delivered to the sink; the
//    binding stays re-triggerable.
// 4. Contract violations - programming errors, fail fast with panic!.
//
// No fault is ever allowed to escape a subscription callback into unrelated
// caller code; everything funnels through the CatchFault sink.
// ============================================================================

use std::cell::RefCell;

use thiserror::Error;

// =============================================================================
// CONFIGURATION ERRORS
// =============================================================================

/// Invalid binding shape, detected when the two access paths are classified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// Neither side can act as a write target and neither is a collection.
    #[error("cannot bind `{left} == {right}`: neither side is writable")]
    NeitherSideWritable { left: String, right: String },

    /// A side would be writable but a value conversion hides the settable
    /// member. Reported specifically because it is a common mistake.
    #[error("cannot bind `{path}`: the conversion strips writability, bind the underlying member instead")]
    ConversionStripsWritability { path: String },

    /// An event binding named an event its target never declares.
    #[error("cannot attach to event `{event}`: the target does not declare it")]
    UnknownEvent { event: String },
}

// =============================================================================
// EVALUATION FAULTS
// =============================================================================

/// An exception raised by a single evaluation step (member access, index,
/// conversion, assignment).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct Fault {
    message: String,
    /// The path expression being evaluated when the step faulted, if known.
    path: Option<String>,
}

impl Fault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
        }
    }

    pub fn at(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Attach a path expression if none is recorded yet.
    pub fn with_path(mut self, path: &str) -> Self {
        if self.path.is_none() {
            self.path = Some(path.to_string());
        }
        self
    }
}

/// A fault tagged with the binding that produced it, for diagnosability.
#[derive(Debug, Clone)]
pub struct FaultReport {
    pub binding_id: u64,
    pub fault: Fault,
}

// =============================================================================
// FAULT SINK
// =============================================================================

/// Receives every unhandled fault.
pub trait CatchFault {
    fn catch(&self, report: FaultReport);
}

/// Default sink: re-raises the fault on the caller's thread.
pub struct PanicSink;

impl CatchFault for PanicSink {
    fn catch(&self, report: FaultReport) {
        panic!(
            "unhandled fault in binding #{}: {}",
            report.binding_id, report.fault
        );
    }
}

/// A sink that records faults for later inspection.
pub struct CollectingSink {
    reports: RefCell<Vec<FaultReport>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self {
            reports: RefCell::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.reports.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.borrow().is_empty()
    }

    pub fn take(&self) -> Vec<FaultReport> {
        self.reports.take()
    }
}

impl Default for CollectingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CatchFault for CollectingSink {
    fn catch(&self, report: FaultReport) {
        self.reports.borrow_mut().push(report);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_names_both_expressions() {
        let err = BindError::NeitherSideWritable {
            left: "item.total()".into(),
            right: "view.count()".into(),
        };
        let text = err.to_string();
        assert!(text.contains("item.total()"));
        assert!(text.contains("view.count()"));
    }

    #[test]
    fn conversion_diagnostic_is_specific() {
        let err = BindError::ConversionStripsWritability {
            path: "item.age.to_str()".into(),
        };
        assert!(err.to_string().contains("strips writability"));
    }

    #[test]
    fn fault_keeps_first_path() {
        let fault = Fault::at("boom", "a.b").with_path("outer");
        assert_eq!(fault.path(), Some("a.b"));

        let fault = Fault::new("boom").with_path("outer");
        assert_eq!(fault.path(), Some("outer"));
    }

    #[test]
    fn collecting_sink_records_reports() {
        let sink = CollectingSink::new();
        sink.catch(FaultReport {
            binding_id: 3,
            fault: Fault::new("boom"),
        });

        let reports = sink.take();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].binding_id, 3);
        assert!(sink.is_empty());
    }

    #[test]
    #[should_panic(expected = "unhandled fault in binding #9")]
    fn panic_sink_reraises() {
        PanicSink.catch(FaultReport {
            binding_id: 9,
            fault: Fault::new("boom"),
        });
    }
}
