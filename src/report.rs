use serde::Serialize;

use crate::field::{Field, CONTEXT_KEY};
use crate::source::{locate, Frame, SourceLocation};

/// The `context` group Error Reporting uses to attach a stack location to
/// an error entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub report_location: SourceLocation,
}

impl ErrorReport {
    /// Render under the `context` key. That key is reserved, so pass the
    /// field through [`Logger::log`](crate::logger::Logger::log) rather than
    /// `with_field`.
    pub fn field(&self) -> Field {
        Field::any(CONTEXT_KEY, self)
    }
}

pub fn report(frame: &Frame) -> ErrorReport {
    ErrorReport { report_location: locate(frame) }
}
