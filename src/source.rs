use serde::Serialize;

use crate::field::{Field, SOURCE_LOCATION_KEY};

/// A single stack frame as reported by the caller.
///
/// `ok` mirrors the success flag of whatever produced the frame; a frame
/// with `ok == false` may carry empty or zero data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub file: String,
    pub line: u32,
    pub function: String,
    pub ok: bool,
}

impl Frame {
    pub fn new(file: impl Into<String>, line: u32, function: impl Into<String>, ok: bool) -> Self {
        Frame { file: file.into(), line, function: function.into(), ok }
    }

    /// Frame of the code calling this function. The function name is not
    /// available this way; use [`frame!`](crate::frame) when it matters.
    #[track_caller]
    pub fn caller() -> Self {
        let location = std::panic::Location::caller();
        Frame::new(location.file(), location.line(), "", true)
    }
}

/// Capture a [`Frame`] for the current file, line and enclosing function.
#[macro_export]
macro_rules! frame {
    () => {{
        fn __here() {}
        fn __type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let name = __type_name_of(__here);
        $crate::source::Frame::new(
            file!(),
            line!(),
            name.strip_suffix("::__here").unwrap_or(name),
            true,
        )
    }};
}

/// Where a log event originated, as understood by the backend.
///
/// `line` is a decimal string, not a number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: String,
    pub function: String,
}

impl SourceLocation {
    pub fn field(&self) -> Field {
        Field::any(SOURCE_LOCATION_KEY, self)
    }
}

/// Best-effort conversion of a frame; never fails, even for `ok == false`.
pub fn locate(frame: &Frame) -> SourceLocation {
    SourceLocation {
        file: frame.file.clone(),
        line: frame.line.to_string(),
        function: frame.function.clone(),
    }
}
