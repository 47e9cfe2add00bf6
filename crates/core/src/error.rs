//! Exception taxonomy shared by the assembler, the VM, and native callbacks.
//!
//! Every fallible operation in the interpreter returns
//! `Result<_, EvcError>`. An `EvcError` is also what a script-level
//! `catch` clause observes, reshaped into a `{name, message}` dict by the
//! VM.

use std::fmt;

/// The exception classes a script can raise or catch.
///
/// Classes compare by identity; the rendered name is the class name with
/// an `Error` suffix (`TypeError`, `KeyError`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Argument,
    Key,
    Index,
    Name,
    NotImplemented,
    Number,
    Range,
    Recursion,
    Runtime,
    Syntax,
    System,
    Type,
    Value,
}

impl ErrorClass {
    pub fn name(self) -> &'static str {
        match self {
            ErrorClass::Argument => "ArgumentError",
            ErrorClass::Key => "KeyError",
            ErrorClass::Index => "IndexError",
            ErrorClass::Name => "NameError",
            ErrorClass::NotImplemented => "NotImplementedError",
            ErrorClass::Number => "NumberError",
            ErrorClass::Range => "RangeError",
            ErrorClass::Recursion => "RecursionError",
            ErrorClass::Runtime => "RuntimeError",
            ErrorClass::Syntax => "SyntaxError",
            ErrorClass::System => "SystemError",
            ErrorClass::Type => "TypeError",
            ErrorClass::Value => "ValueError",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A raised exception: class token plus a rendered message.
///
/// Syntax errors additionally carry the source location that produced
/// them so the driver can print `file:line` diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct EvcError {
    pub class: ErrorClass,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl EvcError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        EvcError {
            class,
            message: message.into(),
            file: None,
            line: None,
        }
    }

    pub fn with_location(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    pub fn type_err(message: impl Into<String>) -> Self {
        EvcError::new(ErrorClass::Type, message)
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        EvcError::new(ErrorClass::Syntax, message)
    }

    /// The standard complaint for a binary operator applied to
    /// incompatible operands.
    pub fn mismatch(op: &str) -> Self {
        EvcError::type_err(format!("invalid operands for `{}'", op))
    }
}

impl fmt::Display for EvcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => {
                write!(f, "{}: {} ({}:{})", self.class, self.message, file, line)
            }
            _ => write!(f, "{}: {}", self.class, self.message),
        }
    }
}

impl std::error::Error for EvcError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_class_name() {
        let e = EvcError::new(ErrorClass::Key, "no such attribute 'x'");
        assert_eq!(e.to_string(), "KeyError: no such attribute 'x'");
    }

    #[test]
    fn test_syntax_error_location() {
        let e = EvcError::syntax("unexpected token").with_location("a.evc", 3);
        assert_eq!(e.to_string(), "SyntaxError: unexpected token (a.evc:3)");
    }
}
