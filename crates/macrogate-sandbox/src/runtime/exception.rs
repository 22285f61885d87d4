//! Script exceptions and the non-local exits that unwind the interpreter.

use std::fmt::Write as _;
use std::rc::Rc;

use super::value::{release, Value};

/// Built-in exception types, with their single-inheritance hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExcKind {
    /// Root of every catchable exception.
    Exception,
    /// Base of arithmetic failures.
    ArithmeticError,
    /// Division or modulo by zero.
    ZeroDivisionError,
    /// Integer arithmetic left the 64-bit range.
    OverflowError,
    /// Base of failed lookups.
    LookupError,
    /// Missing mapping key.
    KeyError,
    /// Sequence index out of range.
    IndexError,
    /// Right type, wrong value.
    ValueError,
    /// Operation applied to the wrong type.
    TypeError,
    /// Unbound name.
    NameError,
    /// Missing or read-only attribute.
    AttributeError,
    /// Generic runtime failure.
    RuntimeError,
    /// Script call stack too deep.
    RecursionError,
    /// Raised by scripts for unfinished code paths.
    NotImplementedError,
    /// Failed `assert`.
    AssertionError,
    /// Unknown module or name in an import.
    ImportError,
    /// A collection grew past the configured limit.
    MemoryError,
    /// A host command failed.
    HostError,
}

impl ExcKind {
    /// Every kind, for populating the builtin namespace.
    pub const ALL: [ExcKind; 18] = [
        ExcKind::Exception,
        ExcKind::ArithmeticError,
        ExcKind::ZeroDivisionError,
        ExcKind::OverflowError,
        ExcKind::LookupError,
        ExcKind::KeyError,
        ExcKind::IndexError,
        ExcKind::ValueError,
        ExcKind::TypeError,
        ExcKind::NameError,
        ExcKind::AttributeError,
        ExcKind::RuntimeError,
        ExcKind::RecursionError,
        ExcKind::NotImplementedError,
        ExcKind::AssertionError,
        ExcKind::ImportError,
        ExcKind::MemoryError,
        ExcKind::HostError,
    ];

    /// The type name as scripts see it.
    pub fn name(self) -> &'static str {
        match self {
            ExcKind::Exception => "Exception",
            ExcKind::ArithmeticError => "ArithmeticError",
            ExcKind::ZeroDivisionError => "ZeroDivisionError",
            ExcKind::OverflowError => "OverflowError",
            ExcKind::LookupError => "LookupError",
            ExcKind::KeyError => "KeyError",
            ExcKind::IndexError => "IndexError",
            ExcKind::ValueError => "ValueError",
            ExcKind::TypeError => "TypeError",
            ExcKind::NameError => "NameError",
            ExcKind::AttributeError => "AttributeError",
            ExcKind::RuntimeError => "RuntimeError",
            ExcKind::RecursionError => "RecursionError",
            ExcKind::NotImplementedError => "NotImplementedError",
            ExcKind::AssertionError => "AssertionError",
            ExcKind::ImportError => "ImportError",
            ExcKind::MemoryError => "MemoryError",
            ExcKind::HostError => "HostError",
        }
    }

    fn parent(self) -> Option<ExcKind> {
        match self {
            ExcKind::Exception => None,
            ExcKind::ZeroDivisionError | ExcKind::OverflowError => Some(ExcKind::ArithmeticError),
            ExcKind::KeyError | ExcKind::IndexError => Some(ExcKind::LookupError),
            ExcKind::RecursionError | ExcKind::NotImplementedError => Some(ExcKind::RuntimeError),
            _ => Some(ExcKind::Exception),
        }
    }

    /// Whether `self` is `other` or derives from it.
    pub fn is_subclass_of(self, other: ExcKind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == other {
                return true;
            }
            current = kind.parent();
        }
        false
    }
}

/// An exception instance.
#[derive(Debug)]
pub struct ExceptionObj {
    /// The exception type.
    pub kind: ExcKind,
    /// Constructor arguments, exposed as `e.args`.
    pub args: Vec<Value>,
    /// `str(e)`.
    pub message: String,
}

impl ExceptionObj {
    /// Build an instance from constructor arguments.
    pub fn from_args(kind: ExcKind, args: Vec<Value>) -> Self {
        let message = match args.as_slice() {
            [] => String::new(),
            [single] if kind == ExcKind::KeyError => single.repr(),
            [single] => single.to_str(),
            many => Value::tuple(many.to_vec()).repr(),
        };
        Self {
            kind,
            args,
            message,
        }
    }

    /// `repr(e)`, e.g. `ValueError('bad')`.
    pub fn repr(&self) -> String {
        let mut out = format!("{}(", self.kind.name());
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&arg.repr());
        }
        out.push(')');
        out
    }
}

impl Drop for ExceptionObj {
    fn drop(&mut self) {
        release(std::mem::take(&mut self.args));
    }
}

/// One line of a traceback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    /// Function name, or `<module>` for top-level code.
    pub name: Rc<str>,
    /// Line being executed in that frame.
    pub line: u32,
}

/// An exception in flight, with the call stack captured where it was raised.
#[derive(Debug, Clone)]
pub struct Raised {
    /// The exception instance.
    pub exc: Rc<ExceptionObj>,
    /// Filled in by the innermost statement the exception escapes.
    pub trace: Option<Vec<TraceFrame>>,
}

impl Raised {
    /// Render a Python-style traceback.
    pub fn traceback(&self) -> String {
        let mut out = String::from("Traceback (most recent call last):\n");
        for frame in self.trace.iter().flatten() {
            let _ = writeln!(
                out,
                "  File \"<macro>\", line {}, in {}",
                frame.line, frame.name
            );
        }
        out.push_str(self.exc.kind.name());
        if !self.exc.message.is_empty() {
            out.push_str(": ");
            out.push_str(&self.exc.message);
        }
        out
    }
}

/// Why a run stopped without script code being able to intervene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abort {
    /// Wall-clock budget exhausted.
    Timeout,
    /// Step budget exhausted.
    StepLimit,
    /// Captured output exceeded its cap.
    OutputLimit,
}

/// A non-local exit from evaluation.
#[derive(Debug, Clone)]
pub enum Interrupt {
    /// A script exception; catchable by `try`.
    Raise(Raised),
    /// A resource limit; never catchable.
    Abort(Abort),
}

impl Interrupt {
    /// A fresh exception with a single message argument.
    pub fn new(kind: ExcKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let args = if message.is_empty() {
            Vec::new()
        } else {
            vec![Value::str(&message)]
        };
        Self::from_exception(ExceptionObj {
            kind,
            args,
            message,
        })
    }

    /// Raise an existing instance.
    pub fn from_exception(exc: ExceptionObj) -> Self {
        Interrupt::Raise(Raised {
            exc: Rc::new(exc),
            trace: None,
        })
    }

    /// `KeyError` carrying the missing key.
    pub fn key_error(key: &Value) -> Self {
        Self::from_exception(ExceptionObj::from_args(ExcKind::KeyError, vec![key.clone()]))
    }

    /// Whether this is a script exception of `kind` or a subclass.
    pub fn is(&self, kind: ExcKind) -> bool {
        matches!(self, Interrupt::Raise(r) if r.exc.kind.is_subclass_of(kind))
    }
}

/// Shorthand for raising from builtins and operators.
pub(crate) fn raise<T>(kind: ExcKind, message: impl Into<String>) -> Result<T, Interrupt> {
    Err(Interrupt::new(kind, message))
}
