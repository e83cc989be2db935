use std::error::Error as StdError;
use std::fmt;

/// One frame of a script call stack, innermost first when collected in an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Function name, or `<top>` for unit-level code
    pub function: String,
    /// File name or other origin label of the unit
    pub origin: String,
    /// 1-based line of the call site
    pub line: usize,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {} ({}:{})", self.function, self.origin, self.line)
    }
}

/// Errors raised while parsing or evaluating program text
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("{origin}:{line}:{column}: syntax error: {message}")]
    Syntax {
        origin: String,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("{message}")]
    Runtime {
        message: String,
        stack: Vec<StackFrame>,
    },

    /// A host-provided function failed; `source` keeps the host's own error
    #[error("{function}() failed: {source}")]
    Native {
        function: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
        stack: Vec<StackFrame>,
    },
}

impl EvalError {
    pub fn runtime(message: impl Into<String>) -> Self {
        EvalError::Runtime {
            message: message.into(),
            stack: Vec::new(),
        }
    }

    pub fn native<E>(function: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        EvalError::Native {
            function: function.into(),
            source: Box::new(source),
            stack: Vec::new(),
        }
    }

    /// Append a frame while the error unwinds through a call
    pub fn with_frame(mut self, frame: StackFrame) -> Self {
        match &mut self {
            EvalError::Runtime { stack, .. } | EvalError::Native { stack, .. } => stack.push(frame),
            EvalError::Syntax { .. } => {}
        }
        self
    }

    pub fn stack(&self) -> &[StackFrame] {
        match self {
            EvalError::Runtime { stack, .. } | EvalError::Native { stack, .. } => stack,
            EvalError::Syntax { .. } => &[],
        }
    }

    /// Multi-line stack description for logs, empty when no frames were recorded
    pub fn script_stack(&self) -> String {
        self.stack()
            .iter()
            .map(|frame| format!("\t{}", frame))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self, EvalError::Syntax { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_accumulate_innermost_first() {
        let err = EvalError::runtime("boom")
            .with_frame(StackFrame {
                function: "inner".to_string(),
                origin: "a.js".to_string(),
                line: 3,
            })
            .with_frame(StackFrame {
                function: "<top>".to_string(),
                origin: "a.js".to_string(),
                line: 9,
            });

        assert_eq!(err.stack().len(), 2);
        assert_eq!(err.stack()[0].function, "inner");
        assert_eq!(
            err.script_stack(),
            "\tat inner (a.js:3)\n\tat <top> (a.js:9)"
        );
    }

    #[test]
    fn test_syntax_errors_have_no_stack() {
        let err = EvalError::Syntax {
            origin: "a.js".to_string(),
            line: 1,
            column: 4,
            message: "expected expression".to_string(),
        }
        .with_frame(StackFrame {
            function: "f".to_string(),
            origin: "a.js".to_string(),
            line: 1,
        });

        assert!(err.is_syntax());
        assert!(err.stack().is_empty());
        assert_eq!(err.to_string(), "a.js:1:4: syntax error: expected expression");
    }

    #[test]
    fn test_native_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = EvalError::native("require", io);
        let source = StdError::source(&err).expect("source");
        assert_eq!(source.to_string(), "gone");
    }
}
