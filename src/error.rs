use std::fmt::Display;
use std::rc::Rc;

use thiserror::Error;

use crate::interpreter::value::Value;
use crate::source::Line;
use crate::tokenizer::Token;

/// Lexer or parser failure, located by line and 0-based character column.
#[derive(Debug, Clone, Error)]
#[error(
    "Syntax error on file {:?}, line {}, character {}: {}",
    .line.filename,
    .line.lineno,
    .column + 1,
    .message
)]
pub struct SyntaxError {
    pub line: Rc<Line>,
    pub column: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: Rc<Line>, column: usize, message: impl Into<String>) -> Self {
        SyntaxError {
            line,
            column,
            message: message.into(),
        }
    }
}

/// Evaluator failure, located by the token of the offending node.
#[derive(Debug, Clone, Error)]
#[error(
    "Runtime error on file {:?}, line {}: {}",
    .token.line.filename,
    .token.line.lineno,
    .message
)]
pub struct RuntimeError {
    pub token: Token,
    pub message: String,
}

impl RuntimeError {
    pub fn new(token: &Token, message: impl Into<String>) -> Self {
        RuntimeError {
            token: token.clone(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Break,
    Next,
    Done,
    Return,
}

impl ControlKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlKind::Break => "break",
            ControlKind::Next => "next",
            ControlKind::Done => "done",
            ControlKind::Return => "return",
        }
    }
}

impl Display for ControlKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A break/next/done/return signal travelling up the error channel. Loops,
/// procs, and funcs consume the kinds they expect; anything that reaches the
/// top was misused and is reported with this display form.
#[derive(Debug, Clone, Error)]
#[error(
    "Unexpected {:?} on file {:?}, line {}",
    .kind.as_str(),
    .token.line.filename,
    .token.line.lineno
)]
pub struct ControlError {
    pub token: Token,
    pub kind: ControlKind,
    pub value: Option<Value>,
}

impl ControlError {
    pub fn new(token: &Token, kind: ControlKind, value: Option<Value>) -> Self {
        ControlError {
            token: token.clone(),
            kind,
            value,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Errors the REPL prints and recovers from; anything else ends the
    /// session.
    pub fn is_handled(&self) -> bool {
        matches!(
            self,
            Error::Syntax(_) | Error::Runtime(_) | Error::Control(_)
        )
    }
}
