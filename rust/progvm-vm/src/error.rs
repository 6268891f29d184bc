//! Load rejection, the runtime error taxonomy, and the error log.

use thiserror::Error;

/// Why an image was rejected at load time.
///
/// A rejected image never produces a [`crate::Vm`]; there is no partially
/// loaded state to guard against.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("image is smaller than its header")]
    TooSmall,
    #[error("unsupported format version {0}, expected 6")]
    BadVersion(i32),
    #[error("{0} lump exceeds the file bounds")]
    LumpBounds(&'static str),
    #[error("{0} lump is empty")]
    EmptyLump(&'static str),
    #[error("entity record size {0} is invalid")]
    EntitySize(i32),
    #[error("global data has {0} cells, fewer than the 28 reserved call slots")]
    ReservedCells(usize),
    #[error("global definition {0} has an out-of-bounds name offset")]
    GlobalDefName(usize),
    #[error("global definition {0} has an out-of-bounds data offset")]
    GlobalDefOffset(usize),
    #[error("field definition {0} has an out-of-bounds name offset")]
    FieldDefName(usize),
    #[error("field definition {0} has an out-of-bounds entity offset")]
    FieldDefOffset(usize),
    #[error("function {0} first statement is out of bounds")]
    FunctionFirstStatement(usize),
    #[error("function {0} local window is out of bounds")]
    FunctionLocals(usize),
    #[error("function {0} has an out-of-bounds name offset")]
    FunctionName(usize),
    #[error("function {0} has an out-of-bounds file name offset")]
    FunctionFileName(usize),
    #[error("function {0} declares an invalid parameter list")]
    FunctionParameters(usize),
    #[error("statement {0} has invalid opcode {1:#06x}")]
    BadOpcode(usize, u16),
    #[error("statement {statement} operand {operand} is out of bounds (globals)")]
    OperandBounds { statement: usize, operand: usize },
    #[error("statement {statement} operand {operand} jumps outside the statement table")]
    JumpBounds { statement: usize, operand: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Classification of a runtime failure. One top-level [`crate::Vm::run`]
/// reports at most one kind; the full context lives in the error log.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("runaway loop")]
    RunawayLoop,
    #[error("function not found")]
    FunctionNotFound,
    #[error("builtin not found")]
    BuiltinNotFound,
    #[error("builtin reported an error")]
    BuiltinError,
    #[error("invalid entity read")]
    InvalidRead,
    #[error("invalid entity write")]
    InvalidWrite,
    #[error("invalid instruction")]
    InvalidInstruction,
    #[error("not implemented")]
    NotImplemented,
    #[error("call depth exceeded")]
    CallDepthExceeded,
}

/// Accumulating error log. `begin` starts a fresh report; everything
/// after appends until the host clears it.
#[derive(Debug, Default)]
pub(crate) struct ErrorLog {
    last: Option<ErrorKind>,
    log: String,
}

impl ErrorLog {
    pub fn begin(&mut self, kind: ErrorKind, title: &str) {
        self.last = Some(kind);
        self.log.clear();
        self.log.push_str("================\n");
        self.log.push_str(title);
        self.log.push('\n');
        self.log.push_str("================\n");
    }

    pub fn add_line(&mut self, text: &str) {
        self.log.push_str(text);
        self.log.push('\n');
    }

    pub fn append(&mut self, text: &str) {
        self.log.push_str(text);
    }

    pub fn last(&self) -> Option<ErrorKind> {
        self.last
    }

    pub fn messages(&self) -> &str {
        &self.log
    }

    pub fn clear(&mut self) {
        self.last = None;
        self.log.clear();
    }
}
