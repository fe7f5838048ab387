//! Compile PL/0 parse trees into stack machine code.
//!
//! For example:
//!
//! ```text
//! var x;
//! begin
//!     read x;
//!     if x = 0 then write x
//! end.
//! ```
//!
//! compiles to
//!
//! ```text
//! 0  inc 0 1   ; one cell for x
//! 1  sio 0 2   ; read onto the stack
//! 2  sto 0 0   ; store into x
//! 3  lod 0 0
//! 4  lit 0 0
//! 5  opr 0 8   ; x = 0
//! 6  jpc 0 9   ; skip the body when false
//! 7  lod 0 0
//! 8  sio 0 1   ; write x
//! 9  opr 0 0   ; return
//! ```
//!
//! Variables live in activation frames addressed by `(level, offset)` where
//! level is how many blocks outward the declaration is. Forward jumps are
//! emitted with a placeholder target and patched once the target is known.

use std::borrow::Cow;

use icu_casemap::CaseMapper;

use crate::{parse_tree::NodeKind, parser::SyntaxError};

pub mod bytecode;
mod codegen;
pub mod environment;

pub use codegen::{generate, Generator};

#[derive(thiserror::Error, Debug, PartialEq, Clone)]
pub enum SemanticError {
    #[error("undeclared identifier `{0}`")]
    UndeclaredIdentifier(Box<str>),
    #[error("`{0}` is already declared in this block")]
    DuplicateDeclaration(Box<str>),
    #[error("cannot assign to {kind} `{name}`")]
    NotAssignable { name: Box<str>, kind: &'static str },
    #[error("cannot call {kind} `{name}`")]
    NotCallable { name: Box<str>, kind: &'static str },
    #[error("procedure `{0}` cannot be used in an expression")]
    NotAnExpression(Box<str>),
    #[error("procedure `{0}` has no entry address yet")]
    UnresolvedProcedure(Box<str>),
    #[error("number literal `{0}` is out of range")]
    NumberOutOfRange(Box<str>),
    #[error("{0} nested too deeply")]
    TooDeep(NodeKind),
    #[error("malformed parse tree: expected {expected}, found {found}")]
    MalformedTree {
        expected: &'static str,
        found: Box<str>,
    },
}

impl SemanticError {
    pub(crate) fn malformed(expected: &'static str, found: impl Into<Box<str>>) -> Self {
        Self::MalformedTree {
            expected,
            found: found.into(),
        }
    }

    pub(crate) fn missing(expected: &'static str, parent: NodeKind) -> Self {
        Self::malformed(expected, format!("nothing more in {parent}"))
    }
}

/// Either stage's first error.
#[derive(thiserror::Error, Debug, PartialEq, Clone)]
pub enum CompileError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Semantic(#[from] SemanticError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Address of the first variable in every frame. Machines that keep frame
    /// linkage (static link, dynamic link, return address) inside the frame
    /// want 3 here.
    pub frame_base: u32,
    /// Fold the source's case before lexing, so `BEGIN` reads as `begin`.
    pub fold_case: bool,
}

impl CompileOptions {
    /// The text the lexer should actually see.
    pub fn prepare<'a>(&self, source: &'a str) -> Cow<'a, str> {
        if self.fold_case {
            Cow::Owned(CaseMapper::new().fold_string(source))
        } else {
            Cow::Borrowed(source)
        }
    }
}

/// Lex, parse and generate in one go.
pub fn compile(
    source: &str,
    options: &CompileOptions,
) -> Result<Vec<bytecode::Instruction>, CompileError> {
    let source = options.prepare(source);
    let tree = crate::parser::parse_source(&source)?;
    Ok(generate(&tree, options)?)
}
