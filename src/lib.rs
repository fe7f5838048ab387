//! Front end for PL/0: lexer, recursive-descent parser and a code generator
//! targeting a small stack machine.
pub mod compiler;
pub mod lexer;
pub mod parse_tree;
pub mod parser;

pub use compiler::{
    bytecode::{Instruction, Opcode},
    compile, generate, CompileError, CompileOptions, SemanticError,
};
pub use lexer::{LexerError, Span, Token};
pub use parse_tree::{NodeKind, ParseTree};
pub use parser::{parse, parse_source, SyntaxError};
