//! The concrete parse tree handed from the parser to the code generator.
//!
//! Trees also have a compact s-expression notation, e.g.
//! `(program (block (statement (write-statement (number 1)))))`, which is
//! what [`ParseTree`]'s `Display` writes and `FromStr` reads.
use core::fmt;
use std::str::FromStr;

use logos::Logos;

/// Grammar categories that label parse tree nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKind {
    // nonterminals
    Program,
    Block,
    ConstDeclaration,
    /// `identifier = number` inside a const declaration
    Constant,
    VarDeclaration,
    Identifiers,
    ProcedureDeclaration,
    Statement,
    Statements,
    Assignment,
    CallStatement,
    BeginBlock,
    IfStatement,
    WhileStatement,
    ReadStatement,
    WriteStatement,
    Condition,
    /// marks the `odd expression` form of a condition
    Odd,
    Expression,
    Term,
    Factor,

    // terminals (carry their literal text)
    Identifier,
    Number,
    RelOp,
    AddOp,
    MulOp,
}
use NodeKind::*;

impl NodeKind {
    pub const ALL: [NodeKind; 26] = [
        Program,
        Block,
        ConstDeclaration,
        Constant,
        VarDeclaration,
        Identifiers,
        ProcedureDeclaration,
        Statement,
        Statements,
        Assignment,
        CallStatement,
        BeginBlock,
        IfStatement,
        WhileStatement,
        ReadStatement,
        WriteStatement,
        Condition,
        Odd,
        Expression,
        Term,
        Factor,
        Identifier,
        Number,
        RelOp,
        AddOp,
        MulOp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Program => "program",
            Block => "block",
            ConstDeclaration => "const-declaration",
            Constant => "constant",
            VarDeclaration => "var-declaration",
            Identifiers => "identifiers",
            ProcedureDeclaration => "procedure-declaration",
            Statement => "statement",
            Statements => "statements",
            Assignment => "assignment",
            CallStatement => "call-statement",
            BeginBlock => "begin-block",
            IfStatement => "if-statement",
            WhileStatement => "while-statement",
            ReadStatement => "read-statement",
            WriteStatement => "write-statement",
            Condition => "condition",
            Odd => "odd",
            Expression => "expression",
            Term => "term",
            Factor => "factor",
            Identifier => "identifier",
            Number => "number",
            RelOp => "rel-op",
            AddOp => "add-op",
            MulOp => "mul-op",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Terminals carry literal text and never have children.
    pub fn is_terminal(self) -> bool {
        matches!(self, Identifier | Number | RelOp | AddOp | MulOp)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParseTree {
    kind: NodeKind,
    text: Option<Box<str>>,
    children: Vec<ParseTree>,
}

impl ParseTree {
    pub fn node(kind: NodeKind, children: impl IntoIterator<Item = ParseTree>) -> Self {
        Self {
            kind,
            text: None,
            children: children.into_iter().collect(),
        }
    }

    pub fn terminal(kind: NodeKind, text: impl Into<Box<str>>) -> Self {
        Self {
            kind,
            text: Some(text.into()),
            children: vec![],
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn children(&self) -> &[ParseTree] {
        &self.children
    }

    /// Short description used in error messages.
    pub fn describe(&self) -> Box<str> {
        match &self.text {
            Some(text) => format!("({} {text})", self.kind).into(),
            None => format!("({} ...)", self.kind).into(),
        }
    }

    fn write(&self, f: &mut fmt::Formatter<'_>, depth: Option<usize>) -> fmt::Result {
        write!(f, "({}", self.kind)?;
        if let Some(text) = &self.text {
            write!(f, " {text}")?;
        }
        for child in &self.children {
            match depth {
                Some(depth) => {
                    writeln!(f)?;
                    write!(f, "{:width$}", "", width = (depth + 1) * 2)?;
                    child.write(f, Some(depth + 1))?;
                }
                None => {
                    write!(f, " ")?;
                    child.write(f, None)?;
                }
            }
        }
        write!(f, ")")
    }
}

// Long statement lists nest deeply; tear them down without recursion.
impl Drop for ParseTree {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut child) = pending.pop() {
            pending.append(&mut child.children);
        }
    }
}

impl fmt::Display for ParseTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f, f.alternate().then_some(0))
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Clone)]
pub enum TreeNotationError {
    #[error("unknown node name `{0}`")]
    UnknownNode(Box<str>),
    #[error("terminal `{0}` needs literal text")]
    MissingText(NodeKind),
    #[error("terminal `{0}` cannot have children")]
    TerminalChildren(NodeKind),
    #[error("unexpected `{0}` in tree notation")]
    Unexpected(Box<str>),
    #[error("unbalanced parentheses in tree notation")]
    Unbalanced,
}

#[derive(Debug, Clone, PartialEq, Logos)]
#[logos(skip r"[ \t\r\n]+")]
enum NotationToken<'s> {
    #[token("(")]
    Open,
    #[token(")")]
    Close,
    #[regex(r"[^\s()]+", |l| l.slice())]
    Atom(&'s str),
}

struct NotationReader<'s> {
    tokens: logos::Lexer<'s, NotationToken<'s>>,
}

impl<'s> NotationReader<'s> {
    fn next(&mut self) -> Result<Option<NotationToken<'s>>, TreeNotationError> {
        match self.tokens.next() {
            Some(Ok(tok)) => Ok(Some(tok)),
            Some(Err(())) => Err(TreeNotationError::Unexpected(Box::from("?"))),
            None => Ok(None),
        }
    }

    fn expect_close(&mut self, kind: NodeKind) -> Result<(), TreeNotationError> {
        match self.next()? {
            Some(NotationToken::Close) => Ok(()),
            Some(NotationToken::Open) => Err(TreeNotationError::TerminalChildren(kind)),
            Some(NotationToken::Atom(atom)) => Err(TreeNotationError::Unexpected(atom.into())),
            None => Err(TreeNotationError::Unbalanced),
        }
    }

    // reads the remainder of a node whose `(` was already consumed
    fn node(&mut self) -> Result<ParseTree, TreeNotationError> {
        let kind = match self.next()? {
            Some(NotationToken::Atom(name)) => {
                NodeKind::from_name(name).ok_or_else(|| TreeNotationError::UnknownNode(name.into()))?
            }
            Some(NotationToken::Open) => return Err(TreeNotationError::Unexpected("(".into())),
            Some(NotationToken::Close) => return Err(TreeNotationError::Unexpected(")".into())),
            None => return Err(TreeNotationError::Unbalanced),
        };

        if kind.is_terminal() {
            return match self.next()? {
                Some(NotationToken::Atom(text)) => {
                    self.expect_close(kind)?;
                    Ok(ParseTree::terminal(kind, text))
                }
                Some(_) => Err(TreeNotationError::MissingText(kind)),
                None => Err(TreeNotationError::Unbalanced),
            };
        }

        let mut children = vec![];
        loop {
            match self.next()? {
                Some(NotationToken::Open) => children.push(self.node()?),
                Some(NotationToken::Close) => return Ok(ParseTree::node(kind, children)),
                Some(NotationToken::Atom(atom)) => {
                    return Err(TreeNotationError::Unexpected(atom.into()))
                }
                None => return Err(TreeNotationError::Unbalanced),
            }
        }
    }
}

impl FromStr for ParseTree {
    type Err = TreeNotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut reader = NotationReader {
            tokens: NotationToken::lexer(s),
        };
        let tree = match reader.next()? {
            Some(NotationToken::Open) => reader.node()?,
            Some(NotationToken::Close) => return Err(TreeNotationError::Unbalanced),
            Some(NotationToken::Atom(atom)) => {
                return Err(TreeNotationError::Unexpected(atom.into()))
            }
            None => return Err(TreeNotationError::Unbalanced),
        };
        match reader.next()? {
            None => Ok(tree),
            Some(NotationToken::Close) => Err(TreeNotationError::Unbalanced),
            Some(NotationToken::Open) => Err(TreeNotationError::Unexpected("(".into())),
            Some(NotationToken::Atom(atom)) => Err(TreeNotationError::Unexpected(atom.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{NodeKind, ParseTree, TreeNotationError};
    use assert2::{check, let_assert};

    #[test]
    fn names_round_trip() {
        for kind in NodeKind::ALL {
            check!(NodeKind::from_name(kind.name()) == Some(kind));
        }
        check!(NodeKind::from_name("if") == None);
    }

    #[test]
    fn read_notation() {
        let_assert!(Ok(tree) = "(block (statement (read-statement (identifier ccc))) )".parse::<ParseTree>());
        check!(tree.kind() == NodeKind::Block);
        let statement = &tree.children()[0];
        check!(statement.kind() == NodeKind::Statement);
        let read = &statement.children()[0];
        check!(read.kind() == NodeKind::ReadStatement);
        let identifier = &read.children()[0];
        check!(identifier.kind() == NodeKind::Identifier);
        check!(identifier.text() == Some("ccc"));
        check!(identifier.children().is_empty());
    }

    #[test]
    fn read_rejects_bad_notation() {
        check!("(aaa)".parse::<ParseTree>() == Err(TreeNotationError::UnknownNode("aaa".into())));
        check!("(number)".parse::<ParseTree>() == Err(TreeNotationError::MissingText(NodeKind::Number)));
        check!(
            "(number 1 (number 2))".parse::<ParseTree>()
                == Err(TreeNotationError::TerminalChildren(NodeKind::Number))
        );
        check!("(statement".parse::<ParseTree>() == Err(TreeNotationError::Unbalanced));
        check!("(statement))".parse::<ParseTree>() == Err(TreeNotationError::Unbalanced));
        check!("(statement x)".parse::<ParseTree>() == Err(TreeNotationError::Unexpected("x".into())));
    }

    #[test]
    fn display_compact_and_pretty() {
        let tree = ParseTree::node(
            NodeKind::Condition,
            [
                ParseTree::terminal(NodeKind::Identifier, "x"),
                ParseTree::terminal(NodeKind::RelOp, "<="),
                ParseTree::node(NodeKind::Statement, []),
            ],
        );
        check!(tree.to_string() == "(condition (identifier x) (rel-op <=) (statement))");
        check!(
            format!("{tree:#}")
                == "(condition\n  (identifier x)\n  (rel-op <=)\n  (statement))"
        );
        check!(tree.to_string().parse::<ParseTree>() == Ok(tree.clone()));
        check!(format!("{tree:#}").parse::<ParseTree>() == Ok(tree));
    }

    #[test]
    fn dropping_deep_trees() {
        let mut tree = ParseTree::node(NodeKind::Statement, []);
        for _ in 0..200_000 {
            tree = ParseTree::node(NodeKind::Statements, [ParseTree::node(NodeKind::Statement, []), tree]);
        }
        check!(tree.children().len() == 2);
        drop(tree);
    }
}
