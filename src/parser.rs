//! Recursive-descent parser building a [`ParseTree`] from PL/0 tokens.
//!
//! Every nonterminal of the grammar has one routine that consumes exactly the
//! tokens of its rule. One token of lookahead decides between alternatives,
//! and the first mismatch ends the parse; there is no error recovery.
use std::iter;

use crate::{
    lexer::{LexerError, Span, Token},
    parse_tree::{NodeKind, ParseTree},
};

#[derive(thiserror::Error, Debug, PartialEq, Clone)]
pub enum SyntaxError {
    #[error("{error}")]
    Lexer { error: LexerError, span: Span },
    #[error("expected {expected} while parsing {rule}, found {found}")]
    Unexpected {
        expected: &'static str,
        rule: NodeKind,
        found: Token,
        span: Span,
    },
    #[error("expected {expected} while parsing {rule}, found end of input")]
    UnexpectedEnd {
        expected: &'static str,
        rule: NodeKind,
        span: Span,
    },
    #[error("unexpected {found} after the closing `.`")]
    TrailingInput { found: Token, span: Span },
    #[error("{rule} nested more than {} levels deep", MAX_NESTING)]
    TooDeep { rule: NodeKind, span: Span },
}

impl SyntaxError {
    /// Where in the source the error was detected.
    pub fn span(&self) -> Span {
        match self {
            Self::Lexer { span, .. }
            | Self::Unexpected { span, .. }
            | Self::UnexpectedEnd { span, .. }
            | Self::TrailingInput { span, .. }
            | Self::TooDeep { span, .. } => span.clone(),
        }
    }
}

/// How many statements and expressions may nest inside each other.
pub const MAX_NESTING: usize = 128;

/// Lexes `source` and parses the resulting tokens.
///
/// Whichever error comes first in the source is reported, so a syntax error
/// before an unlexable character wins over the lexer error.
pub fn parse_source(source: &str) -> Result<ParseTree, SyntaxError> {
    let mut tokens = vec![];
    let mut lexer_error = None;
    for (token, span) in Token::lexer(source).spanned() {
        match token {
            Ok(tok) if tok.is_trivia() => {}
            Ok(tok) => tokens.push((tok, span)),
            Err(error) => {
                lexer_error = Some(SyntaxError::Lexer { error, span });
                break;
            }
        }
    }

    let end = lexer_error
        .as_ref()
        .map_or(source.len(), |error| error.span().start);
    let parsed = Parser::new(tokens).with_end(end).parse();
    match (parsed, lexer_error) {
        // the parse reached the bad character, or would have gone past it
        (Ok(_) | Err(SyntaxError::UnexpectedEnd { .. }), Some(error)) => Err(error),
        (parsed, _) => parsed,
    }
}

/// Parses an already lexed token stream. Trivia tokens are ignored.
pub fn parse(tokens: impl IntoIterator<Item = (Token, Span)>) -> Result<ParseTree, SyntaxError> {
    Parser::new(tokens).parse()
}

pub struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    // statements and expressions currently being parsed
    depth: usize,
    // offset reported for errors at the end of input
    end: usize,
}

// builds `(kind first (kind second (kind ...)))`
fn nest(kind: NodeKind, first: ParseTree, rest: Vec<ParseTree>) -> ParseTree {
    let tail = rest.into_iter().rev().fold(None, |tail, item| {
        Some(ParseTree::node(kind, iter::once(item).chain(tail)))
    });
    ParseTree::node(kind, iter::once(first).chain(tail))
}

impl Parser {
    pub fn new(tokens: impl IntoIterator<Item = (Token, Span)>) -> Self {
        let tokens: Vec<_> = tokens
            .into_iter()
            .filter(|(tok, _)| !tok.is_trivia())
            .collect();
        let end = tokens.last().map_or(0, |(_, span)| span.end);
        Self {
            tokens,
            pos: 0,
            depth: 0,
            end,
        }
    }

    pub fn with_end(mut self, end: usize) -> Self {
        self.end = end;
        self
    }

    pub fn parse(mut self) -> Result<ParseTree, SyntaxError> {
        tracing::debug!(tokens = self.tokens.len(), "parsing program");
        self.program()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(tok, _)| tok)
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    /// Consumes the current token if it is `expected`.
    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn error(&self, expected: &'static str, rule: NodeKind) -> SyntaxError {
        match self.tokens.get(self.pos) {
            Some((found, span)) => SyntaxError::Unexpected {
                expected,
                rule,
                found: found.clone(),
                span: span.clone(),
            },
            None => SyntaxError::UnexpectedEnd {
                expected,
                rule,
                span: self.end..self.end,
            },
        }
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map_or(self.end..self.end, |(_, span)| span.clone())
    }

    // runs `parse` one nesting level deeper, refusing to go past MAX_NESTING
    fn nested(
        &mut self,
        rule: NodeKind,
        parse: fn(&mut Self) -> Result<ParseTree, SyntaxError>,
    ) -> Result<ParseTree, SyntaxError> {
        if self.depth >= MAX_NESTING {
            return Err(SyntaxError::TooDeep {
                rule,
                span: self.current_span(),
            });
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn expect(
        &mut self,
        token: &Token,
        expected: &'static str,
        rule: NodeKind,
    ) -> Result<(), SyntaxError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(expected, rule))
        }
    }

    fn identifier(&mut self, rule: NodeKind) -> Result<ParseTree, SyntaxError> {
        match self.peek() {
            Some(Token::Identifier(name)) => {
                let tree = ParseTree::terminal(NodeKind::Identifier, name.clone());
                self.bump();
                Ok(tree)
            }
            _ => Err(self.error("an identifier", rule)),
        }
    }

    fn number(&mut self, rule: NodeKind) -> Result<ParseTree, SyntaxError> {
        match self.peek() {
            Some(Token::Number(value)) => {
                let tree = ParseTree::terminal(NodeKind::Number, value.to_string());
                self.bump();
                Ok(tree)
            }
            _ => Err(self.error("a number", rule)),
        }
    }

    // program → block "."
    fn program(&mut self) -> Result<ParseTree, SyntaxError> {
        let block = self.block()?;
        self.expect(&Token::Period, "`.`", NodeKind::Program)?;
        if let Some((found, span)) = self.tokens.get(self.pos) {
            return Err(SyntaxError::TrailingInput {
                found: found.clone(),
                span: span.clone(),
            });
        }
        Ok(ParseTree::node(NodeKind::Program, [block]))
    }

    fn block(&mut self) -> Result<ParseTree, SyntaxError> {
        let mut children = vec![];
        if self.eat(&Token::Const) {
            children.push(self.const_declaration()?);
        }
        if self.eat(&Token::Var) {
            children.push(self.var_declaration()?);
        }
        while self.eat(&Token::Procedure) {
            children.push(self.procedure_declaration()?);
        }
        children.push(self.statement()?);
        Ok(ParseTree::node(NodeKind::Block, children))
    }

    // "const" already consumed
    fn const_declaration(&mut self) -> Result<ParseTree, SyntaxError> {
        let rule = NodeKind::ConstDeclaration;
        let mut constants = vec![];
        loop {
            let name = self.identifier(rule)?;
            self.expect(&Token::Equal, "`=`", rule)?;
            let value = self.number(rule)?;
            constants.push(ParseTree::node(NodeKind::Constant, [name, value]));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::Semicolon, "`;`", rule)?;
        Ok(ParseTree::node(rule, constants))
    }

    // "var" already consumed
    fn var_declaration(&mut self) -> Result<ParseTree, SyntaxError> {
        let rule = NodeKind::VarDeclaration;
        let first = self.identifier(rule)?;
        let mut rest = vec![];
        while self.eat(&Token::Comma) {
            rest.push(self.identifier(rule)?);
        }
        self.expect(&Token::Semicolon, "`;`", rule)?;
        Ok(ParseTree::node(
            rule,
            [nest(NodeKind::Identifiers, first, rest)],
        ))
    }

    // "procedure" already consumed
    fn procedure_declaration(&mut self) -> Result<ParseTree, SyntaxError> {
        let rule = NodeKind::ProcedureDeclaration;
        let name = self.identifier(rule)?;
        self.expect(&Token::Semicolon, "`;`", rule)?;
        let body = self.block()?;
        self.expect(&Token::Semicolon, "`;`", rule)?;
        Ok(ParseTree::node(rule, [name, body]))
    }

    fn statement(&mut self) -> Result<ParseTree, SyntaxError> {
        self.nested(NodeKind::Statement, Self::statement_kind)
    }

    fn statement_kind(&mut self) -> Result<ParseTree, SyntaxError> {
        let inner = match self.peek() {
            Some(Token::Identifier(_)) => {
                let rule = NodeKind::Assignment;
                let target = self.identifier(rule)?;
                self.expect(&Token::Becomes, "`:=`", rule)?;
                let value = self.expression()?;
                ParseTree::node(rule, [target, value])
            }
            Some(Token::Call) => {
                self.bump();
                let target = self.identifier(NodeKind::CallStatement)?;
                ParseTree::node(NodeKind::CallStatement, [target])
            }
            Some(Token::Begin) => {
                self.bump();
                let first = self.statement()?;
                let mut rest = vec![];
                while self.eat(&Token::Semicolon) {
                    rest.push(self.statement()?);
                }
                self.expect(&Token::End, "`;` or `end`", NodeKind::BeginBlock)?;
                ParseTree::node(
                    NodeKind::BeginBlock,
                    [nest(NodeKind::Statements, first, rest)],
                )
            }
            Some(Token::If) => {
                self.bump();
                let condition = self.condition()?;
                self.expect(&Token::Then, "`then`", NodeKind::IfStatement)?;
                let body = self.statement()?;
                ParseTree::node(NodeKind::IfStatement, [condition, body])
            }
            Some(Token::While) => {
                self.bump();
                let condition = self.condition()?;
                self.expect(&Token::Do, "`do`", NodeKind::WhileStatement)?;
                let body = self.statement()?;
                ParseTree::node(NodeKind::WhileStatement, [condition, body])
            }
            Some(Token::Read) => {
                self.bump();
                let target = self.identifier(NodeKind::ReadStatement)?;
                ParseTree::node(NodeKind::ReadStatement, [target])
            }
            Some(Token::Write) => {
                self.bump();
                let value = self.expression()?;
                ParseTree::node(NodeKind::WriteStatement, [value])
            }
            // the empty statement
            _ => return Ok(ParseTree::node(NodeKind::Statement, [])),
        };
        Ok(ParseTree::node(NodeKind::Statement, [inner]))
    }

    fn condition(&mut self) -> Result<ParseTree, SyntaxError> {
        if self.eat(&Token::Odd) {
            let operand = self.expression()?;
            return Ok(ParseTree::node(
                NodeKind::Condition,
                [ParseTree::node(NodeKind::Odd, []), operand],
            ));
        }

        let lhs = self.expression()?;
        let op = match self.peek() {
            Some(
                tok @ (Token::Equal
                | Token::NotEqual
                | Token::Less
                | Token::LessEqual
                | Token::Greater
                | Token::GreaterEqual),
            ) => tok.symbol(),
            _ => None,
        };
        let Some(op) = op else {
            return Err(self.error("a relational operator", NodeKind::Condition));
        };
        self.bump();
        let rhs = self.expression()?;
        Ok(ParseTree::node(
            NodeKind::Condition,
            [lhs, ParseTree::terminal(NodeKind::RelOp, op), rhs],
        ))
    }

    // the operator spelling if the current token is one of `ops`
    fn operator(&self, ops: &[Token]) -> Option<&'static str> {
        self.peek()
            .filter(|tok| ops.contains(tok))
            .and_then(Token::symbol)
    }

    fn expression(&mut self) -> Result<ParseTree, SyntaxError> {
        self.nested(NodeKind::Expression, Self::terms)
    }

    // [sign] term { add-op term }
    fn terms(&mut self) -> Result<ParseTree, SyntaxError> {
        const ADDITIVE: [Token; 2] = [Token::Plus, Token::Minus];
        let mut children = vec![];
        if let Some(sign) = self.operator(&ADDITIVE) {
            self.bump();
            children.push(ParseTree::terminal(NodeKind::AddOp, sign));
        }
        children.push(self.term()?);
        while let Some(op) = self.operator(&ADDITIVE) {
            self.bump();
            children.push(ParseTree::terminal(NodeKind::AddOp, op));
            children.push(self.term()?);
        }
        Ok(ParseTree::node(NodeKind::Expression, children))
    }

    fn term(&mut self) -> Result<ParseTree, SyntaxError> {
        const MULTIPLICATIVE: [Token; 2] = [Token::Times, Token::Slash];
        let mut children = vec![self.factor()?];
        while let Some(op) = self.operator(&MULTIPLICATIVE) {
            self.bump();
            children.push(ParseTree::terminal(NodeKind::MulOp, op));
            children.push(self.factor()?);
        }
        Ok(ParseTree::node(NodeKind::Term, children))
    }

    fn factor(&mut self) -> Result<ParseTree, SyntaxError> {
        let rule = NodeKind::Factor;
        let inner = match self.peek() {
            Some(Token::Identifier(_)) => self.identifier(rule)?,
            Some(Token::Number(_)) => self.number(rule)?,
            Some(Token::LParen) => {
                self.bump();
                let inner = self.expression()?;
                self.expect(&Token::RParen, "`)`", rule)?;
                inner
            }
            _ => return Err(self.error("an identifier, a number or `(`", rule)),
        };
        Ok(ParseTree::node(rule, [inner]))
    }
}
