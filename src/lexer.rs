use core::fmt;

pub use logos::Span;
use logos::{Lexer, Logos};

fn read_number(lexer: &mut Lexer<Token>) -> Result<i64, LexerError> {
    let mut value = 0i64;

    for chr in lexer.slice().chars() {
        let Some(digit) = chr.to_digit(10) else {
            return Err(LexerError::Invalid);
        };
        value = value
            .checked_mul(10)
            .ok_or(LexerError::NumberTooBig)?
            .checked_add(i64::from(digit))
            .ok_or(LexerError::NumberTooBig)?;
    }

    Ok(value)
}

#[derive(thiserror::Error, Debug, PartialEq, Clone, Default)]
pub enum LexerError {
    #[default]
    #[error("invalid token encountered")]
    Invalid,
    #[error("number literal too big")]
    NumberTooBig,
}

/// Tokens of the PL/0 source language.
///
/// Trivia (whitespace, line endings and `{ ... }` comments) is lexed too, so
/// spans stay faithful to the source; the parser skips it.
#[derive(Debug, Clone, PartialEq, Logos)]
#[logos(error = LexerError)]
pub enum Token {
    #[regex("[ \t\x0C]+")]
    IntralineWhitespace,
    #[token("\n")]
    #[token("\r\n")]
    #[token("\r")]
    LineEnding,
    #[regex(r"\{[^}]*\}")]
    Comment,

    #[token("const")]
    Const,
    #[token("var")]
    Var,
    #[token("procedure")]
    Procedure,
    #[token("call")]
    Call,
    #[token("begin")]
    Begin,
    #[token("end")]
    End,
    #[token("if")]
    If,
    #[token("then")]
    Then,
    #[token("while")]
    While,
    #[token("do")]
    Do,
    #[token("read")]
    Read,
    #[token("write")]
    Write,
    #[token("odd")]
    Odd,

    #[regex("[a-zA-Z_][a-zA-Z0-9_]*", |l| Box::from(l.slice()))]
    Identifier(Box<str>),
    #[regex("[0-9]+", read_number)]
    Number(i64),

    #[token(":=")]
    Becomes,
    #[token("=")]
    Equal,
    #[token("<>")]
    #[token("#")]
    NotEqual,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEqual,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEqual,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Times,
    #[token("/")]
    Slash,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(".")]
    Period,
}

impl Token {
    pub fn lexer(source: &str) -> Lexer<Self> {
        <Self as Logos>::lexer(source)
    }

    /// Tokens with no meaning to the grammar.
    pub fn is_trivia(&self) -> bool {
        matches!(
            self,
            Self::IntralineWhitespace | Self::LineEnding | Self::Comment
        )
    }

    /// The source spelling of keywords, operators and punctuation.
    pub fn symbol(&self) -> Option<&'static str> {
        Some(match self {
            Self::Const => "const",
            Self::Var => "var",
            Self::Procedure => "procedure",
            Self::Call => "call",
            Self::Begin => "begin",
            Self::End => "end",
            Self::If => "if",
            Self::Then => "then",
            Self::While => "while",
            Self::Do => "do",
            Self::Read => "read",
            Self::Write => "write",
            Self::Odd => "odd",
            Self::Becomes => ":=",
            Self::Equal => "=",
            Self::NotEqual => "<>",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Times => "*",
            Self::Slash => "/",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::Comma => ",",
            Self::Semicolon => ";",
            Self::Period => ".",
            Self::IntralineWhitespace
            | Self::LineEnding
            | Self::Comment
            | Self::Identifier(_)
            | Self::Number(_) => return None,
        })
    }

    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            Self::Const
                | Self::Var
                | Self::Procedure
                | Self::Call
                | Self::Begin
                | Self::End
                | Self::If
                | Self::Then
                | Self::While
                | Self::Do
                | Self::Read
                | Self::Write
                | Self::Odd
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(name) => write!(f, "identifier `{name}`"),
            Self::Number(value) => write!(f, "number {value}"),
            Self::IntralineWhitespace => write!(f, "whitespace"),
            Self::LineEnding => write!(f, "line ending"),
            Self::Comment => write!(f, "comment"),
            tok => match tok.symbol() {
                Some(sym) if tok.is_keyword() => write!(f, "keyword `{sym}`"),
                Some(sym) => write!(f, "`{sym}`"),
                None => write!(f, "{tok:?}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LexerError, Token};
    use arbtest::arbtest;
    use assert2::{assert, check, let_assert};

    fn significant(source: &str) -> Vec<Result<Token, LexerError>> {
        Token::lexer(source)
            .filter(|tok| !tok.as_ref().is_ok_and(Token::is_trivia))
            .collect()
    }

    #[test]
    fn keywords_win_over_identifiers() {
        check!(Token::lexer("begin").next() == Some(Ok(Token::Begin)));
        check!(Token::lexer("odd").next() == Some(Ok(Token::Odd)));
        // only whole words are keywords
        check!(Token::lexer("beginning").next() == Some(Ok(Token::Identifier("beginning".into()))));
        check!(Token::lexer("do_it").next() == Some(Ok(Token::Identifier("do_it".into()))));
        // case matters unless the source is folded beforehand
        check!(Token::lexer("BEGIN").next() == Some(Ok(Token::Identifier("BEGIN".into()))));
    }

    #[test]
    fn operators() {
        let tokens = significant(":= = <> # < <= > >= + - * / ( ) , ; .");
        check!(
            tokens
                == vec![
                    Ok(Token::Becomes),
                    Ok(Token::Equal),
                    Ok(Token::NotEqual),
                    Ok(Token::NotEqual),
                    Ok(Token::Less),
                    Ok(Token::LessEqual),
                    Ok(Token::Greater),
                    Ok(Token::GreaterEqual),
                    Ok(Token::Plus),
                    Ok(Token::Minus),
                    Ok(Token::Times),
                    Ok(Token::Slash),
                    Ok(Token::LParen),
                    Ok(Token::RParen),
                    Ok(Token::Comma),
                    Ok(Token::Semicolon),
                    Ok(Token::Period),
                ]
        );
    }

    #[test]
    fn comments_and_line_endings_are_trivia() {
        let mut lexer = Token::lexer("x { a comment\n spanning lines }\r\ny");
        check!(lexer.next() == Some(Ok(Token::Identifier("x".into()))));
        check!(lexer.next() == Some(Ok(Token::IntralineWhitespace)));
        let_assert!(Some(Ok(comment)) = lexer.next());
        check!(comment.is_trivia());
        check!(lexer.next() == Some(Ok(Token::LineEnding)));
        check!(lexer.slice() == "\r\n");
        check!(lexer.next() == Some(Ok(Token::Identifier("y".into()))));
        check!(lexer.next() == None);
    }

    #[test]
    fn number_too_big() {
        check!(Token::lexer("9223372036854775807").next() == Some(Ok(Token::Number(i64::MAX))));
        check!(
            Token::lexer("9223372036854775808").next() == Some(Err(LexerError::NumberTooBig))
        );
    }

    #[test]
    fn invalid_characters() {
        let mut lexer = Token::lexer("x ? y");
        check!(lexer.next() == Some(Ok(Token::Identifier("x".into()))));
        check!(lexer.next() == Some(Ok(Token::IntralineWhitespace)));
        check!(lexer.next() == Some(Err(LexerError::Invalid)));
        check!(lexer.span() == (2..3));
    }

    #[test]
    fn display_describes_the_token() {
        check!(Token::Begin.to_string() == "keyword `begin`");
        check!(Token::Semicolon.to_string() == "`;`");
        check!(Token::Identifier("x".into()).to_string() == "identifier `x`");
        check!(Token::Number(12).to_string() == "number 12");
    }

    #[test]
    fn test_number_arbtest() {
        arbtest(|u| {
            let value: u32 = u.arbitrary()?;
            let source = value.to_string();
            let mut lexer = Token::lexer(&source);
            assert!(lexer.next() == Some(Ok(Token::Number(i64::from(value)))));
            assert!(lexer.next() == None);
            Ok(())
        });
    }
}
