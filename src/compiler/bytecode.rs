//! Instructions of the stack machine.
//!
//! The numbering of [`Opcode`], [`Opr`] and [`Sio`] is what machine
//! implementations read, so it must never change.
use core::fmt;
use std::str::FromStr;

use arbitrary::Arbitrary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Arbitrary)]
#[repr(u8)]
pub enum Opcode {
    /// push the modifier as a literal
    Lit = 1,
    /// arithmetic, comparison or return, selected by [`Opr`]
    Opr = 2,
    /// push the variable at (level, offset)
    Lod = 3,
    /// pop into the variable at (level, offset)
    Sto = 4,
    /// call the procedure at the modifier address
    Cal = 5,
    /// reserve frame cells
    Inc = 6,
    Jmp = 7,
    /// jump when the popped value is false
    Jpc = 8,
    /// I/O, selected by [`Sio`]
    Sio = 9,
}

impl Opcode {
    pub const ALL: [Opcode; 9] = [
        Opcode::Lit,
        Opcode::Opr,
        Opcode::Lod,
        Opcode::Sto,
        Opcode::Cal,
        Opcode::Inc,
        Opcode::Jmp,
        Opcode::Jpc,
        Opcode::Sio,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.code() == code)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Lit => "lit",
            Opcode::Opr => "opr",
            Opcode::Lod => "lod",
            Opcode::Sto => "sto",
            Opcode::Cal => "cal",
            Opcode::Inc => "inc",
            Opcode::Jmp => "jmp",
            Opcode::Jpc => "jpc",
            Opcode::Sio => "sio",
        }
    }

    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.mnemonic() == mnemonic)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Selectors for [`Opcode::Opr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opr {
    Return = 0,
    Negate = 1,
    Add = 2,
    Subtract = 3,
    Multiply = 4,
    Divide = 5,
    Odd = 6,
    Modulo = 7,
    Equal = 8,
    NotEqual = 9,
    Less = 10,
    LessOrEqual = 11,
    Greater = 12,
    GreaterOrEqual = 13,
}

impl Opr {
    pub fn code(self) -> i64 {
        self as i64
    }

    /// Maps the spelling of a relational operator.
    pub fn relation(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "=" => Self::Equal,
            "<>" | "#" => Self::NotEqual,
            "<" => Self::Less,
            "<=" => Self::LessOrEqual,
            ">" => Self::Greater,
            ">=" => Self::GreaterOrEqual,
            _ => return None,
        })
    }

    /// Maps the spelling of an additive or multiplicative operator.
    pub fn arithmetic(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => Self::Add,
            "-" => Self::Subtract,
            "*" => Self::Multiply,
            "/" => Self::Divide,
            _ => return None,
        })
    }
}

/// Selectors for [`Opcode::Sio`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Sio {
    Write = 1,
    Read = 2,
}

impl Sio {
    pub fn code(self) -> i64 {
        self as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Arbitrary)]
pub struct Instruction {
    pub opcode: Opcode,
    pub level: u32,
    pub modifier: i64,
}

impl Instruction {
    pub fn new(opcode: Opcode, level: u32, modifier: i64) -> Self {
        Self {
            opcode,
            level,
            modifier,
        }
    }

    pub fn lit(value: i64) -> Self {
        Self::new(Opcode::Lit, 0, value)
    }

    pub fn opr(opr: Opr) -> Self {
        Self::new(Opcode::Opr, 0, opr.code())
    }

    pub fn sio(sio: Sio) -> Self {
        Self::new(Opcode::Sio, 0, sio.code())
    }

    /// The `(opcode, level, modifier)` triple as machines consume it.
    pub fn triple(&self) -> (u8, u32, i64) {
        (self.opcode.code(), self.level, self.modifier)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.opcode, self.level, self.modifier)
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Clone)]
pub enum ListingError {
    #[error("unknown mnemonic `{0}`")]
    UnknownMnemonic(Box<str>),
    #[error("`{0}` is not a valid {1}")]
    BadField(Box<str>, &'static str),
    #[error("incomplete instruction at the end of the listing")]
    Incomplete,
    #[error("trailing `{0}` after instruction")]
    Trailing(Box<str>),
}

fn read_instruction<'a>(
    words: &mut impl Iterator<Item = &'a str>,
) -> Result<Option<Instruction>, ListingError> {
    let Some(mnemonic) = words.next() else {
        return Ok(None);
    };
    let opcode = Opcode::from_mnemonic(mnemonic)
        .ok_or_else(|| ListingError::UnknownMnemonic(mnemonic.into()))?;
    let level = words.next().ok_or(ListingError::Incomplete)?;
    let level = level
        .parse()
        .map_err(|_| ListingError::BadField(level.into(), "lexical level"))?;
    let modifier = words.next().ok_or(ListingError::Incomplete)?;
    let modifier = modifier
        .parse()
        .map_err(|_| ListingError::BadField(modifier.into(), "modifier"))?;
    Ok(Some(Instruction::new(opcode, level, modifier)))
}

impl FromStr for Instruction {
    type Err = ListingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let instruction = read_instruction(&mut words)?.ok_or(ListingError::Incomplete)?;
        match words.next() {
            Some(extra) => Err(ListingError::Trailing(extra.into())),
            None => Ok(instruction),
        }
    }
}

/// Reads a whitespace separated sequence of `mnemonic level modifier` triples,
/// e.g. `"lit 0 1 sio 0 1 opr 0 0"`.
pub fn parse_listing(listing: &str) -> Result<Vec<Instruction>, ListingError> {
    let mut words = listing.split_whitespace();
    let mut instructions = vec![];
    while let Some(instruction) = read_instruction(&mut words)? {
        instructions.push(instruction);
    }
    Ok(instructions)
}

#[cfg(test)]
mod tests {
    use super::{parse_listing, Instruction, ListingError, Opcode, Opr, Sio};
    use arbtest::arbtest;
    use assert2::{assert, check, let_assert};

    #[test]
    fn numbering_is_fixed() {
        let codes: Vec<_> = Opcode::ALL.into_iter().map(Opcode::code).collect();
        check!(codes == vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
        check!(Opr::Return.code() == 0);
        check!(Opr::Odd.code() == 6);
        check!(Opr::Modulo.code() == 7);
        check!(Opr::GreaterOrEqual.code() == 13);
        check!(Sio::Write.code() == 1);
        check!(Sio::Read.code() == 2);
        check!(Opcode::from_code(0) == None);
        check!(Opcode::from_code(8) == Some(Opcode::Jpc));
    }

    #[test]
    fn operator_spellings() {
        check!(Opr::relation("#") == Some(Opr::NotEqual));
        check!(Opr::relation("<>") == Some(Opr::NotEqual));
        check!(Opr::relation("+") == None);
        check!(Opr::arithmetic("/") == Some(Opr::Divide));
        check!(Opr::arithmetic("=") == None);
    }

    #[test]
    fn listing_reads_triples() {
        let_assert!(Ok(code) = parse_listing(" lit 0 0\n opr 0 0\n lod 1 3"));
        check!(
            code == vec![
                Instruction::lit(0),
                Instruction::opr(Opr::Return),
                Instruction::new(Opcode::Lod, 1, 3),
            ]
        );
        check!(parse_listing("") == Ok(vec![]));
        check!(parse_listing("lit 0") == Err(ListingError::Incomplete));
        check!(parse_listing("nop 0 0") == Err(ListingError::UnknownMnemonic("nop".into())));
        check!(
            parse_listing("lit x 0") == Err(ListingError::BadField("x".into(), "lexical level"))
        );
    }

    #[test]
    fn single_instruction() {
        check!("sio 0 2".parse::<Instruction>() == Ok(Instruction::sio(Sio::Read)));
        check!(
            "sio 0 2 opr".parse::<Instruction>() == Err(ListingError::Trailing("opr".into()))
        );
        check!(Instruction::new(Opcode::Cal, 1, 4).triple() == (5, 1, 4));
    }

    #[test]
    fn display_reads_back() {
        arbtest(|u| {
            let instruction: Instruction = u.arbitrary()?;
            assert!(instruction.to_string().parse::<Instruction>() == Ok(instruction));
            Ok(())
        });
    }
}
