/*!
  The human readable textual form of bytecode is called assembly. This module parses assembly
  with `nom` and resolves it into a `Program` the machine can run.

  One instruction per line. A line may start with a label definition (`loop:`), and may end
  with a comment introduced by `//` or `;`. Operands are separated by whitespace or commas and
  are either integer literals or label names. Mnemonics are matched case-insensitively.

  ```text
  // sum of two numbers
  main:   iconst 3
          iconst 4
          iadd
          print
          halt
  ```
*/

use nom::{
  branch::alt,
  bytes::complete::{tag, take_while},
  character::complete::{
    alpha1,
    alphanumeric1,
    char as one_char,
    digit1,
    space0
  },
  combinator::{all_consuming, map, map_res, opt, recognize, rest},
  multi::many0,
  sequence::{pair, preceded, terminated, tuple},
  IResult
};

use crate::address::Address;
use crate::bytecode::{Opcode, Program, Word};
use crate::error::AssemblyError;
use crate::symboltable::SymbolTable;

/// The label every program starts at, if it defines one.
pub const ENTRY_LABEL: &str = "main";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operand<'a> {
  Literal(Word),
  Label(&'a str)
}

/// A statement before its mnemonic is checked against the instruction set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Statement<'a> {
  pub mnemonic : &'a str,
  pub operands : Vec<Operand<'a>>,
}

/// One source line. Blank and comment-only lines have neither a label nor a statement.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AssemblyLine<'a> {
  pub number    : usize,
  pub label     : Option<&'a str>,
  pub statement : Option<Statement<'a>>,
}

// region Parsers

fn identifier(input: &str) -> IResult<&str, &str> {
  recognize(
    pair(
      alt((alpha1, tag("_"))),
      many0(alt((alphanumeric1, tag("_"))))
    )
  )(input)
}

fn integer(input: &str) -> IResult<&str, Word> {
  map_res(
    recognize(pair(opt(one_char('-')), digit1)),
    |out: &str| out.parse::<Word>()
  )(input)
}

fn separator(input: &str) -> IResult<&str, &str> {
  take_while(|c: char| c == ' ' || c == '\t' || c == ',')(input)
}

fn operand(input: &str) -> IResult<&str, Operand> {
  alt((
    map(integer, Operand::Literal),
    map(identifier, Operand::Label)
  ))(input)
}

fn comment(input: &str) -> IResult<&str, &str> {
  alt((
    preceded(tag("//"), rest),
    preceded(one_char(';'), rest)
  ))(input)
}

fn label_definition(input: &str) -> IResult<&str, &str> {
  terminated(identifier, pair(space0, one_char(':')))(input)
}

fn statement(input: &str) -> IResult<&str, Statement> {
  map(
    pair(
      // Trailing punctuation on a mnemonic is tolerated, as in `iadd,`.
      recognize(pair(identifier, take_while(|c: char| c == '.' || c == '!'))),
      many0(preceded(separator, operand))
    ),
    |(mnemonic, operands)| Statement { mnemonic, operands }
  )(input)
}

fn line(input: &str) -> IResult<&str, (Option<&str>, Option<Statement>)> {
  map(
    all_consuming(tuple((
      space0,
      opt(terminated(label_definition, space0)),
      opt(statement),
      separator,
      opt(comment)
    ))),
    |(_, label, statement, _, _)| (label, statement)
  )(input)
}

// endregion

/**
  Splits `text` into lines and parses each one. Nothing is resolved here: mnemonics are not
  yet checked and labels are not yet looked up.
*/
pub fn parse_assembly(text: &str) -> Result<Vec<AssemblyLine>, AssemblyError> {
  text
    .lines()
    .enumerate()
    .map(|(i, source)| {
      let number = i + 1;
      match line(source.trim_end_matches('\r')) {
        Ok((_rest, (label, statement))) => Ok(AssemblyLine { number, label, statement }),
        Err(_e) => Err(AssemblyError::Syntax { line: number, text: source.trim().to_string() })
      }
    })
    .collect()
}

/**
  Assembles source text into a program in two passes. The first pass assigns an address to
  every label and checks every mnemonic and its operand count; the second emits words with
  label operands replaced by their addresses.

  The entry address is the address of `main` if the program defines it, and 0 otherwise.
*/
pub fn assemble(text: &str) -> Result<Program, AssemblyError> {
  let lines = parse_assembly(text)?;

  let mut symbols    = SymbolTable::new();
  let mut statements = Vec::new();
  let mut address    = 0usize;

  for line in lines {
    let number = line.number;
    if let Some(label) = line.label {
      if let Err((_, taken)) = symbols.insert(label, Address::Code(address)) {
        return Err(
          match symbols.get_address(label) {
            Some(_) => AssemblyError::DuplicateLabel {
              line: number,
              label: label.to_string()
            },
            None => AssemblyError::AliasedLabel {
              line: number,
              label: label.to_string(),
              other: symbols.get_symbol(&taken).map(|s| s.to_string()).unwrap_or_default()
            }
          }
        );
      }
    }

    if let Some(statement) = line.statement {
      let opcode = Opcode::from_mnemonic(statement.mnemonic).ok_or_else(|| {
        AssemblyError::NotAnOperation { line: number, name: statement.mnemonic.to_string() }
      })?;

      if statement.operands.len() != opcode.arity() {
        return Err(AssemblyError::WrongArity {
          line: number,
          mnemonic: opcode.mnemonic(),
          expected: opcode.arity(),
          found: statement.operands.len()
        });
      }

      address += opcode.arity() + 1;
      statements.push((number, opcode, statement.operands));
    }
  }

  let mut code: Vec<Word> = Vec::with_capacity(address);
  for (number, opcode, operands) in statements {
    code.push(opcode.code() as Word);
    for operand in operands {
      let word =
        match operand {
          Operand::Literal(value) => value,
          Operand::Label(name) => {
            symbols
              .get_address(name)
              .and_then(|a| a.idx())
              .ok_or_else(|| AssemblyError::UndefinedLabel {
                line: number,
                label: name.to_string()
              })? as Word
          }
        };
      code.push(word);
    }
  }

  let entry =
    symbols
      .get_address(ENTRY_LABEL)
      .and_then(|a| a.idx())
      .unwrap_or(0);

  Ok(Program { code, entry, symbols })
}
