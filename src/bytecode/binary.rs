/*!
  This module is responsible for the encoding and decoding of instructions to and from the
  flat word stream.

*/
use std::convert::TryFrom;

use super::{Opcode, Instruction};
use crate::address::Address;
use crate::error::VmError;

// If you change this you must also change `encode_instruction` and `decode_instruction`.
pub type Word = i64;

/// An `Either` type for an encoded instruction, allowing the instruction to be
/// one, two or three words.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EncodedInstruction {
  Word(Word),
  DoubleWord(Word, Word),
  TripleWord(Word, Word, Word)
}

impl EncodedInstruction {
  pub fn words(&self) -> Vec<Word> {
    match *self {
      EncodedInstruction::Word(a)             => vec![a],
      EncodedInstruction::DoubleWord(a, b)    => vec![a, b],
      EncodedInstruction::TripleWord(a, b, c) => vec![a, b, c],
    }
  }
}

/// Interprets a single word as an opcode. `address` is only used to report failure.
pub fn decode_opcode(word: Word, address: usize) -> Result<Opcode, VmError> {
  u8::try_from(word)
    .ok()
    .and_then(|byte| Opcode::try_from(byte).ok())
    .ok_or(VmError::UnknownOpcode { address: Address::Code(address), opcode: word })
}

/**
  Decodes the instruction beginning at `address`, reading as many operand words as the
  opcode's arity requires. Operands are read directly from the stream, so a truncated
  instruction at the end of `code` is reported rather than padded.
*/
pub fn decode_instruction(code: &[Word], address: usize) -> Result<Instruction, VmError> {
  let word_at = |idx: usize| -> Result<Word, VmError> {
    code.get(idx).copied().ok_or(VmError::CodeOutOfBounds {
      address: Address::Code(idx),
      length: code.len()
    })
  };

  let opcode = decode_opcode(word_at(address)?, address)?;

  let instruction =
    match opcode.arity() {
      2 => Instruction::Binary {
        opcode,
        first: word_at(address + 1)?,
        second: word_at(address + 2)?,
      },
      1 => Instruction::Unary {
        opcode,
        operand: word_at(address + 1)?,
      },
      _ => Instruction::Nullary(opcode)
    };

  Ok(instruction)
}

/**
  Encodes the instruction into bytecode. It is the caller's responsibility to
  use the correct `Instruction` variant for the given opcode.
*/
pub fn encode_instruction(instruction: Instruction) -> EncodedInstruction {
  match instruction {

    Instruction::Binary { opcode, first, second } => {
      // [OpCode][Operand][Operand]
      EncodedInstruction::TripleWord(opcode.code() as Word, first, second)
    },

    Instruction::Unary { opcode, operand } => {
      // [OpCode][Operand]
      EncodedInstruction::DoubleWord(opcode.code() as Word, operand)
    },

    Instruction::Nullary(opcode) => {
      // [OpCode]
      EncodedInstruction::Word(opcode.code() as Word)
    },
  }
}

/// Returns the size in WORDS of an instruction for the corresponding opcode.
pub fn instruction_size(opcode: Opcode) -> usize {
  opcode.arity() + 1
}
