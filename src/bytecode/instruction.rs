use std::fmt::{Display, Formatter};
use std::str::FromStr;

use strum_macros::{Display as StrumDisplay, IntoStaticStr, EnumString, EnumIter};
use num_enum::{TryFromPrimitive, IntoPrimitive};

use crate::bytecode::Word;

/**
  Opcodes of the virtual machine.

  The discriminants are the values that appear in the instruction stream, so they are
  fixed explicitly rather than left to declaration order. Value 0 is reserved and never
  decodes to an operation. Order-dependencies:
      ```
      Opcode::arity()
      binary::decode_instruction()
      ```
*/
#[derive(
StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq,         PartialEq, Debug,            Hash
)]
#[repr(u8)]
pub enum Opcode {
  // Arithmetic and comparison //
  #[strum(to_string = "iadd")]   IAdd   = 1,   // iadd
  #[strum(to_string = "isub")]   ISub   = 2,   // isub
  #[strum(to_string = "imul")]   IMul   = 3,   // imul
  #[strum(to_string = "ilt")]    ILt    = 4,   // ilt
  #[strum(to_string = "ieq")]    IEq    = 5,   // ieq
  // Opcode 5

  // Control flow //
  #[strum(to_string = "br")]     Br     = 6,   // br( address )
  #[strum(to_string = "brt")]    BrTrue = 7,   // brt( address )
  #[strum(to_string = "brf")]    BrFalse = 8,  // brf( address )

  // Memory //
  #[strum(to_string = "iconst")] IConst = 9,   // iconst( value )
  #[strum(to_string = "load")]   Load   = 10,  // load( offset )
  #[strum(to_string = "gload")]  GLoad  = 11,  // gload( offset )
  #[strum(to_string = "store")]  Store  = 12,  // store( offset )
  #[strum(to_string = "gstore")] GStore = 13,  // gstore( offset )
  // Opcode 13

  #[strum(to_string = "print")]  Print  = 14,  // print
  #[strum(to_string = "pop")]    Pop    = 15,  // pop
  #[strum(to_string = "halt")]   Halt   = 16,  // halt

  // Procedures //
  #[strum(to_string = "call")]   Call   = 17,  // call( address, nargs )
  #[strum(to_string = "ret")]    Ret    = 18,  // ret
  #[strum(to_string = "init")]   Init   = 19,  // init
  // Opcode 19
}

pub const MIN_OPCODE: u8 = 1u8;
pub const MAX_OPCODE: u8 = 19u8;

impl Opcode {
  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  pub fn mnemonic(&self) -> &'static str {
    (*self).into()
  }

  /// The number of operand words that follow the opcode word in the instruction stream.
  pub fn arity(&self) -> usize {
    match self {
      | Opcode::Br
      | Opcode::BrTrue
      | Opcode::BrFalse
      | Opcode::IConst
      | Opcode::Load
      | Opcode::GLoad
      | Opcode::Store
      | Opcode::GStore => 1,

      Opcode::Call => 2,

      _ => 0
    }
  }

  /**
    Looks up an opcode by its mnemonic. Matching ignores case and any trailing punctuation,
    so `IADD`, `iadd` and `iadd,` all resolve to `Opcode::IAdd`.
  */
  pub fn from_mnemonic(text: &str) -> Option<Opcode> {
    let lower = text.to_ascii_lowercase();
    let trimmed = lower.trim_end_matches(|c: char| c.is_ascii_punctuation());
    Opcode::from_str(trimmed).ok()
  }
}

/// Holds the unencoded components of an instruction, one variant per operand arity.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Instruction {
  /// [OpCode][Operand][Operand]
  Binary {
    opcode: Opcode,
    first: Word,
    second: Word
  },
  /// [OpCode][Operand]
  Unary {
    opcode: Opcode,
    operand: Word
  },
  /// [OpCode]
  Nullary(Opcode),
}

impl Instruction {
  pub fn opcode(&self) -> Opcode {
    match self {
      | Instruction::Binary { opcode, .. }
      | Instruction::Unary { opcode, .. }
      | Instruction::Nullary(opcode) => *opcode
    }
  }

  /// Size of the encoded instruction in words, opcode included.
  pub fn size(&self) -> usize {
    self.opcode().arity() + 1
  }
}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {

      Instruction::Binary { opcode, first, second } => {
        write!(f, "{} {} {}", opcode, first, second)
      }

      Instruction::Unary { opcode, operand } => {
        write!(f, "{} {}", opcode, operand)
      }

      Instruction::Nullary(opcode) => {
        write!(f, "{}", opcode)
      }

    }
  }
}
