//! Faults raised by the machine and errors raised while assembling source text.

use thiserror::Error;

use crate::address::Address;
use crate::bytecode::Word;

/// The three classes of failure a run can end in.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FaultKind {
  /// The instruction stream itself is bad: unknown opcode, or an address outside a store.
  MalformedProgram,
  /// A push or pop, or a frame access, went outside the live operand stack.
  StackFault,
  /// Writing to the output sink failed.
  IoFault,
}

/// Errors that stop a run. None of them are recoverable; side effects already performed
/// (printed lines, global writes) remain.
#[derive(Debug, Error)]
pub enum VmError {
  #[error("unknown opcode {opcode} at {address}")]
  UnknownOpcode { address: Address, opcode: Word },

  #[error("{address} is outside the instruction array of length {length}")]
  CodeOutOfBounds { address: Address, length: usize },

  #[error("entry address {entry} is outside the instruction array of length {length}")]
  EntryOutOfBounds { entry: usize, length: usize },

  #[error("jump to invalid target {target} at {address}")]
  InvalidJump { address: Address, target: Word },

  #[error("global slot {offset} is outside the segment of length {length} at {at}")]
  GlobalOutOfBounds { at: Address, offset: Word, length: usize },

  #[error("stack underflow at {at}")]
  StackUnderflow { at: Address },

  #[error("stack overflow at {at}: capacity is {capacity} words")]
  StackOverflow { at: Address, capacity: usize },

  #[error("frame slot {slot} is outside the live stack (sp = {sp}) at {at}")]
  FrameSlotOutOfBounds { at: Address, slot: Address, sp: isize },

  #[error("init at {at} does not sit directly on a call frame")]
  BadInit { at: Address },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

impl VmError {
  pub fn kind(&self) -> FaultKind {
    match self {
      | VmError::UnknownOpcode { .. }
      | VmError::CodeOutOfBounds { .. }
      | VmError::EntryOutOfBounds { .. }
      | VmError::InvalidJump { .. }
      | VmError::GlobalOutOfBounds { .. } => FaultKind::MalformedProgram,

      | VmError::StackUnderflow { .. }
      | VmError::StackOverflow { .. }
      | VmError::FrameSlotOutOfBounds { .. }
      | VmError::BadInit { .. } => FaultKind::StackFault,

      VmError::Io(_) => FaultKind::IoFault,
    }
  }
}

/// Errors raised while turning assembly text into a program. Lines count from 1.
#[derive(Debug, Error)]
pub enum AssemblyError {
  #[error("Error on line {line}: {name} is not an operation.")]
  NotAnOperation { line: usize, name: String },

  #[error("Error on line {line}: {mnemonic} requires {expected} arguments but was given {found}")]
  WrongArity { line: usize, mnemonic: &'static str, expected: usize, found: usize },

  #[error("Error on line {line}: undefined label {label}")]
  UndefinedLabel { line: usize, label: String },

  #[error("Error on line {line}: label {label} is already defined")]
  DuplicateLabel { line: usize, label: String },

  #[error("Error on line {line}: label {label} names the same address as {other}")]
  AliasedLabel { line: usize, label: String, other: String },

  #[error("Error on line {line}: cannot parse `{text}`")]
  Syntax { line: usize, text: String },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}
