/*!
  A minimal stack-based bytecode virtual machine.

  A program is a flat array of integer words holding opcodes and their inline operands. The
  machine executes it against an operand stack, a global data segment, and call frames that
  live on the operand stack itself. Programs are usually produced from text by the assembler:

  ```no_run
  use mvm::{assemble, Machine};

  let program = assemble("iconst 3\niconst 4\niadd\nprint\nhalt\n").unwrap();
  let mut machine = Machine::from_program(program, 0);
  machine.run().unwrap(); // prints 7
  ```
*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

pub mod address;
pub mod bytecode;
pub mod error;
pub mod mvm;
pub mod sink;
pub mod symboltable;
mod trace;

pub use crate::bytecode::{assemble, Instruction, Opcode, Program, Word};
pub use crate::error::{AssemblyError, FaultKind, VmError};
pub use crate::mvm::{Exit, Machine, DEFAULT_STACK_SIZE};
pub use crate::sink::{SharedBuffer, Sink};
