/*!
  Execution tracing and memory dumps. With tracing on, the machine writes a disassembly line
  before each instruction and a snapshot of the live stack after it:

  ```text
  0000: iconst   3
        stack=[0=3]
  0002: iconst   4
        stack=[0=3,1=4]
  0004:   iadd
        stack=[0=7]
  ```

  Each disassembly line is preceded by an `Opcode: <n>` header, which goes to the machine's
  console (standard output unless replaced) even when the sink is a file.
*/

use std::io::Write;
use std::mem;

use crate::bytecode::{decode_instruction, Instruction, Word};
use crate::error::VmError;
use crate::mvm::Machine;
use crate::sink::Sink;

impl Machine {

  // region Writers

  /// Writes the instruction at `ip` as `addr: mnemonic operands`.
  pub(crate) fn disassemble(&mut self, ip: usize, out: &mut dyn Write) -> Result<(), VmError> {
    let instruction = decode_instruction(&self.code, ip)?;

    writeln!(self.console, "Opcode: {}", self.code[ip])?;
    write!(out, "{:04}: {:>6}", ip, instruction.opcode().mnemonic())?;

    match instruction {
      Instruction::Unary { operand, .. } => {
        write!(out, "{:>4}", operand)?;
      }
      Instruction::Binary { first, second, .. } => {
        write!(out, " {} {}", first, second)?;
      }
      // No operand column, so the line ends at the mnemonic.
      Instruction::Nullary(_) => {}
    }

    writeln!(out)?;
    Ok(())
  }

  pub(crate) fn write_stack(&self, out: &mut dyn Write) -> Result<(), VmError> {
    let cells =
      self
        .stack()
        .iter()
        .enumerate()
        .map(|(i, value)| format!("{}={}", i, value))
        .collect::<Vec<String>>()
        .join(",");

    writeln!(out, "      stack=[{}]", cells)?;
    Ok(())
  }

  pub(crate) fn write_data_mem(&self, out: &mut dyn Write) -> Result<(), VmError> {
    write_memory(out, "Data memory", &self.globals)
  }

  pub(crate) fn write_code_mem(&self, out: &mut dyn Write) -> Result<(), VmError> {
    write_memory(out, "Code memory:", &self.code)
  }

  // endregion

  // region Dumps to the sink

  /*
    Outside of `run` there is no open writer, so each dump opens the sink for itself. A file
    sink is opened in append mode, after whatever the run wrote.
  */

  pub fn dump_stack(&mut self) -> Result<(), VmError> {
    self.with_open_sink(Machine::write_stack)
  }

  pub fn dump_data_mem(&mut self) -> Result<(), VmError> {
    self.with_open_sink(Machine::write_data_mem)
  }

  pub fn dump_code_mem(&mut self) -> Result<(), VmError> {
    self.with_open_sink(Machine::write_code_mem)
  }

  fn with_open_sink<F>(&mut self, write: F) -> Result<(), VmError>
    where F: FnOnce(&Machine, &mut dyn Write) -> Result<(), VmError>
  {
    let mut sink = mem::replace(&mut self.sink, Sink::Stdout);
    let result = {
      let mut out = sink.open();
      write(self, &mut out).and_then(|_| out.flush().map_err(VmError::from))
    };
    self.sink = sink;
    result
  }

  // endregion

}

/// Every non-negative cell of `memory`; negative cells are treated as unset and skipped.
fn write_memory(out: &mut dyn Write, title: &str, memory: &[Word])
  -> Result<(), VmError>
{
  write!(out, "\n\t{}\n\t---------\n", title)?;

  for (i, value) in memory.iter().enumerate() {
    if *value >= 0 {
      writeln!(out, "\t{:04}: {}", i, value)?;
    }
  }

  writeln!(out)?;
  Ok(())
}
