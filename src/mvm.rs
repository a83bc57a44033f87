//! Structures and functions for the execution engine, a minimal stack machine with a single
//! operand stack shared by expression evaluation and call frames.

use std::fmt::{Display, Formatter};
use std::io::{self, Write};
use std::mem;

use prettytable::{format as TableFormat, Table};
use tracing::debug;

use crate::address::Address;
use crate::bytecode::*;
use crate::error::VmError;
use crate::sink::Sink;

/// Capacity of the operand stack, in words, unless overridden with `with_stack_size`.
pub const DEFAULT_STACK_SIZE: usize = 1000;

// Numeric encoding of booleans, as produced by `ilt`/`ieq` and tested by `brt`/`brf`.
pub const TRUE  : Word = 1;
pub const FALSE : Word = 0;

/// How a run ended, when it ended without a fault.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Exit {
  /// A `halt` instruction was fetched.
  Halted,
  /// The instruction pointer reached the end of code memory.
  EndOfCode
}

pub struct Machine {

  // Flags
  pub(crate) trace: bool,

  // Memory Stores
  pub(crate) code    : Vec<Word>, // Code memory, owned for the machine's lifetime
  pub(crate) stack   : Vec<Word>, // Operand stack, fixed capacity
  pub(crate) globals : Vec<Word>, // Global slots

  // Registers //
  pub(crate) ip      : usize, // Instruction Pointer, the next word to fetch
  pub(crate) sp      : isize, // Stack Pointer, the top of stack or -1
  pub(crate) fp      : isize, // Frame Pointer, the saved return address of the frame or -1
  current            : usize, // Address of the instruction being executed, for faults

  // Output //
  pub(crate) sink    : Sink,         // PRINT, trace and dump output
  pub(crate) console : Box<dyn Write> // Disassembly headers
}

impl Machine {

  // region Construction

  /**
    Builds a machine that will start executing `code` at `entry` with `data_size` zeroed global
    slots. Nothing is checked here: an entry address outside `code` is reported by `run`.
  */
  pub fn new(code: Vec<Word>, entry: usize, data_size: usize) -> Machine {
    Machine {
      trace   : false,
      code,
      stack   : vec![0; DEFAULT_STACK_SIZE],
      globals : vec![0; data_size],
      ip      : entry,
      sp      : -1,
      fp      : -1,
      current : entry,
      sink    : Sink::Stdout,
      console : Box::new(io::stdout()),
    }
  }

  pub fn from_program(program: Program, data_size: usize) -> Machine {
    Machine::new(program.code, program.entry, data_size)
  }

  pub fn with_stack_size(mut self, capacity: usize) -> Machine {
    self.stack = vec![0; capacity];
    self
  }

  pub fn with_sink(mut self, sink: Sink) -> Machine {
    self.sink = sink;
    self
  }

  /// Replaces standard output as the destination of the `Opcode:` header lines of a trace.
  pub fn with_console<W: Write + 'static>(mut self, console: W) -> Machine {
    self.console = Box::new(console);
    self
  }

  // endregion

  // region Accessors

  pub fn set_trace(&mut self, trace: bool) {
    self.trace = trace;
  }

  pub fn is_tracing(&self) -> bool {
    self.trace
  }

  pub fn ip(&self) -> usize {
    self.ip
  }

  pub fn sp(&self) -> isize {
    self.sp
  }

  pub fn fp(&self) -> isize {
    self.fp
  }

  /// The live part of the operand stack, bottom first.
  pub fn stack(&self) -> &[Word] {
    &self.stack[..(self.sp + 1) as usize]
  }

  pub fn globals(&self) -> &[Word] {
    &self.globals
  }

  pub fn code(&self) -> &[Word] {
    &self.code
  }

  // endregion

  // region Execution

  /**
    Runs the fetch/decode/execute loop until a `halt` is fetched or the instruction pointer
    reaches the end of code memory.

    The sink is opened when the run starts and released when it ends, whether or not the run
    faulted. A fault stops execution immediately; whatever was printed or stored before it
    stays printed or stored.
  */
  pub fn run(&mut self) -> Result<Exit, VmError> {
    // The entry must name a word of the program. Reaching the end by a jump is a clean exit.
    if self.ip >= self.code.len() {
      return Err(VmError::EntryOutOfBounds { entry: self.ip, length: self.code.len() });
    }

    // The sink is moved out so that the open writer and the machine can be borrowed
    // independently.
    let mut sink = mem::replace(&mut self.sink, Sink::Stdout);
    let result = {
      let mut out = sink.open();
      let result  = self.execute(&mut out);
      let flushed = out.flush().and_then(|_| self.console.flush());
      result.and_then(|exit| flushed.map(|_| exit).map_err(VmError::from))
    };
    self.sink = sink;

    debug!(ip = self.ip, sp = self.sp, fp = self.fp, "run finished: {:?}", result);
    result
  }

  fn execute(&mut self, out: &mut dyn Write) -> Result<Exit, VmError> {
    let exit = loop {
      if self.ip == self.code.len() {
        break Exit::EndOfCode;
      }

      let opcode = self.fetch_opcode()?;
      if opcode == Opcode::Halt {
        break Exit::Halted;
      }

      if self.trace {
        self.disassemble(self.ip, out)?;
      }

      self.current = self.ip;
      self.ip += 1;
      self.step(opcode, out)?;

      if self.trace {
        self.write_stack(out)?;
      }
    };

    if self.trace {
      if self.ip < self.code.len() {
        self.disassemble(self.ip, out)?;
      }
      self.write_stack(out)?;
      self.write_data_mem(out)?;
    }

    Ok(exit)
  }

  /// Executes one instruction whose opcode word has already been consumed.
  fn step(&mut self, opcode: Opcode, out: &mut dyn Write) -> Result<(), VmError> {
    match opcode {

      Opcode::IAdd => self.binary_op(|a, b| a.wrapping_add(b))?,
      Opcode::ISub => self.binary_op(|a, b| a.wrapping_sub(b))?,
      Opcode::IMul => self.binary_op(|a, b| a.wrapping_mul(b))?,
      Opcode::ILt  => self.binary_op(|a, b| if a < b { TRUE } else { FALSE })?,
      Opcode::IEq  => self.binary_op(|a, b| if a == b { TRUE } else { FALSE })?,

      Opcode::Br => {
        let target = self.fetch_operand()?;
        self.jump(target)?;
      }

      // Values other than TRUE and FALSE take neither branch, but are still consumed.
      Opcode::BrTrue => {
        let target = self.fetch_operand()?;
        if self.pop()? == TRUE {
          self.jump(target)?;
        }
      }

      Opcode::BrFalse => {
        let target = self.fetch_operand()?;
        if self.pop()? == FALSE {
          self.jump(target)?;
        }
      }

      Opcode::IConst => {
        let value = self.fetch_operand()?;
        self.push(value)?;
      }

      Opcode::Load => {
        let offset = self.fetch_operand()?;
        let slot   = self.frame_slot(offset)?;
        self.push(self.stack[slot])?;
      }

      Opcode::GLoad => {
        let offset = self.fetch_operand()?;
        let slot   = self.global_slot(offset)?;
        self.push(self.globals[slot])?;
      }

      Opcode::Store => {
        let offset = self.fetch_operand()?;
        let value  = self.pop()?;
        let slot   = self.frame_slot(offset)?;
        self.stack[slot] = value;
      }

      Opcode::GStore => {
        let offset = self.fetch_operand()?;
        let value  = self.pop()?;
        let slot   = self.global_slot(offset)?;
        self.globals[slot] = value;
      }

      Opcode::Print => {
        let value = self.pop()?;
        writeln!(out, "{}", value)?;
      }

      Opcode::Pop => {
        self.pop()?;
      }

      // `execute` stops before dispatching a halt.
      Opcode::Halt => {}

      Opcode::Call => {
        let target = self.fetch_operand()?;
        let nargs  = self.fetch_operand()?;
        self.call(target, nargs)?;
      }

      Opcode::Ret  => self.ret()?,

      Opcode::Init => self.init()?,

    }

    Ok(())
  }

  // endregion

  // region Instruction methods

  fn binary_op<F>(&mut self, op: F) -> Result<(), VmError>
    where F: Fn(Word, Word) -> Word
  {
    let b = self.pop()?;
    let a = self.pop()?;
    self.push(op(a, b))
  }

  /**
    Pushes the call linkage (argument count, caller's frame pointer, return address) and
    transfers control. The new frame pointer addresses the saved return address, so the
    arguments, which the caller pushed before the linkage, sit at frame offsets
    `-(nargs + 2) ..= -3`.
  */
  fn call(&mut self, target: Word, nargs: Word) -> Result<(), VmError> {
    debug!(at = self.current, to = target, nargs, "call");

    self.push(nargs)?;
    self.push(self.fp as Word)?;
    self.push(self.ip as Word)?;
    self.fp = self.sp;
    self.jump(target)
  }

  /**
    Pops the return value, discards everything above the frame, unwinds the linkage and the
    arguments below it, and leaves the return value on top of the caller's stack.
  */
  fn ret(&mut self) -> Result<(), VmError> {
    let result = self.pop()?;

    if self.fp < 0 || self.fp > self.sp {
      return Err(VmError::StackUnderflow { at: Address::Code(self.current) });
    }
    self.sp = self.fp;

    let return_address = self.pop()?;
    let saved_fp       = self.pop()?;
    let nargs          = self.pop()?;

    if nargs < 0 || self.sp - (nargs as isize) < -1 {
      return Err(VmError::StackUnderflow { at: Address::Code(self.current) });
    }
    self.sp -= nargs as isize;
    self.fp  = saved_fp as isize;

    debug!(at = self.current, return_address, result, "ret");
    self.jump(return_address)?;
    self.push(result)
  }

  /**
    The callee's prologue, reached right after `call` with the body's address and the argument
    count pushed on the new frame:

    ```text
    f:     iconst body
           iconst 2
           init
    body:  load 1        ; first argument
           load 2        ; second argument
    ```

    Copies the arguments from below the call linkage to above it, so the body addresses them
    with the positive frame offsets `1..=nargs`, then jumps to the body.
  */
  fn init(&mut self) -> Result<(), VmError> {
    let nargs  = self.pop()?;
    let target = self.pop()?;
    let at     = Address::Code(self.current);

    // The two operands must have been the only things pushed on the frame.
    if self.fp < 2 || self.sp != self.fp || nargs < 0 {
      return Err(VmError::BadInit { at });
    }
    if self.stack[(self.fp - 2) as usize] != nargs {
      return Err(VmError::BadInit { at });
    }

    let first = self.fp - 2 - nargs as isize;
    if first < 0 {
      return Err(VmError::StackUnderflow { at });
    }
    for slot in first..(self.fp - 2) {
      self.push(self.stack[slot as usize])?;
    }

    self.jump(target)
  }

  // endregion

  // region Low-level utility methods

  fn fetch_opcode(&self) -> Result<Opcode, VmError> {
    match self.code.get(self.ip) {
      Some(word) => decode_opcode(*word, self.ip),
      None       => Err(VmError::CodeOutOfBounds {
        address: Address::Code(self.ip),
        length: self.code.len()
      })
    }
  }

  /// Reads the word at the instruction pointer and advances past it.
  fn fetch_operand(&mut self) -> Result<Word, VmError> {
    let word =
      *self.code.get(self.ip).ok_or(VmError::CodeOutOfBounds {
        address: Address::Code(self.ip),
        length: self.code.len()
      })?;
    self.ip += 1;
    Ok(word)
  }

  /// Branch targets are only checked for sign here; one past the end of code is checked at
  /// the next fetch.
  fn jump(&mut self, target: Word) -> Result<(), VmError> {
    if target < 0 {
      return Err(VmError::InvalidJump { address: Address::Code(self.current), target });
    }
    self.ip = target as usize;
    Ok(())
  }

  fn push(&mut self, value: Word) -> Result<(), VmError> {
    let next = (self.sp + 1) as usize;
    if next >= self.stack.len() {
      return Err(VmError::StackOverflow {
        at: Address::Code(self.current),
        capacity: self.stack.len()
      });
    }
    self.stack[next] = value;
    self.sp += 1;
    Ok(())
  }

  fn pop(&mut self) -> Result<Word, VmError> {
    if self.sp < 0 {
      return Err(VmError::StackUnderflow { at: Address::Code(self.current) });
    }
    let value = self.stack[self.sp as usize];
    self.sp -= 1;
    Ok(value)
  }

  /// Resolves a frame-relative offset to a stack index inside the live stack.
  fn frame_slot(&self, offset: Word) -> Result<usize, VmError> {
    let slot = Address::Stack(self.fp.saturating_add(offset as isize));
    match slot.idx() {
      Some(idx) if (idx as isize) <= self.sp => Ok(idx),
      _ => Err(VmError::FrameSlotOutOfBounds {
        at: Address::Code(self.current),
        slot,
        sp: self.sp
      })
    }
  }

  fn global_slot(&self, offset: Word) -> Result<usize, VmError> {
    match offset >= 0 && (offset as usize) < self.globals.len() {
      true  => Ok(offset as usize),
      false => Err(VmError::GlobalOutOfBounds {
        at: Address::Code(self.current),
        offset,
        length: self.globals.len()
      })
    }
  }

  // endregion

  // region Display methods

  fn make_register_table(
      name      : &str,
      cells     : &[Word],
      highlight : Option<usize>
    ) -> Table
  {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Address", ubl->"Contents"]);

    for (i, cell) in cells.iter().enumerate() {
      match Some(i) == highlight {

        true  => {
          table.add_row(
            row![r->format!("* --> {}[{}] =", name, i), format!("{}", cell)]
          );
        }

        false => {
          table.add_row(
            row![r->format!("{}[{}] =", name, i), format!("{}", cell)]
          );
        }

      } // end match on highlight
    } // end for
    table
  }

  // endregion

}


lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

impl Display for Machine {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let top         = match self.sp < 0 { true => None, false => Some(self.sp as usize) };
    let stack_table = Machine::make_register_table("STACK", self.stack(), top);
    let data_table  = Machine::make_register_table("GLOBAL", &self.globals, None);

    let mut combined_table = table!([stack_table, data_table]);

    combined_table.set_titles(row![ub->"Stack", ub->"Globals"]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);

    write!(f, "ip: {}\tsp: {}\tfp: {}\n{}", self.ip, self.sp, self.fp, combined_table)
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::FaultKind;
  use crate::sink::SharedBuffer;

  fn machine(code: Vec<Word>, data_size: usize) -> (Machine, SharedBuffer) {
    let output = SharedBuffer::new();
    let machine =
      Machine::new(code, 0, data_size)
        .with_sink(Sink::writer(output.clone()))
        .with_console(io::sink());
    (machine, output)
  }

  #[test]
  fn new_machine_registers() {
    let vm = Machine::new(vec![16], 0, 3);
    assert_eq!((vm.ip(), vm.sp(), vm.fp()), (0, -1, -1));
    assert_eq!(vm.globals(), &[0, 0, 0]);
    assert!(vm.stack().is_empty());
    assert!(!vm.is_tracing());
  }

  #[test]
  fn arithmetic() {
    // iconst 7; iconst 3; isub; iconst 6; imul; iconst 1; iadd
    let (mut vm, _) = machine(vec![9, 7, 9, 3, 2, 9, 6, 3, 9, 1, 1], 0);
    assert_eq!(vm.run().unwrap(), Exit::EndOfCode);
    assert_eq!(vm.stack(), &[25]);
  }

  #[test]
  fn comparisons_push_booleans() {
    // iconst 2; iconst 5; ilt; iconst 5; iconst 5; ieq; iconst 9; iconst 5; ilt; halt
    let (mut vm, _) = machine(vec![9, 2, 9, 5, 4, 9, 5, 9, 5, 5, 9, 9, 9, 5, 4, 16], 0);
    assert_eq!(vm.run().unwrap(), Exit::Halted);
    assert_eq!(vm.stack(), &[TRUE, TRUE, FALSE]);
  }

  #[test]
  fn globals_and_print() {
    // iconst 42; gstore 1; gload 1; gload 1; iadd; print; halt
    let (mut vm, output) = machine(vec![9, 42, 13, 1, 11, 1, 11, 1, 1, 14, 16], 2);
    vm.run().unwrap();
    assert_eq!(vm.globals(), &[0, 42]);
    assert_eq!(output.contents(), "84\n");
  }

  #[test]
  fn locals_at_top_level_are_relative_to_minus_one() {
    // iconst 5; iconst 0; load 1; store 2; halt
    let (mut vm, _) = machine(vec![9, 5, 9, 0, 10, 1, 12, 2, 16], 0);
    vm.run().unwrap();
    assert_eq!(vm.stack(), &[5, 5]);
  }

  #[test]
  fn branch_on_values_other_than_booleans_falls_through() {
    // iconst 7; brt 9; iconst 7; brf 9; halt; ...; iconst 1
    let (mut vm, _) = machine(vec![9, 7, 7, 9, 9, 7, 8, 9, 16, 9, 1], 0);
    assert_eq!(vm.run().unwrap(), Exit::Halted);
    assert!(vm.stack().is_empty());
  }

  #[test]
  fn unknown_opcode_is_malformed() {
    let (mut vm, output) = machine(vec![9, 1, 14, 0, 16], 0);
    let fault = vm.run().unwrap_err();
    assert_eq!(fault.kind(), FaultKind::MalformedProgram);
    // The print before the fault still happened.
    assert_eq!(output.contents(), "1\n");
  }

  #[test]
  fn truncated_operand_is_malformed() {
    let (mut vm, _) = machine(vec![9], 0);
    assert!(matches!(vm.run(), Err(VmError::CodeOutOfBounds { .. })));
  }

  #[test]
  fn jump_past_end_is_malformed() {
    let (mut vm, _) = machine(vec![6, 40], 0);
    assert!(matches!(vm.run(), Err(VmError::CodeOutOfBounds { .. })));

    let (mut vm, _) = machine(vec![6, -2], 0);
    assert!(matches!(vm.run(), Err(VmError::InvalidJump { target: -2, .. })));
  }

  #[test]
  fn global_out_of_bounds() {
    let (mut vm, _) = machine(vec![11, 3], 3);
    let fault = vm.run().unwrap_err();
    assert_eq!(fault.kind(), FaultKind::MalformedProgram);
    assert!(matches!(fault, VmError::GlobalOutOfBounds { offset: 3, length: 3, .. }));
  }

  #[test]
  fn stack_underflow() {
    let (mut vm, _) = machine(vec![9, 1, 1], 0);
    let fault = vm.run().unwrap_err();
    assert_eq!(fault.kind(), FaultKind::StackFault);
    assert!(matches!(fault, VmError::StackUnderflow { at: Address::Code(2) }));
  }

  #[test]
  fn stack_overflow() {
    // loop: iconst 1; br loop
    let (vm, _) = machine(vec![9, 1, 6, 0], 0);
    let mut vm = vm.with_stack_size(8);
    match vm.run() {
      Err(VmError::StackOverflow { capacity, .. }) => assert_eq!(capacity, 8),
      other => panic!("expected overflow, got {:?}", other),
    }
    assert_eq!(vm.sp(), 7);
  }

  #[test]
  fn frame_slot_above_stack_top() {
    let (mut vm, _) = machine(vec![10, 0], 0);
    assert!(matches!(vm.run(), Err(VmError::FrameSlotOutOfBounds { sp: -1, .. })));
  }

  #[test]
  fn ret_without_frame() {
    let (mut vm, _) = machine(vec![9, 1, 18], 0);
    assert_eq!(vm.run().unwrap_err().kind(), FaultKind::StackFault);
  }

  #[test]
  fn init_without_matching_call() {
    // iconst 4; iconst 0; init
    let (mut vm, _) = machine(vec![9, 4, 9, 0, 19], 0);
    assert!(matches!(vm.run(), Err(VmError::BadInit { .. })));
  }

  #[test]
  fn call_and_ret_with_negative_offsets() {
    // main: iconst 10; iconst 4; call sub 2; print; halt
    // sub:  load -4; load -3; isub; ret
    let code = vec![9, 10, 9, 4, 17, 9, 2, 14, 16, 10, -4, 10, -3, 2, 18];
    let (mut vm, output) = machine(code, 0);
    vm.run().unwrap();
    assert_eq!(output.contents(), "6\n");
    assert_eq!((vm.sp(), vm.fp()), (-1, -1));
  }

  #[test]
  fn display_shows_registers_and_stack() {
    let (mut vm, _) = machine(vec![9, 3, 16], 1);
    vm.run().unwrap();
    let text = vm.to_string();
    assert!(text.starts_with("ip: 2\tsp: 0\tfp: -1"));
    assert!(text.contains("* --> STACK[0] ="));
    assert!(text.contains("GLOBAL[0] ="));
  }
}
