use std::fmt::Write as FmtWrite;

use crate::address::Address;
use crate::bytecode::{decode_instruction, Word};
use crate::symboltable::SymbolTable;

/**
  The `(instructions, entry address)` pair a front-end hands to the machine. The instruction
  count is the length of `code`. Labels, if the program came from the assembler, are kept
  for listings.
*/
#[derive(Debug)]
pub struct Program {
  pub code    : Vec<Word>,
  pub entry   : usize,
  pub symbols : SymbolTable,
}

impl Program {
  pub fn new(code: Vec<Word>, entry: usize) -> Program {
    Program {
      code,
      entry,
      symbols: SymbolTable::new()
    }
  }

  pub fn len(&self) -> usize {
    self.code.len()
  }

  pub fn is_empty(&self) -> bool {
    self.code.is_empty()
  }

  /**
    Renders the whole program, one decoded instruction per line, preceded by any label that
    names its address. A word that does not decode is printed raw and the listing resumes at
    the next word.
  */
  pub fn listing(&self) -> String {
    let mut text = String::new();
    let mut address = 0;

    while address < self.code.len() {
      if let Some(label) = self.symbols.get_symbol(&Address::Code(address)) {
        let _ = writeln!(text, "{}:", label);
      }

      match decode_instruction(&self.code, address) {
        Ok(instruction) => {
          let _ = writeln!(text, "{:04}:   {}", address, instruction);
          address += instruction.size();
        }
        Err(_) => {
          let _ = writeln!(text, "{:04}:   .word {}", address, self.code[address]);
          address += 1;
        }
      }
    }

    text
  }
}
