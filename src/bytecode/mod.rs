/*!

  The VM uses a signed 64 bit word for everything: opcodes, operands, stack cells and global
  slots. Code memory is a single flat array of words. An instruction is one opcode word
  followed by as many operand words as its arity (0, 1 or 2):

    [OpCode]                      iadd, isub, imul, ilt, ieq, print, pop, halt, ret, init
    [OpCode][Operand]             br, brt, brf, iconst, load, gload, store, gstore
    [OpCode][Operand][Operand]    call

  There is no padding and no alignment, so the only way to find the next instruction is to
  decode the current one. Labels do not appear in the bytecode. They are symbolic names for
  locations in code memory that the assembler resolves to addresses, and that a listing can
  recover through the program's symbol table.

  An enum is only used for the opcode itself, not the entire instruction. The decoded
  `Instruction` exists for disassembly and for the assembler; the machine reads operand words
  straight out of code memory as it executes.

*/

mod binary;
mod instruction;
mod program;
pub mod assembly;

pub use binary::{encode_instruction, decode_instruction, decode_opcode, instruction_size,
                 EncodedInstruction, Word};
pub use instruction::{Instruction, Opcode, MIN_OPCODE, MAX_OPCODE};
pub use program::Program;
pub use assembly::{parse_assembly, assemble};
