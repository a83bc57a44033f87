//! An `Either` type that holds the address of a word in code memory or on the operand
//! stack, with some convenience functions.

use std::fmt::{Display, Formatter};

// `AddressNumberType` is `usize`, as it is naturally an index into a memory store.
pub type AddressNumberType = usize;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum Address {
  /// An index into the instruction array.
  Code(AddressNumberType),
  /// An index into the operand stack. Signed, because the empty stack and the top-level
  /// frame are both represented by -1.
  Stack(isize),
}

impl Address {
  /// Converts the address to an index into the corresponding vector, if it is one.
  pub fn idx(&self) -> Option<AddressNumberType> {
    match self {
      Address::Code(i) => Some(*i),
      Address::Stack(i) if *i >= 0 => Some(*i as AddressNumberType),
      Address::Stack(_) => None
    }
  }

  pub fn is_code(&self) -> bool {
    match self {
      Address::Code(_) => true,
      _ => false
    }
  }

}


impl Display for Address {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Address::Code(i) => {
        write!(f, "CODE[{:04}]", i)
      },
      Address::Stack(i) => {
        write!(f, "STACK[{}]", i)
      }
    }
  }
}
