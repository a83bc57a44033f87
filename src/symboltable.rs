use bimap::BiMap;
use string_cache::DefaultAtom;

use crate::address::Address;

/**
  A symbol table is a mapping between assembly labels and the code address they name. It is
  really just a convenience wrapper around a BiMap, so that a disassembly listing can find the
  label for an address as cheaply as the assembler finds the address for a label.

  Label names are interned.
*/
#[derive(Debug)]
pub struct SymbolTable {
  table: BiMap<DefaultAtom, Address>
}

impl SymbolTable {

  pub fn new() -> SymbolTable {
    SymbolTable {
      table: BiMap::new()
    }
  }

  pub fn get_symbol(&self, address: &Address) -> Option<DefaultAtom> {
    self.table.get_by_right(address).cloned()
  }

  pub fn get_address(&self, label: &str) -> Option<Address> {
    self.table.get_by_left(&DefaultAtom::from(label)).cloned()
  }

  /// Fails, returning the rejected pair, if either the label or the address is already taken.
  pub fn insert(&mut self, label: &str, address: Address)
    -> Result<(), (DefaultAtom, Address)> {
    debug_assert!(address.is_code(), "labels name code addresses: {}", address);
    self.table.insert_no_overwrite(DefaultAtom::from(label), address)
  }

  pub fn len(&self) -> usize {
    self.table.len()
  }

  pub fn is_empty(&self) -> bool {
    self.table.is_empty()
  }
}
