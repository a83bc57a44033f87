use std::fs;
use std::io;

use mvm::{assemble, Exit, FaultKind, Machine, SharedBuffer, Sink, VmError, Word};

fn capture(code: Vec<Word>, entry: usize, data_size: usize) -> (Machine, SharedBuffer) {
  let output = SharedBuffer::new();
  let machine =
    Machine::new(code, entry, data_size)
      .with_sink(Sink::writer(output.clone()))
      .with_console(io::sink());
  (machine, output)
}

#[test]
fn add_and_print() {
  // iconst 3; iconst 4; iadd; print; halt
  let (mut vm, output) = capture(vec![9, 3, 9, 4, 1, 14, 16], 0, 0);

  assert_eq!(vm.run().unwrap(), Exit::Halted);
  assert_eq!(output.contents(), "7\n");
}

#[test]
fn taken_branch_skips_code() {
  // 0: iconst 1; 2: brt 9; 4: iconst 99; 6: print; 7: br 12; 9: iconst 1; 11: print; 12: halt
  let code = vec![9, 1, 7, 9, 9, 99, 14, 6, 12, 9, 1, 14, 16];
  let (mut vm, output) = capture(code, 0, 0);

  vm.run().unwrap();
  assert_eq!(output.contents(), "1\n");
}

#[test]
fn branch_conditions() {
  // (value, opcode, jumps)
  let cases = [(1, 7, true), (0, 8, true), (0, 7, false), (1, 8, false)];

  for &(value, opcode, jumps) in cases.iter() {
    // 0: iconst value; 2: br? 7; 4: iconst 10; 6: halt; 7: iconst 20; 9: halt
    let (mut vm, _) = capture(vec![9, value, opcode, 7, 9, 10, 16, 9, 20, 16], 0, 0);
    vm.run().unwrap();

    let expected: &[Word] = if jumps { &[20] } else { &[10] };
    assert_eq!(vm.stack(), expected, "value {} opcode {}", value, opcode);
  }
}

#[test]
fn entry_past_the_end_executes_nothing() {
  let (mut vm, output) = capture(vec![9, 1, 14, 16], 9, 0);

  let fault = vm.run().unwrap_err();
  assert_eq!(fault.kind(), FaultKind::MalformedProgram);
  assert!(matches!(fault, VmError::EntryOutOfBounds { entry: 9, length: 4 }));
  assert_eq!(output.contents(), "");
  assert_eq!(vm.sp(), -1);
}

#[test]
fn entry_must_name_a_word_of_the_program() {
  let (mut vm, output) = capture(vec![9, 1, 14, 16], 4, 0);
  let fault = vm.run().unwrap_err();
  assert!(matches!(fault, VmError::EntryOutOfBounds { entry: 4, length: 4 }));
  assert_eq!(output.contents(), "");

  let (mut vm, _) = capture(vec![], 0, 0);
  let fault = vm.run().unwrap_err();
  assert_eq!(fault.kind(), FaultKind::MalformedProgram);
  assert!(matches!(fault, VmError::EntryOutOfBounds { entry: 0, length: 0 }));
}

#[test]
fn jump_to_the_end_is_a_clean_exit() {
  // iconst 5; br 5; print
  let (mut vm, output) = capture(vec![9, 5, 6, 5, 14], 0, 0);
  assert_eq!(vm.run().unwrap(), Exit::EndOfCode);
  assert_eq!(output.contents(), "");
  assert_eq!(vm.stack(), &[5]);
}

#[test]
fn stack_depth_follows_pushes_and_pops() {
  // iconst 6; iconst 7; imul; iconst 2; isub; iconst 9; iconst 1; pop; iconst 3; iadd
  let code = vec![9, 6, 9, 7, 3, 9, 2, 2, 9, 9, 9, 1, 15, 9, 3, 1];
  let (mut vm, _) = capture(code, 0, 0);

  vm.run().unwrap();
  // Six pushes, three binary operations and one pop.
  assert_eq!(vm.stack(), &[40, 12]);
}

#[test]
fn two_argument_function() {
  let text = "
    sum:    iconst body
            iconst 2
            init
    body:   load 1
            load 2
            iadd
            ret

    main:   iconst 99       // something the call must not disturb
            iconst 20
            iconst 22
            call sum, 2
            halt
  ";
  let program = assemble(text).unwrap();
  let output = SharedBuffer::new();
  let mut vm =
    Machine::from_program(program, 0)
      .with_sink(Sink::writer(output.clone()))
      .with_console(io::sink());

  vm.run().unwrap();
  assert_eq!(vm.stack(), &[99, 42]);
  assert_eq!((vm.sp(), vm.fp()), (1, -1));
}

#[test]
fn call_init_ret_restores_the_stack() {
  for nargs in 0..4 {
    for depth in 0..3 {
      let mut code: Vec<Word> = vec![];
      for d in 0..depth {
        code.extend(&[9, 100 + d]);
      }
      for i in 0..nargs {
        code.extend(&[9, i + 1]);
      }

      let function = code.len() as Word + 4;
      let body = function + 5;
      code.extend(&[17, function, nargs, 16]);
      code.extend(&[9, body, 9, nargs, 19]);
      code.extend(&[9, 7, 18]);

      let (mut vm, _) = capture(code, 0, 0);
      assert_eq!(vm.run().unwrap(), Exit::Halted);

      let before_call = (depth + nargs) as isize;
      assert_eq!(vm.sp(), before_call - nargs as isize, "nargs {} depth {}", nargs, depth);
      assert_eq!(vm.fp(), -1);
      assert_eq!(vm.stack().last(), Some(&7));
      let preserved: Vec<Word> = (0..depth).map(|d| 100 + d).collect();
      assert_eq!(&vm.stack()[..depth as usize], preserved.as_slice());
    }
  }
}

#[test]
fn recursive_factorial() {
  let text = "
    fact:   iconst body
            iconst 1
            init
    body:   load 1
            iconst 2
            ilt
            brf recurse
            iconst 1
            ret
    recurse:
            load 1
            load 1
            iconst 1
            isub
            call fact, 1
            imul
            ret

    main:   iconst 6
            call fact, 1
            gstore 0
            gload 0
            print
            halt
  ";
  let program = assemble(text).unwrap();
  let output = SharedBuffer::new();
  let mut vm =
    Machine::from_program(program, 1)
      .with_sink(Sink::writer(output.clone()));

  vm.run().unwrap();
  assert_eq!(output.contents(), "720\n");
  assert_eq!(vm.globals(), &[720]);
  assert!(vm.stack().is_empty());
}

#[test]
fn output_file_is_appended() {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let path = dir.path().join("out.txt");
  fs::write(&path, "previous\n").unwrap();

  let mut vm =
    Machine::new(vec![9, 3, 9, 4, 1, 14, 16], 0, 0)
      .with_sink(Sink::from_path(&path));
  vm.run().unwrap();

  // A second run starts at the halt and prints nothing.
  assert_eq!(vm.run().unwrap(), Exit::Halted);
  assert_eq!(fs::read_to_string(&path).unwrap(), "previous\n7\n");
}

#[test]
fn fault_keeps_earlier_side_effects() {
  // iconst 5; gstore 0; iconst 1; print; pop
  let (mut vm, output) = capture(vec![9, 5, 13, 0, 9, 1, 14, 15], 0, 1);

  let fault = vm.run().unwrap_err();
  assert_eq!(fault.kind(), FaultKind::StackFault);
  assert_eq!(vm.globals(), &[5]);
  assert_eq!(output.contents(), "1\n");
}

#[test]
fn fault_flushes_the_output_file() {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let path = dir.path().join("out.txt");

  // iconst 8; print; print
  let mut vm =
    Machine::new(vec![9, 8, 14, 14], 0, 0)
      .with_sink(Sink::from_path(&path))
      .with_console(io::sink());

  let fault = vm.run().unwrap_err();
  assert!(matches!(fault, VmError::StackUnderflow { .. }));
  assert_eq!(fs::read_to_string(&path).unwrap(), "8\n");

  // The file was released, so a later dump appends after the run's output.
  vm.dump_stack().unwrap();
  assert_eq!(fs::read_to_string(&path).unwrap(), "8\n      stack=[]\n");
}
