//! Output redirection. A machine writes everything it produces, printed values as well as
//! trace and dump text, to a single `Sink` chosen when the machine is built.

use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Stdout, Write};
use std::path::PathBuf;
use std::rc::Rc;

use tracing::warn;

pub enum Sink {
  Stdout,
  /// Opened in append mode each time it is needed, so output from successive runs
  /// accumulates in the file.
  File(PathBuf),
  /// An already-open writer, borrowed for the duration of each run.
  Writer(Box<dyn Write>),
}

impl Sink {
  /// An empty path selects standard output.
  pub fn from_path<P: Into<PathBuf>>(path: P) -> Sink {
    let path = path.into();
    match path.as_os_str().is_empty() {
      true  => Sink::Stdout,
      false => Sink::File(path)
    }
  }

  pub fn writer<W: Write + 'static>(writer: W) -> Sink {
    Sink::Writer(Box::new(writer))
  }

  /**
    Resolves the sink into something that can be written to. A file that cannot be opened is
    not an error: the failure is reported and standard output is used instead.
  */
  pub fn open(&mut self) -> OpenSink<'_> {
    match self {

      Sink::Stdout => OpenSink::Stdout(io::stdout()),

      Sink::File(path) => {
        match OpenOptions::new().create(true).append(true).open(path.as_path()) {
          Ok(file) => OpenSink::File(BufWriter::new(file)),
          Err(e)   => {
            warn!("Failed to open '{}' ({}), writing to standard output", path.display(), e);
            OpenSink::Stdout(io::stdout())
          }
        }
      }

      Sink::Writer(writer) => OpenSink::Borrowed(writer.as_mut()),

    }
  }
}

impl Default for Sink {
  fn default() -> Sink {
    Sink::Stdout
  }
}

/// A sink after `Sink::open`. Dropping it closes the file, if there is one.
pub enum OpenSink<'a> {
  Stdout(Stdout),
  File(BufWriter<File>),
  Borrowed(&'a mut dyn Write),
}

impl<'a> Write for OpenSink<'a> {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    match self {
      OpenSink::Stdout(out)   => out.write(buf),
      OpenSink::File(out)     => out.write(buf),
      OpenSink::Borrowed(out) => out.write(buf),
    }
  }

  fn flush(&mut self) -> io::Result<()> {
    match self {
      OpenSink::Stdout(out)   => out.flush(),
      OpenSink::File(out)     => out.flush(),
      OpenSink::Borrowed(out) => out.flush(),
    }
  }
}

/// An in-memory writer whose clones share one buffer, for capturing a machine's output.
#[derive(Clone, Debug, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
  pub fn new() -> SharedBuffer {
    SharedBuffer::default()
  }

  pub fn contents(&self) -> String {
    String::from_utf8_lossy(&self.0.borrow()).into_owned()
  }
}

impl Write for SharedBuffer {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.0.borrow_mut().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}
