//! Opening names files: byte accounting and transparent gzip decompression, with an
//! external `gzip -dc` fallback when the built-in decoder rejects the stream.

use std::{
    cell::Cell,
    fs::File,
    io::{self, BufRead, BufReader, Read},
    path::{Path, PathBuf},
    process::{Child, ChildStdout, Command, Stdio},
    rc::Rc,
};

use flate2::read::MultiGzDecoder;
use namedex_common::{Result, error::Error};

/// Shared count of raw (still compressed) bytes read from all input files.
///
/// The pipeline is single-threaded, so a plain `Rc<Cell<_>>` is enough.
#[derive(Debug, Clone, Default)]
pub struct ByteCounter(Rc<Cell<u64>>);

impl ByteCounter {
    pub fn new() -> ByteCounter {
        ByteCounter::default()
    }

    pub fn get(&self) -> u64 {
        self.0.get()
    }

    fn add(&self, n: u64) {
        self.0.set(self.0.get() + n);
    }
}

struct CountingReader<R> {
    inner: R,
    counter: ByteCounter,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.counter.add(n as u64);
        Ok(n)
    }
}

pub fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// Opens `path` for buffered reading, decompressing `.gz` files.
pub fn open_input(path: &Path, counter: &ByteCounter) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|e| Error::input_access(path, e))?;
    let counted = CountingReader {
        inner: file,
        counter: counter.clone(),
    };
    if !is_gzip(path) {
        return Ok(Box::new(BufReader::new(counted)));
    }

    let mut decoder = BufReader::new(MultiGzDecoder::new(BufReader::new(counted)));
    match decoder.fill_buf() {
        Ok(_) => Ok(Box::new(decoder)),
        Err(e) => {
            log::warn!(
                "built-in gzip decoder failed on {} ({e}), trying external gzip",
                path.display()
            );
            open_with_gzip_tool(path)
        }
    }
}

/// Maps a read failure on `path` to the error taxonomy: corrupt compressed data is a
/// decompression error, anything else an input access error.
pub fn read_error(path: &Path, e: io::Error) -> Error {
    if is_gzip(path) && matches!(e.kind(), io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput)
    {
        Error::decompression(path, e.to_string())
    } else {
        Error::input_access(path, e)
    }
}

fn open_with_gzip_tool(path: &Path) -> Result<Box<dyn BufRead>> {
    let mut child = Command::new("gzip")
        .arg("-dc")
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| Error::decompression(path, format!("cannot run gzip: {e}")))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::decompression(path, "gzip produced no output pipe"))?;
    Ok(Box::new(BufReader::new(ChildReader {
        child,
        stdout,
        path: path.to_path_buf(),
        finished: false,
    })))
}

/// Reads a child's stdout and turns a non-zero exit status into a read error at EOF.
struct ChildReader {
    child: Child,
    stdout: ChildStdout,
    path: PathBuf,
    finished: bool,
}

impl Read for ChildReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished {
            return Ok(0);
        }
        let n = self.stdout.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.finished = true;
            let status = self.child.wait()?;
            if !status.success() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("gzip -dc {} exited with {status}", self.path.display()),
                ));
            }
        }
        Ok(n)
    }
}

impl Drop for ChildReader {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
