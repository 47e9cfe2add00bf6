//! Open-file values.
//!
//! A file object wraps an opened stream plus its mode flags. The
//! standard streams are represented as dedicated handles so `sys.stdout`
//! and friends need no special-casing at the call sites.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, Write};

use crate::error::{ErrorClass, EvcError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeFlags {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub binary: bool,
}

impl ModeFlags {
    /// Parse an fopen-style mode string (`r`, `w`, `a`, with optional
    /// `+` and `b`).
    pub fn parse(mode: &str) -> Result<ModeFlags, EvcError> {
        let mut flags = ModeFlags {
            read: false,
            write: false,
            append: false,
            binary: false,
        };
        let mut chars = mode.chars();
        match chars.next() {
            Some('r') => flags.read = true,
            Some('w') => flags.write = true,
            Some('a') => {
                flags.write = true;
                flags.append = true;
            }
            _ => {
                return Err(EvcError::new(
                    ErrorClass::Value,
                    format!("invalid file mode '{mode}'"),
                ));
            }
        }
        for c in chars {
            match c {
                '+' => {
                    flags.read = true;
                    flags.write = true;
                }
                'b' => flags.binary = true,
                _ => {
                    return Err(EvcError::new(
                        ErrorClass::Value,
                        format!("invalid file mode '{mode}'"),
                    ));
                }
            }
        }
        Ok(flags)
    }
}

#[derive(Debug)]
pub enum Handle {
    Closed,
    Stdin,
    Stdout,
    Stderr,
    Disk(File),
}

#[derive(Debug)]
pub struct FileData {
    pub name: String,
    pub mode: ModeFlags,
    pub handle: Handle,
    pub eof: bool,
    pub err: bool,
}

fn io_err(e: std::io::Error) -> EvcError {
    EvcError::new(ErrorClass::System, e.to_string())
}

impl FileData {
    pub fn open(path: &str, mode: ModeFlags) -> Result<FileData, EvcError> {
        let mut opts = OpenOptions::new();
        opts.read(mode.read)
            .write(mode.write && !mode.append)
            .append(mode.append)
            .create(mode.write)
            .truncate(mode.write && !mode.append && !mode.read);
        let file = opts.open(path).map_err(io_err)?;
        Ok(FileData {
            name: path.to_string(),
            mode,
            handle: Handle::Disk(file),
            eof: false,
            err: false,
        })
    }

    pub fn stdio(handle: Handle, name: &str) -> FileData {
        let write = matches!(handle, Handle::Stdout | Handle::Stderr);
        FileData {
            name: name.to_string(),
            mode: ModeFlags {
                read: !write,
                write,
                append: false,
                binary: false,
            },
            handle,
            eof: false,
            err: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.handle, Handle::Closed)
    }

    fn check_open(&self) -> Result<(), EvcError> {
        if self.is_closed() {
            Err(EvcError::new(ErrorClass::Value, "I/O on closed file"))
        } else {
            Ok(())
        }
    }

    /// Read up to `n` bytes, or to end of stream when `n` is `None`.
    pub fn read(&mut self, n: Option<usize>) -> Result<Vec<u8>, EvcError> {
        self.check_open()?;
        let mut buf = Vec::new();
        let got = match (&mut self.handle, n) {
            (Handle::Stdin, Some(n)) => {
                buf.resize(n, 0);
                let got = std::io::stdin().read(&mut buf).map_err(io_err)?;
                buf.truncate(got);
                got
            }
            (Handle::Stdin, None) => std::io::stdin().read_to_end(&mut buf).map_err(io_err)?,
            (Handle::Disk(f), Some(n)) => {
                buf.resize(n, 0);
                let got = f.read(&mut buf).map_err(io_err)?;
                buf.truncate(got);
                got
            }
            (Handle::Disk(f), None) => f.read_to_end(&mut buf).map_err(io_err)?,
            _ => return Err(EvcError::new(ErrorClass::Value, "file not open for reading")),
        };
        if got == 0 {
            self.eof = true;
        }
        Ok(buf)
    }

    /// Read one line including its newline; empty at end of stream.
    pub fn readline(&mut self) -> Result<Vec<u8>, EvcError> {
        self.check_open()?;
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let got = match &mut self.handle {
                Handle::Stdin => std::io::stdin().read(&mut byte).map_err(io_err)?,
                Handle::Disk(f) => f.read(&mut byte).map_err(io_err)?,
                _ => return Err(EvcError::new(ErrorClass::Value, "file not open for reading")),
            };
            if got == 0 {
                self.eof = true;
                break;
            }
            line.push(byte[0]);
            if byte[0] == b'\n' {
                break;
            }
        }
        Ok(line)
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<usize, EvcError> {
        self.check_open()?;
        match &mut self.handle {
            Handle::Stdout => std::io::stdout().write(bytes).map_err(io_err),
            Handle::Stderr => std::io::stderr().write(bytes).map_err(io_err),
            Handle::Disk(f) if self.mode.write => f.write(bytes).map_err(io_err),
            _ => Err(EvcError::new(ErrorClass::Value, "file not open for writing")),
        }
    }

    pub fn tell(&mut self) -> Result<u64, EvcError> {
        self.check_open()?;
        match &mut self.handle {
            Handle::Disk(f) => f.stream_position().map_err(io_err),
            _ => Ok(0),
        }
    }

    pub fn close(&mut self) {
        self.handle = Handle::Closed;
    }

    pub fn clearerr(&mut self) {
        self.eof = false;
        self.err = false;
    }
}
