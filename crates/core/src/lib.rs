//! EvilCandy core: the value model and code objects.
//!
//! This crate holds everything the assembler and the virtual machine
//! share: the [`Value`](value::Value) enum and its protocols, the
//! width-adaptive string type, the insertion-ordered dictionary, UTF-8
//! helpers, the exception taxonomy, and the [`Xptr`](xptr::Xptr) code
//! object with its instruction encoding.

pub mod arith;
pub mod dict;
pub mod error;
pub mod file;
pub mod function;
pub mod hash;
pub mod numparse;
pub mod strings;
pub mod utf8;
pub mod value;
pub mod xptr;

/// Ceiling for every user-drivable recursion: VM calls, assembler
/// nesting, container `str`/`cmp`.
pub const RECURSION_MAX: usize = 256;

/// Capacity of the value stack, in entries.
pub const VM_STACK_SIZE: usize = 1024 * 16;

pub use arith::{BinOp, Complex};
pub use dict::Dict;
pub use error::{ErrorClass, EvcError};
pub use strings::{Str, StrReader, StrWriter};
pub use value::{Range, Value, var_compare, var_eq};
pub use xptr::{AttrKind, CmpKind, Instr, Opcode, PtrKind, Xptr};
