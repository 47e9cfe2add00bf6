//! EvilCandy runtime: the stack virtual machine and builtin library.
//!
//! [`interp::Interp`] is the embedding surface: feed it source text or
//! script files and it drives the lexer/assembler from
//! `evilcandy-compiler` and executes the resulting code objects.

pub mod builtins;
pub mod import;
pub mod interp;
pub mod json;
pub mod marshal;
pub mod methods;
pub mod ops;
pub mod vm;

pub use interp::Interp;
pub use vm::{NativeArgs, NativeFn, Vm};
