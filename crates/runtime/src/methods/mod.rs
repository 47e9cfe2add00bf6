//! Built-in method tables, one module per type.
//!
//! Each table entry is a native callback reached through `GetAttr` on a
//! value of that type; the VM binds the receiver into a method object
//! at lookup time.

mod bytes;
mod dict;
mod file;
mod list;
mod range;
mod string;

use crate::vm::Vm;

pub fn install(vm: &mut Vm) {
    string::install(vm);
    list::install(vm);
    dict::install(vm);
    bytes::install(vm);
    file::install(vm);
    range::install(vm);
}
