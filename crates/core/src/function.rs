//! Function, method, and property payloads.
//!
//! A function value is either user-defined (an [`Xptr`] plus the state
//! captured when the literal was evaluated: defaults, closure cells, and
//! the module scope it was defined in) or native (a registry handle the
//! VM resolves to a Rust callback). Methods pair a callable with its
//! receiver; properties pair a getter with an optional setter.

use std::cell::RefCell;
use std::rc::Rc;

use crate::dict::Dict;
use crate::value::Value;
use crate::xptr::Xptr;

/// The module-global scope a user function resolves `Seek` names in.
pub type ModuleScope = Rc<RefCell<Dict>>;

/// Handle into the VM's native-function registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeId(pub u32);

#[derive(Debug)]
pub struct UserFunc {
    pub xptr: Rc<Xptr>,
    /// Sparse defaults indexed by parameter position; holes are
    /// required parameters. Filled by `AddDefault` right after the
    /// function object is created.
    pub defaults: RefCell<Vec<Option<Value>>>,
    /// Captured closure cells, in the order the inner code's `Cp` slots
    /// expect. Filled by `AddClosure`.
    pub clov: RefCell<Vec<Value>>,
    pub module: ModuleScope,
}

#[derive(Debug)]
pub struct NativeFunc {
    pub name: &'static str,
    pub minargs: usize,
    pub maxargs: usize,
    pub id: NativeId,
}

#[derive(Debug)]
pub enum FuncDef {
    User(UserFunc),
    Native(NativeFunc),
}

impl FuncDef {
    pub fn name(&self) -> String {
        match self {
            FuncDef::User(u) => format!("<function {}>", u.xptr.uuid),
            FuncDef::Native(n) => format!("<built-in function {}>", n.name),
        }
    }
}

/// A callable bound to a receiver by attribute access.
#[derive(Debug)]
pub struct Method {
    pub func: Value,
    pub this: Value,
}

/// A computed attribute: reading invokes `getter`, writing invokes
/// `setter` (absent means read-only).
#[derive(Debug)]
pub struct Property {
    pub getter: Value,
    pub setter: Option<Value>,
}
