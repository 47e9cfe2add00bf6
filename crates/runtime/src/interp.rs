//! High-level driver: one interpreter, one persistent top-level scope.
//!
//! The CLI and the REPL both run through [`Interp`]; the REPL keeps
//! feeding statements into the same module scope, which is what makes
//! definitions persist across prompts.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use evilcandy_core::dict::Dict;
use evilcandy_core::error::EvcError;
use evilcandy_core::function::ModuleScope;
use evilcandy_core::strings::Str;
use evilcandy_core::value::Value;
use evilcandy_core::xptr::Xptr;

use crate::import;
use crate::vm::Vm;

pub struct Interp {
    pub vm: Vm,
    module: ModuleScope,
}

impl Default for Interp {
    fn default() -> Self {
        Self::new()
    }
}

impl Interp {
    pub fn new() -> Self {
        Interp {
            vm: Vm::new(),
            module: Rc::new(RefCell::new(Dict::new())),
        }
    }

    /// Make the process arguments visible as `sys.argv`.
    pub fn set_argv(&mut self, argv: &[String]) {
        let values: Vec<Value> = argv.iter().map(|a| Value::str(a)).collect();
        let _ = self.vm.sys.borrow_mut().insert(
            Rc::new(Str::from_str("argv")),
            Value::list(values),
        );
    }

    /// Assemble a source string without running it.
    pub fn assemble(&mut self, source: &Str, name: &str) -> Result<Rc<Xptr>, EvcError> {
        evilcandy_compiler::assemble(source, Rc::from(name))
    }

    /// Run source text against the persistent top-level scope.
    pub fn run_source(&mut self, source: &Str, name: &str) -> Result<Value, EvcError> {
        let xptr = self.assemble(source, name)?;
        self.run_xptr(&xptr)
    }

    /// Run an already-assembled code object against the persistent
    /// top-level scope.
    pub fn run_xptr(&mut self, xptr: &Rc<Xptr>) -> Result<Value, EvcError> {
        self.vm.run_script(xptr, &self.module)
    }

    /// Run a script file with import bookkeeping (breadcrumbs, sys
    /// paths) in place, so its relative imports resolve against its own
    /// directory.
    pub fn run_file(&mut self, path: &Path) -> Result<Value, EvcError> {
        let resolved = path.canonicalize().map_err(|e| {
            EvcError::new(
                evilcandy_core::ErrorClass::System,
                format!("cannot open '{}': {e}", path.display()),
            )
        })?;
        let xptr = import::load_and_assemble(&resolved)?;
        import::run_module(&mut self.vm, &xptr, &self.module, &resolved)
    }

    /// Assemble a file for disassembly without executing it.
    pub fn assemble_file(&mut self, path: &Path) -> Result<Rc<Xptr>, EvcError> {
        import::load_and_assemble(path)
    }

    /// Render an uncaught error the way the top-level driver prints it:
    /// the `class: message` line plus one traceback line per frame.
    pub fn format_error(&self, e: &EvcError) -> String {
        let mut out = e.to_string();
        for (file, line, what) in self.vm.traceback.iter() {
            out.push_str(&format!("\n  at {file}:{line} in {what}"));
        }
        out
    }
}
