//! The `import` builtin: path resolution and pipeline re-entry.
//!
//! `import(path, mode)` resolves `path` against the directory of the
//! script currently loading, then the working directory, then the
//! `EVILCANDY_PATH` list; absolute paths bypass the search. Mode `"x"`
//! runs the module and returns its namespace (minus `private` names);
//! mode `"r"` returns the module as a callable to run later. Resolved
//! paths are recorded in `sys.breadcrumbs` while the module loads, and
//! a loop in the breadcrumbs is reported instead of recursing forever.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use evilcandy_core::dict::Dict;
use evilcandy_core::error::{ErrorClass, EvcError};
use evilcandy_core::function::{FuncDef, ModuleScope, UserFunc};
use evilcandy_core::strings::Str;
use evilcandy_core::value::Value;
use evilcandy_core::xptr::Xptr;
use tracing::debug;

use crate::vm::{NativeArgs, Vm};

pub fn bi_import(vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let Value::Str(path) = &call.args[0] else {
        return Err(EvcError::type_err("import expects a path string"));
    };
    let mode = match call.args.get(1) {
        Some(Value::Str(m)) => m.to_rust_string(),
        Some(other) => {
            return Err(EvcError::type_err(format!(
                "import mode must be a string, not {}",
                other.type_name()
            )));
        }
        None => "x".to_string(),
    };
    let resolved = resolve(vm, &path.to_rust_string())?;
    debug!(path = %resolved.display(), mode = %mode, "import");

    let xptr = load_and_assemble(&resolved)?;
    let module: ModuleScope = Rc::new(RefCell::new(Dict::new()));
    match mode.as_str() {
        "r" => Ok(Value::Function(Rc::new(FuncDef::User(UserFunc {
            xptr,
            defaults: RefCell::new(Vec::new()),
            clov: RefCell::new(Vec::new()),
            module,
        })))),
        "x" => run_module(vm, &xptr, &module, &resolved).map(|_| Value::Dict(module)),
        other => Err(EvcError::new(
            ErrorClass::Value,
            format!("import mode must be 'r' or 'x', not '{other}'"),
        )),
    }
}

/// Read and assemble a script file.
pub fn load_and_assemble(path: &Path) -> Result<Rc<Xptr>, EvcError> {
    let bytes = std::fs::read(path).map_err(|e| {
        EvcError::new(
            ErrorClass::System,
            format!("cannot read '{}': {e}", path.display()),
        )
    })?;
    let source = Str::from_bytes(&bytes);
    let name: Rc<str> = Rc::from(path.to_string_lossy().as_ref());
    evilcandy_compiler::assemble(&source, name)
}

/// Execute a module's top-level code with the breadcrumb bookkeeping
/// the import machinery relies on.
pub fn run_module(
    vm: &mut Vm,
    xptr: &Rc<Xptr>,
    module: &ModuleScope,
    path: &Path,
) -> Result<Value, EvcError> {
    if vm.breadcrumbs.iter().any(|p| p == path) {
        return Err(EvcError::new(
            ErrorClass::Runtime,
            format!("circular import of '{}'", path.display()),
        ));
    }
    vm.breadcrumbs.push(path.to_path_buf());
    sync_sys(vm);

    // A nested import must not clobber the private list the enclosing
    // module is still accumulating.
    let outer_private = std::mem::take(&mut vm.module_private);
    let result = vm.run_script(xptr, module);
    let private = std::mem::replace(&mut vm.module_private, outer_private);

    vm.breadcrumbs.pop();
    sync_sys(vm);

    result?;
    let mut m = module.borrow_mut();
    for name in private {
        m.remove(&name)?;
    }
    Ok(Value::Dict(module.clone()))
}

fn resolve(vm: &Vm, path: &str) -> Result<PathBuf, EvcError> {
    let p = PathBuf::from(path);
    if p.is_absolute() {
        if p.is_file() {
            return Ok(p);
        }
        return Err(not_found(path));
    }
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(current) = vm.breadcrumbs.last()
        && let Some(dir) = current.parent()
    {
        candidates.push(dir.join(path));
    }
    candidates.push(PathBuf::from(path));
    if let Ok(list) = std::env::var("EVILCANDY_PATH") {
        for dir in std::env::split_paths(&list) {
            candidates.push(dir.join(path));
        }
    }
    for c in candidates {
        if c.is_file() {
            // Canonical form keeps the breadcrumb cycle check honest.
            return c.canonicalize().map_err(|e| {
                EvcError::new(
                    ErrorClass::System,
                    format!("cannot resolve '{}': {e}", c.display()),
                )
            });
        }
    }
    Err(not_found(path))
}

fn not_found(path: &str) -> EvcError {
    EvcError::new(
        ErrorClass::System,
        format!("cannot find import '{path}'"),
    )
}

/// Mirror the breadcrumb state into `sys.import_path` and
/// `sys.breadcrumbs`.
fn sync_sys(vm: &mut Vm) {
    let crumbs: Vec<Value> = vm
        .breadcrumbs
        .iter()
        .map(|p| Value::str(&p.to_string_lossy()))
        .collect();
    let import_path: Vec<Value> = match vm.breadcrumbs.last().and_then(|p| p.parent()) {
        Some(dir) => vec![Value::str(&dir.to_string_lossy())],
        None => Vec::new(),
    };
    let sys = vm.sys.clone();
    let mut sys = sys.borrow_mut();
    let _ = sys.insert(
        Rc::new(Str::from_str("breadcrumbs")),
        Value::list(crumbs),
    );
    let _ = sys.insert(
        Rc::new(Str::from_str("import_path")),
        Value::list(import_path),
    );
}
