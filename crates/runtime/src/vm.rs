//! The virtual machine.
//!
//! One [`Vm`] owns the value stack, the native-function registry, the
//! builtin namespace, and the import state. Each function activation
//! runs [`Vm::run_frame`] over its own [`Xptr`]: arguments sit at `ap`,
//! locals at `fp`, scratch values above. Calls re-enter `run_frame`, so
//! the frame chain is the Rust call stack with a depth counter holding
//! the `RecursionError` line.
//!
//! Errors propagate as `Result`; an instruction that fails unwinds to
//! the innermost armed handler in the current frame (restoring the
//! recorded stack height and pushing the `{name, message}` exception
//! dict), or tears the frame down and lets the caller's frame try.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use evilcandy_core::arith::{self, BinOp};
use evilcandy_core::dict::Dict;
use evilcandy_core::error::{ErrorClass, EvcError};
use evilcandy_core::function::{FuncDef, ModuleScope, NativeFunc, NativeId, UserFunc};
use evilcandy_core::strings::Str;
use evilcandy_core::value::{var_compare, Value};
use evilcandy_core::xptr::{call_flags, AttrKind, CmpKind, Opcode, PtrKind, SymScope, Xptr};
use evilcandy_core::{RECURSION_MAX, VM_STACK_SIZE};
use tracing::debug;

use crate::marshal;
use crate::ops;

/// Arguments handed to a native callback.
pub struct NativeArgs<'a> {
    pub this: Value,
    pub args: &'a [Value],
    /// Keyword dict, when the call site supplied one.
    pub kwargs: Option<Value>,
}

pub type NativeFn = fn(&mut Vm, NativeArgs<'_>) -> Result<Value, EvcError>;

pub struct NativeEntry {
    pub name: &'static str,
    pub func: NativeFn,
}

struct Handler {
    label: usize,
    stack_len: usize,
}

/// One traceback entry: file, line, function description.
pub type TraceEntry = (String, u32, String);

pub struct Vm {
    stack: Vec<Value>,
    natives: Vec<NativeEntry>,
    /// `(type name, method name)` to callable payloads.
    methods: HashMap<(&'static str, String), Value>,
    pub builtins: ModuleScope,
    pub sys: ModuleScope,
    /// Fully resolved paths of the scripts currently loading.
    pub breadcrumbs: Vec<PathBuf>,
    depth: usize,
    /// Collected while a module's top-level frame runs; consumed by
    /// `import` to hide `private` names.
    pub module_private: Vec<Rc<Str>>,
    /// Frames recorded while an uncaught error unwinds.
    pub traceback: Vec<TraceEntry>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        let mut vm = Vm {
            stack: Vec::with_capacity(256),
            natives: Vec::new(),
            methods: HashMap::new(),
            builtins: Rc::new(RefCell::new(Dict::new())),
            sys: Rc::new(RefCell::new(Dict::new())),
            breadcrumbs: Vec::new(),
            depth: 0,
            module_private: Vec::new(),
            traceback: Vec::new(),
        };
        crate::builtins::install(&mut vm);
        crate::methods::install(&mut vm);
        vm
    }

    /// Register a native function and return its callable value.
    pub fn native(
        &mut self,
        name: &'static str,
        minargs: usize,
        maxargs: usize,
        func: NativeFn,
    ) -> Value {
        let id = NativeId(self.natives.len() as u32);
        self.natives.push(NativeEntry { name, func });
        Value::Function(Rc::new(FuncDef::Native(NativeFunc {
            name,
            minargs,
            maxargs,
            id,
        })))
    }

    /// Register a method on a builtin type's attribute table.
    pub fn method(
        &mut self,
        type_name: &'static str,
        name: &'static str,
        minargs: usize,
        maxargs: usize,
        func: NativeFn,
    ) {
        let value = self.native(name, minargs, maxargs, func);
        self.methods.insert((type_name, name.to_string()), value);
    }

    pub fn lookup_method(&self, type_name: &'static str, name: &str) -> Option<Value> {
        self.methods.get(&(type_name, name.to_string())).cloned()
    }

    /// Define a name in the builtin namespace.
    pub fn define_builtin(&mut self, name: &str, value: Value) {
        self.builtins
            .borrow_mut()
            .insert(Rc::new(Str::from_str(name)), value)
            .expect("builtins never locked during setup");
    }

    /// Run a script's top-level code object against a module scope.
    /// Returns the script's return value; `private` declarations land
    /// in [`Vm::module_private`].
    pub fn run_script(&mut self, xptr: &Rc<Xptr>, module: &ModuleScope) -> Result<Value, EvcError> {
        self.traceback.clear();
        self.module_private.clear();
        let owner = Value::Dict(module.clone());
        debug!(file = %xptr.file_name, "running script");
        self.run_frame(xptr, None, owner, module.clone())
    }

    /// Invoke any callable with positional values and an optional
    /// keyword dict. Used by `CallFunc` and by natives that call back
    /// into user code (`foreach`, `sort`, `import`).
    pub fn call_value(
        &mut self,
        callable: Value,
        this: Value,
        mut pos: Vec<Value>,
        kw: Option<Value>,
    ) -> Result<Value, EvcError> {
        match callable {
            Value::Method(m) => self.call_value(m.func.clone(), m.this.clone(), pos, kw),
            Value::Function(def) => match def.as_ref() {
                FuncDef::Native(n) => {
                    if pos.len() < n.minargs || pos.len() > n.maxargs {
                        return Err(EvcError::new(
                            ErrorClass::Argument,
                            format!(
                                "{}() takes {} to {} arguments ({} given)",
                                n.name,
                                n.minargs,
                                if n.maxargs == usize::MAX {
                                    "any".to_string()
                                } else {
                                    n.maxargs.to_string()
                                },
                                pos.len()
                            ),
                        ));
                    }
                    let func = self.natives[n.id.0 as usize].func;
                    func(
                        self,
                        NativeArgs {
                            this,
                            args: &pos,
                            kwargs: kw,
                        },
                    )
                }
                FuncDef::User(u) => {
                    let args = marshal::marshal_user(u, &mut pos, kw)?;
                    let xptr = u.xptr.clone();
                    let module = u.module.clone();
                    self.stack.extend(args);
                    let func_value = def.clone();
                    self.run_frame(&xptr, Some(&func_value), this, module)
                }
            },
            other => Err(EvcError::type_err(format!(
                "{} object is not callable",
                other.type_name()
            ))),
        }
    }

    fn seek(&self, module: &ModuleScope, name: &Str) -> Result<Value, EvcError> {
        if let Some(v) = module.borrow().get(name) {
            return Ok(v);
        }
        if let Some(v) = self.builtins.borrow().get(name) {
            return Ok(v);
        }
        Err(EvcError::new(
            ErrorClass::Name,
            format!("symbol '{name}' not found"),
        ))
    }

    fn rodata_name(xptr: &Xptr, idx: i16) -> Result<Rc<Str>, EvcError> {
        match xptr.rodata.get(idx as usize) {
            Some(Value::Str(s)) => Ok(s.clone()),
            _ => Err(bug("operand is not a rodata string")),
        }
    }

    fn pop(&mut self) -> Result<Value, EvcError> {
        self.stack.pop().ok_or_else(|| bug("value stack underflow"))
    }

    /// Execute one frame. Arguments (exactly `xptr.arg_names.len()` of
    /// them) must already be on the stack.
    fn run_frame(
        &mut self,
        xptr: &Rc<Xptr>,
        func: Option<&Rc<FuncDef>>,
        owner: Value,
        module: ModuleScope,
    ) -> Result<Value, EvcError> {
        if self.depth >= RECURSION_MAX {
            return Err(EvcError::new(
                ErrorClass::Recursion,
                "call nesting exceeds the recursion limit",
            ));
        }
        self.depth += 1;
        let result = self.frame_loop(xptr, func, owner, module);
        self.depth -= 1;
        result
    }

    fn frame_loop(
        &mut self,
        xptr: &Rc<Xptr>,
        func: Option<&Rc<FuncDef>>,
        owner: Value,
        module: ModuleScope,
    ) -> Result<Value, EvcError> {
        let ap = self.stack.len() - xptr.arg_names.len();
        let fp = self.stack.len();
        for _ in 0..xptr.n_locals {
            self.stack.push(Value::Null);
        }
        let mut ip: usize = 0;
        let mut handlers: Vec<Handler> = Vec::new();

        loop {
            if self.stack.len() > VM_STACK_SIZE {
                let err = EvcError::new(ErrorClass::System, "value stack overflow");
                self.stack.truncate(ap);
                self.record_trace(xptr, func);
                return Err(err);
            }
            let Some(ins) = xptr.instr.get(ip).copied() else {
                self.stack.truncate(ap);
                return Err(bug("instruction pointer ran off the code"));
            };
            ip += 1;

            let step = self.step(ins.code, ins.arg1, ins.arg2, xptr, func, &owner, &module, ap, fp, &mut ip, &mut handlers);
            match step {
                Ok(Flow::Next) => {}
                Ok(Flow::Return(v)) => {
                    self.stack.truncate(ap);
                    return Ok(v);
                }
                Err(e) => {
                    if let Some(h) = handlers.pop() {
                        // Caught: frames recorded while this error
                        // unwound are no longer interesting.
                        self.traceback.clear();
                        self.stack.truncate(h.stack_len);
                        self.stack.push(exception_value(&e));
                        ip = xptr.labels[h.label];
                    } else {
                        self.stack.truncate(ap);
                        self.record_trace(xptr, func);
                        return Err(e);
                    }
                }
            }
        }
    }

    fn record_trace(&mut self, xptr: &Xptr, func: Option<&Rc<FuncDef>>) {
        let what = match func {
            Some(f) => f.name(),
            None => "<script>".to_string(),
        };
        self.traceback
            .push((xptr.file_name.to_string(), xptr.file_line, what));
    }

    #[allow(clippy::too_many_arguments)]
    fn step(
        &mut self,
        code: Opcode,
        arg1: u8,
        arg2: i16,
        xptr: &Rc<Xptr>,
        func: Option<&Rc<FuncDef>>,
        owner: &Value,
        module: &ModuleScope,
        ap: usize,
        fp: usize,
        ip: &mut usize,
        handlers: &mut Vec<Handler>,
    ) -> Result<Flow, EvcError> {
        match code {
            Opcode::Nop => {}
            Opcode::LoadConst => {
                let v = xptr
                    .rodata
                    .get(arg2 as usize)
                    .cloned()
                    .ok_or_else(|| bug("rodata index out of range"))?;
                self.stack.push(v);
            }
            Opcode::Load => {
                let v = match PtrKind::from_u8(arg1) {
                    Some(PtrKind::Ap) => self.stack[ap + arg2 as usize].clone(),
                    Some(PtrKind::Fp) => self.stack[fp + arg2 as usize].clone(),
                    Some(PtrKind::Cp) => {
                        let cell = closure_cell(func, arg2 as usize)?;
                        cell
                    }
                    Some(PtrKind::Seek) => {
                        let name = Self::rodata_name(xptr, arg2)?;
                        self.seek(module, &name)?
                    }
                    Some(PtrKind::Gbl) => {
                        let name = Self::rodata_name(xptr, arg2)?;
                        module.borrow().get(&name).ok_or_else(|| {
                            EvcError::new(ErrorClass::Name, format!("symbol '{name}' not found"))
                        })?
                    }
                    Some(PtrKind::This) => owner.clone(),
                    None => return Err(bug("bad pointer kind")),
                };
                self.stack.push(v);
            }
            Opcode::Assign => {
                let v = self.pop()?;
                match PtrKind::from_u8(arg1) {
                    Some(PtrKind::Ap) => self.stack[ap + arg2 as usize] = v,
                    Some(PtrKind::Fp) => self.stack[fp + arg2 as usize] = v,
                    Some(PtrKind::Cp) => {
                        let Some(FuncDef::User(u)) = func.map(|f| f.as_ref()) else {
                            return Err(bug("closure store outside a function"));
                        };
                        let mut clov = u.clov.borrow_mut();
                        let Some(slot) = clov.get_mut(arg2 as usize) else {
                            return Err(bug("closure index out of range"));
                        };
                        *slot = v;
                    }
                    Some(PtrKind::Seek) => {
                        let name = Self::rodata_name(xptr, arg2)?;
                        let mut m = module.borrow_mut();
                        if !m.contains(&name) {
                            return Err(EvcError::new(
                                ErrorClass::Name,
                                format!("assignment to undeclared symbol '{name}'"),
                            ));
                        }
                        m.insert(name, v)?;
                    }
                    Some(PtrKind::Gbl) => {
                        let name = Self::rodata_name(xptr, arg2)?;
                        module.borrow_mut().insert(name, v)?;
                    }
                    Some(PtrKind::This) | None => return Err(bug("bad assign target")),
                }
            }
            Opcode::SymTab => {
                let v = self.pop()?;
                let name = Self::rodata_name(xptr, arg2)?;
                match SymScope::from_u8(arg1) {
                    Some(SymScope::Global) => {}
                    Some(SymScope::GlobalPrivate) => self.module_private.push(name.clone()),
                    None => return Err(bug("bad symbol scope")),
                }
                module.borrow_mut().insert(name, v)?;
            }
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::Dup => {
                let v = self.stack.last().cloned().ok_or_else(|| bug("dup on empty stack"))?;
                self.stack.push(v);
            }
            Opcode::Dup2 => {
                let n = self.stack.len();
                if n < 2 {
                    return Err(bug("dup2 needs two values"));
                }
                let a = self.stack[n - 2].clone();
                let b = self.stack[n - 1].clone();
                self.stack.push(a);
                self.stack.push(b);
            }
            Opcode::GetAttr => {
                let key = match AttrKind::from_u8(arg1) {
                    Some(AttrKind::Const) => Value::Str(Self::rodata_name(xptr, arg2)?),
                    Some(AttrKind::Stack) => self.pop()?,
                    None => return Err(bug("bad attribute kind")),
                };
                let obj = self.pop()?;
                let v = ops::getattr(self, &obj, &key)?;
                self.stack.push(v);
            }
            Opcode::SetAttr => {
                let value = self.pop()?;
                let key = match AttrKind::from_u8(arg1) {
                    Some(AttrKind::Const) => Value::Str(Self::rodata_name(xptr, arg2)?),
                    Some(AttrKind::Stack) => self.pop()?,
                    None => return Err(bug("bad attribute kind")),
                };
                let obj = self.pop()?;
                ops::setattr(self, &obj, &key, value)?;
            }
            Opcode::DefFunc => {
                let Some(Value::Code(inner)) = xptr.rodata.get(arg2 as usize) else {
                    return Err(bug("DefFunc operand is not a code object"));
                };
                let n_params = inner.arg_names.len();
                let f = FuncDef::User(UserFunc {
                    xptr: inner.clone(),
                    defaults: RefCell::new(vec![None; n_params]),
                    clov: RefCell::new(Vec::new()),
                    module: module.clone(),
                });
                self.stack.push(Value::Function(Rc::new(f)));
            }
            Opcode::AddClosure => {
                let v = self.pop()?;
                let Some(Value::Function(f)) = self.stack.last() else {
                    return Err(bug("AddClosure without a function on the stack"));
                };
                let FuncDef::User(u) = f.as_ref() else {
                    return Err(bug("AddClosure on a native function"));
                };
                u.clov.borrow_mut().push(v);
            }
            Opcode::AddDefault => {
                let f = self.pop()?;
                let v = self.pop()?;
                {
                    let Value::Function(fd) = &f else {
                        return Err(bug("AddDefault without a function"));
                    };
                    let FuncDef::User(u) = fd.as_ref() else {
                        return Err(bug("AddDefault on a native function"));
                    };
                    let mut defaults = u.defaults.borrow_mut();
                    let Some(slot) = defaults.get_mut(arg2 as usize) else {
                        return Err(bug("default index out of range"));
                    };
                    *slot = Some(v);
                }
                self.stack.push(f);
            }
            Opcode::CallFunc => {
                let kw = if arg1 & call_flags::HAS_KW != 0 {
                    Some(self.pop()?)
                } else {
                    None
                };
                let argc = arg2 as usize;
                if self.stack.len() < argc {
                    return Err(bug("call underflow"));
                }
                let raw = self.stack.split_off(self.stack.len() - argc);
                let callable = self.pop()?;
                let parent = if arg1 & call_flags::WITH_PARENT != 0 {
                    self.pop()?
                } else {
                    Value::Null
                };
                let pos = expand_stars(raw)?;
                let result = self.call_value(callable, parent, pos, kw)?;
                self.stack.push(result);
            }
            Opcode::Return => {
                let v = self.pop()?;
                return Ok(Flow::Return(v));
            }
            Opcode::B => {
                *ip = (*ip as i64 + arg2 as i64) as usize;
            }
            Opcode::BIf => {
                let cond = self.pop()?;
                if cond.truthy() == (arg1 != 0) {
                    *ip = (*ip as i64 + arg2 as i64) as usize;
                }
            }
            Opcode::Cmp => {
                let b = self.pop()?;
                let a = self.pop()?;
                let ord = var_compare(&a, &b)?;
                let kind = CmpKind::from_u8(arg1).ok_or_else(|| bug("bad comparison kind"))?;
                let truth = match kind {
                    CmpKind::Eq => ord == Ordering::Equal,
                    CmpKind::Neq => ord != Ordering::Equal,
                    CmpKind::Lt => ord == Ordering::Less,
                    CmpKind::Leq => ord != Ordering::Greater,
                    CmpKind::Gt => ord == Ordering::Greater,
                    CmpKind::Geq => ord != Ordering::Less,
                };
                self.stack.push(Value::Int(truth as i64));
            }
            Opcode::PushHandler => {
                handlers.push(Handler {
                    label: arg2 as usize,
                    stack_len: self.stack.len(),
                });
            }
            Opcode::PopHandler => {
                handlers.pop().ok_or_else(|| bug("no handler to pop"))?;
            }
            Opcode::BuildList => {
                let n = arg2 as usize;
                let items = self.stack.split_off(self.stack.len() - n);
                self.stack.push(Value::list(items));
            }
            Opcode::BuildTuple => {
                let n = arg2 as usize;
                let items = self.stack.split_off(self.stack.len() - n);
                self.stack.push(Value::tuple(items));
            }
            Opcode::BuildDict => {
                let n = arg2 as usize;
                let mut pairs = self.stack.split_off(self.stack.len() - 2 * n);
                let mut d = Dict::new();
                for chunk in pairs.chunks_mut(2) {
                    let key = std::mem::replace(&mut chunk[0], Value::Null);
                    let value = std::mem::replace(&mut chunk[1], Value::Null);
                    let Value::Str(key) = key else {
                        return Err(EvcError::type_err("dictionary keys must be strings"));
                    };
                    d.insert(key, value)?;
                }
                self.stack.push(Value::dict(d));
            }
            Opcode::Star => {
                let v = self.pop()?;
                self.stack.push(Value::Star(Rc::new(v)));
            }
            Opcode::GetSlice => {
                let step = self.pop()?;
                let stop = self.pop()?;
                let start = self.pop()?;
                let seq = self.pop()?;
                let v = ops::getslice(&seq, &start, &stop, &step)?;
                self.stack.push(v);
            }
            Opcode::SetSlice => {
                let value = self.pop()?;
                let step = self.pop()?;
                let stop = self.pop()?;
                let start = self.pop()?;
                let seq = self.pop()?;
                ops::setslice(&seq, &start, &stop, &step, value)?;
            }
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Mod
            | Opcode::Pow
            | Opcode::BinAnd
            | Opcode::BinOr
            | Opcode::BinXor
            | Opcode::Shl
            | Opcode::Shr => {
                let b = self.pop()?;
                let a = self.pop()?;
                let op = match code {
                    Opcode::Add => BinOp::Add,
                    Opcode::Sub => BinOp::Sub,
                    Opcode::Mul => BinOp::Mul,
                    Opcode::Div => BinOp::Div,
                    Opcode::Mod => BinOp::Mod,
                    Opcode::Pow => BinOp::Pow,
                    Opcode::BinAnd => BinOp::And,
                    Opcode::BinOr => BinOp::Or,
                    Opcode::BinXor => BinOp::Xor,
                    Opcode::Shl => BinOp::Shl,
                    _ => BinOp::Shr,
                };
                self.stack.push(arith::binary_op(op, &a, &b)?);
            }
            Opcode::Negate => {
                let v = self.pop()?;
                self.stack.push(arith::negate(&v)?);
            }
            Opcode::BitNot => {
                let v = self.pop()?;
                self.stack.push(arith::bit_not(&v)?);
            }
            Opcode::LogNot => {
                let v = self.pop()?;
                self.stack.push(Value::Int(!v.truthy() as i64));
            }
        }
        Ok(Flow::Next)
    }
}

enum Flow {
    Next,
    Return(Value),
}

fn closure_cell(func: Option<&Rc<FuncDef>>, idx: usize) -> Result<Value, EvcError> {
    let Some(FuncDef::User(u)) = func.map(|f| f.as_ref()) else {
        return Err(bug("closure load outside a function"));
    };
    u.clov
        .borrow()
        .get(idx)
        .cloned()
        .ok_or_else(|| bug("closure index out of range"))
}

/// Expand `*seq` wrappers into flat positional arguments.
fn expand_stars(raw: Vec<Value>) -> Result<Vec<Value>, EvcError> {
    let mut pos = Vec::with_capacity(raw.len());
    for v in raw {
        match v {
            Value::Star(inner) => match inner.as_ref() {
                Value::List(l) => pos.extend(l.borrow().iter().cloned()),
                Value::Tuple(t) => pos.extend(t.iter().cloned()),
                Value::Range(r) => pos.extend(r.iter().map(Value::Int)),
                other => {
                    return Err(EvcError::type_err(format!(
                        "cannot spread a {} argument",
                        other.type_name()
                    )));
                }
            },
            v => pos.push(v),
        }
    }
    Ok(pos)
}

/// The `{name, message}` dict a `catch` clause binds.
fn exception_value(e: &EvcError) -> Value {
    let mut d = Dict::new();
    let _ = d.insert(
        Rc::new(Str::from_str("name")),
        Value::str(e.class.name()),
    );
    let _ = d.insert(
        Rc::new(Str::from_str("message")),
        Value::str(&e.message),
    );
    Value::dict(d)
}

fn bug(msg: &str) -> EvcError {
    EvcError::new(ErrorClass::System, format!("interpreter bug: {msg}"))
}
