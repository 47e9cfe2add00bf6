//! Executable code objects and their instruction encoding.
//!
//! The assembler emits one [`Xptr`] per function definition plus one for
//! the enclosing script. Instructions are fixed-size
//! `(opcode, arg1, arg2)` records; `arg1` selects a sub-kind (pointer
//! class, comparison, call flags) and `arg2` is an index or a signed
//! branch offset. Branches are relative to the instruction after the
//! branch. `PushHandler` refers to the label table, which maps label
//! index to instruction index once the enclosing scope is fully parsed.

use std::rc::Rc;

use crate::value::Value;

/// Dense opcode enumeration. `arg1`/`arg2` meanings are noted per
/// variant; unused operands are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,
    /// Push `rodata[arg2]`.
    LoadConst,
    /// Push from the store selected by `arg1` (a [`PtrKind`]); `arg2` is
    /// a slot index, or a rodata name index for `Seek`.
    Load,
    /// Pop into the store selected by `arg1`/`arg2` as for `Load`.
    Assign,
    /// Pop an initial value and declare `rodata[arg2]` in the scope
    /// selected by `arg1` (a [`SymScope`]).
    SymTab,
    /// Pop and discard.
    Pop,
    /// Duplicate the top of stack.
    Dup,
    /// Duplicate the top two stack entries, preserving order.
    Dup2,
    /// Push an attribute of the popped object. `arg1` is an
    /// [`AttrKind`]: `Const` keys by `rodata[arg2]`, `Stack` pops the
    /// key first.
    GetAttr,
    /// Store into an attribute: pops value, then key when `arg1` is
    /// `Stack`, then the object.
    SetAttr,
    /// Push a function built from the `Xptr` at `rodata[arg2]`.
    DefFunc,
    /// Pop a captured value and append it to the closure array of the
    /// function on top of the stack.
    AddClosure,
    /// Attach a default for parameter `arg2`: pops the function, pops
    /// the default value beneath it, pushes the function back.
    AddDefault,
    /// Call. `arg1` holds [`CallFlags`] bits; `arg2` is the positional
    /// count on the stack. Layout (bottom to top):
    /// `[parent?] callable arg0 .. argN [kwdict?]`.
    CallFunc,
    /// Pop the return value and tear down the frame.
    Return,
    /// Unconditional branch by `arg2`.
    B,
    /// Pop a condition; branch by `arg2` when its truth equals `arg1`.
    BIf,
    /// Pop rhs, lhs; push the boolean result of comparison `arg1` (a
    /// [`CmpKind`]).
    Cmp,
    /// Arm an exception handler at label `arg2`.
    PushHandler,
    /// Disarm the innermost handler.
    PopHandler,
    /// Pop `arg2` elements into a fresh list (first pushed first).
    BuildList,
    /// Pop `arg2` elements into a tuple.
    BuildTuple,
    /// Pop `arg2` key/value pairs into a dict.
    BuildDict,
    /// Wrap the top of stack for call-site spreading.
    Star,
    /// Pop step, stop, start, sequence; push the slice.
    GetSlice,
    /// Pop value, step, stop, start, sequence; splice the value in.
    SetSlice,
    // Binary operators; pop rhs, lhs, push result.
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    BinAnd,
    BinOr,
    BinXor,
    Shl,
    Shr,
    // Unary operators on the top of stack.
    Negate,
    BitNot,
    LogNot,
}

impl Opcode {
    /// Disassembler mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::LoadConst => "LOAD_CONST",
            Opcode::Load => "LOAD",
            Opcode::Assign => "ASSIGN",
            Opcode::SymTab => "SYMTAB",
            Opcode::Pop => "POP",
            Opcode::Dup => "DUP",
            Opcode::Dup2 => "DUP2",
            Opcode::GetAttr => "GETATTR",
            Opcode::SetAttr => "SETATTR",
            Opcode::DefFunc => "DEFFUNC",
            Opcode::AddClosure => "ADD_CLOSURE",
            Opcode::AddDefault => "ADD_DEFAULT",
            Opcode::CallFunc => "CALL_FUNC",
            Opcode::Return => "RETURN",
            Opcode::B => "B",
            Opcode::BIf => "B_IF",
            Opcode::Cmp => "CMP",
            Opcode::PushHandler => "PUSH_HANDLER",
            Opcode::PopHandler => "POP_HANDLER",
            Opcode::BuildList => "BUILD_LIST",
            Opcode::BuildTuple => "BUILD_TUPLE",
            Opcode::BuildDict => "BUILD_DICT",
            Opcode::Star => "STAR",
            Opcode::GetSlice => "GET_SLICE",
            Opcode::SetSlice => "SET_SLICE",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Mod => "MOD",
            Opcode::Pow => "POW",
            Opcode::BinAnd => "AND",
            Opcode::BinOr => "OR",
            Opcode::BinXor => "XOR",
            Opcode::Shl => "SHL",
            Opcode::Shr => "SHR",
            Opcode::Negate => "NEG",
            Opcode::BitNot => "BNOT",
            Opcode::LogNot => "LNOT",
        }
    }
}

/// Value stores addressable by `Load`/`Assign`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PtrKind {
    /// Argument pointer: slot `arg2` among the frame's arguments.
    Ap = 0,
    /// Frame pointer: local slot `arg2`.
    Fp,
    /// Closure pointer: captured cell `arg2`.
    Cp,
    /// Dynamic lookup by the name at `rodata[arg2]`.
    Seek,
    /// Module globals by the name at `rodata[arg2]`.
    Gbl,
    /// The frame's owner (`this`).
    This,
}

impl PtrKind {
    pub fn from_u8(v: u8) -> Option<PtrKind> {
        Some(match v {
            0 => PtrKind::Ap,
            1 => PtrKind::Fp,
            2 => PtrKind::Cp,
            3 => PtrKind::Seek,
            4 => PtrKind::Gbl,
            5 => PtrKind::This,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            PtrKind::Ap => "AP",
            PtrKind::Fp => "FP",
            PtrKind::Cp => "CP",
            PtrKind::Seek => "SEEK",
            PtrKind::Gbl => "GBL",
            PtrKind::This => "THIS",
        }
    }
}

/// Scopes a `SymTab` declaration can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SymScope {
    Global = 0,
    /// Module global hidden from the import surface.
    GlobalPrivate,
}

impl SymScope {
    pub fn from_u8(v: u8) -> Option<SymScope> {
        Some(match v {
            0 => SymScope::Global,
            1 => SymScope::GlobalPrivate,
            _ => return None,
        })
    }
}

/// Attribute addressing for `GetAttr`/`SetAttr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AttrKind {
    /// Key is the string at `rodata[arg2]`.
    Const = 0,
    /// Key is popped from the stack.
    Stack,
}

impl AttrKind {
    pub fn from_u8(v: u8) -> Option<AttrKind> {
        Some(match v {
            0 => AttrKind::Const,
            1 => AttrKind::Stack,
            _ => return None,
        })
    }
}

/// Comparison selector for `Cmp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CmpKind {
    Eq = 0,
    Leq,
    Geq,
    Neq,
    Lt,
    Gt,
}

impl CmpKind {
    pub fn from_u8(v: u8) -> Option<CmpKind> {
        Some(match v {
            0 => CmpKind::Eq,
            1 => CmpKind::Leq,
            2 => CmpKind::Geq,
            3 => CmpKind::Neq,
            4 => CmpKind::Lt,
            5 => CmpKind::Gt,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            CmpKind::Eq => "EQ",
            CmpKind::Leq => "LEQ",
            CmpKind::Geq => "GEQ",
            CmpKind::Neq => "NEQ",
            CmpKind::Lt => "LT",
            CmpKind::Gt => "GT",
        }
    }
}

/// `CallFunc` flag bits in `arg1`.
pub mod call_flags {
    /// The slot below the callable holds the receiver (`this`).
    pub const WITH_PARENT: u8 = 1 << 0;
    /// A keyword dict sits above the positional arguments.
    pub const HAS_KW: u8 = 1 << 1;
}

/// One fixed-size instruction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instr {
    pub code: Opcode,
    pub arg1: u8,
    pub arg2: i16,
}

impl Instr {
    pub fn new(code: Opcode, arg1: u8, arg2: i16) -> Self {
        Instr { code, arg1, arg2 }
    }

    pub fn op(code: Opcode) -> Self {
        Instr { code, arg1: 0, arg2: 0 }
    }
}

/// An executable code object.
///
/// `labels` maps label index to instruction index; the VM consults it
/// for `PushHandler` targets and the disassembler for branch
/// annotations. Parameter metadata lives here so every function object
/// sharing this code agrees on arity.
#[derive(Debug)]
pub struct Xptr {
    pub instr: Vec<Instr>,
    pub rodata: Vec<Value>,
    pub labels: Vec<usize>,
    pub file_name: Rc<str>,
    pub file_line: u32,
    /// Identity string for disassembler output.
    pub uuid: String,
    /// Declared parameter names in order.
    pub arg_names: Vec<String>,
    /// Index of the first parameter with a default, or -1.
    pub optind: i16,
    /// Index of the trailing keyword-dict parameter, or -1.
    pub kwind: i16,
    /// Local slots the frame reserves above the arguments.
    pub n_locals: u16,
}

impl Xptr {
    pub fn argc(&self) -> usize {
        self.arg_names.len()
    }

    /// Required positional count: parameters before the first default
    /// and before any trailing keyword dict.
    pub fn min_args(&self) -> usize {
        let mut n = self.arg_names.len();
        if self.kwind >= 0 {
            n -= 1;
        }
        if self.optind >= 0 {
            n = n.min(self.optind as usize);
        }
        n
    }

    /// Maximum positional count.
    pub fn max_args(&self) -> usize {
        let mut n = self.arg_names.len();
        if self.kwind >= 0 {
            n -= 1;
        }
        n
    }
}
