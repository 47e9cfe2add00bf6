//! Disassembler for the `-d`/`-D` command-line options.
//!
//! Output begins with `.define` lines naming the operand enumerants,
//! then one `.start <uuid>` block per code object (the script first,
//! nested functions after), each with its instruction listing, a
//! `.rodata` section, and `.end`.

use std::fmt::Write;
use std::rc::Rc;

use evilcandy_core::value::Value;
use evilcandy_core::xptr::{AttrKind, CmpKind, Opcode, PtrKind, Xptr};

const ATTR_NAMES: [&str; 2] = ["ATTR_CONST", "ATTR_STACK"];
const PTR_NAMES: [&str; 6] = ["AP", "FP", "CP", "SEEK", "GBL", "THIS"];
const FUNCARG_NAMES: [&str; 2] = ["NO_PARENT", "WITH_PARENT"];
const CMP_NAMES: [&str; 6] = ["EQ", "LEQ", "GEQ", "NEQ", "LT", "GT"];

/// Render a script's full disassembly.
pub fn disassemble(xptr: &Rc<Xptr>, source_name: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# disassembly of \"{source_name}\"");
    add_defines(&mut out, &ATTR_NAMES);
    add_defines(&mut out, &FUNCARG_NAMES);
    add_defines(&mut out, &CMP_NAMES);
    add_defines(&mut out, &PTR_NAMES);
    out.push('\n');

    let mut queue: Vec<Rc<Xptr>> = vec![xptr.clone()];
    let mut done = 0;
    while done < queue.len() {
        let x = queue[done].clone();
        done += 1;
        for v in &x.rodata {
            if let Value::Code(nested) = v {
                queue.push(nested.clone());
            }
        }
        dump_one(&mut out, &x);
    }
    out
}

fn add_defines(out: &mut String, names: &[&str]) {
    for (i, name) in names.iter().enumerate() {
        let _ = writeln!(out, ".define {name:<24}{i}");
    }
}

fn label_at(x: &Xptr, line: usize) -> Option<usize> {
    x.labels.iter().position(|&l| l == line)
}

fn rodata_str(x: &Xptr, idx: i16) -> String {
    let Some(v) = x.rodata.get(idx as usize) else {
        return "<!bad rodata index>".to_string();
    };
    match v {
        Value::Int(i) => format!("0x{:016x}", *i as u64),
        Value::Float(f) => format!("{f:.8e}"),
        Value::Code(nested) => format!("<{}>", nested.uuid),
        other => other.repr().unwrap_or_else(|e| e.to_string()),
    }
}

fn dump_one(out: &mut String, x: &Xptr) {
    let _ = writeln!(out, ".start <{}>", x.uuid);
    let _ = writeln!(out, "# {} line {}", x.file_name, x.file_line);
    if !x.arg_names.is_empty() {
        let _ = writeln!(out, "# args: {}", x.arg_names.join(", "));
    }

    for (at, ins) in x.instr.iter().enumerate() {
        if let Some(l) = label_at(x, at) {
            let _ = writeln!(out, "L{l}:");
        }
        let mn = ins.code.mnemonic();
        let note = annotate(x, at, ins.code, ins.arg1, ins.arg2);
        if note.is_empty() {
            let _ = writeln!(out, "    {at:4}  {mn:<12}{:4}{:7}", ins.arg1, ins.arg2);
        } else {
            let _ = writeln!(
                out,
                "    {at:4}  {mn:<12}{:4}{:7}  # {note}",
                ins.arg1, ins.arg2
            );
        }
    }

    for i in 0..x.rodata.len() {
        let _ = writeln!(out, ".rodata {}", rodata_str(x, i as i16));
    }
    let _ = writeln!(out, ".end");
    out.push('\n');
}

fn annotate(x: &Xptr, at: usize, code: Opcode, arg1: u8, arg2: i16) -> String {
    match code {
        Opcode::LoadConst | Opcode::DefFunc => rodata_str(x, arg2),
        Opcode::Load | Opcode::Assign => {
            let ptr = PtrKind::from_u8(arg1);
            match ptr {
                Some(PtrKind::Seek) | Some(PtrKind::Gbl) => format!(
                    "{} {}",
                    PTR_NAMES[arg1 as usize],
                    rodata_str(x, arg2)
                ),
                Some(_) => PTR_NAMES[arg1 as usize].to_string(),
                None => "<!undefined>".to_string(),
            }
        }
        Opcode::SymTab => rodata_str(x, arg2),
        Opcode::GetAttr | Opcode::SetAttr => match AttrKind::from_u8(arg1) {
            Some(AttrKind::Const) => {
                format!("{} {}", ATTR_NAMES[0], rodata_str(x, arg2))
            }
            Some(AttrKind::Stack) => ATTR_NAMES[1].to_string(),
            None => "<!undefined>".to_string(),
        },
        Opcode::Cmp => CmpKind::from_u8(arg1)
            .map(|k| k.name().to_string())
            .unwrap_or_else(|| "<!undefined>".to_string()),
        Opcode::CallFunc => {
            let parent = FUNCARG_NAMES[(arg1 & 1) as usize];
            format!("{parent} argc={arg2}")
        }
        Opcode::B | Opcode::BIf => {
            let target = at as i64 + 1 + arg2 as i64;
            match label_at(x, target as usize) {
                Some(l) => format!("-> L{l}"),
                None => format!("-> {target}"),
            }
        }
        Opcode::PushHandler => format!("-> L{arg2}"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use evilcandy_core::Str;

    #[test]
    fn test_header_defines() {
        let src = Str::from_str("print(1);");
        let x = assemble(&src, Rc::from("t.evc")).unwrap();
        let text = disassemble(&x, "t.evc");
        assert!(text.contains(&format!(".define {:<24}{}", "ATTR_CONST", 0)));
        assert!(text.contains(&format!(".define {:<24}{}", "WITH_PARENT", 1)));
        assert!(text.contains(&format!(".define {:<24}{}", "GT", 5)));
        assert!(text.contains(&format!(".define {:<24}{}", "SEEK", 3)));
    }

    #[test]
    fn test_one_block_per_xptr() {
        let src = Str::from_str("function f() { return 1; } function g() { return 2; }");
        let x = assemble(&src, Rc::from("t.evc")).unwrap();
        let text = disassemble(&x, "t.evc");
        assert_eq!(text.matches(".start <").count(), 3);
        assert_eq!(text.matches(".end").count(), 3);
    }

    #[test]
    fn test_rodata_formats() {
        let src = Str::from_str("let a = 255; let b = 0.25; let c = 'hi';");
        let x = assemble(&src, Rc::from("t.evc")).unwrap();
        let text = disassemble(&x, "t.evc");
        assert!(text.contains(".rodata 0x00000000000000ff"));
        assert!(text.contains(".rodata 2.50000000e-1"));
        assert!(text.contains(".rodata 'hi'"));
    }

    #[test]
    fn test_nested_xptr_by_uuid() {
        let src = Str::from_str("function f() { return 1; }");
        let x = assemble(&src, Rc::from("t.evc")).unwrap();
        let text = disassemble(&x, "t.evc");
        let Some(Value::Code(f)) = x.rodata.iter().find(|v| matches!(v, Value::Code(_)))
        else {
            panic!("nested code missing");
        };
        assert!(text.contains(&format!(".rodata <{}>", f.uuid)));
        assert!(text.contains(&format!(".start <{}>", f.uuid)));
    }
}
