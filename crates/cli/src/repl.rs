//! Interactive mode: one statement per prompt against a persistent
//! top-level scope. Assembly and runtime errors print a diagnostic and
//! recovery is simply the next prompt.

use evilcandy_core::{Str, Value};
use evilcandy_runtime::Interp;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

const PROMPT: &str = "evc> ";

fn history_path() -> Option<std::path::PathBuf> {
    home::home_dir().map(|h| h.join(".evilcandy_history"))
}

pub fn run(interp: &mut Interp) {
    let mut editor = match DefaultEditor::new() {
        Ok(ed) => ed,
        Err(e) => {
            eprintln!("cannot start line editor: {e}");
            return;
        }
    };
    let history = history_path();
    if let Some(path) = &history {
        let _ = editor.load_history(path);
    }

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line.as_str());
                feed(interp, &line);
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("readline error: {e}");
                break;
            }
        }
    }

    if let Some(path) = &history {
        let _ = editor.save_history(path);
    }
}

fn feed(interp: &mut Interp, line: &str) {
    // A bare expression echoes its value; anything else runs as a
    // statement, with the trailing semicolon supplied when missing.
    if !line.trim_end().ends_with([';', '}']) {
        let wrapped = Str::from_str(&format!("return ({line});"));
        if let Ok(xptr) = interp.assemble(&wrapped, "<repl>") {
            match interp.run_xptr(&xptr) {
                Ok(Value::Null) => {}
                Ok(v) => match v.repr() {
                    Ok(text) => println!("{text}"),
                    Err(e) => eprintln!("{}", interp.format_error(&e)),
                },
                Err(e) => eprintln!("{}", interp.format_error(&e)),
            }
            return;
        }
    }
    let padded;
    let text = if line.trim_end().ends_with([';', '}']) {
        line
    } else {
        padded = format!("{line};");
        &padded
    };
    let source = Str::from_str(text);
    if let Err(e) = interp.run_source(&source, "<repl>") {
        eprintln!("{}", interp.format_error(&e));
    }
}
