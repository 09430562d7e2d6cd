//! runic — run a script file against the demo calculator parser.
//!
//! Usage: `runic <script> [a] [b]`
//!
//! The script is compiled against a fixed kind with output `out` and int
//! inputs `a` and `b`, then executed once with the given input values.

mod pipeline;

use std::process::ExitCode;

const EXIT_USAGE: u8 = 64;
const EXIT_ERROR: u8 = 1;

struct Args {
    script_path: String,
    a: i64,
    b: i64,
}

fn parse_args(raw: &[String]) -> Result<Args, String> {
    let mut it = raw.iter();
    let script_path = it.next().ok_or("missing script path")?.clone();
    let a = match it.next() {
        Some(v) => v.parse::<i64>().map_err(|_| format!("invalid input 'a': {v}"))?,
        None => 0,
    };
    let b = match it.next() {
        Some(v) => v.parse::<i64>().map_err(|_| format!("invalid input 'b': {v}"))?,
        None => 0,
    };
    if it.next().is_some() {
        return Err("too many arguments".into());
    }
    Ok(Args { script_path, a, b })
}

fn main() -> ExitCode {
    let raw: Vec<String> = std::env::args().skip(1).collect();

    if raw.iter().any(|a| a == "--help" || a == "-h") {
        println!("usage: runic <script> [a] [b]");
        println!();
        println!("Compiles <script> against the demo kind (out; a, b) and runs it.");
        return ExitCode::SUCCESS;
    }

    let args = match parse_args(&raw) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("runic: {e}");
            eprintln!("usage: runic <script> [a] [b]");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let source = match std::fs::read_to_string(&args.script_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("runic: cannot read '{}': {e}", args.script_path);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    match pipeline::run(&args.script_path, &source, args.a, args.b) {
        Ok(out) => {
            println!("{out}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("runic: {e}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}
