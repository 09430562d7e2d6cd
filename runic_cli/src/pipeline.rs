//! Compile-and-execute pipeline for the CLI.

use runic_core::global::ScriptGlobal;
use runic_vm::{Parser, Worker};

/// Compile `source` against the demo kind and execute it once.
pub fn run(name: &str, source: &str, a: i64, b: i64) -> Result<i64, String> {
    let mut global = ScriptGlobal::new();
    let parser: Parser<(i64,), (i64, i64)> =
        Parser::new(&mut global, "cli", &["out"], &["a", "b"])
            .map_err(|e| format!("parser setup failed: {e}"))?;

    let container = parser
        .parse(&global, name, source)
        .map_err(|e| e.to_string())?;

    let mut worker = Worker::new(&parser, (a, b));
    let mut out = (0,);
    worker
        .execute(&container, &mut out)
        .map_err(|e| e.to_string())?;
    Ok(out.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_runs_a_script() {
        assert_eq!(run("inline", "out add a b; return out;", 19, 23), Ok(42));
    }

    #[test]
    fn test_pipeline_reports_compile_errors() {
        let err = run("inline", "out oops;", 0, 0).unwrap_err();
        assert!(err.contains("UnknownIdentifier"));
    }

    #[test]
    fn test_pipeline_reports_runtime_errors() {
        let err = run("inline", "out div a b; return out;", 1, 0).unwrap_err();
        assert!(err.contains("HandlerFailure"));
    }
}
