use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use hearth_bus::{Handler, HandlerCompiler};
use hearth_core::HearthConfig;

pub fn execute(config: &HearthConfig, snippet: Option<String>, file: Option<PathBuf>) -> Result<()> {
    let source = match (snippet, file) {
        (Some(snippet), _) => snippet,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => bail!("no handler source given"),
    };

    let name = compile(config, &source)?;
    println!("ok: {}", name);
    Ok(())
}

/// Compile `source` with the configured sandbox, returning the handler name.
pub fn compile(config: &HearthConfig, source: &str) -> Result<String> {
    let handler = HandlerCompiler::from(&config.sandbox).compile(source)?;
    Ok(handler.name().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_valid_snippet() {
        let name = compile(&HearthConfig::default(), "log('info', e.kind)").unwrap();
        assert!(name.starts_with("script:"));
    }

    #[test]
    fn test_invalid_snippet_reports_compile_error() {
        let err = compile(&HearthConfig::default(), "if e.kind then").unwrap_err();
        assert!(err.to_string().contains("failed to compile handler"));
    }

    #[test]
    fn test_snippet_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "if e.kind == 'TaskFailed' then log('error', e.task) end").unwrap();
        execute(&HearthConfig::default(), None, Some(file.path().to_path_buf())).unwrap();
    }

    #[test]
    fn test_missing_file() {
        let err = execute(
            &HearthConfig::default(),
            None,
            Some(PathBuf::from("/nonexistent/handler.lua")),
        )
        .unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
