//! Command-line interface for the `jpc` compiler.

use std::path::PathBuf;

use clap::Parser as ClapParser;

use crate::driver;
use crate::error::CompileError;

/// Compiles a source-dialect entry file into the legacy target dialect.
#[derive(ClapParser, Debug)]
#[command(name = "jpc", version, about)]
pub struct Cli {
    /// Entry source path. If omitted, `main.jp` is searched for in the
    /// current directory.
    pub entry: Option<PathBuf>,

    /// Output path override. Defaults to the entry path with its
    /// extension replaced by `.j`.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Tab width used when expanding leading tabs during indentation
    /// measurement.
    #[arg(long, default_value_t = 4)]
    pub tab_width: usize,
}

impl Cli {
    fn resolve_entry(&self) -> Result<PathBuf, CompileError> {
        self.resolve_entry_in(&PathBuf::from("."))
    }

    fn resolve_entry_in(&self, dir: &std::path::Path) -> Result<PathBuf, CompileError> {
        if let Some(entry) = &self.entry {
            return Ok(entry.clone());
        }
        let candidate = dir.join("main.jp");
        if candidate.exists() {
            Ok(candidate)
        } else {
            Err(CompileError::Io {
                path: candidate,
                detail: "no entry path given and no main.jp found in the search directory".into(),
            })
        }
    }
}

/// Runs the CLI end to end, returning the exit code to use.
pub fn run_cli(cli: Cli) -> i32 {
    let result = cli
        .resolve_entry()
        .and_then(|entry| driver::compile_and_write(&entry, cli.output.as_deref(), cli.tab_width));

    match result {
        Ok(out_path) => {
            println!("wrote {}", out_path.display());
            0
        }
        Err(err) => {
            let rendered = match &err {
                CompileError::Lexical { loc, .. }
                | CompileError::Syntax { loc, .. }
                | CompileError::Semantic { loc, .. } => std::fs::read_to_string(&loc.unit)
                    .map(|source| err.display_with_source(&source))
                    .unwrap_or_else(|_| format!("{err}")),
                _ => format!("{err}"),
            };
            eprintln!("{rendered}");
            err.exit_code()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_entry_prefers_explicit_path() {
        let cli = Cli { entry: Some(PathBuf::from("foo.jp")), output: None, tab_width: 4 };
        assert_eq!(cli.resolve_entry().unwrap(), PathBuf::from("foo.jp"));
    }

    #[test]
    fn resolve_entry_fails_without_main_jp_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli { entry: None, output: None, tab_width: 4 };
        let result = cli.resolve_entry_in(dir.path());
        assert!(matches!(result, Err(CompileError::Io { .. })));
    }

    #[test]
    fn resolve_entry_finds_main_jp_in_search_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.jp"), "library Foo:\n    int x = 1\n").unwrap();
        let cli = Cli { entry: None, output: None, tab_width: 4 };
        let result = cli.resolve_entry_in(dir.path()).unwrap();
        assert!(result.ends_with("main.jp"));
    }
}
