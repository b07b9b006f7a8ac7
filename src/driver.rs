use std::path::{Path, PathBuf};

use crate::codegen;
use crate::error::CompileError;
use crate::intern::Interner;
use crate::lexer::Lexer;
use crate::lowering;
use crate::parser::Parser;
use crate::resolver::Resolver;

/// Per-invocation compilation state (§9 "global mutable state" note): one
/// `CompileContext` is built per call to `compile_file`, threaded through
/// every phase, and dropped at the end. Nothing here outlives a single
/// invocation.
pub struct CompileContext {
    pub tab_width: usize,
    pub interner: Interner,
}

impl CompileContext {
    pub fn new(tab_width: usize) -> Self {
        CompileContext { tab_width, interner: Interner::new() }
    }
}

/// Runs the full pipeline — resolve, lex, parse, lower, emit — for one
/// entry file, returning the self-contained target-dialect text.
pub fn compile_file(entry: &Path, ctx: &mut CompileContext) -> Result<String, CompileError> {
    let resolver = Resolver::new(ctx.tab_width);
    let units = resolver.resolve(entry)?;

    let mut output = String::new();
    for unit in units {
        let lexer = Lexer::new(unit.path.clone(), &unit.text, &mut ctx.interner, ctx.tab_width);
        let tokens = lexer.tokenize()?;

        let mut program = Parser::new(unit.path.clone(), &tokens).parse_program()?;
        lowering::lower(&mut program, &unit.path, &mut ctx.interner)?;

        let rendered = codegen::emit_program(&program, &ctx.interner, &unit.path)?;
        output.push_str(&rendered);
    }
    Ok(output)
}

/// Compiles `entry` and writes the result next to it with the target
/// extension (§6), returning the output path.
pub fn compile_and_write(entry: &Path, output: Option<&Path>, tab_width: usize) -> Result<PathBuf, CompileError> {
    let mut ctx = CompileContext::new(tab_width);
    let rendered = compile_file(entry, &mut ctx)?;

    let out_path = match output {
        Some(path) => path.to_path_buf(),
        None => entry.with_extension("j"),
    };
    std::fs::write(&out_path, rendered).map_err(|e| CompileError::Io {
        path: out_path.clone(),
        detail: format!("{e}"),
    })?;
    Ok(out_path)
}
