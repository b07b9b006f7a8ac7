use std::fmt::Write as _;

use crate::ast::*;
use crate::error::{CompileError, Location};
use crate::intern::Interner;
use crate::token::Span;

const INDENT_STEP: &str = "    ";

/// Renders a lowered program tree as target-dialect text (§4.5). Emission
/// is total on a well-formed lowered tree; any node this walk does not
/// recognize is a compiler bug, not a user error.
pub fn emit_program(program: &Program, interner: &Interner, unit: &std::path::Path) -> Result<String, CompileError> {
    let mut emitter = Emitter { buf: String::new(), interner, unit };
    for item in &program.items {
        emitter.emit_top_level(item)?;
    }
    Ok(emitter.buf)
}

struct Emitter<'a> {
    buf: String,
    interner: &'a Interner,
    unit: &'a std::path::Path,
}

impl<'a> Emitter<'a> {
    fn name(&self, sym: crate::intern::Symbol) -> &str {
        self.interner.resolve(sym)
    }

    fn bug(&self, detail: impl Into<String>) -> CompileError {
        CompileError::Internal {
            loc: Some(Location::new(self.unit.to_path_buf(), Span::default())),
            detail: detail.into(),
        }
    }

    fn emit_top_level(&mut self, item: &TopLevel) -> Result<(), CompileError> {
        match item {
            TopLevel::Library(lib) => self.emit_library(lib),
            TopLevel::Scope(scope) => self.emit_scope(scope),
            TopLevel::Import(_) => Ok(()),
        }
    }

    fn emit_library(&mut self, lib: &Library) -> Result<(), CompileError> {
        match lib.initializer {
            Some(init) => writeln!(self.buf, "library {} initializer {}", self.name(lib.name), self.name(init)).unwrap(),
            None => writeln!(self.buf, "library {}", self.name(lib.name)).unwrap(),
        }
        self.emit_members(&lib.members, 1)?;
        writeln!(self.buf, "endlibrary\n").unwrap();
        Ok(())
    }

    fn emit_scope(&mut self, scope: &Scope) -> Result<(), CompileError> {
        match scope.initializer {
            Some(init) => writeln!(self.buf, "scope {} initializer {}", self.name(scope.name), self.name(init)).unwrap(),
            None => writeln!(self.buf, "scope {}", self.name(scope.name)).unwrap(),
        }
        self.emit_members(&scope.members, 1)?;
        writeln!(self.buf, "endscope\n").unwrap();
        Ok(())
    }

    fn emit_members(&mut self, members: &[Member], depth: usize) -> Result<(), CompileError> {
        let indent = INDENT_STEP.repeat(depth);
        let mut pending_globals: Vec<&GlobalVar> = Vec::new();
        let mut wrote_globals = false;

        for member in members {
            match member {
                Member::GlobalVar(v) => pending_globals.push(v),
                Member::Function(f) => {
                    self.flush_globals(&mut pending_globals, &indent, &mut wrote_globals);
                    self.emit_function(f, depth)?;
                }
                Member::TypeDecl(t) => {
                    self.flush_globals(&mut pending_globals, &indent, &mut wrote_globals);
                    self.emit_type_decl(t, depth);
                }
                Member::Nested(scope) => {
                    self.flush_globals(&mut pending_globals, &indent, &mut wrote_globals);
                    self.emit_nested_scope(scope, depth)?;
                }
                Member::Init(_) | Member::GlobalBlock(_) => {
                    return Err(self.bug("unlowered node reached the emitter"));
                }
            }
        }
        self.flush_globals(&mut pending_globals, &indent, &mut wrote_globals);

        // SPEC_FULL §8 S1: every library/scope carries a `globals …
        // endglobals` block, even when empty, so emit one if this
        // container declared no global variables at all.
        if !wrote_globals {
            writeln!(self.buf, "{indent}globals").unwrap();
            writeln!(self.buf, "{indent}endglobals").unwrap();
        }
        Ok(())
    }

    fn flush_globals(&mut self, pending: &mut Vec<&GlobalVar>, indent: &str, wrote: &mut bool) {
        if pending.is_empty() {
            return;
        }
        let rendered: Vec<String> = pending.iter().map(|v| self.render_global_var(v)).collect();
        writeln!(self.buf, "{indent}globals").unwrap();
        for line in rendered {
            writeln!(self.buf, "{indent}{INDENT_STEP}{line}").unwrap();
        }
        writeln!(self.buf, "{indent}endglobals").unwrap();
        pending.clear();
        *wrote = true;
    }

    fn emit_nested_scope(&mut self, scope: &Scope, depth: usize) -> Result<(), CompileError> {
        let indent = INDENT_STEP.repeat(depth);
        match scope.initializer {
            Some(init) => writeln!(self.buf, "{indent}scope {} initializer {}", self.name(scope.name), self.name(init)).unwrap(),
            None => writeln!(self.buf, "{indent}scope {}", self.name(scope.name)).unwrap(),
        }
        self.emit_members(&scope.members, depth + 1)?;
        writeln!(self.buf, "{indent}endscope").unwrap();
        Ok(())
    }

    fn render_global_var(&self, v: &GlobalVar) -> String {
        let vis = if v.visibility == Visibility::Private { "private " } else { "" };
        match v.init {
            Some(Expr::HashtableInit) => {
                format!("{vis}constant hashtable {} = InitHashtable()", self.name(v.name))
            }
            Some(Expr::ArrayInit) => {
                format!("{vis}{} array {}", self.name(v.ty), self.name(v.name))
            }
            _ => {
                let constant = if v.constness == Constness::Const { "constant " } else { "" };
                let array = if v.is_array { "array " } else { "" };
                let init_str = match &v.init {
                    Some(e) => format!(" = {}", self.render_expr(e)),
                    None => String::new(),
                };
                format!("{vis}{constant}{} {array}{}{init_str}", self.name(v.ty), self.name(v.name))
            }
        }
    }

    fn emit_type_decl(&mut self, t: &TypeDecl, depth: usize) {
        let indent = INDENT_STEP.repeat(depth);
        if let TypeDecl::Extends { name, .. } = t {
            writeln!(self.buf, "{indent}struct {} extends array", self.name(*name)).unwrap();
        }
        // TypeDecl::Alias resolves purely at reference sites; it has no
        // declaration of its own in the target. The declared base is not
        // carried into the target: every `type` lowers to a struct-extends-
        // array declaration regardless of the source base name.
    }

    fn emit_function(&mut self, f: &Function, depth: usize) -> Result<(), CompileError> {
        let indent = INDENT_STEP.repeat(depth);
        let vis = if f.visibility == Visibility::Private { "private " } else { "" };
        let params = if f.params.is_empty() {
            "nothing".to_string()
        } else {
            f.params
                .iter()
                .map(|p| format!("{} {}", self.name(p.ty), self.name(p.name)))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let ret = match f.return_ty {
            Some(ty) => self.name(ty).to_string(),
            None => "nothing".to_string(),
        };
        writeln!(self.buf, "{indent}{vis}function {} takes {params} returns {ret}", self.name(f.name)).unwrap();

        let body_indent = INDENT_STEP.repeat(depth + 1);
        for local in &f.locals {
            let array = if local.is_array { "array " } else { "" };
            writeln!(self.buf, "{body_indent}local {} {array}{}", self.name(local.ty), self.name(local.name)).unwrap();
        }
        self.emit_stmts(&f.body, depth + 1)?;
        writeln!(self.buf, "{indent}endfunction\n").unwrap();
        Ok(())
    }

    fn emit_stmts(&mut self, stmts: &[Stmt], depth: usize) -> Result<(), CompileError> {
        for stmt in stmts {
            self.emit_stmt(stmt, depth)?;
        }
        Ok(())
    }

    fn emit_stmt(&mut self, stmt: &Stmt, depth: usize) -> Result<(), CompileError> {
        let indent = INDENT_STEP.repeat(depth);
        match stmt {
            Stmt::Assign { target, value, .. } => {
                writeln!(self.buf, "{indent}set {} = {}", self.render_expr(target), self.render_expr(value)).unwrap();
            }
            Stmt::Call { callee, args, .. } => {
                writeln!(self.buf, "{indent}call {}({})", self.render_expr(callee), self.render_args(args)).unwrap();
            }
            Stmt::If { cond, then_body, else_body, .. } => {
                writeln!(self.buf, "{indent}if {} then", self.render_expr(cond)).unwrap();
                self.emit_stmts(then_body, depth + 1)?;
                if let Some(else_body) = else_body {
                    writeln!(self.buf, "{indent}else").unwrap();
                    self.emit_stmts(else_body, depth + 1)?;
                }
                writeln!(self.buf, "{indent}endif").unwrap();
            }
            Stmt::Until { cond, body, .. } => {
                writeln!(self.buf, "{indent}loop").unwrap();
                writeln!(self.buf, "{indent}{INDENT_STEP}exitwhen {}", self.render_expr(cond)).unwrap();
                self.emit_stmts(body, depth + 1)?;
                writeln!(self.buf, "{indent}endloop").unwrap();
            }
            Stmt::Return { value, .. } => match value {
                Some(e) => writeln!(self.buf, "{indent}return {}", self.render_expr(e)).unwrap(),
                None => writeln!(self.buf, "{indent}return").unwrap(),
            },
            Stmt::PostIncDec { target, op, .. } => {
                let rendered = self.render_expr(target);
                let delta = match op {
                    IncDecOp::Inc => "+ 1",
                    IncDecOp::Dec => "- 1",
                };
                writeln!(self.buf, "{indent}set {rendered} = {rendered} {delta}").unwrap();
            }
            Stmt::LocalDecl { .. } => return Err(self.bug("unhoisted local declaration reached the emitter")),
        }
        Ok(())
    }

    fn render_args(&self, args: &[Expr]) -> String {
        args.iter().map(|a| self.render_expr(a)).collect::<Vec<_>>().join(", ")
    }

    fn render_expr(&self, e: &Expr) -> String {
        match e {
            Expr::IntLit(v) => v.to_string(),
            Expr::RealLit(v) => {
                if v.fract() == 0.0 {
                    format!("{v:.1}")
                } else {
                    v.to_string()
                }
            }
            Expr::StringLit(sym) => format!("\"{}\"", escape_string(self.name(*sym))),
            Expr::BoolLit(b) => if *b { "true" } else { "false" }.to_string(),
            Expr::NullLit => "null".to_string(),
            Expr::Ref(sym) => self.name(*sym).to_string(),
            Expr::Index(base, idx) => format!("{}[{}]", self.render_expr(base), self.render_expr(idx)),
            Expr::Member(base, name) => format!("{}.{}", self.render_expr(base), self.name(*name)),
            Expr::Call(callee, args) => format!("{}({})", self.render_expr(callee), self.render_args(args)),
            Expr::Binary(op, l, r) => format!("{} {} {}", self.render_expr(l), bin_op_str(*op), self.render_expr(r)),
            Expr::Unary(UnOp::Neg, e) => format!("-{}", self.render_expr(e)),
            Expr::Unary(UnOp::Not, e) => format!("not {}", self.render_expr(e)),
            Expr::FunctionRef(sym) => format!("function {}", self.name(*sym)),
            Expr::ArrayInit => String::new(),
            Expr::HashtableInit => "InitHashtable()".to_string(),
        }
    }
}

/// Re-escapes a decoded string literal's text for re-emission inside target
/// double quotes. The lexer stores the *decoded* value in the symbol table
/// (`lexer.rs::lex_string`), so emission must undo that before quoting or a
/// literal containing `"`, `\`, or a newline produces broken target text.
fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

fn bin_op_str(op: BinOp) -> &'static str {
    match op {
        BinOp::Or => "or",
        BinOp::And => "and",
        BinOp::Eq => "==",
        BinOp::NotEq => "!=",
        BinOp::Lt => "<",
        BinOp::Gt => ">",
        BinOp::LtEq => "<=",
        BinOp::GtEq => ">=",
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;
    use crate::lexer::Lexer;
    use crate::lowering::lower;
    use crate::parser::Parser;
    use std::path::PathBuf;

    fn compile(source: &str) -> String {
        let mut interner = Interner::new();
        let unit = PathBuf::from("t.jp");
        let lexer = Lexer::new(unit.clone(), source, &mut interner, 4);
        let tokens = lexer.tokenize().unwrap();
        let mut program = Parser::new(unit.clone(), &tokens).parse_program().unwrap();
        lower(&mut program, &unit, &mut interner).unwrap();
        emit_program(&program, &interner, &unit).unwrap()
    }

    #[test]
    fn library_with_no_global_vars_still_emits_an_empty_globals_block() {
        let out = compile("library Foo:\n    bar():\n        return\n");
        assert!(out.contains("    globals\n    endglobals\n"), "§8 S1 expects an empty globals/endglobals pair");
    }

    #[test]
    fn emits_globals_and_function_skeleton() {
        let out = compile("library Foo:\n    int x = 1\n    bar():\n        return\n");
        assert!(out.contains("library Foo"));
        assert!(out.contains("globals"));
        assert!(out.contains("int x = 1"));
        assert!(out.contains("function bar takes nothing returns nothing"));
        assert!(out.contains("endfunction"));
        assert!(out.contains("endlibrary"));
    }

    #[test]
    fn until_loop_emits_exitwhen_before_body() {
        let out = compile("library Foo:\n    init:\n        int i = 1\n        until i > 10:\n            i++\n");
        let loop_pos = out.find("loop").unwrap();
        let exitwhen_pos = out.find("exitwhen").unwrap();
        let set_pos = out.rfind("set i = i + 1").unwrap();
        assert!(loop_pos < exitwhen_pos);
        assert!(exitwhen_pos < set_pos);
    }

    #[test]
    fn bare_call_gets_call_prefix_and_assignment_gets_set_prefix() {
        let out = compile("library Foo:\n    bar():\n        x = 1\n        Baz(x)\n");
        assert!(out.contains("set x = 1"));
        assert!(out.contains("call Baz(x)"));
    }

    #[test]
    fn hashtable_initializer_uses_inithashtable_idiom() {
        let out = compile("library Foo:\n    hashtable HT = {}\n");
        assert!(out.contains("constant hashtable HT = InitHashtable()"));
    }

    #[test]
    fn global_block_functions_emit_without_private() {
        let out = compile("library Foo:\n    global:\n        bar():\n            return\n    baz():\n        return\n");
        assert!(out.contains("function bar takes nothing returns nothing"));
        assert!(!out.contains("private function bar"));
        assert!(out.contains("private function baz"));
    }

    #[test]
    fn string_literal_with_embedded_quote_and_newline_reescapes_on_emit() {
        let out = compile("library Foo:\n    bar():\n        Baz(\"say \\\"hi\\\"\\nbye\")\n");
        assert!(out.contains(r#"call Baz("say \"hi\"\nbye")"#));
        assert!(!out.contains("\nbye"), "decoded newline must not appear as a literal line break in the output");
    }

    #[test]
    fn type_extends_declares_struct_extends_array_regardless_of_base() {
        let out = compile("library Foo:\n    type Unit extends handle\n    type Widget extends Unit\n");
        assert!(out.contains("struct Unit extends array"));
        assert!(out.contains("struct Widget extends array"));
    }
}
