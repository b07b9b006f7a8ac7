use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::Path;

use crate::ast::*;
use crate::error::{CompileError, Location};
use crate::intern::{Interner, Symbol};
use crate::token::Span;

/// Names recognized as engine-discovered callbacks regardless of
/// `global:` placement (SPEC_FULL §4.4, the `TickCreate` aside in the
/// the lowering design notes).
const ENGINE_CALLBACKS: &[&str] = &["TickCreate", "TickDestroy", "config", "main"];

/// Runs the four lowering sub-passes over one unit's program tree, in
/// order: anonymous naming, alias resolution, local hoisting, visibility
/// and keyword normalization (§4.4).
pub fn lower(program: &mut Program, unit: &Path, interner: &mut Interner) -> Result<(), CompileError> {
    let mut namer = Namer::new(unit, interner);
    for item in &mut program.items {
        namer.visit_top_level(item);
    }

    let alias_map = collect_aliases(program);
    for item in &mut program.items {
        resolve_aliases_top_level(item, &alias_map, unit, interner)?;
    }

    for item in &mut program.items {
        hoist_top_level(item);
    }

    for item in &mut program.items {
        assign_visibility_top_level(item, interner);
    }

    for item in &mut program.items {
        check_duplicates_top_level(item, unit, interner)?;
    }

    Ok(())
}

// -- sub-pass 1: anonymous naming + init synthesis -----------------------

struct Namer<'a> {
    unit: &'a Path,
    interner: &'a mut Interner,
    anon_ordinal: u64,
}

impl<'a> Namer<'a> {
    fn new(unit: &'a Path, interner: &'a mut Interner) -> Self {
        Namer { unit, interner, anon_ordinal: 0 }
    }

    fn visit_top_level(&mut self, item: &mut TopLevel) {
        match item {
            TopLevel::Library(lib) => self.visit_container(&mut lib.initializer, &mut lib.members, lib.name),
            TopLevel::Scope(scope) => self.visit_scope(scope),
            TopLevel::Import(_) => {}
        }
    }

    fn visit_scope(&mut self, scope: &mut Scope) {
        if scope.is_anonymous {
            let tag = stable_tag(self.unit, &["content"], self.anon_ordinal);
            self.anon_ordinal += 1;
            scope.name = self.interner.intern(&format!("VJPS{tag}"));
        }
        self.visit_container(&mut scope.initializer, &mut scope.members, scope.name);
    }

    /// Lowers every `Init` member of a library/scope into a named
    /// `VJPI<hex>` function, and synthesizes `onInit` when any exist.
    fn visit_container(&mut self, initializer: &mut Option<Symbol>, members: &mut Vec<Member>, container_name: Symbol) {
        // Recurse into nested scopes first so their own init blocks are
        // lowered independently of this container's ordinal counter.
        for member in members.iter_mut() {
            if let Member::Nested(scope) = member {
                self.visit_scope(scope);
            }
            if let Member::GlobalBlock(inner) = member {
                for m in inner.iter_mut() {
                    if let Member::Nested(scope) = m {
                        self.visit_scope(scope);
                    }
                }
            }
        }

        let container_name_str = self.interner.resolve(container_name).to_string();
        let mut init_ordinal: u64 = 0;
        let mut init_fn_names = Vec::new();
        let mut rewritten = Vec::with_capacity(members.len());

        for member in members.drain(..) {
            if let Member::Init(init) = member {
                let tag = stable_tag(self.unit, &[&container_name_str, "init"], init_ordinal);
                init_ordinal += 1;
                let fn_name = self.interner.intern(&format!("VJPI{tag}"));
                init_fn_names.push(fn_name);
                rewritten.push(Member::Function(Function {
                    name: fn_name,
                    visibility: Visibility::Private,
                    params: Vec::new(),
                    return_ty: None,
                    body: init.body,
                    locals: Vec::new(),
                    span: init.span,
                }));
            } else {
                rewritten.push(member);
            }
        }

        if !init_fn_names.is_empty() {
            let on_init_name = self.interner.intern("onInit");
            let body = init_fn_names
                .into_iter()
                .map(|name| Stmt::Call {
                    callee: Expr::Ref(name),
                    args: Vec::new(),
                    span: Span::default(),
                })
                .collect();
            rewritten.push(Member::Function(Function {
                name: on_init_name,
                visibility: Visibility::Private,
                params: Vec::new(),
                return_ty: None,
                body,
                locals: Vec::new(),
                span: Span::default(),
            }));
            *initializer = Some(on_init_name);
        }

        *members = rewritten;
    }
}

fn stable_tag(unit: &Path, seed_parts: &[&str], ordinal: u64) -> String {
    let mut hasher = DefaultHasher::new();
    unit.to_string_lossy().as_ref().hash(&mut hasher);
    for part in seed_parts {
        part.hash(&mut hasher);
    }
    ordinal.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

// -- sub-pass 2: alias resolution -----------------------------------------

fn collect_aliases(program: &Program) -> HashMap<Symbol, Symbol> {
    let mut map = HashMap::new();
    for item in &program.items {
        match item {
            TopLevel::Library(lib) => collect_aliases_members(&lib.members, &mut map),
            TopLevel::Scope(scope) => collect_aliases_members(&scope.members, &mut map),
            TopLevel::Import(_) => {}
        }
    }
    map
}

fn collect_aliases_members(members: &[Member], map: &mut HashMap<Symbol, Symbol>) {
    for member in members {
        match member {
            Member::TypeDecl(TypeDecl::Alias { name, base }) => {
                map.insert(*name, *base);
            }
            Member::GlobalBlock(inner) => collect_aliases_members(inner, map),
            Member::Nested(scope) => collect_aliases_members(&scope.members, map),
            _ => {}
        }
    }
}

/// Follows the alias chain to its base type, detecting cycles. At most one
/// level of indirection is expected in practice (§4.4), but chains are
/// followed until they stabilize or a cycle is found.
fn resolve_alias(name: Symbol, map: &HashMap<Symbol, Symbol>) -> Result<Symbol, ()> {
    let mut current = name;
    let mut seen = std::collections::HashSet::new();
    seen.insert(current);
    while let Some(&base) = map.get(&current) {
        if !seen.insert(base) {
            return Err(());
        }
        current = base;
    }
    Ok(current)
}

fn resolve_ty(
    ty: Symbol,
    map: &HashMap<Symbol, Symbol>,
    unit: &Path,
    span: Span,
    interner: &Interner,
) -> Result<Symbol, CompileError> {
    resolve_alias(ty, map).map_err(|_| CompileError::Semantic {
        loc: Location::new(unit.to_path_buf(), span),
        detail: format!("alias cycle involving '{}'", interner.resolve(ty)),
    })
}

fn resolve_aliases_top_level(
    item: &mut TopLevel,
    map: &HashMap<Symbol, Symbol>,
    unit: &Path,
    interner: &Interner,
) -> Result<(), CompileError> {
    match item {
        TopLevel::Library(lib) => resolve_aliases_members(&mut lib.members, map, unit, interner),
        TopLevel::Scope(scope) => resolve_aliases_members(&mut scope.members, map, unit, interner),
        TopLevel::Import(_) => Ok(()),
    }
}

fn resolve_aliases_members(
    members: &mut [Member],
    map: &HashMap<Symbol, Symbol>,
    unit: &Path,
    interner: &Interner,
) -> Result<(), CompileError> {
    for member in members {
        match member {
            Member::GlobalVar(v) => {
                v.ty = resolve_ty(v.ty, map, unit, v.span, interner)?;
            }
            Member::Function(f) => {
                for p in &mut f.params {
                    p.ty = resolve_ty(p.ty, map, unit, f.span, interner)?;
                }
                if let Some(rt) = f.return_ty {
                    f.return_ty = Some(resolve_ty(rt, map, unit, f.span, interner)?);
                }
                resolve_aliases_stmts(&mut f.body, map, unit, interner)?;
            }
            Member::GlobalBlock(inner) => resolve_aliases_members(inner, map, unit, interner)?,
            Member::Nested(scope) => resolve_aliases_members(&mut scope.members, map, unit, interner)?,
            Member::Init(_) | Member::TypeDecl(_) => {}
        }
    }
    Ok(())
}

fn resolve_aliases_stmts(
    stmts: &mut [Stmt],
    map: &HashMap<Symbol, Symbol>,
    unit: &Path,
    interner: &Interner,
) -> Result<(), CompileError> {
    for stmt in stmts {
        match stmt {
            Stmt::LocalDecl { decl, .. } => {
                decl.ty = resolve_ty(decl.ty, map, unit, decl.span, interner)?;
            }
            Stmt::If { then_body, else_body, .. } => {
                resolve_aliases_stmts(then_body, map, unit, interner)?;
                if let Some(body) = else_body {
                    resolve_aliases_stmts(body, map, unit, interner)?;
                }
            }
            Stmt::Until { body, .. } => resolve_aliases_stmts(body, map, unit, interner)?,
            _ => {}
        }
    }
    Ok(())
}

// -- sub-pass 3: local hoisting --------------------------------------------

fn hoist_top_level(item: &mut TopLevel) {
    match item {
        TopLevel::Library(lib) => hoist_members(&mut lib.members),
        TopLevel::Scope(scope) => hoist_members(&mut scope.members),
        TopLevel::Import(_) => {}
    }
}

fn hoist_members(members: &mut [Member]) {
    for member in members {
        match member {
            Member::Function(f) => {
                let mut locals = Vec::new();
                let body = hoist_stmts(std::mem::take(&mut f.body), &mut locals);
                f.locals = locals;
                f.body = body;
            }
            Member::GlobalBlock(inner) => hoist_members(inner),
            Member::Nested(scope) => hoist_members(&mut scope.members),
            Member::GlobalVar(_) | Member::Init(_) | Member::TypeDecl(_) => {}
        }
    }
}

/// Walks a statement list, pulling every `LocalDecl` out into `locals` and
/// replacing it in place with an `Assign` (if it had an initializer) or
/// nothing at all.
fn hoist_stmts(stmts: Vec<Stmt>, locals: &mut Vec<LocalDecl>) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        match stmt {
            Stmt::LocalDecl { decl, init } => {
                let span = decl.span;
                let name = decl.name;
                locals.push(decl);
                if let Some(value) = init {
                    out.push(Stmt::Assign { target: Expr::Ref(name), value, span });
                }
            }
            Stmt::If { cond, then_body, else_body, span } => {
                let then_body = hoist_stmts(then_body, locals);
                let else_body = else_body.map(|b| hoist_stmts(b, locals));
                out.push(Stmt::If { cond, then_body, else_body, span });
            }
            Stmt::Until { cond, body, span } => {
                let body = hoist_stmts(body, locals);
                out.push(Stmt::Until { cond, body, span });
            }
            other => out.push(other),
        }
    }
    out
}

// -- sub-pass 4: visibility and keyword normalization ----------------------

fn is_engine_callback(name: Symbol, interner: &Interner) -> bool {
    ENGINE_CALLBACKS.contains(&interner.resolve(name))
}

fn assign_visibility_top_level(item: &mut TopLevel, interner: &Interner) {
    match item {
        TopLevel::Library(lib) => assign_visibility_members(&mut lib.members, interner),
        TopLevel::Scope(scope) => assign_visibility_members(&mut scope.members, interner),
        TopLevel::Import(_) => {}
    }
}

/// Flattens `global:` wrappers, marking everything inside public, and
/// marks everything else `private` unless it matches the engine-callback
/// allowlist.
fn assign_visibility_members(members: &mut Vec<Member>, interner: &Interner) {
    let mut out = Vec::with_capacity(members.len());
    for member in members.drain(..) {
        match member {
            Member::GlobalBlock(mut inner) => {
                mark_public(&mut inner);
                out.extend(inner);
            }
            Member::GlobalVar(mut v) => {
                v.visibility = Visibility::Private;
                out.push(Member::GlobalVar(v));
            }
            Member::Function(mut f) => {
                f.visibility = if is_engine_callback(f.name, interner) {
                    Visibility::Public
                } else {
                    Visibility::Private
                };
                out.push(Member::Function(f));
            }
            Member::Nested(mut scope) => {
                assign_visibility_members(&mut scope.members, interner);
                out.push(Member::Nested(scope));
            }
            other => out.push(other),
        }
    }
    *members = out;
}

fn mark_public(members: &mut Vec<Member>) {
    let mut out = Vec::with_capacity(members.len());
    for member in members.drain(..) {
        match member {
            Member::GlobalBlock(inner) => {
                let mut inner = inner;
                mark_public(&mut inner);
                out.extend(inner);
            }
            Member::GlobalVar(mut v) => {
                v.visibility = Visibility::Public;
                out.push(Member::GlobalVar(v));
            }
            Member::Function(mut f) => {
                f.visibility = Visibility::Public;
                out.push(Member::Function(f));
            }
            other => out.push(other),
        }
    }
    *members = out;
}

// -- duplicate-declaration check -------------------------------------------

fn check_duplicates_top_level(item: &mut TopLevel, unit: &Path, interner: &Interner) -> Result<(), CompileError> {
    match item {
        TopLevel::Library(lib) => check_duplicates_members(&lib.members, unit, interner),
        TopLevel::Scope(scope) => check_duplicates_members(&scope.members, unit, interner),
        TopLevel::Import(_) => Ok(()),
    }
}

fn check_duplicates_members(members: &[Member], unit: &Path, interner: &Interner) -> Result<(), CompileError> {
    let mut seen: HashMap<(Symbol, Visibility), Span> = HashMap::new();
    for member in members {
        let (name, visibility, span) = match member {
            Member::GlobalVar(v) => (v.name, v.visibility, v.span),
            Member::Function(f) => {
                check_duplicate_locals(f, unit, interner)?;
                (f.name, f.visibility, f.span)
            }
            Member::Nested(scope) => {
                check_duplicates_members(&scope.members, unit, interner)?;
                continue;
            }
            _ => continue,
        };
        if seen.insert((name, visibility), span).is_some() {
            return Err(CompileError::Semantic {
                loc: Location::new(unit.to_path_buf(), span),
                detail: format!("duplicate declaration of '{}'", interner.resolve(name)),
            });
        }
    }
    Ok(())
}

/// The target has no block scoping, so two hoisted locals sharing a name
/// within one function body (however nested their original declarations
/// were) collide in the same prologue (§9 "scope shadowing ... disallowed").
fn check_duplicate_locals(f: &Function, unit: &Path, interner: &Interner) -> Result<(), CompileError> {
    let mut seen: HashMap<Symbol, Span> = HashMap::new();
    for local in &f.locals {
        if seen.insert(local.name, local.span).is_some() {
            return Err(CompileError::Semantic {
                loc: Location::new(unit.to_path_buf(), local.span),
                detail: format!(
                    "duplicate local '{}' in function '{}' (the target has no block scoping to shadow with)",
                    interner.resolve(local.name),
                    interner.resolve(f.name)
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use std::path::PathBuf;

    fn lower_source(source: &str) -> (Program, Interner) {
        let mut interner = Interner::new();
        let unit = PathBuf::from("t.jp");
        let lexer = Lexer::new(unit.clone(), source, &mut interner, 4);
        let tokens = lexer.tokenize().unwrap();
        let mut program = Parser::new(unit.clone(), &tokens).parse_program().unwrap();
        lower(&mut program, &unit, &mut interner).unwrap();
        (program, interner)
    }

    #[test]
    fn init_block_becomes_named_function_and_onInit() {
        let (program, interner) = lower_source("library Foo:\n    init:\n        int i = 1\n");
        match &program.items[0] {
            TopLevel::Library(lib) => {
                assert!(lib.initializer.is_some());
                assert_eq!(interner.resolve(lib.initializer.unwrap()), "onInit");
                let names: Vec<_> = lib
                    .members
                    .iter()
                    .filter_map(|m| match m {
                        Member::Function(f) => Some(interner.resolve(f.name).to_string()),
                        _ => None,
                    })
                    .collect();
                assert!(names.iter().any(|n| n.starts_with("VJPI")));
                assert!(names.contains(&"onInit".to_string()));
            }
            _ => panic!("expected library"),
        }
    }

    #[test]
    fn anonymous_content_gets_stable_vjps_name() {
        let (program, interner) = lower_source("content:\n    int x = 1\n");
        match &program.items[0] {
            TopLevel::Scope(scope) => {
                let name = interner.resolve(scope.name);
                assert!(name.starts_with("VJPS"));
            }
            _ => panic!("expected scope"),
        }
    }

    #[test]
    fn names_are_deterministic_across_runs() {
        let (p1, i1) = lower_source("content:\n    int x = 1\n");
        let (p2, i2) = lower_source("content:\n    int x = 1\n");
        let n1 = match &p1.items[0] {
            TopLevel::Scope(s) => i1.resolve(s.name).to_string(),
            _ => unreachable!(),
        };
        let n2 = match &p2.items[0] {
            TopLevel::Scope(s) => i2.resolve(s.name).to_string(),
            _ => unreachable!(),
        };
        assert_eq!(n1, n2);
    }

    #[test]
    fn locals_are_hoisted_to_prologue_in_order() {
        let (program, _interner) = lower_source(
            "library Foo:\n    bar():\n        integer a = 1\n        a = a + 1\n        integer b = 2\n",
        );
        match &program.items[0] {
            TopLevel::Library(lib) => match &lib.members[0] {
                Member::Function(f) => {
                    assert_eq!(f.locals.len(), 2);
                    assert_eq!(f.body.len(), 3);
                }
                _ => panic!("expected function"),
            },
            _ => panic!("expected library"),
        }
    }

    #[test]
    fn global_block_members_are_public_others_private() {
        let (program, interner) = lower_source(
            "library Foo:\n    global:\n        bar():\n            return\n    baz():\n        return\n",
        );
        match &program.items[0] {
            TopLevel::Library(lib) => {
                let vis = |name: &str| -> Visibility {
                    lib.members
                        .iter()
                        .find_map(|m| match m {
                            Member::Function(f) if interner.resolve(f.name) == name => Some(f.visibility),
                            _ => None,
                        })
                        .unwrap()
                };
                assert_eq!(vis("bar"), Visibility::Public);
                assert_eq!(vis("baz"), Visibility::Private);
            }
            _ => panic!("expected library"),
        }
    }

    #[test]
    fn aliases_resolve_one_level() {
        let (program, interner) = lower_source(
            "library Foo:\n    alias N extends integer\n    N x = 1\n",
        );
        match &program.items[0] {
            TopLevel::Library(lib) => {
                let v = lib
                    .members
                    .iter()
                    .find_map(|m| match m {
                        Member::GlobalVar(v) => Some(v),
                        _ => None,
                    })
                    .unwrap();
                assert_eq!(interner.resolve(v.ty), "integer");
            }
            _ => panic!("expected library"),
        }
    }

    #[test]
    fn duplicate_declarations_at_same_visibility_are_a_semantic_error() {
        let mut interner = Interner::new();
        let unit = PathBuf::from("t.jp");
        let source = "library Foo:\n    bar():\n        return\n    bar():\n        return\n";
        let lexer = Lexer::new(unit.clone(), source, &mut interner, 4);
        let tokens = lexer.tokenize().unwrap();
        let mut program = Parser::new(unit.clone(), &tokens).parse_program().unwrap();
        let result = lower(&mut program, &unit, &mut interner);
        assert!(matches!(result, Err(CompileError::Semantic { .. })));
    }

    #[test]
    fn duplicate_locals_across_branches_of_one_function_are_a_semantic_error() {
        let mut interner = Interner::new();
        let unit = PathBuf::from("t.jp");
        let source =
            "library Foo:\n    bar():\n        integer a = 1\n        if a > 0:\n            integer b = 2\n        integer b = 3\n";
        let lexer = Lexer::new(unit.clone(), source, &mut interner, 4);
        let tokens = lexer.tokenize().unwrap();
        let mut program = Parser::new(unit.clone(), &tokens).parse_program().unwrap();
        let result = lower(&mut program, &unit, &mut interner);
        assert!(matches!(result, Err(CompileError::Semantic { .. })));
    }
}
