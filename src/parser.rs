use std::path::PathBuf;

use crate::ast::*;
use crate::error::{CompileError, Location};
use crate::intern::Symbol;
use crate::token::{Keyword, Span, Symb, Token, TokenKind};

/// Recursive-descent parser (§4.3). Block structure is driven by
/// `INDENT`/`DEDENT`; expression grammar is precedence climbing.
pub struct Parser<'a> {
    unit: PathBuf,
    tokens: &'a [Token],
    pos: usize,
}

type ParseResult<T> = Result<T, CompileError>;

impl<'a> Parser<'a> {
    pub fn new(unit: PathBuf, tokens: &'a [Token]) -> Self {
        Parser { unit, tokens, pos: 0 }
    }

    pub fn parse_program(mut self) -> ParseResult<Program> {
        let mut items = Vec::new();
        while !self.at_eof() {
            items.push(self.parse_top_level()?);
        }
        Ok(Program { items })
    }

    // -- token plumbing -----------------------------------------------

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn at_eof(&self) -> bool {
        self.current().is_eof()
    }

    fn peek_kind(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn loc(&self, span: Span) -> Location {
        Location::new(self.unit.clone(), span)
    }

    fn syntax_err(&self, detail: impl Into<String>) -> CompileError {
        CompileError::Syntax { loc: self.loc(self.current().span), detail: detail.into() }
    }

    fn check_symbol(&self, s: Symb) -> bool {
        matches!(self.current().kind, TokenKind::Symbol(sym) if sym == s)
    }

    fn check_keyword(&self, k: Keyword) -> bool {
        matches!(self.current().kind, TokenKind::Keyword(kw) if kw == k)
    }

    fn eat_symbol(&mut self, s: Symb) -> ParseResult<Span> {
        if self.check_symbol(s) {
            Ok(self.advance().span)
        } else {
            Err(self.syntax_err(format!("expected '{s:?}'")))
        }
    }

    fn eat_keyword(&mut self, k: Keyword) -> ParseResult<Span> {
        if self.check_keyword(k) {
            Ok(self.advance().span)
        } else {
            Err(self.syntax_err(format!("expected keyword '{k:?}'")))
        }
    }

    fn eat_ident(&mut self) -> ParseResult<(Symbol, Span)> {
        match self.current().kind {
            TokenKind::Ident(sym) => {
                let span = self.current().span;
                self.advance();
                Ok((sym, span))
            }
            _ => Err(self.syntax_err("expected identifier")),
        }
    }

    fn eat_newline(&mut self) -> ParseResult<()> {
        if matches!(self.current().kind, TokenKind::Newline) {
            self.advance();
            Ok(())
        } else {
            Err(self.syntax_err("expected end of line"))
        }
    }

    fn eat_indent(&mut self) -> ParseResult<()> {
        if matches!(self.current().kind, TokenKind::Indent) {
            self.advance();
            Ok(())
        } else {
            Err(self.syntax_err("expected an indented block"))
        }
    }

    fn eat_dedent(&mut self) -> ParseResult<()> {
        if matches!(self.current().kind, TokenKind::Dedent) {
            self.advance();
            Ok(())
        } else {
            Err(self.syntax_err("expected end of indented block"))
        }
    }

    fn at_block_end(&self) -> bool {
        matches!(self.current().kind, TokenKind::Dedent) || self.at_eof()
    }

    // -- top level ------------------------------------------------------

    fn parse_top_level(&mut self) -> ParseResult<TopLevel> {
        match self.current().kind {
            TokenKind::Keyword(Keyword::Library) => Ok(TopLevel::Library(self.parse_library()?)),
            TokenKind::Keyword(Keyword::Scope) => Ok(TopLevel::Scope(self.parse_scope(false)?)),
            TokenKind::Keyword(Keyword::Content) => Ok(TopLevel::Scope(self.parse_scope(true)?)),
            TokenKind::Keyword(Keyword::Import) => self.parse_import(),
            _ => Err(self.syntax_err("expected 'library', 'scope', 'content', or 'import'")),
        }
    }

    fn parse_import(&mut self) -> ParseResult<TopLevel> {
        self.eat_keyword(Keyword::Import)?;
        let sym = match self.current().kind {
            TokenKind::StringLit(sym) => {
                self.advance();
                sym
            }
            _ => return Err(self.syntax_err("expected a string literal after 'import'")),
        };
        self.eat_newline()?;
        Ok(TopLevel::Import(sym))
    }

    fn parse_library(&mut self) -> ParseResult<Library> {
        let start = self.eat_keyword(Keyword::Library)?;
        let (name, _) = self.eat_ident()?;
        self.eat_symbol(Symb::Colon)?;
        self.eat_newline()?;
        self.eat_indent()?;
        let members = self.parse_members()?;
        self.eat_dedent()?;
        Ok(Library { name, initializer: None, members, span: start })
    }

    fn parse_scope(&mut self, anonymous: bool) -> ParseResult<Scope> {
        let start = if anonymous {
            self.eat_keyword(Keyword::Content)?
        } else {
            self.eat_keyword(Keyword::Scope)?
        };
        let name = if anonymous {
            Symbol::EMPTY
        } else {
            self.eat_ident()?.0
        };
        self.eat_symbol(Symb::Colon)?;
        self.eat_newline()?;
        self.eat_indent()?;
        let members = self.parse_members()?;
        self.eat_dedent()?;
        Ok(Scope { name, is_anonymous: anonymous, initializer: None, members, span: start })
    }

    fn parse_members(&mut self) -> ParseResult<Vec<Member>> {
        let mut members = Vec::new();
        while !self.at_block_end() {
            members.push(self.parse_member()?);
        }
        Ok(members)
    }

    fn parse_member(&mut self) -> ParseResult<Member> {
        match self.current().kind {
            TokenKind::Keyword(Keyword::Global) => {
                self.advance();
                self.eat_symbol(Symb::Colon)?;
                self.eat_newline()?;
                self.eat_indent()?;
                let inner = self.parse_members()?;
                self.eat_dedent()?;
                Ok(Member::GlobalBlock(inner))
            }
            TokenKind::Keyword(Keyword::Init) => Ok(Member::Init(self.parse_init()?)),
            TokenKind::Keyword(Keyword::Type) => Ok(Member::TypeDecl(self.parse_type_extends()?)),
            TokenKind::Keyword(Keyword::Alias) => Ok(Member::TypeDecl(self.parse_alias()?)),
            TokenKind::Keyword(Keyword::Scope) => Ok(Member::Nested(self.parse_scope(false)?)),
            TokenKind::Keyword(Keyword::Content) => Ok(Member::Nested(self.parse_scope(true)?)),
            TokenKind::Ident(_) => {
                if matches!(self.peek_kind(1), TokenKind::Symbol(Symb::LParen)) {
                    Ok(Member::Function(self.parse_function()?))
                } else {
                    Ok(Member::GlobalVar(self.parse_global_var()?))
                }
            }
            _ => Err(self.syntax_err("expected a member declaration")),
        }
    }

    fn parse_init(&mut self) -> ParseResult<Init> {
        let start = self.eat_keyword(Keyword::Init)?;
        self.eat_symbol(Symb::Colon)?;
        self.eat_newline()?;
        self.eat_indent()?;
        let body = self.parse_stmts()?;
        self.eat_dedent()?;
        Ok(Init { body, span: start })
    }

    fn parse_type_extends(&mut self) -> ParseResult<TypeDecl> {
        self.eat_keyword(Keyword::Type)?;
        let (name, _) = self.eat_ident()?;
        self.eat_keyword(Keyword::Extends)?;
        let (base, _) = self.eat_ident()?;
        self.eat_newline()?;
        Ok(TypeDecl::Extends { name, base })
    }

    fn parse_alias(&mut self) -> ParseResult<TypeDecl> {
        self.eat_keyword(Keyword::Alias)?;
        let (name, _) = self.eat_ident()?;
        self.eat_keyword(Keyword::Extends)?;
        let (base, _) = self.eat_ident()?;
        self.eat_newline()?;
        Ok(TypeDecl::Alias { name, base })
    }

    fn parse_global_var(&mut self) -> ParseResult<GlobalVar> {
        let (ty, span) = self.eat_ident()?;
        let is_array = if self.check_symbol(Symb::Star) {
            self.advance();
            true
        } else {
            false
        };
        let (name, _) = self.eat_ident()?;
        let (constness, init) = if self.check_symbol(Symb::Assign) {
            self.advance();
            (Constness::Mutable, Some(self.parse_expr()?))
        } else if self.check_symbol(Symb::Tilde) {
            self.advance();
            (Constness::Const, Some(self.parse_expr()?))
        } else {
            (Constness::Mutable, None)
        };
        self.eat_newline()?;
        Ok(GlobalVar { name, ty, is_array, visibility: Visibility::Private, constness, init, span })
    }

    fn parse_function(&mut self) -> ParseResult<Function> {
        let (name, span) = self.eat_ident()?;
        self.eat_symbol(Symb::LParen)?;
        let params = self.parse_params()?;
        self.eat_symbol(Symb::RParen)?;
        let return_ty = if self.check_symbol(Symb::Arrow) {
            self.advance();
            Some(self.eat_ident()?.0)
        } else {
            None
        };
        self.eat_symbol(Symb::Colon)?;
        self.eat_newline()?;
        self.eat_indent()?;
        let body = self.parse_stmts()?;
        self.eat_dedent()?;
        Ok(Function {
            name,
            visibility: Visibility::Private,
            params,
            return_ty,
            body,
            locals: Vec::new(),
            span,
        })
    }

    fn parse_params(&mut self) -> ParseResult<Vec<Param>> {
        let mut params = Vec::new();
        if self.check_symbol(Symb::RParen) {
            return Ok(params);
        }
        loop {
            let (ty, _) = self.eat_ident()?;
            let (name, _) = self.eat_ident()?;
            params.push(Param { name, ty });
            if self.check_symbol(Symb::Comma) {
                self.advance();
                continue;
            }
            break;
        }
        Ok(params)
    }

    // -- statements -------------------------------------------------------

    fn parse_stmts(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !self.at_block_end() {
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> ParseResult<Stmt> {
        match self.current().kind {
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::Until) => self.parse_until(),
            TokenKind::Keyword(Keyword::Return) => self.parse_return(),
            TokenKind::Ident(_)
                if matches!(self.peek_kind(1), TokenKind::Ident(_))
                    || matches!(self.peek_kind(1), TokenKind::Symbol(Symb::Star)) =>
            {
                self.parse_local_decl()
            }
            _ => self.parse_expr_stmt(),
        }
    }

    fn parse_local_decl(&mut self) -> ParseResult<Stmt> {
        let (ty, span) = self.eat_ident()?;
        let is_array = if self.check_symbol(Symb::Star) {
            self.advance();
            true
        } else {
            false
        };
        let (name, _) = self.eat_ident()?;
        let init = if self.check_symbol(Symb::Assign) {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.eat_newline()?;
        Ok(Stmt::LocalDecl { decl: LocalDecl { name, ty, is_array, span }, init })
    }

    fn parse_if(&mut self) -> ParseResult<Stmt> {
        let start = self.eat_keyword(Keyword::If)?;
        let cond = self.parse_expr()?;
        self.eat_symbol(Symb::Colon)?;
        self.eat_newline()?;
        self.eat_indent()?;
        let then_body = self.parse_stmts()?;
        self.eat_dedent()?;
        let else_body = if self.check_keyword(Keyword::Else) {
            self.advance();
            self.eat_symbol(Symb::Colon)?;
            self.eat_newline()?;
            self.eat_indent()?;
            let body = self.parse_stmts()?;
            self.eat_dedent()?;
            Some(body)
        } else {
            None
        };
        Ok(Stmt::If { cond, then_body, else_body, span: start })
    }

    fn parse_until(&mut self) -> ParseResult<Stmt> {
        let start = self.eat_keyword(Keyword::Until)?;
        let cond = self.parse_expr()?;
        self.eat_symbol(Symb::Colon)?;
        self.eat_newline()?;
        self.eat_indent()?;
        let body = self.parse_stmts()?;
        self.eat_dedent()?;
        Ok(Stmt::Until { cond, body, span: start })
    }

    fn parse_return(&mut self) -> ParseResult<Stmt> {
        let start = self.eat_keyword(Keyword::Return)?;
        let value = if matches!(self.current().kind, TokenKind::Newline) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.eat_newline()?;
        Ok(Stmt::Return { value, span: start })
    }

    fn parse_expr_stmt(&mut self) -> ParseResult<Stmt> {
        let span = self.current().span;
        let expr = self.parse_expr()?;
        if self.check_symbol(Symb::PlusPlus) {
            self.advance();
            self.eat_newline()?;
            return Ok(Stmt::PostIncDec { target: expr, op: IncDecOp::Inc, span });
        }
        if self.check_symbol(Symb::MinusMinus) {
            self.advance();
            self.eat_newline()?;
            return Ok(Stmt::PostIncDec { target: expr, op: IncDecOp::Dec, span });
        }
        if self.check_symbol(Symb::Assign) {
            self.advance();
            let value = self.parse_expr()?;
            self.eat_newline()?;
            return Ok(Stmt::Assign { target: expr, value, span });
        }
        if let Expr::Call(callee, args) = expr {
            self.eat_newline()?;
            return Ok(Stmt::Call { callee: *callee, args, span });
        }
        Err(self.syntax_err("expected an assignment, call, or increment/decrement statement"))
    }

    // -- expressions ------------------------------------------------------

    pub fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.check_keyword(Keyword::Or) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.check_keyword(Keyword::And) {
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = if self.check_symbol(Symb::EqEq) {
                BinOp::Eq
            } else if self.check_symbol(Symb::NotEq) {
                BinOp::NotEq
            } else {
                break;
            };
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = if self.check_symbol(Symb::Lt) {
                BinOp::Lt
            } else if self.check_symbol(Symb::Gt) {
                BinOp::Gt
            } else if self.check_symbol(Symb::LtEq) {
                BinOp::LtEq
            } else if self.check_symbol(Symb::GtEq) {
                BinOp::GtEq
            } else {
                break;
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = if self.check_symbol(Symb::Plus) {
                BinOp::Add
            } else if self.check_symbol(Symb::Minus) {
                BinOp::Sub
            } else {
                break;
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.check_symbol(Symb::Star) {
                BinOp::Mul
            } else if self.check_symbol(Symb::Slash) {
                BinOp::Div
            } else if self.check_symbol(Symb::Percent) {
                BinOp::Mod
            } else {
                break;
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        if self.check_symbol(Symb::Minus) {
            self.advance();
            return Ok(Expr::Unary(UnOp::Neg, Box::new(self.parse_unary()?)));
        }
        if self.check_symbol(Symb::Bang) || self.check_keyword(Keyword::Not) {
            self.advance();
            return Ok(Expr::Unary(UnOp::Not, Box::new(self.parse_unary()?)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.check_symbol(Symb::Dot) {
                self.advance();
                let (name, _) = self.eat_ident()?;
                expr = Expr::Member(Box::new(expr), name);
            } else if self.check_symbol(Symb::LBracket) {
                self.advance();
                let index = self.parse_expr()?;
                self.eat_symbol(Symb::RBracket)?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.check_symbol(Symb::LParen) {
                self.advance();
                let args = self.parse_args()?;
                self.eat_symbol(Symb::RParen)?;
                expr = Expr::Call(Box::new(expr), args);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.check_symbol(Symb::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if self.check_symbol(Symb::Comma) {
                self.advance();
                continue;
            }
            break;
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let tok = self.current().clone();
        match tok.kind {
            TokenKind::IntLit(v) => {
                self.advance();
                Ok(Expr::IntLit(v))
            }
            TokenKind::RealLit(v) => {
                self.advance();
                Ok(Expr::RealLit(v))
            }
            TokenKind::StringLit(sym) => {
                self.advance();
                Ok(Expr::StringLit(sym))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expr::BoolLit(true))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expr::BoolLit(false))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(Expr::NullLit)
            }
            TokenKind::Keyword(Keyword::Function) => {
                self.advance();
                let (name, _) = self.eat_ident()?;
                Ok(Expr::FunctionRef(name))
            }
            TokenKind::Ident(sym) => {
                self.advance();
                Ok(Expr::Ref(sym))
            }
            TokenKind::Symbol(Symb::LParen) => {
                self.advance();
                let expr = self.parse_expr()?;
                self.eat_symbol(Symb::RParen)?;
                Ok(expr)
            }
            TokenKind::Symbol(Symb::LBracket) => {
                self.advance();
                self.eat_symbol(Symb::RBracket)?;
                Ok(Expr::ArrayInit)
            }
            TokenKind::Symbol(Symb::LBrace) => {
                self.advance();
                self.eat_symbol(Symb::RBrace)?;
                Ok(Expr::HashtableInit)
            }
            _ => Err(self.syntax_err("expected an expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;
    use crate::lexer::Lexer;
    use std::path::PathBuf;

    fn parse(source: &str) -> Program {
        let mut interner = Interner::new();
        let lexer = Lexer::new(PathBuf::from("t.jp"), source, &mut interner, 4);
        let tokens = lexer.tokenize().expect("lex ok");
        Parser::new(PathBuf::from("t.jp"), &tokens).parse_program().expect("parse ok")
    }

    #[test]
    fn parses_a_library_with_one_global() {
        let program = parse("library Foo:\n    int x = 1\n");
        assert_eq!(program.items.len(), 1);
        match &program.items[0] {
            TopLevel::Library(lib) => assert_eq!(lib.members.len(), 1),
            _ => panic!("expected library"),
        }
    }

    #[test]
    fn parses_a_function_with_params_and_return() {
        let program = parse("library Foo:\n    bar(integer a, integer b) -> integer:\n        return a\n");
        match &program.items[0] {
            TopLevel::Library(lib) => match &lib.members[0] {
                Member::Function(f) => {
                    assert_eq!(f.params.len(), 2);
                    assert!(f.return_ty.is_some());
                }
                _ => panic!("expected function"),
            },
            _ => panic!("expected library"),
        }
    }

    #[test]
    fn doc_string_block_between_members_does_not_break_parsing() {
        let program = parse("library Foo:\n    \"\"\"\n    docs\n    \"\"\"\n    int x = 1\n");
        match &program.items[0] {
            TopLevel::Library(lib) => assert_eq!(lib.members.len(), 1),
            _ => panic!("expected library"),
        }
    }

    #[test]
    fn parses_global_block_wrapper() {
        let program = parse("library Foo:\n    global:\n        int x = 1\n");
        match &program.items[0] {
            TopLevel::Library(lib) => {
                assert!(matches!(lib.members[0], Member::GlobalBlock(_)));
            }
            _ => panic!("expected library"),
        }
    }

    #[test]
    fn parses_if_else_and_until() {
        let program = parse(
            "library Foo:\n    bar():\n        if x:\n            return\n        else:\n            return\n        until x:\n            x++\n",
        );
        match &program.items[0] {
            TopLevel::Library(lib) => match &lib.members[0] {
                Member::Function(f) => {
                    assert!(matches!(f.body[0], Stmt::If { .. }));
                    assert!(matches!(f.body[1], Stmt::Until { .. }));
                }
                _ => panic!("expected function"),
            },
            _ => panic!("expected library"),
        }
    }

    #[test]
    fn parses_local_decl_and_bare_call_statement() {
        let program = parse("library Foo:\n    bar():\n        integer x = 1\n        DisplayText(x)\n");
        match &program.items[0] {
            TopLevel::Library(lib) => match &lib.members[0] {
                Member::Function(f) => {
                    assert!(matches!(f.body[0], Stmt::LocalDecl { .. }));
                    assert!(matches!(f.body[1], Stmt::Call { .. }));
                }
                _ => panic!("expected function"),
            },
            _ => panic!("expected library"),
        }
    }

    #[test]
    fn expression_precedence_binds_multiplicative_tighter_than_additive() {
        let program = parse("library Foo:\n    int x = 1 + 2 * 3\n");
        match &program.items[0] {
            TopLevel::Library(lib) => match &lib.members[0] {
                Member::GlobalVar(v) => match v.init.as_ref().unwrap() {
                    Expr::Binary(BinOp::Add, _, rhs) => {
                        assert!(matches!(**rhs, Expr::Binary(BinOp::Mul, _, _)));
                    }
                    _ => panic!("expected top-level add"),
                },
                _ => panic!("expected global var"),
            },
            _ => panic!("expected library"),
        }
    }
}
