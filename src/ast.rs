use crate::intern::Symbol;
use crate::token::Span;

/// Program tree node types (§3). A single deterministic pass produces this
/// tree from one compilation unit's token stream; there is no parse-forest
/// ambiguity to share nodes across, so everything here is owned
/// (`Box`/`Vec`) rather than arena-allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Private,
    Public,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constness {
    Const,
    Mutable,
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub items: Vec<TopLevel>,
}

#[derive(Debug, Clone)]
pub enum TopLevel {
    Library(Library),
    Scope(Scope),
    /// Parsed for grammar completeness; resolution already happened in the
    /// source resolver, so lowering and codegen skip these.
    Import(Symbol),
}

#[derive(Debug, Clone)]
pub struct Library {
    pub name: Symbol,
    pub initializer: Option<Symbol>,
    pub members: Vec<Member>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub name: Symbol,
    pub is_anonymous: bool,
    pub initializer: Option<Symbol>,
    pub members: Vec<Member>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Member {
    GlobalVar(GlobalVar),
    Function(Function),
    Init(Init),
    TypeDecl(TypeDecl),
    Nested(Scope),
    /// A `global:` wrapper as produced by the parser. Flattened away by
    /// lowering's visibility sub-pass; never reaches the emitter.
    GlobalBlock(Vec<Member>),
}

#[derive(Debug, Clone)]
pub struct GlobalVar {
    pub name: Symbol,
    pub ty: Symbol,
    pub is_array: bool,
    pub visibility: Visibility,
    pub constness: Constness,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: Symbol,
    pub ty: Symbol,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: Symbol,
    pub visibility: Visibility,
    pub params: Vec<Param>,
    pub return_ty: Option<Symbol>,
    pub body: Vec<Stmt>,
    pub locals: Vec<LocalDecl>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Init {
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum TypeDecl {
    /// `type NAME extends BASE` — preserved as a struct declaration.
    Extends { name: Symbol, base: Symbol },
    /// `alias NAME extends BASE` — resolved away at lowering, emits only
    /// when the compiler renders a reference to its base.
    Alias { name: Symbol, base: Symbol },
}

#[derive(Debug, Clone)]
pub struct LocalDecl {
    pub name: Symbol,
    pub ty: Symbol,
    pub is_array: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncDecOp {
    Inc,
    Dec,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    LocalDecl { decl: LocalDecl, init: Option<Expr> },
    Assign { target: Expr, value: Expr, span: Span },
    Call { callee: Expr, args: Vec<Expr>, span: Span },
    If { cond: Expr, then_body: Vec<Stmt>, else_body: Option<Vec<Stmt>>, span: Span },
    Until { cond: Expr, body: Vec<Stmt>, span: Span },
    Return { value: Option<Expr>, span: Span },
    PostIncDec { target: Expr, op: IncDecOp, span: Span },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone)]
pub enum Expr {
    IntLit(i64),
    RealLit(f64),
    StringLit(Symbol),
    BoolLit(bool),
    NullLit,
    Ref(Symbol),
    Index(Box<Expr>, Box<Expr>),
    Member(Box<Expr>, Symbol),
    Call(Box<Expr>, Vec<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Unary(UnOp, Box<Expr>),
    FunctionRef(Symbol),
    /// `[]` initializer — "this is an array", not a literal value.
    ArrayInit,
    /// `{}` initializer — constructed via the target runtime's hashtable
    /// constructor at emit time.
    HashtableInit,
}
