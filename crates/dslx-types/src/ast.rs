//! AST node types for DSLX modules.
//!
//! Nodes live in per-module arenas and refer to each other through the
//! index types below ([`ExprId`], [`TypeId`], [`FunctionId`], ...), never
//! through owning pointers. Every node carries a [`Span`].
//!
//! Item vectors preserve source order; `items` records the interleaving of
//! the different item kinds as written.

use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

// ══════════════════════════════════════════════════════════════════════════════
// Arena indices
// ══════════════════════════════════════════════════════════════════════════════

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id!(
    /// Index of an expression node in [`Module::exprs`].
    ExprId
);
arena_id!(
    /// Index of a type annotation node in [`Module::types`].
    TypeId
);
arena_id!(
    /// Index of a function in [`Module::functions`].
    FunctionId
);
arena_id!(
    /// Index of a proc declaration in [`Module::procs`].
    ProcDeclId
);
arena_id!(StructId);
arena_id!(EnumId);
arena_id!(ConstId);
arena_id!(AliasId);

// ══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ══════════════════════════════════════════════════════════════════════════════

/// A spanned identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Module
// ══════════════════════════════════════════════════════════════════════════════

/// A top-level item, in source order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleItem {
    Function(FunctionId),
    Proc(ProcDeclId),
    Struct(StructId),
    Enum(EnumId),
    Const(ConstId),
    Alias(AliasId),
}

/// A parsed DSLX module: item tables plus the expression and type arenas.
#[derive(Debug, Clone, Default)]
pub struct Module {
    /// Module name used to qualify names in diagnostics (`test::failer`).
    pub name: String,
    /// Source file name used in rendered spans.
    pub file: String,
    pub items: Vec<ModuleItem>,
    pub functions: Vec<Function>,
    pub procs: Vec<ProcDecl>,
    pub structs: Vec<StructDef>,
    pub enums: Vec<EnumDef>,
    pub consts: Vec<ConstDef>,
    pub aliases: Vec<TypeAlias>,
    exprs: Vec<Expr>,
    types: Vec<TypeAnnotation>,
}

impl Module {
    pub fn new(name: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            ..Self::default()
        }
    }

    // ── Arenas ───────────────────────────────────────────────────────────

    pub fn add_expr(&mut self, kind: ExprKind, span: Span) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(Expr { kind, span });
        id
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    pub fn add_type(&mut self, kind: TypeAnnotationKind, span: Span) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(TypeAnnotation { kind, span });
        id
    }

    pub fn type_annotation(&self, id: TypeId) -> &TypeAnnotation {
        &self.types[id.index()]
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    // ── Items ────────────────────────────────────────────────────────────

    pub fn add_function(&mut self, function: Function) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(function);
        id
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn proc_decl(&self, id: ProcDeclId) -> &ProcDecl {
        &self.procs[id.index()]
    }

    pub fn struct_def(&self, id: StructId) -> &StructDef {
        &self.structs[id.index()]
    }

    pub fn enum_def(&self, id: EnumId) -> &EnumDef {
        &self.enums[id.index()]
    }

    pub fn const_def(&self, id: ConstId) -> &ConstDef {
        &self.consts[id.index()]
    }

    pub fn alias(&self, id: AliasId) -> &TypeAlias {
        &self.aliases[id.index()]
    }

    /// Find a free function by name. Proc `config`/`next` functions are
    /// registered as `Proc.config` / `Proc.next`.
    pub fn find_function(&self, name: &str) -> Option<FunctionId> {
        self.functions
            .iter()
            .position(|f| f.name.name == name)
            .map(|i| FunctionId(i as u32))
    }

    pub fn find_proc(&self, name: &str) -> Option<ProcDeclId> {
        self.procs
            .iter()
            .position(|p| p.name.name == name)
            .map(|i| ProcDeclId(i as u32))
    }

    pub fn find_struct(&self, name: &str) -> Option<StructId> {
        self.structs
            .iter()
            .position(|s| s.name.name == name)
            .map(|i| StructId(i as u32))
    }

    pub fn find_enum(&self, name: &str) -> Option<EnumId> {
        self.enums
            .iter()
            .position(|e| e.name.name == name)
            .map(|i| EnumId(i as u32))
    }

    pub fn find_const(&self, name: &str) -> Option<ConstId> {
        self.consts
            .iter()
            .position(|c| c.name.name == name)
            .map(|i| ConstId(i as u32))
    }

    pub fn find_alias(&self, name: &str) -> Option<AliasId> {
        self.aliases
            .iter()
            .position(|a| a.name.name == name)
            .map(|i| AliasId(i as u32))
    }

    /// Names usable in type position resolve to a struct, enum or alias.
    pub fn find_type_item(&self, name: &str) -> Option<ModuleItem> {
        self.find_struct(name)
            .map(ModuleItem::Struct)
            .or_else(|| self.find_enum(name).map(ModuleItem::Enum))
            .or_else(|| self.find_alias(name).map(ModuleItem::Alias))
    }

    /// `module::function`: the form used in backtraces.
    pub fn qualified_name(&self, function: FunctionId) -> String {
        format!("{}::{}", self.name, self.function(function).name.name)
    }

    /// Test functions (`#[test] fn ...`) in source order.
    pub fn test_functions(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.functions
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_test)
            .map(|(i, _)| FunctionId(i as u32))
    }

    /// Test procs (`#![test_proc()]`) in source order.
    pub fn test_procs(&self) -> impl Iterator<Item = ProcDeclId> + '_ {
        self.procs
            .iter()
            .enumerate()
            .filter(|(_, p)| p.test_attr.is_some())
            .map(|(i, _)| ProcDeclId(i as u32))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Items
// ══════════════════════════════════════════════════════════════════════════════

/// What kind of body a [`Function`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionTag {
    Normal,
    ProcConfig(ProcDeclId),
    ProcNext(ProcDeclId),
}

/// `fn name<P: T, Q: T = {e}>(params) -> R { body }`
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Ident,
    pub parametrics: Vec<ParametricBinding>,
    pub params: Vec<Param>,
    pub return_type: Option<TypeId>,
    /// Always a [`ExprKind::Block`].
    pub body: ExprId,
    pub is_public: bool,
    pub is_test: bool,
    pub tag: FunctionTag,
    pub span: Span,
}

impl Function {
    pub fn is_parametric(&self) -> bool {
        !self.parametrics.is_empty()
    }
}

/// A parametric binding: `N: u32` or `M: u32 = {N + 1}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParametricBinding {
    pub name: Ident,
    pub ty: TypeId,
    /// Derived value expression, evaluated after inference.
    pub default: Option<ExprId>,
    pub span: Span,
}

/// A parameter or a member: `name: type`
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub ty: TypeId,
    pub span: Span,
}

/// `proc Name<params> { members; config(..) { .. } next(..) { .. } }`
#[derive(Debug, Clone, PartialEq)]
pub struct ProcDecl {
    pub name: Ident,
    pub parametrics: Vec<ParametricBinding>,
    /// Members, bound in order from the tuple returned by `config`.
    pub members: Vec<Param>,
    pub config: FunctionId,
    pub next: FunctionId,
    pub is_public: bool,
    /// Present when the proc is annotated `#![test_proc(...)]`.
    pub test_attr: Option<TestProcAttr>,
    pub span: Span,
}

/// `#![test_proc(init...)]`: the optional expressions seed the initial state.
#[derive(Debug, Clone, PartialEq)]
pub struct TestProcAttr {
    pub init: Vec<ExprId>,
    pub span: Span,
}

/// `struct Name { field: type, ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: Ident,
    pub fields: Vec<Param>,
    pub is_public: bool,
    pub span: Span,
}

/// `enum Name : uW { A = 0, B = 1 }`
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub name: Ident,
    pub underlying: TypeId,
    pub variants: Vec<EnumVariant>,
    pub is_public: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumVariant {
    pub name: Ident,
    pub value: ExprId,
}

/// `const NAME[: T] = expr;`
#[derive(Debug, Clone, PartialEq)]
pub struct ConstDef {
    pub name: Ident,
    pub annotation: Option<TypeId>,
    pub value: ExprId,
    pub is_public: bool,
    pub span: Span,
}

/// `type Alias = T;`
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAlias {
    pub name: Ident,
    pub ty: TypeId,
    pub span: Span,
}

// ══════════════════════════════════════════════════════════════════════════════
// Type annotations
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnnotation {
    pub kind: TypeAnnotationKind,
    pub span: Span,
}

/// Width of a bits type: fixed by a keyword (`u32`) or given by an
/// expression (`uN[N]`, `bits[8]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitsWidth {
    Fixed(u32),
    Expr(ExprId),
}

/// Direction capability of a channel endpoint type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelDirection {
    /// `chan in T`: receive-only.
    In,
    /// `chan out T`: send-only.
    Out,
}

impl fmt::Display for ChannelDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::In => f.write_str("in"),
            Self::Out => f.write_str("out"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeAnnotationKind {
    /// `u32`, `s8`, `bool`, `uN[N]`, `sN[8]`, `bits[W]`
    Bits { signed: bool, width: BitsWidth },
    /// `T[N]`
    Array { element: TypeId, size: ExprId },
    /// `(T, U)`; `()` is the unit tuple.
    Tuple(Vec<TypeId>),
    /// A struct, enum or alias name.
    Named(Ident),
    /// `token`
    Token,
    /// `chan in T` / `chan out T`
    Channel {
        direction: ChannelDirection,
        payload: TypeId,
    },
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `!`: bitwise inversion (logical not on `u1`).
    Invert,
    /// `-`: two's complement negation.
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    /// `++`
    Concat,
    LogicalAnd,
    LogicalOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinOp::Shl | BinOp::Shr)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Concat => "++",
            BinOp::LogicalAnd => "&&",
            BinOp::LogicalOr => "||",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A call: `callee<parametrics>(args)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub callee: ExprId,
    /// Explicit parametric arguments, in declaration order.
    pub parametrics: Vec<ExprId>,
    pub args: Vec<ExprId>,
    /// Span of the parenthesized argument list; backtraces point here.
    pub args_span: Span,
}

/// `spawn P<parametrics>(config_args)(next_args)`
#[derive(Debug, Clone, PartialEq)]
pub struct Spawn {
    pub proc_name: Ident,
    pub parametrics: Vec<ExprId>,
    pub config_args: Vec<ExprId>,
    pub next_args: Vec<ExprId>,
    pub args_span: Span,
}

/// `{ stmt; stmt; value }`
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    /// Trailing expression without a semicolon; `None` yields `()`.
    pub value: Option<ExprId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `let pattern[: T] = value;`
    Let {
        pattern: Pattern,
        annotation: Option<TypeId>,
        value: ExprId,
        span: Span,
    },
    /// `expr;`
    Expr(ExprId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    /// Alternatives separated by `|`.
    pub patterns: Vec<Pattern>,
    pub body: ExprId,
    pub span: Span,
}

/// `for pattern[: T] in iterable { body }(init)`
#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    /// Binds `(index_or_element, accumulator)`.
    pub pattern: Pattern,
    pub annotation: Option<TypeId>,
    pub iterable: ExprId,
    pub body: ExprId,
    pub init: ExprId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// `42`, `u32:42`, `s8:-1`, `0x1f`; `negative` is set for `T:-N`.
    Number {
        value: u128,
        negative: bool,
        annotation: Option<TypeId>,
    },
    Bool(bool),
    /// A reference to a local, parametric, constant or function.
    Name(String),
    /// `Subject::member`: enum variants.
    ColonRef { subject: Ident, member: Ident },
    Unary { op: UnaryOp, operand: ExprId },
    Binary { op: BinOp, lhs: ExprId, rhs: ExprId },
    /// `expr as T`
    Cast { expr: ExprId, ty: TypeId },
    Tuple(Vec<ExprId>),
    /// `[a, b]`, `u32[4]:[0, ...]`
    Array {
        annotation: Option<TypeId>,
        elements: Vec<ExprId>,
        has_ellipsis: bool,
    },
    /// `Point { x: e, y: e }` or `Point { x: e, ..base }`
    StructInstance {
        name: Ident,
        fields: Vec<(Ident, ExprId)>,
        base: Option<ExprId>,
    },
    Index { lhs: ExprId, index: ExprId },
    /// `x[lo:hi]`; missing bounds default to the ends.
    Slice {
        lhs: ExprId,
        start: Option<ExprId>,
        limit: Option<ExprId>,
    },
    /// `x[start +: uW]`
    WidthSlice { lhs: ExprId, start: ExprId, width: TypeId },
    /// `t.0`
    TupleIndex { lhs: ExprId, index: u32 },
    /// `s.field`
    FieldAccess { lhs: ExprId, field: Ident },
    Invocation(Invocation),
    /// `trace_fmt!("x is {}", x)`
    FormatMacro {
        name: Ident,
        format: String,
        args: Vec<ExprId>,
        args_span: Span,
    },
    /// `if cond { .. } else { .. }`; `else if` nests another `If`.
    If {
        cond: ExprId,
        then_block: ExprId,
        else_branch: Option<ExprId>,
    },
    Match { subject: ExprId, arms: Vec<MatchArm> },
    Block(Block),
    For(Box<ForLoop>),
    /// `a..b`
    Range { start: ExprId, limit: ExprId },
    Spawn(Spawn),
    /// `chan T`: evaluates to `(send_end, recv_end)`.
    Channel { payload: TypeId },
}

// ══════════════════════════════════════════════════════════════════════════════
// Patterns
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub kind: PatternKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatternKind {
    /// `_`
    Wildcard,
    /// Binds a name, or (in `match`) compares against a constant of that name.
    Name(Ident),
    Tuple(Vec<Pattern>),
    /// A number or bool literal (match only).
    Literal(ExprId),
    /// `Enum::Variant` (match only).
    ColonRef(ExprId),
}

impl Pattern {
    /// Every name this pattern binds, in left-to-right order.
    pub fn bound_names(&self) -> Vec<&Ident> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a Ident>) {
        match &self.kind {
            PatternKind::Name(ident) => out.push(ident),
            PatternKind::Tuple(items) => {
                for item in items {
                    item.collect_names(out);
                }
            }
            PatternKind::Wildcard | PatternKind::Literal(_) | PatternKind::ColonRef(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_ids_are_sequential() {
        let mut m = Module::new("test", "test.x");
        let a = m.add_expr(ExprKind::Bool(true), Span::point(1, 1));
        let b = m.add_expr(ExprKind::Name("x".into()), Span::point(1, 2));
        assert_eq!(a, ExprId(0));
        assert_eq!(b, ExprId(1));
        assert_eq!(m.expr_count(), 2);
        assert_eq!(m.expr(b).kind, ExprKind::Name("x".into()));
    }

    #[test]
    fn test_pattern_bound_names() {
        let s = Span::fake();
        let p = Pattern {
            kind: PatternKind::Tuple(vec![
                Pattern {
                    kind: PatternKind::Name(Ident::new("a", s)),
                    span: s,
                },
                Pattern {
                    kind: PatternKind::Wildcard,
                    span: s,
                },
                Pattern {
                    kind: PatternKind::Tuple(vec![Pattern {
                        kind: PatternKind::Name(Ident::new("b", s)),
                        span: s,
                    }]),
                    span: s,
                },
            ]),
            span: s,
        };
        let names: Vec<&str> = p.bound_names().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_qualified_name() {
        let mut m = Module::new("test", "test.x");
        let body = m.add_expr(
            ExprKind::Block(Block {
                stmts: vec![],
                value: None,
            }),
            Span::fake(),
        );
        let f = m.add_function(Function {
            name: Ident::new("failer", Span::fake()),
            parametrics: vec![],
            params: vec![],
            return_type: None,
            body,
            is_public: false,
            is_test: false,
            tag: FunctionTag::Normal,
            span: Span::fake(),
        });
        assert_eq!(m.qualified_name(f), "test::failer");
        assert_eq!(m.find_function("failer"), Some(f));
    }
}
