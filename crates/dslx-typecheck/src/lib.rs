//! DSLX type checker: deduces a [`Type`] for every expression of a parsed
//! module and reports static errors.
//!
//! ```text
//! DSLX Source → Lexer → Parser → Type Checker → TypecheckedModule → Interpreter
//! ```

pub mod builtins;
pub mod checker;
pub mod env;
pub mod ty;

pub use builtins::Builtin;
pub use checker::TypeChecker;
pub use ty::{Callee, Dim, Type};

use dslx_lexer::Lexer;
use dslx_parser::Parser;
use dslx_types::ast::{ExprId, Module, TypeId};
use dslx_types::{CompileErrors, SourceFile};

/// Per-node type facts, indexed by arena id.
#[derive(Debug, Clone, Default)]
pub struct TypeInfo {
    expr_types: Vec<Option<Type>>,
    annotation_types: Vec<Option<Type>>,
}

impl TypeInfo {
    pub fn new(module: &Module) -> Self {
        Self {
            expr_types: vec![None; module.expr_count()],
            annotation_types: vec![None; module.type_count()],
        }
    }

    pub fn expr_type(&self, id: ExprId) -> Option<&Type> {
        self.expr_types.get(id.index()).and_then(Option::as_ref)
    }

    pub fn annotation_type(&self, id: TypeId) -> Option<&Type> {
        self.annotation_types.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn set_expr_type(&mut self, id: ExprId, ty: Type) {
        if let Some(slot) = self.expr_types.get_mut(id.index()) {
            *slot = Some(ty);
        }
    }

    pub(crate) fn set_annotation_type(&mut self, id: TypeId, ty: Type) {
        if let Some(slot) = self.annotation_types.get_mut(id.index()) {
            *slot = Some(ty);
        }
    }
}

/// A module that passed type checking, with its type facts.
#[derive(Debug, Clone)]
pub struct TypecheckedModule {
    pub module: Module,
    pub type_info: TypeInfo,
}

/// Lex, parse and type-check `source`.
///
/// Returns the module only when no stage reported an error.
pub fn parse_and_typecheck(
    source: &str,
    file_name: &str,
    module_name: &str,
) -> Result<TypecheckedModule, CompileErrors> {
    let source_file = SourceFile::new(file_name, source);
    let lexed = Lexer::new(&source_file).lex();
    let mut errors = lexed.errors;
    let parsed = Parser::new(lexed.tokens, &source_file, module_name).parse();
    errors.extend(parsed.errors);
    if errors.has_errors() {
        return Err(errors);
    }
    let module = parsed.module;
    let type_info = TypeChecker::new(&module, &source_file, &mut errors).check();
    if errors.has_errors() {
        Err(errors)
    } else {
        Ok(TypecheckedModule { module, type_info })
    }
}

/// Type-check `source` and return only the diagnostics. The module name is
/// the file stem.
pub fn type_check(source: &str, file_name: &str) -> CompileErrors {
    let module_name = file_name
        .rsplit('/')
        .next()
        .and_then(|base| base.split('.').next())
        .unwrap_or(file_name);
    match parse_and_typecheck(source, file_name, module_name) {
        Ok(_) => CompileErrors::empty(),
        Err(errors) => errors,
    }
}
