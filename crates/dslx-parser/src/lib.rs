//! DSLX parser: converts a token stream into a [`Module`] arena.

mod parse_decl;
mod parse_expr;
mod parse_stmt;
mod parse_type;
mod parser;

pub use parser::{ParseResult, Parser};

use dslx_lexer::Lexer;
use dslx_types::ast::Module;
use dslx_types::{CompileErrors, SourceFile};

/// Lex and parse `source` in one step.
///
/// Returns the module only when neither stage reported an error.
pub fn parse_module(
    source: &str,
    file_name: &str,
    module_name: &str,
) -> Result<Module, CompileErrors> {
    let source_file = SourceFile::new(file_name, source);
    let lexed = Lexer::new(&source_file).lex();
    let mut errors = lexed.errors;
    let parsed = Parser::new(lexed.tokens, &source_file, module_name).parse();
    errors.extend(parsed.errors);
    if errors.has_errors() {
        Err(errors)
    } else {
        Ok(parsed.module)
    }
}
