//! Per-pixel shading language used as the program bytecode format.
//!
//! A program is zero or more `let name = expr;` statements followed by one `vec4` expression.
//! Compilation binds identifiers against the program's parameter schema, type-checks, and lowers
//! to a stack bytecode that the CPU backend runs once per pixel.
pub(crate) mod ast;
pub(crate) mod bytecode;
pub(crate) mod compile;
pub(crate) mod error;
pub(crate) mod lexer;
pub(crate) mod parser;
pub(crate) mod vm;
