//! Parser module for ScriptIt scripts

pub mod ast;
pub mod grammar;

pub use ast::*;
pub use grammar::{parse_expression, parse_script};
