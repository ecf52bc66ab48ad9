/*! Core types for source-level Solidity obfuscation.
 *
 * Every pass in the pipeline works the same way: parse the current text into a span-addressed
 * syntax tree, resolve identifiers through the scope model, describe the rewrite as a set of span
 * edits and hand those to the rewrite engine. This crate holds the pieces they share: the tree, the
 * symbol table, the edit machinery, configuration, name allocation and the error taxonomy.
 */

pub mod config;
pub mod error;
pub mod mapping;
pub mod names;
pub mod random;
pub mod rewrite;
pub mod scope;
pub mod span;
pub mod syntax;
pub mod typing;

pub use config::{NamingStrategy, ObfuscationConfig, PassToggles};
pub use error::{Diagnostic, ParseError, Result, RewriteError, Severity, TransformError};
pub use mapping::{MappingMetadata, ObfuscationMapping};
pub use names::NameGenerator;
pub use rewrite::{apply_edits, Edit, EditSet};
pub use scope::{Binding, SymbolTable};
pub use span::{LineIndex, Span};
pub use syntax::{
    Contract, ContractKind, DataLocation, Decl, ElementaryType, Expr, Function, FunctionKind,
    Literal, LiteralKind, Modifier, ModifierInvocation, Mutability, Node, NodeId, NodeKind,
    StorageClass, Stmt, SyntaxTree, Visibility,
};
