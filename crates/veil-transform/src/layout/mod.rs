//! Passes that only change how the code reads: comments, whitespace and names.

pub mod comments;
pub mod minify;
pub mod rename;
