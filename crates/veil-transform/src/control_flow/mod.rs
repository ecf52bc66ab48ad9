//! Passes that change the shape of control flow: inlining, opaque predicates and flattening.

pub mod flatten;
pub mod inline;
pub mod opaque;
