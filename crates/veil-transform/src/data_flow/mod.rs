//! Passes that change how values are stored or spelled: local promotion, constant blinding,
//! literal substitution and scalar splitting.

pub mod blind;
pub mod promote;
pub mod split;
pub mod substitute;
