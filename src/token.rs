//! Token material held by a session.

mod pair;
mod secret;

pub use pair::*;
pub use secret::*;
