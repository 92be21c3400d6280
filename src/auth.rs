//! Auth-domain models: decoded access claims, token pairs, and redacted secrets.

pub mod claims;
pub mod pair;

pub use claims::*;
pub use pair::*;
