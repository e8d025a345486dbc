//! Identity-domain identifiers, scope sets, and redacting secret wrappers.

pub mod id;
pub mod scope;
pub mod secret;

pub use id::*;
pub use scope::*;
pub use secret::*;
