//! Identity-domain identifiers, permission sets, and the credential model.

pub mod id;
pub mod permission;
pub mod token;

pub use id::*;
pub use permission::*;
pub use token::{credential::*, secret::*};
