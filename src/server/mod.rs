//! The in-process directory engine (C9-C11): a listener that accepts connections and
//! reads LDAP requests off them, an in-memory request handler executing each operation
//! (C10), and the control/extended-op registries it consults along the way (C11).
//!
//! Unlike the client-side modules, this corner of the crate has no direct counterpart
//! in the library this one is distilled from; it is built from the same wire-format and
//! async building blocks ([`crate::protocol`], [`crate::conn`]) in the same idiom.

pub mod changelog;
pub mod controls;
pub mod directory;
pub mod exop;
pub mod listener;
pub mod rootdse;

pub use directory::{BoundIdentity, Directory};
pub use listener::Listener;
