//! An LDAP protocol engine (RFC 4511): a reusable client-side connection/dispatcher
//! (C7-C8) built on the [`lber`] BER codec (C1), plus an in-process directory engine
//! (C9-C11) that executes LDAP operations against an in-memory entry store.
//!
//! The client-side modules (`conn`, `sync`, the per-operation request/response
//! modules, `search`, `filter`, `dn`, `entry`, `schema`, `ldif`, `matching`, `rate`,
//! `controls`, `exop`) are grounded in the `ldap3` crate this is distilled from. The
//! `server` module — the listener, in-memory request handler, and control/extended-op
//! registry — has no direct counterpart there; it is this crate's own addition, built
//! in the same idiom from the same building blocks.

#[macro_use]
extern crate log;

pub mod abandon;
pub mod add;
pub mod bind;
pub mod compare;
pub mod conn;
pub mod controls;
pub mod controls_impl;
pub mod delete;
pub mod dn;
pub mod entry;
pub mod exop;
pub mod exop_impl;
pub mod extended;
pub mod filter;
pub mod ldif;
pub mod matching;
pub mod modify;
pub mod modifydn;
pub mod protocol;
pub mod rate;
pub mod result;
pub mod schema;
pub mod search;
pub mod server;
#[cfg(feature = "sync")]
pub mod sync;
pub mod unbind;
pub mod util;

pub use conn::{Ldap, LdapConnAsync, LdapConnSettings};
pub use dn::Dn;
pub use entry::{Entry, Modification};
pub use filter::Filter;
pub use result::{LdapError, LdapResult, Result};
pub use schema::Schema;
#[cfg(feature = "sync")]
pub use sync::LdapConn;
