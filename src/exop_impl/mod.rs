//! OID constants and value encoding for the extended operations this crate recognizes.

pub mod cancel;
pub mod passmod;
pub mod starttls;
pub mod whoami;
