//! Central cryptography module: the at-rest secret codec, hashing and
//! canonical encoding, and the ECDSA signing primitives. Each submodule
//! focuses on a single responsibility so the security model stays auditable.

pub mod integrity;
pub mod secrets;
pub mod signing;
