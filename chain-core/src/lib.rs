//! Core blockchain data structures
//!
//! This crate provides the fundamental building blocks shared by the
//! consensus engine and its storage:
//! - Basic types (Hash, Address, BlockNumber, etc.)
//! - Block and header structures with keccak hashing
//! - secp256k1 signing and signer recovery

pub mod block;
pub mod crypto;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use block::*;
pub use crypto::{keccak256, recover_address, secret_to_address, sign_hash, Signature};
pub use error::*;
pub use types::*;
