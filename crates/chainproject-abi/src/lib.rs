//! chainproject-abi: EVM ABI payload decoding for ChainProject.
//!
//! Provides [`AbiDecoder`], the fixed-schema decoder the core
//! `SchemaResolver` delegates to, plus an encoder for building payloads.

pub mod decoder;
pub mod encoder;
pub mod error;
pub mod normalizer;

pub use decoder::AbiDecoder;
pub use encoder::{encode, encode_layout};
pub use error::EncodeError;
