//! `AbiDecoder`: the fixed-schema payload decoder behind the resolver.

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use chainproject_core::{AbiType, DecodeFailure, PayloadDecoder, Value};

use crate::normalizer;

/// Decodes `abi.encode(...)` payloads against an exact parameter list.
///
/// Decoding is strict: after parsing, the values are re-encoded and must
/// reproduce the payload byte for byte. A payload produced for a different
/// layout therefore fails even when a lenient parse would have succeeded
/// (trailing words, overlapping offsets, dirty padding).
#[derive(Debug, Default, Clone, Copy)]
pub struct AbiDecoder;

impl AbiDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Build alloy `DynSolType` from an `AbiType`.
    pub fn to_dyn(ty: &AbiType) -> DynSolType {
        match ty {
            AbiType::Uint(bits) => DynSolType::Uint(*bits as usize),
            AbiType::Int(bits) => DynSolType::Int(*bits as usize),
            AbiType::Bool => DynSolType::Bool,
            AbiType::Address => DynSolType::Address,
            AbiType::String => DynSolType::String,
            AbiType::Bytes => DynSolType::Bytes,
            AbiType::FixedBytes(n) => DynSolType::FixedBytes(*n as usize),
            AbiType::Array(inner) => DynSolType::Array(Box::new(Self::to_dyn(inner))),
            AbiType::Tuple(items) => DynSolType::Tuple(items.iter().map(Self::to_dyn).collect()),
        }
    }
}

impl PayloadDecoder for AbiDecoder {
    fn decode(&self, payload: &[u8], types: &[AbiType]) -> Result<Vec<Value>, DecodeFailure> {
        if types.is_empty() {
            return match payload.is_empty() {
                true => Ok(vec![]),
                false => Err(DecodeFailure(format!("{} unexpected bytes", payload.len()))),
            };
        }

        let tuple_type = DynSolType::Tuple(types.iter().map(Self::to_dyn).collect());
        let decoded = tuple_type
            .abi_decode_params(payload)
            .map_err(|e| DecodeFailure(format!("abi decode: {e}")))?;

        if decoded.abi_encode_params() != payload {
            tracing::trace!(
                signature = %AbiType::Tuple(types.to_vec()),
                len = payload.len(),
                "payload is not the canonical encoding"
            );
            return Err(DecodeFailure(format!(
                "payload of {} bytes is not a canonical encoding of {}",
                payload.len(),
                AbiType::Tuple(types.to_vec())
            )));
        }

        let values = match decoded {
            DynSolValue::Tuple(vals) => vals,
            other => vec![other],
        };
        Ok(values.into_iter().map(normalizer::normalize).collect())
    }
}
