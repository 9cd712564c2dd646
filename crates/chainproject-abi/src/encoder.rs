//! Builds `abi.encode(...)` payloads from `Value`s.
//!
//! Used to produce fixtures for registration and initialization payloads,
//! and by tooling that replays hand-written event feeds.

use alloy_core::dyn_abi::DynSolValue;
use alloy_primitives::{Address, B256, I256, U256};
use chainproject_core::{AbiType, Layout, Value};

use crate::error::EncodeError;

/// ABI-encode `values` as parameters of `types`.
pub fn encode(types: &[AbiType], values: &[Value]) -> Result<Vec<u8>, EncodeError> {
    if types.len() != values.len() {
        return Err(EncodeError::Arity {
            expected: types.len(),
            got: values.len(),
        });
    }
    let params = types
        .iter()
        .zip(values)
        .map(|(ty, v)| to_sol(ty, v))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(DynSolValue::Tuple(params).abi_encode_params())
}

/// ABI-encode one value per top-level layout field. Nested structs are
/// given as `Value::Tuple`, metadata as `Value::Metadata`.
pub fn encode_layout(layout: &Layout, values: &[Value]) -> Result<Vec<u8>, EncodeError> {
    encode(&layout.abi_types(), values)
}

fn mismatch(ty: &AbiType, got: &Value) -> EncodeError {
    EncodeError::TypeMismatch {
        expected: ty.to_string(),
        got: got.type_name().to_string(),
    }
}

fn to_sol(ty: &AbiType, value: &Value) -> Result<DynSolValue, EncodeError> {
    match (ty, value) {
        (AbiType::Uint(bits), Value::Uint(v)) => Ok(DynSolValue::Uint(U256::from(*v), *bits as usize)),
        (AbiType::Uint(bits), Value::BigUint(s)) => {
            let u = U256::from_str_radix(s, 10).map_err(|_| EncodeError::InvalidNumber(s.clone()))?;
            Ok(DynSolValue::Uint(u, *bits as usize))
        }
        (AbiType::Int(bits), Value::Int(v)) => {
            let i = I256::try_from(*v).map_err(|_| EncodeError::InvalidNumber(v.to_string()))?;
            Ok(DynSolValue::Int(i, *bits as usize))
        }
        (AbiType::Int(bits), Value::BigInt(s)) => {
            let i = I256::from_dec_str(s).map_err(|_| EncodeError::InvalidNumber(s.clone()))?;
            Ok(DynSolValue::Int(i, *bits as usize))
        }
        (AbiType::Bool, Value::Bool(b)) => Ok(DynSolValue::Bool(*b)),
        (AbiType::Address, Value::Address(a)) => {
            let addr: Address = a.parse().map_err(|_| EncodeError::InvalidAddress(a.clone()))?;
            Ok(DynSolValue::Address(addr))
        }
        (AbiType::String, Value::Str(s)) => Ok(DynSolValue::String(s.clone())),
        (AbiType::Bytes, Value::Bytes(b)) => Ok(DynSolValue::Bytes(b.clone())),
        (AbiType::FixedBytes(n), Value::Bytes(b)) if b.len() <= *n as usize && *n <= 32 => {
            Ok(DynSolValue::FixedBytes(B256::right_padding_from(b), *n as usize))
        }
        (AbiType::Array(inner), Value::Array(items)) => items
            .iter()
            .map(|v| to_sol(inner, v))
            .collect::<Result<Vec<_>, _>>()
            .map(DynSolValue::Array),
        (AbiType::Tuple(types), Value::Tuple(items)) if types.len() == items.len() => types
            .iter()
            .zip(items)
            .map(|(t, v)| to_sol(t, v))
            .collect::<Result<Vec<_>, _>>()
            .map(DynSolValue::Tuple),
        (AbiType::Tuple(types), Value::Metadata(m)) if types.len() == 2 => Ok(DynSolValue::Tuple(vec![
            DynSolValue::Uint(U256::from(m.protocol), 256),
            DynSolValue::String(m.pointer.clone()),
        ])),
        (ty, other) => Err(mismatch(ty, other)),
    }
}
