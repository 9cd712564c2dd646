//! Converts alloy `DynSolValue` → ChainProject `Value`.

use alloy_core::dyn_abi::DynSolValue;
use chainproject_core::Value;

/// Convert a decoded `DynSolValue` into a `Value`.
///
/// Integers that fit 128 bits become `Uint`/`Int` whatever their declared
/// width; addresses are lowercase hex.
pub fn normalize(val: DynSolValue) -> Value {
    match val {
        DynSolValue::Bool(b) => Value::Bool(b),

        DynSolValue::Int(i, _bits) => match i128::try_from(i) {
            Ok(v) => Value::Int(v),
            Err(_) => Value::BigInt(i.to_string()),
        },

        DynSolValue::Uint(u, _bits) => match u128::try_from(u) {
            Ok(v) => Value::Uint(v),
            Err(_) => Value::BigUint(u.to_string()),
        },

        DynSolValue::FixedBytes(word, size) => Value::Bytes(word[..size.min(32)].to_vec()),

        DynSolValue::Bytes(b) => Value::Bytes(b),

        DynSolValue::String(s) => Value::Str(s),

        DynSolValue::Address(a) => Value::Address(format!("{a:#x}")),

        DynSolValue::Array(vals) | DynSolValue::FixedArray(vals) => {
            Value::Array(vals.into_iter().map(normalize).collect())
        }

        DynSolValue::Tuple(fields) => Value::Tuple(fields.into_iter().map(normalize).collect()),

        DynSolValue::Function(f) => Value::Bytes(f.to_vec()),
    }
}
