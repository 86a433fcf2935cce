//! Numeric coercion: projecting any scalar-ish value onto the integer,
//! unsigned integer or floating domains.

use crate::ty::BaseType;
use crate::value::ValueId;
use crate::Engine;

/// Integer-family type (enums included), i.e. everything `coerce_int`
/// handles without precision loss.
pub fn is_integer_numeric(eng: &Engine, v: ValueId) -> bool {
    eng.types.base(eng.cell(v).ty).is_integer()
}

pub fn is_fp(eng: &Engine, v: ValueId) -> bool {
    eng.types.base(eng.cell(v).ty) == BaseType::Fp
}

/// Usable wherever a number is required.
pub fn is_numeric_coercible(eng: &Engine, v: ValueId) -> bool {
    is_integer_numeric(eng, v) || is_fp(eng, v)
}

/// As above, additionally admitting pointers when the caller allows raw
/// pointer coercion.
pub fn is_numeric_coercible_plus_pointers(eng: &Engine, v: ValueId, allow_ptr: bool) -> bool {
    is_numeric_coercible(eng, v)
        || (allow_ptr && eng.types.base(eng.cell(v).ty) == BaseType::Pointer)
}

/// Project a value onto a signed integer: integers extend, pointers give
/// their address bits, floats truncate.
pub fn coerce_int(eng: &Engine, v: ValueId) -> i64 {
    match eng.types.base(eng.cell(v).ty) {
        BaseType::Fp => eng.read_fp(v) as i64,
        _ => eng.read_int(v),
    }
}

/// Project a value onto an unsigned integer.
pub fn coerce_uint(eng: &Engine, v: ValueId) -> u64 {
    coerce_int(eng, v) as u64
}

/// Project a value onto a double.
pub fn coerce_fp(eng: &Engine, v: ValueId) -> f64 {
    match eng.types.base(eng.cell(v).ty) {
        BaseType::Fp => eng.read_fp(v),
        _ => eng.read_int(v) as f64,
    }
}
