//! Assignment and conversion.
//!
//! C-style assignment with all of its side doors: numeric narrowing,
//! pointer/array decay, null-pointer constants, unsized-array adoption
//! and the string-literal initialization of `char` arrays.

use crate::arena::ByteRef;
use crate::error::{FailKind, Result};
use crate::expr::coerce::{
    coerce_fp, coerce_int, coerce_uint, is_numeric_coercible, is_numeric_coercible_plus_pointers,
};
use crate::parser::Parser;
use crate::ty::BaseType;
use crate::value::ValueId;
use crate::Engine;
use tracing::trace;

fn mismatch(
    eng: &Engine,
    p: &Parser,
    dest: ValueId,
    src: ValueId,
    func_name: Option<&str>,
    param_no: usize,
) -> crate::error::Fail {
    p.fail(FailKind::AssignMismatch {
        to: eng.types.display(eng.cell(dest).ty, &eng.interner),
        from: eng.types.display(eng.cell(src).ty, &eng.interner),
        ctx: func_name.map(|f| (f.to_string(), param_no)),
    })
}

/// Store an integer into `dest` (which must be an lvalue), truncating to
/// its width. Returns the stored value, or with `after` the value `dest`
/// held before the store (postfix increment semantics).
pub fn assign_int(eng: &mut Engine, p: &Parser, dest: ValueId, from: i64, after: bool) -> Result<i64> {
    if !eng.cell(dest).is_lvalue {
        return Err(p.fail(FailKind::NotAnLValue));
    }
    let result = if after { coerce_int(eng, dest) } else { from };
    eng.write_int(dest, from);
    Ok(result)
}

/// Store a double into `dest` (which must be an lvalue).
pub fn assign_fp(eng: &mut Engine, p: &Parser, dest: ValueId, from: f64) -> Result<f64> {
    if !eng.cell(dest).is_lvalue {
        return Err(p.fail(FailKind::NotAnLValue));
    }
    eng.write_fp(dest, from);
    Ok(from)
}

/// Pointer destination: exact or `void*` matches copy, arrays decay to
/// the address of their first element, integer zero makes a null pointer,
/// and with `allow_ptr_coercion` raw bits pass through.
fn assign_to_pointer(
    eng: &mut Engine,
    p: &Parser,
    dest: ValueId,
    src: ValueId,
    func_name: Option<&str>,
    param_no: usize,
    allow_ptr_coercion: bool,
) -> Result<()> {
    let dest_ty = eng.cell(dest).ty;
    let src_ty = eng.cell(src).ty;
    let pointed = eng.types.from_ty(dest_ty);
    let void_ptr = eng.types.void_ptr_ty;
    let src_base = eng.types.base(src_ty);

    if src_ty == dest_ty
        || src_ty == void_ptr
        || (dest_ty == void_ptr && src_base == BaseType::Pointer)
    {
        let bits = eng.read_ptr(src);
        eng.write_ptr(dest, bits);
    } else if src_base == BaseType::Array
        && (pointed == eng.types.from_ty(src_ty) || dest_ty == void_ptr)
    {
        // blah *x = array of blah
        let first = eng.cell(src).payload;
        eng.write_ptr(dest, first);
    } else if src_base == BaseType::Pointer
        && eng.types.from_ty(src_ty).map(|t| eng.types.base(t)) == Some(BaseType::Array)
        && (pointed == eng.types.from_ty(src_ty).and_then(|t| eng.types.from_ty(t))
            || dest_ty == void_ptr)
    {
        // blah *x = pointer to array of blah
        let (target, _) = eng.deref_pointer(p, src)?;
        eng.write_ptr(dest, target);
    } else if is_numeric_coercible(eng, src) && coerce_int(eng, src) == 0 {
        eng.write_ptr(dest, ByteRef::NULL);
    } else if allow_ptr_coercion && is_numeric_coercible(eng, src) {
        eng.write_ptr(dest, ByteRef(coerce_uint(eng, src) as u32));
    } else if allow_ptr_coercion && src_base == BaseType::Pointer {
        let bits = eng.read_ptr(src);
        eng.write_ptr(dest, bits);
    } else {
        return Err(mismatch(eng, p, dest, src, func_name, param_no));
    }
    Ok(())
}

/// Assign any kind of value into `dest`.
///
/// `force` bypasses the lvalue requirement (parameter binding, casts,
/// return slots); `allow_ptr_coercion` additionally admits raw
/// integer↔pointer conversions (casts only).
pub fn assign(
    eng: &mut Engine,
    p: &Parser,
    dest: ValueId,
    src: ValueId,
    force: bool,
    func_name: Option<&str>,
    param_no: usize,
    allow_ptr_coercion: bool,
) -> Result<()> {
    if !eng.cell(dest).is_lvalue && !force {
        return Err(p.fail(FailKind::NotAnLValue));
    }

    let dest_base = eng.types.base(eng.cell(dest).ty);
    trace!(?dest_base, "assign");

    if dest_base.is_integer()
        && !is_numeric_coercible_plus_pointers(eng, src, allow_ptr_coercion)
    {
        return Err(mismatch(eng, p, dest, src, func_name, param_no));
    }

    match dest_base {
        BaseType::Int
        | BaseType::Short
        | BaseType::Char
        | BaseType::Long
        | BaseType::UnsignedInt
        | BaseType::UnsignedShort
        | BaseType::UnsignedChar
        | BaseType::UnsignedLong
        | BaseType::Enum => {
            let n = coerce_int(eng, src);
            eng.write_int(dest, n);
        }
        BaseType::Fp => {
            if !is_numeric_coercible_plus_pointers(eng, src, allow_ptr_coercion) {
                return Err(mismatch(eng, p, dest, src, func_name, param_no));
            }
            let f = coerce_fp(eng, src);
            eng.write_fp(dest, f);
        }
        BaseType::Pointer => {
            assign_to_pointer(eng, p, dest, src, func_name, param_no, allow_ptr_coercion)?
        }
        BaseType::Array => assign_to_array(eng, p, dest, src, func_name, param_no)?,
        BaseType::Struct | BaseType::Union => {
            if eng.cell(dest).ty != eng.cell(src).ty {
                return Err(mismatch(eng, p, dest, src, func_name, param_no));
            }
            let len = eng.payload_size(src);
            let (from, to) = (eng.cell(src).payload, eng.cell(dest).payload);
            eng.arena.copy(from, to, len);
        }
        _ => return Err(mismatch(eng, p, dest, src, func_name, param_no)),
    }
    Ok(())
}

fn assign_to_array(
    eng: &mut Engine,
    p: &Parser,
    dest: ValueId,
    src: ValueId,
    func_name: Option<&str>,
    param_no: usize,
) -> Result<()> {
    let src_ty = eng.cell(src).ty;
    let src_base = eng.types.base(src_ty);

    if src_base == BaseType::Array && eng.types.get(eng.cell(dest).ty).array_len == 0 {
        // destination array is unsized: adopt the source's length
        eng.resize_array_value(dest, src_ty)?;
    }

    let dest_ty = eng.cell(dest).ty;
    let dest_elem = eng.types.from_ty(dest_ty);

    // char array = "abcd"
    if dest_elem.map(|t| eng.types.base(t)) == Some(BaseType::Char)
        && src_base == BaseType::Pointer
        && eng.types.from_ty(src_ty).map(|t| eng.types.base(t)) == Some(BaseType::Char)
    {
        let (target, _) = eng.deref_pointer(p, src)?;
        if eng.types.get(dest_ty).array_len == 0 {
            // char x[] = "abcd"
            let len = eng.arena.c_strlen(target) as u32 + 1;
            let elem = dest_elem.unwrap();
            let sized = eng.types.matching(elem, BaseType::Array, len, None);
            eng.resize_array_value(dest, sized)?;
        }
        let len = eng.payload_size(dest);
        let to = eng.cell(dest).payload;
        eng.arena.copy(target, to, len);
        return Ok(());
    }

    if eng.cell(dest).ty != src_ty {
        return Err(mismatch(eng, p, dest, src, func_name, param_no));
    }
    let (dn, sn) = (
        eng.types.get(eng.cell(dest).ty).array_len,
        eng.types.get(src_ty).array_len,
    );
    if dn != sn {
        return Err(p.fail(FailKind::AssignArraySize { to: dn, from: sn }));
    }

    let len = eng.payload_size(dest);
    let (from, to) = (eng.cell(src).payload, eng.cell(dest).payload);
    eng.arena.copy(from, to, len);
    Ok(())
}

impl Engine {
    /// Give an unsized array value its real type and storage. The fresh
    /// payload is detached (the old span cannot be reclaimed in place);
    /// the new shape propagates to the parent lvalue, so a variable whose
    /// alias was resized sees the new length too.
    pub fn resize_array_value(&mut self, dest: ValueId, new_ty: crate::ty::TypeId) -> Result<()> {
        let new_size = self.types.size_of(new_ty) as usize;
        let old = self.cell(dest).payload;
        let old_size = self.payload_size(dest);
        let fresh = self.arena.alloc_detached(new_size)?;
        self.arena.copy(old, fresh, old_size.min(new_size));

        let was_detached = self.cell(dest).payload_detached;
        if was_detached {
            self.arena.free_detached(old);
        }
        {
            let cell = self.cell_mut(dest);
            cell.ty = new_ty;
            cell.payload = fresh;
            cell.payload_on_stack = false;
            cell.payload_detached = true;
        }

        if let Some(parent) = self.cell(dest).lvalue_from {
            let parent_was_detached = self.cell(parent).payload_detached;
            let parent_old = self.cell(parent).payload;
            if parent_was_detached && (parent_old != old || !was_detached) {
                self.arena.free_detached(parent_old);
            }
            let cell = self.cell_mut(parent);
            cell.ty = new_ty;
            cell.payload = fresh;
            cell.payload_on_stack = false;
            // ownership of the detached payload moves to the parent,
            // which outlives the expression temporary
            cell.payload_detached = true;
            self.cell_mut(dest).payload_detached = false;
        }
        Ok(())
    }
}
