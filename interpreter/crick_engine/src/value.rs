//! The runtime value model.
//!
//! A value is a descriptor in a slab (indexed by [`ValueId`]) plus a
//! payload span in the arena. The descriptor records who owns the payload:
//! co-allocated on the arena stack (popped together with the value),
//! detached (globals, statics, string literals, resized arrays), or
//! borrowed, an alias into another value's bytes, in which case
//! `lvalue_from` names the parent so array resizing can propagate.
//!
//! Scalar payloads are read and written through the typed accessors here;
//! an interpreted pointer is stored as the 8-byte arena offset of its
//! referent, so offset 0 is the null pointer and pointer arithmetic is
//! plain offset arithmetic.

use crate::arena::ByteRef;
use crate::error::Result;
use crate::ty::{BaseType, TypeId};
use crate::Engine;
use crick_utils::{idx::Idx, index_vec::IdxVec};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ValueId(u32);

impl Idx for ValueId {
    fn new(idx: usize) -> Self {
        ValueId(idx as u32)
    }

    fn idx(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
pub struct ValueCell {
    pub ty: TypeId,
    pub payload: ByteRef,
    /// The value this one is an lvalue into, if any. Writes through this
    /// value land in the parent's bytes; an array resize updates the
    /// parent's type and payload as well.
    pub lvalue_from: Option<ValueId>,
    pub is_lvalue: bool,
    /// The payload was pushed on the arena stack together with this value
    /// and is popped when the value is freed.
    pub payload_on_stack: bool,
    /// The payload is a detached arena block owned by this value.
    pub payload_detached: bool,
    pub scope_id: i32,
    pub is_static: bool,
    /// Kept for visibility decisions after the owning block ended
    /// (static locals).
    pub out_of_scope: bool,
}

enum Slot {
    Live(ValueCell),
    Free,
}

/// The descriptor slab. Slots are recycled through an explicit free list;
/// within one expression every allocated temporary is freed exactly once
/// by the collapse machinery.
#[derive(Default)]
pub struct Values {
    slots: IdxVec<ValueId, Slot>,
    free: Vec<ValueId>,
}

impl Values {
    pub fn new() -> Values {
        Values::default()
    }

    pub fn insert(&mut self, cell: ValueCell) -> ValueId {
        match self.free.pop() {
            Some(id) => {
                self.slots[id] = Slot::Live(cell);
                id
            }
            None => self.slots.push(Slot::Live(cell)),
        }
    }

    pub fn remove(&mut self, id: ValueId) -> ValueCell {
        match std::mem::replace(&mut self.slots[id], Slot::Free) {
            Slot::Live(cell) => {
                self.free.push(id);
                cell
            }
            Slot::Free => panic!("value {:?} freed twice", id),
        }
    }

    pub fn get(&self, id: ValueId) -> &ValueCell {
        match &self.slots[id] {
            Slot::Live(cell) => cell,
            Slot::Free => panic!("value {:?} used after free", id),
        }
    }

    pub fn get_mut(&mut self, id: ValueId) -> &mut ValueCell {
        match &mut self.slots[id] {
            Slot::Live(cell) => cell,
            Slot::Free => panic!("value {:?} used after free", id),
        }
    }

    pub fn is_live(&self, id: ValueId) -> bool {
        matches!(self.slots.get(id), Some(Slot::Live(_)))
    }

    pub fn live_ids(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.slots
            .iter_enumerated()
            .filter(|(_, s)| matches!(s, Slot::Live(_)))
            .map(|(id, _)| id)
    }
}

impl Engine {
    #[inline]
    pub fn cell(&self, id: ValueId) -> &ValueCell {
        self.values.get(id)
    }

    #[inline]
    pub fn cell_mut(&mut self, id: ValueId) -> &mut ValueCell {
        self.values.get_mut(id)
    }

    /// The payload size of a value, honoring its (possibly resized) type.
    pub fn payload_size(&self, id: ValueId) -> usize {
        self.types.size_of(self.cell(id).ty) as usize
    }

    fn blank_cell(&self, ty: TypeId, payload: ByteRef) -> ValueCell {
        ValueCell {
            ty,
            payload,
            lvalue_from: None,
            is_lvalue: false,
            payload_on_stack: false,
            payload_detached: false,
            scope_id: 0,
            is_static: false,
            out_of_scope: false,
        }
    }

    /// A transient value of `ty` with a fresh payload: on the arena stack
    /// by default, or detached when `on_heap` (for values that must
    /// outlive their creating frame).
    pub fn alloc_value_from_type(
        &mut self,
        ty: TypeId,
        is_lvalue: bool,
        lvalue_from: Option<ValueId>,
        on_heap: bool,
    ) -> Result<ValueId> {
        let size = self.types.size_of(ty) as usize;
        let payload = if on_heap {
            self.arena.alloc_detached(size)?
        } else {
            self.arena.push(size)?
        };
        let mut cell = self.blank_cell(ty, payload);
        cell.is_lvalue = is_lvalue;
        cell.lvalue_from = lvalue_from;
        cell.payload_on_stack = !on_heap;
        cell.payload_detached = on_heap;
        Ok(self.values.insert(cell))
    }

    /// A by-value copy of `src`: fresh payload holding the same bytes.
    pub fn alloc_value_and_copy(&mut self, src: ValueId, on_heap: bool) -> Result<ValueId> {
        let (ty, from_payload) = {
            let cell = self.cell(src);
            (cell.ty, cell.payload)
        };
        let size = self.types.size_of(ty) as usize;
        let copy = self.alloc_value_from_type(ty, false, None, on_heap)?;
        let to_payload = self.cell(copy).payload;
        self.arena.copy(from_payload, to_payload, size);
        Ok(copy)
    }

    /// An alias into existing bytes: the payload is borrowed, not owned.
    /// Writes through the result update the original storage.
    pub fn alloc_value_from_existing(
        &mut self,
        ty: TypeId,
        payload: ByteRef,
        is_lvalue: bool,
        lvalue_from: Option<ValueId>,
    ) -> ValueId {
        let mut cell = self.blank_cell(ty, payload);
        cell.is_lvalue = is_lvalue;
        cell.lvalue_from = lvalue_from;
        self.values.insert(cell)
    }

    /// An alias of `src`'s whole payload, linked back to it so writes and
    /// resizes propagate.
    pub fn alloc_value_shared(&mut self, src: ValueId) -> ValueId {
        let (ty, payload, is_lvalue) = {
            let cell = self.cell(src);
            (cell.ty, cell.payload, cell.is_lvalue)
        };
        self.alloc_value_from_existing(ty, payload, is_lvalue, Some(src))
    }

    /// Free a value allocated on the expression stack: pops its payload
    /// (if it owns one there) and releases the descriptor.
    pub fn free_stack_value(&mut self, id: ValueId) {
        let cell = self.values.remove(id);
        if cell.payload_on_stack {
            let size = self.types.size_of(cell.ty) as usize;
            self.arena.pop(cell.payload, size);
        } else if cell.payload_detached {
            self.arena.free_detached(cell.payload);
        }
    }

    /// Free only the descriptor; the payload has already been released
    /// (e.g. by an arena frame pop) or is owned elsewhere.
    pub fn free_descriptor(&mut self, id: ValueId) {
        self.values.remove(id);
    }

    /// A detached scratch copy of `src`, used when an operand has to
    /// outlive the LIFO reclamation of the expression stack for a moment
    /// (ternary branches, casts).
    pub fn detach_copy(&mut self, src: ValueId) -> Result<ValueId> {
        self.alloc_value_and_copy(src, true)
    }

    ////////// Scalar payload access //////////

    fn scalar_bytes(&self, id: ValueId, len: usize) -> &[u8] {
        self.arena.bytes(self.cell(id).payload, len)
    }

    /// Read an integer-family payload, sign- or zero-extended to `i64`.
    /// Pointers read as their raw offset; floats truncate.
    pub fn read_int(&self, id: ValueId) -> i64 {
        let base = self.types.base(self.cell(id).ty);
        match base {
            BaseType::Char => self.scalar_bytes(id, 1)[0] as i8 as i64,
            BaseType::UnsignedChar => self.scalar_bytes(id, 1)[0] as i64,
            BaseType::Short => {
                i16::from_le_bytes(self.scalar_bytes(id, 2).try_into().unwrap()) as i64
            }
            BaseType::UnsignedShort => {
                u16::from_le_bytes(self.scalar_bytes(id, 2).try_into().unwrap()) as i64
            }
            BaseType::Int | BaseType::Enum => {
                i32::from_le_bytes(self.scalar_bytes(id, 4).try_into().unwrap()) as i64
            }
            BaseType::UnsignedInt => {
                u32::from_le_bytes(self.scalar_bytes(id, 4).try_into().unwrap()) as i64
            }
            BaseType::Long => i64::from_le_bytes(self.scalar_bytes(id, 8).try_into().unwrap()),
            BaseType::UnsignedLong | BaseType::Pointer => {
                u64::from_le_bytes(self.scalar_bytes(id, 8).try_into().unwrap()) as i64
            }
            BaseType::Fp => self.read_fp(id) as i64,
            _ => 0,
        }
    }

    /// Write an integer into a value's payload, truncating to its width.
    pub fn write_int(&mut self, id: ValueId, n: i64) {
        let (payload, base) = {
            let cell = self.cell(id);
            (cell.payload, self.types.base(cell.ty))
        };
        match base {
            BaseType::Char | BaseType::UnsignedChar => {
                self.arena.bytes_mut(payload, 1)[0] = n as u8;
            }
            BaseType::Short | BaseType::UnsignedShort => {
                self.arena
                    .bytes_mut(payload, 2)
                    .copy_from_slice(&(n as i16).to_le_bytes());
            }
            BaseType::Int | BaseType::UnsignedInt | BaseType::Enum => {
                self.arena
                    .bytes_mut(payload, 4)
                    .copy_from_slice(&(n as i32).to_le_bytes());
            }
            BaseType::Long | BaseType::UnsignedLong | BaseType::Pointer => {
                self.arena
                    .bytes_mut(payload, 8)
                    .copy_from_slice(&n.to_le_bytes());
            }
            _ => {}
        }
    }

    pub fn read_fp(&self, id: ValueId) -> f64 {
        f64::from_le_bytes(self.scalar_bytes(id, 8).try_into().unwrap())
    }

    pub fn write_fp(&mut self, id: ValueId, f: f64) {
        let payload = self.cell(id).payload;
        self.arena
            .bytes_mut(payload, 8)
            .copy_from_slice(&f.to_le_bytes());
    }

    /// Read a pointer payload as the arena offset of its referent
    /// (0 = null).
    pub fn read_ptr(&self, id: ValueId) -> ByteRef {
        ByteRef(u64::from_le_bytes(self.scalar_bytes(id, 8).try_into().unwrap()) as u32)
    }

    pub fn write_ptr(&mut self, id: ValueId, target: ByteRef) {
        let payload = self.cell(id).payload;
        self.arena
            .bytes_mut(payload, 8)
            .copy_from_slice(&(target.0 as u64).to_le_bytes());
    }

    /// Read the `TypeId` carried by a type-of-type value.
    pub fn read_type_payload(&self, id: ValueId) -> TypeId {
        TypeId::from_raw(u32::from_le_bytes(
            self.scalar_bytes(id, 4).try_into().unwrap(),
        ))
    }

    pub fn write_type_payload(&mut self, id: ValueId, ty: TypeId) {
        let payload = self.cell(id).payload;
        self.arena
            .bytes_mut(payload, 4)
            .copy_from_slice(&ty.raw().to_le_bytes());
    }

    /// Read the id stored in a function or macro value's payload.
    pub fn read_def_payload(&self, id: ValueId) -> u32 {
        u32::from_le_bytes(self.scalar_bytes(id, 4).try_into().unwrap())
    }

    pub fn write_def_payload(&mut self, id: ValueId, def: u32) {
        let payload = self.cell(id).payload;
        self.arena
            .bytes_mut(payload, 4)
            .copy_from_slice(&def.to_le_bytes());
    }
}
