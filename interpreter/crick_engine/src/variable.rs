//! Variable definition, lookup, scope and frame bookkeeping.

use crate::arena::ByteRef;
use crate::error::{FailKind, Result};
use crate::parser::Parser;
use crate::table::SymTable;
use crate::ty::{BaseType, TypeId};
use crate::value::ValueId;
use crate::{Engine, Frame};
use crick_lexer::Symbol;
use tracing::debug;

impl Engine {
    /// The table new names land in: the current frame's locals, or the
    /// global table outside any call.
    fn active_table(&mut self) -> &mut SymTable {
        match self.frames.last_mut() {
            Some(frame) => &mut frame.locals,
            None => &mut self.globals,
        }
    }

    /// Define `ident` as a copy of `init`, in the active scope.
    pub fn define_variable(
        &mut self,
        p: &Parser,
        ident: Symbol,
        init: ValueId,
        writable: bool,
    ) -> Result<ValueId> {
        let on_heap = self.frames.is_empty();
        let var = self.alloc_value_and_copy(init, on_heap)?;
        {
            let cell = self.cell_mut(var);
            cell.is_lvalue = writable;
            cell.scope_id = p.scope_id;
        }
        let pos = p.pos();
        if !self.active_table().set(ident, var, Some(pos)) {
            let name = self.interner.resolve(ident).to_string();
            return Err(p.fail(FailKind::AlreadyDefined(name)));
        }
        Ok(var)
    }

    /// Define a variable of `ty` with zeroed storage. For statics the
    /// storage is detached and registered globally under a mangled name,
    /// so re-executing the declaration rebinds the existing storage;
    /// `first_visit` reports whether the initializer should run.
    pub fn define_variable_typed(
        &mut self,
        p: &Parser,
        ident: Symbol,
        ty: TypeId,
        is_static: bool,
        first_visit: &mut bool,
    ) -> Result<ValueId> {
        *first_visit = true;
        if is_static {
            let func = match self.frames.last() {
                Some(f) => self.interner.resolve(f.func_name).to_string(),
                None => String::new(),
            };
            let mangled = format!("/{}/{}", func, self.interner.resolve(ident));
            let mangled = self.interner.intern(&mangled);

            if let Some(existing) = self.globals.get(mangled) {
                *first_visit = false;
                self.cell_mut(existing).out_of_scope = false;
                if !self.frames.is_empty() {
                    self.active_table().set(ident, existing, Some(p.pos()));
                }
                return Ok(existing);
            }

            let var = self.alloc_value_from_type(ty, true, None, true)?;
            {
                let cell = self.cell_mut(var);
                cell.scope_id = p.scope_id;
                cell.is_static = true;
            }
            let pos = p.pos();
            self.globals.set(mangled, var, Some(pos));
            if !self.frames.is_empty() {
                self.active_table().set(ident, var, Some(pos));
            } else if !self.globals.set(ident, var, Some(pos)) {
                let name = self.interner.resolve(ident).to_string();
                return Err(p.fail(FailKind::AlreadyDefined(name)));
            }
            return Ok(var);
        }

        let on_heap = self.frames.is_empty();
        let var = self.alloc_value_from_type(ty, true, None, on_heap)?;
        self.cell_mut(var).scope_id = p.scope_id;
        let pos = p.pos();
        if !self.active_table().set(ident, var, Some(pos)) {
            let name = self.interner.resolve(ident).to_string();
            return Err(p.fail(FailKind::AlreadyDefined(name)));
        }
        debug!(name = self.interner.resolve(ident), "defined variable");
        Ok(var)
    }

    /// Look `ident` up in the current frame's locals, then the globals.
    /// Out-of-scope entries (exited statics) are invisible.
    pub fn variable_get(&self, p: &Parser, ident: Symbol) -> Result<ValueId> {
        if let Some(frame) = self.frames.last() {
            if let Some(v) = frame.locals.get(ident) {
                if !self.cell(v).out_of_scope {
                    return Ok(v);
                }
            }
        }
        if let Some(v) = self.globals.get(ident) {
            if !self.cell(v).out_of_scope {
                return Ok(v);
            }
        }
        Err(p.fail(FailKind::UnknownIdentifier(
            self.interner.resolve(ident).to_string(),
        )))
    }

    /// True if `ident` is bound in the current frame's locals.
    pub fn local_defined(&self, ident: Symbol) -> bool {
        self.frames
            .last()
            .map(|f| f.locals.get(ident).is_some())
            .unwrap_or(false)
    }

    pub fn variable_defined(&self, ident: Symbol) -> bool {
        if let Some(frame) = self.frames.last() {
            if frame.locals.get(ident).is_some() {
                return true;
            }
        }
        self.globals.get(ident).is_some()
    }

    /// True if `ident` names a typedef'd type in scope.
    pub fn ident_is_type(&self, ident: Symbol) -> bool {
        let lookup = |table: &SymTable| {
            table
                .get(ident)
                .map(|v| self.types.base(self.cell(v).ty) == BaseType::TypeOfType)
        };
        if let Some(frame) = self.frames.last() {
            if let Some(found) = lookup(&frame.locals) {
                return found;
            }
        }
        lookup(&self.globals).unwrap_or(false)
    }

    /// Open a lexical block. The scope id is derived from the block's
    /// token position, so re-entering the same block (loop iterations,
    /// repeated calls) resumes the same id and revives its statics.
    pub fn scope_begin(&mut self, p: &mut Parser) -> (i32, i32) {
        let prev = p.scope_id;
        let id = p.cursor() as i32 + 1;
        p.scope_id = id;

        let revive: Vec<ValueId> = self
            .active_table_ref()
            .values()
            .filter(|&v| {
                let cell = self.cell(v);
                cell.scope_id == id && cell.out_of_scope
            })
            .collect();
        for v in revive {
            self.cell_mut(v).out_of_scope = false;
        }
        (prev, id)
    }

    /// Close a lexical block: its variables disappear (statics are only
    /// marked out of scope, keeping their storage).
    pub fn scope_end(&mut self, p: &mut Parser, id: i32, prev: i32) {
        p.scope_id = prev;

        let ending: Vec<(ValueId, bool)> = self
            .active_table_ref()
            .values()
            .filter(|&v| self.cell(v).scope_id == id)
            .map(|v| (v, self.cell(v).is_static))
            .collect();

        let mut doomed: Vec<ValueId> = Vec::new();
        for (v, is_static) in ending {
            if is_static {
                self.cell_mut(v).out_of_scope = true;
            } else {
                doomed.push(v);
            }
        }
        self.active_table()
            .drain_filter(|_, v| !doomed.contains(&v));
        for v in doomed {
            self.free_variable(v);
        }
    }

    fn active_table_ref(&self) -> &SymTable {
        match self.frames.last() {
            Some(frame) => &frame.locals,
            None => &self.globals,
        }
    }

    /// Release a variable's storage: detached payloads return to the free
    /// lists; stack payloads are reclaimed by the enclosing frame pop.
    pub fn free_variable(&mut self, id: ValueId) {
        let cell = self.values.remove(id);
        if cell.payload_detached {
            self.arena.free_detached(cell.payload);
        }
    }

    /// Open a call frame.
    pub fn frame_push(&mut self, func_name: Symbol, return_value: ValueId) {
        self.frames.push(Frame {
            func_name,
            return_value,
            params: Vec::new(),
            locals: SymTable::new(),
        });
    }

    /// Close a call frame, releasing the descriptors of its locals and
    /// parameters (their stack payloads go with the arena frame pop).
    pub fn frame_pop(&mut self) {
        let frame = self.frames.pop().expect("no open call frame");
        for (_, v) in frame.locals.iter() {
            if self.values.is_live(v) && !self.cell(v).is_static {
                let cell = self.values.remove(v);
                if cell.payload_detached {
                    self.arena.free_detached(cell.payload);
                }
            }
        }
        for v in frame.params {
            if self.values.is_live(v) {
                self.free_descriptor(v);
            }
        }
    }

    /// Follow a pointer value to its referent: the target bytes and the
    /// pointed-to type. Fails on null and on addresses outside the arena.
    pub fn deref_pointer(&self, p: &Parser, ptr: ValueId) -> Result<(ByteRef, TypeId)> {
        let ty = self.cell(ptr).ty;
        debug_assert_eq!(self.types.base(ty), BaseType::Pointer);
        let pointed = self
            .types
            .from_ty(ty)
            .expect("pointer type without element type");
        let target = self.read_ptr(ptr);
        if target == ByteRef::NULL {
            return Err(p.fail(FailKind::NullDereference));
        }
        if !self.arena.check(target, self.types.size_of(pointed) as usize) {
            return Err(p.fail(FailKind::PointerOutOfBounds));
        }
        Ok((target, pointed))
    }

    /// Intern the contents of a string literal as a canonical detached
    /// `char[len + 1]` value (created once per distinct literal).
    pub fn string_literal(&mut self, sym: Symbol) -> Result<ValueId> {
        if let Some(&v) = self.string_lits.get(&sym) {
            return Ok(v);
        }
        let bytes: Vec<u8> = self.interner.resolve(sym).as_bytes().to_vec();
        let len = bytes.len() + 1;
        let ty = self
            .types
            .matching(self.types.char_ty, BaseType::Array, len as u32, None);
        let val = self.alloc_value_from_type(ty, false, None, true)?;
        let payload = self.cell(val).payload;
        self.arena.bytes_mut(payload, len - 1).copy_from_slice(&bytes);
        self.string_lits.insert(sym, val);
        Ok(val)
    }
}
