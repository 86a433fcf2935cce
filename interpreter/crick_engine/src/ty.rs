//! The type registry.
//!
//! Types live in one flat table indexed by [`TypeId`]; derived types
//! (pointers, arrays) are canonicalized through their parent's derived
//! list, so `TypeId` equality means structural equality. The `from` field
//! is an id, never an owning reference, so cyclic shapes (a struct holding
//! a pointer to itself) are representable without ceremony.

use crick_abi::data_layout::DataLayout;
use crick_abi::size_and_align::{Align, Size};
use crick_lexer::{Interner, Symbol};
use crick_utils::{idx::Idx, index_vec::IdxVec};
use rustc_hash::FxHashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl Idx for TypeId {
    fn new(idx: usize) -> Self {
        TypeId(idx as u32)
    }

    fn idx(&self) -> usize {
        self.0 as usize
    }
}

impl TypeId {
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn from_raw(raw: u32) -> TypeId {
        TypeId(raw)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BaseType {
    Void,
    Int,
    Short,
    Char,
    Long,
    UnsignedInt,
    UnsignedShort,
    UnsignedChar,
    UnsignedLong,
    Fp,
    Function,
    Macro,
    Pointer,
    Array,
    Struct,
    Union,
    Enum,
    GotoLabel,
    /// The type of values that carry a type (used by `sizeof`, casts and
    /// typedefs); the payload holds a `TypeId`.
    TypeOfType,
}

impl BaseType {
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            BaseType::Int
                | BaseType::Short
                | BaseType::Char
                | BaseType::Long
                | BaseType::UnsignedInt
                | BaseType::UnsignedShort
                | BaseType::UnsignedChar
                | BaseType::UnsignedLong
                | BaseType::Enum
        )
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            BaseType::UnsignedInt
                | BaseType::UnsignedShort
                | BaseType::UnsignedChar
                | BaseType::UnsignedLong
        )
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Member {
    pub name: Symbol,
    pub ty: TypeId,
    /// Byte offset of the member inside the aggregate.
    pub offset: u32,
}

#[derive(Debug)]
pub struct TypeData {
    pub base: BaseType,
    /// Element type for arrays and pointers, parent for named aggregates.
    pub from: Option<TypeId>,
    /// Array length; 0 means "unsized until initialized".
    pub array_len: u32,
    /// Storage size in bytes.
    pub size: u32,
    /// Alignment boundary in bytes.
    pub align: u32,
    /// The name of a struct, union or enum.
    pub ident: Option<Symbol>,
    /// Struct/union members in declaration order.
    pub members: Vec<Member>,
    member_index: FxHashMap<Symbol, usize>,
    /// Types derived from this one, for canonicalization.
    derived: Vec<TypeId>,
    /// An aggregate becomes "defined" once its body has been parsed.
    pub has_body: bool,
}

pub struct Types {
    pub layout: DataLayout,
    data: IdxVec<TypeId, TypeData>,

    /// Root of the named-aggregate namespace; every struct/union/enum is
    /// in its derived list.
    uber: TypeId,

    pub void_ty: TypeId,
    pub int_ty: TypeId,
    pub short_ty: TypeId,
    pub char_ty: TypeId,
    pub long_ty: TypeId,
    pub uint_ty: TypeId,
    pub ushort_ty: TypeId,
    pub uchar_ty: TypeId,
    pub ulong_ty: TypeId,
    pub fp_ty: TypeId,
    pub function_ty: TypeId,
    pub macro_ty: TypeId,
    pub goto_label_ty: TypeId,
    pub type_ty: TypeId,

    pub void_ptr_ty: TypeId,
    pub char_ptr_ty: TypeId,
}

impl Types {
    pub fn new(layout: DataLayout) -> Types {
        let mut data: IdxVec<TypeId, TypeData> = IdxVec::new();
        let mut prim = |base: BaseType, size: Size, align: Align| {
            data.push(TypeData {
                base,
                from: None,
                array_len: 0,
                size: size.bytes() as u32,
                align: align.bytes() as u32,
                ident: None,
                members: Vec::new(),
                member_index: FxHashMap::default(),
                derived: Vec::new(),
                has_body: false,
            })
        };

        let uber = prim(BaseType::Void, Size::ZERO, Align::ONE);
        let void_ty = prim(BaseType::Void, Size::ZERO, Align::ONE);
        let int_ty = prim(BaseType::Int, layout.int_size, layout.int_align);
        let short_ty = prim(BaseType::Short, layout.short_size, layout.short_align);
        let char_ty = prim(BaseType::Char, layout.char_size, layout.char_align);
        let long_ty = prim(BaseType::Long, layout.long_size, layout.long_align);
        let uint_ty = prim(BaseType::UnsignedInt, layout.int_size, layout.int_align);
        let ushort_ty = prim(BaseType::UnsignedShort, layout.short_size, layout.short_align);
        let uchar_ty = prim(BaseType::UnsignedChar, layout.char_size, layout.char_align);
        let ulong_ty = prim(BaseType::UnsignedLong, layout.long_size, layout.long_align);
        let fp_ty = prim(BaseType::Fp, layout.fp_size, layout.fp_align);
        // function and macro payloads hold an id into the engine's side tables
        let function_ty = prim(BaseType::Function, Size::from_bytes(4), layout.int_align);
        let macro_ty = prim(BaseType::Macro, Size::from_bytes(4), layout.int_align);
        let goto_label_ty = prim(BaseType::GotoLabel, Size::ZERO, Align::ONE);
        let type_ty = prim(BaseType::TypeOfType, Size::from_bytes(4), layout.int_align);

        let mut types = Types {
            layout,
            data,
            uber,
            void_ty,
            int_ty,
            short_ty,
            char_ty,
            long_ty,
            uint_ty,
            ushort_ty,
            uchar_ty,
            ulong_ty,
            fp_ty,
            function_ty,
            macro_ty,
            goto_label_ty,
            type_ty,
            void_ptr_ty: void_ty,
            char_ptr_ty: void_ty,
        };
        types.void_ptr_ty = types.matching(void_ty, BaseType::Pointer, 0, None);
        types.char_ptr_ty = types.matching(char_ty, BaseType::Pointer, 0, None);
        types
    }

    #[inline]
    pub fn get(&self, id: TypeId) -> &TypeData {
        &self.data[id]
    }

    #[inline]
    pub fn base(&self, id: TypeId) -> BaseType {
        self.data[id].base
    }

    #[inline]
    pub fn from_ty(&self, id: TypeId) -> Option<TypeId> {
        self.data[id].from
    }

    #[inline]
    pub fn size_of(&self, id: TypeId) -> u32 {
        self.data[id].size
    }

    #[inline]
    pub fn align_of(&self, id: TypeId) -> u32 {
        self.data[id].align
    }

    /// The canonical derived type of `parent` with the given shape,
    /// created on first request. Two calls with equal arguments return
    /// the same `TypeId`.
    pub fn matching(
        &mut self,
        parent: TypeId,
        base: BaseType,
        array_len: u32,
        ident: Option<Symbol>,
    ) -> TypeId {
        for &d in &self.data[parent].derived {
            let dd = &self.data[d];
            if dd.base == base && dd.array_len == array_len && dd.ident == ident {
                return d;
            }
        }

        let (size, align) = match base {
            BaseType::Pointer => (
                self.layout.pointer_size.bytes() as u32,
                self.layout.pointer_align.bytes() as u32,
            ),
            BaseType::Array => {
                let elem = &self.data[parent];
                (elem.size * array_len, elem.align)
            }
            BaseType::Enum => (
                self.layout.int_size.bytes() as u32,
                self.layout.int_align.bytes() as u32,
            ),
            // struct/union sizes accumulate as members are added
            _ => (0, self.layout.aggregate_align.bytes() as u32),
        };

        let id = self.data.push(TypeData {
            base,
            from: Some(parent),
            array_len,
            size,
            align,
            ident,
            members: Vec::new(),
            member_index: FxHashMap::default(),
            derived: Vec::new(),
            has_body: false,
        });
        self.data[parent].derived.push(id);
        id
    }

    /// The canonical pointer-to-`id` type.
    pub fn pointer_to(&mut self, id: TypeId) -> TypeId {
        self.matching(id, BaseType::Pointer, 0, None)
    }

    /// The canonical named aggregate (created opaque on first mention).
    pub fn named_aggregate(&mut self, base: BaseType, ident: Symbol) -> TypeId {
        self.matching(self.uber, base, 0, Some(ident))
    }

    /// Append a member to a struct or union under construction, computing
    /// its offset and growing the aggregate's size and alignment.
    pub fn add_member(&mut self, agg: TypeId, name: Symbol, ty: TypeId) {
        let (msize, malign) = (self.data[ty].size, self.data[ty].align.max(1));
        let data = &mut self.data[agg];
        let offset = if data.base == BaseType::Union {
            0
        } else {
            (data.size + malign - 1) & !(malign - 1)
        };
        let index = data.members.len();
        data.members.push(Member { name, ty, offset });
        data.member_index.insert(name, index);
        data.align = data.align.max(malign);
        data.size = if data.base == BaseType::Union {
            data.size.max(msize)
        } else {
            offset + msize
        };
    }

    /// Pad an aggregate's size up to its alignment and mark it defined.
    pub fn finish_aggregate(&mut self, agg: TypeId) {
        let data = &mut self.data[agg];
        let align = data.align.max(1);
        data.size = (data.size + align - 1) & !(align - 1);
        data.has_body = true;
    }

    pub fn member(&self, agg: TypeId, name: Symbol) -> Option<&Member> {
        let data = &self.data[agg];
        data.member_index.get(&name).map(|&i| &data.members[i])
    }

    /// The storage size of `id`, with `array_len` overriding the stored
    /// array length (used while an unsized array is being adopted). When
    /// `compact` is false the size is padded to the type's alignment.
    pub fn sizeof_with(&self, id: TypeId, array_len: u32, compact: bool) -> u32 {
        let data = &self.data[id];
        let raw = if data.base == BaseType::Array {
            let elem = data.from.map(|f| self.data[f].size).unwrap_or(0);
            elem * array_len
        } else {
            data.size
        };
        if compact {
            raw
        } else {
            let align = data.align.max(1);
            (raw + align - 1) & !(align - 1)
        }
    }

    /// A human-readable rendering of a type, for diagnostics.
    pub fn display(&self, id: TypeId, interner: &Interner) -> String {
        let data = &self.data[id];
        match data.base {
            BaseType::Void => "void".into(),
            BaseType::Int => "int".into(),
            BaseType::Short => "short".into(),
            BaseType::Char => "char".into(),
            BaseType::Long => "long".into(),
            BaseType::UnsignedInt => "unsigned int".into(),
            BaseType::UnsignedShort => "unsigned short".into(),
            BaseType::UnsignedChar => "unsigned char".into(),
            BaseType::UnsignedLong => "unsigned long".into(),
            BaseType::Fp => "double".into(),
            BaseType::Function => "function".into(),
            BaseType::Macro => "macro".into(),
            BaseType::GotoLabel => "goto label".into(),
            BaseType::TypeOfType => "type".into(),
            BaseType::Pointer => match data.from {
                Some(f) => format!("pointer to {}", self.display(f, interner)),
                None => "pointer".into(),
            },
            BaseType::Array => match data.from {
                Some(f) => format!("{}[{}]", self.display(f, interner), data.array_len),
                None => "array".into(),
            },
            BaseType::Struct | BaseType::Union | BaseType::Enum => {
                let kw = match data.base {
                    BaseType::Struct => "struct",
                    BaseType::Union => "union",
                    _ => "enum",
                };
                match data.ident {
                    Some(sym) => format!("{} {}", kw, interner.resolve(sym)),
                    None => kw.into(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> (Types, Interner) {
        (Types::new(DataLayout::default()), Interner::new())
    }

    #[test]
    fn derived_types_are_canonical() {
        let (mut t, _) = fresh();
        let p1 = t.pointer_to(t.int_ty);
        let p2 = t.pointer_to(t.int_ty);
        assert_eq!(p1, p2);

        let a1 = t.matching(t.int_ty, BaseType::Array, 4, None);
        let a2 = t.matching(t.int_ty, BaseType::Array, 4, None);
        let a3 = t.matching(t.int_ty, BaseType::Array, 5, None);
        assert_eq!(a1, a2);
        assert_ne!(a1, a3);
        assert_eq!(t.size_of(a1), 16);
    }

    #[test]
    fn named_aggregates_are_canonical_by_name() {
        let (mut t, mut i) = fresh();
        let foo = i.intern("Foo");
        let bar = i.intern("Bar");
        assert_eq!(
            t.named_aggregate(BaseType::Struct, foo),
            t.named_aggregate(BaseType::Struct, foo)
        );
        assert_ne!(
            t.named_aggregate(BaseType::Struct, foo),
            t.named_aggregate(BaseType::Struct, bar)
        );
    }

    #[test]
    fn struct_members_are_laid_out_in_order_with_alignment() {
        let (mut t, mut i) = fresh();
        let s = t.named_aggregate(BaseType::Struct, i.intern("S"));
        t.add_member(s, i.intern("c"), t.char_ty);
        t.add_member(s, i.intern("n"), t.int_ty);
        t.add_member(s, i.intern("c2"), t.char_ty);
        t.finish_aggregate(s);

        assert_eq!(t.member(s, i.intern("c")).unwrap().offset, 0);
        assert_eq!(t.member(s, i.intern("n")).unwrap().offset, 4);
        assert_eq!(t.member(s, i.intern("c2")).unwrap().offset, 8);
        assert_eq!(t.size_of(s), 12, "padded to int alignment");
    }

    #[test]
    fn union_members_share_offset_zero() {
        let (mut t, mut i) = fresh();
        let u = t.named_aggregate(BaseType::Union, i.intern("U"));
        t.add_member(u, i.intern("n"), t.int_ty);
        t.add_member(u, i.intern("d"), t.fp_ty);
        t.finish_aggregate(u);
        assert_eq!(t.member(u, i.intern("d")).unwrap().offset, 0);
        assert_eq!(t.size_of(u), 8);
    }

    #[test]
    fn self_referential_struct_is_expressible() {
        let (mut t, mut i) = fresh();
        let node = t.named_aggregate(BaseType::Struct, i.intern("Node"));
        let node_ptr = t.pointer_to(node);
        t.add_member(node, i.intern("next"), node_ptr);
        t.add_member(node, i.intern("value"), t.int_ty);
        t.finish_aggregate(node);
        assert_eq!(t.size_of(node), 16);
        assert_eq!(t.from_ty(node_ptr), Some(node));
    }
}
