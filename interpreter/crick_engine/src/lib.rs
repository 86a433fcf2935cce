//! The crick interpreter core.
//!
//! Everything mutable (the arena, the type registry, the string table,
//! the symbol tables, the value slab, the call stack) lives in one
//! [`Engine`] aggregate threaded into every call; there are no
//! module-level singletons. Source is tokenized once, then parsed and
//! evaluated on demand directly against the arena: there is no bytecode
//! or AST pass.

pub mod arena;
pub mod error;
pub mod expr;
pub mod op;
pub mod parse;
pub mod parser;
pub mod table;
pub mod ty;
pub mod value;
pub mod variable;

mod native;

pub use error::{Fail, FailKind, Result};
pub use native::NativeFn;
pub use parser::{Parser, RunMode, TokenSpan};
pub use value::ValueId;

use crate::arena::{Arena, ArenaMark, ByteRef};
use crate::table::SymTable;
use crate::ty::{BaseType, TypeId, Types};
use crate::value::Values;
use crick_abi::data_layout::DataLayout;
use crick_lexer::{tokenize, Interner, Symbol};
use crick_utils::{idx::Idx, index_vec::IdxVec};
use rustc_hash::{FxHashMap, FxHashSet};
use std::rc::Rc;
use tracing::{debug, instrument};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// Index of a function definition in the engine's function table.
pub struct FuncId(u32);

impl Idx for FuncId {
    fn new(idx: usize) -> Self {
        FuncId(idx as u32)
    }

    fn idx(&self) -> usize {
        self.0 as usize
    }
}

impl FuncId {
    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn from_raw(raw: u32) -> FuncId {
        FuncId(raw)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// Index of a macro definition in the engine's macro table.
pub struct MacroId(u32);

impl Idx for MacroId {
    fn new(idx: usize) -> Self {
        MacroId(idx as u32)
    }

    fn idx(&self) -> usize {
        self.0 as usize
    }
}

impl MacroId {
    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn from_raw(raw: u32) -> MacroId {
        MacroId(raw)
    }
}

/// A function definition: signature plus either a body snapshot or a
/// native entry point.
pub struct FuncDef {
    pub ret: TypeId,
    pub params: Vec<(Symbol, TypeId)>,
    pub varargs: bool,
    pub body: Option<TokenSpan>,
    pub intrinsic: Option<NativeFn>,
}

/// A `#define` macro: parameter names and the body token span, reparsed
/// in the caller's context at each use.
pub struct MacroDef {
    pub params: Vec<Symbol>,
    pub body: TokenSpan,
}

/// A function call's stack frame.
pub struct Frame {
    pub func_name: Symbol,
    /// Where the callee's `return` statement delivers its value.
    pub return_value: ValueId,
    /// The evaluated argument values (freed when the frame pops).
    pub params: Vec<ValueId>,
    /// Parameters and locals visible inside the call.
    pub locals: SymTable,
}

#[derive(Clone, Debug)]
pub struct EngineOptions {
    /// Size in bytes of the arena backing all interpreted storage.
    pub stack_size: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            stack_size: 128 * 1024,
        }
    }
}

/// The entire state of one interpreter instance.
pub struct Engine {
    pub options: EngineOptions,
    pub interner: Interner,
    pub arena: Arena,
    pub types: Types,
    pub values: Values,
    pub funcs: IdxVec<FuncId, FuncDef>,
    pub macros: IdxVec<MacroId, MacroDef>,
    /// File-scope variables, functions (under plain and mangled names),
    /// macros and typedefs.
    pub globals: SymTable,
    /// Canonical value for each distinct string literal.
    pub string_lits: FxHashMap<Symbol, ValueId>,
    /// variable name → struct type name, recorded at declaration so that
    /// member-call mangling can resolve `v.m()` without re-parsing types.
    pub var_types: FxHashMap<Symbol, Symbol>,
    /// Include names registered by the embedder; `#include` accepts these
    /// and rejects everything else.
    pub includes: FxHashSet<Symbol>,
    pub frames: Vec<Frame>,
    /// Set by a top-level `return` or by `exit()`.
    pub exit_value: Option<i64>,
    /// The pre-interned `this` identifier.
    pub sym_this: Symbol,
    base_mark: ArenaMark,
}

impl Engine {
    pub fn new(options: EngineOptions) -> Engine {
        let mut interner = Interner::new();
        let sym_this = interner.intern("this");
        let arena = Arena::new(options.stack_size);
        let base_mark = arena.mark();
        Engine {
            options,
            interner,
            arena,
            types: Types::new(DataLayout::default()),
            values: Values::new(),
            funcs: IdxVec::new(),
            macros: IdxVec::new(),
            globals: SymTable::new(),
            string_lits: FxHashMap::default(),
            var_types: FxHashMap::default(),
            includes: FxHashSet::default(),
            frames: Vec::new(),
            exit_value: None,
            sym_this,
            base_mark,
        }
    }

    /// Tokenize and run `source`. Definitions persist across calls, so an
    /// embedder can feed several sources into one engine. On error the
    /// engine has already been [`Engine::recover`]ed and is usable again.
    #[instrument(skip(self, source))]
    pub fn run(&mut self, file_name: &str, source: &str) -> Result<()> {
        let file: Rc<str> = file_name.into();
        let tokens = match tokenize(source, &mut self.interner) {
            Ok(t) => t,
            Err(e) => {
                return Err(Fail::at(
                    file,
                    e.pos,
                    FailKind::Lex(e.to_string()),
                ))
            }
        };
        let mut p = Parser::new(tokens.into(), file);

        let result = self.statement_loop(&mut p);
        match result {
            Err(Fail {
                kind: FailKind::Exit(code),
                ..
            }) => {
                self.exit_value = Some(code);
                self.recover();
                Ok(())
            }
            Err(e) => {
                self.recover();
                Err(e)
            }
            Ok(()) => Ok(()),
        }
    }

    fn statement_loop(&mut self, p: &mut Parser) -> Result<()> {
        loop {
            match parse::parse_statement(self, p, true)? {
                parse::ParseResult::Ok => {
                    if self.exit_value.is_some() {
                        return Ok(());
                    }
                    if p.mode == RunMode::Return {
                        // a top-level return ends the program
                        return Ok(());
                    }
                }
                parse::ParseResult::Eof => return Ok(()),
                parse::ParseResult::Error => {
                    return Err(p.fail(FailKind::Syntax("parse error")));
                }
            }
        }
    }

    /// Run the program's `main()` (if defined) and return its result.
    pub fn call_main(&mut self) -> Result<Option<i64>> {
        let sym_main = self.interner.intern("main");
        let Some(func_val) = self.globals.get(sym_main) else {
            return Ok(None);
        };
        if self.types.base(self.cell(func_val).ty) != BaseType::Function {
            return Ok(None);
        }
        let func_id = FuncId::from_raw(self.read_def_payload(func_val));
        match expr::call::call_toplevel(self, sym_main, func_id) {
            Ok(v) => Ok(v),
            Err(Fail {
                kind: FailKind::Exit(code),
                ..
            }) => {
                self.recover();
                Ok(Some(code))
            }
            Err(e) => {
                self.recover();
                Err(e)
            }
        }
    }

    /// Rewind after a fatal error: drop every open frame, release the
    /// whole stack side of the arena, and sweep value descriptors that
    /// are no longer reachable from any table.
    pub fn recover(&mut self) {
        self.frames.clear();
        self.arena.rewind(self.base_mark);

        let mut reachable: FxHashSet<ValueId> = FxHashSet::default();
        reachable.extend(self.globals.values());
        reachable.extend(self.string_lits.values().copied());

        let doomed: Vec<ValueId> = self
            .values
            .live_ids()
            .filter(|id| !reachable.contains(id))
            .collect();
        debug!(swept = doomed.len(), "recover sweep");
        for id in doomed {
            // stack payloads are already gone with the rewind; detached
            // payloads of orphaned temporaries are returned to the free
            // lists
            let cell = self.values.remove(id);
            if cell.payload_detached {
                self.arena.free_detached(cell.payload);
            }
        }
    }

    /// Register an include name so `#include "<name>"` is accepted.
    pub fn allow_include(&mut self, name: &str) {
        let sym = self.interner.intern(name);
        self.includes.insert(sym);
    }

    ////////// test and embedder probes //////////

    /// Look up a file-scope name.
    pub fn lookup_global(&mut self, name: &str) -> Option<ValueId> {
        let sym = self.interner.intern(name);
        self.globals.get(sym)
    }

    /// The integer value of a file-scope variable.
    pub fn global_int(&mut self, name: &str) -> Option<i64> {
        self.lookup_global(name).map(|id| self.read_int(id))
    }

    /// The floating-point value of a file-scope variable.
    pub fn global_fp(&mut self, name: &str) -> Option<f64> {
        self.lookup_global(name).map(|id| self.read_fp(id))
    }

    /// The bytes of the nul-terminated string a file-scope `char*`
    /// variable points at.
    pub fn global_cstr(&mut self, name: &str) -> Option<String> {
        let id = self.lookup_global(name)?;
        let target = self.read_ptr(id);
        if target == ByteRef::NULL {
            return None;
        }
        let len = self.arena.c_strlen(target);
        Some(String::from_utf8_lossy(self.arena.bytes(target, len)).into_owned())
    }

    /// The arena stack depth; tests use this to assert the no-leak
    /// property across evaluations.
    pub fn stack_depth(&self) -> usize {
        self.arena.stack_depth()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(EngineOptions::default())
    }
}
