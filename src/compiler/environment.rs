use std::{
    collections::{hash_map::Entry, HashMap},
    iter, mem,
};

use lasso::{Rodeo, Spur};

use super::SemanticError;

/// What a resolved identifier names, with every address known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Inlined as a literal wherever it is used
    Constant { value: i64 },
    /// Offset within the declaring block's activation frame
    Variable { address: i64 },
    /// Code address of the procedure's block
    Procedure { entry: usize },
}

impl Binding {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Constant { .. } => "constant",
            Self::Variable { .. } => "variable",
            Self::Procedure { .. } => "procedure",
        }
    }
}

/// A successful lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub binding: Binding,
    /// nesting depth of the declaring block
    pub level: usize,
    /// current depth minus the declaring depth
    pub level_difference: usize,
}

#[derive(Debug, Clone, Copy)]
enum Declared {
    Bound(Binding),
    // a procedure whose code address is not known yet
    PendingProcedure,
}

#[derive(Debug, Clone, Copy)]
struct Symbol {
    declared: Declared,
    level: usize,
}

/// Refers to a declared procedure whose entry address is still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcedureHandle {
    scope: usize,
    name: Spur,
}

#[derive(Debug)]
struct Scope {
    symbols: HashMap<Spur, Symbol>,
    frame_size: i64,
}

impl Scope {
    fn new(frame_base: i64) -> Self {
        Self {
            symbols: HashMap::new(),
            frame_size: frame_base,
        }
    }
}

/// Nested-scope symbol table used during code generation.
///
/// A fresh table holds the program block's scope. Every procedure block pushes
/// a scope on entry and pops it on exit; lookups walk from the innermost scope
/// outward so inner declarations shadow outer ones.
#[derive(Debug)]
pub struct SymbolTable {
    names: Rodeo,
    current: Scope,
    // enclosing scopes, outermost first
    outer: Vec<Scope>,
    frame_base: i64,
}

impl SymbolTable {
    /// `frame_base` is the first variable address of every frame, leaving the
    /// cells below it to the machine's frame linkage.
    pub fn new(frame_base: u32) -> Self {
        let frame_base = i64::from(frame_base);
        Self {
            names: Rodeo::new(),
            current: Scope::new(frame_base),
            outer: vec![],
            frame_base,
        }
    }

    pub fn enter_scope(&mut self) {
        let enclosing = mem::replace(&mut self.current, Scope::new(self.frame_base));
        self.outer.push(enclosing);
    }

    /// Forgets everything declared since the matching [`Self::enter_scope`].
    /// The program's own scope is never left.
    pub fn leave_scope(&mut self) {
        if let Some(enclosing) = self.outer.pop() {
            self.current = enclosing;
        }
    }

    /// Nesting depth of the innermost scope (the program block is 0).
    pub fn depth(&self) -> usize {
        self.outer.len()
    }

    /// Cells the innermost block's frame needs.
    pub fn frame_size(&self) -> i64 {
        self.current.frame_size
    }

    fn scope_mut(&mut self, depth: usize) -> Option<&mut Scope> {
        if depth == self.outer.len() {
            Some(&mut self.current)
        } else {
            self.outer.get_mut(depth)
        }
    }

    fn declare(&mut self, name: &str, declared: Declared) -> Result<Spur, SemanticError> {
        let level = self.depth();
        let key = self.names.get_or_intern(name);
        match self.current.symbols.entry(key) {
            Entry::Occupied(_) => Err(SemanticError::DuplicateDeclaration(name.into())),
            Entry::Vacant(slot) => {
                slot.insert(Symbol { declared, level });
                Ok(key)
            }
        }
    }

    pub fn declare_constant(&mut self, name: &str, value: i64) -> Result<(), SemanticError> {
        self.declare(name, Declared::Bound(Binding::Constant { value }))?;
        Ok(())
    }

    /// Returns the frame address given to the variable.
    pub fn declare_variable(&mut self, name: &str) -> Result<i64, SemanticError> {
        let address = self.current.frame_size;
        self.declare(name, Declared::Bound(Binding::Variable { address }))?;
        self.current.frame_size += 1;
        Ok(address)
    }

    /// Declares a procedure whose entry is given later through the handle.
    pub fn declare_procedure(&mut self, name: &str) -> Result<ProcedureHandle, SemanticError> {
        let name = self.declare(name, Declared::PendingProcedure)?;
        Ok(ProcedureHandle {
            scope: self.depth(),
            name,
        })
    }

    /// Materializes a procedure's entry address.
    ///
    /// The handle's scope must still be live, which holds while the procedure's
    /// own body is being generated.
    pub fn fix_procedure(&mut self, handle: ProcedureHandle, entry: usize) {
        let symbol = self
            .scope_mut(handle.scope)
            .and_then(|scope| scope.symbols.get_mut(&handle.name));
        if let Some(symbol) = symbol {
            symbol.declared = Declared::Bound(Binding::Procedure { entry });
        }
    }

    /// Looks `name` up from the innermost scope outward. Procedures resolve only
    /// once their entry has been fixed.
    pub fn resolve(&self, name: &str) -> Result<Resolved, SemanticError> {
        let undeclared = || SemanticError::UndeclaredIdentifier(name.into());
        let key = self.names.get(name).ok_or_else(undeclared)?;
        let symbol = iter::once(&self.current)
            .chain(self.outer.iter().rev())
            .find_map(|scope| scope.symbols.get(&key))
            .ok_or_else(undeclared)?;
        match symbol.declared {
            Declared::Bound(binding) => Ok(Resolved {
                binding,
                level: symbol.level,
                level_difference: self.depth() - symbol.level,
            }),
            Declared::PendingProcedure => Err(SemanticError::UnresolvedProcedure(name.into())),
        }
    }
}
