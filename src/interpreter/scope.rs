use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use super::value::CellRef;

pub type ScopeRef = Rc<RefCell<Scope>>;
pub type ExportMap = FxHashMap<String, CellRef>;

#[derive(Clone)]
enum Binding {
    Cell(CellRef),
    // left behind by undefine in a fork frame to mask an outer binding
    Tombstone,
}

// Present only on module top-level frames. `exports` is None until the frame
// is allowed to export (the host's default scope imports but never exports).
struct ModuleFrame {
    exports: Option<ExportMap>,
    imports: FxHashMap<String, FxHashSet<String>>,
}

/// One frame of the scope chain. A frame without a parent is a flat frame:
/// either a module top level (carrying the module bookkeeping) or a closure
/// snapshot produced by `flatten` (carrying none). A frame with a parent is
/// a fork frame wrapping one block's dynamic extent.
pub struct Scope {
    vars: FxHashMap<String, Binding>,
    parent: Option<ScopeRef>,
    module: Option<ModuleFrame>,
}

impl Scope {
    /// A module frame that may import but not export. Hosts use this as the
    /// default scope that files and the REPL inherit from.
    pub fn root() -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            vars: FxHashMap::default(),
            parent: None,
            module: Some(ModuleFrame {
                exports: None,
                imports: FxHashMap::default(),
            }),
        }))
    }

    /// A module top-level frame: the effective view of `base`, plus fresh
    /// module bookkeeping with exports enabled.
    pub fn module(base: &ScopeRef) -> ScopeRef {
        let scope = Scope::flatten(base);
        scope.borrow_mut().module = Some(ModuleFrame {
            exports: Some(ExportMap::default()),
            imports: FxHashMap::default(),
        });
        scope
    }

    pub fn fork(parent: &ScopeRef) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            vars: FxHashMap::default(),
            parent: Some(parent.clone()),
            module: None,
        }))
    }

    /// Snapshots the effective view of a scope chain into a fresh flat
    /// frame. The cells are shared, the mapping is not: later bindings in
    /// the source chain do not leak into the snapshot. The result carries no
    /// module bookkeeping, so closures cannot export or import.
    pub fn flatten(scope: &ScopeRef) -> ScopeRef {
        let mut frames = Vec::new();
        let mut current = scope.clone();
        loop {
            let parent = current.borrow().parent.clone();
            frames.push(current);
            match parent {
                Some(p) => current = p,
                None => break,
            }
        }
        let mut vars = FxHashMap::default();
        for frame in frames.iter().rev() {
            for (name, binding) in frame.borrow().vars.iter() {
                match binding {
                    Binding::Cell(cell) => {
                        vars.insert(name.clone(), Binding::Cell(cell.clone()));
                    }
                    Binding::Tombstone => {
                        vars.remove(name);
                    }
                }
            }
        }
        Rc::new(RefCell::new(Scope {
            vars,
            parent: None,
            module: None,
        }))
    }

    /// The flat frame at the far end of the chain. Module operations act
    /// there no matter how deep the current block nesting is.
    pub fn module_root(scope: &ScopeRef) -> ScopeRef {
        let mut current = scope.clone();
        loop {
            let parent = current.borrow().parent.clone();
            match parent {
                Some(p) => current = p,
                None => return current,
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<CellRef> {
        match self.vars.get(name) {
            Some(Binding::Cell(cell)) => Some(cell.clone()),
            Some(Binding::Tombstone) => None,
            None => self
                .parent
                .as_ref()
                .and_then(|parent| parent.borrow().lookup(name)),
        }
    }

    pub fn define(&mut self, name: &str, cell: CellRef) {
        self.vars.insert(name.to_string(), Binding::Cell(cell));
    }

    /// Removes a name as seen from `scope`. Flat frames drop the entry; fork
    /// frames record a tombstone so the outer binding stays masked. Any
    /// import record for the name on the owning module frame is rescinded,
    /// which makes a later `unimport` skip it.
    pub fn remove(scope: &ScopeRef, name: &str) {
        {
            let mut frame = scope.borrow_mut();
            if frame.parent.is_none() {
                frame.vars.remove(name);
            } else {
                frame.vars.insert(name.to_string(), Binding::Tombstone);
            }
        }
        let root = Scope::module_root(scope);
        let mut root = root.borrow_mut();
        if let Some(module) = root.module.as_mut() {
            for names in module.imports.values_mut() {
                names.remove(name);
            }
        }
    }

    // Module-frame accessors. All of these address the frame they are
    // called on; the evaluator routes through `module_root` first.

    pub fn is_module_frame(&self) -> bool {
        self.module.is_some()
    }

    pub fn exports_enabled(&self) -> bool {
        self.module
            .as_ref()
            .map_or(false, |module| module.exports.is_some())
    }

    pub fn exported(&self, name: &str) -> Option<CellRef> {
        self.module
            .as_ref()
            .and_then(|module| module.exports.as_ref())
            .and_then(|exports| exports.get(name).cloned())
    }

    pub fn add_export(&mut self, name: &str, cell: CellRef) {
        if let Some(exports) = self
            .module
            .as_mut()
            .and_then(|module| module.exports.as_mut())
        {
            exports.insert(name.to_string(), cell);
        }
    }

    pub fn exports(&self) -> ExportMap {
        self.module
            .as_ref()
            .and_then(|module| module.exports.clone())
            .unwrap_or_default()
    }

    /// The cell for `name` on this frame only, ignoring parents.
    pub fn local_cell(&self, name: &str) -> Option<CellRef> {
        match self.vars.get(name) {
            Some(Binding::Cell(cell)) => Some(cell.clone()),
            _ => None,
        }
    }

    pub fn remove_local(&mut self, name: &str) {
        self.vars.remove(name);
    }

    pub fn record_import(&mut self, path: &str, names: FxHashSet<String>) {
        if let Some(module) = self.module.as_mut() {
            module.imports.insert(path.to_string(), names);
        }
    }

    pub fn imported_names(&self, path: &str) -> Option<FxHashSet<String>> {
        self.module
            .as_ref()
            .and_then(|module| module.imports.get(path).cloned())
    }

    pub fn drop_import_record(&mut self, path: &str) {
        if let Some(module) = self.module.as_mut() {
            module.imports.remove(path);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::interpreter::value::{Value, ValueCell};

    fn cell(n: i64) -> CellRef {
        ValueCell::builtin(Value::number_from(n))
    }

    fn value_of(cell: &CellRef) -> Value {
        cell.borrow().value.clone().unwrap()
    }

    fn assert_number(cell: &CellRef, n: i64) {
        match value_of(cell) {
            Value::Number(v) => assert_eq!(*v, num_rational::BigRational::from_integer(n.into())),
            other => panic!("expected number, got {}", other),
        }
    }

    #[test]
    fn test_define_lookup_remove() {
        let scope = Scope::root();
        assert!(scope.borrow().lookup("x").is_none());
        scope.borrow_mut().define("x", cell(1));
        let found = scope.borrow().lookup("x").unwrap();
        assert_number(&found, 1);
        Scope::remove(&scope, "x");
        assert!(scope.borrow().lookup("x").is_none());
    }

    #[test]
    fn test_fork_reads_fall_through() {
        let outer = Scope::root();
        outer.borrow_mut().define("x", cell(1));
        let inner = Scope::fork(&outer);
        assert!(inner.borrow().lookup("x").is_some());
        // writes in the fork stay local
        inner.borrow_mut().define("y", cell(2));
        assert!(outer.borrow().lookup("y").is_none());
    }

    #[test]
    fn test_shared_cells_see_mutation() {
        let outer = Scope::root();
        outer.borrow_mut().define("x", cell(1));
        let inner = Scope::fork(&outer);
        let seen = inner.borrow().lookup("x").unwrap();
        seen.borrow_mut().value = Some(Value::number_from(5));
        let outer_cell = outer.borrow().lookup("x").unwrap();
        assert_number(&outer_cell, 5);
    }

    #[test]
    fn test_tombstone_masks_outer_binding() {
        let outer = Scope::root();
        outer.borrow_mut().define("x", cell(1));
        let inner = Scope::fork(&outer);
        Scope::remove(&inner, "x");
        assert!(inner.borrow().lookup("x").is_none());
        // the outer frame still owns its binding
        assert!(outer.borrow().lookup("x").is_some());
        // redefining over a tombstone works
        inner.borrow_mut().define("x", cell(3));
        assert!(inner.borrow().lookup("x").is_some());
    }

    #[test]
    fn test_flatten_snapshots_the_mapping_but_shares_cells() {
        let outer = Scope::root();
        outer.borrow_mut().define("x", cell(1));
        let flat = Scope::flatten(&outer);
        // bindings added after the snapshot are invisible
        outer.borrow_mut().define("later", cell(2));
        assert!(flat.borrow().lookup("later").is_none());
        // but the shared cell still reflects assignments
        let shared = outer.borrow().lookup("x").unwrap();
        shared.borrow_mut().value = Some(Value::number_from(9));
        let seen = flat.borrow().lookup("x").unwrap();
        assert_number(&seen, 9);
    }

    #[test]
    fn test_flatten_applies_tombstones() {
        let outer = Scope::root();
        outer.borrow_mut().define("x", cell(1));
        let inner = Scope::fork(&outer);
        Scope::remove(&inner, "x");
        let flat = Scope::flatten(&inner);
        assert!(flat.borrow().lookup("x").is_none());
    }

    #[test]
    fn test_flattened_frames_have_no_module_bookkeeping() {
        let root = Scope::root();
        let flat = Scope::flatten(&root);
        assert!(!flat.borrow().is_module_frame());
        assert!(!flat.borrow().exports_enabled());
    }

    #[test]
    fn test_remove_rescinds_import_records() {
        let scope = Scope::root();
        scope.borrow_mut().define("m_x", cell(1));
        scope
            .borrow_mut()
            .record_import("m", ["m_x".to_string()].into_iter().collect());
        Scope::remove(&scope, "m_x");
        let names = scope.borrow().imported_names("m").unwrap();
        assert!(names.is_empty());
    }

    #[test]
    fn test_module_root_walks_forks() {
        let root = Scope::root();
        let fork = Scope::fork(&Scope::fork(&root));
        assert!(Rc::ptr_eq(&Scope::module_root(&fork), &root));
    }
}
