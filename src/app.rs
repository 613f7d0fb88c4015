use std::cell::RefCell;
use std::io::{BufRead, BufReader, Write};
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use crate::error::Error;
use crate::interpreter::scope::{ExportMap, Scope, ScopeRef};
use crate::interpreter::value::{Value, ValueCell};
use crate::interpreter::{Interpreter, ModuleImporter};
use crate::parser::Parser;
use crate::source::ReaderLineSource;
use crate::tokenizer::TokenSource;

pub type ModuleInit = Box<dyn Fn() -> Result<FxHashMap<String, Value>, Error>>;

enum ModuleState {
    // sentinel held while a module executes; hitting it again is a cycle
    Loading,
    Loaded(ExportMap),
}

/// The host side of the interpreter: a registry of builtin modules, the
/// cache of loaded modules, and the default scope that files and the REPL
/// inherit their bindings from.
pub struct App {
    me: Weak<App>,
    builtins: RefCell<FxHashMap<String, ModuleInit>>,
    modules: RefCell<FxHashMap<String, ModuleState>>,
    default_scope: ScopeRef,
}

impl App {
    pub fn new() -> Rc<App> {
        Rc::new_cyclic(|me| App {
            me: me.clone(),
            builtins: RefCell::new(FxHashMap::default()),
            modules: RefCell::new(FxHashMap::default()),
            default_scope: Scope::root(),
        })
    }

    fn importer(&self) -> Rc<dyn ModuleImporter> {
        self.me.upgrade().expect("App methods are called through Rc")
    }

    /// Registers a builtin module. The initialiser runs on first import and
    /// its values are wrapped in cells tagged `<builtin>`.
    pub fn define_module(&self, name: &str, init: ModuleInit) {
        self.builtins.borrow_mut().insert(name.to_string(), init);
    }

    /// Binds a single value directly in the default scope.
    pub fn define(&self, name: &str, value: Value) {
        self.default_scope
            .borrow_mut()
            .define(name, ValueCell::builtin(value));
    }

    /// Parses and runs host commands against the default scope itself, so
    /// the bindings they create are inherited by every later module.
    pub fn run_in_default_scope(&self, source: &str) -> Result<(), Error> {
        let mut parser = Parser::new(TokenSource::new(Box::new(ReaderLineSource::new(
            "<builtin>",
            std::io::Cursor::new(source.to_string()),
        ))));
        let mut interp = Interpreter::new(self.default_scope.clone(), self.importer());
        while let Some(stmt) = parser.next_statement()? {
            interp.execute(&stmt)?;
        }
        Ok(())
    }

    /// Executes a module from any reader and returns its exports. The name
    /// doubles as the cache key and the filename in error messages.
    pub fn load<R: BufRead + 'static>(&self, name: &str, input: R) -> Result<ExportMap, Error> {
        {
            let mut modules = self.modules.borrow_mut();
            if modules.contains_key(name) {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("Module {:?} already loaded", name),
                )
                .into());
            }
            modules.insert(name.to_string(), ModuleState::Loading);
        }
        match self.run_module(name, input) {
            Ok(exports) => {
                self.modules
                    .borrow_mut()
                    .insert(name.to_string(), ModuleState::Loaded(exports.clone()));
                Ok(exports)
            }
            Err(err) => {
                // clear the sentinel so a later import retries the load
                self.modules.borrow_mut().remove(name);
                Err(err)
            }
        }
    }

    fn run_module<R: BufRead + 'static>(&self, name: &str, input: R) -> Result<ExportMap, Error> {
        let scope = Scope::module(&self.default_scope);
        let mut parser = Parser::new(TokenSource::new(Box::new(ReaderLineSource::new(
            name, input,
        ))));
        let mut interp = Interpreter::new(scope.clone(), self.importer());
        while let Some(stmt) = parser.next_statement()? {
            interp.execute(&stmt)?;
        }
        let exports = scope.borrow().exports();
        Ok(exports)
    }

    pub fn load_file(&self, path: &str) -> Result<ExportMap, Error> {
        let file = std::fs::File::open(path)?;
        self.load(path, BufReader::new(file))
    }

    /// The read-eval loop: prompt, parse one statement, run it. Handled
    /// errors are printed to `output` and the rest of the offending line is
    /// discarded; anything else ends the session.
    pub fn load_interactive<R: BufRead + 'static>(
        &self,
        input: R,
        output: Rc<RefCell<dyn Write>>,
    ) -> Result<ExportMap, Error> {
        let scope = Scope::module(&self.default_scope);
        let prompt_output = output.clone();
        let source = ReaderLineSource::with_prompt(
            "<stdin>",
            input,
            Box::new(move || {
                let mut out = prompt_output.borrow_mut();
                write!(out, "> ")?;
                out.flush()
            }),
        );
        let mut parser = Parser::new(TokenSource::new(Box::new(source)));
        let mut interp = Interpreter::new(scope.clone(), self.importer());
        loop {
            let result = match parser.next_statement() {
                Ok(None) => break,
                Ok(Some(stmt)) => interp.execute(&stmt),
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                if !err.is_handled() {
                    return Err(err);
                }
                writeln!(output.borrow_mut(), "{}", err)?;
                parser.reset_line();
            }
        }
        let exports = scope.borrow().exports();
        Ok(exports)
    }
}

impl ModuleImporter for App {
    fn import(&self, path: &str) -> Result<ExportMap, Error> {
        {
            let modules = self.modules.borrow();
            match modules.get(path) {
                Some(ModuleState::Loading) => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "import cycle detected",
                    )
                    .into());
                }
                Some(ModuleState::Loaded(exports)) => return Ok(exports.clone()),
                None => {}
            }
        }
        let initialised = {
            let builtins = self.builtins.borrow();
            match builtins.get(path) {
                Some(init) => Some(init()?),
                None => None,
            }
        };
        if let Some(values) = initialised {
            let exports: ExportMap = values
                .into_iter()
                .map(|(name, value)| (name, ValueCell::builtin(value)))
                .collect();
            self.modules
                .borrow_mut()
                .insert(path.to_string(), ModuleState::Loaded(exports.clone()));
            return Ok(exports);
        }
        self.load_file(path)
    }
}
