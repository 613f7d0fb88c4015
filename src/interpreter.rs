pub mod ops;
pub mod scope;
pub mod value;

use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::ast::{BinaryOp, Expression, Statement, Var};
use crate::error::{ControlError, ControlKind, Error, RuntimeError};
use crate::tokenizer::Token;

use self::ops::binary_op;
use self::scope::{ExportMap, Scope, ScopeRef};
use self::value::{CellRef, Func, Proc, UserRoutine, Value, ValueCell};

/// Resolves `import` paths to export tables. The host application supplies
/// the one implementation; user procs and funcs carry it along so module
/// statements keep working inside call bodies.
pub trait ModuleImporter {
    fn import(&self, path: &str) -> Result<ExportMap, Error>;
}

/// Walks statements and expressions against a scope. Control flow travels
/// up the error channel as `Error::Control`; loops and calls consume the
/// kinds they expect and everything else keeps bubbling.
pub struct Interpreter {
    scope: ScopeRef,
    importer: Rc<dyn ModuleImporter>,
}

impl Interpreter {
    pub fn new(scope: ScopeRef, importer: Rc<dyn ModuleImporter>) -> Self {
        Interpreter { scope, importer }
    }

    pub fn scope(&self) -> &ScopeRef {
        &self.scope
    }

    pub fn run_all(&mut self, stmts: &[Statement]) -> Result<(), Error> {
        for stmt in stmts {
            self.execute(stmt)?;
        }
        Ok(())
    }

    fn run_in_scope(&mut self, scope: ScopeRef, stmts: &[Statement]) -> Result<(), Error> {
        let prev = std::mem::replace(&mut self.scope, scope);
        let result = self.run_all(stmts);
        self.scope = prev;
        result
    }

    fn already_defined(&self, var: &Var, cell: &CellRef) -> Error {
        let def = cell.borrow().def.clone();
        RuntimeError::new(
            &var.token,
            format!(
                "Variable {} already defined on file {:?}, line {}",
                var.name, def.filename, def.lineno
            ),
        )
        .into()
    }

    fn truth_value(&mut self, expr: &Expression, token: &Token, what: &str) -> Result<bool, Error> {
        match self.evaluate(expr)? {
            Value::Bool(value) => Ok(value),
            other => Err(RuntimeError::new(
                token,
                format!("{} requires a truth value, got {} instead.", what, other),
            )
            .into()),
        }
    }

    pub fn execute(&mut self, stmt: &Statement) -> Result<(), Error> {
        match stmt {
            Statement::Var { vars, .. } => {
                for (var, init) in vars {
                    let existing = self.scope.borrow().lookup(&var.name);
                    if let Some(cell) = existing {
                        return Err(self.already_defined(var, &cell));
                    }
                    let cell = match init {
                        Some(expr) => {
                            let value = self.evaluate(expr)?;
                            ValueCell::with_value(var.token.line.clone(), value)
                        }
                        None => ValueCell::uninitialized(var.token.line.clone()),
                    };
                    self.scope.borrow_mut().define(&var.name, cell);
                }
                Ok(())
            }
            Statement::Assignment { lhs, rhs, .. } => {
                let cell = self.scope.borrow().lookup(&lhs.name);
                let cell = cell.ok_or_else(|| {
                    RuntimeError::new(&lhs.token, format!("Variable {} not defined", lhs.name))
                })?;
                let value = self.evaluate(rhs)?;
                cell.borrow_mut().value = Some(value);
                Ok(())
            }
            Statement::ProcCall { token, proc, args } => {
                let callee = match self.evaluate(proc)? {
                    Value::Proc(proc) => proc,
                    other => {
                        return Err(RuntimeError::new(
                            token,
                            format!(
                                "Procedure call without procedure value. Unexpected value {}",
                                other
                            ),
                        )
                        .into());
                    }
                };
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate(arg)?);
                }
                callee.call(&self.importer, token, values)
            }
            Statement::If {
                token,
                test,
                body,
                else_body,
            } => {
                let branch = if self.truth_value(test, token, "if statement")? {
                    body
                } else {
                    else_body
                };
                if branch.is_empty() {
                    return Ok(());
                }
                self.run_in_scope(Scope::fork(&self.scope), branch)
            }
            Statement::While { token, test, body } => loop {
                let fork = Scope::fork(&self.scope);
                let prev = std::mem::replace(&mut self.scope, fork);
                let result: Result<bool, Error> = (|| {
                    if !self.truth_value(test, token, "while statement")? {
                        return Ok(false);
                    }
                    self.run_all(body)?;
                    Ok(true)
                })();
                self.scope = prev;
                match result {
                    Ok(true) => continue,
                    Ok(false) => return Ok(()),
                    Err(Error::Control(signal)) if signal.kind == ControlKind::Break => {
                        return Ok(());
                    }
                    Err(Error::Control(signal)) if signal.kind == ControlKind::Next => continue,
                    Err(err) => return Err(err),
                }
            },
            Statement::ProcDef {
                token,
                name,
                params,
                body,
            } => self.define_routine(token, name, params, body, true),
            Statement::FuncDef {
                token,
                name,
                params,
                body,
            } => self.define_routine(token, name, params, body, false),
            Statement::Return { token, expr } => {
                let value = self.evaluate(expr)?;
                Err(ControlError::new(token, ControlKind::Return, Some(value)).into())
            }
            Statement::Control { token, kind } => {
                Err(ControlError::new(token, *kind, None).into())
            }
            Statement::Undefine { vars, .. } => {
                for var in vars {
                    if self.scope.borrow().lookup(&var.name).is_none() {
                        return Err(RuntimeError::new(
                            &var.token,
                            format!("Variable {} already not defined", var.name),
                        )
                        .into());
                    }
                }
                for var in vars {
                    Scope::remove(&self.scope, &var.name);
                }
                Ok(())
            }
            Statement::Export { token, vars } => {
                let root = Scope::module_root(&self.scope);
                if !root.borrow().exports_enabled() {
                    return Err(RuntimeError::new(token, "Unexpected export").into());
                }
                for var in vars {
                    let exported = root.borrow().exported(&var.name);
                    if let Some(cell) = exported {
                        let def = cell.borrow().def.clone();
                        return Err(RuntimeError::new(
                            &var.token,
                            format!(
                                "Exported variable \"{}\" already exported on file {:?}, line {}",
                                var.name, def.filename, def.lineno
                            ),
                        )
                        .into());
                    }
                }
                for var in vars {
                    let cell = root.borrow().local_cell(&var.name);
                    let cell = cell.ok_or_else(|| {
                        RuntimeError::new(&var.token, format!("Variable {} not defined", var.name))
                    })?;
                    root.borrow_mut().add_export(&var.name, cell);
                }
                Ok(())
            }
            Statement::Import {
                token,
                path,
                prefix,
            } => {
                let root = Scope::module_root(&self.scope);
                if !root.borrow().is_module_frame() {
                    return Err(RuntimeError::new(token, "Unexpected import").into());
                }
                let exports = self
                    .importer
                    .import(path)
                    .map_err(|err| RuntimeError::new(token, err.to_string()))?;
                let bound = |name: &str| match prefix {
                    Some(prefix) => format!("{}_{}", prefix.name, name),
                    None => name.to_string(),
                };
                for name in exports.keys() {
                    let target = bound(name);
                    let existing = root.borrow().local_cell(&target);
                    if let Some(cell) = existing {
                        let def = cell.borrow().def.clone();
                        return Err(RuntimeError::new(
                            token,
                            format!(
                                "Import defines {}, but {} already defined on file {:?}, line {}",
                                target, target, def.filename, def.lineno
                            ),
                        )
                        .into());
                    }
                }
                let mut introduced = FxHashSet::default();
                for (name, cell) in exports.iter() {
                    let target = bound(name);
                    // importers get their own cells: assigning to an
                    // imported name must not write through to the exporter
                    let snapshot = cell.borrow().snapshot();
                    root.borrow_mut().define(&target, snapshot);
                    introduced.insert(target);
                }
                root.borrow_mut().record_import(path, introduced);
                Ok(())
            }
            Statement::Unimport { token, path } => {
                let root = Scope::module_root(&self.scope);
                if !root.borrow().is_module_frame() {
                    return Err(RuntimeError::new(token, "Unexpected unimport").into());
                }
                let names = root.borrow().imported_names(path);
                let names = names.ok_or_else(|| {
                    RuntimeError::new(token, format!("Module {:?} not imported", path))
                })?;
                let mut frame = root.borrow_mut();
                // names undefined in the meantime are simply gone already
                for name in names {
                    frame.remove_local(&name);
                }
                frame.drop_import_record(path);
                Ok(())
            }
        }
    }

    fn define_routine(
        &mut self,
        token: &Token,
        name: &Var,
        params: &[Var],
        body: &Rc<Vec<Statement>>,
        is_proc: bool,
    ) -> Result<(), Error> {
        let existing = self.scope.borrow().lookup(&name.name);
        if let Some(cell) = existing {
            return Err(self.already_defined(name, &cell));
        }
        let cell = ValueCell::uninitialized(token.line.clone());
        self.scope.borrow_mut().define(&name.name, cell.clone());
        // the routine captures a flattened snapshot, and the snapshot has to
        // include the routine's own cell so recursion works
        let routine = UserRoutine {
            def: token.clone(),
            name: name.name.clone(),
            scope: Scope::flatten(&self.scope),
            params: params.to_vec(),
            body: body.clone(),
        };
        cell.borrow_mut().value = Some(if is_proc {
            Value::Proc(Rc::new(Proc::User(routine)))
        } else {
            Value::Func(Rc::new(Func::User(routine)))
        });
        Ok(())
    }

    pub fn evaluate(&mut self, expr: &Expression) -> Result<Value, Error> {
        match expr {
            Expression::Var(var) => {
                let cell = self.scope.borrow().lookup(&var.name);
                let cell = cell.ok_or_else(|| {
                    RuntimeError::new(&var.token, format!("Variable {} not defined", var.name))
                })?;
                let value = cell.borrow().value.clone();
                value.ok_or_else(|| {
                    RuntimeError::new(
                        &var.token,
                        format!("Variable {} defined but not initialized", var.name),
                    )
                    .into()
                })
            }
            Expression::Str { value, .. } => Ok(Value::Str(value.clone())),
            Expression::Number { value, .. } => Ok(Value::Number(value.clone())),
            Expression::Bool { value, .. } => Ok(Value::Bool(*value)),
            Expression::Not { token, expr } => match self.evaluate(expr)? {
                Value::Bool(value) => Ok(Value::Bool(!value)),
                other => Err(RuntimeError::new(
                    token,
                    format!("not statement requires a truth value, got {} instead.", other),
                )
                .into()),
            },
            Expression::Negative { token, expr } => match self.evaluate(expr)? {
                Value::Number(value) => Ok(Value::number(-&*value)),
                other => Err(RuntimeError::new(
                    token,
                    format!("negative requires a number, got {} instead.", other),
                )
                .into()),
            },
            Expression::Op {
                token,
                op,
                left,
                right,
            } => {
                if matches!(op, BinaryOp::And | BinaryOp::Or) {
                    return self.combine_bool(token, *op, left, right);
                }
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                binary_op(token, *op, &left, &right)
            }
            Expression::Index { token, .. } => {
                Err(RuntimeError::new(token, "indexing is not supported").into())
            }
            Expression::FuncCall {
                token,
                callee,
                args,
            } => {
                let callee = match self.evaluate(callee)? {
                    Value::Func(func) => func,
                    other => {
                        return Err(RuntimeError::new(
                            token,
                            format!(
                                "Function call without function value. Unexpected value {}",
                                other
                            ),
                        )
                        .into());
                    }
                };
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate(arg)?);
                }
                callee.call(&self.importer, token, values)
            }
        }
    }

    // Short-circuit: a decided left side is returned as-is; otherwise the
    // right side's value is the result, whatever its kind.
    fn combine_bool(
        &mut self,
        token: &Token,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
    ) -> Result<Value, Error> {
        let left = match self.evaluate(left)? {
            Value::Bool(value) => value,
            _ => {
                return Err(RuntimeError::new(
                    token,
                    format!("Operation \"{}\" expects truth value on left side.", op),
                )
                .into());
            }
        };
        if (op == BinaryOp::Or && left) || (op == BinaryOp::And && !left) {
            return Ok(Value::Bool(left));
        }
        self.evaluate(right)
    }
}
