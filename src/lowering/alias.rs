//! Alias/shadow elimination.
//!
//! Gives every declaration (block locals, catch variables, lambda parameters,
//! loop and `using` variables) an identity of its own. A declaration that reuses
//! an identity already bound (`Shadow`: by an enclosing scope; `Alias`: anywhere
//! earlier in the tree) gets a fresh variable, substituted for references within
//! that declaration's scope only.

use std::collections::HashSet;

use crate::options::ScopeMode;
use crate::tree::{CatchBlock, Expr, ExprKind, LambdaExpr, Variable};
use crate::visit::map_children;
use crate::visit::scope_tracker::ScopeTracker;

pub struct AliasEliminator {
    mode: ScopeMode,
    scopes: ScopeTracker<Variable, Variable>,
    seen: HashSet<Variable>,
    renamed: usize,
}

impl AliasEliminator {
    pub fn new(mode: ScopeMode) -> Self {
        Self { mode, scopes: ScopeTracker::with_initial_scope(), seen: HashSet::new(), renamed: 0 }
    }

    /// Treat `vars` as already declared by an enclosing construct.
    pub fn with_outer(mut self, vars: &[Variable]) -> Self {
        for v in vars {
            self.scopes.insert(v.clone(), v.clone());
            self.seen.insert(v.clone());
        }
        self
    }

    /// Number of declarations that received a fresh identity.
    pub fn renamed(&self) -> usize {
        self.renamed
    }

    fn declare(&mut self, var: &Variable) -> Variable {
        let conflict = match self.mode {
            ScopeMode::Alias => self.seen.contains(var),
            ScopeMode::Shadow => self.scopes.contains(var),
        };
        let bound = if conflict {
            self.renamed += 1;
            var.fresh_like()
        } else {
            var.clone()
        };
        self.scopes.insert(var.clone(), bound.clone());
        self.seen.insert(bound.clone());
        bound
    }

    fn declare_all(&mut self, vars: &[Variable]) -> (Vec<Variable>, bool) {
        let bound: Vec<Variable> = vars.iter().map(|v| self.declare(v)).collect();
        let changed = bound.iter().zip(vars).any(|(a, b)| a != b);
        (bound, changed)
    }

    fn rewrite_all(&mut self, exprs: &[Expr]) -> (Vec<Expr>, bool) {
        let out: Vec<Expr> = exprs.iter().map(|e| self.rewrite(e)).collect();
        let changed = out.iter().zip(exprs).any(|(a, b)| !a.ptr_eq(b));
        (out, changed)
    }

    pub fn rewrite_lambda(&mut self, lambda: &LambdaExpr) -> LambdaExpr {
        self.scopes.push_scope();
        let (params, _) = self.declare_all(&lambda.params);
        let body = self.rewrite(&lambda.body);
        self.scopes.pop_scope();
        LambdaExpr { params, body, ..lambda.clone() }
    }

    pub fn rewrite(&mut self, expr: &Expr) -> Expr {
        match expr.kind() {
            ExprKind::Parameter(v) => match self.scopes.lookup(v) {
                Some(bound) if bound != v => Expr::new(ExprKind::Parameter(bound.clone())),
                _ => expr.clone(),
            },
            ExprKind::Block { ty, variables, exprs } => {
                self.scopes.push_scope();
                let (variables, vars_changed) = self.declare_all(variables);
                let (exprs, changed) = self.rewrite_all(exprs);
                self.scopes.pop_scope();
                if !vars_changed && !changed {
                    return expr.clone();
                }
                Expr::new(ExprKind::Block { ty: ty.clone(), variables, exprs })
            }
            ExprKind::Lambda(lambda) => {
                let params_before = lambda.params.clone();
                let out = self.rewrite_lambda(lambda);
                if out.body.ptr_eq(&lambda.body) && out.params == params_before {
                    return expr.clone();
                }
                Expr::new(ExprKind::Lambda(out))
            }
            ExprKind::Try { ty, body, handlers, finally, fault } => {
                let new_body = self.rewrite(body);
                let mut changed = !new_body.ptr_eq(body);
                let mut new_handlers = Vec::with_capacity(handlers.len());
                for h in handlers {
                    self.scopes.push_scope();
                    let variable = h.variable.as_ref().map(|v| self.declare(v));
                    let filter = h.filter.as_ref().map(|f| self.rewrite(f));
                    let handler_body = self.rewrite(&h.body);
                    self.scopes.pop_scope();
                    changed |= variable != h.variable
                        || !handler_body.ptr_eq(&h.body)
                        || filter.as_ref().zip(h.filter.as_ref()).is_some_and(|(a, b)| !a.ptr_eq(b));
                    new_handlers.push(CatchBlock { test: h.test.clone(), variable, filter, body: handler_body });
                }
                let new_finally = finally.as_ref().map(|f| self.rewrite(f));
                let new_fault = fault.as_ref().map(|f| self.rewrite(f));
                changed |= new_finally.as_ref().zip(finally.as_ref()).is_some_and(|(a, b)| !a.ptr_eq(b))
                    || new_fault.as_ref().zip(fault.as_ref()).is_some_and(|(a, b)| !a.ptr_eq(b));
                if !changed {
                    return expr.clone();
                }
                Expr::new(ExprKind::Try {
                    ty: ty.clone(),
                    body: new_body,
                    handlers: new_handlers,
                    finally: new_finally,
                    fault: new_fault,
                })
            }
            ExprKind::For { variables, .. } => {
                self.scopes.push_scope();
                let (new_vars, vars_changed) = self.declare_all(variables);
                let rebuilt = map_children(expr, |c| self.rewrite(c));
                self.scopes.pop_scope();
                if !vars_changed {
                    return rebuilt;
                }
                match rebuilt.kind() {
                    ExprKind::For { initializers, test, steppers, body, break_label, continue_label, .. } => {
                        Expr::new(ExprKind::For {
                            variables: new_vars,
                            initializers: initializers.clone(),
                            test: test.clone(),
                            steppers: steppers.clone(),
                            body: body.clone(),
                            break_label: break_label.clone(),
                            continue_label: continue_label.clone(),
                        })
                    }
                    _ => rebuilt,
                }
            }
            ExprKind::ForEach { variable, collection, body, break_label, continue_label } => {
                let new_collection = self.rewrite(collection);
                self.scopes.push_scope();
                let new_variable = self.declare(variable);
                let new_body = self.rewrite(body);
                self.scopes.pop_scope();
                if new_variable == *variable && new_collection.ptr_eq(collection) && new_body.ptr_eq(body) {
                    return expr.clone();
                }
                Expr::new(ExprKind::ForEach {
                    variable: new_variable,
                    collection: new_collection,
                    body: new_body,
                    break_label: break_label.clone(),
                    continue_label: continue_label.clone(),
                })
            }
            ExprKind::Using { variable, resource, body, dispose } => {
                let new_resource = self.rewrite(resource);
                self.scopes.push_scope();
                let new_variable = variable.as_ref().map(|v| self.declare(v));
                let new_body = self.rewrite(body);
                self.scopes.pop_scope();
                if new_variable == *variable && new_resource.ptr_eq(resource) && new_body.ptr_eq(body) {
                    return expr.clone();
                }
                Expr::new(ExprKind::Using {
                    variable: new_variable,
                    resource: new_resource,
                    body: new_body,
                    dispose: dispose.clone(),
                })
            }
            _ => map_children(expr, |c| self.rewrite(c)),
        }
    }
}

/// Run the eliminator over a lambda; its parameters count as outer declarations.
pub fn eliminate_in_lambda(lambda: &LambdaExpr, mode: ScopeMode) -> LambdaExpr {
    let mut eliminator = AliasEliminator::new(mode).with_outer(&lambda.params);
    let body = eliminator.rewrite(&lambda.body);
    tracing::debug!(
        target: "exprlower::alias",
        lambda = lambda.display_name(),
        mode = ?mode,
        renamed = eliminator.renamed(),
        "eliminated reused variable identities"
    );
    LambdaExpr { body, ..lambda.clone() }
}

pub fn eliminate_aliases(expr: &Expr, mode: ScopeMode) -> Expr {
    AliasEliminator::new(mode).rewrite(expr)
}
