//! Ref-local elimination.
//!
//! A block-local `r` of type `ref T` bound once by `r = ref location` is
//! replaced by the location's access path: the location's operands are
//! evaluated once into temporaries at the binding, and every `r.Value` becomes
//! the path over those temporaries. `r.Invoke(p => body)` is inlined with the
//! path substituted for `p`. Any other use of `r` is malformed.

use crate::diagnostics::{LowerError, Result};
use crate::lowering::substitute::ParameterSubstitutor;
use crate::tree::build::{assign, empty, param};
use crate::tree::{Expr, ExprKind, Type, Variable};
use crate::visit::composers::collect_exprs;
use crate::visit::{Rewriter, walk_rewrite};

#[derive(Default)]
pub struct RefLocalRewriter {
    eliminated: usize,
}

impl RefLocalRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eliminated(&self) -> usize {
        self.eliminated
    }
}

impl Rewriter for RefLocalRewriter {
    fn rewrite_expr(&mut self, expr: &Expr) -> Result<Expr> {
        let expr = walk_rewrite(self, expr)?;
        let ExprKind::Block { ty, variables, exprs } = expr.kind() else {
            return Ok(expr);
        };
        if !variables.iter().any(|v| matches!(v.ty(), Type::Ref(_))) {
            return Ok(expr);
        }

        let mut kept = Vec::with_capacity(variables.len());
        let mut exprs = exprs.clone();
        let mut changed = false;
        for var in variables {
            if !matches!(var.ty(), Type::Ref(_)) {
                kept.push(var.clone());
                continue;
            }
            let bindings = collect_exprs(&Expr::new(ExprKind::Block {
                ty: Type::Void,
                variables: Vec::new(),
                exprs: exprs.clone(),
            }), |k| binding_location(k, var));
            let location = match bindings.as_slice() {
                [] => {
                    kept.push(var.clone());
                    continue;
                }
                [location] => location.clone(),
                _ => return Err(LowerError::internal(format!("ref local '{}' is bound more than once", var.name()))),
            };

            let (temps, inits, path) = access_path(&location)?;
            let mut replacer = RefUseReplacer { local: var, path, inits };
            exprs = exprs.iter().map(|e| replacer.rewrite_expr(e)).collect::<Result<Vec<_>>>()?;
            kept.extend(temps);
            changed = true;
            self.eliminated += 1;
        }
        if !changed {
            return Ok(expr);
        }
        Ok(Expr::new(ExprKind::Block { ty: ty.clone(), variables: kept, exprs }))
    }
}

fn binding_location(kind: &ExprKind, local: &Variable) -> Option<Expr> {
    let ExprKind::Assign { target, value } = kind else { return None };
    if target.as_parameter() != Some(local) {
        return None;
    }
    match value.kind() {
        ExprKind::MakeRef { location } => Some(location.clone()),
        _ => None,
    }
}

/// Pin the location's operands; returns temporaries, their initializers and
/// the path over them.
fn access_path(location: &Expr) -> Result<(Vec<Variable>, Vec<Expr>, Expr)> {
    let mut temps = Vec::new();
    let mut inits = Vec::new();
    let mut pin = |operand: &Expr, name: &str| -> Result<Expr> {
        if matches!(operand.kind(), ExprKind::Constant { .. }) {
            return Ok(operand.clone());
        }
        let t = Variable::new(name, operand.ty());
        inits.push(assign(param(&t), operand.clone())?);
        temps.push(t.clone());
        Ok(param(&t))
    };
    let path = match location.kind() {
        ExprKind::Parameter(_) => location.clone(),
        ExprKind::Member { object, field } => {
            Expr::new(ExprKind::Member { object: pin(object, "ref_object")?, field: field.clone() })
        }
        ExprKind::Index { array, index } => {
            let array = pin(array, "ref_array")?;
            let index = pin(index, "ref_index")?;
            Expr::new(ExprKind::Index { array, index })
        }
        _ => return Err(LowerError::internal(format!("cannot take a reference to {location}"))),
    };
    Ok((temps, inits, path))
}

struct RefUseReplacer<'a> {
    local: &'a Variable,
    path: Expr,
    inits: Vec<Expr>,
}

impl Rewriter for RefUseReplacer<'_> {
    fn rewrite_expr(&mut self, expr: &Expr) -> Result<Expr> {
        match expr.kind() {
            ExprKind::Assign { target, value }
                if target.as_parameter() == Some(self.local) && matches!(value.kind(), ExprKind::MakeRef { .. }) =>
            {
                let inits = std::mem::take(&mut self.inits);
                Ok(match inits.len() {
                    0 => empty(),
                    _ => {
                        let mut exprs = inits;
                        exprs.push(empty());
                        Expr::new(ExprKind::Block { ty: Type::Void, variables: Vec::new(), exprs })
                    }
                })
            }
            ExprKind::RefValue { reference } if reference.as_parameter() == Some(self.local) => Ok(self.path.clone()),
            ExprKind::RefInvoke { reference, action } if reference.as_parameter() == Some(self.local) => {
                let ExprKind::Lambda(lambda) = action.kind() else {
                    return Err(LowerError::internal(format!(
                        "ref local '{}' invoked with a non-lambda action",
                        self.local.name()
                    )));
                };
                let [by_ref] = lambda.params.as_slice() else {
                    return Err(LowerError::internal("ref action must take exactly one parameter"));
                };
                let inlined = ParameterSubstitutor::single(by_ref, self.path.clone()).apply(&lambda.body);
                self.rewrite_expr(&inlined)
            }
            ExprKind::Parameter(v) if v == self.local => Err(LowerError::internal(format!(
                "ref local '{}' used other than through its value",
                v.name()
            ))),
            _ => walk_rewrite(self, expr),
        }
    }
}

/// Replace by-reference locals with direct access paths.
pub fn rewrite_ref_locals(body: &Expr) -> Result<Expr> {
    let mut rewriter = RefLocalRewriter::new();
    let out = rewriter.rewrite_expr(body)?;
    tracing::debug!(target: "exprlower::ref_local", eliminated = rewriter.eliminated(), "replaced ref locals");
    Ok(out)
}
