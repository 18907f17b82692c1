//! Catch-handler rewriting.
//!
//! A handler whose body awaits cannot run inside the protected region, so the
//! handler is reduced to capturing the exception into a fresh variable and the
//! real body runs after the try:
//!
//! ```text
//! { var ex1, result;
//!   result = try { body } catch (E e') { ex1 = e'; default };
//!   if (ex1 != null) { var e; e = ex1; ex1 = null; result = handler_body };
//!   result }
//! ```
//!
//! A `rethrow` in such a body becomes a call to `capture_and_throw(e)`, which
//! keeps the exception's original trace. A `finally` that awaits is passed
//! through unchanged.

use crate::diagnostics::{LowerError, Result};
use crate::lowering::substitute::ParameterSubstitutor;
use crate::tree::build::*;
use crate::tree::{CatchBlock, Expr, ExprKind, Type, Variable};
use crate::visit::composers::contains_await;
use crate::visit::{Rewriter, walk_rewrite, walk_rewrite_catch};
use crate::well_known::well_known;

#[derive(Default)]
pub struct CatchRewriter {
    rewritten: usize,
}

impl CatchRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rewritten(&self) -> usize {
        self.rewritten
    }

    fn rewrite_try(&mut self, expr: &Expr) -> Result<Expr> {
        let ExprKind::Try { ty, body, handlers, finally, fault } = expr.kind() else {
            return walk_rewrite(self, expr);
        };
        if fault.is_some() && !handlers.is_empty() {
            return Err(LowerError::internal("fault block combined with catch handlers"));
        }
        let body = self.rewrite_expr(body)?;
        let handlers = handlers.iter().map(|h| walk_rewrite_catch(self, h)).collect::<Result<Vec<_>>>()?;
        let finally = finally.as_ref().map(|f| self.rewrite_expr(f)).transpose()?;
        let fault = fault.as_ref().map(|f| self.rewrite_expr(f)).transpose()?;

        if finally.as_ref().is_some_and(contains_await) {
            tracing::debug!(target: "exprlower::catch", "finally block with await passed through");
        }
        if !handlers.iter().any(|h| contains_await(&h.body)) {
            return Ok(Expr::new(ExprKind::Try { ty: ty.clone(), body, handlers, finally, fault }));
        }

        self.rewritten += 1;
        let result = (!ty.is_void()).then(|| Variable::new("try_result", ty.clone()));
        let mut variables = Vec::new();
        let mut trivial_handlers = Vec::with_capacity(handlers.len());
        let mut after = Vec::new();

        for handler in handlers {
            if !contains_await(&handler.body) {
                trivial_handlers.push(handler);
                continue;
            }
            let captured = Variable::new(format!("ex{}", variables.len() + 1), handler.test.clone());
            variables.push(captured.clone());
            let (capture, deferred) = split_handler(&handler, &captured, ty, result.as_ref())?;
            trivial_handlers.push(capture);
            after.push(deferred);
        }

        let guarded = Expr::new(ExprKind::Try { ty: ty.clone(), body, handlers: trivial_handlers, finally: None, fault: None });
        let mut exprs = vec![match &result {
            Some(r) => assign(param(r), guarded)?,
            None => guarded,
        }];
        exprs.extend(after);
        exprs.push(result.as_ref().map(param).unwrap_or_else(empty));
        variables.extend(result.iter().cloned());
        let lowered = Expr::new(ExprKind::Block { ty: ty.clone(), variables, exprs });

        Ok(match finally {
            Some(finally) => Expr::new(ExprKind::Try {
                ty: ty.clone(),
                body: lowered,
                handlers: Vec::new(),
                finally: Some(finally),
                fault: None,
            }),
            None => lowered,
        })
    }
}

impl Rewriter for CatchRewriter {
    fn rewrite_expr(&mut self, expr: &Expr) -> Result<Expr> {
        match expr.kind() {
            ExprKind::Lambda(_) => Ok(expr.clone()),
            ExprKind::Try { .. } => self.rewrite_try(expr),
            _ => walk_rewrite(self, expr),
        }
    }
}

/// Split an awaiting handler into the in-try capture and the post-try body.
fn split_handler(
    handler: &CatchBlock,
    captured: &Variable,
    ty: &Type,
    result: Option<&Variable>,
) -> Result<(CatchBlock, Expr)> {
    let caught = Variable::new("caught", handler.test.clone());
    let filter = match (&handler.filter, &handler.variable) {
        (Some(filter), Some(v)) => Some(ParameterSubstitutor::single(v, param(&caught)).apply(filter)),
        (filter, _) => filter.clone(),
    };
    let capture_body = Expr::new(ExprKind::Block {
        ty: ty.clone(),
        variables: Vec::new(),
        exprs: vec![assign(param(captured), param(&caught))?, Expr::new(ExprKind::Default(ty.clone()))],
    });
    let capture = CatchBlock { test: handler.test.clone(), variable: Some(caught), filter, body: capture_body };

    // The original catch variable, or a local to rethrow from.
    let local = handler.variable.clone().unwrap_or_else(|| Variable::new("exception", handler.test.clone()));
    let body = replace_rethrows(&handler.body, &local)?;
    let body = match result {
        Some(r) => assign(param(r), body)?,
        None => body,
    };
    let deferred = Expr::new(ExprKind::Block {
        ty: Type::Void,
        variables: vec![local.clone()],
        exprs: vec![
            assign(param(&local), param(captured))?,
            assign(param(captured), null(captured.ty().clone())?)?,
            body,
        ],
    });
    let test = not_equal(param(captured), null(captured.ty().clone())?)?;
    Ok((capture, if_then(test, deferred)?))
}

/// Replace `rethrow` with `capture_and_throw(exception)`. Handlers of nested
/// trys rethrow their own exception and are left alone.
fn replace_rethrows(body: &Expr, exception: &Variable) -> Result<Expr> {
    struct RethrowReplacer<'a> {
        exception: &'a Variable,
    }

    impl Rewriter for RethrowReplacer<'_> {
        fn rewrite_expr(&mut self, expr: &Expr) -> Result<Expr> {
            match expr.kind() {
                ExprKind::Lambda(_) => Ok(expr.clone()),
                ExprKind::Rethrow { ty } => {
                    let capture = &well_known().capture_and_throw;
                    let expected = capture.params().first().cloned().unwrap_or(Type::Object);
                    let mut arg = param(self.exception);
                    if arg.ty() != expected {
                        arg = convert(arg, expected)?;
                    }
                    Ok(Expr::new(ExprKind::Block {
                        ty: ty.clone(),
                        variables: Vec::new(),
                        exprs: vec![call_static(capture, vec![arg])?, Expr::new(ExprKind::Default(ty.clone()))],
                    }))
                }
                ExprKind::Try { ty, body, handlers, finally, fault } => {
                    let body = self.rewrite_expr(body)?;
                    let finally = finally.as_ref().map(|f| self.rewrite_expr(f)).transpose()?;
                    let fault = fault.as_ref().map(|f| self.rewrite_expr(f)).transpose()?;
                    Ok(Expr::new(ExprKind::Try { ty: ty.clone(), body, handlers: handlers.clone(), finally, fault }))
                }
                _ => walk_rewrite(self, expr),
            }
        }
    }

    RethrowReplacer { exception }.rewrite_expr(body)
}

/// Move the bodies of awaiting catch handlers out of their protected regions.
pub fn rewrite_catches(body: &Expr) -> Result<Expr> {
    let mut rewriter = CatchRewriter::new();
    let out = rewriter.rewrite_expr(body)?;
    tracing::debug!(target: "exprlower::catch", rewritten = rewriter.rewritten(), "rewrote catch handlers");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{EvalError, Interpreter, Value};
    use crate::lowering::test_support::{await_int, run_closed};
    use crate::visit::composers::contains_expr;
    use crate::well_known::well_known;

    fn boom(message: &str) -> Expr {
        let make = call_static(&well_known().make_exception, vec![string(message)]).unwrap();
        throw(make, Type::Int).unwrap()
    }

    fn catch_bodies_await(expr: &Expr) -> bool {
        contains_expr(expr, |k| match k {
            ExprKind::Try { handlers, .. } => handlers.iter().any(|h| contains_await(&h.body)),
            _ => false,
        })
    }

    #[test]
    fn handlers_without_await_are_kept() {
        let tree = try_catch(boom("x"), vec![catch(Type::Object, None, int(1))]).unwrap();
        assert!(rewrite_catches(&tree).unwrap().ptr_eq(&tree));
    }

    #[test]
    fn awaiting_handler_runs_after_the_try() {
        let e = Variable::new("e", well_known().exception_type());
        let handler_body = add(await_int(40), int(2)).unwrap();
        let tree = try_catch(boom("x"), vec![catch(well_known().exception_type(), Some(e), handler_body)]).unwrap();
        let out = rewrite_catches(&tree).unwrap();
        assert!(!catch_bodies_await(&out), "{out}");
        assert_eq!(run_closed(&out), Value::Int(42));
    }

    #[test]
    fn no_exception_skips_the_deferred_body() {
        let handler_body = add(await_int(40), int(2)).unwrap();
        let tree = try_catch(int(7), vec![catch(Type::Object, None, handler_body)]).unwrap();
        let out = rewrite_catches(&tree).unwrap();
        let mut interp = Interpreter::new();
        assert_eq!(interp.eval(&out).unwrap(), Value::Int(7));
        assert_eq!(interp.suspensions(), 0);
    }

    #[test]
    fn rethrow_keeps_the_original_trace() {
        let origin = lambda_expr(
            async_lambda("origin", vec![], block(vec![], vec![boom("first"), int(0)]), None).unwrap(),
        );
        let body = block(vec![], vec![await_int(1), rethrow(Type::Int)]);
        let tree = try_catch(invoke(origin, vec![]).unwrap(), vec![catch(Type::Object, None, body)]).unwrap();
        let out = rewrite_catches(&tree).unwrap();
        assert!(!contains_expr(&out, |k| matches!(k, ExprKind::Rethrow { .. })));
        match Interpreter::new().eval(&out) {
            Err(EvalError::Uncaught(exc)) => {
                assert_eq!(exc.origin().as_deref(), Some("origin"));
                assert_eq!(exc.message, "first");
            }
            other => panic!("expected uncaught exception, got {other:?}"),
        }
    }

    #[test]
    fn filter_still_sees_the_exception() {
        let e = Variable::new("e", well_known().exception_type());
        let filter = equal(field(param(&e), "Message").unwrap(), string("match")).unwrap();
        let handler = catch_when(well_known().exception_type(), Some(e), filter, await_int(1)).unwrap();
        let fallback = catch(Type::Object, None, int(2));
        let tree = try_catch(boom("other"), vec![handler, fallback]).unwrap();
        let out = rewrite_catches(&tree).unwrap();
        assert_eq!(run_closed(&out), Value::Int(2));
    }

    #[test]
    fn finally_wraps_the_deferred_handlers() {
        let log = Variable::new("log", Type::Int);
        let handler = catch(Type::Object, None, block(vec![], vec![await_int(1), assign(param(&log), int(10)).unwrap()]));
        let tree = block(
            vec![log.clone()],
            vec![
                try_catch_finally(
                    block(vec![], vec![boom("x"), empty()]),
                    vec![handler],
                    assign(param(&log), binary(crate::tree::BinaryOp::Multiply, param(&log), int(3)).unwrap()).unwrap(),
                )
                .unwrap(),
                param(&log),
            ],
        );
        let out = rewrite_catches(&tree).unwrap();
        assert_eq!(run_closed(&out), Value::Int(30));
    }

    #[test]
    fn fault_with_handlers_is_internal() {
        let tree = Expr::new(ExprKind::Try {
            ty: Type::Int,
            body: int(1),
            handlers: vec![catch(Type::Object, None, int(2))],
            finally: None,
            fault: Some(empty()),
        });
        assert!(rewrite_catches(&tree).unwrap_err().is_internal());
    }
}
