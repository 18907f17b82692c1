use exprlower::LowerError;
use exprlower::lowering::substitute::ParameterSubstitutor;
use exprlower::tree::build::*;
use exprlower::tree::{Expr, ExprKind, LabelTarget, Type, Variable};
use exprlower::visit::composers::*;
use exprlower::visit::scope_tracker::ScopeTracker;
use exprlower::visit::{Rewriter, Visitor, walk_expr, walk_rewrite};

/// Records constants in visiting order.
struct Order(Vec<i64>);

impl Visitor for Order {
    fn visit_expr(&mut self, expr: &Expr) {
        if let ExprKind::Constant { value: exprlower::tree::Literal::Int(n), .. } = expr.kind() {
            self.0.push(*n);
        }
        walk_expr(self, expr);
    }
}

#[test]
fn children_follow_evaluation_order() {
    let x = Variable::new("x", Type::Array(Box::new(Type::Int)));
    let tree = block(
        vec![x.clone()],
        vec![
            assign(index(param(&x), int(1)).unwrap(), int(2)).unwrap(),
            if_then_else(boolean(true), int(3), int(4)).unwrap(),
            try_catch_finally(int(5), vec![catch(Type::Object, None, int(6))], int(7)).unwrap(),
        ],
    );
    let mut order = Order(Vec::new());
    order.visit_expr(&tree);
    assert_eq!(order.0, vec![1, 2, 3, 4, 5, 6, 7]);
}

/// Doubles every int constant.
struct Doubler;

impl Rewriter for Doubler {
    fn rewrite_expr(&mut self, expr: &Expr) -> Result<Expr, LowerError> {
        match expr.kind() {
            ExprKind::Constant { value: exprlower::tree::Literal::Int(n), .. } => Ok(int(n * 2)),
            _ => walk_rewrite(self, expr),
        }
    }
}

#[test]
fn rewriter_shares_untouched_subtrees() {
    let untouched = block(vec![], vec![boolean(true), string("s")]);
    let tree = block(vec![], vec![untouched.clone(), int(21)]);
    let out = Doubler.rewrite_expr(&tree).unwrap();
    let ExprKind::Block { exprs, .. } = out.kind() else { panic!("block expected") };
    assert!(exprs[0].ptr_eq(&untouched));
    assert_eq!(exprs[1].to_string(), "42");

    let unchanged = block(vec![], vec![boolean(false)]);
    assert!(Doubler.rewrite_expr(&unchanged).unwrap().ptr_eq(&unchanged));
}

#[test]
fn composers_find_count_and_collect() {
    let l = LabelTarget::void("l");
    let x = Variable::new("x", Type::Int);
    let tree = block(
        vec![x.clone()],
        vec![label(&l, None).unwrap(), assign(param(&x), add(param(&x), int(1)).unwrap()).unwrap()],
    );
    assert!(contains_label(&tree));
    assert!(!contains_await(&tree));
    assert_eq!(count_exprs(&tree, |k| matches!(k, ExprKind::Parameter(_))), 2);
    assert_eq!(referenced_variables(&tree).len(), 1);
    assert!(declared_labels(&tree).contains(&l));
    assert!(find_expr(&tree, |k| matches!(k, ExprKind::Binary { .. })).is_some());
}

#[test]
fn label_search_skips_lambdas() {
    let l = LabelTarget::void("l");
    let inner = lambda(vec![], block(vec![], vec![label(&l, None).unwrap(), int(1)]));
    assert!(!contains_label(&lambda_expr(inner)));
}

#[test]
fn scope_tracker_resolves_innermost_first() {
    let x = Variable::new("x", Type::Int);
    let renamed = x.fresh_like();
    let mut scopes: ScopeTracker<Variable, Variable> = ScopeTracker::with_initial_scope();
    scopes.insert(x.clone(), x.clone());
    scopes.push_scope();
    scopes.insert(x.clone(), renamed.clone());
    assert_eq!(scopes.lookup(&x), Some(&renamed));
    assert_eq!(scopes.depth(), 2);
    scopes.pop_scope();
    assert_eq!(scopes.lookup(&x), Some(&x));
}

#[test]
fn substitution_replaces_every_reference() {
    let x = Variable::new("x", Type::Int);
    let tree = add(param(&x), binary(exprlower::tree::BinaryOp::Multiply, param(&x), int(3)).unwrap()).unwrap();
    let out = ParameterSubstitutor::single(&x, int(2)).apply(&tree);
    assert!(!referenced_variables(&out).contains(&x));
    assert_eq!(exprlower::eval::Interpreter::new().eval(&out).unwrap(), exprlower::eval::Value::Int(8));
}
