//! Replace variable references with arbitrary expressions.

use std::collections::HashMap;

use crate::tree::{Expr, ExprKind, Variable};
use crate::visit::map_children;

/// Substitutes every `Parameter` reference to a mapped variable.
///
/// Relies on variable identities being unique across the tree (the alias
/// eliminator guarantees it), so no scope tracking is needed.
pub struct ParameterSubstitutor {
    map: HashMap<Variable, Expr>,
}

impl ParameterSubstitutor {
    pub fn new(map: HashMap<Variable, Expr>) -> Self {
        Self { map }
    }

    pub fn single(var: &Variable, replacement: Expr) -> Self {
        Self::new(HashMap::from([(var.clone(), replacement)]))
    }

    pub fn apply(&self, expr: &Expr) -> Expr {
        if self.map.is_empty() {
            return expr.clone();
        }
        match expr.kind() {
            ExprKind::Parameter(v) => self.map.get(v).cloned().unwrap_or_else(|| expr.clone()),
            _ => map_children(expr, |child| self.apply(child)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::build::*;
    use crate::tree::Type;

    #[test]
    fn replaces_only_mapped_variables() {
        let x = Variable::new("x", Type::Int);
        let y = Variable::new("y", Type::Int);
        let tree = add(param(&x), param(&y)).unwrap();
        let out = ParameterSubstitutor::single(&x, int(10)).apply(&tree);
        assert_eq!(out.to_string(), "(10 + y)");
    }

    #[test]
    fn untouched_tree_keeps_reference() {
        let x = Variable::new("x", Type::Int);
        let y = Variable::new("y", Type::Int);
        let tree = block(vec![], vec![param(&y), int(1)]);
        let out = ParameterSubstitutor::single(&x, int(10)).apply(&tree);
        assert!(out.ptr_eq(&tree));
    }

    #[test]
    fn substitutes_assignment_targets_with_locations() {
        let p = Variable::new_by_ref("p", Type::Int);
        let arr = Variable::new("arr", Type::array(Type::Int));
        let tree = assign(param(&p), int(3)).unwrap();
        let path = index(param(&arr), int(0)).unwrap();
        let out = ParameterSubstitutor::single(&p, path).apply(&tree);
        assert_eq!(out.to_string(), "arr[0] = 3");
    }
}
