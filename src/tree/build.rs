//! Checked node factories.
//!
//! Every factory that can be misused validates its operands and reports a
//! [`TreeError`]; factories that cannot fail return the node directly.

use std::sync::Arc;

use crate::tree::expr::*;
use crate::tree::types::Type;
use crate::tree::TreeError;

type Built = Result<Expr, TreeError>;

fn mismatch(node: &'static str, expected: &Type, found: &Type) -> TreeError {
    TreeError::TypeMismatch { node, expected: expected.to_string(), found: found.to_string() }
}

fn invalid_operand(node: &'static str, ty: &Type) -> TreeError {
    TreeError::InvalidOperand { node, ty: ty.to_string() }
}

// ============================================================================
// Leaves
// ============================================================================

pub fn int(n: i64) -> Expr {
    Expr::new(ExprKind::Constant { value: Literal::Int(n), ty: Type::Int })
}

pub fn boolean(b: bool) -> Expr {
    Expr::new(ExprKind::Constant { value: Literal::Bool(b), ty: Type::Bool })
}

pub fn double(d: f64) -> Expr {
    Expr::new(ExprKind::Constant { value: Literal::Double(d), ty: Type::Double })
}

pub fn string(s: &str) -> Expr {
    Expr::new(ExprKind::Constant { value: Literal::Str(Arc::from(s)), ty: Type::String })
}

/// A typed constant. The literal must fit the type (a nullable accepts its underlying literal).
pub fn constant(value: Literal, ty: Type) -> Built {
    let ok = match (&value, ty.non_nullable()) {
        (Literal::Null, _) => ty.admits_null(),
        (Literal::Bool(_), Type::Bool)
        | (Literal::Int(_), Type::Int)
        | (Literal::Double(_), Type::Double)
        | (Literal::Str(_), Type::String) => true,
        (_, Type::Object) => true,
        _ => false,
    };
    if !ok {
        return Err(TreeError::Invalid(format!("literal {value:?} is not a valid {ty}")));
    }
    Ok(Expr::new(ExprKind::Constant { value, ty }))
}

pub fn null(ty: Type) -> Built {
    constant(Literal::Null, ty)
}

pub fn default(ty: Type) -> Expr {
    Expr::new(ExprKind::Default(ty))
}

pub fn empty() -> Expr {
    default(Type::Void)
}

pub fn param(variable: &Variable) -> Expr {
    Expr::new(ExprKind::Parameter(variable.clone()))
}

// ============================================================================
// Operators
// ============================================================================

pub fn unary(op: UnaryOp, operand: Expr) -> Built {
    let ty = operand.ty();
    let result = match op {
        UnaryOp::Negate if ty.is_numeric() => ty.clone(),
        UnaryOp::Not if ty.is_boolean() || matches!(ty.non_nullable(), Type::Int) => ty.clone(),
        UnaryOp::IsTrue | UnaryOp::IsFalse if ty.is_boolean() => Type::Bool,
        UnaryOp::ArrayLength if ty.element().is_some() => Type::Int,
        _ => return Err(invalid_operand("unary", &ty)),
    };
    Ok(Expr::new(ExprKind::Unary { op, operand, ty: result, method: None }))
}

pub fn unary_with_method(op: UnaryOp, operand: Expr, method: Method) -> Built {
    check_args(&method, std::slice::from_ref(&operand))?;
    let ty = method.ret().clone();
    Ok(Expr::new(ExprKind::Unary { op, operand, ty, method: Some(method) }))
}

pub fn not(operand: Expr) -> Built {
    unary(UnaryOp::Not, operand)
}

fn binary_type(op: BinaryOp, left: &Type, right: &Type) -> Result<Type, TreeError> {
    match op {
        BinaryOp::Add if *left == Type::String && *right == Type::String => Ok(Type::String),
        _ if op.is_arithmetic() => {
            if left != right {
                return Err(mismatch("binary", left, right));
            }
            if !left.is_numeric() {
                return Err(invalid_operand("arithmetic", left));
            }
            Ok(left.clone())
        }
        _ if op.is_bitwise() => {
            if left != right {
                return Err(mismatch("binary", left, right));
            }
            if !(left.is_boolean() || matches!(left.non_nullable(), Type::Int)) {
                return Err(invalid_operand("bitwise", left));
            }
            Ok(left.clone())
        }
        BinaryOp::Equal | BinaryOp::NotEqual => {
            let comparable = left == right
                || left.is_reference_convertible(right)
                || (left.is_nullable_value() && left.non_nullable() == right)
                || (right.is_nullable_value() && right.non_nullable() == left);
            if !comparable {
                return Err(mismatch("equality", left, right));
            }
            Ok(Type::Bool)
        }
        _ if op.is_comparison() => {
            if left != right {
                return Err(mismatch("comparison", left, right));
            }
            if !left.is_numeric() {
                return Err(invalid_operand("comparison", left));
            }
            Ok(Type::Bool)
        }
        BinaryOp::AndAlso | BinaryOp::OrElse => {
            if left != right {
                return Err(mismatch("logical", left, right));
            }
            if !left.is_boolean() {
                return Err(invalid_operand("logical", left));
            }
            Ok(left.clone())
        }
        BinaryOp::Coalesce => {
            if !left.admits_null() {
                return Err(invalid_operand("coalesce", left));
            }
            match left {
                Type::Nullable(inner) if inner.as_ref() == right => Ok(right.clone()),
                _ if left.is_assignable_from(right) => Ok(left.clone()),
                _ => Err(mismatch("coalesce", left, right)),
            }
        }
        _ => Err(invalid_operand("binary", left)),
    }
}

pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Built {
    let ty = binary_type(op, &left.ty(), &right.ty())?;
    Ok(Expr::new(ExprKind::Binary { op, left, right, ty, method: None, conversion: None }))
}

/// A binary node implemented by a user-defined operator method.
pub fn binary_with_method(op: BinaryOp, left: Expr, right: Expr, operator: UserOperator) -> Built {
    check_args(&operator.method, &[left.clone(), right.clone()])?;
    if matches!(op, BinaryOp::AndAlso | BinaryOp::OrElse) {
        let Some(truth) = &operator.truth else {
            return Err(TreeError::Invalid(format!("{} operator requires a truth test", op.symbol())));
        };
        if truth.ret() != &Type::Bool || truth.params().len() != 1 {
            return Err(TreeError::Invalid(format!("truth test '{}' must be (T) -> bool", truth.name())));
        }
    }
    let ty = operator.method.ret().clone();
    Ok(Expr::new(ExprKind::Binary { op, left, right, ty, method: Some(operator), conversion: None }))
}

/// `left ?? right` where a non-null `left` is passed through `conversion` first.
pub fn coalesce_with_conversion(left: Expr, right: Expr, conversion: LambdaExpr) -> Built {
    let lt = left.ty();
    if !lt.admits_null() {
        return Err(invalid_operand("coalesce", &lt));
    }
    if conversion.params.len() != 1 || !conversion.params[0].ty().is_assignable_from(lt.non_nullable()) {
        return Err(TreeError::Invalid("coalesce conversion must take the left operand".into()));
    }
    if !conversion.ret.is_assignable_from(&right.ty()) {
        return Err(mismatch("coalesce", &conversion.ret, &right.ty()));
    }
    let ty = conversion.ret.clone();
    Ok(Expr::new(ExprKind::Binary {
        op: BinaryOp::Coalesce,
        left,
        right,
        ty,
        method: None,
        conversion: Some(lambda_expr(conversion)),
    }))
}

pub fn add(left: Expr, right: Expr) -> Built {
    binary(BinaryOp::Add, left, right)
}

pub fn equal(left: Expr, right: Expr) -> Built {
    binary(BinaryOp::Equal, left, right)
}

pub fn not_equal(left: Expr, right: Expr) -> Built {
    binary(BinaryOp::NotEqual, left, right)
}

pub fn less_than(left: Expr, right: Expr) -> Built {
    binary(BinaryOp::LessThan, left, right)
}

pub fn and_also(left: Expr, right: Expr) -> Built {
    binary(BinaryOp::AndAlso, left, right)
}

pub fn or_else(left: Expr, right: Expr) -> Built {
    binary(BinaryOp::OrElse, left, right)
}

pub fn coalesce(left: Expr, right: Expr) -> Built {
    binary(BinaryOp::Coalesce, left, right)
}

// ============================================================================
// Assignment and locations
// ============================================================================

pub fn is_assignable_target(expr: &Expr) -> bool {
    matches!(
        expr.kind(),
        ExprKind::Parameter(_) | ExprKind::Member { .. } | ExprKind::Index { .. } | ExprKind::RefValue { .. }
    )
}

pub fn assign(target: Expr, value: Expr) -> Built {
    if !is_assignable_target(&target) {
        return Err(TreeError::NotAssignable { ty: target.ty().to_string() });
    }
    let (tt, vt) = (target.ty(), value.ty());
    if !tt.is_assignable_from(&vt) {
        return Err(mismatch("assign", &tt, &vt));
    }
    Ok(Expr::new(ExprKind::Assign { target, value }))
}

pub fn field(object: Expr, name: &str) -> Built {
    let ty = object.ty();
    let Some(class) = ty.class() else {
        return Err(invalid_operand("member", &ty));
    };
    let Some(field_ty) = class.field_type(name) else {
        return Err(TreeError::UnknownField { ty: ty.to_string(), field: name.to_string() });
    };
    Ok(Expr::new(ExprKind::Member { object, field: Field { name: name.to_string(), ty: field_ty } }))
}

pub fn index(array: Expr, index: Expr) -> Built {
    let ty = array.ty();
    if ty.element().is_none() {
        return Err(invalid_operand("index", &ty));
    }
    if index.ty() != Type::Int {
        return Err(mismatch("index", &Type::Int, &index.ty()));
    }
    Ok(Expr::new(ExprKind::Index { array, index }))
}

pub fn make_ref(location: Expr) -> Built {
    if !matches!(location.kind(), ExprKind::Parameter(_) | ExprKind::Member { .. } | ExprKind::Index { .. }) {
        return Err(TreeError::NotAssignable { ty: location.ty().to_string() });
    }
    Ok(Expr::new(ExprKind::MakeRef { location }))
}

pub fn ref_value(reference: Expr) -> Built {
    let ty = reference.ty();
    if !matches!(ty, Type::Ref(_)) {
        return Err(invalid_operand("ref value", &ty));
    }
    Ok(Expr::new(ExprKind::RefValue { reference }))
}

/// Invoke `action` with the wrapped location bound to its single by-ref parameter.
pub fn ref_invoke(reference: Expr, action: LambdaExpr) -> Built {
    let Type::Ref(inner) = reference.ty() else {
        return Err(invalid_operand("ref invoke", &reference.ty()));
    };
    match action.params.as_slice() {
        [p] if p.is_by_ref() && p.ty() == inner.as_ref() => {}
        _ => return Err(TreeError::Invalid("ref action must take one by-ref parameter of the target type".into())),
    }
    Ok(Expr::new(ExprKind::RefInvoke { reference, action: lambda_expr(action) }))
}

// ============================================================================
// Control flow
// ============================================================================

/// A block typed by its last expression. An empty expression list yields a void block.
pub fn block(variables: Vec<Variable>, mut exprs: Vec<Expr>) -> Expr {
    if exprs.is_empty() {
        exprs.push(empty());
    }
    let ty = exprs.last().map(Expr::ty).unwrap_or(Type::Void);
    Expr::new(ExprKind::Block { ty, variables, exprs })
}

/// A block with an explicit type: `void` discards the tail value.
pub fn typed_block(ty: Type, variables: Vec<Variable>, mut exprs: Vec<Expr>) -> Built {
    if exprs.is_empty() {
        exprs.push(empty());
    }
    let last = exprs.last().map(Expr::ty).unwrap_or(Type::Void);
    if !ty.is_void() && !ty.is_assignable_from(&last) {
        return Err(mismatch("block", &ty, &last));
    }
    Ok(Expr::new(ExprKind::Block { ty, variables, exprs }))
}

pub fn condition(test: Expr, if_true: Expr, if_false: Expr) -> Built {
    let ty = if_true.ty();
    condition_typed(test, if_true, if_false, ty)
}

pub fn condition_typed(test: Expr, if_true: Expr, if_false: Expr, ty: Type) -> Built {
    if test.ty() != Type::Bool {
        return Err(mismatch("conditional test", &Type::Bool, &test.ty()));
    }
    if !ty.is_void() {
        for branch in [&if_true, &if_false] {
            if !ty.is_assignable_from(&branch.ty()) {
                return Err(mismatch("conditional", &ty, &branch.ty()));
            }
        }
    }
    Ok(Expr::new(ExprKind::Conditional { test, if_true, if_false, ty }))
}

pub fn if_then(test: Expr, body: Expr) -> Built {
    condition_typed(test, body, empty(), Type::Void)
}

pub fn if_then_else(test: Expr, if_true: Expr, if_false: Expr) -> Built {
    condition_typed(test, if_true, if_false, Type::Void)
}

pub fn loop_expr(body: Expr, break_label: Option<LabelTarget>, continue_label: Option<LabelTarget>) -> Built {
    if let Some(c) = &continue_label {
        if !c.ty().is_void() {
            return Err(mismatch("loop continue label", &Type::Void, c.ty()));
        }
    }
    Ok(Expr::new(ExprKind::Loop { body, break_label, continue_label }))
}

pub fn label(target: &LabelTarget, default: Option<Expr>) -> Built {
    match &default {
        Some(d) if !target.ty().is_assignable_from(&d.ty()) => {
            return Err(mismatch("label", target.ty(), &d.ty()));
        }
        None if !target.ty().is_void() => {
            return Err(TreeError::Invalid(format!("label '{}' of type {} needs a default value", target.name(), target.ty())));
        }
        _ => {}
    }
    Ok(Expr::new(ExprKind::Label { target: target.clone(), default }))
}

pub fn make_goto(kind: GotoKind, target: &LabelTarget, value: Option<Expr>, ty: Type) -> Built {
    match &value {
        Some(v) if target.ty().is_void() || !target.ty().is_assignable_from(&v.ty()) => {
            return Err(mismatch("goto", target.ty(), &v.ty()));
        }
        None if !target.ty().is_void() => {
            return Err(TreeError::Invalid(format!("jump to '{}' must carry a {}", target.name(), target.ty())));
        }
        _ => {}
    }
    Ok(Expr::new(ExprKind::Goto { kind, target: target.clone(), value, ty }))
}

pub fn goto(target: &LabelTarget) -> Built {
    make_goto(GotoKind::Goto, target, None, Type::Void)
}

pub fn goto_value(target: &LabelTarget, value: Expr) -> Built {
    make_goto(GotoKind::Goto, target, Some(value), Type::Void)
}

pub fn break_to(target: &LabelTarget) -> Built {
    make_goto(GotoKind::Break, target, None, Type::Void)
}

pub fn continue_to(target: &LabelTarget) -> Built {
    make_goto(GotoKind::Continue, target, None, Type::Void)
}

pub fn return_to(target: &LabelTarget, value: Option<Expr>) -> Built {
    make_goto(GotoKind::Return, target, value, Type::Void)
}

pub fn catch(test: Type, variable: Option<Variable>, body: Expr) -> CatchBlock {
    CatchBlock { test, variable, filter: None, body }
}

pub fn catch_when(test: Type, variable: Option<Variable>, filter: Expr, body: Expr) -> Result<CatchBlock, TreeError> {
    if filter.ty() != Type::Bool {
        return Err(mismatch("catch filter", &Type::Bool, &filter.ty()));
    }
    Ok(CatchBlock { test, variable, filter: Some(filter), body })
}

pub fn make_try(
    ty: Type,
    body: Expr,
    handlers: Vec<CatchBlock>,
    finally: Option<Expr>,
    fault: Option<Expr>,
) -> Built {
    if handlers.is_empty() && finally.is_none() && fault.is_none() {
        return Err(TreeError::Invalid("try needs at least one handler, finally or fault".into()));
    }
    if fault.is_some() && (finally.is_some() || !handlers.is_empty()) {
        return Err(TreeError::Invalid("fault cannot be combined with catch or finally".into()));
    }
    if !ty.is_void() {
        if !ty.is_assignable_from(&body.ty()) {
            return Err(mismatch("try", &ty, &body.ty()));
        }
        for h in &handlers {
            if !ty.is_assignable_from(&h.body.ty()) {
                return Err(mismatch("catch", &ty, &h.body.ty()));
            }
        }
    }
    Ok(Expr::new(ExprKind::Try { ty, body, handlers, finally, fault }))
}

pub fn try_catch(body: Expr, handlers: Vec<CatchBlock>) -> Built {
    let ty = body.ty();
    make_try(ty, body, handlers, None, None)
}

pub fn try_catch_finally(body: Expr, handlers: Vec<CatchBlock>, finally: Expr) -> Built {
    let ty = body.ty();
    make_try(ty, body, handlers, Some(finally), None)
}

pub fn try_finally(body: Expr, finally: Expr) -> Built {
    let ty = body.ty();
    make_try(ty, body, vec![], Some(finally), None)
}

pub fn try_fault(body: Expr, fault: Expr) -> Built {
    let ty = body.ty();
    make_try(ty, body, vec![], None, Some(fault))
}

pub fn switch_case(test_values: Vec<Expr>, body: Expr) -> SwitchCase {
    SwitchCase { test_values, body }
}

pub fn switch(value: Expr, cases: Vec<SwitchCase>, default: Option<Expr>) -> Built {
    let ty = cases
        .first()
        .map(|c| c.body.ty())
        .or_else(|| default.as_ref().map(Expr::ty))
        .unwrap_or(Type::Void);
    switch_typed(ty, value, cases, default)
}

pub fn switch_typed(ty: Type, value: Expr, cases: Vec<SwitchCase>, default: Option<Expr>) -> Built {
    let vt = value.ty();
    for case in &cases {
        if case.test_values.is_empty() {
            return Err(TreeError::Invalid("switch case needs at least one test value".into()));
        }
        for t in &case.test_values {
            if t.ty() != vt {
                return Err(mismatch("switch case", &vt, &t.ty()));
            }
        }
        if !ty.is_void() && !ty.is_assignable_from(&case.body.ty()) {
            return Err(mismatch("switch case body", &ty, &case.body.ty()));
        }
    }
    if !ty.is_void() {
        match &default {
            Some(d) if !ty.is_assignable_from(&d.ty()) => return Err(mismatch("switch default", &ty, &d.ty())),
            None => return Err(TreeError::Invalid("a non-void switch needs a default body".into())),
            _ => {}
        }
    }
    Ok(Expr::new(ExprKind::Switch { ty, value, cases, default }))
}

pub fn throw(value: Expr, ty: Type) -> Built {
    let vt = value.ty();
    if !vt.class().is_some_and(|c| c.derives_from(crate::well_known::EXCEPTION_CLASS)) {
        return Err(invalid_operand("throw", &vt));
    }
    Ok(Expr::new(ExprKind::Throw { value, ty }))
}

pub fn rethrow(ty: Type) -> Expr {
    Expr::new(ExprKind::Rethrow { ty })
}

// ============================================================================
// Calls, objects, conversions
// ============================================================================

fn check_args(method: &Method, args: &[Expr]) -> Result<(), TreeError> {
    if method.params().len() != args.len() {
        return Err(TreeError::ArgumentCount {
            method: method.name().to_string(),
            expected: method.params().len(),
            found: args.len(),
        });
    }
    for (p, a) in method.params().iter().zip(args) {
        if !p.is_assignable_from(&a.ty()) {
            return Err(mismatch("call argument", p, &a.ty()));
        }
    }
    Ok(())
}

pub fn call(object: Option<Expr>, method: &Method, args: Vec<Expr>) -> Built {
    match (&object, method.is_static()) {
        (Some(_), true) => return Err(TreeError::Invalid(format!("static method '{}' called on an instance", method.name()))),
        (None, false) => return Err(TreeError::Invalid(format!("instance method '{}' needs a receiver", method.name()))),
        (Some(obj), false) => {
            let declaring = method.declaring().unwrap_or_default();
            if !obj.ty().class().is_some_and(|c| c.derives_from(declaring)) {
                return Err(invalid_operand("call receiver", &obj.ty()));
            }
        }
        (None, true) => {}
    }
    check_args(method, &args)?;
    Ok(Expr::new(ExprKind::Call { object, method: method.clone(), args }))
}

pub fn call_static(method: &Method, args: Vec<Expr>) -> Built {
    call(None, method, args)
}

pub fn new_object(ty: Type) -> Built {
    if ty.class().is_none() {
        return Err(invalid_operand("new", &ty));
    }
    Ok(Expr::new(ExprKind::New { ty }))
}

pub fn new_array(element: Type, items: Vec<Expr>) -> Built {
    for item in &items {
        if !element.is_assignable_from(&item.ty()) {
            return Err(mismatch("array element", &element, &item.ty()));
        }
    }
    Ok(Expr::new(ExprKind::NewArray { element, items }))
}

/// Whether `convert(from → to)` is a supported conversion.
pub fn is_convertible(from: &Type, to: &Type) -> bool {
    from == to
        || to.is_assignable_from(from)
        || from.is_reference_convertible(to)
        || *from == Type::Object
        || (from.is_numeric() && to.is_numeric())
        || (from.is_nullable_value() && from.non_nullable() == to)
}

pub fn convert(operand: Expr, ty: Type) -> Built {
    let from = operand.ty();
    if !is_convertible(&from, &ty) {
        return Err(mismatch("convert", &ty, &from));
    }
    Ok(Expr::new(ExprKind::Convert { operand, ty }))
}

pub fn lambda(params: Vec<Variable>, body: Expr) -> LambdaExpr {
    let ret = body.ty();
    LambdaExpr { name: None, params, body, return_label: None, ret, is_async: false }
}

/// An async lambda. `return_label`, if present, fixes the result type; otherwise
/// the body's type is the result type. A void body is allowed when every path
/// leaves through the return label.
pub fn async_lambda(
    name: &str,
    params: Vec<Variable>,
    body: Expr,
    return_label: Option<LabelTarget>,
) -> Result<LambdaExpr, TreeError> {
    let ret = return_label.as_ref().map(|l| l.ty().clone()).unwrap_or_else(|| body.ty());
    if !ret.is_void() && !body.ty().is_void() && !ret.is_assignable_from(&body.ty()) {
        return Err(mismatch("lambda body", &ret, &body.ty()));
    }
    Ok(LambdaExpr { name: Some(name.to_string()), params, body, return_label, ret, is_async: true })
}

pub fn lambda_expr(lambda: LambdaExpr) -> Expr {
    Expr::new(ExprKind::Lambda(lambda))
}

pub fn invoke(target: Expr, args: Vec<Expr>) -> Built {
    let Type::Function(params, _) = target.ty() else {
        return Err(invalid_operand("invoke", &target.ty()));
    };
    if params.len() != args.len() {
        return Err(TreeError::ArgumentCount { method: "invoke".into(), expected: params.len(), found: args.len() });
    }
    for (p, a) in params.iter().zip(&args) {
        if !p.is_assignable_from(&a.ty()) {
            return Err(mismatch("invoke argument", p, &a.ty()));
        }
    }
    Ok(Expr::new(ExprKind::Invoke { target, args }))
}

// ============================================================================
// Extension nodes
// ============================================================================

impl AwaiterShape {
    /// Duck-typed lookup of `GetAwaiter()`, `IsCompleted()` and `GetResult()`.
    pub fn resolve(ty: &Type) -> Option<AwaiterShape> {
        let get_awaiter = ty.class()?.find_method("GetAwaiter", 0)?;
        let awaiter_class = get_awaiter.ret().class()?.clone();
        let is_completed = awaiter_class.find_method("IsCompleted", 0)?;
        if is_completed.ret() != &Type::Bool {
            return None;
        }
        let get_result = awaiter_class.find_method("GetResult", 0)?;
        Some(AwaiterShape { get_awaiter, is_completed, get_result })
    }
}

pub fn await_expr(operand: Expr) -> Built {
    let ty = operand.ty();
    let Some(shape) = AwaiterShape::resolve(&ty) else {
        return Err(TreeError::NotAwaitable { ty: ty.to_string() });
    };
    Ok(Expr::new(ExprKind::Await { operand, shape }))
}

pub fn compound_assign(op: BinaryOp, target: Expr, value: Expr) -> Built {
    if !is_assignable_target(&target) {
        return Err(TreeError::NotAssignable { ty: target.ty().to_string() });
    }
    if op.is_comparison() || op.is_short_circuit() {
        return Err(TreeError::Invalid(format!("'{}=' is not a compound assignment", op.symbol())));
    }
    let result = binary_type(op, &target.ty(), &value.ty())?;
    if result != target.ty() {
        return Err(mismatch("compound assign", &target.ty(), &result));
    }
    Ok(Expr::new(ExprKind::CompoundAssign { op, target, value, method: None }))
}

pub fn increment(op: IncrementOp, target: Expr) -> Built {
    if !is_assignable_target(&target) {
        return Err(TreeError::NotAssignable { ty: target.ty().to_string() });
    }
    if !target.ty().is_numeric() {
        return Err(invalid_operand("increment", &target.ty()));
    }
    Ok(Expr::new(ExprKind::IncrementAssign { op, target }))
}

pub fn while_loop(
    test: Expr,
    body: Expr,
    break_label: Option<LabelTarget>,
    continue_label: Option<LabelTarget>,
) -> Built {
    if test.ty() != Type::Bool {
        return Err(mismatch("while test", &Type::Bool, &test.ty()));
    }
    Ok(Expr::new(ExprKind::While { test, body, break_label, continue_label }))
}

#[allow(clippy::too_many_arguments)]
pub fn for_loop(
    variables: Vec<Variable>,
    initializers: Vec<Expr>,
    test: Option<Expr>,
    steppers: Vec<Expr>,
    body: Expr,
    break_label: Option<LabelTarget>,
    continue_label: Option<LabelTarget>,
) -> Built {
    if let Some(t) = &test {
        if t.ty() != Type::Bool {
            return Err(mismatch("for test", &Type::Bool, &t.ty()));
        }
    }
    Ok(Expr::new(ExprKind::For { variables, initializers, test, steppers, body, break_label, continue_label }))
}

pub fn for_each(
    variable: Variable,
    collection: Expr,
    body: Expr,
    break_label: Option<LabelTarget>,
    continue_label: Option<LabelTarget>,
) -> Built {
    let ct = collection.ty();
    let Some(element) = ct.element() else {
        return Err(invalid_operand("foreach", &ct));
    };
    if !variable.ty().is_assignable_from(element) {
        return Err(mismatch("foreach variable", variable.ty(), element));
    }
    Ok(Expr::new(ExprKind::ForEach { variable, collection, body, break_label, continue_label }))
}

/// `using (variable = resource) body`; the resource type must expose `Dispose()`.
pub fn using(variable: Option<Variable>, resource: Expr, body: Expr) -> Built {
    let rt = resource.ty();
    let Some(dispose) = rt.class().and_then(|c| c.find_method("Dispose", 0)) else {
        return Err(invalid_operand("using", &rt));
    };
    if let Some(v) = &variable {
        if !v.ty().is_assignable_from(&rt) {
            return Err(mismatch("using variable", v.ty(), &rt));
        }
    }
    Ok(Expr::new(ExprKind::Using { variable, resource, body, dispose }))
}

pub fn lock(object: Expr, body: Expr) -> Built {
    if !object.ty().is_reference() {
        return Err(invalid_operand("lock", &object.ty()));
    }
    Ok(Expr::new(ExprKind::Lock { object, body }))
}
