use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use uuid::Uuid;

use crate::eval::Value;
use crate::tree::types::Type;

// ============================================================================
// Identities
// ============================================================================

#[derive(Debug)]
struct VariableData {
    id: Uuid,
    name: String,
    ty: Type,
    by_ref: bool,
}

/// A bound variable (parameter, block local, catch variable).
///
/// Identity-based: two variables are equal only if they were created by the same
/// `Variable::new` call (or cloned from it), regardless of name and type.
#[derive(Debug, Clone)]
pub struct Variable(Arc<VariableData>);

impl Variable {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self(Arc::new(VariableData { id: Uuid::new_v4(), name: name.into(), ty, by_ref: false }))
    }

    /// A by-reference lambda parameter.
    pub fn new_by_ref(name: impl Into<String>, ty: Type) -> Self {
        Self(Arc::new(VariableData { id: Uuid::new_v4(), name: name.into(), ty, by_ref: true }))
    }

    /// A fresh identity with the same name, type and by-ref flag.
    pub fn fresh_like(&self) -> Self {
        Self(Arc::new(VariableData {
            id: Uuid::new_v4(),
            name: self.0.name.clone(),
            ty: self.0.ty.clone(),
            by_ref: self.0.by_ref,
        }))
    }

    pub fn id(&self) -> Uuid {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn ty(&self) -> &Type {
        &self.0.ty
    }

    pub fn is_by_ref(&self) -> bool {
        self.0.by_ref
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Variable {}

impl Hash for Variable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

#[derive(Debug)]
struct LabelData {
    id: Uuid,
    name: String,
    ty: Type,
}

/// A jump target. A non-void type means jumps carry a value of that type.
#[derive(Debug, Clone)]
pub struct LabelTarget(Arc<LabelData>);

impl LabelTarget {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self(Arc::new(LabelData { id: Uuid::new_v4(), name: name.into(), ty }))
    }

    pub fn void(name: impl Into<String>) -> Self {
        Self::new(name, Type::Void)
    }

    pub fn id(&self) -> Uuid {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn ty(&self) -> &Type {
        &self.0.ty
    }
}

impl PartialEq for LabelTarget {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for LabelTarget {}

impl Hash for LabelTarget {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

// ============================================================================
// Methods and members
// ============================================================================

/// Host implementation of a method. Instance methods receive the receiver as the
/// first argument. An `Err` carries the thrown exception value.
pub type HostFn = Arc<dyn Fn(&[Value]) -> Result<Value, Value> + Send + Sync>;

struct MethodData {
    name: String,
    declaring: Option<String>,
    is_static: bool,
    params: Vec<Type>,
    ret: Type,
    imp: HostFn,
}

/// A callable method with a host implementation. Compared by identity.
#[derive(Clone)]
pub struct Method(Arc<MethodData>);

impl Method {
    pub fn new_static(name: impl Into<String>, params: Vec<Type>, ret: Type, imp: HostFn) -> Self {
        Self(Arc::new(MethodData { name: name.into(), declaring: None, is_static: true, params, ret, imp }))
    }

    pub fn new_instance(
        declaring: impl Into<String>,
        name: impl Into<String>,
        params: Vec<Type>,
        ret: Type,
        imp: HostFn,
    ) -> Self {
        Self(Arc::new(MethodData {
            name: name.into(),
            declaring: Some(declaring.into()),
            is_static: false,
            params,
            ret,
            imp,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn declaring(&self) -> Option<&str> {
        self.0.declaring.as_deref()
    }

    pub fn is_static(&self) -> bool {
        self.0.is_static
    }

    pub fn params(&self) -> &[Type] {
        &self.0.params
    }

    pub fn ret(&self) -> &Type {
        &self.0.ret
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value, Value> {
        (self.0.imp)(args)
    }

    pub fn ptr_eq(&self, other: &Method) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.declaring {
            Some(d) => write!(f, "{}::{}", d, self.0.name),
            None => write!(f, "{}", self.0.name),
        }
    }
}

impl PartialEq for Method {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

/// A user-defined operator. For `AndAlso`/`OrElse`, `truth` is the `op_False`/`op_True`
/// test that decides whether the right operand is evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct UserOperator {
    pub method: Method,
    pub truth: Option<Method>,
}

/// The three-step awaiter protocol resolved for an awaitable operand type.
#[derive(Debug, Clone, PartialEq)]
pub struct AwaiterShape {
    pub get_awaiter: Method,
    pub is_completed: Method,
    pub get_result: Method,
}

// ============================================================================
// Operators and literals
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negate,
    Not,
    /// `bool`/`bool?` truth test; null is not true.
    IsTrue,
    /// `bool`/`bool?` falsity test; null is not false.
    IsFalse,
    ArrayLength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    And,
    Or,
    ExclusiveOr,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    AndAlso,
    OrElse,
    Coalesce,
}

impl BinaryOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::ExclusiveOr)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanOrEqual
        )
    }

    pub fn is_short_circuit(self) -> bool {
        matches!(self, BinaryOp::AndAlso | BinaryOp::OrElse | BinaryOp::Coalesce)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::ExclusiveOr => "^",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::AndAlso => "&&",
            BinaryOp::OrElse => "||",
            BinaryOp::Coalesce => "??",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncrementOp {
    PreIncrement,
    PreDecrement,
    PostIncrement,
    PostDecrement,
}

impl IncrementOp {
    pub fn is_prefix(self) -> bool {
        matches!(self, IncrementOp::PreIncrement | IncrementOp::PreDecrement)
    }

    pub fn binary_op(self) -> BinaryOp {
        match self {
            IncrementOp::PreIncrement | IncrementOp::PostIncrement => BinaryOp::Add,
            IncrementOp::PreDecrement | IncrementOp::PostDecrement => BinaryOp::Subtract,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GotoKind {
    Goto,
    Break,
    Continue,
    Return,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(Arc<str>),
}

// ============================================================================
// Nodes
// ============================================================================

#[derive(Debug, Clone)]
pub struct CatchBlock {
    pub test: Type,
    pub variable: Option<Variable>,
    pub filter: Option<Expr>,
    pub body: Expr,
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub test_values: Vec<Expr>,
    pub body: Expr,
}

#[derive(Debug, Clone)]
pub struct LambdaExpr {
    pub name: Option<String>,
    pub params: Vec<Variable>,
    pub body: Expr,
    /// Target of `return` gotos; its type equals `ret` when non-void.
    pub return_label: Option<LabelTarget>,
    pub ret: Type,
    pub is_async: bool,
}

impl LambdaExpr {
    pub fn ty(&self) -> Type {
        Type::function(self.params.iter().map(|p| p.ty().clone()).collect(), self.ret.clone())
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<lambda>")
    }
}

#[derive(Debug)]
pub enum ExprKind {
    // ---- primitive nodes ----
    Constant { value: Literal, ty: Type },
    /// Default value of a type; `Default(Void)` is the empty expression.
    Default(Type),
    Parameter(Variable),
    Unary { op: UnaryOp, operand: Expr, ty: Type, method: Option<Method> },
    Binary {
        op: BinaryOp,
        left: Expr,
        right: Expr,
        ty: Type,
        method: Option<UserOperator>,
        /// Coalesce only: lambda applied to the non-null left operand.
        conversion: Option<Expr>,
    },
    Assign { target: Expr, value: Expr },
    Block { ty: Type, variables: Vec<Variable>, exprs: Vec<Expr> },
    Conditional { test: Expr, if_true: Expr, if_false: Expr, ty: Type },
    Loop { body: Expr, break_label: Option<LabelTarget>, continue_label: Option<LabelTarget> },
    Label { target: LabelTarget, default: Option<Expr> },
    Goto { kind: GotoKind, target: LabelTarget, value: Option<Expr>, ty: Type },
    Try { ty: Type, body: Expr, handlers: Vec<CatchBlock>, finally: Option<Expr>, fault: Option<Expr> },
    Switch { ty: Type, value: Expr, cases: Vec<SwitchCase>, default: Option<Expr> },
    Throw { value: Expr, ty: Type },
    Rethrow { ty: Type },
    Member { object: Expr, field: Field },
    Index { array: Expr, index: Expr },
    Call { object: Option<Expr>, method: Method, args: Vec<Expr> },
    New { ty: Type },
    NewArray { element: Type, items: Vec<Expr> },
    Convert { operand: Expr, ty: Type },
    Lambda(LambdaExpr),
    Invoke { target: Expr, args: Vec<Expr> },
    /// By-reference wrapper over a location (variable, field or array element).
    MakeRef { location: Expr },
    /// The location behind a by-reference wrapper; readable and assignable.
    RefValue { reference: Expr },
    /// Calls `action` (a lambda with one by-ref parameter) on the wrapped location.
    RefInvoke { reference: Expr, action: Expr },

    // ---- extension nodes ----
    Await { operand: Expr, shape: AwaiterShape },
    CompoundAssign { op: BinaryOp, target: Expr, value: Expr, method: Option<Method> },
    IncrementAssign { op: IncrementOp, target: Expr },
    While { test: Expr, body: Expr, break_label: Option<LabelTarget>, continue_label: Option<LabelTarget> },
    For {
        variables: Vec<Variable>,
        initializers: Vec<Expr>,
        test: Option<Expr>,
        steppers: Vec<Expr>,
        body: Expr,
        break_label: Option<LabelTarget>,
        continue_label: Option<LabelTarget>,
    },
    ForEach {
        variable: Variable,
        collection: Expr,
        body: Expr,
        break_label: Option<LabelTarget>,
        continue_label: Option<LabelTarget>,
    },
    Using { variable: Option<Variable>, resource: Expr, body: Expr, dispose: Method },
    Lock { object: Expr, body: Expr },
}

/// An immutable, structurally shared expression node.
#[derive(Debug, Clone)]
pub struct Expr(Arc<ExprKind>);

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self(Arc::new(kind))
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0
    }

    /// Reference identity.
    pub fn ptr_eq(&self, other: &Expr) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind(), ExprKind::Default(Type::Void))
    }

    pub fn as_parameter(&self) -> Option<&Variable> {
        match self.kind() {
            ExprKind::Parameter(v) => Some(v),
            _ => None,
        }
    }

    /// Extension nodes must be reduced before the tree is handed to a backend.
    pub fn is_extension(&self) -> bool {
        matches!(
            self.kind(),
            ExprKind::Await { .. }
                | ExprKind::CompoundAssign { .. }
                | ExprKind::IncrementAssign { .. }
                | ExprKind::While { .. }
                | ExprKind::For { .. }
                | ExprKind::ForEach { .. }
                | ExprKind::Using { .. }
                | ExprKind::Lock { .. }
        )
    }

    /// Static type of the node.
    pub fn ty(&self) -> Type {
        match self.kind() {
            ExprKind::Constant { ty, .. } => ty.clone(),
            ExprKind::Default(ty) => ty.clone(),
            ExprKind::Parameter(v) => v.ty().clone(),
            ExprKind::Unary { ty, .. } => ty.clone(),
            ExprKind::Binary { ty, .. } => ty.clone(),
            ExprKind::Assign { target, .. } => target.ty(),
            ExprKind::Block { ty, .. } => ty.clone(),
            ExprKind::Conditional { ty, .. } => ty.clone(),
            ExprKind::Loop { break_label, .. } => {
                break_label.as_ref().map(|l| l.ty().clone()).unwrap_or(Type::Void)
            }
            ExprKind::Label { target, .. } => target.ty().clone(),
            ExprKind::Goto { ty, .. } => ty.clone(),
            ExprKind::Try { ty, .. } => ty.clone(),
            ExprKind::Switch { ty, .. } => ty.clone(),
            ExprKind::Throw { ty, .. } => ty.clone(),
            ExprKind::Rethrow { ty } => ty.clone(),
            ExprKind::Member { field, .. } => field.ty.clone(),
            ExprKind::Index { array, .. } => array.ty().element().cloned().unwrap_or(Type::Object),
            ExprKind::Call { method, .. } => method.ret().clone(),
            ExprKind::New { ty } => ty.clone(),
            ExprKind::NewArray { element, .. } => Type::array(element.clone()),
            ExprKind::Convert { ty, .. } => ty.clone(),
            ExprKind::Lambda(lambda) => lambda.ty(),
            ExprKind::Invoke { target, .. } => match target.ty() {
                Type::Function(_, ret) => *ret,
                _ => Type::Object,
            },
            ExprKind::MakeRef { location } => Type::reference(location.ty()),
            ExprKind::RefValue { reference } => match reference.ty() {
                Type::Ref(inner) => *inner,
                other => other,
            },
            ExprKind::RefInvoke { action, .. } => match action.ty() {
                Type::Function(_, ret) => *ret,
                _ => Type::Void,
            },
            ExprKind::Await { shape, .. } => shape.get_result.ret().clone(),
            ExprKind::CompoundAssign { target, .. } => target.ty(),
            ExprKind::IncrementAssign { target, .. } => target.ty(),
            ExprKind::While { .. } | ExprKind::For { .. } | ExprKind::ForEach { .. } => Type::Void,
            ExprKind::Using { body, .. } => body.ty(),
            ExprKind::Lock { body, .. } => body.ty(),
        }
    }

    /// Child expressions in evaluation order. Declarations (block variables, catch
    /// variables, lambda parameters) are not children.
    pub fn children(&self) -> Vec<&Expr> {
        let mut out = Vec::new();
        match self.kind() {
            ExprKind::Constant { .. }
            | ExprKind::Default(_)
            | ExprKind::Parameter(_)
            | ExprKind::Rethrow { .. }
            | ExprKind::New { .. } => {}
            ExprKind::Unary { operand, .. } => out.push(operand),
            ExprKind::Binary { left, right, conversion, .. } => {
                out.push(left);
                out.push(right);
                out.extend(conversion.iter());
            }
            ExprKind::Assign { target, value } => {
                out.push(target);
                out.push(value);
            }
            ExprKind::Block { exprs, .. } => out.extend(exprs.iter()),
            ExprKind::Conditional { test, if_true, if_false, .. } => {
                out.push(test);
                out.push(if_true);
                out.push(if_false);
            }
            ExprKind::Loop { body, .. } => out.push(body),
            ExprKind::Label { default, .. } => out.extend(default.iter()),
            ExprKind::Goto { value, .. } => out.extend(value.iter()),
            ExprKind::Try { body, handlers, finally, fault, .. } => {
                out.push(body);
                for h in handlers {
                    out.extend(h.filter.iter());
                    out.push(&h.body);
                }
                out.extend(finally.iter());
                out.extend(fault.iter());
            }
            ExprKind::Switch { value, cases, default, .. } => {
                out.push(value);
                for c in cases {
                    out.extend(c.test_values.iter());
                    out.push(&c.body);
                }
                out.extend(default.iter());
            }
            ExprKind::Throw { value, .. } => out.push(value),
            ExprKind::Member { object, .. } => out.push(object),
            ExprKind::Index { array, index } => {
                out.push(array);
                out.push(index);
            }
            ExprKind::Call { object, args, .. } => {
                out.extend(object.iter());
                out.extend(args.iter());
            }
            ExprKind::NewArray { items, .. } => out.extend(items.iter()),
            ExprKind::Convert { operand, .. } => out.push(operand),
            ExprKind::Lambda(lambda) => out.push(&lambda.body),
            ExprKind::Invoke { target, args } => {
                out.push(target);
                out.extend(args.iter());
            }
            ExprKind::MakeRef { location } => out.push(location),
            ExprKind::RefValue { reference } => out.push(reference),
            ExprKind::RefInvoke { reference, action } => {
                out.push(reference);
                out.push(action);
            }
            ExprKind::Await { operand, .. } => out.push(operand),
            ExprKind::CompoundAssign { target, value, .. } => {
                out.push(target);
                out.push(value);
            }
            ExprKind::IncrementAssign { target, .. } => out.push(target),
            ExprKind::While { test, body, .. } => {
                out.push(test);
                out.push(body);
            }
            ExprKind::For { initializers, test, steppers, body, .. } => {
                out.extend(initializers.iter());
                out.extend(test.iter());
                out.push(body);
                out.extend(steppers.iter());
            }
            ExprKind::ForEach { collection, body, .. } => {
                out.push(collection);
                out.push(body);
            }
            ExprKind::Using { resource, body, .. } => {
                out.push(resource);
                out.push(body);
            }
            ExprKind::Lock { object, body } => {
                out.push(object);
                out.push(body);
            }
        }
        out
    }

    /// Rebuild this node with replacement children, given in the order produced by
    /// [`Expr::children`]. Returns `self` (the same reference) when every replacement is
    /// pointer-equal to the original child.
    ///
    /// # Panics
    ///
    /// Panics if `kids` does not have exactly as many entries as `children()`.
    pub fn with_children(&self, kids: Vec<Expr>) -> Expr {
        let old = self.children();
        assert_eq!(old.len(), kids.len(), "with_children: child count mismatch");
        if old.iter().zip(kids.iter()).all(|(a, b)| a.ptr_eq(b)) {
            return self.clone();
        }
        let mut it = kids.into_iter();
        let mut next = || it.next().expect("with_children: child count checked above");
        let kind = match self.kind() {
            ExprKind::Constant { .. }
            | ExprKind::Default(_)
            | ExprKind::Parameter(_)
            | ExprKind::Rethrow { .. }
            | ExprKind::New { .. } => return self.clone(),
            ExprKind::Unary { op, ty, method, .. } => ExprKind::Unary {
                op: *op,
                operand: next(),
                ty: ty.clone(),
                method: method.clone(),
            },
            ExprKind::Binary { op, ty, method, conversion, .. } => {
                let left = next();
                let right = next();
                let conversion = conversion.as_ref().map(|_| next());
                ExprKind::Binary { op: *op, left, right, ty: ty.clone(), method: method.clone(), conversion }
            }
            ExprKind::Assign { .. } => {
                let target = next();
                let value = next();
                ExprKind::Assign { target, value }
            }
            ExprKind::Block { ty, variables, exprs } => ExprKind::Block {
                ty: ty.clone(),
                variables: variables.clone(),
                exprs: exprs.iter().map(|_| next()).collect(),
            },
            ExprKind::Conditional { ty, .. } => {
                let test = next();
                let if_true = next();
                let if_false = next();
                ExprKind::Conditional { test, if_true, if_false, ty: ty.clone() }
            }
            ExprKind::Loop { break_label, continue_label, .. } => ExprKind::Loop {
                body: next(),
                break_label: break_label.clone(),
                continue_label: continue_label.clone(),
            },
            ExprKind::Label { target, default } => ExprKind::Label {
                target: target.clone(),
                default: default.as_ref().map(|_| next()),
            },
            ExprKind::Goto { kind, target, value, ty } => ExprKind::Goto {
                kind: *kind,
                target: target.clone(),
                value: value.as_ref().map(|_| next()),
                ty: ty.clone(),
            },
            ExprKind::Try { ty, handlers, finally, fault, .. } => {
                let body = next();
                let handlers = handlers
                    .iter()
                    .map(|h| {
                        let filter = h.filter.as_ref().map(|_| next());
                        CatchBlock { test: h.test.clone(), variable: h.variable.clone(), filter, body: next() }
                    })
                    .collect();
                let finally = finally.as_ref().map(|_| next());
                let fault = fault.as_ref().map(|_| next());
                ExprKind::Try { ty: ty.clone(), body, handlers, finally, fault }
            }
            ExprKind::Switch { ty, cases, default, .. } => {
                let value = next();
                let cases = cases
                    .iter()
                    .map(|c| {
                        let test_values = c.test_values.iter().map(|_| next()).collect();
                        SwitchCase { test_values, body: next() }
                    })
                    .collect();
                let default = default.as_ref().map(|_| next());
                ExprKind::Switch { ty: ty.clone(), value, cases, default }
            }
            ExprKind::Throw { ty, .. } => ExprKind::Throw { value: next(), ty: ty.clone() },
            ExprKind::Member { field, .. } => ExprKind::Member { object: next(), field: field.clone() },
            ExprKind::Index { .. } => {
                let array = next();
                let index = next();
                ExprKind::Index { array, index }
            }
            ExprKind::Call { object, method, args } => {
                let object = object.as_ref().map(|_| next());
                let args = args.iter().map(|_| next()).collect();
                ExprKind::Call { object, method: method.clone(), args }
            }
            ExprKind::NewArray { element, items } => ExprKind::NewArray {
                element: element.clone(),
                items: items.iter().map(|_| next()).collect(),
            },
            ExprKind::Convert { ty, .. } => ExprKind::Convert { operand: next(), ty: ty.clone() },
            ExprKind::Lambda(lambda) => ExprKind::Lambda(LambdaExpr { body: next(), ..lambda.clone() }),
            ExprKind::Invoke { args, .. } => {
                let target = next();
                let args = args.iter().map(|_| next()).collect();
                ExprKind::Invoke { target, args }
            }
            ExprKind::MakeRef { .. } => ExprKind::MakeRef { location: next() },
            ExprKind::RefValue { .. } => ExprKind::RefValue { reference: next() },
            ExprKind::RefInvoke { .. } => {
                let reference = next();
                let action = next();
                ExprKind::RefInvoke { reference, action }
            }
            ExprKind::Await { shape, .. } => ExprKind::Await { operand: next(), shape: shape.clone() },
            ExprKind::CompoundAssign { op, method, .. } => {
                let target = next();
                let value = next();
                ExprKind::CompoundAssign { op: *op, target, value, method: method.clone() }
            }
            ExprKind::IncrementAssign { op, .. } => ExprKind::IncrementAssign { op: *op, target: next() },
            ExprKind::While { break_label, continue_label, .. } => {
                let test = next();
                let body = next();
                ExprKind::While {
                    test,
                    body,
                    break_label: break_label.clone(),
                    continue_label: continue_label.clone(),
                }
            }
            ExprKind::For { variables, initializers, test, steppers, break_label, continue_label, .. } => {
                let initializers = initializers.iter().map(|_| next()).collect();
                let test = test.as_ref().map(|_| next());
                let body = next();
                let steppers = steppers.iter().map(|_| next()).collect();
                ExprKind::For {
                    variables: variables.clone(),
                    initializers,
                    test,
                    steppers,
                    body,
                    break_label: break_label.clone(),
                    continue_label: continue_label.clone(),
                }
            }
            ExprKind::ForEach { variable, break_label, continue_label, .. } => {
                let collection = next();
                let body = next();
                ExprKind::ForEach {
                    variable: variable.clone(),
                    collection,
                    body,
                    break_label: break_label.clone(),
                    continue_label: continue_label.clone(),
                }
            }
            ExprKind::Using { variable, dispose, .. } => {
                let resource = next();
                let body = next();
                ExprKind::Using { variable: variable.clone(), resource, body, dispose: dispose.clone() }
            }
            ExprKind::Lock { .. } => {
                let object = next();
                let body = next();
                ExprKind::Lock { object, body }
            }
        };
        Expr::new(kind)
    }
}

impl From<ExprKind> for Expr {
    fn from(kind: ExprKind) -> Self {
        Expr::new(kind)
    }
}
