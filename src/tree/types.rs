use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use crate::tree::expr::Method;

/// Static type of an expression node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Bool,
    Int,
    Double,
    String,
    Object,
    /// Nullable value type (`int?`, `bool?`). Reference types are nullable on their own.
    Nullable(Box<Type>),
    Array(Box<Type>),
    Class(Arc<ClassInfo>),
    /// By-reference wrapper over a storage location of the inner type.
    Ref(Box<Type>),
    Function(Vec<Type>, Box<Type>),
}

/// A nominal reference type with an optional base class.
///
/// Methods are attached after construction (see [`ClassInfo::define_methods`]) because
/// their signatures usually mention the class itself.
pub struct ClassInfo {
    pub name: String,
    pub base: Option<Type>,
    pub fields: Vec<(String, Type)>,
    methods: OnceLock<Vec<Method>>,
}

impl ClassInfo {
    pub fn new(name: impl Into<String>, base: Option<Type>, fields: Vec<(String, Type)>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            base,
            fields,
            methods: OnceLock::new(),
        })
    }

    /// Attach the method table. Returns false if methods were already defined.
    pub fn define_methods(&self, methods: Vec<Method>) -> bool {
        self.methods.set(methods).is_ok()
    }

    pub fn methods(&self) -> &[Method] {
        self.methods.get().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Look up a method by name and arity, searching base classes too.
    pub fn find_method(&self, name: &str, arity: usize) -> Option<Method> {
        if let Some(m) = self.methods().iter().find(|m| m.name() == name && m.params().len() == arity) {
            return Some(m.clone());
        }
        match &self.base {
            Some(Type::Class(base)) => base.find_method(name, arity),
            _ => None,
        }
    }

    pub fn field_type(&self, name: &str) -> Option<Type> {
        if let Some((_, ty)) = self.fields.iter().find(|(n, _)| n == name) {
            return Some(ty.clone());
        }
        match &self.base {
            Some(Type::Class(base)) => base.field_type(name),
            _ => None,
        }
    }

    /// All fields including inherited ones, base fields first.
    pub fn all_fields(&self) -> Vec<(String, Type)> {
        let mut fields = match &self.base {
            Some(Type::Class(base)) => base.all_fields(),
            _ => Vec::new(),
        };
        fields.extend(self.fields.iter().cloned());
        fields
    }

    pub fn derives_from(&self, name: &str) -> bool {
        if self.name == name {
            return true;
        }
        match &self.base {
            Some(Type::Class(base)) => base.derives_from(name),
            _ => false,
        }
    }
}

impl fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("name", &self.name)
            .field("base", &self.base.as_ref().map(|b| b.to_string()))
            .finish()
    }
}

// Classes are nominal.
impl PartialEq for ClassInfo {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ClassInfo {}

impl Hash for ClassInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Type {
    pub fn nullable(inner: Type) -> Type {
        Type::Nullable(Box::new(inner))
    }

    pub fn array(element: Type) -> Type {
        Type::Array(Box::new(element))
    }

    pub fn reference(inner: Type) -> Type {
        Type::Ref(Box::new(inner))
    }

    pub fn function(params: Vec<Type>, ret: Type) -> Type {
        Type::Function(params, Box::new(ret))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Type::String | Type::Object | Type::Array(_) | Type::Class(_) | Type::Ref(_) | Type::Function(..)
        )
    }

    pub fn is_nullable_value(&self) -> bool {
        matches!(self, Type::Nullable(_))
    }

    /// True if `null` is a valid value of this type.
    pub fn admits_null(&self) -> bool {
        self.is_reference() || self.is_nullable_value()
    }

    /// Strip one level of `Nullable`.
    pub fn non_nullable(&self) -> &Type {
        match self {
            Type::Nullable(inner) => inner,
            other => other,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.non_nullable(), Type::Int | Type::Double)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self.non_nullable(), Type::Bool)
    }

    pub fn class(&self) -> Option<&Arc<ClassInfo>> {
        match self {
            Type::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::Array(e) => Some(e),
            _ => None,
        }
    }

    /// Whether a value of type `source` can be stored where `self` is expected without
    /// an explicit conversion: identity, reference widening, boxing to `object`, or
    /// wrapping into a nullable.
    pub fn is_assignable_from(&self, source: &Type) -> bool {
        if self == source {
            return true;
        }
        match (self, source) {
            (_, Type::Void) => false,
            (Type::Object, _) => true,
            (Type::Nullable(inner), src) => inner.as_ref() == src,
            (Type::Class(target), Type::Class(src)) => src.derives_from(&target.name),
            _ => false,
        }
    }

    /// Whether a reference conversion between the two types preserves identity
    /// (upcast or checked downcast).
    pub fn is_reference_convertible(&self, other: &Type) -> bool {
        self.is_reference() && other.is_reference() && (self.is_assignable_from(other) || other.is_assignable_from(self))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Double => write!(f, "double"),
            Type::String => write!(f, "string"),
            Type::Object => write!(f, "object"),
            Type::Nullable(inner) => write!(f, "{inner}?"),
            Type::Array(inner) => write!(f, "{inner}[]"),
            Type::Class(c) => write!(f, "{}", c.name),
            Type::Ref(inner) => write!(f, "ref {inner}"),
            Type::Function(params, ret) => {
                write!(f, "(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{p}")?;
                }
                write!(f, ") -> {ret}")
            }
        }
    }
}
