//! The whole-program symbol index.
//!
//! [`Program`] owns the class, field, and method tables; ids are dense arena
//! indices into those tables. Resolution failures surface as
//! [`Error::UnknownClass`]/[`Error::UnknownField`]/[`Error::UnknownMethod`]
//! rather than panics, since stale ids indicate front-end bugs the host wants
//! reported, not aborted on.

use std::fmt;

use bitflags::bitflags;

use crate::{ir::MethodBody, Error, Result};

/// Index of a class in the program's class table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    /// Creates a class id from its table index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the table index of this id.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// Index of a field in the program's field table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(u32);

impl FieldId {
    /// Creates a field id from its table index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the table index of this id.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field#{}", self.0)
    }
}

/// Index of a method in the program's method table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(u32);

impl MethodId {
    /// Creates a method id from its table index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the table index of this id.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "method#{}", self.0)
    }
}

/// Declared type of a field, at the granularity the analysis distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Integer-valued field; unwritten fields default to zero.
    Int,
    /// Reference-valued field (boxed integers, objects).
    Reference,
}

bitflags! {
    /// Declared modifiers of a field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FieldFlags: u8 {
        /// The field is static (one slot per class, not per instance).
        const STATIC = 1;
        /// The field is final (assigned only during construction/initialization).
        const FINAL = 1 << 1;
    }
}

bitflags! {
    /// Declared modifiers of a method.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodFlags: u8 {
        /// Static method (no receiver).
        const STATIC = 1;
        /// Instance constructor.
        const CONSTRUCTOR = 1 << 1;
        /// Static class initializer.
        const CLASS_INIT = 1 << 2;
        /// Final method (not overridable).
        const FINAL = 1 << 3;
        /// Abstract or otherwise body-less declared method.
        const ABSTRACT = 1 << 4;
    }
}

/// Well-known external methods the analysis models precisely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    /// The small-integer boxing factory (`Integer.valueOf` in the original
    /// runtime): for arguments inside the cache range it returns the
    /// canonical pre-allocated instance, giving an identity guarantee on top
    /// of value equality.
    BoxInt,
}

/// A class declaration: name plus its declared fields and methods.
#[derive(Debug, Clone)]
pub struct Class {
    /// Fully qualified class name.
    pub name: String,
    /// Fields declared by this class.
    pub fields: Vec<FieldId>,
    /// Methods declared by this class.
    pub methods: Vec<MethodId>,
}

/// A field declaration.
#[derive(Debug, Clone)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Declaring class.
    pub class: ClassId,
    /// Declared value type.
    pub ty: ValueType,
    /// Declared modifiers.
    pub flags: FieldFlags,
}

impl Field {
    /// Returns `true` if this field is static.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldFlags::STATIC)
    }

    /// Returns `true` if this field is final.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.flags.contains(FieldFlags::FINAL)
    }
}

/// A method declaration with an optional body.
///
/// External methods (runtime library, unresolved references) carry no body;
/// the analysis treats their results as unknown unless an [`Intrinsic`] model
/// applies.
#[derive(Debug, Clone)]
pub struct Method {
    /// Method name.
    pub name: String,
    /// Declaring class.
    pub class: ClassId,
    /// Declared modifiers.
    pub flags: MethodFlags,
    /// Number of parameters, including the receiver for instance methods.
    pub param_count: u16,
    /// The method body, if the front end resolved one.
    pub body: Option<MethodBody>,
    /// Precise model for well-known external methods.
    pub intrinsic: Option<Intrinsic>,
}

impl Method {
    /// Returns `true` if this method is static.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }

    /// Returns `true` if this method is an instance constructor.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.flags.contains(MethodFlags::CONSTRUCTOR)
    }

    /// Returns `true` if this method is the static class initializer.
    #[must_use]
    pub fn is_class_init(&self) -> bool {
        self.flags.contains(MethodFlags::CLASS_INIT)
    }
}

/// The whole-program model: class, field, and method tables.
///
/// Constructed through [`ProgramBuilder`](crate::ir::ProgramBuilder); the
/// rewriter mutates method bodies in place and leaves the symbol tables
/// untouched.
#[derive(Debug, Clone)]
pub struct Program {
    pub(crate) classes: Vec<Class>,
    pub(crate) fields: Vec<Field>,
    pub(crate) methods: Vec<Method>,
}

impl Program {
    /// Resolves a class id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownClass`] if the id is not in the class table.
    pub fn class(&self, id: ClassId) -> Result<&Class> {
        self.classes.get(id.index()).ok_or(Error::UnknownClass(id))
    }

    /// Resolves a field id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownField`] if the id is not in the field table.
    pub fn field(&self, id: FieldId) -> Result<&Field> {
        self.fields.get(id.index()).ok_or(Error::UnknownField(id))
    }

    /// Resolves a method id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMethod`] if the id is not in the method table.
    pub fn method(&self, id: MethodId) -> Result<&Method> {
        self.methods.get(id.index()).ok_or(Error::UnknownMethod(id))
    }

    /// Returns mutable access to a method, for body rewriting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMethod`] if the id is not in the method table.
    pub fn method_mut(&mut self, id: MethodId) -> Result<&mut Method> {
        self.methods
            .get_mut(id.index())
            .ok_or(Error::UnknownMethod(id))
    }

    /// Returns the number of declared fields.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Iterates over all classes with their ids.
    pub fn classes(&self) -> impl Iterator<Item = (ClassId, &Class)> {
        self.classes
            .iter()
            .enumerate()
            .map(|(i, c)| (ClassId::new(u32::try_from(i).unwrap_or(u32::MAX)), c))
    }

    /// Iterates over all fields with their ids.
    pub fn fields(&self) -> impl Iterator<Item = (FieldId, &Field)> {
        self.fields
            .iter()
            .enumerate()
            .map(|(i, f)| (FieldId::new(u32::try_from(i).unwrap_or(u32::MAX)), f))
    }

    /// Iterates over all methods with their ids.
    pub fn methods(&self) -> impl Iterator<Item = (MethodId, &Method)> {
        self.methods
            .iter()
            .enumerate()
            .map(|(i, m)| (MethodId::new(u32::try_from(i).unwrap_or(u32::MAX)), m))
    }

    /// Returns the constructors declared by a class.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownClass`] if the id is not in the class table.
    pub fn constructors_of(&self, class: ClassId) -> Result<Vec<MethodId>> {
        let class = self.class(class)?;
        Ok(class
            .methods
            .iter()
            .copied()
            .filter(|m| {
                self.methods
                    .get(m.index())
                    .is_some_and(Method::is_constructor)
            })
            .collect())
    }

    /// Returns the class initializer of a class, if it declares one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownClass`] if the id is not in the class table.
    pub fn class_init_of(&self, class: ClassId) -> Result<Option<MethodId>> {
        let class = self.class(class)?;
        Ok(class.methods.iter().copied().find(|m| {
            self.methods
                .get(m.index())
                .is_some_and(Method::is_class_init)
        }))
    }

    /// Returns the fully qualified `Class.method` name for diagnostics.
    #[must_use]
    pub fn qualified_method_name(&self, id: MethodId) -> String {
        match self.method(id) {
            Ok(method) => {
                let class = self
                    .class(method.class)
                    .map(|c| c.name.as_str())
                    .unwrap_or("<unknown>");
                format!("{}.{}", class, method.name)
            }
            Err(_) => format!("{id}"),
        }
    }

    /// Returns the fully qualified `Class.field` name for diagnostics.
    #[must_use]
    pub fn qualified_field_name(&self, id: FieldId) -> String {
        match self.field(id) {
            Ok(field) => {
                let class = self
                    .class(field.class)
                    .map(|c| c.name.as_str())
                    .unwrap_or("<unknown>");
                format!("{}.{}", class, field.name)
            }
            Err(_) => format!("{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_ids_are_errors() {
        let program = Program {
            classes: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        };
        assert!(matches!(
            program.class(ClassId::new(0)),
            Err(Error::UnknownClass(_))
        ));
        assert!(matches!(
            program.field(FieldId::new(7)),
            Err(Error::UnknownField(_))
        ));
        assert!(matches!(
            program.method(MethodId::new(1)),
            Err(Error::UnknownMethod(_))
        ));
    }

    #[test]
    fn test_flags() {
        let field = Field {
            name: "f".into(),
            class: ClassId::new(0),
            ty: ValueType::Int,
            flags: FieldFlags::STATIC | FieldFlags::FINAL,
        };
        assert!(field.is_static());
        assert!(field.is_final());

        let method = Method {
            name: "<init>".into(),
            class: ClassId::new(0),
            flags: MethodFlags::CONSTRUCTOR,
            param_count: 1,
            body: None,
            intrinsic: None,
        };
        assert!(method.is_constructor());
        assert!(!method.is_static());
    }
}
