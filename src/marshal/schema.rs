//! Record schemas
//!
//! A record type is declared once as an ordered list of `(name, TypeDecl)`
//! pairs. Registration resolves every declaration into a [`FieldType`]; unions
//! that do not collapse to "T or nothing" are rejected here, never at
//! conversion time.

use once_cell::sync::OnceCell;
use serde_json::Value;
use std::collections::HashSet;

use super::convert::{PlainRecord, ValidatedRecord};
use super::error::MarshalError;

/// Leaf value kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    Bool,
    /// Non-negative integer.
    UInt,
    Float,
    Str,
    /// Filesystem path, carried as a string.
    Path,
}

impl Scalar {
    pub fn name(self) -> &'static str {
        match self {
            Scalar::Bool => "boolean",
            Scalar::UInt => "non-negative integer",
            Scalar::Float => "number",
            Scalar::Str => "string",
            Scalar::Path => "path string",
        }
    }

    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Scalar::Bool => value.is_boolean(),
            Scalar::UInt => value.is_u64(),
            Scalar::Float => value.is_number(),
            Scalar::Str | Scalar::Path => value.is_string(),
        }
    }
}

/// The two record families a nested field may belong to.
///
/// `Plain` records are walked field by field through their own [`RecordType`].
/// `Validated` records are handed whole to an external schema validator
/// (their serde implementation), which is also the shape LLM structured
/// output is requested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFamily {
    Plain,
    Validated,
}

/// A nested record reference, tagged with its family at declaration time.
#[derive(Clone, Copy)]
pub enum RecordKind {
    Plain {
        name: &'static str,
        schema: fn() -> Result<&'static RecordType, MarshalError>,
    },
    Validated {
        name: &'static str,
    },
}

impl RecordKind {
    pub fn name(&self) -> &'static str {
        match self {
            RecordKind::Plain { name, .. } | RecordKind::Validated { name } => name,
        }
    }

    pub fn family(&self) -> RecordFamily {
        match self {
            RecordKind::Plain { .. } => RecordFamily::Plain,
            RecordKind::Validated { .. } => RecordFamily::Validated,
        }
    }
}

impl std::fmt::Debug for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self.family(), self.name())
    }
}

impl PartialEq for RecordKind {
    fn eq(&self, other: &Self) -> bool {
        self.family() == other.family() && self.name() == other.name()
    }
}

/// Field type as written by a schema author, before resolution.
#[derive(Debug, Clone)]
pub enum TypeDecl {
    Scalar(Scalar),
    Null,
    Record(RecordKind),
    Sequence(Box<TypeDecl>),
    Union(Vec<TypeDecl>),
}

impl TypeDecl {
    pub fn bool() -> Self {
        TypeDecl::Scalar(Scalar::Bool)
    }

    pub fn uint() -> Self {
        TypeDecl::Scalar(Scalar::UInt)
    }

    pub fn float() -> Self {
        TypeDecl::Scalar(Scalar::Float)
    }

    pub fn string() -> Self {
        TypeDecl::Scalar(Scalar::Str)
    }

    pub fn path() -> Self {
        TypeDecl::Scalar(Scalar::Path)
    }

    pub fn seq(inner: TypeDecl) -> Self {
        TypeDecl::Sequence(Box::new(inner))
    }

    /// `inner` or nothing.
    pub fn optional(inner: TypeDecl) -> Self {
        TypeDecl::Union(vec![inner, TypeDecl::Null])
    }

    pub fn plain<T: PlainRecord>() -> Self {
        TypeDecl::Record(RecordKind::Plain {
            name: T::NAME,
            schema: T::record_type,
        })
    }

    pub fn validated<T: ValidatedRecord>() -> Self {
        TypeDecl::Record(RecordKind::Validated { name: T::NAME })
    }
}

/// Field type after registration.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Scalar(Scalar),
    Record(RecordKind),
    Sequence(Box<FieldType>),
    Optional(Box<FieldType>),
}

impl FieldType {
    pub fn is_optional(&self) -> bool {
        matches!(self, FieldType::Optional(_))
    }

    /// The type with one level of optionality stripped.
    pub fn required(&self) -> &FieldType {
        match self {
            FieldType::Optional(inner) => inner,
            other => other,
        }
    }

    /// The record a field holds, looking through optionals and sequences.
    pub fn record_kind(&self) -> Option<&RecordKind> {
        match self {
            FieldType::Record(kind) => Some(kind),
            FieldType::Sequence(inner) | FieldType::Optional(inner) => inner.record_kind(),
            FieldType::Scalar(_) => None,
        }
    }

    /// Human readable name used in mismatch errors.
    pub fn describe(&self) -> String {
        match self {
            FieldType::Scalar(s) => s.name().to_string(),
            FieldType::Record(kind) => format!("mapping for record `{}`", kind.name()),
            FieldType::Sequence(inner) => format!("sequence of {}", inner.describe()),
            FieldType::Optional(inner) => format!("optional {}", inner.describe()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub ty: FieldType,
}

/// A registered record shape: unique field names in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordType {
    name: &'static str,
    fields: Vec<FieldDescriptor>,
}

impl RecordType {
    /// Resolve a declaration into a record type.
    pub fn register(
        name: &'static str,
        decls: Vec<(&'static str, TypeDecl)>,
    ) -> Result<Self, MarshalError> {
        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(decls.len());

        for (field, decl) in decls {
            if !seen.insert(field) {
                return Err(MarshalError::unsupported(
                    name,
                    field,
                    "field declared more than once",
                ));
            }
            let ty = resolve(&decl).map_err(|reason| MarshalError::unsupported(name, field, reason))?;
            fields.push(FieldDescriptor { name: field, ty });
        }

        Ok(Self { name, fields })
    }

    /// Registration for a [`PlainRecord`] implementor, cached in its static
    /// cell. A declaration that fails to register is never cached and the
    /// error is returned to every caller.
    pub fn registered<T: PlainRecord>(
        cell: &'static OnceCell<RecordType>,
    ) -> Result<&'static RecordType, MarshalError> {
        cell.get_or_try_init(|| Self::register(T::NAME, T::fields()))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

fn resolve(decl: &TypeDecl) -> Result<FieldType, String> {
    match decl {
        TypeDecl::Scalar(s) => Ok(FieldType::Scalar(*s)),
        TypeDecl::Record(kind) => Ok(FieldType::Record(*kind)),
        TypeDecl::Sequence(inner) => Ok(FieldType::Sequence(Box::new(resolve(inner)?))),
        TypeDecl::Null => Err("null is only valid as a union alternative".to_string()),
        TypeDecl::Union(alternatives) => {
            let has_null = alternatives.iter().any(|a| matches!(a, TypeDecl::Null));
            let concrete: Vec<&TypeDecl> = alternatives
                .iter()
                .filter(|a| !matches!(a, TypeDecl::Null))
                .collect();

            match concrete.as_slice() {
                [] => Err("union has no non-null alternative".to_string()),
                [single] => {
                    let inner = resolve(single)?;
                    if has_null && !inner.is_optional() {
                        Ok(FieldType::Optional(Box::new(inner)))
                    } else {
                        Ok(inner)
                    }
                }
                many => Err(format!(
                    "ambiguous union with {} non-null alternatives",
                    many.len()
                )),
            }
        }
    }
}
