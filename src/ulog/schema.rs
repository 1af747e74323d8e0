//! Composite schemas and the registry that resolves them.
//!
//! Format definitions can arrive in any order, so a schema may name a nested
//! type before that type is defined. Such a reference is stored as
//! [`CompositeRef::Unresolved`]. Each new definition is filled in from what
//! the registry already knows, and is then substituted into every stored
//! schema that was waiting for it. Schemas are plain owned trees; the
//! registry re-derives and re-inserts them instead of sharing nodes.

use std::collections::BTreeMap;
use std::fmt::{self, Write};
use std::sync::LazyLock;

use regex::Regex;

use super::codec::PrimitiveKind;
use super::error::QueryError;

/// `name` or `name[count]`.
static TYPE_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)(?:\[(\d+)\])?$").expect("Invalid type token regex")
});

static FIELD_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid field name regex"));

const PADDING_PREFIX: &str = "_padding";

/// Why a format definition was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// No `name:` prefix.
    MissingColon,
    /// The type name before the colon is not a valid identifier.
    BadTypeName(String),
    /// A field is not of the form `<type> <name>`.
    BadField(String),
    /// A type token is not `type` or `type[count]`.
    BadTypeToken(String),
    /// An array was declared with zero elements.
    ZeroCount(String),
    /// The same field name appears twice.
    DuplicateField(String),
}

impl fmt::Display for DefinitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefinitionError::MissingColon => write!(f, "definition has no ':' separator"),
            DefinitionError::BadTypeName(name) => write!(f, "invalid type name '{name}'"),
            DefinitionError::BadField(field) => write!(f, "malformed field '{field}'"),
            DefinitionError::BadTypeToken(token) => write!(f, "malformed type '{token}'"),
            DefinitionError::ZeroCount(token) => write!(f, "zero-length array '{token}'"),
            DefinitionError::DuplicateField(name) => write!(f, "duplicate field '{name}'"),
        }
    }
}

impl std::error::Error for DefinitionError {}

/// A nested composite type, by name until its definition is known.
#[derive(Debug, Clone, PartialEq)]
pub enum CompositeRef {
    Unresolved(String),
    Resolved(Box<Schema>),
}

impl CompositeRef {
    pub fn name(&self) -> &str {
        match self {
            CompositeRef::Unresolved(name) => name,
            CompositeRef::Resolved(schema) => &schema.type_name,
        }
    }

    pub fn schema(&self) -> Option<&Schema> {
        match self {
            CompositeRef::Unresolved(_) => None,
            CompositeRef::Resolved(schema) => Some(schema),
        }
    }
}

/// The type of one schema field.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Builtin(PrimitiveKind),
    BuiltinArray(PrimitiveKind, usize),
    Composite(CompositeRef),
    CompositeArray(CompositeRef, usize),
}

impl Property {
    /// Parse a type token such as `float`, `uint8_t[4]` or `vehicle_status`.
    pub fn parse(token: &str) -> Result<Self, DefinitionError> {
        let caps = TYPE_TOKEN_RE
            .captures(token)
            .ok_or_else(|| DefinitionError::BadTypeToken(token.to_string()))?;
        let base = &caps[1];
        let count = match caps.get(2) {
            Some(m) => {
                let n: usize = m
                    .as_str()
                    .parse()
                    .map_err(|_| DefinitionError::BadTypeToken(token.to_string()))?;
                if n == 0 {
                    return Err(DefinitionError::ZeroCount(token.to_string()));
                }
                Some(n)
            }
            None => None,
        };

        let property = match (PrimitiveKind::from_type_name(base), count) {
            (Some(kind), None) => Property::Builtin(kind),
            (Some(kind), Some(n)) => Property::BuiltinArray(kind, n),
            (None, None) => Property::Composite(CompositeRef::Unresolved(base.to_string())),
            (None, Some(n)) => {
                Property::CompositeArray(CompositeRef::Unresolved(base.to_string()), n)
            }
        };
        Ok(property)
    }

    /// Size of this field in a packed sample, or `Err(missing type name)`.
    fn size(&self) -> Result<usize, &str> {
        match self {
            Property::Builtin(kind) => Ok(kind.width()),
            Property::BuiltinArray(kind, n) => Ok(kind.width() * n),
            Property::Composite(r) => composite_size(r),
            Property::CompositeArray(r, n) => Ok(composite_size(r)? * n),
        }
    }

    /// Size of this field in a packed sample.
    pub fn byte_count(&self) -> Result<usize, QueryError> {
        self.size().map_err(|missing| QueryError::UnresolvedType {
            type_name: self.type_label(),
            missing: missing.to_string(),
        })
    }

    /// `char[N]` fields are text, not arrays of characters.
    pub fn is_text(&self) -> bool {
        matches!(self, Property::BuiltinArray(PrimitiveKind::Char, _))
    }

    pub fn composite(&self) -> Option<&CompositeRef> {
        match self {
            Property::Composite(r) | Property::CompositeArray(r, _) => Some(r),
            _ => None,
        }
    }

    /// The type as it would be written in a definition.
    pub fn type_label(&self) -> String {
        match self {
            Property::Builtin(kind) => kind.type_name().to_string(),
            Property::BuiltinArray(kind, n) => format!("{}[{n}]", kind.type_name()),
            Property::Composite(r) => r.name().to_string(),
            Property::CompositeArray(r, n) => format!("{}[{n}]", r.name()),
        }
    }

    fn map_composite(self, f: impl FnOnce(CompositeRef) -> CompositeRef) -> Self {
        match self {
            Property::Composite(r) => Property::Composite(f(r)),
            Property::CompositeArray(r, n) => Property::CompositeArray(f(r), n),
            other => other,
        }
    }
}

fn composite_size(r: &CompositeRef) -> Result<usize, &str> {
    match r {
        CompositeRef::Unresolved(name) => Err(name.as_str()),
        CompositeRef::Resolved(schema) => schema.nested_size(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub property: Property,
}

/// A named, ordered set of fields with a packed layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    pub type_name: String,
    pub fields: Vec<Field>,
    /// Width of a dropped trailing `_padding*` field. The logger omits these
    /// bytes from a top-level sample but writes them when the type is
    /// nested inside another.
    pub trailing_padding: usize,
}

impl Schema {
    /// Parse a definition of the form `name:type1 field1;type2 field2;`.
    ///
    /// A trailing `_padding*` field is dropped from `fields` and kept only
    /// as [`trailing_padding`](Self::trailing_padding).
    pub fn parse(definition: &str) -> Result<Self, DefinitionError> {
        let (type_name, body) = definition
            .split_once(':')
            .ok_or(DefinitionError::MissingColon)?;
        let type_name = type_name.trim();
        if !TYPE_TOKEN_RE.is_match(type_name) || type_name.contains('[') {
            return Err(DefinitionError::BadTypeName(type_name.to_string()));
        }

        let mut fields: Vec<Field> = Vec::new();
        for raw in body.split(';') {
            let raw = raw.trim_matches(|c: char| c.is_whitespace() || c == '\0');
            if raw.is_empty() {
                continue;
            }
            let mut parts = raw.split_whitespace();
            let (Some(token), Some(name), None) = (parts.next(), parts.next(), parts.next())
            else {
                return Err(DefinitionError::BadField(raw.to_string()));
            };
            if !FIELD_NAME_RE.is_match(name) {
                return Err(DefinitionError::BadField(raw.to_string()));
            }
            if fields.iter().any(|f| f.name == name) {
                return Err(DefinitionError::DuplicateField(name.to_string()));
            }
            fields.push(Field {
                name: name.to_string(),
                property: Property::parse(token)?,
            });
        }

        let trailing_padding = fields
            .last()
            .filter(|f| f.name.starts_with(PADDING_PREFIX))
            .and_then(|f| f.property.size().ok());
        if trailing_padding.is_some() {
            fields.pop();
        }
        let trailing_padding = trailing_padding.unwrap_or(0);

        Ok(Self {
            type_name: type_name.to_string(),
            fields,
            trailing_padding,
        })
    }

    /// Find a field and its position by name.
    pub fn field(&self, name: &str) -> Option<(usize, &Field)> {
        self.fields.iter().enumerate().find(|(_, f)| f.name == name)
    }

    fn size(&self) -> Result<usize, &str> {
        self.fields.iter().map(|f| f.property.size()).sum()
    }

    fn nested_size(&self) -> Result<usize, &str> {
        Ok(self.size()? + self.trailing_padding)
    }

    /// Size of one packed top-level sample. Fails if any nested type is
    /// unresolved.
    pub fn byte_count(&self) -> Result<usize, QueryError> {
        self.size().map_err(|missing| QueryError::UnresolvedType {
            type_name: self.type_name.clone(),
            missing: missing.to_string(),
        })
    }

    /// Size of this type as a field of another type, trailing padding
    /// included. This is the stride of an array of it.
    pub fn nested_byte_count(&self) -> Result<usize, QueryError> {
        self.nested_size().map_err(|missing| QueryError::UnresolvedType {
            type_name: self.type_name.clone(),
            missing: missing.to_string(),
        })
    }

    /// Offset of field `index`: the sum of every field before it.
    pub fn field_offset(&self, index: usize) -> Result<usize, QueryError> {
        self.fields[..index.min(self.fields.len())]
            .iter()
            .map(|f| f.property.size())
            .sum::<Result<usize, &str>>()
            .map_err(|missing| QueryError::UnresolvedType {
                type_name: self.type_name.clone(),
                missing: missing.to_string(),
            })
    }

    /// True if `name` appears anywhere in this schema's field tree.
    pub fn references(&self, name: &str) -> bool {
        self.fields.iter().any(|f| match f.property.composite() {
            Some(r) => r.name() == name || r.schema().is_some_and(|s| s.references(name)),
            None => false,
        })
    }

    /// The first nested type name that is still unresolved, depth first.
    pub fn first_unresolved(&self) -> Option<&str> {
        self.fields.iter().find_map(|f| match f.property.composite()? {
            CompositeRef::Unresolved(name) => Some(name.as_str()),
            CompositeRef::Resolved(schema) => schema.first_unresolved(),
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.first_unresolved().is_none()
    }

    /// Replace every reference to `replacement`'s type with a copy of it.
    /// The replacement itself is not searched.
    fn substitute(self, replacement: &Schema) -> Schema {
        let fields = self
            .fields
            .into_iter()
            .map(|f| Field {
                name: f.name,
                property: f.property.map_composite(|r| {
                    if r.name() == replacement.type_name {
                        CompositeRef::Resolved(Box::new(replacement.clone()))
                    } else {
                        match r {
                            CompositeRef::Resolved(s) => {
                                CompositeRef::Resolved(Box::new(s.substitute(replacement)))
                            }
                            unresolved => unresolved,
                        }
                    }
                }),
            })
            .collect();
        Schema {
            type_name: self.type_name,
            fields,
            trailing_padding: self.trailing_padding,
        }
    }

    /// Human readable field tree with absolute byte offsets.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        match self.byte_count() {
            Ok(n) => {
                let _ = writeln!(out, "{} ({n} bytes)", self.type_name);
            }
            Err(_) => {
                let _ = writeln!(out, "{} (unresolved)", self.type_name);
            }
        }
        describe_fields(&self.fields, 1, Some(0), &mut out);
        out
    }
}

fn describe_fields(fields: &[Field], depth: usize, base: Option<usize>, out: &mut String) {
    let indent = "  ".repeat(depth);
    let mut offset = base;
    for field in fields {
        let at = match offset {
            Some(o) => format!("@{o}"),
            None => "@?".to_string(),
        };
        let _ = write!(out, "{indent}{} {} {at}", field.property.type_label(), field.name);
        match field.property.composite() {
            Some(CompositeRef::Unresolved(_)) => {
                let _ = writeln!(out, " <unresolved>");
            }
            Some(CompositeRef::Resolved(schema)) => {
                let _ = writeln!(out);
                describe_fields(&schema.fields, depth + 1, offset, out);
            }
            None => {
                let _ = writeln!(out);
            }
        }
        offset = match (offset, field.property.size()) {
            (Some(o), Ok(n)) => Some(o + n),
            _ => None,
        };
    }
}

/// Every schema seen in the stream, keyed by type name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Schema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a definition string and add it to the registry.
    pub fn define(&mut self, definition: &str) -> Result<&Schema, DefinitionError> {
        let schema = Schema::parse(definition)?;
        Ok(self.insert(schema))
    }

    /// Add a schema, resolving in both directions:
    ///
    /// 1. fill the new schema's nested references from the known schemas
    /// 2. substitute the filled schema into every known schema that names it
    ///
    /// A later definition of the same name replaces the earlier one.
    pub fn insert(&mut self, schema: Schema) -> &Schema {
        let name = schema.type_name.clone();
        let mut lineage = vec![name.clone()];
        let expanded = self.expand(schema, &mut lineage);

        for (other_name, other) in self.schemas.iter_mut() {
            if *other_name != name && other.references(&name) {
                *other = std::mem::take(other).substitute(&expanded);
            }
        }

        self.schemas.insert(name.clone(), expanded);
        &self.schemas[&name]
    }

    /// Fill every nested reference in `schema` from the registry. Names
    /// already on `lineage` stay unresolved: a packed layout cannot contain
    /// itself.
    fn expand(&self, schema: Schema, lineage: &mut Vec<String>) -> Schema {
        let fields = schema
            .fields
            .into_iter()
            .map(|f| Field {
                name: f.name,
                property: f.property.map_composite(|r| self.fill(r, lineage)),
            })
            .collect();
        Schema {
            type_name: schema.type_name,
            fields,
            trailing_padding: schema.trailing_padding,
        }
    }

    fn fill(&self, r: CompositeRef, lineage: &mut Vec<String>) -> CompositeRef {
        let name = r.name().to_string();
        if lineage.contains(&name) {
            return CompositeRef::Unresolved(name);
        }
        let source = match (self.schemas.get(&name), r) {
            (Some(known), _) => known.clone(),
            (None, CompositeRef::Resolved(schema)) => *schema,
            (None, unresolved) => return unresolved,
        };
        lineage.push(name);
        let filled = self.expand(source, lineage);
        lineage.pop();
        CompositeRef::Resolved(Box::new(filled))
    }

    pub fn get(&self, type_name: &str) -> Option<&Schema> {
        self.schemas.get(type_name)
    }

    /// Look up a schema, failing with `UnknownType`.
    pub fn schema(&self, type_name: &str) -> Result<&Schema, QueryError> {
        self.get(type_name)
            .ok_or_else(|| QueryError::UnknownType(type_name.to_string()))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.schemas.contains_key(type_name)
    }

    /// Type names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Schema> {
        self.schemas.values()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn byte_count(&self, type_name: &str) -> Result<usize, QueryError> {
        self.schema(type_name)?.byte_count()
    }

    pub fn describe(&self, type_name: &str) -> Result<String, QueryError> {
        Ok(self.schema(type_name)?.describe())
    }
}
