//! Dotted field paths and their byte offsets.
//!
//! A path like `setpoints[2].position` walks the schema tree one segment at
//! a time. Offsets add up the packed size of every earlier sibling at each
//! level; there is never any alignment padding.

use std::sync::LazyLock;

use regex::Regex;

use super::error::QueryError;
use super::schema::{Property, Schema, SchemaRegistry};

static SEGMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)(?:\[(\d+)\])?$").expect("Invalid path segment regex")
});

/// One `name` or `name[index]` step of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub name: String,
    pub index: Option<usize>,
}

/// Split a dotted path into segments.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>, QueryError> {
    let invalid = |reason: &str| QueryError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };
    if path.is_empty() {
        return Err(invalid("empty path"));
    }

    path.split('.')
        .map(|segment| {
            let caps = SEGMENT_RE
                .captures(segment)
                .ok_or_else(|| invalid(&format!("bad segment '{segment}'")))?;
            let index = caps
                .get(2)
                .map(|m| m.as_str().parse::<usize>())
                .transpose()
                .map_err(|_| invalid("index too large"))?;
            Ok(PathSegment {
                name: caps[1].to_string(),
                index,
            })
        })
        .collect()
}

/// A path resolved against one schema: where the leaf starts in a sample
/// and what it is.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPath {
    pub path: String,
    pub offset: usize,
    pub leaf: Property,
}

/// Resolve `path` within the registered type `type_name`.
pub fn resolve(
    registry: &SchemaRegistry,
    type_name: &str,
    path: &str,
) -> Result<ResolvedPath, QueryError> {
    resolve_in(registry.schema(type_name)?, path)
}

/// Resolve `path` within `schema`.
///
/// An index selects one element of an array field and must be below the
/// declared count. Indexing a non-array field, an out of range index, or a
/// missing field name are all `PathNotFound`. Going through a nested type
/// that never arrived is `UnresolvedType`.
pub fn resolve_in(schema: &Schema, path: &str) -> Result<ResolvedPath, QueryError> {
    let segments = parse_path(path)?;
    let not_found = || QueryError::PathNotFound {
        type_name: schema.type_name.clone(),
        path: path.to_string(),
    };
    let unresolved = |missing: &str| QueryError::UnresolvedType {
        type_name: schema.type_name.clone(),
        missing: missing.to_string(),
    };
    let rebase = |err: QueryError| match err {
        QueryError::UnresolvedType { missing, .. } => unresolved(&missing),
        other => other,
    };
    let found = |offset: usize, leaf: Property| ResolvedPath {
        path: path.to_string(),
        offset,
        leaf,
    };

    let last = segments.len() - 1;
    let mut current = schema;
    let mut offset = 0;

    for (depth, segment) in segments.iter().enumerate() {
        let (position, field) = current.field(&segment.name).ok_or_else(not_found)?;
        offset += current.field_offset(position).map_err(rebase)?;
        let is_last = depth == last;

        current = match (&field.property, segment.index) {
            (_, None) if is_last => return Ok(found(offset, field.property.clone())),
            (Property::BuiltinArray(kind, count), Some(i)) if is_last => {
                if i >= *count {
                    return Err(not_found());
                }
                return Ok(found(offset + i * kind.width(), Property::Builtin(*kind)));
            }
            (Property::Composite(r), None) => r.schema().ok_or_else(|| unresolved(r.name()))?,
            (Property::CompositeArray(r, count), Some(i)) => {
                if i >= *count {
                    return Err(not_found());
                }
                let element = r.schema().ok_or_else(|| unresolved(r.name()))?;
                offset += i * element.nested_byte_count().map_err(rebase)?;
                if is_last {
                    return Ok(found(offset, Property::Composite(r.clone())));
                }
                element
            }
            _ => return Err(not_found()),
        };
    }

    Err(not_found())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ulog::codec::PrimitiveKind;

    fn registry(defs: &[&str]) -> SchemaRegistry {
        let mut reg = SchemaRegistry::new();
        for def in defs {
            reg.define(def).unwrap();
        }
        reg
    }

    #[test]
    fn test_parse_path() {
        let segs = parse_path("a.b[2].c").unwrap();
        assert_eq!(
            segs,
            vec![
                PathSegment {
                    name: "a".into(),
                    index: None
                },
                PathSegment {
                    name: "b".into(),
                    index: Some(2)
                },
                PathSegment {
                    name: "c".into(),
                    index: None
                },
            ]
        );
        for bad in ["", "a..b", "a[", "a[-1]", "a[1]b", ".a", "a.", "a[x]"] {
            assert!(
                matches!(parse_path(bad), Err(QueryError::InvalidPath { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_forward_reference_offsets() {
        let reg = registry(&["outer:inner v;float t;", "inner:uint8 a;uint8 b;"]);
        let b = resolve(&reg, "outer", "v.b").unwrap();
        assert_eq!(b.offset, 1);
        assert_eq!(b.leaf, Property::Builtin(PrimitiveKind::U8));
        let t = resolve(&reg, "outer", "t").unwrap();
        assert_eq!(t.offset, 2);
        assert_eq!(t.leaf, Property::Builtin(PrimitiveKind::F32));
    }

    #[test]
    fn test_builtin_array_index() {
        let reg = registry(&["att:uint64_t timestamp;float[4] q;"]);
        let q = resolve(&reg, "att", "q").unwrap();
        assert_eq!(q.offset, 8);
        assert_eq!(q.leaf, Property::BuiltinArray(PrimitiveKind::F32, 4));

        let q2 = resolve(&reg, "att", "q[2]").unwrap();
        assert_eq!(q2.offset, 16);
        assert_eq!(q2.leaf, Property::Builtin(PrimitiveKind::F32));

        let q3 = resolve(&reg, "att", "q[3]").unwrap();
        assert_eq!(q3.offset, 20);
    }

    #[test]
    fn test_index_out_of_bounds_not_found() {
        let reg = registry(&["att:uint64_t timestamp;float[4] q;wp[2] wps;", "wp:double lat;double lon;"]);
        for path in ["q[4]", "q[100]", "wps[2].lat", "wps[2]"] {
            assert!(
                matches!(
                    resolve(&reg, "att", path),
                    Err(QueryError::PathNotFound { .. })
                ),
                "{path}"
            );
        }
    }

    #[test]
    fn test_composite_array() {
        let reg = registry(&[
            "mission:uint8_t count;wp[3] wps;",
            "wp:double lat;double lon;float[2] alt;",
        ]);
        let lon = resolve(&reg, "mission", "wps[2].lon").unwrap();
        assert_eq!(lon.offset, 1 + 2 * 24 + 8);
        let alt = resolve(&reg, "mission", "wps[1].alt[1]").unwrap();
        assert_eq!(alt.offset, 1 + 24 + 16 + 4);
        let elem = resolve(&reg, "mission", "wps[1]").unwrap();
        assert_eq!(elem.offset, 25);
        assert!(matches!(elem.leaf, Property::Composite(_)));
    }

    #[test]
    fn test_not_found_cases() {
        let reg = registry(&["s:uint64_t timestamp;float x;inner v;", "inner:uint8 a;"]);
        for path in ["y", "x[0]", "x.y", "timestamp.sub", "v.z", "v[0]", "v.a[0]"] {
            assert!(
                matches!(resolve(&reg, "s", path), Err(QueryError::PathNotFound { .. })),
                "{path}"
            );
        }
        assert_eq!(
            resolve(&reg, "nope", "x"),
            Err(QueryError::UnknownType("nope".into()))
        );
    }

    #[test]
    fn test_unresolved_is_distinct() {
        let reg = registry(&["s:ghost g;float after;"]);
        assert_eq!(
            resolve(&reg, "s", "g.x"),
            Err(QueryError::UnresolvedType {
                type_name: "s".into(),
                missing: "ghost".into()
            })
        );
        // Fields after the dangling one have no defined offset either.
        assert!(matches!(
            resolve(&reg, "s", "after"),
            Err(QueryError::UnresolvedType { .. })
        ));
        // The dangling field itself sits at a known offset.
        assert_eq!(resolve(&reg, "s", "g").unwrap().offset, 0);
    }

    #[test]
    fn test_order_independent_offsets() {
        let a_first = registry(&["a:uint16_t h;b inner;float tail;", "b:uint8_t[3] bytes;double d;"]);
        let b_first = registry(&["b:uint8_t[3] bytes;double d;", "a:uint16_t h;b inner;float tail;"]);
        for path in ["inner.d", "tail", "inner.bytes[2]"] {
            assert_eq!(
                resolve(&a_first, "a", path).unwrap(),
                resolve(&b_first, "a", path).unwrap()
            );
        }
        assert_eq!(resolve(&a_first, "a", "tail").unwrap().offset, 2 + 11);
    }
}
