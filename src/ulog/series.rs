//! Typed reads over the samples of one type.

use std::cell::RefCell;
use std::collections::HashMap;

use super::codec::{decode, decode_array, decode_text, DecodedValue, Primitive, PrimitiveKind};
use super::error::QueryError;
use super::path::{resolve_in, ResolvedPath};
use super::schema::{Property, Schema};
use super::store::Sample;

/// A cursor over one type's samples.
///
/// Paths are resolved once per reader and cached, so reading the same field
/// across thousands of samples walks the schema tree only once. The cache
/// belongs to this reader alone.
pub struct SeriesReader<'a> {
    schema: &'a Schema,
    samples: Vec<&'a Sample>,
    cache: RefCell<HashMap<String, ResolvedPath>>,
}

impl<'a> SeriesReader<'a> {
    pub fn new(schema: &'a Schema, samples: &'a [Sample]) -> Self {
        Self {
            schema,
            samples: samples.iter().collect(),
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Narrow the reader to one instance of a multi-instance type.
    #[must_use]
    pub fn instance(mut self, multi_id: u8) -> Self {
        self.samples.retain(|s| s.multi_id == multi_id);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.schema.type_name
    }

    pub fn schema(&self) -> &Schema {
        self.schema
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Raw bytes of sample `index`.
    pub fn sample(&self, index: usize) -> Result<&'a [u8], QueryError> {
        self.samples
            .get(index)
            .map(|s| s.payload.as_slice())
            .ok_or(QueryError::SampleIndex {
                index,
                len: self.samples.len(),
            })
    }

    /// Resolve `path` against this reader's type.
    pub fn resolve(&self, path: &str) -> Result<ResolvedPath, QueryError> {
        self.with_resolved(path, |resolved| Ok(resolved.clone()))
    }

    fn with_resolved<R>(
        &self,
        path: &str,
        f: impl FnOnce(&ResolvedPath) -> Result<R, QueryError>,
    ) -> Result<R, QueryError> {
        if let Some(hit) = self.cache.borrow().get(path) {
            return f(hit);
        }
        let resolved = resolve_in(self.schema, path)?;
        let out = f(&resolved);
        self.cache.borrow_mut().insert(path.to_string(), resolved);
        out
    }

    /// Decode the scalar at `path` in sample `index` as `T`.
    ///
    /// `T` must match the field's declared kind exactly.
    pub fn value_at<T: Primitive>(&self, index: usize, path: &str) -> Result<T, QueryError> {
        let bytes = self.sample(index)?;
        self.with_resolved(path, |resolved| {
            let offset = scalar_offset(resolved, T::KIND)?;
            let value = decode(T::KIND, bytes, offset)?;
            T::from_value(&value).ok_or_else(|| mismatch(resolved, T::KIND.type_name()))
        })
    }

    /// Decode the scalar at `path` in sample `index`, whatever its kind.
    pub fn decoded_at(&self, index: usize, path: &str) -> Result<DecodedValue, QueryError> {
        let bytes = self.sample(index)?;
        self.with_resolved(path, |resolved| match resolved.leaf {
            Property::Builtin(kind) => decode(kind, bytes, resolved.offset),
            _ => Err(mismatch(resolved, "a scalar field")),
        })
    }

    /// Decode the whole primitive array at `path` in sample `index` as `T`.
    pub fn array_at<T: Primitive>(&self, index: usize, path: &str) -> Result<Vec<T>, QueryError> {
        let bytes = self.sample(index)?;
        self.with_resolved(path, |resolved| match resolved.leaf {
            Property::BuiltinArray(kind, count) if kind == T::KIND => {
                decode_array(kind, bytes, resolved.offset, count)?
                    .iter()
                    .map(|v| T::from_value(v).ok_or_else(|| mismatch(resolved, kind.type_name())))
                    .collect()
            }
            _ => Err(mismatch(resolved, &format!("{}[]", T::KIND.type_name()))),
        })
    }

    /// Decode the primitive array at `path` in sample `index`, whatever its
    /// element kind.
    pub fn decoded_array_at(
        &self,
        index: usize,
        path: &str,
    ) -> Result<Vec<DecodedValue>, QueryError> {
        let bytes = self.sample(index)?;
        self.with_resolved(path, |resolved| match resolved.leaf {
            Property::BuiltinArray(kind, count) => {
                decode_array(kind, bytes, resolved.offset, count)
            }
            _ => Err(mismatch(resolved, "an array field")),
        })
    }

    /// Decode a `char[N]` field. All N bytes are kept, padding included.
    pub fn text_at(&self, index: usize, path: &str) -> Result<String, QueryError> {
        let bytes = self.sample(index)?;
        self.with_resolved(path, |resolved| match resolved.leaf {
            Property::BuiltinArray(PrimitiveKind::Char, len) => {
                decode_text(bytes, resolved.offset, len)
            }
            _ => Err(mismatch(resolved, "char[]")),
        })
    }

    /// Read the scalar at `path` from every sample, in order, and map it.
    pub fn map_all<T: Primitive, S>(
        &self,
        path: &str,
        mut f: impl FnMut(T) -> S,
    ) -> Result<Vec<S>, QueryError> {
        (0..self.len())
            .map(|i| self.value_at::<T>(i, path).map(&mut f))
            .collect()
    }

    /// Call `f` with this reader and each sample index, in order.
    ///
    /// This is how several fields of one sample are combined into a single
    /// value, e.g. three scalars into a vector.
    pub fn map_samples<S>(
        &self,
        mut f: impl FnMut(&Self, usize) -> Result<S, QueryError>,
    ) -> Result<Vec<S>, QueryError> {
        (0..self.len()).map(|i| f(self, i)).collect()
    }
}

fn scalar_offset(resolved: &ResolvedPath, kind: PrimitiveKind) -> Result<usize, QueryError> {
    match resolved.leaf {
        Property::Builtin(leaf) if leaf == kind => Ok(resolved.offset),
        _ => Err(mismatch(resolved, kind.type_name())),
    }
}

fn mismatch(resolved: &ResolvedPath, expected: &str) -> QueryError {
    QueryError::TypeMismatch {
        path: resolved.path.clone(),
        expected: expected.to_string(),
        found: resolved.leaf.type_label(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ulog::schema::SchemaRegistry;

    fn sample(multi_id: u8, parts: &[&[u8]]) -> Sample {
        Sample {
            multi_id,
            payload: parts.concat(),
        }
    }

    fn att_registry() -> SchemaRegistry {
        let mut reg = SchemaRegistry::new();
        reg.define("att:uint64_t timestamp;float[4] q;char[4] tag;bool armed;")
            .unwrap();
        reg
    }

    fn att_sample(ts: u64, q: [f32; 4], tag: &[u8; 4], armed: bool) -> Sample {
        let q: Vec<u8> = q.iter().flat_map(|v| v.to_le_bytes()).collect();
        sample(0, &[&ts.to_le_bytes(), &q, tag, &[u8::from(armed)]])
    }

    #[test]
    fn test_value_at() {
        let reg = att_registry();
        let samples = vec![
            att_sample(100, [1.0, 0.0, 0.0, 0.0], b"ab\0\0", true),
            att_sample(200, [0.5, 0.5, 0.5, 0.5], b"cdef", false),
        ];
        let reader = SeriesReader::new(reg.get("att").unwrap(), &samples);
        assert_eq!(reader.len(), 2);
        assert_eq!(reader.value_at::<u64>(1, "timestamp").unwrap(), 200);
        assert_eq!(reader.value_at::<f32>(0, "q[0]").unwrap(), 1.0);
        assert!(reader.value_at::<bool>(0, "armed").unwrap());
        assert_eq!(
            reader.decoded_at(1, "q[3]").unwrap(),
            DecodedValue::F32(0.5)
        );
    }

    #[test]
    fn test_type_mismatch() {
        let reg = att_registry();
        let samples = vec![att_sample(100, [1.0; 4], b"abcd", true)];
        let reader = SeriesReader::new(reg.get("att").unwrap(), &samples);

        assert_eq!(
            reader.value_at::<u32>(0, "timestamp"),
            Err(QueryError::TypeMismatch {
                path: "timestamp".into(),
                expected: "uint32_t".into(),
                found: "uint64_t".into()
            })
        );
        // A whole array is not a scalar.
        assert!(matches!(
            reader.value_at::<f32>(0, "q"),
            Err(QueryError::TypeMismatch { .. })
        ));
        assert!(matches!(
            reader.array_at::<f64>(0, "q"),
            Err(QueryError::TypeMismatch { .. })
        ));
        assert!(matches!(
            reader.text_at(0, "q"),
            Err(QueryError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_array_and_text() {
        let reg = att_registry();
        let samples = vec![att_sample(1, [0.1, 0.2, 0.3, 0.4], b"hi\0\0", false)];
        let reader = SeriesReader::new(reg.get("att").unwrap(), &samples);
        assert_eq!(reader.array_at::<f32>(0, "q").unwrap(), vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(reader.decoded_array_at(0, "q").unwrap().len(), 4);
        assert_eq!(reader.text_at(0, "tag").unwrap(), "hi\0\0");
    }

    #[test]
    fn test_sample_index_and_short_payload() {
        let reg = att_registry();
        let samples = vec![sample(0, &[&7u64.to_le_bytes()])];
        let reader = SeriesReader::new(reg.get("att").unwrap(), &samples);
        assert_eq!(reader.value_at::<u64>(0, "timestamp").unwrap(), 7);
        assert!(matches!(
            reader.value_at::<f32>(0, "q[1]"),
            Err(QueryError::OutOfBounds { .. })
        ));
        assert_eq!(
            reader.value_at::<u64>(1, "timestamp"),
            Err(QueryError::SampleIndex { index: 1, len: 1 })
        );
    }

    #[test]
    fn test_map_all_and_map_samples() {
        let mut reg = SchemaRegistry::new();
        reg.define("pos:float x;float y;float z;").unwrap();
        let samples: Vec<Sample> = [[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]]
            .iter()
            .map(|v| {
                let bytes: Vec<u8> = v.iter().flat_map(|f| f.to_le_bytes()).collect();
                sample(0, &[&bytes])
            })
            .collect();
        let reader = SeriesReader::new(reg.get("pos").unwrap(), &samples);

        let doubled = reader.map_all::<f32, f32>("y", |y| y * 2.0).unwrap();
        assert_eq!(doubled, vec![4.0, 10.0]);

        let sums = reader
            .map_samples(|r, i| {
                Ok(r.value_at::<f32>(i, "x")? + r.value_at::<f32>(i, "y")? + r.value_at::<f32>(i, "z")?)
            })
            .unwrap();
        assert_eq!(sums, vec![6.0, 15.0]);

        assert!(reader.map_all::<f32, f32>("w", |w| w).is_err());
    }

    #[test]
    fn test_instance_filter() {
        let mut reg = SchemaRegistry::new();
        reg.define("imu:uint8_t v;").unwrap();
        let samples = vec![sample(0, &[&[1]]), sample(1, &[&[2]]), sample(0, &[&[3]])];
        let reader = SeriesReader::new(reg.get("imu").unwrap(), &samples).instance(0);
        assert_eq!(reader.map_all::<u8, u8>("v", |v| v).unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_resolve_is_cached() {
        let reg = att_registry();
        let samples = vec![att_sample(1, [0.0; 4], b"abcd", false)];
        let reader = SeriesReader::new(reg.get("att").unwrap(), &samples);
        let first = reader.resolve("q[2]").unwrap();
        assert_eq!(first.offset, 16);
        assert_eq!(reader.cache.borrow().len(), 1);
        assert_eq!(reader.resolve("q[2]").unwrap(), first);
        assert_eq!(reader.cache.borrow().len(), 1);
    }
}
