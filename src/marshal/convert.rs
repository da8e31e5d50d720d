//! Conversion between structured values and typed records

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use super::error::MarshalError;
use super::schema::{FieldType, RecordKind, RecordType, Scalar, TypeDecl};

/// A record walked field by field through its registered [`RecordType`].
pub trait PlainRecord: Sized {
    const NAME: &'static str;

    /// Field declarations in order.
    fn fields() -> Vec<(&'static str, TypeDecl)>;

    /// The registered schema, built once from [`PlainRecord::fields`].
    ///
    /// Fails with `UnsupportedType` when the declaration cannot be resolved.
    fn record_type() -> Result<&'static RecordType, MarshalError>;

    fn decode(fields: &FieldReader<'_>) -> Result<Self, MarshalError>;

    fn encode(&self, fields: &mut FieldWriter);
}

/// A record validated by its own serde implementation.
pub trait ValidatedRecord: Serialize + DeserializeOwned {
    const NAME: &'static str;
}

/// Convert a structured value into a plain record.
pub fn from_structured<T: PlainRecord>(value: &Value) -> Result<T, MarshalError> {
    let record = T::record_type()?;
    let map = conform(record, value)?;
    T::decode(&FieldReader { record, map })
}

/// Convert a plain record into a structured value, fields in declared order.
pub fn to_structured<T: PlainRecord>(record: &T) -> Result<Value, MarshalError> {
    let mut writer = FieldWriter::new(T::record_type()?);
    record.encode(&mut writer);
    writer.finish()
}

/// Convert a structured value into a validated record.
pub fn from_validated<T: ValidatedRecord>(value: &Value) -> Result<T, MarshalError> {
    if !value.is_object() {
        return Err(MarshalError::mismatch(
            T::NAME,
            "<root>",
            &format!("mapping for record `{}`", T::NAME),
            value,
        ));
    }
    validate::<T>(T::NAME, "<root>", value)
}

pub fn to_validated<T: ValidatedRecord>(record: &T) -> Result<Value, MarshalError> {
    serde_json::to_value(record).map_err(|e| MarshalError::Validation {
        field: "<root>".to_string(),
        record: T::NAME.to_string(),
        message: e.to_string(),
    })
}

/// Check `value` against `record` and return its mapping.
///
/// Nested plain records are checked recursively; validated records only need
/// to be mappings here, their validator runs when the field is decoded. Keys
/// the schema does not declare are ignored.
pub fn conform<'a>(record: &RecordType, value: &'a Value) -> Result<&'a Map<String, Value>, MarshalError> {
    let map = as_mapping(record, value)?;

    for field in record.fields() {
        match map.get(field.name) {
            None if field.ty.is_optional() => {}
            None => return Err(MarshalError::missing(record.name(), field.name)),
            Some(v) => check(record, field.name, &field.ty, v)?,
        }
    }

    Ok(map)
}

fn as_mapping<'a>(record: &RecordType, value: &'a Value) -> Result<&'a Map<String, Value>, MarshalError> {
    value.as_object().ok_or_else(|| {
        MarshalError::mismatch(
            record.name(),
            "<root>",
            &format!("mapping for record `{}`", record.name()),
            value,
        )
    })
}

fn check(record: &RecordType, field: &str, ty: &FieldType, value: &Value) -> Result<(), MarshalError> {
    match ty {
        FieldType::Optional(inner) => {
            if value.is_null() {
                Ok(())
            } else {
                check(record, field, inner, value)
            }
        }
        FieldType::Scalar(scalar) => {
            if scalar.accepts(value) {
                Ok(())
            } else {
                Err(MarshalError::mismatch(record.name(), field, scalar.name(), value))
            }
        }
        FieldType::Sequence(inner) => {
            let items = value
                .as_array()
                .ok_or_else(|| MarshalError::mismatch(record.name(), field, &ty.describe(), value))?;
            for (i, item) in items.iter().enumerate() {
                check(record, &format!("{}[{}]", field, i), inner, item)?;
            }
            Ok(())
        }
        FieldType::Record(kind) => {
            if !value.is_object() {
                return Err(MarshalError::mismatch(record.name(), field, &ty.describe(), value));
            }
            match kind {
                RecordKind::Plain { schema, .. } => conform(schema()?, value).map(|_| ()),
                RecordKind::Validated { .. } => Ok(()),
            }
        }
    }
}

fn validate<T: DeserializeOwned>(record: &str, field: &str, value: &Value) -> Result<T, MarshalError> {
    serde_json::from_value(value.clone()).map_err(|e| MarshalError::Validation {
        field: field.to_string(),
        record: record.to_string(),
        message: e.to_string(),
    })
}

/// Typed access to the fields of a conformed mapping.
pub struct FieldReader<'a> {
    record: &'a RecordType,
    map: &'a Map<String, Value>,
}

impl<'a> FieldReader<'a> {
    /// The field's value, `None` when absent or null.
    fn lookup(&self, name: &str) -> Result<Option<&'a Value>, MarshalError> {
        if self.record.field(name).is_none() {
            return Err(MarshalError::unsupported(
                self.record.name(),
                name,
                "field is not declared in the record type",
            ));
        }
        Ok(self.map.get(name).filter(|v| !v.is_null()))
    }

    fn require(&self, name: &str) -> Result<&'a Value, MarshalError> {
        self.lookup(name)?
            .ok_or_else(|| MarshalError::missing(self.record.name(), name))
    }

    fn scalar<T>(
        &self,
        field: &str,
        value: &'a Value,
        expected: Scalar,
        get: impl Fn(&'a Value) -> Option<T>,
    ) -> Result<T, MarshalError> {
        get(value).ok_or_else(|| MarshalError::mismatch(self.record.name(), field, expected.name(), value))
    }

    /// Decode a nested plain record. The parent's conform pass already
    /// checked it when the field is declared as that record, so only an
    /// undeclared pairing is conformed again.
    fn nested<T: PlainRecord>(&self, name: &str, value: &'a Value) -> Result<T, MarshalError> {
        let conformed = self
            .record
            .field(name)
            .and_then(|f| f.ty.record_kind())
            .is_some_and(|kind| {
                matches!(kind, RecordKind::Plain { name: declared, .. } if *declared == T::NAME)
            });
        if !conformed {
            return from_structured(value);
        }
        let record = T::record_type()?;
        T::decode(&FieldReader {
            record,
            map: as_mapping(record, value)?,
        })
    }

    pub fn bool(&self, name: &str) -> Result<bool, MarshalError> {
        self.scalar(name, self.require(name)?, Scalar::Bool, Value::as_bool)
    }

    pub fn uint(&self, name: &str) -> Result<u64, MarshalError> {
        self.scalar(name, self.require(name)?, Scalar::UInt, Value::as_u64)
    }

    pub fn float(&self, name: &str) -> Result<f64, MarshalError> {
        self.scalar(name, self.require(name)?, Scalar::Float, Value::as_f64)
    }

    pub fn string(&self, name: &str) -> Result<String, MarshalError> {
        self.scalar(name, self.require(name)?, Scalar::Str, |v| v.as_str().map(str::to_string))
    }

    pub fn path(&self, name: &str) -> Result<PathBuf, MarshalError> {
        self.scalar(name, self.require(name)?, Scalar::Path, |v| v.as_str().map(PathBuf::from))
    }

    pub fn optional_bool(&self, name: &str) -> Result<Option<bool>, MarshalError> {
        self.lookup(name)?
            .map(|v| self.scalar(name, v, Scalar::Bool, Value::as_bool))
            .transpose()
    }

    pub fn optional_uint(&self, name: &str) -> Result<Option<u64>, MarshalError> {
        self.lookup(name)?
            .map(|v| self.scalar(name, v, Scalar::UInt, Value::as_u64))
            .transpose()
    }

    pub fn optional_float(&self, name: &str) -> Result<Option<f64>, MarshalError> {
        self.lookup(name)?
            .map(|v| self.scalar(name, v, Scalar::Float, Value::as_f64))
            .transpose()
    }

    pub fn optional_string(&self, name: &str) -> Result<Option<String>, MarshalError> {
        self.lookup(name)?
            .map(|v| self.scalar(name, v, Scalar::Str, |v| v.as_str().map(str::to_string)))
            .transpose()
    }

    pub fn optional_path(&self, name: &str) -> Result<Option<PathBuf>, MarshalError> {
        self.lookup(name)?
            .map(|v| self.scalar(name, v, Scalar::Path, |v| v.as_str().map(PathBuf::from)))
            .transpose()
    }

    pub fn strings(&self, name: &str) -> Result<Vec<String>, MarshalError> {
        self.items(name, self.require(name)?, |item, field| {
            self.scalar(field, item, Scalar::Str, |v| v.as_str().map(str::to_string))
        })
    }

    pub fn optional_strings(&self, name: &str) -> Result<Option<Vec<String>>, MarshalError> {
        self.lookup(name)?
            .map(|v| {
                self.items(name, v, |item, field| {
                    self.scalar(field, item, Scalar::Str, |v| v.as_str().map(str::to_string))
                })
            })
            .transpose()
    }

    pub fn bools(&self, name: &str) -> Result<Vec<bool>, MarshalError> {
        self.items(name, self.require(name)?, |item, field| {
            self.scalar(field, item, Scalar::Bool, Value::as_bool)
        })
    }

    pub fn floats(&self, name: &str) -> Result<Vec<f64>, MarshalError> {
        self.items(name, self.require(name)?, |item, field| {
            self.scalar(field, item, Scalar::Float, Value::as_f64)
        })
    }

    pub fn record<T: PlainRecord>(&self, name: &str) -> Result<T, MarshalError> {
        self.nested(name, self.require(name)?)
    }

    pub fn optional_record<T: PlainRecord>(&self, name: &str) -> Result<Option<T>, MarshalError> {
        self.lookup(name)?.map(|v| self.nested(name, v)).transpose()
    }

    pub fn records<T: PlainRecord>(&self, name: &str) -> Result<Vec<T>, MarshalError> {
        self.items(name, self.require(name)?, |item, _| self.nested(name, item))
    }

    pub fn validated<T: ValidatedRecord>(&self, name: &str) -> Result<T, MarshalError> {
        validate(T::NAME, name, self.require(name)?)
    }

    pub fn optional_validated<T: ValidatedRecord>(&self, name: &str) -> Result<Option<T>, MarshalError> {
        self.lookup(name)?
            .map(|v| validate(T::NAME, name, v))
            .transpose()
    }

    pub fn validated_records<T: ValidatedRecord>(&self, name: &str) -> Result<Vec<T>, MarshalError> {
        self.items(name, self.require(name)?, |item, field| validate(T::NAME, field, item))
    }

    fn items<T>(
        &self,
        name: &str,
        value: &'a Value,
        mut item: impl FnMut(&'a Value, &str) -> Result<T, MarshalError>,
    ) -> Result<Vec<T>, MarshalError> {
        let items = value.as_array().ok_or_else(|| {
            MarshalError::mismatch(self.record.name(), name, "sequence", value)
        })?;
        items
            .iter()
            .enumerate()
            .map(|(i, value)| item(value, &format!("{}[{}]", name, i)))
            .collect()
    }
}

/// Collects a record's fields and emits them in declared order.
///
/// Writer methods never fail; the first error encountered (an undeclared
/// field, a path that is not UTF-8, a validated record its serializer
/// rejects) is reported by [`FieldWriter::finish`].
pub struct FieldWriter {
    record: &'static RecordType,
    values: Map<String, Value>,
    error: Option<MarshalError>,
}

impl FieldWriter {
    pub fn new(record: &'static RecordType) -> Self {
        Self {
            record,
            values: Map::new(),
            error: None,
        }
    }

    fn put(&mut self, name: &str, value: Value) -> &mut Self {
        if self.record.field(name).is_none() {
            self.fail(MarshalError::unsupported(
                self.record.name(),
                name,
                "field is not declared in the record type",
            ));
        } else {
            self.values.insert(name.to_string(), value);
        }
        self
    }

    fn put_optional<T>(&mut self, name: &str, value: Option<T>, into: impl FnOnce(T) -> Value) -> &mut Self {
        let value = value.map(into).unwrap_or(Value::Null);
        self.put(name, value)
    }

    fn fail(&mut self, error: MarshalError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    pub fn bool(&mut self, name: &str, value: bool) -> &mut Self {
        self.put(name, Value::Bool(value))
    }

    pub fn uint(&mut self, name: &str, value: u64) -> &mut Self {
        self.put(name, Value::from(value))
    }

    pub fn float(&mut self, name: &str, value: f64) -> &mut Self {
        self.put(name, Value::from(value))
    }

    pub fn string(&mut self, name: &str, value: &str) -> &mut Self {
        self.put(name, Value::String(value.to_string()))
    }

    pub fn path(&mut self, name: &str, value: &Path) -> &mut Self {
        match value.to_str() {
            Some(s) => self.put(name, Value::String(s.to_string())),
            None => {
                self.fail(MarshalError::Validation {
                    field: name.to_string(),
                    record: self.record.name().to_string(),
                    message: format!("path {} is not valid UTF-8", value.display()),
                });
                self
            }
        }
    }

    pub fn optional_bool(&mut self, name: &str, value: Option<bool>) -> &mut Self {
        self.put_optional(name, value, Value::Bool)
    }

    pub fn optional_uint(&mut self, name: &str, value: Option<u64>) -> &mut Self {
        self.put_optional(name, value, Value::from)
    }

    pub fn optional_float(&mut self, name: &str, value: Option<f64>) -> &mut Self {
        self.put_optional(name, value, Value::from)
    }

    pub fn optional_string(&mut self, name: &str, value: Option<&str>) -> &mut Self {
        self.put_optional(name, value, |s| Value::String(s.to_string()))
    }

    pub fn optional_path(&mut self, name: &str, value: Option<&Path>) -> &mut Self {
        match value {
            Some(path) => self.path(name, path),
            None => self.put(name, Value::Null),
        }
    }

    pub fn strings(&mut self, name: &str, values: &[String]) -> &mut Self {
        self.put(name, values.iter().map(|s| Value::String(s.clone())).collect())
    }

    pub fn optional_strings(&mut self, name: &str, values: Option<&[String]>) -> &mut Self {
        self.put_optional(name, values, |v| v.iter().map(|s| Value::String(s.clone())).collect())
    }

    pub fn bools(&mut self, name: &str, values: &[bool]) -> &mut Self {
        self.put(name, values.iter().map(|b| Value::Bool(*b)).collect())
    }

    pub fn floats(&mut self, name: &str, values: &[f64]) -> &mut Self {
        self.put(name, values.iter().map(|f| Value::from(*f)).collect())
    }

    pub fn record<T: PlainRecord>(&mut self, name: &str, value: &T) -> &mut Self {
        match to_structured(value) {
            Ok(v) => self.put(name, v),
            Err(e) => {
                self.fail(e);
                self
            }
        }
    }

    pub fn optional_record<T: PlainRecord>(&mut self, name: &str, value: Option<&T>) -> &mut Self {
        match value {
            Some(v) => self.record(name, v),
            None => self.put(name, Value::Null),
        }
    }

    pub fn records<T: PlainRecord>(&mut self, name: &str, values: &[T]) -> &mut Self {
        self.collect(name, values, to_structured::<T>)
    }

    pub fn validated<T: ValidatedRecord>(&mut self, name: &str, value: &T) -> &mut Self {
        match to_validated(value) {
            Ok(v) => self.put(name, v),
            Err(e) => {
                self.fail(e);
                self
            }
        }
    }

    pub fn optional_validated<T: ValidatedRecord>(&mut self, name: &str, value: Option<&T>) -> &mut Self {
        match value {
            Some(v) => self.validated(name, v),
            None => self.put(name, Value::Null),
        }
    }

    pub fn validated_records<T: ValidatedRecord>(&mut self, name: &str, values: &[T]) -> &mut Self {
        self.collect(name, values, to_validated::<T>)
    }

    fn collect<T>(
        &mut self,
        name: &str,
        values: &[T],
        convert: impl Fn(&T) -> Result<Value, MarshalError>,
    ) -> &mut Self {
        match values.iter().map(convert).collect::<Result<Vec<_>, _>>() {
            Ok(items) => self.put(name, Value::Array(items)),
            Err(e) => {
                self.fail(e);
                self
            }
        }
    }

    /// Emit the mapping. Optional fields that were never written become null;
    /// a required field that was never written is a schema/encoder mismatch.
    pub fn finish(mut self) -> Result<Value, MarshalError> {
        if let Some(e) = self.error {
            return Err(e);
        }

        let mut out = Map::with_capacity(self.record.fields().len());
        for field in self.record.fields() {
            match self.values.remove(field.name) {
                Some(v) => {
                    out.insert(field.name.to_string(), v);
                }
                None if field.ty.is_optional() => {
                    out.insert(field.name.to_string(), Value::Null);
                }
                None => return Err(MarshalError::missing(self.record.name(), field.name)),
            }
        }
        Ok(Value::Object(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::OnceCell;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Usage {
        tokens: u64,
    }

    impl ValidatedRecord for Usage {
        const NAME: &'static str = "Usage";
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Leaf {
        label: String,
        weight: f64,
    }

    impl PlainRecord for Leaf {
        const NAME: &'static str = "Leaf";

        fn fields() -> Vec<(&'static str, TypeDecl)> {
            vec![("label", TypeDecl::string()), ("weight", TypeDecl::float())]
        }

        fn record_type() -> Result<&'static RecordType, MarshalError> {
            static TYPE: OnceCell<RecordType> = OnceCell::new();
            RecordType::registered::<Leaf>(&TYPE)
        }

        fn decode(fields: &FieldReader<'_>) -> Result<Self, MarshalError> {
            Ok(Self {
                label: fields.string("label")?,
                weight: fields.float("weight")?,
            })
        }

        fn encode(&self, fields: &mut FieldWriter) {
            fields.string("label", &self.label).float("weight", self.weight);
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Tree {
        root: PathBuf,
        leaves: Vec<Leaf>,
        best: Option<Leaf>,
        usage: Option<Usage>,
        flags: Vec<bool>,
    }

    impl PlainRecord for Tree {
        const NAME: &'static str = "Tree";

        fn fields() -> Vec<(&'static str, TypeDecl)> {
            vec![
                ("root", TypeDecl::path()),
                ("leaves", TypeDecl::seq(TypeDecl::plain::<Leaf>())),
                ("best", TypeDecl::optional(TypeDecl::plain::<Leaf>())),
                ("usage", TypeDecl::optional(TypeDecl::validated::<Usage>())),
                ("flags", TypeDecl::seq(TypeDecl::bool())),
            ]
        }

        fn record_type() -> Result<&'static RecordType, MarshalError> {
            static TYPE: OnceCell<RecordType> = OnceCell::new();
            RecordType::registered::<Tree>(&TYPE)
        }

        fn decode(fields: &FieldReader<'_>) -> Result<Self, MarshalError> {
            Ok(Self {
                root: fields.path("root")?,
                leaves: fields.records("leaves")?,
                best: fields.optional_record("best")?,
                usage: fields.optional_validated("usage")?,
                flags: fields.bools("flags")?,
            })
        }

        fn encode(&self, fields: &mut FieldWriter) {
            fields
                .path("root", &self.root)
                .records("leaves", &self.leaves)
                .optional_record("best", self.best.as_ref())
                .optional_validated("usage", self.usage.as_ref())
                .bools("flags", &self.flags);
        }
    }

    fn sample() -> Tree {
        Tree {
            root: PathBuf::from("/srv/repo"),
            leaves: vec![
                Leaf { label: "a".to_string(), weight: 0.5 },
                Leaf { label: "b".to_string(), weight: -1.25 },
            ],
            best: Some(Leaf { label: "a".to_string(), weight: 0.5 }),
            usage: Some(Usage { tokens: 42 }),
            flags: vec![true, false],
        }
    }

    #[test]
    fn test_roundtrip() {
        let tree = sample();
        let value = to_structured(&tree).unwrap();
        assert_eq!(value["root"], json!("/srv/repo"));
        let back: Tree = from_structured(&value).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn test_output_follows_declared_order() {
        let value = to_structured(&sample()).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["root", "leaves", "best", "usage", "flags"]);
    }

    #[test]
    fn test_absent_optionals_become_none() {
        let value = json!({
            "root": "/srv/repo",
            "leaves": [],
            "flags": []
        });
        let tree: Tree = from_structured(&value).unwrap();
        assert_eq!(tree.best, None);
        assert_eq!(tree.usage, None);

        let value = json!({
            "root": "/srv/repo",
            "leaves": [],
            "best": null,
            "usage": null,
            "flags": []
        });
        let tree: Tree = from_structured(&value).unwrap();
        assert_eq!(tree.best, None);
    }

    #[test]
    fn test_missing_required_field() {
        let value = json!({ "leaves": [], "flags": [] });
        let err = from_structured::<Tree>(&value).unwrap_err();
        assert_eq!(err, MarshalError::missing("Tree", "root"));
    }

    #[test]
    fn test_null_required_field_is_mismatch() {
        let value = json!({ "root": null, "leaves": [], "flags": [] });
        let err = from_structured::<Tree>(&value).unwrap_err();
        assert!(matches!(err, MarshalError::TypeMismatch { .. }));
        assert_eq!(err.field(), "root");
    }

    #[test]
    fn test_nested_mismatch_names_inner_record() {
        let value = json!({
            "root": "/srv/repo",
            "leaves": [{ "label": "a", "weight": "heavy" }],
            "flags": []
        });
        let err = from_structured::<Tree>(&value).unwrap_err();
        assert_eq!(err.record(), "Leaf");
        assert_eq!(err.field(), "weight");
    }

    #[test]
    fn test_sequence_element_mismatch_is_indexed() {
        let value = json!({
            "root": "/srv/repo",
            "leaves": [],
            "flags": [true, "no"]
        });
        let err = from_structured::<Tree>(&value).unwrap_err();
        assert_eq!(err.field(), "flags[1]");
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let mut value = to_structured(&sample()).unwrap();
        value["extra"] = json!({ "anything": [1, 2, 3] });
        value["leaves"][0]["colour"] = json!("green");
        let back: Tree = from_structured(&value).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn test_validated_family_uses_its_validator() {
        let value = json!({
            "root": "/srv/repo",
            "leaves": [],
            "usage": { "tokens": "many" },
            "flags": []
        });
        let err = from_structured::<Tree>(&value).unwrap_err();
        match err {
            MarshalError::Validation { record, field, .. } => {
                assert_eq!(record, "Usage");
                assert_eq!(field, "usage");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_root_must_be_mapping() {
        let err = from_structured::<Tree>(&json!([1, 2])).unwrap_err();
        assert_eq!(err.field(), "<root>");
        let err = from_validated::<Usage>(&json!("tokens")).unwrap_err();
        assert!(matches!(err, MarshalError::TypeMismatch { .. }));
    }

    #[test]
    fn test_validated_roundtrip() {
        let usage = Usage { tokens: 7 };
        let value = to_validated(&usage).unwrap();
        assert_eq!(from_validated::<Usage>(&value).unwrap(), usage);
    }

    #[derive(Debug, Clone, PartialEq, Default)]
    struct Settings {
        retries: Option<u64>,
        verbose: Option<bool>,
        ratio: Option<f64>,
        label: Option<String>,
        workdir: Option<PathBuf>,
        tags: Option<Vec<String>>,
        usage: Vec<Usage>,
    }

    impl PlainRecord for Settings {
        const NAME: &'static str = "Settings";

        fn fields() -> Vec<(&'static str, TypeDecl)> {
            vec![
                ("retries", TypeDecl::optional(TypeDecl::uint())),
                ("verbose", TypeDecl::optional(TypeDecl::bool())),
                ("ratio", TypeDecl::optional(TypeDecl::float())),
                ("label", TypeDecl::optional(TypeDecl::string())),
                ("workdir", TypeDecl::optional(TypeDecl::path())),
                ("tags", TypeDecl::optional(TypeDecl::seq(TypeDecl::string()))),
                ("usage", TypeDecl::seq(TypeDecl::validated::<Usage>())),
            ]
        }

        fn record_type() -> Result<&'static RecordType, MarshalError> {
            static TYPE: OnceCell<RecordType> = OnceCell::new();
            RecordType::registered::<Settings>(&TYPE)
        }

        fn decode(fields: &FieldReader<'_>) -> Result<Self, MarshalError> {
            Ok(Self {
                retries: fields.optional_uint("retries")?,
                verbose: fields.optional_bool("verbose")?,
                ratio: fields.optional_float("ratio")?,
                label: fields.optional_string("label")?,
                workdir: fields.optional_path("workdir")?,
                tags: fields.optional_strings("tags")?,
                usage: fields.validated_records("usage")?,
            })
        }

        fn encode(&self, fields: &mut FieldWriter) {
            fields
                .optional_uint("retries", self.retries)
                .optional_bool("verbose", self.verbose)
                .optional_float("ratio", self.ratio)
                .optional_string("label", self.label.as_deref())
                .optional_path("workdir", self.workdir.as_deref())
                .optional_strings("tags", self.tags.as_deref())
                .validated_records("usage", &self.usage);
        }
    }

    #[test]
    fn test_optional_scalars_absent_or_null() {
        let absent: Settings = from_structured(&json!({ "usage": [] })).unwrap();
        assert_eq!(absent, Settings::default());

        let null: Settings = from_structured(&json!({
            "retries": null,
            "verbose": null,
            "ratio": null,
            "label": null,
            "workdir": null,
            "tags": null,
            "usage": []
        }))
        .unwrap();
        assert_eq!(null, Settings::default());

        let value = to_structured(&Settings::default()).unwrap();
        assert_eq!(value["retries"], Value::Null);
        assert_eq!(value["tags"], Value::Null);
    }

    #[test]
    fn test_optional_scalars_roundtrip() {
        let settings = Settings {
            retries: Some(3),
            verbose: Some(true),
            ratio: Some(0.25),
            label: Some("nightly".to_string()),
            workdir: Some(PathBuf::from("/tmp/work")),
            tags: Some(vec!["a".to_string(), "b".to_string()]),
            usage: vec![Usage { tokens: 1 }, Usage { tokens: 2 }],
        };
        let value = to_structured(&settings).unwrap();
        assert_eq!(value["usage"], json!([{ "tokens": 1 }, { "tokens": 2 }]));
        assert_eq!(from_structured::<Settings>(&value).unwrap(), settings);
    }

    #[test]
    fn test_optional_scalar_wrong_type() {
        let err = from_structured::<Settings>(&json!({ "retries": -1, "usage": [] })).unwrap_err();
        assert!(matches!(err, MarshalError::TypeMismatch { .. }));
        assert_eq!(err.field(), "retries");
    }

    #[test]
    fn test_validated_sequence_item_rejected() {
        let err = from_structured::<Settings>(&json!({ "usage": [{ "tokens": 1 }, { "tokens": "x" }] }))
            .unwrap_err();
        match err {
            MarshalError::Validation { record, field, .. } => {
                assert_eq!(record, "Usage");
                assert_eq!(field, "usage[1]");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[derive(Debug)]
    struct Ambiguous;

    impl PlainRecord for Ambiguous {
        const NAME: &'static str = "Ambiguous";

        fn fields() -> Vec<(&'static str, TypeDecl)> {
            vec![(
                "value",
                TypeDecl::Union(vec![TypeDecl::string(), TypeDecl::float(), TypeDecl::Null]),
            )]
        }

        fn record_type() -> Result<&'static RecordType, MarshalError> {
            static TYPE: OnceCell<RecordType> = OnceCell::new();
            RecordType::registered::<Ambiguous>(&TYPE)
        }

        fn decode(_fields: &FieldReader<'_>) -> Result<Self, MarshalError> {
            Ok(Self)
        }

        fn encode(&self, _fields: &mut FieldWriter) {}
    }

    #[test]
    fn test_invalid_schema_reported_on_every_conversion() {
        for _ in 0..2 {
            let err = from_structured::<Ambiguous>(&json!({ "value": "x" })).unwrap_err();
            assert!(matches!(err, MarshalError::UnsupportedType { .. }));
            assert_eq!(err.record(), "Ambiguous");
            assert_eq!(err.field(), "value");
        }
        let err = to_structured(&Ambiguous).unwrap_err();
        assert!(matches!(err, MarshalError::UnsupportedType { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_path_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let mut tree = sample();
        tree.root = PathBuf::from(OsStr::from_bytes(b"/srv/\xffrepo"));
        let err = to_structured(&tree).unwrap_err();
        assert!(matches!(err, MarshalError::Validation { .. }));
        assert_eq!(err.record(), "Tree");
        assert_eq!(err.field(), "root");
    }
}
