//! Entities of the RO-Crate metadata graph
//!
//! An [`Entity`] is one node of the flattened JSON-LD `@graph`: an
//! identifier, one or more types and an ordered property map. Property
//! values that point at other entities are stored as `{"@id": ...}`
//! reference objects; decoding them back into living entities is done
//! through the owning [`RoCrate`](crate::rocrate::RoCrate), so a
//! standalone entity is just data.
//!
//! Data-bearing variants (files and directories) additionally carry a
//! content source: a local path or a remote URL, plus the flags that
//! control remote handling at write time.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::ser::{Serialize, Serializer};
use serde_json::{json, Map, Value};
use ulid::Ulid;

use crate::error::RoCrateError;
use crate::id::{dir_id, is_url};

/// Current time as a second-precision ISO 8601 string
pub(crate) fn iso_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// View a JSON value as a list of items, scalar in -> one-element list
pub(crate) fn as_items(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

/// Extract the string type names declared by a property map
pub(crate) fn type_names(jsonld: &Map<String, Value>) -> Vec<&str> {
    match jsonld.get("@type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => vec![],
    }
}

/// Normalize a property value to the identifiers it names: plain
/// strings stay, reference objects contribute their `@id`
pub(crate) fn norm_ids(value: Option<&Value>) -> Vec<String> {
    let Some(value) = value else {
        return vec![];
    };
    as_items(value)
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            other => other
                .get("@id")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
        .collect()
}

/// Concrete entity variant, fixed at construction or load time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    RootDataset,
    Metadata,
    LegacyMetadata,
    Preview,
    File,
    Dataset,
    Workflow,
    WorkflowDescription,
    TestDefinition,
    /// Data entity that carries no bytes of its own
    Data,
    TestSuite,
    TestInstance,
    TestService,
    SoftwareApplication,
    ComputerLanguage,
    Person,
    /// Generic contextual entity
    Contextual,
}

impl EntityKind {
    /// Entities that materialize bytes (or directories) on write
    pub fn is_data(self) -> bool {
        matches!(
            self,
            EntityKind::File
                | EntityKind::Dataset
                | EntityKind::Workflow
                | EntityKind::WorkflowDescription
                | EntityKind::TestDefinition
                | EntityKind::Data
        )
    }

    /// Bookkeeping entities owned by dedicated graph slots
    pub fn is_default(self) -> bool {
        matches!(
            self,
            EntityKind::RootDataset
                | EntityKind::Metadata
                | EntityKind::LegacyMetadata
                | EntityKind::Preview
        )
    }

    /// Directory-like entities whose ids end with '/'
    pub fn is_dir_like(self) -> bool {
        matches!(self, EntityKind::Dataset | EntityKind::RootDataset)
    }
}

/// Where a data entity's bytes come from
#[derive(Debug, Clone)]
pub enum EntitySource {
    Local(PathBuf),
    Remote(String),
}

/// Remote-content handling flags for files and directories
#[derive(Debug, Clone, Copy, Default)]
pub struct DataOptions {
    /// Download remote content into the crate on write
    pub fetch_remote: bool,
    /// Issue a validating request and record `sdDatePublished`
    pub validate_url: bool,
    /// Record `contentSize` after a successful write
    pub record_size: bool,
}

/// A JSON-LD property value with explicit cardinality
///
/// The flattened document allows a property to hold either one value or
/// an ordered list of values; operations that read or grow a property
/// must preserve which of the two was in play.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Scalar(Value),
    List(Vec<Value>),
}

impl PropertyValue {
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Array(items) => PropertyValue::List(items),
            other => PropertyValue::Scalar(other),
        }
    }

    pub fn into_json(self) -> Value {
        match self {
            PropertyValue::Scalar(v) => v,
            PropertyValue::List(items) => Value::Array(items),
        }
    }

    /// Every raw object value must be a reference, i.e. carry an `@id`
    fn validate(&self) -> Result<(), RoCrateError> {
        let items: Vec<&Value> = match self {
            PropertyValue::Scalar(v) => vec![v],
            PropertyValue::List(items) => items.iter().collect(),
        };
        for item in items {
            if let Value::Object(obj) = item {
                if !obj.contains_key("@id") {
                    return Err(RoCrateError::InvalidReference(format!(
                        "no @id in {}",
                        Value::Object(obj.clone())
                    )));
                }
            }
        }
        Ok(())
    }
}

impl From<Value> for PropertyValue {
    fn from(value: Value) -> Self {
        PropertyValue::from_json(value)
    }
}

impl From<&Entity> for PropertyValue {
    fn from(entity: &Entity) -> Self {
        PropertyValue::Scalar(json!({"@id": entity.id()}))
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Scalar(Value::String(value.to_string()))
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Scalar(Value::String(value))
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Scalar(json!(value))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Scalar(json!(value))
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Scalar(Value::Bool(value))
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(items: Vec<T>) -> Self {
        PropertyValue::List(
            items
                .into_iter()
                .map(|item| match item.into() {
                    PropertyValue::Scalar(v) => v,
                    PropertyValue::List(nested) => Value::Array(nested),
                })
                .collect(),
        )
    }
}

/// One node of the metadata graph
#[derive(Debug, Clone)]
pub struct Entity {
    kind: EntityKind,
    id: String,
    jsonld: Map<String, Value>,
    source: Option<EntitySource>,
    options: DataOptions,
}

impl Entity {
    fn from_skeleton(
        kind: EntityKind,
        id: String,
        skeleton: Map<String, Value>,
        source: Option<EntitySource>,
        options: DataOptions,
        properties: Option<Map<String, Value>>,
    ) -> Result<Self, RoCrateError> {
        let mut jsonld = Map::new();
        jsonld.insert("@id".to_string(), Value::String(id.clone()));
        jsonld.extend(skeleton);
        let mut entity = Entity {
            kind,
            id,
            jsonld,
            source,
            options,
        };
        if let Some(properties) = properties {
            entity.merge_properties(properties)?;
        }
        Ok(entity)
    }

    /// Merge initial properties on top of the skeleton: reserved keys
    /// are taken verbatim, everything else goes through validation.
    pub(crate) fn merge_properties(
        &mut self,
        properties: Map<String, Value>,
    ) -> Result<(), RoCrateError> {
        for (key, value) in properties {
            if key.starts_with('@') {
                self.jsonld.insert(key, value);
            } else {
                self.set(&key, value)?;
            }
        }
        Ok(())
    }

    /// Contextual entity with an optional identifier
    ///
    /// Without an identifier a fresh opaque one is generated.
    pub fn contextual(
        identifier: Option<&str>,
        properties: Option<Map<String, Value>>,
    ) -> Result<Self, RoCrateError> {
        let id = identifier
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", Ulid::new()));
        let skeleton = object(&[("@type", json!("Thing"))]);
        Self::from_skeleton(
            EntityKind::Contextual,
            id,
            skeleton,
            None,
            DataOptions::default(),
            properties,
        )
    }

    pub fn person(
        identifier: &str,
        properties: Option<Map<String, Value>>,
    ) -> Result<Self, RoCrateError> {
        let skeleton = object(&[("@type", json!("Person"))]);
        Self::from_skeleton(
            EntityKind::Person,
            identifier.to_string(),
            skeleton,
            None,
            DataOptions::default(),
            properties,
        )
    }

    /// Data entity without a byte stream of its own
    pub fn data(
        identifier: &str,
        properties: Option<Map<String, Value>>,
    ) -> Result<Self, RoCrateError> {
        let skeleton = object(&[("@type", json!("Thing"))]);
        Self::from_skeleton(
            EntityKind::Data,
            identifier.to_string(),
            skeleton,
            None,
            DataOptions::default(),
            properties,
        )
    }

    pub fn file(
        source: Option<&str>,
        dest_path: Option<&str>,
        options: DataOptions,
        properties: Option<Map<String, Value>>,
    ) -> Result<Self, RoCrateError> {
        let (id, src) = derive_identity(source, dest_path, options.fetch_remote, false)?;
        let skeleton = object(&[("@type", json!("File"))]);
        Self::from_skeleton(EntityKind::File, id, skeleton, src, options, properties)
    }

    pub fn dataset(
        source: Option<&str>,
        dest_path: Option<&str>,
        options: DataOptions,
        properties: Option<Map<String, Value>>,
    ) -> Result<Self, RoCrateError> {
        let (id, src) = derive_identity(source, dest_path, options.fetch_remote, true)?;
        let skeleton = object(&[("@type", json!("Dataset"))]);
        Self::from_skeleton(EntityKind::Dataset, id, skeleton, src, options, properties)
    }

    pub fn workflow(
        source: Option<&str>,
        dest_path: Option<&str>,
        options: DataOptions,
        properties: Option<Map<String, Value>>,
    ) -> Result<Self, RoCrateError> {
        let (id, src) = derive_identity(source, dest_path, options.fetch_remote, false)?;
        let skeleton = object(&[
            ("@type", json!(["File", "SoftwareSourceCode", "ComputationalWorkflow"])),
            ("name", json!(strip_extension(&id))),
        ]);
        Self::from_skeleton(EntityKind::Workflow, id, skeleton, src, options, properties)
    }

    /// Abstract description of a workflow, e.g. generated CWL
    pub fn workflow_description(
        source: Option<&str>,
        dest_path: Option<&str>,
        options: DataOptions,
        properties: Option<Map<String, Value>>,
    ) -> Result<Self, RoCrateError> {
        let (id, src) = derive_identity(source, dest_path, options.fetch_remote, false)?;
        let skeleton = object(&[
            ("@type", json!(["File", "SoftwareSourceCode", "HowTo"])),
            ("name", json!(strip_extension(&id))),
        ]);
        Self::from_skeleton(
            EntityKind::WorkflowDescription,
            id,
            skeleton,
            src,
            options,
            properties,
        )
    }

    pub fn test_definition(
        source: Option<&str>,
        dest_path: Option<&str>,
        options: DataOptions,
        properties: Option<Map<String, Value>>,
    ) -> Result<Self, RoCrateError> {
        let (id, src) = derive_identity(source, dest_path, options.fetch_remote, false)?;
        let skeleton = object(&[("@type", json!(["File", "TestDefinition"]))]);
        Self::from_skeleton(
            EntityKind::TestDefinition,
            id,
            skeleton,
            src,
            options,
            properties,
        )
    }

    pub fn test_suite(
        identifier: Option<&str>,
        properties: Option<Map<String, Value>>,
    ) -> Result<Self, RoCrateError> {
        let id = identifier
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", Ulid::new()));
        let skeleton = object(&[("@type", json!("TestSuite"))]);
        Self::from_skeleton(
            EntityKind::TestSuite,
            id,
            skeleton,
            None,
            DataOptions::default(),
            properties,
        )
    }

    pub fn test_instance(
        identifier: Option<&str>,
        properties: Option<Map<String, Value>>,
    ) -> Result<Self, RoCrateError> {
        let id = identifier
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", Ulid::new()));
        let skeleton = object(&[("@type", json!("TestInstance"))]);
        Self::from_skeleton(
            EntityKind::TestInstance,
            id,
            skeleton,
            None,
            DataOptions::default(),
            properties,
        )
    }

    /// The crate's single top-level dataset, id "./"
    pub fn root_dataset(properties: Option<Map<String, Value>>) -> Result<Self, RoCrateError> {
        Self::root_dataset_with_id("./", properties)
    }

    pub(crate) fn root_dataset_with_id(
        id: &str,
        properties: Option<Map<String, Value>>,
    ) -> Result<Self, RoCrateError> {
        let id = if is_url(id) { id.to_string() } else { dir_id(id) };
        let skeleton = object(&[
            ("@type", json!("Dataset")),
            ("datePublished", json!(iso_now())),
        ]);
        Self::from_skeleton(
            EntityKind::RootDataset,
            id,
            skeleton,
            None,
            DataOptions::default(),
            properties,
        )
    }

    /// The metadata descriptor, current or legacy flavour
    ///
    /// The identifier defaults to the conventional basename but can be
    /// overridden when reloading a crate that names it differently.
    pub(crate) fn metadata_descriptor(
        legacy: bool,
        identifier: Option<&str>,
        properties: Option<Map<String, Value>>,
    ) -> Result<Self, RoCrateError> {
        let (kind, basename, profile) = if legacy {
            (
                EntityKind::LegacyMetadata,
                crate::vocab::LEGACY_METADATA_BASENAME,
                crate::vocab::LEGACY_PROFILE,
            )
        } else {
            (
                EntityKind::Metadata,
                crate::vocab::METADATA_BASENAME,
                crate::vocab::PROFILE,
            )
        };
        let skeleton = object(&[
            ("@type", json!("CreativeWork")),
            ("conformsTo", json!({"@id": profile})),
            ("about", json!({"@id": "./"})),
        ]);
        Self::from_skeleton(
            kind,
            identifier.unwrap_or(basename).to_string(),
            skeleton,
            None,
            DataOptions::default(),
            properties,
        )
    }

    pub(crate) fn preview(
        source: Option<PathBuf>,
        properties: Option<Map<String, Value>>,
    ) -> Result<Self, RoCrateError> {
        let skeleton = object(&[
            ("@type", json!("CreativeWork")),
            ("about", json!({"@id": "./"})),
        ]);
        Self::from_skeleton(
            EntityKind::Preview,
            crate::vocab::PREVIEW_BASENAME.to_string(),
            skeleton,
            source.map(EntitySource::Local),
            DataOptions::default(),
            properties,
        )
    }

    /// Contextual entity with a fixed kind and `@type`, used by the
    /// vocabulary tables and the loader's type dispatch
    pub(crate) fn typed_contextual(
        kind: EntityKind,
        identifier: &str,
        type_value: Value,
        properties: Option<Map<String, Value>>,
    ) -> Result<Self, RoCrateError> {
        let skeleton = object(&[("@type", type_value)]);
        Self::from_skeleton(
            kind,
            identifier.to_string(),
            skeleton,
            None,
            DataOptions::default(),
            properties,
        )
    }

    /// Reconstruct a data entity of a dispatched kind during load
    pub(crate) fn load_data(
        kind: EntityKind,
        source: Option<&str>,
        dest_path: Option<&str>,
        properties: Map<String, Value>,
    ) -> Result<Self, RoCrateError> {
        let options = DataOptions::default();
        match kind {
            EntityKind::File => Self::file(source, dest_path, options, Some(properties)),
            EntityKind::Dataset => Self::dataset(source, dest_path, options, Some(properties)),
            EntityKind::Workflow => Self::workflow(source, dest_path, options, Some(properties)),
            EntityKind::WorkflowDescription => {
                Self::workflow_description(source, dest_path, options, Some(properties))
            }
            EntityKind::TestDefinition => {
                Self::test_definition(source, dest_path, options, Some(properties))
            }
            _ => Self::data(
                dest_path.or(source).unwrap_or_default(),
                Some(properties),
            ),
        }
    }

    /// Reconstruct a contextual entity of a dispatched kind during load
    pub(crate) fn load_contextual(
        kind: EntityKind,
        identifier: &str,
        properties: Map<String, Value>,
    ) -> Result<Self, RoCrateError> {
        match kind {
            EntityKind::Person => Self::person(identifier, Some(properties)),
            EntityKind::TestSuite => Self::test_suite(Some(identifier), Some(properties)),
            EntityKind::TestInstance => Self::test_instance(Some(identifier), Some(properties)),
            EntityKind::ComputerLanguage => Self::typed_contextual(
                kind,
                identifier,
                json!("ComputerLanguage"),
                Some(properties),
            ),
            EntityKind::TestService => {
                Self::typed_contextual(kind, identifier, json!("TestService"), Some(properties))
            }
            EntityKind::SoftwareApplication => Self::typed_contextual(
                kind,
                identifier,
                json!("SoftwareApplication"),
                Some(properties),
            ),
            _ => Self::contextual(Some(identifier), Some(properties)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Declared type names, one or many
    pub fn types(&self) -> Vec<&str> {
        type_names(&self.jsonld)
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.types().iter().any(|t| *t == name)
    }

    /// The full flattened property map, including `@id` and `@type`
    pub fn properties(&self) -> &Map<String, Value> {
        &self.jsonld
    }

    pub fn source(&self) -> Option<&EntitySource> {
        self.source.as_ref()
    }

    pub(crate) fn data_options(&self) -> DataOptions {
        self.options
    }

    pub fn is_data(&self) -> bool {
        self.kind.is_data()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.jsonld.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.jsonld.keys()
    }

    /// Raw property read; references come back as `{"@id": ...}` maps
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.jsonld.get(key)
    }

    /// Raw property read as a string, if it is one
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.jsonld.get(key).and_then(Value::as_str)
    }

    /// Set a property, encoding entity values as references
    ///
    /// Fails on reserved keys and on raw maps lacking an `@id`.
    pub fn set(
        &mut self,
        key: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<(), RoCrateError> {
        if key.starts_with('@') {
            return Err(RoCrateError::InvalidKey(key.to_string()));
        }
        let value = value.into();
        value.validate()?;
        self.jsonld.insert(key.to_string(), value.into_json());
        Ok(())
    }

    /// Append to a property, promoting a scalar to a list first
    ///
    /// With `compact`, a result of exactly one element collapses back
    /// to scalar form.
    pub fn append_to(
        &mut self,
        key: &str,
        value: impl Into<PropertyValue>,
        compact: bool,
    ) -> Result<(), RoCrateError> {
        if key.starts_with('@') {
            return Err(RoCrateError::InvalidKey(key.to_string()));
        }
        let value = value.into();
        value.validate()?;
        // reassignment keeps the key's position in the ordered map
        let mut items: Vec<Value> = match self.jsonld.get(key).cloned() {
            None => vec![],
            Some(Value::Array(items)) => items,
            Some(scalar) => vec![scalar],
        };
        match value {
            PropertyValue::Scalar(v) => items.push(v),
            PropertyValue::List(vs) => items.extend(vs),
        }
        if compact && items.len() == 1 {
            self.jsonld.insert(key.to_string(), items.remove(0));
        } else {
            self.jsonld.insert(key.to_string(), Value::Array(items));
        }
        Ok(())
    }

    /// Remove a property, returning its previous value
    pub fn remove(&mut self, key: &str) -> Result<Option<Value>, RoCrateError> {
        if key.starts_with('@') {
            return Err(RoCrateError::InvalidKey(key.to_string()));
        }
        Ok(self.jsonld.shift_remove(key))
    }

    /// Unchecked insert for bookkeeping writes (timestamps, sizes)
    pub(crate) fn insert_raw(&mut self, key: &str, value: Value) {
        self.jsonld.insert(key.to_string(), value);
    }

    /// Unchecked list append: the property is always left in list form
    pub(crate) fn push_value(&mut self, key: &str, value: Value) {
        let mut items: Vec<Value> = match self.jsonld.get(key).cloned() {
            None => vec![],
            Some(Value::Array(items)) => items,
            Some(scalar) => vec![scalar],
        };
        items.push(value);
        self.jsonld.insert(key.to_string(), Value::Array(items));
    }

    pub(crate) fn remove_raw(&mut self, key: &str) -> Option<Value> {
        self.jsonld.shift_remove(key)
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.jsonld == other.jsonld
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.jsonld.serialize(serializer)
    }
}

fn object(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in pairs {
        map.insert(key.to_string(), value.clone());
    }
    map
}

/// "workflow/main.ga" -> "workflow/main"
fn strip_extension(id: &str) -> &str {
    match id.rfind('.') {
        Some(dot) if !id[dot..].contains('/') => &id[..dot],
        _ => id,
    }
}

/// Resolve identifier and content source for a file or directory entity
///
/// An explicit destination path wins and must be relative; otherwise
/// the identifier defaults from the source: basename for local paths,
/// the URL itself (or its basename when fetching) for remote sources.
fn derive_identity(
    source: Option<&str>,
    dest_path: Option<&str>,
    fetch_remote: bool,
    dir: bool,
) -> Result<(String, Option<EntitySource>), RoCrateError> {
    let src = source.map(|s| {
        if is_url(s) {
            EntitySource::Remote(s.to_string())
        } else {
            EntitySource::Local(PathBuf::from(s))
        }
    });
    let id = match dest_path {
        Some(dest) => {
            if Path::new(dest).is_absolute() {
                return Err(RoCrateError::InvalidPath(PathBuf::from(dest)));
            }
            dest.to_string()
        }
        None => {
            let source = source.ok_or_else(|| {
                RoCrateError::InvalidOperation(
                    "dest_path must be provided if source is not given".to_string(),
                )
            })?;
            if is_url(source) {
                if fetch_remote {
                    basename(source.trim_end_matches('/'))?
                } else {
                    source.to_string()
                }
            } else {
                basename(source.trim_end_matches('/'))?
            }
        }
    };
    let id = if dir { dir_id(&id) } else { id };
    Ok((id, src))
}

fn basename(path: &str) -> Result<String, RoCrateError> {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| RoCrateError::InvalidPath(PathBuf::from(path)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut person = Entity::person("#alice", None).unwrap();
        person.set("name", "Alice").unwrap();
        assert_eq!(person.get_str("name"), Some("Alice"));
        assert_eq!(person.get_str("@type"), Some("Person"));
    }

    #[test]
    fn test_set_reserved_key_fails() {
        let mut person = Entity::person("#alice", None).unwrap();
        let err = person.set("@id", "nope").unwrap_err();
        assert!(matches!(err, RoCrateError::InvalidKey(_)));
        let err = person.remove("@type").unwrap_err();
        assert!(matches!(err, RoCrateError::InvalidKey(_)));
    }

    #[test]
    fn test_set_entity_stores_reference() {
        let alice = Entity::person("#alice", None).unwrap();
        let mut file = Entity::file(None, Some("data.csv"), DataOptions::default(), None).unwrap();
        file.set("author", &alice).unwrap();
        assert_eq!(file.get("author"), Some(&json!({"@id": "#alice"})));
    }

    #[test]
    fn test_set_bare_map_without_id_fails() {
        let mut file = Entity::file(None, Some("data.csv"), DataOptions::default(), None).unwrap();
        let err = file.set("author", json!({"name": "Alice"})).unwrap_err();
        assert!(matches!(err, RoCrateError::InvalidReference(_)));
        // With an @id the same map is accepted
        file.set("author", json!({"@id": "#alice"})).unwrap();
    }

    #[test]
    fn test_append_promotes_and_collapses() {
        let mut dataset =
            Entity::dataset(None, Some("data"), DataOptions::default(), None).unwrap();
        dataset.append_to("keywords", "one", false).unwrap();
        assert_eq!(dataset.get("keywords"), Some(&json!(["one"])));
        dataset.append_to("keywords", "two", false).unwrap();
        assert_eq!(dataset.get("keywords"), Some(&json!(["one", "two"])));

        let mut other = Entity::dataset(None, Some("more"), DataOptions::default(), None).unwrap();
        other.append_to("keywords", "only", true).unwrap();
        assert_eq!(other.get("keywords"), Some(&json!("only")));
    }

    #[test]
    fn test_dataset_id_gets_trailing_slash() {
        let dataset = Entity::dataset(None, Some("data"), DataOptions::default(), None).unwrap();
        assert_eq!(dataset.id(), "data/");
        let nested =
            Entity::dataset(None, Some("a/b///"), DataOptions::default(), None).unwrap();
        assert_eq!(nested.id(), "a/b/");
    }

    #[test]
    fn test_file_absolute_dest_rejected() {
        let err =
            Entity::file(None, Some("/etc/passwd"), DataOptions::default(), None).unwrap_err();
        assert!(matches!(err, RoCrateError::InvalidPath(_)));
    }

    #[test]
    fn test_file_id_defaults_from_source() {
        let file = Entity::file(
            Some("/tmp/input/table.csv"),
            None,
            DataOptions::default(),
            None,
        )
        .unwrap();
        assert_eq!(file.id(), "table.csv");

        let remote = Entity::file(
            Some("https://example.org/data/table.csv"),
            None,
            DataOptions::default(),
            None,
        )
        .unwrap();
        assert_eq!(remote.id(), "https://example.org/data/table.csv");

        let fetched = Entity::file(
            Some("https://example.org/data/table.csv"),
            None,
            DataOptions {
                fetch_remote: true,
                ..Default::default()
            },
            None,
        )
        .unwrap();
        assert_eq!(fetched.id(), "table.csv");
    }

    #[test]
    fn test_missing_source_and_dest_fails() {
        let err = Entity::file(None, None, DataOptions::default(), None).unwrap_err();
        assert!(matches!(err, RoCrateError::InvalidOperation(_)));
    }

    #[test]
    fn test_contextual_gets_fresh_id() {
        let a = Entity::contextual(None, None).unwrap();
        let b = Entity::contextual(None, None).unwrap();
        assert!(a.id().starts_with('#'));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_workflow_skeleton() {
        let wf = Entity::workflow(None, Some("wf/main.ga"), DataOptions::default(), None).unwrap();
        assert_eq!(
            wf.get("@type"),
            Some(&json!(["File", "SoftwareSourceCode", "ComputationalWorkflow"]))
        );
        assert_eq!(wf.get_str("name"), Some("wf/main"));
    }

    #[test]
    fn test_properties_merge_over_skeleton() {
        let mut props = Map::new();
        props.insert("@type".to_string(), json!(["Dataset", "RepositoryCollection"]));
        props.insert("name".to_string(), json!("my data"));
        let dataset = Entity::dataset(None, Some("data"), DataOptions::default(), Some(props))
            .unwrap();
        assert!(dataset.has_type("RepositoryCollection"));
        assert_eq!(dataset.get_str("name"), Some("my data"));
    }

    #[test]
    fn test_root_dataset_stamps_date_published() {
        let root = Entity::root_dataset(None).unwrap();
        assert_eq!(root.id(), "./");
        assert!(root.contains("datePublished"));
    }

    #[test]
    fn test_strip_extension() {
        assert_eq!(strip_extension("main.ga"), "main");
        assert_eq!(strip_extension("wf/main.ga"), "wf/main");
        assert_eq!(strip_extension("no_ext"), "no_ext");
        assert_eq!(strip_extension("v1.2/wf"), "v1.2/wf");
    }

    #[test]
    fn test_equality_includes_properties() {
        let mut a = Entity::person("#p", None).unwrap();
        let mut b = Entity::person("#p", None).unwrap();
        assert_eq!(a, b);
        a.set("name", "Alice").unwrap();
        assert_ne!(a, b);
        b.set("name", "Alice").unwrap();
        assert_eq!(a, b);
    }
}
