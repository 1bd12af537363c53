//! The RO-Crate entity graph
//!
//! [`RoCrate`] owns every entity of one crate: the root dataset and the
//! metadata descriptor live in dedicated slots (with an optional
//! preview), everything else sits in an insertion-ordered map keyed by
//! canonical id. Adding an entity whose canonical id is already present
//! replaces the previous entry, which matches the duplicate-`@id`
//! behaviour documented for the metadata file. Deleting an entity never
//! repairs references that point at it; keeping the graph consistent
//! after a delete is the caller's responsibility.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use tempfile::TempDir;

use crate::entity::{as_items, norm_ids, DataOptions, Entity, EntityKind, PropertyValue};
use crate::error::RoCrateError;
use crate::id::IdResolver;
use crate::vocab;

/// Options for creating or opening a crate
#[derive(Debug, Clone, Default)]
pub struct CrateOptions {
    /// Generate a fresh preview page instead of keeping an existing one
    pub gen_preview: bool,
    /// File and directory names skipped by every tree walk
    pub exclude: Vec<String>,
}

/// External converter producing an abstract CWL rendition of a workflow
///
/// Conversion is delegated to the caller; [`RoCrate::add_workflow`]
/// fails with an invalid-operation error when a conversion is requested
/// and no converter is supplied.
pub trait WorkflowConverter {
    fn convert(&self, source: &Path) -> Result<PathBuf, RoCrateError>;
}

/// Options for [`RoCrate::add_workflow`]
pub struct WorkflowOptions<'a> {
    /// Make this the crate's main workflow
    pub main: bool,
    /// Workflow language name, looked up in the known-language table
    pub lang: &'a str,
    pub lang_version: Option<&'a str>,
    /// Also generate and add an abstract CWL description
    pub gen_cwl: bool,
    pub data: DataOptions,
    pub converter: Option<&'a dyn WorkflowConverter>,
}

impl Default for WorkflowOptions<'_> {
    fn default() -> Self {
        Self {
            main: false,
            lang: "cwl",
            lang_version: None,
            gen_cwl: false,
            data: DataOptions::default(),
            converter: None,
        }
    }
}

/// A dereferenced property item: a live entity or the raw value
#[derive(Debug)]
pub enum Ref<'a> {
    Entity(&'a Entity),
    Value(&'a Value),
}

impl<'a> Ref<'a> {
    pub fn entity(&self) -> Option<&'a Entity> {
        match *self {
            Ref::Entity(e) => Some(e),
            Ref::Value(_) => None,
        }
    }
}

/// A dereferenced property, preserving its cardinality
#[derive(Debug)]
pub enum Resolved<'a> {
    Scalar(Ref<'a>),
    List(Vec<Ref<'a>>),
}

impl<'a> Resolved<'a> {
    /// The entities named by this property, in order
    pub fn entities(&self) -> Vec<&'a Entity> {
        match self {
            Resolved::Scalar(r) => r.entity().into_iter().collect(),
            Resolved::List(items) => items.iter().filter_map(Ref::entity).collect(),
        }
    }
}

/// Insertion-ordered entity storage keyed by canonical id
///
/// Replacing an entry keeps its original position, like the map the
/// metadata `@graph` is read into.
#[derive(Debug, Default)]
pub(crate) struct EntityMap {
    order: Vec<String>,
    entries: HashMap<String, Entity>,
}

impl EntityMap {
    pub(crate) fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub(crate) fn get(&self, key: &str) -> Option<&Entity> {
        self.entries.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &str) -> Option<&mut Entity> {
        self.entries.get_mut(key)
    }

    pub(crate) fn insert(&mut self, key: String, entity: Entity) {
        if !self.entries.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.entries.insert(key, entity);
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<Entity> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.order.retain(|k| k != key);
        }
        removed
    }

    /// Take an entity out while keeping its position reserved; pair
    /// with [`EntityMap::put_back`]
    pub(crate) fn take_entity(&mut self, key: &str) -> Option<Entity> {
        self.entries.remove(key)
    }

    pub(crate) fn put_back(&mut self, key: String, entity: Entity) {
        self.entries.insert(key, entity);
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.order.iter().filter_map(|key| self.entries.get(key))
    }

    pub(crate) fn keys_vec(&self) -> Vec<String> {
        self.order.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// One RO-Crate: the entity graph plus the sources backing its data
#[derive(Debug)]
pub struct RoCrate {
    pub(crate) resolver: IdResolver,
    pub(crate) root: Entity,
    pub(crate) metadata: Entity,
    pub(crate) preview: Option<Entity>,
    pub(crate) entities: EntityMap,
    pub(crate) extra_terms: Map<String, Value>,
    pub(crate) extra_contexts: Vec<String>,
    /// Directory the crate was loaded from, if any
    pub(crate) source: Option<PathBuf>,
    pub(crate) exclude: Vec<String>,
    /// Keeps a zipped crate's extraction directory alive
    pub(crate) zip_tmp: Option<TempDir>,
}

impl RoCrate {
    /// Fresh crate: a root dataset and a metadata descriptor
    pub fn new() -> Self {
        Self::new_with(&CrateOptions::default())
    }

    pub fn new_with(options: &CrateOptions) -> Self {
        Self::empty(options)
    }

    pub(crate) fn empty(options: &CrateOptions) -> Self {
        let root = Entity::root_dataset(None).expect("no initial properties");
        let metadata =
            Entity::metadata_descriptor(false, None, None).expect("no initial properties");
        let preview = if options.gen_preview {
            Some(Entity::preview(None, None).expect("no initial properties"))
        } else {
            None
        };
        RoCrate {
            resolver: IdResolver::new(),
            root,
            metadata,
            preview,
            entities: EntityMap::default(),
            extra_terms: Map::new(),
            extra_contexts: Vec::new(),
            source: None,
            exclude: options.exclude.clone(),
            zip_tmp: None,
        }
    }

    /// Open a crate from a directory or zip file
    pub fn open(source: impl AsRef<Path>) -> Result<Self, RoCrateError> {
        crate::loader::open(source.as_ref(), &CrateOptions::default())
    }

    pub fn open_with(
        source: impl AsRef<Path>,
        options: &CrateOptions,
    ) -> Result<Self, RoCrateError> {
        crate::loader::open(source.as_ref(), options)
    }

    /// Load a crate from an in-memory JSON-LD document
    pub fn from_document(document: &Value) -> Result<Self, RoCrateError> {
        crate::loader::from_document(document, &CrateOptions::default())
    }

    /// Crawl an un-annotated directory tree into a fresh crate
    pub fn init_from_tree(
        source: impl AsRef<Path>,
        options: &CrateOptions,
    ) -> Result<Self, RoCrateError> {
        crate::loader::init_from_tree(source.as_ref(), options)
    }

    /// Canonical form of an identifier within this crate
    pub fn resolve_id(&self, id: &str) -> String {
        self.resolver.canonicalize(id)
    }

    pub fn root_dataset(&self) -> &Entity {
        &self.root
    }

    pub fn root_dataset_mut(&mut self) -> &mut Entity {
        &mut self.root
    }

    pub fn metadata(&self) -> &Entity {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Entity {
        &mut self.metadata
    }

    pub fn preview(&self) -> Option<&Entity> {
        self.preview.as_ref()
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Dereference an entity by any form of its identifier
    pub fn get(&self, id: &str) -> Option<&Entity> {
        let key = self.resolver.canonicalize(id);
        self.get_by_key(&key)
    }

    fn get_by_key(&self, key: &str) -> Option<&Entity> {
        if self.resolver.canonicalize(self.root.id()) == key {
            return Some(&self.root);
        }
        if self.resolver.canonicalize(self.metadata.id()) == key {
            return Some(&self.metadata);
        }
        if let Some(preview) = &self.preview {
            if self.resolver.canonicalize(preview.id()) == key {
                return Some(preview);
            }
        }
        self.entities.get(key)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Entity> {
        let key = self.resolver.canonicalize(id);
        if self.resolver.canonicalize(self.root.id()) == key {
            return Some(&mut self.root);
        }
        if self.resolver.canonicalize(self.metadata.id()) == key {
            return Some(&mut self.metadata);
        }
        if let Some(preview) = &self.preview {
            if self.resolver.canonicalize(preview.id()) == key {
                return self.preview.as_mut();
            }
        }
        self.entities.get_mut(&key)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// All tracked entities: descriptor, root, preview, then the rest
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        [Some(&self.metadata), Some(&self.root), self.preview.as_ref()]
            .into_iter()
            .flatten()
            .chain(self.entities.iter())
    }

    /// Entities backed by bytes, excluding the default entities
    pub fn data_entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| e.is_data())
    }

    /// Entities not backed by bytes, excluding the default entities
    pub fn contextual_entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| !e.is_data())
    }

    /// Root dataset, metadata descriptor and preview, if present
    pub fn default_entities(&self) -> Vec<&Entity> {
        [Some(&self.root), Some(&self.metadata), self.preview.as_ref()]
            .into_iter()
            .flatten()
            .collect()
    }

    /// Number of tracked entities, default entities included
    pub fn len(&self) -> usize {
        self.entities.len() + 2 + usize::from(self.preview.is_some())
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Entities declaring the given types, as subset or exact match
    pub fn get_by_type(&self, types: &[&str], exact: bool) -> Vec<&Entity> {
        let wanted: HashSet<&str> = types.iter().copied().collect();
        self.entities()
            .filter(|e| {
                let own: HashSet<&str> = e.types().into_iter().collect();
                if exact {
                    own == wanted
                } else {
                    wanted.is_subset(&own)
                }
            })
            .collect()
    }

    /// Dereference one raw JSON value against the graph
    pub fn resolve_value<'a>(&'a self, value: &'a Value) -> Ref<'a> {
        if let Some(id) = value.get("@id").and_then(Value::as_str) {
            if let Some(entity) = self.get(id) {
                return Ref::Entity(entity);
            }
        }
        Ref::Value(value)
    }

    /// Read a property with reference resolution
    ///
    /// A list comes back as a list and a scalar as a scalar; references
    /// to unregistered ids come back as their raw value.
    pub fn resolve_property<'a>(
        &'a self,
        entity: &'a Entity,
        key: &str,
    ) -> Option<Resolved<'a>> {
        let value = entity.get(key)?;
        if key.starts_with('@') {
            return Some(Resolved::Scalar(Ref::Value(value)));
        }
        match value {
            Value::Array(items) => Some(Resolved::List(
                items.iter().map(|v| self.resolve_value(v)).collect(),
            )),
            scalar => Some(Resolved::Scalar(self.resolve_value(scalar))),
        }
    }

    /// Add an entity, replacing any entry with the same canonical id
    ///
    /// Root dataset, metadata and preview entities take over their
    /// dedicated slots. A data entity added for the first time is also
    /// appended to the root dataset's `hasPart` list. Returns the
    /// entity's identifier.
    pub fn add(&mut self, entity: Entity) -> String {
        let raw_id = entity.id().to_string();
        match entity.kind() {
            EntityKind::RootDataset => self.root = entity,
            EntityKind::Metadata | EntityKind::LegacyMetadata => self.metadata = entity,
            EntityKind::Preview => self.preview = Some(entity),
            kind => {
                let key = self.resolver.canonicalize(entity.id());
                if kind.is_data() && !self.entities.contains(&key) {
                    self.root.push_value("hasPart", json!({"@id": entity.id()}));
                }
                self.entities.insert(key, entity);
            }
        }
        raw_id
    }

    /// Delete an entity by identifier
    ///
    /// The root dataset and the metadata descriptor cannot be deleted.
    /// Unknown identifiers are ignored. References pointing at the
    /// deleted entity are left dangling.
    pub fn delete(&mut self, id: &str) -> Result<(), RoCrateError> {
        let key = self.resolver.canonicalize(id);
        if key == self.resolver.canonicalize(self.root.id()) {
            return Err(RoCrateError::InvalidOperation(
                "cannot delete the root data entity".to_string(),
            ));
        }
        if key == self.resolver.canonicalize(self.metadata.id()) {
            return Err(RoCrateError::InvalidOperation(
                "cannot delete the metadata entity".to_string(),
            ));
        }
        if let Some(preview) = &self.preview {
            if key == self.resolver.canonicalize(preview.id()) {
                self.preview = None;
                return Ok(());
            }
        }
        if let Some(is_data) = self.entities.get(&key).map(Entity::is_data) {
            if is_data {
                self.remove_part(&key);
            }
            self.entities.remove(&key);
        }
        Ok(())
    }

    /// Drop an entry from the root's `hasPart`; the property itself is
    /// removed when the list becomes empty
    fn remove_part(&mut self, key: &str) {
        let resolver = &self.resolver;
        let Some(value) = self.root.get("hasPart").cloned() else {
            return;
        };
        let items: Vec<Value> = match value {
            Value::Array(items) => items,
            scalar => vec![scalar],
        };
        let kept: Vec<Value> = items
            .into_iter()
            .filter(|item| match item.get("@id").and_then(Value::as_str) {
                Some(id) => resolver.canonicalize(id) != key,
                None => true,
            })
            .collect();
        if kept.is_empty() {
            self.root.remove_raw("hasPart");
        } else {
            self.root.insert_raw("hasPart", Value::Array(kept));
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.root.get_str("name")
    }

    pub fn set_name(&mut self, value: &str) {
        self.root.insert_raw("name", json!(value));
    }

    pub fn description(&self) -> Option<&str> {
        self.root.get_str("description")
    }

    pub fn set_description(&mut self, value: &str) {
        self.root.insert_raw("description", json!(value));
    }

    pub fn keywords(&self) -> Vec<&str> {
        match self.root.get("keywords") {
            Some(value) => as_items(value)
                .into_iter()
                .filter_map(Value::as_str)
                .collect(),
            None => vec![],
        }
    }

    pub fn set_keywords(&mut self, values: &[&str]) {
        self.root.insert_raw("keywords", json!(values));
    }

    pub fn date_published(&self) -> Option<DateTime<FixedOffset>> {
        self.root
            .get_str("datePublished")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    }

    pub fn set_date_published(&mut self, value: DateTime<Utc>) {
        self.root.insert_raw(
            "datePublished",
            json!(value.to_rfc3339_opts(SecondsFormat::Secs, false)),
        );
    }

    pub fn license(&self) -> Option<Resolved<'_>> {
        self.resolve_property(&self.root, "license")
    }

    pub fn set_license(
        &mut self,
        value: impl Into<PropertyValue>,
    ) -> Result<(), RoCrateError> {
        self.root.set("license", value)
    }

    pub fn creator(&self) -> Option<Resolved<'_>> {
        self.resolve_property(&self.root, "creator")
    }

    pub fn set_creator(
        &mut self,
        value: impl Into<PropertyValue>,
    ) -> Result<(), RoCrateError> {
        self.root.set("creator", value)
    }

    pub fn publisher(&self) -> Option<Resolved<'_>> {
        self.resolve_property(&self.root, "publisher")
    }

    pub fn set_publisher(
        &mut self,
        value: impl Into<PropertyValue>,
    ) -> Result<(), RoCrateError> {
        self.root.set("publisher", value)
    }

    pub fn is_based_on(&self) -> Option<Resolved<'_>> {
        self.resolve_property(&self.root, "isBasedOn")
    }

    pub fn set_is_based_on(
        &mut self,
        value: impl Into<PropertyValue>,
    ) -> Result<(), RoCrateError> {
        self.root.set("isBasedOn", value)
    }

    pub fn image(&self) -> Option<Resolved<'_>> {
        self.resolve_property(&self.root, "image")
    }

    pub fn set_image(
        &mut self,
        value: impl Into<PropertyValue>,
    ) -> Result<(), RoCrateError> {
        self.root.set("image", value)
    }

    pub fn creative_work_status(&self) -> Option<&str> {
        self.root.get_str("creativeWorkStatus")
    }

    pub fn set_creative_work_status(&mut self, value: &str) {
        self.root.insert_raw("creativeWorkStatus", json!(value));
    }

    /// The crate's main workflow, if one has been designated
    pub fn main_entity(&self) -> Option<&Entity> {
        match self.resolve_property(&self.root, "mainEntity")? {
            Resolved::Scalar(r) => r.entity(),
            Resolved::List(items) => items.first().and_then(Ref::entity),
        }
    }

    pub fn set_main_entity(&mut self, id: &str) {
        self.root.insert_raw("mainEntity", json!({"@id": id}));
    }

    /// The `test/` dataset, a legacy convention for test payloads
    pub fn test_dir(&self) -> Option<&Entity> {
        self.get("test").filter(|e| e.has_type("Dataset"))
    }

    pub fn examples_dir(&self) -> Option<&Entity> {
        self.get("examples").filter(|e| e.has_type("Dataset"))
    }

    /// Test suites reachable from the root dataset, deduplicated
    ///
    /// Looks at the root's `mentions` and `about` plus the legacy
    /// `test/` directory's `about`.
    pub fn test_suites(&self) -> Vec<&Entity> {
        let mut seen = HashSet::new();
        let mut suites = Vec::new();
        let sources = [
            self.root.get("mentions"),
            self.root.get("about"),
            self.test_dir().and_then(|d| d.get("about")),
        ];
        for value in sources.into_iter().flatten() {
            for item in as_items(value) {
                if let Ref::Entity(entity) = self.resolve_value(item) {
                    if entity.kind() == EntityKind::TestSuite {
                        let key = self.resolver.canonicalize(entity.id());
                        if seen.insert(key) {
                            suites.push(entity);
                        }
                    }
                }
            }
        }
        suites
    }

    /// Context terms accumulated beyond the base profile context
    pub fn extra_terms(&self) -> &Map<String, Value> {
        &self.extra_terms
    }

    pub fn extend_extra_terms(&mut self, terms: &[(&str, &str)]) {
        for (term, uri) in terms {
            self.extra_terms.insert(term.to_string(), json!(uri));
        }
    }

    pub fn add_extra_context(&mut self, url: &str) {
        self.extra_contexts.push(url.to_string());
    }

    pub fn add_file(
        &mut self,
        source: Option<&str>,
        dest_path: Option<&str>,
        options: DataOptions,
        properties: Option<Map<String, Value>>,
    ) -> Result<String, RoCrateError> {
        let entity = Entity::file(source, dest_path, options, properties)?;
        Ok(self.add(entity))
    }

    pub fn add_dataset(
        &mut self,
        source: Option<&str>,
        dest_path: Option<&str>,
        options: DataOptions,
        properties: Option<Map<String, Value>>,
    ) -> Result<String, RoCrateError> {
        let entity = Entity::dataset(source, dest_path, options, properties)?;
        Ok(self.add(entity))
    }

    pub fn add_directory(
        &mut self,
        source: Option<&str>,
        dest_path: Option<&str>,
    ) -> Result<String, RoCrateError> {
        self.add_dataset(source, dest_path, DataOptions::default(), None)
    }

    /// Add a directory and every file and subdirectory under it, each
    /// as its own entity wired through nested `hasPart` lists
    pub fn add_tree(
        &mut self,
        source: &Path,
        dest_path: Option<&str>,
    ) -> Result<String, RoCrateError> {
        if !source.is_dir() {
            return Err(RoCrateError::NotFound(source.to_path_buf()));
        }
        let source_str = path_str(source)?;
        let top_id = self.add_dataset(
            Some(&source_str),
            dest_path,
            DataOptions::default(),
            None,
        )?;
        for entry in fs::read_dir(source)? {
            let entry = entry?;
            let child = entry.path();
            let child_str = path_str(&child)?;
            let name = entry.file_name();
            let dest = format!(
                "{}{}",
                top_id,
                name.to_str()
                    .ok_or_else(|| RoCrateError::InvalidPath(child.clone()))?
            );
            let child_id = if child.is_dir() {
                self.add_tree(&child, Some(&dest))?
            } else {
                self.add_file(Some(&child_str), Some(&dest), DataOptions::default(), None)?
            };
            let reference = json!({"@id": child_id});
            if let Some(top) = self.get_mut(&top_id) {
                top.push_value("hasPart", reference);
            }
        }
        Ok(top_id)
    }

    /// Add a workflow file together with its language entity
    ///
    /// The workflow's `programmingLanguage` points at the language; a
    /// main workflow also becomes the root's `mainEntity` and stamps
    /// the workflow profile onto the metadata descriptor.
    pub fn add_workflow(
        &mut self,
        source: Option<&str>,
        dest_path: Option<&str>,
        options: &WorkflowOptions<'_>,
        properties: Option<Map<String, Value>>,
    ) -> Result<String, RoCrateError> {
        let workflow = Entity::workflow(source, dest_path, options.data, properties)?;
        let workflow_id = self.add(workflow);

        let lang = vocab::get_language(options.lang, options.lang_version)?;
        let lang_id = lang.id().to_string();
        let lang_name = match lang_id.rsplit_once('#') {
            Some((_, fragment)) => fragment.to_string(),
            None => lang_id.clone(),
        };
        self.add(lang);
        if let Some(wf) = self.get_mut(&workflow_id) {
            wf.insert_raw("programmingLanguage", json!({"@id": lang_id}));
        }

        if options.main {
            self.set_main_entity(&workflow_id);
            let mut profiles: BTreeSet<String> = norm_ids(self.metadata.get("conformsTo"))
                .into_iter()
                .map(|p| p.trim_end_matches('/').to_string())
                .collect();
            profiles.insert(vocab::WORKFLOW_PROFILE.to_string());
            let refs: Vec<Value> = profiles.iter().map(|p| json!({"@id": p})).collect();
            self.metadata.insert_raw("conformsTo", Value::Array(refs));
        }

        if options.gen_cwl && lang_name != "cwl" {
            if lang_name != "galaxy" {
                return Err(RoCrateError::InvalidOperation(format!(
                    "conversion from {} to abstract CWL not supported",
                    options.lang
                )));
            }
            let converter = options.converter.ok_or_else(|| {
                RoCrateError::InvalidOperation(
                    "conversion to CWL not available: no converter supplied".to_string(),
                )
            })?;
            let source = source.ok_or_else(|| {
                RoCrateError::InvalidOperation(
                    "conversion to CWL requires a local workflow source".to_string(),
                )
            })?;
            let converted = converter.convert(Path::new(source))?;
            let converted_str = path_str(&converted)?;
            let cwl_dest = Path::new(source)
                .with_extension("cwl")
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| RoCrateError::InvalidPath(PathBuf::from(source)))?;
            let description = Entity::workflow_description(
                Some(&converted_str),
                Some(&cwl_dest),
                options.data,
                None,
            )?;
            let description_id = self.add(description);
            let cwl = vocab::get_language("cwl", None)?;
            let cwl_id = cwl.id().to_string();
            self.add(cwl);
            if let Some(desc) = self.get_mut(&description_id) {
                desc.insert_raw("programmingLanguage", json!({"@id": cwl_id}));
            }
            if let Some(wf) = self.get_mut(&workflow_id) {
                wf.insert_raw("subjectOf", json!({"@id": description_id}));
            }
        }
        Ok(workflow_id)
    }

    /// Add a test suite, linked from the root dataset
    pub fn add_test_suite(
        &mut self,
        identifier: Option<&str>,
        name: Option<&str>,
        main_entity: Option<&str>,
        properties: Option<Map<String, Value>>,
    ) -> Result<String, RoCrateError> {
        let mut link_prop = "mentions";
        let main_id = match main_entity {
            Some(id) => Some(id.to_string()),
            None => {
                let current = self.main_entity().map(|e| e.id().to_string());
                if current.is_none() {
                    link_prop = "about";
                }
                current
            }
        };
        let suite = Entity::test_suite(identifier, properties)?;
        let suite_id = self.add(suite);
        let default_name = suite_id.trim_start_matches('#').to_string();
        if let Some(suite) = self.get_mut(&suite_id) {
            if !suite.contains("name") {
                suite.insert_raw("name", json!(name.unwrap_or(&default_name)));
            }
            if let Some(main_id) = &main_id {
                suite.insert_raw("mainEntity", json!({"@id": main_id}));
            }
        }
        self.root.push_value(link_prop, json!({"@id": suite_id}));
        self.extend_extra_terms(vocab::TESTING_EXTRA_TERMS);
        Ok(suite_id)
    }

    /// Add a test instance under an existing suite
    #[allow(clippy::too_many_arguments)]
    pub fn add_test_instance(
        &mut self,
        suite: &str,
        url: &str,
        resource: &str,
        service: &str,
        identifier: Option<&str>,
        name: Option<&str>,
        properties: Option<Map<String, Value>>,
    ) -> Result<String, RoCrateError> {
        let suite_id = self.validate_suite(suite)?;
        let instance = Entity::test_instance(identifier, properties)?;
        let instance_id = self.add(instance);
        let service_entity = vocab::get_service(service)?;
        let service_id = service_entity.id().to_string();
        self.add(service_entity);
        let default_name = instance_id.trim_start_matches('#').to_string();
        if let Some(instance) = self.get_mut(&instance_id) {
            instance.insert_raw("url", json!(url));
            instance.insert_raw("resource", json!(resource));
            instance.insert_raw("runsOn", json!({"@id": service_id}));
            if !instance.contains("name") {
                instance.insert_raw("name", json!(name.unwrap_or(&default_name)));
            }
        }
        if let Some(suite) = self.get_mut(&suite_id) {
            suite.push_value("instance", json!({"@id": instance_id}));
        }
        self.extend_extra_terms(vocab::TESTING_EXTRA_TERMS);
        Ok(instance_id)
    }

    /// Add a test definition file under an existing suite
    #[allow(clippy::too_many_arguments)]
    pub fn add_test_definition(
        &mut self,
        suite: &str,
        source: Option<&str>,
        dest_path: Option<&str>,
        engine: &str,
        engine_version: Option<&str>,
        options: DataOptions,
        properties: Option<Map<String, Value>>,
    ) -> Result<String, RoCrateError> {
        let suite_id = self.validate_suite(suite)?;
        let definition = Entity::test_definition(source, dest_path, options, properties)?;
        let definition_id = self.add(definition);
        let engine_entity = vocab::get_application(engine)?;
        let engine_id = engine_entity.id().to_string();
        self.add(engine_entity);
        if let Some(definition) = self.get_mut(&definition_id) {
            definition.insert_raw("conformsTo", json!({"@id": engine_id}));
            if let Some(version) = engine_version {
                definition.insert_raw("engineVersion", json!(version));
            }
        }
        if let Some(suite) = self.get_mut(&suite_id) {
            suite.insert_raw("definition", json!({"@id": definition_id}));
        }
        self.extend_extra_terms(vocab::TESTING_EXTRA_TERMS);
        Ok(definition_id)
    }

    fn validate_suite(&self, suite: &str) -> Result<String, RoCrateError> {
        match self.get(suite) {
            Some(entity) => Ok(entity.id().to_string()),
            None => Err(RoCrateError::InvalidOperation(
                "suite not found".to_string(),
            )),
        }
    }

    /// Record an action carried out with the given instrument
    pub fn add_action(
        &mut self,
        instrument: &str,
        identifier: Option<&str>,
        objects: &[&str],
        results: &[&str],
        properties: Option<Map<String, Value>>,
    ) -> Result<String, RoCrateError> {
        let mut props = properties.unwrap_or_default();
        if !props.contains_key("@type") {
            props.insert("@type".to_string(), json!("CreateAction"));
        }
        let had_name = props.contains_key("name");
        let action = Entity::contextual(identifier, Some(props))?;
        let action_id = self.add(action);
        let default_name = action_id.trim_start_matches('#').to_string();
        if let Some(action) = self.get_mut(&action_id) {
            action.insert_raw("instrument", json!({"@id": instrument}));
            if !had_name {
                action.insert_raw("name", json!(default_name));
            }
            if !objects.is_empty() {
                let refs: Vec<Value> = objects.iter().map(|id| json!({"@id": id})).collect();
                action.insert_raw("object", Value::Array(refs));
            }
            if !results.is_empty() {
                let refs: Vec<Value> = results.iter().map(|id| json!({"@id": id})).collect();
                action.insert_raw("result", Value::Array(refs));
            }
        }
        self.root.push_value("mentions", json!({"@id": action_id}));
        Ok(action_id)
    }

    /// Add a contextual entity from a raw JSON-LD object
    ///
    /// The object must carry `@id` and `@type`; an already-registered
    /// id is an error.
    pub fn add_jsonld(&mut self, jsonld: &Value) -> Result<String, RoCrateError> {
        let obj = jsonld
            .as_object()
            .filter(|o| o.contains_key("@id") && o.contains_key("@type"))
            .ok_or_else(|| {
                RoCrateError::InvalidReference(
                    "a non-empty JSON-LD object with @id and @type is required".to_string(),
                )
            })?;
        let id = obj
            .get("@id")
            .and_then(Value::as_str)
            .ok_or_else(|| RoCrateError::InvalidReference("@id must be a string".to_string()))?
            .to_string();
        if self.get(&id).is_some() {
            return Err(RoCrateError::InvalidOperation(format!(
                "entity {id} already exists"
            )));
        }
        let mut props = obj.clone();
        props.shift_remove("@id");
        let entity = Entity::contextual(Some(&id), Some(props))?;
        Ok(self.add(entity))
    }

    /// Update an existing entity from a raw JSON-LD object
    ///
    /// Reserved keys other than the addressing `@id` are discarded.
    pub fn update_jsonld(&mut self, jsonld: &Value) -> Result<String, RoCrateError> {
        let obj = jsonld.as_object().ok_or_else(|| {
            RoCrateError::InvalidReference("a non-empty JSON-LD object is required".to_string())
        })?;
        let id = obj
            .get("@id")
            .and_then(Value::as_str)
            .ok_or_else(|| RoCrateError::InvalidReference("@id is required".to_string()))?
            .to_string();
        let entity = self.get_mut(&id).ok_or_else(|| {
            RoCrateError::InvalidOperation(format!("entity {id} does not exist"))
        })?;
        for (key, value) in obj {
            if !key.starts_with('@') {
                entity.insert_raw(key, value.clone());
            }
        }
        Ok(id)
    }

    pub fn add_or_update_jsonld(&mut self, jsonld: &Value) -> Result<String, RoCrateError> {
        let id = jsonld
            .as_object()
            .and_then(|o| o.get("@id"))
            .and_then(Value::as_str);
        match id {
            Some(id) if self.get(id).is_some() => self.update_jsonld(jsonld),
            _ => self.add_jsonld(jsonld),
        }
    }

    /// The flattened JSON-LD metadata document
    pub fn metadata_document(&self) -> Value {
        crate::write::metadata_document(self)
    }

    /// Materialize the crate into a directory
    pub fn write(&mut self, base_path: impl AsRef<Path>) -> Result<(), RoCrateError> {
        crate::write::write(self, base_path.as_ref())
    }

    /// Materialize the crate as a zip archive at the given path
    pub fn write_zip(&mut self, out_path: impl AsRef<Path>) -> Result<PathBuf, RoCrateError> {
        crate::write::write_zip(self, out_path.as_ref())
    }

    /// Lazy chunked byte stream of the crate as a zip archive
    pub fn stream_zip(
        &mut self,
        chunk_size: usize,
    ) -> Result<crate::write::ZipStream, RoCrateError> {
        crate::write::stream_zip(self, chunk_size)
    }
}

impl Default for RoCrate {
    fn default() -> Self {
        Self::new()
    }
}

fn path_str(path: &Path) -> Result<String, RoCrateError> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| RoCrateError::InvalidPath(path.to_path_buf()))
}

/// Build a workflow-centered crate around one workflow file
///
/// The workflow becomes the crate's main entity; extra payload files
/// are added alongside it. An abstract CWL description is generated
/// when a converter is supplied and the language is not already CWL.
pub fn make_workflow_crate(
    workflow_path: &Path,
    lang: &str,
    include_files: &[&str],
    fetch_remote: bool,
    converter: Option<&dyn WorkflowConverter>,
) -> Result<RoCrate, RoCrateError> {
    let mut cr = RoCrate::new();
    let source = path_str(workflow_path)?;
    let dest = workflow_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| RoCrateError::InvalidPath(workflow_path.to_path_buf()))?;
    cr.add_workflow(
        Some(&source),
        Some(dest),
        &WorkflowOptions {
            main: true,
            lang,
            gen_cwl: converter.is_some(),
            data: DataOptions {
                fetch_remote,
                ..Default::default()
            },
            converter,
            ..Default::default()
        },
        None,
    )?;
    for file in include_files {
        cr.add_file(Some(file), None, DataOptions::default(), None)?;
    }
    Ok(cr)
}
