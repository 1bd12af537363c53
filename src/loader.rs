//! Loading RO-Crates from directories, zip archives and documents
//!
//! Reconstruction is a single pass over the flattened `@graph`: the
//! metadata descriptor and the root dataset are pulled out first, the
//! root's `hasPart` tree is walked depth-first to claim data entities
//! (dispatching each to a concrete kind by its declared types), and
//! whatever is left over becomes a contextual entity. `hasPart` entries
//! that point at nothing are skipped, so inconsistent crates still
//! load; a duplicate `@id` replaces the earlier occurrence.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tempfile::TempDir;
use zip::ZipArchive;

use crate::entity::{norm_ids, type_names, DataOptions, Entity, EntityKind};
use crate::error::RoCrateError;
use crate::id::is_url;
use crate::rocrate::{CrateOptions, RoCrate};
use crate::vocab;
use crate::vocab::{pick_kind, CONTEXTUAL_TYPE_TABLE, DATA_TYPE_TABLE};
use crate::write::walk_tree;

/// Entities pending assignment, keyed by raw id in document order
type Pool = Vec<(String, Map<String, Value>)>;

/// Open a crate from a directory or zip file
pub(crate) fn open(source: &Path, options: &CrateOptions) -> Result<RoCrate, RoCrateError> {
    if !source.exists() {
        return Err(RoCrateError::NotFound(source.to_path_buf()));
    }
    let (dir, zip_tmp) = if is_zipfile(source)? {
        let tmp = extract_zip(source)?;
        (tmp.path().to_path_buf(), Some(tmp))
    } else {
        (source.to_path_buf(), None)
    };
    let metadata_path = find_metadata_file(&dir)?;
    let document: Value = serde_json::from_reader(File::open(metadata_path)?)?;
    let mut cr = RoCrate::empty(options);
    cr.source = Some(dir.clone());
    cr.zip_tmp = zip_tmp;
    populate(&mut cr, &document, Some(&dir), options.gen_preview)?;
    Ok(cr)
}

/// Load a crate from an in-memory JSON-LD document
pub(crate) fn from_document(
    document: &Value,
    options: &CrateOptions,
) -> Result<RoCrate, RoCrateError> {
    let mut cr = RoCrate::empty(options);
    populate(&mut cr, document, None, options.gen_preview)?;
    Ok(cr)
}

/// Crawl an un-annotated directory tree into a fresh crate
pub(crate) fn init_from_tree(
    top: &Path,
    options: &CrateOptions,
) -> Result<RoCrate, RoCrateError> {
    if !top.is_dir() {
        return Err(RoCrateError::NotFound(top.to_path_buf()));
    }
    let mut cr = RoCrate::empty(options);
    for entry in walk_tree(top, &options.exclude) {
        let entry = entry.map_err(std::io::Error::from)?;
        let path = entry.path();
        let rel = path
            .strip_prefix(top)
            .map_err(|_| RoCrateError::InvalidPath(path.to_path_buf()))?;
        let rel_str = rel.to_string_lossy().into_owned();
        let path_str = path.to_string_lossy().into_owned();
        if entry.file_type().is_dir() {
            cr.add(Entity::dataset(
                Some(&path_str),
                Some(&rel_str),
                DataOptions::default(),
                None,
            )?);
        } else {
            if rel_str == vocab::METADATA_BASENAME || rel_str == vocab::LEGACY_METADATA_BASENAME
            {
                continue;
            }
            if rel_str == vocab::PREVIEW_BASENAME {
                if !options.gen_preview {
                    cr.add(Entity::preview(Some(path.to_path_buf()), None)?);
                }
                continue;
            }
            cr.add(Entity::file(
                Some(&path_str),
                Some(&rel_str),
                DataOptions::default(),
                None,
            )?);
        }
    }
    cr.source = Some(top.to_path_buf());
    Ok(cr)
}

/// Check for the local-file zip magic without trusting the extension
fn is_zipfile(path: &Path) -> Result<bool, RoCrateError> {
    if !path.is_file() {
        return Ok(false);
    }
    let mut magic = [0u8; 4];
    let mut file = File::open(path)?;
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(matches!(
            &magic,
            b"PK\x03\x04" | b"PK\x05\x06" | b"PK\x07\x08"
        )),
        Err(_) => Ok(false),
    }
}

/// Extract a zipped crate into a temporary directory
///
/// The directory lives as long as the returned guard, which the crate
/// holds on to so extracted sources stay readable.
fn extract_zip(path: &Path) -> Result<TempDir, RoCrateError> {
    let tmp = tempfile::tempdir()?;
    let mut archive = ZipArchive::new(File::open(path)?)?;
    archive.extract(tmp.path())?;
    Ok(tmp)
}

/// Locate the metadata file, current name first, then the legacy one
fn find_metadata_file(dir: &Path) -> Result<PathBuf, RoCrateError> {
    for basename in [vocab::METADATA_BASENAME, vocab::LEGACY_METADATA_BASENAME] {
        let candidate = dir.join(basename);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(RoCrateError::InvalidCrate(format!(
        "missing {} in {}",
        vocab::METADATA_BASENAME,
        dir.display()
    )))
}

/// Flatten the `@graph` into a pool of raw-id/properties pairs
///
/// A duplicate `@id` replaces the earlier entry in place, so the last
/// occurrence wins while document order is kept.
fn collect_pool(document: &Value) -> Result<Pool, RoCrateError> {
    let graph = document
        .get("@graph")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            RoCrateError::InvalidCrate("no @graph array in metadata document".to_string())
        })?;
    let mut pool: Pool = Vec::new();
    for member in graph {
        let obj = member.as_object().ok_or_else(|| {
            RoCrateError::InvalidCrate("@graph members must be objects".to_string())
        })?;
        let id = obj.get("@id").and_then(Value::as_str).ok_or_else(|| {
            RoCrateError::InvalidCrate("@graph member without @id".to_string())
        })?;
        match pool.iter_mut().find(|(key, _)| key == id) {
            Some(slot) => slot.1 = obj.clone(),
            None => pool.push((id.to_string(), obj.clone())),
        }
    }
    Ok(pool)
}

fn take(pool: &mut Pool, id: &str) -> Option<Map<String, Value>> {
    pool.iter()
        .position(|(key, _)| key == id)
        .map(|index| pool.remove(index).1)
}

/// Locate the metadata descriptor and the root entity id it points at
///
/// The conventional basenames are tried first; failing that, a single
/// entity conforming to an RO-Crate profile and carrying `about` is
/// accepted. Anything else is an invalid crate.
fn find_root_entity(pool: &Pool) -> Result<(String, bool, String), RoCrateError> {
    for (basename, legacy) in [
        (vocab::METADATA_BASENAME, false),
        (vocab::LEGACY_METADATA_BASENAME, true),
    ] {
        if let Some((_, props)) = pool.iter().find(|(key, _)| key == basename) {
            return Ok((basename.to_string(), legacy, descriptor_about(props)?));
        }
    }
    let candidates: Vec<&(String, Map<String, Value>)> = pool
        .iter()
        .filter(|(_, props)| {
            props.contains_key("about")
                && norm_ids(props.get("conformsTo"))
                    .iter()
                    .any(|p| p.starts_with("https://w3id.org/ro/crate"))
        })
        .collect();
    match candidates.as_slice() {
        [(id, props)] => {
            let legacy = id.ends_with(vocab::LEGACY_METADATA_BASENAME);
            Ok((id.clone(), legacy, descriptor_about(props)?))
        }
        [] => Err(RoCrateError::InvalidCrate(
            "no metadata descriptor found".to_string(),
        )),
        _ => Err(RoCrateError::InvalidCrate(
            "multiple metadata descriptors found".to_string(),
        )),
    }
}

fn descriptor_about(props: &Map<String, Value>) -> Result<String, RoCrateError> {
    norm_ids(props.get("about")).into_iter().next().ok_or_else(|| {
        RoCrateError::InvalidCrate(
            "metadata descriptor does not reference the root entity".to_string(),
        )
    })
}

/// Rebuild the graph from a parsed metadata document
pub(crate) fn populate(
    cr: &mut RoCrate,
    document: &Value,
    source_dir: Option<&Path>,
    gen_preview: bool,
) -> Result<(), RoCrateError> {
    let mut pool = collect_pool(document)?;
    let (metadata_id, legacy, root_id) = find_root_entity(&pool)?;

    let mut root_props = take(&mut pool, &root_id).ok_or_else(|| {
        RoCrateError::InvalidCrate(format!("root entity '{root_id}' not in @graph"))
    })?;
    root_props.shift_remove("@id");
    // hasPart is rebuilt entry by entry as data entities register
    let parts = list_values(root_props.shift_remove("hasPart"));
    cr.add(Entity::root_dataset_with_id(&root_id, Some(root_props))?);

    let mut metadata_props = take(&mut pool, &metadata_id).ok_or_else(|| {
        RoCrateError::InvalidCrate("metadata descriptor not in @graph".to_string())
    })?;
    metadata_props.shift_remove("@id");
    cr.add(Entity::metadata_descriptor(
        legacy,
        Some(&metadata_id),
        Some(metadata_props),
    )?);

    if let Some(mut preview_props) = take(&mut pool, vocab::PREVIEW_BASENAME) {
        if !gen_preview {
            preview_props.shift_remove("@id");
            let source = source_dir.map(|dir| dir.join(vocab::PREVIEW_BASENAME));
            cr.add(Entity::preview(source, Some(preview_props))?);
        }
    }

    add_parts(cr, &parts, &mut pool, source_dir)?;
    read_contextual(cr, pool)?;
    Ok(())
}

fn list_values(value: Option<Value>) -> Vec<Value> {
    match value {
        None => vec![],
        Some(Value::Array(items)) => items,
        Some(scalar) => vec![scalar],
    }
}

/// Depth-first walk of `hasPart`, claiming data entities from the pool
fn add_parts(
    cr: &mut RoCrate,
    parts: &[Value],
    pool: &mut Pool,
    source_dir: Option<&Path>,
) -> Result<(), RoCrateError> {
    for part in parts {
        let id = part
            .get("@id")
            .and_then(Value::as_str)
            .ok_or_else(|| RoCrateError::InvalidReference(format!("no @id in {part}")))?;
        let Some(mut props) = take(pool, id) else {
            // referenced but not described: tolerated
            continue;
        };
        props.shift_remove("@id");
        let kind = pick_kind(&type_names(&props), DATA_TYPE_TABLE, EntityKind::Data);
        let nested = list_values(props.get("hasPart").cloned());
        let entity = if kind == EntityKind::Data {
            Entity::data(id, Some(props))?
        } else if is_url(id) {
            Entity::load_data(kind, Some(id), None, props)?
        } else {
            let source = source_dir
                .map(|dir| dir.join(id))
                .unwrap_or_else(|| PathBuf::from(id));
            Entity::load_data(kind, Some(&source.to_string_lossy()), Some(id), props)?
        };
        cr.add(entity);
        add_parts(cr, &nested, pool, source_dir)?;
    }
    Ok(())
}

/// Everything the part walk did not claim becomes contextual
fn read_contextual(cr: &mut RoCrate, pool: Pool) -> Result<(), RoCrateError> {
    for (id, mut props) in pool {
        let types: Vec<String> = type_names(&props)
            .into_iter()
            .map(str::to_string)
            .collect();
        if types.iter().any(|t| t == "File" || t == "Dataset") {
            tracing::warn!(
                "{id} looks like a data entity but it's not listed in the root dataset's hasPart"
            );
        }
        props.shift_remove("@id");
        let type_refs: Vec<&str> = types.iter().map(String::as_str).collect();
        let kind = pick_kind(&type_refs, CONTEXTUAL_TYPE_TABLE, EntityKind::Contextual);
        cr.add(Entity::load_contextual(kind, &id, props)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write as _;

    fn sample_document() -> Value {
        json!({
            "@context": "https://w3id.org/ro/crate/1.1/context",
            "@graph": [
                {
                    "@id": "ro-crate-metadata.json",
                    "@type": "CreativeWork",
                    "conformsTo": {"@id": "https://w3id.org/ro/crate/1.1"},
                    "about": {"@id": "./"}
                },
                {
                    "@id": "./",
                    "@type": "Dataset",
                    "name": "Sample",
                    "hasPart": [
                        {"@id": "data.csv"},
                        {"@id": "inputs/"},
                        {"@id": "missing.txt"}
                    ]
                },
                {
                    "@id": "data.csv",
                    "@type": "File",
                    "author": {"@id": "#alice"}
                },
                {
                    "@id": "inputs/",
                    "@type": "Dataset",
                    "hasPart": [{"@id": "inputs/raw.txt"}]
                },
                {
                    "@id": "inputs/raw.txt",
                    "@type": "File"
                },
                {
                    "@id": "#alice",
                    "@type": "Person",
                    "name": "Alice"
                },
                {
                    "@id": "#activity",
                    "@type": "CreateAction",
                    "instrument": {"@id": "data.csv"}
                }
            ]
        })
    }

    #[test]
    fn test_from_document() {
        let cr = RoCrate::from_document(&sample_document()).unwrap();
        assert_eq!(cr.root_dataset().id(), "./");
        assert_eq!(cr.root_dataset().get_str("name"), Some("Sample"));
        assert_eq!(cr.metadata().kind(), EntityKind::Metadata);

        let file = cr.get("data.csv").unwrap();
        assert_eq!(file.kind(), EntityKind::File);
        let dataset = cr.get("inputs/").unwrap();
        assert_eq!(dataset.kind(), EntityKind::Dataset);
        let nested = cr.get("inputs/raw.txt").unwrap();
        assert_eq!(nested.kind(), EntityKind::File);

        let alice = cr.get("#alice").unwrap();
        assert_eq!(alice.kind(), EntityKind::Person);
        let action = cr.get("#activity").unwrap();
        assert_eq!(action.kind(), EntityKind::Contextual);

        // data entities re-registered under the root's hasPart
        let parts = norm_ids(cr.root_dataset().get("hasPart"));
        assert_eq!(parts, vec!["data.csv", "inputs/", "inputs/raw.txt"]);
        assert_eq!(cr.data_entities().count(), 3);
        assert_eq!(cr.contextual_entities().count(), 2);
    }

    #[test]
    fn test_duplicate_id_last_wins() {
        let document = json!({
            "@context": "https://w3id.org/ro/crate/1.1/context",
            "@graph": [
                {
                    "@id": "ro-crate-metadata.json",
                    "@type": "CreativeWork",
                    "about": {"@id": "./"}
                },
                {"@id": "./", "@type": "Dataset"},
                {"@id": "#alice", "@type": "Person", "name": "first"},
                {"@id": "#alice", "@type": "Person", "name": "second"}
            ]
        });
        let cr = RoCrate::from_document(&document).unwrap();
        assert_eq!(cr.get("#alice").unwrap().get_str("name"), Some("second"));
        assert_eq!(cr.contextual_entities().count(), 1);
    }

    #[test]
    fn test_missing_descriptor_fails() {
        let document = json!({
            "@context": "https://w3id.org/ro/crate/1.1/context",
            "@graph": [
                {"@id": "./", "@type": "Dataset"}
            ]
        });
        let err = RoCrate::from_document(&document).unwrap_err();
        assert!(matches!(err, RoCrateError::InvalidCrate(_)));
    }

    #[test]
    fn test_missing_root_fails() {
        let document = json!({
            "@context": "https://w3id.org/ro/crate/1.1/context",
            "@graph": [
                {
                    "@id": "ro-crate-metadata.json",
                    "@type": "CreativeWork",
                    "about": {"@id": "./"}
                }
            ]
        });
        let err = RoCrate::from_document(&document).unwrap_err();
        assert!(matches!(err, RoCrateError::InvalidCrate(_)));
    }

    #[test]
    fn test_descriptor_found_by_conforms_to() {
        let document = json!({
            "@context": "https://w3id.org/ro/crate/1.1/context",
            "@graph": [
                {
                    "@id": "renamed-ro-crate-metadata.json",
                    "@type": "CreativeWork",
                    "conformsTo": {"@id": "https://w3id.org/ro/crate/1.1"},
                    "about": {"@id": "./"}
                },
                {"@id": "./", "@type": "Dataset"}
            ]
        });
        let cr = RoCrate::from_document(&document).unwrap();
        assert_eq!(cr.metadata().id(), "renamed-ro-crate-metadata.json");
    }

    #[test]
    fn test_open_directory_and_legacy_name() {
        let dir = tempfile::tempdir().unwrap();
        let document = sample_document();
        std::fs::write(
            dir.path().join(vocab::LEGACY_METADATA_BASENAME),
            serde_json::to_string(&document).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("data.csv"), b"a,b\n").unwrap();
        let cr = RoCrate::open(dir.path()).unwrap();
        // descriptor keeps the current-profile kind: the file content,
        // not its name, declared conformance
        assert_eq!(cr.source().unwrap(), dir.path());
        assert!(cr.get("data.csv").is_some());
    }

    #[test]
    fn test_open_missing_path_fails() {
        let err = RoCrate::open("/no/such/place").unwrap_err();
        assert!(matches!(err, RoCrateError::NotFound(_)));
    }

    #[test]
    fn test_open_dir_without_metadata_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = RoCrate::open(dir.path()).unwrap_err();
        assert!(matches!(err, RoCrateError::InvalidCrate(_)));
    }

    #[test]
    fn test_open_zip() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("crate.zip");
        let file = std::fs::File::create(&zip_path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file(vocab::METADATA_BASENAME, options).unwrap();
        zip.write_all(
            serde_json::to_string(&sample_document())
                .unwrap()
                .as_bytes(),
        )
        .unwrap();
        zip.start_file("data.csv", options).unwrap();
        zip.write_all(b"a,b\n1,2\n").unwrap();
        zip.finish().unwrap();

        let cr = RoCrate::open(&zip_path).unwrap();
        assert_eq!(cr.root_dataset().get_str("name"), Some("Sample"));
        // the extracted copy backs the file entity
        let extracted = cr.source().unwrap().join("data.csv");
        assert_eq!(std::fs::read(extracted).unwrap(), b"a,b\n1,2\n");
    }

    #[test]
    fn test_init_from_tree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("inputs")).unwrap();
        std::fs::write(dir.path().join("inputs/raw.txt"), b"raw").unwrap();
        std::fs::write(dir.path().join("top.txt"), b"top").unwrap();
        let cr = RoCrate::init_from_tree(dir.path(), &CrateOptions::default()).unwrap();
        assert!(cr.get("top.txt").is_some());
        assert!(cr.get("inputs/").is_some());
        assert!(cr.get("inputs/raw.txt").is_some());
        assert_eq!(cr.data_entities().count(), 3);
    }

    #[test]
    fn test_init_from_tree_exclude() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/config"), b"x").unwrap();
        std::fs::write(dir.path().join("kept.txt"), b"y").unwrap();
        let options = CrateOptions {
            exclude: vec![".git".to_string()],
            ..Default::default()
        };
        let cr = RoCrate::init_from_tree(dir.path(), &options).unwrap();
        assert!(cr.get("kept.txt").is_some());
        assert!(cr.get(".git/").is_none());
        assert!(cr.get(".git/config").is_none());
    }
}
