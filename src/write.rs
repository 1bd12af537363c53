//! Materialization of RO-Crates
//!
//! Three renditions of the same graph: the flattened JSON-LD metadata
//! document, a plain directory tree, and a deflate-compressed zip
//! archive (written to a path or drained as a lazy chunked byte
//! stream). Directory and zip writes first cover the tracked data
//! entities, then sweep the original source tree for real files no
//! entity claims, so unannotated payload survives a round trip.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use walkdir::{DirEntry, WalkDir};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::entity::{as_items, iso_now, Entity, EntityKind, EntitySource};
use crate::error::RoCrateError;
use crate::id::is_url;
use crate::rocrate::RoCrate;
use crate::vocab;

const STREAM_CHUNK: usize = 8192;

/// Walk a tree, skipping excluded names (and everything under them)
pub(crate) fn walk_tree(
    top: &Path,
    exclude: &[String],
) -> impl Iterator<Item = walkdir::Result<DirEntry>> {
    let exclude: Vec<String> = exclude.to_vec();
    WalkDir::new(top)
        .min_depth(1)
        .into_iter()
        .filter_entry(move |entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| !exclude.iter().any(|skip| skip == name))
                .unwrap_or(true)
        })
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// The crate's flattened JSON-LD document
///
/// The context starts from the profile context URL and grows with any
/// extra context URLs and extra terms; the graph lists the descriptor,
/// the root dataset, the preview if present, then every other entity
/// in registration order.
pub fn metadata_document(cr: &RoCrate) -> Value {
    let profile = match cr.metadata.kind() {
        EntityKind::LegacyMetadata => vocab::LEGACY_PROFILE,
        _ => vocab::PROFILE,
    };
    let mut context: Vec<Value> = vec![json!(format!("{profile}/context"))];
    context.extend(cr.extra_contexts.iter().map(|url| json!(url)));
    if !cr.extra_terms.is_empty() {
        context.push(Value::Object(cr.extra_terms.clone()));
    }
    let context = if context.len() == 1 {
        context.remove(0)
    } else {
        Value::Array(context)
    };
    let graph: Vec<Value> = cr
        .entities()
        .map(|entity| Value::Object(entity.properties().clone()))
        .collect();
    json!({"@context": context, "@graph": graph})
}

/// Minimal generated preview page listing the crate's entities
fn preview_html(cr: &RoCrate) -> String {
    let name = escape(cr.name().unwrap_or("RO-Crate"));
    let mut rows = String::new();
    for entity in cr.entities() {
        let types = entity.types().join(", ");
        rows.push_str(&format!(
            "      <tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape(entity.id()),
            escape(&types),
            escape(entity.get_str("name").unwrap_or(""))
        ));
    }
    let description = cr
        .description()
        .map(|d| format!("    <p>{}</p>\n", escape(d)))
        .unwrap_or_default();
    format!(
        "<!DOCTYPE html>\n<html>\n  <head>\n    <meta charset=\"utf-8\"/>\n    \
         <title>{name}</title>\n  </head>\n  <body>\n    <h1>{name}</h1>\n{description}    \
         <table>\n      <tr><th>@id</th><th>@type</th><th>name</th></tr>\n{rows}    \
         </table>\n  </body>\n</html>\n"
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Materialize the crate into a directory
pub(crate) fn write(cr: &mut RoCrate, base: &Path) -> Result<(), RoCrateError> {
    fs::create_dir_all(base)?;
    if let Some(top) = cr.source.clone() {
        copy_unlisted(&*cr, &top, base)?;
    }
    for key in cr.entities.keys_vec() {
        let Some(mut entity) = cr.entities.take_entity(&key) else {
            continue;
        };
        let result = write_entity(&*cr, &mut entity, base);
        cr.entities.put_back(key, entity);
        result?;
    }
    write_preview(cr, base)?;
    // the document is generated last so write-time stamps are included
    let document = metadata_document(cr);
    fs::write(
        base.join(cr.metadata.id()),
        serde_json::to_string_pretty(&document)?,
    )?;
    Ok(())
}

/// Copy files under `top` that no tracked entity claims
fn copy_unlisted(cr: &RoCrate, top: &Path, base: &Path) -> Result<(), RoCrateError> {
    for entry in walk_tree(top, &cr.exclude) {
        let entry = entry.map_err(std::io::Error::from)?;
        let Ok(rel) = entry.path().strip_prefix(top) else {
            continue;
        };
        let dest = base.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else {
            let rel_str = rel.to_string_lossy();
            if cr.get(&rel_str).is_none() {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                if !same_file(entry.path(), &dest) {
                    fs::copy(entry.path(), &dest)?;
                }
            }
        }
    }
    Ok(())
}

fn write_entity(cr: &RoCrate, entity: &mut Entity, base: &Path) -> Result<(), RoCrateError> {
    match entity.kind() {
        kind if kind.is_dir_like() => write_dataset(cr, entity, base),
        EntityKind::File
        | EntityKind::Workflow
        | EntityKind::WorkflowDescription
        | EntityKind::TestDefinition => write_file(entity, base),
        // entities without bytes of their own
        _ => Ok(()),
    }
}

fn write_file(entity: &mut Entity, base: &Path) -> Result<(), RoCrateError> {
    let out_path = base.join(entity.id());
    let options = entity.data_options();
    match entity.source().cloned() {
        Some(EntitySource::Remote(url)) => {
            if options.fetch_remote || options.validate_url {
                let mut response = reqwest::blocking::get(&url)?.error_for_status()?;
                if options.validate_url {
                    entity.insert_raw("sdDatePublished", json!(iso_now()));
                }
                if options.fetch_remote {
                    if let Some(parent) = out_path.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    let mut out = File::create(&out_path)?;
                    let written = response.copy_to(&mut out)?;
                    if options.record_size {
                        entity.insert_raw("contentSize", json!(written.to_string()));
                    }
                }
            }
            Ok(())
        }
        Some(EntitySource::Local(source)) => {
            if !source.exists() {
                return Err(RoCrateError::NotFound(source));
            }
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            if !same_file(&source, &out_path) {
                fs::copy(&source, &out_path)?;
            }
            if options.record_size {
                let size = fs::metadata(&out_path)?.len();
                entity.insert_raw("contentSize", json!(size.to_string()));
            }
            Ok(())
        }
        None => Ok(()),
    }
}

fn write_dataset(cr: &RoCrate, entity: &mut Entity, base: &Path) -> Result<(), RoCrateError> {
    let options = entity.data_options();
    match entity.source().cloned() {
        Some(EntitySource::Remote(url)) => {
            if options.validate_url && !options.fetch_remote {
                reqwest::blocking::get(&url)?.error_for_status()?;
                entity.insert_raw("sdDatePublished", json!(iso_now()));
            }
            if options.fetch_remote {
                for (rel, part_url) in remote_parts(entity, &url)? {
                    let out_path = base.join(&rel);
                    if let Some(parent) = out_path.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    let mut response =
                        reqwest::blocking::get(&part_url)?.error_for_status()?;
                    let mut out = File::create(&out_path)?;
                    response.copy_to(&mut out)?;
                }
            }
            Ok(())
        }
        Some(EntitySource::Local(source)) => {
            let out_path = base.join(entity.id());
            if !source.exists() {
                return Err(RoCrateError::NotFound(source));
            }
            fs::create_dir_all(&out_path)?;
            if cr.source.is_none() {
                copy_unlisted(cr, &source, &out_path)?;
            }
            Ok(())
        }
        None => {
            fs::create_dir_all(base.join(entity.id()))?;
            Ok(())
        }
    }
}

/// Resolve a remote dataset's `hasPart` entries into (relative output
/// path, part URL) pairs
///
/// Entries without `@id` are skipped with a warning; a part that is
/// not a strict relative path is an error.
fn remote_parts(entity: &Entity, base_url: &str) -> Result<Vec<(String, String)>, RoCrateError> {
    let base = base_url.trim_end_matches('/');
    let mut parts = Vec::new();
    let Some(value) = entity.get("hasPart") else {
        return Ok(parts);
    };
    for item in as_items(value) {
        let Some(part) = item.get("@id").and_then(Value::as_str) else {
            tracing::warn!("'hasPart' entry in {} is missing '@id', skipping", entity.id());
            continue;
        };
        if is_url(part) || part.starts_with('/') {
            return Err(RoCrateError::InvalidPartReference {
                base: base_url.to_string(),
                part: part.to_string(),
            });
        }
        parts.push((format!("{}{}", entity.id(), part), format!("{base}/{part}")));
    }
    Ok(parts)
}

fn write_preview(cr: &RoCrate, base: &Path) -> Result<(), RoCrateError> {
    let Some(preview) = &cr.preview else {
        return Ok(());
    };
    let out_path = base.join(preview.id());
    match preview.source() {
        Some(EntitySource::Local(source)) if source.exists() => {
            if !same_file(source, &out_path) {
                fs::copy(source, &out_path)?;
            }
        }
        _ => fs::write(&out_path, preview_html(cr))?,
    }
    Ok(())
}

/// Lazy sequence of (relative path, chunk) pairs for one data entity
///
/// Chunks of one output file are emitted contiguously before the next
/// file begins. Open handles are released on drop, whether or not the
/// sequence was drained.
pub(crate) struct EntityStream {
    state: StreamState,
    chunk_size: usize,
}

enum StreamState {
    Empty,
    File {
        path: String,
        reader: File,
    },
    Folder {
        files: std::vec::IntoIter<(String, PathBuf)>,
        current: Option<(String, File)>,
    },
    Remote {
        path: String,
        response: reqwest::blocking::Response,
    },
    RemoteFolder {
        parts: std::vec::IntoIter<(String, String)>,
        current: Option<(String, reqwest::blocking::Response)>,
    },
}

enum Step {
    Item((String, Vec<u8>)),
    Error(RoCrateError),
    Advance,
    End,
}

pub(crate) fn entity_stream(
    entity: &Entity,
    crate_has_source: bool,
    chunk_size: usize,
) -> Result<EntityStream, RoCrateError> {
    let options = entity.data_options();
    let state = match (entity.kind().is_dir_like(), entity.source()) {
        (_, None) => StreamState::Empty,
        (false, Some(EntitySource::Local(path))) => {
            if !path.exists() {
                return Err(RoCrateError::NotFound(path.clone()));
            }
            StreamState::File {
                path: entity.id().to_string(),
                reader: File::open(path)?,
            }
        }
        (false, Some(EntitySource::Remote(url))) => {
            if options.fetch_remote {
                StreamState::Remote {
                    path: entity.id().to_string(),
                    response: reqwest::blocking::get(url)?.error_for_status()?,
                }
            } else {
                StreamState::Empty
            }
        }
        (true, Some(EntitySource::Local(dir))) => {
            if !dir.exists() {
                return Err(RoCrateError::NotFound(dir.clone()));
            }
            if crate_has_source {
                // loaded crates cover directory payloads via the
                // unlisted-file sweep
                StreamState::Empty
            } else {
                let mut files = Vec::new();
                for entry in WalkDir::new(dir).min_depth(1) {
                    let entry = entry.map_err(std::io::Error::from)?;
                    if entry.file_type().is_file() {
                        let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
                        let name = Path::new(entity.id())
                            .join(rel)
                            .to_string_lossy()
                            .into_owned();
                        files.push((name, entry.path().to_path_buf()));
                    }
                }
                StreamState::Folder {
                    files: files.into_iter(),
                    current: None,
                }
            }
        }
        (true, Some(EntitySource::Remote(url))) => {
            if options.fetch_remote {
                StreamState::RemoteFolder {
                    parts: remote_parts(entity, url)?.into_iter(),
                    current: None,
                }
            } else {
                StreamState::Empty
            }
        }
    };
    Ok(EntityStream { state, chunk_size })
}

fn read_chunk<R: Read>(reader: &mut R, chunk_size: usize) -> std::io::Result<Option<Vec<u8>>> {
    let mut buf = vec![0u8; chunk_size];
    let n = reader.read(&mut buf)?;
    if n == 0 {
        Ok(None)
    } else {
        buf.truncate(n);
        Ok(Some(buf))
    }
}

impl Iterator for EntityStream {
    type Item = Result<(String, Vec<u8>), RoCrateError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let chunk_size = self.chunk_size;
            let step = match &mut self.state {
                StreamState::Empty => Step::End,
                StreamState::File { path, reader } => match read_chunk(reader, chunk_size) {
                    Ok(Some(chunk)) => Step::Item((path.clone(), chunk)),
                    Ok(None) => Step::End,
                    Err(e) => Step::Error(e.into()),
                },
                StreamState::Remote { path, response } => {
                    match read_chunk(response, chunk_size) {
                        Ok(Some(chunk)) => Step::Item((path.clone(), chunk)),
                        Ok(None) => Step::End,
                        Err(e) => Step::Error(e.into()),
                    }
                }
                StreamState::Folder { files, current } => {
                    if let Some((path, reader)) = current {
                        match read_chunk(reader, chunk_size) {
                            Ok(Some(chunk)) => Step::Item((path.clone(), chunk)),
                            Ok(None) => {
                                *current = None;
                                Step::Advance
                            }
                            Err(e) => Step::Error(e.into()),
                        }
                    } else {
                        match files.next() {
                            Some((path, fs_path)) => match File::open(&fs_path) {
                                Ok(reader) => {
                                    *current = Some((path, reader));
                                    Step::Advance
                                }
                                Err(e) => Step::Error(e.into()),
                            },
                            None => Step::End,
                        }
                    }
                }
                StreamState::RemoteFolder { parts, current } => {
                    if let Some((path, response)) = current {
                        match read_chunk(response, chunk_size) {
                            Ok(Some(chunk)) => Step::Item((path.clone(), chunk)),
                            Ok(None) => {
                                *current = None;
                                Step::Advance
                            }
                            Err(e) => Step::Error(e.into()),
                        }
                    } else {
                        match parts.next() {
                            Some((path, url)) => {
                                match reqwest::blocking::get(&url)
                                    .and_then(|r| r.error_for_status())
                                {
                                    Ok(response) => {
                                        *current = Some((path, response));
                                        Step::Advance
                                    }
                                    Err(e) => Step::Error(e.into()),
                                }
                            }
                            None => Step::End,
                        }
                    }
                }
            };
            match step {
                Step::Item(item) => return Some(Ok(item)),
                Step::Advance => continue,
                Step::End => {
                    self.state = StreamState::Empty;
                    return None;
                }
                Step::Error(e) => {
                    self.state = StreamState::Empty;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Stream one data entity's bytes as (path, chunk) pairs
pub fn stream_entity(
    cr: &RoCrate,
    entity: &Entity,
    chunk_size: usize,
) -> Result<impl Iterator<Item = Result<(String, Vec<u8>), RoCrateError>>, RoCrateError> {
    entity_stream(entity, cr.source.is_some(), chunk_size)
}

/// Lazy chunked reader over a finished zip archive
pub struct ZipStream {
    spool: File,
    chunk_size: usize,
}

impl Iterator for ZipStream {
    type Item = std::io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut buf = vec![0u8; self.chunk_size];
        match self.spool.read(&mut buf) {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some(Ok(buf))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Materialize the crate as a zip archive at the given path
pub(crate) fn write_zip(cr: &mut RoCrate, out_path: &Path) -> Result<PathBuf, RoCrateError> {
    let file = File::create(out_path)?;
    build_zip(cr, file, Some(out_path))?;
    Ok(out_path.to_path_buf())
}

/// Build the zip into an anonymous spool file and return a chunked
/// reader over it
///
/// The archive writer needs a seekable sink, so the bytes go through
/// the spool rather than memory; the crate contents are never held in
/// memory at once.
pub(crate) fn stream_zip(cr: &mut RoCrate, chunk_size: usize) -> Result<ZipStream, RoCrateError> {
    let spool = tempfile::tempfile()?;
    let mut spool = build_zip(cr, spool, None)?;
    spool.seek(SeekFrom::Start(0))?;
    Ok(ZipStream { spool, chunk_size })
}

fn build_zip<W: Write + Seek>(
    cr: &mut RoCrate,
    sink: W,
    exclude_path: Option<&Path>,
) -> Result<W, RoCrateError> {
    // validating requests stamp entities before the document is built
    for key in cr.entities.keys_vec() {
        if let Some(entity) = cr.entities.get_mut(&key) {
            validate_remote(entity)?;
        }
    }
    let cr = &*cr;

    let mut zip = ZipWriter::new(sink);
    let file_options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);
    let mut names: HashSet<String> = HashSet::new();

    for entity in cr.entities.iter().filter(|e| e.is_data()) {
        let mut current: Option<String> = None;
        for item in entity_stream(entity, cr.source.is_some(), STREAM_CHUNK)? {
            let (path, chunk) = item?;
            if current.as_deref() != Some(path.as_str()) {
                zip.start_file(path.clone(), file_options)?;
                names.insert(path.clone());
                current = Some(path);
            }
            zip.write_all(&chunk)?;
        }
    }

    if let Some(preview) = &cr.preview {
        let path = preview.id().to_string();
        zip.start_file(path.clone(), file_options)?;
        names.insert(path);
        match preview.source() {
            Some(EntitySource::Local(source)) if source.exists() => {
                copy_into_zip(&mut zip, source)?;
            }
            _ => zip.write_all(preview_html(cr).as_bytes())?,
        }
    }

    let document = metadata_document(cr);
    zip.start_file(cr.metadata.id().to_string(), file_options)?;
    names.insert(cr.metadata.id().to_string());
    zip.write_all(serde_json::to_string_pretty(&document)?.as_bytes())?;

    // real files under the source tree that nothing claims, minus the
    // output archive itself
    if let Some(top) = &cr.source {
        for entry in walk_tree(top, &cr.exclude) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(out) = exclude_path {
                if same_file(entry.path(), out) {
                    continue;
                }
            }
            let Ok(rel) = entry.path().strip_prefix(top) else {
                continue;
            };
            let rel_str = rel.to_string_lossy().into_owned();
            if cr.get(&rel_str).is_some() || names.contains(&rel_str) {
                continue;
            }
            zip.start_file(rel_str.clone(), file_options)?;
            names.insert(rel_str);
            copy_into_zip(&mut zip, entry.path())?;
        }
    }

    Ok(zip.finish()?)
}

fn copy_into_zip<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    source: &Path,
) -> Result<(), RoCrateError> {
    let mut reader = File::open(source)?;
    while let Some(chunk) = read_chunk(&mut reader, STREAM_CHUNK)? {
        zip.write_all(&chunk)?;
    }
    Ok(())
}

/// Issue the validating request for URL entities that only record a
/// timestamp (no content fetch)
fn validate_remote(entity: &mut Entity) -> Result<(), RoCrateError> {
    if !entity.is_data() {
        return Ok(());
    }
    let options = entity.data_options();
    if !options.validate_url || options.fetch_remote {
        return Ok(());
    }
    let Some(EntitySource::Remote(url)) = entity.source().cloned() else {
        return Ok(());
    };
    reqwest::blocking::get(&url)?.error_for_status()?;
    entity.insert_raw("sdDatePublished", json!(iso_now()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::DataOptions;
    use crate::rocrate::CrateOptions;
    use serde_json::Map;

    fn entity_index(document: &Value) -> Map<String, Value> {
        let mut index = Map::new();
        for member in document["@graph"].as_array().unwrap() {
            let id = member["@id"].as_str().unwrap().to_string();
            index.insert(id, member.clone());
        }
        index
    }

    #[test]
    fn test_metadata_document_minimal() {
        let cr = RoCrate::new();
        let document = cr.metadata_document();
        assert_eq!(
            document["@context"],
            json!("https://w3id.org/ro/crate/1.1/context")
        );
        let index = entity_index(&document);
        assert_eq!(index.len(), 2);
        assert_eq!(index["./"]["@type"], json!("Dataset"));
        assert_eq!(
            index["ro-crate-metadata.json"]["about"],
            json!({"@id": "./"})
        );
    }

    #[test]
    fn test_metadata_document_extra_terms_extend_context() {
        let mut cr = RoCrate::new();
        cr.add_test_suite(Some("#suite"), None, None, None).unwrap();
        let document = cr.metadata_document();
        let context = document["@context"].as_array().unwrap();
        assert_eq!(context[0], json!("https://w3id.org/ro/crate/1.1/context"));
        assert!(context[1]["TestSuite"].is_string());
    }

    #[test]
    fn test_write_minimal_crate() {
        let mut cr = RoCrate::new();
        let out = tempfile::tempdir().unwrap();
        cr.write(out.path()).unwrap();
        let entries: Vec<String> = fs::read_dir(out.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["ro-crate-metadata.json"]);
        let document: Value = serde_json::from_str(
            &fs::read_to_string(out.path().join("ro-crate-metadata.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(entity_index(&document).len(), 2);
    }

    #[test]
    fn test_write_copies_files_and_round_trips() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("data.csv"), b"a,b\n1,2\n").unwrap();

        let mut cr = RoCrate::new();
        cr.add_file(
            Some(src.path().join("data.csv").to_str().unwrap()),
            None,
            DataOptions::default(),
            None,
        )
        .unwrap();
        cr.add(Entity::person("#alice", None).unwrap());
        if let Some(file) = cr.get_mut("data.csv") {
            file.set("author", json!({"@id": "#alice"})).unwrap();
        }
        cr.set_name("round trip");

        let out = tempfile::tempdir().unwrap();
        cr.write(out.path()).unwrap();
        assert_eq!(
            fs::read(out.path().join("data.csv")).unwrap(),
            b"a,b\n1,2\n"
        );

        let reopened = RoCrate::open(out.path()).unwrap();
        let original = entity_index(&cr.metadata_document());
        let reloaded = entity_index(&reopened.metadata_document());
        assert_eq!(original, reloaded);
    }

    #[test]
    fn test_write_missing_source_fails() {
        let mut cr = RoCrate::new();
        cr.add_file(
            Some("/no/such/file.txt"),
            None,
            DataOptions::default(),
            None,
        )
        .unwrap();
        let out = tempfile::tempdir().unwrap();
        let err = cr.write(out.path()).unwrap_err();
        assert!(matches!(err, RoCrateError::NotFound(_)));
    }

    #[test]
    fn test_write_preserves_unlisted_files() {
        let src = tempfile::tempdir().unwrap();
        let document = json!({
            "@context": "https://w3id.org/ro/crate/1.1/context",
            "@graph": [
                {
                    "@id": "ro-crate-metadata.json",
                    "@type": "CreativeWork",
                    "about": {"@id": "./"}
                },
                {"@id": "./", "@type": "Dataset"}
            ]
        });
        fs::write(
            src.path().join("ro-crate-metadata.json"),
            serde_json::to_string(&document).unwrap(),
        )
        .unwrap();
        fs::write(src.path().join("stray.txt"), b"untracked").unwrap();

        let mut cr = RoCrate::open(src.path()).unwrap();
        let out = tempfile::tempdir().unwrap();
        cr.write(out.path()).unwrap();
        assert_eq!(fs::read(out.path().join("stray.txt")).unwrap(), b"untracked");
    }

    #[test]
    fn test_stream_covers_every_byte() {
        let src = tempfile::tempdir().unwrap();
        let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(src.path().join("blob.bin"), &payload).unwrap();

        let mut cr = RoCrate::new();
        cr.add_file(
            Some(src.path().join("blob.bin").to_str().unwrap()),
            None,
            DataOptions::default(),
            None,
        )
        .unwrap();
        let entity = cr.get("blob.bin").unwrap();
        let chunks: Vec<(String, Vec<u8>)> = stream_entity(&cr, entity, 4096)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        let total: usize = chunks.iter().map(|(_, c)| c.len()).sum();
        assert_eq!(total, payload.len());
        let joined: Vec<u8> = chunks.iter().flat_map(|(_, c)| c.clone()).collect();
        assert_eq!(joined, payload);
        assert!(chunks.iter().all(|(path, _)| path == "blob.bin"));
    }

    #[test]
    fn test_folder_stream_groups_files() {
        let src = tempfile::tempdir().unwrap();
        fs::create_dir(src.path().join("sub")).unwrap();
        fs::write(src.path().join("one.txt"), vec![b'x'; 10000]).unwrap();
        fs::write(src.path().join("sub/two.txt"), b"hello").unwrap();

        let mut cr = RoCrate::new();
        cr.add_dataset(
            Some(src.path().to_str().unwrap()),
            Some("payload"),
            DataOptions::default(),
            None,
        )
        .unwrap();
        let entity = cr.get("payload/").unwrap();
        let chunks: Vec<(String, Vec<u8>)> = stream_entity(&cr, entity, 4096)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        // each member's chunks are contiguous
        let mut seen: Vec<&str> = Vec::new();
        for (path, _) in &chunks {
            if seen.last() != Some(&path.as_str()) {
                assert!(!seen.contains(&path.as_str()));
                seen.push(path);
            }
        }
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|p| p.starts_with("payload/")));
    }

    #[test]
    fn test_write_zip_and_reopen() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("data.csv"), b"a,b\n").unwrap();

        let mut cr = RoCrate::new();
        cr.add_file(
            Some(src.path().join("data.csv").to_str().unwrap()),
            None,
            DataOptions::default(),
            None,
        )
        .unwrap();
        cr.set_name("zipped");

        let out = tempfile::tempdir().unwrap();
        let zip_path = out.path().join("crate.zip");
        cr.write_zip(&zip_path).unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let names: HashSet<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.contains("data.csv"));
        assert!(names.contains("ro-crate-metadata.json"));

        let reopened = RoCrate::open(&zip_path).unwrap();
        assert_eq!(reopened.name(), Some("zipped"));
        assert!(reopened.get("data.csv").is_some());
    }

    #[test]
    fn test_zip_excludes_itself() {
        let src = tempfile::tempdir().unwrap();
        let document = json!({
            "@context": "https://w3id.org/ro/crate/1.1/context",
            "@graph": [
                {
                    "@id": "ro-crate-metadata.json",
                    "@type": "CreativeWork",
                    "about": {"@id": "./"}
                },
                {"@id": "./", "@type": "Dataset"}
            ]
        });
        fs::write(
            src.path().join("ro-crate-metadata.json"),
            serde_json::to_string(&document).unwrap(),
        )
        .unwrap();
        fs::write(src.path().join("payload.txt"), b"data").unwrap();

        let mut cr = RoCrate::open(src.path()).unwrap();
        // the archive lands inside the crate's own source tree
        let zip_path = src.path().join("out.zip");
        cr.write_zip(&zip_path).unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.contains(&"payload.txt".to_string()));
        assert!(!names.contains(&"out.zip".to_string()));
    }

    #[test]
    fn test_stream_zip_matches_write_zip() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("data.csv"), b"a,b\n1,2\n").unwrap();

        let mut cr = RoCrate::new();
        cr.add_file(
            Some(src.path().join("data.csv").to_str().unwrap()),
            None,
            DataOptions::default(),
            None,
        )
        .unwrap();

        let chunks: Vec<Vec<u8>> = cr
            .stream_zip(1024)
            .unwrap()
            .collect::<std::io::Result<_>>()
            .unwrap();
        assert!(chunks.iter().all(|c| c.len() <= 1024));
        let bytes: Vec<u8> = chunks.concat();

        let mut archive =
            zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        let mut member = archive.by_name("data.csv").unwrap();
        let mut content = Vec::new();
        member.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"a,b\n1,2\n");
        drop(member);
        assert!(archive.by_name("ro-crate-metadata.json").is_ok());
    }

    #[test]
    fn test_gen_preview_written() {
        let mut cr = RoCrate::new_with(&CrateOptions {
            gen_preview: true,
            ..Default::default()
        });
        cr.set_name("with preview");
        let out = tempfile::tempdir().unwrap();
        cr.write(out.path()).unwrap();
        let html =
            fs::read_to_string(out.path().join("ro-crate-preview.html")).unwrap();
        assert!(html.contains("with preview"));
        assert!(html.contains("ro-crate-metadata.json"));
    }
}
