//! Vocabulary definitions for RO-Crate metadata
//!
//! Profile URLs, conventional file names, the closed type-dispatch
//! tables used when loading a crate, the testing vocabulary terms, and
//! the known computer languages, test services and software
//! applications that can be attached to workflows and test suites.

use serde_json::{json, Map, Value};

use crate::entity::{Entity, EntityKind};
use crate::error::RoCrateError;

/// RO-Crate profile the current metadata descriptor conforms to
pub const PROFILE: &str = "https://w3id.org/ro/crate/1.1";

/// Profile of the legacy (pre-1.1) metadata descriptor
pub const LEGACY_PROFILE: &str = "https://w3id.org/ro/crate/1.0";

/// Workflow RO-Crate profile, stamped when a main workflow is added
pub const WORKFLOW_PROFILE: &str = "https://w3id.org/workflowhub/workflow-ro-crate/1.0";

/// Standard metadata descriptor filename
pub const METADATA_BASENAME: &str = "ro-crate-metadata.json";

/// Legacy metadata descriptor filename
pub const LEGACY_METADATA_BASENAME: &str = "ro-crate-metadata.jsonld";

/// Conventional preview page filename
pub const PREVIEW_BASENAME: &str = "ro-crate-preview.html";

const TEST_NS: &str = "https://w3id.org/ro/terms/test#";

/// Context terms added when testing entities enter the crate
pub const TESTING_EXTRA_TERMS: &[(&str, &str)] = &[
    ("TestSuite", "https://w3id.org/ro/terms/test#TestSuite"),
    ("TestInstance", "https://w3id.org/ro/terms/test#TestInstance"),
    ("TestService", "https://w3id.org/ro/terms/test#TestService"),
    ("TestDefinition", "https://w3id.org/ro/terms/test#TestDefinition"),
    ("PlanemoEngine", "https://w3id.org/ro/terms/test#PlanemoEngine"),
    ("JenkinsService", "https://w3id.org/ro/terms/test#JenkinsService"),
    ("TravisService", "https://w3id.org/ro/terms/test#TravisService"),
    ("GithubService", "https://w3id.org/ro/terms/test#GithubService"),
    ("instance", "https://w3id.org/ro/terms/test#instance"),
    ("runsOn", "https://w3id.org/ro/terms/test#runsOn"),
    ("resource", "https://w3id.org/ro/terms/test#resource"),
    ("definition", "https://w3id.org/ro/terms/test#definition"),
    ("engineVersion", "https://w3id.org/ro/terms/test#engineVersion"),
];

/// Data entity dispatch table, first matching type name wins
pub(crate) const DATA_TYPE_TABLE: &[(&str, EntityKind)] = &[
    ("File", EntityKind::File),
    ("ComputationalWorkflow", EntityKind::Workflow),
    ("Workflow", EntityKind::Workflow),
    ("TestDefinition", EntityKind::TestDefinition),
    ("Dataset", EntityKind::Dataset),
];

/// Contextual entity dispatch table
pub(crate) const CONTEXTUAL_TYPE_TABLE: &[(&str, EntityKind)] = &[
    ("ComputerLanguage", EntityKind::ComputerLanguage),
    ("TestSuite", EntityKind::TestSuite),
    ("TestInstance", EntityKind::TestInstance),
    ("TestService", EntityKind::TestService),
    ("SoftwareApplication", EntityKind::SoftwareApplication),
    ("Person", EntityKind::Person),
];

/// Pick the concrete kind for a set of declared type names
pub(crate) fn pick_kind(
    types: &[&str],
    table: &[(&str, EntityKind)],
    fallback: EntityKind,
) -> EntityKind {
    for (name, kind) in table {
        if types.iter().any(|t| t.trim() == *name) {
            return *kind;
        }
    }
    fallback
}

fn language(id: &str, properties: Value) -> Result<Entity, RoCrateError> {
    let props = properties
        .as_object()
        .cloned()
        .unwrap_or_else(Map::new);
    Entity::typed_contextual(
        EntityKind::ComputerLanguage,
        id,
        json!("ComputerLanguage"),
        Some(props),
    )
}

/// Build the ComputerLanguage entity for a known workflow language
///
/// See <https://w3id.org/workflowhub/workflow-ro-crate/1.0> for the
/// identifiers of the languages it defines.
pub fn get_language(name: &str, version: Option<&str>) -> Result<Entity, RoCrateError> {
    let mut entity = match name.to_lowercase().as_str() {
        "cwl" => {
            let identifier = match version {
                Some(v) => format!("https://w3id.org/cwl/v{}/", v.trim_start_matches('v')),
                None => "https://w3id.org/cwl/".to_string(),
            };
            language(
                "https://w3id.org/workflowhub/workflow-ro-crate#cwl",
                json!({
                    "name": "Common Workflow Language",
                    "alternateName": "CWL",
                    "identifier": {"@id": identifier},
                    "url": {"@id": "https://www.commonwl.org/"},
                }),
            )?
        }
        "galaxy" => language(
            "https://w3id.org/workflowhub/workflow-ro-crate#galaxy",
            json!({
                "name": "Galaxy",
                "identifier": {"@id": "https://galaxyproject.org/"},
                "url": {"@id": "https://galaxyproject.org/"},
            }),
        )?,
        "knime" => language(
            "https://w3id.org/workflowhub/workflow-ro-crate#knime",
            json!({
                "name": "KNIME",
                "identifier": {"@id": "https://www.knime.com/"},
                "url": {"@id": "https://www.knime.com/"},
            }),
        )?,
        "nextflow" => language(
            "https://w3id.org/workflowhub/workflow-ro-crate#nextflow",
            json!({
                "name": "Nextflow",
                "identifier": {"@id": "https://www.nextflow.io/"},
                "url": {"@id": "https://www.nextflow.io/"},
            }),
        )?,
        "snakemake" => language(
            "https://w3id.org/workflowhub/workflow-ro-crate#snakemake",
            json!({
                "name": "Snakemake",
                "identifier": {"@id": "https://doi.org/10.1093/bioinformatics/bts480"},
                "url": {"@id": "https://snakemake.readthedocs.io"},
            }),
        )?,
        "compss" => language(
            "#compss",
            json!({
                "name": "COMPSs Programming Model",
                "alternateName": "COMPSs",
                "url": "http://compss.bsc.es/",
                "citation": "https://doi.org/10.1007/s10723-013-9272-5",
            }),
        )?,
        "autosubmit" => language(
            "#autosubmit",
            json!({
                "name": "Autosubmit",
                "alternateName": "AS",
                "url": "https://autosubmit.readthedocs.io/",
                "citation": "https://doi.org/10.1109/HPCSim.2016.7568429",
            }),
        )?,
        other => {
            return Err(RoCrateError::InvalidOperation(format!(
                "unknown language: {other}"
            )))
        }
    };
    if let Some(v) = version {
        entity.set("version", v)?;
    }
    Ok(entity)
}

fn service(id_fragment: &str, properties: Value) -> Result<Entity, RoCrateError> {
    let props = properties
        .as_object()
        .cloned()
        .unwrap_or_else(Map::new);
    Entity::typed_contextual(
        EntityKind::TestService,
        &format!("{TEST_NS}{id_fragment}"),
        json!("TestService"),
        Some(props),
    )
}

/// Build the TestService entity for a known CI service
pub fn get_service(name: &str) -> Result<Entity, RoCrateError> {
    match name.to_lowercase().as_str() {
        "jenkins" => service(
            "JenkinsService",
            json!({
                "name": "Jenkins",
                "url": {"@id": "https://www.jenkins.io"},
            }),
        ),
        "travis" => service(
            "TravisService",
            json!({
                "name": "Travis CI",
                "url": {"@id": "https://www.travis-ci.com"},
            }),
        ),
        "github" => service(
            "GithubService",
            json!({
                "name": "Github Actions",
                "url": {"@id": "https://github.com"},
            }),
        ),
        other => Err(RoCrateError::InvalidOperation(format!(
            "unknown service: {other}"
        ))),
    }
}

/// Build the SoftwareApplication entity for a known test engine
pub fn get_application(name: &str) -> Result<Entity, RoCrateError> {
    match name.to_lowercase().as_str() {
        "planemo" => Entity::typed_contextual(
            EntityKind::SoftwareApplication,
            &format!("{TEST_NS}PlanemoEngine"),
            json!("SoftwareApplication"),
            json!({
                "name": "Planemo",
                "url": {"@id": "https://github.com/galaxyproject/planemo"},
            })
            .as_object()
            .cloned(),
        ),
        other => Err(RoCrateError::InvalidOperation(format!(
            "unknown application: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_kind_first_match_wins() {
        let kind = pick_kind(
            &["File", "SoftwareSourceCode", "ComputationalWorkflow"],
            DATA_TYPE_TABLE,
            EntityKind::Data,
        );
        assert_eq!(kind, EntityKind::File);

        let kind = pick_kind(&["ComputationalWorkflow"], DATA_TYPE_TABLE, EntityKind::Data);
        assert_eq!(kind, EntityKind::Workflow);

        let kind = pick_kind(&["SoftwareSourceCode"], DATA_TYPE_TABLE, EntityKind::Data);
        assert_eq!(kind, EntityKind::Data);
    }

    #[test]
    fn test_get_language_cwl_versions() {
        let lang = get_language("cwl", None).unwrap();
        assert_eq!(
            lang.id(),
            "https://w3id.org/workflowhub/workflow-ro-crate#cwl"
        );
        assert_eq!(
            lang.get("identifier"),
            Some(&json!({"@id": "https://w3id.org/cwl/"}))
        );
        assert!(!lang.contains("version"));

        let lang = get_language("cwl", Some("1.2")).unwrap();
        assert_eq!(
            lang.get("identifier"),
            Some(&json!({"@id": "https://w3id.org/cwl/v1.2/"}))
        );
        assert_eq!(lang.get_str("version"), Some("1.2"));

        let lang = get_language("cwl", Some("v1.2")).unwrap();
        assert_eq!(
            lang.get("identifier"),
            Some(&json!({"@id": "https://w3id.org/cwl/v1.2/"}))
        );
        assert_eq!(lang.get_str("version"), Some("v1.2"));
    }

    #[test]
    fn test_get_language_unknown() {
        let err = get_language("fortran", None).unwrap_err();
        assert!(matches!(err, RoCrateError::InvalidOperation(_)));
    }

    #[test]
    fn test_get_service_and_application() {
        let jenkins = get_service("jenkins").unwrap();
        assert_eq!(jenkins.id(), "https://w3id.org/ro/terms/test#JenkinsService");
        assert!(jenkins.has_type("TestService"));

        let planemo = get_application("planemo").unwrap();
        assert_eq!(planemo.id(), "https://w3id.org/ro/terms/test#PlanemoEngine");

        assert!(get_service("circleci").is_err());
        assert!(get_application("pytest").is_err());
    }
}
