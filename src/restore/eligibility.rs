// projectrestore/src/restore/eligibility.rs
use crate::platform::ComponentDescriptor;

/// Components that expose a `uri` but have no API of their own worth respecting.
pub const COMPONENTS_WITHOUT_API: &[&str] = &[
    "wr-dropbox", "tde-exporter", "geneea-topic-detection",
    "geneea-language-detection", "geneea-lemmatization", "geneea-sentiment-analysis",
    "geneea-text-correction", "geneea-entity-recognition", "ex-adform", "geneea-nlp-analysis",
    "rcp-anomaly", "rcp-basket", "rcp-correlations", "rcp-data-type-assistant",
    "rcp-distribution-groups", "rcp-linear-dependency", "rcp-linear-regression",
    "rcp-next-event", "rcp-next-order-simple",
    "rcp-segmentation", "rcp-var-characteristics", "ex-sklik", "ex-dropbox", "wr-portal-sas", "ag-geocoding",
    "keboola.ex-db-pgsql", "keboola.ex-db-db2", "keboola.ex-db-firebird",
];

const GENERIC_UI_FLAGS: &[&str] = &["genericUI", "genericDockerUI", "genericTemplatesUI"];

/// A component is obsolete when it keeps its configurations behind its own
/// API; replaying them through the generic configuration endpoints would
/// overwrite state that component owns.
pub fn is_obsolete_component(component: &ComponentDescriptor) -> bool {
    match component.id.as_str() {
        "gooddata-writer" => return true,
        "transformation" => return false,
        _ => {}
    }

    let has_generic_ui = component
        .flags
        .iter()
        .any(|flag| GENERIC_UI_FLAGS.contains(&flag.as_str()));

    component.uri.is_some()
        && !COMPONENTS_WITHOUT_API.contains(&component.id.as_str())
        && !has_generic_ui
}
