//! ApplicationSet validate: flag generator entries the controller does not understand.
//!
//! The typed generator model drops keys it does not know, so a typo such as
//! `lsit:` arrives as an empty entry. The last-applied-configuration annotation
//! still holds what the user wrote and is only consulted to name offenders.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use appset_core::{ApplicationSet, ApplicationSetGenerator, LAST_APPLIED_ANNOTATION};
use serde_json::Value as Json;
use tracing::{debug, warn};

/// Destination for operator-visible findings.
pub trait DiagnosticSink: Send + Sync {
    fn warn(&self, object: &str, message: &str);
}

/// Forwards findings to `tracing` at warn level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn warn(&self, object: &str, message: &str) {
        warn!(appset = %object, "{}", message);
    }
}

/// Log a warning when `appset` declares generators with no recognized type.
pub fn check_invalid_generators(appset: &ApplicationSet) {
    check_invalid_generators_with(appset, &TracingSink);
}

pub fn check_invalid_generators_with(appset: &ApplicationSet, sink: &dyn DiagnosticSink) {
    let (has_invalid, names) = invalid_generators(appset);
    if has_invalid {
        sink.warn(appset.name(), &unrecognized_message(appset.name(), &names));
    }
}

/// `(any entry unrecognized, literal generator keys recovered for those entries)`.
///
/// Validity comes from the typed spec alone; the annotation can only add names.
pub fn invalid_generators(appset: &ApplicationSet) -> (bool, BTreeSet<String>) {
    let mut names = BTreeSet::new();
    let mut has_invalid = false;
    // parsed on first unrecognized entry, at most once
    let mut snapshot: Option<Option<Vec<Json>>> = None;
    for (index, generator) in appset.spec.generators.iter().enumerate() {
        if generator.is_recognized() { continue; }
        has_invalid = true;
        let applied = snapshot.get_or_insert_with(|| last_applied_generators(appset));
        if let Some(applied) = applied {
            add_invalid_generator_names(&mut names, applied, index);
        }
    }
    (has_invalid, names)
}

fn unrecognized_message(appset: &str, names: &BTreeSet<String>) -> String {
    if names.is_empty() {
        format!("ApplicationSet {} contains unrecognized generators", appset)
    } else {
        let listed: Vec<&str> = names.iter().map(String::as_str).collect();
        format!("ApplicationSet {} contains unrecognized generators: {}", appset, listed.join(", "))
    }
}

/// `spec.generators` from the last-applied annotation as an untyped tree.
fn last_applied_generators(appset: &ApplicationSet) -> Option<Vec<Json>> {
    let name = appset.name();
    let config = appset.metadata.annotations.as_ref().and_then(|a| a.get(LAST_APPLIED_ANNOTATION));
    let Some(config) = config else {
        debug!(appset = %name, "no last-applied-configuration annotation, names unavailable");
        return None;
    };
    let mut values: Json = match serde_json::from_str(config) {
        Ok(v) => v,
        Err(e) => {
            debug!(
                appset = %name,
                error = %e,
                "couldn't parse last-applied-configuration annotation"
            );
            return None;
        }
    };
    let Some(spec) = values.get_mut("spec").filter(|s| s.is_object()) else {
        debug!(appset = %name, "last-applied-configuration has no spec object");
        return None;
    };
    match spec.get_mut("generators").and_then(Json::as_array_mut) {
        Some(items) => Some(std::mem::take(items)),
        None => {
            debug!(appset = %name, "last-applied-configuration has no spec.generators array");
            None
        }
    }
}

fn add_invalid_generator_names(names: &mut BTreeSet<String>, applied: &[Json], index: usize) {
    let Some(entry) = applied.get(index) else {
        debug!(
            index,
            len = applied.len(),
            "generator index out of range in last-applied-configuration"
        );
        return;
    };
    let Some(fields) = entry.as_object() else {
        debug!(index, "last-applied generator entry is not an object");
        return;
    };
    for key in fields.keys() {
        if !ApplicationSetGenerator::KNOWN_KEYS.contains(&key.as_str()) {
            names.insert(key.clone());
        }
    }
}
