//! ApplicationSet core: resource model, well-known constants and shared helpers.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

pub mod crd;

pub use crd::{
    Application, ApplicationDestination, ApplicationSet, ApplicationSetGenerator,
    ApplicationSetSpec, ApplicationSetSyncPolicy, ApplicationSetTemplate,
    ApplicationSetTemplateMeta, ApplicationSource, ApplicationSourceHelm, ApplicationSpec,
    ClusterGenerator, GitDirectoryGeneratorItem, GitFileGeneratorItem, GitGenerator,
    HelmParameter, ListGenerator, MatrixGenerator, MergeGenerator, SyncPolicy,
    SyncPolicyAutomated,
};

/// Default cascade finalizer added to generated Applications.
pub const RESOURCES_FINALIZER: &str = "resources-finalizer.argocd.argoproj.io";
/// Background-cascade variant; its presence suppresses the default.
pub const BACKGROUND_RESOURCES_FINALIZER: &str =
    "resources-finalizer.argocd.argoproj.io/background";
/// Annotation written by `kubectl apply` holding the object as the user submitted it.
pub const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

const MAX_DNS_NAME_LEN: usize = 253;

/// One parameter set produced by a generator.
pub type Params = BTreeMap<String, String>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("found duplicate key {key} with different value, a: {left}, b: {right}")]
    ConflictingKey { key: String, left: String, right: String },
}

/// Union of two parameter sets. A key present in both must carry the same value.
pub fn combine_string_maps(a: &Params, b: &Params) -> Result<Params, CoreError> {
    let mut out = a.clone();
    for (k, v) in b.iter() {
        match out.get(k) {
            Some(existing) if existing != v => {
                return Err(CoreError::ConflictingKey {
                    key: k.clone(),
                    left: existing.clone(),
                    right: v.clone(),
                });
            }
            Some(_) => {}
            None => {
                out.insert(k.clone(), v.clone());
            }
        }
    }
    Ok(out)
}

/// Coerce an arbitrary string into a DNS-1123 subdomain usable as a resource name.
pub fn sanitize_name(name: &str) -> String {
    static INVALID_DNS_CHARS: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"[^-a-z0-9.]").expect("static regex"));
    let lowered = name.to_lowercase();
    let mut out = INVALID_DNS_CHARS.replace_all(&lowered, "-").into_owned();
    // only ASCII survives the replacement, so byte truncation is char-safe
    out.truncate(MAX_DNS_NAME_LEN);
    out.trim_matches(|c| c == '-' || c == '.').to_string()
}
