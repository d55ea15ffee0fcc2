//! ApplicationSet render: `{{ param }}` substitution over Application templates
//! plus the cascade finalizer policy.

#![forbid(unsafe_code)]

use appset_core::{Application, ApplicationSetSyncPolicy, Params, RESOURCES_FINALIZER};
use serde_json::Value as Json;
use thiserror::Error;
use tracing::debug;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Error)]
pub enum RenderError {
    /// The template could not be copied into, or read back out of, a JSON tree.
    #[error("template is not a valid Application: {0}")]
    Structural(#[from] serde_json::Error),
}

/// Materializes one Application per parameter set.
pub trait Renderer: Send + Sync {
    fn render_template_params(
        &self,
        tmpl: &Application,
        sync_policy: Option<&ApplicationSetSyncPolicy>,
        params: &Params,
    ) -> Result<Application, RenderError>;
}

/// Stateless default renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Render;

impl Render {
    /// Render from an untyped Application tree. The tree is consumed; callers
    /// that need to keep their copy clone before calling.
    pub fn render_raw(
        &self,
        mut tree: Json,
        sync_policy: Option<&ApplicationSetSyncPolicy>,
        params: &Params,
    ) -> Result<Application, RenderError> {
        replace_strings(&mut tree, params);
        let mut app: Application = serde_json::from_value(tree)?;
        apply_finalizer_policy(&mut app.metadata.finalizers, sync_policy);
        debug!(
            app = %app.metadata.name.as_deref().unwrap_or(""),
            params = params.len(),
            finalizers = app.metadata.finalizers.as_ref().map(|f| f.len()).unwrap_or(0),
            "rendered application template"
        );
        Ok(app)
    }
}

impl Renderer for Render {
    fn render_template_params(
        &self,
        tmpl: &Application,
        sync_policy: Option<&ApplicationSetSyncPolicy>,
        params: &Params,
    ) -> Result<Application, RenderError> {
        // the JSON tree is the deep copy; `tmpl` is never touched
        let tree = serde_json::to_value(tmpl)?;
        self.render_raw(tree, sync_policy, params)
    }
}

/// Substitute string leaves in place. Object keys and non-string scalars are left alone.
fn replace_strings(v: &mut Json, params: &Params) {
    match v {
        Json::String(s) => {
            if s.contains(OPEN) {
                *s = render_string(s, params);
            }
        }
        Json::Array(items) => {
            for item in items.iter_mut() {
                replace_strings(item, params);
            }
        }
        Json::Object(map) => {
            for (_k, item) in map.iter_mut() {
                replace_strings(item, params);
            }
        }
        _ => {}
    }
}

/// Single left-to-right pass over `input`. Replacement values are spliced in
/// verbatim and never rescanned. Unknown or blank names keep the span literal.
pub fn render_string(input: &str, params: &Params) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else { break };
        out.push_str(&rest[..start]);
        let tag = &after_open[..end];
        let key = tag.trim();
        match params.get(key) {
            Some(value) if !key.is_empty() => out.push_str(value),
            _ => {
                out.push_str(OPEN);
                out.push_str(tag);
                out.push_str(CLOSE);
            }
        }
        rest = &after_open[end + CLOSE.len()..];
    }
    out.push_str(rest);
    out
}

/// Default the cascade finalizer onto an Application with no finalizers of its
/// own, unless the policy preserves resources. A non-empty user list is left as is.
pub fn apply_finalizer_policy(
    finalizers: &mut Option<Vec<String>>,
    sync_policy: Option<&ApplicationSetSyncPolicy>,
) {
    if sync_policy.map(|p| p.preserve_resources_on_deletion).unwrap_or(false) {
        return;
    }
    if finalizers.as_ref().map_or(true, Vec::is_empty) {
        *finalizers = Some(vec![RESOURCES_FINALIZER.to_string()]);
    }
}
