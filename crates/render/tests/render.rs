use std::collections::BTreeMap;

use appset_core::{
    Application, ApplicationSetSyncPolicy, ApplicationSourceHelm, ApplicationSpec, HelmParameter,
    Params, SyncPolicy, SyncPolicyAutomated, BACKGROUND_RESOURCES_FINALIZER, RESOURCES_FINALIZER,
};
use appset_render::{Render, RenderError, Renderer};

type FieldFn = fn(&mut Application) -> &mut String;

fn path(a: &mut Application) -> &mut String {
    &mut a.spec.source.path
}
fn repo_url(a: &mut Application) -> &mut String {
    &mut a.spec.source.repo_url
}
fn target_revision(a: &mut Application) -> &mut String {
    &mut a.spec.source.target_revision
}
fn chart(a: &mut Application) -> &mut String {
    &mut a.spec.source.chart
}
fn server(a: &mut Application) -> &mut String {
    &mut a.spec.destination.server
}
fn namespace(a: &mut Application) -> &mut String {
    &mut a.spec.destination.namespace
}
fn dest_name(a: &mut Application) -> &mut String {
    &mut a.spec.destination.name
}
fn project(a: &mut Application) -> &mut String {
    &mut a.spec.project
}

fn fields() -> Vec<(&'static str, FieldFn)> {
    vec![
        ("path", path as FieldFn),
        ("repoURL", repo_url),
        ("targetRevision", target_revision),
        ("chart", chart),
        ("server", server),
        ("namespace", namespace),
        ("name", dest_name),
        ("project", project),
    ]
}

fn empty_app() -> Application {
    Application::new("app", ApplicationSpec::default())
}

fn params(pairs: &[(&str, &str)]) -> Params {
    pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
}

fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

#[test]
fn substitution_applies_to_every_string_field() {
    let cases: Vec<(&str, &str, Params, &str)> = vec![
        ("simple substitution", "{{one}}", params(&[("one", "two")]), "two"),
        ("simple substitution with whitespace", "{{ one }}", params(&[("one", "two")]), "two"),
        (
            "template characters but not in a template",
            "}} {{",
            params(&[("one", "two")]),
            "}} {{",
        ),
        ("nested template", "{{ }}", params(&[("one", "{{ }}")]), "{{ }}"),
        ("field with whitespace", "{{ }}", params(&[(" ", "two"), ("", "three")]), "{{ }}"),
        (
            "template contains itself, containing itself",
            "{{one}}",
            params(&[("{{one}}", "{{one}}")]),
            "{{one}}",
        ),
        (
            "template contains itself, containing something else",
            "{{one}}",
            params(&[("{{one}}", "{{two}}")]),
            "{{one}}",
        ),
        ("templates are case sensitive", "{{ONE}}", params(&[("{{one}}", "two")]), "{{ONE}}"),
        ("multiple on a line", "{{one}}{{one}}", params(&[("one", "two")]), "twotwo"),
        (
            "multiple different on a line",
            "{{one}}{{three}}",
            params(&[("one", "two"), ("three", "four")]),
            "twofour",
        ),
        ("replacement is not rescanned", "{{one}}", params(&[("one", "{{one}}")]), "{{one}}"),
    ];

    let render = Render;
    for (name, field_val, p, expected) in cases.iter() {
        for (field, get) in fields() {
            let mut app = empty_app();
            *get(&mut app) = field_val.to_string();
            let mut rendered = render.render_template_params(&app, None, p).unwrap();
            assert_eq!(get(&mut rendered).as_str(), *expected, "case '{}' field '{}'", name, field);
            // input untouched
            assert_eq!(
                get(&mut app).as_str(),
                *field_val,
                "case '{}' field '{}' mutated",
                name,
                field
            );
        }
    }
}

#[test]
fn substitution_reaches_metadata_maps_and_sequences() {
    let mut app = empty_app();
    app.metadata.name = Some("{{cluster}}-guestbook".into());
    app.metadata.labels =
        Some(BTreeMap::from([("{{cluster}}".to_string(), "{{cluster}}".to_string())]));
    app.metadata.annotations =
        Some(BTreeMap::from([("owner".to_string(), "team-{{team}}".to_string())]));
    app.spec.source.helm = Some(ApplicationSourceHelm {
        value_files: vec!["values-{{cluster}}.yaml".into()],
        parameters: vec![HelmParameter {
            name: "replicas".into(),
            value: "{{replicas}}".into(),
            force_string: true,
        }],
        release_name: "{{cluster}}".into(),
    });
    app.spec.sync_policy = Some(SyncPolicy {
        automated: Some(SyncPolicyAutomated { prune: true, self_heal: false }),
        sync_options: vec!["CreateNamespace={{create}}".into()],
    });

    let p = params(&[("cluster", "prod"), ("team", "core"), ("replicas", "3"), ("create", "true")]);
    let out = Render.render_template_params(&app, None, &p).unwrap();

    assert_eq!(out.metadata.name.as_deref(), Some("prod-guestbook"));
    // map keys are not substituted
    let labels = out.metadata.labels.as_ref().unwrap();
    assert_eq!(labels.get("{{cluster}}").map(String::as_str), Some("prod"));
    let annotations = out.metadata.annotations.as_ref().unwrap();
    assert_eq!(annotations.get("owner").map(String::as_str), Some("team-core"));
    let helm = out.spec.source.helm.as_ref().unwrap();
    assert_eq!(helm.value_files, strings(&["values-prod.yaml"]));
    assert_eq!(helm.parameters[0].value, "3");
    assert!(helm.parameters[0].force_string);
    assert_eq!(helm.release_name, "prod");
    let sync = out.spec.sync_policy.as_ref().unwrap();
    assert_eq!(sync.sync_options, strings(&["CreateNamespace=true"]));
    assert_eq!(sync.automated, Some(SyncPolicyAutomated { prune: true, self_heal: false }));
}

#[test]
fn template_without_tokens_is_unchanged_apart_from_finalizers() {
    let mut app = empty_app();
    app.metadata.namespace = Some("argocd".into());
    app.metadata.finalizers = Some(strings(&[RESOURCES_FINALIZER]));
    app.metadata.labels = Some(BTreeMap::from([("env".to_string(), "dev }} {{".to_string())]));
    app.spec.project = "default".into();
    app.spec.source.repo_url = "https://example.com/repo.git".into();
    app.spec.destination.server = "https://kubernetes.default.svc".into();

    let out = Render.render_template_params(&app, None, &params(&[("env", "prod")])).unwrap();
    assert_eq!(out, app);
}

#[test]
fn finalizers_follow_sync_policy() {
    let preserve = ApplicationSetSyncPolicy { preserve_resources_on_deletion: true };
    let empty_policy = ApplicationSetSyncPolicy::default();
    let std_f = || strings(&[RESOURCES_FINALIZER]);
    let bg_f = || strings(&[BACKGROUND_RESOURCES_FINALIZER]);

    type Case<'a> = (
        &'a str,
        Option<&'a ApplicationSetSyncPolicy>,
        Option<Vec<String>>,
        Option<Vec<String>>,
    );
    let cases: Vec<Case> = vec![
        (
            "existing finalizer is preserved as is",
            None,
            Some(strings(&["existing-finalizer"])),
            Some(strings(&["existing-finalizer"])),
        ),
        ("background finalizer is preserved", None, Some(bg_f()), Some(bg_f())),
        ("no finalizers and no policy uses standard finalizer", None, None, Some(std_f())),
        ("standard finalizer is preserved", None, Some(std_f()), Some(std_f())),
        ("empty finalizer list uses standard finalizer", None, Some(vec![]), Some(std_f())),
        ("empty sync policy uses standard finalizer", Some(&empty_policy), None, Some(std_f())),
        ("preserveResourcesOnDeletion adds no finalizer", Some(&preserve), None, None),
        (
            "user finalizer survives preserveResourcesOnDeletion",
            Some(&preserve),
            Some(bg_f()),
            Some(bg_f()),
        ),
    ];

    for (name, policy, existing, expected) in cases {
        let mut app = empty_app();
        app.metadata.finalizers = existing;
        let out = Render.render_template_params(&app, policy, &params(&[("one", "two")])).unwrap();
        assert_eq!(out.metadata.finalizers, expected, "{}", name);
    }
}

#[test]
fn user_finalizer_list_comes_back_unchanged() {
    let mut app = empty_app();
    app.metadata.finalizers = Some(strings(&["existing-finalizer"]));
    let out = Render.render_template_params(&app, None, &params(&[("one", "two")])).unwrap();
    assert_eq!(out.metadata.finalizers, Some(strings(&["existing-finalizer"])));
}

#[test]
fn structural_mismatch_is_an_error() {
    let tree = serde_json::json!({
        "apiVersion": "argoproj.io/v1alpha1",
        "kind": "Application",
        "metadata": { "name": "{{name}}" },
        "spec": { "source": null }
    });
    let err = Render.render_raw(tree, None, &params(&[("name", "x")])).unwrap_err();
    assert!(matches!(err, RenderError::Structural(_)));
}

#[test]
fn renderer_is_usable_as_trait_object_across_threads() {
    let renderer: std::sync::Arc<dyn Renderer> = std::sync::Arc::new(Render);
    let mut app = empty_app();
    app.spec.destination.name = "{{cluster}}".into();
    let handles: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|c| {
            let r = renderer.clone();
            let tmpl = app.clone();
            std::thread::spawn(move || {
                let p = params(&[("cluster", c)]);
                let out = r.render_template_params(&tmpl, None, &p).unwrap();
                out.spec.destination.name
            })
        })
        .collect();
    let names: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}
