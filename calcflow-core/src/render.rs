//! Script rendering
//!
//! Template scripts are Jinja sources rendered against three bindings:
//! `profile`, `template` and `invocation`. Undefined values are errors, so a
//! reference to a missing binding or field fails instead of rendering empty.

use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde_json::{Value, json};
use std::collections::BTreeMap;

use crate::domain::{CalcJob, Profile, Template};
use crate::error::{CoreError, Result};

/// Named values visible to a script
#[derive(Debug, Clone, Default)]
pub struct ScriptBindings {
    values: BTreeMap<String, Value>,
}

impl ScriptBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bindings for one calcjob; the client secret is never exposed
    pub fn for_calcjob(profile: &Profile, template: &Template, calcjob: &CalcJob) -> Self {
        Self::new()
            .with("profile", profile_binding(profile))
            .with("template", template_binding(template))
            .with("invocation", invocation_binding(profile, calcjob))
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}

/// Renders a script source against the given bindings
pub fn render_script(source: &str, bindings: &ScriptBindings) -> Result<String> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_auto_escape_callback(|_| AutoEscape::None);

    env.render_str(source, &bindings.values)
        .map_err(|e| CoreError::TemplateRender(e.to_string()))
}

fn profile_binding(profile: &Profile) -> Value {
    json!({
        "id": profile.id,
        "label": profile.label,
        "gateway_url": profile.gateway_url,
        "client_id": profile.credentials.client_id,
        "token_uri": profile.credentials.token_uri,
        "machine_name": profile.machine_name,
        "work_dir": profile.work_dir,
        "work_path": profile.work_path().to_string(),
        "fs_convention": profile.fs_convention,
        "small_file_size_bytes": profile.small_file_size_bytes,
    })
}

fn template_binding(template: &Template) -> Value {
    json!({
        "id": template.id,
        "label": template.label,
        "upload": template.upload,
    })
}

fn invocation_binding(profile: &Profile, calcjob: &CalcJob) -> Value {
    json!({
        "id": calcjob.id,
        "label": calcjob.label,
        "uuid": calcjob.uuid.to_string(),
        "parameters": calcjob.parameters,
        "upload": calcjob.upload,
        "download_globs": calcjob.download_globs,
        "remote_path": calcjob.remote_path(profile).to_string(),
    })
}
