//! # Bundle Rendering
//!
//! A bundle is a directory with an optional `values.yaml` holding defaults and
//! a `templates/` directory of Tera templates. Templates whose file name starts
//! with `_` are partials: they can be imported or included but are never
//! emitted. `*.txt` files (notes) are skipped.
//!
//! Each emitted template sees two variables:
//! - `values`: the defaults deep-merged with the supplied value tree (supplied wins)
//! - `release`: `name` and `namespace` of the release being rendered

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tera::{Context, Tera};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

const VALUES_FILE: &str = "values.yaml";
const TEMPLATES_DIR: &str = "templates";

/// Errors raised while rendering a bundle
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("bundle {0} not found or has no templates directory")]
    MissingBundle(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid default values in {path}: {message}")]
    InvalidValues { path: PathBuf, message: String },

    #[error("template error in {template}: {message}")]
    Template { template: String, message: String },
}

/// Full error chain of a Tera error; the top-level message alone rarely names the cause
fn tera_message(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Merge `overlay` into `base`; maps merge recursively, everything else is replaced
fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn load_defaults(bundle: &Path) -> Result<Value, RenderError> {
    let path = bundle.join(VALUES_FILE);
    if !path.is_file() {
        return Ok(json!({}));
    }
    let content = std::fs::read_to_string(&path).map_err(|source| RenderError::Io {
        path: path.clone(),
        source,
    })?;
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|e| RenderError::InvalidValues {
            path: path.clone(),
            message: e.to_string(),
        })?;
    match serde_json::to_value(yaml) {
        Ok(Value::Null) => Ok(json!({})),
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(RenderError::InvalidValues {
            path,
            message: "top level must be a mapping".to_string(),
        }),
        Err(e) => Err(RenderError::InvalidValues {
            path,
            message: e.to_string(),
        }),
    }
}

fn is_partial(name: &str) -> bool {
    name.rsplit('/').next().is_some_and(|file| file.starts_with('_'))
}

/// Load every template below `templates/`, sorted by path
fn load_templates(bundle: &Path) -> Result<Vec<(String, String)>, RenderError> {
    let root = bundle.join(TEMPLATES_DIR);
    if !root.is_dir() {
        return Err(RenderError::MissingBundle(bundle.to_path_buf()));
    }

    let mut templates = Vec::new();
    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = entry.map_err(|e| RenderError::Io {
            path: root.clone(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "txt") {
            continue;
        }
        let name = path
            .strip_prefix(&root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let content = std::fs::read_to_string(path).map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        templates.push((name, content));
    }
    templates.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(templates)
}

/// Render `bundle` for the release `release_name` in `namespace`
///
/// Returns the emitted documents joined with `---` separators.
pub fn render_bundle(
    bundle: &Path,
    release_name: &str,
    namespace: &str,
    values: &Value,
) -> Result<String, RenderError> {
    if !bundle.is_dir() {
        return Err(RenderError::MissingBundle(bundle.to_path_buf()));
    }
    let templates = load_templates(bundle)?;

    let mut merged = load_defaults(bundle)?;
    deep_merge(&mut merged, values.clone());

    let mut tera = Tera::default();
    tera.add_raw_templates(
        templates
            .iter()
            .map(|(name, content)| (name.as_str(), content.as_str())),
    )
    .map_err(|e| RenderError::Template {
        template: bundle.display().to_string(),
        message: tera_message(&e),
    })?;

    let mut context = Context::new();
    context.insert("values", &merged);
    context.insert(
        "release",
        &json!({ "name": release_name, "namespace": namespace }),
    );

    let mut documents = Vec::new();
    for (name, _) in templates.iter().filter(|(name, _)| !is_partial(name)) {
        let rendered = tera
            .render(name, &context)
            .map_err(|e| RenderError::Template {
                template: name.clone(),
                message: tera_message(&e),
            })?;
        let trimmed = rendered.trim();
        if trimmed.is_empty() || trimmed == "---" {
            debug!("Template {} rendered empty, skipping", name);
            continue;
        }
        documents.push(trimmed.to_string());
    }

    debug!(
        "Rendered {} document(s) from bundle {}",
        documents.len(),
        bundle.display()
    );
    Ok(documents.join("\n---\n") + "\n")
}
