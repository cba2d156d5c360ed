// Purpose: Two-pass evaluation of the templated output text.

use handlebars::{Context, Handlebars, Helper, HelperResult, Output, RenderContext};
use regex::Regex;
use serde_json::Value;

use crate::errors::{Error, Result};

/// The namespaces hide which recipe a reference came from, so evaluation
/// failures carry this generic message instead of a recipe name.
pub const TEMPLATE_ERROR: &str = "a template included in this renderer raised an error. Check \
the template definition: a required argument might be missing from the template's required \
arguments, and variables in the template must start with 'self.'.";

/// Evaluate the accumulated text against the per-instance namespaces.
///
/// The first pass substitutes every bound reference. Its output can itself
/// contain template expressions, e.g. when a bound value references another
/// argument of the same instance, so the text is evaluated a second time when
/// any marker survives the first pass. Text without markers skips the second
/// pass.
pub fn evaluate(text: &str, namespaces: &Value) -> Result<String> {
    let first = render_once(text, namespaces)?;
    if !first.contains("{{") && !first.contains("}}") {
        return Ok(first);
    }
    render_once(&first, namespaces)
}

fn render_once(text: &str, namespaces: &Value) -> Result<String> {
    check_references(text, namespaces)?;
    engine()
        .render_template(text, namespaces)
        .map_err(|err| {
            log::debug!("template evaluation failed: {}", err);
            Error::Template(TEMPLATE_ERROR.to_string())
        })
}

/// Reject unbound references and any expression that is neither a namespaced
/// reference nor a `default` helper invocation. The handlebars engine runs in
/// non-strict mode (the `default` helper must observe missing values), so an
/// undeclared name would otherwise render as empty text instead of failing.
fn check_references(text: &str, namespaces: &Value) -> Result<()> {
    let expression = Regex::new(r"(\\)?\{\{([^{}]*)\}\}").unwrap();
    let reference = Regex::new(r"^(template_\d+)\.([A-Za-z0-9_]+)$").unwrap();
    for caps in expression.captures_iter(text) {
        // An escaped expression is literal output this pass; the next pass
        // sees it unescaped and validates it then.
        if caps.get(1).is_some() {
            continue;
        }
        let inner = caps[2].trim();
        if let Some(parts) = reference.captures(inner) {
            let bound = namespaces
                .get(&parts[1])
                .and_then(|ns| ns.get(&parts[2]))
                .is_some();
            if !bound {
                return Err(Error::Template(TEMPLATE_ERROR.to_string()));
            }
        } else if !inner.starts_with("default ") {
            return Err(Error::Template(TEMPLATE_ERROR.to_string()));
        }
    }
    Ok(())
}

fn engine() -> Handlebars<'static> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars.register_helper("default", Box::new(default_helper));
    handlebars
}

/// `{{ default self.name "fallback" }}`: the bound value when present,
/// otherwise the fallback.
fn default_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let bound = h
        .param(0)
        .filter(|p| !p.is_value_missing())
        .map(|p| p.value())
        .filter(|v| !v.is_null());
    let value = match bound {
        Some(v) => v.clone(),
        None => h
            .param(1)
            .map(|p| p.value().clone())
            .unwrap_or_else(|| Value::String(String::new())),
    };
    match value {
        Value::String(s) => out.write(&s)?,
        other => out.write(&other.to_string())?,
    }
    Ok(())
}
