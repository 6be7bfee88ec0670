use std::error::Error as _;

use hostpack_core::{Error, Result};
use tera::Tera;

use crate::ContextItems;

pub const TEMPLATE_SUFFIX: &str = ".j2";

/// Renders `source` with `items`; unknown variables fail the render.
pub fn render_template(name: &str, source: &str, items: &ContextItems) -> Result<String> {
    let mut tera = Tera::default();
    tera.autoescape_on(Vec::new());
    tera.add_raw_template(name, source)
        .map_err(|err| template_error(name, &err))?;
    tera.render(name, &items.to_tera_context())
        .map_err(|err| template_error(name, &err))
}

fn template_error(name: &str, err: &tera::Error) -> Error {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    Error::Template {
        name: name.to_string(),
        message,
    }
}

/// Output file name for a template source name (`x.conf.j2` -> `x.conf`).
pub fn rendered_name(name: &str) -> &str {
    name.strip_suffix(TEMPLATE_SUFFIX).unwrap_or(name)
}
