//! Plain-text rendering with Tera
//!
//! Used for the LLM prompt and for GMAO incident descriptions. Output is
//! never HTML-escaped.

use serde::Serialize;
use tera::{Context, Tera};

use crate::{Error, Result};

/// Renders `template` once against any serializable map-like context.
pub fn render_template<C: Serialize>(template: &str, context: &C) -> Result<String> {
    let context = Context::from_serialize(context)
        .map_err(|e| Error::Internal(format!("Invalid template context: {}", e)))?;
    Tera::one_off(template, &context, false)
        .map_err(|e| Error::Internal(format!("Failed to render template: {}", e)))
}
