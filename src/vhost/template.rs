//! Minimal placeholder language for virtual-host templates.
//!
//! - `{{name}}` substitutes a value
//! - `{{#flag}}...{{/flag}}` keeps the body when `flag` is true
//! - `{{^flag}}...{{/flag}}` keeps the body when `flag` is false
//!
//! A newline directly after a section tag is dropped so tags can sit on
//! their own lines. Unknown names and unterminated tags are errors.

use crate::error::ParkError;
use anyhow::Result;
use std::collections::BTreeMap;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Values and flags available to a template.
#[derive(Debug, Clone, Default)]
pub struct Values {
    vars: BTreeMap<&'static str, String>,
    flags: BTreeMap<&'static str, bool>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn var(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.vars.insert(name, value.into());
        self
    }

    pub fn flag(mut self, name: &'static str, value: bool) -> Self {
        self.flags.insert(name, value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
}

impl Template {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn render(&self, values: &Values) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        render_into(&self.source, values, &mut out)?;
        Ok(out)
    }
}

fn render_into(mut rest: &str, values: &Values, out: &mut String) -> Result<()> {
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        let end = after_open
            .find(CLOSE)
            .ok_or_else(|| template_error(format!("unterminated tag near '{}'", snippet(after_open))))?;
        let tag = after_open[..end].trim();
        rest = &after_open[end + CLOSE.len()..];

        if let Some(name) = tag.strip_prefix('#').or_else(|| tag.strip_prefix('^')) {
            let inverted = tag.starts_with('^');
            let name = name.trim();
            let value = *values
                .flags
                .get(name)
                .ok_or_else(|| template_error(format!("unknown flag '{name}'")))?;

            let close_tag = format!("{OPEN}/{name}{CLOSE}");
            let body_end = rest
                .find(&close_tag)
                .ok_or_else(|| template_error(format!("section '{name}' is never closed")))?;
            let body = skip_newline(&rest[..body_end]);
            rest = skip_newline(&rest[body_end + close_tag.len()..]);

            if value != inverted {
                render_into(body, values, out)?;
            }
        } else if let Some(name) = tag.strip_prefix('/') {
            return Err(template_error(format!("closing tag '{}' without opening", name.trim())));
        } else {
            let value = values
                .vars
                .get(tag)
                .ok_or_else(|| template_error(format!("unknown placeholder '{tag}'")))?;
            out.push_str(value);
        }
    }
    out.push_str(rest);
    Ok(())
}

fn skip_newline(s: &str) -> &str {
    s.strip_prefix('\n').unwrap_or(s)
}

fn snippet(s: &str) -> &str {
    let end = s.char_indices().nth(20).map(|(i, _)| i).unwrap_or(s.len());
    &s[..end]
}

fn template_error(message: String) -> anyhow::Error {
    ParkError::Template(message).into()
}
