//! `{name}` / `{name:default}` variable references in configuration values.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::HashMap;

lazy_static! {
    static ref VARIABLE_REFERENCE: Regex = Regex::new(r"\{([^{} :][^{} ]*)\}").unwrap();
}

/// Source of variable values for interpolation.
pub trait VariableLookup {
    fn lookup(&self, name: &str) -> Option<String>;
}

impl VariableLookup for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Replace each `{name}` with the looked-up value. When the name is unknown
/// the text after the first `:` is used as a default; without one the
/// reference resolves to the empty string.
pub fn resolve_variable_references<V: VariableLookup + ?Sized>(value: &str, vars: &V) -> String {
    VARIABLE_REFERENCE
        .replace_all(value, |caps: &Captures| {
            let reference = &caps[1];
            let (name, default) = match reference.split_once(':') {
                Some((name, default)) => (name, Some(default)),
                None => (reference, None),
            };
            vars.lookup(name)
                .or_else(|| default.map(str::to_string))
                .unwrap_or_default()
        })
        .into_owned()
}
