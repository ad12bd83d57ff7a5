use std::sync::LazyLock;

use regex::{
    Captures,
    Regex,
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterpolationError {
    #[error("Required environment variable not found: {0}")]
    RequiredVarNotFound(String),

    #[error("Recursive interpolation limit exceeded")]
    RecursionLimit,
}

pub type InterpolationResult<T> = Result<T, InterpolationError>;

const MAX_RECURSION_DEPTH: usize = 10;

static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("Invalid regex pattern")
});

/// Expands `${VAR}` and `${VAR:-default}` through `lookup`
pub fn interpolate_with(
    input: &str, lookup: &dyn Fn(&str) -> Option<String>,
) -> InterpolationResult<String> {
    expand(input, lookup, 0)
}

fn expand(
    input: &str, lookup: &dyn Fn(&str) -> Option<String>, depth: usize,
) -> InterpolationResult<String> {
    if depth > MAX_RECURSION_DEPTH {
        return Err(InterpolationError::RecursionLimit);
    }

    let mut failure = None;
    let expanded = VAR_PATTERN.replace_all(input, |caps: &Captures| {
        let name = &caps[1];
        match (lookup(name), caps.get(2)) {
            (Some(value), _) => value,
            (None, Some(default)) => match expand(default.as_str(), lookup, depth + 1) {
                Ok(value) => value,
                Err(e) => {
                    failure.get_or_insert(e);
                    String::new()
                }
            },
            (None, None) => {
                failure.get_or_insert(InterpolationError::RequiredVarNotFound(name.to_string()));
                String::new()
            }
        }
    });

    if let Some(e) = failure {
        return Err(e);
    }

    // A default may close over an inner `${..}` that only matches once
    // the outer reference is gone, so expand again until stable
    let expanded = expanded.into_owned();
    if expanded != input && has_variables(&expanded) {
        return expand(&expanded, lookup, depth + 1);
    }
    Ok(expanded)
}

/// Interpolates every string inside a parsed TOML document
pub fn interpolate_toml(
    value: &mut toml::Value, lookup: &dyn Fn(&str) -> Option<String>,
) -> InterpolationResult<()> {
    match value {
        toml::Value::String(s) => {
            *s = interpolate_with(s, lookup)?;
        }
        toml::Value::Array(items) => {
            for item in items {
                interpolate_toml(item, lookup)?;
            }
        }
        toml::Value::Table(table) => {
            for (_, v) in table.iter_mut() {
                interpolate_toml(v, lookup)?;
            }
        }
        _ => {}
    }
    Ok(())
}

pub fn has_variables(input: &str) -> bool {
    VAR_PATTERN.is_match(input)
}
