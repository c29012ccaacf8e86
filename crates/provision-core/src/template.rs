//! `$NAME` placeholder substitution for DSN configuration templates.
//!
//! Syntax:
//! - `$NAME`: identifier of ASCII letters, digits and `_`, not starting with a digit
//! - `${NAME}`: braced form, for placeholders followed by identifier characters
//! - `$$`: a literal `$`
//!
//! Every placeholder must have a value; any other use of `$` is an error.

use std::collections::HashMap;
use std::path::Path;

use crate::error::ProvisionError;

/// Substitute placeholders in `template` with values from `vars`.
///
/// # Errors
///
/// Returns [`ProvisionError::Template`] for a placeholder without a value,
/// an unterminated `${`, or a `$` not followed by an identifier.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use provision_core::template::render;
///
/// let vars = HashMap::from([("TEST_DSN", "https://k@o1.ingest.sentry.io/1")]);
/// let out = render("dsn: '${TEST_DSN}' # costs $$0", &vars).unwrap();
/// assert_eq!(out, "dsn: 'https://k@o1.ingest.sentry.io/1' # costs $0");
/// ```
pub fn render(template: &str, vars: &HashMap<&str, &str>) -> Result<String, ProvisionError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
            continue;
        }

        let (name, tail) = if let Some(braced) = after.strip_prefix('{') {
            let Some(end) = braced.find('}') else {
                return Err(ProvisionError::Template(format!(
                    "unterminated placeholder at byte {}",
                    template.len() - rest.len() + pos
                )));
            };
            (&braced[..end], &braced[end + 1..])
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], &after[end..])
        };

        if !is_identifier(name) {
            return Err(ProvisionError::Template(format!(
                "invalid placeholder at byte {}",
                template.len() - rest.len() + pos
            )));
        }

        let value = vars
            .get(name)
            .ok_or_else(|| ProvisionError::Template(format!("no value for ${name}")))?;
        out.push_str(value);
        rest = tail;
    }

    out.push_str(rest);
    Ok(out)
}

/// Read a template file and substitute it with [`render`].
///
/// # Errors
///
/// Returns [`ProvisionError::FileNotFound`] if `path` does not exist, plus
/// any error from [`render`].
pub fn render_file(path: &Path, vars: &HashMap<&str, &str>) -> Result<String, ProvisionError> {
    if !path.exists() {
        return Err(ProvisionError::FileNotFound(path.to_path_buf()));
    }
    let template = std::fs::read_to_string(path)?;
    render(&template, vars)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
