//! `{{key}}` substitution for text layer content.

use std::collections::HashMap;

/// One row of form data: placeholder key to replacement value.
pub type FormData = HashMap<String, String>;

/// Replaces every `{{key}}` token in `template` with its value from `form`.
///
/// - Surrounding whitespace inside the braces is ignored (`{{ name }}`).
/// - Keys missing from `form` become the empty string.
/// - An unterminated `{{` is copied through unchanged.
/// - Substituted values are never rescanned, so a value that itself
///   contains braces is emitted literally.
pub fn substitute(template: &str, form: &FormData) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        match after_open.find("}}") {
            Some(end) => {
                let key = after_open[..end].trim();
                if let Some(value) = form.get(key) {
                    out.push_str(value);
                }
                rest = &after_open[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

/// Keys referenced by `template`, in order of first appearance.
pub fn placeholder_keys(template: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            break;
        };
        let key = after_open[..end].trim().to_string();
        if !keys.contains(&key) {
            keys.push(key);
        }
        rest = &after_open[end + 2..];
    }
    keys
}
