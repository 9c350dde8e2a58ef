//! Response template placeholder filling.
//!
//! Templates carry `{{name}}`-style placeholders filled from conversation
//! context at response time. Unknown placeholders are left in place so a
//! partially-filled reply is still inspectable by an operator.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([a-zA-Z0-9_]+)\s*\}\}").expect("placeholder regex is valid"))
}

/// Fill `{{name}}` placeholders from the given variables.
#[must_use]
pub fn fill(template: &str, vars: &HashMap<String, String>) -> String {
    placeholder_re()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let key = &caps[1];
            match vars.get(key) {
                Some(value) => value.clone(),
                None => {
                    tracing::debug!(placeholder = key, "No context value for placeholder");
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_fills_known_placeholders() {
        let out = fill(
            "Bay {{bay_number}} is reset, you're good to go!",
            &vars(&[("bay_number", "4")]),
        );
        assert_eq!(out, "Bay 4 is reset, you're good to go!");
    }

    #[test]
    fn test_unknown_placeholders_are_left_in_place() {
        let out = fill("Hi {{first_name}}, see you at {{time}}", &vars(&[("time", "3pm")]));
        assert_eq!(out, "Hi {{first_name}}, see you at 3pm");
    }

    #[test]
    fn test_whitespace_inside_braces_is_tolerated() {
        let out = fill("Bay {{ bay_number }}", &vars(&[("bay_number", "7")]));
        assert_eq!(out, "Bay 7");
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(fill("We're open 9am-9pm", &HashMap::new()), "We're open 9am-9pm");
    }
}
