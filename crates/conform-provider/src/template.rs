use std::io;
use std::path::Path;

use conform_domain::Facts;

/// Renders a template into the bytes a managed file should contain.
pub trait TemplateRenderer {
    fn render(&self, template: &Path, facts: &Facts) -> io::Result<Vec<u8>>;
}

/// Reads the template from disk and substitutes `{{ fact.name }}`
/// placeholders from the facts map.
#[derive(Debug, Clone, Default)]
pub struct FileTemplates;

impl FileTemplates {
    pub fn new() -> Self {
        Self
    }
}

impl TemplateRenderer for FileTemplates {
    fn render(&self, template: &Path, facts: &Facts) -> io::Result<Vec<u8>> {
        let text = std::fs::read_to_string(template)?;
        Ok(substitute(&text, facts).into_bytes())
    }
}

/// Replace every `{{ token }}` with its fact value. Unknown tokens are
/// left in place.
pub fn substitute(template: &str, facts: &Facts) -> String {
    let mut result = template.to_string();
    let mut search_start = 0;
    loop {
        let Some(start) = result[search_start..].find("{{") else { break };
        let abs_start = search_start + start;
        let Some(end) = result[abs_start..].find("}}") else { break };
        let abs_end = abs_start + end + 2;

        let token = result[abs_start + 2..abs_end - 2].trim();
        if let Some(value) = facts.get(token) {
            let value = value.to_string();
            result = format!("{}{}{}", &result[..abs_start], value, &result[abs_end..]);
            search_start = abs_start + value.len();
            continue;
        }
        search_start = abs_end;
    }
    result
}
