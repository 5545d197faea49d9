use thiserror::Error;

const PLACEHOLDER: &str = "{}";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("URL template {template:?} must contain exactly one `{{}}` placeholder, found {found}")]
    Placeholder { template: String, found: usize },
}

/// Source and destination of one mirror run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorTarget {
    pub fetch_url: String,
    pub push_url: String,
}

impl MirrorTarget {
    pub fn from_templates(
        fetch_template: &str,
        push_template: &str,
        repository: &str,
    ) -> Result<Self, TemplateError> {
        Ok(Self {
            fetch_url: substitute(fetch_template, repository)?,
            push_url: substitute(push_template, repository)?,
        })
    }
}

/// Replace the single `{}` in `template` with `repository`.
///
/// Surrounding whitespace is dropped from the template; the repository name is
/// inserted verbatim.
pub fn substitute(template: &str, repository: &str) -> Result<String, TemplateError> {
    let template = template.trim();
    let found = template.matches(PLACEHOLDER).count();
    if found != 1 {
        return Err(TemplateError::Placeholder {
            template: template.to_string(),
            found,
        });
    }
    Ok(template.replacen(PLACEHOLDER, repository, 1))
}
