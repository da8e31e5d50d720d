//! Prompt templates for problem generation

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::BenchError;
use crate::problem::EmbeddedFile;

static FILES_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{\s*files\s*\}\}").unwrap());

/// Renders the generation prompt from the selected pair's files.
pub trait PromptTemplate: Send + Sync {
    fn render(&self, files: &[EmbeddedFile]) -> Result<String, BenchError>;
}

/// Plain-text template with a single `{{ files }}` placeholder.
#[derive(Debug, Clone)]
pub struct FilesTemplate {
    source: String,
}

impl FilesTemplate {
    pub fn new(source: impl Into<String>) -> Result<Self, BenchError> {
        let source = source.into();
        if !FILES_PLACEHOLDER.is_match(&source) {
            return Err(BenchError::Template(
                "template has no {{ files }} placeholder".to_string(),
            ));
        }
        Ok(Self { source })
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl Default for FilesTemplate {
    fn default() -> Self {
        Self {
            source: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate for FilesTemplate {
    fn render(&self, files: &[EmbeddedFile]) -> Result<String, BenchError> {
        let rendered_files = files
            .iter()
            .map(|f| format!("File: {}\n```\n{}\n```", f.path, f.contents))
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(FILES_PLACEHOLDER
            .replace_all(&self.source, regex::NoExpand(&rendered_files))
            .into_owned())
    }
}

pub const DEFAULT_TEMPLATE: &str = r#"You are a senior engineer writing issues for a code repository.
Below are related files from the repository.

{{ files }}

Write realistic problem statements that a contributor could fix by changing these files.
Each problem statement must describe the observed behaviour and the expected behaviour without
prescribing the fix. For each statement also write a dynamic checklist: short, independently
checkable criteria a correct patch satisfies."#;

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, contents: &str) -> EmbeddedFile {
        EmbeddedFile {
            path: path.to_string(),
            contents: contents.to_string(),
            embedding: vec![],
        }
    }

    #[test]
    fn test_render_files() {
        let template = FilesTemplate::new("Context:\n{{files}}\nEnd").unwrap();
        let prompt = template
            .render(&[file("a.py", "x = 1"), file("b.py", "y = $2")])
            .unwrap();
        assert!(prompt.starts_with("Context:\nFile: a.py\n```\nx = 1\n```"));
        assert!(prompt.contains("File: b.py\n```\ny = $2\n```"));
        assert!(prompt.ends_with("End"));
    }

    #[test]
    fn test_missing_placeholder() {
        assert!(matches!(
            FilesTemplate::new("no files here"),
            Err(BenchError::Template(_))
        ));
    }

    #[test]
    fn test_default_template_has_placeholder() {
        let prompt = FilesTemplate::default().render(&[file("lib.rs", "fn main() {}")]).unwrap();
        assert!(prompt.contains("File: lib.rs"));
        assert!(!prompt.contains("{{"));
    }
}
