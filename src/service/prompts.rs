use crate::error::NexusError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Placeholder replaced by the caller's text in structured prompts.
pub const PLACEHOLDER: &str = "{user_text}";

/// The task prompts shipped with the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    Todo,
    MentalHealth,
    Resume,
    Interview,
}

impl Prompt {
    pub fn file_name(self) -> &'static str {
        match self {
            Prompt::Todo => "todo_prompt.txt",
            Prompt::MentalHealth => "mental_health_prompt.txt",
            Prompt::Resume => "resume_prompt.txt",
            Prompt::Interview => "interview_prompt.txt",
        }
    }
}

/// File-backed prompt lookup rooted at one directory.
#[derive(Debug, Clone)]
pub struct PromptRegistry {
    dir: PathBuf,
}

impl PromptRegistry {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self, prompt: Prompt) -> PathBuf {
        self.dir.join(prompt.file_name())
    }

    pub async fn exists(&self, prompt: Prompt) -> bool {
        tokio::fs::try_exists(self.path(prompt))
            .await
            .unwrap_or(false)
    }

    pub async fn load(&self, prompt: Prompt) -> Result<String, NexusError> {
        let path = self.path(prompt);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(NexusError::PromptMissing(path)),
            Err(e) => Err(e.into()),
        }
    }
}

/// Substitute `user_text` for every `{user_text}` in `template`.
///
/// `{{` and `}}` stand for literal braces so templates can embed JSON examples.
/// Any other brace is copied through unchanged.
pub fn render(template: &str, user_text: &str) -> String {
    let mut out = String::with_capacity(template.len() + user_text.len());
    let mut rest = template;
    while let Some(idx) = rest.find(['{', '}']) {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];
        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
        } else if let Some(after) = tail.strip_prefix(PLACEHOLDER) {
            out.push_str(user_text);
            rest = after;
        } else {
            out.push_str(&tail[..1]);
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_placeholder() {
        assert_eq!(render("Tasks: {user_text}.", "buy milk"), "Tasks: buy milk.");
    }

    #[test]
    fn doubled_braces_are_literal() {
        let template = r#"Answer as {{"tasks": []}} for: {user_text}"#;
        assert_eq!(
            render(template, "x"),
            r#"Answer as {"tasks": []} for: x"#
        );
        assert_eq!(render("{{user_text}}", "x"), "{user_text}");
    }

    #[test]
    fn user_text_is_not_reinterpreted() {
        assert_eq!(render("{user_text}", "{user_text} {{"), "{user_text} {{");
    }

    #[test]
    fn unknown_braces_pass_through() {
        assert_eq!(render("{other} {user_text", "x"), "{other} {user_text");
    }

    #[tokio::test]
    async fn bundled_prompts_exist() {
        let registry = PromptRegistry::new(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts"));
        for prompt in [
            Prompt::Todo,
            Prompt::MentalHealth,
            Prompt::Resume,
            Prompt::Interview,
        ] {
            assert!(registry.exists(prompt).await, "{prompt:?} missing");
        }
        let todo = registry.load(Prompt::Todo).await.unwrap();
        assert!(todo.contains(PLACEHOLDER));
    }

    #[tokio::test]
    async fn missing_prompt_is_reported() {
        let registry = PromptRegistry::new("/nonexistent/prompts");
        let err = registry.load(Prompt::Todo).await.unwrap_err();
        assert!(matches!(err, NexusError::PromptMissing(p) if p.ends_with("todo_prompt.txt")));
    }
}
