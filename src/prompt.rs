//! Prompt assembly for the notes assistant.

use crate::rag::RetrievedChunk;

pub const DEFAULT_ASSISTANT_NAME: &str = "your notes assistant";

/// Placeholders: `{name}`, `{context}` and `{input}`.
pub const DEFAULT_TEMPLATE: &str = "\
You are a personal helper named {name}, here to support the user based on their own notes and documents.
Think of yourself as a blend of a thoughtful listener, a wise mentor and a trusted friend.

Your qualities:
1. Attentive: listen carefully, show empathy and help the user explore their thoughts
2. Wise: offer considered guidance grounded in the context you are given
3. Honest: give candid feedback when it is needed, always with compassion
4. Trustworthy: treat everything in the notes as private and confidential

When responding:
- ALWAYS give a substantive answer based on the context
- If the context has nothing relevant, say so honestly and still try to help
- Point to insights and patterns from the user's notes where you can
- Be warm and conversational, but direct
- Do not judge or assume things the notes do not support

Relevant context from the user's notes:
{context}

The user's question or request:
{input}

Give a thoughtful, personal answer. NEVER return an empty response.
";

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
    name: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            name: name.into(),
        }
    }

    /// The default template addressed as `name`.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self::new(DEFAULT_TEMPLATE, name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fill the template in a single pass, so braces inside notes or the
    /// question are never treated as placeholders.
    pub fn render(&self, chunks: &[RetrievedChunk], input: &str) -> String {
        let context = stuff_context(chunks);
        let mut out = String::with_capacity(self.template.len() + context.len() + input.len());
        let mut rest = self.template.as_str();

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            let replacement = [("{name}", self.name.as_str()), ("{context}", context.as_str()), ("{input}", input)]
                .into_iter()
                .find(|(placeholder, _)| tail.starts_with(placeholder));
            match replacement {
                Some((placeholder, value)) => {
                    out.push_str(value);
                    rest = &tail[placeholder.len()..];
                }
                None => {
                    out.push('{');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::with_name(DEFAULT_ASSISTANT_NAME)
    }
}

/// Join retrieved chunk contents with blank lines, in retrieval order.
pub fn stuff_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
