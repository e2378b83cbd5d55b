//! System-prompt synthesis from retrieved context.

/// Base instruction sent with every completion.
pub const BASE_SYSTEM_PROMPT: &str = "You are an AI assistant that helps people find information.";

const CONTEXT_INSTRUCTION: &str = "Use the following context to answer questions. If the information is not\nin the context, say so clearly.";

/// Build the system prompt for a set of retrieved context passages.
///
/// With no context only the base sentence is sent; otherwise the passages
/// are appended under a `Context:` header, joined by blank lines.
pub fn synthesize_system_prompt(context: &[String]) -> String {
    if context.is_empty() {
        return BASE_SYSTEM_PROMPT.to_string();
    }

    format!(
        "{BASE_SYSTEM_PROMPT}\n\n{CONTEXT_INSTRUCTION}\n\nContext:\n{}",
        context.join("\n\n")
    )
}
