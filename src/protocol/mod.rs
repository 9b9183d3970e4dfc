//! Wire types for the chat-completion API the proxy sits in front of.
//!
//! The proxy is schema-tolerant: it types only what it needs
//! (`model`, `messages`, `temperature`, `max_tokens`, `stream`) and carries
//! every other field through unchanged.

mod chat;

pub use chat::{replace_messages, ChatRequest, Content, Message, Part, TextPart};

/// Path suffix that marks a chat-completion call
pub const CHAT_COMPLETIONS_SUFFIX: &str = "/chat/completions";

/// Whether a request path targets the chat-completion endpoint
pub fn is_chat_path(path: &str) -> bool {
    path.ends_with(CHAT_COMPLETIONS_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_chat_path() {
        assert!(is_chat_path("/v1/chat/completions"));
        assert!(is_chat_path("/chat/completions"));
        assert!(!is_chat_path("/v1/completions"));
        assert!(!is_chat_path("/v1/chat/completions/abc"));
        assert!(!is_chat_path("/v1/models"));
    }
}
