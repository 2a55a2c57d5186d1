use std::fmt;

pub const GREETING: &str = "Hello! I'm WalkyNine, your AI assistant. How can I help you today?";
pub const ERROR_TEXT: &str = "Sorry, something went wrong. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
    Error,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Error => "error",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// The fixed notice shown in place of a reply that failed.
    pub fn error() -> Self {
        Self::new(Role::Error, ERROR_TEXT)
    }
}

/// Ordered transcript of the session, oldest first.
///
/// Always begins with the assistant greeting and never shrinks; only the
/// last message is ever edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self {
            messages: vec![Message::assistant(GREETING)],
        }
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn replace_last(&mut self, message: Message) {
        if let Some(last) = self.messages.last_mut() {
            *last = message;
        }
    }

    pub fn append_to_last(&mut self, fragment: &str) {
        if let Some(last) = self.messages.last_mut() {
            last.content.push_str(fragment);
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_greeting() {
        let state = ConversationState::new();
        assert_eq!(state.messages(), &[Message::assistant(GREETING)]);
    }

    #[test]
    fn append_to_last_grows_only_the_last_message() {
        let mut state = ConversationState::new();
        state.append(Message::user("Hi"));
        state.append(Message::assistant(""));
        state.append_to_last("Hi ");
        state.append_to_last("there!");

        assert_eq!(state.len(), 3);
        assert_eq!(state.messages()[1], Message::user("Hi"));
        assert_eq!(state.last(), Some(&Message::assistant("Hi there!")));
    }

    #[test]
    fn replace_last_keeps_length() {
        let mut state = ConversationState::new();
        state.append(Message::user("Hi"));
        state.append(Message::assistant("Partial"));
        state.replace_last(Message::error());

        assert_eq!(state.len(), 3);
        assert_eq!(state.last(), Some(&Message::new(Role::Error, ERROR_TEXT)));
        assert_eq!(state.messages()[0].content, GREETING);
    }

    #[test]
    fn roles_render_lowercase() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Assistant.to_string(), "assistant");
        assert_eq!(Role::Error.to_string(), "error");
    }
}
