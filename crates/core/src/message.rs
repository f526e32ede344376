//! Message and message-log domain types.
//!
//! These are the values that flow through the whole system:
//! the user asks a question → the agent appends directives → the provider
//! proposes assistant messages → tools answer with function results.
//!
//! The serialized shape is the chat-completions `functions` protocol
//! (`{"role": "function", "name": ..., "content": ...}`), so the same
//! values are sent to the provider and written to the run log.

use serde::{Deserialize, Serialize};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// Directives injected by the agent loop
    System,
    /// The language model
    Assistant,
    /// Tool execution result
    Function,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::System => "system",
            Role::Assistant => "assistant",
            Role::Function => "function",
        };
        f.write_str(s)
    }
}

/// A function call proposed by the model.
///
/// `arguments` is the raw text the model produced. It is untrusted and
/// only parsed by the function invoker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as raw JSON-like text
    #[serde(default)]
    pub arguments: String,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    User {
        content: String,
    },
    System {
        content: String,
    },
    Assistant {
        #[serde(default)]
        content: Option<String>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        function_call: Option<FunctionCall>,
    },
    Function {
        /// The tool that produced this result
        name: String,
        content: String,
    },
}

impl Message {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    /// Create a plain-text assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: Some(content.into()),
            function_call: None,
        }
    }

    /// Create an assistant message proposing a function call.
    pub fn function_call(
        content: Option<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Message::Assistant {
            content,
            function_call: Some(FunctionCall::new(name, arguments)),
        }
    }

    /// Create a function result message.
    pub fn function_result(name: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Function {
            name: name.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Message::User { .. } => Role::User,
            Message::System { .. } => Role::System,
            Message::Assistant { .. } => Role::Assistant,
            Message::Function { .. } => Role::Function,
        }
    }

    /// The text content, if any.
    pub fn content(&self) -> Option<&str> {
        match self {
            Message::User { content }
            | Message::System { content }
            | Message::Function { content, .. } => Some(content),
            Message::Assistant { content, .. } => content.as_deref(),
        }
    }

    /// The proposed function call of an assistant message.
    pub fn proposed_call(&self) -> Option<&FunctionCall> {
        match self {
            Message::Assistant { function_call, .. } => function_call.as_ref(),
            _ => None,
        }
    }
}

/// An ordered, append-only sequence of messages.
///
/// Entries are never mutated or removed once pushed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Content of the most recent assistant message that has any.
    pub fn latest_assistant_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role() == Role::Assistant)
            .find_map(|m| m.content())
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

impl From<Vec<Message>> for MessageLog {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}
