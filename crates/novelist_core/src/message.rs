//! Message types for completion requests.

use crate::Role;
use serde::{Deserialize, Serialize};

/// A text message in a completion request.
///
/// # Examples
///
/// ```
/// use novelist_core::{Message, Role};
///
/// let message = Message::new(Role::User, "Summarize the novel.");
///
/// assert_eq!(*message.role(), Role::User);
/// assert_eq!(message.content(), "Summarize the novel.");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_getters::Getters)]
pub struct Message {
    /// The role of the message sender
    role: Role,
    /// The message text
    content: String,
}

impl Message {
    /// Creates a new message with the given role and content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}
