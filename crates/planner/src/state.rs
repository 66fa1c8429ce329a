//! Per-request conversation state.

use tripforge_core::message::{Conversation, ConversationId, Message};

/// Everything one planning run accumulates. Never shared between requests.
#[derive(Debug)]
pub struct ConversationState {
    conversation: Conversation,
    context_chars: usize,
    iterations: u32,
    model_calls: u32,
    search_calls: u32,
    search_context: Vec<String>,
}

impl ConversationState {
    /// Start a conversation with system instructions and the rendered request.
    pub fn new(system_prompt: &str, user_prompt: String) -> Self {
        let mut state = Self {
            conversation: Conversation::new(),
            context_chars: 0,
            iterations: 0,
            model_calls: 0,
            search_calls: 0,
            search_context: Vec::new(),
        };
        state.push(Message::system(system_prompt));
        state.push(Message::user(user_prompt));
        state
    }

    pub fn id(&self) -> &ConversationId {
        &self.conversation.id
    }

    pub fn messages(&self) -> &[Message] {
        &self.conversation.messages
    }

    pub fn push(&mut self, message: Message) {
        self.context_chars += message.context_chars();
        self.conversation.push(message);
    }

    /// Running character count of every turn so far.
    pub fn context_chars(&self) -> usize {
        self.context_chars
    }

    /// Completed tool rounds.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn complete_round(&mut self) {
        self.iterations += 1;
    }

    pub fn model_calls(&self) -> u32 {
        self.model_calls
    }

    pub fn record_model_call(&mut self) {
        self.model_calls += 1;
    }

    pub fn search_calls(&self) -> u32 {
        self.search_calls
    }

    /// Count a search that reached the backend and remember what it returned.
    pub fn record_search(&mut self, output: &str) {
        self.search_calls += 1;
        self.search_context.push(output.to_string());
    }

    /// All search output gathered so far, or `None` if there was none.
    pub fn search_context(&self) -> Option<String> {
        (!self.search_context.is_empty()).then(|| self.search_context.join("\n"))
    }
}
