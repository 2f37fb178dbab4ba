//! The agent's scripted lines.

/// Instructions for the conversational turn.
pub const INSURANCE_SYSTEM_PROMPT: &str = "You are a helpful insurance policy assistant. \
You help users understand their healthcare insurance policies. \
Keep responses concise and clear. Ask clarifying questions when needed. \
Always be professional and empathetic.";

/// What the agent says and how it is instructed.
#[derive(Debug, Clone)]
pub struct AgentScript {
    system_prompt: String,
}

impl Default for AgentScript {
    fn default() -> Self {
        Self::insurance()
    }
}

impl AgentScript {
    /// The insurance-assistant persona.
    pub fn insurance() -> Self {
        Self {
            system_prompt: INSURANCE_SYSTEM_PROMPT.to_string(),
        }
    }

    /// The opening line spoken to a caller.
    pub fn greeting_for(&self, phone_number: &str) -> String {
        format!(
            "Hello! I'm your insurance assistant. I see you're calling from {}. \
             How can I help you with your insurance policy today?",
            phone_number
        )
    }

    /// Instructions passed to [`crate::ChatService::complete`] for the
    /// agent's conversational turns.
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }
}
