//! Prompt assembly.
//!
//! A [`PromptTemplate`] pairs a system instruction template with a human
//! template (plus optional extra turns in between) and the declared set of
//! input variables that must be bound before a model call. Templates are
//! Handlebars strings rendered in strict mode, so binding with a missing
//! variable fails at render time with the engine's own error.

use handlebars::Handlebars;
use serde_json::Value;

use crate::error::ConfigError;
use crate::types::{Message, Role};

/// System instruction for retrieval-grounded answers.
pub const GROUNDED_SYSTEM_PROMPT: &str = "You are an insurance plan assistant. \
Use the retrieved context of insurance plan documents to answer the customer's question. \
If you don't know the answer, just say that you don't know. \
Use three sentences maximum and keep the answer concise.";

/// Human turn for retrieval-grounded answers.
pub const GROUNDED_HUMAN_TEMPLATE: &str = "Question: {{query}}\nContext: {{context}}\nAnswer: ";

/// Default human turn when none is supplied.
pub const DEFAULT_HUMAN_TEMPLATE: &str = "user query: {{query}}";

/// A reusable two-role prompt with declared input variables.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    system: String,
    human: String,
    extra_messages: Vec<(Role, String)>,
    input_variables: Vec<String>,
}

/// Builder for [`PromptTemplate`]. `build` validates that every declared
/// input variable is referenced by at least one template.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system: String,
    human: String,
    extra_messages: Vec<(Role, String)>,
    input_variables: Vec<String>,
}

impl PromptTemplate {
    /// Start building a prompt from a system instruction template.
    ///
    /// Defaults: human turn `"user query: {{query}}"`, input variables
    /// `["query"]`, no extra turns.
    pub fn builder(system_template: impl Into<String>) -> PromptBuilder {
        PromptBuilder {
            system: system_template.into(),
            human: DEFAULT_HUMAN_TEMPLATE.to_string(),
            extra_messages: Vec::new(),
            input_variables: vec!["query".to_string()],
        }
    }

    /// The declared input variable names.
    pub fn input_variables(&self) -> &[String] {
        &self.input_variables
    }

    /// Render the prompt into role-tagged messages: system first, extra
    /// turns in insertion order, human last.
    pub fn bind(&self, variables: &Value) -> Result<Vec<Message>, ConfigError> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        // Prompts are plain text, not HTML.
        handlebars.register_escape_fn(handlebars::no_escape);

        let render = |template: &str| -> Result<String, ConfigError> {
            handlebars
                .render_template(template, variables)
                .map_err(|e| ConfigError::Invalid {
                    message: format!("Prompt render error: {e}"),
                })
        };

        let mut messages = Vec::with_capacity(self.extra_messages.len() + 2);
        messages.push(Message::system(render(&self.system)?));
        for (role, template) in &self.extra_messages {
            messages.push(Message::new(*role, render(template)?));
        }
        messages.push(Message::user(render(&self.human)?));
        Ok(messages)
    }
}

impl PromptBuilder {
    /// Replace the human turn template.
    pub fn human(mut self, template: impl Into<String>) -> Self {
        self.human = template.into();
        self
    }

    /// Append an extra turn between the system and human roles. Turns keep
    /// their insertion order.
    pub fn message(mut self, role: Role, template: impl Into<String>) -> Self {
        self.extra_messages.push((role, template.into()));
        self
    }

    /// Replace the declared input variables.
    pub fn input_variables(mut self, variables: &[&str]) -> Self {
        self.input_variables = variables.iter().map(|v| v.to_string()).collect();
        self
    }

    /// Validate and build the template.
    ///
    /// A declared input variable that no template references is a
    /// configuration error, caught here rather than at first use.
    pub fn build(self) -> Result<PromptTemplate, ConfigError> {
        for variable in &self.input_variables {
            let reference = format!("{{{{{variable}}}}}");
            let referenced = self.system.contains(&reference)
                || self.human.contains(&reference)
                || self
                    .extra_messages
                    .iter()
                    .any(|(_, template)| template.contains(&reference));
            if !referenced {
                return Err(ConfigError::UnreferencedVariable {
                    variable: variable.clone(),
                });
            }
        }

        Ok(PromptTemplate {
            system: self.system,
            human: self.human,
            extra_messages: self.extra_messages,
            input_variables: self.input_variables,
        })
    }
}

/// The assistant's retrieval-grounded answer prompt.
pub fn grounded_answer_prompt() -> Result<PromptTemplate, ConfigError> {
    PromptTemplate::builder(GROUNDED_SYSTEM_PROMPT)
        .human(GROUNDED_HUMAN_TEMPLATE)
        .input_variables(&["query", "context"])
        .build()
}
