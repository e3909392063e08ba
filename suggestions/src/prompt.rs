//! Prompt assembly.
//!
//! A prompt is a system instruction block plus the ordered chat turns. The
//! instruction block is built from sections appended in a fixed order:
//! persona and output contract, regenerate directive, writing style, and
//! retrieved examples.

use std::fmt::Write as _;

use replykit_conversations::RetrievedExample;

use crate::types::ChatTurn;

const DEFAULT_PERSONA: &str = "You are an assistant that drafts engaging, personal replies \
for a creator chatting with their fans. Replies should feel authentic and conversational, \
and should keep the conversation going.";

/// A fully assembled request for the completion client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// System instructions.
    pub instructions: String,

    /// History, oldest first, ending with the message to answer.
    pub turns: Vec<ChatTurn>,
}

/// Builds prompts from a message, its history, and retrieved examples.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    persona: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            persona: DEFAULT_PERSONA.to_string(),
        }
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the opening persona paragraph.
    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    /// Assemble the prompt. `num_suggestions` below 1 is treated as 1.
    pub fn build(
        &self,
        message: &str,
        history: &[ChatTurn],
        examples: &[RetrievedExample],
        style: &str,
        num_suggestions: usize,
        is_regenerate: bool,
    ) -> Prompt {
        let count = num_suggestions.max(1);
        let mut instructions = String::new();

        instructions.push_str(&self.persona);
        instructions.push_str("\n\n");
        instructions.push_str(&output_contract(count));

        if is_regenerate {
            let _ = write!(
                instructions,
                "\n\nIMPORTANT: This is a regeneration request. Give {count} suggestions that are \
                 clearly different from any you gave before, with new approaches and tones."
            );
        }

        let style = style.trim();
        if !style.is_empty() {
            let _ = write!(
                instructions,
                "\n\nIMPORTANT: Apply this writing style to every message you write: {style}"
            );
        }

        if !examples.is_empty() {
            instructions.push_str("\n\nPast conversations similar to this one that went well:");
            for (i, example) in examples.iter().enumerate() {
                push_example(&mut instructions, i + 1, example);
            }
            instructions.push_str(
                "\n\nUse these examples as inspiration for tone, style and content. Reuse \
                 phrases and themes from them where they fit the current conversation.",
            );
        }

        let mut turns = Vec::with_capacity(history.len() + 1);
        turns.extend_from_slice(history);
        turns.push(ChatTurn::user(format!(
            "Suggest {count} different replies to this message: \"{message}\""
        )));

        Prompt {
            instructions,
            turns,
        }
    }
}

fn output_contract(count: usize) -> String {
    format!(
        r#"Write {count} different suggested replies. Each suggestion is either a single message or a sequence of 2-3 short connected messages sent one after another.

Respond with JSON only, in exactly this shape:
{{
  "suggestions": [
    {{"kind": "single", "messages": ["A complete single message"]}},
    {{"kind": "multi", "messages": ["First message", "Follow-up message", "Optional third message"]}}
  ]
}}

Return exactly {count} suggestions. Mix single and multi suggestions. In a multi suggestion each message must follow naturally from the previous one."#
    )
}

fn push_example(out: &mut String, number: usize, example: &RetrievedExample) {
    let record = &example.record;
    let _ = write!(out, "\n\nExample {number}:\nFan: \"{}\"", record.fan_message);

    if record.creator_responses.is_empty() {
        out.push_str("\nYou: \"(No response recorded)\"");
        return;
    }

    out.push_str("\nYou:");
    for (i, response) in record.creator_responses.iter().enumerate() {
        let _ = write!(out, "\n  Message {}: \"{response}\"", i + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use replykit_conversations::ConversationRecord;

    fn example(message: &str, responses: &[&str]) -> RetrievedExample {
        RetrievedExample {
            record: ConversationRecord::new(
                message,
                responses.iter().map(|r| r.to_string()).collect(),
                vec![1.0],
            ),
            similarity: 0.9,
        }
    }

    #[test]
    fn test_minimal_prompt() {
        let prompt = PromptBuilder::new().build("hey you", &[], &[], "", 3, false);

        assert!(prompt.instructions.contains("Write 3 different suggested replies"));
        assert!(prompt.instructions.contains(r#""suggestions""#));
        assert!(prompt.instructions.contains(r#""kind": "multi""#));
        assert!(!prompt.instructions.contains("IMPORTANT"));
        assert!(!prompt.instructions.contains("Example 1"));
        assert_eq!(
            prompt.turns,
            vec![ChatTurn::user(
                "Suggest 3 different replies to this message: \"hey you\""
            )]
        );
    }

    #[test]
    fn test_history_passes_through_before_new_message() {
        let history = vec![
            ChatTurn::user("hi"),
            ChatTurn::assistant("hey! how's your day?"),
            ChatTurn::user("good"),
        ];
        let prompt = PromptBuilder::new().build("what are you up to", &history, &[], "", 2, false);

        assert_eq!(prompt.turns.len(), 4);
        assert_eq!(&prompt.turns[..3], history.as_slice());
        assert!(prompt.turns[3].content.contains("what are you up to"));
    }

    #[test]
    fn test_style_directive() {
        let prompt = PromptBuilder::new().build("hi", &[], &[], "  all lowercase  ", 3, false);
        assert!(
            prompt
                .instructions
                .contains("Apply this writing style to every message you write: all lowercase")
        );
    }

    #[test]
    fn test_examples_keep_message_structure() {
        let examples = vec![
            example("hey cutie", &["hiii", "missed you"]),
            example("you up?", &[]),
        ];
        let prompt = PromptBuilder::new().build("hey", &[], &examples, "", 3, false);

        assert!(prompt.instructions.contains(
            "Example 1:\nFan: \"hey cutie\"\nYou:\n  Message 1: \"hiii\"\n  Message 2: \"missed you\""
        ));
        assert!(
            prompt
                .instructions
                .contains("Example 2:\nFan: \"you up?\"\nYou: \"(No response recorded)\"")
        );
    }

    #[test]
    fn test_regenerate_directive() {
        let builder = PromptBuilder::new();
        let first = builder.build("hi", &[], &[], "", 3, false);
        let again = builder.build("hi", &[], &[], "", 3, true);

        assert!(!first.instructions.contains("regeneration request"));
        assert!(again.instructions.contains("regeneration request"));
        assert_eq!(first.turns, again.turns);
    }

    #[test]
    fn test_build_is_deterministic() {
        let builder = PromptBuilder::new();
        let examples = vec![example("a", &["b"])];
        assert_eq!(
            builder.build("hi", &[], &examples, "warm", 3, true),
            builder.build("hi", &[], &examples, "warm", 3, true)
        );
    }

    #[test]
    fn test_zero_count_asks_for_one() {
        let prompt = PromptBuilder::new().build("hi", &[], &[], "", 0, false);
        assert!(prompt.instructions.contains("Write 1 different suggested replies"));
    }
}
