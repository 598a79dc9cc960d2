//! Turns provider content into ordered steps and ingredients through one
//! completion call, with repair and a single corrective retry.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::clock::Clock;
use crate::error::AppError;
use crate::models::{ExtractionResult, RawContent, compute_hash};
use crate::retry::CallPolicy;
use crate::traits::{ChatMessage, CompletionClient, CompletionRequest};

const SYSTEM_PROMPT: &str = "You extract cooking instructions from recipe content. \
Reply with a single JSON object of the form \
{\"steps\": [\"...\"], \"ingredients\": [\"...\"]}. \
Each step is one complete instruction, in cooking order, without numbering. \
Each ingredient is one line with its quantity when known. \
Use only information present in the content; never invent steps.";

/// JSON schema every model reply must satisfy after repair.
pub fn instruction_schema() -> Value {
    schema_with_items(json!({ "type": "string", "minLength": 1 }))
}

/// The schema sent with the completion request.
///
/// Strict structured-output mode rejects string length keywords, so blank
/// items are caught by [`instruction_schema`] after the reply arrives.
pub fn wire_schema() -> Value {
    schema_with_items(json!({ "type": "string" }))
}

fn schema_with_items(items: Value) -> Value {
    json!({
        "type": "object",
        "properties": {
            "steps": {
                "type": "array",
                "items": items.clone(),
                "minItems": 1
            },
            "ingredients": {
                "type": "array",
                "items": items,
                "minItems": 1
            }
        },
        "required": ["steps", "ingredients"],
        "additionalProperties": false
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct Instructions {
    steps: Vec<String>,
    ingredients: Vec<String>,
}

pub struct InstructionExtractor<C: CompletionClient> {
    client: C,
    policy: CallPolicy,
    clock: Arc<dyn Clock>,
    wire_schema: Value,
    validator: jsonschema::Validator,
}

impl<C: CompletionClient> InstructionExtractor<C> {
    pub fn new(client: C, policy: CallPolicy, clock: Arc<dyn Clock>) -> Result<Self, AppError> {
        let schema = instruction_schema();
        let validator = jsonschema::validator_for(&schema)
            .map_err(|e| AppError::ConfigError(format!("invalid instruction schema: {e}")))?;
        Ok(Self {
            client,
            policy,
            clock,
            wire_schema: wire_schema(),
            validator,
        })
    }

    /// Extract instructions from raw content.
    ///
    /// A reply that cannot be repaired into a valid result gets exactly one
    /// corrective follow-up; a second bad reply is `MalformedUpstreamOutput`.
    pub async fn extract(&self, raw: &RawContent) -> Result<ExtractionResult, AppError> {
        let mut request = CompletionRequest {
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(render_content(raw)),
            ],
            schema: self.wire_schema.clone(),
        };

        let reply = self.complete(&request).await?;
        let instructions = match self.parse_reply(&reply) {
            Ok(instructions) => instructions,
            Err(problem) => {
                tracing::warn!(
                    source = %raw.source,
                    %problem,
                    "Unusable completion reply, sending correction"
                );
                request.messages.push(ChatMessage::assistant(reply));
                request.messages.push(ChatMessage::user(format!(
                    "That reply could not be used: {problem}. Reply again with only the JSON object \
                     containing non-empty \"steps\" and \"ingredients\" string arrays."
                )));
                let retry = self.complete(&request).await?;
                self.parse_reply(&retry)
                    .map_err(AppError::MalformedUpstreamOutput)?
            }
        };

        tracing::info!(
            source = %raw.source,
            steps = instructions.steps.len(),
            ingredients = instructions.ingredients.len(),
            "Instructions extracted"
        );

        Ok(ExtractionResult {
            steps: instructions.steps,
            ingredients: instructions.ingredients,
            source_provider: raw.provider,
            source_url_or_id: raw.source.clone(),
            title: raw.title.clone(),
            content_hash: compute_hash(&raw.body),
            extracted_at: self.clock.now(),
        })
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, AppError> {
        self.policy
            .run("completion", || self.client.complete(request))
            .await
    }

    /// Repair a reply and check it against the schema. The error is a short
    /// description of the problem, fed back to the model on retry.
    fn parse_reply(&self, reply: &str) -> Result<Instructions, String> {
        let body = strip_code_fences(reply);
        if body.is_empty() {
            return Err("the reply was empty".to_string());
        }
        let mut value: Value =
            serde_json::from_str(body).map_err(|e| format!("the reply is not valid JSON ({e})"))?;

        for field in ["steps", "ingredients"] {
            if let Some(Value::Array(items)) = value.get_mut(field) {
                repair_items(items);
            }
        }

        let problems: Vec<String> = self
            .validator
            .iter_errors(&value)
            .map(|e| e.to_string())
            .collect();
        if !problems.is_empty() {
            return Err(problems.join("; "));
        }

        serde_json::from_value(value).map_err(|e| e.to_string())
    }
}

fn render_content(raw: &RawContent) -> String {
    let mut out = String::new();
    if let Some(title) = &raw.title {
        out.push_str(&format!("Title: {title}\n"));
    }
    out.push_str(&format!("Source: {}\n", raw.source));
    if !raw.ingredient_hints.is_empty() {
        out.push_str("\nKnown ingredients:\n");
        for line in &raw.ingredient_hints {
            out.push_str(&format!("- {line}\n"));
        }
    }
    out.push_str("\nContent:\n");
    out.push_str(&raw.body);
    out
}

/// Remove a surrounding Markdown code fence, with or without a language tag.
fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Clean string items in place and drop the ones left empty. Non-string items
/// are kept so the schema check reports them.
fn repair_items(items: &mut Vec<Value>) {
    items.retain_mut(|item| match item {
        Value::String(s) => {
            let cleaned = strip_list_marker(s).to_string();
            *s = cleaned;
            !s.is_empty()
        }
        _ => true,
    });
}

/// Strip bullets, `Step N:` prefixes and `N.` / `N)` numbering.
fn strip_list_marker(item: &str) -> &str {
    let mut s = item.trim();
    s = s.trim_start_matches(['-', '*', '•']).trim_start();

    if s.len() > 5 && s.is_char_boundary(5) && s[..5].eq_ignore_ascii_case("step ") {
        let after = &s[5..];
        let digits = after.len() - after.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        if digits > 0 {
            s = after[digits..]
                .trim_start()
                .trim_start_matches([':', '.', ')', '-'])
                .trim_start();
        }
    }

    let digits = s.len() - s.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        let rest = &s[digits..];
        let mut chars = rest.chars();
        if let Some('.' | ')' | ':') = chars.next()
            && chars.next().is_none_or(char::is_whitespace)
        {
            s = rest[1..].trim_start();
        }
    }

    s.trim()
}
