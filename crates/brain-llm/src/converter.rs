//! Converts between [`LlmContext`] and the Gemini wire format.

use brain_core::context::LlmContext;
use brain_core::errors::GatewayError;
use brain_core::ids::ToolCallId;
use brain_core::messages::{
    AssistantContent, AssistantMessage, Message, StopReason, TokenUsage, ToolCallBlock,
};
use brain_core::provider::StreamOptions;
use brain_core::stream::StreamEvent;
use brain_core::tools::ToolDefinition;

use crate::types::{
    FunctionCallData, FunctionDeclaration, FunctionResponseData, GeminiContent, GeminiPart,
    GeminiTool, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
};

/// Build the request body for one `generateContent` call.
pub fn build_request(context: &LlmContext, options: &StreamOptions) -> GenerateContentRequest {
    let system_instruction = context
        .system_instruction
        .as_ref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| GeminiContent {
            role: String::new(),
            parts: vec![GeminiPart::text(s.clone())],
        });

    let generation_config = if options.max_tokens.is_some()
        || options.temperature.is_some()
        || !options.stop_sequences.is_empty()
    {
        Some(GenerationConfig {
            max_output_tokens: options.max_tokens,
            temperature: options.temperature,
            stop_sequences: options.stop_sequences.clone(),
        })
    } else {
        None
    };

    GenerateContentRequest {
        contents: convert_messages(&context.messages),
        system_instruction,
        tools: convert_tools(&context.tools),
        generation_config,
    }
}

/// Convert conversation history to Gemini contents.
///
/// Consecutive tool results are folded into a single `user` content so that
/// every `functionCall` turn is answered by one `functionResponse` turn.
pub fn convert_messages(messages: &[Message]) -> Vec<GeminiContent> {
    let mut contents: Vec<GeminiContent> = Vec::new();
    let mut previous_was_tool_result = false;

    for message in messages {
        match message {
            Message::User(user) => {
                previous_was_tool_result = false;
                if user.text.is_empty() {
                    continue;
                }
                contents.push(GeminiContent {
                    role: "user".into(),
                    parts: vec![GeminiPart::text(user.text.clone())],
                });
            }
            Message::Assistant(assistant) => {
                previous_was_tool_result = false;
                let parts: Vec<GeminiPart> = assistant
                    .content
                    .iter()
                    .filter_map(|block| match block {
                        AssistantContent::Text { text } if !text.is_empty() => {
                            Some(GeminiPart::text(text.clone()))
                        }
                        AssistantContent::Text { .. } => None,
                        AssistantContent::ToolCall(tc) => Some(GeminiPart {
                            function_call: Some(FunctionCallData {
                                name: tc.name.clone(),
                                args: tc.arguments.clone(),
                            }),
                            thought_signature: tc.thought_signature.clone(),
                            ..Default::default()
                        }),
                    })
                    .collect();
                if !parts.is_empty() {
                    contents.push(GeminiContent {
                        role: "model".into(),
                        parts,
                    });
                }
            }
            Message::ToolResult(result) => {
                let key = if result.is_error { "error" } else { "result" };
                let mut response = serde_json::Map::new();
                response.insert(key.to_string(), serde_json::Value::String(result.content.clone()));
                let part = GeminiPart {
                    function_response: Some(FunctionResponseData {
                        name: result.tool_name.clone(),
                        response: serde_json::Value::Object(response),
                    }),
                    ..Default::default()
                };
                match contents.last_mut() {
                    Some(last) if previous_was_tool_result => last.parts.push(part),
                    _ => contents.push(GeminiContent {
                        role: "user".into(),
                        parts: vec![part],
                    }),
                }
                previous_was_tool_result = true;
            }
        }
    }

    contents
}

/// Convert tool definitions to Gemini function declarations.
pub fn convert_tools(tools: &[ToolDefinition]) -> Vec<GeminiTool> {
    if tools.is_empty() {
        return Vec::new();
    }
    let declarations = tools
        .iter()
        .map(|tool| FunctionDeclaration {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: sanitize_schema(&tool.parameters_schema),
            response: tool.output_schema.as_ref().map(sanitize_schema),
        })
        .collect();
    vec![GeminiTool {
        function_declarations: declarations,
    }]
}

/// Remove schema keywords Gemini rejects (`additionalProperties`, `$schema`).
pub fn sanitize_schema(schema: &serde_json::Value) -> serde_json::Value {
    match schema {
        serde_json::Value::Object(map) => {
            let mut cleaned = serde_json::Map::new();
            for (key, value) in map {
                if key == "additionalProperties" || key == "$schema" {
                    continue;
                }
                cleaned.insert(key.clone(), sanitize_schema(value));
            }
            serde_json::Value::Object(cleaned)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(sanitize_schema).collect())
        }
        other => other.clone(),
    }
}

/// Turn a complete response into the provider event sequence.
pub fn response_to_events(
    response: GenerateContentResponse,
) -> Result<Vec<StreamEvent>, GatewayError> {
    let usage = response.usage_metadata.as_ref().map(|u| TokenUsage {
        input_tokens: u.prompt_token_count,
        output_tokens: u.candidates_token_count,
    });

    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates returned".into());
        return Err(GatewayError::Blocked(reason));
    };

    let finish_reason = candidate.finish_reason.unwrap_or_default();
    if finish_reason == "SAFETY" || finish_reason == "PROHIBITED_CONTENT" {
        return Err(GatewayError::Blocked(finish_reason));
    }

    let mut events = vec![StreamEvent::Start];
    let mut content = Vec::new();

    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        if part.thought == Some(true) {
            continue;
        }
        if let Some(fc) = part.function_call {
            let tool_call = ToolCallBlock {
                id: ToolCallId::new(),
                name: fc.name,
                arguments: match fc.args {
                    serde_json::Value::Null => serde_json::json!({}),
                    args => args,
                },
                thought_signature: part.thought_signature,
            };
            events.push(StreamEvent::ToolCallEnd {
                tool_call: tool_call.clone(),
            });
            content.push(AssistantContent::ToolCall(tool_call));
        } else if let Some(text) = part.text {
            if text.is_empty() {
                continue;
            }
            events.push(StreamEvent::TextDelta {
                delta: text.clone(),
            });
            content.push(AssistantContent::Text { text });
        }
    }

    let has_tool_calls = content
        .iter()
        .any(|c| matches!(c, AssistantContent::ToolCall(_)));
    let stop_reason = if has_tool_calls {
        StopReason::ToolUse
    } else if finish_reason == "MAX_TOKENS" {
        StopReason::MaxTokens
    } else {
        StopReason::EndTurn
    };

    events.push(StreamEvent::Done {
        message: AssistantMessage {
            content,
            usage,
            stop_reason: Some(stop_reason.clone()),
        },
        stop_reason,
    });
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_call(name: &str) -> ToolCallBlock {
        ToolCallBlock {
            id: ToolCallId::new(),
            name: name.into(),
            arguments: serde_json::json!({"x": 1}),
            thought_signature: Some("sig".into()),
        }
    }

    #[test]
    fn request_includes_system_and_tools() {
        let context = LlmContext {
            system_instruction: Some("be brief".into()),
            messages: vec![Message::user_text("hi")],
            tools: vec![ToolDefinition {
                name: "echo".into(),
                description: "echo input".into(),
                parameters_schema: serde_json::json!({
                    "$schema": "http://json-schema.org/draft-07/schema#",
                    "type": "object",
                    "properties": {"x": {"type": "integer"}},
                    "additionalProperties": false
                }),
                output_schema: None,
            }],
        };
        let body = serde_json::to_value(build_request(&context, &StreamOptions::default())).unwrap();

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["contents"][0]["role"], "user");
        let decl = &body["tools"][0]["functionDeclarations"][0];
        assert_eq!(decl["name"], "echo");
        assert!(decl["parameters"].get("additionalProperties").is_none());
        assert!(decl["parameters"].get("$schema").is_none());
        assert!(decl.get("response").is_none());
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn declared_output_schema_becomes_response() {
        let tools = convert_tools(&[ToolDefinition {
            name: "get_title".into(),
            description: "window title".into(),
            parameters_schema: serde_json::json!({"type": "object", "properties": {}}),
            output_schema: Some(serde_json::json!({
                "$schema": "http://json-schema.org/draft-07/schema#",
                "type": "string"
            })),
        }]);
        let json = serde_json::to_value(&tools).unwrap();
        let decl = &json[0]["functionDeclarations"][0];

        assert_eq!(decl["response"], serde_json::json!({"type": "string"}));
    }

    #[test]
    fn tool_results_fold_into_one_turn() {
        let a = tool_call("a");
        let b = tool_call("b");
        let messages = vec![
            Message::user_text("go"),
            Message::Assistant(AssistantMessage {
                content: vec![
                    AssistantContent::ToolCall(a.clone()),
                    AssistantContent::ToolCall(b.clone()),
                ],
                usage: None,
                stop_reason: Some(StopReason::ToolUse),
            }),
            Message::tool_result(a.id, "a", "one", false),
            Message::tool_result(b.id, "b", "timed out", true),
        ];
        let contents = convert_messages(&messages);

        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1].role, "model");
        assert_eq!(contents[1].parts[0].thought_signature.as_deref(), Some("sig"));
        assert_eq!(contents[2].parts.len(), 2);
        let second = contents[2].parts[1].function_response.as_ref().unwrap();
        assert_eq!(second.name, "b");
        assert_eq!(second.response["error"], "timed out");
    }

    #[test]
    fn response_with_function_call() {
        let response: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "thinking out loud", "thought": true},
                    {"functionCall": {"name": "echo", "args": {"x": 1}}, "thoughtSignature": "abc"}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 3}
        }))
        .unwrap();

        let events = response_to_events(response).unwrap();
        assert!(matches!(events[0], StreamEvent::Start));
        let StreamEvent::ToolCallEnd { tool_call } = &events[1] else {
            panic!("expected tool call");
        };
        assert_eq!(tool_call.name, "echo");
        assert_eq!(tool_call.thought_signature.as_deref(), Some("abc"));
        let StreamEvent::Done { message, stop_reason } = &events[2] else {
            panic!("expected done");
        };
        assert_eq!(*stop_reason, StopReason::ToolUse);
        assert_eq!(message.usage.as_ref().unwrap().input_tokens, 10);
        assert!(message.text_content().is_empty());
    }

    #[test]
    fn response_with_text() {
        let response: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "all done"}]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        let events = response_to_events(response).unwrap();
        assert_eq!(events.len(), 3);
        let StreamEvent::Done { message, stop_reason } = &events[2] else {
            panic!("expected done");
        };
        assert_eq!(*stop_reason, StopReason::EndTurn);
        assert_eq!(message.text_content(), "all done");
    }

    #[test]
    fn blocked_responses_are_errors() {
        let response: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        assert!(matches!(response_to_events(response), Err(GatewayError::Blocked(_))));

        let response: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"finishReason": "SAFETY"}]
        }))
        .unwrap();
        assert!(matches!(response_to_events(response), Err(GatewayError::Blocked(_))));
    }
}
