use anyhow::Result;
use log::{debug, error, warn};
use ollama_rs::Ollama;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::parameters::{KeepAlive, TimeUnit};
use ollama_rs::models::ModelOptions;
use serde::Deserialize;

use super::{ModelEvent, ToolInvocation, ToolSpec, strip_code_fences};
use crate::session::{Message, MessageRole};

const REPLY_FORMAT: &str = "Answer with exactly one JSON object and nothing else. \
     To call a tool, answer {\"tool\": <tool name>, \"arguments\": <arguments object>}. \
     To talk to the user, answer {\"reply\": <text>}.";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StructuredReply {
    Tool {
        tool: String,
        #[serde(default)]
        arguments: serde_json::Value,
    },
    Reply {
        reply: String,
    },
}

/// System prompt plus the tool catalog and the answer format.
pub(super) fn render_system(system_prompt: &str, tools: &[ToolSpec]) -> String {
    if tools.is_empty() {
        return format!("{}\n\n{}", system_prompt, REPLY_FORMAT);
    }
    let catalog = serde_json::to_string_pretty(tools).unwrap_or_else(|_| "[]".to_string());
    format!(
        "{}\n\nTools you may call:\n{}\n\n{}",
        system_prompt, catalog, REPLY_FORMAT
    )
}

/// The conversation as a plain transcript, oldest first.
pub(super) fn render_transcript(history: &[Message]) -> String {
    let mut out = String::new();
    for message in history {
        let speaker = match message.role {
            MessageRole::User => "user".to_string(),
            MessageRole::Assistant => "assistant".to_string(),
            MessageRole::System => "system".to_string(),
            MessageRole::Function => match &message.name {
                Some(name) => format!("tool {}", name),
                None => "tool".to_string(),
            },
        };
        out.push_str(&speaker);
        out.push_str(": ");
        out.push_str(message.content.trim());
        out.push('\n');
    }
    out.push_str("assistant:");
    out
}

/// Anything that is not one of the two JSON shapes is taken as plain text.
pub(super) fn parse_reply(raw: &str) -> ModelEvent {
    let body = strip_code_fences(raw);
    match serde_json::from_str::<StructuredReply>(body) {
        Ok(StructuredReply::Tool { tool, arguments }) => {
            let arguments = if arguments.is_null() {
                "{}".to_string()
            } else {
                arguments.to_string()
            };
            ModelEvent::ToolCall(ToolInvocation {
                name: tool,
                arguments,
            })
        }
        Ok(StructuredReply::Reply { reply }) => ModelEvent::TextDelta(reply),
        Err(e) => {
            warn!("Ollama answer was not structured, using it as text: {}", e);
            ModelEvent::TextDelta(raw.trim().to_string())
        }
    }
}

pub(super) async fn complete(
    client: &Ollama,
    model: &str,
    history: &[Message],
    system_prompt: &str,
    tools: &[ToolSpec],
) -> Result<ModelEvent> {
    let system = render_system(system_prompt, tools);
    let prompt = render_transcript(history);
    debug!(
        "Ollama call using model={} prompt_len={} tools={}",
        model,
        prompt.len(),
        tools.len()
    );
    let options = ModelOptions::default().temperature(0.001);
    let res = client
        .generate(
            GenerationRequest::new(model.to_string(), prompt)
                .options(options)
                .system(system)
                .keep_alive(KeepAlive::Until {
                    time: 30,
                    unit: TimeUnit::Minutes,
                }),
        )
        .await
        .map_err(|e| {
            error!("Ollama generate failed: {}", e);
            e
        })?;
    debug!("Ollama response length={}", res.response.len());
    Ok(parse_reply(&res.response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_answers_become_tool_calls() {
        let raw = "```json\n{\"tool\": \"add_sets\", \"arguments\": {\"exercise\": \"squat\"}}\n```";
        match parse_reply(raw) {
            ModelEvent::ToolCall(call) => {
                assert_eq!(call.name, "add_sets");
                let args: serde_json::Value = serde_json::from_str(&call.arguments).unwrap();
                assert_eq!(args, json!({"exercise": "squat"}));
            }
            other => panic!("expected a tool call, got {other:?}"),
        }

        match parse_reply("{\"tool\": \"view_all_workouts\"}") {
            ModelEvent::ToolCall(call) => assert_eq!(call.arguments, "{}"),
            other => panic!("expected a tool call, got {other:?}"),
        }
    }

    #[test]
    fn replies_and_plain_text_become_text() {
        assert_eq!(
            parse_reply("{\"reply\": \"Nice work!\"}"),
            ModelEvent::TextDelta("Nice work!".into())
        );
        assert_eq!(
            parse_reply("  Keep going.  "),
            ModelEvent::TextDelta("Keep going.".into())
        );
    }

    #[test]
    fn the_prompt_carries_tools_and_history() {
        let tools = vec![ToolSpec {
            name: "view_all_workouts".into(),
            description: "List workouts".into(),
            parameters: json!({"type": "object", "properties": {}}),
        }];
        let system = render_system("Be brief.", &tools);
        assert!(system.starts_with("Be brief."));
        assert!(system.contains("\"view_all_workouts\""));
        assert!(system.contains("{\"reply\": <text>}"));

        let history = vec![
            Message::user("show my workouts"),
            Message::function("view_all_workouts", "listed 2 workouts"),
        ];
        assert_eq!(
            render_transcript(&history),
            "user: show my workouts\ntool view_all_workouts: listed 2 workouts\nassistant:"
        );
    }
}
