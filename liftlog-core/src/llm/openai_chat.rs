use anyhow::{Result, anyhow};
use log::{debug, error};
use openai::Credentials;
use openai::chat::{
    ChatCompletion, ChatCompletionDelta, ChatCompletionFunctionDefinition, ChatCompletionMessage,
    ChatCompletionMessageRole,
};
use tokio::sync::mpsc;

use super::{ModelEvent, ToolInvocation, ToolSpec};
use crate::session::{Message, MessageRole};

fn to_chat_message(message: &Message) -> ChatCompletionMessage {
    let role = match message.role {
        MessageRole::User => ChatCompletionMessageRole::User,
        MessageRole::Assistant => ChatCompletionMessageRole::Assistant,
        MessageRole::Function => ChatCompletionMessageRole::Function,
        MessageRole::System => ChatCompletionMessageRole::System,
    };
    ChatCompletionMessage {
        role,
        content: Some(message.content.clone()),
        name: message.name.clone(),
        function_call: None,
        tool_call_id: None,
        tool_calls: None,
    }
}

pub(super) async fn open_stream(
    model: &str,
    credentials: Credentials,
    history: &[Message],
    system_prompt: &str,
    tools: &[ToolSpec],
) -> Result<mpsc::Receiver<ChatCompletionDelta>> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(to_chat_message(&Message::system(system_prompt)));
    messages.extend(history.iter().map(to_chat_message));

    let functions: Vec<ChatCompletionFunctionDefinition> = tools
        .iter()
        .map(|t| ChatCompletionFunctionDefinition {
            name: t.name.clone(),
            description: Some(t.description.clone()),
            parameters: Some(t.parameters.clone()),
        })
        .collect();

    debug!(
        "Opening chat stream model={} messages={} functions={}",
        model,
        messages.len(),
        functions.len()
    );
    ChatCompletion::builder(model, messages)
        .functions(functions)
        .credentials(credentials)
        .create_stream()
        .await
        .map_err(|e| {
            error!("OpenAI ChatCompletion.create_stream() failed: {}", e);
            anyhow!("Language model request failed: {}", e)
        })
}

/// Translates raw deltas into [`ModelEvent`]s. Function-call fragments are
/// accumulated and sent as a single `ToolCall` once the stream ends.
pub(super) async fn pump(
    mut deltas: mpsc::Receiver<ChatCompletionDelta>,
    tx: mpsc::Sender<Result<ModelEvent>>,
) {
    let mut call_name = String::new();
    let mut call_arguments = String::new();
    let mut saw_call = false;

    while let Some(delta) = deltas.recv().await {
        for choice in delta.choices {
            if let Some(call) = choice.delta.function_call {
                saw_call = true;
                if let Some(name) = call.name {
                    call_name.push_str(&name);
                }
                if let Some(arguments) = call.arguments {
                    call_arguments.push_str(&arguments);
                }
            }
            if let Some(content) = choice.delta.content {
                if content.is_empty() {
                    continue;
                }
                if tx.send(Ok(ModelEvent::TextDelta(content))).await.is_err() {
                    debug!("Model stream receiver dropped");
                    return;
                }
            }
        }
    }

    if saw_call {
        debug!(
            "Model selected function name={} arguments_len={}",
            call_name,
            call_arguments.len()
        );
        let invocation = ToolInvocation {
            name: call_name,
            arguments: call_arguments,
        };
        if tx.send(Ok(ModelEvent::ToolCall(invocation))).await.is_err() {
            return;
        }
    }
    let _ = tx.send(Ok(ModelEvent::Finished)).await;
}
