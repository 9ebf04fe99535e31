//! Bridge wire messages
//!
//! Process messages exchanged with the script execution context. Decoding is
//! tolerant: anything malformed yields `None` and the message is dropped.

use serde_json::Value;

use crate::engine::{FrameId, Point, ProcessMessage};

/// Script context -> host: focus moved, args `[editable, caret_x?, caret_y?]`
pub const FOCUSED_NODE_CHANGED: &str = "FocusedNodeChanged";

/// Script context -> host: channel call, args `[function, argument, callback_token]`
pub const CHANNEL_INVOCATION: &str = "JSChannel";

/// Script context -> host: evaluation outcome, args `[correlation, is_error, json]`
pub const EVALUATION_RESULT: &str = "EvaluateCallback";

/// Host -> script context: complete a channel call, args `[token, is_error, result]`
pub const EXECUTE_CHANNEL_CALLBACK: &str = "ExecuteJsCallback";

/// Outcome of one script evaluation: the value, or the thrown error's message
pub type ScriptOutcome = std::result::Result<Value, String>;

#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    FocusedNodeChanged {
        editable: bool,
        caret: Option<Point>,
    },
    ChannelInvocation {
        function: String,
        argument: String,
        callback_token: String,
    },
    EvaluationResult {
        correlation: u64,
        outcome: ScriptOutcome,
    },
}

impl InboundMessage {
    pub fn decode(message: &ProcessMessage) -> Option<Self> {
        let args = &message.args;
        match message.name.as_str() {
            FOCUSED_NODE_CHANGED => {
                let editable = args.first()?.as_bool()?;
                let caret = match (arg_i32(args, 1), arg_i32(args, 2)) {
                    (Some(x), Some(y)) => Some(Point::new(x, y)),
                    _ => None,
                };
                Some(InboundMessage::FocusedNodeChanged { editable, caret })
            }
            CHANNEL_INVOCATION => {
                let function = args.first()?.as_str()?;
                if function.is_empty() {
                    return None;
                }
                Some(InboundMessage::ChannelInvocation {
                    function: function.to_string(),
                    argument: args.get(1).map(text_of).unwrap_or_default(),
                    callback_token: args.get(2).map(text_of).unwrap_or_default(),
                })
            }
            EVALUATION_RESULT => {
                let correlation = parse_u64(args.first()?)?;
                let is_error = args.get(1).and_then(Value::as_bool).unwrap_or(false);
                let payload = args.get(2).and_then(Value::as_str).unwrap_or("null");
                let value =
                    serde_json::from_str(payload).unwrap_or_else(|_| Value::String(payload.to_string()));
                let outcome = if is_error {
                    Err(match value {
                        Value::String(text) => text,
                        other => other.to_string(),
                    })
                } else {
                    Ok(value)
                };
                Some(InboundMessage::EvaluationResult {
                    correlation,
                    outcome,
                })
            }
            _ => None,
        }
    }
}

/// Message completing the script-side callback registered under `token`
pub fn channel_callback(token: i32, is_error: bool, result: &str) -> ProcessMessage {
    ProcessMessage::new(
        EXECUTE_CHANNEL_CALLBACK,
        vec![Value::from(token), Value::from(is_error), Value::from(result)],
    )
}

/// Callback tokens are small integers minted by the script side
pub fn parse_callback_token(token: &str) -> Option<i32> {
    token.trim().parse().ok()
}

pub fn parse_frame_id(frame: &str) -> Option<FrameId> {
    frame.trim().parse().ok()
}

fn parse_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn arg_i32(args: &[Value], index: usize) -> Option<i32> {
    args.get(index)?.as_i64()?.try_into().ok()
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
