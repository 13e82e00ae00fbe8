use serde_json::{Map, Value};

/// The incremental text carried by one streamed record.
///
/// Chat-style endpoints send `{"message": {"content": ".."}}`; generate-style endpoints send
/// `{"response": ".."}`.  When a record carries both, the `message` form wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    /// Text taken from `message.content`.  Absent content is the empty string.
    Message(String),

    /// Text taken from `response`.
    Response(String),

    /// The record carries no text.
    None,
}

impl Delta {
    /// Returns the text of this delta, if it has any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Delta::Message(text) | Delta::Response(text) if !text.is_empty() => Some(text.as_str()),
            _ => None,
        }
    }
}

/// One parsed line of a newline-delimited response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    /// The text fragment carried by the record.
    pub delta: Delta,

    /// True when the record marks the end of the stream.
    pub done: bool,
}

impl StreamRecord {
    /// Parses one line of the stream.
    ///
    /// Returns `None` for lines that are not a JSON object; such lines are noise and must be
    /// skipped by the consumer.
    pub fn parse(line: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(line).ok()?;
        match value {
            Value::Object(object) => Some(Self::from_object(&object)),
            _ => None,
        }
    }

    /// Classifies an already-parsed record.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let delta = match (object.get("message"), object.get("response")) {
            (Some(Value::Object(message)), _) => {
                let content = match message.get("content") {
                    Some(Value::String(content)) => content.clone(),
                    _ => String::new(),
                };
                Delta::Message(content)
            }
            (_, Some(Value::String(response))) => Delta::Response(response.clone()),
            _ => Delta::None,
        };
        let done = object.get("done").is_some_and(is_truthy);
        Self { delta, done }
    }

    /// Returns the non-empty text fragment of this record, if any.
    pub fn fragment(&self) -> Option<&str> {
        self.delta.text()
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
