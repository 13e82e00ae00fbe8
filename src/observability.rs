use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("ollama_chat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter =
    Counter::new("ollama_chat.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("ollama_chat.client.request_duration_seconds");

pub(crate) static STREAM_LINES: Counter = Counter::new("ollama_chat.stream.lines");
pub(crate) static STREAM_SKIPPED_LINES: Counter = Counter::new("ollama_chat.stream.skipped_lines");
pub(crate) static STREAM_FRAGMENTS: Counter = Counter::new("ollama_chat.stream.fragments");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("ollama_chat.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("ollama_chat.stream.bytes");
pub(crate) static STREAM_TTFF: Moments = Moments::new("ollama_chat.stream.ttff_seconds");

pub(crate) static HISTORY_SAVES: Counter = Counter::new("ollama_chat.history.saves");
pub(crate) static HISTORY_LOAD_FALLBACKS: Counter =
    Counter::new("ollama_chat.history.load_fallbacks");
pub(crate) static HISTORY_TRIMMED_TURNS: Counter =
    Counter::new("ollama_chat.history.trimmed_turns");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_LINES);
    collector.register_counter(&STREAM_SKIPPED_LINES);
    collector.register_counter(&STREAM_FRAGMENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_moments(&STREAM_TTFF);

    collector.register_counter(&HISTORY_SAVES);
    collector.register_counter(&HISTORY_LOAD_FALLBACKS);
    collector.register_counter(&HISTORY_TRIMMED_TURNS);
}
