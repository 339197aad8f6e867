//! Client event envelope and integer type tags.
//!
//! Events cross the wire with an integer `type` tag — clients switch on
//! the number, not a string. [`EventType`] keeps the tags as an enum with
//! explicit discriminants and serializes to/from the raw integer.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::EventError;

/// Integer-tagged client event types.
///
/// The numeric values are wire format — do not renumber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum EventType {
    /// Interpreter busy state changed.
    Busy = 1,
    /// Coalesced interpreter stdout.
    ConsoleOutput = 10,
    /// Coalesced interpreter stderr.
    ConsoleError = 11,
    /// Coalesced build tool output.
    BuildOutput = 12,
    /// The active console target changed.
    ActiveConsoleChanged = 13,
    /// An asynchronous RPC finished; payload carries `{handle, response}`.
    AsyncCompletion = 20,
    /// A blocking operation is deferring a requested suspension.
    SuspendBlocked = 21,
    /// Periodic process memory usage report.
    MemoryUsage = 22,
    /// The session is quitting.
    Quit = 30,
}

/// Every event type, for exhaustive tests.
pub const ALL_EVENT_TYPES: &[EventType] = &[
    EventType::Busy,
    EventType::ConsoleOutput,
    EventType::ConsoleError,
    EventType::BuildOutput,
    EventType::ActiveConsoleChanged,
    EventType::AsyncCompletion,
    EventType::SuspendBlocked,
    EventType::MemoryUsage,
    EventType::Quit,
];

impl EventType {
    /// Whether this type's payload text is coalesced into a per-stream
    /// buffer instead of being queued one event per fragment.
    pub fn is_bufferable(self) -> bool {
        matches!(
            self,
            Self::ConsoleOutput | Self::ConsoleError | Self::BuildOutput
        )
    }

    /// Whether this type's payload carries a console attribution.
    pub fn is_console_stream(self) -> bool {
        matches!(self, Self::ConsoleOutput | Self::ConsoleError)
    }
}

impl From<EventType> for i32 {
    fn from(value: EventType) -> Self {
        value as i32
    }
}

impl TryFrom<i32> for EventType {
    type Error = EventError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        ALL_EVENT_TYPES
            .iter()
            .copied()
            .find(|t| *t as i32 == code)
            .ok_or(EventError::UnknownTypeCode(code))
    }
}

/// An outbound client notification.
///
/// `id` is `None` until the event service assigns a delivery id at drain
/// time; ids are strictly increasing and never reused.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientEvent {
    /// Server-assigned delivery id (absent until drained).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Integer type tag.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Event payload.
    pub data: Value,
}

impl ClientEvent {
    /// Create an unnumbered event.
    pub fn new(event_type: EventType, data: Value) -> Self {
        Self { id: None, event_type, data }
    }

    /// Busy-state change.
    pub fn busy(executing: bool) -> Self {
        Self::new(EventType::Busy, json!({ "busy": executing }))
    }

    /// A fragment of interpreter stdout attributed to `console`.
    pub fn console_output(console: &str, text: &str) -> Self {
        Self::new(
            EventType::ConsoleOutput,
            json!({ "console": console, "text": text }),
        )
    }

    /// A fragment of interpreter stderr attributed to `console`.
    pub fn console_error(console: &str, text: &str) -> Self {
        Self::new(
            EventType::ConsoleError,
            json!({ "console": console, "text": text }),
        )
    }

    /// A fragment of build output.
    pub fn build_output(text: &str) -> Self {
        Self::new(EventType::BuildOutput, json!({ "text": text }))
    }

    /// The active console changed to `console`.
    pub fn active_console_changed(console: &str) -> Self {
        Self::new(
            EventType::ActiveConsoleChanged,
            json!({ "console": console }),
        )
    }

    /// Completion of an asynchronous RPC. `response` is the full response
    /// object the synchronous path would have written.
    pub fn async_completion(handle: &str, response: Value) -> Self {
        Self::new(
            EventType::AsyncCompletion,
            json!({ "handle": handle, "response": response }),
        )
    }

    /// Suspension is deferred by the named blocking operations.
    pub fn suspend_blocked(ops: &[String]) -> Self {
        Self::new(EventType::SuspendBlocked, json!({ "blockingOps": ops }))
    }

    /// Periodic memory usage report, in kilobytes.
    pub fn memory_usage(resident_kb: u64) -> Self {
        Self::new(EventType::MemoryUsage, json!({ "residentKb": resident_kb }))
    }

    /// The session is quitting.
    pub fn quit() -> Self {
        Self::new(EventType::Quit, Value::Null)
    }

    /// The coalescable text payload, for bufferable types.
    pub fn text_payload(&self) -> Option<&str> {
        self.data.get("text").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes_are_stable() {
        assert_eq!(i32::from(EventType::Busy), 1);
        assert_eq!(i32::from(EventType::ConsoleOutput), 10);
        assert_eq!(i32::from(EventType::ConsoleError), 11);
        assert_eq!(i32::from(EventType::BuildOutput), 12);
        assert_eq!(i32::from(EventType::AsyncCompletion), 20);
        assert_eq!(i32::from(EventType::Quit), 30);
    }

    #[test]
    fn all_codes_roundtrip() {
        for ty in ALL_EVENT_TYPES {
            let code = i32::from(*ty);
            assert_eq!(EventType::try_from(code).unwrap(), *ty);
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!(EventType::try_from(9999).is_err());
    }

    #[test]
    fn bufferable_classes() {
        assert!(EventType::ConsoleOutput.is_bufferable());
        assert!(EventType::ConsoleError.is_bufferable());
        assert!(EventType::BuildOutput.is_bufferable());
        assert!(!EventType::Busy.is_bufferable());
        assert!(!EventType::AsyncCompletion.is_bufferable());
    }

    #[test]
    fn event_serializes_with_integer_type() {
        let event = ClientEvent::busy(true);
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], 1);
        assert_eq!(v["data"]["busy"], true);
        assert!(v.get("id").is_none());
    }

    #[test]
    fn numbered_event_serializes_id() {
        let mut event = ClientEvent::quit();
        event.id = Some(42);
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["id"], 42);
    }

    #[test]
    fn event_deserializes_from_integer_type() {
        let raw = r#"{"id": 7, "type": 20, "data": {"handle": "h1", "response": {}}}"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.id, Some(7));
        assert_eq!(event.event_type, EventType::AsyncCompletion);
        assert_eq!(event.data["handle"], "h1");
    }

    #[test]
    fn text_payload_present_for_console_output() {
        let event = ClientEvent::console_output("repl", "hi");
        assert_eq!(event.text_payload(), Some("hi"));
    }

    #[test]
    fn text_payload_absent_for_busy() {
        let event = ClientEvent::busy(false);
        assert_eq!(event.text_payload(), None);
    }

    #[test]
    fn console_output_carries_attribution() {
        let event = ClientEvent::console_output("repl-2", "x");
        assert_eq!(event.data["console"], "repl-2");
    }
}
