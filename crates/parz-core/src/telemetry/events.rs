use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::report::TaskResult;
use crate::telemetry::workload::WorkloadSample;

/// Notification emitted by the pipeline and the archiver.
#[derive(Debug, Clone)]
pub enum Event {
    /// Informational message.
    Message(String),
    /// Non-fatal problem; processing continues.
    Warning(String),
    /// Writer progress for the current object.
    Progress {
        /// Completion in hundredths of a percent (`10_000` is 100%).
        percent_hundredths: u32,
        workload: WorkloadSample,
    },
    /// Final result of an object task that did not end in plain success.
    TaskResult(Box<TaskResult>),
    /// Fatal error with its full context chain.
    Error(String),
}

/// Receiver of pipeline events.
///
/// Sinks are passed explicitly into every run, so independent runs never
/// share state. Emitting must not block pipeline stages for long.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

impl<F> EventSink for F
where
    F: Fn(Event) + Send + Sync,
{
    fn emit(&self, event: Event) {
        self(event)
    }
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

/// Sink that forwards events into an unbounded channel.
///
/// Receivers are cloneable; any number of consumers may read the feed.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<Event>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<Event>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: Event) {
        // A dropped receiver means nobody is listening any more.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_delivers_in_order() {
        let (sink, receiver) = ChannelSink::new();
        sink.emit(Event::Message("one".to_string()));
        sink.emit(Event::Warning("two".to_string()));
        drop(sink);

        let events: Vec<Event> = receiver.iter().collect();
        assert!(matches!(&events[0], Event::Message(text) if text == "one"));
        assert!(matches!(&events[1], Event::Warning(text) if text == "two"));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn closures_are_sinks() {
        let counter = std::sync::atomic::AtomicUsize::new(0);
        let sink = |_event: Event| {
            counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        };
        sink.emit(Event::Message("x".to_string()));
        EventSink::emit(&sink, Event::Error("y".to_string()));
        assert_eq!(counter.load(std::sync::atomic::Ordering::Relaxed), 2);
    }
}
