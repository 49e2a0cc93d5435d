//! What a run did, per stream and event.

use wse_grids_event_models::EventType;

/// Result of processing one stream/event pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// The final raster was produced in this run.
    Completed,
    /// The final raster already existed.
    AlreadyComplete,
    /// Fewer than two cross-sections carry the event.
    InsufficientData,
    /// An input the stage needs (such as the reach boundary) is absent.
    MissingPrerequisite,
    /// A stage failed; the message says why.
    Failed(String),
}

impl std::fmt::Display for EventOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::AlreadyComplete => f.write_str("already complete"),
            Self::InsufficientData => f.write_str("insufficient data"),
            Self::MissingPrerequisite => f.write_str("missing prerequisite"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

impl EventOutcome {
    /// Whether a final raster exists for the pair.
    #[must_use]
    pub const fn has_raster(&self) -> bool {
        matches!(self, Self::Completed | Self::AlreadyComplete)
    }
}

/// Outcomes for one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    /// Stream name.
    pub stream: String,
    /// Outcome per processed event, in processing order.
    pub events: Vec<(EventType, EventOutcome)>,
    /// Why the stream was abandoned before its events ran, if it was.
    pub failure: Option<String>,
}

impl StreamSummary {
    /// Outcome of `event`, if it ran.
    #[must_use]
    pub fn outcome(&self, event: EventType) -> Option<&EventOutcome> {
        self.events
            .iter()
            .find(|(e, _)| *e == event)
            .map(|(_, outcome)| outcome)
    }
}

/// Everything one run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Per-stream results, in processing order.
    pub streams: Vec<StreamSummary>,
    /// Events whose composite was written.
    pub mosaicked: Vec<EventType>,
    /// Events whose composite failed, with the reason.
    pub mosaic_failures: Vec<(EventType, String)>,
}

impl RunSummary {
    /// Streams abandoned before their events ran.
    pub fn failed_streams(&self) -> impl Iterator<Item = &StreamSummary> {
        self.streams.iter().filter(|s| s.failure.is_some())
    }

    /// Number of stream/event pairs whose outcome satisfies `predicate`.
    pub fn count(&self, predicate: impl Fn(&EventOutcome) -> bool) -> usize {
        self.streams
            .iter()
            .flat_map(|s| s.events.iter())
            .filter(|(_, outcome)| predicate(outcome))
            .count()
    }

    /// Whether nothing failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed_streams().next().is_none()
            && self.mosaic_failures.is_empty()
            && self.count(|o| matches!(o, EventOutcome::Failed(_))) == 0
    }

    /// The summary of `stream`, if it was processed.
    #[must_use]
    pub fn stream(&self, stream: &str) -> Option<&StreamSummary> {
        self.streams.iter().find(|s| s.stream == stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_success() {
        let mut summary = RunSummary::default();
        summary.streams.push(StreamSummary {
            stream: "Clear Creek".to_string(),
            events: vec![
                (EventType::Pct1, EventOutcome::Completed),
                (EventType::Pct50, EventOutcome::InsufficientData),
            ],
            failure: None,
        });
        assert!(summary.is_success());
        assert_eq!(summary.count(EventOutcome::has_raster), 1);

        summary.streams[0]
            .events
            .push((EventType::Pct10, EventOutcome::Failed("boom".to_string())));
        assert!(!summary.is_success());
        assert_eq!(
            summary.stream("Clear Creek").unwrap().outcome(EventType::Pct10).unwrap().to_string(),
            "failed: boom"
        );
    }
}
