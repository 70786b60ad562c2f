//! Session-wide aggregation
//!
//! Accumulates cheap aggregates as records are written and builds the
//! terminal summary record at finalization.

use crate::config::TraceConfig;
use crate::event::EventKind;
use crate::record::{now_us, SummaryMarker, SummaryRecord};
use crate::state::StateTracker;
use std::collections::{BTreeMap, BTreeSet};

/// Running aggregates for one session
#[derive(Debug, Default)]
pub struct SummaryBuilder {
    application_files: BTreeSet<String>,
    external_files: BTreeSet<String>,
    methods: BTreeSet<String>,
    event_counts: BTreeMap<String, u64>,
}

impl SummaryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note a touched file, partitioned application vs external
    pub fn record_file(&mut self, path: &str, is_application_code: bool) {
        let set = if is_application_code {
            &mut self.application_files
        } else {
            &mut self.external_files
        };
        set.insert(path.to_string());
    }

    /// Note an observed method by qualified name
    pub fn record_method(&mut self, qualified: &str) {
        self.methods.insert(qualified.to_string());
    }

    /// Count one written record of the given kind
    pub fn count_event(&mut self, kind: EventKind) {
        *self.event_counts.entry(kind.label().to_string()).or_default() += 1;
    }

    /// Build the terminal record; `total_steps` is the count of non-summary
    /// records already written
    pub fn build(
        &self,
        total_steps: u64,
        state: &StateTracker,
        method_definitions: BTreeMap<String, u64>,
        suppressed_line_events: u64,
        config: &TraceConfig,
    ) -> SummaryRecord {
        SummaryRecord {
            id: 0,
            timestamp_us: now_us(),
            event: SummaryMarker::Summary,
            total_steps,
            application_files: self.application_files.iter().cloned().collect(),
            external_files: self.external_files.iter().cloned().collect(),
            methods: self.methods.iter().cloned().collect(),
            method_definitions,
            tracked_entities: state.tracked_count(),
            constants: state.constant_names(),
            suppressed_line_events,
            event_counts: self.event_counts.clone(),
            config: config.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_partitioned_and_sorted() {
        let mut builder = SummaryBuilder::new();
        builder.record_file("/srv/app/z.rb", true);
        builder.record_file("/srv/app/a.rb", true);
        builder.record_file("/usr/lib/ruby/3.2.0/set.rb", false);
        builder.record_file("/srv/app/a.rb", true);

        let summary = builder.build(
            3,
            &StateTracker::new(),
            BTreeMap::new(),
            0,
            &TraceConfig::default(),
        );
        assert_eq!(summary.application_files, vec!["/srv/app/a.rb", "/srv/app/z.rb"]);
        assert_eq!(summary.external_files, vec!["/usr/lib/ruby/3.2.0/set.rb"]);
        assert_eq!(summary.total_steps, 3);
    }

    #[test]
    fn test_methods_deduplicated() {
        let mut builder = SummaryBuilder::new();
        builder.record_method("Billing#charge");
        builder.record_method("Billing#charge");
        builder.record_method("Billing#refund");
        let summary = builder.build(
            1,
            &StateTracker::new(),
            BTreeMap::new(),
            0,
            &TraceConfig::default(),
        );
        assert_eq!(summary.methods, vec!["Billing#charge", "Billing#refund"]);
    }

    #[test]
    fn test_event_counts_accumulate() {
        let mut builder = SummaryBuilder::new();
        builder.count_event(EventKind::Line);
        builder.count_event(EventKind::Line);
        builder.count_event(EventKind::Call);
        let summary = builder.build(
            3,
            &StateTracker::new(),
            BTreeMap::new(),
            0,
            &TraceConfig::default(),
        );
        assert_eq!(summary.event_counts.get("line"), Some(&2));
        assert_eq!(summary.event_counts.get("call"), Some(&1));
    }
}
