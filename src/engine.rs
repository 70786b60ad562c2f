//! Trace engine orchestration
//!
//! Composes classification, deduplication, state tracking, source capture,
//! and durable writing for every incoming instrumentation event. Runs
//! inline on the traced program's thread; each event is fully processed
//! before the program resumes, so arrival order is record order.

use crate::classifier::{CodeClassifier, CodeOrigin};
use crate::config::TraceConfig;
use crate::dedup::LineDeduplicator;
use crate::event::{EventKind, SnapshotValue, TraceEvent};
use crate::extract::{MethodDefinitionExtractor, MethodKey};
use crate::record::{ChangeStatus, RecordedState, TraceRecord};
use crate::source_cache::SourceLineCache;
use crate::state::{Observation, StateKey, StateTracker};
use crate::summary::SummaryBuilder;
use crate::value::{self, SerializedValue};
use crate::writer::RecordWriter;
use anyhow::{bail, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

const REDEFINITION_WARNING: &str = "constant redefined; qualified names are expected to be immutable";

/// Engine lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Idle,
    Active,
    Finalizing,
    Closed,
}

/// Session-scoped tracing engine
///
/// Owns the output writer and all tracking tables; a second concurrent
/// session needs its own engine and destination.
pub struct TraceEngine {
    config: TraceConfig,
    classifier: CodeClassifier,
    dedup: LineDeduplicator,
    state: StateTracker,
    extractor: MethodDefinitionExtractor,
    sources: SourceLineCache,
    writer: RecordWriter,
    summary: SummaryBuilder,
    method_index: HashMap<MethodKey, u64>,
    methods_attempted: HashSet<MethodKey>,
    phase: EnginePhase,
}

impl TraceEngine {
    pub fn new(writer: RecordWriter, config: TraceConfig) -> Self {
        let classifier = CodeClassifier::new(&config);
        Self {
            config,
            classifier,
            dedup: LineDeduplicator::new(),
            state: StateTracker::new(),
            extractor: MethodDefinitionExtractor::default(),
            sources: SourceLineCache::new(),
            writer,
            summary: SummaryBuilder::new(),
            method_index: HashMap::new(),
            methods_attempted: HashSet::new(),
            phase: EnginePhase::Idle,
        }
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    /// Engage the session: `Idle -> Active`
    pub fn activate(&mut self) -> Result<()> {
        if self.phase != EnginePhase::Idle {
            bail!("trace engine already activated");
        }
        self.phase = EnginePhase::Active;
        Ok(())
    }

    /// Process one instrumentation event
    ///
    /// Events arriving outside the active phase are dropped; after
    /// instrumentation is disengaged no in-flight event is ever partially
    /// recorded. Enrichment failures degrade to inline markers; only a
    /// writer failure is fatal.
    pub fn process(&mut self, event: &TraceEvent) -> Result<()> {
        if self.phase != EnginePhase::Active {
            debug!(kind = event.kind.label(), "event dropped outside active session");
            return Ok(());
        }
        if !self.admits(event) {
            return Ok(());
        }

        let origin = self.classifier.classify(event.path.as_deref());
        let is_app = origin == CodeOrigin::Application;
        if event.kind == EventKind::Line && !self.line_traced(origin) {
            return Ok(());
        }
        if !self
            .dedup
            .should_forward(event.kind, event.path.as_deref(), event.line, is_app)
        {
            return Ok(());
        }

        let path_text = event
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let mut record = TraceRecord::skeleton(event.kind, &path_text, event.line, is_app);
        if let Some(method) = &event.method {
            record.method = method.clone();
        }
        record.owner = event.owner.clone();

        // Enrichment keys on the id this record will receive
        let record_id = self.writer.next_id();
        let mut errors: Vec<String> = Vec::new();

        if is_app {
            self.enrich_locals(event, &mut record);
            self.enrich_receiver(event, record_id, &mut record);
            self.enrich_constants(event, record_id, &mut record);
        }
        // Source text rides on every forwarded line event, external included
        self.enrich_source_line(event, &mut record, &mut errors);
        self.enrich_parameters(event, is_app, &mut record);
        self.enrich_method_definition(event, record_id, &mut record, &mut errors);

        if matches!(event.kind, EventKind::Return | EventKind::NativeReturn) {
            record.return_value = event.return_value.as_ref().map(|v| value::serialize(v));
        }

        if !errors.is_empty() {
            record.errors = Some(errors);
        }

        if !path_text.is_empty() {
            self.summary.record_file(&path_text, is_app);
        }
        self.summary.count_event(event.kind);

        let written_id = self.writer.write_trace(&mut record)?;
        debug_assert_eq!(written_id, record_id);
        Ok(())
    }

    /// Disengage and write the terminal summary: `Active -> Finalizing -> Closed`
    ///
    /// Also valid from `Idle` so a session that never saw an event still
    /// produces a well-formed stream.
    pub fn finalize(&mut self) -> Result<u64> {
        match self.phase {
            EnginePhase::Idle | EnginePhase::Active => {}
            EnginePhase::Finalizing | EnginePhase::Closed => {
                bail!("trace session already finalized")
            }
        }
        self.phase = EnginePhase::Finalizing;

        let method_definitions: BTreeMap<String, u64> = self
            .method_index
            .iter()
            .map(|(key, &id)| (key.qualified(), id))
            .collect();
        let mut summary = self.summary.build(
            self.writer.records_written(),
            &self.state,
            method_definitions,
            self.dedup.suppressed(),
            &self.config,
        );
        let id = self.writer.write_summary(&mut summary)?;
        self.phase = EnginePhase::Closed;
        Ok(id)
    }

    /// Extension and path admission: events without a traced extension are
    /// ignored; pathless events pass only at the native boundary
    fn admits(&self, event: &TraceEvent) -> bool {
        match &event.path {
            Some(path) => self.config.traces_extension(path),
            None => matches!(event.kind, EventKind::NativeCall | EventKind::NativeReturn),
        }
    }

    /// Whether line events from this origin are recorded at all
    fn line_traced(&self, origin: CodeOrigin) -> bool {
        match origin {
            CodeOrigin::Application => true,
            CodeOrigin::StandardLibrary => self.config.include_standard_library_code,
            CodeOrigin::Dependency | CodeOrigin::Unknown => self.config.include_dependency_code,
        }
    }

    fn enrich_locals(&mut self, event: &TraceEvent, record: &mut TraceRecord) {
        if !matches!(event.kind, EventKind::Line | EventKind::Call) || event.locals.is_empty() {
            return;
        }
        let locals: BTreeMap<String, SerializedValue> = event
            .locals
            .iter()
            .map(|(name, v)| (name.clone(), value::serialize(v)))
            .collect();
        record.locals = Some(locals);
    }

    fn enrich_receiver(&mut self, event: &TraceEvent, record_id: u64, record: &mut TraceRecord) {
        let Some(receiver) = &event.receiver else {
            return;
        };

        // Object attributes key on the receiver's identity token, derived
        // from the raw object id when the source assigns none; without
        // either there is nothing to correlate against, so they are skipped.
        if let Some(identity) = receiver.identity_token() {
            let observed =
                self.observe_map(&receiver.attributes, record_id, |name| StateKey::ObjectAttribute {
                    identity,
                    name: name.to_string(),
                });
            if !observed.is_empty() {
                record.object_attributes = Some(observed);
            }
        }

        let type_name = receiver.type_name.clone();
        let observed =
            self.observe_map(&receiver.type_attributes, record_id, |name| StateKey::TypeAttribute {
                type_name: type_name.clone(),
                name: name.to_string(),
            });
        if !observed.is_empty() {
            record.type_attributes = Some(observed);
        }
    }

    fn enrich_constants(&mut self, event: &TraceEvent, record_id: u64, record: &mut TraceRecord) {
        let observed = self.observe_map(&event.constants, record_id, |name| StateKey::Constant {
            qualified_name: name.to_string(),
        });
        if !observed.is_empty() {
            record.constants = Some(observed);
        }
    }

    /// Observe every entry of a name->value map, keeping only the surfaced
    /// (created/changed) observations
    fn observe_map(
        &mut self,
        values: &BTreeMap<String, SnapshotValue>,
        record_id: u64,
        mut key_for: impl FnMut(&str) -> StateKey,
    ) -> BTreeMap<String, RecordedState> {
        let mut observed = BTreeMap::new();
        for (name, snapshot) in values {
            let serialized = value::serialize(snapshot);
            let outcome = self
                .state
                .observe(key_for(name), &serialized.repr, record_id);
            if let Some(state) = recorded_state(serialized, outcome) {
                observed.insert(name.clone(), state);
            }
        }
        observed
    }

    fn enrich_parameters(&mut self, event: &TraceEvent, is_app: bool, record: &mut TraceRecord) {
        if event.kind != EventKind::Call || !is_app || event.parameters.is_empty() {
            return;
        }
        record.parameters = Some(event.parameters.clone());
        let values: BTreeMap<String, SerializedValue> = event
            .parameters
            .iter()
            .filter_map(|name| {
                event
                    .locals
                    .get(name)
                    .map(|v| (name.clone(), value::serialize(v)))
            })
            .collect();
        if !values.is_empty() {
            record.parameter_values = Some(values);
        }
    }

    fn enrich_method_definition(
        &mut self,
        event: &TraceEvent,
        record_id: u64,
        record: &mut TraceRecord,
        errors: &mut Vec<String>,
    ) {
        if event.kind != EventKind::Call {
            return;
        }
        let Some(name) = &event.method else {
            return;
        };
        let key = MethodKey::new(event.owner.clone(), name.clone());
        self.summary.record_method(&key.qualified());

        if let Some(&definition_id) = self.method_index.get(&key) {
            record.method_definition_ref = Some(definition_id);
            return;
        }
        // One extraction attempt per method key, successful or not
        if !self.methods_attempted.insert(key.clone()) {
            return;
        }
        let Some(site) = &event.definition else {
            return;
        };
        // The definition may live in a different file than the call site;
        // capture source only for application-owned definitions.
        if !self.classifier.is_application_code(Some(&site.path)) {
            return;
        }
        match self.extractor.extract(&mut self.sources, &site.path, site.line) {
            Ok(Some(definition)) => {
                record.method_definition = Some(definition);
                self.method_index.insert(key, record_id);
            }
            Ok(None) => {}
            Err(err) => {
                debug!(method = %key.qualified(), "method source extraction failed: {err:#}");
                errors.push(format!("<cronista: method source unavailable: {err}>"));
            }
        }
    }

    fn enrich_source_line(
        &mut self,
        event: &TraceEvent,
        record: &mut TraceRecord,
        errors: &mut Vec<String>,
    ) {
        if event.kind != EventKind::Line {
            return;
        }
        let Some(path) = &event.path else {
            return;
        };
        match self.sources.line(path, event.line) {
            Ok(Some(text)) => record.source_line = Some(text.to_string()),
            Ok(None) => {}
            Err(err) => errors.push(format!("<cronista: source line unavailable: {err}>")),
        }
    }
}

fn recorded_state(value: SerializedValue, outcome: Observation) -> Option<RecordedState> {
    match outcome {
        Observation::Unchanged => None,
        Observation::Created => Some(RecordedState {
            value,
            status: ChangeStatus::Created,
            previous_record_id: None,
            warning: None,
        }),
        Observation::Changed { previous_record_id } => Some(RecordedState {
            value,
            status: ChangeStatus::Changed,
            previous_record_id: Some(previous_record_id),
            warning: None,
        }),
        Observation::Redefined { previous_record_id } => Some(RecordedState {
            value,
            status: ChangeStatus::Changed,
            previous_record_id: Some(previous_record_id),
            warning: Some(REDEFINITION_WARNING.to_string()),
        }),
    }
}
