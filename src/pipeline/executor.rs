//! Pipeline executor: wiring and the pull loop.
//!
//! The pipeline runs on the caller's thread. Each tick:
//! 1. Check the cancel token and the tick limit.
//! 2. Let the sink pull one batch from its upstream source.
//! 3. In deferred mode, classify the parked batch.
//!
//! The loop ends on the first `End` or error. Both are terminal.

use crate::analysis::{BlockLatencyAnalyzer, EventAnalyzer};
use crate::config::AppConfig;
use crate::pipeline::error::{PipelineError, PipelineResult, ResultExt};
use crate::pipeline::id::{ConnectionId, NodeId, PortId};
use crate::pipeline::message::ReleaseObserver;
use crate::pipeline::node::SourceNode;
use crate::pipeline::nodes::{RunState, SimpleSinkNode, SinkMode};
use crate::pipeline::output::{LineSink, StdoutLines};
use crate::pipeline::port::{PortDescriptor, PortDirection};
use crate::pipeline::source::IterationStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag, checked before every tick.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe to call from any thread.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Lifecycle of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Created,
    Connected,
    Running,
    Completed,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Created => "created",
            PipelineState::Connected => "connected",
            PipelineState::Running => "running",
            PipelineState::Completed => "completed",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A connection from a source output port to a sink input port.
#[derive(Debug, Clone, Copy)]
pub struct Connection {
    pub id: ConnectionId,
    pub from: PortId,
    pub to: PortId,
}

/// A slot holding one node of the graph.
pub enum NodeSlot {
    Source(SourceNode),
    Sink(SimpleSinkNode),
}

impl NodeSlot {
    pub fn name(&self) -> &str {
        match self {
            NodeSlot::Source(s) => s.name(),
            NodeSlot::Sink(s) => s.name(),
        }
    }

    pub fn ports(&self) -> &'static [PortDescriptor] {
        match self {
            NodeSlot::Source(s) => s.ports(),
            NodeSlot::Sink(s) => s.ports(),
        }
    }
}

/// Counters and timing of one run, printed by `--summary-json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub source: String,
    pub mode: SinkMode,
    pub state: PipelineState,
    pub event_count: u64,
    pub batches_received: u64,
    pub messages_received: u64,
    pub ticks: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// The pipeline graph and its driver.
pub struct Pipeline {
    nodes: Vec<NodeSlot>,
    connection: Option<Connection>,
    state: PipelineState,
    cancel: CancelToken,
    max_ticks: Option<u64>,
    ticks: u64,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            connection: None,
            state: PipelineState::Created,
            cancel: CancelToken::new(),
            max_ticks: None,
            ticks: 0,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn set_cancel_token(&mut self, cancel: CancelToken) {
        self.cancel = cancel;
    }

    /// Token that cancels this pipeline before its next tick.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn set_max_ticks(&mut self, max_ticks: Option<u64>) {
        self.max_ticks = max_ticks;
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Ticks attempted so far, including the one that ended the run.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    // ── Graph building ──

    /// Add a source node. Returns its NodeId.
    pub fn add_source(&mut self, node: impl Into<SourceNode>) -> PipelineResult<NodeId> {
        self.add_node(NodeSlot::Source(node.into()))
    }

    /// Add a sink node. Returns its NodeId.
    pub fn add_simple_sink(&mut self, node: SimpleSinkNode) -> PipelineResult<NodeId> {
        self.add_node(NodeSlot::Sink(node))
    }

    fn add_node(&mut self, slot: NodeSlot) -> PipelineResult<NodeId> {
        if !self.is_wiring() {
            return Err(PipelineError::InvalidState(format!(
                "cannot add nodes to a {} pipeline",
                self.state
            )));
        }
        let id = NodeId(self.nodes.len() as u32);
        tracing::debug!("Added node {} '{}'", id, slot.name());
        self.nodes.push(slot);
        Ok(id)
    }

    /// Look up an output port of `node` by name.
    pub fn output_port(&self, node: NodeId, name: &str) -> PipelineResult<PortId> {
        self.find_port(node, name, PortDirection::Output)
    }

    /// Look up an input port of `node` by name.
    pub fn input_port(&self, node: NodeId, name: &str) -> PipelineResult<PortId> {
        self.find_port(node, name, PortDirection::Input)
    }

    fn find_port(
        &self,
        node: NodeId,
        name: &str,
        direction: PortDirection,
    ) -> PipelineResult<PortId> {
        let slot = self
            .nodes
            .get(node.index())
            .ok_or_else(|| PipelineError::Connection(format!("no node {}", node)))?;
        slot.ports()
            .iter()
            .position(|p| p.name == name && p.direction == direction)
            .map(|i| PortId::new(node, i as u16))
            .ok_or_else(|| {
                PipelineError::Connection(format!(
                    "node '{}' has no {:?} port named '{}'",
                    slot.name(),
                    direction,
                    name
                ))
            })
    }

    fn port(&self, id: PortId) -> PipelineResult<&'static PortDescriptor> {
        self.nodes
            .get(id.node().index())
            .and_then(|slot| slot.ports().get(id.port_index() as usize))
            .ok_or_else(|| PipelineError::Connection(format!("no port {:?}", id)))
    }

    /// Connect an output port to an input port.
    pub fn connect_ports(&mut self, from: PortId, to: PortId) -> PipelineResult<ConnectionId> {
        if !self.is_wiring() {
            return Err(PipelineError::Connection(format!(
                "cannot connect ports of a {} pipeline",
                self.state
            )));
        }

        let out = self.port(from)?;
        let inp = self.port(to)?;
        if out.direction != PortDirection::Output {
            return Err(PipelineError::Connection(format!(
                "{:?} ('{}') is not an output port",
                from, out.name
            )));
        }
        if inp.direction != PortDirection::Input {
            return Err(PipelineError::Connection(format!(
                "{:?} ('{}') is not an input port",
                to, inp.name
            )));
        }

        if let Some(existing) = &self.connection {
            if existing.from == from || existing.to == to {
                return Err(PipelineError::Connection(format!(
                    "port already connected by {:?}",
                    existing.id
                )));
            }
            return Err(PipelineError::Connection(
                "pipeline already has its connection".to_string(),
            ));
        }

        let id = ConnectionId(0);
        self.connection = Some(Connection { id, from, to });
        self.state = PipelineState::Connected;

        tracing::info!(
            "Connected '{}'.{} -> '{}'.{}",
            self.nodes[from.node().index()].name(),
            out.name,
            self.nodes[to.node().index()].name(),
            inp.name
        );
        Ok(id)
    }

    fn is_wiring(&self) -> bool {
        matches!(
            self.state,
            PipelineState::Created | PipelineState::Connected
        )
    }

    // ── Main run loop ──

    /// Tick until the source ends. Returns the number of events analyzed.
    pub fn run(&mut self) -> PipelineResult<u64> {
        tracing::info!("Pipeline started");

        while self.tick()? == IterationStatus::Ok {}

        let (_, sink) = self.endpoints()?;
        sink.emit_total()?;
        let count = sink.state().event_count;

        tracing::info!("Pipeline completed after {} ticks: {} events", self.ticks, count);
        Ok(count)
    }

    /// Run a single step of the pull loop.
    ///
    /// The first tick initializes the sink. After `End` or an error the
    /// pipeline is terminal and further ticks fail with `InvalidState`.
    pub fn tick(&mut self) -> PipelineResult<IterationStatus> {
        match self.state {
            PipelineState::Created => {
                return Err(PipelineError::InvalidState(
                    "pipeline has no connection".to_string(),
                ))
            }
            PipelineState::Completed | PipelineState::Failed => {
                return Err(PipelineError::InvalidState(format!(
                    "pipeline already {}",
                    self.state
                )))
            }
            PipelineState::Connected => self.start()?,
            PipelineState::Running => {}
        }

        match self.step() {
            Ok(IterationStatus::Ok) => Ok(IterationStatus::Ok),
            Ok(IterationStatus::End) => {
                self.finish(PipelineState::Completed);
                Ok(IterationStatus::End)
            }
            Err(e) => {
                tracing::warn!("Pipeline failed on tick {}: {}", self.ticks, e);
                self.finish(PipelineState::Failed);
                Err(e)
            }
        }
    }

    fn start(&mut self) -> PipelineResult<()> {
        let (_, sink) = self.endpoints()?;
        sink.init();
        self.ticks = 0;
        self.started_at = Some(Utc::now());
        self.state = PipelineState::Running;
        Ok(())
    }

    fn finish(&mut self, state: PipelineState) {
        self.state = state;
        self.finished_at = Some(Utc::now());
    }

    fn step(&mut self) -> PipelineResult<IterationStatus> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if let Some(max) = self.max_ticks {
            if self.ticks >= max {
                return Err(PipelineError::TickLimitExceeded(max));
            }
        }
        self.ticks += 1;
        let tick = self.ticks;

        let (source, sink) = self.endpoints()?;
        let status = sink
            .consume_once(source)
            .with_context(|| format!("tick {}", tick))?;
        if sink.mode() == SinkMode::Deferred {
            sink.process_pending()
                .with_context(|| format!("tick {}", tick))?;
        }

        tracing::debug!("Tick {} -> {:?}", tick, status);
        Ok(status)
    }

    /// Borrow the connected source and sink at the same time.
    fn endpoints(&mut self) -> PipelineResult<(&mut SourceNode, &mut SimpleSinkNode)> {
        let conn = self.connection.ok_or_else(|| {
            PipelineError::InvalidState("pipeline has no connection".to_string())
        })?;
        let from = conn.from.node().index();
        let to = conn.to.node().index();

        let (src, dst) = if from < to {
            let (left, right) = self.nodes.split_at_mut(to);
            (&mut left[from], &mut right[0])
        } else {
            let (left, right) = self.nodes.split_at_mut(from);
            (&mut right[0], &mut left[to])
        };

        match (src, dst) {
            (NodeSlot::Source(source), NodeSlot::Sink(sink)) => Ok((source, sink)),
            _ => Err(PipelineError::InvalidState(
                "connection does not join a source to a sink".to_string(),
            )),
        }
    }

    // ── Results ──

    /// Counters of the connected sink.
    pub fn run_state(&self) -> Option<RunState> {
        let conn = self.connection.as_ref()?;
        match self.nodes.get(conn.to.node().index())? {
            NodeSlot::Sink(sink) => Some(*sink.state()),
            NodeSlot::Source(_) => None,
        }
    }

    pub fn summary(&self) -> RunSummary {
        let conn = self.connection.as_ref();
        let source = conn
            .and_then(|c| self.nodes.get(c.from.node().index()))
            .map(|slot| slot.name().to_string())
            .unwrap_or_default();
        let mode = conn
            .and_then(|c| match self.nodes.get(c.to.node().index()) {
                Some(NodeSlot::Sink(sink)) => Some(sink.mode()),
                _ => None,
            })
            .unwrap_or_default();
        let counters = self.run_state().unwrap_or_default();

        RunSummary {
            source,
            mode,
            state: self.state,
            event_count: counters.event_count,
            batches_received: counters.batches_received,
            messages_received: counters.messages_received,
            ticks: self.ticks,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// Builder for the standard source → sink pipeline.
pub struct PipelineBuilder {
    config: AppConfig,
    source: Option<SourceNode>,
    output: Option<Box<dyn LineSink>>,
    analyzers: Vec<Box<dyn EventAnalyzer>>,
    cancel: Option<CancelToken>,
    observer: Option<ReleaseObserver>,
}

impl PipelineBuilder {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            config: config.clone(),
            source: None,
            output: None,
            analyzers: Vec::new(),
            cancel: None,
            observer: None,
        }
    }

    /// Use this source instead of opening the configured one.
    pub fn with_source(mut self, source: impl Into<SourceNode>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Send trace lines here instead of standard output.
    pub fn with_output(mut self, output: Box<dyn LineSink>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_analyzer(mut self, analyzer: Box<dyn EventAnalyzer>) -> Self {
        self.analyzers.push(analyzer);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Observe releases of messages from the configured source.
    pub fn with_release_observer(mut self, observer: ReleaseObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Open the source, build the sink and connect `out` to `in`.
    pub fn build(self) -> PipelineResult<Pipeline> {
        self.config.validate()?;

        let source = match self.source {
            Some(source) => source,
            None => SourceNode::open_observed(&self.config.source, self.observer)
                .context("opening source")?,
        };

        let output = self
            .output
            .unwrap_or_else(|| Box::new(StdoutLines::new()));
        let mut sink = SimpleSinkNode::new(self.config.sink.mode, output);
        if self.config.sink.latency_analysis {
            sink = sink.with_analyzer(Box::new(BlockLatencyAnalyzer::new()));
        }
        for analyzer in self.analyzers {
            sink = sink.with_analyzer(analyzer);
        }

        let mut pipeline = Pipeline::new();
        if let Some(cancel) = self.cancel {
            pipeline.set_cancel_token(cancel);
        }
        pipeline.set_max_ticks(self.config.run.max_ticks);

        let src = pipeline.add_source(source)?;
        let snk = pipeline.add_simple_sink(sink)?;
        let out = pipeline.output_port(src, "out")?;
        let inp = pipeline.input_port(snk, "in")?;
        pipeline
            .connect_ports(out, inp)
            .context("wiring source to sink")?;

        Ok(pipeline)
    }
}

/// Build the pipeline described by `config`, printing to standard output.
pub fn build_pipeline(config: &AppConfig) -> PipelineResult<Pipeline> {
    PipelineBuilder::new(config).build()
}
