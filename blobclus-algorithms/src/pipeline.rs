//! The fixed pass schedule that clusters one event.
//!
//! A [`PipelineConfig`] holds the parameters of every pass. The schedule
//! is six single passes followed by a number of extension rounds, the
//! round count being reduced for very busy events.

use log::{info, warn};
use rayon::prelude::*;

use blobclus_core::units::CM;
use blobclus_core::{DetectorParams, Error, PointTree, Result};

use crate::facade::Cluster;
use crate::graph::ConnectivityGraph;
use crate::grouping::Grouping;
use crate::pass::{run_pass, MergePass, PassContext, PassReport, PassState};
use crate::predicates::{
    CloseParams, ClosePass, ExtendFlavor, ExtendParams, ExtendPass, LiveDeadParams, LiveDeadPass,
    ParallelProlongParams, ParallelProlongPass, RegularParams, RegularPass,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Cuts of the repeated extension rounds.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RoundParams {
    /// Rounds run on ordinary events.
    pub rounds: u32,
    /// Rounds run once the event counts as busy.
    pub busy_rounds: u32,
    /// Events with more clusters than this after the close pass are busy.
    pub busy_threshold: usize,
    /// Prolonged extension cut.
    pub prolong_cut: f64,
    /// Parallel extension cut.
    pub parallel_cut: f64,
    /// Regular extension cut.
    pub regular_cut: f64,
    /// Dead-region extension cut of the first round.
    pub first_dead_cut: f64,
    /// Dead-region extension cut of the later rounds.
    pub dead_cut: f64,
}

impl Default for RoundParams {
    fn default() -> Self {
        Self {
            rounds: 3,
            busy_rounds: 1,
            busy_threshold: 1100,
            prolong_cut: 150.0 * CM,
            parallel_cut: 30.0 * CM,
            regular_cut: 15.0 * CM,
            first_dead_cut: 60.0 * CM,
            dead_cut: 35.0 * CM,
        }
    }
}

/// Parameters of the whole pass schedule.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PipelineConfig {
    /// Detector constants.
    pub detector: DetectorParams,
    /// Live-dead bridging.
    pub live_dead: LiveDeadParams,
    /// Dead-region extension run right after the bridging.
    pub initial_extend: ExtendParams,
    /// First regular pass, without extension.
    pub regular: RegularParams,
    /// Second regular pass, with extension.
    pub regular_extended: RegularParams,
    /// Parallel/prolonged pass.
    pub parallel_prolong: ParallelProlongParams,
    /// Close-distance pass.
    pub close: CloseParams,
    /// Repeated extension rounds.
    pub rounds: RoundParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detector: DetectorParams::default(),
            live_dead: LiveDeadParams::default(),
            initial_extend: ExtendParams::new(ExtendFlavor::Dead, 60.0 * CM)
                .with_length_2_cut(15.0 * CM)
                .with_num_dead_try(1),
            regular: RegularParams::new(60.0 * CM, false),
            regular_extended: RegularParams::new(30.0 * CM, true),
            parallel_prolong: ParallelProlongParams::default(),
            close: CloseParams::default(),
            rounds: RoundParams::default(),
        }
    }
}

impl PipelineConfig {
    /// Sets the detector constants.
    #[must_use]
    pub fn with_detector(mut self, detector: DetectorParams) -> Self {
        self.detector = detector;
        self
    }

    /// Sets the round parameters.
    #[must_use]
    pub fn with_rounds(mut self, rounds: RoundParams) -> Self {
        self.rounds = rounds;
        self
    }

    /// Checks that every cut is a positive length and that rounds run.
    ///
    /// # Errors
    /// Returns [`Error::Config`] naming the first offending value.
    pub fn validate(&self) -> Result<()> {
        let cuts = [
            ("live_dead.distance_cut", self.live_dead.distance_cut),
            ("initial_extend.length_cut", self.initial_extend.length_cut),
            ("regular.length_cut", self.regular.length_cut),
            ("regular_extended.length_cut", self.regular_extended.length_cut),
            ("parallel_prolong.length_cut", self.parallel_prolong.length_cut),
            ("close.length_cut", self.close.length_cut),
            ("rounds.prolong_cut", self.rounds.prolong_cut),
            ("rounds.parallel_cut", self.rounds.parallel_cut),
            ("rounds.regular_cut", self.rounds.regular_cut),
            ("rounds.first_dead_cut", self.rounds.first_dead_cut),
            ("rounds.dead_cut", self.rounds.dead_cut),
            ("detector.ts_width", self.detector.ts_width),
        ];
        for (name, value) in cuts {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Config(format!("{name} must be positive, got {value}")));
            }
        }
        if self.detector.pitches.iter().any(|p| !(p.is_finite() && *p > 0.0)) {
            return Err(Error::Config("detector.pitches must be positive".to_string()));
        }
        if self.live_dead.overlap_offset < 0 {
            return Err(Error::Config(format!(
                "live_dead.overlap_offset must not be negative, got {}",
                self.live_dead.overlap_offset
            )));
        }
        if self.rounds.rounds == 0 || self.rounds.busy_rounds == 0 {
            return Err(Error::Config("extension rounds must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Number of extension rounds for an event with `cluster_count`
    /// clusters after the close pass.
    #[must_use]
    pub fn rounds_for(&self, cluster_count: usize) -> u32 {
        if cluster_count > self.rounds.busy_threshold {
            self.rounds.busy_rounds
        } else {
            self.rounds.rounds
        }
    }

    /// The passes run before the extension rounds.
    #[must_use]
    pub fn initial_passes(&self) -> Vec<Pass> {
        vec![
            Pass::LiveDead(LiveDeadPass::new(self.live_dead.clone())),
            Pass::Extend(ExtendPass::new(self.initial_extend.clone())),
            Pass::Regular(RegularPass::new(self.regular.clone())),
            Pass::Regular(RegularPass::new(self.regular_extended.clone())),
            Pass::ParallelProlong(ParallelProlongPass::new(self.parallel_prolong.clone())),
            Pass::Close(ClosePass::new(self.close.clone())),
        ]
    }

    /// The four extension passes of round `round`, counted from 0.
    #[must_use]
    pub fn round_passes(&self, round: u32) -> Vec<Pass> {
        let r = &self.rounds;
        let dead_cut = if round == 0 { r.first_dead_cut } else { r.dead_cut };
        [
            ExtendParams::new(ExtendFlavor::Prolong, r.prolong_cut),
            ExtendParams::new(ExtendFlavor::Parallel, r.parallel_cut),
            ExtendParams::new(ExtendFlavor::Regular, r.regular_cut),
            ExtendParams::new(ExtendFlavor::Dead, dead_cut).with_num_try(round),
        ]
        .into_iter()
        .map(|params| Pass::Extend(ExtendPass::new(params)))
        .collect()
    }

    /// Full schedule for an event whose cluster count after the close pass
    /// is `cluster_count`.
    #[must_use]
    pub fn schedule(&self, cluster_count: usize) -> Vec<Pass> {
        let mut passes = self.initial_passes();
        for round in 0..self.rounds_for(cluster_count) {
            passes.extend(self.round_passes(round));
        }
        passes
    }
}

/// One scheduled pass.
#[derive(Debug, Clone)]
pub enum Pass {
    /// Live clusters meeting at a dead region.
    LiveDead(LiveDeadPass),
    /// Extension from long clusters.
    Extend(ExtendPass),
    /// Clusters facing each other.
    Regular(RegularPass),
    /// Joints along poorly resolved directions.
    ParallelProlong(ParallelProlongPass),
    /// Practically touching clusters.
    Close(ClosePass),
}

impl Pass {
    fn inner(&self) -> &dyn MergePass {
        match self {
            Pass::LiveDead(p) => p,
            Pass::Extend(p) => p,
            Pass::Regular(p) => p,
            Pass::ParallelProlong(p) => p,
            Pass::Close(p) => p,
        }
    }
}

impl MergePass for Pass {
    fn name(&self) -> String {
        self.inner().name()
    }

    fn connect(
        &self,
        ctx: &PassContext<'_, '_>,
        state: &mut PassState,
        graph: &mut ConnectivityGraph,
    ) -> Result<()> {
        self.inner().connect(ctx, state, graph)
    }
}

/// What happened to one event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventReport {
    /// Live clusters on input.
    pub initial_clusters: usize,
    /// Live clusters on output.
    pub final_clusters: usize,
    /// Dead clusters seen.
    pub dead_clusters: usize,
    /// Extension rounds run.
    pub rounds: u32,
    /// Every pass, in order.
    pub passes: Vec<PassReport>,
}

/// Clusters of the dead tree, one per child of its root.
///
/// # Errors
/// Fails if a dead cluster subtree is malformed.
pub fn dead_clusters(dead: &PointTree) -> Result<Vec<Cluster<'_>>> {
    dead.children(dead.root())?
        .iter()
        .map(|&node| {
            let cluster = Cluster::new(dead, node)?;
            if cluster.blobs().is_empty() {
                warn!("dead cluster {node} holds no blobs");
            }
            Ok(cluster)
        })
        .collect()
}

/// Runs the full schedule over one event and returns the merged live tree.
///
/// The dead tree is only read. The round count is decided from the cluster
/// count observed once, after the close pass.
///
/// # Errors
/// Fails on an invalid configuration or a malformed tree. Nothing of the
/// event is returned in that case.
pub fn run_clustering(
    live: PointTree,
    dead: &PointTree,
    config: &PipelineConfig,
) -> Result<(PointTree, EventReport)> {
    config.validate()?;
    let dead_clusters = dead_clusters(dead)?;
    let mut grouping = Grouping::new(live, config.detector.clone())?;

    let mut report = EventReport {
        initial_clusters: grouping.len(),
        dead_clusters: dead_clusters.len(),
        ..EventReport::default()
    };
    for pass in config.initial_passes() {
        report.passes.push(run_pass(&mut grouping, &dead_clusters, &pass)?);
    }
    report.rounds = config.rounds_for(grouping.len());
    if report.rounds < config.rounds.rounds {
        info!(
            "busy event with {} clusters: {} extension round(s)",
            grouping.len(),
            report.rounds
        );
    }
    for round in 0..report.rounds {
        for pass in config.round_passes(round) {
            report.passes.push(run_pass(&mut grouping, &dead_clusters, &pass)?);
        }
    }
    report.final_clusters = grouping.len();

    info!(
        "clustered {} live clusters into {} ({} dead, {} passes)",
        report.initial_clusters,
        report.final_clusters,
        report.dead_clusters,
        report.passes.len()
    );
    Ok((grouping.into_tree(), report))
}

/// Clusters independent events in parallel.
///
/// Each `(live, dead)` pair is processed on its own; results keep the input
/// order and carry the dead tree back alongside the merged live tree.
pub fn run_clustering_batch(
    events: Vec<(PointTree, PointTree)>,
    config: &PipelineConfig,
) -> Vec<Result<(PointTree, PointTree, EventReport)>> {
    events
        .into_par_iter()
        .map(|(live, dead)| {
            let (live, report) = run_clustering(live, &dead, config)?;
            Ok((live, dead, report))
        })
        .collect()
}
