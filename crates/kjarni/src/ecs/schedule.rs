//! # Scheduler — stages and dependency-ordered systems
//!
//! Systems are grouped into ordered stages (`pre_update`, `update`,
//! `post_update` by default). Within a stage, each system's
//! [`SystemDependency`] list adds edges to a graph that is sorted with Kahn's
//! algorithm. When several systems are ready at once the one registered first
//! runs first, so the order is deterministic and matches registration order
//! wherever no constraint says otherwise.
//!
//! ```text
//! run_frame(world, dt)
//!   world.begin_tick()          detach removals, clear change sets
//!   Time resource += dt
//!   for stage in stages:
//!     rayon scope {
//!       for system in stage order:
//!         re-plan system queries
//!         system.update(ctx)    ctx.spawn(..) tasks join at scope end
//!         apply system commands
//!     }
//! ```
//!
//! A dependency on a system that lives in a different stage is meaningless
//! (stages already run in sequence) and is dropped with a warning. A dependency
//! on a name no stage knows is an error, as is a cycle.

use std::borrow::Cow;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;
use std::time::Duration;
#[cfg(feature = "diagnostics")]
use std::time::Instant;

use super::commands::Commands;
use super::system::{System, SystemDependency, UpdateContext, short_system_name};
use super::world::World;
use crate::error::ScheduleError;
use crate::time::Time;

/// Name of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageLabel(Cow<'static, str>);

impl StageLabel {
    pub const PRE_UPDATE: StageLabel = StageLabel(Cow::Borrowed("pre_update"));
    pub const UPDATE: StageLabel = StageLabel(Cow::Borrowed("update"));
    pub const POST_UPDATE: StageLabel = StageLabel(Cow::Borrowed("post_update"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for StageLabel {
    fn from(name: &'static str) -> Self {
        Self::new(name)
    }
}

impl From<String> for StageLabel {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Wall-clock time one system spent in its last update.
#[cfg(feature = "diagnostics")]
#[derive(Debug, Clone)]
pub struct SystemTiming {
    pub stage: StageLabel,
    pub name: String,
    pub duration: Duration,
}

struct SystemNode {
    name: String,
    dependencies: Vec<SystemDependency>,
    system: Box<dyn System>,
}

struct Stage {
    label: StageLabel,
    nodes: Vec<SystemNode>,
    /// Indices into `nodes`, in execution order.
    order: Vec<usize>,
}

impl Stage {
    fn new(label: StageLabel) -> Self {
        Self {
            label,
            nodes: Vec::new(),
            order: Vec::new(),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    fn insert(&mut self, node: SystemNode) {
        match self.position(&node.name) {
            Some(i) => {
                log::debug!("replacing system `{}` in stage `{}`", node.name, self.label);
                self.nodes[i] = node;
            }
            None => self.nodes.push(node),
        }
    }

    fn build_order(&mut self, owners: &HashMap<String, StageLabel>) -> Result<(), ScheduleError> {
        let count = self.nodes.len();
        let index: HashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.as_str(), i))
            .collect();

        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut in_degree = vec![0usize; count];
        let mut seen = HashSet::new();

        for (i, node) in self.nodes.iter().enumerate() {
            for dependency in &node.dependencies {
                let target = dependency.target();
                let Some(&j) = index.get(target) else {
                    match owners.get(target) {
                        Some(stage) => log::warn!(
                            "`{}` ({}) names `{}` from stage `{stage}`; ignored, stages already run in order",
                            short_system_name(&node.name),
                            dependency,
                            short_system_name(target),
                        ),
                        None => {
                            return Err(ScheduleError::UnknownSystem {
                                stage: self.label.to_string(),
                                system: node.name.clone(),
                                dependency: target.to_string(),
                            });
                        }
                    }
                    continue;
                };

                let (from, to) = match dependency {
                    SystemDependency::Before(_) => (i, j),
                    SystemDependency::After(_) => (j, i),
                };
                if seen.insert((from, to)) {
                    edges[from].push(to);
                    in_degree[to] += 1;
                }
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..count)
            .filter(|&i| in_degree[i] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(count);
        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &next in &edges[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() != count {
            // Blocked nodes include everything downstream of a cycle; report
            // only the ones that lie on one.
            let systems = (0..count)
                .filter(|&i| in_degree[i] > 0 && on_cycle(&edges, i))
                .map(|i| self.nodes[i].name.clone())
                .collect();
            return Err(ScheduleError::Cycle {
                stage: self.label.to_string(),
                systems,
            });
        }

        self.order = order;
        log::debug!(
            "stage `{}` order: [{}]",
            self.label,
            self.order
                .iter()
                .map(|&i| short_system_name(&self.nodes[i].name))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(())
    }

    fn run(&mut self, world: &mut World, #[cfg(feature = "diagnostics")] timings: &mut Vec<SystemTiming>) {
        let mut commands = Commands::new();
        let label = &self.label;
        let order = &self.order;
        let nodes = &mut self.nodes;

        rayon::in_place_scope(|scope| {
            for &index in order {
                let node = &mut nodes[index];
                for query in node.system.queries_mut() {
                    query.update_archetypes(world);
                }

                #[cfg(feature = "diagnostics")]
                let start = Instant::now();

                let mut ctx = UpdateContext::new(world, &mut commands, scope, label);
                node.system.update(&mut ctx);

                #[cfg(feature = "diagnostics")]
                timings.push(SystemTiming {
                    stage: label.clone(),
                    name: short_system_name(&node.name),
                    duration: start.elapsed(),
                });

                commands.apply(world);
            }
        });
    }
}

/// `true` if `node` can reach itself along `edges`.
fn on_cycle(edges: &[Vec<usize>], node: usize) -> bool {
    let mut seen = vec![false; edges.len()];
    let mut stack = edges[node].clone();
    while let Some(next) = stack.pop() {
        if next == node {
            return true;
        }
        if !std::mem::replace(&mut seen[next], true) {
            stack.extend_from_slice(&edges[next]);
        }
    }
    false
}

/// Ordered stages of systems.
pub struct Scheduler {
    stages: Vec<Stage>,
    dirty: bool,
    #[cfg(feature = "diagnostics")]
    timings: Vec<SystemTiming>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// `pre_update`, `update`, `post_update`.
    pub fn new() -> Self {
        Self::with_stages([StageLabel::PRE_UPDATE, StageLabel::UPDATE, StageLabel::POST_UPDATE])
    }

    /// Custom stage list, run in the given order. Duplicates are dropped.
    pub fn with_stages(labels: impl IntoIterator<Item = StageLabel>) -> Self {
        let mut stages: Vec<Stage> = Vec::new();
        for label in labels {
            if stages.iter().any(|s| s.label == label) {
                log::warn!("stage `{label}` listed twice; keeping the first");
                continue;
            }
            stages.push(Stage::new(label));
        }
        Self {
            stages,
            dirty: true,
            #[cfg(feature = "diagnostics")]
            timings: Vec::new(),
        }
    }

    fn stage_index(&self, label: &StageLabel) -> Option<usize> {
        self.stages.iter().position(|s| &s.label == label)
    }

    pub fn has_stage(&self, label: &StageLabel) -> bool {
        self.stage_index(label).is_some()
    }

    pub fn stage_labels(&self) -> impl Iterator<Item = &StageLabel> + '_ {
        self.stages.iter().map(|s| &s.label)
    }

    fn insert_stage(&mut self, at: usize, label: StageLabel) -> Result<(), ScheduleError> {
        if self.has_stage(&label) {
            return Err(ScheduleError::DuplicateStage(label.to_string()));
        }
        self.stages.insert(at, Stage::new(label));
        Ok(())
    }

    pub fn add_stage_before(&mut self, label: StageLabel, anchor: &StageLabel) -> Result<(), ScheduleError> {
        let at = self
            .stage_index(anchor)
            .ok_or_else(|| ScheduleError::UnknownStage(anchor.to_string()))?;
        self.insert_stage(at, label)
    }

    pub fn add_stage_after(&mut self, label: StageLabel, anchor: &StageLabel) -> Result<(), ScheduleError> {
        let at = self
            .stage_index(anchor)
            .ok_or_else(|| ScheduleError::UnknownStage(anchor.to_string()))?;
        self.insert_stage(at + 1, label)
    }

    /// Register `system` in the stage it names.
    ///
    /// # Panics
    ///
    /// If that stage does not exist.
    pub fn add_system<S: System>(&mut self, system: S) {
        let stage = system.stage();
        self.add_boxed(stage, Box::new(system));
    }

    /// Register `system` in `stage`, overriding the stage it names itself.
    ///
    /// # Panics
    ///
    /// If `stage` does not exist.
    pub fn add_system_to_stage<S: System>(&mut self, stage: StageLabel, system: S) {
        self.add_boxed(stage, Box::new(system));
    }

    fn add_boxed(&mut self, stage: StageLabel, system: Box<dyn System>) {
        let Some(target) = self.stage_index(&stage) else {
            panic!(
                "cannot add system `{}`: unknown stage `{stage}`",
                short_system_name(&system.name())
            );
        };
        let node = SystemNode {
            name: system.name().into_owned(),
            dependencies: system.dependencies(),
            system,
        };

        // A name lives in exactly one stage.
        for (i, other) in self.stages.iter_mut().enumerate() {
            if i != target {
                if let Some(pos) = other.position(&node.name) {
                    other.nodes.remove(pos);
                }
            }
        }
        log::debug!("added system `{}` to stage `{stage}`", short_system_name(&node.name));
        self.stages[target].insert(node);
        self.dirty = true;
    }

    pub fn system_count(&self) -> usize {
        self.stages.iter().map(|s| s.nodes.len()).sum()
    }

    /// Validate every dependency and compute each stage's order. Cheap when
    /// nothing was added since the last call.
    pub fn initialize(&mut self) -> Result<(), ScheduleError> {
        if !self.dirty {
            return Ok(());
        }
        let owners: HashMap<String, StageLabel> = self
            .stages
            .iter()
            .flat_map(|s| s.nodes.iter().map(|n| (n.name.clone(), s.label.clone())))
            .collect();
        for stage in &mut self.stages {
            stage.build_order(&owners)?;
        }
        self.dirty = false;
        Ok(())
    }

    /// System names of `stage` in execution order. `None` for an unknown
    /// stage, and while systems were added since the last
    /// [`initialize`](Self::initialize).
    pub fn execution_order(&self, stage: &StageLabel) -> Option<Vec<&str>> {
        if self.dirty {
            return None;
        }
        let stage = &self.stages[self.stage_index(stage)?];
        Some(stage.order.iter().map(|&i| stage.nodes[i].name.as_str()).collect())
    }

    fn initialize_or_panic(&mut self) {
        if let Err(err) = self.initialize() {
            panic!("invalid system schedule: {err}");
        }
    }

    /// Run one stage on its own, without a tick boundary.
    ///
    /// # Panics
    ///
    /// If the schedule is invalid or the stage does not exist.
    pub fn run_stage(&mut self, stage: &StageLabel, world: &mut World) {
        self.initialize_or_panic();
        let Some(index) = self.stage_index(stage) else {
            panic!("unknown stage `{stage}`");
        };
        #[cfg(feature = "diagnostics")]
        self.timings.clear();
        self.stages[index].run(
            world,
            #[cfg(feature = "diagnostics")]
            &mut self.timings,
        );
    }

    /// One frame: tick boundary, `Time` update, every stage in order.
    ///
    /// # Panics
    ///
    /// If the schedule has a cycle or names an unknown system. Nothing runs
    /// in that case.
    pub fn run_frame(&mut self, world: &mut World, delta: Duration) {
        self.initialize_or_panic();
        world.begin_tick();
        match world.get_resource_mut::<Time>() {
            Some(time) => time.advance(delta),
            None => {
                let mut time = Time::new();
                time.advance(delta);
                world.insert_resource(time);
            }
        }

        #[cfg(feature = "diagnostics")]
        self.timings.clear();
        for stage in &mut self.stages {
            stage.run(
                world,
                #[cfg(feature = "diagnostics")]
                &mut self.timings,
            );
        }
    }

    /// Per-system timings from the most recent frame.
    #[cfg(feature = "diagnostics")]
    pub fn timings(&self) -> &[SystemTiming] {
        &self.timings
    }
}
