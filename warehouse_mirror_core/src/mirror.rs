use std::{
    collections::{BTreeMap, BTreeSet},
    time::{Duration, Instant},
};

use glam::{Quat, Vec3};
use tracing::{debug, info, warn};

use crate::{
    AgentId, MirrorConfig, MirrorError,
    scene::{EntityFactory, EntityKind},
    snapshot::{BoxKey, RemoteSnapshot, ValidatedSnapshot},
};

/// Agents and shelves stand on the floor.
const FLOOR_HEIGHT: f32 = 0.0;

/// Local proxy for a server agent.
#[derive(Debug, Clone)]
pub struct AgentEntity<H> {
    pub handle: H,
    pub position: Vec3,
    pub orientation: Quat,
    pub carrying: bool,
}

impl<H> AgentEntity<H> {
    /// Heading in degrees about the vertical axis; 0 faces +z.
    pub fn heading_degrees(&self) -> f32 {
        let forward = self.orientation * Vec3::Z;
        forward.x.atan2(forward.z).to_degrees()
    }
}

/// Local proxy for a loose box.
#[derive(Debug, Clone)]
pub struct BoxEntity<H> {
    pub handle: H,
    pub position: Vec3,
}

/// Local proxy for a shelf and the boxes stacked on it.
#[derive(Debug, Clone)]
pub struct ShelfEntity<H> {
    pub handle: H,
    pub position: Vec3,
    pub stack: Vec<H>,
}

impl<H> ShelfEntity<H> {
    pub fn box_count(&self) -> usize {
        self.stack.len()
    }

    pub fn is_full(&self, capacity: usize) -> bool {
        self.stack.len() >= capacity
    }
}

/// Scene mutations for one entity category.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CategoryReport {
    pub created: usize,
    pub updated: usize,
    pub destroyed: usize,
}

/// Summary of what one `initialize` or `reconcile` call changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub agents: CategoryReport,
    pub boxes: CategoryReport,
    pub shelf_boxes: CategoryReport,
    /// Snapshot shelves whose position matched no local shelf.
    pub ignored_shelves: usize,
}

/// Keeps a local set of scene proxies in step with the server's snapshots.
///
/// Every call validates the complete snapshot before touching the scene, so
/// a rejected snapshot leaves both the mirror and the scene unchanged.
pub struct StateMirror<F: EntityFactory> {
    factory: F,
    config: MirrorConfig,
    agents: BTreeMap<AgentId, AgentEntity<F::Handle>>,
    boxes: BTreeMap<BoxKey, BoxEntity<F::Handle>>,
    shelves: Vec<ShelfEntity<F::Handle>>,
    initialized: bool,
    step: u64,
    last_update: Option<Instant>,
}

impl<F: EntityFactory> StateMirror<F> {
    pub fn new(factory: F, config: MirrorConfig) -> Self {
        StateMirror {
            factory,
            config,
            agents: BTreeMap::new(),
            boxes: BTreeMap::new(),
            shelves: Vec::new(),
            initialized: false,
            step: 0,
            last_update: None,
        }
    }

    /// Creates one proxy for every agent, box and shelf in `snapshot`.
    ///
    /// Shelves are fixed from here on. Two shelves sharing a position is a
    /// configuration error.
    pub fn initialize(&mut self, snapshot: &RemoteSnapshot) -> Result<ReconcileReport, MirrorError> {
        if self.initialized {
            return Err(MirrorError::AlreadyInitialized);
        }
        let plan = snapshot.validate()?;
        for (index, shelf) in plan.shelves.iter().enumerate() {
            if plan.shelves[..index].iter().any(|s| s.position == shelf.position) {
                return Err(MirrorError::DuplicateShelfPosition {
                    x: shelf.position.x,
                    y: shelf.position.y,
                });
            }
        }

        let mut report = ReconcileReport::default();
        for agent in &plan.agents {
            let position = agent.position.to_scene(FLOOR_HEIGHT);
            let handle = self.factory.spawn(EntityKind::Agent, position);
            self.agents.insert(
                agent.id,
                AgentEntity {
                    handle,
                    position,
                    orientation: Quat::IDENTITY,
                    carrying: agent.carrying,
                },
            );
            report.agents.created += 1;
        }
        report.boxes = self.apply_boxes(&plan);
        for shelf in plan.shelves {
            let position = shelf.position.to_scene(FLOOR_HEIGHT);
            let handle = self.factory.spawn(EntityKind::Shelf, position);
            let mut entity = ShelfEntity {
                handle,
                position,
                stack: Vec::new(),
            };
            let (_, created) = rebuild_stack(
                &mut self.factory,
                &mut entity,
                shelf.box_count,
                self.config.stack_step,
            );
            report.shelf_boxes.created += created;
            self.shelves.push(entity);
        }

        self.initialized = true;
        info!(
            agents = self.agents.len(),
            boxes = self.boxes.len(),
            shelves = self.shelves.len(),
            "mirror initialized"
        );
        Ok(report)
    }

    /// Applies `snapshot`, using the time since the previous reconcile to
    /// smooth agent turns. The first reconcile after `initialize` has nothing
    /// to measure from and assumes `default_elapsed_ms`.
    pub fn reconcile(&mut self, snapshot: &RemoteSnapshot) -> Result<ReconcileReport, MirrorError> {
        let elapsed = self
            .last_update
            .map(|at| at.elapsed())
            .unwrap_or(Duration::from_millis(self.config.default_elapsed_ms));
        self.reconcile_after(snapshot, elapsed)
    }

    /// Applies `snapshot` as if `elapsed` had passed since the previous one.
    ///
    /// Order: agents, then boxes, then shelf stacks.
    pub fn reconcile_after(
        &mut self,
        snapshot: &RemoteSnapshot,
        elapsed: Duration,
    ) -> Result<ReconcileReport, MirrorError> {
        if !self.initialized {
            return Err(MirrorError::NotInitialized);
        }
        let plan = snapshot.validate()?;

        let mut report = ReconcileReport {
            agents: self.apply_agents(&plan, elapsed),
            boxes: self.apply_boxes(&plan),
            ..ReconcileReport::default()
        };
        self.apply_shelves(&plan, &mut report);

        self.step += 1;
        self.last_update = Some(Instant::now());
        debug!(step = self.step, ?report, "snapshot reconciled");
        Ok(report)
    }

    fn apply_agents(&mut self, plan: &ValidatedSnapshot<'_>, elapsed: Duration) -> CategoryReport {
        let blend = 1.0 - (-self.config.turn_rate * elapsed.as_secs_f32()).exp();
        let mut report = CategoryReport::default();

        for agent in &plan.agents {
            let target = agent.position.to_scene(FLOOR_HEIGHT);
            match self.agents.get_mut(&agent.id) {
                Some(entity) => {
                    let displacement = target - entity.position;
                    let flat = Vec3::new(displacement.x, 0.0, displacement.z);
                    if flat.length_squared() > f32::EPSILON {
                        let facing = Quat::from_rotation_y(flat.x.atan2(flat.z));
                        entity.orientation = entity.orientation.slerp(facing, blend).normalize();
                        self.factory.set_orientation(entity.handle, entity.orientation);
                    }
                    entity.position = target;
                    entity.carrying = agent.carrying;
                    self.factory.set_position(entity.handle, target);
                    report.updated += 1;
                }
                None => {
                    let handle = self.factory.spawn(EntityKind::Agent, target);
                    self.agents.insert(
                        agent.id,
                        AgentEntity {
                            handle,
                            position: target,
                            orientation: Quat::IDENTITY,
                            carrying: agent.carrying,
                        },
                    );
                    report.created += 1;
                }
            }
        }
        report
    }

    fn apply_boxes(&mut self, plan: &ValidatedSnapshot<'_>) -> CategoryReport {
        let mut report = CategoryReport::default();
        let mut present = BTreeSet::new();

        for (key, position) in &plan.boxes {
            let target = position.to_scene(self.config.box_height);
            present.insert(*key);
            match self.boxes.get_mut(key) {
                Some(entity) => {
                    entity.position = target;
                    self.factory.set_position(entity.handle, target);
                    report.updated += 1;
                }
                None => {
                    let handle = self.factory.spawn(EntityKind::Box, target);
                    self.boxes.insert(
                        *key,
                        BoxEntity {
                            handle,
                            position: target,
                        },
                    );
                    report.created += 1;
                }
            }
        }

        let factory = &mut self.factory;
        self.boxes.retain(|key, entity| {
            if present.contains(key) {
                return true;
            }
            factory.despawn(entity.handle);
            report.destroyed += 1;
            false
        });
        report
    }

    fn apply_shelves(&mut self, plan: &ValidatedSnapshot<'_>, report: &mut ReconcileReport) {
        for shelf in plan.shelves {
            let target = shelf.position.to_scene(FLOOR_HEIGHT);
            let Some(entity) = self
                .shelves
                .iter_mut()
                .find(|s| s.position.x == target.x && s.position.z == target.z)
            else {
                warn!(
                    x = shelf.position.x,
                    y = shelf.position.y,
                    "snapshot shelf matches no local shelf, ignoring"
                );
                report.ignored_shelves += 1;
                continue;
            };
            let (destroyed, created) = rebuild_stack(
                &mut self.factory,
                entity,
                shelf.box_count,
                self.config.stack_step,
            );
            report.shelf_boxes.destroyed += destroyed;
            report.shelf_boxes.created += created;
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Number of snapshots reconciled since initialization.
    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn agent(&self, id: AgentId) -> Option<&AgentEntity<F::Handle>> {
        self.agents.get(&id)
    }

    pub fn agents(&self) -> impl Iterator<Item = (AgentId, &AgentEntity<F::Handle>)> {
        self.agents.iter().map(|(id, agent)| (*id, agent))
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn carrying_count(&self) -> usize {
        self.agents.values().filter(|a| a.carrying).count()
    }

    pub fn boxes(&self) -> impl Iterator<Item = (BoxKey, &BoxEntity<F::Handle>)> {
        self.boxes.iter().map(|(key, entity)| (*key, entity))
    }

    pub fn box_count(&self) -> usize {
        self.boxes.len()
    }

    pub fn shelves(&self) -> &[ShelfEntity<F::Handle>] {
        &self.shelves
    }

    /// True once every shelf holds at least `capacity` boxes. A warehouse
    /// without shelves is never full.
    pub fn all_shelves_full(&self, capacity: usize) -> bool {
        !self.shelves.is_empty() && self.shelves.iter().all(|s| s.is_full(capacity))
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }
}

/// Replaces a shelf's stack with `count` fresh boxes. Returns
/// `(destroyed, created)`.
fn rebuild_stack<F: EntityFactory>(
    factory: &mut F,
    shelf: &mut ShelfEntity<F::Handle>,
    count: u32,
    step: f32,
) -> (usize, usize) {
    let destroyed = shelf.stack.len();
    for handle in shelf.stack.drain(..) {
        factory.despawn(handle);
    }
    for level in 1..=count {
        let position = Vec3::new(shelf.position.x, level as f32 * step, shelf.position.z);
        let handle = factory.spawn_child(shelf.handle, EntityKind::ShelfBox, position);
        shelf.stack.push(handle);
    }
    (destroyed, count as usize)
}
