//! Per-object LOD scheduler.
//!
//! [`LodRegistry`] keeps one scheduling record per registered object,
//! reclassifies every record once per frame, and throttles how often each
//! object's [`Updatable::update`] actually runs based on its level.
//!
//! The registry only holds [`Weak`] references: dropping the object is enough
//! to unregister it, and the stale record is pruned on the next tick.
//! `tick` and `unregister` are linear in the number of records; that is an
//! accepted limit for the moderate object counts this is used with.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use glam::Vec3;

use crate::classifier::LodSettings;
use crate::level::LodLevel;

/// Something the registry can schedule.
pub trait Updatable {
    /// Advance the object by one (possibly throttled) step.
    fn update(&mut self);

    /// Current world position, used for classification.
    fn position(&self) -> Vec3;

    /// Whether the object must keep updating while culled.
    fn needs_update_when_invisible(&self) -> bool {
        false
    }
}

/// Shared, interior-mutable handle to a schedulable object.
pub type SharedUpdatable = Rc<RefCell<dyn Updatable>>;

struct ScheduledObject {
    handle: Weak<RefCell<dyn Updatable>>,
    position: Vec3,
    lod: LodLevel,
    counter: u32,
    frequency: u32,
    active: bool,
}

impl ScheduledObject {
    fn is(&self, key: *const ()) -> bool {
        self.handle.as_ptr() as *const () == key
    }
}

/// Snapshot of how registered objects are distributed across levels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LodStats {
    /// Number of records at each level, indexed by [`LodLevel::ordinal`].
    pub per_level: [usize; LodLevel::COUNT],
    /// Records that are not paused.
    pub active: usize,
    /// Objects whose update ran during the last tick.
    pub updated_last_tick: usize,
}

impl LodStats {
    /// Records at `level`.
    pub fn count(&self, level: LodLevel) -> usize {
        self.per_level[level.ordinal()]
    }

    /// Total records across all levels.
    pub fn total(&self) -> usize {
        self.per_level.iter().sum()
    }
}

/// Schedules registered objects by distance-based LOD.
pub struct LodRegistry {
    records: Vec<ScheduledObject>,
    settings: LodSettings,
    viewpoint: Vec3,
    updated_last_tick: usize,
}

impl LodRegistry {
    /// Create an empty registry using `settings` for classification.
    pub fn new(settings: LodSettings) -> Self {
        Self {
            records: Vec::new(),
            settings,
            viewpoint: Vec3::ZERO,
            updated_last_tick: 0,
        }
    }

    /// Replace the classification thresholds, e.g. after a quality change.
    pub fn set_settings(&mut self, settings: LodSettings) {
        self.settings = settings;
    }

    /// Current classification thresholds.
    pub fn settings(&self) -> &LodSettings {
        &self.settings
    }

    /// Move the point distances are measured from.
    pub fn set_viewpoint(&mut self, viewpoint: Vec3) {
        self.viewpoint = viewpoint;
    }

    /// Current viewpoint.
    pub fn viewpoint(&self) -> Vec3 {
        self.viewpoint
    }

    /// Start scheduling `object` at `High` detail, updating every frame.
    pub fn register<T: Updatable + 'static>(&mut self, object: &Rc<RefCell<T>>) {
        let shared: SharedUpdatable = object.clone();
        self.register_shared(&shared);
    }

    /// [`register`](Self::register) for an already type-erased handle.
    pub fn register_shared(&mut self, object: &SharedUpdatable) {
        let position = object.borrow().position();
        self.records.push(ScheduledObject {
            handle: Rc::downgrade(object),
            position,
            lod: LodLevel::High,
            counter: 0,
            frequency: 1,
            active: true,
        });
    }

    /// Remove every record for `object`. Returns how many were removed.
    pub fn unregister<T: Updatable + ?Sized>(&mut self, object: &Rc<RefCell<T>>) -> usize {
        let key = key_of(object);
        let before = self.records.len();
        self.records.retain(|r| !r.is(key));
        before - self.records.len()
    }

    /// Pause or resume scheduling without unregistering.
    ///
    /// Returns `false` if `object` is not registered.
    pub fn set_active<T: Updatable + ?Sized>(&mut self, object: &Rc<RefCell<T>>, active: bool) -> bool {
        let key = key_of(object);
        let mut found = false;
        for record in self.records.iter_mut().filter(|r| r.is(key)) {
            record.active = active;
            found = true;
        }
        found
    }

    /// Level assigned to `object` on the last tick.
    pub fn lod_of<T: Updatable + ?Sized>(&self, object: &Rc<RefCell<T>>) -> Option<LodLevel> {
        let key = key_of(object);
        self.records.iter().find(|r| r.is(key)).map(|r| r.lod)
    }

    /// Frames counted since `object` last updated.
    pub fn update_counter<T: Updatable + ?Sized>(&self, object: &Rc<RefCell<T>>) -> Option<u32> {
        let key = key_of(object);
        self.records.iter().find(|r| r.is(key)).map(|r| r.counter)
    }

    /// Number of scheduling records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Run one frame of scheduling. Returns how many objects were updated.
    pub fn tick(&mut self) -> usize {
        let mut updated = 0;

        // Reverse order so pruning a dead record never skips a live one.
        for i in (0..self.records.len()).rev() {
            if !self.records[i].active {
                continue;
            }
            let Some(object) = self.records[i].handle.upgrade() else {
                self.records.remove(i);
                continue;
            };
            let Ok(mut object) = object.try_borrow_mut() else {
                log::warn!("LOD registry: object already borrowed, skipping this frame");
                continue;
            };

            let record = &mut self.records[i];
            record.position = object.position();
            record.lod = self.settings.classify_distance(record.position.distance(self.viewpoint));
            record.frequency = record.lod.update_frequency();
            record.counter = record.counter.saturating_add(1);

            let should_update = if record.lod == LodLevel::Culled {
                object.needs_update_when_invisible()
            } else {
                record.frequency > 0 && record.counter >= record.frequency
            };

            if should_update {
                object.update();
                record.counter = 0;
                updated += 1;
            }
        }

        self.updated_last_tick = updated;
        updated
    }

    /// Histogram of records per level plus activity counters.
    pub fn stats(&self) -> LodStats {
        let mut stats = LodStats {
            updated_last_tick: self.updated_last_tick,
            ..LodStats::default()
        };
        for record in &self.records {
            stats.per_level[record.lod.ordinal()] += 1;
            if record.active {
                stats.active += 1;
            }
        }
        stats
    }
}

impl Default for LodRegistry {
    fn default() -> Self {
        Self::new(LodSettings::default())
    }
}

fn key_of<T: ?Sized>(object: &Rc<RefCell<T>>) -> *const () {
    Rc::as_ptr(object) as *const ()
}
