use glam::Vec3;
use netscope_common::{NetBitSet, ObjectIndex, WorldBounds};

/// Default ceiling above which a cull distance is reported as suspicious.
pub const DEFAULT_MAX_NET_CULL_DISTANCE: f32 = 150_000.0;

const NO_SLOT: u32 = u32::MAX;

/// Store-wide settings, injected at construction and replaceable on reload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationConfig {
    /// Volume that cached locations are clamped into.
    pub bounds: WorldBounds,
    /// Soft cap used only for diagnostics.
    pub max_net_cull_distance: f32,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            bounds: WorldBounds::default(),
            max_net_cull_distance: DEFAULT_MAX_NET_CULL_DISTANCE,
        }
    }
}

/// Cached spatial state of one registered object.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ObjectRecord {
    pub location: Vec3,
    pub cull_distance: f32,
    pub cull_distance_override: Option<f32>,
}

impl ObjectRecord {
    /// The override when present, otherwise the base cull distance.
    pub fn effective_cull_distance(&self) -> f32 {
        self.cull_distance_override.unwrap_or(self.cull_distance)
    }
}

/// Location and effective cull distance as seen by relevancy filters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldInfo {
    pub location: Vec3,
    pub cull_distance: f32,
}

/// Counters for conditions that are logged but never fail an operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocationDiagnostics {
    /// `set_info` calls whose cull distance exceeded `max_net_cull_distance`.
    pub oversized_cull_distances: u64,
    /// Mutations addressed to unregistered handles.
    pub invalid_handle_updates: u64,
}

/// Per-object world location cache with dirty tracking.
///
/// Records live in a slot arena: `slots` maps a handle to its slot and
/// `free_slots` marks slots available for reuse. The arena never shrinks.
///
/// # Invariants
/// - A record exists for a handle iff the handle is registered (`valid`).
/// - `dirty` and `needs_frequent_update` are subsets of `valid`.
/// - `dirty` is only cleared by [`ObjectLocationStore::end_cycle`].
/// - Location, cull distance and override mutations are rejected by a debug
///   assertion while the dirty list is locked.
#[derive(Debug, Default)]
pub struct ObjectLocationStore {
    config: LocationConfig,
    slots: Vec<u32>,
    records: Vec<ObjectRecord>,
    free_slots: NetBitSet,
    valid: NetBitSet,
    dirty: NetBitSet,
    needs_frequent_update: NetBitSet,
    dirty_list_locked: bool,
    diagnostics: LocationDiagnostics,
}

impl ObjectLocationStore {
    pub fn new(config: LocationConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &LocationConfig {
        &self.config
    }

    /// Replace the store configuration. Cached locations are re-clamped into
    /// the new bounds and marked dirty when that moves them.
    pub fn apply_config(&mut self, config: LocationConfig) {
        self.assert_unlocked("apply_config", None);
        self.config = config;
        let Self {
            slots,
            records,
            valid,
            dirty,
            ..
        } = self;
        for index in valid.iter() {
            let record = &mut records[slots[index] as usize];
            let clamped = config.bounds.clamp(record.location);
            if clamped != record.location {
                record.location = clamped;
                dirty.insert(index);
            }
        }
        tracing::debug!(
            min = ?config.bounds.min,
            max = ?config.bounds.max,
            max_net_cull_distance = config.max_net_cull_distance,
            "location config applied"
        );
    }

    /// Grow handle-indexed storage to cover handles below `max_index`.
    pub fn on_max_index_increased(&mut self, max_index: u32) {
        let len = max_index as usize;
        if self.slots.len() < len {
            self.slots.resize(len, NO_SLOT);
        }
        self.valid.grow_to(len);
        self.dirty.grow_to(len);
        self.needs_frequent_update.grow_to(len);
    }

    /// Register a handle. Only the first call allocates a slot.
    ///
    /// Returns true if the handle was newly registered.
    pub fn register(&mut self, object: ObjectIndex) -> bool {
        self.assert_unlocked("register", Some(object));
        if self.has_info(object) {
            return false;
        }
        self.on_max_index_increased(object.0.saturating_add(1));

        let slot = match self.free_slots.first() {
            Some(slot) => {
                self.free_slots.remove(slot);
                debug_assert_eq!(self.records[slot], ObjectRecord::default());
                slot
            }
            None => {
                self.records.push(ObjectRecord::default());
                self.records.len() - 1
            }
        };
        self.slots[object.index()] = slot as u32;
        self.valid.insert(object.index());
        tracing::trace!(%object, slot, "registered world location");
        true
    }

    /// Unregister a handle, returning its slot to the free list.
    ///
    /// Returns false if the handle was not registered.
    pub fn unregister(&mut self, object: ObjectIndex) -> bool {
        self.assert_unlocked("unregister", Some(object));
        if !self.has_info(object) {
            return false;
        }
        let index = object.index();
        self.valid.remove(index);
        self.dirty.remove(index);
        self.needs_frequent_update.remove(index);

        let slot = self.slots[index];
        self.slots[index] = NO_SLOT;
        self.records[slot as usize] = ObjectRecord::default();
        self.free_slots.insert(slot as usize);
        tracing::trace!(%object, slot, "unregistered world location");
        true
    }

    /// Update the cached location and base cull distance of an object.
    ///
    /// The location is clamped into the world bounds. Returns false if the
    /// handle is not registered.
    pub fn set_info(&mut self, object: ObjectIndex, location: Vec3, cull_distance: f32) -> bool {
        self.assert_unlocked("set_info", Some(object));
        if !self.has_info(object) {
            self.diagnostics.invalid_handle_updates += 1;
            tracing::warn!(%object, "set_info on an object without a world location record");
            return false;
        }

        if cull_distance > self.config.max_net_cull_distance {
            self.diagnostics.oversized_cull_distances += 1;
            tracing::warn!(
                %object,
                cull_distance,
                max_net_cull_distance = self.config.max_net_cull_distance,
                "cull distance exceeds the configured maximum"
            );
        }

        let clamped = self.config.bounds.clamp(location);
        let index = object.index();
        let record = &mut self.records[self.slots[index] as usize];
        let changed = record.location != clamped || record.cull_distance != cull_distance;
        record.location = clamped;
        record.cull_distance = cull_distance;
        if changed {
            self.dirty.insert(index);
        }
        true
    }

    /// Override the cull distance of an object.
    ///
    /// Returns true only if the handle is registered and the value changed.
    pub fn set_cull_distance_override(&mut self, object: ObjectIndex, cull_distance: f32) -> bool {
        self.assert_unlocked("set_cull_distance_override", Some(object));
        let Some(record) = self.record_mut(object) else {
            self.diagnostics.invalid_handle_updates += 1;
            return false;
        };
        if record.cull_distance_override == Some(cull_distance) {
            return false;
        }
        record.cull_distance_override = Some(cull_distance);
        self.dirty.insert(object.index());
        true
    }

    /// Remove a cull distance override.
    ///
    /// Returns true only if the handle is registered and had an override.
    pub fn clear_cull_distance_override(&mut self, object: ObjectIndex) -> bool {
        self.assert_unlocked("clear_cull_distance_override", Some(object));
        let Some(record) = self.record_mut(object) else {
            self.diagnostics.invalid_handle_updates += 1;
            return false;
        };
        if record.cull_distance_override.take().is_none() {
            return false;
        }
        self.dirty.insert(object.index());
        true
    }

    /// Flag an object for re-evaluation every tick regardless of dirtiness.
    ///
    /// Returns false if the handle is not registered.
    pub fn set_requires_frequent_update(&mut self, object: ObjectIndex, required: bool) -> bool {
        if !self.has_info(object) {
            return false;
        }
        if required {
            self.needs_frequent_update.insert(object.index());
        } else {
            self.needs_frequent_update.remove(object.index());
        }
        true
    }

    /// Enter or leave the send window.
    pub fn lock_dirty_list(&mut self, locked: bool) {
        self.dirty_list_locked = locked;
    }

    pub fn is_dirty_list_locked(&self) -> bool {
        self.dirty_list_locked
    }

    /// Close the cycle. This is the only place the dirty set is cleared.
    pub fn end_cycle(&mut self) {
        self.dirty.clear();
    }

    pub fn has_info(&self, object: ObjectIndex) -> bool {
        self.valid.contains(object.index())
    }

    pub fn record(&self, object: ObjectIndex) -> Option<&ObjectRecord> {
        if !self.has_info(object) {
            return None;
        }
        self.records.get(self.slots[object.index()] as usize)
    }

    /// Location and effective cull distance, if registered.
    pub fn world_info(&self, object: ObjectIndex) -> Option<WorldInfo> {
        self.record(object).map(|record| WorldInfo {
            location: record.location,
            cull_distance: record.effective_cull_distance(),
        })
    }

    /// Like [`Self::world_info`] but unregistered handles read as zero.
    pub fn get_world_info(&self, object: ObjectIndex) -> WorldInfo {
        self.world_info(object).unwrap_or_default()
    }

    /// Cached (clamped) location, or zero for unregistered handles.
    pub fn location(&self, object: ObjectIndex) -> Vec3 {
        self.record(object).map_or(Vec3::ZERO, |r| r.location)
    }

    /// Effective cull distance, or zero for unregistered handles.
    pub fn cull_distance(&self, object: ObjectIndex) -> f32 {
        self.record(object)
            .map_or(0.0, ObjectRecord::effective_cull_distance)
    }

    pub fn base_cull_distance(&self, object: ObjectIndex) -> f32 {
        self.record(object).map_or(0.0, |r| r.cull_distance)
    }

    pub fn cull_distance_override(&self, object: ObjectIndex) -> Option<f32> {
        self.record(object).and_then(|r| r.cull_distance_override)
    }

    pub fn is_dirty(&self, object: ObjectIndex) -> bool {
        self.dirty.contains(object.index())
    }

    pub fn requires_frequent_update(&self, object: ObjectIndex) -> bool {
        self.needs_frequent_update.contains(object.index())
    }

    /// Whether a raw location lies inside the world bounds.
    pub fn is_valid_location(&self, location: Vec3) -> bool {
        self.config.bounds.contains(location)
    }

    pub fn valid_objects(&self) -> &NetBitSet {
        &self.valid
    }

    pub fn dirty_objects(&self) -> &NetBitSet {
        &self.dirty
    }

    pub fn objects_requiring_frequent_update(&self) -> &NetBitSet {
        &self.needs_frequent_update
    }

    /// Number of registered objects.
    pub fn object_count(&self) -> usize {
        self.valid.count()
    }

    /// Number of allocated record slots, free or in use.
    pub fn slot_capacity(&self) -> usize {
        self.records.len()
    }

    pub fn diagnostics(&self) -> &LocationDiagnostics {
        &self.diagnostics
    }

    fn record_mut(&mut self, object: ObjectIndex) -> Option<&mut ObjectRecord> {
        if !self.has_info(object) {
            return None;
        }
        self.records.get_mut(self.slots[object.index()] as usize)
    }

    fn assert_unlocked(&self, operation: &str, object: Option<ObjectIndex>) {
        debug_assert!(
            !self.dirty_list_locked,
            "{operation} ({object:?}) called while the dirty list is locked"
        );
    }
}
