use std::collections::BTreeMap;

use glam::Vec3;
use netscope_common::{ConnectionId, NetBitSet, ObjectIndex};
use netscope_grid::SpatialGridIndex;
use netscope_locations::ObjectLocationStore;

use crate::config::RelevancyConfig;
use crate::profile::{FilterProfileTable, ProfileId};
use crate::view::{ConnectionViewState, RelevancyState};

/// A pair whose reported relevancy flipped during an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RelevancyChange {
    pub connection: ConnectionId,
    pub object: ObjectIndex,
    pub relevant: bool,
}

/// Work done by one filter update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    /// Objects whose cached location was re-read and re-bucketed.
    pub objects_synced: usize,
    /// Exact distance tests performed.
    pub pairs_evaluated: usize,
    /// (connection, profile) full refreshes.
    pub refreshes: usize,
    /// Radius queries whose cell enumeration hit the cap.
    pub capped_queries: usize,
}

#[derive(Debug, Default)]
pub struct FilterUpdate {
    pub changes: Vec<RelevancyChange>,
    pub stats: FilterStats,
}

/// Location and cull distance an object was last bucketed with.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bucketed {
    location: Vec3,
    cull_distance: f32,
}

#[derive(Debug, Clone)]
struct FilteredObject {
    requested_profile: Option<String>,
    profile: ProfileId,
    bucketed: Option<Bucketed>,
}

/// Grid for one profile plus the multiset of cull distances bucketed in it.
#[derive(Debug, Clone)]
struct ProfileGrid {
    index: SpatialGridIndex,
    cull_distances: BTreeMap<u32, u32>,
}

impl ProfileGrid {
    fn new(table: &FilterProfileTable, id: ProfileId) -> Self {
        Self {
            index: SpatialGridIndex::new(table.get(id).cell_size()),
            cull_distances: BTreeMap::new(),
        }
    }

    /// Largest cull distance of any object in the grid; the search radius.
    fn max_cull_distance(&self) -> f32 {
        self.cull_distances
            .last_key_value()
            .map_or(0.0, |(bits, _)| f32::from_bits(*bits))
    }

    fn insert(&mut self, object: ObjectIndex, old: Option<Bucketed>, new: Bucketed) {
        if let Some(old) = old {
            self.release_cull_distance(old.cull_distance);
        }
        *self.cull_distances.entry(cull_key(new.cull_distance)).or_default() += 1;
        self.index.update(object, old.map(|b| b.location), new.location);
    }

    fn remove(&mut self, object: ObjectIndex, old: Bucketed) {
        self.release_cull_distance(old.cull_distance);
        self.index.remove(object);
    }

    fn release_cull_distance(&mut self, cull_distance: f32) {
        let key = cull_key(cull_distance);
        if let Some(count) = self.cull_distances.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                self.cull_distances.remove(&key);
            }
        }
    }
}

/// Orderable key for a cull distance. Non-positive and NaN values collapse
/// to zero so that bit order matches numeric order.
fn cull_key(cull_distance: f32) -> u32 {
    if cull_distance.is_nan() || cull_distance <= 0.0 {
        0
    } else {
        cull_distance.to_bits()
    }
}

/// Grid-based relevancy filter.
///
/// Objects are bucketed per profile into a [`SpatialGridIndex`] using the
/// location cached in the [`ObjectLocationStore`]. Each update, every
/// connection exact-tests the objects that changed, the pairs inside their
/// hysteresis window and, on its refresh cadence, every grid candidate within
/// the largest cull distance around each of its views.
///
/// # Invariants
/// - An object is bucketed in the grid of its current profile only.
/// - Removing an object bumps its generation; per-connection state recorded
///   under an older generation is stale and pruned lazily.
/// - Removing a connection drops all of its pair state.
#[derive(Debug)]
pub struct RelevancyFilter {
    name: String,
    profiles: FilterProfileTable,
    max_cells_per_query: usize,
    objects: Vec<Option<FilteredObject>>,
    generations: Vec<u32>,
    attached: NetBitSet,
    newly_attached: NetBitSet,
    grids: Vec<ProfileGrid>,
    connections: BTreeMap<ConnectionId, ConnectionViewState>,
    warned_capped: bool,
}

impl RelevancyFilter {
    pub fn new(name: impl Into<String>, config: &RelevancyConfig) -> Self {
        let profiles = config.profile_table();
        let grids = profiles
            .iter()
            .map(|(id, _, _)| ProfileGrid::new(&profiles, id))
            .collect();
        Self {
            name: name.into(),
            profiles,
            max_cells_per_query: config.max_cells_per_query,
            objects: Vec::new(),
            generations: Vec::new(),
            attached: NetBitSet::new(),
            newly_attached: NetBitSet::new(),
            grids,
            connections: BTreeMap::new(),
            warned_capped: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn profiles(&self) -> &FilterProfileTable {
        &self.profiles
    }

    /// Attach an object, binding it to the named profile. Missing or unknown
    /// names bind the default profile. Re-attaching rebinds the profile and
    /// keeps existing pair state.
    pub fn add_object(&mut self, object: ObjectIndex, profile: Option<&str>) {
        let index = object.index();
        if self.objects.len() <= index {
            self.objects.resize(index + 1, None);
            self.generations.resize(index + 1, 0);
        }
        let resolved = self.profiles.resolve(profile);

        if let Some(existing) = self.objects[index].as_mut() {
            if existing.profile != resolved {
                if let Some(bucketed) = existing.bucketed.take() {
                    self.grids[existing.profile.index()].remove(object, bucketed);
                }
                existing.profile = resolved;
            }
            existing.requested_profile = profile.map(str::to_string);
        } else {
            self.objects[index] = Some(FilteredObject {
                requested_profile: profile.map(str::to_string),
                profile: resolved,
                bucketed: None,
            });
            self.attached.insert(index);
        }
        self.newly_attached.insert(index);
        tracing::debug!(
            filter = %self.name,
            %object,
            profile = self.profiles.name(resolved),
            "object attached"
        );
    }

    /// Detach an object. All of its pair state becomes stale at once.
    pub fn remove_object(&mut self, object: ObjectIndex) -> bool {
        let index = object.index();
        let Some(removed) = self.objects.get_mut(index).and_then(Option::take) else {
            return false;
        };
        if let Some(bucketed) = removed.bucketed {
            self.grids[removed.profile.index()].remove(object, bucketed);
        }
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.attached.remove(index);
        self.newly_attached.remove(index);
        tracing::debug!(filter = %self.name, %object, "object detached");
        true
    }

    pub fn has_object(&self, object: ObjectIndex) -> bool {
        self.attached.contains(object.index())
    }

    pub fn object_count(&self) -> usize {
        self.attached.count()
    }

    /// Profile an attached object is bound to.
    pub fn object_profile(&self, object: ObjectIndex) -> Option<ProfileId> {
        self.filtered(object).map(|o| o.profile)
    }

    /// Start tracking a connection. Its first update refreshes every profile.
    pub fn add_connection(&mut self, connection: ConnectionId) -> bool {
        if self.connections.contains_key(&connection) {
            return false;
        }
        self.connections.insert(connection, ConnectionViewState::new());
        true
    }

    /// Drop a connection and all of its pair state.
    pub fn remove_connection(&mut self, connection: ConnectionId) -> bool {
        self.connections.remove(&connection).is_some()
    }

    pub fn has_connection(&self, connection: ConnectionId) -> bool {
        self.connections.contains_key(&connection)
    }

    /// Replace the view points of a connection. Returns false if unknown.
    pub fn set_views(&mut self, connection: ConnectionId, views: &[Vec3]) -> bool {
        match self.connections.get_mut(&connection) {
            Some(state) => {
                state.set_views(views);
                true
            }
            None => false,
        }
    }

    pub fn views(&self, connection: ConnectionId) -> &[Vec3] {
        self.connections
            .get(&connection)
            .map_or(&[], |state| state.views())
    }

    /// Run one evaluation pass against the store's current dirty state.
    pub fn update(&mut self, store: &ObjectLocationStore) -> FilterUpdate {
        let _span = tracing::info_span!("relevancy_filter_update", filter = %self.name).entered();
        let mut update = FilterUpdate::default();

        let (changed, moved) = self.sync_objects(store);
        update.stats.objects_synced = changed.len();

        let Self {
            name,
            profiles,
            max_cells_per_query,
            objects,
            generations,
            grids,
            connections,
            warned_capped,
            ..
        } = self;
        let search_radii: Vec<f32> = grids.iter().map(ProfileGrid::max_cull_distance).collect();

        let mut candidates = Vec::new();
        for (&connection, view) in connections.iter_mut() {
            candidates.clear();
            candidates.extend_from_slice(&changed);
            candidates.extend(view.pending_objects());

            for (profile_id, profile_name, profile) in profiles.iter() {
                if !view.tick_refresh(profile_id.index(), profile.view_pos_relevancy_frame_count) {
                    continue;
                }
                update.stats.refreshes += 1;
                let grid = &grids[profile_id.index()];
                let radius = search_radii[profile_id.index()];
                if grid.index.object_count() > 0 {
                    for &view_point in view.views() {
                        let query = grid.index.for_each_in_radius(
                            view_point,
                            radius,
                            *max_cells_per_query,
                            |object| candidates.push(object),
                        );
                        if query.capped {
                            update.stats.capped_queries += 1;
                            if !*warned_capped {
                                *warned_capped = true;
                                tracing::warn!(
                                    filter = %name,
                                    profile = profile_name,
                                    radius,
                                    max_cells = *max_cells_per_query,
                                    "cell enumeration capped; scanning occupied cells instead"
                                );
                            }
                        }
                    }
                }
                candidates.extend(view.tracked_objects().filter(|object| {
                    objects
                        .get(object.index())
                        .and_then(Option::as_ref)
                        .is_none_or(|o| o.profile == profile_id)
                }));
            }

            candidates.sort_unstable();
            candidates.dedup();

            for &object in &candidates {
                let Some(filtered) = objects.get(object.index()).and_then(Option::as_ref) else {
                    view.forget(object);
                    continue;
                };
                let Some(bucketed) = filtered.bucketed else {
                    continue;
                };
                let profile = profiles.get(filtered.profile);
                // Location moves get one refresh cadence of grace.
                let grace = if moved.contains(object.index()) {
                    profile.view_pos_relevancy_frame_count
                } else {
                    0
                };
                let in_range = view.in_range(bucketed.location, bucketed.cull_distance);
                update.stats.pairs_evaluated += 1;
                if let Some(relevant) = view.record_test(
                    object,
                    generations[object.index()],
                    in_range,
                    grace,
                    profile.frame_count_before_culling,
                ) {
                    tracing::trace!(%connection, %object, relevant, "relevancy changed");
                    update.changes.push(RelevancyChange {
                        connection,
                        object,
                        relevant,
                    });
                }
            }
        }

        self.newly_attached.clear();
        tracing::trace!(
            synced = update.stats.objects_synced,
            evaluated = update.stats.pairs_evaluated,
            refreshes = update.stats.refreshes,
            changes = update.changes.len(),
            "relevancy filter updated"
        );
        update
    }

    /// Re-read dirty, frequently updated and newly attached objects from the
    /// store and re-bucket them. Returns the synced objects in index order and
    /// the set of previously bucketed objects whose location changed.
    fn sync_objects(&mut self, store: &ObjectLocationStore) -> (Vec<ObjectIndex>, NetBitSet) {
        let mut pending = self.newly_attached.clone();
        for object in store
            .dirty_objects()
            .iter()
            .chain(store.objects_requiring_frequent_update().iter())
        {
            if self.attached.contains(object) {
                pending.insert(object);
            }
        }

        let mut synced = Vec::with_capacity(pending.count());
        let mut moved = NetBitSet::new();
        for object in pending.objects() {
            let Some(filtered) = self.objects.get_mut(object.index()).and_then(Option::as_mut)
            else {
                continue;
            };
            let info = store.get_world_info(object);
            let next = Bucketed {
                location: info.location,
                cull_distance: info.cull_distance,
            };
            if filtered
                .bucketed
                .is_some_and(|prev| prev.location != next.location)
            {
                moved.insert(object.index());
            }
            if filtered.bucketed != Some(next) {
                self.grids[filtered.profile.index()].insert(object, filtered.bucketed, next);
                filtered.bucketed = Some(next);
            }
            synced.push(object);
        }
        (synced, moved)
    }

    /// Apply a reloaded configuration: replace the profile table, re-resolve
    /// every object's profile, rebuild the grids and force a full refresh on
    /// every connection.
    pub fn reload(&mut self, config: &RelevancyConfig) {
        self.profiles = config.profile_table();
        self.max_cells_per_query = config.max_cells_per_query;
        self.warned_capped = false;
        self.grids = self
            .profiles
            .iter()
            .map(|(id, _, _)| ProfileGrid::new(&self.profiles, id))
            .collect();

        for (index, slot) in self.objects.iter_mut().enumerate() {
            let Some(filtered) = slot.as_mut() else {
                continue;
            };
            filtered.profile = self.profiles.resolve(filtered.requested_profile.as_deref());
            if let Some(bucketed) = filtered.bucketed {
                self.grids[filtered.profile.index()].insert(
                    ObjectIndex(index as u32),
                    None,
                    bucketed,
                );
            }
        }
        for view in self.connections.values_mut() {
            view.force_refresh();
        }
        tracing::info!(
            filter = %self.name,
            profiles = self.profiles.len(),
            objects = self.object_count(),
            "relevancy filter reloaded"
        );
    }

    pub fn relevancy_state(&self, connection: ConnectionId, object: ObjectIndex) -> RelevancyState {
        let Some(view) = self.connections.get(&connection) else {
            return RelevancyState::Unknown;
        };
        if !self.has_object(object) {
            return RelevancyState::Unknown;
        }
        view.state(object, self.generations[object.index()])
    }

    /// Whether the pair is reported relevant. Unknown pairs are not.
    pub fn is_relevant(&self, connection: ConnectionId, object: ObjectIndex) -> bool {
        self.relevancy_state(connection, object).is_relevant()
    }

    /// Objects currently relevant to a connection, in index order.
    pub fn relevant_objects(&self, connection: ConnectionId) -> Vec<ObjectIndex> {
        let Some(view) = self.connections.get(&connection) else {
            return Vec::new();
        };
        let mut relevant: Vec<ObjectIndex> = view
            .relevant_objects(|object| {
                self.has_object(object)
                    .then(|| self.generations[object.index()])
            })
            .collect();
        relevant.sort_unstable();
        relevant
    }

    /// Largest cull distance currently bucketed under a profile.
    pub fn search_radius(&self, profile: ProfileId) -> f32 {
        self.grids
            .get(profile.index())
            .map_or(0.0, ProfileGrid::max_cull_distance)
    }

    fn filtered(&self, object: ObjectIndex) -> Option<&FilteredObject> {
        self.objects.get(object.index()).and_then(Option::as_ref)
    }
}
