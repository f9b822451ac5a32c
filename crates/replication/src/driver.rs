use std::collections::BTreeMap;
use std::time::Instant;

use glam::Vec3;
use netscope_common::{ConnectionId, FilterHandle, NetBitSet, ObjectIndex};
use netscope_filter::{
    ConfigError, RelevancyChange, RelevancyConfig, RelevancyFilter, RelevancyState,
};
use netscope_locations::{ObjectLocationStore, WorldInfo};

use crate::source::WorldInfoSource;
use crate::stats::{TickHistory, TickStats};

/// Outcome of one [`ReplicationDriver::update_and_send`] call.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Relevancy transitions, ordered by connection then object.
    pub changes: Vec<RelevancyChange>,
    pub stats: TickStats,
}

/// Owns the location store and the relevancy filters and drives the tick.
///
/// A tick runs: poll world info, lock the dirty list, run every filter,
/// build the report, end the cycle, unlock. Mutations between ticks are
/// free; mutations inside the send window trip the store's debug assertion.
pub struct ReplicationDriver {
    config: RelevancyConfig,
    store: ObjectLocationStore,
    filters: Vec<RelevancyFilter>,
    object_filters: BTreeMap<ObjectIndex, FilterHandle>,
    connections: BTreeMap<ConnectionId, Vec<Vec3>>,
    source: Option<Box<dyn WorldInfoSource>>,
    poll_queue: NetBitSet,
    warned_out_of_bounds: NetBitSet,
    tick: u64,
    history: TickHistory,
}

impl ReplicationDriver {
    pub fn new(config: RelevancyConfig) -> Self {
        Self {
            store: ObjectLocationStore::new(config.location_config()),
            config,
            filters: Vec::new(),
            object_filters: BTreeMap::new(),
            connections: BTreeMap::new(),
            source: None,
            poll_queue: NetBitSet::new(),
            warned_out_of_bounds: NetBitSet::new(),
            tick: 0,
            history: TickHistory::default(),
        }
    }

    /// Attach the world info source polled at the start of each tick.
    pub fn with_source(mut self, source: impl WorldInfoSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn set_source(&mut self, source: Option<Box<dyn WorldInfoSource>>) {
        self.source = source;
    }

    pub fn config(&self) -> &RelevancyConfig {
        &self.config
    }

    pub fn store(&self) -> &ObjectLocationStore {
        &self.store
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn history(&self) -> &TickHistory {
        &self.history
    }

    // Objects

    /// Register an object. With a source attached its info is polled on the
    /// next tick.
    pub fn register_object(&mut self, object: ObjectIndex) -> bool {
        if !self.store.register(object) {
            return false;
        }
        if self.source.is_some() {
            self.poll_queue.insert(object.index());
        }
        true
    }

    /// Unregister an object and discard its relevancy state everywhere.
    pub fn unregister_object(&mut self, object: ObjectIndex) -> bool {
        if !self.store.unregister(object) {
            return false;
        }
        if let Some(handle) = self.object_filters.remove(&object) {
            if let Some(filter) = self.filters.get_mut(usize::from(handle.0)) {
                filter.remove_object(object);
            }
        }
        self.poll_queue.remove(object.index());
        self.warned_out_of_bounds.remove(object.index());
        true
    }

    /// Set location and base cull distance directly.
    pub fn set_world_info(&mut self, object: ObjectIndex, location: Vec3, cull_distance: f32) -> bool {
        self.apply_world_info(
            object,
            WorldInfo {
                location,
                cull_distance,
            },
        )
    }

    /// Queue an object for polling on the next tick.
    pub fn mark_dirty(&mut self, object: ObjectIndex) -> bool {
        if !self.store.has_info(object) {
            return false;
        }
        self.poll_queue.insert(object.index());
        true
    }

    pub fn set_cull_distance_override(&mut self, object: ObjectIndex, cull_distance: f32) -> bool {
        self.store.set_cull_distance_override(object, cull_distance)
    }

    pub fn clear_cull_distance_override(&mut self, object: ObjectIndex) -> bool {
        self.store.clear_cull_distance_override(object)
    }

    pub fn set_requires_frequent_update(&mut self, object: ObjectIndex, required: bool) -> bool {
        self.store.set_requires_frequent_update(object, required)
    }

    /// Location and effective cull distance; zero for unknown objects.
    pub fn get_world_info(&self, object: ObjectIndex) -> WorldInfo {
        self.store.get_world_info(object)
    }

    /// Objects whose polled location was outside the world bounds.
    pub fn out_of_bounds_objects(&self) -> usize {
        self.warned_out_of_bounds.count()
    }

    // Filters

    /// Create a named relevancy filter.
    ///
    /// Returns `None` once every `FilterHandle` value is in use.
    pub fn add_filter(&mut self, name: impl Into<String>) -> Option<FilterHandle> {
        let name = name.into();
        let Some(handle) = filter_handle(self.filters.len()) else {
            tracing::warn!(filter = %name, count = self.filters.len(), "filter handle space exhausted");
            return None;
        };
        let mut filter = RelevancyFilter::new(name, &self.config);
        for (&connection, views) in &self.connections {
            filter.add_connection(connection);
            filter.set_views(connection, views);
        }
        tracing::debug!(filter = filter.name(), handle = handle.0, "filter added");
        self.filters.push(filter);
        Some(handle)
    }

    pub fn filter(&self, handle: FilterHandle) -> Option<&RelevancyFilter> {
        self.filters.get(usize::from(handle.0))
    }

    pub fn filter_by_name(&self, name: &str) -> Option<FilterHandle> {
        self.filters
            .iter()
            .position(|f| f.name() == name)
            .and_then(filter_handle)
    }

    /// Attach an object to a filter under a profile, or detach it with
    /// `None`. Unfiltered objects are relevant to every connection.
    ///
    /// Returns false for unregistered objects or unknown filter handles.
    pub fn set_filter(
        &mut self,
        object: ObjectIndex,
        handle: Option<FilterHandle>,
        profile: Option<&str>,
    ) -> bool {
        if !self.store.has_info(object) {
            return false;
        }
        if let Some(handle) = handle {
            if usize::from(handle.0) >= self.filters.len() {
                tracing::warn!(%object, handle = handle.0, "set_filter with an unknown filter handle");
                return false;
            }
        }

        let previous = self.object_filters.get(&object).copied();
        if previous.is_some() && previous != handle {
            if let Some(old) = previous.and_then(|h| self.filters.get_mut(usize::from(h.0))) {
                old.remove_object(object);
            }
            self.object_filters.remove(&object);
        }
        if let Some(handle) = handle {
            self.filters[usize::from(handle.0)].add_object(object, profile);
            self.object_filters.insert(object, handle);
        }
        true
    }

    pub fn object_filter(&self, object: ObjectIndex) -> Option<FilterHandle> {
        self.object_filters.get(&object).copied()
    }

    // Connections

    pub fn add_connection(&mut self, connection: ConnectionId) -> bool {
        if self.connections.contains_key(&connection) {
            return false;
        }
        self.connections.insert(connection, Vec::new());
        for filter in &mut self.filters {
            filter.add_connection(connection);
        }
        tracing::debug!(%connection, "connection added");
        true
    }

    /// Remove a connection and all of its relevancy state.
    pub fn remove_connection(&mut self, connection: ConnectionId) -> bool {
        if self.connections.remove(&connection).is_none() {
            return false;
        }
        for filter in &mut self.filters {
            filter.remove_connection(connection);
        }
        tracing::debug!(%connection, "connection removed");
        true
    }

    /// Replace the view points of a connection.
    pub fn set_views(&mut self, connection: ConnectionId, views: &[Vec3]) -> bool {
        let Some(stored) = self.connections.get_mut(&connection) else {
            return false;
        };
        stored.clear();
        stored.extend_from_slice(views);
        for filter in &mut self.filters {
            filter.set_views(connection, views);
        }
        true
    }

    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.keys().copied()
    }

    // Tick

    /// Run one replication tick and report the relevancy transitions.
    pub fn update_and_send(&mut self) -> TickReport {
        let _span = tracing::info_span!("update_and_send", tick = self.tick).entered();
        let started = Instant::now();
        let mut stats = TickStats {
            tick: self.tick,
            ..TickStats::default()
        };

        stats.objects_polled = self.poll_world_info();

        self.store.lock_dirty_list(true);
        let mut changes = Vec::new();
        for filter in &mut self.filters {
            let update = filter.update(&self.store);
            stats.objects_synced += update.stats.objects_synced;
            stats.pairs_evaluated += update.stats.pairs_evaluated;
            stats.connections_refreshed += update.stats.refreshes;
            stats.capped_queries += update.stats.capped_queries;
            changes.extend(update.changes);
        }
        changes.sort_unstable();
        stats.relevancy_changes = changes.len();
        self.store.end_cycle();
        self.store.lock_dirty_list(false);

        stats.elapsed = started.elapsed();
        self.history.record(stats);
        self.tick += 1;
        tracing::debug!(
            polled = stats.objects_polled,
            evaluated = stats.pairs_evaluated,
            changes = stats.relevancy_changes,
            elapsed_us = stats.elapsed.as_micros() as u64,
            "tick complete"
        );
        TickReport { changes, stats }
    }

    fn poll_world_info(&mut self) -> usize {
        let mut queue = std::mem::take(&mut self.poll_queue);
        for object in self.store.objects_requiring_frequent_update().iter() {
            queue.insert(object);
        }
        let Some(source) = self.source.as_ref() else {
            return 0;
        };

        let polled: Vec<(ObjectIndex, WorldInfo)> = queue
            .objects()
            .filter_map(|object| source.world_info(object).map(|info| (object, info)))
            .collect();
        for &(object, info) in &polled {
            self.apply_world_info(object, info);
        }
        polled.len()
    }

    fn apply_world_info(&mut self, object: ObjectIndex, info: WorldInfo) -> bool {
        if self.store.has_info(object)
            && !self.store.is_valid_location(info.location)
            && self.warned_out_of_bounds.insert(object.index())
        {
            tracing::warn!(
                %object,
                location = ?info.location,
                "object location outside world bounds; clamping"
            );
        }
        self.store.set_info(object, info.location, info.cull_distance)
    }

    /// Validate and apply a new configuration. Store bounds are re-applied,
    /// every filter rebuilds its profiles and grids and refreshes all
    /// connections on the next tick.
    pub fn reload_config(&mut self, config: RelevancyConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.store.apply_config(config.location_config());
        for filter in &mut self.filters {
            filter.reload(&config);
        }
        self.config = config;
        tracing::info!(filters = self.filters.len(), "relevancy config reloaded");
        Ok(())
    }

    // Queries

    /// Whether updates for `object` should go to `connection`.
    pub fn is_relevant(&self, connection: ConnectionId, object: ObjectIndex) -> bool {
        self.relevancy_state(connection, object).is_relevant()
    }

    pub fn relevancy_state(&self, connection: ConnectionId, object: ObjectIndex) -> RelevancyState {
        if !self.connections.contains_key(&connection) || !self.store.has_info(object) {
            return RelevancyState::Unknown;
        }
        match self.object_filter(object).and_then(|h| self.filter(h)) {
            Some(filter) => filter.relevancy_state(connection, object),
            None => RelevancyState::Relevant,
        }
    }

    /// Every object relevant to a connection, in index order.
    pub fn relevant_objects(&self, connection: ConnectionId) -> Vec<ObjectIndex> {
        if !self.connections.contains_key(&connection) {
            return Vec::new();
        }
        let mut relevant: Vec<ObjectIndex> = self
            .store
            .valid_objects()
            .objects()
            .filter(|object| !self.object_filters.contains_key(object))
            .collect();
        for filter in &self.filters {
            relevant.extend(filter.relevant_objects(connection));
        }
        relevant.sort_unstable();
        relevant
    }
}

fn filter_handle(index: usize) -> Option<FilterHandle> {
    u16::try_from(index).ok().map(FilterHandle)
}
