use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Context;
use glam::Vec3;
use netscope_common::{ConnectionId, ObjectIndex};
use netscope_filter::RelevancyConfig;
use netscope_locations::WorldInfo;
use netscope_replication::ReplicationDriver;
use serde::Serialize;

/// Half extent of the square that objects and views wander in.
const ARENA_HALF_EXTENT: f32 = 40_000.0;
const MAX_STEP: f32 = 1_500.0;

#[derive(Debug, Clone)]
pub struct SimOptions {
    pub objects: u32,
    pub connections: u32,
    pub ticks: u64,
    pub seed: u64,
    /// Re-read `config_path` and hot-reload it every N ticks.
    pub reload_every: Option<u64>,
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSummary {
    pub connection: u32,
    pub relevant_objects: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimSummary {
    pub ticks: u64,
    pub objects: u32,
    pub connections: Vec<ConnectionSummary>,
    pub relevancy_changes: usize,
    pub reloads: u32,
    pub capped_queries: usize,
    pub oversized_cull_distances: u64,
    pub average_tick: Duration,
    pub max_tick: Duration,
    pub average_pairs_evaluated: f64,
}

/// Deterministic splitmix64 stream.
struct Rng(u64);

impl Rng {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    /// Uniform in `[0, 1)`.
    fn unit(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    fn range(&mut self, min: f32, max: f32) -> f32 {
        min + (max - min) * self.unit()
    }

    fn point(&mut self, half_extent: f32) -> Vec3 {
        Vec3::new(
            self.range(-half_extent, half_extent),
            self.range(-half_extent, half_extent),
            self.range(-100.0, 100.0),
        )
    }

    fn step(&mut self, from: Vec3) -> Vec3 {
        let delta = Vec3::new(
            self.range(-MAX_STEP, MAX_STEP),
            self.range(-MAX_STEP, MAX_STEP),
            0.0,
        );
        (from + delta).clamp(
            Vec3::splat(-ARENA_HALF_EXTENT),
            Vec3::splat(ARENA_HALF_EXTENT),
        )
    }
}

/// Random walk of objects and connection views through a replication driver.
///
/// Every tenth object requires frequent updates and moves without being
/// marked dirty; the others are marked dirty when they move.
pub fn run(config: RelevancyConfig, options: &SimOptions) -> anyhow::Result<SimSummary> {
    let _span = tracing::info_span!("simulate", seed = options.seed).entered();
    let mut rng = Rng(options.seed);
    let world: Rc<RefCell<HashMap<ObjectIndex, WorldInfo>>> = Rc::default();
    let profile_names: Vec<String> = config
        .profile_table()
        .iter()
        .map(|(_, name, _)| name.to_string())
        .collect();

    let mut driver = ReplicationDriver::new(config).with_source(Rc::clone(&world));
    let filter = driver
        .add_filter("spatial")
        .context("no filter handle left for the simulation")?;

    let objects: Vec<ObjectIndex> = (0..options.objects).map(ObjectIndex).collect();
    for &object in &objects {
        let info = WorldInfo {
            location: rng.point(ARENA_HALF_EXTENT),
            cull_distance: rng.range(2_000.0, 15_000.0),
        };
        world.borrow_mut().insert(object, info);
        driver.register_object(object);
        let profile = &profile_names[object.index() % profile_names.len()];
        driver.set_filter(object, Some(filter), Some(profile));
        if object.0 % 10 == 0 {
            driver.set_requires_frequent_update(object, true);
        }
    }

    let mut views: Vec<(ConnectionId, Vec3)> = (0..options.connections)
        .map(|i| (ConnectionId(i), rng.point(ARENA_HALF_EXTENT)))
        .collect();
    for &(connection, view) in &views {
        driver.add_connection(connection);
        driver.set_views(connection, &[view]);
    }

    let mut reloads = 0;
    let mut relevancy_changes = 0;
    let mut capped_queries = 0;
    for tick in 1..=options.ticks {
        for &object in &objects {
            if rng.unit() >= 0.25 {
                continue;
            }
            if let Some(info) = world.borrow_mut().get_mut(&object) {
                info.location = rng.step(info.location);
            }
            if object.0 % 10 != 0 {
                driver.mark_dirty(object);
            }
        }
        for (connection, view) in &mut views {
            *view = rng.step(*view);
            driver.set_views(*connection, &[*view]);
        }

        let report = driver.update_and_send();
        relevancy_changes += report.changes.len();
        capped_queries += report.stats.capped_queries;

        if let (Some(every), Some(path)) = (options.reload_every, options.config_path.as_ref()) {
            if every > 0 && tick % every == 0 {
                let reloaded = RelevancyConfig::load(path)?;
                driver.reload_config(reloaded)?;
                reloads += 1;
            }
        }
    }

    let history = driver.history();
    Ok(SimSummary {
        ticks: options.ticks,
        objects: options.objects,
        connections: views
            .iter()
            .map(|(connection, _)| ConnectionSummary {
                connection: connection.0,
                relevant_objects: driver.relevant_objects(*connection).len(),
            })
            .collect(),
        relevancy_changes,
        reloads,
        capped_queries,
        oversized_cull_distances: driver.store().diagnostics().oversized_cull_distances,
        average_tick: history.average_elapsed(),
        max_tick: history.max_elapsed(),
        average_pairs_evaluated: history.average_pairs_evaluated(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(seed: u64) -> SimOptions {
        SimOptions {
            objects: 64,
            connections: 3,
            ticks: 12,
            seed,
            reload_every: None,
            config_path: None,
        }
    }

    #[test]
    fn rng_is_deterministic() {
        let mut a = Rng(7);
        let mut b = Rng(7);
        for _ in 0..16 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
        let u = Rng(3).unit();
        assert!((0.0..1.0).contains(&u));
    }

    #[test]
    fn same_seed_same_outcome() {
        let first = run(RelevancyConfig::default(), &options(42)).unwrap();
        let second = run(RelevancyConfig::default(), &options(42)).unwrap();
        assert_eq!(first.relevancy_changes, second.relevancy_changes);
        let counts = |s: &SimSummary| {
            s.connections
                .iter()
                .map(|c| c.relevant_objects)
                .collect::<Vec<_>>()
        };
        assert_eq!(counts(&first), counts(&second));
        assert_eq!(first.connections.len(), 3);
    }
}
