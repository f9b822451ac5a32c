//! End-to-end relevancy scenarios driven through `update_and_send`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use glam::Vec3;
use netscope_common::{ConnectionId, FilterHandle, ObjectIndex};
use netscope_filter::{FilterProfile, RelevancyConfig, RelevancyState};
use netscope_locations::WorldInfo;

use crate::ReplicationDriver;

const CELL: f32 = 1000.0;
const CONN: ConnectionId = ConnectionId(1);

type World = Rc<RefCell<HashMap<ObjectIndex, WorldInfo>>>;

fn config() -> RelevancyConfig {
    let mut config = RelevancyConfig::default();
    config.default_profile = FilterProfile {
        cell_size_x: CELL,
        cell_size_y: CELL,
        frame_count_before_culling: 4,
        view_pos_relevancy_frame_count: 2,
    };
    config.profiles.insert(
        "Immediate".into(),
        FilterProfile {
            frame_count_before_culling: 1,
            ..config.default_profile
        },
    );
    config
}

struct Harness {
    driver: ReplicationDriver,
    world: World,
    filter: FilterHandle,
    next_index: u32,
}

impl Harness {
    fn new(config: RelevancyConfig) -> Self {
        let world: World = Rc::default();
        let mut driver = ReplicationDriver::new(config).with_source(Rc::clone(&world));
        let filter = driver.add_filter("spatial").unwrap();
        driver.add_connection(CONN);
        driver.set_views(CONN, &[Vec3::ZERO]);
        Self {
            driver,
            world,
            filter,
            next_index: 0,
        }
    }

    fn spawn(&mut self, location: Vec3, cull_distance: f32, profile: Option<&str>) -> ObjectIndex {
        let object = ObjectIndex(self.next_index);
        self.next_index += 1;
        self.world.borrow_mut().insert(
            object,
            WorldInfo {
                location,
                cull_distance,
            },
        );
        assert!(self.driver.register_object(object));
        assert!(self.driver.set_filter(object, Some(self.filter), profile));
        object
    }

    fn move_to(&mut self, object: ObjectIndex, location: Vec3) {
        if let Some(info) = self.world.borrow_mut().get_mut(&object) {
            info.location = location;
        }
        assert!(self.driver.mark_dirty(object));
    }

    fn ticks(&mut self, count: u32) {
        for _ in 0..count {
            self.driver.update_and_send();
        }
    }

    fn relevant(&self, object: ObjectIndex) -> bool {
        self.driver.is_relevant(CONN, object)
    }
}

#[test]
fn objects_within_cull_distance_are_relevant() {
    let mut h = Harness::new(config());
    let corner = Vec3::new(CELL, CELL, 0.0);
    let origin = h.spawn(Vec3::ZERO, 1500.0, None);
    let nearby = h.spawn(Vec3::new(100.0, 100.0, 100.0), 1500.0, None);
    let on_radius = h.spawn(corner, corner.length(), None);
    let beyond = h.spawn(Vec3::new(CELL + 100.0, CELL + 100.0, 100.0), 1500.0, None);

    h.ticks(1);
    assert!(h.relevant(origin));
    assert!(h.relevant(nearby));
    assert!(h.relevant(on_radius));
    assert!(!h.relevant(beyond));
    assert_eq!(h.driver.get_world_info(on_radius).cull_distance, corner.length());
}

#[test]
fn near_maximum_cull_distance_stays_relevant() {
    let config = config();
    let max = config.max_net_cull_distance;
    let mut h = Harness::new(config);
    let within = h.spawn(Vec3::ZERO, max - 1.0, None);
    let oversized = h.spawn(Vec3::new(10.0, 0.0, 0.0), max * 2.0, None);

    h.ticks(1);
    assert!(h.relevant(within));
    assert!(h.relevant(oversized));
    assert_eq!(h.driver.store().diagnostics().oversized_cull_distances, 1);
}

#[test]
fn moving_away_culls_after_hysteresis_and_moving_back_restores() {
    let config = config();
    let cadence = config.default_profile.view_pos_relevancy_frame_count;
    let hysteresis = config.default_profile.frame_count_before_culling;
    let mut h = Harness::new(config);
    let obj = h.spawn(Vec3::new(10.0, 10.0, 0.0), 500.0, None);
    h.ticks(1);
    assert!(h.relevant(obj));

    h.move_to(obj, Vec3::new(50_000.0, 0.0, 0.0));
    h.ticks(hysteresis - 1);
    assert!(h.relevant(obj));
    assert!(matches!(
        h.driver.relevancy_state(CONN, obj),
        RelevancyState::PendingIrrelevant { .. }
    ));

    // Relevant through cadence + hysteresis - 1 ticks after the move.
    h.ticks(cadence);
    assert!(h.relevant(obj));
    h.ticks(1);
    assert!(!h.relevant(obj));

    h.move_to(obj, Vec3::new(10.0, 10.0, 0.0));
    h.ticks(1);
    assert!(h.relevant(obj));
}

#[test]
fn cull_distance_override_culls_and_restores() {
    let mut h = Harness::new(config());
    let obj = h.spawn(Vec3::new(500.0, 0.0, 0.0), 1000.0, Some("Immediate"));
    h.ticks(1);
    assert!(h.relevant(obj));

    assert!(h.driver.set_cull_distance_override(obj, 400.0));
    h.ticks(1);
    assert!(!h.relevant(obj));
    assert_eq!(h.driver.get_world_info(obj).cull_distance, 400.0);

    assert!(h.driver.clear_cull_distance_override(obj));
    h.ticks(1);
    assert!(h.relevant(obj));
}

#[test]
fn frequently_updated_objects_are_polled_every_tick() {
    let mut h = Harness::new(config());
    let obj = h.spawn(Vec3::ZERO, 200.0, Some("Immediate"));
    h.ticks(1);
    assert!(h.driver.set_requires_frequent_update(obj, true));

    // Moved in the world without marking dirty.
    if let Some(info) = h.world.borrow_mut().get_mut(&obj) {
        info.location = Vec3::new(30_000.0, 0.0, 0.0);
    }
    let report = h.driver.update_and_send();
    assert_eq!(report.stats.objects_polled, 1);
    assert!(matches!(
        h.driver.relevancy_state(CONN, obj),
        RelevancyState::PendingIrrelevant { failed_evaluations: 1 }
    ));
    // One refresh cadence plus a single culling frame.
    h.ticks(1);
    assert!(h.relevant(obj));
    h.ticks(1);
    assert!(!h.relevant(obj));
}

#[test]
fn unmarked_motion_keeps_stale_classification() {
    let mut h = Harness::new(config());
    let obj = h.spawn(Vec3::ZERO, 200.0, Some("Immediate"));
    h.ticks(1);

    if let Some(info) = h.world.borrow_mut().get_mut(&obj) {
        info.location = Vec3::new(30_000.0, 0.0, 0.0);
    }
    h.ticks(6);
    assert!(h.relevant(obj));
}

#[test]
fn out_of_bounds_locations_warn_once_and_clamp() {
    let mut config = config();
    config.world_bounds.min = Vec3::splat(-10_000.0);
    config.world_bounds.max = Vec3::splat(10_000.0);
    let mut h = Harness::new(config);
    let obj = h.spawn(Vec3::new(20_000.0, 0.0, 0.0), 100.0, None);
    h.ticks(1);
    h.move_to(obj, Vec3::new(30_000.0, 0.0, 0.0));
    h.ticks(1);

    assert_eq!(h.driver.out_of_bounds_objects(), 1);
    assert_eq!(
        h.driver.get_world_info(obj).location,
        Vec3::new(10_000.0, 0.0, 0.0)
    );
}

#[test]
fn hot_reload_rebinds_profiles() {
    let mut h = Harness::new(config());
    let obj = h.spawn(Vec3::new(100.0, 0.0, 0.0), 500.0, Some("Immediate"));
    h.ticks(1);

    let mut reloaded = config();
    reloaded.profiles.clear();
    h.driver.reload_config(reloaded).unwrap();
    h.ticks(1);
    assert!(h.relevant(obj));

    // Now bound to the default profile, so culling takes several ticks.
    h.move_to(obj, Vec3::new(50_000.0, 0.0, 0.0));
    h.ticks(1);
    assert!(h.relevant(obj));
}

#[test]
fn disconnect_discards_connection_state() {
    let mut h = Harness::new(config());
    let obj = h.spawn(Vec3::ZERO, 500.0, None);
    h.ticks(1);
    assert!(h.driver.remove_connection(CONN));
    assert_eq!(h.driver.relevancy_state(CONN, obj), RelevancyState::Unknown);

    assert!(h.driver.add_connection(CONN));
    assert!(!h.relevant(obj));
    h.driver.set_views(CONN, &[Vec3::ZERO]);
    h.ticks(1);
    assert!(h.relevant(obj));
}
