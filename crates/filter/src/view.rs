use std::collections::{HashMap, HashSet};

use glam::Vec3;
use netscope_common::ObjectIndex;

/// Classification of one (connection, object) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelevancyState {
    /// The connection or the object is not known to the filter.
    Unknown,
    /// In range on the last evaluation.
    Relevant,
    /// Out of range on the last `failed_evaluations` consecutive
    /// evaluations; still reported as relevant.
    PendingIrrelevant { failed_evaluations: u32 },
    /// Culled, or never found in range.
    Irrelevant,
}

impl RelevancyState {
    pub fn is_relevant(self) -> bool {
        matches!(self, Self::Relevant | Self::PendingIrrelevant { .. })
    }
}

/// Hysteresis entry for a pair that is currently relevant.
///
/// `generation` ties the entry to one attachment of the object; entries from
/// an earlier attachment are stale and read as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PairState {
    generation: u32,
    failed_evaluations: u32,
    /// Extra failing evaluations tolerated before the hysteresis count can
    /// cull the pair. Fixed when the pair starts failing.
    grace: u32,
}

impl PairState {
    fn in_range(generation: u32) -> Self {
        Self {
            generation,
            failed_evaluations: 0,
            grace: 0,
        }
    }
}

/// Per-connection view positions, refresh schedule and hysteresis state.
///
/// Only relevant and pending pairs are stored; everything else reads as
/// irrelevant. Dropping the state discards every pair of the connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionViewState {
    views: Vec<Vec3>,
    refresh_ages: Vec<u32>,
    pairs: HashMap<ObjectIndex, PairState>,
    pending: HashSet<ObjectIndex>,
}

impl ConnectionViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current view points. A connection may have several (split screen).
    pub fn views(&self) -> &[Vec3] {
        &self.views
    }

    pub fn set_views(&mut self, views: &[Vec3]) {
        self.views.clear();
        self.views.extend_from_slice(views);
    }

    /// Whether any view point lies within `cull_distance` of `location`.
    /// The boundary is inclusive.
    pub fn in_range(&self, location: Vec3, cull_distance: f32) -> bool {
        self.views
            .iter()
            .any(|view| view.distance(location) <= cull_distance)
    }

    /// Advance the refresh age of one profile and report whether a full
    /// refresh is due this tick. Profiles never refreshed before are due.
    pub(crate) fn tick_refresh(&mut self, profile: usize, cadence: u32) -> bool {
        if self.refresh_ages.len() <= profile {
            self.refresh_ages.resize(profile + 1, u32::MAX);
        }
        let age = &mut self.refresh_ages[profile];
        *age = age.saturating_add(1);
        if *age >= cadence.max(1) {
            *age = 0;
            true
        } else {
            false
        }
    }

    /// Make every profile due on the next tick.
    pub(crate) fn force_refresh(&mut self) {
        self.refresh_ages.fill(u32::MAX);
    }

    /// Objects with a live or stale pair entry.
    pub(crate) fn tracked_objects(&self) -> impl Iterator<Item = ObjectIndex> + '_ {
        self.pairs.keys().copied()
    }

    /// Objects inside their hysteresis window.
    pub(crate) fn pending_objects(&self) -> impl Iterator<Item = ObjectIndex> + '_ {
        self.pending.iter().copied()
    }

    /// Drop any state held for an object.
    pub(crate) fn forget(&mut self, object: ObjectIndex) {
        self.pairs.remove(&object);
        self.pending.remove(&object);
    }

    /// Apply one exact distance test to a pair.
    ///
    /// `grace` only matters on the first failing test of a relevant pair: the
    /// pair then needs `grace + frame_count_before_culling` consecutive
    /// failures before it is culled.
    ///
    /// Returns `Some(true)` when the pair became relevant, `Some(false)` when
    /// it was culled, `None` when the reported classification is unchanged.
    pub(crate) fn record_test(
        &mut self,
        object: ObjectIndex,
        generation: u32,
        in_range: bool,
        grace: u32,
        frame_count_before_culling: u32,
    ) -> Option<bool> {
        let current = self.live_pair(object, generation);
        if current.is_none() {
            self.forget(object);
        }

        match (in_range, current) {
            (true, None) => {
                self.pairs.insert(object, PairState::in_range(generation));
                Some(true)
            }
            (true, Some(_)) => {
                self.pairs.insert(object, PairState::in_range(generation));
                self.pending.remove(&object);
                None
            }
            // Never relevant: nothing to hold on to.
            (false, None) => None,
            (false, Some(pair)) => {
                let grace = if pair.failed_evaluations == 0 {
                    grace
                } else {
                    pair.grace
                };
                let failed = pair.failed_evaluations.saturating_add(1);
                let threshold = grace.saturating_add(frame_count_before_culling.max(1));
                if failed >= threshold {
                    self.forget(object);
                    Some(false)
                } else {
                    self.pairs.insert(
                        object,
                        PairState {
                            generation,
                            failed_evaluations: failed,
                            grace,
                        },
                    );
                    self.pending.insert(object);
                    None
                }
            }
        }
    }

    pub fn state(&self, object: ObjectIndex, generation: u32) -> RelevancyState {
        match self.live_pair(object, generation) {
            None => RelevancyState::Irrelevant,
            Some(pair) if pair.failed_evaluations == 0 => RelevancyState::Relevant,
            Some(pair) => RelevancyState::PendingIrrelevant {
                failed_evaluations: pair.failed_evaluations,
            },
        }
    }

    /// Objects currently reported as relevant for `generation_of` lookups.
    pub(crate) fn relevant_objects<'a>(
        &'a self,
        generation_of: impl Fn(ObjectIndex) -> Option<u32> + 'a,
    ) -> impl Iterator<Item = ObjectIndex> + 'a {
        self.pairs
            .iter()
            .filter(move |(object, pair)| generation_of(**object) == Some(pair.generation))
            .map(|(object, _)| *object)
    }

    /// Number of stored pair entries, stale ones included.
    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    fn live_pair(&self, object: ObjectIndex, generation: u32) -> Option<PairState> {
        self.pairs
            .get(&object)
            .filter(|pair| pair.generation == generation)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OBJ: ObjectIndex = ObjectIndex(7);

    #[test]
    fn boundary_distance_is_in_range() {
        let mut view = ConnectionViewState::new();
        view.set_views(&[Vec3::ZERO]);
        let at = Vec3::new(3.0, 4.0, 0.0);
        assert!(view.in_range(at, 5.0));
        assert!(!view.in_range(at, 4.999));
    }

    #[test]
    fn any_view_qualifies() {
        let mut view = ConnectionViewState::new();
        view.set_views(&[Vec3::ZERO, Vec3::new(1000.0, 0.0, 0.0)]);
        assert!(view.in_range(Vec3::new(990.0, 0.0, 0.0), 20.0));
        view.set_views(&[]);
        assert!(!view.in_range(Vec3::ZERO, 1.0e9));
    }

    #[test]
    fn hysteresis_culls_on_nth_failure() {
        let mut view = ConnectionViewState::new();
        assert_eq!(view.record_test(OBJ, 0, true, 0, 3), Some(true));
        assert_eq!(view.record_test(OBJ, 0, false, 0, 3), None);
        assert_eq!(view.state(OBJ, 0), RelevancyState::PendingIrrelevant { failed_evaluations: 1 });
        assert_eq!(view.record_test(OBJ, 0, false, 0, 3), None);
        assert!(view.state(OBJ, 0).is_relevant());
        assert_eq!(view.record_test(OBJ, 0, false, 0, 3), Some(false));
        assert_eq!(view.state(OBJ, 0), RelevancyState::Irrelevant);
        assert_eq!(view.pending_objects().count(), 0);
    }

    #[test]
    fn success_resets_the_counter() {
        let mut view = ConnectionViewState::new();
        view.record_test(OBJ, 0, true, 0, 3);
        view.record_test(OBJ, 0, false, 0, 3);
        view.record_test(OBJ, 0, false, 0, 3);
        assert_eq!(view.record_test(OBJ, 0, true, 0, 3), None);
        assert_eq!(view.state(OBJ, 0), RelevancyState::Relevant);
        view.record_test(OBJ, 0, false, 0, 3);
        assert_eq!(view.state(OBJ, 0), RelevancyState::PendingIrrelevant { failed_evaluations: 1 });
    }

    #[test]
    fn single_frame_profile_culls_immediately() {
        let mut view = ConnectionViewState::new();
        view.record_test(OBJ, 0, true, 0, 1);
        assert_eq!(view.record_test(OBJ, 0, false, 0, 1), Some(false));
    }

    #[test]
    fn never_relevant_pairs_store_nothing() {
        let mut view = ConnectionViewState::new();
        assert_eq!(view.record_test(OBJ, 0, false, 0, 4), None);
        assert_eq!(view.pair_count(), 0);
    }

    #[test]
    fn stale_generation_reads_as_irrelevant() {
        let mut view = ConnectionViewState::new();
        view.record_test(OBJ, 0, true, 0, 4);
        assert_eq!(view.state(OBJ, 1), RelevancyState::Irrelevant);
        // A failing test under the new generation drops the stale entry.
        assert_eq!(view.record_test(OBJ, 1, false, 0, 4), None);
        assert_eq!(view.pair_count(), 0);
    }

    #[test]
    fn grace_delays_the_hysteresis_count() {
        let mut view = ConnectionViewState::new();
        view.record_test(OBJ, 0, true, 0, 2);
        // First failure fixes a grace of 3: culled on the fifth failure.
        for _ in 0..4 {
            assert_eq!(view.record_test(OBJ, 0, false, 3, 2), None);
        }
        assert_eq!(
            view.state(OBJ, 0),
            RelevancyState::PendingIrrelevant { failed_evaluations: 4 }
        );
        assert_eq!(view.record_test(OBJ, 0, false, 0, 2), Some(false));
    }

    #[test]
    fn grace_is_cleared_by_a_success() {
        let mut view = ConnectionViewState::new();
        view.record_test(OBJ, 0, true, 0, 2);
        view.record_test(OBJ, 0, false, 5, 2);
        view.record_test(OBJ, 0, true, 0, 2);
        assert_eq!(view.record_test(OBJ, 0, false, 0, 2), None);
        assert_eq!(view.record_test(OBJ, 0, false, 0, 2), Some(false));
    }

    #[test]
    fn long_hysteresis_still_culls() {
        let frames = 70_000;
        let mut view = ConnectionViewState::new();
        view.record_test(OBJ, 0, true, 0, frames);
        for _ in 1..frames {
            assert_eq!(view.record_test(OBJ, 0, false, 0, frames), None);
        }
        assert_eq!(
            view.state(OBJ, 0),
            RelevancyState::PendingIrrelevant { failed_evaluations: frames - 1 }
        );
        assert_eq!(view.record_test(OBJ, 0, false, 0, frames), Some(false));
        assert_eq!(view.state(OBJ, 0), RelevancyState::Irrelevant);
    }

    #[test]
    fn refresh_follows_cadence() {
        let mut view = ConnectionViewState::new();
        let due: Vec<bool> = (0..7).map(|_| view.tick_refresh(0, 3)).collect();
        assert_eq!(due, vec![true, false, false, true, false, false, true]);
        view.force_refresh();
        assert!(view.tick_refresh(0, 3));
    }
}
