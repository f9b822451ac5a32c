use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use netscope_common::ObjectIndex;
use netscope_locations::WorldInfo;

/// Supplies the current world location and base cull distance of objects.
///
/// Polled at the start of each tick for objects marked dirty and objects
/// that require frequent updates. `None` leaves the cached info untouched.
pub trait WorldInfoSource {
    fn world_info(&self, object: ObjectIndex) -> Option<WorldInfo>;
}

impl WorldInfoSource for HashMap<ObjectIndex, WorldInfo> {
    fn world_info(&self, object: ObjectIndex) -> Option<WorldInfo> {
        self.get(&object).copied()
    }
}

/// Shared source, for owners that keep mutating the world between ticks.
impl<T: WorldInfoSource + ?Sized> WorldInfoSource for Rc<RefCell<T>> {
    fn world_info(&self, object: ObjectIndex) -> Option<WorldInfo> {
        self.borrow().world_info(object)
    }
}
