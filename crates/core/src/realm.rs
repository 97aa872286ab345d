//! Realm update protocol
//!
//! The persistence layer tracks object-graph deltas without scanning: the
//! core reports every parent→child reference change at the mutation site.
//! `did_update(container, old_child, new_child)` fires exactly once per
//! mutated slot during an in-place overwrite; operations that mint a fresh
//! base report nothing, because no pre-existing parent edge changed.
//!
//! For one mutating built-in call, all events are delivered before the
//! result is pushed onto the value stack.

use crate::value::{ArrayValue, HeapItemValue, MapValue, ObjectId, StructValue};
use std::cell::RefCell;
use std::rc::Rc;

/// A reference to one of the container shapes the realm can track.
#[derive(Debug, Clone)]
pub enum ObjectRef {
    Array(Rc<RefCell<ArrayValue>>),
    Map(Rc<RefCell<MapValue>>),
    Struct(Rc<RefCell<StructValue>>),
    HeapItem(Rc<RefCell<HeapItemValue>>),
}

impl ObjectRef {
    pub fn id(&self) -> ObjectId {
        match self {
            ObjectRef::Array(rc) => rc.borrow().id,
            ObjectRef::Map(rc) => rc.borrow().id,
            ObjectRef::Struct(rc) => rc.borrow().id,
            ObjectRef::HeapItem(rc) => rc.borrow().id,
        }
    }
}

pub trait Realm {
    fn did_update(
        &mut self,
        container: &ObjectRef,
        old_child: Option<&ObjectRef>,
        new_child: Option<&ObjectRef>,
    );
}

/// One recorded parent→child change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateEvent {
    pub container: ObjectId,
    pub old_child: Option<ObjectId>,
    pub new_child: Option<ObjectId>,
}

/// Records events in order. The log is shared between clones, so a caller
/// can hand one clone to a machine and keep another to inspect the deltas
/// for the step.
#[derive(Debug, Default, Clone)]
pub struct RecordingRealm {
    events: Rc<RefCell<Vec<UpdateEvent>>>,
}

impl RecordingRealm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<UpdateEvent> {
        self.events.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl Realm for RecordingRealm {
    fn did_update(
        &mut self,
        container: &ObjectRef,
        old_child: Option<&ObjectRef>,
        new_child: Option<&ObjectRef>,
    ) {
        self.events.borrow_mut().push(UpdateEvent {
            container: container.id(),
            old_child: old_child.map(|o| o.id()),
            new_child: new_child.map(|o| o.id()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ArrayData;

    #[test]
    fn test_recording_realm_orders_events() {
        let arr = Rc::new(RefCell::new(ArrayValue {
            id: 11,
            data: ArrayData::Data(vec![]),
        }));
        let child = Rc::new(RefCell::new(ArrayValue {
            id: 12,
            data: ArrayData::Data(vec![]),
        }));
        let container = ObjectRef::Array(arr);
        let child_ref = ObjectRef::Array(child);

        let mut realm = RecordingRealm::new();
        realm.did_update(&container, Some(&child_ref), None);
        realm.did_update(&container, None, Some(&child_ref));

        let events = realm.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].container, 11);
        assert_eq!(events[0].old_child, Some(12));
        assert_eq!(events[1].new_child, Some(12));
    }
}
