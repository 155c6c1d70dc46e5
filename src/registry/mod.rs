//! Dynamic Class Registry
//!
//! Tracks the classes that opted into instance migration and the live
//! instances bound to each of them.
//!
//! The reload engine only talks to the registry through [`ClassRegistry`];
//! [`DynamicClassRegistry`] is the in-memory implementation used by the
//! runtime by default.
//!
//! Membership is by identity: classes are keyed by [`ClassId`], instances by
//! [`ObjectId`]. Two instances with equal fields stay distinct members.

use crate::runtime::{ClassId, ClassRef, InstanceRef, ObjectId};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Capability interface of a dynamic class registry
pub trait ClassRegistry {
    /// Start tracking `class`. `modifications[0]` is the defining module,
    /// later entries are modules to re-import before the class is migrated.
    fn register(&self, class: &ClassRef, modifications: Vec<Option<String>>);

    /// Whether `class` is a tracked dynamic class
    fn is_dynamic(&self, class: &ClassRef) -> bool;

    /// All tracked classes, in registration order
    fn created_classes(&self) -> Vec<ClassRef>;

    /// Modification history of a class (empty for untracked classes)
    fn modifications(&self, class: &ClassRef) -> Vec<Option<String>>;

    /// Record a freshly constructed instance of a tracked class
    fn record_instance(&self, class: &ClassRef, instance: &InstanceRef);

    /// Live instances of a class
    fn instances(&self, class: &ClassRef) -> Vec<InstanceRef>;

    /// Hand the instance set of `old` over to `new` and forget `old`
    fn adopt_instances(&self, old: &ClassRef, new: &ClassRef);
}

/// Identity-keyed set of weak instance handles
#[derive(Debug, Clone, Default)]
pub struct InstanceSet {
    members: IndexMap<ObjectId, Weak<crate::runtime::Instance>>,
}

impl InstanceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an instance; returns false if it was already a member
    pub fn insert(&mut self, instance: &InstanceRef) -> bool {
        self.members
            .insert(instance.id(), Rc::downgrade(instance))
            .is_none()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.members
            .get(&id)
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Upgraded handles of the members still alive
    pub fn live(&self) -> Vec<InstanceRef> {
        self.members.values().filter_map(Weak::upgrade).collect()
    }

    /// Drop members whose instance has been deallocated
    pub fn prune(&mut self) -> usize {
        let before = self.members.len();
        self.members.retain(|_, weak| weak.strong_count() > 0);
        before - self.members.len()
    }

    /// Number of live members
    pub fn len(&self) -> usize {
        self.members
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registry entry for one dynamic class
#[derive(Debug, Clone)]
pub struct DynamicClass {
    pub class: ClassRef,
    pub modifications: Vec<Option<String>>,
    pub instances: InstanceSet,
}

/// In-memory [`ClassRegistry`]
#[derive(Debug, Default)]
pub struct DynamicClassRegistry {
    classes: RefCell<IndexMap<ClassId, DynamicClass>>,
}

impl DynamicClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked classes
    pub fn len(&self) -> usize {
        self.classes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.borrow().is_empty()
    }

    /// Copy of the entry for a class
    pub fn entry(&self, class: &ClassRef) -> Option<DynamicClass> {
        self.classes.borrow().get(&class.id()).cloned()
    }
}

impl ClassRegistry for DynamicClassRegistry {
    fn register(&self, class: &ClassRef, modifications: Vec<Option<String>>) {
        tracing::debug!(class = %class.qualified_name(), id = %class.id(), "registering dynamic class");
        self.classes.borrow_mut().insert(
            class.id(),
            DynamicClass {
                class: Rc::clone(class),
                modifications,
                instances: InstanceSet::new(),
            },
        );
    }

    fn is_dynamic(&self, class: &ClassRef) -> bool {
        self.classes.borrow().contains_key(&class.id())
    }

    fn created_classes(&self) -> Vec<ClassRef> {
        self.classes
            .borrow()
            .values()
            .map(|entry| Rc::clone(&entry.class))
            .collect()
    }

    fn modifications(&self, class: &ClassRef) -> Vec<Option<String>> {
        self.classes
            .borrow()
            .get(&class.id())
            .map(|entry| entry.modifications.clone())
            .unwrap_or_default()
    }

    fn record_instance(&self, class: &ClassRef, instance: &InstanceRef) {
        if let Some(entry) = self.classes.borrow_mut().get_mut(&class.id()) {
            entry.instances.prune();
            entry.instances.insert(instance);
        }
    }

    fn instances(&self, class: &ClassRef) -> Vec<InstanceRef> {
        self.classes
            .borrow()
            .get(&class.id())
            .map(|entry| entry.instances.live())
            .unwrap_or_default()
    }

    fn adopt_instances(&self, old: &ClassRef, new: &ClassRef) {
        if Rc::ptr_eq(old, new) {
            return;
        }
        let mut classes = self.classes.borrow_mut();
        let Some(mut abandoned) = classes.shift_remove(&old.id()) else {
            return;
        };
        abandoned.instances.prune();
        match classes.get_mut(&new.id()) {
            Some(entry) => entry.instances = abandoned.instances,
            None => {
                // A class that stopped being dynamic still carries the
                // migrated instances forward.
                classes.insert(
                    new.id(),
                    DynamicClass {
                        class: Rc::clone(new),
                        modifications: abandoned.modifications,
                        instances: abandoned.instances,
                    },
                );
            }
        }
    }
}
