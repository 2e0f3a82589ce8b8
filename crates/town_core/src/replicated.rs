//! Replicated state variables.
//!
//! A [`ReplicatedVar`] is a value plus change notification. Only the
//! authority may write it; everybody may read it. Every effective write on
//! the authority is appended to the shared [`Outbox`] in program order, so
//! observers see changes in exactly the order they happened.
//!
//! Writes that do not change the value are dropped without notification.
//! Writes from an observer are dropped without error: an observer racing the
//! authority is expected, not exceptional.

use serde::{Deserialize, Serialize};

use crate::components::{FactoryId, Role};
use crate::item::ItemLifeState;
use crate::math::Pose;
use crate::observer::{Observers, Subscription};
use crate::structure::{LifecycleState, PaintStage};
use crate::wire::{Outbox, ReplicationMessage, VarKey};

/// Wire representation of every replicated value type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum VarValue {
    /// Structure lifecycle state.
    Lifecycle(LifecycleState),
    /// Structure paint stage.
    Paint(PaintStage),
    /// Structure to factory binding.
    Binding(Option<FactoryId>),
    /// Collectible item life state.
    ItemLife(ItemLifeState),
    /// Boolean flag.
    Flag(bool),
    /// Unsigned counter.
    Count(u32),
    /// Scalar quantity.
    Scalar(f32),
    /// World pose.
    Pose(Pose),
}

/// Types that can live inside a [`ReplicatedVar`].
pub trait WireValue: Clone + PartialEq + 'static {
    /// Convert to the wire representation.
    fn to_wire(&self) -> VarValue;

    /// Convert back; `None` if the wire value has a different type.
    fn from_wire(value: &VarValue) -> Option<Self>;
}

macro_rules! impl_wire_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl WireValue for $ty {
                fn to_wire(&self) -> VarValue {
                    VarValue::$variant(*self)
                }

                fn from_wire(value: &VarValue) -> Option<Self> {
                    match value {
                        VarValue::$variant(v) => Some(*v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_wire_value! {
    LifecycleState => Lifecycle,
    PaintStage => Paint,
    Option<FactoryId> => Binding,
    ItemLifeState => ItemLife,
    bool => Flag,
    u32 => Count,
    f32 => Scalar,
    Pose => Pose,
}

type ChangeListener<T> = dyn FnMut(&T, &T);

/// A value with authority-only writes and broadcast-on-change semantics.
#[derive(Debug)]
pub struct ReplicatedVar<T: WireValue> {
    value: T,
    role: Role,
    publish: Option<(VarKey, Outbox)>,
    listeners: Observers<ChangeListener<T>>,
}

impl<T: WireValue> ReplicatedVar<T> {
    /// Authority-side variable publishing its changes under `key`.
    #[must_use]
    pub fn authority(initial: T, key: VarKey, outbox: &Outbox) -> Self {
        Self {
            value: initial,
            role: Role::Authority,
            publish: Some((key, outbox.clone())),
            listeners: Observers::new(),
        }
    }

    /// Authority-side variable that is not published anywhere.
    #[must_use]
    pub fn local(initial: T) -> Self {
        Self {
            value: initial,
            role: Role::Authority,
            publish: None,
            listeners: Observers::new(),
        }
    }

    /// Observer-side mirror initialized from a snapshot value.
    #[must_use]
    pub fn observer(initial: T) -> Self {
        Self {
            value: initial,
            role: Role::Observer,
            publish: None,
            listeners: Observers::new(),
        }
    }

    /// The last authoritative value.
    #[must_use]
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Which side of the boundary owns this copy.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Write a new value (authority only).
    ///
    /// Returns `true` if the value changed and listeners were notified.
    pub fn set(&mut self, value: T) -> bool {
        if !self.role.is_authority() {
            tracing::trace!("ignoring write to replicated variable from observer");
            return false;
        }
        if value == self.value {
            return false;
        }

        let old = std::mem::replace(&mut self.value, value);
        if let Some((key, outbox)) = &self.publish {
            outbox.push(ReplicationMessage::Set {
                key: *key,
                value: self.value.to_wire(),
            });
        }
        self.notify(&old);
        true
    }

    /// Apply a value received from the authority (observer only).
    ///
    /// Returns `true` if the value changed and listeners were notified.
    pub fn apply_remote(&mut self, value: T) -> bool {
        if self.role.is_authority() {
            tracing::trace!("ignoring remote value on authority copy");
            return false;
        }
        if value == self.value {
            return false;
        }
        let old = std::mem::replace(&mut self.value, value);
        self.notify(&old);
        true
    }

    /// Apply a wire value; mismatched types are ignored.
    pub fn apply_wire(&mut self, value: &VarValue) -> bool {
        match T::from_wire(value) {
            Some(v) => self.apply_remote(v),
            None => {
                tracing::debug!(?value, "wire value type does not match variable");
                false
            }
        }
    }

    /// Register a change listener, called with `(old, new)`.
    pub fn on_change(&self, listener: impl FnMut(&T, &T) + 'static) -> Subscription {
        self.listeners.subscribe(Box::new(listener))
    }

    fn notify(&self, old: &T) {
        let new = &self.value;
        self.listeners.notify(|listener| listener(old, new));
    }
}
