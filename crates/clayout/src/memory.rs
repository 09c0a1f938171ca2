// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The instance arena and its ownership/notification graph.
//!
//! Instances live in a [`Memory`] and are addressed by opaque
//! [`InstanceId`] handles; container and referrer back-references are ids,
//! never owning references, so pointer-linked graphs cannot form ownership
//! cycles. Every address or value mutation synchronously notifies the
//! instance's container and referrer; a notification that detects an
//! invariant violation reverts the mutation before the error returns, so
//! the graph is always left valid.

use crate::builder::NESTED_SEPARATOR;
use crate::descriptor::{TypeDescriptor, TypeKind};
use crate::endianness::Endianness;
use crate::error::{LayoutError, Result};
use crate::value::{IntoValue, Value};
use std::sync::Arc;

/// Opaque handle to an instance in a [`Memory`].
///
/// Ids are only meaningful to the `Memory` that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u32);

/// Per-kind instance state.
#[derive(Debug)]
pub(crate) enum Payload {
    /// Primitive scalar value.
    Scalar(Value),
    /// Index into the enum's member table.
    EnumMember(usize),
    /// Padding byte buffer (packs to whatever was last unpacked).
    Bytes(Vec<u8>),
    /// Struct/union members in declaration order.
    Members(Vec<InstanceId>),
    /// Array elements.
    Elements(Vec<InstanceId>),
    /// Pointer referent; `None` is NULL.
    Referent(Option<InstanceId>),
    /// The instance a typedef transparently wraps for its whole lifetime.
    Aliased(InstanceId),
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) descriptor: Arc<TypeDescriptor>,
    pub(crate) address: Option<u64>,
    pub(crate) container: Option<InstanceId>,
    pub(crate) referrer: Option<InstanceId>,
    /// While set, child value-change notifications are ignored (union
    /// fix-up and whole-aggregate unpack emit one consolidated change).
    pub(crate) quiesced: bool,
    pub(crate) payload: Payload,
}

/// Initial member values for [`Memory::instantiate_with`].
///
/// Positional values fill members in declaration order; named values may
/// use the nested `outer__inner` convention to initialise sub-members of
/// composite members directly.
#[derive(Debug, Clone, Default)]
pub struct Initializers {
    positional: Vec<InstanceId>,
    named: Vec<(String, InstanceId)>,
}

impl Initializers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional initial value.
    pub fn value(mut self, instance: InstanceId) -> Self {
        self.positional.push(instance);
        self
    }

    /// Set a member (or `outer__inner` sub-member) initial value.
    pub fn member(mut self, name: impl Into<String>, instance: InstanceId) -> Self {
        self.named.push((name.into(), instance));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    fn from_named(named: Vec<(String, InstanceId)>) -> Self {
        Self {
            positional: Vec::new(),
            named,
        }
    }
}

/// Arena of live instances forming one mutable graph.
#[derive(Debug, Default)]
pub struct Memory {
    nodes: Vec<Node>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instances ever created in this memory.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn node(&self, id: InstanceId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub(crate) fn node_mut(&mut self, id: InstanceId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    fn push(&mut self, descriptor: Arc<TypeDescriptor>, payload: Payload) -> InstanceId {
        let id = InstanceId(self.nodes.len() as u32);
        self.nodes.push(Node {
            descriptor,
            address: None,
            container: None,
            referrer: None,
            quiesced: false,
            payload,
        });
        id
    }

    /// The data type of an instance.
    pub fn data_type(&self, id: InstanceId) -> Arc<TypeDescriptor> {
        self.node(id).descriptor.clone()
    }

    /// The instance's size in bytes (derived from its data type).
    pub fn size(&self, id: InstanceId) -> usize {
        self.node(id).descriptor.size()
    }

    /// The container that owns this instance as a member/element, if any.
    pub fn container(&self, id: InstanceId) -> Option<InstanceId> {
        self.node(id).container
    }

    /// The pointer currently targeting this instance, if any.
    pub fn referrer(&self, id: InstanceId) -> Option<InstanceId> {
        self.node(id).referrer
    }

    /// Follow typedef wrappers down to the instance that holds state.
    pub(crate) fn resolve(&self, id: InstanceId) -> InstanceId {
        match &self.node(id).payload {
            Payload::Aliased(inner) => self.resolve(*inner),
            _ => id,
        }
    }

    /// Member/element ids of an aggregate (empty for everything else).
    pub(crate) fn child_ids(&self, id: InstanceId) -> Vec<InstanceId> {
        match &self.node(id).payload {
            Payload::Members(ids) | Payload::Elements(ids) => ids.clone(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn set_quiesced(&mut self, id: InstanceId, on: bool) {
        self.node_mut(id).quiesced = on;
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Create a fresh default-valued instance of `ty`.
    pub fn instantiate(&mut self, ty: &Arc<TypeDescriptor>) -> Result<InstanceId> {
        self.instantiate_with(ty, Initializers::new())
    }

    /// Create an instance of `ty` with initial member values.
    ///
    /// Composites accept positional and/or named values (nested
    /// `outer__inner` names initialise sub-members); arrays accept a
    /// positional prefix; a pointer accepts one positional referent; a
    /// typedef forwards to the aliased type. Unfilled members receive
    /// fresh defaults.
    pub fn instantiate_with(
        &mut self,
        ty: &Arc<TypeDescriptor>,
        init: Initializers,
    ) -> Result<InstanceId> {
        match &ty.kind {
            TypeKind::Primitive(p) => {
                self.reject_initializers(&init, "primitive")?;
                Ok(self.push(ty.clone(), Payload::Scalar(p.default_value())))
            }
            TypeKind::Enum(_) => {
                self.reject_initializers(&init, "enum")?;
                Ok(self.push(ty.clone(), Payload::EnumMember(0)))
            }
            TypeKind::Padding(n) => {
                self.reject_initializers(&init, "padding")?;
                let length = *n;
                Ok(self.push(ty.clone(), Payload::Bytes(vec![0; length])))
            }
            TypeKind::Pointer(_) => {
                if !init.named.is_empty() {
                    return Err(LayoutError::InvalidOperation(
                        "pointer initial values are positional".to_string(),
                    ));
                }
                if init.positional.len() > 1 {
                    return Err(LayoutError::TooManyValues {
                        given: init.positional.len(),
                        capacity: 1,
                    });
                }
                let id = self.push(ty.clone(), Payload::Referent(None));
                if let Some(&target) = init.positional.first() {
                    self.set_deref(id, Some(target))?;
                }
                Ok(id)
            }
            TypeKind::Typedef(t) => {
                let base_type = t.base_type.clone();
                let inner = self.instantiate_with(&base_type, init)?;
                let id = self.push(ty.clone(), Payload::Aliased(inner));
                // The wrapped instance reports to the typedef, never to
                // the typedef's own container/referrer.
                self.node_mut(inner).container = Some(id);
                Ok(id)
            }
            TypeKind::Array(a) => {
                if !init.named.is_empty() {
                    return Err(LayoutError::InvalidOperation(
                        "array initial values are positional".to_string(),
                    ));
                }
                if init.positional.len() > a.length {
                    return Err(LayoutError::TooManyValues {
                        given: init.positional.len(),
                        capacity: a.length,
                    });
                }
                let element_type = a.element_type.clone();
                let length = a.length;
                let mut elements = Vec::with_capacity(length);
                for &given in &init.positional {
                    self.check_assignable(given, &element_type)?;
                    elements.push(given);
                }
                for _ in init.positional.len()..length {
                    elements.push(self.instantiate(&element_type)?);
                }
                let id = self.push(ty.clone(), Payload::Elements(elements.clone()));
                for element in elements {
                    self.node_mut(element).container = Some(id);
                }
                Ok(id)
            }
            TypeKind::Struct(_) => self.instantiate_composite(ty, init, false),
            TypeKind::Union(_) => self.instantiate_composite(ty, init, true),
        }
    }

    fn reject_initializers(&self, init: &Initializers, what: &str) -> Result<()> {
        if init.is_empty() {
            Ok(())
        } else {
            Err(LayoutError::InvalidOperation(format!(
                "{} instances take no initial member values",
                what
            )))
        }
    }

    /// Check that `given` has the declared type and is free to be owned
    /// (an instance has at most one container).
    pub(crate) fn check_assignable(
        &self,
        given: InstanceId,
        declared: &Arc<TypeDescriptor>,
    ) -> Result<()> {
        let actual = &self.node(given).descriptor;
        if actual.as_ref() != declared.as_ref() {
            return Err(LayoutError::TypeMismatch {
                expected: declared.name.clone(),
                got: actual.name.clone(),
            });
        }
        if self.node(given).container.is_some() {
            return Err(LayoutError::AlreadyContained);
        }
        Ok(())
    }

    fn instantiate_composite(
        &mut self,
        ty: &Arc<TypeDescriptor>,
        init: Initializers,
        is_union: bool,
    ) -> Result<InstanceId> {
        let composite = ty.composite().expect("composite descriptor");
        let count = composite.members.len();
        let member_types: Vec<Arc<TypeDescriptor>> = composite
            .members
            .iter()
            .map(|m| m.data_type.clone())
            .collect();
        let member_names: Vec<String> =
            composite.members.iter().map(|m| m.name.clone()).collect();

        if init.positional.len() > count {
            return Err(LayoutError::TooManyValues {
                given: init.positional.len(),
                capacity: count,
            });
        }

        let mut whole: Vec<Option<InstanceId>> = vec![None; count];
        let mut nested: Vec<Vec<(String, InstanceId)>> = vec![Vec::new(); count];
        for (slot, &given) in whole.iter_mut().zip(&init.positional) {
            *slot = Some(given);
        }

        for (name, given) in &init.named {
            if let Some((outer, sub)) = name.split_once(NESTED_SEPARATOR) {
                let index = member_names
                    .iter()
                    .position(|n| n == outer)
                    .ok_or_else(|| LayoutError::NoSuchMember {
                        name: outer.to_string(),
                    })?;
                if whole[index].is_some() || nested[index].iter().any(|(s, _)| s == sub) {
                    return Err(LayoutError::DefinedTwice {
                        name: outer.to_string(),
                    });
                }
                nested[index].push((sub.to_string(), *given));
            } else {
                let index = member_names
                    .iter()
                    .position(|n| n == name)
                    .ok_or_else(|| LayoutError::NoSuchMember { name: name.clone() })?;
                if whole[index].is_some() || !nested[index].is_empty() {
                    return Err(LayoutError::DefinedTwice { name: name.clone() });
                }
                whole[index] = Some(*given);
            }
        }

        if is_union {
            let initialised = (0..count)
                .filter(|&i| whole[i].is_some() || !nested[i].is_empty())
                .count();
            if initialised > 1 {
                return Err(LayoutError::AmbiguousUnionValue);
            }
        }

        let mut member_ids = Vec::with_capacity(count);
        let mut explicit = None;
        for index in 0..count {
            let member_type = &member_types[index];
            let member = if let Some(given) = whole[index] {
                self.check_assignable(given, member_type)?;
                explicit = explicit.or(Some(index));
                given
            } else if !nested[index].is_empty() {
                if member_type.composite().is_none() {
                    return Err(LayoutError::NoSubMembers {
                        name: member_names[index].clone(),
                    });
                }
                explicit = explicit.or(Some(index));
                let sub = Initializers::from_named(std::mem::take(&mut nested[index]));
                self.instantiate_with(member_type, sub)?
            } else {
                self.instantiate(member_type)?
            };
            member_ids.push(member);
        }

        let id = self.push(ty.clone(), Payload::Members(member_ids.clone()));
        for &member in &member_ids {
            self.node_mut(member).container = Some(id);
        }

        if is_union {
            // Make all members alias the same bytes from the start: replay
            // the single initialised member, or run one codec cycle.
            match explicit {
                Some(index) => self.union_member_changed(id, member_ids[index])?,
                None => self.union_default_cycle(id)?,
            }
        }
        Ok(id)
    }

    /// Create a primitive instance holding `value`.
    pub fn new_value<T: IntoValue>(
        &mut self,
        ty: &Arc<TypeDescriptor>,
        value: T,
    ) -> Result<InstanceId> {
        let id = self.instantiate(ty)?;
        self.set(id, value)?;
        Ok(id)
    }

    /// Create a pointer instance targeting an existing instance.
    pub fn pointer_to(
        &mut self,
        ty: &Arc<TypeDescriptor>,
        target: InstanceId,
    ) -> Result<InstanceId> {
        self.instantiate_with(ty, Initializers::new().value(target))
    }

    /// Create a pointer instance holding a raw address; a fresh default
    /// referent is created at that address (0 stays NULL).
    pub fn pointer_at(&mut self, ty: &Arc<TypeDescriptor>, address: u64) -> Result<InstanceId> {
        let id = self.instantiate(ty)?;
        if address != 0 {
            self.set_ref(id, address)?;
        }
        Ok(id)
    }

    /// Create an enum instance holding the named member.
    pub fn enum_of(&mut self, ty: &Arc<TypeDescriptor>, name: &str) -> Result<InstanceId> {
        let id = self.instantiate(ty)?;
        self.set_enum(id, name)?;
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Addresses & notifications
    // ------------------------------------------------------------------

    /// The instance's address in the simulated memory space, if assigned.
    pub fn address(&self, id: InstanceId) -> Option<u64> {
        let id = self.resolve(id);
        self.node(id).address
    }

    /// Assign (or clear) the instance's address.
    ///
    /// The change propagates to all contained members (struct members
    /// sequentially, union members at the same address, array elements by
    /// stride) and notifies the instance's container and referrer. If a
    /// container computes a different address for this instance, the
    /// address is reverted and an error is returned.
    pub fn set_address(&mut self, id: InstanceId, address: Option<u64>) -> Result<()> {
        if let Payload::Aliased(inner) = &self.node(id).payload {
            let inner = *inner;
            return self.set_address(inner, address);
        }
        let previous = self.node(id).address;
        self.node_mut(id).address = address;
        self.propagate_address(id)?;
        self.notify_address_changed(id, previous)
    }

    fn propagate_address(&mut self, id: InstanceId) -> Result<()> {
        let address = self.node(id).address;
        let descriptor = self.node(id).descriptor.clone();
        match &descriptor.kind {
            TypeKind::Struct(_) => {
                let members = self.child_ids(id);
                let mut running = address;
                for member in members {
                    self.set_address(member, running)?;
                    if let Some(base) = running {
                        running = Some(base + self.size(member) as u64);
                    }
                }
            }
            TypeKind::Union(_) => {
                for member in self.child_ids(id) {
                    self.set_address(member, address)?;
                }
            }
            TypeKind::Array(a) => {
                let stride = a.element_type.size() as u64;
                for (index, element) in self.child_ids(id).into_iter().enumerate() {
                    self.set_address(element, address.map(|base| base + stride * index as u64))?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn notify_address_changed(&mut self, id: InstanceId, previous: Option<u64>) -> Result<()> {
        if let Some(container) = self.node(id).container {
            self.child_address_changed(container, id, previous)?;
        }
        if let Some(referrer) = self.node(id).referrer {
            self.referent_address_changed(referrer, id, previous)?;
        }
        Ok(())
    }

    /// A contained child's address changed: verify it matches what this
    /// container dictates, reverting and failing otherwise.
    fn child_address_changed(
        &mut self,
        parent: InstanceId,
        child: InstanceId,
        previous: Option<u64>,
    ) -> Result<()> {
        let descriptor = self.node(parent).descriptor.clone();
        let expected = match &descriptor.kind {
            TypeKind::Struct(c) => {
                let index = self.member_position(parent, child);
                self.node(parent)
                    .address
                    .map(|base| base + c.offset_of(index) as u64)
            }
            TypeKind::Union(_) => self.node(parent).address,
            TypeKind::Array(a) => {
                let index = self.member_position(parent, child);
                self.node(parent)
                    .address
                    .map(|base| base + (a.element_type.size() * index) as u64)
            }
            // A typedef imposes nothing; the change is reported upward as
            // the typedef's own.
            TypeKind::Typedef(_) => return self.notify_address_changed(parent, previous),
            _ => return Ok(()),
        };
        let actual = self.address(child);
        if actual != expected {
            log::debug!(
                "[memory] reverting contained instance address {:?} (container dictates {:?})",
                actual,
                expected
            );
            self.set_address(child, expected)?;
            return Err(LayoutError::AddressInconsistent {
                expected,
                got: actual,
            });
        }
        Ok(())
    }

    fn member_position(&self, parent: InstanceId, child: InstanceId) -> usize {
        self.child_ids(parent)
            .iter()
            .position(|&m| m == child)
            .expect("child is a member of its container")
    }

    /// A referent's address changed: validate it against the pointer's
    /// encoding width, null the pointer if it became 0, and report the
    /// pointer's derived value change.
    fn referent_address_changed(
        &mut self,
        pointer: InstanceId,
        referent: InstanceId,
        previous: Option<u64>,
    ) -> Result<()> {
        let descriptor = self.node(pointer).descriptor.clone();
        let TypeKind::Pointer(p) = &descriptor.kind else {
            return Ok(());
        };
        let bits = p.bits;
        match self.address(referent) {
            Some(0) => {
                // Address 0 is NULL: the referent is dropped.
                self.node_mut(referent).referrer = None;
                self.node_mut(pointer).payload = Payload::Referent(None);
                self.value_changed(pointer)
            }
            Some(address) if bits < 64 && (address >> bits) != 0 => {
                self.set_address(referent, previous)?;
                Err(LayoutError::AddressOutOfRange { address, bits })
            }
            _ => self.value_changed(pointer),
        }
    }

    /// Report a value change to the instance's container.
    ///
    /// A referrer is always a pointer, and a pointer's value derives only
    /// from its referent's *address* — referent value changes do not flow
    /// through it.
    pub(crate) fn value_changed(&mut self, id: InstanceId) -> Result<()> {
        if let Some(container) = self.node(id).container {
            self.child_value_changed(container, id)?;
        }
        Ok(())
    }

    pub(crate) fn child_value_changed(
        &mut self,
        parent: InstanceId,
        child: InstanceId,
    ) -> Result<()> {
        let descriptor = self.node(parent).descriptor.clone();
        match &descriptor.kind {
            TypeKind::Struct(_) | TypeKind::Array(_) => {
                if self.node(parent).quiesced {
                    Ok(())
                } else {
                    self.value_changed(parent)
                }
            }
            TypeKind::Union(_) => self.union_member_changed(parent, child),
            // The typedef identity, not the hidden wrapped instance, is
            // what the outside world sees change.
            TypeKind::Typedef(_) => self.value_changed(parent),
            _ => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Union aliasing
    // ------------------------------------------------------------------

    fn union_endianness(&self, id: InstanceId) -> Endianness {
        match &self.node(id).descriptor.kind {
            TypeKind::Union(u) => u.endianness,
            _ => Endianness::Little,
        }
    }

    /// A union member's value changed: splice its bytes into the union's
    /// image and decode that image back into every member, then emit one
    /// consolidated value change. Re-entrant notifications are suppressed
    /// while the fix-up runs.
    pub(crate) fn union_member_changed(
        &mut self,
        union: InstanceId,
        child: InstanceId,
    ) -> Result<()> {
        if self.node(union).quiesced {
            return Ok(());
        }
        let endianness = self.union_endianness(union);
        self.set_quiesced(union, true);
        let result = self.union_refresh(union, child, endianness);
        self.set_quiesced(union, false);
        result?;
        self.value_changed(union)
    }

    fn union_refresh(
        &mut self,
        union: InstanceId,
        child: InstanceId,
        endianness: Endianness,
    ) -> Result<()> {
        log::trace!("[union] refreshing member aliases after member change");
        let mut image = self.pack(union, endianness)?;
        let patch = self.pack(child, endianness)?;
        image[..patch.len()].copy_from_slice(&patch);
        self.decode_members(union, &image, endianness)
    }

    fn union_default_cycle(&mut self, union: InstanceId) -> Result<()> {
        let endianness = self.union_endianness(union);
        let image = self.pack(union, endianness)?;
        self.set_quiesced(union, true);
        let result = self.decode_members(union, &image, endianness);
        self.set_quiesced(union, false);
        result
    }
}
