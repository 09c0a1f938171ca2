// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed operations on live instances: scalar values, composite members,
//! array elements, pointer referents, enum members and literals.
//!
//! Every operation forwards transparently through typedef wrappers, and
//! every mutation runs the notification protocol so containers and
//! referrers stay consistent.

use crate::decl::indent;
use crate::descriptor::TypeKind;
use crate::error::{LayoutError, Result};
use crate::memory::{InstanceId, Memory, Payload};
use crate::value::{char_literal, FromValue, IntoValue, Value};

fn resolve_index(index: isize, length: usize) -> Result<usize> {
    let len = length as isize;
    if index >= len || index < -len {
        return Err(LayoutError::IndexOutOfRange { index, length });
    }
    Ok(if index < 0 {
        (len + index) as usize
    } else {
        index as usize
    })
}

impl Memory {
    // ------------------------------------------------------------------
    // Primitive values
    // ------------------------------------------------------------------

    /// Read a primitive instance's value.
    pub fn get<T: FromValue>(&self, id: InstanceId) -> Result<T> {
        let id = self.resolve(id);
        match &self.node(id).payload {
            Payload::Scalar(value) => T::from_value(value),
            _ => Err(LayoutError::InvalidOperation(
                "value access requires a primitive instance".to_string(),
            )),
        }
    }

    /// Read a primitive instance's raw scalar.
    pub fn value(&self, id: InstanceId) -> Result<Value> {
        let id = self.resolve(id);
        match &self.node(id).payload {
            Payload::Scalar(value) => Ok(*value),
            _ => Err(LayoutError::InvalidOperation(
                "value access requires a primitive instance".to_string(),
            )),
        }
    }

    /// Write a primitive instance's value.
    ///
    /// The value first passes through the C type's cast function
    /// (two's-complement truncation to the declared width), then the
    /// change is reported to the container/referrer.
    pub fn set<T: IntoValue>(&mut self, id: InstanceId, value: T) -> Result<()> {
        self.set_value(id, value.into_value())
    }

    /// Write a primitive instance's raw scalar (cast applies).
    pub fn set_value(&mut self, id: InstanceId, value: Value) -> Result<()> {
        let id = self.resolve(id);
        let descriptor = self.node(id).descriptor.clone();
        let TypeKind::Primitive(kind) = &descriptor.kind else {
            return Err(LayoutError::InvalidOperation(
                "value access requires a primitive instance".to_string(),
            ));
        };
        let cast = kind.cast(value);
        match &mut self.node_mut(id).payload {
            Payload::Scalar(slot) => *slot = cast,
            _ => unreachable!("primitive instances hold scalars"),
        }
        self.value_changed(id)
    }

    // ------------------------------------------------------------------
    // Composite members
    // ------------------------------------------------------------------

    /// The member instance with the given name.
    pub fn member(&self, id: InstanceId, name: &str) -> Result<InstanceId> {
        let id = self.resolve(id);
        let descriptor = self.node(id).descriptor.clone();
        let composite = descriptor.composite().ok_or_else(|| {
            LayoutError::InvalidOperation(
                "member access requires a struct or union instance".to_string(),
            )
        })?;
        let index = composite
            .index_of(name)
            .ok_or_else(|| LayoutError::NoSuchMember {
                name: name.to_string(),
            })?;
        Ok(self.child_ids(id)[index])
    }

    /// All member instances in declaration order.
    pub fn members(&self, id: InstanceId) -> Result<Vec<InstanceId>> {
        let id = self.resolve(id);
        if self.node(id).descriptor.composite().is_none() {
            return Err(LayoutError::InvalidOperation(
                "member access requires a struct or union instance".to_string(),
            ));
        }
        Ok(self.child_ids(id))
    }

    /// Replace the named member with another instance of the declared
    /// member type.
    ///
    /// The new member's address is re-derived from the container; the old
    /// member is released (keeping its address) and the change is
    /// reported upward.
    pub fn set_member(&mut self, id: InstanceId, name: &str, new: InstanceId) -> Result<()> {
        let parent = self.resolve(id);
        let descriptor = self.node(parent).descriptor.clone();
        let composite = descriptor.composite().ok_or_else(|| {
            LayoutError::InvalidOperation(
                "member access requires a struct or union instance".to_string(),
            )
        })?;
        let index = composite
            .index_of(name)
            .ok_or_else(|| LayoutError::NoSuchMember {
                name: name.to_string(),
            })?;
        let declared = composite.members[index].data_type.clone();
        let is_union = matches!(descriptor.kind, TypeKind::Union(_));

        let old = self.child_ids(parent)[index];
        if new != old {
            self.check_assignable(new, &declared)?;
            self.node_mut(old).container = None;
            if let Payload::Members(members) = &mut self.node_mut(parent).payload {
                members[index] = new;
            }
            self.node_mut(new).container = Some(parent);
        }

        let expected = if is_union {
            self.node(parent).address
        } else {
            self.node(parent)
                .address
                .map(|base| base + composite.offset_of(index) as u64)
        };
        self.set_address(new, expected)?;
        self.child_value_changed(parent, new)
    }

    // ------------------------------------------------------------------
    // Array elements
    // ------------------------------------------------------------------

    /// Declared array length.
    pub fn array_len(&self, id: InstanceId) -> Result<usize> {
        let id = self.resolve(id);
        match &self.node(id).descriptor.kind {
            TypeKind::Array(a) => Ok(a.length),
            _ => Err(LayoutError::InvalidOperation(
                "element access requires an array instance".to_string(),
            )),
        }
    }

    /// The element at `index` (negative indices wrap from the end).
    pub fn element(&self, id: InstanceId, index: isize) -> Result<InstanceId> {
        let id = self.resolve(id);
        let length = match &self.node(id).descriptor.kind {
            TypeKind::Array(a) => a.length,
            _ => {
                return Err(LayoutError::InvalidOperation(
                    "element access requires an array instance".to_string(),
                ))
            }
        };
        let index = resolve_index(index, length)?;
        Ok(self.child_ids(id)[index])
    }

    /// Replace the element at `index` with another instance of the
    /// element type.
    pub fn set_element(&mut self, id: InstanceId, index: isize, new: InstanceId) -> Result<()> {
        let parent = self.resolve(id);
        let descriptor = self.node(parent).descriptor.clone();
        let TypeKind::Array(a) = &descriptor.kind else {
            return Err(LayoutError::InvalidOperation(
                "element access requires an array instance".to_string(),
            ));
        };
        let index = resolve_index(index, a.length)?;
        let element_type = a.element_type.clone();
        let stride = element_type.size();

        let old = self.child_ids(parent)[index];
        if new != old {
            self.check_assignable(new, &element_type)?;
            self.node_mut(old).container = None;
            if let Payload::Elements(elements) = &mut self.node_mut(parent).payload {
                elements[index] = new;
            }
            self.node_mut(new).container = Some(parent);
        }

        let expected = self
            .node(parent)
            .address
            .map(|base| base + (stride * index) as u64);
        self.set_address(new, expected)?;
        // The array's own value changed; report upward.
        self.value_changed(parent)
    }

    // ------------------------------------------------------------------
    // Pointers
    // ------------------------------------------------------------------

    /// The instance the pointer targets, or `None` for NULL.
    pub fn deref(&self, id: InstanceId) -> Result<Option<InstanceId>> {
        let id = self.resolve(id);
        match &self.node(id).payload {
            Payload::Referent(referent) => Ok(*referent),
            _ => Err(LayoutError::InvalidOperation(
                "dereference requires a pointer instance".to_string(),
            )),
        }
    }

    /// Point at an existing instance (`None` sets NULL).
    ///
    /// A referent whose address is 0 is equivalent to nulling. The
    /// referent must be of the pointer's target type, unowned and not
    /// already referenced.
    pub fn set_deref(&mut self, id: InstanceId, target: Option<InstanceId>) -> Result<()> {
        let pointer = self.resolve(id);
        let descriptor = self.node(pointer).descriptor.clone();
        let TypeKind::Pointer(p) = &descriptor.kind else {
            return Err(LayoutError::InvalidOperation(
                "dereference requires a pointer instance".to_string(),
            ));
        };
        let target_type = p.target_type.clone();
        let bits = p.bits;

        let Some(target) = target else {
            self.drop_referent(pointer);
            return self.value_changed(pointer);
        };

        if self.deref(pointer)? == Some(target) {
            return self.value_changed(pointer);
        }
        let actual = self.node(target).descriptor.clone();
        if actual.as_ref() != target_type.as_ref() {
            return Err(LayoutError::TypeMismatch {
                expected: target_type.name.clone(),
                got: actual.name.clone(),
            });
        }
        match self.address(target) {
            Some(0) => {
                self.drop_referent(pointer);
                self.value_changed(pointer)
            }
            Some(address) if bits < 64 && (address >> bits) != 0 => {
                Err(LayoutError::AddressOutOfRange { address, bits })
            }
            _ => {
                // At most one pointer may target a given instance.
                if self.node(target).referrer.is_some() {
                    return Err(LayoutError::AlreadyReferenced);
                }
                self.drop_referent(pointer);
                self.node_mut(pointer).payload = Payload::Referent(Some(target));
                self.node_mut(target).referrer = Some(pointer);
                self.value_changed(pointer)
            }
        }
    }

    /// The address the pointer points at: `Some(0)` for NULL, `None` if
    /// the referent has not been assigned an address.
    pub fn ref_value(&self, id: InstanceId) -> Result<Option<u64>> {
        let id = self.resolve(id);
        match &self.node(id).payload {
            Payload::Referent(None) => Ok(Some(0)),
            Payload::Referent(Some(target)) => Ok(self.address(*target)),
            _ => Err(LayoutError::InvalidOperation(
                "dereference requires a pointer instance".to_string(),
            )),
        }
    }

    /// Change the address the pointer points at.
    ///
    /// 0 nulls the pointer. A new nonzero address replaces the referent
    /// with a fresh default instance of the target type at that address;
    /// the current referent's own address is a no-op.
    pub fn set_ref(&mut self, id: InstanceId, address: u64) -> Result<()> {
        let pointer = self.resolve(id);
        let descriptor = self.node(pointer).descriptor.clone();
        let TypeKind::Pointer(p) = &descriptor.kind else {
            return Err(LayoutError::InvalidOperation(
                "dereference requires a pointer instance".to_string(),
            ));
        };
        let target_type = p.target_type.clone();
        let bits = p.bits;

        if address == 0 {
            self.drop_referent(pointer);
            return self.value_changed(pointer);
        }
        if bits < 64 && (address >> bits) != 0 {
            return Err(LayoutError::AddressOutOfRange { address, bits });
        }
        if let Payload::Referent(Some(target)) = &self.node(pointer).payload {
            if self.address(*target) == Some(address) {
                // Unchanged: keep the existing referent untouched.
                return Ok(());
            }
        }
        let fresh = self.instantiate(&target_type)?;
        self.set_address(fresh, Some(address))?;
        self.drop_referent(pointer);
        self.node_mut(pointer).payload = Payload::Referent(Some(fresh));
        self.node_mut(fresh).referrer = Some(pointer);
        self.value_changed(pointer)
    }

    fn drop_referent(&mut self, pointer: InstanceId) {
        if let Payload::Referent(Some(target)) = &self.node(pointer).payload {
            let target = *target;
            self.node_mut(target).referrer = None;
        }
        self.node_mut(pointer).payload = Payload::Referent(None);
    }

    // ------------------------------------------------------------------
    // Enums & padding
    // ------------------------------------------------------------------

    /// The name of the enum member this instance holds.
    pub fn enum_value(&self, id: InstanceId) -> Result<&str> {
        let id = self.resolve(id);
        let node = self.node(id);
        match (&node.descriptor.kind, &node.payload) {
            (TypeKind::Enum(e), Payload::EnumMember(index)) => {
                Ok(e.members[*index].name.as_str())
            }
            _ => Err(LayoutError::InvalidOperation(
                "enum access requires an enum instance".to_string(),
            )),
        }
    }

    /// Set the enum instance to the named member.
    pub fn set_enum(&mut self, id: InstanceId, name: &str) -> Result<()> {
        let id = self.resolve(id);
        let descriptor = self.node(id).descriptor.clone();
        let TypeKind::Enum(e) = &descriptor.kind else {
            return Err(LayoutError::InvalidOperation(
                "enum access requires an enum instance".to_string(),
            ));
        };
        let index = e.index_of(name).ok_or_else(|| LayoutError::NotAnEnumMember {
            name: name.to_string(),
        })?;
        self.node_mut(id).payload = Payload::EnumMember(index);
        self.value_changed(id)
    }

    /// The bytes a padding instance currently holds.
    pub fn padding_bytes(&self, id: InstanceId) -> Result<&[u8]> {
        let id = self.resolve(id);
        match &self.node(id).payload {
            Payload::Bytes(bytes) => Ok(bytes),
            _ => Err(LayoutError::InvalidOperation(
                "byte access requires a padding instance".to_string(),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Literals
    // ------------------------------------------------------------------

    /// C-syntax literal text for the instance's current value.
    pub fn literal(&self, id: InstanceId) -> String {
        let node = self.node(id);
        match (&node.descriptor.kind, &node.payload) {
            (TypeKind::Primitive(p), Payload::Scalar(value)) => p.literal(value),
            (TypeKind::Enum(e), Payload::EnumMember(index)) => e.members[*index].name.clone(),
            (TypeKind::Padding(_), Payload::Bytes(bytes)) => {
                let body: Vec<String> = bytes.iter().map(|&b| char_literal(b)).collect();
                format!("{{{}}}", body.join(", "))
            }
            (TypeKind::Struct(_) | TypeKind::Union(_), Payload::Members(members)) => {
                let body: Vec<String> = members.iter().map(|&m| self.literal(m)).collect();
                format!(
                    "({}){{\n{}\n}}",
                    node.descriptor.name,
                    indent(&body.join(",\n"))
                )
            }
            (TypeKind::Array(_), Payload::Elements(elements)) => {
                let body: Vec<String> = elements.iter().map(|&e| self.literal(e)).collect();
                format!("{{{}}}", body.join(", "))
            }
            (TypeKind::Pointer(_), Payload::Referent(None)) => "NULL".to_string(),
            (TypeKind::Pointer(_), Payload::Referent(Some(target))) => {
                format!("&{}", self.literal(*target))
            }
            (TypeKind::Typedef(_), Payload::Aliased(inner)) => {
                format!("({}){}", node.descriptor.name, self.literal(*inner))
            }
            _ => String::new(),
        }
    }
}
