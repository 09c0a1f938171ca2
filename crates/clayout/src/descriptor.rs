// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Immutable layout descriptors — the "data type" half of the model.
//!
//! A [`TypeDescriptor`] describes a C-compatible memory layout and acts as
//! a factory for mutable instances held in a [`Memory`](crate::Memory).
//! Descriptors are shared as `Arc` and compared by *name*: two descriptors
//! are the same type iff their names match (anonymous composites take their
//! full definition text as their name).

use crate::endianness::Endianness;
use crate::error::{DefinitionError, Result};
use crate::memory::{InstanceId, Memory};
use crate::value::CPrimitive;
use std::collections::HashSet;
use std::sync::Arc;

/// Type kind enumeration.
#[derive(Debug)]
pub enum TypeKind {
    /// Fixed-width scalar.
    Primitive(CPrimitive),
    /// Sequential, non-overlapping named members.
    Struct(CompositeDescriptor),
    /// Overlapping named members, all aliasing the same bytes.
    Union(UnionDescriptor),
    /// Fixed-length homogeneous sequence (a container, not a reference).
    Array(ArrayDescriptor),
    /// Fixed-width reference to zero-or-one instance elsewhere.
    Pointer(PointerDescriptor),
    /// Closed set of named integer values.
    Enum(EnumDescriptor),
    /// Transparent alias of another type.
    Typedef(TypedefDescriptor),
    /// Fixed-length opaque byte region for explicit alignment gaps.
    Padding(usize),
}

/// A complete, immutable type descriptor.
#[derive(Debug)]
pub struct TypeDescriptor {
    /// The C identifier of this type (string identity).
    pub name: String,
    /// Is this type native to C / the target ABI (nothing to declare)?
    pub native: bool,
    /// Description, emitted as a comment in the definition text.
    pub doc: String,
    /// Type kind.
    pub kind: TypeKind,
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for TypeDescriptor {}

impl TypeDescriptor {
    /// Descriptor for a primitive C type.
    pub fn primitive(kind: CPrimitive) -> Arc<Self> {
        Arc::new(Self {
            name: kind.name().to_string(),
            native: true,
            doc: String::new(),
            kind: TypeKind::Primitive(kind),
        })
    }

    /// Descriptor for a fixed-length array of `element_type`.
    pub fn array(element_type: Arc<TypeDescriptor>, length: usize) -> Arc<Self> {
        let name = format!("{}[{}]", element_type.declare(""), length);
        Arc::new(Self {
            name,
            // Arrays are a basic part of the language.
            native: true,
            doc: String::new(),
            kind: TypeKind::Array(ArrayDescriptor {
                element_type,
                length,
            }),
        })
    }

    /// Descriptor for a pointer to `target_type` with the given address
    /// width in bits (8, 16, 32 or 64).
    pub fn pointer(
        target_type: Arc<TypeDescriptor>,
        bits: u8,
    ) -> std::result::Result<Arc<Self>, DefinitionError> {
        if !matches!(bits, 8 | 16 | 32 | 64) {
            return Err(DefinitionError::UnsupportedWidth { bits });
        }
        let name = format!("{}*", target_type.name);
        let native = target_type.native;
        Ok(Arc::new(Self {
            name,
            native,
            doc: String::new(),
            kind: TypeKind::Pointer(PointerDescriptor { target_type, bits }),
        }))
    }

    /// Descriptor for a typedef alias of `base_type`.
    pub fn typedef(name: impl Into<String>, base_type: Arc<TypeDescriptor>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            native: false,
            doc: String::new(),
            kind: TypeKind::Typedef(TypedefDescriptor { base_type }),
        })
    }

    /// Descriptor for an opaque padding region of `length` bytes.
    pub fn padding(length: usize) -> Arc<Self> {
        Arc::new(Self {
            name: format!("char[{}]", length),
            // Padding is just an array of chars.
            native: true,
            doc: String::new(),
            kind: TypeKind::Padding(length),
        })
    }

    /// Instantiate this type with default values.
    pub fn instantiate(self: &Arc<Self>, mem: &mut Memory) -> Result<InstanceId> {
        mem.instantiate(self)
    }

    /// Byte size of this type's binary encoding.
    ///
    /// Every width in the model is fixed by the descriptor, so no instance
    /// is needed (a zero-length array is 0 bytes).
    pub fn size(&self) -> usize {
        match &self.kind {
            TypeKind::Primitive(p) => p.size(),
            TypeKind::Struct(c) => c.members.iter().map(|m| m.data_type.size()).sum(),
            TypeKind::Union(u) => u
                .composite
                .members
                .iter()
                .map(|m| m.data_type.size())
                .max()
                .unwrap_or(0),
            TypeKind::Array(a) => a.element_type.size() * a.length,
            TypeKind::Pointer(p) => usize::from(p.bits / 8),
            TypeKind::Enum(e) => usize::from(e.bits / 8),
            TypeKind::Typedef(t) => t.base_type.size(),
            TypeKind::Padding(n) => *n,
        }
    }

    /// The composite member table, for structs and unions.
    pub fn composite(&self) -> Option<&CompositeDescriptor> {
        match &self.kind {
            TypeKind::Struct(c) => Some(c),
            TypeKind::Union(u) => Some(&u.composite),
            _ => None,
        }
    }

    /// Every data type transitively referenced by this one, each exactly
    /// once (deduplicated by name), contents before containers, self last.
    pub fn iter_types(self: &Arc<Self>) -> impl Iterator<Item = Arc<TypeDescriptor>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        self.collect_types(&mut seen, &mut out);
        out.into_iter()
    }

    fn collect_types(self: &Arc<Self>, seen: &mut HashSet<String>, out: &mut Vec<Arc<Self>>) {
        if !seen.insert(self.name.clone()) {
            return;
        }
        match &self.kind {
            TypeKind::Struct(c) => {
                for member in &c.members {
                    member.data_type.collect_types(seen, out);
                }
            }
            TypeKind::Union(u) => {
                for member in &u.composite.members {
                    member.data_type.collect_types(seen, out);
                }
            }
            TypeKind::Array(a) => a.element_type.collect_types(seen, out),
            TypeKind::Pointer(p) => p.target_type.collect_types(seen, out),
            TypeKind::Typedef(t) => t.base_type.collect_types(seen, out),
            TypeKind::Primitive(_) | TypeKind::Enum(_) | TypeKind::Padding(_) => {}
        }
        out.push(self.clone());
    }
}

impl CPrimitive {
    /// Shorthand for [`TypeDescriptor::primitive`].
    pub fn ty(self) -> Arc<TypeDescriptor> {
        TypeDescriptor::primitive(self)
    }
}

/// A named member of a struct or union.
#[derive(Debug)]
pub struct MemberDescriptor {
    /// Member name.
    pub name: String,
    /// Member type.
    pub data_type: Arc<TypeDescriptor>,
    /// Description, emitted as a comment in the definition text.
    pub doc: String,
}

/// The shared member table of structs and unions.
#[derive(Debug)]
pub struct CompositeDescriptor {
    /// Tag name (`struct <tag>`); anonymous if absent.
    pub tag: Option<String>,
    /// Members in declaration order.
    pub members: Vec<MemberDescriptor>,
}

impl CompositeDescriptor {
    /// Index of the member with this name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }

    /// Member descriptor by name.
    pub fn member(&self, name: &str) -> Option<&MemberDescriptor> {
        self.members.iter().find(|m| m.name == name)
    }

    /// Byte offset of member `index` under sequential (struct) layout.
    pub fn offset_of(&self, index: usize) -> usize {
        self.members[..index]
            .iter()
            .map(|m| m.data_type.size())
            .sum()
    }

    /// Index of the first member of maximal size (the union byte image).
    pub fn largest_index(&self) -> Option<usize> {
        let max = self.members.iter().map(|m| m.data_type.size()).max()?;
        self.members
            .iter()
            .position(|m| m.data_type.size() == max)
    }
}

/// Union descriptor: a member table plus the byte order fixed at
/// definition time (the aliasing fix-up must use a single byte order).
#[derive(Debug)]
pub struct UnionDescriptor {
    /// Member table (all members at offset 0).
    pub composite: CompositeDescriptor,
    /// The byte order every pack/unpack of this union must use.
    pub endianness: Endianness,
}

/// Array descriptor.
#[derive(Debug)]
pub struct ArrayDescriptor {
    /// Element type.
    pub element_type: Arc<TypeDescriptor>,
    /// Fixed length.
    pub length: usize,
}

/// Pointer descriptor.
#[derive(Debug)]
pub struct PointerDescriptor {
    /// The type of value the pointer points at.
    pub target_type: Arc<TypeDescriptor>,
    /// Address encoding width in bits (8, 16, 32 or 64).
    pub bits: u8,
}

/// Enumeration descriptor.
#[derive(Debug)]
pub struct EnumDescriptor {
    /// Tag name (`enum <tag>`); anonymous if absent.
    pub tag: Option<String>,
    /// Members in declaration order.
    pub members: Vec<EnumMember>,
    /// Encoding width in bits (8, 16, 32 or 64).
    pub bits: u8,
}

impl EnumDescriptor {
    /// Index of the member with this name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }

    /// Index of the member with this value.
    pub fn index_of_value(&self, value: u64) -> Option<usize> {
        self.members.iter().position(|m| m.value == value)
    }
}

/// A single enum member.
#[derive(Debug)]
pub struct EnumMember {
    /// Member name.
    pub name: String,
    /// Member value.
    pub value: u64,
    /// Description, emitted as a comment in the definition text.
    pub doc: String,
}

/// Typedef descriptor.
#[derive(Debug)]
pub struct TypedefDescriptor {
    /// The aliased type.
    pub base_type: Arc<TypeDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_descriptor() {
        let ty = CPrimitive::UnsignedInt.ty();
        assert_eq!(ty.name, "unsigned int");
        assert!(ty.native);
        assert_eq!(ty.size(), 4);
    }

    #[test]
    fn test_name_equality() {
        // Two independently built descriptors of the same name are equal.
        assert_eq!(CPrimitive::Char.ty(), CPrimitive::Char.ty());
        assert_ne!(CPrimitive::Char.ty(), CPrimitive::Int.ty());
    }

    #[test]
    fn test_pointer_width_validation() {
        assert!(TypeDescriptor::pointer(CPrimitive::Char.ty(), 48).is_err());
        let p = TypeDescriptor::pointer(CPrimitive::Char.ty(), 16).unwrap();
        assert_eq!(p.size(), 2);
        assert_eq!(p.name, "char*");
        assert!(p.native);
    }

    #[test]
    fn test_array_descriptor() {
        let a = TypeDescriptor::array(CPrimitive::Char.ty(), 4);
        assert_eq!(a.name, "char[4]");
        assert_eq!(a.size(), 4);
        let empty = TypeDescriptor::array(CPrimitive::LongLong.ty(), 0);
        assert_eq!(empty.size(), 0);
    }

    #[test]
    fn test_iter_types_double_pointer() {
        let char_p = TypeDescriptor::pointer(CPrimitive::Char.ty(), 32).unwrap();
        let char_pp = TypeDescriptor::pointer(char_p.clone(), 32).unwrap();
        let names: Vec<String> = char_pp.iter_types().map(|t| t.name.clone()).collect();
        assert_eq!(names, ["char", "char*", "char**"]);
    }

    #[test]
    fn test_iter_types_typedef() {
        let alias = TypeDescriptor::typedef("byte_t", CPrimitive::UnsignedChar.ty());
        let names: Vec<String> = alias.iter_types().map(|t| t.name.clone()).collect();
        assert_eq!(names, ["unsigned char", "byte_t"]);
    }
}
