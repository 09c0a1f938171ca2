// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fluent builders for composite and enum type descriptors.
//!
//! All schema-level validation happens in `build()`: reserved member
//! names, duplicates, enum value ranges and widths. Definition errors are
//! programmer/schema bugs and are reported before any descriptor exists.

use crate::decl::{composite_definition, enum_definition};
use crate::descriptor::{
    CompositeDescriptor, EnumDescriptor, EnumMember, MemberDescriptor, TypeDescriptor, TypeKind,
    UnionDescriptor,
};
use crate::endianness::Endianness;
use crate::error::DefinitionError;
use std::sync::Arc;

/// Identifiers that cannot be used as member names: they are part of the
/// instance contract itself (an explicit enumerated set, checked at
/// definition time).
const RESERVED_MEMBER_NAMES: &[&str] = &[
    "address",
    "size",
    "literal",
    "data_type",
    "pack",
    "unpack",
    "iter_references",
    "iter_instances",
];

/// The separator used by nested initial-value names (`outer__inner`).
pub(crate) const NESTED_SEPARATOR: &str = "__";

fn check_member_name(name: &str) -> Result<(), DefinitionError> {
    // "_"-prefixed names are kept for internal use, and "__" inside a name
    // would be ambiguous with the nested initial-value syntax.
    if RESERVED_MEMBER_NAMES.contains(&name)
        || name.starts_with('_')
        || name.contains(NESTED_SEPARATOR)
    {
        return Err(DefinitionError::ReservedMemberName {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn validate_members(members: &[MemberDescriptor]) -> Result<(), DefinitionError> {
    for (i, member) in members.iter().enumerate() {
        check_member_name(&member.name)?;
        if members[..i].iter().any(|m| m.name == member.name) {
            return Err(DefinitionError::DuplicateMember {
                name: member.name.clone(),
            });
        }
    }
    Ok(())
}

/// Builder for C struct types.
#[derive(Debug)]
pub struct StructBuilder {
    tag: Option<String>,
    members: Vec<MemberDescriptor>,
    native: bool,
    doc: String,
}

impl StructBuilder {
    /// Start a named struct (`struct <tag>`).
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            members: Vec::new(),
            native: false,
            doc: String::new(),
        }
    }

    /// Start an anonymous struct (suitable for nesting or typedefing);
    /// its identity is its full definition text.
    pub fn anonymous() -> Self {
        Self {
            tag: None,
            members: Vec::new(),
            native: false,
            doc: String::new(),
        }
    }

    /// Append a member.
    pub fn member(self, name: impl Into<String>, data_type: Arc<TypeDescriptor>) -> Self {
        self.member_doc(name, data_type, "")
    }

    /// Append a member with a documentation comment.
    pub fn member_doc(
        mut self,
        name: impl Into<String>,
        data_type: Arc<TypeDescriptor>,
        doc: impl Into<String>,
    ) -> Self {
        self.members.push(MemberDescriptor {
            name: name.into(),
            data_type,
            doc: doc.into(),
        });
        self
    }

    /// Mark the type as native (nothing to declare for it).
    pub fn native(mut self) -> Self {
        self.native = true;
        self
    }

    /// Set the type documentation.
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    /// Validate and build the descriptor.
    pub fn build(self) -> Result<Arc<TypeDescriptor>, DefinitionError> {
        validate_members(&self.members)?;
        let composite = CompositeDescriptor {
            tag: self.tag,
            members: self.members,
        };
        let name = composite_name("struct", &composite);
        Ok(Arc::new(TypeDescriptor {
            name,
            native: self.native,
            doc: self.doc,
            kind: TypeKind::Struct(composite),
        }))
    }
}

/// Builder for C union types.
///
/// Unions fix their byte order at definition time: keeping overlapping
/// members value-consistent requires one authoritative byte image.
#[derive(Debug)]
pub struct UnionBuilder {
    tag: Option<String>,
    members: Vec<MemberDescriptor>,
    endianness: Endianness,
    native: bool,
    doc: String,
}

impl UnionBuilder {
    /// Start a named union (`union <tag>`).
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            members: Vec::new(),
            endianness: Endianness::Little,
            native: false,
            doc: String::new(),
        }
    }

    /// Start an anonymous union.
    pub fn anonymous() -> Self {
        Self {
            tag: None,
            members: Vec::new(),
            endianness: Endianness::Little,
            native: false,
            doc: String::new(),
        }
    }

    /// Append a member.
    pub fn member(self, name: impl Into<String>, data_type: Arc<TypeDescriptor>) -> Self {
        self.member_doc(name, data_type, "")
    }

    /// Append a member with a documentation comment.
    pub fn member_doc(
        mut self,
        name: impl Into<String>,
        data_type: Arc<TypeDescriptor>,
        doc: impl Into<String>,
    ) -> Self {
        self.members.push(MemberDescriptor {
            name: name.into(),
            data_type,
            doc: doc.into(),
        });
        self
    }

    /// Set the byte order all pack/unpack calls for this union must use.
    pub fn endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    /// Mark the type as native.
    pub fn native(mut self) -> Self {
        self.native = true;
        self
    }

    /// Set the type documentation.
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    /// Validate and build the descriptor.
    pub fn build(self) -> Result<Arc<TypeDescriptor>, DefinitionError> {
        validate_members(&self.members)?;
        let composite = CompositeDescriptor {
            tag: self.tag,
            members: self.members,
        };
        let name = composite_name("union", &composite);
        Ok(Arc::new(TypeDescriptor {
            name,
            native: self.native,
            doc: self.doc,
            kind: TypeKind::Union(UnionDescriptor {
                composite,
                endianness: self.endianness,
            }),
        }))
    }
}

fn composite_name(keyword: &str, composite: &CompositeDescriptor) -> String {
    match &composite.tag {
        Some(tag) => format!("{} {}", keyword, tag),
        // Anonymous: the identity is the full definition text.
        None => composite_definition(keyword, composite)
            .trim_end_matches(';')
            .to_string(),
    }
}

/// Builder for C enumeration types.
#[derive(Debug)]
pub struct EnumBuilder {
    tag: Option<String>,
    entries: Vec<(String, Option<u64>, String)>,
    bits: u8,
    native: bool,
    doc: String,
}

impl EnumBuilder {
    /// Start a named enum (`enum <tag>`), 32-bit by default.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            entries: Vec::new(),
            bits: 32,
            native: false,
            doc: String::new(),
        }
    }

    /// Start an anonymous enum.
    pub fn anonymous() -> Self {
        Self {
            tag: None,
            entries: Vec::new(),
            bits: 32,
            native: false,
            doc: String::new(),
        }
    }

    /// Append a member whose value auto-increments from the previous one
    /// (or starts at 0).
    pub fn member(mut self, name: impl Into<String>) -> Self {
        self.entries.push((name.into(), None, String::new()));
        self
    }

    /// Append a member with an explicit value.
    pub fn member_value(mut self, name: impl Into<String>, value: u64) -> Self {
        self.entries.push((name.into(), Some(value), String::new()));
        self
    }

    /// Append a member with an explicit value and a documentation comment.
    pub fn member_doc(
        mut self,
        name: impl Into<String>,
        value: u64,
        doc: impl Into<String>,
    ) -> Self {
        self.entries.push((name.into(), Some(value), doc.into()));
        self
    }

    /// Set the encoding width in bits (8, 16, 32 or 64).
    pub fn width(mut self, bits: u8) -> Self {
        self.bits = bits;
        self
    }

    /// Mark the type as native.
    pub fn native(mut self) -> Self {
        self.native = true;
        self
    }

    /// Set the type documentation.
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    /// Validate and build the descriptor.
    pub fn build(self) -> Result<Arc<TypeDescriptor>, DefinitionError> {
        if !matches!(self.bits, 8 | 16 | 32 | 64) {
            return Err(DefinitionError::UnsupportedWidth { bits: self.bits });
        }
        if self.entries.is_empty() {
            return Err(DefinitionError::EmptyEnum);
        }

        let mut members: Vec<EnumMember> = Vec::with_capacity(self.entries.len());
        let mut next_value = 0u64;
        for (name, value, doc) in self.entries {
            let value = value.unwrap_or(next_value);
            check_member_name(&name)?;
            if members.iter().any(|m| m.name == name) {
                return Err(DefinitionError::DuplicateEnumName { name });
            }
            if members.iter().any(|m| m.value == value) {
                return Err(DefinitionError::DuplicateEnumValue { value });
            }
            if u128::from(value) >= (1u128 << self.bits) {
                return Err(DefinitionError::EnumValueOutOfRange {
                    value,
                    bits: self.bits,
                });
            }
            members.push(EnumMember { name, value, doc });
            next_value = value + 1;
        }

        let name = match &self.tag {
            Some(tag) => format!("enum {}", tag),
            None => enum_definition(None, &members)
                .trim_end_matches(';')
                .to_string(),
        };
        Ok(Arc::new(TypeDescriptor {
            name,
            native: self.native,
            doc: self.doc,
            kind: TypeKind::Enum(EnumDescriptor {
                tag: self.tag,
                members,
                bits: self.bits,
            }),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::CPrimitive;

    #[test]
    fn test_struct_builder() {
        let ty = StructBuilder::new("point")
            .member("x", CPrimitive::Int.ty())
            .member("y", CPrimitive::Int.ty())
            .build()
            .expect("valid struct");
        assert_eq!(ty.name, "struct point");
        assert_eq!(ty.size(), 8);
        assert_eq!(ty.prototype(), "struct point;");
        assert_eq!(
            ty.definition(),
            "struct point {\n    int x;\n    int y;\n};"
        );
    }

    #[test]
    fn test_anonymous_struct_name_is_definition() {
        let ty = StructBuilder::anonymous()
            .member("a", CPrimitive::Char.ty())
            .build()
            .expect("valid struct");
        assert_eq!(ty.name, "struct {\n    char a;\n}");
        assert_eq!(ty.prototype(), "");
        assert_eq!(ty.definition(), "");
    }

    #[test]
    fn test_reserved_member_names() {
        for bad in ["address", "pack", "_hidden", "a__b"] {
            let result = StructBuilder::new("bad")
                .member(bad, CPrimitive::Int.ty())
                .build();
            assert!(
                matches!(result, Err(DefinitionError::ReservedMemberName { .. })),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_duplicate_member() {
        let result = StructBuilder::new("dup")
            .member("a", CPrimitive::Int.ty())
            .member("a", CPrimitive::Char.ty())
            .build();
        assert!(matches!(result, Err(DefinitionError::DuplicateMember { .. })));
    }

    #[test]
    fn test_union_builder() {
        let ty = UnionBuilder::new("scalar")
            .member("byte", CPrimitive::UnsignedChar.ty())
            .member("word", CPrimitive::UnsignedShort.ty())
            .endianness(Endianness::Little)
            .build()
            .expect("valid union");
        assert_eq!(ty.name, "union scalar");
        // Union size is the maximum member size.
        assert_eq!(ty.size(), 2);
    }

    #[test]
    fn test_enum_auto_increment() {
        let ty = EnumBuilder::new("color")
            .member("RED")
            .member("GREEN")
            .member_value("BLUE", 10)
            .member("CYAN")
            .build()
            .expect("valid enum");
        if let TypeKind::Enum(e) = &ty.kind {
            let values: Vec<u64> = e.members.iter().map(|m| m.value).collect();
            assert_eq!(values, [0, 1, 10, 11]);
        } else {
            panic!("expected enum");
        }
    }

    #[test]
    fn test_enum_validation() {
        assert!(matches!(
            EnumBuilder::new("e").build(),
            Err(DefinitionError::EmptyEnum)
        ));
        assert!(matches!(
            EnumBuilder::new("e").member("A").width(24).build(),
            Err(DefinitionError::UnsupportedWidth { bits: 24 })
        ));
        assert!(matches!(
            EnumBuilder::new("e")
                .member_value("A", 0)
                .member_value("B", 0)
                .build(),
            Err(DefinitionError::DuplicateEnumValue { value: 0 })
        ));
        assert!(matches!(
            EnumBuilder::new("e").member("A").member("A").build(),
            Err(DefinitionError::DuplicateEnumName { .. })
        ));
        assert!(matches!(
            EnumBuilder::new("e").member_value("A", 256).width(8).build(),
            Err(DefinitionError::EnumValueOutOfRange { .. })
        ));
    }

    #[test]
    fn test_enum_definition_text() {
        let ty = EnumBuilder::new("state")
            .member_doc("IDLE", 0, "nothing to do")
            .member_value("BUSY", 1)
            .build()
            .expect("valid enum");
        assert_eq!(
            ty.definition(),
            "enum state {\n    /* nothing to do */\n    IDLE = 0,\n    BUSY = 1\n};"
        );
    }
}
