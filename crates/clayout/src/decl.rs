// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! C source text for the type graph: declarations, prototypes and
//! definitions.
//!
//! This is the surface consumed by header-file generators; comment
//! line-wrapping and file assembly are their job, not ours — docs are
//! emitted as single-line comments.

use crate::descriptor::{CompositeDescriptor, EnumMember, MemberDescriptor, TypeDescriptor, TypeKind};

impl TypeDescriptor {
    /// C declaration of a variable of this type with the given identifier
    /// (no terminating semicolon), e.g. `int x`, `char buf[4]`, `char* p`.
    pub fn declare(&self, identifier: &str) -> String {
        match &self.kind {
            TypeKind::Array(a) => {
                format!("{}[{}]", a.element_type.declare(identifier), a.length)
            }
            TypeKind::Padding(n) => {
                if identifier.is_empty() {
                    format!("char[{}]", n)
                } else {
                    format!("char {}[{}]", identifier, n)
                }
            }
            _ => format!("{} {}", self.name, identifier).trim_end().to_string(),
        }
    }

    /// C forward declaration; empty for native and anonymous types.
    pub fn prototype(&self) -> String {
        let tag = match &self.kind {
            TypeKind::Struct(c) => c.tag.as_deref().map(|t| ("struct", t)),
            TypeKind::Union(u) => u.composite.tag.as_deref().map(|t| ("union", t)),
            TypeKind::Enum(e) => e.tag.as_deref().map(|t| ("enum", t)),
            _ => None,
        };
        match tag {
            Some((keyword, tag)) => format!("{} {};", keyword, tag),
            None => String::new(),
        }
    }

    /// Full C definition; empty for native and anonymous types
    /// (anonymous types carry their definition text as their *name*).
    pub fn definition(&self) -> String {
        match &self.kind {
            TypeKind::Struct(c) if c.tag.is_some() => {
                with_doc(&self.doc, &composite_definition("struct", c))
            }
            TypeKind::Union(u) if u.composite.tag.is_some() => {
                with_doc(&self.doc, &composite_definition("union", &u.composite))
            }
            TypeKind::Enum(e) if e.tag.is_some() => {
                with_doc(&self.doc, &enum_definition(e.tag.as_deref(), &e.members))
            }
            TypeKind::Typedef(t) => format!("typedef {};", t.base_type.declare(&self.name)),
            _ => String::new(),
        }
    }
}

fn with_doc(doc: &str, definition: &str) -> String {
    if doc.is_empty() {
        definition.to_string()
    } else {
        format!("{}\n{}", comment(doc), definition)
    }
}

/// The full definition text of a composite, even if anonymous.
pub(crate) fn composite_definition(keyword: &str, composite: &CompositeDescriptor) -> String {
    let declarations: Vec<String> = composite
        .members
        .iter()
        .map(member_declaration)
        .collect();
    format!(
        "{} {}{{\n{}\n}};",
        keyword,
        composite
            .tag
            .as_deref()
            .map(|t| format!("{} ", t))
            .unwrap_or_default(),
        indent(&declarations.join("\n"))
    )
}

fn member_declaration(member: &MemberDescriptor) -> String {
    let declaration = format!("{};", member.data_type.declare(&member.name));
    if member.doc.is_empty() {
        declaration
    } else {
        format!("{}\n{}", comment(&member.doc), declaration)
    }
}

/// The full definition text of an enum, even if anonymous.
pub(crate) fn enum_definition(tag: Option<&str>, members: &[EnumMember]) -> String {
    let entries: Vec<String> = members
        .iter()
        .map(|m| {
            let entry = format!("{} = {}", m.name, m.value);
            if m.doc.is_empty() {
                entry
            } else {
                format!("{}\n{}", comment(&m.doc), entry)
            }
        })
        .collect();
    format!(
        "enum {}{{\n{}\n}};",
        tag.map(|t| format!("{} ", t)).unwrap_or_default(),
        indent(&entries.join(",\n"))
    )
}

/// Indent every non-empty line by four spaces.
pub(crate) fn indent(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("    {}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// A one-line C comment.
pub(crate) fn comment(doc: &str) -> String {
    format!("/* {} */", doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::CPrimitive;

    #[test]
    fn test_declare_simple() {
        assert_eq!(CPrimitive::Int.ty().declare("x"), "int x");
        assert_eq!(CPrimitive::Int.ty().declare(""), "int");
    }

    #[test]
    fn test_declare_pointer() {
        let p = TypeDescriptor::pointer(CPrimitive::Char.ty(), 32).unwrap();
        assert_eq!(p.declare(""), "char*");
        assert_eq!(p.declare("magic"), "char* magic");
    }

    #[test]
    fn test_declare_array_and_padding() {
        let a = TypeDescriptor::array(CPrimitive::Char.ty(), 4);
        assert_eq!(a.declare("buf"), "char buf[4]");
        let pad = TypeDescriptor::padding(3);
        assert_eq!(pad.declare(""), "char[3]");
        assert_eq!(pad.declare("gap"), "char gap[3]");
    }

    #[test]
    fn test_typedef_definition() {
        let alias = TypeDescriptor::typedef("byte_t", CPrimitive::UnsignedChar.ty());
        assert_eq!(alias.definition(), "typedef unsigned char byte_t;");
        assert_eq!(alias.prototype(), "");
    }

    #[test]
    fn test_indent_skips_empty_lines() {
        assert_eq!(indent("a\n\nb"), "    a\n\n    b");
    }
}
