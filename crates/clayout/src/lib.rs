// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # clayout - declarative C memory-layout modeling
//!
//! Describe C-compatible memory layouts (primitives, structs, unions,
//! arrays, pointers, enums, typedefs, explicit padding) at runtime, create
//! live *instances* of them, lay those instances out in a simulated
//! address space, and convert them to/from their exact binary (C ABI)
//! representation — no hand-written byte-packing code.
//!
//! ## Quick Start
//!
//! ```rust
//! use clayout::{CPrimitive, Endianness, Memory, StructBuilder};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Describe a layout.
//!     let point = StructBuilder::new("point")
//!         .member("x", CPrimitive::UnsignedShort.ty())
//!         .member("y", CPrimitive::UnsignedShort.ty())
//!         .build()?;
//!
//!     // Create and mutate a live instance.
//!     let mut mem = Memory::new();
//!     let p = mem.instantiate(&point)?;
//!     mem.set(mem.member(p, "x")?, 0x1234u16)?;
//!     mem.set(mem.member(p, "y")?, 0x5678u16)?;
//!
//!     // Exact binary representation, selectable byte order.
//!     assert_eq!(mem.pack(p, Endianness::Little)?, b"\x34\x12\x78\x56");
//!     assert_eq!(mem.pack(p, Endianness::Big)?, b"\x12\x34\x56\x78");
//!     Ok(())
//! }
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`TypeDescriptor`] | Immutable layout descriptor; factory for instances |
//! | [`Memory`] | Arena holding the live instance graph |
//! | [`InstanceId`] | Opaque handle to an instance in a `Memory` |
//! | [`StructBuilder`] / [`UnionBuilder`] / [`EnumBuilder`] | Validated schema definition |
//! | [`Endianness`] | Byte order threaded through every pack/unpack |
//!
//! ## Consistency model
//!
//! The instance graph maintains three invariants through a synchronous
//! notification protocol, with no eventual-consistency window:
//!
//! - a contained instance's address always derives from its container
//!   (struct offset, union overlay, array stride) — inconsistent writes
//!   are reverted and reported;
//! - a pointer's encoded value always derives from its referent's
//!   address (0 for NULL; packing an unaddressed referent fails);
//! - union members always alias the same bytes: writing one member is
//!   immediately reflected in all of them.
//!
//! [`Memory::allocate`] walks containment and pointer references from a
//! root instance and assigns every reachable top-level instance a
//! non-overlapping address.

mod access;
mod builder;
mod codec;
mod decl;
mod descriptor;
mod endianness;
mod error;
mod graph;
mod memory;
mod value;

pub use builder::{EnumBuilder, StructBuilder, UnionBuilder};
pub use descriptor::{
    ArrayDescriptor, CompositeDescriptor, EnumDescriptor, EnumMember, MemberDescriptor,
    PointerDescriptor, TypeDescriptor, TypeKind, TypedefDescriptor, UnionDescriptor,
};
pub use endianness::Endianness;
pub use error::{DefinitionError, LayoutError, Result};
pub use memory::{Initializers, InstanceId, Memory};
pub use value::{char_literal, CPrimitive, FromValue, IntoValue, Value};

#[cfg(test)]
mod tests;
