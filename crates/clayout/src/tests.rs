// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Integration tests spanning the type/instance model, the codec, the
//! notification graph and the allocator.

use super::*;

#[test]
fn test_full_workflow() {
    // 1. Describe the layout at runtime.
    let color = EnumBuilder::new("color")
        .member("RED")
        .member("GREEN")
        .member("BLUE")
        .width(8)
        .build()
        .expect("enum");
    let point = StructBuilder::new("point")
        .member("x", CPrimitive::Short.ty())
        .member("y", CPrimitive::Short.ty())
        .build()
        .expect("struct");
    let shape = StructBuilder::new("shape")
        .member("kind", color)
        .member("gap", TypeDescriptor::padding(1))
        .member("origin", point)
        .member("radius", CPrimitive::UnsignedShort.ty())
        .build()
        .expect("struct");
    assert_eq!(shape.size(), 8);

    // 2. Create and populate an instance.
    let mut mem = Memory::new();
    let s = mem.instantiate(&shape).expect("instantiate");
    mem.set_enum(mem.member(s, "kind").unwrap(), "GREEN").unwrap();
    let origin = mem.member(s, "origin").unwrap();
    mem.set(mem.member(origin, "x").unwrap(), -2i16).unwrap();
    mem.set(mem.member(origin, "y").unwrap(), 3i16).unwrap();
    mem.set(mem.member(s, "radius").unwrap(), 10u16).unwrap();

    // 3. Addresses derive from the container, member by member.
    mem.set_address(s, Some(0x4000)).unwrap();
    assert_eq!(mem.address(mem.member(s, "kind").unwrap()), Some(0x4000));
    assert_eq!(mem.address(mem.member(s, "gap").unwrap()), Some(0x4001));
    assert_eq!(mem.address(origin), Some(0x4002));
    assert_eq!(mem.address(mem.member(origin, "y").unwrap()), Some(0x4004));
    assert_eq!(mem.address(mem.member(s, "radius").unwrap()), Some(0x4006));

    // 4. Exact bytes, no implicit padding.
    let packed = mem.pack(s, Endianness::Little).expect("pack");
    assert_eq!(packed, [0x01, 0x00, 0xFE, 0xFF, 0x03, 0x00, 0x0A, 0x00]);

    // 5. Unpack mutates in place.
    mem.unpack(
        s,
        &[0x02, 0xEE, 0x05, 0x00, 0xFF, 0xFF, 0x2A, 0x00],
        Endianness::Little,
    )
    .expect("unpack");
    assert_eq!(mem.enum_value(mem.member(s, "kind").unwrap()).unwrap(), "BLUE");
    assert_eq!(mem.padding_bytes(mem.member(s, "gap").unwrap()).unwrap(), &[0xEE]);
    assert_eq!(mem.get::<i16>(mem.member(origin, "x").unwrap()).unwrap(), 5);
    assert_eq!(mem.get::<i16>(mem.member(origin, "y").unwrap()).unwrap(), -1);
    assert_eq!(mem.get::<u16>(mem.member(s, "radius").unwrap()).unwrap(), 42);
}

#[test]
fn test_union_members_alias_the_same_bytes() {
    let ty = UnionBuilder::new("scalar")
        .member("a", CPrimitive::UnsignedChar.ty())
        .member("b", CPrimitive::UnsignedShort.ty())
        .endianness(Endianness::Little)
        .build()
        .expect("union");

    let mut mem = Memory::new();
    let u = mem.instantiate(&ty).expect("instantiate");

    let a = mem.member(u, "a").unwrap();
    let b = mem.member(u, "b").unwrap();

    mem.set(a, 0xAAu8).unwrap();
    assert_eq!(mem.get::<u16>(b).unwrap(), 0x00AA);

    mem.set(b, 0xBBCCu16).unwrap();
    assert_eq!(mem.get::<u8>(a).unwrap(), 0xCC);

    // Re-encoding any member yields the same byte prefix as the union.
    assert_eq!(mem.pack(u, Endianness::Little).unwrap(), [0xCC, 0xBB]);
    assert_eq!(mem.pack(a, Endianness::Little).unwrap(), [0xCC]);

    // All members live at the union's own address.
    mem.set_address(u, Some(0x800)).unwrap();
    assert_eq!(mem.address(a), Some(0x800));
    assert_eq!(mem.address(b), Some(0x800));

    // A member address inconsistent with the union is reverted.
    let err = mem.set_address(a, Some(0x801)).unwrap_err();
    assert!(matches!(err, LayoutError::AddressInconsistent { .. }));
    assert_eq!(mem.address(a), Some(0x800));
}

#[test]
fn test_union_initializer_is_authoritative() {
    let ty = UnionBuilder::new("scalar")
        .member("a", CPrimitive::UnsignedChar.ty())
        .member("b", CPrimitive::UnsignedShort.ty())
        .build()
        .expect("union");

    let mut mem = Memory::new();
    let b0 = mem
        .new_value(&CPrimitive::UnsignedShort.ty(), 0x1234u16)
        .unwrap();
    let u = mem
        .instantiate_with(&ty, Initializers::new().member("b", b0))
        .expect("instantiate");
    assert_eq!(mem.get::<u8>(mem.member(u, "a").unwrap()).unwrap(), 0x34);
}

#[test]
fn test_union_inside_struct_stays_consistent() {
    let word = UnionBuilder::new("word")
        .member("lo", CPrimitive::UnsignedChar.ty())
        .member("all", CPrimitive::UnsignedShort.ty())
        .build()
        .expect("union");
    let frame = StructBuilder::new("frame")
        .member("head", CPrimitive::UnsignedChar.ty())
        .member("body", word)
        .build()
        .expect("struct");

    let mut mem = Memory::new();
    let f = mem.instantiate(&frame).expect("instantiate");
    let body = mem.member(f, "body").unwrap();
    mem.set(mem.member(f, "head").unwrap(), 0x7Fu8).unwrap();
    mem.set(mem.member(body, "all").unwrap(), 0xBEEFu16).unwrap();

    assert_eq!(
        mem.pack(f, Endianness::Little).unwrap(),
        [0x7F, 0xEF, 0xBE]
    );

    // The union overlays at its own offset inside the struct.
    mem.set_address(f, Some(0x10)).unwrap();
    assert_eq!(mem.address(body), Some(0x11));
    assert_eq!(mem.address(mem.member(body, "lo").unwrap()), Some(0x11));
}

#[test]
fn test_union_fixup_propagates_decode_failure() {
    // An enum member with value gaps can receive an undefined pattern
    // while the union re-aligns its members; the failure is reported.
    let tag = EnumBuilder::new("tag").member_value("ONLY", 5).width(8).build().unwrap();
    let ty = UnionBuilder::new("tricky")
        .member("t", tag)
        .member("raw", CPrimitive::UnsignedChar.ty())
        .build()
        .unwrap();

    let mut mem = Memory::new();
    let u = mem.instantiate(&ty).expect("default cycle decodes 5");
    let raw = mem.member(u, "raw").unwrap();
    assert_eq!(mem.get::<u8>(raw).unwrap(), 5);

    let err = mem.set(raw, 0u8).unwrap_err();
    assert!(matches!(err, LayoutError::UnknownEnumValue { value: 0 }));
}

#[test]
fn test_typedef_member_is_transparent() {
    let byte_t = TypeDescriptor::typedef("byte_t", CPrimitive::UnsignedChar.ty());
    let wrapper = StructBuilder::new("wrapper")
        .member("first", byte_t.clone())
        .member("second", CPrimitive::UnsignedChar.ty())
        .build()
        .expect("struct");

    let mut mem = Memory::new();
    let w = mem.instantiate(&wrapper).expect("instantiate");
    let first = mem.member(w, "first").unwrap();

    // Value operations forward through the alias; the binary form and
    // the addressing treat it exactly like the aliased type.
    mem.set(first, 0xA5u8).unwrap();
    assert_eq!(mem.pack(w, Endianness::Little).unwrap(), [0xA5, 0x00]);
    mem.set_address(w, Some(0x100)).unwrap();
    assert_eq!(mem.address(first), Some(0x100));

    // Traversal yields the typedef'd member, never the hidden instance.
    let members = mem.members(w).unwrap();
    assert_eq!(members[0], first);
    assert_eq!(mem.data_type(first).name, "byte_t");
}

#[test]
fn test_iter_types_shared_subtype_listed_once() {
    let point = StructBuilder::new("point")
        .member("x", CPrimitive::Short.ty())
        .member("y", CPrimitive::Short.ty())
        .build()
        .expect("struct");
    let rect = StructBuilder::new("rect")
        .member("top_left", point.clone())
        .member("bottom_right", point)
        .build()
        .expect("struct");

    let names: Vec<String> = rect.iter_types().map(|t| t.name.clone()).collect();
    assert_eq!(names, ["short", "struct point", "struct rect"]);
}

#[test]
fn test_collaborator_surface() {
    let point = StructBuilder::new("point")
        .doc("A 2-D point.")
        .member_doc("x", CPrimitive::Short.ty(), "abscissa")
        .member("y", CPrimitive::Short.ty())
        .build()
        .expect("struct");

    assert!(!point.native);
    assert_eq!(point.prototype(), "struct point;");
    assert_eq!(
        point.definition(),
        "/* A 2-D point. */\nstruct point {\n    /* abscissa */\n    short x;\n    short y;\n};"
    );
    // Native leaves have nothing to declare.
    let leaf = point.iter_types().next().unwrap();
    assert!(leaf.native);
    assert_eq!(leaf.prototype(), "");
    assert_eq!(leaf.definition(), "");
}

#[test]
fn test_allocate_then_pack_linked_structure() {
    let item = StructBuilder::new("item")
        .member("payload", CPrimitive::UnsignedInt.ty())
        .member("tail", TypeDescriptor::pointer(CPrimitive::Char.ty(), 16).unwrap())
        .build()
        .expect("struct");

    let mut mem = Memory::new();
    let c = mem.new_value(&CPrimitive::Char.ty(), b'!').unwrap();
    let s = mem.instantiate(&item).expect("instantiate");
    mem.set(mem.member(s, "payload").unwrap(), 0xCAFEBABEu32).unwrap();
    mem.set_deref(mem.member(s, "tail").unwrap(), Some(c)).unwrap();

    // Packing before allocation fails: the referent has no address.
    assert!(matches!(
        mem.pack(s, Endianness::Little).unwrap_err(),
        LayoutError::UnaddressedPointerTarget
    ));

    let end = mem.allocate(s, 0x2000).unwrap();
    assert_eq!(end, 0x2007);
    assert_eq!(mem.total_size(s), 7);
    assert_eq!(mem.address(c), Some(0x2006));

    assert_eq!(
        mem.pack(s, Endianness::Little).unwrap(),
        [0xBE, 0xBA, 0xFE, 0xCA, 0x06, 0x20]
    );
}

#[test]
fn test_primitive_round_trip_random_values() {
    let mut mem = Memory::new();
    for _ in 0..64 {
        let raw = fastrand::u64(..);
        for kind in [
            CPrimitive::SignedChar,
            CPrimitive::UnsignedChar,
            CPrimitive::Short,
            CPrimitive::UnsignedShort,
            CPrimitive::Int,
            CPrimitive::UnsignedInt,
            CPrimitive::LongLong,
            CPrimitive::UnsignedLongLong,
        ] {
            let v = mem.new_value(&kind.ty(), raw).unwrap();
            let before = mem.value(v).unwrap();
            for endianness in [Endianness::Little, Endianness::Big] {
                let packed = mem.pack(v, endianness).unwrap();
                assert_eq!(packed.len(), kind.size());
                mem.unpack(v, &packed, endianness).unwrap();
                assert_eq!(mem.value(v).unwrap(), before);
            }
        }
    }
}
