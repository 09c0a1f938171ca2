// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Binary pack/unpack for instances.
//!
//! Encodings are tight and C-ABI-compatible: struct members and array
//! elements concatenate with no implicit padding (alignment gaps are
//! modelled explicitly with the padding type), pointers and enums use a
//! fixed-width unsigned integer codec, and the byte order is selected per
//! call. Unions are the exception: their byte order is fixed at
//! definition time and any other order is rejected.

use crate::descriptor::TypeKind;
use crate::endianness::Endianness;
use crate::error::{LayoutError, Result};
use crate::memory::{InstanceId, Memory, Payload};
use crate::value::{CPrimitive, Value};

/// Bounds-checked read cursor over the input buffer.
struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    fn read(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.offset + count > self.data.len() {
            return Err(LayoutError::BufferTooSmall {
                need: count,
                have: self.remaining(),
            });
        }
        let slice = &self.data[self.offset..self.offset + count];
        self.offset += count;
        Ok(slice)
    }
}

macro_rules! put_bytes {
    ($buf:expr, $value:expr, $endianness:expr) => {
        match $endianness {
            Endianness::Little => $buf.extend_from_slice(&$value.to_le_bytes()),
            Endianness::Big => $buf.extend_from_slice(&$value.to_be_bytes()),
        }
    };
}

macro_rules! get_bytes {
    ($cursor:expr, $ty:ty, $endianness:expr) => {{
        let mut raw = [0u8; std::mem::size_of::<$ty>()];
        raw.copy_from_slice($cursor.read(std::mem::size_of::<$ty>())?);
        match $endianness {
            Endianness::Little => <$ty>::from_le_bytes(raw),
            Endianness::Big => <$ty>::from_be_bytes(raw),
        }
    }};
}

/// Append a `bits`-wide unsigned integer (pointer/enum codec).
fn put_uint(buf: &mut Vec<u8>, value: u64, bits: u8, endianness: Endianness) {
    let width = usize::from(bits / 8);
    match endianness {
        Endianness::Little => buf.extend_from_slice(&value.to_le_bytes()[..width]),
        Endianness::Big => buf.extend_from_slice(&value.to_be_bytes()[8 - width..]),
    }
}

/// Read a `bits`-wide unsigned integer (pointer/enum codec).
fn get_uint(cursor: &mut Cursor<'_>, bits: u8, endianness: Endianness) -> Result<u64> {
    let bytes = cursor.read(usize::from(bits / 8))?;
    let mut value = 0u64;
    match endianness {
        Endianness::Little => {
            for (i, b) in bytes.iter().enumerate() {
                value |= u64::from(*b) << (8 * i);
            }
        }
        Endianness::Big => {
            for b in bytes {
                value = (value << 8) | u64::from(*b);
            }
        }
    }
    Ok(value)
}

fn encode_scalar(
    buf: &mut Vec<u8>,
    kind: CPrimitive,
    value: &Value,
    endianness: Endianness,
) -> Result<()> {
    match (kind, value) {
        (CPrimitive::Char, Value::Char(b)) => buf.push(*b),
        (CPrimitive::SignedChar, Value::I8(v)) => buf.push(*v as u8),
        (CPrimitive::UnsignedChar, Value::U8(v)) => buf.push(*v),
        (CPrimitive::Bool, Value::Bool(v)) => buf.push(u8::from(*v)),
        (CPrimitive::Short, Value::I16(v)) => put_bytes!(buf, v, endianness),
        (CPrimitive::UnsignedShort, Value::U16(v)) => put_bytes!(buf, v, endianness),
        (CPrimitive::Int | CPrimitive::Long, Value::I32(v)) => put_bytes!(buf, v, endianness),
        (CPrimitive::UnsignedInt | CPrimitive::UnsignedLong, Value::U32(v)) => {
            put_bytes!(buf, v, endianness)
        }
        (CPrimitive::LongLong, Value::I64(v)) => put_bytes!(buf, v, endianness),
        (CPrimitive::UnsignedLongLong, Value::U64(v)) => put_bytes!(buf, v, endianness),
        (CPrimitive::Float, Value::F32(v)) => put_bytes!(buf, v, endianness),
        (CPrimitive::Double, Value::F64(v)) => put_bytes!(buf, v, endianness),
        (kind, value) => {
            return Err(LayoutError::TypeMismatch {
                expected: kind.name().to_string(),
                got: format!("{:?}", value),
            })
        }
    }
    Ok(())
}

fn decode_scalar(
    cursor: &mut Cursor<'_>,
    kind: CPrimitive,
    endianness: Endianness,
) -> Result<Value> {
    Ok(match kind {
        CPrimitive::Char => Value::Char(cursor.read(1)?[0]),
        CPrimitive::SignedChar => Value::I8(cursor.read(1)?[0] as i8),
        CPrimitive::UnsignedChar => Value::U8(cursor.read(1)?[0]),
        CPrimitive::Bool => Value::Bool(cursor.read(1)?[0] != 0),
        CPrimitive::Short => Value::I16(get_bytes!(cursor, i16, endianness)),
        CPrimitive::UnsignedShort => Value::U16(get_bytes!(cursor, u16, endianness)),
        CPrimitive::Int | CPrimitive::Long => Value::I32(get_bytes!(cursor, i32, endianness)),
        CPrimitive::UnsignedInt | CPrimitive::UnsignedLong => {
            Value::U32(get_bytes!(cursor, u32, endianness))
        }
        CPrimitive::LongLong => Value::I64(get_bytes!(cursor, i64, endianness)),
        CPrimitive::UnsignedLongLong => Value::U64(get_bytes!(cursor, u64, endianness)),
        CPrimitive::Float => Value::F32(get_bytes!(cursor, f32, endianness)),
        CPrimitive::Double => Value::F64(get_bytes!(cursor, f64, endianness)),
    })
}

impl Memory {
    /// Pack the instance's value into its C-compatible byte form.
    pub fn pack(&self, id: InstanceId, endianness: Endianness) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.size(id));
        self.encode(id, endianness, &mut buf)?;
        Ok(buf)
    }

    fn encode(&self, id: InstanceId, endianness: Endianness, buf: &mut Vec<u8>) -> Result<()> {
        let node = self.node(id);
        match (&node.descriptor.kind, &node.payload) {
            (TypeKind::Primitive(p), Payload::Scalar(value)) => {
                encode_scalar(buf, *p, value, endianness)
            }
            (TypeKind::Enum(e), Payload::EnumMember(index)) => {
                put_uint(buf, e.members[*index].value, e.bits, endianness);
                Ok(())
            }
            (TypeKind::Padding(_), Payload::Bytes(bytes)) => {
                buf.extend_from_slice(bytes);
                Ok(())
            }
            (TypeKind::Struct(_), Payload::Members(members)) => {
                for &member in members {
                    self.encode(member, endianness, buf)?;
                }
                Ok(())
            }
            (TypeKind::Union(u), Payload::Members(members)) => {
                if endianness != u.endianness {
                    return Err(LayoutError::EndiannessMismatch {
                        declared: u.endianness,
                        requested: endianness,
                    });
                }
                // The first maximal member's encoding is the union's
                // authoritative byte image.
                if let Some(index) = u.composite.largest_index() {
                    self.encode(members[index], endianness, buf)?;
                }
                Ok(())
            }
            (TypeKind::Array(_), Payload::Elements(elements)) => {
                for &element in elements {
                    self.encode(element, endianness, buf)?;
                }
                Ok(())
            }
            (TypeKind::Pointer(p), Payload::Referent(referent)) => {
                let address = match referent {
                    None => 0,
                    Some(target) => self
                        .address(*target)
                        .ok_or(LayoutError::UnaddressedPointerTarget)?,
                };
                put_uint(buf, address, p.bits, endianness);
                Ok(())
            }
            (TypeKind::Typedef(_), Payload::Aliased(inner)) => {
                self.encode(*inner, endianness, buf)
            }
            _ => unreachable!("payload kind always matches descriptor kind"),
        }
    }

    /// Unpack a C-compatible byte form into this instance, mutating it.
    ///
    /// Instances referenced (but not contained) by this one are never
    /// touched, except that a pointer whose decoded address differs from
    /// its referent's gets a fresh default referent at the new address.
    pub fn unpack(&mut self, id: InstanceId, data: &[u8], endianness: Endianness) -> Result<()> {
        let mut cursor = Cursor::new(data);
        self.decode(id, &mut cursor, endianness)
    }

    fn decode(
        &mut self,
        id: InstanceId,
        cursor: &mut Cursor<'_>,
        endianness: Endianness,
    ) -> Result<()> {
        let descriptor = self.node(id).descriptor.clone();
        match &descriptor.kind {
            TypeKind::Primitive(p) => {
                let value = decode_scalar(cursor, *p, endianness)?;
                match &mut self.node_mut(id).payload {
                    Payload::Scalar(slot) => *slot = value,
                    _ => unreachable!("primitive instances hold scalars"),
                }
                self.value_changed(id)
            }
            TypeKind::Enum(e) => {
                let raw = get_uint(cursor, e.bits, endianness)?;
                let index = e
                    .index_of_value(raw)
                    .ok_or(LayoutError::UnknownEnumValue { value: raw })?;
                self.node_mut(id).payload = Payload::EnumMember(index);
                self.value_changed(id)
            }
            TypeKind::Padding(n) => {
                let bytes = cursor.read(*n)?.to_vec();
                match &mut self.node_mut(id).payload {
                    Payload::Bytes(slot) => *slot = bytes,
                    _ => unreachable!("padding instances hold bytes"),
                }
                self.value_changed(id)
            }
            TypeKind::Struct(_) | TypeKind::Array(_) => {
                // One consolidated change notification per aggregate.
                self.set_quiesced(id, true);
                let mut result = Ok(());
                for child in self.child_ids(id) {
                    result = self.decode(child, cursor, endianness);
                    if result.is_err() {
                        break;
                    }
                }
                self.set_quiesced(id, false);
                result?;
                self.value_changed(id)
            }
            TypeKind::Union(u) => {
                if endianness != u.endianness {
                    return Err(LayoutError::EndiannessMismatch {
                        declared: u.endianness,
                        requested: endianness,
                    });
                }
                let image = cursor.read(descriptor.size())?.to_vec();
                self.set_quiesced(id, true);
                let result = self.decode_members(id, &image, endianness);
                self.set_quiesced(id, false);
                result?;
                self.value_changed(id)
            }
            TypeKind::Pointer(p) => {
                let address = get_uint(cursor, p.bits, endianness)?;
                self.set_ref(id, address)
            }
            TypeKind::Typedef(_) => {
                let inner = self.resolve(id);
                self.decode(inner, cursor, endianness)
            }
        }
    }

    /// Decode the same byte image into every union member (each member
    /// reads its own prefix of the image). The caller manages the quiesce
    /// flag and the consolidated notification.
    pub(crate) fn decode_members(
        &mut self,
        union: InstanceId,
        image: &[u8],
        endianness: Endianness,
    ) -> Result<()> {
        for member in self.child_ids(union) {
            let size = self.size(member);
            let mut cursor = Cursor::new(&image[..size]);
            self.decode(member, &mut cursor, endianness)?;
        }
        Ok(())
    }
}
