use btf_types::{size, CodecOptions, Tag};

use crate::error::WireError;
use crate::marker;

/// Total header length implied by a first byte, including the byte
/// itself (and the ext type byte where one follows).
///
/// Every opcode has a well-defined length, the reserved byte included,
/// so streaming callers can ensure the full header before calling
/// [`parse_tag`], which is where validity is judged.
#[must_use]
pub fn header_size(first: u8) -> usize {
    match first {
        marker::U8 | marker::I8 | marker::STR8 | marker::BIN8 => size::INT8,
        marker::U16 | marker::I16 | marker::STR16 | marker::BIN16 | marker::ARRAY16
        | marker::MAP16 => size::INT16,
        marker::U32 | marker::I32 | marker::F32 | marker::STR32 | marker::BIN32
        | marker::ARRAY32 | marker::MAP32 => size::INT32,
        marker::U64 | marker::I64 | marker::F64 => size::INT64,
        marker::FIXEXT1..=marker::FIXEXT16 => size::FIXEXT,
        marker::EXT8 => size::EXT8,
        marker::EXT16 => size::EXT16,
        marker::EXT32 => size::EXT32,
        _ => size::FIX,
    }
}

/// Parse one tag from the front of `buf`.
///
/// # Returns
///
/// The tag and the number of header bytes consumed. Payload bytes of
/// str/bin/ext values are not touched; they follow the header on the
/// wire and are the caller's to read or skip.
///
/// # Errors
///
/// - [`WireError::Truncated`] if `buf` ends mid-header; `needed` is the
///   total header length so a streaming caller can refill and retry.
/// - [`WireError::Reserved`] for the 0xc1 opcode.
/// - [`WireError::ExtDisabled`] for any ext opcode while extensions are
///   disabled.
pub fn parse_tag(buf: &[u8], opts: CodecOptions) -> Result<(Tag, usize), WireError> {
    let first = *buf.first().ok_or(WireError::Truncated { needed: 1, have: 0 })?;

    match first {
        // Four opcode ranges embed the value in the first byte.
        0x00..=0x7f => Ok((Tag::Uint(u64::from(first)), 1)),
        0x80..=0x8f => Ok((Tag::Map(u32::from(first & 0x0f)), 1)),
        0x90..=0x9f => Ok((Tag::Array(u32::from(first & 0x0f)), 1)),
        0xa0..=0xbf => Ok((Tag::Str(u32::from(first & 0x1f)), 1)),
        #[allow(clippy::cast_possible_wrap)]
        0xe0..=0xff => Ok((Tag::Int(i64::from(first as i8)), 1)),

        marker::NIL => Ok((Tag::Nil, 1)),
        marker::RESERVED => Err(WireError::Reserved),
        marker::FALSE => Ok((Tag::Bool(false), 1)),
        marker::TRUE => Ok((Tag::Bool(true), 1)),

        marker::U8 => Ok((Tag::Uint(u64::from(be_u8(buf)?)), size::INT8)),
        marker::U16 => Ok((Tag::Uint(u64::from(be_u16(buf)?)), size::INT16)),
        marker::U32 => Ok((Tag::Uint(u64::from(be_u32(buf)?)), size::INT32)),
        marker::U64 => Ok((Tag::Uint(be_u64(buf)?), size::INT64)),

        #[allow(clippy::cast_possible_wrap)]
        marker::I8 => Ok((Tag::Int(i64::from(be_u8(buf)? as i8)), size::INT8)),
        #[allow(clippy::cast_possible_wrap)]
        marker::I16 => Ok((Tag::Int(i64::from(be_u16(buf)? as i16)), size::INT16)),
        #[allow(clippy::cast_possible_wrap)]
        marker::I32 => Ok((Tag::Int(i64::from(be_u32(buf)? as i32)), size::INT32)),
        #[allow(clippy::cast_possible_wrap)]
        marker::I64 => Ok((Tag::Int(be_u64(buf)? as i64), size::INT64)),

        marker::F32 => Ok((Tag::F32(f32::from_bits(be_u32(buf)?)), size::INT32)),
        marker::F64 => Ok((Tag::F64(f64::from_bits(be_u64(buf)?)), size::INT64)),

        marker::STR8 => Ok((Tag::Str(u32::from(be_u8(buf)?)), size::LEN8)),
        marker::STR16 => Ok((Tag::Str(u32::from(be_u16(buf)?)), size::LEN16)),
        marker::STR32 => Ok((Tag::Str(be_u32(buf)?), size::LEN32)),

        marker::BIN8 => Ok((Tag::Bin(u32::from(be_u8(buf)?)), size::LEN8)),
        marker::BIN16 => Ok((Tag::Bin(u32::from(be_u16(buf)?)), size::LEN16)),
        marker::BIN32 => Ok((Tag::Bin(be_u32(buf)?), size::LEN32)),

        marker::ARRAY16 => Ok((Tag::Array(u32::from(be_u16(buf)?)), size::INT16)),
        marker::ARRAY32 => Ok((Tag::Array(be_u32(buf)?), size::INT32)),
        marker::MAP16 => Ok((Tag::Map(u32::from(be_u16(buf)?)), size::INT16)),
        marker::MAP32 => Ok((Tag::Map(be_u32(buf)?), size::INT32)),

        marker::FIXEXT1..=marker::FIXEXT16 => {
            if !opts.extensions {
                return Err(WireError::ExtDisabled);
            }
            let len = 1_u32 << (first - marker::FIXEXT1);
            let ext_type = ext_type_at(buf, 1)?;
            Ok((Tag::Ext { ext_type, len }, size::FIXEXT))
        }
        marker::EXT8 => {
            if !opts.extensions {
                return Err(WireError::ExtDisabled);
            }
            let len = u32::from(be_u8(buf)?);
            let ext_type = ext_type_at(buf, 2)?;
            Ok((Tag::Ext { ext_type, len }, size::EXT8))
        }
        marker::EXT16 => {
            if !opts.extensions {
                return Err(WireError::ExtDisabled);
            }
            let len = u32::from(be_u16(buf)?);
            let ext_type = ext_type_at(buf, 3)?;
            Ok((Tag::Ext { ext_type, len }, size::EXT16))
        }
        marker::EXT32 => {
            if !opts.extensions {
                return Err(WireError::ExtDisabled);
            }
            let len = be_u32(buf)?;
            let ext_type = ext_type_at(buf, 5)?;
            Ok((Tag::Ext { ext_type, len }, size::EXT32))
        }
    }
}

fn need(buf: &[u8], needed: usize) -> Result<(), WireError> {
    if buf.len() < needed {
        Err(WireError::Truncated { needed, have: buf.len() })
    } else {
        Ok(())
    }
}

fn be_u8(buf: &[u8]) -> Result<u8, WireError> {
    need(buf, 2)?;
    Ok(buf[1])
}

fn be_u16(buf: &[u8]) -> Result<u16, WireError> {
    need(buf, 3)?;
    Ok(u16::from_be_bytes([buf[1], buf[2]]))
}

fn be_u32(buf: &[u8]) -> Result<u32, WireError> {
    need(buf, 5)?;
    Ok(u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]))
}

fn be_u64(buf: &[u8]) -> Result<u64, WireError> {
    need(buf, 9)?;
    Ok(u64::from_be_bytes([
        buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7], buf[8],
    ]))
}

#[allow(clippy::cast_possible_wrap)]
fn ext_type_at(buf: &[u8], offset: usize) -> Result<i8, WireError> {
    need(buf, offset + 1)?;
    Ok(buf[offset] as i8)
}
