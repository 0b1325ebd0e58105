use btf_types::{size, CodecOptions, Spec, Tag};

use crate::error::WireError;
use crate::marker;

/// Encode one tag into the front of `buf`, choosing the smallest wire
/// form that represents the value.
///
/// `buf` must hold at least [`size::MAX_TAG`] bytes; a fixed
/// `[u8; size::MAX_TAG]` on the stack is the intended call pattern.
///
/// # Returns
///
/// The number of header bytes written (1–9).
///
/// # Errors
///
/// - [`WireError::ExtDisabled`] for an ext tag while extensions are off.
/// - [`WireError::ExtAtV4`] for an ext tag at spec level v4.
///
/// # Panics
///
/// Panics if `buf` is shorter than the encoding; [`size::MAX_TAG`] bytes
/// are always sufficient.
///
/// # Wire form selection
///
/// | Value | Form |
/// |---|---|
/// | int in [-32, 127] | one-byte fixint |
/// | non-negative int, any uint | smallest of u8/u16/u32/u64 |
/// | negative int | smallest of i8/i16/i32/i64 |
/// | array/map count ≤ 15 | fixarray/fixmap |
/// | count ≤ 65535 | 16-bit form, else 32-bit |
/// | str len ≤ 31 | fixstr; ≤ 255 str8 (v5 only); ≤ 65535 str16; else str32 |
/// | bin | bin8/16/32 at v5; the str (raw) forms at v4 |
/// | ext len 1/2/4/8/16 | fixext, else smallest of ext8/16/32 |
pub fn encode_tag(tag: &Tag, opts: CodecOptions, buf: &mut [u8]) -> Result<usize, WireError> {
    match *tag {
        Tag::Nil => Ok(put1(buf, marker::NIL)),
        Tag::Bool(false) => Ok(put1(buf, marker::FALSE)),
        Tag::Bool(true) => Ok(put1(buf, marker::TRUE)),
        Tag::Uint(value) => Ok(encode_uint(value, buf)),
        Tag::Int(value) => Ok(encode_int(value, buf)),
        Tag::F32(value) => {
            buf[0] = marker::F32;
            buf[1..size::INT32].copy_from_slice(&value.to_bits().to_be_bytes());
            Ok(size::INT32)
        }
        Tag::F64(value) => {
            buf[0] = marker::F64;
            buf[1..size::INT64].copy_from_slice(&value.to_bits().to_be_bytes());
            Ok(size::INT64)
        }
        Tag::Str(len) => Ok(encode_str(len, opts.spec, buf)),
        Tag::Bin(len) => match opts.spec {
            // v4 has no bin family; degrade to the raw (str) headers.
            Spec::V4 => Ok(encode_str(len, Spec::V4, buf)),
            Spec::V5 => Ok(encode_len(len, marker::BIN8, marker::BIN16, marker::BIN32, buf)),
        },
        Tag::Array(count) => {
            if count <= marker::FIX_COUNT_MAX {
                #[allow(clippy::cast_possible_truncation)]
                Ok(put1(buf, marker::FIXARRAY | count as u8))
            } else {
                Ok(encode_len16_32(count, marker::ARRAY16, marker::ARRAY32, buf))
            }
        }
        Tag::Map(count) => {
            if count <= marker::FIX_COUNT_MAX {
                #[allow(clippy::cast_possible_truncation)]
                Ok(put1(buf, marker::FIXMAP | count as u8))
            } else {
                Ok(encode_len16_32(count, marker::MAP16, marker::MAP32, buf))
            }
        }
        Tag::Ext { ext_type, len } => {
            if !opts.extensions {
                return Err(WireError::ExtDisabled);
            }
            if opts.spec == Spec::V4 {
                return Err(WireError::ExtAtV4);
            }
            Ok(encode_ext(ext_type, len, buf))
        }
    }
}

fn put1(buf: &mut [u8], byte: u8) -> usize {
    buf[0] = byte;
    1
}

#[allow(clippy::cast_possible_truncation)]
fn encode_uint(value: u64, buf: &mut [u8]) -> usize {
    if value <= u64::from(marker::POS_FIXINT_MAX) {
        put1(buf, value as u8)
    } else if value <= u64::from(u8::MAX) {
        buf[0] = marker::U8;
        buf[1] = value as u8;
        size::INT8
    } else if value <= u64::from(u16::MAX) {
        buf[0] = marker::U16;
        buf[1..size::INT16].copy_from_slice(&(value as u16).to_be_bytes());
        size::INT16
    } else if value <= u64::from(u32::MAX) {
        buf[0] = marker::U32;
        buf[1..size::INT32].copy_from_slice(&(value as u32).to_be_bytes());
        size::INT32
    } else {
        buf[0] = marker::U64;
        buf[1..size::INT64].copy_from_slice(&value.to_be_bytes());
        size::INT64
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn encode_int(value: i64, buf: &mut [u8]) -> usize {
    if value >= 0 {
        // Non-negative integers always take the unsigned forms.
        return encode_uint(value as u64, buf);
    }
    if value >= -32 {
        put1(buf, value as i8 as u8)
    } else if value >= i64::from(i8::MIN) {
        buf[0] = marker::I8;
        buf[1] = value as i8 as u8;
        size::INT8
    } else if value >= i64::from(i16::MIN) {
        buf[0] = marker::I16;
        buf[1..size::INT16].copy_from_slice(&(value as i16).to_be_bytes());
        size::INT16
    } else if value >= i64::from(i32::MIN) {
        buf[0] = marker::I32;
        buf[1..size::INT32].copy_from_slice(&(value as i32).to_be_bytes());
        size::INT32
    } else {
        buf[0] = marker::I64;
        buf[1..size::INT64].copy_from_slice(&value.to_be_bytes());
        size::INT64
    }
}

#[allow(clippy::cast_possible_truncation)]
fn encode_str(len: u32, spec: Spec, buf: &mut [u8]) -> usize {
    if len <= marker::FIXSTR_LEN_MAX {
        put1(buf, marker::FIXSTR | len as u8)
    } else if spec == Spec::V5 && len <= u32::from(u8::MAX) {
        // str8 exists only at v5; v4 jumps straight to str16.
        buf[0] = marker::STR8;
        buf[1] = len as u8;
        size::LEN8
    } else {
        encode_len16_32(len, marker::STR16, marker::STR32, buf)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn encode_len(len: u32, m8: u8, m16: u8, m32: u8, buf: &mut [u8]) -> usize {
    if len <= u32::from(u8::MAX) {
        buf[0] = m8;
        buf[1] = len as u8;
        size::LEN8
    } else {
        encode_len16_32(len, m16, m32, buf)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn encode_len16_32(len: u32, m16: u8, m32: u8, buf: &mut [u8]) -> usize {
    if len <= u32::from(u16::MAX) {
        buf[0] = m16;
        buf[1..size::LEN16].copy_from_slice(&(len as u16).to_be_bytes());
        size::LEN16
    } else {
        buf[0] = m32;
        buf[1..size::LEN32].copy_from_slice(&len.to_be_bytes());
        size::LEN32
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn encode_ext(ext_type: i8, len: u32, buf: &mut [u8]) -> usize {
    let fixext = match len {
        1 => Some(marker::FIXEXT1),
        2 => Some(marker::FIXEXT2),
        4 => Some(marker::FIXEXT4),
        8 => Some(marker::FIXEXT8),
        16 => Some(marker::FIXEXT16),
        _ => None,
    };
    if let Some(m) = fixext {
        buf[0] = m;
        buf[1] = ext_type as u8;
        return size::FIXEXT;
    }
    if len <= u32::from(u8::MAX) {
        buf[0] = marker::EXT8;
        buf[1] = len as u8;
        buf[2] = ext_type as u8;
        size::EXT8
    } else if len <= u32::from(u16::MAX) {
        buf[0] = marker::EXT16;
        buf[1..3].copy_from_slice(&(len as u16).to_be_bytes());
        buf[3] = ext_type as u8;
        size::EXT16
    } else {
        buf[0] = marker::EXT32;
        buf[1..5].copy_from_slice(&len.to_be_bytes());
        buf[5] = ext_type as u8;
        size::EXT32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btf_types::size;

    fn encode(tag: Tag) -> Vec<u8> {
        encode_with(tag, CodecOptions::new())
    }

    fn encode_with(tag: Tag, opts: CodecOptions) -> Vec<u8> {
        let mut buf = [0u8; size::MAX_TAG];
        let n = encode_tag(&tag, opts, &mut buf).unwrap();
        buf[..n].to_vec()
    }

    #[test]
    fn nil_and_bool() {
        assert_eq!(encode(Tag::Nil), vec![0xc0]);
        assert_eq!(encode(Tag::Bool(false)), vec![0xc2]);
        assert_eq!(encode(Tag::Bool(true)), vec![0xc3]);
    }

    #[test]
    fn uint_minimal_forms() {
        assert_eq!(encode(Tag::Uint(0)), vec![0x00]);
        assert_eq!(encode(Tag::Uint(1)), vec![0x01]);
        assert_eq!(encode(Tag::Uint(127)), vec![0x7f]);
        assert_eq!(encode(Tag::Uint(128)), vec![0xcc, 0x80]);
        assert_eq!(encode(Tag::Uint(200)), vec![0xcc, 0xc8]);
        assert_eq!(encode(Tag::Uint(255)), vec![0xcc, 0xff]);
        assert_eq!(encode(Tag::Uint(256)), vec![0xcd, 0x01, 0x00]);
        assert_eq!(encode(Tag::Uint(65535)), vec![0xcd, 0xff, 0xff]);
        assert_eq!(encode(Tag::Uint(65536)), vec![0xce, 0x00, 0x01, 0x00, 0x00]);
        assert_eq!(encode(Tag::Uint(70000)), vec![0xce, 0x00, 0x01, 0x11, 0x70]);
        assert_eq!(
            encode(Tag::Uint(u64::from(u32::MAX) + 1)),
            vec![0xcf, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn int_minimal_forms() {
        // Non-negative ints take the unsigned forms.
        assert_eq!(encode(Tag::Int(0)), vec![0x00]);
        assert_eq!(encode(Tag::Int(127)), vec![0x7f]);
        assert_eq!(encode(Tag::Int(128)), vec![0xcc, 0x80]);

        assert_eq!(encode(Tag::Int(-1)), vec![0xff]);
        assert_eq!(encode(Tag::Int(-32)), vec![0xe0]);
        assert_eq!(encode(Tag::Int(-33)), vec![0xd0, 0xdf]);
        assert_eq!(encode(Tag::Int(-128)), vec![0xd0, 0x80]);
        assert_eq!(encode(Tag::Int(-129)), vec![0xd1, 0xff, 0x7f]);
        assert_eq!(encode(Tag::Int(-32768)), vec![0xd1, 0x80, 0x00]);
        assert_eq!(
            encode(Tag::Int(-32769)),
            vec![0xd2, 0xff, 0xff, 0x7f, 0xff]
        );
        assert_eq!(
            encode(Tag::Int(i64::from(i32::MIN))),
            vec![0xd2, 0x80, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            encode(Tag::Int(i64::from(i32::MIN) - 1)),
            vec![0xd3, 0xff, 0xff, 0xff, 0xff, 0x7f, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn minimal_byte_count_property() {
        // Emitted size is 1 in [-32, 127], else the smallest covering width.
        let cases: &[(i64, usize)] = &[
            (-32, 1),
            (127, 1),
            (-33, 2),
            (128, 2),
            (255, 2),
            (-128, 2),
            (256, 3),
            (-129, 3),
            (65535, 3),
            (-32768, 3),
            (65536, 5),
            (-32769, 5),
            (4_294_967_295, 5),
            (-2_147_483_648, 5),
            (4_294_967_296, 9),
            (-2_147_483_649, 9),
            (i64::MAX, 9),
            (i64::MIN, 9),
        ];
        for &(value, expected) in cases {
            assert_eq!(
                encode(Tag::Int(value)).len(),
                expected,
                "wrong width for {value}"
            );
        }
    }

    #[test]
    fn floats_are_big_endian() {
        assert_eq!(
            encode(Tag::F64(1.5)),
            vec![0xcb, 0x3f, 0xf8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(encode(Tag::F32(1.0)), vec![0xca, 0x3f, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn str_thresholds() {
        assert_eq!(encode(Tag::Str(0)), vec![0xa0]);
        assert_eq!(encode(Tag::Str(5)), vec![0xa5]);
        assert_eq!(encode(Tag::Str(31)), vec![0xbf]);
        assert_eq!(encode(Tag::Str(32)), vec![0xd9, 0x20]);
        assert_eq!(encode(Tag::Str(255)), vec![0xd9, 0xff]);
        assert_eq!(encode(Tag::Str(256)), vec![0xda, 0x01, 0x00]);
        assert_eq!(encode(Tag::Str(65536)), vec![0xdb, 0x00, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn v4_has_no_str8() {
        let v4 = CodecOptions::new().spec(Spec::V4);
        // Fixstr still applies below 32 bytes.
        assert_eq!(encode_with(Tag::Str(31), v4), vec![0xbf]);
        // A 40-byte string must use str16, not str8.
        assert_eq!(encode_with(Tag::Str(40), v4), vec![0xda, 0x00, 0x28]);
    }

    #[test]
    fn v4_bin_degrades_to_raw() {
        let v4 = CodecOptions::new().spec(Spec::V4);
        assert_eq!(encode_with(Tag::Bin(5), v4), vec![0xa5]);
        assert_eq!(encode_with(Tag::Bin(40), v4), vec![0xda, 0x00, 0x28]);
    }

    #[test]
    fn bin_thresholds() {
        assert_eq!(encode(Tag::Bin(0)), vec![0xc4, 0x00]);
        assert_eq!(encode(Tag::Bin(255)), vec![0xc4, 0xff]);
        assert_eq!(encode(Tag::Bin(256)), vec![0xc5, 0x01, 0x00]);
        assert_eq!(encode(Tag::Bin(65536)), vec![0xc6, 0x00, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn compound_thresholds() {
        assert_eq!(encode(Tag::Array(0)), vec![0x90]);
        assert_eq!(encode(Tag::Array(15)), vec![0x9f]);
        assert_eq!(encode(Tag::Array(16)), vec![0xdc, 0x00, 0x10]);
        assert_eq!(encode(Tag::Map(2)), vec![0x82]);
        assert_eq!(encode(Tag::Map(65535)), vec![0xde, 0xff, 0xff]);
        assert_eq!(encode(Tag::Map(65536)), vec![0xdf, 0x00, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn ext_forms() {
        let opts = CodecOptions::new().extensions(true);
        assert_eq!(
            encode_with(Tag::Ext { ext_type: 5, len: 1 }, opts),
            vec![0xd4, 0x05]
        );
        assert_eq!(
            encode_with(Tag::Ext { ext_type: -1, len: 4 }, opts),
            vec![0xd6, 0xff]
        );
        assert_eq!(
            encode_with(Tag::Ext { ext_type: 5, len: 16 }, opts),
            vec![0xd8, 0x05]
        );
        assert_eq!(
            encode_with(Tag::Ext { ext_type: 5, len: 3 }, opts),
            vec![0xc7, 0x03, 0x05]
        );
        assert_eq!(
            encode_with(Tag::Ext { ext_type: 5, len: 256 }, opts),
            vec![0xc8, 0x01, 0x00, 0x05]
        );
        assert_eq!(
            encode_with(Tag::Ext { ext_type: 5, len: 65536 }, opts),
            vec![0xc9, 0x00, 0x01, 0x00, 0x00, 0x05]
        );
    }

    #[test]
    fn ext_gating() {
        let mut buf = [0u8; size::MAX_TAG];
        let tag = Tag::Ext { ext_type: 1, len: 4 };
        assert_eq!(
            encode_tag(&tag, CodecOptions::new(), &mut buf),
            Err(WireError::ExtDisabled)
        );
        let v4 = CodecOptions::new().extensions(true).spec(Spec::V4);
        assert_eq!(encode_tag(&tag, v4, &mut buf), Err(WireError::ExtAtV4));
    }
}
