use std::ffi::{c_long, c_ulong};
use std::fmt;
use std::io::Cursor;

use byteorder::{BigEndian, ByteOrder as _, LittleEndian, NativeEndian, ReadBytesExt};

use crate::value::Value;

/// Byte ordering prefix of a specifier. Applies to every primitive it decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ByteOrder {
    /// `@`: native order, native C sizes.
    #[default]
    NativeAligned,
    /// `=`: native order, standard sizes.
    NativePacked,
    /// `<`
    Little,
    /// `>`
    Big,
    /// `!`
    Network,
}

impl ByteOrder {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '@' => Some(ByteOrder::NativeAligned),
            '=' => Some(ByteOrder::NativePacked),
            '<' => Some(ByteOrder::Little),
            '>' => Some(ByteOrder::Big),
            '!' => Some(ByteOrder::Network),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            ByteOrder::NativeAligned => '@',
            ByteOrder::NativePacked => '=',
            ByteOrder::Little => '<',
            ByteOrder::Big => '>',
            ByteOrder::Network => '!',
        }
    }

    pub fn is_native_sized(self) -> bool {
        self == ByteOrder::NativeAligned
    }

    /// Reads a 4-byte unsigned value, the width of a dereferenced pointer.
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        match self {
            ByteOrder::NativeAligned | ByteOrder::NativePacked => NativeEndian::read_u32(bytes),
            ByteOrder::Little => LittleEndian::read_u32(bytes),
            ByteOrder::Big | ByteOrder::Network => BigEndian::read_u32(bytes),
        }
    }
}

/// Primitive type codes understood inside a specifier token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarCode {
    Pad,
    Char,
    I8,
    U8,
    Bool,
    I16,
    U16,
    I32,
    U32,
    Long,
    ULong,
    I64,
    U64,
    ISize,
    USize,
    F16,
    F32,
    F64,
    Bytes,
    Pascal,
    VoidPtr,
}

impl ScalarCode {
    pub fn from_char(c: char) -> Option<Self> {
        let code = match c {
            'x' => ScalarCode::Pad,
            'c' => ScalarCode::Char,
            'b' => ScalarCode::I8,
            'B' => ScalarCode::U8,
            '?' => ScalarCode::Bool,
            'h' => ScalarCode::I16,
            'H' => ScalarCode::U16,
            'i' => ScalarCode::I32,
            'I' => ScalarCode::U32,
            'l' => ScalarCode::Long,
            'L' => ScalarCode::ULong,
            'q' => ScalarCode::I64,
            'Q' => ScalarCode::U64,
            'n' => ScalarCode::ISize,
            'N' => ScalarCode::USize,
            'e' => ScalarCode::F16,
            'f' => ScalarCode::F32,
            'd' => ScalarCode::F64,
            's' => ScalarCode::Bytes,
            'p' => ScalarCode::Pascal,
            'P' => ScalarCode::VoidPtr,
            _ => return None,
        };
        Some(code)
    }

    pub fn as_char(self) -> char {
        match self {
            ScalarCode::Pad => 'x',
            ScalarCode::Char => 'c',
            ScalarCode::I8 => 'b',
            ScalarCode::U8 => 'B',
            ScalarCode::Bool => '?',
            ScalarCode::I16 => 'h',
            ScalarCode::U16 => 'H',
            ScalarCode::I32 => 'i',
            ScalarCode::U32 => 'I',
            ScalarCode::Long => 'l',
            ScalarCode::ULong => 'L',
            ScalarCode::I64 => 'q',
            ScalarCode::U64 => 'Q',
            ScalarCode::ISize => 'n',
            ScalarCode::USize => 'N',
            ScalarCode::F16 => 'e',
            ScalarCode::F32 => 'f',
            ScalarCode::F64 => 'd',
            ScalarCode::Bytes => 's',
            ScalarCode::Pascal => 'p',
            ScalarCode::VoidPtr => 'P',
        }
    }

    /// `s`, `p` and `x` treat their count as a byte length rather than a repeat.
    pub fn takes_length(self) -> bool {
        matches!(self, ScalarCode::Bytes | ScalarCode::Pascal | ScalarCode::Pad)
    }

    pub fn native_only(self) -> bool {
        matches!(self, ScalarCode::ISize | ScalarCode::USize | ScalarCode::VoidPtr)
    }

    /// Size in bytes of a single item of this code.
    pub fn item_size(self, order: ByteOrder) -> usize {
        let native = order.is_native_sized();
        match self {
            ScalarCode::Pad
            | ScalarCode::Char
            | ScalarCode::I8
            | ScalarCode::U8
            | ScalarCode::Bool
            | ScalarCode::Bytes
            | ScalarCode::Pascal => 1,
            ScalarCode::I16 | ScalarCode::U16 | ScalarCode::F16 => 2,
            ScalarCode::I32 | ScalarCode::U32 | ScalarCode::F32 => 4,
            ScalarCode::Long if native => size_of::<c_long>(),
            ScalarCode::ULong if native => size_of::<c_ulong>(),
            ScalarCode::Long | ScalarCode::ULong => 4,
            ScalarCode::I64 | ScalarCode::U64 | ScalarCode::F64 => 8,
            ScalarCode::ISize | ScalarCode::USize | ScalarCode::VoidPtr => size_of::<usize>(),
        }
    }

    /// Total bytes consumed by a token of this code repeated `count` times,
    /// or `None` if that does not fit in a `usize`.
    pub fn token_size(self, order: ByteOrder, count: usize) -> Option<usize> {
        self.item_size(order).checked_mul(count)
    }

    /// Decodes the token's value from `bytes`, which holds exactly
    /// `token_size` bytes. Returns `None` for pad bytes.
    pub fn decode(
        self,
        order: ByteOrder,
        count: usize,
        bytes: &[u8],
    ) -> std::io::Result<Option<Value>> {
        match self {
            ScalarCode::Pad => Ok(None),
            ScalarCode::Char => Ok(Some(Value::Bytes(bytes[..1].to_vec()))),
            ScalarCode::Bytes => Ok(Some(Value::Bytes(bytes.to_vec()))),
            ScalarCode::Pascal => {
                if count == 0 {
                    return Ok(Some(Value::Bytes(Vec::new())));
                }
                let len = (bytes[0] as usize).min(count - 1);
                Ok(Some(Value::Bytes(bytes[1..1 + len].to_vec())))
            }
            _ => {
                let mut cur = Cursor::new(bytes);
                let value = match order {
                    ByteOrder::NativeAligned | ByteOrder::NativePacked => {
                        read_number::<NativeEndian>(self, order, &mut cur)?
                    }
                    ByteOrder::Little => read_number::<LittleEndian>(self, order, &mut cur)?,
                    ByteOrder::Big | ByteOrder::Network => {
                        read_number::<BigEndian>(self, order, &mut cur)?
                    }
                };
                Ok(Some(value))
            }
        }
    }
}

impl fmt::Display for ScalarCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

fn read_number<B: byteorder::ByteOrder>(
    code: ScalarCode,
    order: ByteOrder,
    cur: &mut Cursor<&[u8]>,
) -> std::io::Result<Value> {
    let size = code.item_size(order);
    let value = match code {
        ScalarCode::I8 => Value::Int(cur.read_i8()? as i64),
        ScalarCode::U8 => Value::UInt(cur.read_u8()? as u64),
        ScalarCode::Bool => Value::Bool(cur.read_u8()? != 0),
        ScalarCode::I16 => Value::Int(cur.read_i16::<B>()? as i64),
        ScalarCode::U16 => Value::UInt(cur.read_u16::<B>()? as u64),
        ScalarCode::F16 => Value::Float(f16_to_f64(cur.read_u16::<B>()?)),
        ScalarCode::F32 => Value::Float(cur.read_f32::<B>()? as f64),
        ScalarCode::F64 => Value::Float(cur.read_f64::<B>()?),
        ScalarCode::I32 | ScalarCode::Long | ScalarCode::ISize => {
            Value::Int(cur.read_int::<B>(size)?)
        }
        ScalarCode::U32 | ScalarCode::ULong | ScalarCode::USize | ScalarCode::VoidPtr => {
            Value::UInt(cur.read_uint::<B>(size)?)
        }
        ScalarCode::I64 => Value::Int(cur.read_i64::<B>()?),
        ScalarCode::U64 => Value::UInt(cur.read_u64::<B>()?),
        ScalarCode::Pad | ScalarCode::Char | ScalarCode::Bytes | ScalarCode::Pascal => {
            unreachable!("non-numeric code {code} routed to read_number")
        }
    };
    Ok(value)
}

/// IEEE 754 binary16 to f64.
fn f16_to_f64(bits: u16) -> f64 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = ((bits >> 10) & 0x1f) as i32;
    let mantissa = (bits & 0x3ff) as f64;

    match exponent {
        0 => sign * mantissa * 2f64.powi(-24),
        0x1f if mantissa == 0.0 => sign * f64::INFINITY,
        0x1f => f64::NAN,
        _ => sign * (1.0 + mantissa / 1024.0) * 2f64.powi(exponent - 15),
    }
}
