//! AMF0 script data, as carried in FLV script tags.
//!
//! Only the value types that actually occur in `onMetaData` payloads are
//! implemented: numbers, booleans, strings, objects, ECMA arrays and
//! strict arrays. That is the same subset the Flash Video specification
//! requires for script tags.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::FlvError;

mod marker {
    pub const NUMBER: u8 = 0x00;
    pub const BOOLEAN: u8 = 0x01;
    pub const STRING: u8 = 0x02;
    pub const OBJECT: u8 = 0x03;
    pub const NULL: u8 = 0x05;
    pub const UNDEFINED: u8 = 0x06;
    pub const ECMA_ARRAY: u8 = 0x08;
    pub const OBJECT_END: u8 = 0x09;
    pub const STRICT_ARRAY: u8 = 0x0A;
    pub const LONG_STRING: u8 = 0x0C;
}

/// An AMF0 value.
#[derive(Debug, Clone, PartialEq)]
pub enum Amf0Value {
    Number(f64),
    Boolean(bool),
    String(String),
    Object(Vec<(String, Amf0Value)>),
    EcmaArray(Vec<(String, Amf0Value)>),
    StrictArray(Vec<Amf0Value>),
    Null,
    Undefined,
}

impl Amf0Value {
    /// Looks up a named property on an object or ECMA array value.
    pub fn property(&self, name: &str) -> Option<&Amf0Value> {
        let entries = match self {
            Amf0Value::Object(entries) | Amf0Value::EcmaArray(entries) => entries,
            _ => return None,
        };
        entries.iter().find(|(key, _)| key == name).map(|(_, v)| v)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Amf0Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Decoder over a raw AMF0 byte sequence.
pub struct Amf0Decoder<'a> {
    reader: Cursor<&'a [u8]>,
}

impl<'a> Amf0Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Amf0Decoder {
            reader: Cursor::new(data),
        }
    }

    pub fn decode(&mut self) -> Result<Amf0Value, FlvError> {
        let marker = self.reader.read_u8()?;
        self.decode_with_marker(marker)
    }

    fn decode_with_marker(&mut self, marker: u8) -> Result<Amf0Value, FlvError> {
        match marker {
            marker::NUMBER => Ok(Amf0Value::Number(self.reader.read_f64::<BigEndian>()?)),
            marker::BOOLEAN => Ok(Amf0Value::Boolean(self.reader.read_u8()? != 0)),
            marker::STRING => Ok(Amf0Value::String(self.read_short_string()?)),
            marker::LONG_STRING => {
                let length = self.reader.read_u32::<BigEndian>()?;
                Ok(Amf0Value::String(self.read_utf8(length as usize)?))
            }
            marker::OBJECT => Ok(Amf0Value::Object(self.decode_properties()?)),
            marker::ECMA_ARRAY => {
                // The length prefix is approximate; the entry list is
                // terminated like an object.
                let _approximate_length = self.reader.read_u32::<BigEndian>()?;
                Ok(Amf0Value::EcmaArray(self.decode_properties()?))
            }
            marker::STRICT_ARRAY => {
                let length = self.reader.read_u32::<BigEndian>()?;
                let mut values = Vec::with_capacity(length.min(1024) as usize);
                for _ in 0..length {
                    values.push(self.decode()?);
                }
                Ok(Amf0Value::StrictArray(values))
            }
            marker::NULL => Ok(Amf0Value::Null),
            marker::UNDEFINED => Ok(Amf0Value::Undefined),
            _ => Err(FlvError::ScriptData("unsupported AMF0 marker")),
        }
    }

    fn decode_properties(&mut self) -> Result<Vec<(String, Amf0Value)>, FlvError> {
        let mut entries = Vec::new();
        loop {
            let name = self.read_short_string()?;
            let marker = self.reader.read_u8()?;
            if marker == marker::OBJECT_END {
                if !name.is_empty() {
                    return Err(FlvError::ScriptData("misplaced object end marker"));
                }
                return Ok(entries);
            }
            entries.push((name, self.decode_with_marker(marker)?));
        }
    }

    fn read_short_string(&mut self) -> Result<String, FlvError> {
        let length = self.reader.read_u16::<BigEndian>()?;
        self.read_utf8(length as usize)
    }

    fn read_utf8(&mut self, length: usize) -> Result<String, FlvError> {
        let mut buf = vec![0u8; length];
        self.reader.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|_| FlvError::ScriptData("invalid UTF-8 string"))
    }
}

/// Encoder for AMF0 values. The counterpart of [`Amf0Decoder`]; also used
/// to synthesise `onMetaData` payloads in tests.
pub struct Amf0Encoder;

impl Amf0Encoder {
    pub fn encode(buf: &mut Vec<u8>, value: &Amf0Value) -> Result<(), FlvError> {
        match value {
            Amf0Value::Number(n) => {
                buf.push(marker::NUMBER);
                buf.write_f64::<BigEndian>(*n).map_err(FlvError::Io)?;
            }
            Amf0Value::Boolean(b) => {
                buf.push(marker::BOOLEAN);
                buf.push(*b as u8);
            }
            Amf0Value::String(s) => Self::encode_string(buf, s)?,
            Amf0Value::Object(entries) => {
                buf.push(marker::OBJECT);
                Self::encode_properties(buf, entries)?;
            }
            Amf0Value::EcmaArray(entries) => {
                buf.push(marker::ECMA_ARRAY);
                buf.extend_from_slice(&(entries.len() as u32).to_be_bytes());
                Self::encode_properties(buf, entries)?;
            }
            Amf0Value::StrictArray(values) => {
                buf.push(marker::STRICT_ARRAY);
                buf.extend_from_slice(&(values.len() as u32).to_be_bytes());
                for value in values {
                    Self::encode(buf, value)?;
                }
            }
            Amf0Value::Null => buf.push(marker::NULL),
            Amf0Value::Undefined => buf.push(marker::UNDEFINED),
        }
        Ok(())
    }

    pub fn encode_string(buf: &mut Vec<u8>, value: &str) -> Result<(), FlvError> {
        if let Ok(length) = u16::try_from(value.len()) {
            buf.push(marker::STRING);
            buf.extend_from_slice(&length.to_be_bytes());
            buf.extend_from_slice(value.as_bytes());
        } else {
            buf.push(marker::LONG_STRING);
            buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
            buf.extend_from_slice(value.as_bytes());
        }
        Ok(())
    }

    fn encode_properties(
        buf: &mut Vec<u8>,
        entries: &[(String, Amf0Value)],
    ) -> Result<(), FlvError> {
        for (name, value) in entries {
            let length = u16::try_from(name.len())
                .map_err(|_| FlvError::ScriptData("property name too long"))?;
            buf.extend_from_slice(&length.to_be_bytes());
            buf.extend_from_slice(name.as_bytes());
            Self::encode(buf, value)?;
        }
        buf.extend_from_slice(&[0, 0, marker::OBJECT_END]);
        Ok(())
    }
}

/// A decoded script tag payload: the routine name and its argument.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptData {
    pub name: String,
    pub value: Amf0Value,
}

impl ScriptData {
    pub fn demux(data: &[u8]) -> Result<Self, FlvError> {
        let mut decoder = Amf0Decoder::new(data);
        let name = match decoder.decode()? {
            Amf0Value::String(name) => name,
            _ => return Err(FlvError::ScriptData("script data name is not a string")),
        };
        let value = decoder.decode()?;
        Ok(ScriptData { name, value })
    }

    /// The `duration` number from an `onMetaData` argument, if present.
    pub fn duration(&self) -> Option<f64> {
        self.value.property("duration")?.as_number()
    }
}
