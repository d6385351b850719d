//! Tag → decoder table used for generic decoding.
//!
//! A [`Registry`] is built once, before any traffic, and then shared
//! read-only (typically behind an `Arc`). There is no global instance.

use std::collections::HashMap;
use std::fmt;

use crate::deserialize::{self, Buffer, Cursor, Error, read_count};
use crate::{Boxed, Deserializable, Object, Serializable, VECTOR_ID, enums, functions};

type DecodeFn = fn(Buffer) -> deserialize::Result<Box<dyn Object>>;

struct Entry {
    name: &'static str,
    decode: DecodeFn,
}

fn decode_as<T: Object + Deserializable>(buf: Buffer) -> deserialize::Result<Box<dyn Object>> {
    Ok(Box::new(T::deserialize(buf)?))
}

/// Maps every known tag to the type that decodes it.
#[derive(Default)]
pub struct Registry {
    entries: HashMap<u32, Entry>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every type a server may send at the MTProto
    /// service layer, plus `Bool`.
    pub fn with_service_schema() -> Self {
        let mut reg = Self::new();
        reg.register::<bool>()
            .register::<enums::ResPq>()
            .register::<enums::ServerDhParams>()
            .register::<enums::SetClientDhParamsAnswer>()
            .register::<enums::RpcError>()
            .register::<enums::Pong>()
            .register::<enums::NewSession>()
            .register::<enums::MsgsAck>()
            .register::<enums::BadMsgNotification>()
            .register::<enums::MsgResendReq>()
            .register::<enums::MsgsStateReq>()
            .register::<enums::MsgsStateInfo>()
            .register::<enums::MsgsAllInfo>()
            .register::<enums::MsgDetailedInfo>()
            .register::<enums::FutureSalts>()
            .register::<enums::DestroySessionRes>();
        reg
    }

    /// Adds the service-layer functions, so requests can be decoded too.
    /// Only a server (or a test double standing in for one) needs this.
    pub fn with_service_functions(mut self) -> Self {
        self.register::<functions::ReqPqMulti>()
            .register::<functions::ReqDhParams>()
            .register::<functions::SetClientDhParams>()
            .register::<functions::Ping>()
            .register::<functions::PingDelayDisconnect>()
            .register::<functions::GetFutureSalts>()
            .register::<functions::DestroySession>();
        self
    }

    /// Register `T` under every tag it can start with. A later
    /// registration of the same tag replaces the earlier one.
    pub fn register<T: Object + Boxed + Deserializable>(&mut self) -> &mut Self {
        for &id in T::CONSTRUCTOR_IDS {
            self.entries.insert(id, Entry {
                name: std::any::type_name::<T>(),
                decode: decode_as::<T>,
            });
        }
        self
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entries.contains_key(&id)
    }

    /// Rust type name registered for `id`, for diagnostics.
    pub fn name_for_id(&self, id: u32) -> Option<&'static str> {
        self.entries.get(&id).map(|e| e.name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decode one boxed value from the start of `bytes`.
    pub fn decode(&self, bytes: &[u8]) -> deserialize::Result<Box<dyn Object>> {
        self.decode_from(&mut Cursor::from_slice(bytes))
    }

    /// Decode one boxed value, dispatching on its tag.
    ///
    /// An unknown tag consumes the rest of the buffer and returns
    /// [`Error::UnregisteredType`] carrying those bytes.
    pub fn decode_from(&self, buf: Buffer) -> deserialize::Result<Box<dyn Object>> {
        let id = buf.peek_u32()?;
        match self.entries.get(&id) {
            Some(entry) => (entry.decode)(buf),
            None => {
                let mut data = Vec::new();
                buf.read_to_end(&mut data);
                Err(Error::UnregisteredType { id, data })
            }
        }
    }

    /// Decode a boxed `Vector` whose elements are all of `element` type.
    pub fn decode_vector(&self, bytes: &[u8], element: ElementType) -> deserialize::Result<Vec<Value>> {
        let buf = &mut Cursor::from_slice(bytes);
        let id = u32::deserialize(buf)?;
        if id != VECTOR_ID {
            return Err(Error::UnexpectedConstructor { id });
        }
        let len = read_count(buf)?;
        (0..len).map(|_| self.decode_value(buf, element)).collect()
    }

    fn decode_value(&self, buf: Buffer, element: ElementType) -> deserialize::Result<Value> {
        Ok(match element {
            ElementType::Int    => Value::Int(i32::deserialize(buf)?),
            ElementType::Long   => Value::Long(i64::deserialize(buf)?),
            ElementType::Double => Value::Double(f64::deserialize(buf)?),
            ElementType::Bool   => Value::Bool(bool::deserialize(buf)?),
            ElementType::Bytes  => Value::Bytes(Vec::<u8>::deserialize(buf)?),
            ElementType::String => Value::String(String::deserialize(buf)?),
            ElementType::Int128 => Value::Int128(<[u8; 16]>::deserialize(buf)?),
            ElementType::Int256 => Value::Int256(<[u8; 32]>::deserialize(buf)?),
            ElementType::Object => Value::Object(self.decode_from(buf)?),
        })
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("types", &self.entries.len()).finish()
    }
}

// ─── Vector hints ────────────────────────────────────────────────────────────

/// Element type of a homogeneous vector reply.
///
/// Replies such as `Vector<long>` carry no per-element tags, so the caller
/// has to say what to expect before the reply arrives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementType {
    Int,
    Long,
    Double,
    Bool,
    Bytes,
    String,
    Int128,
    Int256,
    /// Boxed values, decoded through the registry.
    Object,
}

/// One decoded vector element.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i32),
    Long(i64),
    Double(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    String(String),
    Int128([u8; 16]),
    Int256([u8; 32]),
    Object(Box<dyn Object>),
}

impl Serializable for Value {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        match self {
            Self::Int(v)    => v.serialize(buf),
            Self::Long(v)   => v.serialize(buf),
            Self::Double(v) => v.serialize(buf),
            Self::Bool(v)   => v.serialize(buf),
            Self::Bytes(v)  => v.serialize(buf),
            Self::String(v) => v.serialize(buf),
            Self::Int128(v) => v.serialize(buf),
            Self::Int256(v) => v.serialize(buf),
            Self::Object(v) => v.serialize(buf),
        }
    }
}
