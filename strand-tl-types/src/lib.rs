//! TL binary codec for MTProto.
//!
//! | Module        | Contents                                                   |
//! |---------------|------------------------------------------------------------|
//! | [`types`]     | Concrete constructors (bare types) as `struct`s            |
//! | [`functions`] | RPC functions as `struct`s implementing [`RemoteCall`]     |
//! | [`enums`]     | Boxed types as `enum`s implementing [`Deserializable`]     |
//! | [`registry`]  | Tag → decoder table for generic decoding                   |
//!
//! The schema shipped here covers the MTProto service layer (handshake,
//! pings, acks, salts). API types produced by a code generator plug in the
//! same way: implement the traits below and call [`Registry::register`].
//!
//! ```rust
//! use strand_tl_types::{functions, Registry, Serializable};
//!
//! let ping = functions::Ping { ping_id: 0xCADACADA };
//! let bytes = ping.to_bytes();
//!
//! let mut registry = Registry::with_service_schema();
//! registry.register::<functions::Ping>();
//! let obj = registry.decode(&bytes).unwrap();
//! assert_eq!(obj.downcast_ref::<functions::Ping>(), Some(&ping));
//! ```

#![deny(unsafe_code)]

#[macro_use]
mod macros;

pub mod deserialize;
pub mod object;
pub mod registry;
pub mod serialize;
mod schema;

pub use deserialize::{Cursor, Deserializable};
pub use object::Object;
pub use registry::{ElementType, Registry, Value};
pub use schema::{enums, functions, types};
pub use serialize::Serializable;

/// `vector#1cb5c415`, the header of every boxed vector.
pub const VECTOR_ID: u32 = 0x1cb5c415;
/// `boolTrue#997275b5`
pub const BOOL_TRUE_ID: u32 = 0x997275b5;
/// `boolFalse#bc799737`
pub const BOOL_FALSE_ID: u32 = 0xbc799737;

/// `rpc_result#f35c6d01 req_msg_id:long result:Object`
pub const RPC_RESULT_ID: u32 = 0xf35c6d01;
/// `msg_container#73f1f8dc messages:vector<%Message>`
pub const MSG_CONTAINER_ID: u32 = 0x73f1f8dc;
/// `gzip_packed#3072cfa1 packed_data:bytes`
pub const GZIP_PACKED_ID: u32 = 0x3072cfa1;

/// Bare vector, `vector` (lowercase) as opposed to the boxed `Vector`.
///
/// A length-prefixed list without the `0x1cb5c415` header.
#[derive(Clone, Debug, PartialEq)]
pub struct RawVec<T>(pub Vec<T>);

// ─── Core traits ──────────────────────────────────────────────────────────────

/// Every constructor has a unique 32-bit ID.
pub trait Identifiable {
    /// The constructor ID as specified in the TL schema.
    const CONSTRUCTOR_ID: u32;
}

/// A type whose encoding starts with its own tag: boxed enums, functions
/// and `Bool`.
///
/// Only boxed types can be decoded generically, since the tag is the only
/// thing the [`Registry`] can dispatch on.
pub trait Boxed {
    /// Every tag this type may start with.
    const CONSTRUCTOR_IDS: &'static [u32];

    /// The tag this particular value is written with.
    fn constructor_id(&self) -> u32;
}

/// Marks a function type that can be sent as an RPC call.
///
/// `Return` is the type the server will respond with.
pub trait RemoteCall: Serializable {
    /// The deserialized response type.
    type Return: Deserializable;
}

impl Boxed for bool {
    const CONSTRUCTOR_IDS: &'static [u32] = &[BOOL_TRUE_ID, BOOL_FALSE_ID];

    fn constructor_id(&self) -> u32 {
        if *self { BOOL_TRUE_ID } else { BOOL_FALSE_ID }
    }
}
