//! Declarative builders for schema types.
//!
//! They expand to the same shapes a schema code generator produces:
//! bare `types::*` structs write no tag, `enums::*` write the tag of the
//! variant they hold, and `functions::*` write their own tag.
//!
//! Fields are listed in schema order and take one of four forms:
//!
//! ```text
//! flags: #,                 // a flags word, computed on write
//! name: Type,               // always present
//! name: flags.N ? Type,     // Option<Type>, present when bit N is set
//! name: flags.N ? true,     // bool carried by bit N alone
//! ```
//!
//! ```rust
//! use strand_tl_types::{tl_struct, Deserializable, Serializable};
//!
//! tl_struct!(
//!     /// `peerSettings#a518110d flags:# report_spam:flags.0?true geo_distance:flags.6?int`
//!     PeerSettings = 0xa518110d {
//!         flags: #,
//!         report_spam: flags.0 ? true,
//!         geo_distance: flags.6 ? i32,
//!     }
//! );
//!
//! let s = PeerSettings { report_spam: true, geo_distance: None };
//! assert_eq!(s.to_bytes(), 1u32.to_le_bytes());
//! assert_eq!(PeerSettings::from_bytes(&s.to_bytes()).unwrap(), s);
//! ```

/// A bare constructor: fields in schema order, no tag on the wire.
#[macro_export]
macro_rules! tl_struct {
    (
        @emit [$(#[$meta:meta])* $name:ident = $id:literal]
        [$(pub $field:ident : $ty:ty,)*]
        [$($param:tt)*]
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        pub struct $name {
            $(pub $field: $ty,)*
        }

        impl $crate::Identifiable for $name {
            const CONSTRUCTOR_ID: u32 = $id;
        }

        impl $crate::Serializable for $name {
            #[allow(unused_variables, unused_mut)]
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                $($crate::__tl_param!(@flags_init $param);)*
                $($crate::__tl_param!(@flags_set self $param);)*
                $($crate::__tl_param!(@ser self buf $param);)*
            }
        }

        impl $crate::Deserializable for $name {
            #[allow(unused_variables)]
            fn deserialize(buf: $crate::deserialize::Buffer) -> $crate::deserialize::Result<Self> {
                $($crate::__tl_param!(@de buf $param);)*
                Ok(Self { $($field,)* })
            }
        }
    };
    (
        $(#[$meta:meta])*
        $name:ident = $id:literal { $($body:tt)* }
    ) => {
        $crate::__tl_params!(struct [$(#[$meta])* $name = $id] [] [] $($body)* ,);
    };
}

/// A boxed type: a closed union over bare constructors.
#[macro_export]
macro_rules! tl_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident($inner:ty)),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        pub enum $name {
            $($variant($inner),)+
        }

        impl $crate::Serializable for $name {
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                $crate::Serializable::serialize(&$crate::Boxed::constructor_id(self), buf);
                match self {
                    $(Self::$variant(x) => $crate::Serializable::serialize(x, buf),)+
                }
            }
        }

        impl $crate::Deserializable for $name {
            fn deserialize(buf: $crate::deserialize::Buffer) -> $crate::deserialize::Result<Self> {
                let id = <u32 as $crate::Deserializable>::deserialize(buf)?;
                $(
                    if id == <$inner as $crate::Identifiable>::CONSTRUCTOR_ID {
                        return Ok(Self::$variant(<$inner as $crate::Deserializable>::deserialize(buf)?));
                    }
                )+
                Err($crate::deserialize::Error::UnexpectedConstructor { id })
            }
        }

        impl $crate::Boxed for $name {
            const CONSTRUCTOR_IDS: &'static [u32] =
                &[$(<$inner as $crate::Identifiable>::CONSTRUCTOR_ID,)+];

            fn constructor_id(&self) -> u32 {
                match self {
                    $(Self::$variant(_) => <$inner as $crate::Identifiable>::CONSTRUCTOR_ID,)+
                }
            }
        }

        $(
            impl From<$inner> for $name {
                fn from(x: $inner) -> Self { Self::$variant(x) }
            }
        )+
    };
}

/// An RPC function: tag, then fields. Decodable too, so a server (or a
/// test double) can read requests through the same [`crate::Registry`].
#[macro_export]
macro_rules! tl_function {
    (
        @emit [$(#[$meta:meta])* $name:ident = $id:literal -> $ret:ty]
        [$(pub $field:ident : $ty:ty,)*]
        [$($param:tt)*]
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        pub struct $name {
            $(pub $field: $ty,)*
        }

        impl $crate::Identifiable for $name {
            const CONSTRUCTOR_ID: u32 = $id;
        }

        impl $crate::Serializable for $name {
            #[allow(unused_mut)]
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                $crate::Serializable::serialize(&<Self as $crate::Identifiable>::CONSTRUCTOR_ID, buf);
                $($crate::__tl_param!(@flags_init $param);)*
                $($crate::__tl_param!(@flags_set self $param);)*
                $($crate::__tl_param!(@ser self buf $param);)*
            }
        }

        impl $crate::Deserializable for $name {
            #[allow(unused_variables)]
            fn deserialize(buf: $crate::deserialize::Buffer) -> $crate::deserialize::Result<Self> {
                let id = <u32 as $crate::Deserializable>::deserialize(buf)?;
                if id != $id {
                    return Err($crate::deserialize::Error::UnexpectedConstructor { id });
                }
                $($crate::__tl_param!(@de buf $param);)*
                Ok(Self { $($field,)* })
            }
        }

        impl $crate::Boxed for $name {
            const CONSTRUCTOR_IDS: &'static [u32] = &[$id];

            fn constructor_id(&self) -> u32 { $id }
        }

        impl $crate::RemoteCall for $name {
            type Return = $ret;
        }
    };
    (
        $(#[$meta:meta])*
        $name:ident = $id:literal { $($body:tt)* } -> $ret:ty
    ) => {
        $crate::__tl_params!(fn [$(#[$meta])* $name = $id -> $ret] [] [] $($body)* ,);
    };
}

/// Walks a field list, collecting struct fields and one
/// `(kind name ...)` group per parameter, then hands both back.
#[doc(hidden)]
#[macro_export]
macro_rules! __tl_params {
    (struct $head:tt $fields:tt $params:tt) => {
        $crate::tl_struct!(@emit $head $fields $params);
    };
    (fn $head:tt $fields:tt $params:tt) => {
        $crate::tl_function!(@emit $head $fields $params);
    };
    ($kind:tt $head:tt $fields:tt $params:tt , $($rest:tt)*) => {
        $crate::__tl_params!($kind $head $fields $params $($rest)*);
    };
    ($kind:tt $head:tt [$($f:tt)*] [$($p:tt)*] $name:ident : # , $($rest:tt)*) => {
        $crate::__tl_params!($kind $head [$($f)*] [$($p)* (flags $name)] $($rest)*);
    };
    ($kind:tt $head:tt [$($f:tt)*] [$($p:tt)*] $name:ident : $word:ident . $bit:literal ? true , $($rest:tt)*) => {
        $crate::__tl_params!(
            $kind $head [$($f)* pub $name: bool,] [$($p)* (bit $name $word $bit)] $($rest)*
        );
    };
    ($kind:tt $head:tt [$($f:tt)*] [$($p:tt)*] $name:ident : $word:ident . $bit:literal ? $ty:ty , $($rest:tt)*) => {
        $crate::__tl_params!(
            $kind $head [$($f)* pub $name: Option<$ty>,] [$($p)* (opt $name $word $bit $ty)] $($rest)*
        );
    };
    ($kind:tt $head:tt [$($f:tt)*] [$($p:tt)*] $name:ident : $ty:ty , $($rest:tt)*) => {
        $crate::__tl_params!($kind $head [$($f)* pub $name: $ty,] [$($p)* (req $name $ty)] $($rest)*);
    };
}

/// Per-parameter statements for [`tl_struct!`] and [`tl_function!`].
#[doc(hidden)]
#[macro_export]
macro_rules! __tl_param {
    (@flags_init (flags $name:ident)) => {
        let mut $name = 0u32;
    };
    (@flags_init $other:tt) => {};

    (@flags_set $this:tt (bit $name:ident $word:ident $bit:literal)) => {
        if $this.$name {
            $word |= 1 << $bit;
        }
    };
    (@flags_set $this:tt (opt $name:ident $word:ident $bit:literal $ty:ty)) => {
        if $this.$name.is_some() {
            $word |= 1 << $bit;
        }
    };
    (@flags_set $this:tt $other:tt) => {};

    (@ser $this:tt $buf:ident (flags $name:ident)) => {
        $crate::Serializable::serialize(&$name, $buf);
    };
    (@ser $this:tt $buf:ident (bit $($rest:tt)*)) => {};
    (@ser $this:tt $buf:ident (opt $name:ident $word:ident $bit:literal $ty:ty)) => {
        if let Some(v) = &$this.$name {
            $crate::Serializable::serialize(v, $buf);
        }
    };
    (@ser $this:tt $buf:ident (req $name:ident $ty:ty)) => {
        $crate::Serializable::serialize(&$this.$name, $buf);
    };

    (@de $buf:ident (flags $name:ident)) => {
        let $name = <u32 as $crate::Deserializable>::deserialize($buf)?;
    };
    (@de $buf:ident (bit $name:ident $word:ident $bit:literal)) => {
        let $name = ($word & (1 << $bit)) != 0;
    };
    (@de $buf:ident (opt $name:ident $word:ident $bit:literal $ty:ty)) => {
        let $name = if ($word & (1 << $bit)) != 0 {
            Some(<$ty as $crate::Deserializable>::deserialize($buf)?)
        } else {
            None
        };
    };
    (@de $buf:ident (req $name:ident $ty:ty)) => {
        let $name = <$ty as $crate::Deserializable>::deserialize($buf)?;
    };
}
