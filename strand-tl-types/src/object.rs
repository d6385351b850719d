//! [`Object`], the type-erased TL value produced by generic decoding.

use std::any::Any;
use std::fmt;

use crate::{Boxed, Serializable};

/// Any boxed TL value, with its concrete type erased.
///
/// Implemented automatically for every [`Boxed`] type. Use
/// [`downcast_ref`](trait.Object.html#method.downcast_ref) or
/// [`downcast`](trait.Object.html#method.downcast) to get the concrete value
/// back.
pub trait Object: Any + fmt::Debug + Send + Sync {
    /// The tag this value is encoded with.
    fn tag(&self) -> u32;

    /// Append the full boxed encoding (tag included) to `buf`.
    fn write_to(&self, buf: &mut Vec<u8>);

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;

    fn clone_boxed(&self) -> Box<dyn Object>;
}

impl<T> Object for T
where
    T: Boxed + Serializable + Clone + fmt::Debug + Send + Sync + 'static,
{
    fn tag(&self) -> u32 { self.constructor_id() }

    fn write_to(&self, buf: &mut Vec<u8>) { self.serialize(buf) }

    fn as_any(&self) -> &dyn Any { self }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> { self }

    fn clone_boxed(&self) -> Box<dyn Object> { Box::new(self.clone()) }
}

impl dyn Object {
    /// `true` if the erased value is a `T`.
    pub fn is<T: Object>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Object>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Recover the concrete value, or give the box back untouched.
    pub fn downcast<T: Object>(self: Box<Self>) -> Result<Box<T>, Box<dyn Object>> {
        if self.is::<T>() {
            // Checked above; the conversion cannot fail.
            self.into_any().downcast::<T>().map_err(|_| unreachable!())
        } else {
            Err(self)
        }
    }
}

impl Serializable for dyn Object {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes);
        buf.extend(bytes);
    }
}

impl Clone for Box<dyn Object> {
    fn clone(&self) -> Self { self.clone_boxed() }
}

/// Two values are equal when they encode to the same bytes.
impl PartialEq for dyn Object {
    fn eq(&self, other: &Self) -> bool {
        self.tag() == other.tag() && self.to_bytes() == other.to_bytes()
    }
}

// Works around rust-lang/rust#31740 so `Box<dyn Object> == Box<dyn Object>`
// compiles without moving; delegates to the `dyn Object` impl above.
impl PartialEq<&Self> for Box<dyn Object> {
    fn eq(&self, other: &&Self) -> bool {
        **self == ***other
    }
}
