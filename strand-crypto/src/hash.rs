//! Digest helpers. Each macro hashes the concatenation of its arguments.

#[doc(hidden)]
pub mod __private {
    pub use sha1::{Digest, Sha1};
    pub use sha2::Sha256;
}

/// SHA-1 over one or more byte slices, as `[u8; 20]`.
#[macro_export]
macro_rules! sha1 {
    ( $( $x:expr ),+ $(,)? ) => {{
        use $crate::hash::__private::{Digest, Sha1};
        let mut h = Sha1::new();
        $( h.update($x); )+
        let out: [u8; 20] = h.finalize().into();
        out
    }};
}

/// SHA-256 over one or more byte slices, as `[u8; 32]`.
#[macro_export]
macro_rules! sha256 {
    ( $( $x:expr ),+ $(,)? ) => {{
        use $crate::hash::__private::{Digest, Sha256};
        let mut h = Sha256::new();
        $( h.update($x); )+
        let out: [u8; 32] = h.finalize().into();
        out
    }};
}
