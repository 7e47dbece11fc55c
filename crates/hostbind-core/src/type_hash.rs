//! Deterministic hash-based identity for registered names.
//!
//! [`TypeHash`] is a 64-bit hash identifying a bound type, a module-level
//! function, or a method of a bound type. Hashes are computed from names, so
//! the same name always maps to the same identity regardless of registration
//! order. Registries use them for single-lookup duplicate detection.
//!
//! # Examples
//!
//! ```
//! use hostbind_core::TypeHash;
//!
//! let x = TypeHash::from_name("X");
//! assert_eq!(x, TypeHash::from_name("X"));
//!
//! // A method and a function of the same name never collide.
//! let method = TypeHash::from_method(x, "f");
//! assert_ne!(method, TypeHash::from_function("f"));
//! ```

use std::fmt;

use xxhash_rust::xxh64::xxh64;

/// Domain-specific mixing constants.
///
/// Different entity kinds produce distinct hashes even if they share a name.
pub mod hash_constants {
    /// Domain marker for type hashes
    pub const TYPE: u64 = 0x2fac10b63a6cc57c;

    /// Domain marker for module-level function hashes
    pub const FUNCTION: u64 = 0x5ea77ffbcdf5f302;

    /// Domain marker for method hashes
    pub const METHOD: u64 = 0x7d3c8b4a92e15f6d;

    /// Domain marker for constructor hashes
    pub const CONSTRUCTOR: u64 = 0x9a7f3d5e2b8c4601;

    /// Mixes the arity into constructor hashes
    pub const ARITY: u64 = 0x9e3779b97f4a7c15;
}

/// A deterministic 64-bit hash identifying a type, function or method.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeHash(pub u64);

impl TypeHash {
    /// Empty/invalid hash constant.
    pub const EMPTY: TypeHash = TypeHash(0);

    /// Hash of a type name.
    #[inline]
    pub fn from_name(name: &str) -> Self {
        TypeHash(hash_constants::TYPE ^ xxh64(name.as_bytes(), 0))
    }

    /// Hash of a module-level function name.
    #[inline]
    pub fn from_function(name: &str) -> Self {
        TypeHash(hash_constants::FUNCTION ^ xxh64(name.as_bytes(), 0))
    }

    /// Hash of a method name scoped to its owning type.
    #[inline]
    pub fn from_method(owner: TypeHash, name: &str) -> Self {
        let hash = hash_constants::METHOD ^ xxh64(name.as_bytes(), 0);
        TypeHash(hash.wrapping_mul(owner.0 | 1) ^ owner.0)
    }

    /// Hash of a constructor, identified by owner and arity.
    #[inline]
    pub fn from_constructor(owner: TypeHash, arity: usize) -> Self {
        let hash = hash_constants::CONSTRUCTOR ^ owner.0;
        TypeHash(hash.wrapping_add(hash_constants::ARITY.wrapping_mul(arity as u64 + 1)))
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash({:#018x})", self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}
