//! Typed readers for single path, query and header values.
//!
//! A [`Scalars`] reader is declared with the keys it should read. Reading fills the slot of every
//! key with the parsed value found under that key. Reading never fails: a missing or malformed
//! value leaves the type's zero value in the slot.
//!
//! ```
//! use micro_crud::reader::PathReader;
//! use micro_crud::scalar::Int32;
//! use micro_crud::PathParams;
//!
//! let mut ids = Int32::keys(["foo", "bar"]);
//! ids.read_path(&PathParams::from_pairs([("foo", "42"), ("bar", "nope")])).unwrap();
//!
//! assert_eq!(ids.value("foo"), 42);
//! assert_eq!(ids.value("bar"), 0);
//! ```

use crate::error::BoxError;
use crate::reader::{HeaderReader, PathReader, QueryReader};
use crate::request::{PathParams, QueryValues};
use http::HeaderMap;
use std::collections::BTreeMap;

/// A value that can be parsed out of a request string.
pub trait Scalar: Default + Send {
    /// Parses `s` with the parser of this exact type.
    fn parse_exact(s: &str) -> Option<Self>;

    /// Parses `s` at the widest type of this family, then converts it to this type. Integers are
    /// truncated, floats are rounded.
    fn parse_wide(s: &str) -> Option<Self>;
}

macro_rules! impl_scalar {
    ($wide:ty => $($ty:ty)*) => {
        $(
        impl Scalar for $ty {
            fn parse_exact(s: &str) -> Option<Self> {
                s.parse::<$ty>().ok()
            }

            #[allow(
                trivial_numeric_casts,
                clippy::unnecessary_cast,
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                clippy::cast_possible_wrap,
                reason = "path values truncate from the wide parse"
            )]
            fn parse_wide(s: &str) -> Option<Self> {
                s.parse::<$wide>().ok().map(|v| v as $ty)
            }
        }
        )*
    };
}

impl_scalar!(i64 => isize i8 i16 i32 i64);
impl_scalar!(u64 => usize u8 u16 u32 u64);

impl Scalar for f64 {
    fn parse_exact(s: &str) -> Option<Self> {
        s.parse().ok()
    }

    fn parse_wide(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

impl Scalar for f32 {
    fn parse_exact(s: &str) -> Option<Self> {
        s.parse().ok()
    }

    fn parse_wide(s: &str) -> Option<Self> {
        Self::parse_exact(s)
    }
}

impl Scalar for bool {
    fn parse_exact(s: &str) -> Option<Self> {
        match s {
            "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
            "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
            _ => None,
        }
    }

    fn parse_wide(s: &str) -> Option<Self> {
        Self::parse_exact(s)
    }
}

impl Scalar for String {
    fn parse_exact(s: &str) -> Option<Self> {
        Some(s.to_owned())
    }

    fn parse_wide(s: &str) -> Option<Self> {
        Self::parse_exact(s)
    }
}

/// Maps parameter names to the values read for them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scalars<T> {
    slots: BTreeMap<String, T>,
}

pub type Bool = Scalars<bool>;
pub type Int = Scalars<isize>;
pub type Int8 = Scalars<i8>;
pub type Int16 = Scalars<i16>;
pub type Int32 = Scalars<i32>;
pub type Int64 = Scalars<i64>;
pub type Uint = Scalars<usize>;
pub type Uint8 = Scalars<u8>;
pub type Uint16 = Scalars<u16>;
pub type Uint32 = Scalars<u32>;
pub type Uint64 = Scalars<u64>;
pub type Float32 = Scalars<f32>;
pub type Float64 = Scalars<f64>;
pub type Str = Scalars<String>;

impl<T: Scalar> Scalars<T> {
    /// Declares the keys to read, each starting at the zero value.
    pub fn keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self { slots: keys.into_iter().map(|k| (k.into(), T::default())).collect() }
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.slots.get(key)
    }

    /// The value read for `key`, or the zero value when the key was not declared.
    pub fn value(&self, key: &str) -> T
    where
        T: Clone,
    {
        self.slots.get(key).cloned().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.slots.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn fill<'s>(&mut self, source: impl Fn(&str) -> Option<&'s str>, parse: fn(&str) -> Option<T>) {
        for (key, slot) in &mut self.slots {
            *slot = source(key.as_str()).and_then(parse).unwrap_or_default();
        }
    }
}

impl<T: Scalar> PathReader for Scalars<T> {
    fn read_path(&mut self, params: &PathParams) -> Result<(), BoxError> {
        self.fill(|k| params.get(k), T::parse_wide);
        Ok(())
    }
}

impl<T: Scalar> QueryReader for Scalars<T> {
    fn read_query(&mut self, query: &QueryValues) -> Result<(), BoxError> {
        self.fill(|k| query.get(k), T::parse_exact);
        Ok(())
    }
}

impl<T: Scalar> HeaderReader for Scalars<T> {
    fn read_header(&mut self, headers: &HeaderMap) -> Result<(), BoxError> {
        self.fill(|k| headers.get(k).and_then(|v| v.to_str().ok()), T::parse_exact);
        Ok(())
    }
}
