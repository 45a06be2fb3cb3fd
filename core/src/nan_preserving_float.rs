//! NaN bit-pattern preserving wrappers around `f32`/`f64`.
//!
//! The CORE never evaluates floating point arithmetic; it only stores and
//! compares the literal bit patterns that appear in constant expressions
//! (global initializers, `f32.const`/`f64.const`). A plain `f32`/`f64` would
//! silently canonicalize NaN payloads on most operations, which would make
//! two structurally different modules compare equal. These wrappers carry
//! the bits untouched.

use core::cmp::{Ordering, PartialEq, PartialOrd};

macro_rules! float {
    (
        $( #[$docs:meta] )*
        struct $for:ident($rep:ty as $is:ty);
    ) => {
        $(#[$docs])*
        #[derive(Copy, Clone)]
        pub struct $for($rep);

        impl $for {
            #[inline]
            pub fn from_bits(other: $rep) -> Self {
                $for(other)
            }

            #[inline]
            pub fn to_bits(self) -> $rep {
                self.0
            }

            #[inline]
            pub fn from_float(fl: $is) -> Self {
                fl.into()
            }

            #[inline]
            pub fn to_float(self) -> $is {
                self.into()
            }

            #[inline]
            pub fn is_nan(self) -> bool {
                self.to_float().is_nan()
            }
        }

        impl From<$is> for $for {
            #[inline]
            fn from(other: $is) -> $for {
                $for(other.to_bits())
            }
        }

        impl From<$for> for $is {
            #[inline]
            fn from(other: $for) -> $is {
                <$is>::from_bits(other.0)
            }
        }

        impl<T: Into<$for> + Copy> PartialEq<T> for $for {
            #[inline]
            fn eq(&self, other: &T) -> bool {
                self.0 == (*other).into().0
            }
        }

        impl<T: Into<$for> + Copy> PartialOrd<T> for $for {
            #[inline]
            fn partial_cmp(&self, other: &T) -> Option<Ordering> {
                <$is>::from(*self).partial_cmp(&<$is>::from((*other).into()))
            }
        }

        impl ::core::fmt::Debug for $for {
            fn fmt(&self, f: &mut ::core::fmt::Formatter) -> ::core::fmt::Result {
                <$is>::from(*self).fmt(f)
            }
        }
    };
}

float! {
    /// A NaN bit-preserving `f32`.
    struct F32(u32 as f32);
}

float! {
    /// A NaN bit-preserving `f64`.
    struct F64(u64 as f64);
}

impl From<u32> for F32 {
    #[inline]
    fn from(other: u32) -> Self {
        Self::from_bits(other)
    }
}

impl From<F32> for u32 {
    #[inline]
    fn from(other: F32) -> Self {
        other.to_bits()
    }
}

impl From<u64> for F64 {
    #[inline]
    fn from(other: u64) -> Self {
        Self::from_bits(other)
    }
}

impl From<F64> for u64 {
    #[inline]
    fn from(other: F64) -> Self {
        other.to_bits()
    }
}

#[cfg(test)]
mod tests {
    use super::{F32, F64};

    #[test]
    fn bit_roundtrip_f32() {
        let bits = 0xff80_3210u32;
        assert_eq!(F32::from_bits(bits).to_bits(), bits);
    }

    #[test]
    fn bit_roundtrip_f64() {
        let bits = 0xff80_3210_0000_0000u64;
        assert_eq!(F64::from_bits(bits).to_bits(), bits);
    }

    #[test]
    fn distinguishes_nan_payloads() {
        let a = F32::from_bits(0x7fc0_0001);
        let b = F32::from_bits(0x7fc0_0002);
        assert!(a.is_nan() && b.is_nan());
        assert_ne!(a.to_bits(), b.to_bits());
    }
}
