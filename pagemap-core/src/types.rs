#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

macro_rules! gen_ops {
    (@gen_op $type:ident, $underlying:ident, $opTrait:ident, $opFn: ident, $op:tt) =>
    {
        impl<T: Into<$underlying>> std::ops::$opTrait<T> for $type {
            type Output = $type;

            fn $opFn(self, rhs: T) -> Self::Output {
                $type(self.0 $op rhs.into())
            }
        }
    };
    ($type:ident, $underlying:ident) => {
        gen_ops!(@gen_op $type, $underlying, Add, add, +);
        gen_ops!(@gen_op $type, $underlying, Sub, sub, -);
    };
}

macro_rules! wrap_numeric {
    ($newtype: ident, $underlying: ident, $($c:tt)+) => {
        #[doc = stringify!($($c)+)]
        #[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
        #[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $newtype(pub $underlying);

        impl From<$newtype> for $underlying {
            fn from(value: $newtype) -> Self {
                value.0
            }
        }

        impl From<$underlying> for $newtype {
            fn from(value: $underlying) -> Self {
                $newtype(value)
            }
        }

        impl std::fmt::Display for $newtype {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }
    }
}

wrap_numeric!(Pfn, u64, "A physical page frame number");
gen_ops!(Pfn, u64);

wrap_numeric!(Stripe, u64, "The index of a 512 MiB band of physical memory");
