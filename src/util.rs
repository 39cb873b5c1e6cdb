//! This is an internal module that contains utility functionality used by other modules.

/// Spin while `$cond` holds, re-evaluating it at most `$budget` times. Returns `Err($err)` from
/// the enclosing function once the budget is spent.
///
/// Example: `bounded_loop!(!self.cr().pllrdy(), self.retries.pll_lock, RccError::PllLockTimeout);`
macro_rules! bounded_loop {
    ($cond:expr, $budget:expr, $err:expr) => {
        let mut i: u32 = 0;
        while $cond {
            i += 1;
            if i >= $budget {
                return Err($err);
            }
        }
    };
}

pub(crate) use bounded_loop;

/// Generates a getter and a `set_` builder for each field of a `u32` register newtype.
/// Single-bit fields are `bool`; wider fields are `[offset, width]`.
///
/// Example: `reg_fields!(Cr { hsion: bool [0], pllm: u8 [0, 6] });`
macro_rules! reg_fields {
    ($reg:ident {
        $( $(#[$meta:meta])* $name:ident: $ty:ident [$offset:literal $(, $width:literal)?] ),* $(,)?
    }) => {
        impl $reg {
            $( reg_fields!(@field $(#[$meta])* $name: $ty [$offset $(, $width)?]); )*
        }
    };

    (@field $(#[$meta:meta])* $name:ident: bool [$offset:literal]) => {
        paste::paste! {
            $(#[$meta])*
            #[doc = concat!("Bit ", stringify!($offset), ".")]
            pub const fn $name(self) -> bool {
                self.0 & (1 << $offset) != 0
            }

            #[doc = concat!("Returns a copy with bit ", stringify!($offset), " (`", stringify!($name), "`) set to `value`.")]
            #[must_use]
            pub const fn [<set_ $name>](self, value: bool) -> Self {
                if value {
                    Self(self.0 | (1 << $offset))
                } else {
                    Self(self.0 & !(1 << $offset))
                }
            }
        }
    };

    (@field $(#[$meta:meta])* $name:ident: $ty:ident [$offset:literal, $width:literal]) => {
        paste::paste! {
            $(#[$meta])*
            #[doc = concat!("Bits ", stringify!($offset), ", width ", stringify!($width), ".")]
            pub const fn $name(self) -> $ty {
                ((self.0 >> $offset) & ((1 << $width) - 1)) as $ty
            }

            #[doc = concat!("Returns a copy with `", stringify!($name), "` replaced. Excess high bits are dropped.")]
            #[must_use]
            pub const fn [<set_ $name>](self, value: $ty) -> Self {
                let mask: u32 = ((1 << $width) - 1) << $offset;
                Self((self.0 & !mask) | (((value as u32) << $offset) & mask))
            }
        }
    };
}

pub(crate) use reg_fields;
