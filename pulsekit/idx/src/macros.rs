#[macro_export]
/// Implements [`IndexRef`](crate::IndexRef) for a newtype over a [`u32`],
/// together with the conversions and a `Display` impl that prints the index
/// behind the given prefix (`impl_index!(VarId, "v")` displays as `v3`).
macro_rules! impl_index {
    ($struct_name: ident, $prefix: literal) => {
        impl $crate::IndexRef for $struct_name {
            fn index(&self) -> usize {
                self.0 as usize
            }

            fn new(input: usize) -> Self {
                Self(input as u32)
            }
        }

        impl From<u32> for $struct_name {
            fn from(input: u32) -> Self {
                $struct_name(input)
            }
        }

        impl From<$struct_name> for u32 {
            fn from(input: $struct_name) -> Self {
                input.0
            }
        }

        impl std::fmt::Display for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}
