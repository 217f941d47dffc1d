//! Fixed-width values stored in arena slots.

/// A value that can live in a fixed-size arena slot.
///
/// Slots are `WIDTH` bytes, little endian. `()` occupies no bytes, which turns
/// a [`DaTrie<()>`](crate::DaTrie) into a plain string set.
pub trait Value: Copy {
    const WIDTH: usize;

    fn encode(self, out: &mut [u8]);

    fn decode(bytes: &[u8]) -> Self;
}

impl Value for () {
    const WIDTH: usize = 0;

    #[inline]
    fn encode(self, _out: &mut [u8]) {}

    #[inline]
    fn decode(_bytes: &[u8]) -> Self {}
}

macro_rules! impl_value_int {
    ($($t:ty),* $(,)?) => {
        $(
            impl Value for $t {
                const WIDTH: usize = std::mem::size_of::<$t>();

                #[inline]
                fn encode(self, out: &mut [u8]) {
                    out[..Self::WIDTH].copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn decode(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(&bytes[..Self::WIDTH]);
                    <$t>::from_le_bytes(buf)
                }
            }
        )*
    };
}

impl_value_int!(u8, u16, u32, u64, usize, i8, i16, i32, i64);
