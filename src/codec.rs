//! Deterministic conversion of keys and values to and from bytes.
//!
//! Two strategies are bound per concrete type at compile time:
//!
//! - fixed-width big-endian layouts for scalars (`bool`, sized integers,
//!   floats, [`Complex`]) and identity for `String`/`Vec<u8>`;
//! - a structural JSON fallback for everything else, reached through the
//!   [`Json`] wrapper or the [`json_codec!`](crate::json_codec) macro.
//!
//! Structural payloads start with [`STRUCTURAL_TAG`], a byte that never opens
//! valid UTF-8. The structural decoder rejects untagged bytes, and `String`
//! or single-byte readers reject tagged ones. Fixed-width readers of a wider
//! type only check the length, so the type bound at compile time is what
//! keeps a key on one path.

use serde::{Serialize, de::DeserializeOwned};

use crate::error::CacheError;

/// Types that can be turned into a canonical byte sequence.
///
/// Two keys are considered the same for locking and coalescing purposes if
/// and only if their encodings are equal.
pub trait Encode {
    fn encode(&self) -> Result<Vec<u8>, CacheError>;
}

/// Types that can be rebuilt from bytes produced by [`Encode`].
pub trait Decode: Sized {
    fn decode(bytes: &[u8]) -> Result<Self, CacheError>;
}

/// A type that round-trips: `decode(encode(v)) == v`.
pub trait Codec: Encode + Decode {}

impl<T: Encode + Decode> Codec for T {}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self) -> Result<Vec<u8>, CacheError> {
        (**self).encode()
    }
}

fn fixed<const N: usize>(bytes: &[u8], type_name: &str) -> Result<[u8; N], CacheError> {
    bytes.try_into().map_err(|_| {
        CacheError::decoding(format!(
            "expected {} bytes for {}, got {}",
            N,
            type_name,
            bytes.len()
        ))
    })
}

macro_rules! fixed_width {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Encode for $ty {
                fn encode(&self) -> Result<Vec<u8>, CacheError> {
                    Ok(self.to_be_bytes().to_vec())
                }
            }

            impl Decode for $ty {
                fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
                    let array = fixed::<{ std::mem::size_of::<$ty>() }>(bytes, stringify!($ty))?;
                    Ok(<$ty>::from_be_bytes(array))
                }
            }
        )*
    };
}

fixed_width!(i8, u8, i16, u16, i32, u32, i64, u64, i128, u128, f32, f64);

// Pointer-sized integers always use the 64-bit layout.
impl Encode for isize {
    fn encode(&self) -> Result<Vec<u8>, CacheError> {
        (*self as i64).encode()
    }
}

impl Decode for isize {
    fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        let wide = i64::decode(bytes)?;
        isize::try_from(wide)
            .map_err(|_| CacheError::decoding(format!("{} does not fit in isize", wide)))
    }
}

impl Encode for usize {
    fn encode(&self) -> Result<Vec<u8>, CacheError> {
        (*self as u64).encode()
    }
}

impl Decode for usize {
    fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        let wide = u64::decode(bytes)?;
        usize::try_from(wide)
            .map_err(|_| CacheError::decoding(format!("{} does not fit in usize", wide)))
    }
}

impl Encode for bool {
    fn encode(&self) -> Result<Vec<u8>, CacheError> {
        Ok(vec![u8::from(*self)])
    }
}

impl Decode for bool {
    fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        let [byte] = fixed::<1>(bytes, "bool")?;
        Ok(byte != 0)
    }
}

impl Encode for str {
    fn encode(&self) -> Result<Vec<u8>, CacheError> {
        Ok(self.as_bytes().to_vec())
    }
}

impl Encode for String {
    fn encode(&self) -> Result<Vec<u8>, CacheError> {
        self.as_str().encode()
    }
}

impl Decode for String {
    fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| CacheError::decoding(format!("invalid UTF-8 string: {}", e)))
    }
}

impl Encode for [u8] {
    fn encode(&self) -> Result<Vec<u8>, CacheError> {
        Ok(self.to_vec())
    }
}

impl Encode for Vec<u8> {
    fn encode(&self) -> Result<Vec<u8>, CacheError> {
        Ok(self.clone())
    }
}

impl Decode for Vec<u8> {
    fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        Ok(bytes.to_vec())
    }
}

/// A complex number stored as its real part followed by its imaginary part.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex<T> {
    pub re: T,
    pub im: T,
}

impl<T> Complex<T> {
    pub fn new(re: T, im: T) -> Self {
        Complex { re, im }
    }
}

macro_rules! complex_width {
    ($($ty:ty => $width:expr),* $(,)?) => {
        $(
            impl Encode for Complex<$ty> {
                fn encode(&self) -> Result<Vec<u8>, CacheError> {
                    let mut out = Vec::with_capacity($width);
                    out.extend_from_slice(&self.re.to_be_bytes());
                    out.extend_from_slice(&self.im.to_be_bytes());
                    Ok(out)
                }
            }

            impl Decode for Complex<$ty> {
                fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
                    let array = fixed::<$width>(bytes, concat!("Complex<", stringify!($ty), ">"))?;
                    let (re, im) = array.split_at($width / 2);
                    Ok(Complex {
                        re: <$ty>::decode(re)?,
                        im: <$ty>::decode(im)?,
                    })
                }
            }
        )*
    };
}

complex_width!(f32 => 8, f64 => 16);

/// Leading byte of every payload written through the structural JSON path.
pub const STRUCTURAL_TAG: u8 = 0xFF;

/// Encode any serde type through the structural JSON path.
pub fn json_encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CacheError> {
    let mut out = vec![STRUCTURAL_TAG];
    serde_json::to_writer(&mut out, value)
        .map_err(|e| CacheError::encoding(format!("JSON serialization failed: {}", e)))?;
    Ok(out)
}

/// Decode any serde type from the structural JSON path.
pub fn json_decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CacheError> {
    let payload = match bytes.split_first() {
        Some((&STRUCTURAL_TAG, payload)) => payload,
        _ => {
            return Err(CacheError::decoding(format!(
                "{} bytes were not written through the structural path",
                bytes.len()
            )));
        }
    };
    serde_json::from_slice(payload)
        .map_err(|e| CacheError::decoding(format!("JSON deserialization failed: {}", e)))
}

/// Wrapper that forces a value through the structural JSON path.
///
/// # Example
/// ```ignore
/// kv.set(&"user:42", &Json(user)).await?;
/// let user: Option<Json<User>> = kv.get(&"user:42").await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Serialize> Encode for Json<T> {
    fn encode(&self) -> Result<Vec<u8>, CacheError> {
        json_encode(&self.0)
    }
}

impl<T: DeserializeOwned> Decode for Json<T> {
    fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        json_decode(bytes).map(Json)
    }
}

/// Bind one or more serde types to the structural JSON path.
///
/// # Example
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize)]
/// struct User { id: u64, name: String }
///
/// kv_memo::json_codec!(User);
/// ```
#[macro_export]
macro_rules! json_codec {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::codec::Encode for $ty {
                fn encode(&self) -> ::std::result::Result<::std::vec::Vec<u8>, $crate::CacheError> {
                    $crate::codec::json_encode(self)
                }
            }

            impl $crate::codec::Decode for $ty {
                fn decode(bytes: &[u8]) -> ::std::result::Result<Self, $crate::CacheError> {
                    $crate::codec::json_decode(bytes)
                }
            }
        )+
    };
}
