//! Fixed-size byte buffers used throughout the daemon for hashes, x-only
//! public keys, and Schnorr signature components.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! fixed_buf {
    ($name:ident, $len:expr) => {
        /// Fixed-size byte buffer, serialized as lowercase hex in human-readable formats.
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name([u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn new(buf: [u8; $len]) -> Self {
                Self(buf)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn zero() -> Self {
                Self([0u8; $len])
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(buf: [u8; $len]) -> Self {
                Self(buf)
            }
        }

        impl From<$name> for [u8; $len] {
            fn from(v: $name) -> Self {
                v.0
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = crate::PrimitiveError;

            fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
                let arr: [u8; $len] = slice
                    .try_into()
                    .map_err(|_| crate::PrimitiveError::InvalidLength {
                        expected: $len,
                        actual: slice.len(),
                    })?;
                Ok(Self(arr))
            }
        }

        impl TryFrom<String> for $name {
            type Error = crate::PrimitiveError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> Self {
                v.to_string()
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::PrimitiveError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = hex::decode(s.trim_start_matches("0x"))
                    .map_err(|_| crate::PrimitiveError::InvalidHex(s.to_string()))?;
                Self::try_from(bytes.as_slice())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(self.0))
            }
        }
    };
}

fixed_buf!(Buf32, 32);
fixed_buf!(Buf64, 64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_hex_string() {
        let buf = Buf32::from([7u8; 32]);
        let s = buf.to_string();
        let parsed: Buf32 = s.parse().expect("parse");
        assert_eq!(buf, parsed);
    }

    #[test]
    fn rejects_wrong_length() {
        let short = vec![0u8; 10];
        assert!(Buf32::try_from(short.as_slice()).is_err());
    }
}
