use std::fmt;
use std::io::{self, Read};
use std::path::Path;

use sha1::{Digest, Sha1};

pub const DIGEST_LEN: usize = 20;

/// SHA-1 digest of some content. The all-zero digest means "not computed
/// yet" and never compares equal to a real digest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentHash([u8; DIGEST_LEN]);

impl ContentHash {
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        ContentHash(hasher.finalize().into())
    }

    pub fn of_reader(r: &mut dyn Read) -> io::Result<Self> {
        let mut hasher = Sha1::new();
        let mut buf = [0u8; 16384];
        loop {
            let n = r.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(ContentHash(hasher.finalize().into()))
    }

    pub fn of_file(path: &Path) -> io::Result<Self> {
        let mut file = std::fs::File::open(path)?;
        ContentHash::of_reader(&mut file)
    }

    /// Parse a 40-character lowercase or uppercase hex digest.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != DIGEST_LEN * 2 {
            return None;
        }
        let mut raw = [0u8; DIGEST_LEN];
        for (i, byte) in raw.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(ContentHash(raw))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; DIGEST_LEN]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_known_vector() {
        // SHA-1("abc")
        let h = ContentHash::of(b"abc");
        assert_eq!(h.to_string(), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn reader_matches_slice() {
        let data = vec![0x42u8; 40000];
        let from_slice = ContentHash::of(&data);
        let from_reader = ContentHash::of_reader(&mut &data[..]).unwrap();
        assert_eq!(from_slice, from_reader);
    }

    #[test]
    fn hex_round_trips() {
        let h = ContentHash::of(b"round trip");
        assert_eq!(ContentHash::from_hex(&h.to_string()), Some(h));
        assert_eq!(ContentHash::from_hex("not hex"), None);
        assert_eq!(ContentHash::from_hex(""), None);
    }

    #[test]
    fn default_is_the_zero_sentinel() {
        let h = ContentHash::default();
        assert!(h.is_zero());
        assert_ne!(h, ContentHash::of(b""));
    }
}
