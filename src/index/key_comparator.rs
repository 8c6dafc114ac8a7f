use std::cmp::Ordering;

/// Total order over fixed-width serialized keys.
pub trait KeyComparator: Send + Sync {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Orders keys as little-endian signed integers of 1 to 8 bytes.
/// Keys of any other width fall back to bytewise order.
pub struct IntegerComparator;

impl IntegerComparator {
    /// Serializes `value` into a `width`-byte key, truncating high bytes.
    /// `width` is clamped to 1..=8.
    pub fn encode(value: i64, width: usize) -> Vec<u8> {
        let width = width.clamp(1, 8);
        value.to_le_bytes()[..width].to_vec()
    }

    /// Sign-extends a little-endian key to `i64`.
    pub fn decode(key: &[u8]) -> i64 {
        let negative = key.last().map_or(false, |&b| b & 0x80 != 0);
        let mut bytes = if negative { [0xff; 8] } else { [0; 8] };
        let len = key.len().min(8);
        bytes[..len].copy_from_slice(&key[..len]);
        i64::from_le_bytes(bytes)
    }
}

impl KeyComparator for IntegerComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let is_int = |k: &[u8]| (1..=8).contains(&k.len());
        if !is_int(a) || !is_int(b) {
            return a.cmp(b);
        }
        Self::decode(a).cmp(&Self::decode(b))
    }
}

/// Orders keys lexicographically by their raw bytes.
pub struct BytewiseComparator;

impl KeyComparator for BytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}
