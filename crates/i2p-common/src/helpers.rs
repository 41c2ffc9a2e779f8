//! Common helper functions.

/// Performs a constant-time comparison of two byte strings.
/// Used when comparing key material received from a peer.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (lhs, rhs) in a.iter().zip(b.iter()) {
        diff |= lhs ^ rhs;
    }
    diff == 0
}

/// Short hex prefix of an identifier, for log fields.
pub fn short_hex(bytes: &[u8]) -> String {
    hex::encode(&bytes[..bytes.len().min(6)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq_identical() {
        assert!(constant_time_eq(b"static-key", b"static-key"));
        assert!(constant_time_eq(b"", b""));
        assert!(constant_time_eq(&[0u8; 32], &[0u8; 32]));
    }

    #[test]
    fn test_constant_time_eq_different() {
        assert!(!constant_time_eq(b"key123", b"key124"));
        let mut other = [7u8; 32];
        other[31] ^= 1;
        assert!(!constant_time_eq(&[7u8; 32], &other));
    }

    #[test]
    fn test_constant_time_eq_different_lengths() {
        assert!(!constant_time_eq(b"short", b"much_longer_string"));
        assert!(!constant_time_eq(b"a", b""));
    }

    #[test]
    fn test_short_hex() {
        assert_eq!(short_hex(&[0xab; 32]), "abababababab");
        assert_eq!(short_hex(&[0x01, 0x02]), "0102");
    }
}
