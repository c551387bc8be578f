//! Small helpers shared across the protocol plugins.

use rand::Rng;

/// Generates a random lowercase hex string of exactly `n` characters.
pub fn random_hex(n: usize) -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..n).map(|_| HEX[rng.gen_range(0..16)] as char).collect()
}

/// Appends `:port` to `target` unless it already carries a port.
/// Bracketed IPv6 literals are respected.
pub fn with_default_port(target: &str, port: u16) -> String {
    if let Some(stripped) = target.strip_prefix('[') {
        // [::1] or [::1]:53
        if stripped.contains("]:") {
            return target.to_string();
        }
        return format!("{target}:{port}");
    }
    if target.contains(':') {
        return target.to_string();
    }
    format!("{target}:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_hex_has_the_requested_length() {
        for n in [0, 1, 7, 16] {
            let hex = random_hex(n);
            assert_eq!(hex.len(), n);
            assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn random_hex_values_differ() {
        assert_ne!(random_hex(16), random_hex(16));
    }

    #[test]
    fn with_default_port_leaves_existing_ports_alone() {
        assert_eq!(with_default_port("example.com", 53), "example.com:53");
        assert_eq!(with_default_port("example.com:5353", 53), "example.com:5353");
        assert_eq!(with_default_port("[::1]", 53), "[::1]:53");
        assert_eq!(with_default_port("[::1]:5353", 53), "[::1]:5353");
    }
}
