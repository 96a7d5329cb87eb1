//! MIME multipart boundary generation.
//!
//! Lifted nearly verbatim from `core/src/mime.rs`'s
//! `create_structured_random_boundary`: the boundary starts with `=_^`
//! (invalid in both base64 and quoted-printable, so it can never collide
//! with an encoded body by accident), followed by a hex counter and a
//! random tail of RFC 2046 `bchars`.

use rand::Rng;

const MULTIPART_BOUNDARY_MAX_LENGTH: usize = 66;

static BOUNDARY_CHARS: &[char] = &[
    '\'', '(', ')', '+', ',', '-', '.', '/', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', ':',
    '=', '?', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q',
    'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', '_', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

const ANTI_COLLISION_CHARS: &str = "=_^";

/// Generate a random multipart boundary, seeded by a monotonic counter so
/// two boundaries generated in the same process never collide even under a
/// weak RNG.
pub fn create_structured_random_boundary(count: usize) -> String {
    let mut out = format!("{ANTI_COLLISION_CHARS}{count:x}.");
    let rem = MULTIPART_BOUNDARY_MAX_LENGTH.saturating_sub(out.len());
    out.reserve(rem);

    let mut rng = rand::thread_rng();
    let len = BOUNDARY_CHARS.len();
    for _ in 0..rem {
        out.push(BOUNDARY_CHARS[rng.gen_range(0..len)]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_is_anti_collision_prefixed() {
        let boundary = create_structured_random_boundary(1);
        assert!(boundary.starts_with(ANTI_COLLISION_CHARS));
    }

    #[test]
    fn two_boundaries_with_different_counters_differ() {
        assert_ne!(create_structured_random_boundary(1), create_structured_random_boundary(2));
    }
}
