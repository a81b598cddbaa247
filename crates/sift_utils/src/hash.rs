use sha1::{Digest, Sha1};

/// Content digest used for module bodies and cache keys.
pub fn sha1_hex(data: &[u8]) -> String {
  hex::encode(Sha1::digest(data))
}

#[test]
fn test_sha1_hex() {
  assert_eq!(sha1_hex(b"hello"), "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
  assert_eq!(sha1_hex(b""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
}
