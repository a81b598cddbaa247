/// Number of newlines in `str`.
#[inline]
pub fn lines_count(str: &str) -> u32 {
  u32::try_from(memchr::memchr_iter(b'\n', str.as_bytes()).count()).unwrap()
}

#[test]
fn test_lines_count() {
  assert_eq!(lines_count("a\nb\nc"), 2);
  assert_eq!(lines_count("a\nb\nc\n"), 3);
  assert_eq!(lines_count("a"), 0);
  assert_eq!(lines_count(""), 0);
}
