use sift_common::{ExtractedImport, JsParseError};
use sift_utils::indexmap::FxIndexMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
  Ident(String),
  Str(String),
  Punct(char),
}

struct Lexer<'a> {
  bytes: &'a [u8],
  pos: usize,
}

impl<'a> Lexer<'a> {
  fn new(source: &'a str) -> Self {
    Self { bytes: source.as_bytes(), pos: 0 }
  }

  fn error(&self, at: usize, message: &str) -> JsParseError {
    let mut line = 1u32;
    let mut column = 1u32;
    for &b in &self.bytes[..at.min(self.bytes.len())] {
      if b == b'\n' {
        line += 1;
        column = 1;
      } else {
        column += 1;
      }
    }
    JsParseError { message: message.to_string(), line, column }
  }

  fn tokenize(mut self) -> Result<Vec<Tok>, JsParseError> {
    let mut tokens = Vec::new();
    while self.pos < self.bytes.len() {
      let start = self.pos;
      let b = self.bytes[self.pos];
      match b {
        b'/' if self.peek(1) == Some(b'/') => {
          while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
            self.pos += 1;
          }
        }
        b'/' if self.peek(1) == Some(b'*') => {
          self.pos += 2;
          loop {
            if self.pos + 1 >= self.bytes.len() {
              return Err(self.error(start, "unterminated block comment"));
            }
            if self.bytes[self.pos] == b'*' && self.bytes[self.pos + 1] == b'/' {
              self.pos += 2;
              break;
            }
            self.pos += 1;
          }
        }
        b'"' | b'\'' => {
          let text = self.string_literal(b)?;
          tokens.push(Tok::Str(text));
        }
        b'`' => {
          self.template_literal()?;
          // Template contents never carry import specifiers we can trust.
          tokens.push(Tok::Punct('`'));
        }
        _ if b.is_ascii_whitespace() => self.pos += 1,
        _ if is_ident_start(b) => {
          let from = self.pos;
          while self.pos < self.bytes.len() && is_ident_part(self.bytes[self.pos]) {
            self.pos += 1;
          }
          let text = std::str::from_utf8(&self.bytes[from..self.pos])
            .expect("identifier bytes are ascii")
            .to_string();
          tokens.push(Tok::Ident(text));
        }
        _ => {
          tokens.push(Tok::Punct(b as char));
          self.pos += 1;
        }
      }
    }
    Ok(tokens)
  }

  fn peek(&self, ahead: usize) -> Option<u8> {
    self.bytes.get(self.pos + ahead).copied()
  }

  fn string_literal(&mut self, quote: u8) -> Result<String, JsParseError> {
    let start = self.pos;
    self.pos += 1;
    let mut text = Vec::new();
    while self.pos < self.bytes.len() {
      let b = self.bytes[self.pos];
      match b {
        b'\\' => {
          if let Some(escaped) = self.peek(1) {
            if escaped != b'\n' {
              text.push(escaped);
            }
            self.pos += 2;
          } else {
            return Err(self.error(start, "unterminated string literal"));
          }
        }
        b'\n' => return Err(self.error(start, "unterminated string literal")),
        _ if b == quote => {
          self.pos += 1;
          return String::from_utf8(text)
            .map_err(|_| self.error(start, "invalid utf8 in string literal"));
        }
        _ => {
          text.push(b);
          self.pos += 1;
        }
      }
    }
    Err(self.error(start, "unterminated string literal"))
  }

  fn template_literal(&mut self) -> Result<(), JsParseError> {
    let start = self.pos;
    self.pos += 1;
    while self.pos < self.bytes.len() {
      match self.bytes[self.pos] {
        b'\\' => self.pos += 2,
        b'`' => {
          self.pos += 1;
          return Ok(());
        }
        b'$' if self.peek(1) == Some(b'{') => {
          self.pos += 2;
          self.template_expression(start)?;
        }
        _ => self.pos += 1,
      }
    }
    Err(self.error(start, "unterminated template literal"))
  }

  fn template_expression(&mut self, start: usize) -> Result<(), JsParseError> {
    let mut depth = 1u32;
    while self.pos < self.bytes.len() {
      match self.bytes[self.pos] {
        b'{' => {
          depth += 1;
          self.pos += 1;
        }
        b'}' => {
          depth -= 1;
          self.pos += 1;
          if depth == 0 {
            return Ok(());
          }
        }
        b'"' | b'\'' => {
          let quote = self.bytes[self.pos];
          self.string_literal(quote)?;
        }
        b'`' => self.template_literal()?,
        _ => self.pos += 1,
      }
    }
    Err(self.error(start, "unterminated template literal"))
  }
}

fn is_ident_start(b: u8) -> bool {
  b.is_ascii_alphabetic() || b == b'_' || b == b'$'
}

fn is_ident_part(b: u8) -> bool {
  is_ident_start(b) || b.is_ascii_digit()
}

fn record(out: &mut FxIndexMap<String, ExtractedImport>, specifier: &str, found: ExtractedImport) {
  match out.get_mut(specifier) {
    None => {
      out.insert(specifier.to_string(), found);
    }
    Some(existing) => {
      // A static occurrence outweighs a dynamic one, and one trustworthy
      // occurrence clears the spurious flag.
      existing.dynamic &= found.dynamic;
      existing.possibly_spurious &= found.possibly_spurious;
    }
  }
}

/// Every import specifier in `source` with its static/dynamic flavor. Works
/// over raw ECMAScript modules as well as already-compiled bodies using the
/// `module.link`/`module.dynamicImport` runtime calls.
pub fn find_imports(source: &str) -> Result<FxIndexMap<String, ExtractedImport>, JsParseError> {
  let tokens = Lexer::new(source).tokenize()?;
  let mut out = FxIndexMap::default();

  let ident = |i: usize, text: &str| matches!(tokens.get(i), Some(Tok::Ident(t)) if t == text);
  let punct = |i: usize, c: char| matches!(tokens.get(i), Some(Tok::Punct(p)) if *p == c);
  let string = |i: usize| match tokens.get(i) {
    Some(Tok::Str(s)) => Some(s.as_str()),
    _ => None,
  };

  let mut i = 0;
  while i < tokens.len() {
    // import("x")  /  module.dynamicImport("x")
    if (ident(i, "import") && punct(i + 1, '('))
      || (ident(i, "module") && punct(i + 1, '.') && ident(i + 2, "dynamicImport"))
    {
      let open = if ident(i, "import") { i + 1 } else { i + 3 };
      if punct(open, '(') {
        if let Some(spec) = string(open + 1) {
          record(&mut out, spec, ExtractedImport { dynamic: true, possibly_spurious: false });
        }
      }
      i = open + 1;
      continue;
    }

    // import "x";  /  import ... from "x";
    if ident(i, "import") && !punct(i.wrapping_sub(1), '.') {
      if let Some(spec) = string(i + 1) {
        record(&mut out, spec, ExtractedImport::default());
        i += 2;
        continue;
      }
      let mut j = i + 1;
      while j < tokens.len() && !punct(j, ';') {
        if ident(j, "from") {
          if let Some(spec) = string(j + 1) {
            record(&mut out, spec, ExtractedImport::default());
            break;
          }
        }
        j += 1;
      }
      i = j + 1;
      continue;
    }

    // export ... from "x";
    if ident(i, "export") {
      let mut j = i + 1;
      while j < tokens.len() && !punct(j, ';') && !ident(j, "export") && !ident(j, "import") {
        if ident(j, "from") {
          if let Some(spec) = string(j + 1) {
            record(&mut out, spec, ExtractedImport::default());
            break;
          }
        }
        j += 1;
      }
      i += 1;
      continue;
    }

    // module.link("x", ...)
    if ident(i, "module") && punct(i + 1, '.') && ident(i + 2, "link") && punct(i + 3, '(') {
      if let Some(spec) = string(i + 4) {
        record(&mut out, spec, ExtractedImport::default());
      }
      i += 5;
      continue;
    }

    // require("x") — CommonJS requires are often conditional, so a failed
    // resolution of one must not hard-error.
    if ident(i, "require") && !punct(i.wrapping_sub(1), '.') && punct(i + 1, '(') {
      if let (Some(spec), true) = (string(i + 2), punct(i + 3, ')')) {
        record(&mut out, spec, ExtractedImport { dynamic: false, possibly_spurious: true });
      }
      i += 2;
      continue;
    }

    i += 1;
  }

  Ok(out)
}

/// Speculative check for files with unknown extensions: tokenizes and
/// verifies delimiter balance. Binary content (NUL bytes) never qualifies.
pub fn scans_as_js(source: &str) -> bool {
  if source.contains('\0') {
    return false;
  }
  let Ok(tokens) = Lexer::new(source).tokenize() else {
    return false;
  };

  let mut stack = Vec::new();
  for token in &tokens {
    if let Tok::Punct(p) = token {
      match p {
        '(' | '[' | '{' => stack.push(*p),
        ')' => {
          if stack.pop() != Some('(') {
            return false;
          }
        }
        ']' => {
          if stack.pop() != Some('[') {
            return false;
          }
        }
        '}' => {
          if stack.pop() != Some('{') {
            return false;
          }
        }
        _ => {}
      }
    }
  }
  stack.is_empty()
}
