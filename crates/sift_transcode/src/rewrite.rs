use sift_common::{CompileOptions, CompiledJs};

/// Rewrite `import`/`export` statements into `module.link`/`module.export`
/// calls. Line-oriented: one statement per line; statements the rewriter
/// does not understand pass through untouched, so line numbers survive.
pub fn compile(source: &str, options: &CompileOptions) -> anyhow::Result<CompiledJs> {
  let decl = if options.generate_let_declarations && !options.avoid_modern_syntax {
    "let"
  } else {
    "var"
  };

  let mut link_index = 0usize;
  let mut code = String::with_capacity(source.len() + 64);

  for line in source.split_inclusive('\n') {
    let (content, newline) =
      line.strip_suffix('\n').map_or((line, ""), |content| (content, "\n"));

    let rewritten = rewrite_statement(content, decl, options, &mut link_index)
      .unwrap_or_else(|| rewrite_dynamic_calls(content, options));

    code.push_str(&rewritten);
    code.push_str(newline);
  }

  Ok(CompiledJs { code })
}

fn rewrite_statement(
  content: &str,
  decl: &str,
  options: &CompileOptions,
  link_index: &mut usize,
) -> Option<String> {
  let indent_len = content.len() - content.trim_start().len();
  let (indent, trimmed) = content.split_at(indent_len);

  if let Some(rest) = trimmed.strip_prefix("import") {
    let rest = rest.trim_start();
    if rest.starts_with('(') {
      // Dynamic import expression, handled by rewrite_dynamic_calls.
      return None;
    }
    if rest.starts_with('"') || rest.starts_with('\'') {
      let specifier = leading_quoted(rest)?;
      return Some(format!("{indent}module.link({});", quote(&specifier)));
    }

    let (clause, specifier) = split_import_clause(rest)?;
    let bindings = parse_bindings(&clause)?;
    if bindings.is_empty() {
      return Some(format!("{indent}module.link({});", quote(&specifier)));
    }

    let locals: Vec<&str> = bindings.iter().map(|b| b.local.as_str()).collect();
    let setters: Vec<String> =
      bindings.iter().map(|b| setter(&b.imported, &b.local, options)).collect();
    let index = *link_index;
    *link_index += 1;
    return Some(format!(
      "{indent}{decl} {}; module.link({}, {{ {} }}, {index});",
      locals.join(", "),
      quote(&specifier),
      setters.join(", "),
    ));
  }

  if let Some(rest) = trimmed.strip_prefix("export") {
    let rest = rest.trim_start();

    if let Some(tail) = rest.strip_prefix('*') {
      let specifier = trailing_quoted(tail.trim_start().strip_prefix("from")?.trim_start())?;
      let index = *link_index;
      *link_index += 1;
      return Some(format!(
        "{indent}module.link({}, {{ \"*\": \"*\" }}, {index});",
        quote(&specifier)
      ));
    }

    if rest.starts_with('{') {
      let close = rest.find('}')?;
      let names = parse_name_list(&rest[1..close])?;
      let after = rest[close + 1..].trim_start();

      if let Some(from_tail) = after.strip_prefix("from") {
        let specifier = trailing_quoted(from_tail.trim_start())?;
        let pairs: Vec<String> = names
          .iter()
          .map(|b| format!("{}: {}", export_key(&b.imported), quote(&b.local)))
          .collect();
        let index = *link_index;
        *link_index += 1;
        return Some(format!(
          "{indent}module.link({}, {{ {} }}, {index});",
          quote(&specifier),
          pairs.join(", "),
        ));
      }

      // export { a, b as c };  (left side is the local, right the export)
      let getters: Vec<String> =
        names.iter().map(|b| getter(&b.imported, &b.local, options)).collect();
      return Some(format!("{indent}module.export({{ {} }});", getters.join(", ")));
    }

    if let Some(tail) = rest.strip_prefix("default") {
      let expr = tail.trim().strip_suffix(';')?;
      return Some(format!("{indent}module.exportDefault({});", expr.trim()));
    }

    // export const x = ...; / export function f(...) { / export class C {
    for keyword in ["const", "let", "var", "function", "class"] {
      if let Some(tail) = rest.strip_prefix(keyword) {
        if !tail.starts_with(char::is_whitespace) {
          continue;
        }
        let name: String = tail
          .trim_start()
          .chars()
          .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '$')
          .collect();
        if name.is_empty() {
          return None;
        }
        let getter = getter(&name, &name, options);
        return Some(format!("{indent}module.export({{ {getter} }}); {rest}"));
      }
    }

    return None;
  }

  None
}

struct Binding {
  imported: String,
  local: String,
}

/// Clause between `import` and the specifier, e.g. `X, { a as b }`.
fn split_import_clause(rest: &str) -> Option<(String, String)> {
  let from_at = rest.find("from")?;
  let clause = rest[..from_at].trim().trim_end_matches(',').trim();
  let specifier = trailing_quoted(rest[from_at + "from".len()..].trim_start())?;
  Some((clause.to_string(), specifier))
}

fn parse_bindings(clause: &str) -> Option<Vec<Binding>> {
  let mut bindings = Vec::new();
  let mut rest = clause.trim();

  if rest.is_empty() {
    return Some(bindings);
  }

  if !rest.starts_with('{') && !rest.starts_with('*') {
    // Default binding, optionally followed by named/namespace imports.
    let name: String = rest
      .chars()
      .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '$')
      .collect();
    if name.is_empty() {
      return None;
    }
    bindings.push(Binding { imported: "default".into(), local: name.clone() });
    rest = rest[name.len()..].trim_start().trim_start_matches(',').trim_start();
  }

  if let Some(tail) = rest.strip_prefix('*') {
    let local = tail.trim_start().strip_prefix("as")?.trim();
    bindings.push(Binding { imported: "*".into(), local: local.to_string() });
  } else if let Some(tail) = rest.strip_prefix('{') {
    let close = tail.find('}')?;
    bindings.extend(parse_name_list(&tail[..close])?);
  } else if !rest.is_empty() {
    return None;
  }

  Some(bindings)
}

/// `a, b as c` inside an import or export brace list.
fn parse_name_list(inner: &str) -> Option<Vec<Binding>> {
  let mut out = Vec::new();
  for piece in inner.split(',') {
    let piece = piece.trim();
    if piece.is_empty() {
      continue;
    }
    match piece.split_once(" as ") {
      Some((imported, local)) => out.push(Binding {
        imported: imported.trim().to_string(),
        local: local.trim().to_string(),
      }),
      None => out.push(Binding { imported: piece.to_string(), local: piece.to_string() }),
    }
  }
  Some(out)
}

fn setter(imported: &str, local: &str, options: &CompileOptions) -> String {
  if options.avoid_modern_syntax {
    format!("{}: function (v) {{ {local} = v; }}", export_key(imported))
  } else {
    format!("{}(v) {{ {local} = v; }}", export_key(imported))
  }
}

fn getter(local: &str, exported: &str, options: &CompileOptions) -> String {
  if options.avoid_modern_syntax {
    format!("{}: function () {{ return {local}; }}", export_key(exported))
  } else {
    format!("{}() {{ return {local}; }}", export_key(exported))
  }
}

fn export_key(name: &str) -> String {
  let plain = !name.is_empty()
    && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
    && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
  if plain {
    name.to_string()
  } else {
    quote(name)
  }
}

fn quote(text: &str) -> String {
  serde_json::to_string(text).expect("strings always serialize")
}

fn leading_quoted(rest: &str) -> Option<String> {
  let mut chars = rest.chars();
  let open = chars.next()?;
  if open != '"' && open != '\'' {
    return None;
  }
  let end = rest[1..].find(open)?;
  Some(rest[1..1 + end].to_string())
}

fn trailing_quoted(rest: &str) -> Option<String> {
  leading_quoted(rest.trim_start())
}

/// `import(` expressions become `module.dynamicImport(` wherever they appear.
fn rewrite_dynamic_calls(content: &str, options: &CompileOptions) -> String {
  if !options.dynamic_import || !content.contains("import") {
    return content.to_string();
  }

  let bytes = content.as_bytes();
  let mut out = String::with_capacity(content.len());
  let mut i = 0;
  while i < bytes.len() {
    if content[i..].starts_with("import")
      && content[i + "import".len()..].trim_start().starts_with('(')
    {
      let preceded_by_ident = i > 0
        && (bytes[i - 1].is_ascii_alphanumeric()
          || bytes[i - 1] == b'_'
          || bytes[i - 1] == b'$'
          || bytes[i - 1] == b'.');
      if !preceded_by_ident {
        out.push_str("module.dynamicImport");
        i += "import".len();
        continue;
      }
    }
    out.push(content[i..].chars().next().expect("in bounds"));
    i += content[i..].chars().next().expect("in bounds").len_utf8();
  }
  out
}
