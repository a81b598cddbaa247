use sourcemap::{SourceMap, SourceMapBuilder};

use crate::lines_count;

/// Merge the maps of two module bodies that are being concatenated as
/// `first_body + "\n\n" + second_body`. Either input map may be absent.
/// Returns `None` when the merged map would carry no mappings at all, so
/// callers can drop it instead of emitting a useless map.
pub fn concat_source_maps(
  first_body: &str,
  first_map: Option<&str>,
  second_map: Option<&str>,
) -> anyhow::Result<Option<String>> {
  if first_map.is_none() && second_map.is_none() {
    return Ok(None);
  }

  // The separator ends the first body's last line and inserts one blank
  // line, so the second body starts two lines further down.
  let second_offset = lines_count(first_body) + 2;

  let mut builder = SourceMapBuilder::new(None);
  let mut mapped_any = false;

  let mut append = |raw: &str, line_offset: u32| -> anyhow::Result<()> {
    let map = SourceMap::from_slice(raw.as_bytes())?;
    for token in map.tokens() {
      let added = builder.add(
        token.get_dst_line() + line_offset,
        token.get_dst_col(),
        token.get_src_line(),
        token.get_src_col(),
        token.get_source(),
        token.get_name(),
        false,
      );
      if token.get_source().is_some() {
        builder.set_source_contents(added.src_id, map.get_source_contents(token.get_src_id()));
      }
      mapped_any = true;
    }
    Ok(())
  };

  if let Some(raw) = first_map {
    append(raw, 0)?;
  }
  if let Some(raw) = second_map {
    append(raw, second_offset)?;
  }

  if !mapped_any {
    return Ok(None);
  }

  let mut out = Vec::new();
  builder.into_sourcemap().to_writer(&mut out)?;
  Ok(Some(String::from_utf8(out)?))
}
