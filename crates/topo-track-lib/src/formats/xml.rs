//! Small helpers shared by the XML based formats

use crate::{Result, TrackError};
use encoding_rs::{Encoding, UTF_8};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use regex::bytes::Regex;
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

/// `encoding="..."` in a leading `<?xml ...?>` declaration
static DECLARED_ENCODING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*<\?xml[^>]*?\sencoding\s*=\s*["']([A-Za-z0-9._:-]+)["']"#)
        .expect("valid regex")
});

/// Read an XML document from disk as UTF-8 text
pub(crate) fn read_document(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    decode_document(&bytes).map_err(|reason| TrackError::malformed(path, reason))
}

/// Decode an XML document using its byte order mark, or failing that the
/// encoding named in its declaration; UTF-8 when neither is present
pub(crate) fn decode_document(bytes: &[u8]) -> std::result::Result<String, String> {
    let (encoding, body) = match Encoding::for_bom(bytes) {
        Some((encoding, bom_len)) => (encoding, &bytes[bom_len..]),
        None => (declared_encoding(bytes)?, bytes),
    };
    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .map(|text| text.into_owned())
        .ok_or_else(|| format!("not valid {} text", encoding.name()))
}

fn declared_encoding(bytes: &[u8]) -> std::result::Result<&'static Encoding, String> {
    let head = &bytes[..bytes.len().min(256)];
    let Some(label) = DECLARED_ENCODING_RE
        .captures(head)
        .and_then(|caps| caps.get(1))
    else {
        return Ok(UTF_8);
    };
    Encoding::for_label(label.as_bytes()).ok_or_else(|| {
        format!(
            "unknown encoding {:?}",
            String::from_utf8_lossy(label.as_bytes())
        )
    })
}

/// Read the text content of the element that `start` opened, up to its end tag
///
/// Character data, CDATA sections and entity references are concatenated;
/// nested elements are skipped but their text is kept.
pub(crate) fn read_text(reader: &mut Reader<&[u8]>, start: &BytesStart<'_>) -> Result<String> {
    let end_name = start.name().0.to_vec();
    let mut text = String::new();
    let mut depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Text(e) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::GeneralRef(e) => {
                if let Ok(Some(ch)) = e.resolve_char_ref() {
                    text.push(ch);
                } else {
                    match e.as_ref() {
                        b"amp" => text.push('&'),
                        b"lt" => text.push('<'),
                        b"gt" => text.push('>'),
                        b"quot" => text.push('"'),
                        b"apos" => text.push('\''),
                        _ => {}
                    }
                }
            }
            Event::Start(_) => depth += 1,
            Event::End(e) if depth == 0 && e.name().0 == end_name.as_slice() => break,
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(text)
}

/// Value of the attribute with the given local name, if present
pub(crate) fn attribute(start: &BytesStart<'_>, local_name: &[u8]) -> Result<Option<String>> {
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.local_name().as_ref() == local_name {
            return Ok(Some(String::from_utf8_lossy(&attr.value).into_owned()));
        }
    }
    Ok(None)
}

/// Whether an attribute with exactly this qualified name is present
pub(crate) fn has_attribute(start: &BytesStart<'_>, qualified_name: &[u8]) -> bool {
    start
        .attributes()
        .flatten()
        .any(|attr| attr.key.as_ref() == qualified_name)
}

/// Write `<name>text</name>`
pub(crate) fn write_text_element<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}
