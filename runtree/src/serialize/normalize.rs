// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TRACE_TAG;
use crate::errors::ImportError;
use quick_xml::{
    Reader, Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};

/// Rewrites a session document into the form used to compare documents.
///
/// `time` attributes and `<trace>` elements are dropped, whitespace between elements is
/// discarded, elements left without content are collapsed and the document is re-indented. Two
/// documents describe the same run if their normalized forms are equal.
pub fn normalize_document(input: &str) -> Result<String, ImportError> {
    let mut reader = Reader::from_str(input);
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
    // Nesting depth inside a <trace> element being skipped.
    let mut skip_depth = 0usize;
    // Elements opened outside of a <trace> and not yet closed.
    let mut open = 0usize;
    // A start tag that hasn't been written yet, in case the element turns out to be empty.
    let mut pending: Option<BytesStart<'static>> = None;

    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    loop {
        let event = reader.read_event()?;
        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => return Err(truncated()),
                _ => {}
            }
            continue;
        }

        let out = match event {
            Event::Start(start) if start.name().as_ref() == TRACE_TAG.as_bytes() => {
                skip_depth = 1;
                continue;
            }
            Event::Empty(start) if start.name().as_ref() == TRACE_TAG.as_bytes() => continue,
            Event::Start(start) => {
                open += 1;
                Event::Start(without_time(&start)?)
            }
            Event::Empty(start) => Event::Empty(without_time(&start)?),
            Event::End(end) => {
                open = open.saturating_sub(1);
                Event::End(BytesEnd::new(
                    String::from_utf8_lossy(end.name().as_ref()).into_owned(),
                ))
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                if text.trim().is_empty() {
                    continue;
                }
                Event::Text(BytesText::new(&text).into_owned())
            }
            Event::CData(cdata) => Event::CData(cdata.into_owned()),
            Event::Eof if open > 0 => return Err(truncated()),
            Event::Eof => break,
            // The declaration is rewritten above; comments and the like are dropped.
            _ => continue,
        };

        match (pending.take(), out) {
            (Some(start), Event::End(_)) => write(&mut writer, Event::Empty(start))?,
            (pending_start, out) => {
                if let Some(start) = pending_start {
                    write(&mut writer, Event::Start(start))?;
                }
                match out {
                    Event::Start(start) => pending = Some(start),
                    out => write(&mut writer, out)?,
                }
            }
        }
    }

    writer.write_indent().map_err(quick_xml::Error::from)?;
    String::from_utf8(writer.into_inner())
        .map_err(|_| ImportError::malformed("document is not valid UTF-8"))
}

fn truncated() -> ImportError {
    ImportError::malformed("unexpected end of document")
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), ImportError> {
    writer.write_event(event).map_err(quick_xml::Error::from)?;
    Ok(())
}

fn without_time(start: &BytesStart<'_>) -> Result<BytesStart<'static>, ImportError> {
    let mut out = BytesStart::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == b"time" {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?;
        out.push_attribute((key.as_str(), value.as_ref()));
    }
    Ok(out)
}
