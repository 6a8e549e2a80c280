//! Text extraction for Word resumes.
//!
//! `.docx` is a zip package whose body lives in `word/document.xml`.
//! `.doc` is a compound file; its text is located through the piece table
//! (CLX) referenced from the File Information Block.

use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Upper bound on the decompressed document body read from a `.docx`.
const MAX_DOCUMENT_XML_BYTES: u64 = 64 * 1024 * 1024;

const WORD_MAGIC: u16 = 0xA5EC;
const FIB_FLAGS: usize = 0x0A;
const FIB_CCP_TEXT: usize = 0x4C;
const FIB_FC_CLX: usize = 0x01A2;
const FIB_LCB_CLX: usize = 0x01A6;
const FLAG_ENCRYPTED: u16 = 0x0100;
const FLAG_TABLE_1: u16 = 0x0200;
const FC_COMPRESSED: u32 = 0x4000_0000;

#[derive(Debug, Error)]
pub enum WordError {
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed document: {0}")]
    Format(&'static str),
}

/// Paragraphs become lines; tabs and breaks are kept.
pub fn docx_text(data: &[u8]) -> Result<String, WordError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;
    let body = archive.by_name("word/document.xml")?;
    if body.size() > MAX_DOCUMENT_XML_BYTES {
        return Err(WordError::Format("document body too large"));
    }
    let mut xml = String::new();
    body.take(MAX_DOCUMENT_XML_BYTES).read_to_string(&mut xml)?;

    let mut reader = Reader::from_str(&xml);
    let mut text = String::new();
    let mut in_run_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_run_text = true,
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_run_text = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" | b"w:cr" | b"w:p" => text.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_run_text => text.push_str(&t.unescape()?),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(text)
}

/// Reads the main document text of a Word 97-2003 file.
pub fn doc_text(data: &[u8]) -> Result<String, WordError> {
    let mut file = cfb::CompoundFile::open(Cursor::new(data))?;
    let word = read_stream(&mut file, "/WordDocument")?;

    if u16_at(&word, 0)? != WORD_MAGIC {
        return Err(WordError::Format("not a Word document"));
    }
    let flags = u16_at(&word, FIB_FLAGS)?;
    if flags & FLAG_ENCRYPTED != 0 {
        return Err(WordError::Format("document is encrypted"));
    }
    let table_name = if flags & FLAG_TABLE_1 != 0 {
        "/1Table"
    } else {
        "/0Table"
    };
    let table = read_stream(&mut file, table_name)?;

    let ccp_text = u32_at(&word, FIB_CCP_TEXT)? as usize;
    let fc_clx = u32_at(&word, FIB_FC_CLX)? as usize;
    let lcb_clx = u32_at(&word, FIB_LCB_CLX)? as usize;
    let clx = table
        .get(fc_clx..fc_clx.saturating_add(lcb_clx))
        .ok_or(WordError::Format("piece table out of range"))?;

    let pieces = piece_table(clx)?;
    let mut raw = String::new();
    let mut remaining = if ccp_text > 0 { ccp_text } else { usize::MAX };

    for piece in pieces {
        if remaining == 0 {
            break;
        }
        let chars = piece.chars.min(remaining);
        remaining -= chars;
        if piece.compressed {
            let bytes = word
                .get(piece.offset..piece.offset.saturating_add(chars))
                .ok_or(WordError::Format("text piece out of range"))?;
            raw.extend(bytes.iter().map(|&b| cp1252(b)));
        } else {
            let bytes = word
                .get(piece.offset..piece.offset.saturating_add(chars * 2))
                .ok_or(WordError::Format("text piece out of range"))?;
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            raw.push_str(&String::from_utf16_lossy(&units));
        }
    }

    Ok(strip_control_chars(&raw))
}

struct Piece {
    chars: usize,
    offset: usize,
    compressed: bool,
}

fn piece_table(clx: &[u8]) -> Result<Vec<Piece>, WordError> {
    let mut pos = 0;
    // Property modifiers (Prc) precede the piece table.
    while clx.get(pos) == Some(&0x01) {
        pos += 3 + u16_at(clx, pos + 1)? as usize;
    }
    if clx.get(pos) != Some(&0x02) {
        return Err(WordError::Format("missing piece table"));
    }
    let lcb = u32_at(clx, pos + 1)? as usize;
    let plc = clx
        .get(pos + 5..pos + 5 + lcb)
        .ok_or(WordError::Format("piece table truncated"))?;

    // (n + 1) character positions followed by n 8-byte piece descriptors.
    if lcb < 4 || (lcb - 4) % 12 != 0 {
        return Err(WordError::Format("piece table has a bad length"));
    }
    let count = (lcb - 4) / 12;
    let descriptors = (count + 1) * 4;

    (0..count)
        .map(|i| {
            let start = u32_at(plc, i * 4)?;
            let end = u32_at(plc, (i + 1) * 4)?;
            let fc = u32_at(plc, descriptors + i * 8 + 2)?;
            let compressed = fc & FC_COMPRESSED != 0;
            let fc = (fc & !FC_COMPRESSED) as usize;
            Ok(Piece {
                chars: end.saturating_sub(start) as usize,
                offset: if compressed { fc / 2 } else { fc },
                compressed,
            })
        })
        .collect()
}

fn read_stream(
    file: &mut cfb::CompoundFile<Cursor<&[u8]>>,
    path: &str,
) -> Result<Vec<u8>, WordError> {
    let mut stream = file.open_stream(path)?;
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf)?;
    Ok(buf)
}

fn u16_at(buf: &[u8], at: usize) -> Result<u16, WordError> {
    buf.get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(WordError::Format("header truncated"))
}

fn u32_at(buf: &[u8], at: usize) -> Result<u32, WordError> {
    buf.get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(WordError::Format("header truncated"))
}

/// Compressed pieces are Windows-1252; only the punctuation Word commonly
/// emits in 0x80..=0x9F is mapped, the rest decodes as Latin-1.
fn cp1252(b: u8) -> char {
    match b {
        0x85 => '…',
        0x91 => '‘',
        0x92 => '’',
        0x93 => '“',
        0x94 => '”',
        0x95 => '•',
        0x96 => '–',
        0x97 => '—',
        _ => char::from(b),
    }
}

/// Maps paragraph and cell marks to whitespace and drops field
/// instructions, keeping field results.
fn strip_control_chars(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    // One entry per open field: `true` while inside its instruction part.
    let mut fields: Vec<bool> = Vec::new();

    for c in raw.chars() {
        match c {
            '\u{13}' => fields.push(true),
            '\u{14}' => {
                if let Some(top) = fields.last_mut() {
                    *top = false;
                }
            }
            '\u{15}' => {
                fields.pop();
            }
            _ if fields.iter().any(|&instruction| instruction) => {}
            '\r' | '\u{b}' | '\u{c}' => out.push('\n'),
            '\u{7}' => out.push('\t'),
            '\n' | '\t' => out.push(c),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}
