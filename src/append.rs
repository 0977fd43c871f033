//! Reading back the seam of a previous session so a file can be extended.
//!
//! Only files written by this library are accepted: the xref has exactly
//! one subsection, generations are zero, and the last metadata objects sit
//! in a known arrangement (… pages, anchor, catalog, info). The general
//! case of foreign PDFs is deliberately out of scope.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

use crate::error::{Error, Result};

/// Everything carried over from the previous session's trailer.
pub(crate) struct Seam {
    /// Cross-reference table of the existing file.
    pub xref: Vec<u64>,
    /// First `/ID` element, preserved verbatim in the new trailer.
    pub oid: String,
    /// Original `/CreationDate` body without the `D:` wrapper.
    pub ctime: String,
    /// Object number of the old catalog; new objects start here.
    pub root_obj: u32,
    /// The previous session's root `Pages` node.
    pub anchor_obj: u32,
    /// File offset of the anchor object.
    pub anchor_pos: u64,
    /// Anchor body up to and including the `/Count` value.
    pub anchor_prefix: String,
    /// Anchor body after the `/Count` value.
    pub anchor_suffix: String,
    /// Page count accumulated by all previous sessions.
    pub prev_count: u32,
}

/// Read the append seam. Returns `None` for an empty file, which callers
/// treat as a fresh one.
pub(crate) fn read_seam(file: &mut File) -> Result<Option<Seam>> {
    let end = file.seek(SeekFrom::End(0))?;
    if end == 0 {
        return Ok(None);
    }

    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(0))?;
    let mut line = String::new();
    read_text_line(&mut reader, &mut line)?;
    check_pdf_header(&line)?;

    // The file must end with startxref / <offset> / %%EOF.
    let tail_len = end.min(64);
    reader.seek(SeekFrom::Start(end - tail_len))?;
    let mut tail = Vec::with_capacity(tail_len as usize);
    reader.read_to_end(&mut tail)?;
    let xref_pos = find_startxref(&tail).ok_or(Error::NoAppend)?;
    if xref_pos <= 9 || xref_pos >= end {
        return Err(Error::NoAppend);
    }

    // Ingest the cross-reference table.
    reader.seek(SeekFrom::Start(xref_pos))?;
    let mut line = String::new();
    read_text_line(&mut reader, &mut line)?;
    if line != "xref\n" {
        return Err(Error::NoAppend);
    }
    read_text_line(&mut reader, &mut line)?;
    let (first, count) = parse_subsection(&line).ok_or(Error::NoAppend)?;
    // A file of ours has one subsection from object 0 with at least the
    // free list, a page tree, a catalog, and an info object.
    if first != 0 || count < 4 {
        return Err(Error::NoAppend);
    }
    let mut xref = Vec::with_capacity(count as usize - 1);
    for obj in 0..count {
        read_text_line(&mut reader, &mut line)?;
        let (offset, gen, kind) = parse_entry(&line).ok_or(Error::NoAppend)?;
        if obj == 0 {
            if kind != 'f' || gen != 65535 || offset != 0 {
                return Err(Error::NoAppend);
            }
            continue;
        }
        if kind != 'n' || gen != 0 || offset == 0 {
            return Err(Error::NoAppend);
        }
        xref.push(offset);
    }

    // Advance to the trailer dictionary and collect it.
    loop {
        if read_text_line(&mut reader, &mut line)? == 0 {
            return Err(Error::NoAppend);
        }
        if line == "trailer\n" {
            break;
        }
    }
    let mut trail = String::new();
    loop {
        if read_text_line(&mut reader, &mut line)? == 0 {
            return Err(Error::NoAppend);
        }
        if line == "startxref\n" {
            break;
        }
        trail.push_str(&line);
    }

    let oid = parse_first_id(&trail).ok_or(Error::NoAppend)?;
    let max_obj = xref.len() as u32;
    let info_obj = find_ref(&trail, "/Info", max_obj)?;
    let root_obj = find_ref(&trail, "/Root", max_obj)?;
    if root_obj >= info_obj {
        return Err(Error::NoAppend);
    }

    let mut objects = ObjectReader {
        reader,
        xref: &xref,
    };

    // The document information object proves provenance and supplies the
    // original creation date.
    let (_, info) = objects.read(info_obj)?;
    if !info.contains("/Producer (LPTPDF Version ") {
        return Err(Error::NotProduced);
    }
    let date = find_str(&info, "/CreationDate")?;
    let ctime = date
        .strip_prefix("(D:")
        .and_then(|d| d.strip_suffix(')'))
        .ok_or(Error::NoAppend)?
        .to_string();
    if ctime.is_empty() || ctime.len() > 28 {
        return Err(Error::NoAppend);
    }

    // The catalog's page tree root is the anchor for every prior session,
    // and our layout puts it immediately before the catalog.
    let (_, catalog) = objects.read(root_obj)?;
    if !catalog.contains("/Type /Catalog") {
        return Err(Error::NoAppend);
    }
    let anchor_obj = find_ref(&catalog, "/Pages", max_obj)?;
    if anchor_obj != root_obj - 1 {
        return Err(Error::NoAppend);
    }

    let (anchor_pos, anchor) = objects.read(anchor_obj)?;
    if !anchor.contains("/Type /Pages") || anchor.contains("/Parent") {
        return Err(Error::NoAppend);
    }
    let (prev_count, split) = find_int(&anchor, "/Count")?;

    Ok(Some(Seam {
        oid,
        ctime,
        root_obj,
        anchor_obj,
        anchor_pos,
        anchor_prefix: anchor[..split].to_string(),
        anchor_suffix: anchor[split..].to_string(),
        prev_count,
        xref,
    }))
}

/// Read one line as text. Binary content means the file is not one of
/// ours.
fn read_text_line(reader: &mut impl BufRead, line: &mut String) -> Result<usize> {
    let mut bytes = Vec::new();
    let n = reader.read_until(b'\n', &mut bytes)?;
    line.clear();
    line.push_str(std::str::from_utf8(&bytes).map_err(|_| Error::NoAppend)?);
    Ok(n)
}

pub(crate) fn check_pdf_header(line: &str) -> Result<()> {
    let rest = line.strip_prefix("%PDF-1.").ok_or(Error::NotPdf)?;
    let digits = rest.trim_end_matches('\n');
    if digits.is_empty()
        || !digits.bytes().all(|b| b.is_ascii_digit())
        || !rest.ends_with('\n')
    {
        return Err(Error::NoAppend);
    }
    Ok(())
}

/// Locate `startxref` in the file tail and return the offset it carries.
fn find_startxref(tail: &[u8]) -> Option<u64> {
    let text = std::str::from_utf8(tail).ok()?;
    let at = text.rfind("\nstartxref\n")?;
    let rest = &text[at + "\nstartxref\n".len()..];
    let digits_end = rest.find('\n')?;
    let digits = &rest[..digits_end];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !rest[digits_end..].starts_with("\n%%EOF\n") {
        return None;
    }
    digits.parse().ok()
}

fn parse_subsection(line: &str) -> Option<(u32, u32)> {
    let line = line.strip_suffix('\n')?;
    let (first, count) = line.split_once(' ')?;
    Some((first.parse().ok()?, count.parse().ok()?))
}

/// One 20-byte xref entry: ten offset digits, five generation digits, and
/// the in-use flag.
fn parse_entry(line: &str) -> Option<(u64, u32, char)> {
    let bytes = line.as_bytes();
    if bytes.len() < 18 || bytes[10] != b' ' || bytes[16] != b' ' {
        return None;
    }
    if !bytes[..10].iter().all(u8::is_ascii_digit) || !bytes[11..16].iter().all(u8::is_ascii_digit)
    {
        return None;
    }
    let offset = line[..10].parse().ok()?;
    let gen = line[11..16].parse().ok()?;
    Some((offset, gen, bytes[17] as char))
}

fn parse_first_id(trail: &str) -> Option<String> {
    let at = trail.find("/ID [")?;
    let rest = trail[at + 5..].trim_start_matches(' ');
    let hex = rest.strip_prefix('<')?;
    if hex.len() < 41 || hex.as_bytes()[40] != b'>' {
        return None;
    }
    Some(hex[..40].to_string())
}

/// Extract `name N 0 R`; the number must be a live object.
pub(crate) fn find_ref(buf: &str, name: &str, max_obj: u32) -> Result<u32> {
    let at = buf.find(name).ok_or(Error::NoAppend)?;
    let rest = &buf[at + name.len()..];
    let rest = rest.trim_start_matches(' ');
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let n: u32 = rest[..digits_end].parse().map_err(|_| Error::NoAppend)?;
    if n == 0 || n > max_obj || !rest[digits_end..].starts_with(" 0 R") {
        return Err(Error::NoAppend);
    }
    Ok(n)
}

/// Extract an integer value for `name`, returning the value and the byte
/// index just past its digits.
pub(crate) fn find_int(buf: &str, name: &str) -> Result<(u32, usize)> {
    let at = buf.find(name).ok_or(Error::NoAppend)?;
    let rest = &buf[at + name.len()..];
    let skipped = rest.len() - rest.trim_start_matches(' ').len();
    let rest = &rest[skipped..];
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let n: u32 = rest[..digits_end].parse().map_err(|_| Error::NoAppend)?;
    match rest[digits_end..].chars().next() {
        Some('\n') | Some(' ') | Some(']') => {}
        _ => return Err(Error::NoAppend),
    }
    Ok((n, at + name.len() + skipped + digits_end))
}

/// Extract a parenthesized string value for `name`, outer parens included.
/// Nested parens and backslash escapes follow PDF string syntax.
pub(crate) fn find_str(buf: &str, name: &str) -> Result<String> {
    let at = buf.find(name).ok_or(Error::NoAppend)?;
    let rest = buf[at + name.len()..].trim_start_matches(' ');
    if !rest.starts_with('(') {
        return Err(Error::NoAppend);
    }
    let bytes = rest.as_bytes();
    let mut depth = 1usize;
    let mut i = 1;
    while i < bytes.len() && depth > 0 {
        match bytes[i] {
            b'\\' => i += 1,
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ => {}
        }
        i += 1;
    }
    if depth > 0 {
        return Err(Error::NoAppend);
    }
    Ok(rest[..i].to_string())
}

struct ObjectReader<'a> {
    reader: BufReader<&'a mut File>,
    xref: &'a [u64],
}

impl ObjectReader<'_> {
    /// Read an object's body (between the `N 0 obj` and `endobj` lines).
    /// Returns the file offset of the object header.
    fn read(&mut self, obj: u32) -> Result<(u64, String)> {
        let pos = *self
            .xref
            .get(obj as usize - 1)
            .ok_or(Error::NoAppend)?;
        self.reader.seek(SeekFrom::Start(pos))?;
        let mut line = String::new();
        read_text_line(&mut self.reader, &mut line)?;
        if line != format!("{obj} 0 obj\n") {
            return Err(Error::NoAppend);
        }
        let mut body = String::new();
        loop {
            if read_text_line(&mut self.reader, &mut line)? == 0 {
                return Err(Error::NoAppend);
            }
            if line == "endobj\n" {
                return Ok((pos, body));
            }
            body.push_str(&line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startxref_is_found_in_a_conforming_tail() {
        let tail = b"endobj\n\nxref\n...\nstartxref\n12345\n%%EOF\n";
        assert_eq!(find_startxref(tail), Some(12345));
    }

    #[test]
    fn startxref_requires_the_eof_marker() {
        assert_eq!(find_startxref(b"\nstartxref\n123\n"), None);
        assert_eq!(find_startxref(b"\nstartxref\nabc\n%%EOF\n"), None);
        assert_eq!(find_startxref(b"no marker here"), None);
    }

    #[test]
    fn header_check_accepts_any_1_x_version() {
        assert!(check_pdf_header("%PDF-1.4\n").is_ok());
        assert!(check_pdf_header("%PDF-1.7\n").is_ok());
        assert!(matches!(
            check_pdf_header("%PDF-2.0\n"),
            Err(Error::NotPdf)
        ));
        assert!(matches!(
            check_pdf_header("%PDF-1.x\n"),
            Err(Error::NoAppend)
        ));
    }

    #[test]
    fn xref_entries_parse_exactly() {
        assert_eq!(parse_entry("0000000009 00000 n \n"), Some((9, 0, 'n')));
        assert_eq!(
            parse_entry("0000000000 65535 f \n"),
            Some((0, 65535, 'f'))
        );
        assert_eq!(parse_entry("000000009 00000 n \n"), None);
        assert_eq!(parse_entry("00000000xx 00000 n \n"), None);
    }

    #[test]
    fn references_and_integers_are_extracted() {
        let trail = " << /Root 6 0 R /Size 8 /Info 7 0 R /ID [<AB> <CD>] >>\n";
        assert_eq!(find_ref(trail, "/Root", 7).unwrap(), 6);
        assert_eq!(find_ref(trail, "/Info", 7).unwrap(), 7);
        assert!(find_ref(trail, "/Root", 5).is_err());
        assert!(find_ref(trail, "/Missing", 7).is_err());

        let pages = " << /Type /Pages /Kids [5 0 R] /Count 12 >>\n";
        let (count, split) = find_int(pages, "/Count").unwrap();
        assert_eq!(count, 12);
        assert_eq!(&pages[..split], " << /Type /Pages /Kids [5 0 R] /Count 12");
        assert_eq!(&pages[split..], " >>\n");
    }

    #[test]
    fn id_extraction_needs_forty_hex_digits() {
        let good = format!("/ID [<{}> <{}>]", "A".repeat(40), "B".repeat(40));
        assert_eq!(parse_first_id(&good).unwrap(), "A".repeat(40));
        assert_eq!(parse_first_id("/ID [<ABCD> <EF01>]"), None);
    }

    #[test]
    fn string_values_balance_parentheses() {
        let info = "<< /CreationDate (D:20130101120000) /Title (a (nested) one\\)) >>";
        assert_eq!(
            find_str(info, "/CreationDate").unwrap(),
            "(D:20130101120000)"
        );
        assert_eq!(
            find_str(info, "/Title").unwrap(),
            "(a (nested) one\\))"
        );
        assert!(find_str("<< /Title (open", "/Title").is_err());
    }
}
