//! Streaming multipart/related reader and writer.
//!
//! The reader hands out one [`Part`] at a time. A part borrows its reader, so
//! a part's content can only be read until the reader advances. Content is
//! streamed through a small lookahead window and never buffered as a whole.

use crate::error::{from_io, structure_io, Result, XopError};
use std::io::{self, BufRead, Read, Write};
use tracing::debug;

/// Header fields of a part, in the order they were read.
///
/// Lookups are case-insensitive; names and values are kept verbatim for
/// re-emission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFields {
    fields: Vec<(String, String)>,
}

impl HeaderFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of the first field named `name`, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace the first field named `name`, or append a new one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .fields
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(field) => field.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get("content-type")
    }

    pub fn content_id(&self) -> Option<&str> {
        self.get("content-id")
    }
}

/// Parse the `;`-separated parameters of a Content-Type value.
///
/// Names are lowercased. Values may be bare, double-quoted or single-quoted.
pub fn parse_parameters(content_type: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in content_type.chars() {
        match (quote, c) {
            (None, ';') => segments.push(std::mem::take(&mut current)),
            (None, '"') | (None, '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (Some(q), _) if c == q => {
                quote = None;
                current.push(c);
            }
            _ => current.push(c),
        }
    }
    segments.push(current);

    // the first segment is the media type itself
    for segment in segments.iter().skip(1) {
        let Some((name, value)) = segment.split_once('=') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            continue;
        }
        params.push((name, unquote(value.trim()).to_string()));
    }
    params
}

fn unquote(value: &str) -> &str {
    for q in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(q) && value.ends_with(q) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Extract the `boundary` parameter from an outer Content-Type value.
pub fn boundary_from_content_type(content_type: Option<&str>) -> Result<String> {
    content_type
        .map(parse_parameters)
        .unwrap_or_default()
        .into_iter()
        .find(|(name, value)| name == "boundary" && !value.is_empty())
        .map(|(_, value)| value)
        .ok_or_else(|| XopError::structure("no boundary found"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    Next,
    Terminal,
}

/// Result of testing the bytes at a line start against the delimiter line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineMatch {
    /// A delimiter line of the given kind, `usize` bytes long including its
    /// line break
    Delimiter(Delimiter, usize),
    NotDelimiter,
    /// More input is needed to decide
    Incomplete,
}

/// Where the content of the current part ends within the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyScan {
    /// `content` bytes are content, then a delimiter line ends at `end`
    Boundary {
        content: usize,
        end: usize,
        kind: Delimiter,
    },
    /// `content` bytes are content; the rest is undecided
    NeedMore { content: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    Preamble,
    Headers,
    Body,
    Done,
}

/// Largest slice taken from the inner reader per fill.
const CHUNK_SIZE: usize = 8 * 1024;

/// Forward-only reader over the parts of a multipart body.
pub struct MultipartReader<R> {
    inner: R,
    delimiter: Vec<u8>,
    state: ReaderState,
    line: Vec<u8>,
    /// Bytes taken from `inner` but not yet handed out
    window: Vec<u8>,
    /// Leading bytes of `window` already known to be content
    safe: usize,
    /// True when the start of `window` is the start of a line
    at_line_start: bool,
    eof: bool,
    parts_read: usize,
}

impl<R: BufRead> MultipartReader<R> {
    pub fn new(inner: R, boundary: &str) -> Self {
        let mut delimiter = b"--".to_vec();
        delimiter.extend_from_slice(boundary.as_bytes());
        Self {
            inner,
            delimiter,
            state: ReaderState::Preamble,
            line: Vec::new(),
            window: Vec::new(),
            safe: 0,
            at_line_start: true,
            eof: false,
            parts_read: 0,
        }
    }

    /// Build a reader from the outer Content-Type, failing when it carries
    /// no boundary.
    pub fn from_content_type(inner: R, content_type: Option<&str>) -> Result<Self> {
        let boundary = boundary_from_content_type(content_type)?;
        Ok(Self::new(inner, &boundary))
    }

    /// Number of parts handed out so far.
    pub fn parts_read(&self) -> usize {
        self.parts_read
    }

    /// Advance to the next part, skipping whatever is left of the current
    /// one. Returns `None` after the terminal delimiter.
    pub fn next_part(&mut self) -> Result<Option<Part<'_, R>>> {
        loop {
            match self.state {
                ReaderState::Done => return Ok(None),
                ReaderState::Headers => break,
                ReaderState::Preamble => self.skip_preamble()?,
                ReaderState::Body => self.drain_body()?,
            }
        }

        let headers = self.read_headers()?;
        self.state = ReaderState::Body;
        self.safe = 0;
        self.at_line_start = true;
        self.parts_read += 1;

        debug!(
            part = self.parts_read,
            content_type = ?headers.content_type(),
            "Reading multipart part"
        );

        let index = self.parts_read;
        Ok(Some(Part {
            index,
            headers,
            reader: self,
        }))
    }

    /// Move up to one chunk from `inner` into the window. Returns false at
    /// end of input.
    fn fill_window(&mut self) -> io::Result<bool> {
        if self.eof {
            return Ok(false);
        }
        let available = self.inner.fill_buf()?;
        if available.is_empty() {
            self.eof = true;
            return Ok(false);
        }
        let n = available.len().min(CHUNK_SIZE);
        self.window.extend_from_slice(&available[..n]);
        self.inner.consume(n);
        Ok(true)
    }

    /// Read one line, line break included, into `self.line`.
    fn read_line(&mut self) -> io::Result<usize> {
        self.line.clear();
        loop {
            if let Some(pos) = self.window.iter().position(|&b| b == b'\n') {
                self.line.extend(self.window.drain(..=pos));
                return Ok(self.line.len());
            }
            self.line.append(&mut self.window);
            if !self.fill_window()? {
                return Ok(self.line.len());
            }
        }
    }

    /// Test `line`, which starts at a line start, against the delimiter.
    /// Transport padding after the delimiter is allowed.
    fn match_delimiter(&self, line: &[u8], eof: bool) -> LineMatch {
        let delimiter = self.delimiter.as_slice();
        let n = delimiter.len().min(line.len());
        if line[..n] != delimiter[..n] {
            return LineMatch::NotDelimiter;
        }
        if line.len() < delimiter.len() {
            return if eof {
                LineMatch::NotDelimiter
            } else {
                LineMatch::Incomplete
            };
        }

        let mut len = delimiter.len();
        let mut kind = Delimiter::Next;
        match &line[len..] {
            [b'-', b'-', ..] => {
                kind = Delimiter::Terminal;
                len += 2;
            }
            [b'-'] if !eof => return LineMatch::Incomplete,
            _ => {}
        }

        loop {
            match &line[len..] {
                [] if eof => return LineMatch::Delimiter(kind, len),
                [] => return LineMatch::Incomplete,
                [b' ' | b'\t', ..] => len += 1,
                [b'\n', ..] => return LineMatch::Delimiter(kind, len + 1),
                [b'\r', b'\n', ..] => return LineMatch::Delimiter(kind, len + 2),
                [b'\r'] if !eof => return LineMatch::Incomplete,
                _ => return LineMatch::NotDelimiter,
            }
        }
    }

    /// Find how much of the window is content. The line break before a
    /// delimiter belongs to the delimiter, so it is never content, and a
    /// trailing `\r` is held back until the next byte is known.
    fn scan_body(&self) -> BodyScan {
        let w = self.window.as_slice();

        if self.at_line_start {
            match self.match_delimiter(w, self.eof) {
                LineMatch::Delimiter(kind, len) => {
                    return BodyScan::Boundary {
                        content: 0,
                        end: len,
                        kind,
                    }
                }
                LineMatch::Incomplete => return BodyScan::NeedMore { content: 0 },
                LineMatch::NotDelimiter => {}
            }
        }

        for (i, _) in w.iter().enumerate().filter(|&(_, &b)| b == b'\n') {
            let line_start = i + 1;
            let eol_start = if i > 0 && w[i - 1] == b'\r' { i - 1 } else { i };
            match self.match_delimiter(&w[line_start..], self.eof) {
                LineMatch::Delimiter(kind, len) => {
                    return BodyScan::Boundary {
                        content: eol_start,
                        end: line_start + len,
                        kind,
                    }
                }
                LineMatch::Incomplete => return BodyScan::NeedMore { content: eol_start },
                LineMatch::NotDelimiter => {}
            }
        }

        let content = match w.last() {
            Some(b'\r') if !self.eof => w.len() - 1,
            _ => w.len(),
        };
        BodyScan::NeedMore { content }
    }

    fn skip_preamble(&mut self) -> Result<()> {
        loop {
            if self.read_line()? == 0 {
                return Err(XopError::structure(
                    "no multipart boundary delimiter found",
                ));
            }
            match self.match_delimiter(&self.line, true) {
                LineMatch::Delimiter(Delimiter::Next, _) => {
                    self.state = ReaderState::Headers;
                    return Ok(());
                }
                LineMatch::Delimiter(Delimiter::Terminal, _) => {
                    self.state = ReaderState::Done;
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    fn drain_body(&mut self) -> Result<()> {
        let mut sink = [0u8; 8192];
        while self.read_body(&mut sink).map_err(from_io)? > 0 {}
        Ok(())
    }

    fn read_headers(&mut self) -> Result<HeaderFields> {
        let mut headers = HeaderFields::new();
        let part = self.parts_read + 1;
        loop {
            if self.read_line()? == 0 {
                return Err(XopError::structure(format!(
                    "unexpected end of input in headers of part #{}",
                    part
                )));
            }
            let (content, _) = split_eol(&self.line);
            if content.is_empty() {
                return Ok(headers);
            }
            let text = String::from_utf8_lossy(content);

            if text.starts_with(' ') || text.starts_with('\t') {
                if let Some(last) = headers.fields.last_mut() {
                    last.1.push(' ');
                    last.1.push_str(text.trim());
                    continue;
                }
            }

            let (name, value) = text.split_once(':').ok_or_else(|| {
                XopError::structure(format!("malformed header line in part #{}", part))
            })?;
            headers.append(name.trim(), value.trim());
        }
    }

    fn read_body(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.state != ReaderState::Body {
            return Ok(0);
        }
        loop {
            if self.safe > 0 {
                let n = self.safe.min(buf.len());
                buf[..n].copy_from_slice(&self.window[..n]);
                self.window.drain(..n);
                self.safe -= n;
                self.at_line_start = buf[n - 1] == b'\n';
                return Ok(n);
            }

            match self.scan_body() {
                BodyScan::Boundary { content: 0, end, kind } => {
                    self.window.drain(..end);
                    self.state = match kind {
                        Delimiter::Next => ReaderState::Headers,
                        Delimiter::Terminal => ReaderState::Done,
                    };
                    return Ok(0);
                }
                BodyScan::Boundary { content, .. } => self.safe = content,
                BodyScan::NeedMore { content: 0 } => {
                    if self.eof {
                        return Err(structure_io("no terminal boundary found"));
                    }
                    self.fill_window()?;
                }
                BodyScan::NeedMore { content } => self.safe = content,
            }
        }
    }
}

/// One part of a multipart body: header fields plus a content stream.
pub struct Part<'a, R> {
    index: usize,
    headers: HeaderFields,
    reader: &'a mut MultipartReader<R>,
}

impl<R: BufRead> Part<'_, R> {
    /// 1-based position of this part in the envelope.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn headers(&self) -> &HeaderFields {
        &self.headers
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.content_type()
    }

    pub fn content_id(&self) -> Option<&str> {
        self.headers.content_id()
    }

    /// Read the rest of this part's content into memory.
    pub fn read_to_vec(&mut self) -> Result<Vec<u8>> {
        let mut content = Vec::new();
        self.read_to_end(&mut content).map_err(from_io)?;
        Ok(content)
    }
}

impl<R: BufRead> Read for Part<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read_body(buf)
    }
}

fn split_eol(line: &[u8]) -> (&[u8], &[u8]) {
    if line.ends_with(b"\r\n") {
        line.split_at(line.len() - 2)
    } else if line.ends_with(b"\n") {
        line.split_at(line.len() - 1)
    } else {
        (line, &[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Idle,
    InPart,
    Closed,
}

/// Writer for a new multipart body, one part at a time.
///
/// Content of the current part is written through [`Write`].
pub struct MultipartWriter<W: Write> {
    inner: W,
    content_type: String,
    delimiter: Vec<u8>,
    state: WriterState,
    parts_written: usize,
}

impl<W: Write> MultipartWriter<W> {
    pub fn new(inner: W, content_type: impl Into<String>, boundary: &str) -> Self {
        let mut delimiter = b"--".to_vec();
        delimiter.extend_from_slice(boundary.as_bytes());
        Self {
            inner,
            content_type: content_type.into(),
            delimiter,
            state: WriterState::Idle,
            parts_written: 0,
        }
    }

    /// Outer Content-Type of the envelope being written.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn parts_written(&self) -> usize {
        self.parts_written
    }

    /// Start a new part with the given header fields, written verbatim.
    pub fn start_part(&mut self, headers: &HeaderFields) -> Result<()> {
        if self.state == WriterState::Closed {
            return Err(XopError::structure(
                "cannot start a part in a closed multipart envelope",
            ));
        }
        if self.parts_written > 0 {
            self.inner.write_all(b"\r\n")?;
        }
        self.inner.write_all(&self.delimiter)?;
        self.inner.write_all(b"\r\n")?;
        for (name, value) in headers.iter() {
            self.inner.write_all(name.as_bytes())?;
            self.inner.write_all(b": ")?;
            self.inner.write_all(value.as_bytes())?;
            self.inner.write_all(b"\r\n")?;
        }
        self.inner.write_all(b"\r\n")?;
        self.state = WriterState::InPart;
        self.parts_written += 1;
        Ok(())
    }

    /// Write the terminal delimiter.
    pub fn close(&mut self) -> Result<()> {
        if self.state == WriterState::Closed {
            return Err(XopError::structure("multipart envelope already closed"));
        }
        if self.parts_written > 0 {
            self.inner.write_all(b"\r\n")?;
        }
        self.inner.write_all(&self.delimiter)?;
        self.inner.write_all(b"--\r\n")?;
        self.inner.flush()?;
        self.state = WriterState::Closed;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for MultipartWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.state {
            WriterState::InPart => self.inner.write(buf),
            WriterState::Idle => Err(structure_io("no multipart part has been started")),
            WriterState::Closed => Err(structure_io(
                "cannot write to a closed multipart envelope",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const LF_MESSAGE: &str = "--MIME_boundary\n\
Content-Type: application/soap+xml; charset=UTF-8\n\
Content-ID: <rootpart@soapui.org>\n\
\n\
<a>text</a>\n\
\n\
--MIME_boundary\n\
Content-Type: application/zip\n\
Content-ID: <0b83cd6b>\n\
\n\
...binary zip data...\n\
\n\
--MIME_boundary--\n\
\n";

    fn headers(fields: &[(&str, &str)]) -> HeaderFields {
        let mut h = HeaderFields::new();
        for (n, v) in fields {
            h.append(*n, *v);
        }
        h
    }

    #[test]
    fn test_boundary_with_single_quoted_params() {
        let ct = "Multipart/Related; boundary=MIME_boundary; type='application/soap+xml'; start='<rootpart@soapui.org>'";
        assert_eq!(boundary_from_content_type(Some(ct)).unwrap(), "MIME_boundary");
        let params = parse_parameters(ct);
        assert!(params.contains(&("type".to_string(), "application/soap+xml".to_string())));
        assert!(params.contains(&("start".to_string(), "<rootpart@soapui.org>".to_string())));
    }

    #[test]
    fn test_boundary_quoted_with_semicolon() {
        let ct = r#"multipart/related; boundary="uuid;1234"; type="application/xop+xml""#;
        assert_eq!(boundary_from_content_type(Some(ct)).unwrap(), "uuid;1234");
    }

    #[test]
    fn test_missing_boundary() {
        let err = boundary_from_content_type(Some("multipart/related; type=text/xml")).unwrap_err();
        assert_eq!(err.to_string(), "no boundary found");
        assert!(boundary_from_content_type(None).is_err());
    }

    #[test]
    fn test_read_lf_message() {
        let mut reader = MultipartReader::new(Cursor::new(LF_MESSAGE.as_bytes()), "MIME_boundary");

        let mut part1 = reader.next_part().unwrap().unwrap();
        assert_eq!(part1.index(), 1);
        assert_eq!(part1.content_type(), Some("application/soap+xml; charset=UTF-8"));
        assert_eq!(part1.headers().get("CONTENT-ID"), Some("<rootpart@soapui.org>"));
        assert_eq!(part1.read_to_vec().unwrap(), b"<a>text</a>\n");

        let mut part2 = reader.next_part().unwrap().unwrap();
        assert_eq!(part2.index(), 2);
        assert_eq!(part2.content_id(), Some("<0b83cd6b>"));
        assert_eq!(part2.read_to_vec().unwrap(), b"...binary zip data...\n");

        assert!(reader.next_part().unwrap().is_none());
        assert!(reader.next_part().unwrap().is_none());
        assert_eq!(reader.parts_read(), 2);
    }

    #[test]
    fn test_unread_part_is_skipped() {
        let mut reader = MultipartReader::new(Cursor::new(LF_MESSAGE.as_bytes()), "MIME_boundary");
        reader.next_part().unwrap().unwrap();
        let mut part2 = reader.next_part().unwrap().unwrap();
        assert_eq!(part2.read_to_vec().unwrap(), b"...binary zip data...\n");
    }

    #[test]
    fn test_preamble_and_padding() {
        let body = "This is a preamble.\r\n--b  \r\nContent-Type: text/plain\r\n\r\nhello\r\n--b--\r\nepilogue";
        let mut reader = MultipartReader::new(Cursor::new(body.as_bytes()), "b");
        let mut part = reader.next_part().unwrap().unwrap();
        assert_eq!(part.read_to_vec().unwrap(), b"hello");
        assert!(reader.next_part().unwrap().is_none());
    }

    #[test]
    fn test_similar_line_is_content() {
        let body = "--b\r\n\r\n--bx\r\n--b --\r\n--b--\r\n";
        let mut reader = MultipartReader::new(Cursor::new(body.as_bytes()), "b");
        let mut part = reader.next_part().unwrap().unwrap();
        assert!(part.headers().is_empty());
        assert_eq!(part.read_to_vec().unwrap(), b"--bx\r\n--b --");
    }

    #[test]
    fn test_missing_terminal_boundary() {
        let body = "--b\r\nContent-Type: text/plain\r\n\r\nhello\r\n";
        let mut reader = MultipartReader::new(Cursor::new(body.as_bytes()), "b");
        let mut part = reader.next_part().unwrap().unwrap();
        let err = part.read_to_vec().unwrap_err();
        assert!(err.is_structural());
        assert_eq!(err.to_string(), "no terminal boundary found");
    }

    #[test]
    fn test_long_line_is_streamed() {
        let size = 4 * 1024 * 1024;
        let mut body = b"--b\r\nContent-Type: application/octet-stream\r\n\r\n".to_vec();
        body.resize(body.len() + size, b'A');
        body.extend_from_slice(b"\r\n--b--\r\n");

        let mut reader = MultipartReader::new(Cursor::new(body), "b");
        let mut part = reader.next_part().unwrap().unwrap();
        let mut byte = [0u8; 1];
        assert_eq!(part.read(&mut byte).unwrap(), 1);
        assert_eq!(byte[0], b'A');
        assert!(part.reader.window.capacity() <= 2 * CHUNK_SIZE);
        assert!(part.reader.line.capacity() <= 2 * CHUNK_SIZE);

        let rest = io::copy(&mut part, &mut io::sink()).unwrap();
        assert_eq!(rest as usize, size - 1);
        assert!(reader.window.capacity() <= 2 * CHUNK_SIZE);
        assert!(reader.next_part().unwrap().is_none());
    }

    #[test]
    fn test_byte_at_a_time() {
        let body = "--b\r\n\r\na\rb\r\n--\r\n--b-x\r\n\r\n--b\r\n\r\nz\r\n--b--";
        let inner = io::BufReader::with_capacity(1, Cursor::new(body.as_bytes()));
        let mut reader = MultipartReader::new(inner, "b");

        let mut part = reader.next_part().unwrap().unwrap();
        let mut content = Vec::new();
        let mut byte = [0u8; 1];
        while part.read(&mut byte).unwrap() == 1 {
            content.push(byte[0]);
        }
        assert_eq!(content, b"a\rb\r\n--\r\n--b-x\r\n");

        let mut part = reader.next_part().unwrap().unwrap();
        assert_eq!(part.read_to_vec().unwrap(), b"z");
        assert!(reader.next_part().unwrap().is_none());
    }

    #[test]
    fn test_no_delimiter_at_all() {
        let mut reader = MultipartReader::new(Cursor::new(b"just text".as_slice()), "b");
        assert!(reader.next_part().is_err());
    }

    #[test]
    fn test_folded_header() {
        let body = "--b\r\nContent-Type: application/xop+xml;\r\n\tcharset=UTF-8\r\n\r\nx\r\n--b--\r\n";
        let mut reader = MultipartReader::new(Cursor::new(body.as_bytes()), "b");
        let part = reader.next_part().unwrap().unwrap();
        assert_eq!(part.content_type(), Some("application/xop+xml; charset=UTF-8"));
    }

    #[test]
    fn test_round_trip() {
        let binary: Vec<u8> = (0u8..=255).cycle().take(5000).collect();
        let parts = vec![
            (
                headers(&[("Content-Type", "text/xml"), ("Content-ID", "<root>")]),
                b"<r/>\n".to_vec(),
            ),
            (
                headers(&[("content-type", "application/octet-stream"), ("X-Custom", "a:b")]),
                binary,
            ),
            (HeaderFields::new(), Vec::new()),
            (headers(&[("Content-Type", "text/plain")]), b"\r\n\r\nline\n".to_vec()),
        ];

        let mut writer = MultipartWriter::new(Vec::new(), "multipart/related; boundary=xyz", "xyz");
        for (h, content) in &parts {
            writer.start_part(h).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.close().unwrap();
        let out = writer.into_inner();

        let mut reader = MultipartReader::new(Cursor::new(out), "xyz");
        for (h, content) in &parts {
            let mut part = reader.next_part().unwrap().unwrap();
            assert_eq!(part.headers(), h);
            assert_eq!(&part.read_to_vec().unwrap(), content);
        }
        assert!(reader.next_part().unwrap().is_none());
    }

    #[test]
    fn test_write_after_close_fails() {
        let mut writer = MultipartWriter::new(Vec::new(), "multipart/related; boundary=b", "b");
        writer.start_part(&HeaderFields::new()).unwrap();
        writer.close().unwrap();
        assert!(writer.write_all(b"late").is_err());
        assert!(writer.start_part(&HeaderFields::new()).is_err());
        assert!(writer.close().is_err());
    }

    #[test]
    fn test_write_before_part_fails() {
        let mut writer = MultipartWriter::new(Vec::new(), "multipart/related; boundary=b", "b");
        assert!(writer.write_all(b"early").is_err());
    }

    #[test]
    fn test_header_set_replaces() {
        let mut h = headers(&[("Content-Type", "a"), ("Content-ID", "<x>")]);
        h.set("content-type", "b");
        assert_eq!(h.len(), 2);
        assert_eq!(h.iter().next(), Some(("Content-Type", "b")));
        h.set("X-New", "c");
        assert_eq!(h.get("x-new"), Some("c"));
    }
}
