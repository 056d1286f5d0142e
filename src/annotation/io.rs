use std::collections::HashMap;
use std::fmt;
use std::io::BufRead;

use crate::types::{RefBlock, Strand};

/// Attribute column syntax. GFF3 writes `key=value`, GTF writes
/// `key "value";`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Gff3,
    Gtf,
    Unknown,
}

impl Dialect {
    /// Decide from the first attribute pair: `key=value` is GFF3, a quoted
    /// `key "value"` is GTF. Later pairs may carry `=` inside GTF values.
    fn sniff(first_pair: &str) -> Self {
        let eq = first_pair.find('=');
        let sep = first_pair.find(|c: char| c.is_whitespace() || c == '"');
        match (eq, sep) {
            (Some(e), Some(w)) if e < w => Dialect::Gff3,
            (Some(_), None) => Dialect::Gff3,
            _ if first_pair.contains('"') => Dialect::Gtf,
            _ => Dialect::Unknown,
        }
    }

    fn split_pair(self, part: &str) -> Option<(&str, &str)> {
        match self {
            Dialect::Gff3 => part.split_once('='),
            Dialect::Gtf => part.split_once(char::is_whitespace),
            Dialect::Unknown => {
                let at = part.find(|c: char| c == '=' || c.is_whitespace())?;
                Some((&part[..at], &part[at + 1..]))
            }
        }
    }
}

/// One feature line. `span` is already 0-based half-open.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRecord {
    pub line_no: usize,
    pub seqname: String,
    pub feature_type: String,
    pub span: RefBlock,
    pub strand: Strand,
    pub attrs: HashMap<String, String>,
    pub dialect: Dialect,
}

impl AnnotationRecord {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// Value of the first key in `keys` that is present and non-blank.
    pub fn pick_first_attr(&self, keys: &[String]) -> Option<String> {
        keys.iter()
            .filter_map(|k| self.attr(k))
            .map(str::trim)
            .find(|v| !v.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug)]
pub enum ParseError {
    Io { line_no: usize, source: std::io::Error },
    MalformedLine { line_no: usize, problem: String, line: String },
    BadCoordinates { line_no: usize, line: String },
}

impl ParseError {
    pub fn line_no(&self) -> usize {
        match self {
            ParseError::Io { line_no, .. }
            | ParseError::MalformedLine { line_no, .. }
            | ParseError::BadCoordinates { line_no, .. } => *line_no,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Io { line_no, source } => {
                write!(f, "read error after annotation line {}: {}", line_no, source)
            }
            ParseError::MalformedLine { line_no, problem, line } => {
                write!(f, "annotation line {}: {}: {:?}", line_no, problem, line)
            }
            ParseError::BadCoordinates { line_no, line } => {
                write!(f, "annotation line {}: start/end are not a valid 1-based range: {:?}", line_no, line)
            }
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Line-by-line GTF/GFF3 reader. Blank lines and `#` lines (comments,
/// `##gff-version` pragmas) are skipped; line numbers count every line.
///
/// ```no_run
/// use std::fs::File;
/// use std::io::BufReader;
/// use gtf_tx_mapper::annotation::AnnotationReader;
///
/// let rdr = AnnotationReader::new(BufReader::new(File::open("genes.gtf")?));
/// let n_exons = rdr
///     .records()
///     .filter(|r| matches!(r, Ok(rec) if rec.feature_type == "exon"))
///     .count();
/// println!("{n_exons} exons");
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct AnnotationReader<R: BufRead> {
    reader: R,
    buf: String,
    line_no: usize,
}

impl<R: BufRead> AnnotationReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
            line_no: 0,
        }
    }

    pub fn records(self) -> Records<R> {
        Records { inner: self, done: false }
    }

    fn next_record(&mut self) -> Option<Result<AnnotationRecord, ParseError>> {
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => self.line_no += 1,
                Err(source) => {
                    return Some(Err(ParseError::Io {
                        line_no: self.line_no,
                        source,
                    }))
                }
            }

            let line = self.buf.trim_end_matches(['\n', '\r']);
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            return Some(parse_record_line(line, self.line_no));
        }
    }
}

/// Iterator returned by [`AnnotationReader::records`]. Stops after the
/// first read error.
pub struct Records<R: BufRead> {
    inner: AnnotationReader<R>,
    done: bool,
}

impl<R: BufRead> Iterator for Records<R> {
    type Item = Result<AnnotationRecord, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.inner.next_record();
        if matches!(item, Some(Err(ParseError::Io { .. }))) {
            self.done = true;
        }
        item
    }
}

/// Parse one feature line: seqname, source, type, start, end, score,
/// strand, phase, attributes.
pub fn parse_record_line(line: &str, line_no: usize) -> Result<AnnotationRecord, ParseError> {
    let malformed = |problem: String| ParseError::MalformedLine {
        line_no,
        problem,
        line: line.to_string(),
    };
    let bad_coords = || ParseError::BadCoordinates {
        line_no,
        line: line.to_string(),
    };

    let cols: Vec<&str> = line.split('\t').collect();
    let &[seqname, _source, feature_type, start, end, _score, strand, _phase, attrs] = cols.as_slice() else {
        return Err(malformed(format!("expected 9 tab-separated columns, found {}", cols.len())));
    };

    let start: u32 = start.trim().parse().map_err(|_| bad_coords())?;
    let end: u32 = end.trim().parse().map_err(|_| bad_coords())?;
    let span = RefBlock::from_one_based(start, end).ok_or_else(bad_coords)?;

    let strand = Strand::from_gtf(strand).ok_or_else(|| malformed(format!("invalid strand '{strand}'")))?;

    let (dialect, attrs) = parse_attributes(attrs);

    Ok(AnnotationRecord {
        line_no,
        seqname: seqname.to_string(),
        feature_type: feature_type.to_string(),
        span,
        strand,
        attrs,
        dialect,
    })
}

/// Split an attribute column into key/value pairs. Quotes around values
/// are dropped; pairs with an empty key or value are ignored. In GTF a `;`
/// inside a quoted value does not end the pair.
pub fn parse_attributes(s: &str) -> (Dialect, HashMap<String, String>) {
    let s = s.trim();
    let first = s.split(';').map(str::trim).find(|p| !p.is_empty()).unwrap_or("");
    let dialect = Dialect::sniff(first);

    let mut in_quotes = false;
    let fields = s.split(|c: char| {
        if c == '"' && dialect == Dialect::Gtf {
            in_quotes = !in_quotes;
        }
        c == ';' && !in_quotes
    });

    let mut map = HashMap::new();
    for part in fields.map(str::trim).filter(|p| !p.is_empty()) {
        let Some((key, value)) = dialect.split_pair(part) else {
            continue;
        };
        let key = key.trim();
        let value = value.trim().trim_matches('"');
        // GTF repeats keys (tag "basic"; tag "CCDS"); keep the first
        if !key.is_empty() && !value.is_empty() && !map.contains_key(key) {
            map.insert(key.to_string(), value.to_string());
        }
    }

    (dialect, map)
}
