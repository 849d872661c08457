//! Document Parser - splits the raw document into a publication date and a
//! sequence of `;`-delimited records.
//!
//! Source layout (reproduced bit-for-bit from the ministry export):
//!   line 1:  free text ending in a DD-MM-YYYY date token
//!   line 2:  column header
//!   line 3+: Regione;Carburante;...;Prezzo medio;...  (comma decimals)

use crate::error::ParseError;
use chrono::NaiveDate;
use csv::StringRecord;
use encoding_rs::WINDOWS_1252;

#[derive(Debug, Clone)]
pub struct Document {
    pub publication_date: NaiveDate,
    pub header: Vec<String>,
    pub rows: Vec<StringRecord>,
}

/// Decode raw bytes as UTF-8, falling back to Windows-1252 for the source's
/// legacy single-byte exports.
pub fn decode_text(raw: &[u8]) -> Result<String, ParseError> {
    if let Ok(text) = std::str::from_utf8(raw) {
        return Ok(text.to_string());
    }
    let (text, _, had_errors) = WINDOWS_1252.decode(raw);
    if had_errors {
        return Err(ParseError::Encoding);
    }
    Ok(text.into_owned())
}

/// The first line is metadata: whitespace-tokenized, the last token is the
/// publication date every row of the batch depends on. Fewer than two tokens
/// or an unparseable token is fatal for the whole batch.
pub fn extract_publication_date(first_line: &str) -> Result<NaiveDate, ParseError> {
    let line = first_line.trim_start_matches('\u{feff}').trim();
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 2 {
        return Err(ParseError::MissingDate(line.to_string()));
    }
    let token = tokens[tokens.len() - 1];
    NaiveDate::parse_from_str(token, "%d-%m-%Y")
        .map_err(|_| ParseError::BadDate(token.to_string()))
}

/// Parse the full document. The header record is logged and discarded, never
/// validated structurally; unreadable data records are skipped with a warning
/// and do not abort the batch.
pub fn parse_document(raw: &[u8]) -> Result<Document, ParseError> {
    let text = decode_text(raw)?;
    let (first_line, rest) = match text.split_once('\n') {
        Some((first, rest)) => (first, rest),
        None => (text.as_str(), ""),
    };

    let publication_date = extract_publication_date(first_line)?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(rest.as_bytes());

    let mut records = reader.records();
    let header: Vec<String> = match records.next() {
        Some(Ok(record)) => record.iter().map(|f| f.to_string()).collect(),
        Some(Err(e)) => return Err(ParseError::Header(e.to_string())),
        None => return Err(ParseError::Empty),
    };

    let mut rows = Vec::new();
    for (idx, result) in records.enumerate() {
        match result {
            Ok(record) => rows.push(record),
            // +3: 1-indexed, date line, header line
            Err(e) => eprintln!("Warning: skipping unreadable record at line {}: {}", idx + 3, e),
        }
    }

    Ok(Document {
        publication_date,
        header,
        rows,
    })
}
