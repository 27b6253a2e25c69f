//! Text listing of the enabled ciphersuites.
//!
//! One line per suite: `<id> <name> <flags>`, the id in decimal. The client
//! binary reads the same format back to try every listed suite in turn.
//!
//! 已启用密码套件的文本列表，每行格式为 `<id> <name> <flags>`。

use std::io::{self, Write};

use thiserror::Error;

use crate::crypto::suite::Ciphersuite;

pub const FLAG_LABELS: [&str; 5] = ["NONE", "WEAK", "NO_DTLS", "SHORT_TAG", "UNKNOWN"];

/// One parsed listing line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub id: u16,
    pub name: String,
    pub flags: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ListingError {
    #[error("line {line}: expected `<id> <name> <flags>`")]
    Shape { line: usize },
    #[error("line {line}: `{id}` is not a ciphersuite id")]
    Id { line: usize, id: String },
    #[error("line {line}: unknown flags `{flags}`")]
    Flags { line: usize, flags: String },
}

pub fn listing_line(suite: &Ciphersuite) -> String {
    format!("{} {} {}", suite.id, suite.name, suite.flags.label())
}

/// Writes one line per suite.
pub fn write_listing<'a, W: Write>(
    out: &mut W,
    suites: impl IntoIterator<Item = &'a Ciphersuite>,
) -> io::Result<()> {
    for suite in suites {
        writeln!(out, "{}", listing_line(suite))?;
    }
    Ok(())
}

/// Parses a listing. Blank lines are skipped.
///
/// 解析列表文本，跳过空行。
pub fn parse_listing(text: &str) -> Result<Vec<ListingEntry>, ListingError> {
    let mut entries = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let fields: Vec<&str> = raw.split_whitespace().collect();
        let [id, name, flags] = fields[..] else {
            if fields.is_empty() {
                continue;
            }
            return Err(ListingError::Shape { line });
        };
        let id = id.parse::<u16>().map_err(|_| ListingError::Id {
            line,
            id: id.to_string(),
        })?;
        if !FLAG_LABELS.contains(&flags) {
            return Err(ListingError::Flags {
                line,
                flags: flags.to_string(),
            });
        }
        entries.push(ListingEntry {
            id,
            name: name.to_string(),
            flags: flags.to_string(),
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::suite::lookup;

    #[test]
    fn line_format() {
        let suite = lookup(0x003B).unwrap();
        assert_eq!(listing_line(suite), "59 TLS-RSA-WITH-NULL-SHA256 WEAK");
        let suite = lookup(0xC02F).unwrap();
        assert_eq!(
            listing_line(suite),
            "49199 TLS-ECDHE-RSA-WITH-AES-128-GCM-SHA256 NONE"
        );
    }

    #[test]
    fn parse_errors_carry_the_line() {
        assert_eq!(
            parse_listing("49199 A NONE\n\nbogus\n"),
            Err(ListingError::Shape { line: 3 })
        );
        assert!(matches!(
            parse_listing("70000 A NONE"),
            Err(ListingError::Id { line: 1, .. })
        ));
        assert!(matches!(
            parse_listing("1 A FAST"),
            Err(ListingError::Flags { line: 1, .. })
        ));
    }
}
