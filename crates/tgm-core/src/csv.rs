//! Minimal CSV support for the two fixed schemas this bot speaks:
//! uploaded invitee lists and member exports.
//!
//! Comma-delimited, `\n` line endings, double-quote quoting. Small enough
//! that a full CSV dependency is not warranted.

use crate::{domain::InviteeRecord, domain::Participant, Error, Result};

pub const MEMBER_EXPORT_HEADER: &str = "username,user_id,access_hash,name,group,group_id";

/// Parse an uploaded invitee list.
///
/// The first line is always treated as a header and skipped. Rows with fewer
/// than three fields are ignored; empty numeric fields parse as zero. A
/// non-numeric id or access hash is a malformed list, not a per-row skip.
pub fn parse_invitees(input: &str) -> Result<Vec<InviteeRecord>> {
    let mut out = Vec::new();
    for (lineno, line) in input.lines().enumerate() {
        if lineno == 0 || line.trim().is_empty() {
            continue;
        }
        let fields = split_fields(line);
        if fields.len() < 3 {
            continue;
        }
        out.push(InviteeRecord {
            handle: fields[0].trim().to_string(),
            user_id: parse_numeric(&fields[1], lineno + 1)?,
            access_hash: parse_numeric(&fields[2], lineno + 1)?,
        });
    }
    Ok(out)
}

/// Serialize a member export, header row included.
pub fn write_members(members: &[Participant], group_title: &str, group_id: i64) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(MEMBER_EXPORT_HEADER);
    out.push('\n');
    for m in members {
        let row = [
            m.handle.clone().unwrap_or_default(),
            m.user_id.to_string(),
            m.access_hash.to_string(),
            m.display_name(),
            group_title.to_string(),
            group_id.to_string(),
        ];
        let escaped: Vec<String> = row.iter().map(|f| escape_field(f)).collect();
        out.push_str(&escaped.join(","));
        out.push('\n');
    }
    out.into_bytes()
}

fn parse_numeric(field: &str, lineno: usize) -> Result<i64> {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed
        .parse::<i64>()
        .map_err(|_| Error::Input(format!("line {lineno}: '{trimmed}' is not a number")))
}

fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_typical_invitee_list() {
        let input = "username,user_id,access_hash,name\nalice,100,7\n,200,8\nbob,,\n";
        let records = parse_invitees(input).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].handle, "alice");
        assert_eq!(records[0].user_id, 100);
        assert_eq!(records[1].handle, "");
        assert_eq!(records[1].user_id, 200);
        assert_eq!(records[2].user_id, 0);
        assert_eq!(records[2].access_hash, 0);
    }

    #[test]
    fn short_rows_are_skipped_and_bad_numbers_rejected() {
        let ok = parse_invitees("header\nonly-two,fields\n").unwrap();
        assert!(ok.is_empty());

        let bad = parse_invitees("header\nalice,not-a-number,0\n");
        assert!(matches!(bad, Err(Error::Input(_))));
    }

    #[test]
    fn quoted_fields_roundtrip() {
        let members = vec![Participant {
            handle: Some("al,ice".to_string()),
            user_id: 1,
            access_hash: 2,
            first_name: Some("Al \"Big\"".to_string()),
            last_name: None,
        }];
        let bytes = write_members(&members, "my, group", -100);
        let text = String::from_utf8(bytes).unwrap();

        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(MEMBER_EXPORT_HEADER));
        let row = split_fields(lines.next().unwrap());
        assert_eq!(row[0], "al,ice");
        assert_eq!(row[3], "Al \"Big\"");
        assert_eq!(row[4], "my, group");
        assert_eq!(row[5], "-100");
    }

    #[test]
    fn empty_export_is_header_only() {
        let bytes = write_members(&[], "g", 5);
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            format!("{MEMBER_EXPORT_HEADER}\n")
        );
    }
}
