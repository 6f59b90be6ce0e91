use mailparse::MailHeaderMap;

use crate::error::{Error, Result};

/// Decoded `From` and `Subject` of a raw RFC 822 message.
pub struct HeaderFields {
    pub from: Option<String>,
    pub subject: Option<String>,
}

pub fn read_headers(raw_rfc822: &[u8]) -> Result<HeaderFields> {
    let (headers, _body_offset) =
        mailparse::parse_headers(raw_rfc822).map_err(|e| Error::HeaderParse(e.to_string()))?;
    // get_first_value decodes RFC 2047 encoded-words
    Ok(HeaderFields {
        from: headers.get_first_value("From"),
        subject: headers.get_first_value("Subject"),
    })
}

/// Splits `Display Name <user@host>` at its last `delimiter` into
/// `(name, address)`. The name may come back empty for a bare `<user@host>`.
pub fn split_sender(header: &str, delimiter: char) -> Result<(String, String)> {
    let (name, rest) = header.rsplit_once(delimiter).ok_or_else(|| {
        Error::HeaderParse(format!(
            "sender {header:?} has no '{delimiter}' before the address"
        ))
    })?;

    let address = rest.split_once('>').map_or(rest, |(addr, _)| addr).trim();
    let name = name.trim().trim_matches('"').trim();
    Ok((name.to_string(), address.to_string()))
}

/// Unfolds a header value (RFC 5322 §2.2.3), squeezes each run of
/// whitespace or control characters to one space and caps the result at
/// `max_chars` characters.
pub fn normalize_header(value: &str, max_chars: usize) -> String {
    let mut out = String::new();
    let mut taken = 0;
    let mut gap = false;
    for ch in value.chars() {
        if ch.is_whitespace() || ch.is_control() {
            gap = taken > 0;
            continue;
        }
        if taken == max_chars {
            break;
        }
        if gap {
            if taken + 1 >= max_chars {
                break;
            }
            out.push(' ');
            taken += 1;
            gap = false;
        }
        out.push(ch);
        taken += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_name_and_address() {
        let (name, addr) = split_sender("Jane Doe <jane@example.com>", '<').unwrap();
        assert_eq!(name, "Jane Doe");
        assert_eq!(addr, "jane@example.com");
    }

    #[test]
    fn strips_quotes_around_name() {
        let (name, addr) = split_sender("\"Doe, Jane\" <jane@example.com>", '<').unwrap();
        assert_eq!(name, "Doe, Jane");
        assert_eq!(addr, "jane@example.com");
    }

    #[test]
    fn splits_at_last_delimiter() {
        let (name, addr) = split_sender("a <b> c <real@example.com>", '<').unwrap();
        assert_eq!(name, "a <b> c");
        assert_eq!(addr, "real@example.com");
    }

    #[test]
    fn bare_address_is_an_error() {
        let err = split_sender("jane@example.com", '<').unwrap_err();
        assert!(matches!(err, Error::HeaderParse(_)));
    }

    #[test]
    fn reads_encoded_headers() {
        let raw = b"From: =?UTF-8?B?SsO2cmc=?= <jorg@example.com>\r\n\
                    Subject: =?UTF-8?Q?Gr=C3=BC=C3=9Fe?=\r\n\
                    \r\n\
                    body\r\n";
        let fields = read_headers(raw).unwrap();
        assert_eq!(fields.from.as_deref(), Some("J\u{f6}rg <jorg@example.com>"));
        assert_eq!(fields.subject.as_deref(), Some("Gr\u{fc}\u{df}e"));
    }

    #[test]
    fn missing_subject_is_none() {
        let fields = read_headers(b"From: A <a@example.com>\r\n\r\nhi\r\n").unwrap();
        assert!(fields.subject.is_none());
    }

    #[test]
    fn normalize_caps_length_in_chars() {
        let long = "\u{e9}".repeat(80);
        assert_eq!(normalize_header(&long, 60).chars().count(), 60);
    }

    #[test]
    fn folded_subject_unfolds_to_one_line() {
        assert_eq!(normalize_header("Re: hello\r\n world", 60), "Re: hello world");
        assert_eq!(
            normalize_header("Quarterly\r\n\treport  \t draft", 60),
            "Quarterly report draft"
        );
    }

    #[test]
    fn edges_are_trimmed_and_controls_dropped() {
        assert_eq!(normalize_header("  \u{7}ping\u{0} pong \r\n", 60), "ping pong");
        assert_eq!(normalize_header("", 60), "");
    }

    #[test]
    fn cap_never_ends_on_a_space() {
        assert_eq!(normalize_header("abc def", 4), "abc");
        assert_eq!(normalize_header("abc def", 5), "abc d");
    }
}
