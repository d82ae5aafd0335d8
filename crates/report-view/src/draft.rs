/// A generated reply split into mail headers and body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Draft {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// The generation output exactly as received.
    pub raw: String,
}

impl Draft {
    /// Reads leading `To:` / `Subject:` lines (keys case-insensitive, blank lines allowed between
    /// them) up to the first other line; everything from that line on is the body, verbatim.
    pub fn parse(raw: &str) -> Self {
        let mut draft = Draft {
            raw: raw.to_string(),
            ..Draft::default()
        };

        let mut offset = 0usize;
        let mut body_start = raw.len();
        for line in raw.split_inclusive('\n') {
            let content = line.trim_end_matches(['\n', '\r']);
            if content.trim().is_empty() {
                offset += line.len();
                continue;
            }
            if let Some(value) = header_value(content, "to") {
                draft.to = value.to_string();
            } else if let Some(value) = header_value(content, "subject") {
                draft.subject = value.to_string();
            } else {
                body_start = offset;
                break;
            }
            offset += line.len();
        }

        if draft.to.is_empty() && draft.subject.is_empty() {
            draft.body = raw.to_string();
        } else {
            draft.body = raw[body_start..].to_string();
        }
        draft
    }

    pub fn has_recipient(&self) -> bool {
        !self.to.trim().is_empty()
    }
}

fn header_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let (name, value) = line.split_once(':')?;
    name.trim().eq_ignore_ascii_case(key).then(|| value.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_free_output_is_all_body() {
        let d = Draft::parse("Here is a response.");
        assert_eq!(d.to, "");
        assert_eq!(d.subject, "");
        assert_eq!(d.body, "Here is a response.");
        assert_eq!(d.raw, "Here is a response.");
    }

    #[test]
    fn headers_are_split_and_body_colons_survive() {
        let raw = "To: ann@example.com\nsubject: Re: Q3 numbers\n\nHi Ann,\nNote: totals changed at 10:30.\n";
        let d = Draft::parse(raw);
        assert_eq!(d.to, "ann@example.com");
        assert_eq!(d.subject, "Re: Q3 numbers");
        assert_eq!(d.body, "Hi Ann,\nNote: totals changed at 10:30.\n");
        assert!(d.has_recipient());
    }

    #[test]
    fn headers_stop_at_first_other_line() {
        let d = Draft::parse("Subject: Hello\nDear team,\nTo: not a header here\n");
        assert_eq!(d.subject, "Hello");
        assert_eq!(d.to, "");
        assert_eq!(d.body, "Dear team,\nTo: not a header here\n");
    }

    #[test]
    fn leading_non_header_colon_line_is_body() {
        let raw = "Summary: all good\nmore";
        let d = Draft::parse(raw);
        assert_eq!(d.body, raw);
        assert!(!d.has_recipient());
    }
}
