//! AMI message framing: `Key: Value` lines terminated by an empty line.

use std::io::{self, BufRead};

use manager_api::Action;

pub type Fields = Vec<(String, String)>;

/// Reads one message block.
///
/// Returns `Ok(None)` on a clean EOF between blocks. Blank lines before a
/// block are skipped; both `\r\n` and bare `\n` line endings are accepted.
pub fn read_block<R: BufRead>(reader: &mut R) -> io::Result<Option<Fields>> {
    let mut fields = Fields::new();
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            if fields.is_empty() {
                return Ok(None);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed in the middle of a message",
            ));
        }

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            if fields.is_empty() {
                continue;
            }
            return Ok(Some(fields));
        }

        match trimmed.split_once(':') {
            Some((key, value)) => {
                fields.push((key.trim().to_string(), value.trim_start().to_string()))
            }
            // Free-form output lines (e.g. from `Command`) are kept with an empty value.
            None => fields.push((trimmed.to_string(), String::new())),
        }
    }
}

/// Serializes an action with the given `ActionID`.
///
/// Line breaks inside values would split the frame, so they are dropped.
pub fn encode_action(action: &Action, action_id: &str) -> String {
    let mut out = String::with_capacity(64);
    push_line(&mut out, "Action", action.name());
    push_line(&mut out, "ActionID", action_id);
    for (key, value) in action.fields() {
        push_line(&mut out, key, value);
    }
    out.push_str("\r\n");
    out
}

fn push_line(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push_str(": ");
    out.extend(value.chars().filter(|ch| *ch != '\r' && *ch != '\n'));
    out.push_str("\r\n");
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use manager_api::Action;
    use pretty_assertions::assert_eq;

    use super::{encode_action, read_block};

    fn pairs(fields: &[(String, String)]) -> Vec<(&str, &str)> {
        fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    #[test]
    fn reads_consecutive_blocks_then_eof() {
        let wire = "Response: Success\r\nActionID: 1\r\n\r\nEvent: Hangup\nChannel: SIP/a-1\n\n";
        let mut reader = Cursor::new(wire);

        let first = read_block(&mut reader).unwrap().unwrap();
        assert_eq!(
            pairs(&first),
            vec![("Response", "Success"), ("ActionID", "1")]
        );
        let second = read_block(&mut reader).unwrap().unwrap();
        assert_eq!(pairs(&second), vec![("Event", "Hangup"), ("Channel", "SIP/a-1")]);
        assert!(read_block(&mut reader).unwrap().is_none());
    }

    #[test]
    fn value_keeps_inner_colons_and_leading_blank_lines_are_skipped() {
        let mut reader = Cursor::new("\r\n\r\nChannel: IAX2/host:4569-12\r\n\r\n");
        let block = read_block(&mut reader).unwrap().unwrap();
        assert_eq!(pairs(&block), vec![("Channel", "IAX2/host:4569-12")]);
    }

    #[test]
    fn eof_mid_block_is_an_error() {
        let mut reader = Cursor::new("Event: Newchannel\r\nChannel: x");
        let err = read_block(&mut reader).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn encode_puts_action_and_id_first_and_strips_line_breaks() {
        let action = Action::new("TddTx")
            .field("Channel", "SIP/b-2")
            .field("Message", "HI\r\nTHERE");
        assert_eq!(
            encode_action(&action, "7"),
            "Action: TddTx\r\nActionID: 7\r\nChannel: SIP/b-2\r\nMessage: HITHERE\r\n\r\n"
        );
    }
}
