//! The AT frame record and its wire encoding.

use crate::error::{Error, Result};

/// The kind of an [`AtFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtType {
    /// Unframed bytes, forwarded verbatim (used only for the external AT-handler path).
    Raw,
    /// A bare command with no `=`/`?` suffix, e.g. plain `AT`.
    Cmd,
    /// A `AT+CMD?` query.
    CmdGet,
    /// A `AT+CMD=value` assignment.
    CmdSet,
    /// A `AT+CMD=?` capability test.
    CmdTest,
    /// A `+CMD: value` unsolicited or solicited response, including bare `OK`/`ERROR`
    /// (command is empty in that case).
    Resp,
}

/// A single parsed AT message.
///
/// Invariant: for any non-[`AtType::Raw`] frame, `build(parse(bytes)) == bytes` up to the
/// trailing line terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtFrame {
    /// The frame kind.
    pub typ: AtType,
    /// Command name including the leading `+`, e.g. `"+CIND"`. Empty for bare `OK`/`ERROR`
    /// and for [`AtType::Raw`].
    pub command: String,
    /// The payload, e.g. the right-hand side of `=` or the text after `: `. Empty if absent.
    pub value: String,
}

impl AtFrame {
    /// Builds a bare `OK` response frame.
    pub fn ok() -> Self {
        Self { typ: AtType::Resp, command: String::new(), value: "OK".to_string() }
    }

    /// Builds a bare `ERROR` response frame.
    pub fn error() -> Self {
        Self { typ: AtType::Resp, command: String::new(), value: "ERROR".to_string() }
    }

    /// Builds a `AT{command}={value}` frame.
    pub fn cmd_set(command: impl Into<String>, value: impl Into<String>) -> Self {
        Self { typ: AtType::CmdSet, command: command.into(), value: value.into() }
    }

    /// Builds a `AT{command}?` frame.
    pub fn cmd_get(command: impl Into<String>) -> Self {
        Self { typ: AtType::CmdGet, command: command.into(), value: String::new() }
    }

    /// Builds a `AT{command}=?` frame.
    pub fn cmd_test(command: impl Into<String>) -> Self {
        Self { typ: AtType::CmdTest, command: command.into(), value: String::new() }
    }

    /// Builds a `{command}: {value}` response frame.
    pub fn resp(command: impl Into<String>, value: impl Into<String>) -> Self {
        Self { typ: AtType::Resp, command: command.into(), value: value.into() }
    }

    /// Whether this is a bare `OK` response.
    pub fn is_ok(&self) -> bool {
        self.typ == AtType::Resp && self.command.is_empty() && self.value == "OK"
    }

    /// Whether this is a bare `ERROR` response.
    pub fn is_error(&self) -> bool {
        self.typ == AtType::Resp && self.command.is_empty() && self.value == "ERROR"
    }

    /// Serializes this frame to its wire bytes, including the trailing `\r\n`.
    ///
    /// [`AtType::Raw`] frames cannot be built (there is nothing to format); use the raw bytes
    /// directly instead.
    pub fn build(&self) -> Vec<u8> {
        let text = match self.typ {
            AtType::Raw => unreachable!("raw frames are not built, only forwarded"),
            AtType::Cmd => format!("AT{}", self.command),
            AtType::CmdGet => format!("AT{}?", self.command),
            AtType::CmdSet => format!("AT{}={}", self.command, self.value),
            AtType::CmdTest => format!("AT{}=?", self.command),
            AtType::Resp if self.command.is_empty() => self.value.clone(),
            AtType::Resp => format!("{}: {}", self.command, self.value),
        };
        let mut out = text.into_bytes();
        out.extend_from_slice(b"\r\n");
        out
    }
}

/// Parses one AT line (with `AT`/`\r`/`\n` framing already stripped of surrounding whitespace)
/// into a frame.
fn parse_line(line: &str) -> Result<AtFrame> {
    let line = line.trim();
    if line.is_empty() {
        return Err(Error::BadMessage("empty line".to_string()));
    }
    if line == "OK" {
        return Ok(AtFrame::ok());
    }
    if line == "ERROR" {
        return Ok(AtFrame::error());
    }
    if let Some(rest) = line.strip_prefix("AT") {
        if let Some(cmd) = rest.strip_suffix("=?") {
            return Ok(AtFrame::cmd_test(cmd));
        }
        if let Some(cmd) = rest.strip_suffix('?') {
            return Ok(AtFrame::cmd_get(cmd));
        }
        if let Some(eq) = rest.find('=') {
            let (cmd, value) = rest.split_at(eq);
            return Ok(AtFrame::cmd_set(cmd, &value[1..]));
        }
        return Ok(AtFrame { typ: AtType::Cmd, command: rest.to_string(), value: String::new() });
    }
    if let Some(colon) = line.find(':') {
        let (cmd, value) = line.split_at(colon);
        return Ok(AtFrame::resp(cmd, value[1..].trim_start()));
    }
    Err(Error::BadMessage(format!("unrecognized AT line: {line:?}")))
}

/// Parses one AT frame from the head of `buf`, returning the frame and the unparsed tail.
///
/// Frames are terminated by `\r\n`, `\r` or `\n`; blank lines between frames are skipped. If
/// `buf` contains no complete line yet, returns `Ok(None)` and the caller should refill.
pub fn parse_at(buf: &[u8]) -> Result<Option<(AtFrame, &[u8])>> {
    let s = std::str::from_utf8(buf).map_err(|e| Error::BadMessage(e.to_string()))?;
    let mut rest = s;
    loop {
        let term = rest.find(['\r', '\n']);
        let Some(pos) = term else {
            return Ok(None);
        };
        let (line, after) = rest.split_at(pos);
        let after = after.trim_start_matches(['\r', '\n']);
        if line.trim().is_empty() {
            rest = after;
            continue;
        }
        let frame = parse_line(line)?;
        return Ok(Some((frame, after.as_bytes())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_cmd_set() {
        let f = AtFrame::cmd_set("+BRSF", "575");
        let bytes = f.build();
        let (parsed, tail) = parse_at(&bytes).unwrap().unwrap();
        assert_eq!(parsed, f);
        assert!(tail.is_empty());
    }

    #[test]
    fn round_trips_resp() {
        let f = AtFrame::resp("+BRSF", "512");
        let bytes = f.build();
        let (parsed, _) = parse_at(&bytes).unwrap().unwrap();
        assert_eq!(parsed, f);
    }

    #[test]
    fn round_trips_bare_ok() {
        let bytes = AtFrame::ok().build();
        let (parsed, _) = parse_at(&bytes).unwrap().unwrap();
        assert!(parsed.is_ok());
    }

    #[test]
    fn parses_two_frames_from_one_buffer() {
        let mut buf = AtFrame::resp("+BRSF", "512").build();
        buf.extend(AtFrame::ok().build());
        let (first, tail) = parse_at(&buf).unwrap().unwrap();
        assert_eq!(first.command, "+BRSF");
        let (second, tail2) = parse_at(tail).unwrap().unwrap();
        assert!(second.is_ok());
        assert!(tail2.is_empty());
    }

    #[test]
    fn incomplete_buffer_yields_none() {
        assert!(parse_at(b"AT+BRSF=575").unwrap().is_none());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_at(b"not at all an at line\r\n").is_err());
    }

    #[test]
    fn cind_test_and_get_forms() {
        let (f, _) = parse_at(b"AT+CIND=?\r\n").unwrap().unwrap();
        assert_eq!(f.typ, AtType::CmdTest);
        let (f, _) = parse_at(b"AT+CIND?\r\n").unwrap().unwrap();
        assert_eq!(f.typ, AtType::CmdGet);
    }
}
