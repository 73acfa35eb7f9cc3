//! A minimal parser/encoder for the IRC line protocol (RFC 1459 / RFC 2812
//! wire format), just the subset this adapter needs: registration, PING/PONG,
//! JOIN, and PRIVMSG.

/// One parsed IRC line: `[:prefix] COMMAND param0 param1 ... :trailing`.
#[derive(Debug, Clone)]
pub struct Line {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl Line {
    /// The nick portion of `nick!user@host`, if the prefix has that shape.
    pub fn prefix_nick(&self) -> Option<&str> {
        self.prefix.as_deref().and_then(|p| p.split('!').next())
    }
}

pub fn parse(raw: &str) -> Option<Line> {
    let raw = raw.trim_end_matches(['\r', '\n']);
    if raw.is_empty() {
        return None;
    }

    let mut rest = raw;
    let mut prefix = None;
    if let Some(stripped) = rest.strip_prefix(':') {
        let (p, r) = stripped.split_once(' ')?;
        prefix = Some(p.to_string());
        rest = r;
    }

    let (head, trailing) = match rest.split_once(" :") {
        Some((h, t)) => (h, Some(t)),
        None => (rest, None),
    };

    let mut tokens: Vec<&str> = head.split(' ').filter(|s| !s.is_empty()).collect();
    if tokens.is_empty() {
        return None;
    }
    let command = tokens.remove(0).to_uppercase();
    let mut params: Vec<String> = tokens.into_iter().map(str::to_string).collect();
    if let Some(t) = trailing {
        params.push(t.to_string());
    }

    Some(Line { prefix, command, params })
}

pub fn pass(password: &str) -> String {
    format!("PASS {password}\r\n")
}

pub fn nick(nick: &str) -> String {
    format!("NICK {nick}\r\n")
}

pub fn user(nick: &str, realname: &str) -> String {
    format!("USER {nick} 0 * :{realname}\r\n")
}

pub fn join(channel: &str) -> String {
    format!("JOIN {channel}\r\n")
}

pub fn pong(token: &str) -> String {
    format!("PONG :{token}\r\n")
}

pub fn privmsg(target: &str, text: &str) -> String {
    // A raw newline in the payload would start a second, unrelated command;
    // callers are expected to have already split multi-line replies.
    let text = text.replace(['\r', '\n'], " ");
    format!("PRIVMSG {target} :{text}\r\n")
}

pub fn privmsg_to_nickserv(password: &str) -> String {
    format!("PRIVMSG NickServ :IDENTIFY {password}\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_privmsg_with_prefix_and_trailing() {
        let line = parse(":alice!a@host PRIVMSG #room :hello there").unwrap();
        assert_eq!(line.prefix_nick(), Some("alice"));
        assert_eq!(line.command, "PRIVMSG");
        assert_eq!(line.params, vec!["#room".to_string(), "hello there".to_string()]);
    }

    #[test]
    fn parses_ping_without_prefix() {
        let line = parse("PING :abc123").unwrap();
        assert_eq!(line.prefix, None);
        assert_eq!(line.command, "PING");
        assert_eq!(line.params, vec!["abc123".to_string()]);
    }

    #[test]
    fn parses_numeric_reply_with_multiple_middle_params() {
        let line = parse(":server.example 001 mynick :Welcome to the network").unwrap();
        assert_eq!(line.command, "001");
        assert_eq!(line.params[0], "mynick");
        assert_eq!(line.params[1], "Welcome to the network");
    }

    #[test]
    fn rejects_empty_line() {
        assert!(parse("").is_none());
        assert!(parse("\r\n").is_none());
    }

    #[test]
    fn privmsg_strips_embedded_newlines() {
        let encoded = privmsg("#room", "line one\nline two");
        assert_eq!(encoded, "PRIVMSG #room :line one line two\r\n");
    }
}
