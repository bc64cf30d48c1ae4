//! IRC line model.
//!
//! [`IrcMessage`] is the parsed form of a single protocol line:
//!
//! ```text
//! [@tags] [:prefix] COMMAND [param ...] [:trailing param]
//! ```
//!
//! Tags are accepted and discarded; nothing in the relay consumes them.

use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

/// Numeric reply sent once registration completes.
pub const RPL_WELCOME: &str = "001";

/// Numeric reply sent when the requested nickname is taken.
pub const ERR_NICKNAMEINUSE: &str = "433";

/// A single parsed IRC protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    /// Source of the message (`nick!user@host` or a server name).
    pub prefix: Option<String>,
    /// Command name or three-digit numeric, upper-cased.
    pub command: String,
    /// Parameters, with the trailing parameter last.
    pub params: Vec<String>,
}

impl IrcMessage {
    /// Creates a message with no prefix.
    pub fn new(command: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            prefix: None,
            command: command.into(),
            params,
        }
    }

    /// Parses one protocol line. Trailing `\r\n` is ignored.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut rest = line.trim_end_matches(['\r', '\n']).trim_start();
        if rest.is_empty() {
            return Err(ProtocolError::Empty);
        }

        if let Some(tagged) = rest.strip_prefix('@') {
            rest = tagged
                .split_once(' ')
                .map(|(_, tail)| tail.trim_start())
                .unwrap_or("");
        }

        let mut prefix = None;
        if let Some(prefixed) = rest.strip_prefix(':') {
            let (source, tail) = prefixed.split_once(' ').unwrap_or((prefixed, ""));
            prefix = Some(source.to_string());
            rest = tail.trim_start();
        }

        let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
        if command.is_empty() {
            return Err(ProtocolError::MissingCommand(line.to_string()));
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, tail)) => {
                    params.push(param.to_string());
                    rest = tail;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Ok(Self {
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Returns the nickname part of the prefix, if the prefix is a user mask.
    pub fn source_nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        let nick = prefix.split(['!', '@']).next().unwrap_or(prefix);
        (!nick.is_empty()).then_some(nick)
    }

    /// Returns the parameter at `index`.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Returns the last parameter, which carries free text for most commands.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    // -------------------------------------------------------------------------
    // Constructors for outbound lines
    // -------------------------------------------------------------------------

    /// `PRIVMSG <target> :<text>`
    pub fn privmsg(target: &str, text: &str) -> Self {
        Self::new("PRIVMSG", vec![target.to_string(), text.to_string()])
    }

    /// `NOTICE <target> :<text>`
    pub fn notice(target: &str, text: &str) -> Self {
        Self::new("NOTICE", vec![target.to_string(), text.to_string()])
    }

    /// `JOIN <channel>`
    pub fn join(channel: &str) -> Self {
        Self::new("JOIN", vec![channel.to_string()])
    }

    /// `PONG :<payload>`
    pub fn pong(payload: &str) -> Self {
        Self::new("PONG", vec![payload.to_string()])
    }

    /// `NICK <nickname>`
    pub fn nick(nickname: &str) -> Self {
        Self::new("NICK", vec![nickname.to_string()])
    }

    /// `USER <username> 0 * :<realname>`
    pub fn user(username: &str, realname: &str) -> Self {
        Self::new(
            "USER",
            vec![
                username.to_string(),
                "0".to_string(),
                "*".to_string(),
                realname.to_string(),
            ],
        )
    }

    /// `QUIT :<reason>`
    pub fn quit(reason: &str) -> Self {
        Self::new("QUIT", vec![reason.to_string()])
    }
}

impl FromStr for IrcMessage {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for IrcMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&self.command)?;

        let Some((last, middle)) = self.params.split_last() else {
            return Ok(());
        };
        for param in middle {
            write!(f, " {param}")?;
        }
        if last.is_empty() || last.contains(' ') || last.starts_with(':') {
            write!(f, " :{last}")
        } else {
            write!(f, " {last}")
        }
    }
}

/// Returns true when `target` names a channel rather than a user.
pub fn is_channel_name(target: &str) -> bool {
    target.starts_with(['#', '&', '+', '!'])
}

/// Adds the `#` prefix to a channel name that carries no channel prefix.
pub fn normalize_channel(name: &str) -> String {
    let name = name.trim();
    if is_channel_name(name) {
        name.to_string()
    } else {
        format!("#{name}")
    }
}
