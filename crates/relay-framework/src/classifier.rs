//! Message classification.
//!
//! [`classify`] turns one received protocol message into exactly one
//! [`Intent`]. It is a pure function of the message and the
//! [`ClassifierRules`]: no I/O, no state.
//!
//! Precedence for a channel or direct message, first match wins:
//!
//! 1. CTCP introspection query (`VERSION`, `TIME`, `PING`)
//! 2. blank text is ignored
//! 3. excluded senders are ignored
//! 4. `.name args...` is a command
//! 5. text starting with `*` is ignored
//! 6. the first `http` word that parses as an absolute URL is a link

use relay_core::{IrcMessage, parse_ctcp};
use tracing::debug;
use url::Url;

/// Sender ignored by default: another automated participant that posts links.
pub const DEFAULT_IGNORED_NICK: &str = "linkbot";

/// Default command prefix.
pub const DEFAULT_COMMAND_PREFIX: char = '.';

// =============================================================================
// Types
// =============================================================================

/// Tunables for [`classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierRules {
    /// Character that starts a command.
    pub command_prefix: char,
    /// Nicknames whose lines are always ignored, compared case-insensitively.
    pub ignored_nicks: Vec<String>,
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            command_prefix: DEFAULT_COMMAND_PREFIX,
            ignored_nicks: vec![DEFAULT_IGNORED_NICK.to_string()],
        }
    }
}

impl ClassifierRules {
    fn is_ignored(&self, nick: &str) -> bool {
        self.ignored_nicks
            .iter()
            .any(|ignored| ignored.eq_ignore_ascii_case(nick))
    }
}

/// One chat line addressed to a channel or to us directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingLine {
    /// Full source identity, `nick!user@host`.
    pub source: String,
    /// Channel name, or our nickname for a direct message.
    pub target: String,
    /// Message text.
    pub text: String,
}

impl IncomingLine {
    /// Extracts the line from a `PRIVMSG`; `None` for anything else.
    pub fn from_message(message: &IrcMessage) -> Option<Self> {
        if message.command != "PRIVMSG" {
            return None;
        }
        Some(Self {
            source: message.prefix.clone().unwrap_or_default(),
            target: message.param(0)?.to_string(),
            text: message.param(1).unwrap_or_default().to_string(),
        })
    }

    /// Sender nickname.
    pub fn nick(&self) -> &str {
        self.source.split('!').next().unwrap_or_default()
    }

    /// True when the line was sent to us rather than to a channel.
    pub fn is_direct(&self) -> bool {
        !relay_core::is_channel_name(&self.target)
    }

    /// Where replies to this line go: the channel, or the sender for a
    /// direct message.
    pub fn reply_target(&self) -> &str {
        if self.is_direct() {
            self.nick()
        } else {
            &self.target
        }
    }
}

/// Introspection query kinds that get an automatic answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CtcpKind {
    /// Client identification.
    Version,
    /// Local time.
    Time,
    /// Echo of the given payload.
    Ping(String),
}

/// The classified meaning of one received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Server keepalive; answer with the same payload.
    Ping(String),
    /// Introspection query from `responder`.
    CtcpQuery {
        /// Which query.
        kind: CtcpKind,
        /// Nickname the answer goes to.
        responder: String,
    },
    /// Dot-prefixed command for the backend.
    Command {
        /// Command name without the prefix.
        name: String,
        /// Remaining words joined with single spaces.
        args: String,
        /// Reply target.
        channel: String,
        /// Full sender identity.
        user: String,
    },
    /// A link to look up a title for.
    Link {
        /// The URL exactly as written.
        url: String,
        /// Reply target.
        channel: String,
        /// Full sender identity.
        user: String,
    },
    /// Nothing to do.
    Ignored,
}

// =============================================================================
// Classification
// =============================================================================

/// Classifies a received protocol message.
///
/// `PING` becomes [`Intent::Ping`], `PRIVMSG` goes through
/// [`classify_line`], everything else is [`Intent::Ignored`].
pub fn classify(message: &IrcMessage, rules: &ClassifierRules) -> Intent {
    match message.command.as_str() {
        "PING" => Intent::Ping(message.trailing().unwrap_or_default().to_string()),
        "PRIVMSG" => match IncomingLine::from_message(message) {
            Some(line) => classify_line(&line, rules),
            None => Intent::Ignored,
        },
        _ => Intent::Ignored,
    }
}

/// Classifies one chat line.
pub fn classify_line(line: &IncomingLine, rules: &ClassifierRules) -> Intent {
    let text = line.text.as_str();

    if let Some((verb, args)) = parse_ctcp(text) {
        let kind = match verb.as_str() {
            "VERSION" => CtcpKind::Version,
            "TIME" => CtcpKind::Time,
            "PING" => CtcpKind::Ping(args.to_string()),
            // ACTION and friends are never commands or links
            _ => return Intent::Ignored,
        };
        return Intent::CtcpQuery {
            kind,
            responder: line.nick().to_string(),
        };
    }

    let mut words = text.split_whitespace();
    if words.clone().next().is_none() {
        return Intent::Ignored;
    }

    if rules.is_ignored(line.nick()) {
        return Intent::Ignored;
    }

    if let Some(rest) = text.strip_prefix(rules.command_prefix) {
        if rest.is_empty() {
            return Intent::Ignored;
        }
        let mut tokens = rest.split_whitespace();
        return match tokens.next() {
            Some(name) => Intent::Command {
                name: name.to_string(),
                args: tokens.collect::<Vec<_>>().join(" "),
                channel: line.reply_target().to_string(),
                user: line.source.clone(),
            },
            None => Intent::Ignored,
        };
    }

    if text.starts_with('*') {
        return Intent::Ignored;
    }

    match words.find(|word| is_link(word)) {
        Some(url) => Intent::Link {
            url: url.to_string(),
            channel: line.reply_target().to_string(),
            user: line.source.clone(),
        },
        None => Intent::Ignored,
    }
}

/// True for a word starting with `http`, spelling out `://`, that parses as an
/// absolute URL with a host.
fn is_link(word: &str) -> bool {
    // The URL parser repairs `http:host` and `https:/host` for special schemes.
    if !word.starts_with("http") || !word.contains("://") {
        return false;
    }
    match Url::parse(word) {
        Ok(url) => url.has_host() && !url.scheme().is_empty(),
        Err(e) => {
            debug!(word = %word, error = %e, "Skipping unparseable link candidate");
            false
        }
    }
}
