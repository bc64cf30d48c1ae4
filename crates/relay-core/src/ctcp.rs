//! CTCP framing helpers.
//!
//! A CTCP query is a `PRIVMSG` whose text is wrapped in `\x01` delimiters:
//! `\x01VERSION\x01`, `\x01PING 1234\x01`. Replies use the same framing inside
//! a `NOTICE`.

/// CTCP delimiter byte.
pub const CTCP_DELIM: char = '\x01';

/// Splits a CTCP-framed text into its upper-cased verb and argument string.
///
/// Returns `None` when `text` is not CTCP-framed. A missing closing delimiter
/// is tolerated, as many clients omit it.
pub fn parse_ctcp(text: &str) -> Option<(String, &str)> {
    let inner = text.strip_prefix(CTCP_DELIM)?;
    let inner = inner.strip_suffix(CTCP_DELIM).unwrap_or(inner);
    let (verb, args) = inner.split_once(' ').unwrap_or((inner, ""));
    if verb.is_empty() {
        return None;
    }
    Some((verb.to_ascii_uppercase(), args))
}

/// Wraps a verb and optional arguments into CTCP framing.
pub fn ctcp_wrap(verb: &str, args: &str) -> String {
    if args.is_empty() {
        format!("{CTCP_DELIM}{verb}{CTCP_DELIM}")
    } else {
        format!("{CTCP_DELIM}{verb} {args}{CTCP_DELIM}")
    }
}
