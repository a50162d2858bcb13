use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, FixedOffset};
use regex::Regex;

use crate::model::{CommentRecord, TicketSource};

const SEPARATOR: &str = "- - - -\n\n";

/// Formatting knobs for attribution headers.
#[derive(Debug, Clone)]
pub struct HeaderStyle {
    pub profile_base_url: String,
    pub source_label: String,
}

impl Default for HeaderStyle {
    fn default() -> Self {
        Self {
            profile_base_url: "https://github.com".to_string(),
            source_label: "Lighthouse ticket".to_string(),
        }
    }
}

fn mention() -> &'static Regex {
    static MENTION: OnceLock<Regex> = OnceLock::new();
    MENTION.get_or_init(|| Regex::new(r"@(\w+)").expect("mention regex is valid"))
}

fn codeblock() -> &'static Regex {
    static CODEBLOCK: OnceLock<Regex> = OnceLock::new();
    CODEBLOCK.get_or_init(|| Regex::new(r"(?m)^@@@").expect("codeblock regex is valid"))
}

/// Wraps `@name` in inline code so the tracker does not notify that user.
///
/// Not idempotent: an already wrapped mention gets wrapped again.
pub fn escape_mentions(text: &str) -> String {
    mention().replace_all(text, "`@$1`").into_owned()
}

/// Rewrites `@@@` fence lines to markdown code fences.
pub fn convert_codeblocks(text: &str) -> String {
    codeblock().replace_all(text, "```").into_owned()
}

pub fn transform_body(text: &str) -> String {
    convert_codeblocks(&escape_mentions(text))
}

fn author_link(user: &str, users: &BTreeMap<String, String>, style: &HeaderStyle) -> String {
    match users.get(user) {
        Some(remote) => format!(
            "[{}]({}/{})",
            user,
            style.profile_base_url.trim_end_matches('/'),
            remote
        ),
        None => user.to_string(),
    }
}

/// `3rd Mar 2012` style date.
pub fn format_date(date: &DateTime<FixedOffset>) -> String {
    let day = date.day();
    let suffix = match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{} {}", day, suffix, date.format("%b %Y"))
}

pub fn ticket_header(
    ticket: &TicketSource,
    users: &BTreeMap<String, String>,
    style: &HeaderStyle,
) -> String {
    format!(
        "Created by **{}**, {}. *(originally [{} #{}]({}))*:\n{}",
        author_link(&ticket.user_name, users, style),
        format_date(&ticket.created_at),
        style.source_label,
        ticket.number,
        ticket.link,
        SEPARATOR
    )
}

pub fn comment_header(
    comment: &CommentRecord,
    users: &BTreeMap<String, String>,
    style: &HeaderStyle,
) -> String {
    format!(
        "{}, **{}** said:\n{}",
        format_date(&comment.created_at),
        author_link(&comment.user_name, users, style),
        SEPARATOR
    )
}

pub fn prepare_ticket_body(
    ticket: &TicketSource,
    users: &BTreeMap<String, String>,
    style: &HeaderStyle,
) -> String {
    let mut out = ticket_header(ticket, users, style);
    out.push_str(&transform_body(&ticket.body));
    out
}

pub fn prepare_comment_body(
    comment: &CommentRecord,
    users: &BTreeMap<String, String>,
    style: &HeaderStyle,
) -> String {
    let mut out = comment_header(comment, users, style);
    out.push_str(&transform_body(&comment.body));
    out
}
