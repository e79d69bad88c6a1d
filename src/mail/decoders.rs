use crate::domain::email::Message;

/// Splits `login@domain` into its parts.
pub fn split_address(address: &str) -> Option<(&str, &str)> {
    let (login, domain) = address.trim().rsplit_once('@')?;
    if login.is_empty() || domain.is_empty() || !domain.contains('.') {
        return None;
    }
    Some((login, domain))
}

pub fn normalize_snippet(s: &str, max_chars: usize) -> String {
    let mut out = String::new();
    for line in s.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(line);
        if out.chars().count() >= max_chars {
            break;
        }
    }
    out.chars().take(max_chars).collect()
}

/// Best readable body: HTML rendered to text, else the plain part.
pub fn render_body(msg: &Message, width: usize) -> String {
    if let Some(html) = msg.html_body.as_deref().filter(|h| !h.trim().is_empty()) {
        match html2text::from_read(html.as_bytes(), width.max(20)) {
            Ok(text) => return text,
            Err(e) => log::warn!("html render failed for message {}: {e}", msg.id),
        }
    }
    [msg.text_body.as_deref(), msg.body.as_deref()]
        .into_iter()
        .flatten()
        .find(|b| !b.trim().is_empty())
        .unwrap_or("(empty message)")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_addresses() {
        assert_eq!(split_address("a.b@x.com"), Some(("a.b", "x.com")));
        assert_eq!(split_address("@x.com"), None);
        assert_eq!(split_address("a@"), None);
        assert_eq!(split_address("plain"), None);
    }

    #[test]
    fn snippet_joins_and_truncates() {
        assert_eq!(normalize_snippet("  hello \n\n world ", 50), "hello world");
        assert_eq!(normalize_snippet("abcdef", 3), "abc");
    }

    #[test]
    fn plain_body_fallback() {
        let msg = Message {
            id: 1,
            from: "a@b.c".into(),
            subject: "s".into(),
            date: "d".into(),
            body: None,
            text_body: Some("just text".into()),
            html_body: None,
            attachments: vec![],
        };
        assert_eq!(render_body(&msg, 80), "just text");
    }
}
