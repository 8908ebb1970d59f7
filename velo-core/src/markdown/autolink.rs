//! Turns bare `http(s)://` URLs in text into links.

use pulldown_cmark::{CowStr, Event, LinkType, Tag, TagEnd};
use regex::Regex;
use std::sync::OnceLock;

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s<>"'`]+"#).unwrap())
}

/// Transformer for bare URLs outside links and code
pub struct AutolinkTransformer;

impl AutolinkTransformer {
    pub fn new() -> Self {
        Self
    }

    pub fn transform(&self, events: Vec<Event<'_>>) -> Vec<Event<'static>> {
        let mut result = Vec::with_capacity(events.len());
        let mut link_depth = 0usize;
        let mut in_code_block = false;

        for event in events {
            match event {
                Event::Start(Tag::Link { .. }) | Event::Start(Tag::Image { .. }) => {
                    link_depth += 1;
                    result.push(event.into_static());
                }
                Event::End(TagEnd::Link) | Event::End(TagEnd::Image) => {
                    link_depth = link_depth.saturating_sub(1);
                    result.push(event.into_static());
                }
                Event::Start(Tag::CodeBlock(_)) => {
                    in_code_block = true;
                    result.push(event.into_static());
                }
                Event::End(TagEnd::CodeBlock) => {
                    in_code_block = false;
                    result.push(event.into_static());
                }
                Event::Text(text) if link_depth == 0 && !in_code_block => {
                    result.extend(link_urls(&text));
                }
                other => result.push(other.into_static()),
            }
        }

        result
    }
}

impl Default for AutolinkTransformer {
    fn default() -> Self {
        Self::new()
    }
}

fn boxed(s: &str) -> CowStr<'static> {
    CowStr::Boxed(s.to_string().into_boxed_str())
}

fn link_urls(text: &str) -> Vec<Event<'static>> {
    let mut events = Vec::new();
    let mut last = 0;

    for m in url_regex().find_iter(text) {
        // Sentence punctuation right after a URL is not part of it
        let url = m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?', ')']);
        if url.len() <= "https://".len() {
            continue;
        }

        if m.start() > last {
            events.push(Event::Text(boxed(&text[last..m.start()])));
        }
        events.push(Event::Start(Tag::Link {
            link_type: LinkType::Autolink,
            dest_url: boxed(url),
            title: CowStr::Borrowed(""),
            id: CowStr::Borrowed(""),
        }));
        events.push(Event::Text(boxed(url)));
        events.push(Event::End(TagEnd::Link));
        last = m.start() + url.len();
    }

    if last < text.len() {
        events.push(Event::Text(boxed(&text[last..])));
    }
    events
}
