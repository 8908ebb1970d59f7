//! `:shortcode:` emoji replacement.

use pulldown_cmark::{CowStr, Event, Tag, TagEnd};
use regex::{Captures, Regex};
use std::sync::OnceLock;

const EMOJI: &[(&str, &str)] = &[
    ("+1", "👍"),
    ("-1", "👎"),
    ("book", "📖"),
    ("bug", "🐛"),
    ("bulb", "💡"),
    ("camera", "📷"),
    ("check", "✔️"),
    ("coffee", "☕"),
    ("construction", "🚧"),
    ("eyes", "👀"),
    ("fire", "🔥"),
    ("heart", "❤️"),
    ("laughing", "😆"),
    ("memo", "📝"),
    ("pushpin", "📌"),
    ("question", "❓"),
    ("rocket", "🚀"),
    ("smile", "😄"),
    ("sparkles", "✨"),
    ("star", "⭐"),
    ("tada", "🎉"),
    ("thinking", "🤔"),
    ("thumbsdown", "👎"),
    ("thumbsup", "👍"),
    ("warning", "⚠️"),
    ("white_check_mark", "✅"),
    ("wink", "😉"),
    ("x", "❌"),
];

fn shortcode_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r":([a-z0-9_+\-]+):").unwrap())
}

fn lookup(code: &str) -> Option<&'static str> {
    EMOJI
        .binary_search_by(|(name, _)| name.cmp(&code))
        .ok()
        .map(|i| EMOJI[i].1)
}

/// Transformer replacing known shortcodes in text; unknown ones are kept
pub struct EmojiTransformer;

impl EmojiTransformer {
    pub fn new() -> Self {
        Self
    }

    pub fn transform(&self, events: Vec<Event<'_>>) -> Vec<Event<'static>> {
        let mut in_code_block = false;

        events
            .into_iter()
            .map(|event| match event {
                Event::Start(Tag::CodeBlock(_)) => {
                    in_code_block = true;
                    event.into_static()
                }
                Event::End(TagEnd::CodeBlock) => {
                    in_code_block = false;
                    event.into_static()
                }
                Event::Text(text) if !in_code_block && text.contains(':') => {
                    let replaced = shortcode_regex().replace_all(&text, |caps: &Captures| {
                        lookup(&caps[1])
                            .map(str::to_string)
                            .unwrap_or_else(|| caps[0].to_string())
                    });
                    Event::Text(CowStr::Boxed(replaced.into_owned().into_boxed_str()))
                }
                other => other.into_static(),
            })
            .collect()
    }
}

impl Default for EmojiTransformer {
    fn default() -> Self {
        Self::new()
    }
}
