//! Static translation lookup for companion-facing strings.

use std::collections::HashMap;

const ENGLISH: &[(&str, &str)] = &[
    ("welcome", "Welcome"),
    ("logout", "Logout"),
    ("back", "Back"),
    ("send", "Send"),
    ("typeMessage", "Express yourself freely..."),
    (
        "buddyGreeting",
        "Hello {name}, how can I support you today? I'm here to help with career, wellness, or just to listen.",
    ),
    ("chatTitle", "Chat with Buddy"),
    ("chatSubtitle", "Your personal companion"),
    ("voiceUnavailable", "Voice Input Unavailable"),
    (
        "typeInstead",
        "You can still type your messages normally without voice input.",
    ),
];

const TELUGU: &[(&str, &str)] = &[
    ("welcome", "స్వాగతం"),
    ("logout", "లాగ్అవుట్"),
    ("back", "వెనుకకు"),
    ("send", "పంపండి"),
    (
        "buddyGreeting",
        "నమస్తే {name}, ఈ రోజు నేను మీకు ఎలా సహాయపడగలను? నేను కెరీర్, ఆరోగ్యం లేదా వినడానికి ఇక్కడ ఉన్నాను.",
    ),
];

fn table(language: &str) -> Option<&'static [(&'static str, &'static str)]> {
    match language {
        "English" => Some(ENGLISH),
        "Telugu" => Some(TELUGU),
        _ => None,
    }
}

fn lookup(entries: &[(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    entries.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Translate `key` into `language`, substituting `{param}` placeholders.
///
/// Unknown languages fall back to English; keys missing from both tables are
/// returned as-is.
pub fn translate(language: &str, key: &str, params: &HashMap<&str, &str>) -> String {
    let entries = table(language).unwrap_or(ENGLISH);
    let mut text = lookup(entries, key)
        .or_else(|| lookup(ENGLISH, key))
        .unwrap_or(key)
        .to_owned();
    for (name, value) in params {
        text = text.replacen(&format!("{{{name}}}"), value, 1);
    }
    text
}
