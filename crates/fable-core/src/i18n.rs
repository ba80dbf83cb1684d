use serde_json::Value;

/// Embedded string tables. Adding a language means adding a file here and a
/// row in [`LANGUAGES`].
const EN: &str = include_str!("../locales/en.json");
const ZH_CN: &str = include_str!("../locales/zh-CN.json");

pub const LANGUAGES: &[(&str, &str)] = &[("en", EN), ("zh-CN", ZH_CN)];

/// Message lookup keyed by id + language tag. Pure data lookup — no
/// behavioral logic lives here. Unknown languages fall back to English;
/// unknown keys fall back to the key itself so a missing translation is
/// visible but never fatal.
pub struct Catalog {
    lang: String,
    table: Value,
    fallback: Value,
}

impl Catalog {
    pub fn new(lang: &str) -> Self {
        let fallback: Value = serde_json::from_str(EN).unwrap_or(Value::Null);
        let table = LANGUAGES
            .iter()
            .find(|(tag, _)| *tag == lang)
            .and_then(|(_, raw)| serde_json::from_str(raw).ok())
            .unwrap_or_else(|| fallback.clone());
        let lang = if LANGUAGES.iter().any(|(tag, _)| *tag == lang) {
            lang.to_string()
        } else {
            "en".to_string()
        };
        Self { lang, table, fallback }
    }

    pub fn language(&self) -> &str {
        &self.lang
    }

    /// Look up a dotted key like `ui.game_title`.
    pub fn t(&self, key: &str) -> String {
        lookup(&self.table, key)
            .or_else(|| lookup(&self.fallback, key))
            .unwrap_or_else(|| key.to_string())
    }

    /// Look up a key and substitute `{name}` placeholders.
    pub fn tf(&self, key: &str, args: &[(&str, &str)]) -> String {
        let mut text = self.t(key);
        for (name, value) in args {
            text = text.replace(&format!("{{{name}}}"), value);
        }
        text
    }
}

fn lookup(table: &Value, key: &str) -> Option<String> {
    let mut node = table;
    for part in key.split('.') {
        node = node.get(part)?;
    }
    node.as_str().map(str::to_string)
}
