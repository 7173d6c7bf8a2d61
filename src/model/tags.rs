//! Tag directive parsing: `column:name;size:100;not null;uniqueIndex:idx_users_email`.

/// Parsed directives of one field tag. Keys are matched case-insensitively; unknown keys are kept
/// but never consulted, so newer tags do not break older readers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagSet {
    entries: Vec<(String, Option<String>)>,
}

impl TagSet {
    pub fn parse(tag: &str) -> Self {
        let entries = tag
            .split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| match part.split_once(':') {
                Some((key, value)) => (normalize_key(key), Some(value.trim().to_string())),
                None => (normalize_key(part), None),
            })
            .collect();
        TagSet { entries }
    }

    /// True when the directive is present, with or without a value.
    pub fn has(&self, key: &str) -> bool {
        let key = normalize_key(key);
        self.entries.iter().any(|(k, _)| *k == key)
    }

    /// Value of a `key:value` directive. Empty values count as absent.
    pub fn value(&self, key: &str) -> Option<&str> {
        let key = normalize_key(key);
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .and_then(|(_, v)| v.as_deref())
            .filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize_key(key: &str) -> String {
    key.trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}
