use std::collections::BTreeMap;

/// String-keyed markup attributes captured at node creation.
///
/// Numeric and boolean getters substitute their default on missing or
/// malformed values; descriptive data never aborts the parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(BTreeMap<String, String>);

impl Attributes {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn from_map(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }

    pub fn get_int(&self, key: &str, default: i32) -> i32 {
        match self.0.get(key) {
            None => default,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                log::warn!("attribute \"{}\" has non-numeric value \"{}\"", key, raw);
                default
            }),
        }
    }

    pub fn get_uint(&self, key: &str, default: u32) -> u32 {
        match self.0.get(key) {
            None => default,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                log::warn!("attribute \"{}\" has non-numeric value \"{}\"", key, raw);
                default
            }),
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.0.get(key).map(|raw| raw.trim()) {
            None => default,
            Some(raw) if raw.eq_ignore_ascii_case("true") || raw == "1" => true,
            Some(raw) if raw.eq_ignore_ascii_case("false") || raw == "0" => false,
            Some(raw) => {
                log::warn!("attribute \"{}\" has non-boolean value \"{}\"", key, raw);
                default
            }
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }
}
