use std::collections::BTreeMap;

/// User-defined command substitutions.
///
/// Maps a trigger word to the token sequence it expands to. Only the first
/// token of a command line is ever matched, and expansion replaces it with the
/// full replacement sequence before the line is dispatched again (see
/// [`Dispatcher`](crate::dispatch::Dispatcher)).
///
/// Touched only by the main thread, so it needs no synchronization. Listing
/// order is the trigger's sort order, which keeps repeated listings stable.
pub struct AliasTable {
    entries: BTreeMap<String, Vec<String>>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Define or overwrite an alias. The replacement string is split into
    /// tokens at definition time.
    pub fn define(&mut self, name: impl Into<String>, replacement: &str) {
        let tokens = replacement
            .split(' ')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        self.entries.insert(name.into(), tokens);
    }

    pub fn lookup(&self, name: &str) -> Option<&[String]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Remove a single alias. Returns false when no such trigger exists.
    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, tokens)| (name.as_str(), tokens.as_slice()))
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::new()
    }
}
