//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


//! Help lookup, output filtering and argument parsing.

use std::borrow::Cow;
use std::collections::BTreeMap;

/// Source of help topics
pub trait HelpProvider: Send + Sync {
    /// Every topic keyword, in display order
    fn topics(&self) -> Vec<String>;

    /// Text for the first topic that `keyword` abbreviates
    fn lookup(&self, keyword: &str) -> Option<String>;
}

/// A provider with no topics
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHelp;

impl HelpProvider for NoHelp {
    fn topics(&self) -> Vec<String> {
        Vec::new()
    }

    fn lookup(&self, _keyword: &str) -> Option<String> {
        None
    }
}

/// Topics held in memory, keyed by lower-case keyword
#[derive(Debug, Default, Clone)]
pub struct StaticHelp {
    entries: BTreeMap<String, String>,
}

impl StaticHelp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, keyword: impl AsRef<str>, text: impl Into<String>) {
        self.entries
            .insert(keyword.as_ref().to_lowercase(), text.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for StaticHelp {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut help = Self::new();
        for (keyword, text) in iter {
            help.insert(keyword, text);
        }
        help
    }
}

impl HelpProvider for StaticHelp {
    fn topics(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn lookup(&self, keyword: &str) -> Option<String> {
        self.entries
            .iter()
            .find(|(topic, _)| is_prefix(keyword, topic))
            .map(|(_, text)| text.clone())
    }
}

/// Transformation applied to text before it is queued, such as colour codes
pub type OutputFilter = for<'a> fn(&'a str) -> Cow<'a, str>;

/// The identity filter
pub fn plain_text(text: &str) -> Cow<'_, str> {
    Cow::Borrowed(text)
}

/// Split off the first whitespace separated word
pub fn one_arg(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(end) => (&input[..end], input[end..].trim_start()),
        None => (input, ""),
    }
}

/// Whether `abbrev` is a non-empty case-insensitive prefix of `full`
pub fn is_prefix(abbrev: &str, full: &str) -> bool {
    !abbrev.is_empty()
        && abbrev.len() <= full.len()
        && full.as_bytes()[..abbrev.len()].eq_ignore_ascii_case(abbrev.as_bytes())
}
