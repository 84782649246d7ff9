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


//! `#x` colour codes rendered as ANSI escapes
//!
//! Lower-case letters select the normal weight, upper-case the bold one:
//! `r`ed, `g`reen, `y`ellow, `b`lue, `p`urple, `c`yan and `w`hite. `#n`
//! resets and `##` is a literal `#`. Unknown codes pass through untouched.

use std::borrow::Cow;

const RESET: &str = "\x1b[0m";

fn escape(code: char) -> Option<&'static str> {
    let escape = match code {
        'n' | 'N' => RESET,
        'r' => "\x1b[0;31m",
        'g' => "\x1b[0;32m",
        'y' => "\x1b[0;33m",
        'b' => "\x1b[0;34m",
        'p' => "\x1b[0;35m",
        'c' => "\x1b[0;36m",
        'w' => "\x1b[0;37m",
        'R' => "\x1b[1;31m",
        'G' => "\x1b[1;32m",
        'Y' => "\x1b[1;33m",
        'B' => "\x1b[1;34m",
        'P' => "\x1b[1;35m",
        'C' => "\x1b[1;36m",
        'W' => "\x1b[1;37m",
        _ => return None,
    };
    Some(escape)
}

/// Output filter translating colour codes
pub fn ansi_color(text: &str) -> Cow<'_, str> {
    if !text.contains('#') {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 16);
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '#' {
            out.push(ch);
            continue;
        }
        match chars.peek().copied() {
            Some('#') => {
                chars.next();
                out.push('#');
            }
            Some(code) => match escape(code) {
                Some(escape) => {
                    chars.next();
                    out.push_str(escape);
                }
                None => out.push('#'),
            },
            None => out.push('#'),
        }
    }
    Cow::Owned(out)
}
