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


//! Help files loaded from a directory

use pulsemud_service::StaticHelp;
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

/// Help topic shown on connect instead of the built-in greeting
pub const GREETING_TOPIC: &str = "greeting";

/// Help topic shown on entering the world instead of the built-in motd
pub const MOTD_TOPIC: &str = "motd";

/// Load every regular file in `dir` as a topic named after the file
///
/// A missing directory yields no topics. Unreadable or non-UTF-8 files are
/// skipped with a warning. Line endings are normalised to CRLF.
pub async fn load_help(dir: &Path) -> io::Result<StaticHelp> {
    let mut help = StaticHelp::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            info!(dir = %dir.display(), "No help directory");
            return Ok(help);
        }
        Err(err) => return Err(err),
    };

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let path = entry.path();
        let Some(topic) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        if topic.starts_with('.') {
            continue;
        }
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                debug!(topic, "Loaded help file");
                help.insert(topic, crlf(&text));
            }
            Err(err) => warn!(path = %path.display(), %err, "Skipping help file"),
        }
    }
    info!(topics = help.len(), "Help files loaded");
    Ok(help)
}

fn crlf(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crlf() {
        assert_eq!(crlf("a\nb\r\nc"), "a\r\nb\r\nc");
    }
}
