//! Output filename rules.
//!
//! A rule decides the stem of each exported file; the extension always
//! follows the chosen output format, so `photo.png` exported as JPEG under
//! `keep-original` becomes `photo.jpg`.
//!
//! | Rule | `photo.jpg` → |
//! |---|---|
//! | `keep-original` | `photo.jpg` |
//! | `prefix:wm_` | `wm_photo.jpg` |
//! | `suffix:_watermarked` | `photo_watermarked.jpg` |

use crate::imaging::OutputFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NamingRule {
    #[default]
    KeepOriginal,
    Prefix(String),
    Suffix(String),
}

impl NamingRule {
    /// Output filename for `source` under this rule.
    ///
    /// Falls back to `image` when the source has no usable stem.
    pub fn file_name(&self, source: &Path, format: OutputFormat) -> String {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "image".to_string());
        let ext = format.extension();
        match self {
            NamingRule::KeepOriginal => format!("{stem}.{ext}"),
            NamingRule::Prefix(prefix) => format!("{prefix}{stem}.{ext}"),
            NamingRule::Suffix(suffix) => format!("{stem}{suffix}.{ext}"),
        }
    }
}

fn check_affix(kind: &str, affix: &str, raw: &str) -> Result<String, String> {
    if affix.is_empty() {
        return Err(format!("invalid naming rule '{raw}': {kind} must not be empty"));
    }
    if affix.contains(['/', '\\']) || affix == "." || affix == ".." {
        return Err(format!(
            "invalid naming rule '{raw}': {kind} must not contain path separators"
        ));
    }
    Ok(affix.to_string())
}

impl FromStr for NamingRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == "keep-original" {
            return Ok(NamingRule::KeepOriginal);
        }
        match s.split_once(':') {
            Some(("prefix", affix)) => Ok(NamingRule::Prefix(check_affix("prefix", affix, s)?)),
            Some(("suffix", affix)) => Ok(NamingRule::Suffix(check_affix("suffix", affix, s)?)),
            _ => Err(format!(
                "invalid naming rule '{s}': expected keep-original, prefix:<text> or suffix:<text>"
            )),
        }
    }
}

impl fmt::Display for NamingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamingRule::KeepOriginal => f.write_str("keep-original"),
            NamingRule::Prefix(p) => write!(f, "prefix:{p}"),
            NamingRule::Suffix(s) => write!(f, "suffix:{s}"),
        }
    }
}

impl TryFrom<String> for NamingRule {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NamingRule> for String {
    fn from(rule: NamingRule) -> Self {
        rule.to_string()
    }
}
