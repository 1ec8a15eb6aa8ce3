//! Pin-emoji identity and the parser behind `--pin-emoji`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error returned for an unusable `--pin-emoji` value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PinEmojiParseError {
    #[error("pin emoji spec is empty")]
    Empty,
    #[error("malformed custom emoji spec '{0}', expected <:name:id>")]
    Malformed(String),
}

/// Identity of the reaction that counts toward the pin threshold.
///
/// Custom emojis are matched by numeric id only; the stored name is kept for
/// rendering mentions in announcements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinEmoji {
    Unicode(String),
    Custom {
        id: u64,
        name: String,
        animated: bool,
    },
}

impl PinEmoji {
    /// Parses a spec string: a unicode emoji literal, a `<:name:id>` /
    /// `<a:name:id>` mention, or the bare `name:id` form.
    pub fn parse(spec: &str) -> Result<Self, PinEmojiParseError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(PinEmojiParseError::Empty);
        }

        let inner = spec
            .strip_prefix('<')
            .and_then(|rest| rest.strip_suffix('>'));
        let candidate = inner.unwrap_or(spec);

        // Anything with mention markers or a colon must be a custom emoji;
        // unicode literals contain neither.
        if inner.is_some() || candidate.contains(':') {
            return parse_custom(candidate)
                .ok_or_else(|| PinEmojiParseError::Malformed(spec.to_string()));
        }
        Ok(Self::Unicode(spec.to_string()))
    }
}

fn parse_custom(body: &str) -> Option<PinEmoji> {
    let (animated, body) = match body.strip_prefix("a:") {
        Some(rest) => (true, rest),
        None => (false, body.strip_prefix(':').unwrap_or(body)),
    };
    let (name, id_text) = body.split_once(':')?;
    if name.is_empty() {
        return None;
    }
    let id = id_text.parse::<u64>().ok()?;
    if id == 0 {
        return None;
    }
    Some(PinEmoji::Custom {
        id,
        name: name.to_string(),
        animated,
    })
}

impl fmt::Display for PinEmoji {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unicode(value) => f.write_str(value),
            Self::Custom { id, name, animated } => {
                let marker = if *animated { "a" } else { "" };
                write!(f, "<{marker}:{name}:{id}>")
            }
        }
    }
}
