//! Trim levels and the template trim mode derived from them.
//!
//! A trim mode is written as an optional `%` (code lines introduced by a
//! leading percent sign) followed by the newline policy suffix. It is always
//! derived from a [`TrimLevel`] and the percent flag via [`resolve`], never
//! stored independently of them.

use std::fmt::{self, Display};
use std::str::FromStr;

use crate::error::Error;

/// How a renderer should treat the newline following a code tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrimPolicy {
    /// Keep every newline.
    None,
    /// Drop the newline that directly follows a code tag.
    TagNewline,
    /// Drop the newline of lines that hold nothing but a code tag.
    LineTags,
    /// Only trim where the template asks for it with `-` markers.
    Explicit,
}

impl TrimPolicy {
    fn suffix(self) -> &'static str {
        match self {
            TrimPolicy::None => "",
            TrimPolicy::TagNewline => ">",
            TrimPolicy::LineTags => "<>",
            TrimPolicy::Explicit => "-",
        }
    }
}

/// Trim level as accepted on the command line: `0`, `1`, `2` or `-`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TrimLevel {
    #[default]
    Zero,
    One,
    Two,
    Dash,
}

impl TrimLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            TrimLevel::Zero => "0",
            TrimLevel::One => "1",
            TrimLevel::Two => "2",
            TrimLevel::Dash => "-",
        }
    }

    pub fn policy(self) -> TrimPolicy {
        match self {
            TrimLevel::Zero => TrimPolicy::None,
            TrimLevel::One => TrimPolicy::TagNewline,
            TrimLevel::Two => TrimPolicy::LineTags,
            TrimLevel::Dash => TrimPolicy::Explicit,
        }
    }
}

impl FromStr for TrimLevel {
    type Err = Error;

    /// An empty string counts as the default level.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" | "" => Ok(TrimLevel::Zero),
            "1" => Ok(TrimLevel::One),
            "2" => Ok(TrimLevel::Two),
            "-" => Ok(TrimLevel::Dash),
            other => Err(Error::BadArgument(format!(
                "Invalid trim mode {other}. Should be 0, 1, 2, or -"
            ))),
        }
    }
}

impl Display for TrimLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resolved trim mode, e.g. `"%<>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrimMode {
    text: String,
    percent: bool,
    policy: TrimPolicy,
}

impl TrimMode {
    pub fn new(level: TrimLevel, percent_disabled: bool) -> Self {
        let policy = level.policy();
        let mut text = String::with_capacity(3);

        if !percent_disabled {
            text.push('%');
        }
        text.push_str(policy.suffix());

        Self {
            text,
            percent: !percent_disabled,
            policy,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether lines starting with `%` are code lines.
    pub fn percent(&self) -> bool {
        self.percent
    }

    pub fn policy(&self) -> TrimPolicy {
        self.policy
    }
}

impl Default for TrimMode {
    fn default() -> Self {
        TrimMode::new(TrimLevel::default(), false)
    }
}

impl Display for TrimMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Resolves a trim level and the percent flag into a trim mode.
///
/// Numbers are accepted through their string form, so `resolve(1, false)`
/// and `resolve("1", false)` are the same call.
pub fn resolve(level: impl ToString, percent_disabled: bool) -> Result<TrimMode, Error> {
    let level: TrimLevel = level.to_string().parse()?;
    Ok(TrimMode::new(level, percent_disabled))
}

/// Trim settings as configured on a generator. The mode is recomputed on
/// every change and never outlives the settings it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TrimConfig {
    level: TrimLevel,
    percent_disabled: bool,
    mode: TrimMode,
}

impl TrimConfig {
    pub(crate) fn level(&self) -> TrimLevel {
        self.level
    }

    pub(crate) fn percent_disabled(&self) -> bool {
        self.percent_disabled
    }

    pub(crate) fn mode(&self) -> &TrimMode {
        &self.mode
    }

    pub(crate) fn set_level(&mut self, level: TrimLevel) {
        self.level = level;
        self.mode = TrimMode::new(self.level, self.percent_disabled);
    }

    pub(crate) fn set_percent_disabled(&mut self, disabled: bool) {
        self.percent_disabled = disabled;
        self.mode = TrimMode::new(self.level, self.percent_disabled);
    }
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            level: TrimLevel::default(),
            percent_disabled: false,
            mode: TrimMode::default(),
        }
    }
}
