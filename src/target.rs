//! Command targets: which modules an addressed command entry applies to.
//!
//! The runtime resolves targets itself: an empty string selects every module,
//! anything else is a regular expression that must match the whole module
//! name. A plain name is the degenerate case and is kept as such. Targets are
//! written to the document verbatim; [`Target::resolve`] reproduces the
//! runtime's matching so the generator can report targets that hit nothing.

use crate::error::{ConfgenError, ConfgenResult};

use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone)]
pub enum Target {
    All,
    Name(String),
    Pattern { source: String, regex: Regex },
}

impl Target {
    pub fn parse(s: &str) -> ConfgenResult<Self> {
        if s.is_empty() {
            return Ok(Target::All);
        }
        if s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Ok(Target::Name(s.to_string()));
        }
        let regex = Regex::new(&format!("^(?:{})$", s)).map_err(|e| {
            ConfgenError::invalid("target", format!("bad pattern {:?}: {}", s, e))
        })?;
        Ok(Target::Pattern {
            source: s.to_string(),
            regex,
        })
    }

    /// The string written into the document.
    pub fn as_str(&self) -> &str {
        match self {
            Target::All => "",
            Target::Name(name) => name,
            Target::Pattern { source, .. } => source,
        }
    }

    pub fn matches(&self, module: &str) -> bool {
        match self {
            Target::All => true,
            Target::Name(name) => name == module,
            Target::Pattern { regex, .. } => regex.is_match(module),
        }
    }

    /// Module names this target selects, in the order given.
    pub fn resolve<'a, I>(&self, modules: I) -> Vec<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        modules.into_iter().filter(|m| self.matches(m)).collect()
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Target {}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Target {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
