//! Logical document identity.
//!
//! A [`Location`] is a protocol plus a path. Two locations refer to the same
//! file iff their protocols match and their normalized paths are equal; the
//! normalized pair is the key the open-file registry indexes by.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a document is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// A file on a remote host, reached over an SSH channel.
    Ssh,
    /// A file on the local filesystem.
    Local,
}

/// Logical address of a document: protocol + normalized path.
///
/// The path is normalized at construction, so equality and hashing are
/// stable regardless of how the caller spelled the path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    protocol: Protocol,
    path: String,
}

impl Location {
    /// Create a location, normalizing the path.
    pub fn new(protocol: Protocol, path: impl AsRef<str>) -> Self {
        Self {
            protocol,
            path: normalize_path(path.as_ref()),
        }
    }

    /// The transport protocol.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// The normalized path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Short human-readable name: the trailing path component.
    pub fn label(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// The location of the containing directory.
    pub fn directory(&self) -> Location {
        let dir = match self.path.rfind('/') {
            Some(0) => "/",
            Some(idx) => &self.path[..idx],
            None => "",
        };
        Location {
            protocol: self.protocol,
            path: dir.to_string(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.protocol {
            Protocol::Ssh => "ssh",
            Protocol::Local => "file",
        };
        write!(f, "{}://{}", scheme, self.path)
    }
}

/// Collapse `.` components and repeated separators, and trim a trailing
/// slash (except for the root itself).
fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                // Resolve against the collected prefix where possible.
                if matches!(parts.last(), Some(&p) if p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            p => parts.push(p),
        }
    }

    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}
