//! Wire models for the container-control API.

use serde::Deserialize;
use serde::de::{self, Visitor};

/// A file mode in the container runtime's wire layout.
///
/// The low bits carry POSIX permission bits; the file type lives in
/// dedicated high bits rather than the POSIX `S_IFMT` field. Only regular
/// files, directories, and symlinks are representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileMode(u32);

impl FileMode {
    /// Directory type bit.
    pub const DIR: u32 = 1 << 31;
    /// Symlink type bit.
    pub const SYMLINK: u32 = 1 << 27;

    /// Wrap raw mode bits.
    #[must_use]
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// The raw mode bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_dir(self) -> bool {
        self.0 & Self::DIR != 0
    }

    #[must_use]
    pub const fn is_symlink(self) -> bool {
        self.0 & Self::SYMLINK != 0
    }

    #[must_use]
    pub const fn is_regular(self) -> bool {
        !self.is_dir() && !self.is_symlink()
    }

    /// POSIX permission bits, including setuid/setgid/sticky.
    #[must_use]
    pub const fn perm(self) -> u32 {
        self.0 & 0o7777
    }

    /// The same mode with the symlink type bit set.
    #[must_use]
    pub const fn with_symlink(self) -> Self {
        Self(self.0 | Self::SYMLINK)
    }
}

// The stat header's `mode` field arrives as a JSON number that some encoders
// emit as an integer and others as a float; both must decode.
impl<'de> Deserialize<'de> for FileMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        struct ModeVisitor;

        impl Visitor<'_> for ModeVisitor {
            type Value = FileMode;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a file mode as an integer or float")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<FileMode, E> {
                u32::try_from(v)
                    .map(FileMode::new)
                    .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<FileMode, E> {
                u32::try_from(v)
                    .map(FileMode::new)
                    .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
            }

            #[expect(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                reason = "mode bits always fit in u32; the range check precedes the cast"
            )]
            fn visit_f64<E: de::Error>(self, v: f64) -> Result<FileMode, E> {
                if v.fract() != 0.0 || !(0.0..=f64::from(u32::MAX)).contains(&v) {
                    return Err(E::invalid_value(de::Unexpected::Float(v), &self));
                }
                Ok(FileMode::new(v as u32))
            }
        }

        deserializer.deserialize_any(ModeVisitor)
    }
}

/// Decoded `X-Docker-Container-Path-Stat` header payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathStat {
    /// Base name of the stat'd path.
    pub name: String,
    /// Size in bytes.
    pub size: i64,
    /// File mode, including the type bits.
    pub mode: FileMode,
    /// Symlink target; non-empty iff the symlink type bit is set.
    #[serde(default)]
    pub link_target: String,
}

/// The kind of a filesystem change reported by the diff endpoint.
///
/// The wire encoding is numeric and stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The file existed in the image and its content or metadata changed.
    Modified,
    /// The file was created after the container started.
    Added,
    /// The file was deleted after the container started.
    Removed,
}

impl<'de> Deserialize<'de> for ChangeKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        match u64::deserialize(deserializer)? {
            0 => Ok(Self::Modified),
            1 => Ok(Self::Added),
            2 => Ok(Self::Removed),
            other => Err(de::Error::invalid_value(
                de::Unexpected::Unsigned(other),
                &"a change kind in 0..=2",
            )),
        }
    }
}

/// One entry of the container diff report.
#[derive(Debug, Clone, Deserialize)]
pub struct Change {
    /// Absolute path inside the container.
    #[serde(rename = "Path")]
    pub path: String,
    /// What happened to the path.
    #[serde(rename = "Kind")]
    pub kind: ChangeKind,
    /// File mode, populated lazily the first time the change is surfaced.
    #[serde(skip)]
    pub mode: Option<FileMode>,
}

/// One entry of the container listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    /// Container id.
    pub id: String,
    /// Container names, each prefixed with `/`.
    #[serde(default)]
    pub names: Vec<String>,
    /// Image reference the container was created from.
    #[serde(default)]
    pub image: String,
    /// Runtime state (`running`, `exited`, ...).
    #[serde(default)]
    pub state: String,
}

impl ContainerSummary {
    /// The primary name without the leading slash, falling back to the id.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.names
            .first()
            .map_or(self.id.as_str(), |n| n.trim_start_matches('/'))
    }
}
