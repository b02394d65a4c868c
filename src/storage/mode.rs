use std::fmt;
use std::str::FromStr;

use super::FsError;

/// File open mode / 文件打开模式
///
/// Parsed from the conventional mode strings: `r`, `w`, `a`, `x`, each
/// optionally followed by `+` (update) and `b`/`t` (ignored, I/O is binary).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    pub reading: bool,
    pub writing: bool,
    pub appending: bool,
    pub truncate: bool,
    pub create: bool,
    pub exclusive: bool,
}

impl OpenMode {
    pub fn read() -> Self {
        Self {
            reading: true,
            writing: false,
            appending: false,
            truncate: false,
            create: false,
            exclusive: false,
        }
    }

    /// Create or truncate / 创建或截断
    pub fn write() -> Self {
        Self {
            reading: false,
            writing: true,
            appending: false,
            truncate: true,
            create: true,
            exclusive: false,
        }
    }

    pub fn append() -> Self {
        Self {
            reading: false,
            writing: true,
            appending: true,
            truncate: false,
            create: true,
            exclusive: false,
        }
    }

    /// Whether the mode may modify the resource / 是否为写模式
    pub fn is_writing(&self) -> bool {
        self.writing || self.appending
    }
}

impl FromStr for OpenMode {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let mut mode = match chars.next() {
            Some('r') => OpenMode::read(),
            Some('w') => OpenMode::write(),
            Some('a') => OpenMode::append(),
            Some('x') => OpenMode {
                exclusive: true,
                truncate: false,
                ..OpenMode::write()
            },
            _ => return Err(FsError::InvalidArgument(format!("invalid mode '{}'", s))),
        };

        for c in chars {
            match c {
                '+' => {
                    mode.reading = true;
                    mode.writing = true;
                }
                'b' | 't' => {}
                _ => return Err(FsError::InvalidArgument(format!("invalid mode '{}'", s))),
            }
        }

        Ok(mode)
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = if self.exclusive {
            'x'
        } else if self.appending {
            'a'
        } else if self.truncate {
            'w'
        } else {
            'r'
        };
        let update = self.reading && self.writing;
        write!(f, "{}{}b", base, if update { "+" } else { "" })
    }
}
