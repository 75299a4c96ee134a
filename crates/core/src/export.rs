use std::fmt;
use std::str::FromStr;

/// What a song can be exported as.
///
/// `Mp3` is a relabelled uncompressed container: the bytes are the same 16-bit
/// PCM WAV as `Wav`, only the extension and mime type differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportKind {
    Wav,
    Mp3,
    /// The project file
    Project,
}

impl ExportKind {
    pub const ALL: [ExportKind; 3] = [ExportKind::Wav, ExportKind::Mp3, ExportKind::Project];

    pub fn extension(&self) -> &'static str {
        match self {
            ExportKind::Wav => "wav",
            ExportKind::Mp3 => "mp3",
            ExportKind::Project => "aff",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportKind::Wav => "audio/wav",
            ExportKind::Mp3 => "audio/mpeg",
            ExportKind::Project => "application/json",
        }
    }

    pub fn is_audio(&self) -> bool {
        !matches!(self, ExportKind::Project)
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownExportKind(pub String);

impl fmt::Display for UnknownExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown export format '{}' (expected wav, mp3 or aff)", self.0)
    }
}

impl std::error::Error for UnknownExportKind {}

impl FromStr for ExportKind {
    type Err = UnknownExportKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().trim_start_matches('.').to_ascii_lowercase();
        ExportKind::ALL
            .into_iter()
            .find(|kind| kind.extension() == wanted)
            .ok_or_else(|| UnknownExportKind(s.to_string()))
    }
}

/// An exported file, ready to hand to whoever delivers it.
#[derive(Debug, Clone)]
pub struct Export {
    pub kind: ExportKind,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Export {
    pub fn mime_type(&self) -> &'static str {
        self.kind.mime_type()
    }
}

/// Song title with every whitespace run replaced by `_`, plus the extension.
pub fn export_file_name(title: &str, kind: ExportKind) -> String {
    let mut name = String::with_capacity(title.len() + 4);
    let mut in_space = false;
    for ch in title.chars() {
        if ch.is_whitespace() {
            if !in_space {
                name.push('_');
            }
            in_space = true;
        } else {
            name.push(ch);
            in_space = false;
        }
    }
    name.push('.');
    name.push_str(kind.extension());
    name
}
