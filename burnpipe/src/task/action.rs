//! Action labels: what a run does and what it is doing right now.

use std::fmt;

/// Top-level action a task context was created for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskAction {
    /// Produce an image or record a disc, depending on the leader's output.
    #[default]
    Normal,
    /// Blank a rewritable medium.
    Erase,
    /// Verify a checksum.
    Checksum,
}

/// Step currently being performed, shown to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CurrentAction {
    #[default]
    None,
    GettingSize,
    Analysing,
    Preparing,
    CreatingImage,
    Transcoding,
    FileCopy,
    DriveCopy,
    Blanking,
    StartRecording,
    Leadin,
    Recording,
    RecordingCdText,
    Fixating,
    Leadout,
    Checksum,
    Ejecting,
    Finished,
}

impl CurrentAction {
    /// Default human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::GettingSize => "Getting size",
            Self::Analysing => "Analysing",
            Self::Preparing => "Preparing to write",
            Self::CreatingImage => "Creating image",
            Self::Transcoding => "Transcoding song",
            Self::FileCopy => "Copying file",
            Self::DriveCopy => "Copying disc",
            Self::Blanking => "Erasing disc",
            Self::StartRecording => "Starting to record",
            Self::Leadin => "Writing leadin",
            Self::Recording => "Writing",
            Self::RecordingCdText => "Writing CD-Text information",
            Self::Fixating => "Finalizing",
            Self::Leadout => "Writing leadout",
            Self::Checksum => "Creating checksum",
            Self::Ejecting => "Ejecting medium",
            Self::Finished => "Success",
        }
    }
}

impl fmt::Display for CurrentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_actions() {
        assert_eq!(TaskAction::default(), TaskAction::Normal);
        assert_eq!(CurrentAction::default(), CurrentAction::None);
    }

    #[test]
    fn test_labels() {
        assert_eq!(CurrentAction::Recording.to_string(), "Writing");
        assert_eq!(CurrentAction::None.label(), "");
    }
}
