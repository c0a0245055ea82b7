//! Processing-stage vocabulary reported by the backend.
//!
//! The backend attaches one of these labels to `status` and
//! `export_status` events. Labels this build does not know decode to
//! [`ProcessingStatus::Unknown`] so a new backend stage never turns an
//! otherwise valid frame into a malformed one.

use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ProcessingStatus {
    Starting,
    Processing,
    DownloadingVideo,
    DownloadingThumbnail,
    ExtractingInfo,
    ExtractingAudio,
    GeneratingSubtitles,
    Transcribed,
    SavingData,
    Translating,
    TranslationCompleted,
    Completed,
    Failed,
    ExportStarted,
    BurningSubtitles,
    CreatingSoftSubtitles,
    ExportCompleted,
    ExportFailed,
    /// A label outside the known vocabulary, kept verbatim.
    Unknown(String),
}

impl ProcessingStatus {
    /// Resolve a wire label to its variant.
    pub fn from_label(label: &str) -> Self {
        match label {
            "starting" => Self::Starting,
            "processing" => Self::Processing,
            "downloading_video" => Self::DownloadingVideo,
            "downloading_thumbnail" => Self::DownloadingThumbnail,
            "extracting_info" => Self::ExtractingInfo,
            "extracting_audio" => Self::ExtractingAudio,
            "generating_subtitles" => Self::GeneratingSubtitles,
            "transcribed" => Self::Transcribed,
            "saving_data" => Self::SavingData,
            "translating" => Self::Translating,
            "translation_completed" => Self::TranslationCompleted,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "export_started" => Self::ExportStarted,
            "burning_subtitles" => Self::BurningSubtitles,
            "creating_soft_subtitles" => Self::CreatingSoftSubtitles,
            "export_completed" => Self::ExportCompleted,
            "export_failed" => Self::ExportFailed,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Wire label for this stage.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Starting => "starting",
            Self::Processing => "processing",
            Self::DownloadingVideo => "downloading_video",
            Self::DownloadingThumbnail => "downloading_thumbnail",
            Self::ExtractingInfo => "extracting_info",
            Self::ExtractingAudio => "extracting_audio",
            Self::GeneratingSubtitles => "generating_subtitles",
            Self::Transcribed => "transcribed",
            Self::SavingData => "saving_data",
            Self::Translating => "translating",
            Self::TranslationCompleted => "translation_completed",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::ExportStarted => "export_started",
            Self::BurningSubtitles => "burning_subtitles",
            Self::CreatingSoftSubtitles => "creating_soft_subtitles",
            Self::ExportCompleted => "export_completed",
            Self::ExportFailed => "export_failed",
            Self::Unknown(label) => label,
        }
    }

    /// Whether this stage ends a processing or export run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::ExportCompleted | Self::ExportFailed
        )
    }

    /// Whether this stage belongs to the export pipeline.
    pub fn is_export_stage(&self) -> bool {
        matches!(
            self,
            Self::ExportStarted
                | Self::BurningSubtitles
                | Self::CreatingSoftSubtitles
                | Self::ExportCompleted
                | Self::ExportFailed
        )
    }
}

impl From<String> for ProcessingStatus {
    fn from(label: String) -> Self {
        match Self::from_label(&label) {
            Self::Unknown(_) => Self::Unknown(label),
            known => known,
        }
    }
}

impl Serialize for ProcessingStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
