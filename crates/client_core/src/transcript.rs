use std::path::Path;

use shared::domain::SerieBac;
use tracing::debug;

use crate::error::ValidationError;

/// Upper bound the backend enforces on uploaded transcripts.
pub const MAX_TRANSCRIPT_BYTES: u64 = 5 * 1024 * 1024;

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// Grade transcript picture uploaded with the initial submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptImage {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum TranscriptLoadError {
    #[error("failed to read transcript '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl TranscriptImage {
    pub fn new(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Reads a transcript from disk, guessing its MIME type from the
    /// extension. Files over the size cap are refused before being read.
    pub async fn from_path(path: &Path) -> Result<Self, TranscriptLoadError> {
        let io_error = |source| TranscriptLoadError::Io {
            path: path.display().to_string(),
            source,
        };

        let metadata = tokio::fs::metadata(path).await.map_err(io_error)?;
        if metadata.len() > MAX_TRANSCRIPT_BYTES {
            return Err(ValidationError::TranscriptTooLarge {
                size: metadata.len(),
                limit: MAX_TRANSCRIPT_BYTES,
            }
            .into());
        }

        let bytes = tokio::fs::read(path).await.map_err(io_error)?;
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("releve.bin")
            .to_string();
        let mime_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or(FALLBACK_MIME_TYPE)
            .to_string();
        debug!(%filename, %mime_type, size = bytes.len(), "loaded transcript from disk");

        Ok(Self {
            filename,
            mime_type,
            bytes,
        })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Advisory pre-check mirroring the backend's own rules.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.mime_type.starts_with("image/") {
            return Err(ValidationError::NotAnImage {
                mime_type: self.mime_type.clone(),
            });
        }
        if self.bytes.is_empty() {
            return Err(ValidationError::EmptyTranscript);
        }
        if self.size() > MAX_TRANSCRIPT_BYTES {
            return Err(ValidationError::TranscriptTooLarge {
                size: self.size(),
                limit: MAX_TRANSCRIPT_BYTES,
            });
        }
        Ok(())
    }
}

/// Series and transcript collected on the first step. Once built, both
/// values have passed client-side validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialInput {
    pub serie: SerieBac,
    pub transcript: TranscriptImage,
}

impl InitialInput {
    pub fn parse(serie: &str, transcript: TranscriptImage) -> Result<Self, ValidationError> {
        if serie.is_empty() {
            return Err(ValidationError::MissingField("serie_bac"));
        }
        let serie = serie.parse::<SerieBac>()?;
        transcript.validate()?;
        Ok(Self { serie, transcript })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        env, fs,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    fn jpeg(size: usize) -> TranscriptImage {
        TranscriptImage::new("releve.jpg", "image/jpeg", vec![0xFF; size])
    }

    #[test]
    fn accepts_image_under_the_cap() {
        let input = InitialInput::parse("S", jpeg(1024)).expect("valid input");
        assert_eq!(input.serie, SerieBac::S);
    }

    #[test]
    fn accepts_image_exactly_at_the_cap() {
        assert!(jpeg(MAX_TRANSCRIPT_BYTES as usize).validate().is_ok());
    }

    #[test]
    fn rejects_non_image_mime_types() {
        let pdf = TranscriptImage::new("releve.pdf", "application/pdf", vec![1, 2, 3]);
        assert_eq!(
            pdf.validate(),
            Err(ValidationError::NotAnImage {
                mime_type: "application/pdf".into()
            })
        );
    }

    #[test]
    fn rejects_oversized_images() {
        let err = jpeg(MAX_TRANSCRIPT_BYTES as usize + 1)
            .validate()
            .expect_err("too large");
        assert!(matches!(err, ValidationError::TranscriptTooLarge { .. }));
    }

    #[test]
    fn rejects_empty_and_unknown_series() {
        assert_eq!(
            InitialInput::parse("", jpeg(10)),
            Err(ValidationError::MissingField("serie_bac"))
        );
        assert_eq!(
            InitialInput::parse("Z", jpeg(10)),
            Err(ValidationError::UnknownSerie("Z".into()))
        );
    }

    #[tokio::test]
    async fn loads_transcript_and_guesses_mime_type() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let dir = env::temp_dir().join(format!("orientation_transcript_{suffix}"));
        fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("releve.png");
        fs::write(&path, [0x89, b'P', b'N', b'G']).expect("write");

        let transcript = TranscriptImage::from_path(&path).await.expect("load");
        assert_eq!(transcript.filename, "releve.png");
        assert_eq!(transcript.mime_type, "image/png");
        assert_eq!(transcript.size(), 4);

        fs::remove_dir_all(dir).expect("cleanup");
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let err = TranscriptImage::from_path(Path::new("/definitely/not/here.jpg"))
            .await
            .expect_err("missing");
        assert!(matches!(err, TranscriptLoadError::Io { .. }));
    }
}
