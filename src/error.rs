use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by clickmask itself, as opposed to the libraries it drives
#[derive(Error, Debug)]
pub enum Error {
    #[error("Image not found at {}", .0.display())]
    ImageNotFound(PathBuf),

    #[error("Failed to read the video file.")]
    VideoRead,

    #[error("Model file not found at {}", .0.display())]
    MissingModelFile(PathBuf),

    #[error("At least one point prompt is required")]
    NoPrompts,

    #[error("Label must be 0 or 1, got {0}")]
    InvalidLabel(i64),

    #[error("Invalid point '{0}': expected X,Y or X,Y,LABEL")]
    InvalidPoint(String),

    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),

    #[error("No image has been set on the segmenter")]
    ImageNotSet,

    #[error("Unexpected model output: {0}")]
    UnexpectedOutput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_not_found_names_path() {
        let err = Error::ImageNotFound(PathBuf::from("/tmp/road.jpg"));
        assert_eq!(err.to_string(), "Image not found at /tmp/road.jpg");
    }

    #[test]
    fn test_video_read_message() {
        assert_eq!(Error::VideoRead.to_string(), "Failed to read the video file.");
    }

    #[test]
    fn test_error_into_anyhow_keeps_variant() {
        let err: anyhow::Error = Error::InvalidLabel(7).into();
        match err.downcast_ref::<Error>() {
            Some(Error::InvalidLabel(7)) => {}
            other => panic!("Expected InvalidLabel, got {:?}", other),
        }
    }
}
