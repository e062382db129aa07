use thiserror::Error;

/// Result alias for the fallible (decoding / parsing) surfaces of the crate.
pub type Result<T> = std::result::Result<T, FinderError>;

#[derive(Debug, Error)]
pub enum FinderError {
    #[error("unable to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("invalid hex color {value:?}, expected RRGGBB")]
    InvalidHex { value: String },

    #[error("invalid parameter: {parameter} = {value}")]
    InvalidParameter { parameter: &'static str, value: String },
}

impl FinderError {
    pub(crate) fn invalid(parameter: &'static str, value: impl ToString) -> Self {
        Self::InvalidParameter {
            parameter,
            value: value.to_string(),
        }
    }
}
