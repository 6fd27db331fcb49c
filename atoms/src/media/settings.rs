/// Limits applied to uploads before anything is written
#[derive(Debug, Clone)]
pub struct UploadLimits {
    /// Decoded payload size in bytes
    pub max_image_bytes: usize,
    /// Largest accepted width or height
    pub max_dimension: u32,
    pub max_title_len: usize,
    pub max_description_len: usize,
    pub max_tags: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_image_bytes: 10 * 1024 * 1024,
            max_dimension: 4096,
            max_title_len: 100,
            max_description_len: 500,
            max_tags: 10,
        }
    }
}

/// Knobs for the image handlers
#[derive(Debug, Clone)]
pub struct MediaSettings {
    pub limits: UploadLimits,
    pub default_page_limit: usize,
    pub max_page_limit: usize,
    /// Put backend error detail in 500 bodies (never in production)
    pub expose_error_details: bool,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            limits: UploadLimits::default(),
            default_page_limit: 20,
            max_page_limit: 100,
            expose_error_details: false,
        }
    }
}
