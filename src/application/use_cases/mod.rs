mod upload_content;

pub use upload_content::{UploadContentUseCase, UploadPrecheck};
