mod content_hash;
mod lock_key;
mod lock_token;
mod owner_id;
mod storage_path;
mod upload_state;

pub use content_hash::ContentHash;
pub use lock_key::LockKey;
pub use lock_token::LockToken;
pub use owner_id::OwnerId;
pub use storage_path::{extension_of, StoragePath};
pub use upload_state::UploadState;
