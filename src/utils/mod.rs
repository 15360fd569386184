pub mod uid;
pub use uid::{UID_LENGTH, UidSource, generate_pool, random_uid};
