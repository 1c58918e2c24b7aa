//! Repository layer: unit structs with static async query methods.

pub mod credit_repo;
pub mod generation_request_repo;
pub mod media_asset_repo;
pub mod user_repo;
pub mod video_repo;

pub use credit_repo::CreditRepo;
pub use generation_request_repo::GenerationRequestRepo;
pub use media_asset_repo::MediaAssetRepo;
pub use user_repo::UserRepo;
pub use video_repo::VideoRepo;
