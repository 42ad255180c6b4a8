pub mod domain;
pub mod player;
pub mod ports;

pub use domain::{
    AdCampaign, AdImpression, Advertiser, CampaignStatus, User, UserCredentials, Video,
};
pub use player::{Effect, Input, PlaybackMode, PlaybackSession};
pub use ports::{
    AdInventoryService, BillingLedgerService, ContentResolver, DatabaseService, PortError,
    PortResult,
};
