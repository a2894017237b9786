//! Repository layer for data access

pub mod brands;
pub mod campaigns;
pub mod contacts;
pub mod email_events;
pub mod emails;
pub mod groups;
pub mod sender_addresses;
pub mod templates;
pub mod webhooks;

pub use brands::BrandRepository;
pub use campaigns::CampaignRepository;
pub use contacts::ContactRepository;
pub use email_events::EmailEventRepository;
pub use emails::EmailRepository;
pub use groups::GroupRepository;
pub use sender_addresses::SenderAddressRepository;
pub use templates::TemplateRepository;
pub use webhooks::WebhookRepository;
