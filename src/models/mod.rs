pub mod chat;
pub mod delivery;
pub mod driver;
pub mod response;
