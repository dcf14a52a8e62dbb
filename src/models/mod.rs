pub mod audit;
pub mod auth;
pub mod chat;
pub mod financial;
pub mod notification;
pub mod partner;
pub mod recommendation;
pub mod user;
