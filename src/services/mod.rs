pub mod storage;
pub mod user_service;
