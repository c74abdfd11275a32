pub mod attendance;
pub mod audit;
pub mod role;
pub mod user;
