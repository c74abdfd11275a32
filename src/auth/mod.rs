pub mod auth;
pub mod handlers;
pub mod jwt;
pub mod lockout;
pub mod middleware;
pub mod password;
pub mod revocation;
pub mod totp;
