//! Business rules behind the HTTP handlers. Every operation takes the store and an
//! explicit `now` so tests can drive the clock.

pub mod admin;
pub mod attendance;
pub mod audit;
pub mod auth_gateway;
pub mod face_gate;
pub mod reporting;
pub mod totp_gate;

#[cfg(test)]
pub mod testing;
