pub mod worker;
pub mod workout_store;

use chrono::Utc;
use rand::Rng;

pub use worker::run_store_worker;
pub use workout_store::WorkoutStore;

/// Session ids are timestamp based for readability; the random suffix keeps
/// two sessions started within the same second distinct.
pub fn generate_session_id() -> String {
    let suffix: u16 = rand::rng().random();
    format!("session_{}_{:04x}", Utc::now().format("%Y%m%d_%H%M%S"), suffix)
}
