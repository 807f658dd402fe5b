pub mod store;
pub mod dbroom;
pub mod util;
