pub mod connctx;
pub mod presence;
pub mod registry;
pub mod resolver;
pub mod router;
pub mod session;
