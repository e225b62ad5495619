pub mod credentials;
pub mod session;
pub mod state;
pub mod token;
