mod extract;

pub use extract::AuthenticatedUser;
