pub mod controller;
pub mod source;

pub use controller::{LoadController, Subscription};
pub use source::{
    decode_users, HttpUsersSource, UnavailableUsersSource, UsersSource, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_USERS_ENDPOINT,
};

