//! Non-rendering logic of the admin screens.

pub mod users;

pub use users::{
    filter_and_sort_users, AdminError, AdminResult, UserFilter, UserManager, UserSort,
    UserSortField, MAX_LISTENED_USERS,
};
