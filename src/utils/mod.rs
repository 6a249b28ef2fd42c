pub mod constants;
mod timeout;

pub use timeout::validate_navigation_timeout;
