pub mod event;
pub mod load;
pub mod location;
pub mod stop;
