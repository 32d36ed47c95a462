pub mod index;
pub mod load;
pub mod search;
pub mod status;
