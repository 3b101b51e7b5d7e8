pub mod favorites;
pub mod jobs;
pub mod people;
pub mod reviews;
pub mod titles;
pub mod users;
