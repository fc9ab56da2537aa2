pub mod actor;
pub mod author;
pub mod book;
pub mod book_genre;
pub mod film;
pub mod film_actor;
pub mod genre;
pub mod user;
