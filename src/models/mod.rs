pub mod driver;
pub mod ticket;
pub mod trip;
