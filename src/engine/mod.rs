pub mod occupancy;
pub mod qr;
pub mod release;
pub mod revenue;
pub mod trip;
