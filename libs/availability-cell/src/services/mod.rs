pub mod availability;
pub mod reservation;
pub mod slots;
