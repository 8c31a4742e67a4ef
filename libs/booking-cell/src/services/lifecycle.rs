// libs/booking-cell/src/services/lifecycle.rs
use crate::models::{AppointmentStatus, BookingError};

/// Legal status moves. Terminal states accept nothing; an appointment is
/// cancelled or completed exactly once.
pub fn can_transition(from: AppointmentStatus, to: AppointmentStatus) -> bool {
    use crate::models::AppointmentStatus::*;
    match (from, to) {
        (Pending, Confirmed) | (Pending, Cancelled) => true,
        (Confirmed, Completed) | (Confirmed, Cancelled) => true,
        _ => false,
    }
}

pub fn check_transition(
    from: AppointmentStatus,
    to: AppointmentStatus,
) -> Result<(), BookingError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(BookingError::Conflict(format!(
            "Cannot move appointment from {} to {}",
            from, to
        )))
    }
}

/// Reschedule touches the slot grid, so it is only allowed while the
/// appointment still occupies a slot.
pub fn check_reschedulable(status: AppointmentStatus) -> Result<(), BookingError> {
    if status.occupies_slot() {
        Ok(())
    } else {
        Err(BookingError::Conflict(format!(
            "Cannot reschedule a {} appointment",
            status
        )))
    }
}
