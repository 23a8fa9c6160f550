//! ASCII command vocabulary of the motion amplifier. Commands are
//! newline-terminated on the wire; termination is applied by the transport.

pub const ACKNOWLEDGE_ALL: &str = "ACKNOWLEDGEALL";
pub const WAIT_MODE_NOWAIT: &str = "WAIT MODE NOWAIT";
pub const RESET: &str = "RESET";

pub fn enable(axis: &str) -> String {
    format!("ENABLE {axis}")
}

pub fn disable(axis: &str) -> String {
    format!("DISABLE {axis}")
}

pub fn axis_status(axis: &str) -> String {
    format!("AXISSTATUS({axis})")
}

pub fn axis_fault(axis: &str) -> String {
    format!("AXISFAULT({axis})")
}

pub fn move_absolute(axis: &str, position: f64, speed: f64) -> String {
    format!("MOVEABS {axis} {position} F {speed}")
}

pub fn move_incremental(axis: &str, distance: f64, speed: f64) -> String {
    format!("MOVEINC {axis} {distance} F {speed}")
}

/// Signed speed: negative runs the axis in reverse, zero stops a jog.
pub fn freerun(axis: &str, speed: f64) -> String {
    format!("FREERUN {axis} {speed}")
}

pub fn abort(axis: &str) -> String {
    format!("ABORT {axis}")
}

pub fn position_offset_set(axis: &str, value: f64) -> String {
    format!("POSOFFSET SET {axis}, {value}")
}

pub fn position_feedback(axis: &str) -> String {
    format!("PFBKPROG({axis})")
}

pub fn current_feedback(axis: &str) -> String {
    format!("IFBK({axis})")
}

pub fn position_error(axis: &str) -> String {
    format!("PERR({axis})")
}
