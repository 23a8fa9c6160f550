pub mod controller_service;
pub mod fault_monitor;
pub mod multi_axis;
pub mod scan_planner;
pub mod scan_thread;
pub mod single_axis;
pub mod state_monitor;
